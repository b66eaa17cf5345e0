use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::Result;
use crate::utils::io;

/// Per-run working directory, `<root>/<run id>`.
#[derive(Debug, Clone)]
pub struct Sandbox {
    run_id: String,
    path: PathBuf,
}

impl Sandbox {
    /// Create a fresh sandbox under `root`.
    pub fn create(root: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let path = root.join(&run_id);
        io::ensure_dir(&path, "create sandbox")?;
        Ok(Self { run_id, path })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }

    /// Whether `path` exists strictly inside the sandbox once symlinks are resolved.
    pub fn owns(&self, path: &Path) -> bool {
        let (Ok(root), Ok(candidate)) = (self.path.canonicalize(), path.canonicalize()) else {
            return false;
        };
        candidate != root && candidate.starts_with(&root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sandboxes_are_unique_per_run() {
        let root = TempDir::new().unwrap();
        let a = Sandbox::create(root.path()).unwrap();
        let b = Sandbox::create(root.path()).unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().starts_with(root.path()));
        assert_eq!(a.join("pkg"), a.path().join("pkg"));
    }

    #[test]
    fn owns_only_existing_paths_inside() {
        let root = TempDir::new().unwrap();
        let sandbox = Sandbox::create(&root.path().join("runs")).unwrap();
        let inside = sandbox.join("pkg");
        std::fs::create_dir_all(&inside).unwrap();
        let outside = root.path().join("checkout");
        std::fs::create_dir_all(&outside).unwrap();

        assert!(sandbox.owns(&inside));
        assert!(sandbox.owns(&sandbox.join("pkg/../pkg")));
        assert!(!sandbox.owns(sandbox.path()));
        assert!(!sandbox.owns(&outside));
        assert!(!sandbox.owns(&sandbox.join("pkg/../../../checkout")));
        assert!(!sandbox.owns(&sandbox.join("missing")));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_sandbox_is_not_owned() {
        let root = TempDir::new().unwrap();
        let sandbox = Sandbox::create(root.path()).unwrap();
        let outside = root.path().join("checkout");
        std::fs::create_dir_all(&outside).unwrap();
        let link = sandbox.join("link");
        std::os::unix::fs::symlink(&outside, &link).unwrap();

        assert!(!sandbox.owns(&link));
    }
}
