//! Ephemeral filesystem resources created during a run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::log_status;
use crate::utils::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    SourcePackage,
    PlatformTemplate,
    GeneratedTemplate,
    SourceTree,
    ExtractDir,
    DownloadDir,
    Sandbox,
}

impl ResourceKind {
    /// Step output keys whose values are paths owned by the run.
    pub const OUTPUT_KEYS: [(&'static str, ResourceKind); 6] = [
        ("srpm_path", ResourceKind::SourcePackage),
        ("platform_pot_path", ResourceKind::PlatformTemplate),
        ("src_pot_file", ResourceKind::GeneratedTemplate),
        ("src_tar_dir", ResourceKind::SourceTree),
        ("extract_dir", ResourceKind::ExtractDir),
        ("download_dir", ResourceKind::DownloadDir),
    ];

    pub fn from_output_key(key: &str) -> Option<Self> {
        Self::OUTPUT_KEYS
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, kind)| *kind)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    pub kind: ResourceKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub already_absent: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<CleanupFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub path: String,
    pub error: String,
}

/// Paths to remove when the run ends. Each path is removed at most once.
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    resources: Vec<Resource>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, path: impl Into<PathBuf>) {
        let path = path.into();
        if path.as_os_str().is_empty() || self.contains(&path) {
            return;
        }
        self.resources.push(Resource { kind, path });
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.resources.iter().any(|r| r.path == path)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Remove every registered path, newest first, and forget them.
    pub fn clean(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        while let Some(resource) = self.resources.pop() {
            let display = resource.path.display().to_string();
            match io::remove_path(&resource.path) {
                Ok(true) => report.removed.push(display),
                Ok(false) => report.already_absent.push(display),
                Err(err) => report.failed.push(CleanupFailure {
                    path: display,
                    error: err.to_string(),
                }),
            }
        }
        report
    }
}

/// Owns a registry and cleans it when dropped, whatever the exit path.
#[derive(Debug, Default)]
pub struct CleanupGuard {
    registry: CleanupRegistry,
}

impl CleanupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &CleanupRegistry {
        &self.registry
    }

    pub fn register(&mut self, kind: ResourceKind, path: impl Into<PathBuf>) {
        self.registry.register(kind, path);
    }

    /// Clean now and return what happened. Dropping afterwards is a no-op.
    pub fn finish(mut self) -> CleanupReport {
        self.registry.clean()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        let report = self.registry.clean();
        for failure in &report.failed {
            log_status!("cleanup", "Could not remove {}: {}", failure.path, failure.error);
        }
    }
}
