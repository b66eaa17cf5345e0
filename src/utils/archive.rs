//! Archive extraction for tar-family and zip archives.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    TarXz,
    TarBz2,
    Zip,
}

impl ArchiveKind {
    pub fn detect(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveKind::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Ok(ArchiveKind::TarXz)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Ok(ArchiveKind::TarBz2)
        } else if name.ends_with(".tar") || name.ends_with(".gem") {
            Ok(ArchiveKind::Tar)
        } else if name.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            Err(Error::validation_invalid_argument(
                "archive",
                format!("Unsupported archive format: {}", name),
                Some(path.display().to_string()),
                Some(
                    [".tar", ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".gem", ".zip"]
                        .iter()
                        .map(|ext| ext.to_string())
                        .collect(),
                ),
            ))
        }
    }
}

/// Entry names in archive order.
pub fn member_names(path: &Path) -> Result<Vec<String>> {
    match ArchiveKind::detect(path)? {
        ArchiveKind::Tar => tar_member_names(open(path)?),
        ArchiveKind::TarGz => tar_member_names(GzDecoder::new(open(path)?)),
        ArchiveKind::TarXz => tar_member_names(XzDecoder::new(open(path)?)),
        ArchiveKind::TarBz2 => tar_member_names(BzDecoder::new(open(path)?)),
        ArchiveKind::Zip => {
            let archive = zip::ZipArchive::new(open(path)?).map_err(|e| zip_error(path, e))?;
            Ok(archive.file_names().map(|n| n.to_string()).collect())
        }
    }
}

/// Extract the archive at `path` into `destination`.
pub fn extract(path: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", destination.display())))
    })?;

    match ArchiveKind::detect(path)? {
        ArchiveKind::Tar => unpack_tar(open(path)?, path, destination),
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(open(path)?), path, destination),
        ArchiveKind::TarXz => unpack_tar(XzDecoder::new(open(path)?), path, destination),
        ArchiveKind::TarBz2 => unpack_tar(BzDecoder::new(open(path)?), path, destination),
        ArchiveKind::Zip => {
            let mut archive = zip::ZipArchive::new(open(path)?).map_err(|e| zip_error(path, e))?;
            archive.extract(destination).map_err(|e| zip_error(path, e))
        }
    }
}

/// Top-level entry of the first archive member, joined onto `destination`.
pub fn first_member_path(path: &Path, destination: &Path) -> Result<Option<PathBuf>> {
    Ok(member_names(path)?.into_iter().next().and_then(|name| {
        Path::new(&name)
            .components()
            .find(|c| matches!(c, std::path::Component::Normal(_)))
            .map(|top| destination.join(top))
    }))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("open {}", path.display()))))
}

fn tar_member_names<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| Error::internal_io(e.to_string(), Some("read tar entries".to_string())))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::internal_io(e.to_string(), Some("read tar entry".to_string())))?;
        let name = entry
            .path()
            .map_err(|e| Error::internal_io(e.to_string(), Some("read tar path".to_string())))?
            .to_string_lossy()
            .to_string();
        names.push(name);
    }
    Ok(names)
}

fn unpack_tar<R: Read>(reader: R, source: &Path, destination: &Path) -> Result<()> {
    tar::Archive::new(reader).unpack(destination).map_err(|e| {
        Error::internal_io(
            e.to_string(),
            Some(format!("extract {} into {}", source.display(), destination.display())),
        )
    })
}

fn zip_error(path: &Path, e: zip::result::ZipError) -> Error {
    Error::internal_io(e.to_string(), Some(format!("read zip {}", path.display())))
}
