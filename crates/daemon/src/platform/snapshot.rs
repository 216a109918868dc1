use std::{
    io::{Cursor, Read, Seek},
    path::{Component, Path, PathBuf},
};

use tempfile::TempDir;

use super::PlatformError;

/// A commit's file tree unpacked into a temporary directory.
///
/// The directory is removed when the snapshot is dropped.
#[derive(Debug)]
pub struct Snapshot {
    dir: TempDir,
}

impl Snapshot {
    /// Wraps an already populated directory.
    pub fn from_dir(dir: TempDir) -> Self {
        Self { dir }
    }

    /// Unpacks a zip archive whose entries share one top-level directory
    /// (the platform's `<owner>-<repo>-<sha>/` prefix), which is stripped.
    pub fn from_zip(bytes: &[u8]) -> Result<Self, PlatformError> {
        let dir = tempfile::Builder::new().prefix("checkflow-").tempdir()?;
        extract(Cursor::new(bytes), dir.path())?;
        Ok(Self { dir })
    }

    /// Repository root inside the snapshot.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

fn extract<R: Read + Seek>(reader: R, dest: &Path) -> Result<(), PlatformError> {
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| PlatformError::Extract(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| PlatformError::Extract(e.to_string()))?;
        // enclosed_name rejects absolute paths and `..`
        let Some(name) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let relative: PathBuf = name
            .components()
            .skip(1)
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let opts = SimpleFileOptions::default();
            zip.add_directory("acme-shop-abc123/", opts).unwrap();
            for (path, body) in files {
                zip.start_file(format!("acme-shop-abc123/{path}"), opts).unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn strips_the_archive_prefix() {
        let bytes = archive(&[("phantom.yaml", "builds: []\n"), ("src/main.rs", "fn main() {}")]);
        let snapshot = Snapshot::from_zip(&bytes).unwrap();
        assert!(snapshot.root().join("phantom.yaml").is_file());
        assert!(snapshot.root().join("src/main.rs").is_file());
    }

    #[test]
    fn directory_is_removed_on_drop() {
        let snapshot = Snapshot::from_zip(&archive(&[("a.txt", "a")])).unwrap();
        let root = snapshot.root().to_path_buf();
        drop(snapshot);
        assert!(!root.exists());
    }

    #[test]
    fn rejects_non_zip_bytes() {
        assert!(matches!(
            Snapshot::from_zip(b"not a zip"),
            Err(PlatformError::Extract(_))
        ));
    }
}
