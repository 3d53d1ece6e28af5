//! Export writer that saves into a fixed directory without prompting.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clip_buffer_core::{ClipError, ExportWriter, WriteOutcome};

/// Writes each export as a new file in `dir`.
///
/// Existing files are never overwritten; a numeric suffix is added instead.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    dir: PathBuf,
}

impl DirectoryWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create_unique(&self, suggested_name: &str) -> io::Result<(PathBuf, fs::File)> {
        let candidate = Path::new(suggested_name);
        let stem = candidate.file_stem().and_then(|s| s.to_str()).unwrap_or("clip");
        let extension = candidate.extension().and_then(|s| s.to_str());

        for attempt in 0..1000u32 {
            let name = match (attempt, extension) {
                (0, _) => suggested_name.to_string(),
                (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
                (n, None) => format!("{}-{}", stem, n),
            };
            let path = self.dir.join(name);
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name for {}", suggested_name),
        ))
    }
}

impl ExportWriter for DirectoryWriter {
    fn prompt_and_write(&self, bytes: &[u8], suggested_name: &str) -> Result<WriteOutcome, ClipError> {
        if Path::new(suggested_name).file_name().and_then(|n| n.to_str()) != Some(suggested_name) {
            return Err(ClipError::StorageError(format!("invalid file name: {}", suggested_name)));
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            ClipError::StorageError(format!("failed to create {}: {}", self.dir.display(), e))
        })?;

        let (path, mut file) = self
            .create_unique(suggested_name)
            .map_err(|e| ClipError::StorageError(format!("failed to create file in {}: {}", self.dir.display(), e)))?;

        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(ClipError::StorageError(format!("failed to write {}: {}", path.display(), e)));
        }

        log::debug!("wrote {} bytes to {}", bytes.len(), path.display());
        Ok(WriteOutcome::Written(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_into_created_directory() {
        let root = tempfile::tempdir().unwrap();
        let writer = DirectoryWriter::new(root.path().join("clips"));

        let outcome = writer.prompt_and_write(&[1, 2, 3], "clip-1.mp3").unwrap();

        let WriteOutcome::Written(path) = outcome else {
            panic!("expected written outcome");
        };
        assert_eq!(path, root.path().join("clips").join("clip-1.mp3"));
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn never_overwrites_existing_file() {
        let root = tempfile::tempdir().unwrap();
        let writer = DirectoryWriter::new(root.path());

        writer.prompt_and_write(b"first", "clip.mp3").unwrap();
        let second = writer.prompt_and_write(b"second", "clip.mp3").unwrap();

        assert_eq!(second, WriteOutcome::Written(root.path().join("clip-1.mp3")));
        assert_eq!(fs::read(root.path().join("clip.mp3")).unwrap(), b"first");
        assert_eq!(fs::read(root.path().join("clip-1.mp3")).unwrap(), b"second");
    }

    #[test]
    fn rejects_names_with_directories() {
        let root = tempfile::tempdir().unwrap();
        let writer = DirectoryWriter::new(root.path());

        let err = writer.prompt_and_write(b"x", "../escape.mp3").unwrap_err();

        assert!(matches!(err, ClipError::StorageError(_)));
        assert!(!root.path().join("..").join("escape.mp3").exists());
    }
}
