use std::path::Path;
use std::time::SystemTime;
use std::{fs, io};

/// Removing files and directories
mod ops;
pub use ops::{remove, Removed};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Path is neither file nor dir: {0}")]
    UnknownPathType(String),
}

/// Check if path exists on disk (a dangling symlink counts).
pub fn exists<T: AsRef<Path>>(path: T) -> bool {
    let path = path.as_ref();
    path.exists() || path.is_symlink()
}

/// Modification time of `path`, following symlinks.
pub fn modified<T: AsRef<Path>>(path: T) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_exists_and_modified() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("file");
        assert!(!exists(&file));
        assert_eq!(modified(&file).unwrap_err().kind(), io::ErrorKind::NotFound);

        fs::write(&file, "x")?;
        assert!(exists(&file));
        assert!(modified(&file)? <= SystemTime::now());

        #[cfg(unix)]
        {
            let dangling = dir.path().join("dangling");
            std::os::unix::fs::symlink(dir.path().join("nowhere"), &dangling)?;
            assert!(exists(&dangling));
        }
        Ok(())
    }
}
