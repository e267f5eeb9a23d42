use std::fs;
use std::io;
use std::path::Path;

use anyhow::Result;

use util::PathEncodingError;

use super::Error;

/// What `remove` found at the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    File,
    Dir,
    Missing,
}

/// Remove `path`, recursively if it is a directory. Symlinks are removed,
/// never followed. A path that doesn't exist is not an error.
pub fn remove(path: &Path) -> Result<Removed> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Removed::Missing),
        Err(e) => return Err(e.into()),
    };
    let ty = meta.file_type();
    if ty.is_file() || ty.is_symlink() {
        fs::remove_file(path)?;
        Ok(Removed::File)
    } else if ty.is_dir() {
        fs::remove_dir_all(path)?;
        Ok(Removed::Dir)
    } else {
        Err(Error::UnknownPathType(path.to_str().ok_or(PathEncodingError)?.to_owned()).into())
    }
}
