use std::path::Path;

/// Return the first of `candidates` that exists and is a regular file.
pub fn first_file_found<'a, P: AsRef<Path> + ?Sized>(candidates: &[&'a P]) -> Option<&'a P> {
    candidates
        .iter()
        .copied()
        .find(|candidate| candidate.as_ref().is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_first_file_found() -> Result<()> {
        let dir = tempdir()?;
        let here = dir.path().join("here");
        std::fs::write(&here, "x")?;
        let missing = dir.path().join("not-here");

        assert_eq!(first_file_found(&[&here, &missing]), Some(&here));
        assert_eq!(first_file_found(&[&missing, &here]), Some(&here));
        assert_eq!(first_file_found(&[&missing, &here, &missing]), Some(&here));

        let none: &[&Path] = &[];
        assert_eq!(first_file_found(none), None);
        // directories don't count:
        assert_eq!(first_file_found(&[dir.path()]), None);
        assert_eq!(first_file_found(&[&missing]), None);
        Ok(())
    }
}
