//! Removal of intermediate NetCDF files from an output directory

use crate::errors::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Delete every `*.nc` file directly inside `dir`.
///
/// A missing directory is not an error. Files that cannot be removed are
/// logged and skipped. Returns the removed paths.
pub fn clean_outdir(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "nothing to clean");
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_netcdf = path.is_file() && path.extension().map_or(false, |ext| ext == "nc");
        if !is_netcdf {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed");
                removed.push(path);
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove file"),
        }
    }
    removed.sort();
    tracing::info!(dir = %dir.display(), files = removed.len(), "output directory cleaned");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn removes_only_netcdf_files() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("tp_006.nc"), b"x")?;
        fs::write(dir.path().join("sfc_tmp_tp.nc"), b"x")?;
        fs::write(dir.path().join("notes.txt"), b"x")?;
        fs::create_dir(dir.path().join("06Z.nc"))?;

        let removed = clean_outdir(dir.path())?;
        assert_eq!(removed.len(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("06Z.nc").is_dir());
        assert!(!dir.path().join("tp_006.nc").exists());
        Ok(())
    }

    #[test]
    fn missing_directory_is_a_no_op() -> Result<()> {
        let dir = tempdir()?;
        let removed = clean_outdir(&dir.path().join("absent"))?;
        assert!(removed.is_empty());
        Ok(())
    }
}
