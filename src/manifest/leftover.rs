use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Removes the listed paths when dropped, unless disarmed first.
pub struct LeftoverFiles {
    paths: Vec<PathBuf>,
    armed: bool,
}

impl LeftoverFiles {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths, armed: true }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LeftoverFiles {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        for path in &self.paths {
            remove(path);
        }
    }
}

fn remove(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => info!("Removed leftover {}", path.display()),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            debug!("Leftover {} already gone", path.display());
        }
        Err(error) => warn!("Unable to remove leftover {}: {error}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_armed_guard_removes_files_and_directories() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("package.son");
        let unpacked = dir.path().join("unpacked");
        fs::write(&file, b"zip").unwrap();
        fs::create_dir_all(unpacked.join("META-INF")).unwrap();
        fs::write(unpacked.join("META-INF/MANIFEST.MF"), b"name").unwrap();

        drop(LeftoverFiles::new(vec![
            file.clone(),
            unpacked.clone(),
            dir.path().join("missing"),
        ]));

        assert!(!file.exists());
        assert!(!unpacked.exists());
    }

    #[test]
    fn test_disarmed_guard_keeps_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("package.son");
        fs::write(&file, b"zip").unwrap();

        LeftoverFiles::new(vec![file.clone()]).disarm();

        assert!(file.exists());
    }
}
