//! Filesystem utilities

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};

/// Create a directory and its parents if missing, logging when one is created
pub fn create_dir_all(path: &str) -> std::io::Result<()> {
    let path = Path::new(path);
    if !path.exists() {
        fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary
///
/// Returns false (after logging) if it could not be created.
pub fn ensure_dir_exists(path: &str) -> bool {
    let path = Path::new(path);

    if path.is_dir() {
        return true;
    }

    match fs::create_dir_all(path) {
        Ok(_) => {
            info!("Created directory: {}", path.display());
            true
        }
        Err(e) => {
            error!("Failed to create directory {}: {}", path.display(), e);
            false
        }
    }
}

/// Path of the SQLite database file inside a database directory
pub fn database_file(db_dir: &str) -> PathBuf {
    Path::new(db_dir).join(crate::DATABASE_FILE)
}
