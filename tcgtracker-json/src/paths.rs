//! Default on-disk locations for a store.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const DATA_FILE_NAME: &str = "tcgtracker.json";
pub const BACKUP_DIR_NAME: &str = "backups";

/// Platform data directory, or the working directory on platforms without one.
pub fn data_root() -> PathBuf {
    match ProjectDirs::from("com", "tcgtracker", "TcgTracker") {
        Some(pd) => pd.data_dir().to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Data file `file_name` under `root` and the directory its backups go to.
///
/// The default file backs up into `backups/`; any other file gets
/// `backups/<file stem>/`, so stores sharing a root never rotate each
/// other's backups.
pub fn store_paths(root: &Path, file_name: &str) -> (PathBuf, PathBuf) {
    let file = root.join(file_name);
    let mut backups = root.join(BACKUP_DIR_NAME);
    if file_name != DATA_FILE_NAME {
        if let Some(stem) = Path::new(file_name).file_stem() {
            backups.push(stem);
        }
    }
    (file, backups)
}

pub fn default_store_file() -> (PathBuf, PathBuf) {
    store_paths(&data_root(), DATA_FILE_NAME)
}
