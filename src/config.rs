use std::path::PathBuf;

use crate::db::Database;
use crate::store::DEFAULT_SLOT;

/// Where the tracker keeps its data. Resolved once at startup from the
/// command line (or `PLACEMENT_TRACKER_DB`) with the XDG data dir as fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub slot: String,
}

impl Config {
    pub fn resolve(db_override: Option<PathBuf>) -> Self {
        let db_path = match db_override {
            Some(path) => expand_home(path),
            None => Database::default_path(),
        };
        Self {
            db_path,
            slot: DEFAULT_SLOT.to_string(),
        }
    }
}

// Expand ~ in path
fn expand_home(path: PathBuf) -> PathBuf {
    let Some(s) = path.to_str() else { return path };
    match s.strip_prefix("~/") {
        Some(rest) => match directories::BaseDirs::new() {
            Some(base) => base.home_dir().join(rest),
            None => path,
        },
        None => path,
    }
}
