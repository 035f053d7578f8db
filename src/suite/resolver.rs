//! Tool lookup across candidate directories
//!
//! Executable-suffix handling (`.exe` and friends from `PATHEXT` on
//! Windows) is delegated to the `which` crate.

use std::path::{Path, PathBuf};

/// Find `name` in `search_dirs`, in order
///
/// Returns `None` when nothing matches; whether that is fatal is for the
/// caller to decide.
pub fn find(name: &str, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    // Names that already carry a directory are checked as given
    if Path::new(name).components().count() > 1 {
        let cwd = std::env::current_dir().ok()?;
        return which::which_in(name, None::<&str>, cwd).ok();
    }

    let dirs: Vec<&PathBuf> = search_dirs.iter().filter(|d| d.is_dir()).collect();
    if dirs.is_empty() {
        return None;
    }
    let joined = std::env::join_paths(dirs).ok()?;
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    match which::which_in(name, Some(joined), cwd) {
        Ok(path) => {
            tracing::debug!("Resolved tool '{}' to {}", name, path.display());
            Some(path)
        }
        Err(_) => None,
    }
}

/// The directories from `PATH`, used after the configured tool directories
pub fn path_dirs() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default()
}
