// Markboard platform directories
//
// Linux:   $XDG_CONFIG_HOME/markboard, $XDG_DATA_HOME/markboard (XDG defaults otherwise)
// macOS:   ~/Library/Application Support/Markboard for both
// Windows: %APPDATA%\Markboard for both

use std::env;
use std::path::PathBuf;

/// Which kind of per-user directory to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirKind {
    Config,
    Data,
}

#[cfg(target_os = "windows")]
fn base_dir(_kind: DirKind) -> PathBuf {
    let appdata = env::var("APPDATA")
        .unwrap_or_else(|_| String::from("C:\\Users\\Default\\AppData\\Roaming"));
    PathBuf::from(appdata).join("Markboard")
}

#[cfg(target_os = "macos")]
fn base_dir(_kind: DirKind) -> PathBuf {
    home()
        .join("Library")
        .join("Application Support")
        .join("Markboard")
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn base_dir(kind: DirKind) -> PathBuf {
    let (xdg_var, fallback): (&str, &[&str]) = match kind {
        DirKind::Config => ("XDG_CONFIG_HOME", &[".config"]),
        DirKind::Data => ("XDG_DATA_HOME", &[".local", "share"]),
    };
    let root = match env::var(xdg_var) {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => fallback.iter().fold(home(), |path, part| path.join(part)),
    };
    root.join("markboard")
}

#[cfg(not(target_os = "windows"))]
fn home() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
}

/// Directory holding `config.json` and `session.json`.
pub fn get_config_dir() -> PathBuf {
    base_dir(DirKind::Config)
}

/// Directory holding the local database.
pub fn get_data_dir() -> PathBuf {
    base_dir(DirKind::Data)
}

/// Default location of the local backend's database.
pub fn default_db_path() -> PathBuf {
    get_data_dir().join("markboard.db")
}
