// Linux: the executable path comes from the /proc/self/exe link

use std::fs;
use std::path::PathBuf;

use super::Console;

pub const OS_FAMILY: &str = "Linux";
pub const LIBRARY_EXTENSION: &str = ".so";

pub fn current_executable_path() -> Option<PathBuf> {
    fs::canonicalize("/proc/self/exe").ok()
}

pub fn prepare_console() -> Console {
    Console::Unmanaged
}

pub fn apply_app_identity(_app_id: &str) -> bool {
    false
}
