// Fallback for Unix flavours without a dedicated implementation

use std::path::PathBuf;

use log::warn;

use super::Console;

pub const OS_FAMILY: &str = "Unix";
pub const LIBRARY_EXTENSION: &str = ".so";

pub fn current_executable_path() -> Option<PathBuf> {
    warn!("executable path lookup is not implemented for this OS");
    None
}

pub fn prepare_console() -> Console {
    Console::Unmanaged
}

pub fn apply_app_identity(_app_id: &str) -> bool {
    false
}
