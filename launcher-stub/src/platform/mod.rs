// Platform-specific implementations
// Linux reads /proc, macOS uses libc, Windows uses the Win32 API

use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
mod imp;

#[cfg(target_os = "macos")]
#[path = "macos.rs"]
mod imp;

#[cfg(target_os = "windows")]
#[path = "windows.rs"]
mod imp;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
#[path = "unsupported.rs"]
mod imp;

#[cfg(all(target_os = "macos", feature = "ui-main-thread"))]
pub use imp::run_event_loop;
pub use imp::{
    apply_app_identity, current_executable_path, prepare_console, LIBRARY_EXTENSION, OS_FAMILY,
};

/// State of the interactive console after launcher setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    /// A real console is attached and was switched to the UTF-8 code page.
    Utf8,
    /// Streams are piped or redirected; their encoding belongs to the sender.
    Redirected,
    /// The platform has no console code page to manage.
    Unmanaged,
}

pub fn library_file_name(library_name: &str) -> String {
    format!("{library_name}{LIBRARY_EXTENSION}")
}

/// Library next to the executable when its location is known, otherwise the
/// bare file name for the OS search path.
pub fn library_path(library_name: &str, executable_path: Option<&Path>) -> PathBuf {
    let file_name = library_file_name(library_name);
    match executable_path.and_then(Path::parent) {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_sits_next_to_executable() {
        let exe = Path::new("/opt/hello/bin/hello");
        assert_eq!(
            library_path("hello", Some(exe)),
            Path::new("/opt/hello/bin").join(format!("hello{LIBRARY_EXTENSION}"))
        );
    }

    #[test]
    fn unknown_executable_uses_search_path() {
        assert_eq!(
            library_path("hello", None),
            PathBuf::from(format!("hello{LIBRARY_EXTENSION}"))
        );
    }

    #[test]
    fn executable_path_is_absolute() {
        if let Some(path) = current_executable_path() {
            assert!(path.is_absolute(), "{}", path.display());
        }
    }
}
