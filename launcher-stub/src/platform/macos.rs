// macOS: dyld reports the executable path, realpath makes it canonical

use std::ffi::{CStr, OsStr};
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use super::Console;

pub const OS_FAMILY: &str = "macOS";
pub const LIBRARY_EXTENSION: &str = ".dylib";

pub fn current_executable_path() -> Option<PathBuf> {
    let mut size = libc::PATH_MAX as u32;
    let mut buf = vec![0u8; size as usize];
    let mut rc = unsafe { libc::_NSGetExecutablePath(buf.as_mut_ptr().cast(), &mut size) };
    if rc != 0 {
        // size now holds the required length
        buf.resize(size as usize, 0);
        rc = unsafe { libc::_NSGetExecutablePath(buf.as_mut_ptr().cast(), &mut size) };
    }
    if rc != 0 {
        return None;
    }
    let raw = CStr::from_bytes_until_nul(&buf).ok()?;
    // May contain symlinks and ../ segments.
    fs::canonicalize(Path::new(OsStr::from_bytes(raw.to_bytes()))).ok()
}

pub fn prepare_console() -> Console {
    Console::Unmanaged
}

pub fn apply_app_identity(_app_id: &str) -> bool {
    false
}

#[cfg(feature = "ui-main-thread")]
#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFRunLoopRun();
}

/// Services the main run loop (and with it the main dispatch queue) for the
/// rest of the process lifetime.
#[cfg(feature = "ui-main-thread")]
pub fn run_event_loop() {
    unsafe { CFRunLoopRun() }
}
