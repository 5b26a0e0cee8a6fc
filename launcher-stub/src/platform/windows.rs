// Windows: module path, console code pages and taskbar identity via Win32

use std::ffi::{c_void, OsStr, OsString};
use std::iter;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;
use std::ptr;

use log::{debug, warn};

use super::Console;

pub const OS_FAMILY: &str = "Windows";
pub const LIBRARY_EXTENSION: &str = ".dll";

type DWORD = u32;
type BOOL = i32;
type UINT = u32;
type HRESULT = i32;
type HANDLE = *mut c_void;
type HMODULE = *mut c_void;

const STD_OUTPUT_HANDLE: DWORD = 0xFFFF_FFF5;
const CP_UTF8: UINT = 65001;
// Longest path the Unicode APIs accept.
const MAX_LONG_PATH: usize = 32_768;

#[link(name = "kernel32")]
extern "system" {
    fn GetModuleFileNameW(module: HMODULE, filename: *mut u16, size: DWORD) -> DWORD;
    fn GetStdHandle(std_handle: DWORD) -> HANDLE;
    fn GetConsoleMode(console: HANDLE, mode: *mut DWORD) -> BOOL;
    fn SetConsoleOutputCP(code_page: UINT) -> BOOL;
    fn SetConsoleCP(code_page: UINT) -> BOOL;
}

#[link(name = "shell32")]
extern "system" {
    fn SetCurrentProcessExplicitAppUserModelID(app_id: *const u16) -> HRESULT;
}

pub fn current_executable_path() -> Option<PathBuf> {
    let mut capacity = 260;
    loop {
        let mut buf = vec![0u16; capacity];
        let len = unsafe { GetModuleFileNameW(ptr::null_mut(), buf.as_mut_ptr(), capacity as DWORD) }
            as usize;
        if len == 0 {
            return None;
        }
        // A full buffer means the path was truncated.
        if len < capacity {
            buf.truncate(len);
            return Some(PathBuf::from(OsString::from_wide(&buf)));
        }
        if capacity >= MAX_LONG_PATH {
            return None;
        }
        capacity = (capacity * 2).min(MAX_LONG_PATH);
    }
}

/// Switches a real console to UTF-8. Piped streams are left alone because
/// the sender decides their encoding.
pub fn prepare_console() -> Console {
    let mut mode: DWORD = 0;
    let attached = unsafe {
        let stdout = GetStdHandle(STD_OUTPUT_HANDLE);
        GetConsoleMode(stdout, &mut mode) != 0
    };
    if !attached {
        return Console::Redirected;
    }
    unsafe {
        SetConsoleOutputCP(CP_UTF8);
        SetConsoleCP(CP_UTF8);
    }
    debug!("Set console output to UTF-8 (check: Æøåæøå)");
    Console::Utf8
}

/// Keeps taskbar grouping consistent with the launched application.
pub fn apply_app_identity(app_id: &str) -> bool {
    let wide: Vec<u16> = OsStr::new(app_id)
        .encode_wide()
        .chain(iter::once(0))
        .collect();
    let hr = unsafe { SetCurrentProcessExplicitAppUserModelID(wide.as_ptr()) };
    if hr >= 0 {
        debug!("Set Application User Model Id: {app_id}");
        true
    } else {
        warn!("failed to set Application User Model Id {app_id} (HRESULT {hr:#010x})");
        false
    }
}
