//! Host `argv` in the layout native entry points expect: NUL-terminated
//! strings plus a null-terminated pointer array.

use std::ffi::{c_char, c_int, CString, OsString};
use std::ptr;

use crate::error::LaunchError;

pub struct HostArgs {
    owned: Vec<CString>,
    pointers: Vec<*mut c_char>,
}

impl HostArgs {
    pub fn from_os_args<I>(args: I) -> Result<Self, LaunchError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let owned = args
            .into_iter()
            .enumerate()
            .map(|(index, arg)| {
                CString::new(host_bytes(arg)).map_err(|_| {
                    LaunchError::Marshal(format!("argument {index} contains a NUL byte"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        // The heap buffers of `owned` do not move, so the pointers stay valid
        // for the lifetime of `self`.
        let pointers = owned
            .iter()
            .map(|arg| arg.as_ptr().cast_mut())
            .chain(std::iter::once(ptr::null_mut()))
            .collect();
        Ok(Self { owned, pointers })
    }

    pub fn argc(&self) -> c_int {
        self.owned.len() as c_int
    }

    pub fn argv(&mut self) -> *mut *mut c_char {
        self.pointers.as_mut_ptr()
    }

    /// Arguments after the program path.
    pub fn program_args(&self) -> &[CString] {
        self.owned.get(1..).unwrap_or(&[])
    }
}

#[cfg(unix)]
fn host_bytes(arg: OsString) -> Vec<u8> {
    use std::os::unix::ffi::OsStringExt;
    arg.into_vec()
}

#[cfg(windows)]
fn host_bytes(arg: OsString) -> Vec<u8> {
    // UTF-16 command line, handed over as UTF-8
    arg.to_string_lossy().into_owned().into_bytes()
}
