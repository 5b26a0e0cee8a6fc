//! Dynamic library open/lookup over the native OS loader.
//!
//! The rest of the launcher only sees [`LibraryLoader`] and [`SymbolSource`];
//! raw loader handles never leave this module.

use std::ffi::{c_void, CStr};
use std::mem::{self, ManuallyDrop};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::Library;
use log::debug;

use crate::error::{render_chain, LaunchError};

/// Symbol lookup inside an opened library.
pub trait SymbolSource {
    /// Human readable name used in diagnostics.
    fn name(&self) -> &str;

    /// Address of `symbol`, or the loader's message when it is not exported.
    /// A null address is reported as not found.
    fn symbol(&self, symbol: &CStr) -> Result<NonNull<c_void>, String>;
}

pub trait LibraryLoader {
    type Library: SymbolSource;

    fn open(&self, path: &Path) -> Result<Self::Library, LaunchError>;
}

/// Resolves `symbol` and reinterprets it as the function pointer type `F`.
///
/// # Safety
/// `F` must be a function pointer type matching the exported symbol's ABI.
pub unsafe fn resolve<F: Copy>(source: &dyn SymbolSource, symbol: &CStr) -> Result<F, LaunchError> {
    const { assert!(mem::size_of::<F>() == mem::size_of::<*mut c_void>()) };
    debug!("Looking up symbol: {}", symbol.to_string_lossy());
    let address = source.symbol(symbol).map_err(|message| LaunchError::Symbol {
        symbol: symbol.to_string_lossy().into_owned(),
        library: source.name().to_owned(),
        message,
    })?;
    Ok(mem::transmute_copy::<*mut c_void, F>(&address.as_ptr()))
}

/// Loader backed by the OS (`dlopen` / `LoadLibraryExW`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

/// An opened library. It is never closed: the runtime it hosts keeps running
/// until the process exits, and the OS reclaims the mapping then.
pub struct NativeLibrary {
    library: ManuallyDrop<Library>,
    name: String,
}

impl LibraryLoader for NativeLoader {
    type Library = NativeLibrary;

    fn open(&self, path: &Path) -> Result<NativeLibrary, LaunchError> {
        debug!("Loading library {}", path.display());
        // Initialisers of the runtime library run here.
        let library = unsafe { Library::new(path) }.map_err(|err| LaunchError::Load {
            path: PathBuf::from(path),
            message: render_chain(&err),
        })?;
        Ok(NativeLibrary {
            library: ManuallyDrop::new(library),
            name: path.display().to_string(),
        })
    }
}

impl SymbolSource for NativeLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self, symbol: &CStr) -> Result<NonNull<c_void>, String> {
        let address = unsafe { self.library.get::<*mut c_void>(symbol.to_bytes_with_nul()) }
            .map_err(|err| render_chain(&err))?;
        NonNull::new(*address).ok_or_else(|| "symbol resolved to a null address".into())
    }
}
