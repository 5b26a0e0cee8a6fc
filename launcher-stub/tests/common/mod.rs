#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_void, CStr, OsString};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use launcher_stub::args::HostArgs;
use launcher_stub::error::LaunchError;
use launcher_stub::loader::{LibraryLoader, SymbolSource};
use launcher_stub::options::OptionInputs;
use launcher_stub::platform::Console;
use launcher_stub::protocol::LaunchPlan;

pub const LIBRARY_PATH: &str = "/opt/demo/bin/demo-runtime.so";

/// In-memory symbol table standing in for a loaded library.
pub struct FakeLibrary {
    name: String,
    symbols: HashMap<String, NonNull<c_void>>,
}

impl SymbolSource for FakeLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self, symbol: &CStr) -> Result<NonNull<c_void>, String> {
        let symbol = symbol.to_string_lossy();
        self.symbols
            .get(symbol.as_ref())
            .copied()
            .ok_or_else(|| format!("undefined symbol: {symbol}"))
    }
}

#[derive(Default)]
pub struct FakeLoader {
    symbols: HashMap<String, NonNull<c_void>>,
    unloadable: bool,
    opened: RefCell<Vec<PathBuf>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// A loader for which every library is missing.
    pub fn unloadable() -> Self {
        Self {
            unloadable: true,
            ..Self::default()
        }
    }

    pub fn export(mut self, name: &str, address: *const ()) -> Self {
        let address = NonNull::new(address.cast_mut().cast()).expect("exported null address");
        self.symbols.insert(name.to_owned(), address);
        self
    }

    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.borrow().clone()
    }
}

impl LibraryLoader for FakeLoader {
    type Library = FakeLibrary;

    fn open(&self, path: &Path) -> Result<FakeLibrary, LaunchError> {
        self.opened.borrow_mut().push(path.to_path_buf());
        if self.unloadable {
            return Err(LaunchError::Load {
                path: path.to_path_buf(),
                message: "cannot open shared object file: No such file or directory".into(),
            });
        }
        Ok(FakeLibrary {
            name: path.display().to_string(),
            symbols: self.symbols.clone(),
        })
    }
}

pub fn host_args(values: &[&str]) -> HostArgs {
    HostArgs::from_os_args(values.iter().map(OsString::from)).unwrap()
}

pub fn plan<'a>(executable_path: Option<&'a Path>, user_options: &'a [String]) -> LaunchPlan<'a> {
    LaunchPlan {
        library_path: PathBuf::from(LIBRARY_PATH),
        option_inputs: OptionInputs {
            executable_path,
            console: Console::Redirected,
            app_identity: None,
            user_options,
        },
    }
}
