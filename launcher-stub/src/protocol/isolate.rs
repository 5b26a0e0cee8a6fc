//! Lightweight protocol: create an isolate, then call a native entry point
//! with the untouched host `argv`.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use log::debug;

use super::{Protocol, RuntimeContext};
use crate::args::HostArgs;
use crate::error::LaunchError;
use crate::loader::{resolve, SymbolSource};
use crate::options::OptionList;

pub const CREATE_ISOLATE_SYMBOL: &CStr = c"graal_create_isolate";

pub type CreateIsolateFn = unsafe extern "C" fn(
    params: *mut c_void,
    isolate: *mut *mut c_void,
    thread: *mut *mut c_void,
) -> c_int;

pub type EntryFn =
    unsafe extern "C" fn(thread: *mut c_void, argc: c_int, argv: *mut *mut c_char) -> c_int;

#[derive(Debug)]
pub struct IsolateProtocol {
    entry_symbol: CString,
}

#[derive(Clone, Copy)]
pub struct IsolateSymbols {
    create: CreateIsolateFn,
    entry: EntryFn,
}

pub type IsolateRuntime = RuntimeContext<c_void, NonNull<c_void>>;

/// `argc`/`argv` borrowed from the host arguments for one entry call.
pub struct IsolateArgs<'a> {
    argc: c_int,
    argv: *mut *mut c_char,
    _host: PhantomData<&'a mut HostArgs>,
}

impl<'a> IsolateArgs<'a> {
    pub fn borrow(args: &'a mut HostArgs) -> Self {
        Self {
            argc: args.argc(),
            argv: args.argv(),
            _host: PhantomData,
        }
    }

    pub fn into_raw(self) -> (c_int, *mut *mut c_char) {
        (self.argc, self.argv)
    }
}

impl IsolateProtocol {
    pub fn new(entry_symbol: &str) -> Result<Self, LaunchError> {
        let entry_symbol = CString::new(entry_symbol).map_err(|_| {
            LaunchError::Marshal(format!("entry symbol {entry_symbol:?} contains a NUL byte"))
        })?;
        Ok(Self { entry_symbol })
    }

    pub fn entry_symbol(&self) -> &CStr {
        &self.entry_symbol
    }
}

impl Protocol for IsolateProtocol {
    const NAME: &'static str = "isolate";
    const TAKES_OPTIONS: bool = false;

    type Symbols = IsolateSymbols;
    type Runtime = IsolateRuntime;
    type EntryArgs<'a> = IsolateArgs<'a>;

    fn resolve(&self, library: &dyn SymbolSource) -> Result<IsolateSymbols, LaunchError> {
        unsafe {
            Ok(IsolateSymbols {
                create: resolve(library, CREATE_ISOLATE_SYMBOL)?,
                entry: resolve(library, &self.entry_symbol)?,
            })
        }
    }

    fn create_runtime(
        &self,
        symbols: &IsolateSymbols,
        _options: &OptionList,
    ) -> Result<IsolateRuntime, LaunchError> {
        debug!("creating isolate thread");
        let mut isolate = ptr::null_mut();
        let mut thread = ptr::null_mut();
        let status = unsafe { (symbols.create)(ptr::null_mut(), &mut isolate, &mut thread) };
        if status != 0 {
            return Err(LaunchError::RuntimeCreation("initialization error"));
        }
        match (NonNull::new(isolate), NonNull::new(thread)) {
            (Some(container), Some(thread)) => Ok(RuntimeContext { container, thread }),
            _ => Err(LaunchError::RuntimeCreation("initialization error")),
        }
    }

    fn marshal_args<'a>(
        &self,
        _runtime: &'a IsolateRuntime,
        args: &'a mut HostArgs,
    ) -> Result<IsolateArgs<'a>, LaunchError> {
        Ok(IsolateArgs::borrow(args))
    }

    fn invoke(
        &self,
        symbols: &IsolateSymbols,
        runtime: &IsolateRuntime,
        args: IsolateArgs<'_>,
    ) -> Result<i32, LaunchError> {
        debug!("calling {}", self.entry_symbol.to_string_lossy());
        let (argc, argv) = args.into_raw();
        Ok(unsafe { (symbols.entry)(runtime.thread.as_ptr(), argc, argv) })
    }
}
