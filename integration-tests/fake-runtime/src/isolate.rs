use std::cell::RefCell;
use std::env;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::io::{self, Write};
use std::ptr;

use crate::FAIL_CREATE_ENV;

static ISOLATE: u8 = 0;
static THREAD: u8 = 0;

thread_local! {
    static LAST_ARGS: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Arguments seen by the most recent entry call on this thread.
pub fn last_entry_args() -> Option<Vec<String>> {
    LAST_ARGS.with(|args| args.borrow().clone())
}

/// # Safety
/// `isolate` and `thread` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn graal_create_isolate(
    _params: *mut c_void,
    isolate: *mut *mut c_void,
    thread: *mut *mut c_void,
) -> c_int {
    if env::var_os(FAIL_CREATE_ENV).is_some() {
        return 1;
    }
    if isolate.is_null() || thread.is_null() {
        return 2;
    }
    *isolate = ptr::addr_of!(ISOLATE).cast_mut().cast();
    *thread = ptr::addr_of!(THREAD).cast_mut().cast();
    0
}

/// Creation function that always fails, for in-process tests.
///
/// # Safety
/// Never dereferences its arguments.
#[no_mangle]
pub unsafe extern "C" fn failing_create_isolate(
    _params: *mut c_void,
    _isolate: *mut *mut c_void,
    _thread: *mut *mut c_void,
) -> c_int {
    7
}

/// Echoes argv and exits with the value of an `exit=N` argument, or 0.
///
/// # Safety
/// `argv` must hold `argc` valid C strings.
#[no_mangle]
pub unsafe extern "C" fn launcher_test_main(
    thread: *mut c_void,
    argc: c_int,
    argv: *mut *mut c_char,
) -> c_int {
    match record(thread, argc, argv) {
        Some(args) => args
            .iter()
            .skip(1)
            .find_map(|arg| arg.strip_prefix("exit=")?.parse().ok())
            .unwrap_or(0),
        None => 99,
    }
}

/// Echoes argv and always exits with 42.
///
/// # Safety
/// `argv` must hold `argc` valid C strings.
#[no_mangle]
pub unsafe extern "C" fn launcher_test_main_42(
    thread: *mut c_void,
    argc: c_int,
    argv: *mut *mut c_char,
) -> c_int {
    match record(thread, argc, argv) {
        Some(_) => 42,
        None => 99,
    }
}

unsafe fn record(thread: *mut c_void, argc: c_int, argv: *mut *mut c_char) -> Option<Vec<String>> {
    if thread.is_null() || argv.is_null() {
        eprintln!("entry called without a thread or argv");
        return None;
    }
    let args: Vec<String> = (0..argc.max(0) as usize)
        .map(|i| CStr::from_ptr(*argv.add(i)).to_string_lossy().into_owned())
        .collect();
    if !(*argv.add(args.len())).is_null() {
        eprintln!("argv is not null-terminated");
        return None;
    }

    let mut out = io::stdout().lock();
    let _ = writeln!(out, "ARGC:{argc}");
    for (i, arg) in args.iter().enumerate() {
        let _ = writeln!(out, "ARG[{i}]:{arg}");
    }
    let _ = out.flush();

    LAST_ARGS.with(|last| *last.borrow_mut() = Some(args.clone()));
    Some(args)
}
