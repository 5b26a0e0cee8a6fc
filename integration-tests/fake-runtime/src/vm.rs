//! Minimal invocation API: `JNI_CreateJavaVM` plus the handful of table
//! functions a launcher needs to call `main(String[])`.
//!
//! Known classes are `java/lang/String`, [`MAIN_CLASS`] (records its
//! arguments; `throw` raises an exception, `exit=N` exits the process) and
//! [`NO_MAIN_CLASS`] (has no main method). Options `-Dfake.fail=create` and
//! `-Dfake.failStringAt=N` inject failures.

#![allow(non_snake_case)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::env;
use std::ffi::{c_char, c_void, CStr};
use std::io::{self, Write};
use std::mem;
use std::process;
use std::ptr;

use jni_sys::{
    jboolean, jclass, jint, jmethodID, jobject, jobjectArray, jsize, jstring, jvalue, JNIEnv,
    JNINativeInterface_, JavaVM, JavaVMInitArgs, JNI_ERR, JNI_EVERSION, JNI_FALSE, JNI_OK,
    JNI_TRUE,
};

use crate::FAIL_CREATE_ENV;

pub const MAIN_CLASS: &str = "demo/Main";
pub const NO_MAIN_CLASS: &str = "demo/NoMain";
const STRING_CLASS: &str = "java/lang/String";

const EXPECTED_VERSION: jint = 0x0001_0008;
const MAIN_METHOD_ID: usize = 1;

static VM: u8 = 0;

/// What one VM saw between creation and the end of `main`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmSession {
    pub version: jint,
    pub options: Vec<String>,
    pub ignore_unrecognized: bool,
    pub main_args: Option<Vec<String>>,
    /// Exceptions printed through `ExceptionDescribe`.
    pub described: Vec<String>,
    pub strings_created: usize,
    /// Local references not yet deleted.
    pub live_refs: usize,
}

#[derive(Debug)]
enum Object {
    Class(String),
    Str(String),
    Array(Vec<Option<String>>),
}

#[derive(Default)]
struct State {
    objects: HashMap<usize, Object>,
    next_handle: usize,
    pending: Option<String>,
    fail_string_at: Option<usize>,
    session: VmSession,
}

impl State {
    fn new_local(&mut self, object: Object) -> jobject {
        self.next_handle += 1;
        self.objects.insert(self.next_handle, object);
        self.next_handle as jobject
    }

    fn class_name(&self, class: jclass) -> Option<&str> {
        match self.objects.get(&(class as usize)) {
            Some(Object::Class(name)) => Some(name),
            _ => None,
        }
    }
}

// Callers see this as a JNIEnv: the table pointer comes first.
#[repr(C)]
struct FakeEnv {
    functions: *const JNINativeInterface_,
    state: RefCell<State>,
}

thread_local! {
    static LAST_ENV: Cell<*const FakeEnv> = const { Cell::new(ptr::null()) };
}

/// Session of the most recent VM created on this thread.
pub fn last_vm_session() -> Option<VmSession> {
    LAST_ENV.with(|last| {
        let env = last.get();
        if env.is_null() {
            return None;
        }
        let state = unsafe { &*env }.state.borrow();
        let mut session = state.session.clone();
        session.live_refs = state.objects.len();
        Some(session)
    })
}

/// # Safety
/// `args` must point to a `JavaVMInitArgs` whose options are valid C strings.
#[no_mangle]
pub unsafe extern "system" fn JNI_CreateJavaVM(
    vm: *mut *mut JavaVM,
    penv: *mut *mut c_void,
    args: *mut c_void,
) -> jint {
    if vm.is_null() || penv.is_null() || args.is_null() {
        return JNI_ERR;
    }
    let init = &*(args as *const JavaVMInitArgs);
    let options: Vec<String> = (0..init.nOptions.max(0) as usize)
        .map(|i| {
            let option = &*init.options.add(i);
            CStr::from_ptr(option.optionString)
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    {
        let mut out = io::stdout().lock();
        for option in &options {
            let _ = writeln!(out, "VM_OPTION:{option}");
        }
        let _ = out.flush();
    }

    if init.version != EXPECTED_VERSION {
        return JNI_EVERSION;
    }
    if env::var_os(FAIL_CREATE_ENV).is_some()
        || options.iter().any(|option| option == "-Dfake.fail=create")
    {
        return JNI_ERR;
    }

    let fail_string_at = options
        .iter()
        .rev()
        .find_map(|option| option.strip_prefix("-Dfake.failStringAt=")?.parse().ok());
    let state = State {
        fail_string_at,
        session: VmSession {
            version: init.version,
            ignore_unrecognized: init.ignoreUnrecognized != JNI_FALSE,
            options,
            ..VmSession::default()
        },
        ..State::default()
    };
    // One VM per process; it is never destroyed.
    let fake = Box::into_raw(Box::new(FakeEnv {
        functions: function_table(),
        state: RefCell::new(state),
    }));
    LAST_ENV.with(|last| last.set(fake));

    *vm = ptr::addr_of!(VM).cast_mut().cast();
    *penv = fake.cast();
    JNI_OK
}

fn function_table() -> *const JNINativeInterface_ {
    // All entries start out as None.
    let mut table: JNINativeInterface_ = unsafe { mem::zeroed() };
    table.FindClass = Some(find_class);
    table.ExceptionDescribe = Some(exception_describe);
    table.ExceptionClear = Some(exception_clear);
    table.DeleteLocalRef = Some(delete_local_ref);
    table.GetStaticMethodID = Some(get_static_method_id);
    table.CallStaticVoidMethodA = Some(call_static_void_method_a);
    table.NewStringUTF = Some(new_string_utf);
    table.NewObjectArray = Some(new_object_array);
    table.SetObjectArrayElement = Some(set_object_array_element);
    table.ExceptionCheck = Some(exception_check);
    Box::leak(Box::new(table))
}

unsafe fn state<'a>(env: *mut JNIEnv) -> &'a RefCell<State> {
    &(*(env as *const FakeEnv)).state
}

unsafe fn text(value: *const c_char) -> String {
    CStr::from_ptr(value).to_string_lossy().into_owned()
}

unsafe extern "system" fn find_class(env: *mut JNIEnv, name: *const c_char) -> jclass {
    let name = text(name);
    let mut state = state(env).borrow_mut();
    match name.as_str() {
        STRING_CLASS | MAIN_CLASS | NO_MAIN_CLASS => state.new_local(Object::Class(name)),
        _ => {
            state.pending = Some(format!("java.lang.NoClassDefFoundError: {name}"));
            ptr::null_mut()
        }
    }
}

unsafe extern "system" fn get_static_method_id(
    env: *mut JNIEnv,
    class: jclass,
    name: *const c_char,
    sig: *const c_char,
) -> jmethodID {
    let (name, sig) = (text(name), text(sig));
    let mut state = state(env).borrow_mut();
    let found = state.class_name(class) == Some(MAIN_CLASS)
        && name == "main"
        && sig == "([Ljava/lang/String;)V";
    if found {
        MAIN_METHOD_ID as jmethodID
    } else {
        state.pending = Some(format!("java.lang.NoSuchMethodError: {name}{sig}"));
        ptr::null_mut()
    }
}

unsafe extern "system" fn call_static_void_method_a(
    env: *mut JNIEnv,
    _class: jclass,
    method: jmethodID,
    args: *const jvalue,
) {
    let cell = state(env);
    let main_args: Vec<String> = {
        let mut state = cell.borrow_mut();
        if method as usize != MAIN_METHOD_ID || args.is_null() {
            state.pending = Some("java.lang.IllegalArgumentException: bad invocation".into());
            return;
        }
        match state.objects.get(&((*args).l as usize)) {
            Some(Object::Array(items)) => items
                .iter()
                .map(|item| item.clone().unwrap_or_default())
                .collect(),
            _ => {
                state.pending = Some("java.lang.NullPointerException: args".into());
                return;
            }
        }
    };

    {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "MAIN_ARGS:{}", main_args.len());
        for (i, arg) in main_args.iter().enumerate() {
            let _ = writeln!(out, "MAIN_ARG[{i}]:{arg}");
        }
        let _ = out.flush();
    }
    if let Some(code) = main_args
        .iter()
        .find_map(|arg| arg.strip_prefix("exit=")?.parse::<i32>().ok())
    {
        process::exit(code);
    }

    let mut state = cell.borrow_mut();
    if main_args.iter().any(|arg| arg == "throw") {
        state.pending = Some("java.lang.IllegalStateException: requested by argument".into());
    }
    state.session.main_args = Some(main_args);
}

unsafe extern "system" fn new_string_utf(env: *mut JNIEnv, utf: *const c_char) -> jstring {
    let mut state = state(env).borrow_mut();
    if state.fail_string_at == Some(state.session.strings_created) {
        state.pending = Some("java.lang.OutOfMemoryError".into());
        return ptr::null_mut();
    }
    state.session.strings_created += 1;
    state.new_local(Object::Str(text(utf)))
}

unsafe extern "system" fn new_object_array(
    env: *mut JNIEnv,
    len: jsize,
    class: jclass,
    _init: jobject,
) -> jobjectArray {
    let mut state = state(env).borrow_mut();
    if len < 0 || state.class_name(class).is_none() {
        state.pending = Some("java.lang.NegativeArraySizeException".into());
        return ptr::null_mut();
    }
    state.new_local(Object::Array(vec![None; len as usize]))
}

unsafe extern "system" fn set_object_array_element(
    env: *mut JNIEnv,
    array: jobjectArray,
    index: jsize,
    value: jobject,
) {
    let mut guard = state(env).borrow_mut();
    let state = &mut *guard;
    let value = match state.objects.get(&(value as usize)) {
        Some(Object::Str(value)) => Some(value.clone()),
        _ => None,
    };
    match state.objects.get_mut(&(array as usize)) {
        Some(Object::Array(items)) if index >= 0 && (index as usize) < items.len() => {
            items[index as usize] = value;
        }
        _ => state.pending = Some(format!("java.lang.ArrayIndexOutOfBoundsException: {index}")),
    }
}

unsafe extern "system" fn exception_check(env: *mut JNIEnv) -> jboolean {
    if state(env).borrow().pending.is_some() {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

unsafe extern "system" fn exception_describe(env: *mut JNIEnv) {
    let mut state = state(env).borrow_mut();
    if let Some(pending) = state.pending.clone() {
        eprintln!("Exception in thread \"main\" {pending}");
        state.session.described.push(pending);
    }
}

unsafe extern "system" fn exception_clear(env: *mut JNIEnv) {
    state(env).borrow_mut().pending = None;
}

unsafe extern "system" fn delete_local_ref(env: *mut JNIEnv, obj: jobject) {
    state(env).borrow_mut().objects.remove(&(obj as usize));
}
