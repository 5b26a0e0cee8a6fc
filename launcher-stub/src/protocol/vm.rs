//! Full protocol: create a VM from an option list, then dispatch either
//! through the managed `main(String[])` or through a native entry symbol.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr::{self, NonNull};

use jni_sys::{jint, jvalue, JNIEnv, JavaVM, JavaVMInitArgs, JavaVMOption, JNI_FALSE, JNI_OK};
use log::debug;

use super::isolate::IsolateArgs;
use super::{Protocol, RuntimeContext};
use crate::args::HostArgs;
use crate::error::LaunchError;
use crate::jni::{self, JniEnv, LocalRef};
use crate::loader::{resolve, SymbolSource};
use crate::options::OptionList;

pub const CREATE_VM_SYMBOL: &CStr = c"JNI_CreateJavaVM";

/// Invocation interface version 1.8.
pub const JNI_VERSION: jint = 0x0001_0008;

pub const MAIN_METHOD: &CStr = c"main";
pub const MAIN_SIGNATURE: &CStr = c"([Ljava/lang/String;)V";

pub type CreateJavaVmFn =
    unsafe extern "system" fn(vm: *mut *mut JavaVM, env: *mut *mut c_void, args: *mut c_void) -> jint;

/// Native entry taking the thread's environment as its thread handle.
pub type NativeEntryFn =
    unsafe extern "C" fn(thread: *mut JNIEnv, argc: c_int, argv: *mut *mut c_char) -> c_int;

#[derive(Debug)]
pub enum VmDispatch {
    /// Managed `public static void main(String[])` on a dotted class name.
    Reflection { main_class: String },
    NativeEntry { symbol: CString },
}

#[derive(Debug)]
pub struct VmProtocol {
    dispatch: VmDispatch,
}

#[derive(Clone, Copy)]
pub struct VmSymbols {
    create: CreateJavaVmFn,
    native_entry: Option<NativeEntryFn>,
}

pub type VmRuntime = RuntimeContext<JavaVM, JniEnv>;

pub enum VmArgs<'a> {
    Managed(LocalRef<'a>),
    Native(IsolateArgs<'a>),
}

impl VmProtocol {
    pub fn reflection(main_class: &str) -> Self {
        Self {
            dispatch: VmDispatch::Reflection {
                main_class: main_class.to_owned(),
            },
        }
    }

    pub fn native_entry(symbol: &str) -> Result<Self, LaunchError> {
        let symbol = CString::new(symbol).map_err(|_| {
            LaunchError::Marshal(format!("entry symbol {symbol:?} contains a NUL byte"))
        })?;
        Ok(Self {
            dispatch: VmDispatch::NativeEntry { symbol },
        })
    }

    pub fn dispatch(&self) -> &VmDispatch {
        &self.dispatch
    }

    fn invoke_main(
        &self,
        main_class: &str,
        env: &JniEnv,
        args: &LocalRef<'_>,
    ) -> Result<i32, LaunchError> {
        let binary_name = jni::binary_class_name(main_class)?;
        debug!("Loading class: {}", binary_name.to_string_lossy());
        let class = match env.find_class(&binary_name)? {
            Some(class) => class,
            None => {
                env.describe_and_clear_exception()?;
                return Err(LaunchError::ClassNotFound(
                    binary_name.to_string_lossy().into_owned(),
                ));
            }
        };

        debug!("Looking up method: main([Ljava/lang/String;)V");
        let method = match env.static_method_id(&class, MAIN_METHOD, MAIN_SIGNATURE)? {
            Some(method) => method,
            None => {
                env.describe_and_clear_exception()?;
                return Err(LaunchError::MethodNotFound(main_class.to_owned()));
            }
        };

        debug!("Invoking main method for {main_class}");
        env.call_static_void_method(&class, method, &[jvalue { l: args.as_raw() }])?;
        if env.exception_check()? {
            env.describe_and_clear_exception()?;
            return Err(LaunchError::UncaughtException);
        }
        Ok(0)
    }
}

impl Protocol for VmProtocol {
    const NAME: &'static str = "vm";
    const TAKES_OPTIONS: bool = true;

    type Symbols = VmSymbols;
    type Runtime = VmRuntime;
    type EntryArgs<'a> = VmArgs<'a>;

    fn resolve(&self, library: &dyn SymbolSource) -> Result<VmSymbols, LaunchError> {
        unsafe {
            let create = resolve(library, CREATE_VM_SYMBOL)?;
            let native_entry = match &self.dispatch {
                VmDispatch::NativeEntry { symbol } => Some(resolve(library, symbol)?),
                VmDispatch::Reflection { .. } => None,
            };
            Ok(VmSymbols {
                create,
                native_entry,
            })
        }
    }

    fn create_runtime(
        &self,
        symbols: &VmSymbols,
        options: &OptionList,
    ) -> Result<VmRuntime, LaunchError> {
        // The runtime only reads the strings; they stay owned by `options`.
        let mut vm_options: Vec<JavaVMOption> = options
            .iter()
            .map(|option| JavaVMOption {
                optionString: option.as_ptr().cast_mut(),
                extraInfo: ptr::null_mut(),
            })
            .collect();
        let mut init_args = JavaVMInitArgs {
            version: JNI_VERSION,
            nOptions: vm_options.len() as jint,
            options: vm_options.as_mut_ptr(),
            ignoreUnrecognized: JNI_FALSE,
        };

        debug!("creating VM");
        let mut vm: *mut JavaVM = ptr::null_mut();
        let mut env: *mut c_void = ptr::null_mut();
        let status = unsafe {
            (symbols.create)(
                &mut vm,
                &mut env,
                ptr::addr_of_mut!(init_args).cast::<c_void>(),
            )
        };
        if status != JNI_OK {
            return Err(LaunchError::RuntimeCreation("failed to create runtime"));
        }
        let env = unsafe { JniEnv::from_raw(env.cast::<JNIEnv>()) };
        match (NonNull::new(vm), env) {
            (Some(container), Some(thread)) => Ok(RuntimeContext { container, thread }),
            _ => Err(LaunchError::RuntimeCreation("failed to create runtime")),
        }
    }

    fn marshal_args<'a>(
        &self,
        runtime: &'a VmRuntime,
        args: &'a mut HostArgs,
    ) -> Result<VmArgs<'a>, LaunchError> {
        match self.dispatch {
            VmDispatch::Reflection { .. } => Ok(VmArgs::Managed(jni::to_string_array(
                &runtime.thread,
                args.program_args(),
            )?)),
            VmDispatch::NativeEntry { .. } => Ok(VmArgs::Native(IsolateArgs::borrow(args))),
        }
    }

    fn invoke(
        &self,
        symbols: &VmSymbols,
        runtime: &VmRuntime,
        args: VmArgs<'_>,
    ) -> Result<i32, LaunchError> {
        match (&self.dispatch, args, symbols.native_entry) {
            (VmDispatch::Reflection { main_class }, VmArgs::Managed(array), _) => {
                self.invoke_main(main_class, &runtime.thread, &array)
            }
            (VmDispatch::NativeEntry { symbol }, VmArgs::Native(args), Some(entry)) => {
                debug!("calling {}", symbol.to_string_lossy());
                let (argc, argv) = args.into_raw();
                Ok(unsafe { entry(runtime.thread.as_raw(), argc, argv) })
            }
            _ => Err(LaunchError::Marshal(
                "entry arguments do not match the dispatch mode".into(),
            )),
        }
    }
}
