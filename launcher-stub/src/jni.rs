//! Thin wrapper over the invocation-interface function table.
//!
//! Every table entry is optional in the C layout; a missing entry is reported
//! as [`LaunchError::MissingRuntimeFunction`] instead of being called.

use std::ffi::{CStr, CString};
use std::ptr::{self, NonNull};

use jni_sys::{jmethodID, jobject, jsize, jvalue, JNIEnv, JNI_FALSE};
use log::debug;

use crate::error::LaunchError;

macro_rules! jni_fn {
    ($env:expr, $name:ident) => {
        (**$env.raw.as_ptr())
            .$name
            .ok_or(LaunchError::MissingRuntimeFunction(stringify!($name)))?
    };
}

/// The calling thread's attachment to a created VM.
pub struct JniEnv {
    raw: NonNull<JNIEnv>,
}

impl JniEnv {
    /// # Safety
    /// `raw` must be the environment pointer the runtime returned for the
    /// current thread, valid for the lifetime of the wrapper.
    pub unsafe fn from_raw(raw: *mut JNIEnv) -> Option<Self> {
        let raw = NonNull::new(raw)?;
        if (*raw.as_ptr()).is_null() {
            return None;
        }
        Some(Self { raw })
    }

    pub fn as_raw(&self) -> *mut JNIEnv {
        self.raw.as_ptr()
    }

    /// Looks up a class by binary (slash-separated) name.
    pub fn find_class(&self, binary_name: &CStr) -> Result<Option<LocalRef<'_>>, LaunchError> {
        let class = unsafe {
            let find_class = jni_fn!(self, FindClass);
            find_class(self.as_raw(), binary_name.as_ptr())
        };
        Ok(self.local(class))
    }

    pub fn static_method_id(
        &self,
        class: &LocalRef<'_>,
        name: &CStr,
        signature: &CStr,
    ) -> Result<Option<jmethodID>, LaunchError> {
        let method = unsafe {
            let get_static_method_id = jni_fn!(self, GetStaticMethodID);
            get_static_method_id(self.as_raw(), class.as_raw(), name.as_ptr(), signature.as_ptr())
        };
        Ok((!method.is_null()).then_some(method))
    }

    pub fn new_string_utf(&self, value: &CStr) -> Result<Option<LocalRef<'_>>, LaunchError> {
        let string = unsafe {
            let new_string_utf = jni_fn!(self, NewStringUTF);
            new_string_utf(self.as_raw(), value.as_ptr())
        };
        Ok(self.local(string))
    }

    pub fn new_object_array(
        &self,
        length: jsize,
        element_class: &LocalRef<'_>,
    ) -> Result<Option<LocalRef<'_>>, LaunchError> {
        let array = unsafe {
            let new_object_array = jni_fn!(self, NewObjectArray);
            new_object_array(self.as_raw(), length, element_class.as_raw(), ptr::null_mut())
        };
        Ok(self.local(array))
    }

    pub fn set_object_array_element(
        &self,
        array: &LocalRef<'_>,
        index: jsize,
        value: &LocalRef<'_>,
    ) -> Result<(), LaunchError> {
        unsafe {
            let set_object_array_element = jni_fn!(self, SetObjectArrayElement);
            set_object_array_element(self.as_raw(), array.as_raw(), index, value.as_raw());
        }
        Ok(())
    }

    pub fn call_static_void_method(
        &self,
        class: &LocalRef<'_>,
        method: jmethodID,
        args: &[jvalue],
    ) -> Result<(), LaunchError> {
        unsafe {
            let call = jni_fn!(self, CallStaticVoidMethodA);
            call(self.as_raw(), class.as_raw(), method, args.as_ptr());
        }
        Ok(())
    }

    pub fn exception_check(&self) -> Result<bool, LaunchError> {
        let pending = unsafe {
            let exception_check = jni_fn!(self, ExceptionCheck);
            exception_check(self.as_raw())
        };
        Ok(pending != JNI_FALSE)
    }

    /// Prints a pending exception to the runtime's error stream and clears
    /// it. Returns whether one was pending.
    pub fn describe_and_clear_exception(&self) -> Result<bool, LaunchError> {
        if !self.exception_check()? {
            return Ok(false);
        }
        unsafe {
            let describe = jni_fn!(self, ExceptionDescribe);
            let clear = jni_fn!(self, ExceptionClear);
            describe(self.as_raw());
            clear(self.as_raw());
        }
        Ok(true)
    }

    fn local(&self, obj: jobject) -> Option<LocalRef<'_>> {
        (!obj.is_null()).then_some(LocalRef { env: self, obj })
    }

    fn delete_local_ref(&self, obj: jobject) {
        unsafe {
            if let Some(delete_local_ref) = (**self.raw.as_ptr()).DeleteLocalRef {
                delete_local_ref(self.as_raw(), obj);
            }
        }
    }
}

/// A local reference released when the guard goes out of scope.
pub struct LocalRef<'env> {
    env: &'env JniEnv,
    obj: jobject,
}

impl LocalRef<'_> {
    pub fn as_raw(&self) -> jobject {
        self.obj
    }
}

impl Drop for LocalRef<'_> {
    fn drop(&mut self) {
        self.env.delete_local_ref(self.obj);
    }
}

/// Dotted class name to the binary form `FindClass` expects.
pub fn binary_class_name(dotted: &str) -> Result<CString, LaunchError> {
    CString::new(dotted.replace('.', "/"))
        .map_err(|_| LaunchError::Marshal(format!("class name {dotted:?} contains a NUL byte")))
}

/// Builds a `String[]` holding `args`. Either every element is stored or the
/// array is dropped and an error names the failing index.
pub fn to_string_array<'env>(
    env: &'env JniEnv,
    args: &[CString],
) -> Result<LocalRef<'env>, LaunchError> {
    let string_class = env
        .find_class(c"java/lang/String")?
        .ok_or_else(|| LaunchError::Marshal("failed to find java/lang/String class".into()))?;
    let length = jsize::try_from(args.len())
        .map_err(|_| LaunchError::Marshal(format!("too many arguments ({})", args.len())))?;
    let array = env
        .new_object_array(length, &string_class)?
        .ok_or_else(|| LaunchError::Marshal("failed to create String array".into()))?;

    debug!("Creating Java args[{length}]");
    for (index, arg) in args.iter().enumerate() {
        debug!("  args[{index}]={}", arg.to_string_lossy());
        let value = env.new_string_utf(arg)?.ok_or_else(|| {
            LaunchError::Marshal(format!("failed to create string for argument {index}"))
        })?;
        env.set_object_array_element(&array, index as jsize, &value)?;
        if env.describe_and_clear_exception()? {
            return Err(LaunchError::Marshal(format!(
                "failed to store argument {index}"
            )));
        }
    }
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_names_become_binary_names() {
        assert_eq!(
            binary_class_name("us.hebi.samples.Hello").unwrap().as_bytes(),
            b"us/hebi/samples/Hello"
        );
        assert_eq!(binary_class_name("Main").unwrap().as_bytes(), b"Main");
    }

    #[test]
    fn null_environment_is_rejected() {
        assert!(unsafe { JniEnv::from_raw(ptr::null_mut()) }.is_none());
        let mut table: *const jni_sys::JNINativeInterface_ = ptr::null();
        assert!(unsafe { JniEnv::from_raw(&mut table) }.is_none());
    }
}
