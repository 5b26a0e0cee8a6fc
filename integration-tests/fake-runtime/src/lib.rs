//! A tiny embedded runtime exposing the isolate and VM creation ABIs.
//!
//! Every entry point reports what it received on stdout (`ARGC:`, `ARG[i]:`,
//! `VM_OPTION:`, `MAIN_ARGS:`, `MAIN_ARG[i]:` lines) so out-of-process tests
//! can assert on it, and records the same data per thread for in-process
//! tests.

mod isolate;
mod vm;

pub use isolate::{
    failing_create_isolate, graal_create_isolate, last_entry_args, launcher_test_main,
    launcher_test_main_42,
};
pub use vm::{last_vm_session, VmSession, JNI_CreateJavaVM, MAIN_CLASS, NO_MAIN_CLASS};

/// When set, every creation function reports failure.
pub const FAIL_CREATE_ENV: &str = "FAKE_RUNTIME_FAIL_CREATE";
