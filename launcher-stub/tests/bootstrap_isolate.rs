mod common;

use std::path::{Path, PathBuf};

use common::{host_args, plan, FakeLoader, LIBRARY_PATH};
use launcher_stub::error::{ErrorCategory, LaunchError};
use launcher_stub::protocol::{bootstrap, IsolateProtocol};

fn loader() -> FakeLoader {
    FakeLoader::new()
        .export("graal_create_isolate", fake_runtime::graal_create_isolate as *const ())
        .export("run_main", fake_runtime::launcher_test_main as *const ())
        .export("run_main_42", fake_runtime::launcher_test_main_42 as *const ())
}

#[test]
fn program_without_arguments_exits_zero() {
    let protocol = IsolateProtocol::new("run_main").unwrap();
    let loader = loader();
    let code = bootstrap(&protocol, &loader, &plan(None, &[]), &mut host_args(&["prog"])).unwrap();
    assert_eq!(code, 0);
    assert_eq!(fake_runtime::last_entry_args().unwrap(), ["prog"]);
    assert_eq!(loader.opened(), [PathBuf::from(LIBRARY_PATH)]);
}

#[test]
fn entry_sees_raw_argv_and_its_code_is_forwarded() {
    let protocol = IsolateProtocol::new("run_main_42").unwrap();
    let mut args = host_args(&["prog", "a", "b"]);
    let code = bootstrap(&protocol, &loader(), &plan(None, &[]), &mut args).unwrap();
    assert_eq!(code, 42);
    assert_eq!(fake_runtime::last_entry_args().unwrap(), ["prog", "a", "b"]);
}

#[test]
fn entry_return_value_becomes_exit_code() {
    let protocol = IsolateProtocol::new("run_main").unwrap();
    let mut args = host_args(&["prog", "exit=3"]);
    let exe = Path::new("/opt/demo/bin/demo");
    let code = bootstrap(&protocol, &loader(), &plan(Some(exe), &[]), &mut args).unwrap();
    assert_eq!(code, 3);
}

#[test]
fn failed_creation_is_an_initialization_error() {
    let loader = FakeLoader::new()
        .export("graal_create_isolate", fake_runtime::failing_create_isolate as *const ())
        .export("run_main", fake_runtime::launcher_test_main as *const ());
    let protocol = IsolateProtocol::new("run_main").unwrap();
    let err = bootstrap(&protocol, &loader, &plan(None, &[]), &mut host_args(&["prog"]))
        .unwrap_err();
    assert!(matches!(err, LaunchError::RuntimeCreation(_)));
    assert_eq!(err.to_string(), "initialization error");
    assert_eq!(err.exit_code(), 1);
    assert!(fake_runtime::last_entry_args().is_none());
}

#[test]
fn missing_entry_symbol_is_named() {
    let protocol = IsolateProtocol::new("run_missing").unwrap();
    let err = bootstrap(&protocol, &loader(), &plan(None, &[]), &mut host_args(&["prog"]))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Symbol);
    assert!(err.to_string().contains("'run_missing'"), "{err}");
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn missing_creation_symbol_is_named() {
    let loader = FakeLoader::new().export("run_main", fake_runtime::launcher_test_main as *const ());
    let protocol = IsolateProtocol::new("run_main").unwrap();
    let err = bootstrap(&protocol, &loader, &plan(None, &[]), &mut host_args(&["prog"]))
        .unwrap_err();
    match err {
        LaunchError::Symbol { symbol, .. } => assert_eq!(symbol, "graal_create_isolate"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unloadable_library_stops_before_symbols() {
    let loader = FakeLoader::unloadable();
    let protocol = IsolateProtocol::new("run_main").unwrap();
    let err = bootstrap(&protocol, &loader, &plan(None, &[]), &mut host_args(&["prog"]))
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Load);
    assert!(err.to_string().contains("No such file or directory"));
    assert_eq!(loader.opened().len(), 1);
}
