//! Test runner for launcher-stub
//!
//! This test runner validates finalized launchers end to end by:
//! 1. Finalizing the isolate and VM templates with finalize-launcher
//! 2. Placing each launcher next to a copy of the fake runtime library
//! 3. Running the launchers and checking exit codes, stdout and stderr
//!
//! Usage: test-runner --isolate-template <path> --vm-template <path>
//!                    --finalizer <path> --runtime <path> [--work-dir <dir>]
//!
//! The templates are `launcher-stub` built with the default features and
//! with `--no-default-features --features vm`; the runtime is the fake-runtime
//! cdylib.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;

/// Executable extension
#[cfg(windows)]
const EXE_EXT: &str = ".exe";
#[cfg(not(windows))]
const EXE_EXT: &str = "";

/// Extension the launcher appends to its library name
#[cfg(windows)]
const LIB_EXT: &str = ".dll";
#[cfg(target_os = "macos")]
const LIB_EXT: &str = ".dylib";
#[cfg(not(any(windows, target_os = "macos")))]
const LIB_EXT: &str = ".so";

/// Library name written into every launcher
const LIBRARY_NAME: &str = "fake_runtime";

/// Environment variable that makes the fake runtime refuse creation
const FAIL_CREATE_ENV: &str = "FAKE_RUNTIME_FAIL_CREATE";

/// Test configuration
#[derive(Debug)]
struct TestConfig {
    /// launcher-stub built with the isolate protocol
    isolate_template: PathBuf,
    /// launcher-stub built with the VM protocol
    vm_template: PathBuf,
    /// Path to the finalize-launcher binary
    finalizer_path: PathBuf,
    /// Fake runtime shared library
    runtime_path: PathBuf,
    /// Working directory for test artifacts
    work_dir: PathBuf,
}

#[derive(Clone, Copy)]
enum Template {
    Isolate,
    Vm,
}

/// Captured result of one launcher run
struct RunOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl RunOutput {
    fn expect_exit(&self, expected: i32) -> Result<()> {
        ensure!(
            self.exit_code == expected,
            "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
            self.exit_code,
            self.stdout,
            self.stderr
        );
        Ok(())
    }

    fn expect_stdout(&self, needle: &str) -> Result<()> {
        ensure!(
            self.stdout.contains(needle),
            "stdout does not contain {needle:?}:\n{}",
            self.stdout
        );
        Ok(())
    }

    fn expect_stderr(&self, needle: &str) -> Result<()> {
        ensure!(
            self.stderr.contains(needle),
            "stderr does not contain {needle:?}:\n{}",
            self.stderr
        );
        Ok(())
    }

    /// Options the fake runtime received, in order
    fn vm_options(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .filter_map(|line| line.strip_prefix("VM_OPTION:"))
            .collect()
    }
}

/// End-to-end tests for finalized launcher-stub binaries
#[derive(Parser, Debug)]
#[command(name = "test-runner")]
struct Cli {
    /// launcher-stub built with the isolate protocol
    #[arg(long)]
    isolate_template: PathBuf,

    /// launcher-stub built with the VM protocol
    #[arg(long)]
    vm_template: PathBuf,

    /// Path to finalize-launcher binary
    #[arg(long)]
    finalizer: PathBuf,

    /// Path to the fake-runtime shared library
    #[arg(long)]
    runtime: PathBuf,

    /// Working directory for test artifacts (default: temp dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

impl TestConfig {
    fn from_args() -> Result<Self> {
        Self::from_cli(Cli::parse())
    }

    /// Resolves every path up front; a bare name handed to `Command::new`
    /// would otherwise be looked up on `PATH`.
    fn from_cli(cli: Cli) -> Result<Self> {
        let existing = |what: &str, path: PathBuf| -> Result<PathBuf> {
            ensure!(path.exists(), "{what} not found: {}", path.display());
            fs::canonicalize(&path)
                .with_context(|| format!("Failed to resolve {}", path.display()))
        };

        let work_dir = match cli.work_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => env::current_dir()
                .context("Failed to read current directory")?
                .join(dir),
            None => env::temp_dir().join("launcher-stub-tests"),
        };

        Ok(Self {
            isolate_template: existing("Isolate template", cli.isolate_template)?,
            vm_template: existing("VM template", cli.vm_template)?,
            finalizer_path: existing("Finalizer", cli.finalizer)?,
            runtime_path: existing("Runtime", cli.runtime)?,
            work_dir,
        })
    }

    fn template(&self, template: Template) -> &Path {
        match template {
            Template::Isolate => &self.isolate_template,
            Template::Vm => &self.vm_template,
        }
    }

    /// Fresh directory for one test, optionally holding the runtime library
    fn test_dir(&self, name: &str, with_runtime: bool) -> Result<PathBuf> {
        let dir = self.work_dir.join(name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create test dir {}", dir.display()))?;
        if with_runtime {
            let library = dir.join(format!("{LIBRARY_NAME}{LIB_EXT}"));
            fs::copy(&self.runtime_path, &library)
                .with_context(|| format!("Failed to copy runtime to {}", library.display()))?;
        }
        Ok(dir)
    }
}

/// Finalize a launcher into `dir` and return its path
fn finalize_launcher(
    config: &TestConfig,
    template: Template,
    dir: &Path,
    name: &str,
    settings: &[&str],
) -> Result<PathBuf> {
    let output_path = dir.join(format!("{name}{EXE_EXT}"));
    let output = Command::new(&config.finalizer_path)
        .arg("--template")
        .arg(config.template(template))
        .arg("--output")
        .arg(&output_path)
        .arg("--library")
        .arg(LIBRARY_NAME)
        .args(settings)
        .output()
        .context("Failed to run finalizer")?;

    if !output.status.success() {
        bail!("Finalizer failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(output_path)
}

/// Run a launcher and capture its output
fn run_launcher(path: &Path, args: &[&str], envs: &[(&str, &str)]) -> Result<RunOutput> {
    let mut cmd = Command::new(path);
    cmd.args(args).env_remove(FAIL_CREATE_ENV);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let output = cmd
        .output()
        .with_context(|| format!("Failed to run {}", path.display()))?;

    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Test: an unpatched template refuses to run
fn test_unfinalized_template(config: &TestConfig) -> Result<()> {
    let run = run_launcher(&config.isolate_template, &[], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("[ERROR]")?;
    run.expect_stderr("template")
}

/// Test: isolate entry returning 0 for a bare invocation
fn test_isolate_exit_zero(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("isolate_exit_zero", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Isolate,
        &dir,
        "hello",
        &["--entry-symbol", "launcher_test_main"],
    )?;
    let run = run_launcher(&launcher, &[], &[])?;
    run.expect_exit(0)?;
    run.expect_stdout("ARGC:1")?;
    ensure!(run.stderr.is_empty(), "unexpected stderr: {}", run.stderr);
    ensure!(!run.stdout.contains("[DEBUG]"), "debug trace without --debug");
    Ok(())
}

/// Test: isolate entry sees the untouched argv and its code is forwarded
fn test_isolate_exit_code_and_argv(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("isolate_exit_42", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Isolate,
        &dir,
        "answer",
        &["--entry-symbol", "launcher_test_main_42"],
    )?;
    let run = run_launcher(&launcher, &["a", "b"], &[])?;
    run.expect_exit(42)?;
    run.expect_stdout("ARGC:3")?;
    run.expect_stdout("ARG[1]:a")?;
    run.expect_stdout("ARG[2]:b")
}

/// Test: missing library is reported with the OS message
fn test_missing_library(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("missing_library", false)?;
    let launcher = finalize_launcher(
        config,
        Template::Isolate,
        &dir,
        "orphan",
        &["--entry-symbol", "launcher_test_main"],
    )?;
    let run = run_launcher(&launcher, &[], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("[ERROR] unable to load library")?;
    run.expect_stderr(&format!("{LIBRARY_NAME}{LIB_EXT}"))
}

/// Test: missing entry export is named
fn test_missing_symbol(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("missing_symbol", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Isolate,
        &dir,
        "nosym",
        &["--entry-symbol", "no_such_entry"],
    )?;
    let run = run_launcher(&launcher, &[], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("no_such_entry")
}

/// Test: isolate creation failure
fn test_isolate_creation_failure(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("isolate_creation_failure", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Isolate,
        &dir,
        "broken",
        &["--entry-symbol", "launcher_test_main"],
    )?;
    let run = run_launcher(&launcher, &[], &[(FAIL_CREATE_ENV, "1")])?;
    run.expect_exit(1)?;
    run.expect_stderr("[ERROR] initialization error")?;
    ensure!(!run.stdout.contains("ARGC:"), "entry point ran after failed creation");
    Ok(())
}

/// Test: debug flag enables the stdout trace
fn test_debug_trace(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("debug_trace", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Isolate,
        &dir,
        "traced",
        &["--entry-symbol", "launcher_test_main", "--debug"],
    )?;
    let run = run_launcher(&launcher, &[], &[])?;
    run.expect_exit(0)?;
    run.expect_stdout("[DEBUG] Running on ")?;
    run.expect_stdout("[DEBUG] Looking up symbol: launcher_test_main")
}

/// Test: VM main receives the arguments without the program path
fn test_vm_main_args(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_main_args", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-hello",
        &["--main-class", "demo.Main"],
    )?;
    let run = run_launcher(&launcher, &["a", "b"], &[])?;
    run.expect_exit(0)?;
    run.expect_stdout("MAIN_ARGS:2")?;
    run.expect_stdout("MAIN_ARG[0]:a")?;
    run.expect_stdout("MAIN_ARG[1]:b")
}

/// Test: exit status declared by the program is forwarded
fn test_vm_program_exit(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_program_exit", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-exit",
        &["--main-class", "demo.Main"],
    )?;
    let run = run_launcher(&launcher, &["exit=42"], &[])?;
    run.expect_exit(42)
}

/// Test: uncaught exception maps to exit code 1
fn test_vm_exception(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_exception", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-throw",
        &["--main-class", "demo.Main"],
    )?;
    let run = run_launcher(&launcher, &["throw"], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("Exception in thread \"main\"")?;
    run.expect_stderr("[ERROR] exception occurred during main method execution")
}

/// Test: class and method lookups fail with distinct diagnostics
fn test_vm_dispatch_errors(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_dispatch_errors", true)?;
    let missing = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-missing",
        &["--main-class", "demo.Missing"],
    )?;
    let run = run_launcher(&missing, &[], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("[ERROR] failed to find main class: demo/Missing")?;

    let no_main = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-nomain",
        &["--main-class", "demo.NoMain"],
    )?;
    let run = run_launcher(&no_main, &[], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("[ERROR] failed to find main method in demo.NoMain")
}

/// Test: option order is fixed and reproducible
fn test_vm_option_order(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_option_order", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-options",
        &[
            "--main-class",
            "demo.Main",
            "--vm-option=-Xmx64m",
            "--vm-option=-Dapp.mode=cli",
            "--vm-option=-Xmx128m",
        ],
    )?;
    let first = run_launcher(&launcher, &[], &[])?;
    let second = run_launcher(&launcher, &[], &[])?;
    first.expect_exit(0)?;
    second.expect_exit(0)?;

    let options = first.vm_options();
    ensure!(
        options == second.vm_options(),
        "option order differs between runs: {options:?} vs {:?}",
        second.vm_options()
    );
    let launcher_name = format!("vm-options{EXE_EXT}");
    ensure!(
        options.first().is_some_and(|o| o.starts_with("-Dlauncher.executablePath=")
            && o.ends_with(&launcher_name)),
        "executable path option missing or not first: {options:?}"
    );
    ensure!(
        options.ends_with(&["-Xmx64m", "-Dapp.mode=cli", "-Xmx128m"]),
        "user options not last or reordered: {options:?}"
    );
    ensure!(
        options.contains(&"-Dfile.encoding=UTF-8") && options.contains(&"-Dstdout.encoding=UTF-8"),
        "encoding options missing: {options:?}"
    );
    // stdout is a pipe here, so no console was switched to UTF-8
    ensure!(
        !options.iter().any(|o| o.starts_with("-Dstdin.encoding")),
        "stdin encoding forced for piped input: {options:?}"
    );
    Ok(())
}

/// Test: VM creation failure
fn test_vm_creation_failure(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_creation_failure", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-broken",
        &["--main-class", "demo.Main", "--vm-option=-Dfake.fail=create"],
    )?;
    let run = run_launcher(&launcher, &[], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("[ERROR] failed to create runtime")
}

/// Test: argument marshaling failure names the index and skips main
fn test_vm_string_failure(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_string_failure", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-strings",
        &["--main-class", "demo.Main", "--vm-option=-Dfake.failStringAt=1"],
    )?;
    let run = run_launcher(&launcher, &["a", "b"], &[])?;
    run.expect_exit(1)?;
    run.expect_stderr("[ERROR] failed to create string for argument 1")?;
    ensure!(!run.stdout.contains("MAIN_ARGS:"), "main ran with a partial array");
    Ok(())
}

/// Test: VM build dispatching through a native entry symbol
fn test_vm_native_entry(config: &TestConfig) -> Result<()> {
    let dir = config.test_dir("vm_native_entry", true)?;
    let launcher = finalize_launcher(
        config,
        Template::Vm,
        &dir,
        "vm-native",
        &["--entry-symbol", "launcher_test_main_42"],
    )?;
    let run = run_launcher(&launcher, &["a", "b"], &[])?;
    run.expect_exit(42)?;
    run.expect_stdout("ARGC:3")?;
    ensure!(!run.stdout.contains("MAIN_ARGS:"), "reflection dispatch used");
    Ok(())
}

fn main() -> ExitCode {
    println!("=== Launcher Stub Test Suite ===");
    println!();

    let config = match TestConfig::from_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!("Use --help for usage information");
            return ExitCode::from(1);
        }
    };

    // Clean and recreate work directory
    if config.work_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&config.work_dir) {
            eprintln!("Warning: Failed to clean work dir: {e}");
        }
    }
    if let Err(e) = fs::create_dir_all(&config.work_dir) {
        eprintln!("Error: Failed to create work dir: {e}");
        return ExitCode::from(1);
    }

    println!("Configuration:");
    println!("  Isolate template: {}", config.isolate_template.display());
    println!("  VM template:      {}", config.vm_template.display());
    println!("  Finalizer:        {}", config.finalizer_path.display());
    println!("  Runtime:          {}", config.runtime_path.display());
    println!("  Work dir:         {}", config.work_dir.display());
    println!();

    let tests: Vec<(&str, fn(&TestConfig) -> Result<()>)> = vec![
        ("unfinalized_template", test_unfinalized_template),
        ("isolate_exit_zero", test_isolate_exit_zero),
        ("isolate_exit_code_and_argv", test_isolate_exit_code_and_argv),
        ("missing_library", test_missing_library),
        ("missing_symbol", test_missing_symbol),
        ("isolate_creation_failure", test_isolate_creation_failure),
        ("debug_trace", test_debug_trace),
        ("vm_main_args", test_vm_main_args),
        ("vm_program_exit", test_vm_program_exit),
        ("vm_exception", test_vm_exception),
        ("vm_dispatch_errors", test_vm_dispatch_errors),
        ("vm_option_order", test_vm_option_order),
        ("vm_creation_failure", test_vm_creation_failure),
        ("vm_string_failure", test_vm_string_failure),
        ("vm_native_entry", test_vm_native_entry),
    ];

    let mut passed = 0;
    let mut failed = 0;

    println!("Running {} tests...", tests.len());
    println!();

    for (name, test_fn) in &tests {
        println!("  Running test: {name}");
        match test_fn(&config) {
            Ok(()) => {
                println!("    PASS");
                passed += 1;
            }
            Err(e) => {
                println!("  FAILED: {e:#}");
                failed += 1;
            }
        }
    }

    println!();
    println!("=== Results ===");
    println!("Passed: {passed}");
    println!("Failed: {failed}");
    println!();

    if failed > 0 {
        ExitCode::from(1)
    } else {
        println!("All tests passed!");
        ExitCode::SUCCESS
    }
}
