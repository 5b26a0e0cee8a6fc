//! Native launcher that loads an embedded runtime from a shared library at
//! startup and hands it the process arguments.
//!
//! The launcher is built once as a template and later finalized with the
//! library name, entry symbol and options (see `finalize-launcher`). The
//! bootstrap protocol is picked at build time with the `isolate` or `vm`
//! feature.

#[cfg(all(feature = "isolate", feature = "vm"))]
compile_error!("features `isolate` and `vm` are mutually exclusive");

#[cfg(not(any(feature = "isolate", feature = "vm")))]
compile_error!("enable one of the `isolate` or `vm` features");

pub mod args;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod jni;
pub mod loader;
pub mod main_thread;
pub mod options;
pub mod platform;
pub mod protocol;

use std::env;
use std::ffi::OsString;

use log::{debug, error, warn};

use crate::args::HostArgs;
use crate::config::{ConfigError, LauncherConfig};
use crate::error::{render_chain, LaunchError};
use crate::loader::NativeLoader;
use crate::options::OptionInputs;
use crate::platform::Console;
use crate::protocol::{LaunchPlan, Protocol};

#[cfg(feature = "isolate")]
pub type SelectedProtocol = protocol::IsolateProtocol;

#[cfg(all(feature = "vm", not(feature = "isolate")))]
pub type SelectedProtocol = protocol::VmProtocol;

#[cfg(feature = "isolate")]
pub fn selected_protocol(config: &LauncherConfig) -> Result<SelectedProtocol, LaunchError> {
    let symbol = config
        .entry_symbol
        .as_deref()
        .ok_or(ConfigError::Missing("an entry symbol"))?;
    protocol::IsolateProtocol::new(symbol)
}

#[cfg(all(feature = "vm", not(feature = "isolate")))]
pub fn selected_protocol(config: &LauncherConfig) -> Result<SelectedProtocol, LaunchError> {
    match (&config.main_class, &config.entry_symbol) {
        (Some(main_class), _) => Ok(protocol::VmProtocol::reflection(main_class)),
        (None, Some(symbol)) => protocol::VmProtocol::native_entry(symbol),
        (None, None) => Err(ConfigError::Missing("a main class or an entry symbol").into()),
    }
}

/// Process entry: returns the exit code to terminate with.
pub fn run() -> i32 {
    let config = match LauncherConfig::embedded() {
        Ok(config) => config,
        Err(err) => {
            diagnostics::init(false);
            return report(Err(err.into()));
        }
    };
    diagnostics::init(config.debug);
    debug!("Running on {}", platform::OS_FAMILY);

    #[cfg(all(target_os = "macos", feature = "ui-main-thread"))]
    {
        debug!("Launching UI event loop");
        let job = move || -> i32 { std::process::exit(report(try_launch(&config, env::args_os()))) };
        return report(main_thread::cede_main_thread(job, platform::run_event_loop));
    }

    #[cfg(not(all(target_os = "macos", feature = "ui-main-thread")))]
    report(try_launch(&config, env::args_os()))
}

fn report(result: Result<i32, LaunchError>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            error!("{}", render_chain(&err));
            err.exit_code()
        }
    }
}

/// Locates the library, prepares process state and bootstraps the runtime.
pub fn try_launch<I>(config: &LauncherConfig, args: I) -> Result<i32, LaunchError>
where
    I: IntoIterator<Item = OsString>,
{
    let selected = selected_protocol(config)?;

    let executable_path = platform::current_executable_path();
    if executable_path.is_none() {
        warn!("unable to determine the executable path");
    }

    // Console and identity only matter to runtimes that receive options.
    let (console, app_identity) = if SelectedProtocol::TAKES_OPTIONS {
        let console = platform::prepare_console();
        let app_identity = config
            .app_id
            .as_deref()
            .filter(|app_id| platform::apply_app_identity(app_id));
        (console, app_identity)
    } else {
        (Console::Unmanaged, None)
    };

    let plan = LaunchPlan {
        library_path: platform::library_path(&config.library_name, executable_path.as_deref()),
        option_inputs: OptionInputs {
            executable_path: executable_path.as_deref(),
            console,
            app_identity,
            user_options: &config.vm_options,
        },
    };
    let mut args = HostArgs::from_os_args(args)?;
    protocol::bootstrap(&selected, &NativeLoader, &plan, &mut args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LauncherConfig {
        LauncherConfig {
            library_name: "app".into(),
            entry_symbol: None,
            main_class: None,
            vm_options: Vec::new(),
            app_id: None,
            debug: false,
        }
    }

    #[test]
    fn protocol_needs_its_entry_configuration() {
        let err = selected_protocol(&config()).unwrap_err();
        assert!(matches!(err, LaunchError::Config(ConfigError::Missing(_))));
        assert_eq!(err.exit_code(), 1);
    }

    #[cfg(feature = "isolate")]
    #[test]
    fn isolate_build_uses_the_entry_symbol() {
        let mut config = config();
        config.entry_symbol = Some("run_main".into());
        config.main_class = Some("demo.Main".into());
        let selected = selected_protocol(&config).unwrap();
        assert_eq!(selected.entry_symbol(), c"run_main");
    }

    #[cfg(all(feature = "vm", not(feature = "isolate")))]
    #[test]
    fn vm_build_prefers_the_main_class() {
        let mut config = config();
        config.entry_symbol = Some("run_main".into());
        config.main_class = Some("demo.Main".into());
        let selected = selected_protocol(&config).unwrap();
        assert!(matches!(
            selected.dispatch(),
            protocol::VmDispatch::Reflection { main_class } if main_class == "demo.Main"
        ));

        config.main_class = None;
        let selected = selected_protocol(&config).unwrap();
        assert!(matches!(
            selected.dispatch(),
            protocol::VmDispatch::NativeEntry { symbol } if symbol.as_c_str() == c"run_main"
        ));
    }

    #[test]
    fn missing_library_fails_with_exit_one() {
        let mut config = config();
        config.library_name = "launcher-stub-no-such-library".into();
        config.entry_symbol = Some("run_main".into());
        config.main_class = Some("demo.Main".into());
        let err = try_launch(&config, [OsString::from("prog")]).unwrap_err();
        assert!(matches!(err, LaunchError::Load { .. }), "{err}");
        assert_eq!(report(Err(err)), 1);
    }
}
