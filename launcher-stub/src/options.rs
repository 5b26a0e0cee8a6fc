//! Runtime options handed to VM creation.
//!
//! The list is bounded: its capacity is fixed when it is created from the
//! number of launcher-provided options plus the finalized user options.

use std::ffi::{CStr, CString};
use std::path::Path;

use crate::error::LaunchError;
use crate::platform::Console;

pub const EXECUTABLE_PATH_PROPERTY: &str = "-Dlauncher.executablePath=";
pub const APP_ID_PROPERTY: &str = "-Dlauncher.windows.userModelID=";

/// File, native and console-output encodings. The console-input encoding is
/// only forced for a real console, see [`STDIN_ENCODING`].
pub const BASELINE_ENCODINGS: [&str; 5] = [
    "-Dfile.encoding=UTF-8",
    "-Dnative.encoding=UTF-8",
    "-Dsun.jnu.encoding=UTF-8",
    "-Dstdout.encoding=UTF-8",
    "-Dstderr.encoding=UTF-8",
];

pub const STDIN_ENCODING: &str = "-Dstdin.encoding=UTF-8";

/// Upper bound of the options the launcher adds on its own.
pub const BUILTIN_CAPACITY: usize = 1 + BASELINE_ENCODINGS.len() + 1 + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionList {
    entries: Vec<CString>,
    capacity: usize,
}

impl OptionList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, option: impl Into<Vec<u8>>) -> Result<(), LaunchError> {
        if self.entries.len() == self.capacity {
            return Err(LaunchError::Marshal(format!(
                "option list is full ({} entries)",
                self.capacity
            )));
        }
        let option = CString::new(option).map_err(|err| {
            LaunchError::Marshal(format!(
                "option contains a NUL byte at position {}",
                err.nul_position()
            ))
        })?;
        self.entries.push(option);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.entries.iter().map(CString::as_c_str)
    }
}

/// Everything the option list depends on, gathered before runtime creation.
#[derive(Debug, Clone, Copy)]
pub struct OptionInputs<'a> {
    pub executable_path: Option<&'a Path>,
    pub console: Console,
    /// Identity that the platform accepted, if any.
    pub app_identity: Option<&'a str>,
    pub user_options: &'a [String],
}

pub fn build(inputs: &OptionInputs<'_>) -> Result<OptionList, LaunchError> {
    let mut options = OptionList::with_capacity(BUILTIN_CAPACITY + inputs.user_options.len());

    if let Some(path) = inputs.executable_path {
        let mut option = EXECUTABLE_PATH_PROPERTY.as_bytes().to_vec();
        option.extend_from_slice(&path_bytes(path));
        options.push(option)?;
    }
    for encoding in BASELINE_ENCODINGS {
        options.push(encoding)?;
    }
    // Piped input keeps whatever encoding the sender chose.
    if inputs.console == Console::Utf8 {
        options.push(STDIN_ENCODING)?;
    }
    if let Some(app_id) = inputs.app_identity {
        options.push(format!("{APP_ID_PROPERTY}{app_id}"))?;
    }
    for option in inputs.user_options {
        options.push(option.as_str())?;
    }
    Ok(options)
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().into()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    // UTF-16 module path, handed over as UTF-8
    path.to_string_lossy().into_owned().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(options: &OptionList) -> Vec<String> {
        options
            .iter()
            .map(|option| option.to_string_lossy().into_owned())
            .collect()
    }

    fn inputs<'a>(
        executable_path: Option<&'a Path>,
        console: Console,
        user_options: &'a [String],
    ) -> OptionInputs<'a> {
        OptionInputs {
            executable_path,
            console,
            app_identity: None,
            user_options,
        }
    }

    #[test]
    fn order_is_path_encodings_identity_user() {
        let user = vec!["-Xmx64m".to_string(), "-Dapp.mode=cli".to_string()];
        let options = build(&OptionInputs {
            executable_path: Some(Path::new("/opt/app/bin/app")),
            console: Console::Utf8,
            app_identity: Some("Hebi.Samples.Hello"),
            user_options: &user,
        })
        .unwrap();

        let mut expected = vec!["-Dlauncher.executablePath=/opt/app/bin/app".to_string()];
        expected.extend(BASELINE_ENCODINGS.iter().map(|s| s.to_string()));
        expected.push(STDIN_ENCODING.to_string());
        expected.push("-Dlauncher.windows.userModelID=Hebi.Samples.Hello".to_string());
        expected.extend(user.iter().cloned());
        assert_eq!(strings(&options), expected);
        assert_eq!(options.len(), options.capacity());
    }

    #[test]
    fn building_twice_is_identical() {
        let user = vec!["-Dx=1".to_string(), "-Dx=2".to_string(), "-Dx=1".to_string()];
        let exe = Path::new("/usr/local/bin/tool");
        let first = build(&inputs(Some(exe), Console::Redirected, &user)).unwrap();
        let second = build(&inputs(Some(exe), Console::Redirected, &user)).unwrap();
        assert_eq!(first, second);
        // duplicates are kept in declaration order
        assert_eq!(strings(&first)[6..], user[..]);
    }

    #[test]
    fn piped_console_has_no_stdin_override() {
        for console in [Console::Redirected, Console::Unmanaged] {
            let options = build(&inputs(None, console, &[])).unwrap();
            assert!(
                !strings(&options).iter().any(|o| o.starts_with("-Dstdin.encoding")),
                "{console:?}"
            );
        }
    }

    #[test]
    fn missing_executable_path_only_drops_that_option() {
        let user = vec!["-Xss2m".to_string()];
        let with = build(&inputs(Some(Path::new("/bin/app")), Console::Unmanaged, &user)).unwrap();
        let without = build(&inputs(None, Console::Unmanaged, &user)).unwrap();
        assert_eq!(strings(&with)[1..], strings(&without)[..]);
        assert!(!strings(&without)
            .iter()
            .any(|o| o.starts_with(EXECUTABLE_PATH_PROPERTY)));
    }

    #[cfg(unix)]
    #[test]
    fn executable_path_keeps_raw_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/opt/caf\xe9/bin/app"));
        let options = build(&inputs(Some(path), Console::Unmanaged, &[])).unwrap();
        let first = options.iter().next().unwrap();
        assert_eq!(
            first.to_bytes(),
            b"-Dlauncher.executablePath=/opt/caf\xe9/bin/app".as_slice()
        );
    }

    #[test]
    fn full_list_rejects_more_entries() {
        let mut options = OptionList::with_capacity(1);
        options.push("-Da=1").unwrap();
        let err = options.push("-Db=2").unwrap_err();
        assert!(matches!(err, LaunchError::Marshal(_)));
        assert_eq!(options.len(), 1);
    }

    #[test]
    fn interior_nul_is_rejected() {
        let mut options = OptionList::with_capacity(2);
        let err = options.push("-Da=\0b").unwrap_err();
        assert_eq!(err.to_string(), "option contains a NUL byte at position 4");
        assert!(options.is_empty());
    }
}
