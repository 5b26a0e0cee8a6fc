// Build-time configuration embedded in the launcher binary.
//
// Each value lives in a fixed-size region initialised with a unique
// @@LAUNCHER_ tag. finalize-launcher finds the tag in the compiled template,
// zeroes the region and writes the literal value, so the launcher can be
// compiled before the runtime library exists.

use std::ptr;

use thiserror::Error;

pub const VALUE_SIZE: usize = 256;
pub const VM_OPTIONS_SIZE: usize = 4096;
pub const FLAGS_SIZE: usize = 32;

const TAG_PREFIX: &[u8] = b"@@LAUNCHER_";

pub const FLAG_DEBUG: u32 = 1;

const fn placeholder<const N: usize>(tag: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let mut i = 0;
    while i < tag.len() {
        out[i] = tag[i];
        i += 1;
    }
    out
}

#[used]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__lnchcfg")]
#[cfg_attr(not(target_os = "macos"), link_section = ".lnchcfg")]
static LIBRARY: [u8; VALUE_SIZE] = placeholder(b"@@LAUNCHER_LIBRARY@@");

#[used]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__lnchcfg")]
#[cfg_attr(not(target_os = "macos"), link_section = ".lnchcfg")]
static ENTRY_SYMBOL: [u8; VALUE_SIZE] = placeholder(b"@@LAUNCHER_ENTRY_SYMBOL@@");

#[used]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__lnchcfg")]
#[cfg_attr(not(target_os = "macos"), link_section = ".lnchcfg")]
static MAIN_CLASS: [u8; VALUE_SIZE] = placeholder(b"@@LAUNCHER_MAIN_CLASS@@");

#[used]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__lnchcfg")]
#[cfg_attr(not(target_os = "macos"), link_section = ".lnchcfg")]
static VM_OPTIONS: [u8; VM_OPTIONS_SIZE] = placeholder(b"@@LAUNCHER_VM_OPTIONS@@");

#[used]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__lnchcfg")]
#[cfg_attr(not(target_os = "macos"), link_section = ".lnchcfg")]
static APP_ID: [u8; VALUE_SIZE] = placeholder(b"@@LAUNCHER_APP_ID@@");

#[used]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__lnchcfg")]
#[cfg_attr(not(target_os = "macos"), link_section = ".lnchcfg")]
static FLAGS: [u8; FLAGS_SIZE] = placeholder(b"@@LAUNCHER_FLAGS@@");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("this is a template launcher; finalize it by replacing the placeholders before use (the library name has not been set)")]
    Unfinalized,

    #[error("launcher {0} is empty")]
    Empty(&'static str),

    #[error("launcher {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("launcher flags contain non-digit characters")]
    InvalidFlags,

    #[error("launcher needs {0} for the selected protocol")]
    Missing(&'static str),
}

/// Raw bytes of every configuration region.
#[derive(Debug, Clone, Copy)]
pub struct Regions<'a> {
    pub library: &'a [u8],
    pub entry_symbol: &'a [u8],
    pub main_class: &'a [u8],
    pub vm_options: &'a [u8],
    pub app_id: &'a [u8],
    pub flags: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Library image name without the platform extension.
    pub library_name: String,
    pub entry_symbol: Option<String>,
    /// Dotted name of the class whose static `main(String[])` is invoked.
    pub main_class: Option<String>,
    pub vm_options: Vec<String>,
    pub app_id: Option<String>,
    pub debug: bool,
}

impl LauncherConfig {
    /// Reads the regions compiled into this binary.
    pub fn embedded() -> Result<Self, ConfigError> {
        // Volatile reads keep the compiler from folding the template values.
        let (library, entry_symbol, main_class, vm_options, app_id, flags) = unsafe {
            (
                ptr::read_volatile(ptr::addr_of!(LIBRARY)),
                ptr::read_volatile(ptr::addr_of!(ENTRY_SYMBOL)),
                ptr::read_volatile(ptr::addr_of!(MAIN_CLASS)),
                ptr::read_volatile(ptr::addr_of!(VM_OPTIONS)),
                ptr::read_volatile(ptr::addr_of!(APP_ID)),
                ptr::read_volatile(ptr::addr_of!(FLAGS)),
            )
        };
        Self::from_regions(Regions {
            library: &library,
            entry_symbol: &entry_symbol,
            main_class: &main_class,
            vm_options: &vm_options,
            app_id: &app_id,
            flags: &flags,
        })
    }

    pub fn from_regions(regions: Regions<'_>) -> Result<Self, ConfigError> {
        if is_template_placeholder(regions.library) {
            return Err(ConfigError::Unfinalized);
        }
        let library_name = optional_value(regions.library, "library name")?
            .ok_or(ConfigError::Empty("library name"))?;

        Ok(Self {
            library_name,
            entry_symbol: optional_value(regions.entry_symbol, "entry symbol")?,
            main_class: optional_value(regions.main_class, "main class")?,
            vm_options: option_list(regions.vm_options)?,
            app_id: optional_value(regions.app_id, "application id")?,
            debug: parse_flags(regions.flags)? & FLAG_DEBUG != 0,
        })
    }
}

fn is_template_placeholder(region: &[u8]) -> bool {
    region.starts_with(TAG_PREFIX)
}

/// Bytes up to the first NUL.
fn terminated(region: &[u8]) -> &[u8] {
    let len = region.iter().position(|&b| b == 0).unwrap_or(region.len());
    &region[..len]
}

fn optional_value(region: &[u8], what: &'static str) -> Result<Option<String>, ConfigError> {
    if is_template_placeholder(region) {
        return Ok(None);
    }
    let value = terminated(region);
    if value.is_empty() {
        return Ok(None);
    }
    std::str::from_utf8(value)
        .map(|s| Some(s.to_owned()))
        .map_err(|_| ConfigError::InvalidUtf8(what))
}

// NUL-separated entries, terminated by an empty entry.
fn option_list(region: &[u8]) -> Result<Vec<String>, ConfigError> {
    if is_template_placeholder(region) {
        return Ok(Vec::new());
    }
    region
        .split(|&b| b == 0)
        .take_while(|entry| !entry.is_empty())
        .map(|entry| {
            std::str::from_utf8(entry)
                .map(str::to_owned)
                .map_err(|_| ConfigError::InvalidUtf8("VM option"))
        })
        .collect()
}

fn parse_flags(region: &[u8]) -> Result<u32, ConfigError> {
    if is_template_placeholder(region) {
        return Ok(0);
    }
    let digits = terminated(region);
    if digits.is_empty() {
        return Ok(0);
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(ConfigError::InvalidFlags);
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(ConfigError::InvalidFlags)
}
