use std::fs;
use std::io::{self, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;

const VALUE_SIZE: usize = 256;
const VM_OPTIONS_SIZE: usize = 4096;
const FLAGS_SIZE: usize = 32;

const FLAG_DEBUG: u32 = 1;

/// A fixed-size configuration region in the launcher template.
#[derive(Debug, Clone, Copy)]
struct Region {
    tag: &'static [u8],
    size: usize,
    label: &'static str,
}

const LIBRARY: Region = Region {
    tag: b"@@LAUNCHER_LIBRARY@@",
    size: VALUE_SIZE,
    label: "library name",
};
const ENTRY_SYMBOL: Region = Region {
    tag: b"@@LAUNCHER_ENTRY_SYMBOL@@",
    size: VALUE_SIZE,
    label: "entry symbol",
};
const MAIN_CLASS: Region = Region {
    tag: b"@@LAUNCHER_MAIN_CLASS@@",
    size: VALUE_SIZE,
    label: "main class",
};
const VM_OPTIONS: Region = Region {
    tag: b"@@LAUNCHER_VM_OPTIONS@@",
    size: VM_OPTIONS_SIZE,
    label: "VM options",
};
const APP_ID: Region = Region {
    tag: b"@@LAUNCHER_APP_ID@@",
    size: VALUE_SIZE,
    label: "application id",
};
const FLAGS: Region = Region {
    tag: b"@@LAUNCHER_FLAGS@@",
    size: FLAGS_SIZE,
    label: "flags",
};

#[derive(Parser, Debug)]
#[command(
    name = "finalize-launcher",
    about = "Write the launch configuration into a launcher-stub template",
    after_help = "Examples:\n  \
        finalize-launcher --template launcher-stub -o hello --library hello --entry-symbol run_main\n  \
        finalize-launcher --template launcher-stub-vm -o hello --library hello \\\n      \
        --main-class com.example.Hello --vm-option=-Xmx64m --debug"
)]
struct Cli {
    /// Compiled launcher-stub template
    #[arg(long)]
    template: PathBuf,

    /// Write output to file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Runtime library name without platform extension
    #[arg(long)]
    library: String,

    /// Native entry symbol (isolate builds, or VM builds without a main class)
    #[arg(long)]
    entry_symbol: Option<String>,

    /// Dotted name of the class whose main(String[]) is invoked (VM builds)
    #[arg(long)]
    main_class: Option<String>,

    /// Option passed to VM creation, in order (repeatable)
    #[arg(long = "vm-option", allow_hyphen_values = true)]
    vm_options: Vec<String>,

    /// Application identity for taskbar grouping (Windows)
    #[arg(long)]
    app_id: Option<String>,

    /// Emit the [DEBUG] trace on stdout
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Value for every region. Unset values become empty so no tag is left
    /// behind in the output.
    fn region_values(&self) -> Result<Vec<(Region, Vec<u8>)>> {
        ensure!(!self.library.is_empty(), "library name must not be empty");
        let flags = if self.debug { FLAG_DEBUG } else { 0 };
        Ok(vec![
            (LIBRARY, self.library.clone().into_bytes()),
            (ENTRY_SYMBOL, optional(&self.entry_symbol)),
            (MAIN_CLASS, optional(&self.main_class)),
            (VM_OPTIONS, encode_options(&self.vm_options)?),
            (APP_ID, optional(&self.app_id)),
            (FLAGS, flags.to_string().into_bytes()),
        ])
    }
}

fn optional(value: &Option<String>) -> Vec<u8> {
    value.clone().unwrap_or_default().into_bytes()
}

/// NUL-separated entries; the region's zero padding ends the list.
fn encode_options(options: &[String]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, option) in options.iter().enumerate() {
        ensure!(!option.is_empty(), "VM option {i} is empty");
        if i > 0 {
            out.push(0);
        }
        out.extend_from_slice(option.as_bytes());
    }
    Ok(out)
}

fn find_pattern(data: &[u8], pattern: &[u8]) -> Option<usize> {
    data.windows(pattern.len())
        .position(|window| window == pattern)
}

fn replace_at(data: &mut [u8], offset: usize, new_value: &[u8], region: Region) -> Result<()> {
    if new_value.len() >= region.size {
        bail!(
            "{} too long: {} bytes, at most {} fit",
            region.label,
            new_value.len(),
            region.size - 1
        );
    }
    if new_value.contains(&0) && region.tag != VM_OPTIONS.tag {
        bail!("{} contains a NUL byte", region.label);
    }
    if offset + region.size > data.len() {
        bail!("{} region is truncated in the template", region.label);
    }

    // Zero out the entire region
    data[offset..offset + region.size].fill(0);
    data[offset..offset + new_value.len()].copy_from_slice(new_value);
    Ok(())
}

fn finalize(data: &mut [u8], values: &[(Region, Vec<u8>)]) -> Result<()> {
    for (region, value) in values {
        let pos = find_pattern(data, region.tag).with_context(|| {
            format!(
                "{} placeholder not found in template (already finalized?)",
                region.label
            )
        })?;
        replace_at(data, pos, value, *region)?;
        eprintln!("Replaced {} with: {}", region.label, describe(value));
    }
    Ok(())
}

fn describe(value: &[u8]) -> String {
    if value.is_empty() {
        "<empty>".to_string()
    } else {
        String::from_utf8_lossy(value).replace('\0', " | ")
    }
}

fn finalize_launcher(cli: &Cli) -> Result<()> {
    // Prevent overwriting the input file
    if let Some(output) = &cli.output {
        let template_canon = fs::canonicalize(&cli.template)
            .with_context(|| format!("Failed to resolve template path {}", cli.template.display()))?;
        if fs::canonicalize(output).ok().as_ref() == Some(&template_canon) {
            bail!("Output path cannot be the same as template path (would overwrite input)");
        }
    }

    let values = cli.region_values()?;
    let mut data = fs::read(&cli.template)
        .with_context(|| format!("Failed to read template {}", cli.template.display()))?;
    finalize(&mut data, &values)?;

    match &cli.output {
        Some(output) => {
            write_executable(output, &data)?;
            eprintln!("\nFinalized launcher written to: {}", output.display());
        }
        None => io::stdout()
            .write_all(&data)
            .context("Failed to write to stdout")?,
    }
    Ok(())
}

fn write_executable(output: &Path, data: &[u8]) -> Result<()> {
    fs::write(output, data)
        .with_context(|| format!("Failed to write output {}", output.display()))?;

    // Make executable (Unix only)
    #[cfg(unix)]
    {
        let mut perms = fs::metadata(output)
            .context("Failed to get metadata")?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(output, perms).context("Failed to set permissions")?;
    }

    // Patching invalidates the linker's ad-hoc signature.
    #[cfg(target_os = "macos")]
    {
        let status = std::process::Command::new("codesign")
            .args(["--force", "--sign", "-"])
            .arg(output)
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => eprintln!("Warning: codesign exited with {status}"),
            Err(e) => eprintln!("Warning: failed to run codesign: {e}"),
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = finalize_launcher(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Vec<u8> {
        let mut data = b"\x7fELF-prefix".to_vec();
        for region in [LIBRARY, ENTRY_SYMBOL, MAIN_CLASS, VM_OPTIONS, APP_ID, FLAGS] {
            let mut bytes = vec![0u8; region.size];
            bytes[..region.tag.len()].copy_from_slice(region.tag);
            data.extend_from_slice(&bytes);
            data.extend_from_slice(b"gap");
        }
        data
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["finalize-launcher", "--template", "template"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn region_bytes(data: &[u8], region: Region) -> &[u8] {
        let start = find_region(region);
        &data[start..start + region.size]
    }

    fn find_region(region: Region) -> usize {
        find_pattern(&template(), region.tag).unwrap()
    }

    #[test]
    fn every_region_is_rewritten() {
        let cli = cli(&[
            "--library", "hello",
            "--main-class", "com.example.Hello",
            "--vm-option", "-Xmx64m",
            "--vm-option=-Dapp.mode=cli",
            "--debug",
        ]);
        let mut data = template();
        finalize(&mut data, &cli.region_values().unwrap()).unwrap();

        assert!(find_pattern(&data, b"@@LAUNCHER_").is_none());
        assert!(region_bytes(&data, LIBRARY).starts_with(b"hello\0"));
        assert!(region_bytes(&data, ENTRY_SYMBOL).iter().all(|&b| b == 0));
        assert!(region_bytes(&data, MAIN_CLASS).starts_with(b"com.example.Hello\0"));
        assert!(region_bytes(&data, VM_OPTIONS).starts_with(b"-Xmx64m\0-Dapp.mode=cli\0\0"));
        assert!(region_bytes(&data, FLAGS).starts_with(b"1\0"));
        assert_eq!(data.len(), template().len());
    }

    #[test]
    fn finalized_output_cannot_be_finalized_again() {
        let cli = cli(&["--library", "hello", "--entry-symbol", "run_main"]);
        let values = cli.region_values().unwrap();
        let mut data = template();
        finalize(&mut data, &values).unwrap();
        let err = finalize(&mut data, &values).unwrap_err();
        assert!(err.to_string().contains("already finalized"), "{err}");
    }

    #[test]
    fn oversized_value_is_rejected() {
        let long = "x".repeat(VALUE_SIZE);
        let cli = cli(&["--library", "hello", "--entry-symbol", &long]);
        let mut data = template();
        let err = finalize(&mut data, &cli.region_values().unwrap()).unwrap_err();
        assert!(err.to_string().starts_with("entry symbol too long"), "{err}");
    }

    #[test]
    fn empty_library_or_option_is_rejected() {
        assert!(cli(&["--library", ""]).region_values().is_err());
        assert!(cli(&["--library", "a", "--vm-option="]).region_values().is_err());
    }

    #[test]
    fn output_must_differ_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher");
        fs::write(&path, template()).unwrap();
        let path_str = path.to_str().unwrap();
        let cli = Cli::try_parse_from([
            "finalize-launcher",
            "--template", path_str,
            "-o", path_str,
            "--library", "hello",
        ])
        .unwrap();
        assert!(finalize_launcher(&cli).is_err());
        assert_eq!(fs::read(&path).unwrap(), template());
    }

    #[test]
    fn writes_executable_output() {
        let dir = tempfile::tempdir().unwrap();
        let template_path = dir.path().join("template");
        let output_path = dir.path().join("hello");
        fs::write(&template_path, template()).unwrap();
        let cli = Cli::try_parse_from([
            "finalize-launcher",
            "--template", template_path.to_str().unwrap(),
            "--output", output_path.to_str().unwrap(),
            "--library", "hello",
            "--entry-symbol", "run_main",
        ])
        .unwrap();
        finalize_launcher(&cli).unwrap();

        let data = fs::read(&output_path).unwrap();
        assert!(region_bytes(&data, ENTRY_SYMBOL).starts_with(b"run_main\0"));
        #[cfg(unix)]
        assert_eq!(
            fs::metadata(&output_path).unwrap().permissions().mode() & 0o777,
            0o755
        );
    }
}
