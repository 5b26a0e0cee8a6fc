//! Two-stream diagnostic channel: debug trace on stdout, warnings and
//! errors on stderr, each line prefixed with a severity tag.

use std::io::{self, Write};

use log::{Level, LevelFilter, Log, Metadata, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Installs the logger. Debug trace is only emitted for debug builds of the
/// launcher configuration.
pub fn init(debug: bool) {
    // A second call keeps the first logger; only the level changes.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(max_level(debug));
}

pub fn max_level(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

pub fn route(level: Level) -> (Stream, &'static str) {
    match level {
        Level::Error => (Stream::Stderr, "[ERROR]"),
        Level::Warn => (Stream::Stderr, "[WARN]"),
        Level::Info | Level::Debug | Level::Trace => (Stream::Stdout, "[DEBUG]"),
    }
}

pub fn format_line(level: Level, args: &std::fmt::Arguments<'_>) -> (Stream, String) {
    let (stream, tag) = route(level);
    (stream, format!("{tag} {args}\n"))
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let (stream, line) = format_line(record.level(), record.args());
        // Nothing sensible to do if the console itself is gone.
        let _ = match stream {
            Stream::Stdout => write_all(io::stdout().lock(), &line),
            Stream::Stderr => write_all(io::stderr().lock(), &line),
        };
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();
    }
}

fn write_all(mut out: impl Write, line: &str) -> io::Result<()> {
    out.write_all(line.as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_go_to_stderr_with_tag() {
        let (stream, line) = format_line(Level::Error, &format_args!("initialization error"));
        assert_eq!(stream, Stream::Stderr);
        assert_eq!(line, "[ERROR] initialization error\n");
    }

    #[test]
    fn debug_goes_to_stdout() {
        let (stream, line) = format_line(Level::Debug, &format_args!("Running on {}", "Linux"));
        assert_eq!(stream, Stream::Stdout);
        assert_eq!(line, "[DEBUG] Running on Linux\n");
    }

    #[test]
    fn user_text_is_not_interpreted() {
        let class = "com.example.%s%n";
        let (_, line) = format_line(Level::Error, &format_args!("failed to find main class: {class}"));
        assert_eq!(line, "[ERROR] failed to find main class: com.example.%s%n\n");
    }

    #[test]
    fn debug_flag_controls_trace() {
        assert_eq!(max_level(false), LevelFilter::Warn);
        assert_eq!(max_level(true), LevelFilter::Debug);
    }
}
