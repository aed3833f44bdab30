//! Call logging advice.
//!
//! Every call is logged as its signature (`name(args)`), followed by either
//! `name => result` or `signature ~ raised failure`. With `stacktrace` set,
//! the signature line also names the callers, padded to a column:
//! `greet("ann")   <<< app::handler < app::main`.

use std::backtrace::Backtrace;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use aspectlib_core::{Advisor, Aspect, Invocation};

pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Where log lines go.
#[derive(Clone)]
pub enum LogSink {
    /// The `log` facade, at this level.
    Log(log::Level),
    /// Any writer, one line per message.
    Writer(SharedWriter),
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSink::Log(level) => write!(f, "Log({level})"),
            LogSink::Writer(_) => write!(f, "Writer"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub arguments: bool,
    pub result: bool,
    /// Replace characters outside printable ASCII with `.`.
    pub strip_non_ascii: bool,
    /// How many caller frames to append to the signature; `0` skips
    /// capturing a backtrace.
    pub stacktrace: usize,
    /// Column the caller frames start at.
    pub align_stacktrace: usize,
    pub sink: LogSink,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            arguments: true,
            result: true,
            strip_non_ascii: true,
            stacktrace: 0,
            align_stacktrace: 60,
            sink: LogSink::Log(log::Level::Debug),
        }
    }
}

// Frames inside the interception machinery and the runtime say nothing
// about who made the call.
const INTERNAL_FRAMES: &[&str] = &[
    "aspectlib::",
    "aspectlib_core::",
    "futures_util::",
    "std::",
    "core::",
    "alloc::",
    "__rust",
    "rust_begin_unwind",
];

fn is_internal(symbol: &str) -> bool {
    let symbol = symbol.trim_start_matches('<');
    INTERNAL_FRAMES.iter().any(|prefix| symbol.starts_with(prefix))
}

/// Up to `depth` caller symbols, innermost first, joined with ` < `.
fn caller_stack(depth: usize) -> String {
    let trace = Backtrace::force_capture().to_string();
    trace
        .lines()
        .filter_map(|line| {
            let (index, symbol) = line.trim_start().split_once(": ")?;
            index.parse::<usize>().ok()?;
            Some(symbol.trim())
        })
        .filter(|symbol| !is_internal(symbol))
        .take(depth)
        .collect::<Vec<_>>()
        .join(" < ")
}

fn printable(c: char) -> bool {
    c.is_ascii_graphic() || matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

impl LogOptions {
    pub fn to_writer(writer: SharedWriter) -> Self {
        LogOptions {
            sink: LogSink::Writer(writer),
            ..Self::default()
        }
    }

    fn dump(&self, line: &str) {
        let line: String = if self.strip_non_ascii {
            line.chars()
                .map(|c| if printable(c) { c } else { '.' })
                .collect()
        } else {
            line.to_string()
        };
        match &self.sink {
            LogSink::Log(level) => log::log!(*level, "{line}"),
            LogSink::Writer(writer) => {
                let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(err) = writeln!(writer, "{line}") {
                    log::error!("failed to log a message: {err}");
                }
            }
        }
    }
}

/// An aspect logging every call it wraps.
pub fn log_calls(options: LogOptions) -> Aspect {
    Aspect::routine("log", move |invocation: Invocation, advisor: Advisor| {
        let options = options.clone();
        async move {
            let name = invocation.operation().to_string();
            let signature = if options.arguments {
                invocation.to_string()
            } else {
                name.clone()
            };
            if options.stacktrace > 0 {
                options.dump(&format!(
                    "{signature:<width$}  <<< {}",
                    caller_stack(options.stacktrace),
                    width = options.align_stacktrace
                ));
            } else {
                options.dump(&signature);
            }
            match advisor.proceed().await {
                Ok(result) => {
                    if options.result {
                        options.dump(&format!("{name} => {result}"));
                    }
                    Ok(Some(result))
                }
                Err(failure) => {
                    options.dump(&format!("{signature} ~ raised {failure}"));
                    Err(failure)
                }
            }
        }
    })
}
