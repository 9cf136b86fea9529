//! Pass configuration.
//!
//! Both configs start from [`Default`] and can be overlaid with `FPTRACE_*`
//! environment variables through [`EnvOverlay`], which is how the compiler
//! plugin is configured.

use std::path::PathBuf;
use std::str::FromStr;

use fptrace_ir::LogSignature;
use tracing::warn;

/// Format template passed to the log function: enclosing function name,
/// then the call target address.
pub const FORMAT_TEMPLATE: &str = "(fp-trace) Called from: %s\n(fp-trace)   Called: %p\n";

/// Default name of the external logging function.
pub const DEFAULT_LOG_FUNCTION: &str = "printf";

/// Log function used for [`TraceStream::Stderr`].
pub const STDERR_LOG_FUNCTION: &str = "dprintf";

/// File descriptor passed to `dprintf`-style log functions.
pub const STDERR_FD: i32 = 2;

/// Default symbol name of the shared format string global.
pub const DEFAULT_FORMAT_GLOBAL: &str = "PrintfFormatStr";

/// Default base name for per-function name strings.
pub const DEFAULT_NAME_PREFIX: &str = "fptrace.name";

/// Default report path, relative to the working directory.
pub const DEFAULT_REPORT_PATH: &str = "function_pointers.csv";

/// Where injected trace calls are placed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracePlacement {
    /// At the first insertion point of the function's entry block. The trace
    /// fires on every entry to the function, whether or not the indirect call
    /// executes. Targets that are not available at the entry are traced
    /// right before their call instead.
    #[default]
    Entry,
    /// Immediately before each indirect call.
    CallSite,
}

impl FromStr for TracePlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entry" => Ok(Self::Entry),
            "call-site" | "callsite" => Ok(Self::CallSite),
            _ => Err(format!("unknown trace placement `{s}` (expected entry or call-site)")),
        }
    }
}

/// Stream the instrumented program writes its traces to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TraceStream {
    /// Call a `printf`-like `i32 (i8*, ...)` function. With `printf` itself
    /// the traces land on stdout and interleave with the program's output.
    #[default]
    Stdout,
    /// Call a `dprintf`-like `i32 (i32, i8*, ...)` function with fd 2, so
    /// traces land on stderr.
    Stderr,
}

impl TraceStream {
    /// Log function shape used for this stream.
    pub const fn signature(self) -> LogSignature {
        match self {
            Self::Stdout => LogSignature::Format,
            Self::Stderr => LogSignature::FdFormat,
        }
    }
}

impl FromStr for TraceStream {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            _ => Err(format!("unknown trace stream `{s}` (expected stdout or stderr)")),
        }
    }
}

/// Trace injector configuration.
#[derive(Clone, Debug)]
pub struct InjectConfig {
    /// Name of the external variadic logging function. Its shape follows
    /// `stream`.
    pub log_function: String,
    pub stream: TraceStream,
    /// Symbol name of the shared format string.
    pub format_global: String,
    /// Base name for per-function name strings.
    pub name_prefix: String,
    pub placement: TracePlacement,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            log_function: DEFAULT_LOG_FUNCTION.to_string(),
            stream: TraceStream::Stdout,
            format_global: DEFAULT_FORMAT_GLOBAL.to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            placement: TracePlacement::Entry,
        }
    }
}

impl InjectConfig {
    /// Default config with the given placement.
    pub fn with_placement(placement: TracePlacement) -> Self {
        Self {
            placement,
            ..Self::default()
        }
    }

    /// Use a different `printf`-like logging function.
    #[must_use]
    pub fn log_function(mut self, name: impl Into<String>) -> Self {
        self.log_function = name.into();
        self
    }

    /// Trace to stderr through `dprintf`.
    #[must_use]
    pub fn to_stderr(mut self) -> Self {
        self.stream = TraceStream::Stderr;
        self.log_function = STDERR_LOG_FUNCTION.to_string();
        self
    }
}

/// How the report log is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogMode {
    /// Truncate and write the header row.
    #[default]
    Create,
    /// Append rows without a header.
    Append,
}

/// Static reporter configuration.
#[derive(Clone, Debug)]
pub struct ReportConfig {
    /// Path of the CSV report.
    pub path: PathBuf,
    /// Mode for the first function visited in a run; later visits append.
    pub initial_mode: LogMode,
    /// Function name that forces a fresh log whenever it is visited.
    pub reset_trigger: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_REPORT_PATH),
            initial_mode: LogMode::Create,
            reset_trigger: None,
        }
    }
}

impl ReportConfig {
    /// Report to `path`, starting a fresh log.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Append to an existing log instead of truncating it.
    #[must_use]
    pub const fn append(mut self) -> Self {
        self.initial_mode = LogMode::Append;
        self
    }

    /// Truncate the log whenever `function` is visited.
    #[must_use]
    pub fn reset_on(mut self, function: impl Into<String>) -> Self {
        self.reset_trigger = Some(function.into());
        self
    }
}

/// Overlay of environment variables onto a config.
pub trait EnvOverlay {
    /// Apply variables from the process environment.
    fn overlay_env(&mut self) {
        self.overlay_with(&|key| std::env::var(key).ok());
    }

    /// Apply variables from `lookup`. Unset variables keep the current value.
    fn overlay_with(&mut self, lookup: &dyn Fn(&str) -> Option<String>);
}

/// Parse a boolean variable; unrecognized values keep `default`.
pub fn bool_var(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

impl EnvOverlay for InjectConfig {
    fn overlay_with(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FPTRACE_TRACE_STREAM") {
            match v.parse::<TraceStream>() {
                Ok(TraceStream::Stderr) => {
                    self.stream = TraceStream::Stderr;
                    self.log_function = STDERR_LOG_FUNCTION.to_string();
                }
                Ok(TraceStream::Stdout) => {
                    self.stream = TraceStream::Stdout;
                    self.log_function = DEFAULT_LOG_FUNCTION.to_string();
                }
                Err(e) => warn!("FPTRACE_TRACE_STREAM: {e}"),
            }
        }
        if let Some(v) = lookup("FPTRACE_LOG_FUNCTION") {
            self.log_function = v;
        }
        if let Some(v) = lookup("FPTRACE_PLACEMENT") {
            match v.parse() {
                Ok(placement) => self.placement = placement,
                Err(e) => warn!("FPTRACE_PLACEMENT: {e}"),
            }
        }
    }
}

impl EnvOverlay for ReportConfig {
    fn overlay_with(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FPTRACE_REPORT_PATH") {
            self.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FPTRACE_REPORT_APPEND") {
            let append = bool_var(&v, self.initial_mode == LogMode::Append);
            self.initial_mode = if append { LogMode::Append } else { LogMode::Create };
        }
        if let Some(v) = lookup("FPTRACE_REPORT_RESET_ON") {
            self.reset_trigger = Some(v).filter(|name| !name.is_empty());
        }
    }
}
