//! Static reporting of indirect call sites to a CSV log.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use fptrace_ir::IrView;
use tracing::{debug, info, warn};

use crate::config::{LogMode, ReportConfig};
use crate::driver::{IndirectSite, walk_function};
use crate::error::{Error, Result};

/// Header row written to a freshly created log.
pub const REPORT_HEADER: &str = "Function Name, Function Pointer Address, Instruction Address";

/// One report row.
///
/// `target` and `instruction` are identities of in-memory IR objects. A local
/// target is qualified by its function (`@f:%cb`). Both are unique within one
/// analysis run but not stable across runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub function: String,
    pub target: String,
    pub instruction: String,
}

impl LogRecord {
    pub fn from_site<H: IrView + ?Sized>(ir: &H, site: &IndirectSite<H>) -> Self {
        Self {
            function: ir.function_name(site.func),
            target: ir.value_identity(site.func, &site.target),
            instruction: ir.instr_identity(site.instr),
        }
    }

    /// CSV line without the trailing newline.
    pub fn to_csv(&self) -> String {
        [&self.function, &self.target, &self.instruction]
            .map(|field| csv_field(field))
            .join(",")
    }
}

/// Quote a field if it contains a separator, quote or line break.
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// An open report log.
pub struct ReportLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ReportLog {
    /// Open the log. `Create` truncates and writes the header row.
    pub fn open(path: &Path, mode: LogMode) -> Result<Self> {
        let file = match mode {
            LogMode::Create => File::create(path),
            LogMode::Append => OpenOptions::new().create(true).append(true).open(path),
        }
        .map_err(|e| report_error(path, e))?;
        let mut log = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        };
        if mode == LogMode::Create {
            log.write_line(REPORT_HEADER)?;
        }
        Ok(log)
    }

    /// Append one row.
    pub fn record(&mut self, record: &LogRecord) -> Result<()> {
        self.write_line(&record.to_csv())
    }

    /// Flush and release the file.
    pub fn close(mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| report_error(&self.path, e))
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{line}").map_err(|e| report_error(&self.path, e))
    }
}

fn report_error(path: &Path, source: io::Error) -> Error {
    Error::Report {
        path: path.to_path_buf(),
        source,
    }
}

/// Rows produced for one function.
#[derive(Clone, Debug, Default)]
pub struct FunctionReport {
    pub function: String,
    pub records: Vec<LogRecord>,
}

/// Writes one CSV row per indirect call site, without touching the IR.
///
/// The log is opened and closed around each function, so rows of already
/// analyzed functions survive a later failure. Each site is also echoed to
/// the diagnostics writer.
pub struct StaticReporter<W: Write = io::Stderr> {
    config: ReportConfig,
    diagnostics: W,
    opened: bool,
}

impl StaticReporter<io::Stderr> {
    /// Reporter that echoes sites to stderr.
    pub fn new(config: ReportConfig) -> Self {
        Self::with_diagnostics(config, io::stderr())
    }
}

impl<W: Write> StaticReporter<W> {
    pub const fn with_diagnostics(config: ReportConfig, diagnostics: W) -> Self {
        Self {
            config,
            diagnostics,
            opened: false,
        }
    }

    pub const fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn into_diagnostics(self) -> W {
        self.diagnostics
    }

    /// Mode for the next open: the configured mode on first use in this run,
    /// append afterwards, and create whenever the reset trigger is visited.
    fn next_mode(&self, function: &str) -> LogMode {
        if self.config.reset_trigger.as_deref() == Some(function) {
            LogMode::Create
        } else if self.opened {
            LogMode::Append
        } else {
            self.config.initial_mode
        }
    }

    fn echo<H: IrView + ?Sized>(&mut self, ir: &H, function: &str, site: &IndirectSite<H>) {
        let result = writeln!(
            self.diagnostics,
            "Function pointer used in function: {function}\nInstruction: {}\nFunction pointed to: {}",
            ir.render_instr(site.instr),
            ir.render_value(&site.target)
        );
        if let Err(e) = result {
            warn!("failed to write diagnostics: {e}");
        }
    }

    /// Record every qualifying indirect call of `func`.
    pub fn run_on_function<H: IrView + ?Sized>(
        &mut self,
        ir: &H,
        func: H::Function,
    ) -> Result<FunctionReport> {
        let name = ir.function_name(func);
        let mut report = FunctionReport {
            function: name.clone(),
            records: Vec::new(),
        };
        if ir.is_declaration(func) {
            return Ok(report);
        }

        walk_function(ir, func, &mut |site: &IndirectSite<H>| {
            self.echo(ir, &name, site);
            report.records.push(LogRecord::from_site(ir, site));
        });

        let mode = self.next_mode(&name);
        self.opened = true;
        let mut log = ReportLog::open(&self.config.path, mode)?;
        for record in &report.records {
            log.record(record)?;
        }
        log.close()?;

        debug!(
            function = %name,
            sites = report.records.len(),
            ?mode,
            "Recorded indirect calls"
        );
        Ok(report)
    }

    /// Record every function of the module in order.
    pub fn run<H: IrView + ?Sized>(&mut self, ir: &H) -> Result<Vec<FunctionReport>> {
        let reports = ir
            .functions()
            .into_iter()
            .filter(|func| !ir.is_declaration(*func))
            .map(|func| self.run_on_function(ir, func))
            .collect::<Result<Vec<_>>>()?;
        let total: usize = reports.iter().map(|r| r.records.len()).sum();
        info!(
            sites = total,
            path = %self.config.path.display(),
            "Reported indirect calls"
        );
        Ok(reports)
    }
}
