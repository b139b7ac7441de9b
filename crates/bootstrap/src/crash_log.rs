use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{Local, NaiveDateTime};

/// Default crash log file name, relative to the working directory.
pub const DEFAULT_CRASH_LOG: &str = "0DuetCrash.log";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER_SUFFIX: &str = " crashed";

static GLOBAL: OnceLock<CrashLog> = OnceLock::new();

/// Append-only crash log.
///
/// Each entry is a header line `YYYY-MM-DD HH:MM:SS - <label> crashed`
/// followed by the diagnostic. Existing content is never truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashLog {
	path: PathBuf,
}

/// A parsed crash log header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashEntry {
	pub at: NaiveDateTime,
	pub label: String,
}

impl CrashLog {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// The process-wide log, created on first use at [`DEFAULT_CRASH_LOG`]
	/// unless [`CrashLog::install`] ran earlier.
	pub fn global() -> &'static CrashLog {
		GLOBAL.get_or_init(|| Self::new(DEFAULT_CRASH_LOG))
	}

	/// Sets the process-wide log path. Returns the instance actually in use,
	/// which is the earlier one if the global was already initialized.
	pub fn install(path: impl Into<PathBuf>) -> &'static CrashLog {
		let path = path.into();
		GLOBAL.get_or_init(|| Self::new(path))
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Appends one entry. The entry is written with a single call so
	/// concurrent writers do not interleave inside it.
	pub fn record(&self, label: &str, detail: &str) -> std::io::Result<()> {
		let mut entry = format!("{} - {label}{HEADER_SUFFIX}\n", Local::now().format(TIMESTAMP_FORMAT));
		for line in detail.lines() {
			entry.push_str(line);
			entry.push('\n');
		}
		let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
		file.write_all(entry.as_bytes())
	}

	/// Appends an entry whose diagnostic is `error` and its source chain.
	pub fn record_error(&self, label: &str, error: &dyn std::error::Error) -> std::io::Result<()> {
		let mut detail = error.to_string();
		let mut source = error.source();
		while let Some(cause) = source {
			let _ = write!(detail, "\ncaused by: {cause}");
			source = cause.source();
		}
		self.record(label, &detail)
	}

	/// [`CrashLog::record`] for callers that cannot propagate a write
	/// failure; the failure is traced as `crash_log.write_failed`. Returns
	/// whether the entry was written.
	pub fn report(&self, label: &str, detail: &str) -> bool {
		self.traced(self.record(label, detail))
	}

	/// [`CrashLog::record_error`] with the write failure traced, as in [`CrashLog::report`].
	pub fn report_error(&self, label: &str, error: &dyn std::error::Error) -> bool {
		self.traced(self.record_error(label, error))
	}

	fn traced(&self, written: std::io::Result<()>) -> bool {
		match written {
			Ok(()) => true,
			Err(err) => {
				tracing::error!(path = %self.path.display(), error = %err, "crash_log.write_failed");
				false
			}
		}
	}

	/// Reads back entry headers. A missing file has no entries.
	pub fn entries(&self) -> std::io::Result<Vec<CrashEntry>> {
		let text = match std::fs::read_to_string(&self.path) {
			Ok(text) => text,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err),
		};
		Ok(text.lines().filter_map(parse_header).collect())
	}
}

fn parse_header(line: &str) -> Option<CrashEntry> {
	let (stamp, rest) = line.split_at_checked(19)?;
	let at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
	let label = rest.strip_prefix(" - ")?.strip_suffix(HEADER_SUFFIX)?;
	Some(CrashEntry { at, label: label.to_string() })
}
