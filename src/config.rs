use glob;
use std::time::Duration;

use sim_time::*;

/// Severity of the simulator's own progress messages (SIM: lines).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
	Error,
	Warning,
	Info,
	Debug,
}

/// Settings for a Simulation. Most of these can be tweaked from the demo
/// drivers' command lines.
pub struct Config
{
	/// Progress messages at or below this level are printed.
	pub log_level: LogLevel,

	/// If set then trace events are printed as they happen (TRC: lines).
	pub trace_printing: bool,

	/// If non-empty only parts whose path matches one of the patterns are
	/// printed, e.g. "top.net*". Has no effect on the recorded trace.
	pub trace_filter: Vec<glob::Pattern>,

	/// Use escape codes to color assertion failures in trace output.
	pub colorize: bool,

	/// Unit times are displayed with.
	pub time_unit: TimeUnit,

	/// Runs stop once this many events have executed.
	pub max_events: u64,

	/// If set (the default) then the run stops after the event in which a
	/// model assertion failed. Failures are reported at the end either way.
	pub stop_on_assertion_failure: bool,

	/// Wall clock bound on a thread model reaching its next system call.
	/// None means wait forever (handy when stepping through model code in
	/// a debugger).
	pub com_timeout: Option<Duration>,
}

impl Config
{
	pub fn new() -> Config
	{
		Config {
			log_level: LogLevel::Info,
			trace_printing: true,
			trace_filter: Vec::new(),
			colorize: false,
			time_unit: TimeUnit::Seconds,
			max_events: 100_000,
			stop_on_assertion_failure: true,
			com_timeout: Some(Duration::from_secs(2)),
		}
	}
}

/// Returns a usage string for command lines taking a log level option.
pub fn log_levels() -> &'static str
{
	"error, warning, info, or debug"
}

pub fn parse_log_level(text: &str) -> Option<LogLevel>
{
	match text {
		"error" => Some(LogLevel::Error),
		"warning" => Some(LogLevel::Warning),
		"info" => Some(LogLevel::Info),
		"debug" => Some(LogLevel::Debug),
		_ => None,
	}
}
