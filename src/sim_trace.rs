use glob;

use parts::PartId;
use sim_time::*;

/// The closed set of things that can appear in a trace. Consumers can
/// match on this exhaustively; the simulator never emits anything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceAction
{
	/// A message left an output port (scheduled to fly).
	MsgSent,
	/// A message arrived at an input port (or was dropped, for lost ones).
	MsgDelivered,
	TimerStarted,
	TimerStopped,
	TimerRestarted,
	TimerExpired,
	/// Free-form model annotation.
	Annotation,
	/// A part's status indicator changed.
	Status,
	/// A model assertion failed.
	AssertionFailed,
	/// A watched variable changed.
	ValueChanged,
}

impl TraceAction
{
	pub fn label(&self) -> &'static str
	{
		match *self {
			TraceAction::MsgSent => ">MSG",
			TraceAction::MsgDelivered => "<MSG",
			TraceAction::TimerStarted => "T-START",
			TraceAction::TimerStopped => "T-STOP",
			TraceAction::TimerRestarted => "T-RESTA",
			TraceAction::TimerExpired => "T-EXP",
			TraceAction::Annotation => "ANN",
			TraceAction::Status => "STA",
			TraceAction::AssertionFailed => "ASSFAIL",
			TraceAction::ValueChanged => "VC",
		}
	}
}

/// One record in the trace log.
#[derive(Clone, Debug)]
pub struct TraceEvent
{
	pub time: f64,
	pub part: Option<PartId>,
	/// Hierarchy name of the port, timer or watcher involved, if any.
	pub sub_obj: Option<String>,
	pub payload: Option<String>,
	pub action: TraceAction,
}

/// Append-only trace log, optionally printed live.
pub struct SimTracing
{
	events: Vec<TraceEvent>,
	printing: bool,
	time_unit: TimeUnit,
	colorize: bool,
	filters: Vec<glob::Pattern>,
	failures: Vec<String>,
}

const RED_ESCAPE: &'static str = "\x1b[31;1m";
const END_ESCAPE: &'static str = "\x1b[0m";

impl SimTracing
{
	pub fn new(printing: bool, time_unit: TimeUnit, colorize: bool, filters: Vec<glob::Pattern>) -> SimTracing
	{
		SimTracing {
			events: Vec::new(),
			printing,
			time_unit,
			colorize,
			filters,
			failures: Vec::new(),
		}
	}

	pub(crate) fn add(&mut self, event: TraceEvent, part_path: &str)
	{
		if self.printing && self.matches(part_path) {
			self.print(&event, part_path);
		}
		self.events.push(event);
	}

	pub(crate) fn record_failure(&mut self, text: String)
	{
		self.failures.push(text);
	}

	fn matches(&self, part_path: &str) -> bool
	{
		if self.filters.is_empty() {
			return true;
		}
		self.filters.iter().any(|p| p.matches(part_path))
	}

	fn print(&self, event: &TraceEvent, part_path: &str)
	{
		let time = time_str(event.time, self.time_unit);
		let sub = event.sub_obj.as_ref().map_or("", |s| s.as_str());
		let payload = event.payload.as_ref().map_or("", |s| s.as_str());
		let line = format!("TRC: {:>12} {:<8} {:<20} {} {}",
			time, event.action.label(), part_path, sub, payload);
		if self.colorize && event.action == TraceAction::AssertionFailed {
			print!("{}{}{}\n", RED_ESCAPE, line, END_ESCAPE);
		} else {
			print!("{}\n", line);
		}
	}

	/// Everything recorded so far, in order.
	pub fn traced_events(&self) -> &[TraceEvent]
	{
		&self.events
	}

	pub fn assertion_count(&self) -> usize
	{
		self.failures.len()
	}

	pub fn assertion_failures(&self) -> &[String]
	{
		&self.failures
	}

	// ---- query helpers, mostly for tests ----------------------------

	/// The nth annotation a part made at a time (nth is zero based).
	pub fn find_annotation(&self, time: f64, part: PartId, nth: usize) -> Option<&str>
	{
		self.events.iter()
			.filter(|e| e.action == TraceAction::Annotation && e.part == Some(part) && near(e.time, time))
			.nth(nth)
			.and_then(|e| e.payload.as_ref().map(|p| p.as_str()))
	}

	/// The last status indicator a part set at a time.
	pub fn find_status(&self, time: f64, part: PartId) -> Option<&str>
	{
		self.events.iter()
			.filter(|e| e.action == TraceAction::Status && e.part == Some(part) && near(e.time, time))
			.last()
			.and_then(|e| e.payload.as_ref().map(|p| p.as_str()))
	}

	/// (time, payload) of every delivery to the named port.
	pub fn deliveries(&self, port_path: &str) -> Vec<(f64, &str)>
	{
		self.events.iter()
			.filter(|e| e.action == TraceAction::MsgDelivered
				&& e.sub_obj.as_ref().map_or(false, |s| s == port_path))
			.map(|e| (e.time, e.payload.as_ref().map_or("", |p| p.as_str())))
			.collect()
	}

	/// Times at which a lost message was dropped in flight.
	pub fn lost_times(&self) -> Vec<f64>
	{
		self.events.iter()
			.filter(|e| e.action == TraceAction::MsgDelivered
				&& e.payload.as_ref().map_or(false, |p| p.ends_with("(LOST)")))
			.map(|e| e.time)
			.collect()
	}

	/// True if trace times never go backward.
	pub fn is_monotonic(&self) -> bool
	{
		self.events.windows(2).all(|w| w[0].time <= w[1].time)
	}
}

/// Times in traces come out of float arithmetic, so tests compare with a
/// tolerance far below any model's time scale.
pub fn near(a: f64, b: f64) -> bool
{
	(a - b).abs() < 1.0e-9
}
