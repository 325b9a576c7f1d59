use std::error::Error;
use std::fmt;

/// Why a run ended. These are all normal endings; fatal conditions come
/// back as a SimError instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason
{
	/// An event would have executed past the stop time.
	StopTimeReached,
	/// The event queue drained.
	NoMoreEvents,
	/// Config::max_events was hit (usually a model stuck in a loop).
	EventLimit,
	/// A model assertion failed and Config::stop_on_assertion_failure is set.
	AssertionFailure,
}

/// Fatal runtime failures. Model-authoring mistakes (bad timer arguments,
/// duplicate bindings, scheduling into the past, ...) panic instead: they
/// are construction bugs, not conditions a caller can handle.
#[derive(Debug)]
pub enum SimError
{
	/// Thread model code panicked.
	ModelFailure
	{
		part: String,
		message: String,
	},

	/// A thread did not reach its next system call within
	/// Config::com_timeout (wall clock), so it is presumed hung.
	LivenessTimeout
	{
		part: String,
	},

	/// A terminated thread did not shut down within the join timeout.
	ThreadJoin
	{
		part: String,
	},

	/// Simulation::run was called a second time.
	AlreadyRan,
}

impl fmt::Display for SimError
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		match *self {
			SimError::ModelFailure{ref part, ref message} =>
				write!(f, "model code in {} failed: {}", part, message),
			SimError::LivenessTimeout{ref part} =>
				write!(f, "thread {} did not reach a system call in time", part),
			SimError::ThreadJoin{ref part} =>
				write!(f, "thread {} did not shut down", part),
			SimError::AlreadyRan =>
				write!(f, "the simulation has already run"),
		}
	}
}

impl Error for SimError
{
}

pub type SimResult<T> = Result<T, SimError>;
