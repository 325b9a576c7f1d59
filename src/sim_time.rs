//! Simulation time is a plain f64 in seconds. This module has the display
//! side of it: trace and log lines are scaled to a configurable unit so a
//! microsecond-scale model doesn't print as 0.000001.

/// One millisecond in seconds, e.g. `timer_start(tmr, 5.0*MS)`.
pub const MS: f64 = 1.0e-3;

/// One microsecond in seconds.
pub const US: f64 = 1.0e-6;

/// One nanosecond in seconds.
pub const NS: f64 = 1.0e-9;

/// Unit used when rendering times in traces and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit
{
	Seconds,
	Milliseconds,
	Microseconds,
	Nanoseconds,
}

impl TimeUnit
{
	pub fn scale(&self) -> f64
	{
		match *self {
			TimeUnit::Seconds => 1.0,
			TimeUnit::Milliseconds => 1.0e3,
			TimeUnit::Microseconds => 1.0e6,
			TimeUnit::Nanoseconds => 1.0e9,
		}
	}

	pub fn suffix(&self) -> &'static str
	{
		match *self {
			TimeUnit::Seconds => "s",
			TimeUnit::Milliseconds => "ms",
			TimeUnit::Microseconds => "us",
			TimeUnit::Nanoseconds => "ns",
		}
	}

	pub fn from_suffix(text: &str) -> Option<TimeUnit>
	{
		match text {
			"s" => Some(TimeUnit::Seconds),
			"ms" => Some(TimeUnit::Milliseconds),
			"us" => Some(TimeUnit::Microseconds),
			"ns" => Some(TimeUnit::Nanoseconds),
			_ => None,
		}
	}
}

/// Formats a time for display, e.g. 0.0015 s in Milliseconds is "1.5ms".
pub fn time_str(time: f64, unit: TimeUnit) -> String
{
	format!("{:.1}{}", time*unit.scale(), unit.suffix())
}

/// Parses times like "100", "1.5ms" or "20us" into seconds. Used by the
/// demo drivers to parse command line options.
pub fn parse_time(text: &str) -> Result<f64, String>
{
	let suffixes = [("ms", MS), ("us", US), ("ns", NS), ("s", 1.0)];
	for &(suffix, scale) in suffixes.iter() {
		if text.ends_with(suffix) {
			let digits = &text[..text.len() - suffix.len()];
			return match digits.parse::<f64>() {
				Ok(value) => Ok(value*scale),
				Err(_) => Err(format!("can't parse '{}' as a time", text)),
			};
		}
	}
	match text.parse::<f64>() {
		Ok(value) => Ok(value),
		Err(_) => Err(format!("can't parse '{}' as a time", text)),
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn formats_with_unit_scaling()
	{
		assert_eq!(time_str(1.5, TimeUnit::Seconds), "1.5s");
		assert_eq!(time_str(0.0015, TimeUnit::Milliseconds), "1.5ms");
		assert_eq!(time_str(3.0e-4, TimeUnit::Microseconds), "300.0us");
	}

	#[test]
	fn parses_suffixed_times()
	{
		assert_eq!(parse_time("12").unwrap(), 12.0);
		assert_eq!(parse_time("1.5ms").unwrap(), 0.0015);
		assert_eq!(parse_time("20us").unwrap(), 2.0e-5);
		assert_eq!(parse_time("3s").unwrap(), 3.0);
		assert!(parse_time("bogus").is_err());
	}
}
