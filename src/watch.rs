use std::fmt;
use std::sync::{Arc, Mutex};

use parts::PartId;
use simulation::Simulation;

/// A value the trace log watches for changes. Handles are cheap to clone
/// and may be written from thread models; the simulator re-reads every
/// watched value after each event and traces changes.
pub struct WatchedVar<T>
{
	cell: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for WatchedVar<T>
{
	fn clone(&self) -> WatchedVar<T>
	{
		WatchedVar{cell: self.cell.clone()}
	}
}

impl<T: fmt::Debug + Send + 'static> WatchedVar<T>
{
	fn new() -> WatchedVar<T>
	{
		WatchedVar{cell: Arc::new(Mutex::new(None))}
	}

	pub fn set(&self, value: T)
	{
		*lock(&self.cell) = Some(value);
	}

	pub fn clear(&self)
	{
		*lock(&self.cell) = None;
	}

	fn reader(&self) -> Box<dyn Fn() -> Option<String> + Send>
	{
		let cell = self.cell.clone();
		Box::new(move || lock(&cell).as_ref().map(|v| format!("{:?}", v)))
	}
}

// A poisoned cell just means a model thread panicked mid-set; the value
// is still the last complete write.
fn lock<T>(cell: &Arc<Mutex<Option<T>>>) -> ::std::sync::MutexGuard<Option<T>>
{
	match cell.lock() {
		Ok(guard) => guard,
		Err(poisoned) => poisoned.into_inner(),
	}
}

pub(crate) struct Watcher
{
	pub part: PartId,
	pub name: String,
	read: Box<dyn Fn() -> Option<String> + Send>,
	last: Option<String>,
}

impl Watcher
{
	/// Records and returns the current value without reporting a change.
	pub fn prime(&mut self) -> Option<String>
	{
		self.last = (self.read)();
		self.last.clone()
	}

	/// Returns the new rendering if the value changed since the last check.
	pub fn check(&mut self) -> Option<String>
	{
		let current = (self.read)();
		if current != self.last {
			self.last = current.clone();
			Some(current.unwrap_or_default())
		} else {
			None
		}
	}
}

impl Simulation
{
	/// Registers a watched variable belonging to a part and returns the
	/// handle the model writes through.
	pub fn new_watched_var<T: fmt::Debug + Send + 'static>(&mut self, part: PartId, name: &str) -> WatchedVar<T>
	{
		let var = WatchedVar::new();
		self.watchers.push(Watcher{
			part,
			name: name.to_string(),
			read: var.reader(),
			last: None});
		var
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn reports_only_changes()
	{
		let var: WatchedVar<u32> = WatchedVar::new();
		let mut watcher = Watcher{part: PartId(0), name: "count".to_string(), read: var.reader(), last: None};

		assert_eq!(watcher.prime(), None);
		assert_eq!(watcher.check(), None);

		var.set(2);
		assert_eq!(watcher.prime(), Some("2".to_string()));
		assert_eq!(watcher.check(), None);

		var.set(3);
		assert_eq!(watcher.check(), Some("3".to_string()));
		assert_eq!(watcher.check(), None);

		var.set(3);
		assert_eq!(watcher.check(), None);

		var.set(4);
		assert_eq!(watcher.check(), Some("4".to_string()));
	}
}
