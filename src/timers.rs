use event::*;
use parts::*;
use sched_rtos::{SchedId, WakeSource};
use sim_trace::TraceAction;
use simulation::Simulation;
use error::SimResult;

/// Identifies a timer. Timers belong to a part and hold at most one
/// pending expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub usize);

/// Who reacts when a timer expires.
#[derive(Clone, Copy, Debug)]
pub(crate) enum TimerRole
{
	/// The owning part's PartModel::timer_expired hook.
	Model,

	/// Ends a thread's busy slice or wait timeout (scheduler internal).
	SysCall(SchedId, usize),

	/// Latches has_fired and wakes the owning thread.
	VtTimer,
}

pub(crate) struct Timer
{
	pub part: PartId,
	pub name: String,
	pub role: TimerRole,
	pub pending: Option<EventId>,
	pub fired: bool,	// VtTimer latch, cleared by start/restart
}

impl Simulation
{
	/// Creates a timer whose expiry calls the part model's timer_expired.
	pub fn new_timer(&mut self, part: PartId, name: &str) -> TimerId
	{
		match self.parts.get(part).kind {
			PartKind::Model(_) => (),
			_ => panic!("part {} is not a model part", self.parts.path(part)),
		}
		self.add_timer(part, name, TimerRole::Model)
	}

	/// Creates a timer for a thread part: expiry latches has_fired and
	/// wakes the thread if it is waiting on the timer.
	pub fn new_vt_timer(&mut self, part: PartId, name: &str) -> TimerId
	{
		match self.parts.get(part).kind {
			PartKind::VThread(_) => (),
			_ => panic!("part {} is not a thread part", self.parts.path(part)),
		}
		self.add_timer(part, name, TimerRole::VtTimer)
	}

	pub(crate) fn add_timer(&mut self, part: PartId, name: &str, role: TimerRole) -> TimerId
	{
		let duplicate = self.parts.get(part).timers.iter()
			.any(|&t| self.timers[t.0].name == name);
		assert!(!duplicate, "part {} already has a timer named '{}'", self.parts.path(part), name);

		let id = TimerId(self.timers.len());
		self.timers.push(Timer{
			part,
			name: name.to_string(),
			role,
			pending: None,
			fired: false});
		self.parts.get_mut(part).timers.push(id);
		id
	}

	pub fn timer_path(&self, timer: TimerId) -> String
	{
		let t = &self.timers[timer.0];
		format!("{}.{}", self.parts.path(t.part), t.name)
	}

	/// Arms the timer. Panics if it is already armed or timeout is not
	/// positive; use timer_restart when the timer may be running.
	pub fn timer_start(&mut self, timer: TimerId, timeout: f64)
	{
		let path = self.timer_path(timer);
		assert!(timeout > 0.0, "timer {} timeout ({}) must be positive", path, timeout);
		assert!(self.timers[timer.0].pending.is_none(), "timer {} is already running", path);

		self.arm(timer, timeout);
		let part = self.timers[timer.0].part;
		let timeout = self.time_str(timeout);
		self.trace(Some(part), Some(path), Some(timeout), TraceAction::TimerStarted);
	}

	/// Cancels the pending expiry if there is one. Traced either way.
	pub fn timer_stop(&mut self, timer: TimerId)
	{
		if let Some(event) = self.timers[timer.0].pending.take() {
			self.cancel(event);
		}
		let part = self.timers[timer.0].part;
		let path = self.timer_path(timer);
		self.trace(Some(part), Some(path), None, TraceAction::TimerStopped);
	}

	/// Stop (silently) and start in one step.
	pub fn timer_restart(&mut self, timer: TimerId, timeout: f64)
	{
		let path = self.timer_path(timer);
		assert!(timeout > 0.0, "timer {} timeout ({}) must be positive", path, timeout);

		if let Some(event) = self.timers[timer.0].pending.take() {
			self.cancel(event);
		}
		self.arm(timer, timeout);
		let part = self.timers[timer.0].part;
		let timeout = self.time_str(timeout);
		self.trace(Some(part), Some(path), Some(timeout), TraceAction::TimerRestarted);
	}

	fn arm(&mut self, timer: TimerId, timeout: f64)
	{
		let time = self.time() + timeout;
		let event = self.schedule(time, EventKind::TimerExpired(timer));
		self.timers[timer.0].pending = Some(event);
		self.timers[timer.0].fired = false;
	}

	pub(crate) fn timer_expired_event(&mut self, timer: TimerId) -> SimResult<()>
	{
		self.timers[timer.0].pending = None;
		let part = self.timers[timer.0].part;
		let role = self.timers[timer.0].role;
		let path = self.timer_path(timer);
		self.trace(Some(part), Some(path), None, TraceAction::TimerExpired);

		match role {
			TimerRole::Model => {
				self.with_model(part, |model, ctx| model.timer_expired(ctx, timer));
				Ok(())
			}
			TimerRole::SysCall(sched, vt) => self.syscall_timer_expired(sched, vt),
			TimerRole::VtTimer => {
				self.timers[timer.0].fired = true;
				self.wake_thread(part, Some(WakeSource::Timer(timer)))
			}
		}
	}
}
