use std::cmp::Ordering;

use ports::OutPortId;
use timers::TimerId;

/// Identifies one pending event. Ids are never reused so a stale id can't
/// accidentally cancel somebody else's event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventId(pub u64);

/// What happens when a scheduled event executes.
#[derive(Clone, Copy, Debug)]
pub enum EventKind
{
	/// Deliver the message at the head of the output port's pipeline.
	MsgFire(OutPortId),

	/// A timer expired.
	TimerExpired(TimerId),
}

pub(crate) struct ScheduledEvent
{
	pub time: f64,
	pub seq: u64,	// insertion order, so equal times pop FIFO
	pub id: EventId,
	pub kind: EventKind,
}

impl PartialEq for ScheduledEvent
{
	fn eq(&self, other: &ScheduledEvent) -> bool
	{
		self.seq == other.seq
	}
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent
{
	fn partial_cmp(&self, other: &ScheduledEvent) -> Option<Ordering>
	{
		Some(self.cmp(other))
	}
}

impl Ord for ScheduledEvent
{
	fn cmp(&self, other: &ScheduledEvent) -> Ordering
	{
		// reversed because BinaryHeap returns the largest values first
		other.time.total_cmp(&self.time).then(other.seq.cmp(&self.seq))
	}
}
