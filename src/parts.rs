use message::*;
use ports::{InPortId, PortRef};
use sched_rtos::SchedId;
use simulation::SimContext;
use timers::TimerId;
use vthread::VtModel;

/// Identifies a part. Parts live for the whole simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartId(pub usize);

/// A reactive model: all hooks run on the simulator thread with the clock
/// frozen at the current event's time.
pub trait PartModel
{
	/// Called once when the run starts, before any event executes.
	fn start(&mut self, _ctx: &mut SimContext)
	{
	}

	/// Called once when the run finishes, on every exit path.
	fn terminate(&mut self, _ctx: &mut SimContext)
	{
	}

	/// A message arrived on one of the part's input ports.
	fn msg_received(&mut self, ctx: &mut SimContext, port: InPortId, msg: Box<dyn Msg>);

	/// One of the part's timers expired.
	fn timer_expired(&mut self, ctx: &mut SimContext, timer: TimerId);
}

pub(crate) struct VThreadPart
{
	pub model: Option<Box<dyn VtModel>>,	// taken while the OS thread runs
	pub remote: bool,
	pub control_port: Option<InPortId>,
	pub sched: Option<(SchedId, usize)>,
}

pub(crate) enum PartKind
{
	/// Passive grouping part, or a reactive part once a model is set.
	Model(Option<Box<dyn PartModel>>),

	/// Runs its model on an OS thread under an RTOS style scheduler.
	VThread(VThreadPart),

	/// An RTOS style scheduler.
	Scheduler(SchedId),
}

pub(crate) struct Part
{
	pub name: String,
	pub parent: Option<PartId>,
	pub children: Vec<PartId>,
	pub kind: PartKind,
	pub ports: Vec<PortRef>,
	pub timers: Vec<TimerId>,
}

pub(crate) struct Parts
{
	parts: Vec<Part>,
}

impl Parts
{
	pub fn new() -> Parts
	{
		Parts{parts: Vec::new()}
	}

	pub fn add(&mut self, name: &str, parent: Option<PartId>, kind: PartKind) -> PartId
	{
		assert!(!name.is_empty(), "part name should not be empty");
		assert!(!name.contains('.'), "part name '{}' can't contain dots", name);

		let siblings = match parent {
			Some(p) => &self.parts[p.0].children,
			None => return self.append(name, parent, kind, true),
		};
		let duplicate = siblings.iter().any(|&c| self.parts[c.0].name == name);
		assert!(!duplicate, "part '{}' already has a child named '{}'", self.path(parent.unwrap()), name);
		self.append(name, parent, kind, false)
	}

	fn append(&mut self, name: &str, parent: Option<PartId>, kind: PartKind, top: bool) -> PartId
	{
		if top {
			let duplicate = self.parts.iter().any(|p| p.parent.is_none() && p.name == name);
			assert!(!duplicate, "there is already a top level part named '{}'", name);
		}

		let id = PartId(self.parts.len());
		self.parts.push(Part{
			name: name.to_string(),
			parent,
			children: Vec::new(),
			kind,
			ports: Vec::new(),
			timers: Vec::new()});
		if let Some(p) = parent {
			self.parts[p.0].children.push(id);
		}
		id
	}

	pub fn get(&self, id: PartId) -> &Part
	{
		&self.parts[id.0]
	}

	pub fn get_mut(&mut self, id: PartId) -> &mut Part
	{
		&mut self.parts[id.0]
	}

	pub fn len(&self) -> usize
	{
		self.parts.len()
	}

	/// Dot-joined hierarchy name, e.g. "net.nic.rx".
	pub fn path(&self, id: PartId) -> String
	{
		match self.parts[id.0].parent {
			Some(parent) => format!("{}.{}", self.path(parent), self.parts[id.0].name),
			None => self.parts[id.0].name.clone(),
		}
	}

	pub fn top_level(&self) -> Vec<PartId>
	{
		(0..self.parts.len())
			.map(PartId)
			.filter(|&id| self.parts[id.0].parent.is_none())
			.collect()
	}

	/// All parts, parents before children.
	pub fn walk(&self) -> Vec<PartId>
	{
		let mut out = Vec::with_capacity(self.parts.len());
		for id in self.top_level() {
			self.walk_into(id, &mut out);
		}
		out
	}

	fn walk_into(&self, id: PartId, out: &mut Vec<PartId>)
	{
		out.push(id);
		for &child in self.parts[id.0].children.iter() {
			self.walk_into(child, out);
		}
	}

	pub fn find_by_name(&self, hierarchy_name: &str) -> Option<PartId>
	{
		let mut elems = hierarchy_name.split('.');
		let first = elems.next()?;
		let mut current = self.top_level().into_iter()
			.find(|&id| self.parts[id.0].name == first)?;
		for elem in elems {
			current = self.parts[current.0].children.iter()
				.cloned()
				.find(|&c| self.parts[c.0].name == elem)?;
		}
		Some(current)
	}
}

#[cfg(test)]
mod tests
{
	use super::*;

	fn grouping() -> PartKind
	{
		PartKind::Model(None)
	}

	#[test]
	fn paths_join_with_dots()
	{
		let mut parts = Parts::new();
		let top = parts.add("net", None, grouping());
		let nic = parts.add("nic", Some(top), grouping());
		let rx = parts.add("rx", Some(nic), grouping());

		assert_eq!(parts.path(top), "net");
		assert_eq!(parts.path(rx), "net.nic.rx");
	}

	#[test]
	fn finds_parts_by_hierarchy_name()
	{
		let mut parts = Parts::new();
		let top = parts.add("net", None, grouping());
		let nic = parts.add("nic", Some(top), grouping());
		let rx = parts.add("rx", Some(nic), grouping());
		parts.add("other", None, grouping());

		assert_eq!(parts.find_by_name("net.nic.rx"), Some(rx));
		assert_eq!(parts.find_by_name("net.nic"), Some(nic));
		assert_eq!(parts.find_by_name("net.nic.tx"), None);
		assert_eq!(parts.find_by_name("bogus"), None);
	}

	#[test]
	fn walk_is_preorder()
	{
		let mut parts = Parts::new();
		let a = parts.add("a", None, grouping());
		let a1 = parts.add("one", Some(a), grouping());
		let a1x = parts.add("x", Some(a1), grouping());
		let a2 = parts.add("two", Some(a), grouping());
		let b = parts.add("b", None, grouping());

		assert_eq!(parts.walk(), vec![a, a1, a1x, a2, b]);
	}

	#[test]
	#[should_panic(expected = "already has a child")]
	fn duplicate_sibling_names_panic()
	{
		let mut parts = Parts::new();
		let top = parts.add("net", None, grouping());
		parts.add("nic", Some(top), grouping());
		parts.add("nic", Some(top), grouping());
	}
}
