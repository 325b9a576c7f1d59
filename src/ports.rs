use std::any::type_name;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use error::SimResult;
use event::EventKind;
use message::*;
use parts::*;
use sched_rtos::WakeSource;
use sim_trace::TraceAction;
use simulation::Simulation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InPortId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutPortId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IoPortId(pub usize);

/// Any of the three port flavors, e.g. as returned by the port builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortRef
{
	In(InPortId),
	Out(OutPortId),
	Io(IoPortId),
}

/// Flavor requested from create_ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind
{
	In,
	Out,
	Io,
	VtSamplingIn,
	VtQueuingIn,
	VtSamplingIo,
	VtQueuingIo,
}

/// How messages arriving on an input port are consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InBehavior
{
	/// Dispatch to the owning part model's msg_received hook.
	Model,

	/// Depth-1 buffer for a thread; every arrival overwrites and wakes.
	/// Reads never consume.
	VtSampling,

	/// Unbounded FIFO for a thread; reads consume, arrivals wake only
	/// when the buffer goes from empty to one.
	VtQueuing,

	/// Remote control for a thread: accepts "start" and "kill".
	ThreadControl,
}

pub(crate) struct InPort
{
	pub part: PartId,
	pub name: String,
	pub behavior: InBehavior,
	pub bound_from: Vec<OutPortId>,
	pub buffer: VecDeque<Box<dyn Msg>>,
	pub io_port: Option<IoPortId>,
}

/// One message in an output port's pipeline.
pub(crate) struct PendingMsg
{
	pub payload: Box<dyn Msg>,
	pub text: String,	// Debug rendering captured at send time
	pub flight_time: f64,
	pub request_time: f64,
	pub seq: u64,
	pub lost: bool,
}

pub(crate) struct OutPort
{
	pub part: PartId,
	pub name: String,
	pub bound_to: Vec<InPortId>,
	pub pending: VecDeque<PendingMsg>,
	pub send_seq: u64,	// sequence number the next send gets
	pub lost_seqs: BinaryHeap<Reverse<u64>>,
	pub msg_types: Vec<&'static str>,
	pub io_port: Option<IoPortId>,
}

impl OutPort
{
	/// True if the send with this sequence number was marked lost.
	pub fn take_lost(&mut self, seq: u64) -> bool
	{
		if let Some(&Reverse(head)) = self.lost_seqs.peek() {
			if head == seq {
				self.lost_seqs.pop();
				return true;
			}
		}
		false
	}

	fn learn_type(&mut self, name: &'static str)
	{
		if !self.msg_types.contains(&name) {
			self.msg_types.push(name);
		}
	}
}

/// An input and an output half that travel together, bound crosswise to
/// a peer IO port.
pub(crate) struct IoPort
{
	pub part: PartId,
	pub name: String,
	pub in_port: InPortId,
	pub out_port: OutPortId,
}

impl Simulation
{
	// ---- construction ------------------------------------------------

	/// Input port for a model part.
	pub fn new_input_port(&mut self, part: PartId, name: &str) -> InPortId
	{
		match self.parts.get(part).kind {
			PartKind::Model(_) => (),
			_ => panic!("part {} is not a model part", self.parts.path(part)),
		}
		self.add_in_port(part, name, InBehavior::Model)
	}

	pub fn new_output_port(&mut self, part: PartId, name: &str) -> OutPortId
	{
		self.assert_new_port_name(part, name);
		let id = OutPortId(self.out_ports.len());
		self.out_ports.push(OutPort{
			part,
			name: name.to_string(),
			bound_to: Vec::new(),
			pending: VecDeque::new(),
			send_seq: 0,
			lost_seqs: BinaryHeap::new(),
			msg_types: Vec::new(),
			io_port: None});
		self.parts.get_mut(part).ports.push(PortRef::Out(id));
		id
	}

	pub fn new_io_port(&mut self, part: PartId, name: &str) -> IoPortId
	{
		self.assert_new_port_name(part, name);
		let in_port = self.add_in_port(part, &format!("{}_in", name), InBehavior::Model);
		let out_port = self.new_output_port(part, &format!("{}_out", name));
		self.register_io(part, name, in_port, out_port)
	}

	/// Sampling input for a thread part (depth 1, reads never consume).
	pub fn new_vt_sampling_in_port(&mut self, part: PartId, name: &str) -> InPortId
	{
		self.assert_thread_part(part);
		self.add_in_port(part, name, InBehavior::VtSampling)
	}

	/// Queuing input for a thread part (unbounded FIFO, reads consume).
	pub fn new_vt_queuing_in_port(&mut self, part: PartId, name: &str) -> InPortId
	{
		self.assert_thread_part(part);
		self.add_in_port(part, name, InBehavior::VtQueuing)
	}

	pub fn new_vt_io_port(&mut self, part: PartId, name: &str, queuing: bool) -> IoPortId
	{
		self.assert_thread_part(part);
		self.assert_new_port_name(part, name);
		let behavior = if queuing {InBehavior::VtQueuing} else {InBehavior::VtSampling};
		let in_port = self.add_in_port(part, &format!("{}_in", name), behavior);
		let out_port = self.new_output_port(part, &format!("{}_out", name));
		self.register_io(part, name, in_port, out_port)
	}

	/// Builds several ports of one flavor at once, returning them by name.
	pub fn create_ports(&mut self, part: PartId, kind: PortKind, names: &[&str]) -> HashMap<String, PortRef>
	{
		let mut out = HashMap::new();
		for &name in names.iter() {
			let port = match kind {
				PortKind::In => PortRef::In(self.new_input_port(part, name)),
				PortKind::Out => PortRef::Out(self.new_output_port(part, name)),
				PortKind::Io => PortRef::Io(self.new_io_port(part, name)),
				PortKind::VtSamplingIn => PortRef::In(self.new_vt_sampling_in_port(part, name)),
				PortKind::VtQueuingIn => PortRef::In(self.new_vt_queuing_in_port(part, name)),
				PortKind::VtSamplingIo => PortRef::Io(self.new_vt_io_port(part, name, false)),
				PortKind::VtQueuingIo => PortRef::Io(self.new_vt_io_port(part, name, true)),
			};
			out.insert(name.to_string(), port);
		}
		out
	}

	pub(crate) fn add_in_port(&mut self, part: PartId, name: &str, behavior: InBehavior) -> InPortId
	{
		self.assert_new_port_name(part, name);
		let id = InPortId(self.in_ports.len());
		self.in_ports.push(InPort{
			part,
			name: name.to_string(),
			behavior,
			bound_from: Vec::new(),
			buffer: VecDeque::new(),
			io_port: None});
		self.parts.get_mut(part).ports.push(PortRef::In(id));
		id
	}

	fn register_io(&mut self, part: PartId, name: &str, in_port: InPortId, out_port: OutPortId) -> IoPortId
	{
		let id = IoPortId(self.io_ports.len());
		self.io_ports.push(IoPort{part, name: name.to_string(), in_port, out_port});
		self.in_ports[in_port.0].io_port = Some(id);
		self.out_ports[out_port.0].io_port = Some(id);
		self.parts.get_mut(part).ports.push(PortRef::Io(id));
		id
	}

	fn assert_thread_part(&self, part: PartId)
	{
		match self.parts.get(part).kind {
			PartKind::VThread(_) => (),
			_ => panic!("part {} is not a thread part", self.parts.path(part)),
		}
	}

	fn assert_new_port_name(&self, part: PartId, name: &str)
	{
		assert!(!name.is_empty(), "port name should not be empty");
		let duplicate = self.parts.get(part).ports.iter().any(|p| {
			match *p {
				PortRef::In(id) => self.in_ports[id.0].name == name,
				PortRef::Out(id) => self.out_ports[id.0].name == name,
				PortRef::Io(id) => self.io_ports[id.0].name == name,
			}
		});
		assert!(!duplicate, "part {} already has a port named '{}'", self.parts.path(part), name);
	}

	pub fn io_in(&self, port: IoPortId) -> InPortId
	{
		self.io_ports[port.0].in_port
	}

	pub fn io_out(&self, port: IoPortId) -> OutPortId
	{
		self.io_ports[port.0].out_port
	}

	pub fn in_port_path(&self, port: InPortId) -> String
	{
		let p = &self.in_ports[port.0];
		format!("{}.{}", self.parts.path(p.part), p.name)
	}

	pub fn out_port_path(&self, port: OutPortId) -> String
	{
		let p = &self.out_ports[port.0];
		format!("{}.{}", self.parts.path(p.part), p.name)
	}

	// ---- binding -----------------------------------------------------

	/// Binds an output to an input. Bindings are monotonic: the same pair
	/// can't be bound twice and bindings are never removed.
	pub fn bind(&mut self, from: OutPortId, to: InPortId)
	{
		let duplicate = self.out_ports[from.0].bound_to.contains(&to);
		assert!(!duplicate, "port {} is already bound to {}",
			self.out_port_path(from), self.in_port_path(to));

		self.out_ports[from.0].bound_to.push(to);
		self.in_ports[to.0].bound_from.push(from);
	}

	/// Binds two IO ports crosswise: a's output to b's input and b's
	/// output to a's input.
	pub fn bind_io(&mut self, a: IoPortId, b: IoPortId)
	{
		let (a_in, a_out) = (self.io_ports[a.0].in_port, self.io_ports[a.0].out_port);
		let (b_in, b_out) = (self.io_ports[b.0].in_port, self.io_ports[b.0].out_port);
		self.bind(a_out, b_in);
		self.bind(b_out, a_in);
	}

	/// Resolves a port by hierarchy name, e.g. "net.nic.rx". IO port
	/// halves resolve by their "_in"/"_out" names.
	pub fn find_port_by_name(&self, hierarchy_name: &str) -> Option<PortRef>
	{
		for id in self.parts.walk() {
			let path = self.parts.path(id);
			for port in self.parts.get(id).ports.iter() {
				let (name, found) = match *port {
					PortRef::In(p) => (self.in_ports[p.0].name.clone(), PortRef::In(p)),
					PortRef::Out(p) => (self.out_ports[p.0].name.clone(), PortRef::Out(p)),
					PortRef::Io(p) => (self.io_ports[p.0].name.clone(), PortRef::Io(p)),
				};
				if format!("{}.{}", path, name) == hierarchy_name {
					return Some(found);
				}
			}
		}
		None
	}

	/// Creates many bindings at once from hierarchy names: every listed
	/// output is bound to every listed input. IO ports contribute both
	/// halves but are never bound to their own peer half.
	pub fn smart_bind(&mut self, bindings: &[&[&str]])
	{
		for binding in bindings.iter() {
			self.single_smart_bind(binding);
		}
	}

	fn single_smart_bind(&mut self, binding: &[&str])
	{
		let mut outs = Vec::new();
		let mut ins = Vec::new();
		for name in binding.iter() {
			match self.find_port_by_name(name) {
				Some(PortRef::Out(p)) => outs.push(p),
				Some(PortRef::In(p)) => ins.push(p),
				Some(PortRef::Io(p)) => {
					outs.push(self.io_ports[p.0].out_port);
					ins.push(self.io_ports[p.0].in_port);
				}
				None => panic!("port '{}' not found", name),
			}
		}

		for &out in outs.iter() {
			for &inp in ins.iter() {
				let same_io = self.out_ports[out.0].io_port.is_some()
					&& self.out_ports[out.0].io_port == self.in_ports[inp.0].io_port;
				if !same_io {
					self.bind(out, inp);
				}
			}
		}
	}

	pub(crate) fn check_unbound_ports(&mut self)
	{
		let mut warnings = Vec::new();
		for port in 0..self.out_ports.len() {
			if self.out_ports[port].bound_to.is_empty() {
				warnings.push(format!("output port {} is not bound", self.out_port_path(OutPortId(port))));
			}
		}
		for port in 0..self.in_ports.len() {
			if self.in_ports[port].bound_from.is_empty() {
				warnings.push(format!("input port {} is not bound", self.in_port_path(InPortId(port))));
			}
		}
		for warning in warnings {
			self.log_warning(&warning);
		}
	}

	// ---- sending -----------------------------------------------------

	/// Queues a message on an output port. The payload is copied into the
	/// pipeline, so the caller is free to keep mutating its own value.
	pub fn send<M: Msg>(&mut self, port: OutPortId, msg: M, flight_time: f64)
	{
		let text = format!("{:?}", msg);
		self.send_msg(port, Box::new(msg), text, type_name::<M>(), flight_time);
	}

	pub(crate) fn send_msg(&mut self, port: OutPortId, payload: Box<dyn Msg>, text: String,
		msg_type: &'static str, flight_time: f64)
	{
		assert!(flight_time >= 0.0, "flight time ({}) can't be negative", flight_time);
		assert!(!self.out_ports[port.0].bound_to.is_empty(),
			"send on unbound port {}", self.out_port_path(port));

		let request_time = self.time();
		let (seq, lost) = {
			let out = &mut self.out_ports[port.0];
			out.learn_type(msg_type);
			let seq = out.send_seq;
			out.send_seq += 1;
			let lost = out.take_lost(seq);
			(seq, lost)
		};
		self.out_ports[port.0].pending.push_back(PendingMsg{
			payload,
			text,
			flight_time,
			request_time,
			seq,
			lost});

		// only the head of the pipeline has a scheduled fire event
		if self.out_ports[port.0].pending.len() == 1 {
			self.schedule_fire(port);
		}
	}

	/// Marks the nth future send on this port as lost (0 = the very next).
	/// Duplicate injections for the same send coalesce.
	pub fn inject_lost(&mut self, port: OutPortId, next_seq: u64)
	{
		let out = &mut self.out_ports[port.0];
		let seq = out.send_seq + next_seq;
		let duplicate = out.lost_seqs.iter().any(|&Reverse(s)| s == seq);
		if !duplicate {
			out.lost_seqs.push(Reverse(seq));
		}
	}

	fn schedule_fire(&mut self, port: OutPortId)
	{
		let (flight_time, text, lost) = {
			let head = &self.out_ports[port.0].pending[0];
			(head.flight_time, head.text.clone(), head.lost)
		};
		let time = self.time() + flight_time;
		self.schedule(time, EventKind::MsgFire(port));

		let part = self.out_ports[port.0].part;
		let path = self.out_port_path(port);
		let payload = if lost {format!("{} (LOST)", text)} else {text};
		self.trace(Some(part), Some(path), Some(payload), TraceAction::MsgSent);
	}

	pub(crate) fn execute_fire(&mut self, port: OutPortId) -> SimResult<()>
	{
		let msg = match self.out_ports[port.0].pending.pop_front() {
			Some(m) => m,
			None => panic!("internal: fire on port {} with an empty pipeline", self.out_port_path(port)),
		};

		if msg.lost {
			// dropped in flight: traced, delivered to nobody
			let part = self.out_ports[port.0].part;
			let path = self.out_port_path(port);
			self.trace(Some(part), Some(path), Some(format!("{} (LOST)", msg.text)), TraceAction::MsgDelivered);
		} else {
			let receivers = self.out_ports[port.0].bound_to.clone();
			for to in receivers {
				let part = self.in_ports[to.0].part;
				let path = self.in_port_path(to);
				self.trace(Some(part), Some(path), Some(msg.text.clone()), TraceAction::MsgDelivered);
				let copy = msg.payload.clone_msg();
				self.deliver(to, copy)?;
			}
		}

		if !self.out_ports[port.0].pending.is_empty() {
			self.schedule_fire(port);
		}
		Ok(())
	}

	fn deliver(&mut self, to: InPortId, payload: Box<dyn Msg>) -> SimResult<()>
	{
		let part = self.in_ports[to.0].part;
		let behavior = self.in_ports[to.0].behavior;
		match behavior {
			InBehavior::Model => {
				self.with_model(part, |model, ctx| model.msg_received(ctx, to, payload));
				Ok(())
			}
			InBehavior::VtSampling => {
				if self.vt_can_receive(part) {
					let buffer = &mut self.in_ports[to.0].buffer;
					buffer.clear();
					buffer.push_back(payload);
					self.wake_thread(part, Some(WakeSource::Port(to)))
				} else {
					Ok(())	// threads that never started lose messages
				}
			}
			InBehavior::VtQueuing => {
				if self.vt_can_receive(part) {
					self.in_ports[to.0].buffer.push_back(payload);
					if self.in_ports[to.0].buffer.len() == 1 {
						self.wake_thread(part, Some(WakeSource::Port(to)))
					} else {
						Ok(())
					}
				} else {
					Ok(())
				}
			}
			InBehavior::ThreadControl => {
				let command = control_command(&payload, &self.in_port_path(to));
				self.vt_remote_control(part, &command)
			}
		}
	}

	// ---- thread port reads (scheduler services) ----------------------

	pub(crate) fn vt_read_msg(&mut self, port: InPortId) -> Option<Box<dyn Msg>>
	{
		let behavior = self.in_ports[port.0].behavior;
		match behavior {
			InBehavior::VtSampling => self.in_ports[port.0].buffer.front().map(|m| m.clone_msg()),
			InBehavior::VtQueuing => self.in_ports[port.0].buffer.pop_front(),
			_ => panic!("port {} is not a thread input port", self.in_port_path(port)),
		}
	}

	pub(crate) fn vt_msg_count(&self, port: InPortId) -> usize
	{
		self.in_ports[port.0].buffer.len()
	}
}

fn control_command(payload: &Box<dyn Msg>, path: &str) -> String
{
	if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else if let Some(s) = payload.downcast_ref::<&'static str>() {
		s.to_string()
	} else {
		panic!("control port {} expects a string command", path)
	}
}
