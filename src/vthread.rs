use std::any::{type_name, Any};
use std::panic;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::thread::JoinHandle;

use message::Msg;
use parts::PartId;
use ports::{InPortId, IoPortId, OutPortId};
use timers::TimerId;

/// Why a thread model's run returned early. Kill comes from the "kill"
/// remote control command, Exit from the end of the simulation. Models
/// normally just propagate these with `?`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VtInterrupt
{
	Kill,
	Exit,
}

pub type VtResult<T> = Result<T, VtInterrupt>;

/// What ended a wait call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitRet
{
	/// One of the waited-for events happened.
	Ok,

	/// The timeout elapsed first.
	Timeout,
}

/// Something a thread can wait for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitEvent
{
	Port(InPortId),
	IoPort(IoPortId),
	Timer(TimerId),
}

/// The body of a thread part. run executes on its own OS thread; all
/// interaction with the simulation goes through the context, which blocks
/// the thread until the scheduler lets it continue.
pub trait VtModel: Send
{
	fn run(&mut self, c: &mut VtContext) -> VtResult<()>;
}

/// Why a thread finished, as reported back to the scheduler.
pub(crate) enum TermCause
{
	/// run returned Ok.
	Exited,

	/// run returned Err(Kill).
	Killed,

	/// run returned Err(Exit).
	Terminated,

	/// run panicked; the payload text.
	Failed(String),
}

/// Scheduler services executed inline while the thread stays logically
/// running.
pub(crate) enum ServiceCall
{
	Send{port: OutPortId, payload: Box<dyn Msg>, text: String, msg_type: &'static str, flight_time: f64},
	ReadMsg(InPortId),
	MsgCount(InPortId),
	TimerStart(TimerId, f64),
	TimerRestart(TimerId, f64),
	TimerStop(TimerId),
	HasFired(TimerId),
	InjectLost(OutPortId, u64),
	Annotation(String),
	Status(String),
	AssertionFailed(String),
	Now,
}

pub(crate) enum ServiceReply
{
	Unit,
	Msg(Option<Box<dyn Msg>>),
	Count(usize),
	Fired(bool),
	Time(f64),
}

/// Thread to scheduler.
pub(crate) enum ThreadMsg
{
	SysCall(SysCall),
	Service(ServiceCall),
}

pub(crate) enum SysCall
{
	/// Model time passes while the thread computes.
	Busy{time: f64, status: String},

	/// Block until one of the events happens or the timeout elapses.
	/// An empty event list with a timeout is a pure sleep.
	Wait{timeout: Option<f64>, events: Vec<WaitEvent>},

	/// run finished; the model object rides along so it can be reused.
	Term{cause: TermCause, model: Option<Box<dyn VtModel>>},
}

/// Scheduler to thread.
pub(crate) enum SysReply
{
	/// Continue after a blocking syscall.
	Resume(WaitRet),

	Service(ServiceReply),

	/// Abort with Err(Kill).
	Kill,

	/// Abort with Err(Exit).
	Exit,
}

/// Handed to VtModel::run. Every method that passes model time or touches
/// the simulation rendezvouses with the simulator thread.
pub struct VtContext
{
	part: PartId,
	path: String,
	tx: Sender<ThreadMsg>,
	rx: Receiver<SysReply>,
}

impl VtContext
{
	/// Lets model time pass while the thread is computing, showing status
	/// in the trace. A higher priority thread can preempt the slice, in
	/// which case it finishes later than now + time.
	pub fn busy(&mut self, time: f64, status: &str) -> VtResult<()>
	{
		assert!(time > 0.0, "busy time ({}) must be positive", time);
		self.call(SysCall::Busy{time, status: status.to_string()})?;
		Ok(())
	}

	/// Blocks until one of the events happens or the timeout elapses.
	/// timeout of None waits forever; an empty event list sleeps for the
	/// full timeout.
	pub fn wait(&mut self, timeout: Option<f64>, events: &[WaitEvent]) -> VtResult<WaitRet>
	{
		if let Some(t) = timeout {
			assert!(t > 0.0, "wait timeout ({}) must be positive", t);
		}
		self.call(SysCall::Wait{timeout, events: events.to_vec()})
	}

	/// Sleeps until an absolute model time.
	pub fn wait_until(&mut self, time: f64) -> VtResult<()>
	{
		let now = self.time()?;
		assert!(time > now, "wait_until target ({}) is not in the future (now {})", time, now);
		self.wait(Some(time - now), &[])?;
		Ok(())
	}

	/// Returns the next message on any of the ports, blocking until one
	/// arrives. None if the timeout elapses first (a timeout of None
	/// blocks forever).
	pub fn wait_for_msg(&mut self, timeout: Option<f64>, ports: &[InPortId]) -> VtResult<Option<Box<dyn Msg>>>
	{
		let events: Vec<WaitEvent> = ports.iter().map(|&p| WaitEvent::Port(p)).collect();
		loop {
			for &port in ports.iter() {
				if let Some(msg) = self.read_msg(port)? {
					return Ok(Some(msg));
				}
			}
			if self.wait(timeout, &events)? == WaitRet::Timeout {
				return Ok(None);
			}
		}
	}

	pub fn send<M: Msg>(&mut self, port: OutPortId, msg: M, flight_time: f64) -> VtResult<()>
	{
		let text = format!("{:?}", msg);
		self.service(ServiceCall::Send{
			port,
			payload: Box::new(msg),
			text,
			msg_type: type_name::<M>(),
			flight_time})?;
		Ok(())
	}

	/// Reads the port's buffer without blocking. Queuing ports consume the
	/// message, sampling ports keep it.
	pub fn read_msg(&mut self, port: InPortId) -> VtResult<Option<Box<dyn Msg>>>
	{
		match self.service(ServiceCall::ReadMsg(port))? {
			ServiceReply::Msg(msg) => Ok(msg),
			_ => Err(VtInterrupt::Exit),
		}
	}

	pub fn msg_count(&mut self, port: InPortId) -> VtResult<usize>
	{
		match self.service(ServiceCall::MsgCount(port))? {
			ServiceReply::Count(n) => Ok(n),
			_ => Err(VtInterrupt::Exit),
		}
	}

	pub fn timer_start(&mut self, timer: TimerId, timeout: f64) -> VtResult<()>
	{
		self.service(ServiceCall::TimerStart(timer, timeout))?;
		Ok(())
	}

	pub fn timer_restart(&mut self, timer: TimerId, timeout: f64) -> VtResult<()>
	{
		self.service(ServiceCall::TimerRestart(timer, timeout))?;
		Ok(())
	}

	pub fn timer_stop(&mut self, timer: TimerId) -> VtResult<()>
	{
		self.service(ServiceCall::TimerStop(timer))?;
		Ok(())
	}

	/// True if the timer expired since it was last started.
	pub fn has_fired(&mut self, timer: TimerId) -> VtResult<bool>
	{
		match self.service(ServiceCall::HasFired(timer))? {
			ServiceReply::Fired(f) => Ok(f),
			_ => Err(VtInterrupt::Exit),
		}
	}

	pub fn inject_lost(&mut self, port: OutPortId, next_seq: u64) -> VtResult<()>
	{
		self.service(ServiceCall::InjectLost(port, next_seq))?;
		Ok(())
	}

	pub fn annotation(&mut self, text: &str) -> VtResult<()>
	{
		self.service(ServiceCall::Annotation(text.to_string()))?;
		Ok(())
	}

	pub fn set_state_indicator(&mut self, text: &str) -> VtResult<()>
	{
		self.service(ServiceCall::Status(text.to_string()))?;
		Ok(())
	}

	pub fn assertion_failed(&mut self, text: &str) -> VtResult<()>
	{
		self.service(ServiceCall::AssertionFailed(text.to_string()))?;
		Ok(())
	}

	/// The current model time.
	pub fn time(&mut self) -> VtResult<f64>
	{
		match self.service(ServiceCall::Now)? {
			ServiceReply::Time(t) => Ok(t),
			_ => Err(VtInterrupt::Exit),
		}
	}

	pub fn part(&self) -> PartId
	{
		self.part
	}

	/// The thread part's hierarchy name.
	pub fn path(&self) -> &str
	{
		&self.path
	}

	fn call(&mut self, call: SysCall) -> VtResult<WaitRet>
	{
		if self.tx.send(ThreadMsg::SysCall(call)).is_err() {
			return Err(VtInterrupt::Exit);
		}
		match self.rx.recv() {
			Ok(SysReply::Resume(ret)) => Ok(ret),
			Ok(SysReply::Kill) => Err(VtInterrupt::Kill),
			_ => Err(VtInterrupt::Exit),
		}
	}

	fn service(&mut self, call: ServiceCall) -> VtResult<ServiceReply>
	{
		if self.tx.send(ThreadMsg::Service(call)).is_err() {
			return Err(VtInterrupt::Exit);
		}
		match self.rx.recv() {
			Ok(SysReply::Service(reply)) => Ok(reply),
			Ok(SysReply::Kill) => Err(VtInterrupt::Kill),
			_ => Err(VtInterrupt::Exit),
		}
	}
}

/// Runs the model on a fresh OS thread. The final Term message carries the
/// model back so a later "start" can run the same object again.
pub(crate) fn spawn_thread(part: PartId, path: String, mut model: Box<dyn VtModel>,
	tx: Sender<ThreadMsg>, rx: Receiver<SysReply>) -> JoinHandle<()>
{
	let name = path.clone();
	let builder = thread::Builder::new().name(name);
	builder.spawn(move || {
		let mut c = VtContext{part, path, tx, rx};
		let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| model.run(&mut c)));
		let cause = match outcome {
			Ok(Ok(())) => TermCause::Exited,
			Ok(Err(VtInterrupt::Kill)) => TermCause::Killed,
			Ok(Err(VtInterrupt::Exit)) => TermCause::Terminated,
			Err(payload) => TermCause::Failed(panic_text(&payload)),
		};
		// the simulator may already be gone if teardown raced us
		let _ = c.tx.send(ThreadMsg::SysCall(SysCall::Term{cause, model: Some(model)}));
	}).unwrap()
}

fn panic_text(payload: &Box<dyn Any + Send>) -> String
{
	if let Some(s) = payload.downcast_ref::<&'static str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic".to_string()
	}
}
