use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use error::*;
use parts::*;
use ports::PortRef;
use sim_trace::TraceAction;
use simulation::Simulation;
use timers::TimerRole;
use vthread::*;

/// Number of priority levels. 0 is the highest priority.
pub const NUM_PRIOS: usize = 16;

/// Wall clock bound on a killed or exiting thread acknowledging shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SchedId(pub usize);

/// Scheduling state of one thread.
///
/// Remote controlled threads sit in Init until a "start" command arrives
/// and drop back to Init when killed; everyone else starts out Ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VtState
{
	Init,
	Ready,
	Running,
	Waiting,
}

/// What a waiting thread can be woken by.
#[derive(Clone, Copy, Debug)]
pub(crate) enum WakeSource
{
	Port(::ports::InPortId),
	Timer(::timers::TimerId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VtEvent
{
	Start,
	Run,
	Wait,
	Preempt,
	Wake,
	Term,
}

/// Per-thread scheduler bookkeeping.
pub(crate) struct Vtcb
{
	pub part: PartId,
	pub prio: usize,
	pub state: VtState,

	/// Busy time still owed when the thread was last preempted.
	pub remain_busy_time: f64,
	pub busy_start_time: f64,

	/// Status text from the thread's last busy call, shown while Running.
	pub app_status: String,
	pub last_indicator: Option<String>,

	pub wait_events: Option<Vec<WaitEvent>>,
	pub call_return: WaitRet,

	/// Ends busy slices and wait timeouts.
	pub sys_call_timer: ::timers::TimerId,

	pub alive: bool,
	pub reply_tx: Option<mpsc::Sender<SysReply>>,
	pub call_rx: Option<mpsc::Receiver<ThreadMsg>>,
	pub join: Option<::std::thread::JoinHandle<()>>,
}

/// A preemptive fixed-priority scheduler with FIFO round robin at equal
/// priority. Exactly one thread runs at a time; a Ready thread takes over
/// only when its priority is strictly higher than the running thread's.
pub(crate) struct RtosSched
{
	pub part: PartId,
	pub threads: Vec<Vtcb>,
	pub ready: Vec<VecDeque<usize>>,
	pub running: Option<usize>,
}

impl Simulation
{
	// ---- construction ------------------------------------------------

	pub fn add_scheduler(&mut self, name: &str, parent: Option<PartId>) -> SchedId
	{
		let id = SchedId(self.scheds.len());
		let part = self.parts.add(name, parent, PartKind::Scheduler(id));
		self.scheds.push(RtosSched{
			part,
			threads: Vec::new(),
			ready: vec![VecDeque::new(); NUM_PRIOS],
			running: None});
		id
	}

	/// Puts a thread part under a scheduler's control. Remote controlled
	/// threads start in Init, everyone else is Ready when the run starts.
	pub fn sched_add_thread(&mut self, sched: SchedId, part: PartId, prio: usize)
	{
		assert!(prio < NUM_PRIOS, "priority ({}) must be below {}", prio, NUM_PRIOS);
		let path = self.parts.path(part);
		let vt = self.scheds[sched.0].threads.len();

		let remote = match self.parts.get_mut(part).kind {
			PartKind::VThread(ref mut vp) => {
				assert!(vp.sched.is_none(), "thread part {} is already scheduled", path);
				vp.sched = Some((sched, vt));
				vp.remote
			}
			_ => panic!("part {} is not a thread part", path),
		};

		let slice = self.add_timer(part, "slice_tmr", TimerRole::SysCall(sched, vt));
		self.scheds[sched.0].threads.push(Vtcb{
			part,
			prio,
			state: VtState::Init,
			remain_busy_time: 0.0,
			busy_start_time: 0.0,
			app_status: String::new(),
			last_indicator: None,
			wait_events: None,
			call_return: WaitRet::Ok,
			sys_call_timer: slice,
			alive: false,
			reply_tx: None,
			call_rx: None,
			join: None});

		if !remote {
			self.scheds[sched.0].threads[vt].state = VtState::Ready;
			self.scheds[sched.0].ready[prio].push_back(vt);
		}
	}

	/// Gives a lone thread part a private scheduler, for models that don't
	/// care about scheduling at all.
	pub fn add_own_scheduler(&mut self, part: PartId) -> SchedId
	{
		let sched = self.add_scheduler("sched", Some(part));
		self.sched_add_thread(sched, part, 0);
		sched
	}

	// ---- run loop hooks ------------------------------------------------

	pub(crate) fn sched_start(&mut self, sched: SchedId) -> SimResult<()>
	{
		self.sched_schedule(sched)?;
		self.update_indicators(sched);
		Ok(())
	}

	/// Shuts down every live thread. Part of simulation teardown, so
	/// failures are reported rather than propagated.
	pub(crate) fn sched_shutdown(&mut self, sched: SchedId)
	{
		for vt in 0..self.scheds[sched.0].threads.len() {
			if self.scheds[sched.0].threads[vt].alive {
				if let Err(err) = self.shutdown_context(sched, vt, false) {
					self.log_error(&format!("teardown: {}", err));
				}
			}
		}
	}

	// ---- the dispatcher ------------------------------------------------

	/// Picks the next thread to run: the front of the highest priority
	/// non-empty ready list, preempting the running thread if it is
	/// strictly lower priority.
	fn sched_schedule(&mut self, sched: SchedId) -> SimResult<()>
	{
		let candidate = {
			let s = &self.scheds[sched.0];
			s.ready.iter()
				.enumerate()
				.find(|&(_, q)| !q.is_empty())
				.map(|(prio, q)| (prio, *q.front().unwrap()))
		};
		let (prio, next) = match candidate {
			Some(c) => c,
			None => return Ok(()),
		};

		match self.scheds[sched.0].running {
			None => self.vt_transition(sched, next, VtEvent::Run),
			Some(running) => {
				if prio < self.scheds[sched.0].threads[running].prio {
					self.vt_transition(sched, running, VtEvent::Preempt)?;
					self.vt_transition(sched, next, VtEvent::Run)
				} else {
					Ok(())
				}
			}
		}
	}

	fn vt_transition(&mut self, sched: SchedId, vt: usize, event: VtEvent) -> SimResult<()>
	{
		let old = self.scheds[sched.0].threads[vt].state;
		let new = match (old, event) {
			(VtState::Init, VtEvent::Start) => VtState::Ready,
			(VtState::Init, VtEvent::Term) => VtState::Init,
			(VtState::Ready, VtEvent::Run) => VtState::Running,
			(VtState::Ready, VtEvent::Term) => VtState::Init,
			(VtState::Running, VtEvent::Wait) => VtState::Waiting,
			(VtState::Running, VtEvent::Preempt) => VtState::Ready,
			(VtState::Running, VtEvent::Term) => VtState::Init,
			(VtState::Waiting, VtEvent::Wake) => VtState::Ready,
			(VtState::Waiting, VtEvent::Term) => VtState::Init,
			_ => {
				let part = self.scheds[sched.0].threads[vt].part;
				panic!("thread {} can't take {:?} in state {:?}", self.parts.path(part), event, old)
			}
		};

		match old {
			VtState::Ready => {
				let prio = self.scheds[sched.0].threads[vt].prio;
				self.scheds[sched.0].ready[prio].retain(|&t| t != vt);
			}
			VtState::Running => {
				self.scheds[sched.0].running = None;
				if event == VtEvent::Preempt {
					let now = self.time();
					let slice = {
						let cb = &mut self.scheds[sched.0].threads[vt];
						let elapsed = now - cb.busy_start_time;
						let mut remain = cb.remain_busy_time - elapsed;
						if remain < 0.0 {
							// float noise only; anything larger is a real bug
							assert!(remain > -1.0e-9, "remaining busy time went negative ({})", remain);
							remain = 0.0;
						}
						cb.remain_busy_time = remain;
						cb.sys_call_timer
					};
					if self.timers[slice.0].pending.is_some() {
						self.timer_stop(slice);
					}
				}
			}
			_ => (),
		}

		self.scheds[sched.0].threads[vt].state = new;

		match new {
			VtState::Ready => {
				let prio = self.scheds[sched.0].threads[vt].prio;
				self.scheds[sched.0].ready[prio].push_back(vt);
				Ok(())
			}
			VtState::Running => {
				let now = self.time();
				let (remain, slice) = {
					let s = &mut self.scheds[sched.0];
					s.running = Some(vt);
					let cb = &mut s.threads[vt];
					cb.busy_start_time = now;
					(cb.remain_busy_time, cb.sys_call_timer)
				};
				if remain > 0.0 {
					// resuming a preempted busy slice; the thread itself
					// stays blocked until the slice completes
					self.timer_start(slice, remain);
					Ok(())
				} else {
					self.run_til_syscall(sched, vt)
				}
			}
			VtState::Init => self.vt_reset(sched, vt),
			VtState::Waiting => Ok(()),
		}
	}

	/// Resumes (or first starts) the thread's OS thread and services its
	/// calls until it blocks in a system call again.
	fn run_til_syscall(&mut self, sched: SchedId, vt: usize) -> SimResult<()>
	{
		let part = self.scheds[sched.0].threads[vt].part;
		let path = self.parts.path(part);

		let slice = self.scheds[sched.0].threads[vt].sys_call_timer;
		if self.timers[slice.0].pending.is_some() {
			self.timer_stop(slice);
		}
		self.scheds[sched.0].threads[vt].wait_events = None;

		if !self.scheds[sched.0].threads[vt].alive {
			let (model, remote) = match self.parts.get_mut(part).kind {
				PartKind::VThread(ref mut vp) => (vp.model.take(), vp.remote),
				_ => panic!("part {} is not a thread part", path),
			};
			let model = match model {
				Some(m) => m,
				None => panic!("thread part {} has no model", path),
			};
			let (call_tx, call_rx) = mpsc::channel();
			let (reply_tx, reply_rx) = mpsc::channel();
			{
				let cb = &mut self.scheds[sched.0].threads[vt];
				cb.alive = true;
				cb.reply_tx = Some(reply_tx);
				cb.call_rx = Some(call_rx);
				cb.join = Some(spawn_thread(part, path.clone(), model, call_tx, reply_rx));
			}
			if remote {
				self.annotate(part, "thread started");
			}
		} else {
			let cb = &self.scheds[sched.0].threads[vt];
			let ret = cb.call_return;
			if let Some(ref tx) = cb.reply_tx {
				// a send error means the thread already died; the pump
				// below will pick up its Term message
				let _ = tx.send(SysReply::Resume(ret));
			}
		}

		let rx = match self.scheds[sched.0].threads[vt].call_rx.take() {
			Some(rx) => rx,
			None => panic!("thread {} has no call channel", path),
		};
		let tx = match self.scheds[sched.0].threads[vt].reply_tx.clone() {
			Some(tx) => tx,
			None => panic!("thread {} has no reply channel", path),
		};
		let com_timeout = self.config.com_timeout;

		let outcome = loop {
			let msg = match com_timeout {
				Some(bound) => rx.recv_timeout(bound),
				None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
			};
			match msg {
				Ok(ThreadMsg::Service(call)) => {
					let reply = self.exec_service(sched, vt, call);
					let _ = tx.send(SysReply::Service(reply));
				}
				Ok(ThreadMsg::SysCall(call)) => break Ok(call),
				Err(RecvTimeoutError::Timeout) => break Err(SimError::LivenessTimeout{part: path.clone()}),
				Err(RecvTimeoutError::Disconnected) => break Err(SimError::ThreadJoin{part: path.clone()}),
			}
		};
		self.scheds[sched.0].threads[vt].call_rx = Some(rx);

		let call = outcome?;
		self.exec_syscall(sched, vt, call)
	}

	fn exec_service(&mut self, sched: SchedId, vt: usize, call: ServiceCall) -> ServiceReply
	{
		let part = self.scheds[sched.0].threads[vt].part;
		match call {
			ServiceCall::Send{port, payload, text, msg_type, flight_time} => {
				self.send_msg(port, payload, text, msg_type, flight_time);
				ServiceReply::Unit
			}
			ServiceCall::ReadMsg(port) => ServiceReply::Msg(self.vt_read_msg(port)),
			ServiceCall::MsgCount(port) => ServiceReply::Count(self.vt_msg_count(port)),
			ServiceCall::TimerStart(timer, timeout) => {
				self.timer_start(timer, timeout);
				ServiceReply::Unit
			}
			ServiceCall::TimerRestart(timer, timeout) => {
				self.timer_restart(timer, timeout);
				ServiceReply::Unit
			}
			ServiceCall::TimerStop(timer) => {
				self.timer_stop(timer);
				ServiceReply::Unit
			}
			ServiceCall::HasFired(timer) => ServiceReply::Fired(self.timers[timer.0].fired),
			ServiceCall::InjectLost(port, next_seq) => {
				self.inject_lost(port, next_seq);
				ServiceReply::Unit
			}
			ServiceCall::Annotation(text) => {
				self.annotate(part, &text);
				ServiceReply::Unit
			}
			ServiceCall::Status(text) => {
				self.scheds[sched.0].threads[vt].app_status = text;
				self.update_indicators(sched);
				ServiceReply::Unit
			}
			ServiceCall::AssertionFailed(text) => {
				self.assertion_failed(part, &text);
				ServiceReply::Unit
			}
			ServiceCall::Now => ServiceReply::Time(self.time()),
		}
	}

	fn exec_syscall(&mut self, sched: SchedId, vt: usize, call: SysCall) -> SimResult<()>
	{
		match call {
			SysCall::Busy{time, status} => {
				let now = self.time();
				let slice = {
					let cb = &mut self.scheds[sched.0].threads[vt];
					cb.remain_busy_time = time;
					cb.busy_start_time = now;
					cb.app_status = status;
					cb.call_return = WaitRet::Ok;
					cb.sys_call_timer
				};
				self.timer_start(slice, time);
				self.sched_schedule(sched)
			}
			SysCall::Wait{timeout, events} => {
				let slice = {
					let cb = &mut self.scheds[sched.0].threads[vt];
					cb.wait_events = Some(events);
					cb.remain_busy_time = 0.0;
					cb.sys_call_timer
				};
				self.vt_transition(sched, vt, VtEvent::Wait)?;
				if let Some(t) = timeout {
					self.timer_start(slice, t);
				}
				self.sched_schedule(sched)
			}
			SysCall::Term{cause, model} => {
				let part = self.scheds[sched.0].threads[vt].part;
				self.scheds[sched.0].threads[vt].alive = false;
				if let Some(m) = model {
					if let PartKind::VThread(ref mut vp) = self.parts.get_mut(part).kind {
						vp.model = Some(m);
					}
				}
				if let Some(handle) = self.scheds[sched.0].threads[vt].join.take() {
					let _ = handle.join();
				}
				let note = match cause {
					TermCause::Exited => Some("thread exited normally"),
					TermCause::Killed => Some("thread killed"),
					TermCause::Terminated | TermCause::Failed(_) => None,
				};
				if let Some(text) = note {
					self.annotate(part, text);
				}
				self.vt_transition(sched, vt, VtEvent::Term)?;
				if let TermCause::Failed(message) = cause {
					let path = self.parts.path(part);
					return Err(SimError::ModelFailure{part: path, message});
				}
				self.sched_schedule(sched)
			}
		}
	}

	/// A slice timer expired: either a busy slice completed or a wait
	/// timed out.
	pub(crate) fn syscall_timer_expired(&mut self, sched: SchedId, vt: usize) -> SimResult<()>
	{
		self.scheds[sched.0].threads[vt].remain_busy_time = 0.0;
		let state = self.scheds[sched.0].threads[vt].state;
		match state {
			VtState::Running => self.run_til_syscall(sched, vt)?,
			VtState::Waiting => self.vt_wake(sched, vt, None)?,
			_ => {
				let part = self.scheds[sched.0].threads[vt].part;
				panic!("unexpected scheduling timer expiry for {} in state {:?}", self.parts.path(part), state)
			}
		}
		self.update_indicators(sched);
		Ok(())
	}

	/// Something happened that might wake a thread (message arrival or
	/// thread timer expiry). None means the wait timeout elapsed.
	pub(crate) fn wake_thread(&mut self, part: PartId, source: Option<WakeSource>) -> SimResult<()>
	{
		let (sched, vt) = self.vt_of(part);
		self.vt_wake(sched, vt, source)?;
		self.update_indicators(sched);
		Ok(())
	}

	fn vt_wake(&mut self, sched: SchedId, vt: usize, source: Option<WakeSource>) -> SimResult<()>
	{
		if self.scheds[sched.0].threads[vt].state != VtState::Waiting {
			return Ok(());
		}
		match source {
			Some(src) => {
				let hit = match self.scheds[sched.0].threads[vt].wait_events {
					Some(ref events) => events.iter().any(|&e| self.wait_hit(e, src)),
					None => false,
				};
				if !hit {
					return Ok(());
				}
				// the event beat any pending timeout
				let slice = self.scheds[sched.0].threads[vt].sys_call_timer;
				if self.timers[slice.0].pending.is_some() {
					self.timer_stop(slice);
				}
				self.scheds[sched.0].threads[vt].call_return = WaitRet::Ok;
			}
			None => self.scheds[sched.0].threads[vt].call_return = WaitRet::Timeout,
		}
		self.vt_transition(sched, vt, VtEvent::Wake)?;
		self.sched_schedule(sched)
	}

	fn wait_hit(&self, event: WaitEvent, source: WakeSource) -> bool
	{
		match (event, source) {
			(WaitEvent::Port(p), WakeSource::Port(q)) => p == q,
			(WaitEvent::IoPort(io), WakeSource::Port(q)) => self.io_ports[io.0].in_port == q,
			(WaitEvent::Timer(t), WakeSource::Timer(u)) => t == u,
			_ => false,
		}
	}

	// ---- remote control ------------------------------------------------

	/// Handles a command on a thread control port. "start" launches a
	/// thread sitting in Init, "kill" aborts it and resets its state so a
	/// later "start" runs the same model object again.
	pub(crate) fn vt_remote_control(&mut self, part: PartId, command: &str) -> SimResult<()>
	{
		let (sched, vt) = self.vt_of(part);
		match command {
			"start" => {
				let state = self.scheds[sched.0].threads[vt].state;
				assert!(state == VtState::Init,
					"thread {} can only be started from Init (it is {:?})", self.parts.path(part), state);
				self.vt_transition(sched, vt, VtEvent::Start)?;
				self.sched_schedule(sched)?;
			}
			"kill" => {
				self.vt_transition(sched, vt, VtEvent::Term)?;
				self.sched_schedule(sched)?;
			}
			_ => panic!("unknown thread control command '{}' for {}", command, self.parts.path(part)),
		}
		self.update_indicators(sched);
		Ok(())
	}

	// ---- bookkeeping ---------------------------------------------------

	/// Back to Init: abort the OS thread if it is live, disarm the part's
	/// timers and empty its input buffers.
	fn vt_reset(&mut self, sched: SchedId, vt: usize) -> SimResult<()>
	{
		self.shutdown_context(sched, vt, true)?;

		let part = self.scheds[sched.0].threads[vt].part;
		let timers = self.parts.get(part).timers.clone();
		for timer in timers {
			if self.timers[timer.0].pending.is_some() {
				self.timer_stop(timer);
			}
			self.timers[timer.0].fired = false;
		}
		let ports = self.parts.get(part).ports.clone();
		for port in ports {
			if let PortRef::In(p) = port {
				self.in_ports[p.0].buffer.clear();
			}
		}

		let cb = &mut self.scheds[sched.0].threads[vt];
		cb.remain_busy_time = 0.0;
		cb.busy_start_time = 0.0;
		cb.app_status.clear();
		cb.wait_events = None;
		cb.call_return = WaitRet::Ok;
		Ok(())
	}

	/// Tells a live OS thread to stop and waits for its Term handshake,
	/// keeping the model object for a possible restart.
	fn shutdown_context(&mut self, sched: SchedId, vt: usize, kill: bool) -> SimResult<()>
	{
		let (part, alive) = {
			let cb = &self.scheds[sched.0].threads[vt];
			(cb.part, cb.alive)
		};
		if !alive {
			return Ok(());
		}
		let path = self.parts.path(part);
		let (tx, rx, join) = {
			let cb = &mut self.scheds[sched.0].threads[vt];
			cb.alive = false;
			(cb.reply_tx.take(), cb.call_rx.take(), cb.join.take())
		};
		let (tx, rx) = match (tx, rx) {
			(Some(tx), Some(rx)) => (tx, rx),
			_ => panic!("thread {} is live but has no channels", path),
		};

		let stop = || if kill {SysReply::Kill} else {SysReply::Exit};
		let _ = tx.send(stop());
		let mut model = None;
		loop {
			match rx.recv_timeout(JOIN_TIMEOUT) {
				Ok(ThreadMsg::SysCall(SysCall::Term{model: m, ..})) => {
					model = m;
					break;
				}
				// stale calls that raced the stop; keep interrupting
				Ok(_) => {
					let _ = tx.send(stop());
				}
				Err(RecvTimeoutError::Disconnected) => break,
				Err(RecvTimeoutError::Timeout) => return Err(SimError::ThreadJoin{part: path}),
			}
		}
		if let Some(m) = model {
			if let PartKind::VThread(ref mut vp) = self.parts.get_mut(part).kind {
				vp.model = Some(m);
			}
		}
		if let Some(handle) = join {
			let _ = handle.join();
		}
		if kill {
			self.annotate(part, "thread killed");
		}
		Ok(())
	}

	/// Traces status indicator changes: the running thread shows its busy
	/// status, Ready threads show "PE" (preempted), the rest show nothing.
	fn update_indicators(&mut self, sched: SchedId)
	{
		let mut changes = Vec::new();
		for (vt, cb) in self.scheds[sched.0].threads.iter().enumerate() {
			let text = match cb.state {
				VtState::Running => cb.app_status.clone(),
				VtState::Ready => "PE".to_string(),
				VtState::Waiting | VtState::Init => String::new(),
			};
			if cb.last_indicator.as_ref() != Some(&text) {
				changes.push((vt, cb.part, text));
			}
		}
		for (vt, part, text) in changes {
			self.scheds[sched.0].threads[vt].last_indicator = Some(text.clone());
			self.trace(Some(part), None, Some(text), TraceAction::Status);
		}
	}

	fn vt_of(&self, part: PartId) -> (SchedId, usize)
	{
		match self.parts.get(part).kind {
			PartKind::VThread(ref vp) => {
				match vp.sched {
					Some(at) => at,
					None => panic!("thread part {} is not attached to a scheduler", self.parts.path(part)),
				}
			}
			_ => panic!("part {} is not a thread part", self.parts.path(part)),
		}
	}

	/// Threads in Init are not listening; messages sent to them are dropped.
	pub(crate) fn vt_can_receive(&self, part: PartId) -> bool
	{
		match self.parts.get(part).kind {
			PartKind::VThread(ref vp) => {
				match vp.sched {
					Some((sched, vt)) => self.scheds[sched.0].threads[vt].state != VtState::Init,
					None => false,
				}
			}
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use config::*;
	use message::Msg;
	use ports::{InPortId, OutPortId};
	use sim_trace::near;
	use simulation::SimContext;
	use timers::TimerId;

	fn quiet() -> Config
	{
		Config{log_level: LogLevel::Error, trace_printing: false, ..Config::new()}
	}

	struct Hi;

	impl VtModel for Hi
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			c.busy(50.0, "1")?;
			c.wait(Some(20.0), &[])?;
			c.busy(10.0, "2")?;
			c.wait(Some(100.0), &[])?;
			c.wait(Some(100.0), &[])?;
			loop {
				c.busy(10.0, "3")?;
				c.wait(Some(5.0), &[])?;
			}
		}
	}

	struct Low
	{
		second_busy: f64,
	}

	impl VtModel for Low
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			c.busy(50.0, "1")?;
			c.wait(Some(20.0), &[])?;
			c.busy(self.second_busy, "2")?;
			c.busy(250.0, "3")?;
			Ok(())
		}
	}

	#[test]
	fn preemptive_priorities_with_round_robin()
	{
		let mut sim = Simulation::new(quiet());
		let sched = sim.add_scheduler("sched", None);
		let hi = sim.add_vthread("hi", None, false);
		sim.set_thread_model(hi, Box::new(Hi));
		sim.sched_add_thread(sched, hi, 0);
		let low_a = sim.add_vthread("lowA", None, false);
		sim.set_thread_model(low_a, Box::new(Low{second_busy: 20.0}));
		sim.sched_add_thread(sched, low_a, 1);
		let low_b = sim.add_vthread("lowB", None, false);
		sim.set_thread_model(low_b, Box::new(Low{second_busy: 100.0}));
		sim.sched_add_thread(sched, low_b, 1);

		let reason = sim.run(300.0).unwrap();
		assert_eq!(reason, StopReason::StopTimeReached);

		let trc = sim.tracing();
		// hi runs first, the equal priority threads queue in add order
		assert_eq!(trc.find_status(0.0, hi), Some("1"));
		assert_eq!(trc.find_status(0.0, low_a), Some("PE"));
		assert_eq!(trc.find_status(0.0, low_b), Some("PE"));
		// hi waits, lowA gets its turn
		assert_eq!(trc.find_status(50.0, hi), Some(""));
		assert_eq!(trc.find_status(50.0, low_a), Some("1"));
		// hi's wait ends and preempts lowA mid-busy
		assert_eq!(trc.find_status(70.0, hi), Some("2"));
		assert_eq!(trc.find_status(70.0, low_a), Some("PE"));
		// round robin: preempted lowA goes behind lowB
		assert_eq!(trc.find_status(80.0, hi), Some(""));
		assert_eq!(trc.find_status(80.0, low_b), Some("1"));
		// lowB waits, lowA finishes its interrupted slice
		assert_eq!(trc.find_status(130.0, low_a), Some("1"));
		assert_eq!(trc.find_status(130.0, low_b), Some(""));
		assert_eq!(trc.find_status(160.0, low_b), Some("2"));
		assert_eq!(trc.find_status(280.0, hi), Some("3"));
		assert!(trc.is_monotonic());
	}

	struct Feeder
	{
		out: OutPortId,
	}

	impl VtModel for Feeder
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			let mut n = 0;
			loop {
				c.wait(Some(15.0), &[])?;
				n += 1;
				c.send(self.out, format!("hello{}", n), 5.0)?;
			}
		}
	}

	struct Blocker;

	impl VtModel for Blocker
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			c.busy(22.0, "B")?;
			c.wait(None, &[])?;
			Ok(())
		}
	}

	fn drain(c: &mut VtContext, port: InPortId) -> VtResult<Vec<String>>
	{
		let mut out = Vec::new();
		while let Some(msg) = c.read_msg(port)? {
			match msg.downcast::<String>() {
				Some(s) => out.push(*s),
				None => panic!("unexpected message type"),
			}
		}
		Ok(out)
	}

	struct Batcher
	{
		inp: InPortId,
	}

	impl VtModel for Batcher
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			loop {
				c.busy(33.0, "proc")?;
				let batch = drain(c, self.inp)?;
				c.annotation(&format!("{:?}", batch))?;
				c.wait(None, &[WaitEvent::Port(self.inp)])?;
				let batch = drain(c, self.inp)?;
				c.annotation(&format!("{:?}", batch))?;
			}
		}
	}

	#[test]
	fn queuing_port_batches_messages()
	{
		let mut sim = Simulation::new(quiet());
		let stim = sim.add_vthread("stim", None, false);
		let out = sim.new_output_port(stim, "tx");
		sim.set_thread_model(stim, Box::new(Feeder{out}));
		sim.add_own_scheduler(stim);

		let sched = sim.add_scheduler("sched", None);
		let block = sim.add_vthread("block", None, false);
		sim.set_thread_model(block, Box::new(Blocker));
		sim.sched_add_thread(sched, block, 1);
		let cons = sim.add_vthread("cons", None, false);
		let inp = sim.new_vt_queuing_in_port(cons, "rx");
		sim.set_thread_model(cons, Box::new(Batcher{inp}));
		sim.sched_add_thread(sched, cons, 2);
		sim.bind(out, inp);

		sim.run(148.0).unwrap();

		// messages land at 20, 35, 50, ...; the consumer drains whatever
		// queued while it was computing, then one at a time as they arrive
		let trc = sim.tracing();
		assert_eq!(trc.find_annotation(55.0, cons, 0), Some(r#"["hello1", "hello2", "hello3"]"#));
		assert_eq!(trc.find_annotation(65.0, cons, 0), Some(r#"["hello4"]"#));
		assert_eq!(trc.find_annotation(98.0, cons, 0), Some(r#"["hello5", "hello6"]"#));
		assert_eq!(trc.find_annotation(110.0, cons, 0), Some(r#"["hello7"]"#));
		assert_eq!(trc.find_annotation(143.0, cons, 0), Some(r#"["hello8", "hello9"]"#));
	}

	struct OneShot
	{
		out: OutPortId,
	}

	impl PartModel for OneShot
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			let out = self.out;
			ctx.send(out, "late".to_string(), 25.0);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, _ctx: &mut SimContext, _timer: TimerId)
		{
		}
	}

	struct Fetcher
	{
		inp: InPortId,
	}

	impl VtModel for Fetcher
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			if c.wait_for_msg(Some(10.0), &[self.inp])?.is_none() {
				c.annotation("timed out")?;
			}
			match c.wait_for_msg(Some(100.0), &[self.inp])? {
				Some(msg) => c.annotation(&format!("{:?}", msg))?,
				None => c.annotation("missed")?,
			}
			Ok(())
		}
	}

	#[test]
	fn wait_for_msg_times_out_or_delivers()
	{
		let mut sim = Simulation::new(quiet());
		let stim = sim.add_part("stim", None);
		let out = sim.new_output_port(stim, "tx");
		sim.set_model(stim, Box::new(OneShot{out}));
		let fet = sim.add_vthread("fetcher", None, false);
		let inp = sim.new_vt_queuing_in_port(fet, "rx");
		sim.set_thread_model(fet, Box::new(Fetcher{inp}));
		sim.add_own_scheduler(fet);
		sim.bind(out, inp);

		let reason = sim.run(50.0).unwrap();
		assert_eq!(reason, StopReason::NoMoreEvents);

		// the first call gives up after 10; the message lands at 25
		let trc = sim.tracing();
		assert_eq!(trc.find_annotation(10.0, fet, 0), Some("timed out"));
		assert!(trc.find_annotation(25.0, fet, 0).unwrap().contains("late"));
	}

	struct SampleStim
	{
		out: OutPortId,
	}

	impl PartModel for SampleStim
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			let out = self.out;
			ctx.send(out, "a".to_string(), 5.0);
			ctx.send(out, "b".to_string(), 5.0);
			ctx.send(out, "c".to_string(), 20.0);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, _ctx: &mut SimContext, _timer: TimerId)
		{
		}
	}

	fn read_text(c: &mut VtContext, port: InPortId) -> VtResult<String>
	{
		match c.read_msg(port)? {
			Some(msg) => {
				match msg.downcast::<String>() {
					Some(s) => Ok(*s),
					None => Ok("?".to_string()),
				}
			}
			None => Ok("empty".to_string()),
		}
	}

	struct Sampler
	{
		inp: InPortId,
	}

	impl VtModel for Sampler
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			c.busy(20.0, "calc")?;
			let count = c.msg_count(self.inp)?;
			let first = read_text(c, self.inp)?;
			c.annotation(&format!("{} of {}", first, count))?;
			let again = read_text(c, self.inp)?;
			c.annotation(&again)?;
			c.wait(None, &[WaitEvent::Port(self.inp)])?;
			let third = read_text(c, self.inp)?;
			c.annotation(&third)?;
			Ok(())
		}
	}

	#[test]
	fn sampling_port_keeps_only_the_newest_message()
	{
		let mut sim = Simulation::new(quiet());
		let stim = sim.add_part("stim", None);
		let out = sim.new_output_port(stim, "tx");
		sim.set_model(stim, Box::new(SampleStim{out}));
		let samp = sim.add_vthread("samp", None, false);
		let inp = sim.new_vt_sampling_in_port(samp, "rx");
		sim.set_thread_model(samp, Box::new(Sampler{inp}));
		sim.add_own_scheduler(samp);
		sim.bind(out, inp);

		let reason = sim.run(50.0).unwrap();
		assert_eq!(reason, StopReason::NoMoreEvents);

		// "a" (arrives at 5) is overwritten by "b" (at 10) while the
		// thread computes; reads never consume the buffered message
		let trc = sim.tracing();
		assert_eq!(trc.find_annotation(20.0, samp, 0), Some("b of 1"));
		assert_eq!(trc.find_annotation(20.0, samp, 1), Some("b"));
		assert_eq!(trc.find_annotation(30.0, samp, 0), Some("c"));
		assert_eq!(trc.find_annotation(30.0, samp, 1), Some("thread exited normally"));
	}

	struct TimerUser
	{
		tmr: TimerId,
	}

	impl VtModel for TimerUser
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			let tmr = self.tmr;

			// fires while busy: the expiry is latched
			c.timer_start(tmr, 16.0)?;
			c.busy(18.0, "A")?;
			let fired = c.has_fired(tmr)?;
			c.annotation(&format!("A fired {}", fired))?;

			// fires while waiting on it
			c.timer_start(tmr, 20.0)?;
			let ret = c.wait(Some(100.0), &[WaitEvent::Timer(tmr)])?;
			c.annotation(&format!("B {:?}", ret))?;

			// fires while waiting on nothing: ignored, the wait times out
			c.timer_start(tmr, 20.0)?;
			let ret = c.wait(Some(30.0), &[])?;
			c.annotation(&format!("C {:?}", ret))?;

			// the wait times out before the timer fires
			c.timer_start(tmr, 40.0)?;
			let ret = c.wait(Some(30.0), &[WaitEvent::Timer(tmr)])?;
			let fired = c.has_fired(tmr)?;
			c.annotation(&format!("D {:?} fired {}", ret, fired))?;
			c.timer_stop(tmr)?;
			Ok(())
		}
	}

	#[test]
	fn thread_timers_latch_and_wake()
	{
		let mut sim = Simulation::new(quiet());
		let part = sim.add_vthread("t", None, false);
		let tmr = sim.new_vt_timer(part, "tmr");
		sim.set_thread_model(part, Box::new(TimerUser{tmr}));
		sim.add_own_scheduler(part);

		sim.run(150.0).unwrap();

		let trc = sim.tracing();
		assert_eq!(trc.find_annotation(18.0, part, 0), Some("A fired true"));
		assert_eq!(trc.find_annotation(38.0, part, 0), Some("B Ok"));
		assert_eq!(trc.find_annotation(68.0, part, 0), Some("C Timeout"));
		assert_eq!(trc.find_annotation(98.0, part, 0), Some("D Timeout fired false"));

		// the final stop cancelled the armed expiry at 108
		let late = trc.traced_events().iter()
			.any(|e| e.action == TraceAction::TimerExpired && e.time > 98.0);
		assert!(!late);
	}

	struct Controlled
	{
		inp: InPortId,
		count: u32,
	}

	impl VtModel for Controlled
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			self.count += 1;
			c.annotation(&format!("invocation {}", self.count))?;
			let pending = c.msg_count(self.inp)?;
			c.annotation(&format!("pending {}", pending))?;
			loop {
				c.busy(10.0, "run")?;
				c.wait(Some(10.0), &[])?;
			}
		}
	}

	struct Commander
	{
		ctl: OutPortId,
		data: OutPortId,
		tmr: TimerId,
		step: u32,
	}

	impl PartModel for Commander
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			let (data, tmr) = (self.data, self.tmr);
			ctx.send(data, "early".to_string(), 1.0);
			ctx.timer_start(tmr, 2.0);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, ctx: &mut SimContext, timer: TimerId)
		{
			let ctl = self.ctl;
			match self.step {
				0 => {
					ctx.send(ctl, "start".to_string(), 0.0);
					ctx.timer_restart(timer, 48.0);
				}
				1 => {
					ctx.send(ctl, "kill".to_string(), 0.0);
					ctx.timer_restart(timer, 30.0);
				}
				2 => ctx.send(ctl, "start".to_string(), 0.0),
				_ => (),
			}
			self.step += 1;
		}
	}

	#[test]
	fn remote_control_restarts_the_same_model()
	{
		let mut sim = Simulation::new(quiet());
		let thread = sim.add_vthread("worker", None, true);
		let inp = sim.new_vt_queuing_in_port(thread, "rx");
		sim.set_thread_model(thread, Box::new(Controlled{inp, count: 0}));
		sim.add_own_scheduler(thread);
		let ctl_port = sim.thread_control_port(thread);

		let stim = sim.add_part("stim", None);
		let ctl = sim.new_output_port(stim, "ctl");
		let data = sim.new_output_port(stim, "data");
		let tmr = sim.new_timer(stim, "tmr");
		sim.set_model(stim, Box::new(Commander{ctl, data, tmr, step: 0}));
		sim.bind(ctl, ctl_port);
		sim.bind(data, inp);

		sim.run(100.0).unwrap();

		let trc = sim.tracing();
		// the data message at t=1 is dropped: the thread is still in Init
		assert_eq!(trc.find_annotation(2.0, thread, 0), Some("thread started"));
		assert_eq!(trc.find_annotation(2.0, thread, 1), Some("invocation 1"));
		assert_eq!(trc.find_annotation(2.0, thread, 2), Some("pending 0"));
		assert_eq!(trc.find_annotation(50.0, thread, 0), Some("thread killed"));
		// the restart reuses the model object, so state persists
		assert_eq!(trc.find_annotation(80.0, thread, 0), Some("thread started"));
		assert_eq!(trc.find_annotation(80.0, thread, 1), Some("invocation 2"));
	}

	struct Crasher;

	impl VtModel for Crasher
	{
		fn run(&mut self, c: &mut VtContext) -> VtResult<()>
		{
			c.busy(5.0, "go")?;
			panic!("boom");
		}
	}

	#[test]
	fn thread_panic_becomes_a_model_failure()
	{
		let mut sim = Simulation::new(quiet());
		let part = sim.add_vthread("crash", None, false);
		sim.set_thread_model(part, Box::new(Crasher));
		sim.add_own_scheduler(part);

		match sim.run(10.0) {
			Err(SimError::ModelFailure{part, message}) => {
				assert_eq!(part, "crash");
				assert_eq!(message, "boom");
			}
			other => panic!("expected a model failure, got {:?}", other),
		}
		assert!(near(sim.time(), 5.0));
	}
}
