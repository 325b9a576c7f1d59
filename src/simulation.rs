use std::collections::{BinaryHeap, HashSet};
use std::mem;
use std::panic;
use time;

use config::*;
use error::*;
use event::*;
use message::Msg;
use parts::*;
use ports::*;
use sched_rtos::RtosSched;
use sim_time::time_str;
use sim_trace::*;
use timers::{Timer, TimerId};
use vthread::VtModel;
use watch::Watcher;

/// The simulation: a part hierarchy, an event queue and a clock. Build the
/// model (parts, ports, bindings, timers, schedulers), then call run once.
///
/// Everything executes on the caller's thread; thread parts run on their
/// own OS threads but only while the simulator is blocked waiting on them,
/// so model time stays deterministic.
pub struct Simulation
{
	pub(crate) config: Config,
	pub(crate) parts: Parts,
	pub(crate) in_ports: Vec<InPort>,
	pub(crate) out_ports: Vec<OutPort>,
	pub(crate) io_ports: Vec<IoPort>,
	pub(crate) timers: Vec<Timer>,
	pub(crate) scheds: Vec<RtosSched>,
	pub(crate) watchers: Vec<Watcher>,
	pub(crate) tracing: SimTracing,

	queue: BinaryHeap<ScheduledEvent>,
	live: HashSet<EventId>,
	next_event: u64,
	time: f64,
	num_events: u64,
	stop_time: f64,
	has_run: bool,
	torn_down: bool,
}

impl Simulation
{
	pub fn new(config: Config) -> Simulation
	{
		let tracing = SimTracing::new(
			config.trace_printing,
			config.time_unit,
			config.colorize,
			config.trace_filter.clone());
		Simulation {
			config,
			parts: Parts::new(),
			in_ports: Vec::new(),
			out_ports: Vec::new(),
			io_ports: Vec::new(),
			timers: Vec::new(),
			scheds: Vec::new(),
			watchers: Vec::new(),
			tracing,
			queue: BinaryHeap::new(),
			live: HashSet::new(),
			next_event: 0,
			time: 0.0,
			num_events: 0,
			stop_time: 0.0,
			has_run: false,
			torn_down: false,
		}
	}

	/// The current model time. Frozen while a model hook or thread runs.
	pub fn time(&self) -> f64
	{
		self.time
	}

	pub fn time_str(&self, time: f64) -> String
	{
		time_str(time, self.config.time_unit)
	}

	pub fn config(&self) -> &Config
	{
		&self.config
	}

	pub fn tracing(&self) -> &SimTracing
	{
		&self.tracing
	}

	// ---- building the model --------------------------------------------

	/// Adds a part. Parts without a model are just grouping nodes.
	pub fn add_part(&mut self, name: &str, parent: Option<PartId>) -> PartId
	{
		self.parts.add(name, parent, PartKind::Model(None))
	}

	pub fn set_model(&mut self, part: PartId, model: Box<dyn PartModel>)
	{
		let path = self.parts.path(part);
		match self.parts.get_mut(part).kind {
			PartKind::Model(ref mut slot) => {
				assert!(slot.is_none(), "part {} already has a model", path);
				*slot = Some(model);
			}
			_ => panic!("part {} is not a model part", path),
		}
	}

	/// Adds a thread part. Remote controlled threads get a control port
	/// accepting "start" and "kill" messages and stay idle until started.
	pub fn add_vthread(&mut self, name: &str, parent: Option<PartId>, remote: bool) -> PartId
	{
		let part = self.parts.add(name, parent, PartKind::VThread(VThreadPart{
			model: None,
			remote,
			control_port: None,
			sched: None}));
		if remote {
			let ctl = self.add_in_port(part, "thread_control_port", InBehavior::ThreadControl);
			if let PartKind::VThread(ref mut vp) = self.parts.get_mut(part).kind {
				vp.control_port = Some(ctl);
			}
		}
		part
	}

	pub fn set_thread_model(&mut self, part: PartId, model: Box<dyn VtModel>)
	{
		let path = self.parts.path(part);
		match self.parts.get_mut(part).kind {
			PartKind::VThread(ref mut vp) => {
				assert!(vp.model.is_none(), "thread part {} already has a model", path);
				vp.model = Some(model);
			}
			_ => panic!("part {} is not a thread part", path),
		}
	}

	pub fn thread_control_port(&self, part: PartId) -> InPortId
	{
		match self.parts.get(part).kind {
			PartKind::VThread(ref vp) => {
				match vp.control_port {
					Some(port) => port,
					None => panic!("thread part {} is not remote controlled", self.parts.path(part)),
				}
			}
			_ => panic!("part {} is not a thread part", self.parts.path(part)),
		}
	}

	pub fn part_path(&self, part: PartId) -> String
	{
		self.parts.path(part)
	}

	pub fn find_part_by_name(&self, hierarchy_name: &str) -> Option<PartId>
	{
		self.parts.find_by_name(hierarchy_name)
	}

	pub fn top_level_parts(&self) -> Vec<PartId>
	{
		self.parts.top_level()
	}

	/// All parts, parents before children.
	pub fn walk_parts(&self) -> Vec<PartId>
	{
		self.parts.walk()
	}

	// ---- the event queue -------------------------------------------------

	pub(crate) fn schedule(&mut self, time: f64, kind: EventKind) -> EventId
	{
		assert!(time >= self.time, "can't schedule into the past ({} < {})", time, self.time);

		let id = EventId(self.next_event);
		self.next_event += 1;
		self.live.insert(id);
		self.queue.push(ScheduledEvent{time, seq: id.0, id, kind});
		id
	}

	pub(crate) fn cancel(&mut self, event: EventId)
	{
		// the heap entry stays behind and is skipped when it pops
		let removed = self.live.remove(&event);
		assert!(removed, "event {:?} is not pending", event);
	}

	// ---- running ---------------------------------------------------------

	/// Runs the simulation until the stop time, the event queue drains, the
	/// event budget runs out, or (if configured) a model assertion fails.
	/// Can only be called once.
	pub fn run(&mut self, stop_time: f64) -> SimResult<StopReason>
	{
		if self.has_run {
			return Err(SimError::AlreadyRan);
		}
		self.has_run = true;
		assert!(stop_time > 0.0, "stop time ({}) must be positive", stop_time);
		self.stop_time = stop_time;

		self.check_unbound_ports();
		self.log(LogLevel::Info, &format!("running {} parts until {}", self.parts.len(), self.time_str(stop_time)));
		let started_at = time::precise_time_s();

		// teardown has to happen on every exit path or thread parts leak
		let outcome = panic::catch_unwind(panic::AssertUnwindSafe(|| {
			self.prime_watchers();
			self.start_all()?;
			self.check_watchers();
			self.event_loop()
		}));
		self.teardown();

		match outcome {
			Ok(result) => {
				if let Ok(ref reason) = result {
					let elapsed = time::precise_time_s() - started_at;
					self.log(LogLevel::Info, &format!("stopped at {} after {} events ({:?}, {:.3}s wall clock)",
						self.time_str(self.time), self.num_events, reason, elapsed));
				}
				for failure in self.tracing.assertion_failures() {
					self.log(LogLevel::Error, &format!("assertion failed in {}", failure));
				}
				result
			}
			Err(payload) => panic::resume_unwind(payload),
		}
	}

	fn event_loop(&mut self) -> SimResult<StopReason>
	{
		loop {
			let event = match self.queue.pop() {
				Some(event) => event,
				None => return Ok(StopReason::NoMoreEvents),
			};
			if !self.live.remove(&event.id) {
				continue;	// cancelled
			}
			if event.time > self.stop_time {
				self.time = self.stop_time;
				return Ok(StopReason::StopTimeReached);
			}
			assert!(event.time >= self.time, "event time went backward ({} < {})", event.time, self.time);
			self.time = event.time;

			self.execute(event.kind)?;
			self.num_events += 1;
			self.check_watchers();

			if self.config.stop_on_assertion_failure && self.tracing.assertion_count() > 0 {
				return Ok(StopReason::AssertionFailure);
			}
			if self.num_events >= self.config.max_events {
				return Ok(StopReason::EventLimit);
			}
		}
	}

	fn execute(&mut self, kind: EventKind) -> SimResult<()>
	{
		match kind {
			EventKind::MsgFire(port) => self.execute_fire(port),
			EventKind::TimerExpired(timer) => self.timer_expired_event(timer),
		}
	}

	fn start_all(&mut self) -> SimResult<()>
	{
		enum Found
		{
			Hook,
			Sched(::sched_rtos::SchedId),
			Skip,
		}

		for part in self.parts.walk() {
			let found = match self.parts.get(part).kind {
				PartKind::Model(Some(_)) => Found::Hook,
				PartKind::Scheduler(id) => Found::Sched(id),
				_ => Found::Skip,
			};
			match found {
				Found::Hook => self.with_model(part, |model, ctx| model.start(ctx)),
				Found::Sched(id) => self.sched_start(id)?,
				Found::Skip => (),
			}
		}
		Ok(())
	}

	fn teardown(&mut self)
	{
		if self.torn_down {
			return;
		}
		self.torn_down = true;

		enum Found
		{
			Hook,
			Sched(::sched_rtos::SchedId),
			Skip,
		}

		for part in self.parts.walk() {
			let found = match self.parts.get(part).kind {
				PartKind::Model(Some(_)) => Found::Hook,
				PartKind::Scheduler(id) => Found::Sched(id),
				_ => Found::Skip,
			};
			match found {
				Found::Hook => self.with_model(part, |model, ctx| model.terminate(ctx)),
				Found::Sched(id) => self.sched_shutdown(id),
				Found::Skip => (),
			}
		}
	}

	/// Runs a hook on a part's model. The model is moved out for the
	/// duration so the hook can freely call back into the simulation.
	pub(crate) fn with_model<F>(&mut self, part: PartId, hook: F)
		where F: FnOnce(&mut Box<dyn PartModel>, &mut SimContext)
	{
		let path = self.parts.path(part);
		let mut model = match self.parts.get_mut(part).kind {
			PartKind::Model(ref mut slot) => {
				match slot.take() {
					Some(model) => model,
					None => panic!("part {} has no model", path),
				}
			}
			_ => panic!("part {} is not a model part", path),
		};
		{
			let mut ctx = SimContext{sim: self, part};
			hook(&mut model, &mut ctx);
		}
		match self.parts.get_mut(part).kind {
			PartKind::Model(ref mut slot) => *slot = Some(model),
			_ => (),
		}
	}

	// ---- tracing and logging ---------------------------------------------

	pub(crate) fn trace(&mut self, part: Option<PartId>, sub_obj: Option<String>,
		payload: Option<String>, action: TraceAction)
	{
		let path = match part {
			Some(p) => self.parts.path(p),
			None => String::new(),
		};
		let event = TraceEvent{time: self.time, part, sub_obj, payload, action};
		self.tracing.add(event, &path);
	}

	pub fn annotate(&mut self, part: PartId, text: &str)
	{
		self.trace(Some(part), None, Some(text.to_string()), TraceAction::Annotation);
	}

	pub fn set_state_indicator(&mut self, part: PartId, text: &str)
	{
		self.trace(Some(part), None, Some(text.to_string()), TraceAction::Status);
	}

	/// Records a model assertion failure. The run keeps going unless
	/// Config::stop_on_assertion_failure is set; failures are summarized
	/// when the run ends either way.
	pub fn assertion_failed(&mut self, part: PartId, text: &str)
	{
		self.trace(Some(part), None, Some(text.to_string()), TraceAction::AssertionFailed);
		let failure = format!("{} at {}: {}", self.parts.path(part), self.time_str(self.time), text);
		self.tracing.record_failure(failure);
	}

	pub(crate) fn log(&self, level: LogLevel, text: &str)
	{
		if level <= self.config.log_level {
			println!("SIM: {}", text);
		}
	}

	pub(crate) fn log_warning(&self, text: &str)
	{
		self.log(LogLevel::Warning, text);
	}

	pub(crate) fn log_error(&self, text: &str)
	{
		self.log(LogLevel::Error, text);
	}

	// ---- watched variables -----------------------------------------------

	/// Records and traces every watched variable's initial value. Runs
	/// before the start hooks so anything a hook writes shows up as a
	/// change.
	fn prime_watchers(&mut self)
	{
		let mut watchers = mem::replace(&mut self.watchers, Vec::new());
		for watcher in watchers.iter_mut() {
			if let Some(text) = watcher.prime() {
				self.trace(Some(watcher.part), Some(watcher.name.clone()), Some(text), TraceAction::ValueChanged);
			}
		}
		watchers.append(&mut self.watchers);
		self.watchers = watchers;
	}

	fn check_watchers(&mut self)
	{
		let mut watchers = mem::replace(&mut self.watchers, Vec::new());
		for watcher in watchers.iter_mut() {
			if let Some(text) = watcher.check() {
				self.trace(Some(watcher.part), Some(watcher.name.clone()), Some(text), TraceAction::ValueChanged);
			}
		}
		// keep any watchers registered while we were tracing
		watchers.append(&mut self.watchers);
		self.watchers = watchers;
	}
}

/// What a part model's hooks get to talk to the simulation. Everything is
/// relative to the part the hook belongs to.
pub struct SimContext<'a>
{
	pub(crate) sim: &'a mut Simulation,
	pub(crate) part: PartId,
}

impl<'a> SimContext<'a>
{
	pub fn time(&self) -> f64
	{
		self.sim.time()
	}

	pub fn part(&self) -> PartId
	{
		self.part
	}

	pub fn send<M: Msg>(&mut self, port: OutPortId, msg: M, flight_time: f64)
	{
		self.sim.send(port, msg, flight_time);
	}

	pub fn timer_start(&mut self, timer: TimerId, timeout: f64)
	{
		self.sim.timer_start(timer, timeout);
	}

	pub fn timer_stop(&mut self, timer: TimerId)
	{
		self.sim.timer_stop(timer);
	}

	pub fn timer_restart(&mut self, timer: TimerId, timeout: f64)
	{
		self.sim.timer_restart(timer, timeout);
	}

	pub fn annotation(&mut self, text: &str)
	{
		let part = self.part;
		self.sim.annotate(part, text);
	}

	pub fn set_state_indicator(&mut self, text: &str)
	{
		let part = self.part;
		self.sim.set_state_indicator(part, text);
	}

	pub fn assertion_failed(&mut self, text: &str)
	{
		let part = self.part;
		self.sim.assertion_failed(part, text);
	}

	pub fn inject_lost(&mut self, port: OutPortId, next_seq: u64)
	{
		self.sim.inject_lost(port, next_seq);
	}
}

#[cfg(test)]
mod tests
{
	use super::*;
	use watch::WatchedVar;

	fn quiet() -> Config
	{
		Config{log_level: LogLevel::Error, trace_printing: false, ..Config::new()}
	}

	struct Talker
	{
		out: OutPortId,
		tmr: TimerId,
		think: f64,
		flight: f64,
		replies: Vec<&'static str>,
		next: usize,
		opener: Option<&'static str>,
	}

	impl PartModel for Talker
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			if let Some(text) = self.opener {
				ctx.send(self.out, text.to_string(), self.flight);
			}
		}

		fn msg_received(&mut self, ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
			ctx.timer_start(self.tmr, self.think);
		}

		fn timer_expired(&mut self, ctx: &mut SimContext, _timer: TimerId)
		{
			let text = self.replies[self.next % self.replies.len()];
			self.next += 1;
			ctx.send(self.out, text.to_string(), self.flight);
		}
	}

	#[test]
	fn two_parts_hold_a_conversation()
	{
		let mut sim = Simulation::new(quiet());
		let bob = sim.add_part("bob", None);
		let bob_out = sim.new_output_port(bob, "tx");
		let bob_in = sim.new_input_port(bob, "rx");
		let bob_tmr = sim.new_timer(bob, "think");
		sim.set_model(bob, Box::new(Talker{
			out: bob_out,
			tmr: bob_tmr,
			think: 1.4,
			flight: 1.0,
			replies: vec!["How are you?", "Hm?"],
			next: 0,
			opener: Some("Hi Joe")}));

		let joe = sim.add_part("joe", None);
		let joe_out = sim.new_output_port(joe, "tx");
		let joe_in = sim.new_input_port(joe, "rx");
		let joe_tmr = sim.new_timer(joe, "think");
		sim.set_model(joe, Box::new(Talker{
			out: joe_out,
			tmr: joe_tmr,
			think: 2.0,
			flight: 1.5,
			replies: vec!["Hi, how are you?", "Fine"],
			next: 0,
			opener: None}));

		sim.bind(bob_out, joe_in);
		sim.bind(joe_out, bob_in);

		let reason = sim.run(12.0).unwrap();
		assert_eq!(reason, StopReason::StopTimeReached);
		assert!(near(sim.time(), 12.0));

		let to_joe = sim.tracing().deliveries("joe.rx");
		assert_eq!(to_joe.len(), 2);
		assert!(near(to_joe[0].0, 1.0) && to_joe[0].1.contains("Hi Joe"));
		assert!(near(to_joe[1].0, 6.9) && to_joe[1].1.contains("How are you?"));

		let to_bob = sim.tracing().deliveries("bob.rx");
		assert_eq!(to_bob.len(), 2);
		assert!(near(to_bob[0].0, 4.5) && to_bob[0].1.contains("Hi, how are you?"));
		assert!(near(to_bob[1].0, 10.4) && to_bob[1].1.contains("Fine"));

		// bob's final reply leaves at 11.8 but never lands
		let last_send = sim.tracing().traced_events().iter()
			.filter(|e| e.action == TraceAction::MsgSent)
			.last()
			.map(|e| e.time);
		assert!(near(last_send.unwrap(), 11.8));
		assert!(sim.tracing().is_monotonic());
	}

	#[derive(Clone, Debug)]
	struct Sub
	{
		attr: u32,
	}

	#[derive(Clone, Debug)]
	struct Data
	{
		sub: Sub,
	}

	struct Producer
	{
		out: OutPortId,
	}

	impl PartModel for Producer
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			let mut data = Data{sub: Sub{attr: 123}};
			ctx.send(self.out, data.clone(), 3.0);
			data.sub.attr = 234;
			ctx.send(self.out, data, 3.0);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, _ctx: &mut SimContext, _timer: TimerId)
		{
		}
	}

	struct Mutator;

	impl PartModel for Mutator
	{
		fn msg_received(&mut self, ctx: &mut SimContext, _port: InPortId, msg: Box<dyn Msg>)
		{
			let mut data = msg.downcast::<Data>().unwrap();
			data.sub.attr += 1;
			ctx.annotation(&format!("{}", data.sub.attr));
		}

		fn timer_expired(&mut self, _ctx: &mut SimContext, _timer: TimerId)
		{
		}
	}

	struct Viewer;

	impl PartModel for Viewer
	{
		fn msg_received(&mut self, ctx: &mut SimContext, _port: InPortId, msg: Box<dyn Msg>)
		{
			let data = msg.downcast_ref::<Data>().unwrap();
			ctx.annotation(&format!("{}", data.sub.attr));
		}

		fn timer_expired(&mut self, _ctx: &mut SimContext, _timer: TimerId)
		{
		}
	}

	#[test]
	fn every_receiver_gets_its_own_copy()
	{
		let mut sim = Simulation::new(quiet());
		let src = sim.add_part("src", None);
		let out = sim.new_output_port(src, "tx");
		sim.set_model(src, Box::new(Producer{out}));
		let first = sim.add_part("first", None);
		let first_in = sim.new_input_port(first, "rx");
		sim.set_model(first, Box::new(Mutator));
		let second = sim.add_part("second", None);
		let second_in = sim.new_input_port(second, "rx");
		sim.set_model(second, Box::new(Viewer));
		sim.bind(out, first_in);
		sim.bind(out, second_in);

		sim.run(10.0).unwrap();

		// the first receiver mutates its copy; the second never sees that
		let trc = sim.tracing();
		assert_eq!(trc.find_annotation(3.0, first, 0), Some("124"));
		assert_eq!(trc.find_annotation(3.0, second, 0), Some("123"));
		assert_eq!(trc.find_annotation(6.0, first, 0), Some("235"));
		assert_eq!(trc.find_annotation(6.0, second, 0), Some("234"));
	}

	struct Endless
	{
		tmr: TimerId,
	}

	impl PartModel for Endless
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			ctx.timer_start(self.tmr, 2.0);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, ctx: &mut SimContext, timer: TimerId)
		{
			ctx.timer_start(timer, 2.0);
		}
	}

	#[test]
	fn runaway_models_hit_the_event_budget()
	{
		let config = Config{max_events: 10, ..quiet()};
		let mut sim = Simulation::new(config);
		let part = sim.add_part("spinner", None);
		let tmr = sim.new_timer(part, "tmr");
		sim.set_model(part, Box::new(Endless{tmr}));

		let reason = sim.run(1.0e9).unwrap();
		assert_eq!(reason, StopReason::EventLimit);
		assert!(near(sim.time(), 20.0));
	}

	#[test]
	fn run_is_once_only()
	{
		let mut sim = Simulation::new(quiet());
		let part = sim.add_part("spinner", None);
		let tmr = sim.new_timer(part, "tmr");
		sim.set_model(part, Box::new(Endless{tmr}));

		sim.run(5.0).unwrap();
		match sim.run(5.0) {
			Err(SimError::AlreadyRan) => (),
			other => panic!("expected AlreadyRan, got {:?}", other),
		}
	}

	struct Bump
	{
		tmr: TimerId,
		var: WatchedVar<u32>,
		n: u32,
	}

	impl PartModel for Bump
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			ctx.timer_start(self.tmr, 2.0);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, ctx: &mut SimContext, timer: TimerId)
		{
			self.n += 1;
			self.var.set(self.n);
			if self.n < 3 {
				ctx.timer_start(timer, 2.0);
			}
		}
	}

	#[test]
	fn watched_vars_trace_changes()
	{
		let mut sim = Simulation::new(quiet());
		let part = sim.add_part("counter", None);
		let tmr = sim.new_timer(part, "tmr");
		let var = sim.new_watched_var::<u32>(part, "count");
		sim.set_model(part, Box::new(Bump{tmr, var, n: 0}));

		sim.run(10.0).unwrap();

		let changes: Vec<(f64, String)> = sim.tracing().traced_events().iter()
			.filter(|e| e.action == TraceAction::ValueChanged)
			.map(|e| (e.time, e.payload.clone().unwrap_or_default()))
			.collect();
		assert_eq!(changes.len(), 3);
		assert!(near(changes[0].0, 2.0) && changes[0].1 == "1");
		assert!(near(changes[1].0, 4.0) && changes[1].1 == "2");
		assert!(near(changes[2].0, 6.0) && changes[2].1 == "3");
	}

	struct EarlyBird
	{
		var: WatchedVar<u32>,
	}

	impl PartModel for EarlyBird
	{
		fn start(&mut self, _ctx: &mut SimContext)
		{
			self.var.set(42);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, _ctx: &mut SimContext, _timer: TimerId)
		{
		}
	}

	#[test]
	fn watch_values_are_traced_at_run_start()
	{
		let mut sim = Simulation::new(quiet());
		let part = sim.add_part("dev", None);
		let preset = sim.new_watched_var::<u32>(part, "preset");
		preset.set(7);
		let var = sim.new_watched_var::<u32>(part, "mode");
		sim.set_model(part, Box::new(EarlyBird{var}));

		sim.run(1.0).unwrap();

		// the value set before the run is traced first, then the change a
		// start hook made
		let changes: Vec<(String, String)> = sim.tracing().traced_events().iter()
			.filter(|e| e.action == TraceAction::ValueChanged)
			.map(|e| (e.sub_obj.clone().unwrap_or_default(), e.payload.clone().unwrap_or_default()))
			.collect();
		assert_eq!(changes, vec![
			("preset".to_string(), "7".to_string()),
			("mode".to_string(), "42".to_string())]);
		assert!(sim.tracing().traced_events().iter().all(|e| near(e.time, 0.0)));
	}

	struct BadApple
	{
		tmr: TimerId,
	}

	impl PartModel for BadApple
	{
		fn start(&mut self, ctx: &mut SimContext)
		{
			ctx.timer_start(self.tmr, 1.0);
		}

		fn msg_received(&mut self, _ctx: &mut SimContext, _port: InPortId, _msg: Box<dyn Msg>)
		{
		}

		fn timer_expired(&mut self, ctx: &mut SimContext, _timer: TimerId)
		{
			ctx.assertion_failed("checksum mismatch");
		}
	}

	#[test]
	fn assertion_failures_can_stop_the_run()
	{
		let config = Config{stop_on_assertion_failure: true, ..quiet()};
		let mut sim = Simulation::new(config);
		let part = sim.add_part("dev", None);
		let tmr = sim.new_timer(part, "tmr");
		sim.set_model(part, Box::new(BadApple{tmr}));

		let reason = sim.run(10.0).unwrap();
		assert_eq!(reason, StopReason::AssertionFailure);
		assert_eq!(sim.tracing().assertion_count(), 1);
		assert!(sim.tracing().assertion_failures()[0].contains("dev"));
		assert!(near(sim.time(), 1.0));
	}
}
