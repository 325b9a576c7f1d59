//! A thread model streaming frames to a consumer over a flaky link: flight
//! times jitter randomly and selected frames are dropped in flight. The
//! consumer's frame count is a watched variable, so the trace shows both
//! the losses and their effect.
#[macro_use]
extern crate clap;
extern crate glob;
extern crate rand;
extern crate tempo;

use clap::{App, ArgMatches};
use rand::{Rng, SeedableRng, XorShiftRng};
use tempo::*;
use std::fmt::Display;
use std::io::{Write, stderr};
use std::process;
use std::str::FromStr;

#[derive(Clone)]
struct LocalConfig
{
	num_frames: u32,
	interval: f64,
	flight_time: f64,
	jitter: f64,
	lost: Vec<u64>,
	seed: u32,
	stop_time: f64,
}

impl LocalConfig
{
	fn new() -> LocalConfig
	{
		// These are the defaults: all of them can be overriden using command line options.
		LocalConfig {
			num_frames: 10,
			interval: 100.0*MS,
			flight_time: 50.0*MS,
			jitter: 20.0*MS,
			lost: vec![2, 5],
			seed: 1,
			stop_time: 2.0,
		}
	}
}

fn fatal_err(message: &str) -> !
{
	let _ = writeln!(&mut stderr(), "{}", message);
	process::exit(1);
}

// Min and max are inclusive.
fn match_num<T>(matches: &ArgMatches, name: &str, min: T, max: T) -> T
		where T: Copy + Display + FromStr + PartialOrd
{
	match value_t!(matches.value_of(name), T) {
		Ok(value) if value < min => fatal_err(&format!("--{} should be greater than {}", name, min)),
		Ok(value) if value > max => fatal_err(&format!("--{} should be less than {}", name, max)),
		Ok(value) => value,
		_ => fatal_err(&format!("--{} should be a number", name)),
	}
}

fn match_time(matches: &ArgMatches, name: &str) -> f64
{
	match parse_time(matches.value_of(name).unwrap_or("")) {
		Ok(value) if value > 0.0 => value,
		Ok(_) => fatal_err(&format!("--{} should be positive", name)),
		Err(err) => fatal_err(&format!("--{}: {}", name, err)),
	}
}

struct Producer
{
	out: OutPortId,
	num_frames: u32,
	interval: f64,
	flight_time: f64,
	jitter: f64,
	rng: XorShiftRng,
}

impl VtModel for Producer
{
	fn run(&mut self, c: &mut VtContext) -> VtResult<()>
	{
		for n in 0..self.num_frames {
			c.wait(Some(self.interval), &[])?;
			let mut flight = self.flight_time;
			if self.jitter > 0.0 {
				flight += self.rng.gen_range(0.0, self.jitter);
			}
			c.send(self.out, format!("frame {}", n), flight)?;
		}
		Ok(())
	}
}

struct Consumer
{
	count: u32,
	received: WatchedVar<u32>,
}

impl PartModel for Consumer
{
	fn msg_received(&mut self, ctx: &mut SimContext, _port: InPortId, msg: Box<dyn Msg>)
	{
		self.count += 1;
		self.received.set(self.count);
		match msg.downcast_ref::<String>() {
			Some(text) => ctx.annotation(text),
			None => ctx.assertion_failed("expected a string frame"),
		}
	}

	fn timer_expired(&mut self, _ctx: &mut SimContext, _timer: TimerId)
	{
	}
}

fn create_sim(local: &LocalConfig, config: Config) -> Simulation
{
	let mut sim = Simulation::new(config);

	let producer = sim.add_vthread("producer", None, false);
	let out = sim.new_output_port(producer, "tx");
	let rng = XorShiftRng::from_seed([local.seed, local.seed.wrapping_mul(31), 0x9e3779b9, 0x85ebca6b]);
	sim.set_thread_model(producer, Box::new(Producer{
		out,
		num_frames: local.num_frames,
		interval: local.interval,
		flight_time: local.flight_time,
		jitter: local.jitter,
		rng}));
	sim.add_own_scheduler(producer);

	let consumer = sim.add_part("consumer", None);
	let inp = sim.new_input_port(consumer, "rx");
	let received = sim.new_watched_var::<u32>(consumer, "received");
	sim.set_model(consumer, Box::new(Consumer{count: 0, received}));

	sim.bind(out, inp);
	for &seq in local.lost.iter() {
		sim.inject_lost(out, seq);
	}
	sim
}

fn parse_options() -> (LocalConfig, Config)
{
	let mut local = LocalConfig::new();
	let mut config = Config::new();
	config.time_unit = TimeUnit::Milliseconds;

	// see https://docs.rs/clap/2.24.2/clap/struct.Arg.html#method.from_usage for syntax
	let usage = format!(
		"--flight=[TIME] 'Base flight time of a frame [{default_flight}s]'
		--frames=[N] 'Number of frames to send [{default_frames}]'
		--interval=[TIME] 'Time between sends [{default_interval}s]'
		--jitter=[TIME] 'Extra random flight time, 0 to disable [{default_jitter}s]'
		--log-level=[LEVEL] 'Log level: {log_levels} [{default_level}]'
		--lose=[N]... 'Drop the Nth future send (0 is the first) [2 and 5]'
		--no-colors 'Don't color code console output'
		--seed=[N] 'Random number generator seed [{default_seed}]'
		--stop-time=[TIME] 'When to stop the simulation [{default_stop}s]'
		--trace=[GLOB]... 'Only print trace lines for matching parts [all]'",
		default_flight = local.flight_time,
		default_frames = local.num_frames,
		default_interval = local.interval,
		default_jitter = local.jitter,
		default_level = format!("{:?}", config.log_level).to_lowercase(),
		default_seed = local.seed,
		default_stop = local.stop_time,
		log_levels = log_levels());

	let matches = App::new("lost_messages")
		.version("1.0")
		.about("Streams frames over a lossy, jittery link.")
		.args_from_usage(&usage)
		.get_matches();

	if matches.is_present("frames") {
		local.num_frames = match_num(&matches, "frames", 1, 1_000_000);
	}
	if matches.is_present("interval") {
		local.interval = match_time(&matches, "interval");
	}
	if matches.is_present("flight") {
		local.flight_time = match_time(&matches, "flight");
	}
	if matches.is_present("jitter") {
		match parse_time(matches.value_of("jitter").unwrap()) {
			Ok(value) if value >= 0.0 => local.jitter = value,
			_ => fatal_err("--jitter should be a non-negative time"),
		}
	}
	if matches.is_present("seed") {
		local.seed = match_num(&matches, "seed", 1, u32::max_value());
	}
	if matches.is_present("stop-time") {
		local.stop_time = match_time(&matches, "stop-time");
	}

	if matches.is_present("lose") {
		local.lost.clear();
		for text in matches.values_of("lose").unwrap() {
			match text.parse::<u64>() {
				Ok(seq) => local.lost.push(seq),
				Err(_) => fatal_err("--lose should be a list of numbers"),
			}
		}
	}

	if matches.is_present("log-level") {
		let text = matches.value_of("log-level").unwrap();
		match parse_log_level(text) {
			Some(level) => config.log_level = level,
			None => fatal_err(&format!("--log-level should be {}", log_levels())),
		}
	}

	if matches.is_present("trace") {
		for text in matches.values_of("trace").unwrap() {
			match glob::Pattern::new(text) {
				Ok(pattern) => config.trace_filter.push(pattern),
				Err(err) => fatal_err(&format!("--trace: {}", err)),
			}
		}
	}

	config.colorize = !matches.is_present("no-colors");

	(local, config)
}

fn main()
{
	let (local, config) = parse_options();
	let mut sim = create_sim(&local, config);
	match sim.run(local.stop_time) {
		Ok(reason) => {
			let lost = sim.tracing().lost_times().len();
			println!("done ({:?}), {} frames dropped", reason, lost);
		}
		Err(err) => fatal_err(&format!("simulation failed: {}", err)),
	}
}
