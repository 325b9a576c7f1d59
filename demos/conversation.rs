//! Two parts holding a conversation: bob opens, each side thinks for a
//! while before answering, and every message spends some time in flight.
//! Small, but it exercises the core of the simulator: parts, bound ports,
//! timers and the trace log.
extern crate clap;
extern crate glob;
extern crate tempo;

use clap::App;
use tempo::*;
use std::io::{Write, stderr};
use std::process;

#[derive(Clone)]
struct LocalConfig
{
	think_time: f64,
	joe_think_time: f64,
	flight_time: f64,
	stop_time: f64,
}

impl LocalConfig
{
	fn new() -> LocalConfig
	{
		// These are the defaults: all of them can be overriden using command line options.
		LocalConfig {
			think_time: 1.4,
			joe_think_time: 2.0,
			flight_time: 1.0,
			stop_time: 12.0,
		}
	}
}

fn fatal_err(message: &str) -> !
{
	let _ = writeln!(&mut stderr(), "{}", message);
	process::exit(1);
}

fn match_time(matches: &clap::ArgMatches, name: &str) -> f64
{
	match parse_time(matches.value_of(name).unwrap_or("")) {
		Ok(value) if value > 0.0 => value,
		Ok(_) => fatal_err(&format!("--{} should be positive", name)),
		Err(err) => fatal_err(&format!("--{}: {}", name, err)),
	}
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

fn add_talker(sim: &mut Simulation, name: &str, think: f64, flight: f64,
	replies: Vec<&'static str>, opener: Option<&'static str>) -> PartId
{
	let part = sim.add_part(name, None);
	let out = sim.new_output_port(part, "tx");
	sim.new_input_port(part, "rx");
	let tmr = sim.new_timer(part, "think");
	sim.set_model(part, Box::new(Talker{out, tmr, think, flight, replies, next: 0, opener}));
	part
}

fn create_sim(local: &LocalConfig, config: Config) -> Simulation
{
	let mut sim = Simulation::new(config);
	add_talker(&mut sim, "bob", local.think_time, local.flight_time,
		vec!["How are you?", "Hm?"], Some("Hi Joe"));
	add_talker(&mut sim, "joe", local.joe_think_time, 1.5*local.flight_time,
		vec!["Hi, how are you?", "Fine"], None);
	sim.smart_bind(&[&["bob.tx", "joe.rx"], &["joe.tx", "bob.rx"]]);
	sim
}

fn parse_options() -> (LocalConfig, Config)
{
	let mut local = LocalConfig::new();
	let mut config = Config::new();

	// see https://docs.rs/clap/2.24.2/clap/struct.Arg.html#method.from_usage for syntax
	let usage = format!(
		"--flight=[TIME] 'Time a message spends in flight [{default_flight}s]'
		--log-level=[LEVEL] 'Log level: {log_levels} [{default_level}]'
		--no-colors 'Don't color code console output'
		--stop-time=[TIME] 'When to stop the simulation [{default_stop}s]'
		--think=[TIME] 'How long bob thinks before replying [{default_think}s]'
		--trace=[GLOB]... 'Only print trace lines for matching parts [all]'",
		default_flight = local.flight_time,
		default_level = format!("{:?}", config.log_level).to_lowercase(),
		default_stop = local.stop_time,
		default_think = local.think_time,
		log_levels = log_levels());

	let matches = App::new("conversation")
		.version("1.0")
		.about("Two simulated parts making small talk.")
		.args_from_usage(&usage)
		.get_matches();

	if matches.is_present("think") {
		local.think_time = match_time(&matches, "think");
	}
	if matches.is_present("flight") {
		local.flight_time = match_time(&matches, "flight");
	}
	if matches.is_present("stop-time") {
		local.stop_time = match_time(&matches, "stop-time");
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
		Ok(reason) => println!("done ({:?})", reason),
		Err(err) => fatal_err(&format!("simulation failed: {}", err)),
	}
}
