//! Discrete event simulator for timing models.
//!
//! A model is a tree of parts exchanging messages through bound ports,
//! driven by a single event queue and a monotonic clock. Parts come in two
//! flavors: reactive models (callbacks on message arrival and timer
//! expiry) and thread models (sequential code on an OS thread under a
//! small RTOS style preemptive scheduler). Everything that happens is
//! recorded in a trace log which tests and tools can query.

extern crate glob;
extern crate time;

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod parts;
pub mod ports;
pub mod sched_rtos;
pub mod sim_time;
pub mod sim_trace;
pub mod simulation;
pub mod timers;
pub mod vthread;
pub mod watch;

pub use config::*;
pub use error::*;
pub use event::EventId;
pub use message::*;
pub use parts::{PartId, PartModel};
pub use ports::{InPortId, IoPortId, OutPortId, PortKind, PortRef};
pub use sched_rtos::{SchedId, VtState, NUM_PRIOS};
pub use sim_time::*;
pub use sim_trace::*;
pub use simulation::{SimContext, Simulation};
pub use timers::TimerId;
pub use vthread::{VtContext, VtInterrupt, VtModel, VtResult, WaitEvent, WaitRet};
pub use watch::WatchedVar;
