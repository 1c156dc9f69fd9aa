//! Echoloop runtime — the live cognitive loop
//!
//! Architecture:
//! - `topology`: static engines/links/triads and the step dispatch table
//! - `clock`: the shared cyclic step counter (1..=12)
//! - `link`: bounded, best-effort queues between engines (drop-on-full)
//! - `engine`: one long-lived worker per engine invoking its `StepHandler`
//! - `scheduler`: the driving loop, state merge, metrics, capture/restore
//! - `persist`: snapshot-store glue, startup recovery, auto-save
//!
//! One shared clock drives everything; engines never outrun it and never
//! mutate shared state directly.

pub mod clock;
pub mod config;
pub mod engine;
pub mod link;
pub mod mock;
pub mod persist;
pub mod scheduler;
pub mod topology;

pub use clock::StepClock;
pub use config::RuntimeConfig;
pub use engine::EngineMeta;
pub use link::{Link, LinkEndpoint};
pub use mock::MockReasoner;
pub use scheduler::Scheduler;
pub use topology::{EngineSeed, LinkSpec, Topology, Triad};
