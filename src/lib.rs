//! # Competition Runner
//!
//! CI glue for evaluating and ranking simulated-robot controllers submitted
//! to a Webots competition. One invocation clones a submission, builds its
//! controller container, drives the simulator to a score or a verdict and
//! updates the persisted leaderboard (`participants.json`).
//!
//! It provides:
//! - Match execution over containerized controllers (`match_runner`)
//! - A persisted ranking ladder with win/lose promotion (`ranking`)
//! - Benchmark scoring for single-submission scenarios (`driver`)
//! - CPU pinning and memory limits for the containers (`resources`)
//!
//! The simulator communicates through its log stream; the handful of
//! sentinel lines that drive a match live in [`milestones`].
//!
//! # Usage Example
//!
//! ```no_run
//! use competition_runner::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let configuration = Configuration::from_env().with_verbose(true);
//!     let inputs = Inputs::from_env()?;
//!     CompetitionDriver::new(configuration, inputs).run()
//! }
//! ```
//!
//! The run modes (benchmark, competition ladder, friendly game) are selected
//! by the scenario file and the CI inputs; see
//! [`ScenarioConfig`](crate::scenario::ScenarioConfig) and
//! [`Inputs`](crate::configuration::Inputs).
#![warn(missing_docs)]

pub use anyhow;
pub mod configuration;
mod docker;
pub mod driver;
mod git;
mod logger;
pub mod match_runner;
pub mod milestones;
pub mod multiplexer;
pub mod participant;
pub mod ranking;
pub mod resources;
pub mod scenario;
mod storage;
mod world;

/// Commonly used types for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use competition_runner::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::Configuration;
    pub use crate::configuration::Inputs;
    pub use crate::driver::CompetitionDriver;
    pub use crate::ranking::RankingStore;
    pub use crate::scenario::ScenarioConfig;
}

use time::format_description;
use time::OffsetDateTime;

/// Current UTC date, `YYYY-MM-DD`.
pub(crate) fn utc_today() -> String {
    format_utc("[year]-[month]-[day]")
}

/// Current UTC instant, `YYYY-MM-DDTHH:MM:SSZ`.
pub(crate) fn utc_timestamp() -> String {
    format_utc("[year]-[month]-[day]T[hour]:[minute]:[second]Z")
}

fn format_utc(description: &str) -> String {
    // static descriptions, neither call can fail
    let format = format_description::parse(description).unwrap();
    OffsetDateTime::now_utc().format(&format).unwrap()
}
