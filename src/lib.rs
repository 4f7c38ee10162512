//! An agent-based epidemic simulator over clustered contact networks.
//!
//! The central object is the `Context`, which keeps simulated time, runs
//! scheduled plans and holds the data of every subsystem. A simulation is
//! assembled from modules that extend the `Context`:
//! * `population` holds the agents and their health and care state.
//! * `network` partitions the population into home, work, school and
//!   shopping clusters, each split into subclusters with their own contact
//!   graph, and realizes each day's contacts.
//! * `disease` runs transmission over those contacts and moves infected
//!   agents through incubation, severity tiers, recovery and death.
//! * `healthcare` admits agents to hospital beds and isolation, keeps daily
//!   statistics and switches public-health policies on and off.
//! * `daily_loop` sequences one day of the above and schedules the days.
//!
//! Daily statistics leave the simulation as `DailyStatisticsEvent`s, which
//! `reports` writes to CSV.
pub mod context;
pub mod daily_loop;
pub mod disease;
pub mod error;
pub mod global_properties;
pub mod hashing;
pub mod healthcare;
pub mod log;
pub mod network;
pub mod parameters;
pub mod plan;
pub mod population;
pub mod population_loader;
pub mod random;
pub mod report;
pub mod reports;
pub mod runner;

pub use context::{Context, ExecutionPhase};
pub use error::EpiError;
pub use hashing::{HashMap, HashSet};

// Re-exported for use by the exported macros.
pub use paste;
pub use rand;
