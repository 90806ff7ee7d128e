//! lcm-core — shared configuration for cluster-group-lcm.

pub mod config;

pub use config::{ControllerConfig, LcmConfig, SchedulerConfig, StoreConfig};
