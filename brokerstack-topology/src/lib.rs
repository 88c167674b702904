//! Brokerstack Topology
//!
//! Two-tier, load-balanced deployment of the serverless debugger broker:
//! a validated configuration goes in, ordered resource descriptors and the
//! user-facing endpoints come out. Nothing here talks to a provider.

pub mod channel;
pub mod config;
pub mod dns;
pub mod error;
pub mod load_balancer;
pub mod naming;
pub mod orchestrator;
pub mod security;
pub mod service;
pub mod stage;

pub use config::Config;
pub use error::ConfigError;
pub use orchestrator::{Deployment, compose};
