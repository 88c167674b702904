//! Brokerstack Core
//!
//! Declarative engine behind the broker topology: resources are values,
//! providers turn them into live objects, and nothing happens until a plan
//! is applied.

pub mod differ;
pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod plan;
pub mod provider;
pub mod providers;
pub mod resolve;
pub mod resource;
pub mod schema;
