//! `conenav-runtime` – assembles the navigation node.
//!
//! # Modules
//!
//! - [`config`] – [`NavConfig`][config::NavConfig]: TOML file at
//!   `~/.conenav/config.toml`, `CONENAV_*` environment overrides and atomic
//!   live parameter batches.
//! - [`node`] – [`NavigationNode`][node::NavigationNode]: the context object
//!   owning the occupancy grid, cone registry, planner and transform buffer,
//!   with one handler per inbound message.
//! - [`runner`] – [`NodeRunner`][runner::NodeRunner]: feeds bus traffic to the
//!   node one event at a time and publishes its outputs.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console
//!   logging plus optional OTLP span export.

pub mod config;
pub mod node;
pub mod runner;
pub mod telemetry;

pub use config::{FrameParams, NavConfig};
pub use node::NavigationNode;
pub use runner::NodeRunner;
pub use telemetry::{TracerProviderGuard, init_tracing};
