//! Object model shared by the fleetset controller, cache and scheduler crates.

pub mod config;
pub mod daemonset;
pub mod meta;
pub mod node;
pub mod pod;
pub mod selector;
pub mod validate;
