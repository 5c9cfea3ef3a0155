//! Library crate for web-sweep-rs: an unattended IPv4 sweep that probes web ports and
//! records page metadata.
pub mod config;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod sink;
pub mod targets;
pub mod types;
