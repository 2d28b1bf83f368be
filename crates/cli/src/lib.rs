//! FleetQA CLI library
//!
//! Argument parsing and terminal output for the `fleetqa` binary.

pub mod args;
pub mod output;
