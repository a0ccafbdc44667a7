//! Application core — domain orchestration behind port traits.
//!
//! This module contains the suppression controller and the boundary it
//! talks through: hardware collaborators, config sources and event sinks
//! are **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
