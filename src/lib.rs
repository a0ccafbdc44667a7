//! AIPAWE suppression orchestration engine.
//!
//! Exposes the controller core, its collaborator ports, and the host
//! adapters for integration testing and for the simulator binary.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod config_store;
pub mod error;
pub mod estop;
pub mod fsm;
pub mod notify;
pub mod queue;
pub mod runtime;
pub mod watchdog;
