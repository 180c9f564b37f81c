//! Core traits for the keenctl system
//!
//! This module defines the abstract interfaces the engine drives:
//!
//! - [`RouterClient`]: load and modify the router's static route table
//! - [`RouterConnector`]: establish a fresh [`RouterClient`] on (re)connect
//!
//! The address resolver trait lives in [`crate::resolve`] next to its
//! dispatch machinery.

pub mod router;

pub use router::{RouterClient, RouterConnector};
