// # keenctl-core
//
// Core library for the keenctl route reconciler.
//
// ## Architecture Overview
//
// This library provides the core functionality for keeping a router's static
// route table in sync with a declaratively configured set of targets:
//
// - **Addr / IpRoute**: network prefix and route value types, plus the parser
//   for the router's `show ip route` output
// - **AddressResolver**: trait for turning a configured target into concrete
//   prefixes (literal addresses are built in; DNS and ASN resolution live in
//   their own crates)
// - **RouterClient / RouterConnector**: traits for the router transport
//   (implemented over SSH in `keenctl-router-ssh`)
// - **Engine**: the reconciliation loop that schedules resolutions on a
//   TTL-ordered queue, diffs desired state against the live table and applies
//   the difference
//
// ## Design Principles
//
// 1. **Separation of Concerns**: the engine only sees trait objects; all
//    transports are injected
// 2. **Plugin-Based**: resolvers are registered by name, no hard-coded if-else
// 3. **Library-First**: everything here can be driven without the daemon
// 4. **Deterministic Shutdown**: cancellation cascades through every task and
//    is never reported as an error

pub mod config;
pub mod engine;
pub mod error;
pub mod net;
pub mod resolve;
pub mod route;
pub mod traits;

// Re-export core types for convenience
pub use config::Config;
pub use engine::Engine;
pub use error::{Error, Result};
pub use net::Addr;
pub use resolve::{Address, AddressResolver, ResolvedAddress, Resolver};
pub use route::IpRoute;
pub use traits::{RouterClient, RouterConnector};
