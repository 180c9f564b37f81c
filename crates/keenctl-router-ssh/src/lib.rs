// # SSH Router Transport
//
// This crate provides the SSH implementation of the core router traits.
//
// ## Architecture
//
// - [`SshPool`]: a fixed-size pool of authenticated SSH connections with a
//   single `exec(cmd) -> String` operation
// - [`Router`]: the facade implementing `RouterClient` on top of the pool:
//   route-table loading, command rendering, dry-run and bounded-concurrency
//   bulk apply
// - [`SshConnector`]: implements `RouterConnector` so the engine can redial
//   on every reconnect
//
// ## Security
//
// Host-key verification is intentionally permissive (any key is accepted).
// This targets administrator-controlled LAN devices reached over a trusted
// network segment; do not point it across an untrusted path.

pub mod pool;
pub mod router;

pub use pool::SshPool;
pub use router::{Router, SshConnector};
