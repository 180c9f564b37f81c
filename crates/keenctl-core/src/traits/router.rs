// # Router Transport Traits
//
// Defines the interface between the reconciliation engine and the device
// that owns the routing table.
//
// ## Implementations
//
// - SSH command shell: `keenctl-router-ssh` crate
//
// ## Responsibility boundaries
//
// Implementations execute the commands they are handed and report failure;
// they must not retry, diff, or decide what to install. Scheduling, diffing
// and retry policy are owned by the engine. A bulk operation observes its
// cancellation token between commands: in-flight commands run to completion,
// no new ones start.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::route::IpRoute;

/// Trait for router transport implementations
///
/// Implementations must be thread-safe; bulk operations may issue commands
/// concurrently up to the transport's configured parallelism.
#[async_trait]
pub trait RouterClient: Send + Sync {
    /// Retrieve the current IP routing table from the router
    async fn load_ip_routes(&self) -> Result<Vec<IpRoute>>;

    /// Install the given routes, bounded-concurrently
    ///
    /// The first failing command cancels the remaining work and is returned.
    /// Cancellation via `cancel` surfaces as [`crate::Error::Cancelled`].
    async fn add_ip_routes(&self, routes: &[IpRoute], cancel: &CancellationToken) -> Result<()>;

    /// Remove the given routes, bounded-concurrently
    ///
    /// Same failure and cancellation contract as
    /// [`RouterClient::add_ip_routes`].
    async fn remove_ip_routes(&self, routes: &[IpRoute], cancel: &CancellationToken)
        -> Result<()>;
}

/// Trait for establishing router connections
///
/// The engine dials through this on every (re)connect; a connector owns the
/// connection configuration and nothing else.
#[async_trait]
pub trait RouterConnector: Send + Sync {
    /// Open a fresh client connection to the router
    async fn connect(&self) -> Result<Box<dyn RouterClient>>;
}
