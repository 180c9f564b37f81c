//! Router facade over the SSH command pool
//!
//! Translates route values into the router's command shell syntax and fans
//! bulk operations out across the pool: a producer feeds a shared queue and
//! up to `max_parallel_commands` workers drain it. The first failing command
//! stops the remaining work and is surfaced; on cancellation in-flight
//! commands finish but no new ones start.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use keenctl_core::config::SshConfig;
use keenctl_core::route::parse_ip_routes;
use keenctl_core::{Error, IpRoute, Result, RouterClient, RouterConnector};

use crate::pool::SshPool;

#[derive(Clone, Copy)]
enum RouteAction {
    Add,
    Remove,
}

/// SSH-backed router client
pub struct Router {
    pool: SshPool,
    dry_run: bool,
}

impl Router {
    /// Connect the command pool and build the facade
    pub async fn connect(config: &SshConfig) -> Result<Self> {
        let pool = SshPool::connect(config).await?;
        Ok(Self {
            pool,
            dry_run: config.dry_run,
        })
    }

    /// Add a single IP route to the router's routing table
    async fn add_ip_route(&self, route: &IpRoute) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        self.pool.exec(&add_route_command(route)).await.map(drop)
    }

    /// Remove a single IP route from the router's routing table
    async fn remove_ip_route(&self, route: &IpRoute) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        self.pool.exec(&remove_route_command(route)).await.map(drop)
    }

    /// Apply a route set with up to `capacity` commands in flight
    async fn apply_ip_routes(
        &self,
        routes: &[IpRoute],
        cancel: &CancellationToken,
        action: RouteAction,
    ) -> Result<()> {
        let queue = Mutex::new(routes.iter());
        let first_error: Mutex<Option<Error>> = Mutex::new(None);

        let workers = (0..self.pool.capacity()).map(|_| async {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                {
                    let failed = first_error.lock().expect("error slot lock");
                    if failed.is_some() {
                        break;
                    }
                }

                let route = { queue.lock().expect("route queue lock").next() };
                let Some(route) = route else { break };

                let result = match action {
                    RouteAction::Add => self.add_ip_route(route).await,
                    RouteAction::Remove => self.remove_ip_route(route).await,
                };

                if let Err(e) = result {
                    let mut failed = first_error.lock().expect("error slot lock");
                    if failed.is_none() {
                        *failed = Some(e);
                    }
                    break;
                }
            }
        });

        futures::future::join_all(workers).await;

        if let Some(e) = first_error.into_inner().expect("error slot lock") {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

#[async_trait]
impl RouterClient for Router {
    async fn load_ip_routes(&self) -> Result<Vec<IpRoute>> {
        let output = self.pool.exec("show ip route").await?;
        parse_ip_routes(&output)
    }

    async fn add_ip_routes(&self, routes: &[IpRoute], cancel: &CancellationToken) -> Result<()> {
        self.apply_ip_routes(routes, cancel, RouteAction::Add).await
    }

    async fn remove_ip_routes(
        &self,
        routes: &[IpRoute],
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.apply_ip_routes(routes, cancel, RouteAction::Remove)
            .await
    }
}

/// Dial-on-demand connector for the engine's reconnect loop
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    /// Create a connector owning the SSH configuration
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RouterConnector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn RouterClient>> {
        Ok(Box::new(Router::connect(&self.config).await?))
    }
}

/// Render the install command for a route
///
/// The `auto` keyword slot stays in place even when empty, matching the
/// shell syntax the device accepts:
/// `ip route 10.0.0.1/32 Wireguard0  !addr(10.0.0.1)`
fn add_route_command(route: &IpRoute) -> String {
    let auto = if route.auto { "auto" } else { "" };
    format!(
        "ip route {} {} {} !{}",
        route.destination, route.interface, auto, route.description
    )
}

/// Render the removal command for a route
fn remove_route_command(route: &IpRoute) -> String {
    format!("no ip route {} {}", route.destination, route.interface)
}
