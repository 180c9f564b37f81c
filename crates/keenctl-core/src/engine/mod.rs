//! Core reconciliation engine
//!
//! The Engine is responsible for:
//! - Dialing the router and reconnecting with backoff
//! - Scheduling per-route resolutions on a TTL-ordered queue
//! - Diffing resolved desired state against the live routing table
//! - Applying additions and deletions through the router client
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐  desired-state snapshots  ┌─────────────┐
//! │ resolver task │ ────── capacity 1 ──────▶ │  sync task  │
//! │ (queue owner) │                           │ (diff+apply)│
//! └───────────────┘                           └─────────────┘
//!         │                                          │
//!   AddressResolver                            RouterClient
//! ```
//!
//! One resolver/sync pair is a *reconciliation session*. A session ends on
//! sync error, connection loss or cancellation; entries and their cached
//! resolutions do not survive it. The capacity-1 channel makes a slow sync
//! exert backpressure on resolution instead of accumulating snapshots.

mod entry;

use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::Result;
use crate::resolve::Resolver;
use crate::route::IpRoute;
use crate::traits::{RouterClient, RouterConnector};
use entry::{ResolveEntry, ResolveQueue};

/// Upper bound on the reconnect backoff delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Fallback TTL: entries without TTL information, failed resolutions and the
/// idle timer all re-arm after this long. Doubles as the clamp on very large
/// upstream TTLs.
const DEFAULT_MIN_TTL: Duration = Duration::from_secs(60 * 60);

/// The reconciliation engine
///
/// ## Lifecycle
///
/// 1. Create with [`Engine::new`]
/// 2. Start with [`Engine::run`]
/// 3. Runs until the shutdown token is cancelled
///
/// Cancellation is a clean shutdown, not an error.
pub struct Engine {
    config: Config,
    resolver: Resolver,
    connector: Box<dyn RouterConnector>,
}

impl Engine {
    /// Create a new engine
    ///
    /// The resolver registry must already contain every resolver the
    /// configuration references; the connector is dialed on every
    /// (re)connect.
    pub fn new(config: Config, resolver: Resolver, connector: Box<dyn RouterConnector>) -> Self {
        Self {
            config,
            resolver,
            connector,
        }
    }

    /// Run the connect loop until `shutdown` is cancelled
    ///
    /// Connect failures and session errors re-enter the loop after a backoff
    /// of `min(attempt · 1s, 5s)`; the attempt counter resets on every
    /// successful connect.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            if attempt == 0 {
                info!("connecting to router");
            }

            let connected = tokio::select! {
                connected = self.connector.connect() => connected,
                () = shutdown.cancelled() => return Ok(()),
            };

            match connected {
                Ok(router) => {
                    attempt = 0;
                    match self.resolve_and_sync(router.as_ref(), &shutdown).await {
                        Ok(()) => return Ok(()),
                        Err(e) if e.is_cancelled() => return Ok(()),
                        Err(e) => {
                            attempt += 1;
                            error!("syncing to router failed: {}", e);
                        }
                    }
                }
                Err(e) => {
                    attempt += 1;
                    error!("connection to router failed (attempt {}): {}", attempt, e);
                }
            }

            let delay = Duration::from_secs(u64::from(attempt)).min(MAX_RETRY_DELAY);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.cancelled() => return Ok(()),
            }
        }
    }

    /// Run one reconciliation session against a connected router
    ///
    /// Returns `Ok(())` only when the session ended through cancellation.
    async fn resolve_and_sync(
        &self,
        router: &dyn RouterClient,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let session = shutdown.child_token();
        let (routes_tx, mut routes_rx) = mpsc::channel::<Vec<IpRoute>>(1);

        let resolver_task = {
            let session = session.clone();
            async move {
                let mut queue = ResolveQueue::new();

                loop {
                    info!("resolving addresses for routes");
                    // dropping the in-flight resolution cancels its DNS and
                    // HTTP calls
                    let (snapshot, next_expire_at) = tokio::select! {
                        resolved = self.resolve_routes(&mut queue) => resolved,
                        () = session.cancelled() => return Ok(()),
                    };

                    tokio::select! {
                        sent = routes_tx.send(snapshot) => {
                            if sent.is_err() {
                                // sync task is gone; it carries the session result
                                return Ok(());
                            }
                        }
                        () = session.cancelled() => return Ok(()),
                    }

                    let sleep_for = next_expire_at
                        .duration_since(SystemTime::now())
                        .unwrap_or_default();
                    debug!("scheduling next resolve in {:?}", sleep_for);

                    tokio::select! {
                        () = tokio::time::sleep(sleep_for) => {}
                        () = session.cancelled() => return Ok(()),
                    }
                }
            }
        };

        let sync_task = {
            let session = session.clone();
            async move {
                loop {
                    tokio::select! {
                        received = routes_rx.recv() => match received {
                            Some(routes) => {
                                if let Err(e) = self.sync_to_router(router, &routes, &session).await {
                                    session.cancel();
                                    return Err(e);
                                }
                            }
                            None => return Ok(()),
                        },
                        () = session.cancelled() => return Ok(()),
                    }
                }
            }
        };

        let (resolve_result, sync_result) = tokio::join!(resolver_task, sync_task);
        resolve_result.and(sync_result)
    }

    /// Resolve every due entry and produce the desired-state snapshot
    ///
    /// Returns the concatenation of all live entries' routes and the instant
    /// the earliest remaining resolution expires.
    async fn resolve_routes(
        &self,
        queue: &mut ResolveQueue,
    ) -> (Vec<IpRoute>, SystemTime) {
        let now = SystemTime::now();
        let mut next_expire_at = now + DEFAULT_MIN_TTL;

        let due = if queue.is_empty() {
            ResolveEntry::entries_for(&self.config)
        } else {
            queue.pop_expired(now)
        };

        if let Some(head) = queue.peek() {
            next_expire_at = next_expire_at.min(head.expire_at);
        }

        for mut entry in due {
            self.resolve_route_entry(&mut entry).await;
            next_expire_at = next_expire_at.min(entry.expire_at);
            queue.push(entry);
        }

        let snapshot: Vec<IpRoute> = queue
            .iter()
            .flat_map(|entry| entry.routes.iter().cloned())
            .collect();

        (snapshot, next_expire_at)
    }

    /// Resolve one entry, updating its cached routes and expiry
    ///
    /// Resolution failure keeps the previously cached routes and schedules
    /// the next attempt after [`DEFAULT_MIN_TTL`]; it never kills the
    /// session.
    async fn resolve_route_entry(&self, entry: &mut ResolveEntry) {
        let now = SystemTime::now();

        let addresses = match self
            .resolver
            .resolve(&entry.target, &entry.resolver, &entry.filters)
            .await
        {
            Ok(addresses) => addresses,
            Err(e) => {
                if !e.is_cancelled() {
                    error!("could not resolve addresses for {}: {}", entry.target, e);
                }
                entry.expire_at = now + DEFAULT_MIN_TTL;
                return;
            }
        };

        let mut min_ttl = DEFAULT_MIN_TTL;
        let mut routes = Vec::with_capacity(addresses.len());
        for address in addresses {
            if let Some(ttl) = address.ttl {
                min_ttl = min_ttl.min(ttl);
            }
            routes.push(IpRoute {
                destination: address.addr,
                interface: entry.interface.clone(),
                gateway: entry.gateway.clone(),
                flags: String::new(),
                description: address.description,
                metric: 0,
                auto: entry.auto,
            });
        }

        entry.apply_resolved(routes, now + min_ttl);
    }

    /// Diff one desired-state snapshot against the router and apply it
    ///
    /// Additions complete before deletions begin, so a large refresh never
    /// leaves a transiently empty table.
    async fn sync_to_router(
        &self,
        router: &dyn RouterClient,
        desired: &[IpRoute],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let current = router.load_ip_routes().await?;

        let new_routes: Vec<IpRoute> = desired
            .iter()
            .filter(|route| !current.iter().any(|current| route.matches(current)))
            .cloned()
            .collect();

        let cleanup_interfaces: Vec<&str> = self
            .config
            .interfaces
            .iter()
            .filter(|interface| interface.cleanup)
            .map(|interface| interface.name.as_str())
            .collect();

        let outdated_routes: Vec<IpRoute> = current
            .iter()
            .filter(|route| !route.is_protected())
            .filter(|route| cleanup_interfaces.contains(&route.interface.as_str()))
            .filter(|route| !desired.iter().any(|desired| route.matches(desired)))
            .cloned()
            .collect();

        if new_routes.is_empty() && outdated_routes.is_empty() {
            info!("nothing to sync to router");
            return Ok(());
        }

        info!(
            "syncing routes to router: {} new, {} outdated",
            new_routes.len(),
            outdated_routes.len()
        );

        if !new_routes.is_empty() {
            router.add_ip_routes(&new_routes, cancel).await?;
        }
        if !outdated_routes.is_empty() {
            router.remove_ip_routes(&outdated_routes, cancel).await?;
        }

        Ok(())
    }
}
