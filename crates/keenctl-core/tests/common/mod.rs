//! Test doubles and common utilities for engine contract tests
//!
//! This module provides minimal doubles for the router transport and the
//! address resolvers, recording every operation the engine performs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use keenctl_core::config::{
    Config, InterfaceConfig, ResolverConfig, RouteConfig, RouteOptions, SshConfig,
};
use keenctl_core::{
    AddressResolver, Error, IpRoute, ResolvedAddress, Result, RouterClient, RouterConnector,
};

/// One operation the engine performed against the router
#[derive(Debug, Clone)]
pub enum RecordedOp {
    Add(IpRoute),
    Remove(IpRoute),
}

/// Shared state behind every mock router a connector hands out
#[derive(Default)]
pub struct RouterState {
    /// The routing table reported by `load_ip_routes`
    pub current: Mutex<Vec<IpRoute>>,
    /// Every add/remove in the order the engine issued it
    pub ops: Mutex<Vec<RecordedOp>>,
    /// Call counter for `load_ip_routes`
    pub load_calls: AtomicUsize,
    /// When set, the next bulk add fails once
    pub fail_next_add: AtomicBool,
}

impl RouterState {
    pub fn with_current(routes: Vec<IpRoute>) -> Arc<Self> {
        let state = Self::default();
        *state.current.lock().unwrap() = routes;
        Arc::new(state)
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.ops.lock().unwrap().clone()
    }
}

/// A router client recording operations into shared state
pub struct MockRouter {
    state: Arc<RouterState>,
}

#[async_trait]
impl RouterClient for MockRouter {
    async fn load_ip_routes(&self) -> Result<Vec<IpRoute>> {
        self.state.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.current.lock().unwrap().clone())
    }

    async fn add_ip_routes(&self, routes: &[IpRoute], _cancel: &CancellationToken) -> Result<()> {
        if self.state.fail_next_add.swap(false, Ordering::SeqCst) {
            return Err(Error::command("ip route", "session torn down"));
        }
        let mut ops = self.state.ops.lock().unwrap();
        for route in routes {
            ops.push(RecordedOp::Add(route.clone()));
        }
        Ok(())
    }

    async fn remove_ip_routes(
        &self,
        routes: &[IpRoute],
        _cancel: &CancellationToken,
    ) -> Result<()> {
        let mut ops = self.state.ops.lock().unwrap();
        for route in routes {
            ops.push(RecordedOp::Remove(route.clone()));
        }
        Ok(())
    }
}

/// Observable connector state, shared with the test
#[derive(Default)]
pub struct ConnectorState {
    /// Dial failures still to serve before connects succeed
    pub failures_remaining: AtomicUsize,
    /// Total connect attempts
    pub connects: AtomicUsize,
    /// Instant of every connect attempt (virtual time under a paused runtime)
    pub connect_times: Mutex<Vec<tokio::time::Instant>>,
}

/// A connector that fails a scripted number of times, then hands out mock
/// routers over shared state
pub struct MockConnector {
    router_state: Arc<RouterState>,
    state: Arc<ConnectorState>,
}

impl MockConnector {
    pub fn new(router_state: Arc<RouterState>) -> (Self, Arc<ConnectorState>) {
        Self::failing(router_state, 0)
    }

    pub fn failing(
        router_state: Arc<RouterState>,
        failures: usize,
    ) -> (Self, Arc<ConnectorState>) {
        let state = Arc::new(ConnectorState::default());
        state.failures_remaining.store(failures, Ordering::SeqCst);
        (
            Self {
                router_state,
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

#[async_trait]
impl RouterConnector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn RouterClient>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state
            .connect_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        let failures = &self.state.failures_remaining;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Err(Error::connect("dial tcp: connection refused"));
        }

        Ok(Box::new(MockRouter {
            state: Arc::clone(&self.router_state),
        }))
    }
}

/// A resolver returning a fixed address list for every target
pub struct StaticAddresses {
    pub addresses: Vec<ResolvedAddress>,
}

#[async_trait]
impl AddressResolver for StaticAddresses {
    async fn resolve(&self, _target: &str) -> Result<Vec<ResolvedAddress>> {
        Ok(self.addresses.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Helper to build a route for mock routing tables and expectations
pub fn route(destination: &str, interface: &str) -> IpRoute {
    IpRoute {
        destination: destination.parse().unwrap(),
        interface: interface.to_string(),
        gateway: "0.0.0.0".to_string(),
        flags: "S".to_string(),
        description: String::new(),
        metric: 0,
        auto: false,
    }
}

/// Helper to build a route configuration
pub fn route_config(target: &str, resolver: &str, filters: Option<Vec<&str>>) -> RouteConfig {
    RouteConfig {
        target: target.to_string(),
        resolver: resolver.to_string(),
        options: RouteOptions {
            auto: None,
            gateway: None,
            filters: filters.map(|names| names.iter().map(|s| s.to_string()).collect()),
        },
    }
}

/// Helper to build an interface configuration
pub fn interface_config(name: &str, cleanup: bool, routes: Vec<RouteConfig>) -> InterfaceConfig {
    InterfaceConfig {
        name: name.to_string(),
        cleanup,
        defaults: RouteOptions::default(),
        routes,
    }
}

/// Helper to create a minimal engine configuration
pub fn minimal_config(interfaces: Vec<InterfaceConfig>) -> Config {
    Config {
        ssh: SshConfig {
            host: "192.168.1.1".to_string(),
            port: 22,
            user: "admin".to_string(),
            password: "secret".to_string(),
            max_parallel_commands: 4,
            timeout: std::time::Duration::from_secs(1),
            dry_run: false,
        },
        resolver: ResolverConfig::default(),
        interfaces,
    }
}
