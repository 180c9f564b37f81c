//! Address resolution dispatch
//!
//! Resolvers turn a configured target string into zero or more network
//! prefixes. They are registered by name, avoiding hardcoded if-else chains:
//! the literal `addr` resolver is built in, `dns` and `asn` register
//! themselves from their own crates.
//!
//! Filters are predicates that *reject* an address when they match; a filter
//! list rejects an address iff any listed filter matches.

mod addr;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

pub use addr::AddrResolver;

use crate::error::{Error, Result};
use crate::net::Addr;

/// A prefix produced by a resolver, with the answer's TTL when one is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// The resolved prefix
    pub addr: Addr,
    /// Time-to-live of the answer; `None` when the source has no TTL
    pub ttl: Option<Duration>,
}

impl ResolvedAddress {
    /// A resolved prefix without TTL information
    pub fn new(addr: Addr) -> Self {
        Self { addr, ttl: None }
    }

    /// A resolved prefix carrying the answer's TTL
    pub fn with_ttl(addr: Addr, ttl: Duration) -> Self {
        Self {
            addr,
            ttl: Some(ttl),
        }
    }
}

/// A resolved prefix annotated for installation on the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// The resolved prefix
    pub addr: Addr,
    /// Description recorded on the route: `<resolver>(<target>)`
    pub description: String,
    /// Time-to-live of the answer; `None` when the source has no TTL
    pub ttl: Option<Duration>,
}

/// Trait for address resolver implementations
///
/// A resolver maps one target string to concrete prefixes. Implementations
/// must be stateless per call and must not retry or schedule; retry policy is
/// owned by the engine.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve `target` into prefixes
    async fn resolve(&self, target: &str) -> Result<Vec<ResolvedAddress>>;

    /// The resolver name used in registration and route descriptions
    fn name(&self) -> &'static str;
}

type AddressFilter = fn(&Addr) -> bool;

/// Name-keyed resolver and filter registry with dispatch
///
/// An empty resolver name is normalised to `addr`. Unknown names produce
/// [`Error::ResolverNotFound`] / [`Error::FilterNotFound`].
pub struct Resolver {
    resolvers: HashMap<String, Box<dyn AddressResolver>>,
    filters: HashMap<&'static str, AddressFilter>,
}

impl Resolver {
    /// Create a registry with the builtin `addr` resolver and filter set
    pub fn new() -> Self {
        let mut resolvers: HashMap<String, Box<dyn AddressResolver>> = HashMap::new();
        resolvers.insert("addr".to_string(), Box::new(AddrResolver));

        let mut filters: HashMap<&'static str, AddressFilter> = HashMap::new();
        filters.insert("ipv4", |addr| addr.is_ipv4());
        filters.insert("ipv6", |addr| addr.is_ipv6());
        filters.insert("private", |addr| addr.is_private());
        filters.insert("loopback", |addr| addr.is_loopback());
        filters.insert("unspecified", |addr| addr.is_unspecified());

        Self { resolvers, filters }
    }

    /// Register a resolver under a name, replacing any previous registration
    pub fn register(&mut self, name: impl Into<String>, resolver: Box<dyn AddressResolver>) {
        self.resolvers.insert(name.into(), resolver);
    }

    /// Check if a resolver name is registered
    #[must_use]
    pub fn has_resolver(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Resolve a target through the named resolver and filter the results
    pub async fn resolve(
        &self,
        target: &str,
        resolver_name: &str,
        filter_names: &[String],
    ) -> Result<Vec<Address>> {
        let name = if resolver_name.is_empty() {
            "addr"
        } else {
            resolver_name
        };

        let resolver = self
            .resolvers
            .get(name)
            .ok_or_else(|| Error::resolver_not_found(name))?;

        let filters = self.lookup_filters(filter_names)?;

        let resolved = resolver.resolve(target).await?;
        let resolved_count = resolved.len();

        let filtered: Vec<ResolvedAddress> = resolved
            .into_iter()
            .filter(|address| !filters.iter().any(|reject| reject(&address.addr)))
            .collect();

        debug!(
            "resolved addresses for {} via {}: {} resolved, {} after filters",
            target,
            name,
            resolved_count,
            filtered.len()
        );

        let description = format!("{name}({target})");
        Ok(filtered
            .into_iter()
            .map(|address| Address {
                addr: address.addr,
                description: description.clone(),
                ttl: address.ttl,
            })
            .collect())
    }

    fn lookup_filters(&self, filter_names: &[String]) -> Result<Vec<AddressFilter>> {
        filter_names
            .iter()
            .map(|name| {
                self.filters
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| Error::filter_not_found(name))
            })
            .collect()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
