//! Literal address resolver

use async_trait::async_trait;

use super::{AddressResolver, ResolvedAddress};
use crate::error::Result;
use crate::net::Addr;

/// Resolves a target that is already a CIDR prefix or a bare IP address
///
/// Bare addresses become host prefixes. Anything else is an
/// [`crate::Error::InvalidAddress`]. Literal addresses never expire, so no
/// TTL is reported.
pub struct AddrResolver;

#[async_trait]
impl AddressResolver for AddrResolver {
    async fn resolve(&self, target: &str) -> Result<Vec<ResolvedAddress>> {
        let addr = Addr::parse(target)?;
        Ok(vec![ResolvedAddress::new(addr)])
    }

    fn name(&self) -> &'static str {
        "addr"
    }
}
