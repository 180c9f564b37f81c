// # ASN Address Resolver
//
// This crate resolves an autonomous-system number into the prefixes the AS
// announces, using the RIPE stat `announced-prefixes` endpoint.
//
// ## Behavior
//
// The target must be a non-negative decimal ASN. A non-200 response is
// surfaced with its status code and body; a response that does not decode is
// an unmarshal error; every announced prefix must parse as CIDR or the whole
// resolution aborts. Announcements carry no TTL, so re-resolution runs at
// the engine's default interval.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use keenctl_core::{Addr, AddressResolver, Error, ResolvedAddress, Result};

/// RIPE stat announced-prefixes endpoint
const ANNOUNCED_PREFIXES_URL: &str = "https://stat.ripe.net/data/announced-prefixes/data.json";

/// Request deadline; the endpoint occasionally stalls on large ASNs
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct AnnouncedPrefixesResponse {
    data: AnnouncedPrefixesData,
}

#[derive(Debug, Deserialize)]
struct AnnouncedPrefixesData {
    #[serde(default)]
    prefixes: Vec<AnnouncedPrefix>,
}

#[derive(Debug, Deserialize)]
struct AnnouncedPrefix {
    prefix: String,
}

/// RIPE-stat-backed address resolver
pub struct AsnResolver {
    client: reqwest::Client,
}

impl AsnResolver {
    /// Create a resolver with its own HTTP client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build http client"),
        }
    }

    /// Fetch the list of prefixes announced by the AS
    async fn announced_prefixes(&self, number: i64) -> Result<Vec<String>> {
        debug!("fetching announced prefixes for AS{}", number);
        let url = format!("{ANNOUNCED_PREFIXES_URL}?resource=AS{number}&sourceapp=keenctl");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::resolve(format!("request to RIPE stat failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), body));
        }

        let decoded: AnnouncedPrefixesResponse = response
            .json()
            .await
            .map_err(|e| Error::unmarshal(e.to_string()))?;

        Ok(decoded
            .data
            .prefixes
            .into_iter()
            .map(|announced| announced.prefix)
            .collect())
    }
}

impl Default for AsnResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressResolver for AsnResolver {
    async fn resolve(&self, target: &str) -> Result<Vec<ResolvedAddress>> {
        let number: i64 = target
            .trim()
            .parse()
            .map_err(|_| Error::invalid_address(format!("asn `{target}` must be a number")))?;
        if number < 0 {
            return Err(Error::invalid_address(format!(
                "asn `{target}` must not be negative"
            )));
        }

        let prefixes = self.announced_prefixes(number).await?;

        let mut resolved = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let addr = Addr::parse_cidr(&prefix).map_err(|e| {
                Error::invalid_address(format!("asn {number} prefix `{prefix}`: {e}"))
            })?;
            resolved.push(ResolvedAddress::new(addr));
        }

        Ok(resolved)
    }

    fn name(&self) -> &'static str {
        "asn"
    }
}
