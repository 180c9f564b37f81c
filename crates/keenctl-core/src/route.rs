//! Route value type and `show ip route` parser
//!
//! An [`IpRoute`] carries everything needed to install or remove one static
//! route. Route identity uses containment, not destination equality: a route
//! to `10.0.0.0/24` subsumes `10.0.0.5/32` on the same interface, which is
//! the only identity the router itself honours.

use crate::error::{Error, Result};
use crate::net::Addr;

/// Number of header lines preceding the route rows in `show ip route` output
const ROUTE_TABLE_HEADER_LINES: usize = 3;

/// A static route in the router's routing table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRoute {
    /// Destination prefix
    pub destination: Addr,
    /// Name of the interface the route is installed on
    pub interface: String,
    /// Gateway address, empty when routing via the interface alone
    pub gateway: String,
    /// Flag column as reported by the router
    pub flags: String,
    /// Free-form description attached when the route is installed
    pub description: String,
    /// Route metric
    pub metric: u32,
    /// Whether the route is installed with the `auto` keyword
    pub auto: bool,
}

impl IpRoute {
    /// Reports whether `other` denotes the same installed route
    ///
    /// True iff both routes share an interface and this route's destination
    /// contains the other's destination address.
    #[must_use]
    pub fn matches(&self, other: &IpRoute) -> bool {
        self.interface == other.interface && self.destination.contains(&other.destination)
    }

    /// Reports whether the destination is protected from modification
    ///
    /// Private, loopback and unspecified destinations are never touched.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.destination.is_private()
            || self.destination.is_loopback()
            || self.destination.is_unspecified()
    }
}

/// Parse the output of `show ip route`
///
/// The first three lines are header and are skipped. Remaining lines are
/// whitespace-delimited rows of `destination gateway interface flags metric`;
/// rows whose destination is not valid CIDR are dropped (the router emits
/// auxiliary rows). Empty output yields an empty table; non-empty output
/// shorter than a header plus one row is an [`Error::ParseRoutes`].
pub fn parse_ip_routes(output: &str) -> Result<Vec<IpRoute>> {
    if output.is_empty() {
        return Ok(Vec::new());
    }

    let lines: Vec<&str> = output.trim_matches('\n').split('\n').collect();
    if lines.len() <= ROUTE_TABLE_HEADER_LINES {
        return Err(Error::parse_routes(output));
    }

    let mut routes = Vec::with_capacity(lines.len() - ROUTE_TABLE_HEADER_LINES);
    for line in &lines[ROUTE_TABLE_HEADER_LINES..] {
        if let Some(route) = parse_route_line(line) {
            routes.push(route);
        }
    }

    Ok(routes)
}

fn parse_route_line(line: &str) -> Option<IpRoute> {
    let mut columns = line.split_whitespace();

    let destination = Addr::parse_cidr(columns.next().unwrap_or_default()).ok()?;
    let gateway = columns.next().unwrap_or_default().to_string();
    let interface = columns.next().unwrap_or_default().to_string();
    let flags = columns.next().unwrap_or_default().to_string();
    let metric = columns
        .next()
        .and_then(|column| column.parse().ok())
        .unwrap_or(0);

    Some(IpRoute {
        destination,
        interface,
        gateway,
        flags,
        description: String::new(),
        metric,
        auto: false,
    })
}
