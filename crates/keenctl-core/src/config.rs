//! Configuration types for the keenctl system
//!
//! This module defines all configuration structures used throughout the
//! workspace. Configuration is loaded from a TOML file; durations use
//! humantime notation (`"30s"`).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main keenctl configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SSH connection settings
    pub ssh: SshConfig,

    /// Resolver settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Interfaces whose routes are managed
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::config(format!("parsing {}: {e}", path.display())))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ssh.host.is_empty() {
            return Err(Error::config("ssh.host must be set"));
        }
        if self.ssh.max_parallel_commands == 0 {
            return Err(Error::config(
                "ssh.max_parallel_commands must be greater than zero",
            ));
        }

        for interface in &self.interfaces {
            if interface.name.is_empty() {
                return Err(Error::config("interface name must be set"));
            }
            for route in &interface.routes {
                if route.target.is_empty() {
                    return Err(Error::config(format!(
                        "route on interface {} has no target",
                        interface.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// SSH connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Router host name or address
    pub host: String,

    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,

    /// User name
    #[serde(default)]
    pub user: String,

    /// Password
    #[serde(default)]
    pub password: String,

    /// Size of the connection pool, and the bound on concurrent commands
    #[serde(default = "default_max_parallel_commands")]
    pub max_parallel_commands: usize,

    /// Connection timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// When set, commands that would change routes are not issued
    #[serde(default)]
    pub dry_run: bool,
}

/// Resolver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// DNS resolver settings
    #[serde(default)]
    pub dns: DnsConfig,
}

/// DNS resolver settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Nameservers to query; system resolver configuration applies when empty
    #[serde(default)]
    pub nameservers: Vec<String>,
}

/// One managed interface and its configured routes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface name as known to the router
    pub name: String,

    /// Whether unmanaged routes on this interface are removed
    #[serde(default)]
    pub cleanup: bool,

    /// Default route options, overridable per route
    #[serde(default)]
    pub defaults: RouteOptions,

    /// Routes desired on this interface
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Route options, present on interface defaults and as per-route overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteOptions {
    /// Install the route with the `auto` keyword
    pub auto: Option<bool>,

    /// Gateway address
    pub gateway: Option<String>,

    /// Filter names applied to resolved addresses
    pub filters: Option<Vec<String>>,
}

/// One configured route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// The logical target: literal address, host name or ASN
    pub target: String,

    /// Resolver name; empty means the literal `addr` resolver
    #[serde(default)]
    pub resolver: String,

    /// Per-route option overrides
    #[serde(flatten)]
    pub options: RouteOptions,
}

impl RouteConfig {
    /// The effective `auto` flag, falling back to the interface defaults
    #[must_use]
    pub fn auto(&self, defaults: &RouteOptions) -> bool {
        self.options.auto.or(defaults.auto).unwrap_or(false)
    }

    /// The effective gateway, falling back to the interface defaults
    #[must_use]
    pub fn gateway(&self, defaults: &RouteOptions) -> String {
        self.options
            .gateway
            .clone()
            .or_else(|| defaults.gateway.clone())
            .unwrap_or_default()
    }

    /// The effective filter list, falling back to the interface defaults
    #[must_use]
    pub fn filters(&self, defaults: &RouteOptions) -> Vec<String> {
        self.options
            .filters
            .clone()
            .or_else(|| defaults.filters.clone())
            .unwrap_or_default()
    }
}

fn default_port() -> u16 {
    22
}

fn default_max_parallel_commands() -> usize {
    4
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [ssh]
        host = "192.168.1.1"
        user = "admin"
        password = "secret"
        max_parallel_commands = 4
        timeout = "30s"

        [resolver.dns]
        nameservers = ["1.1.1.1", "8.8.8.8"]

        [[interfaces]]
        name = "Wireguard0"
        cleanup = true

        [interfaces.defaults]
        auto = true
        gateway = ""
        filters = ["ipv6", "private"]

        [[interfaces.routes]]
        target = "example.com"
        resolver = "dns"

        [[interfaces.routes]]
        target = "13335"
        resolver = "asn"
        filters = ["ipv6", "private", "loopback", "unspecified"]

        [[interfaces.routes]]
        target = "10.9.0.0/24"
        resolver = "addr"
    "#;

    #[test]
    fn parses_example_config() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.ssh.host, "192.168.1.1");
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.ssh.timeout, Duration::from_secs(30));
        assert!(!config.ssh.dry_run);
        assert_eq!(config.resolver.dns.nameservers.len(), 2);

        let interface = &config.interfaces[0];
        assert_eq!(interface.name, "Wireguard0");
        assert!(interface.cleanup);
        assert_eq!(interface.routes.len(), 3);
    }

    #[test]
    fn route_options_fall_back_to_interface_defaults() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        let interface = &config.interfaces[0];
        let defaults = &interface.defaults;

        let dns_route = &interface.routes[0];
        assert!(dns_route.auto(defaults));
        assert_eq!(dns_route.gateway(defaults), "");
        assert_eq!(dns_route.filters(defaults), vec!["ipv6", "private"]);

        let asn_route = &interface.routes[1];
        assert_eq!(
            asn_route.filters(defaults),
            vec!["ipv6", "private", "loopback", "unspecified"]
        );
    }

    #[test]
    fn missing_optionals_default() {
        let config: Config = toml::from_str("[ssh]\nhost = \"router\"\n").unwrap();
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.ssh.max_parallel_commands, 4);
        assert_eq!(config.ssh.timeout, Duration::from_secs(30));
        assert!(config.interfaces.is_empty());
        assert!(config.resolver.dns.nameservers.is_empty());
    }

    #[test]
    fn zero_parallel_commands_is_rejected() {
        let config: Config =
            toml::from_str("[ssh]\nhost = \"router\"\nmax_parallel_commands = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn empty_host_is_rejected() {
        let config: Config = toml::from_str("[ssh]\nhost = \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn route_without_target_is_rejected() {
        let raw = r#"
            [ssh]
            host = "router"

            [[interfaces]]
            name = "wg0"

            [[interfaces.routes]]
            target = ""
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_err());
    }
}
