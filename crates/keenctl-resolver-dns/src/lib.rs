// # DNS Address Resolver
//
// This crate provides the DNS implementation of the core resolver trait.
//
// ## Behavior
//
// For a host-name target one A and one AAAA query are sent. Each configured
// nameserver is tried at port 53 until one answers with a success rcode for
// that query type; when no nameservers are configured the system resolver
// configuration (`/etc/resolv.conf`) is used instead. CNAME records in
// answers are skipped, any other record type aborts the resolution. Answer
// TTLs are carried through so the engine can schedule re-resolution.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

use keenctl_core::config::DnsConfig;
use keenctl_core::{Addr, AddressResolver, Error, ResolvedAddress, Result};

/// Nameserver port
const DNS_PORT: u16 = 53;

/// Per-server query timeout
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// System resolver configuration, consulted when no nameservers are set
const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Receive buffer size; large enough for EDNS0 responses
const MAX_UDP_MESSAGE_SIZE: usize = 4096;

/// DNS-based address resolver
pub struct DnsResolver {
    nameservers: Vec<String>,
}

impl DnsResolver {
    /// Create a resolver querying the configured nameservers
    pub fn new(config: &DnsConfig) -> Self {
        Self {
            nameservers: config.nameservers.clone(),
        }
    }

    async fn nameserver_addrs(&self) -> Result<Vec<SocketAddr>> {
        let hosts = if self.nameservers.is_empty() {
            read_resolv_conf(RESOLV_CONF).await?
        } else {
            self.nameservers.clone()
        };

        hosts
            .iter()
            .map(|host| {
                IpAddr::from_str(host)
                    .map(|ip| SocketAddr::new(ip, DNS_PORT))
                    .map_err(|e| Error::resolve(format!("nameserver {host}: {e}")))
            })
            .collect()
    }

    /// Send one question to the configured nameservers
    ///
    /// The first response with a success rcode wins; otherwise the last
    /// failure is returned.
    async fn send_question(&self, host: &str, record_type: RecordType) -> Result<Vec<Record>> {
        let servers = self.nameserver_addrs().await?;

        let name = Name::from_str(&fqdn(host))
            .map_err(|e| Error::resolve(format!("invalid host name {host}: {e}")))?;
        let mut message = Message::new();
        message
            .set_id(query_id())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(name, record_type));

        let query_bytes = message
            .to_vec()
            .map_err(|e| Error::resolve(format!("failed to serialize dns query: {e}")))?;

        let mut last_error = Error::resolve(format!("no nameservers to query for {host}"));
        for server in servers {
            match exchange(&query_bytes, message.id(), server).await {
                Ok(response) if response.response_code() == ResponseCode::NoError => {
                    return Ok(response.answers().to_vec());
                }
                Ok(response) => {
                    last_error = Error::resolve(format!(
                        "{server}: resolution failed: {}",
                        response.response_code()
                    ));
                }
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl AddressResolver for DnsResolver {
    async fn resolve(&self, target: &str) -> Result<Vec<ResolvedAddress>> {
        debug!("querying A and AAAA records for {}", target);
        let answers_a = self.send_question(target, RecordType::A).await?;
        let answers_aaaa = self.send_question(target, RecordType::AAAA).await?;

        let mut resolved = Vec::with_capacity(answers_a.len() + answers_aaaa.len());
        for record in answers_a.iter().chain(answers_aaaa.iter()) {
            if let Some(address) = record_to_address(record)? {
                resolved.push(address);
            }
        }

        Ok(resolved)
    }

    fn name(&self) -> &'static str {
        "dns"
    }
}

/// Convert one answer record into a resolved address
///
/// CNAME records yield `None`; record types other than A/AAAA/CNAME are an
/// error. A zero TTL means no TTL is known.
fn record_to_address(record: &Record) -> Result<Option<ResolvedAddress>> {
    let ttl = (record.ttl() > 0).then(|| Duration::from_secs(u64::from(record.ttl())));

    let addr = match record.data() {
        Some(RData::A(a)) => Addr::from_ip(IpAddr::V4(a.0)),
        Some(RData::AAAA(aaaa)) => Addr::from_ip(IpAddr::V6(aaaa.0)),
        Some(RData::CNAME(_)) => return Ok(None),
        other => {
            return Err(Error::resolve(format!(
                "unexpected answer type: {other:?}"
            )));
        }
    };

    Ok(Some(ResolvedAddress { addr, ttl }))
}

/// One UDP exchange against a single server
async fn exchange(query: &[u8], id: u16, server: SocketAddr) -> Result<Message> {
    let bind_addr = if server.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.send_to(query, server).await?;

    let mut buf = vec![0u8; MAX_UDP_MESSAGE_SIZE];
    let (len, src) = timeout(QUERY_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .map_err(|_| Error::resolve(format!("dns query to {server} timed out")))??;

    if src != server {
        return Err(Error::resolve(format!(
            "response from unexpected source {src} (expected {server})"
        )));
    }

    let response = Message::from_vec(&buf[..len])
        .map_err(|e| Error::resolve(format!("failed to parse dns response: {e}")))?;
    if response.id() != id {
        return Err(Error::resolve(format!(
            "{server}: response id mismatch"
        )));
    }

    Ok(response)
}

/// Append the root label when absent
fn fqdn(host: &str) -> String {
    if host.ends_with('.') {
        host.to_string()
    } else {
        format!("{host}.")
    }
}

/// A query id from the clock; uniqueness per in-flight query is all that is
/// required, and each query uses its own socket
fn query_id() -> u16 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % u32::from(u16::MAX)) as u16
}

async fn read_resolv_conf(path: &str) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::resolve(format!("unable to read {path}: {e}")))?;

    let servers = parse_resolv_conf(&contents);
    if servers.is_empty() {
        return Err(Error::resolve(format!("no nameservers found in {path}")));
    }
    Ok(servers)
}

fn parse_resolv_conf(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| line.strip_prefix("nameserver"))
        .filter(|rest| rest.starts_with([' ', '\t']))
        .map(|rest| rest.trim().to_string())
        .filter(|server| !server.is_empty())
        .collect()
}
