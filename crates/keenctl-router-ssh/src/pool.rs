//! SSH command pool
//!
//! A fixed-size pool of authenticated SSH client connections. All `N`
//! connections are opened in parallel during construction; if any dial or
//! authentication fails the whole pool fails. `exec` borrows one idle
//! connection, runs the command on a fresh session channel and returns the
//! connection on every exit path, so at most `N` commands run concurrently
//! and no two commands share a connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use regex::Regex;
use russh::client;
use russh_keys::key::PublicKey;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use keenctl_core::config::SshConfig;
use keenctl_core::Error;

/// Fallback connect timeout when the configuration leaves it unset
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// ANSI CSI escape sequences the router mixes into command output
const ESCAPE_SEQUENCES: &str = "\x1b\\[[0-9;]*[a-zA-Z]";

/// SSH client handler
///
/// Accepts any server host key: keenctl talks to administrator-controlled
/// LAN devices, and the device regenerates its key on factory reset.
struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One authenticated SSH connection
struct SshConn {
    handle: client::Handle<ClientHandler>,
}

impl SshConn {
    async fn connect(config: &SshConfig) -> Result<Self, Error> {
        let timeout = if config.timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            config.timeout
        };
        let addr = format!("{}:{}", config.host, config.port);

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::connect(format!("dial {addr}: timed out")))?
            .map_err(|e| Error::connect(format!("dial {addr}: {e}")))?;

        let russh_config = Arc::new(client::Config::default());
        let mut handle = client::connect_stream(russh_config, stream, ClientHandler)
            .await
            .map_err(|e| Error::connect(format!("ssh handshake with {addr}: {e}")))?;

        let authenticated = handle
            .authenticate_password(&config.user, &config.password)
            .await
            .map_err(|e| Error::connect(format!("ssh authentication against {addr}: {e}")))?;
        if !authenticated {
            return Err(Error::connect(format!(
                "ssh authentication against {addr} rejected for user {}",
                config.user
            )));
        }

        Ok(Self { handle })
    }

    /// Run one command on a fresh session channel, collecting combined
    /// stdout and stderr
    async fn exec(&mut self, cmd: &str) -> Result<Vec<u8>, russh::Error> {
        let mut channel = self.handle.channel_open_session().await?;
        channel.exec(true, cmd).await?;

        let mut output = Vec::new();
        loop {
            match channel.wait().await {
                Some(russh::ChannelMsg::Data { data }) => output.extend_from_slice(&data),
                Some(russh::ChannelMsg::ExtendedData { data, .. }) => {
                    output.extend_from_slice(&data);
                }
                Some(russh::ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        Ok(output)
    }
}

/// Fixed-size pool of SSH connections
#[derive(Debug)]
pub struct SshPool {
    /// Return path for idle connections
    returns: mpsc::Sender<SshConn>,
    /// Idle connections; the mutex serialises acquisition, FIFO-enough
    idle: Mutex<mpsc::Receiver<SshConn>>,
    /// Strips ANSI CSI sequences from command output
    escape_pattern: Regex,
    /// Pool size, and the bound on concurrent commands
    capacity: usize,
}

impl SshPool {
    /// Open a pool of `max_parallel_commands` connections in parallel
    ///
    /// Any single failure abandons all connections and fails construction.
    pub async fn connect(config: &SshConfig) -> Result<Self, Error> {
        let capacity = config.max_parallel_commands;
        if capacity == 0 {
            return Err(Error::config(
                "max_parallel_commands must be greater than zero",
            ));
        }

        let conns = try_join_all((0..capacity).map(|_| SshConn::connect(config))).await?;

        let (returns, idle) = mpsc::channel(capacity);
        for conn in conns {
            returns
                .try_send(conn)
                .map_err(|_| Error::connect("connection pool channel closed during setup"))?;
        }

        Ok(Self {
            returns,
            idle: Mutex::new(idle),
            escape_pattern: Regex::new(ESCAPE_SEQUENCES)
                .expect("escape sequence pattern is valid"),
            capacity,
        })
    }

    /// Execute a command on an idle connection
    ///
    /// Returns combined stdout and stderr with ANSI escapes removed. The
    /// connection goes back to the pool on success, failure and unwind
    /// alike.
    pub async fn exec(&self, cmd: &str) -> Result<String, Error> {
        let conn = {
            let mut idle = self.idle.lock().await;
            idle.recv()
                .await
                .ok_or_else(|| Error::connect("connection pool is closed"))?
        };
        let mut lease = ConnLease {
            conn: Some(conn),
            returns: self.returns.clone(),
        };

        debug!("execute command: {}", cmd);

        let output = lease
            .conn_mut()
            .exec(cmd)
            .await
            .map_err(|e| Error::command(cmd, e.to_string()))?;

        Ok(self.strip_escapes(&String::from_utf8_lossy(&output)))
    }

    /// The number of pooled connections
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn strip_escapes(&self, output: &str) -> String {
        self.escape_pattern.replace_all(output, "").into_owned()
    }
}

/// Returns the leased connection to the pool when dropped
struct ConnLease {
    conn: Option<SshConn>,
    returns: mpsc::Sender<SshConn>,
}

impl ConnLease {
    fn conn_mut(&mut self) -> &mut SshConn {
        self.conn.as_mut().expect("lease holds a connection")
    }
}

impl Drop for ConnLease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // the channel capacity equals the pool size, so this only fails
            // when the pool itself is gone
            let _ = self.returns.try_send(conn);
        }
    }
}
