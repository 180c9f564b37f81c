// # keenctl - Route Reconciliation Daemon
//
// The keenctl binary is a thin integration layer only. It is responsible
// for:
//
// 1. Parsing the command line
// 2. Loading and validating the TOML configuration
// 3. Initializing tracing
// 4. Registering resolvers and the SSH router connector
// 5. Starting the reconciliation engine and handling signals
//
// All reconciliation logic lives in keenctl-core.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use keenctl_core::{Config, Engine, Resolver};
use keenctl_resolver_asn::AsnResolver;
use keenctl_resolver_dns::DnsResolver;
use keenctl_router_ssh::SshConnector;

/// keenctl is a utility for managing static routes on Keenetic routers
///
/// It provides SSH remote access, DNS and ASN address resolution, and
/// filtering of private or unspecified addresses.
#[derive(Parser)]
#[command(name = "keenctl")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs in serve mode
    Serve {
        /// Path to the configuration file
        #[arg(long, default_value = "./keenctl.toml")]
        config: PathBuf,

        /// Executes a dry run without changing routes
        #[arg(long = "dryRun")]
        dry_run: bool,

        /// Print debug information on stderr
        #[arg(long)]
        verbose: bool,

        /// Silent mode
        #[arg(long)]
        quiet: bool,
    },

    /// Displays the current version of keenctl
    Version,
}

fn main() -> ExitCode {
    match Cli::parse().command {
        Commands::Version => {
            println!("keenctl version v{}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Commands::Serve {
            config,
            dry_run,
            verbose,
            quiet,
        } => serve(&config, dry_run, verbose, quiet),
    }
}

fn serve(config_path: &PathBuf, dry_run: bool, verbose: bool, quiet: bool) -> ExitCode {
    if let Err(e) = init_logging(verbose, quiet) {
        eprintln!("failed to set tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    info!("parsing configuration");
    let mut config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if dry_run {
        config.ssh.dry_run = true;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_daemon(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("application error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let mut resolver = Resolver::new();
    resolver.register("dns", Box::new(DnsResolver::new(&config.resolver.dns)));
    resolver.register("asn", Box::new(AsnResolver::new()));

    let connector = Box::new(SshConnector::new(config.ssh.clone()));
    let engine = Engine::new(config, resolver, connector);

    engine
        .run(shutdown)
        .await
        .context("reconciliation engine failed")
}

fn init_logging(verbose: bool, quiet: bool) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

/// Cancel the shutdown token on SIGHUP, SIGINT or SIGTERM
#[cfg(unix)]
fn spawn_signal_handler(shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                error!("failed to set up SIGHUP handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(sigint) => sigint,
            Err(e) => {
                error!("failed to set up SIGINT handler: {}", e);
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("failed to set up SIGTERM handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sighup.recv() => {}
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }

        info!("shutting down");
        shutdown.cancel();
    });
}

#[cfg(not(unix))]
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shutdown.cancel();
        }
    });
}
