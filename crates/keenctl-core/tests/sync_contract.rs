//! Contract tests for the diff-and-apply half of the engine
//!
//! Each test runs the engine against a mock router for one reconciliation
//! pass and asserts on the operations it issued:
//! - desired routes missing from the table are added
//! - stale routes are removed only from cleanup interfaces
//! - protected routes are never removed
//! - additions precede deletions
//! - per-entry resolution failures never kill the session

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::*;
use keenctl_core::{Addr, Engine, ResolvedAddress, Resolver};

/// Spawn the engine, let one reconciliation pass happen, shut down cleanly
async fn run_one_pass(engine: Engine) {
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { engine.run(shutdown).await }
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    handle
        .await
        .expect("engine task panicked")
        .expect("engine reported an error on clean shutdown");
}

#[tokio::test(start_paused = true)]
async fn literal_address_is_installed() {
    let state = RouterState::with_current(Vec::new());
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config(
        "wg0",
        false,
        vec![route_config("10.0.0.1", "", None)],
    )]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    let ops = state.ops();
    assert_eq!(ops.len(), 1, "expected exactly one operation: {ops:?}");
    match &ops[0] {
        RecordedOp::Add(added) => {
            assert_eq!(added.destination.to_string(), "10.0.0.1/32");
            assert_eq!(added.interface, "wg0");
            assert_eq!(added.description, "addr(10.0.0.1)");
            assert!(!added.auto);
        }
        other => panic!("expected an add, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn stale_route_on_cleanup_interface_is_removed() {
    let state = RouterState::with_current(vec![route("198.51.100.0/24", "wg0")]);
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config("wg0", true, Vec::new())]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    let ops = state.ops();
    assert_eq!(ops.len(), 1, "expected exactly one operation: {ops:?}");
    match &ops[0] {
        RecordedOp::Remove(removed) => {
            assert_eq!(removed.destination.to_string(), "198.51.100.0/24");
            assert_eq!(removed.interface, "wg0");
        }
        other => panic!("expected a remove, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn protected_route_is_never_removed() {
    let state = RouterState::with_current(vec![
        route("192.168.1.0/24", "wg0"),
        route("127.0.0.0/8", "wg0"),
        route("0.0.0.0/0", "wg0"),
    ]);
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config("wg0", true, Vec::new())]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    assert!(state.ops().is_empty(), "protected routes were touched");
}

#[tokio::test(start_paused = true)]
async fn stale_route_outside_cleanup_interfaces_is_kept() {
    let state = RouterState::with_current(vec![route("1.2.3.0/24", "wg0")]);
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config("wg0", false, Vec::new())]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    assert!(state.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn asn_expansion_honours_filters() {
    let state = RouterState::with_current(Vec::new());
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let mut resolver = Resolver::new();
    resolver.register(
        "asn",
        Box::new(StaticAddresses {
            addresses: vec![
                ResolvedAddress::new(Addr::parse("1.1.1.0/24").unwrap()),
                ResolvedAddress::new(Addr::parse("2606:4700::/32").unwrap()),
            ],
        }),
    );

    let config = minimal_config(vec![interface_config(
        "wg0",
        false,
        vec![route_config("13335", "asn", Some(vec!["ipv6"]))],
    )]);

    run_one_pass(Engine::new(config, resolver, Box::new(connector))).await;

    let ops = state.ops();
    assert_eq!(ops.len(), 1, "ipv6 prefix should have been filtered: {ops:?}");
    match &ops[0] {
        RecordedOp::Add(added) => {
            assert_eq!(added.destination.to_string(), "1.1.1.0/24");
            assert_eq!(added.description, "asn(13335)");
        }
        other => panic!("expected an add, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn additions_precede_deletions() {
    let state = RouterState::with_current(vec![route("1.2.3.0/24", "wg0")]);
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config(
        "wg0",
        true,
        vec![route_config("9.9.9.9", "addr", None)],
    )]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    let ops = state.ops();
    assert_eq!(ops.len(), 2);
    assert!(
        matches!(&ops[0], RecordedOp::Add(_)),
        "adds must come first: {ops:?}"
    );
    assert!(matches!(&ops[1], RecordedOp::Remove(_)));
}

#[tokio::test(start_paused = true)]
async fn desired_route_already_covered_is_not_added() {
    // a broader desired prefix satisfies a narrower installed one
    let state = RouterState::with_current(vec![route("1.1.1.5/32", "wg0")]);
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config(
        "wg0",
        false,
        vec![route_config("1.1.1.0/24", "addr", None)],
    )]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    assert!(state.ops().is_empty(), "covered route was re-added");
}

#[tokio::test(start_paused = true)]
async fn identical_state_syncs_nothing() {
    let mut installed = route("9.9.9.9/32", "wg0");
    installed.description = "addr(9.9.9.9)".to_string();
    let state = RouterState::with_current(vec![installed]);
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config(
        "wg0",
        true,
        vec![route_config("9.9.9.9", "addr", None)],
    )]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    assert!(state.ops().is_empty());
    assert!(state.load_calls.load(std::sync::atomic::Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_entry_does_not_kill_the_session() {
    let state = RouterState::with_current(Vec::new());
    let (connector, connector_state) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config(
        "wg0",
        false,
        vec![
            route_config("not-an-address", "addr", None),
            route_config("10.0.0.1", "addr", None),
        ],
    )]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    // the healthy entry still syncs, and no reconnect happened
    let ops = state.ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], RecordedOp::Add(added) if added.interface == "wg0"));
    assert_eq!(
        connector_state
            .connects
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_resolver_fails_only_that_entry() {
    let state = RouterState::with_current(Vec::new());
    let (connector, _) = MockConnector::new(Arc::clone(&state));

    let config = minimal_config(vec![interface_config(
        "wg0",
        false,
        vec![
            route_config("example.com", "bogus", None),
            route_config("10.0.0.2", "", None),
        ],
    )]);

    run_one_pass(Engine::new(config, Resolver::new(), Box::new(connector))).await;

    let ops = state.ops();
    assert_eq!(ops.len(), 1);
    assert!(
        matches!(&ops[0], RecordedOp::Add(added) if added.destination.to_string() == "10.0.0.2/32")
    );
}
