//! End-to-end identity lifecycle against the in-process operator
//!
//! Generates an identity through the real envelope crypto, lets it refresh
//! and expire on tokio's paused clock, and restarts the manager over the
//! same JSON file to check what survives.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use uid2::client::simulated::Lifetimes;
use uid2::client::{OperatorReply, SimulatedOperator, CLIENT_GENERATE_PATH, REFRESH_PATH};
use uid2::clock::TokioClock;
use uid2::config::Settings;
use uid2::identity::{IdentityInput, IdentityStatus, NormalizedEmail, NormalizedPhone};
use uid2::manager::IdentityManager;
use uid2::store::FileStore;
use uid2::State;

const MINUTE: u64 = 60 * 1000;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn settings() -> Settings {
    Settings::default().with_logging(true)
}

async fn start(
    operator: &Arc<SimulatedOperator>,
    clock: &Arc<TokioClock>,
    store: &FileStore,
) -> Arc<IdentityManager> {
    let manager = IdentityManager::new(
        settings(),
        operator.clone(),
        Arc::new(store.clone()),
        clock.clone(),
    );
    manager.initialized().await;
    manager
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

fn email() -> IdentityInput {
    IdentityInput::Email(NormalizedEmail::new(" Jane.Doe+news@GMail.com ").unwrap())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_generate_refresh_and_restart() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::in_dir(dir.path());
    let clock = Arc::new(TokioClock::fixed());
    let operator = SimulatedOperator::new(clock.clone());
    operator.set_lifetimes(Lifetimes {
        refresh_from: 5 * MINUTE as i64,
        identity_expires: 15 * MINUTE as i64,
        refresh_expires: 60 * MINUTE as i64,
    });

    let manager = start(&operator, &clock, &store).await;
    assert_eq!(manager.current_state().await, State::NoIdentity);
    let mut changes = manager.subscribe();

    manager
        .generate_identity(email(), "subscription", &operator.server_public_key(), "com.example")
        .await
        .unwrap();
    let generated = manager.current_identity().await.unwrap();
    assert_eq!(manager.current_status().await, IdentityStatus::Established);

    // Two scheduled refreshes, five minutes apart.
    advance(10 * MINUTE + 10).await;
    assert_eq!(operator.request_count(REFRESH_PATH), 2);
    let refreshed = manager.current_identity().await.unwrap();
    assert_ne!(refreshed, generated);
    assert_eq!(manager.current_status().await, IdentityStatus::Refreshed);

    let statuses: Vec<IdentityStatus> = [
        changes.next().await,
        changes.next().await,
        changes.next().await,
    ]
    .into_iter()
    .map(|s| s.unwrap().status())
    .collect();
    assert_eq!(
        statuses,
        vec![
            IdentityStatus::Established,
            IdentityStatus::Refreshed,
            IdentityStatus::Refreshed,
        ]
    );

    // Restart over the same file: the identity comes back and keeps refreshing.
    manager.flush_storage().await;
    manager.shutdown().await;
    drop(manager);

    let restarted = start(&operator, &clock, &store).await;
    assert_eq!(restarted.current_identity().await, Some(refreshed));
    advance(5 * MINUTE + 10).await;
    assert_eq!(operator.request_count(REFRESH_PATH), 3);
    assert_eq!(operator.request_count(CLIENT_GENERATE_PATH), 1);
}

#[tokio::test(start_paused = true)]
async fn test_optout_survives_restart_until_reset() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::in_dir(dir.path());
    let clock = Arc::new(TokioClock::fixed());
    let operator = SimulatedOperator::new(clock.clone());

    let manager = start(&operator, &clock, &store).await;
    let phone = IdentityInput::Phone(NormalizedPhone::new("+12345678901").unwrap());
    manager
        .generate_identity(phone, "subscription", &operator.server_public_key(), "com.example")
        .await
        .unwrap();
    operator.push_refresh_reply(OperatorReply::OptOut);
    manager.refresh_identity().await.unwrap();
    assert_eq!(manager.current_state().await, State::OptOut);
    manager.flush_storage().await;
    drop(manager);

    let restarted = start(&operator, &clock, &store).await;
    assert_eq!(restarted.current_state().await, State::OptOut);

    restarted.reset_identity().await;
    restarted.flush_storage().await;
    assert!(!store.path().exists());
    drop(restarted);

    let fresh = start(&operator, &clock, &store).await;
    assert_eq!(fresh.current_state().await, State::NoIdentity);
}

#[tokio::test(start_paused = true)]
async fn test_unattended_identity_runs_out() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::in_dir(dir.path());
    let clock = Arc::new(TokioClock::fixed());
    let operator = SimulatedOperator::new(clock.clone());
    operator.set_lifetimes(Lifetimes {
        refresh_from: 5 * MINUTE as i64,
        identity_expires: 15 * MINUTE as i64,
        refresh_expires: 60 * MINUTE as i64,
    });

    let manager = start(&operator, &clock, &store).await;
    manager
        .generate_identity(email(), "subscription", &operator.server_public_key(), "com.example")
        .await
        .unwrap();

    // Every refresh fails; the identity expires, then the refresh token does.
    for _ in 0..8 {
        operator.push_refresh_reply(OperatorReply::Unreachable);
    }
    advance(16 * MINUTE).await;
    assert_eq!(manager.current_status().await, IdentityStatus::Expired);

    advance(45 * MINUTE).await;
    assert_eq!(manager.current_state().await, State::RefreshExpired);
    // One attempt at refresh_from, one when the identity expired.
    assert_eq!(operator.request_count(REFRESH_PATH), 2);

    manager.flush_storage().await;
    let stored = std::fs::read_to_string(store.path()).unwrap();
    let record: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(record["status"], -3);
    assert!(record["identity"].is_null());
}
