//! Generation orchestrator lifecycle against a scripted backend.
//!
//! A gated mock holds the transport call open so tests can observe a job
//! while it is still running.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Notify};

use sieve_db::Database;
use sieve_inference::mock::{MockGenerationBackend, MockReply};
use sieve_jobs::{
    AnalysisConfig, GenerationFilters, GenerationJob, GenerationJobStore, JobEvent, JobState,
    OrchestratorConfig, PollStatus, ScopeSelector, Sieve, StartOutcome, MASTER_SCOPE,
};

const RECS: &str = r#"[{"name":"Mug","price_range":"$10","category":"home"},{"name":"Scarf","price_range":"$30"}]"#;

async fn sieve_with(mock: MockGenerationBackend) -> Sieve {
    let db = Database::connect_memory().await.unwrap();
    Sieve::new(db, Arc::new(mock))
}

async fn next_event(rx: &mut broadcast::Receiver<JobEvent>) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for job event")
        .expect("event channel closed")
}

/// Skip events until one other than `Started` arrives.
async fn terminal_event(rx: &mut broadcast::Receiver<JobEvent>) -> JobEvent {
    loop {
        let event = next_event(rx).await;
        if !matches!(event, JobEvent::Started { .. }) {
            return event;
        }
    }
}

async fn wait_for_calls(mock: &MockGenerationBackend, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while mock.call_count() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("backend was never called");
}

#[tokio::test]
async fn test_start_then_poll_completed() {
    let mock = MockGenerationBackend::new().with_default_response(RECS);
    let sieve = sieve_with(mock.clone()).await;
    let mut events = sieve.generations.subscribe();

    let outcome = sieve
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    assert!(matches!(outcome, StartOutcome::Accepted { ref scope_key, .. } if scope_key == MASTER_SCOPE));

    let event = terminal_event(&mut events).await;
    assert_eq!(
        event,
        JobEvent::Completed {
            scope_key: MASTER_SCOPE.to_string(),
            item_count: 2
        }
    );

    match sieve.generations.poll(MASTER_SCOPE).await.unwrap() {
        PollStatus::Completed { items } => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].name, "Mug");
            assert!(items[0].profile_id.is_none());
        }
        other => panic!("unexpected status: {:?}", other),
    }
    assert_eq!(mock.call_count(), 1);

    assert!(sieve.generations.acknowledge(MASTER_SCOPE).await.unwrap());
    assert_eq!(
        sieve.generations.poll(MASTER_SCOPE).await.unwrap(),
        PollStatus::Absent
    );
}

#[tokio::test]
async fn test_duplicate_start_is_rejected_with_one_backend_call() {
    let gate = Arc::new(Notify::new());
    let mock = MockGenerationBackend::new()
        .with_default_response(RECS)
        .with_gate(gate.clone());
    let sieve = sieve_with(mock.clone()).await;
    let mut events = sieve.generations.subscribe();

    let first = sieve
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    let StartOutcome::Accepted { started_at, .. } = first else {
        panic!("first start not accepted: {:?}", first);
    };
    wait_for_calls(&mock, 1).await;

    let second = sieve
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    assert_eq!(
        second,
        StartOutcome::AlreadyRunning {
            scope_key: MASTER_SCOPE.to_string(),
            started_at,
        }
    );
    assert!(matches!(
        sieve.generations.poll(MASTER_SCOPE).await.unwrap(),
        PollStatus::Running { .. }
    ));

    gate.notify_one();
    assert!(matches!(
        terminal_event(&mut events).await,
        JobEvent::Completed { .. }
    ));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_failure_is_reported_once_and_not_persisted() {
    let mock = MockGenerationBackend::new().with_script(vec![MockReply::Fail {
        message: "upstream exploded".to_string(),
        retry_after: None,
    }]);
    let sieve = sieve_with(mock).await;
    let mut events = sieve.generations.subscribe();

    sieve
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    assert!(matches!(
        terminal_event(&mut events).await,
        JobEvent::Failed { .. }
    ));

    match sieve.generations.poll(MASTER_SCOPE).await.unwrap() {
        PollStatus::Failed { message } => assert!(message.contains("upstream exploded")),
        other => panic!("unexpected status: {:?}", other),
    }
    assert_eq!(
        sieve.generations.poll(MASTER_SCOPE).await.unwrap(),
        PollStatus::Absent
    );
    assert_eq!(
        sieve.generations.state(MASTER_SCOPE).await.unwrap(),
        JobState::Idle
    );
}

#[tokio::test]
async fn test_rate_limit_blocks_new_starts() {
    let mock = MockGenerationBackend::new()
        .with_script(vec![MockReply::rate_limited(Duration::from_secs(60))])
        .with_default_response(RECS);
    let sieve = sieve_with(mock.clone()).await;
    let mut events = sieve.generations.subscribe();

    sieve
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    let JobEvent::RateLimited { resume_at, .. } = terminal_event(&mut events).await else {
        panic!("expected rate-limited event");
    };
    assert!(resume_at > Utc::now());

    assert_eq!(
        sieve.generations.poll(MASTER_SCOPE).await.unwrap(),
        PollStatus::RateLimited { resume_at }
    );

    let wait = sieve.generations.time_until_allowed().await.unwrap().unwrap();
    assert!(wait <= Duration::from_secs(60));
    assert!(wait > Duration::from_secs(50));

    let refused = sieve
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    assert_eq!(refused, StartOutcome::RateLimited { resume_at });
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_stale_marker_is_cleared_on_poll() {
    let mock = MockGenerationBackend::new().with_default_response(RECS);
    let sieve = sieve_with(mock).await;

    let mut abandoned = GenerationJob::new(ScopeSelector::master(), GenerationFilters::default());
    abandoned.started_at = Utc::now() - chrono::Duration::minutes(10);
    assert!(sieve
        .db()
        .generations
        .try_begin(&abandoned, Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap());

    assert_eq!(
        sieve.generations.poll(MASTER_SCOPE).await.unwrap(),
        PollStatus::Absent
    );
    assert!(sieve
        .db()
        .generations
        .marker(MASTER_SCOPE)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_stale_marker_does_not_block_start() {
    let mock = MockGenerationBackend::new().with_default_response(RECS);
    let sieve = sieve_with(mock).await;

    let mut abandoned = GenerationJob::new(ScopeSelector::master(), GenerationFilters::default());
    abandoned.started_at = Utc::now() - chrono::Duration::minutes(10);
    sieve
        .db()
        .generations
        .try_begin(&abandoned, Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();

    let outcome = sieve
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    assert!(matches!(outcome, StartOutcome::Accepted { .. }));
}

#[tokio::test]
async fn test_unknown_profile_is_rejected_before_claim() {
    let mock = MockGenerationBackend::new();
    let sieve = sieve_with(mock.clone()).await;

    let err = sieve
        .generations
        .start(ScopeSelector::profile("nope"), GenerationFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, sieve_jobs::Error::ProfileNotFound(_)));
    assert!(sieve.db().generations.marker("nope").await.unwrap().is_none());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_truncated_reply_still_completes() {
    let mock = MockGenerationBackend::new()
        .with_default_response(r#"[{"name":"Mug","price_range":"$10"},{"name":"Vase","price_r"#);
    let sieve = sieve_with(mock).await;
    let profile = sieve
        .scopes
        .create_profile("Gifts", vec![], &[])
        .await
        .unwrap();
    let mut events = sieve.generations.subscribe();

    sieve
        .generations
        .start(ScopeSelector::profile(&profile.id), GenerationFilters::default())
        .await
        .unwrap();
    terminal_event(&mut events).await;

    match sieve.generations.poll(&profile.id).await.unwrap() {
        PollStatus::Completed { items } => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].name, "Mug");
            assert_eq!(items[0].profile_id.as_deref(), Some(profile.id.as_str()));
        }
        other => panic!("unexpected status: {:?}", other),
    }
}

#[tokio::test]
async fn test_running_marker_visible_to_second_process() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("sieve.db").display());

    let gate = Arc::new(Notify::new());
    let mock = MockGenerationBackend::new()
        .with_default_response(RECS)
        .with_gate(gate.clone());
    let first_db = Database::connect(&url).await.unwrap();
    first_db.migrate().await.unwrap();
    let first = Sieve::new(first_db, Arc::new(mock.clone()));
    let mut events = first.generations.subscribe();

    first
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap();
    wait_for_calls(&mock, 1).await;

    // A second process opening the same file sees the job as running and
    // cannot start a duplicate.
    let second_db = Database::connect(&url).await.unwrap();
    let second_mock = MockGenerationBackend::new().with_default_response(RECS);
    let second = Sieve::new(second_db, Arc::new(second_mock.clone()));
    assert!(matches!(
        second.generations.poll(MASTER_SCOPE).await.unwrap(),
        PollStatus::Running { .. }
    ));
    assert!(matches!(
        second
            .generations
            .start(ScopeSelector::master(), GenerationFilters::default())
            .await
            .unwrap(),
        StartOutcome::AlreadyRunning { .. }
    ));
    assert_eq!(second_mock.call_count(), 0);

    gate.notify_one();
    assert!(matches!(
        terminal_event(&mut events).await,
        JobEvent::Completed { .. }
    ));

    match second.generations.poll(MASTER_SCOPE).await.unwrap() {
        PollStatus::Completed { items } => assert_eq!(items.len(), 2),
        other => panic!("unexpected status: {:?}", other),
    }
}

#[tokio::test]
async fn test_stale_job_finishing_late_leaves_newer_claim_alone() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("sieve.db").display());

    let first_gate = Arc::new(Notify::new());
    let first_mock = MockGenerationBackend::new()
        .with_default_response(r#"[{"name":"Stale Lamp","price_range":"$5"}]"#)
        .with_gate(first_gate.clone());
    let first_db = Database::connect(&url).await.unwrap();
    first_db.migrate().await.unwrap();
    let first = Sieve::new(first_db, Arc::new(first_mock.clone()));
    let mut first_events = first.generations.subscribe();

    let StartOutcome::Accepted {
        started_at: stale_started,
        ..
    } = first
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap()
    else {
        panic!("first start not accepted");
    };
    wait_for_calls(&first_mock, 1).await;

    // A second process with a short staleness window takes the scope over.
    let second_gate = Arc::new(Notify::new());
    let second_mock = MockGenerationBackend::new()
        .with_default_response(RECS)
        .with_gate(second_gate.clone());
    let second = Sieve::with_config(
        Database::connect(&url).await.unwrap(),
        Arc::new(second_mock.clone()),
        AnalysisConfig::default(),
        OrchestratorConfig::default().with_stale_after(Duration::from_millis(200)),
    );
    let mut second_events = second.generations.subscribe();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let StartOutcome::Accepted {
        started_at: fresh_started,
        ..
    } = second
        .generations
        .start(ScopeSelector::master(), GenerationFilters::default())
        .await
        .unwrap()
    else {
        panic!("takeover start not accepted");
    };
    wait_for_calls(&second_mock, 1).await;

    first_gate.notify_one();
    assert_eq!(
        terminal_event(&mut first_events).await,
        JobEvent::Superseded {
            scope_key: MASTER_SCOPE.to_string(),
            started_at: stale_started,
        }
    );

    match first.generations.state(MASTER_SCOPE).await.unwrap() {
        JobState::Running { job } => assert_eq!(job.started_at, fresh_started),
        other => panic!("newer claim lost: {:?}", other),
    }
    assert_eq!(
        first.generations.poll(MASTER_SCOPE).await.unwrap(),
        PollStatus::Running {
            started_at: fresh_started
        }
    );
    assert_eq!(
        first
            .generations
            .start(ScopeSelector::master(), GenerationFilters::default())
            .await
            .unwrap(),
        StartOutcome::AlreadyRunning {
            scope_key: MASTER_SCOPE.to_string(),
            started_at: fresh_started,
        }
    );

    second_gate.notify_one();
    assert!(matches!(
        terminal_event(&mut second_events).await,
        JobEvent::Completed { item_count: 2, .. }
    ));
    match first.generations.poll(MASTER_SCOPE).await.unwrap() {
        PollStatus::Completed { items } => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].name, "Mug");
        }
        other => panic!("unexpected status: {:?}", other),
    }
    assert_eq!(first_mock.call_count(), 1);
    assert_eq!(second_mock.call_count(), 1);
}
