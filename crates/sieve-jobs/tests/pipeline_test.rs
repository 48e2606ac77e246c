//! Submission, analysis and scope flattening end to end.

use std::sync::Arc;

use sieve_db::Database;
use sieve_inference::mock::{MockGenerationBackend, MockReply};
use sieve_jobs::defaults::MANUAL_TAG_BONUS;
use sieve_jobs::{Channel, Descriptor, Error, ProfileUpdate, ScopeSelector, Sieve, SourceMeta};

const SIGNALS: &str = r#"{"themes":["cozy","cozy"," Cozy "],"colors":["sage"]}"#;

fn meta(name: &str) -> SourceMeta {
    SourceMeta {
        name: name.to_string(),
        url: format!("https://board.example/{}", name),
    }
}

fn items(prefix: &str, n: usize) -> Vec<Descriptor> {
    (0..n)
        .map(|i| Descriptor {
            id: format!("{}-{}", prefix, i),
            title: format!("{} item {}", prefix, i),
            ..Default::default()
        })
        .collect()
}

async fn sieve_with(mock: MockGenerationBackend) -> Sieve {
    let db = Database::connect_memory().await.unwrap();
    Sieve::new(db, Arc::new(mock))
}

#[tokio::test]
async fn test_submit_is_idempotent() {
    let sieve = sieve_with(MockGenerationBackend::new()).await;
    let batch = items("a", 3);

    let first = sieve
        .scopes
        .submit_descriptors(Some("a"), &meta("a"), &batch)
        .await
        .unwrap();
    assert_eq!(first.accepted, 3);
    assert_eq!(first.item_count, 3);

    let again = sieve
        .scopes
        .submit_descriptors(Some("a"), &meta("a"), &batch)
        .await
        .unwrap();
    assert_eq!(again.accepted, 0);
    assert_eq!(again.item_count, 3);

    let source = sieve.scopes.get_source("a").await.unwrap();
    assert_eq!(source.item_count, 3);
    assert!(source.graph.is_empty());
}

#[tokio::test]
async fn test_analyze_source_counts_repeated_signals() {
    let mock = MockGenerationBackend::new().with_default_response(SIGNALS);
    let sieve = sieve_with(mock.clone()).await;
    sieve
        .scopes
        .submit_descriptors(Some("a"), &meta("a"), &items("a", 2))
        .await
        .unwrap();

    let graph = sieve.analyzer.analyze_source("a").await.unwrap();
    assert_eq!(graph.weight(Channel::Themes, "cozy"), 3);
    assert_eq!(graph.weight(Channel::Colors, "sage"), 1);
    // No image urls, so only the text extraction runs.
    assert_eq!(mock.call_count(), 1);

    let master = sieve.scopes.master_graph().await.unwrap();
    assert_eq!(master.graph.weight(Channel::Themes, "cozy"), 3);
    assert_eq!(master.source_ids, vec!["a".to_string()]);
}

#[tokio::test]
async fn test_analyze_errors() {
    let sieve = sieve_with(MockGenerationBackend::new()).await;
    assert!(matches!(
        sieve.analyzer.analyze_source("missing").await.unwrap_err(),
        Error::NoSuchSource(_)
    ));

    sieve
        .scopes
        .submit_descriptors(Some("empty"), &meta("empty"), &[])
        .await
        .unwrap();
    assert!(matches!(
        sieve.analyzer.analyze_source("empty").await.unwrap_err(),
        Error::NoItemsToAnalyze(_)
    ));
}

#[tokio::test]
async fn test_analyze_all_continues_after_failure() {
    let mock = MockGenerationBackend::new()
        .with_script(vec![MockReply::Fail {
            message: "connection reset".to_string(),
            retry_after: None,
        }])
        .with_default_response(SIGNALS);
    let sieve = sieve_with(mock).await;
    for id in ["a", "b"] {
        sieve
            .scopes
            .submit_descriptors(Some(id), &meta(id), &items(id, 1))
            .await
            .unwrap();
    }
    sieve
        .scopes
        .submit_descriptors(Some("c"), &meta("c"), &[])
        .await
        .unwrap();

    let outcomes = sieve.analyzer.analyze_all().await.unwrap();
    assert_eq!(outcomes.len(), 2);

    let failed = outcomes.iter().find(|o| !o.ok).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("connection reset"));
    let ok = outcomes.iter().find(|o| o.ok).unwrap();
    assert_ne!(failed.source_id, ok.source_id);

    let failed_source = sieve.scopes.get_source(&failed.source_id).await.unwrap();
    assert!(failed_source.last_error.is_some());
    assert!(failed_source.graph.is_empty());

    let ok_source = sieve.scopes.get_source(&ok.source_id).await.unwrap();
    assert!(ok_source.last_error.is_none());
    assert_eq!(ok_source.graph.weight(Channel::Themes, "cozy"), 3);

    let master = sieve.scopes.master_graph().await.unwrap();
    assert_eq!(master.graph.weight(Channel::Themes, "cozy"), 3);
}

#[tokio::test]
async fn test_reanalyze_replaces_accumulated_graph() {
    let mock = MockGenerationBackend::new().with_default_response(SIGNALS);
    let sieve = sieve_with(mock).await;
    sieve
        .scopes
        .submit_descriptors(Some("a"), &meta("a"), &items("a", 1))
        .await
        .unwrap();

    sieve.analyzer.analyze_source("a").await.unwrap();
    sieve.analyzer.analyze_source("a").await.unwrap();
    let doubled = sieve.scopes.get_source("a").await.unwrap();
    assert_eq!(doubled.graph.weight(Channel::Themes, "cozy"), 6);

    sieve.analyzer.reanalyze_all().await.unwrap();
    let reset = sieve.scopes.get_source("a").await.unwrap();
    assert_eq!(reset.graph.weight(Channel::Themes, "cozy"), 3);
}

#[tokio::test]
async fn test_failed_reanalyze_keeps_previous_graph() {
    let mock = MockGenerationBackend::new().with_default_response(SIGNALS);
    let sieve = sieve_with(mock.clone()).await;
    sieve
        .scopes
        .submit_descriptors(Some("a"), &meta("a"), &items("a", 1))
        .await
        .unwrap();
    sieve.analyzer.analyze_source("a").await.unwrap();

    mock.push_reply(MockReply::Fail {
        message: "connection reset".to_string(),
        retry_after: None,
    });
    let outcomes = sieve.analyzer.reanalyze_all().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].ok);

    let source = sieve.scopes.get_source("a").await.unwrap();
    assert_eq!(source.graph.weight(Channel::Themes, "cozy"), 3);
    assert!(source.last_error.is_some());

    let master = sieve.scopes.master_graph().await.unwrap();
    assert_eq!(master.graph.weight(Channel::Themes, "cozy"), 3);
}

#[tokio::test]
async fn test_disabled_source_leaves_master() {
    let mock = MockGenerationBackend::new().with_default_response(SIGNALS);
    let sieve = sieve_with(mock).await;
    sieve
        .scopes
        .submit_descriptors(Some("a"), &meta("a"), &items("a", 1))
        .await
        .unwrap();
    sieve.analyzer.analyze_all().await.unwrap();

    let master = sieve.scopes.set_source_enabled("a", false).await.unwrap();
    assert!(master.graph.is_empty());

    // The explicit subset ignores the enabled flag.
    let subset = sieve
        .scopes
        .flatten_scope(&ScopeSelector {
            profile_id: None,
            source_ids: Some(vec!["a".to_string()]),
        })
        .await
        .unwrap();
    assert_eq!(subset.weight(Channel::Themes, "cozy"), 3);

    let master = sieve.scopes.delete_source("a").await.unwrap();
    assert!(master.source_ids.is_empty());
    assert!(matches!(
        sieve.scopes.get_source("a").await.unwrap_err(),
        Error::NoSuchSource(_)
    ));
}

#[tokio::test]
async fn test_master_manual_tags_are_lost_on_rebuild() {
    let mock = MockGenerationBackend::new().with_default_response(SIGNALS);
    let sieve = sieve_with(mock).await;
    sieve
        .scopes
        .submit_descriptors(Some("a"), &meta("a"), &items("a", 1))
        .await
        .unwrap();
    sieve.analyzer.analyze_all().await.unwrap();

    let master = sieve
        .scopes
        .add_master_tag(Some(Channel::Colors), " Rust ", Some(4))
        .await
        .unwrap();
    assert_eq!(master.graph.weight(Channel::Colors, "rust"), 4);
    assert_eq!(master.graph.weight(Channel::Themes, "cozy"), 3);

    let err = sieve
        .scopes
        .add_master_tag(None, "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let master = sieve.scopes.rebuild_master(None).await.unwrap();
    assert_eq!(master.graph.weight(Channel::Colors, "rust"), 0);

    let master = sieve.scopes.remove_master_tag("cozy").await.unwrap();
    assert_eq!(master.graph.weight(Channel::Themes, "cozy"), 0);
    assert_eq!(master.graph.weight(Channel::Colors, "sage"), 1);
}

#[tokio::test]
async fn test_profile_manual_tags_and_flatten() {
    let mock = MockGenerationBackend::new().with_default_response(SIGNALS);
    let sieve = sieve_with(mock).await;
    for id in ["a", "b"] {
        sieve
            .scopes
            .submit_descriptors(Some(id), &meta(id), &items(id, 1))
            .await
            .unwrap();
    }
    sieve.analyzer.analyze_all().await.unwrap();

    let profile = sieve
        .scopes
        .create_profile("Sister", vec!["a".to_string()], &["Handmade".to_string()])
        .await
        .unwrap();
    assert_eq!(profile.manual_tags, vec!["handmade".to_string()]);

    let graph = sieve.scopes.flatten_profile(&profile.id).await.unwrap();
    assert_eq!(graph.weight(Channel::Themes, "cozy"), 3);
    assert_eq!(graph.weight(Channel::Keywords, "handmade"), MANUAL_TAG_BONUS);

    let again = sieve.scopes.flatten_profile(&profile.id).await.unwrap();
    assert_eq!(
        serde_json::to_string(&graph).unwrap(),
        serde_json::to_string(&again).unwrap()
    );

    sieve
        .scopes
        .remove_manual_tag(&profile.id, " HANDMADE ")
        .await
        .unwrap();
    let graph = sieve.scopes.flatten_profile(&profile.id).await.unwrap();
    assert!(!graph.tag_set().contains("handmade"));

    let updated = sieve
        .scopes
        .update_profile(
            &profile.id,
            ProfileUpdate {
                source_ids: Some(vec!["a".to_string(), "b".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.source_ids.len(), 2);

    let pairs = sieve.scopes.profile_similarities(&profile.id).await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert!((pairs[0].score - 1.0).abs() < f64::EPSILON);

    sieve.scopes.delete_profile(&profile.id).await.unwrap();
    assert!(matches!(
        sieve.scopes.get_profile(&profile.id).await.unwrap_err(),
        Error::ProfileNotFound(_)
    ));
}
