//! Repository behavior against an in-memory SQLite database.

use chrono::Utc;
use sieve_db::{
    Database, Descriptor, DescriptorRepository, MasterGraph, MasterGraphRepository, Profile,
    ProfileRepository, ProfileUpdate, RecommendationItem, SavedRecommendation,
    SavedRecommendationRepository, SettingsStore, ShoppingLinks, SourceMeta, SourceRepository,
    TagGraph, TagSignals,
};

async fn setup() -> Database {
    Database::connect_memory()
        .await
        .expect("Failed to open in-memory database")
}

fn meta(name: &str) -> SourceMeta {
    SourceMeta {
        name: name.to_string(),
        url: format!("https://example.com/alice/{}/", name),
    }
}

fn descriptor(id: &str, title: &str) -> Descriptor {
    Descriptor {
        id: id.to_string(),
        title: title.to_string(),
        ..Default::default()
    }
}

fn item(id: &str, profile_id: Option<&str>) -> RecommendationItem {
    RecommendationItem {
        id: id.to_string(),
        name: format!("Item {}", id),
        description: String::new(),
        price_range: "$20-$40".to_string(),
        category: "home".to_string(),
        match_reason: String::new(),
        search_query: None,
        links: ShoppingLinks::build("Item", None, None),
        generated_at: Utc::now(),
        profile_id: profile_id.map(str::to_string),
    }
}

#[tokio::test]
async fn test_upsert_keeps_label_and_graph() {
    let db = setup().await;
    let source = db.sources.upsert("alice-kitchen", &meta("kitchen")).await.unwrap();
    assert_eq!(source.label, "kitchen");
    assert!(source.enabled);

    let mut graph = TagGraph::new();
    graph.merge_signals(&TagSignals::new().with("themes", &["cozy"]));
    db.sources
        .store_analysis("alice-kitchen", &graph, &[], Utc::now())
        .await
        .unwrap();
    assert!(db.sources.set_label("alice-kitchen", "Kitchen Ideas").await.unwrap());

    let again = db
        .sources
        .upsert(
            "alice-kitchen",
            &SourceMeta {
                name: "kitchen (renamed)".to_string(),
                url: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(again.name, "kitchen (renamed)");
    assert_eq!(again.label, "Kitchen Ideas");
    assert_eq!(again.graph, graph);
    assert!(again.analyzed_at.is_some());
}

#[tokio::test]
async fn test_descriptor_batches_are_idempotent() {
    let db = setup().await;
    db.sources.upsert("s1", &meta("s1")).await.unwrap();

    let batch = vec![descriptor("a", "Mug"), descriptor("b", "Vase"), descriptor("a", "Mug")];
    assert_eq!(db.descriptors.insert_batch("s1", &batch).await.unwrap(), 2);
    assert_eq!(db.descriptors.insert_batch("s1", &batch).await.unwrap(), 0);

    let more = vec![descriptor("c", "Lamp")];
    assert_eq!(db.descriptors.insert_batch("s1", &more).await.unwrap(), 1);

    let stored = db.descriptors.list_for_source("s1").await.unwrap();
    let titles: Vec<&str> = stored.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(titles, vec!["Mug", "Vase", "Lamp"]);
    assert_eq!(db.descriptors.count_for_source("s1").await.unwrap(), 3);
}

#[tokio::test]
async fn test_descriptor_without_id_gets_derived_identity() {
    let db = setup().await;
    db.sources.upsert("s1", &meta("s1")).await.unwrap();

    let anonymous = Descriptor {
        title: "Linen apron".to_string(),
        url: "https://example.com/p/1".to_string(),
        ..Default::default()
    };
    let batch = vec![anonymous.clone(), anonymous];
    assert_eq!(db.descriptors.insert_batch("s1", &batch).await.unwrap(), 1);

    let stored = db.descriptors.list_for_source("s1").await.unwrap();
    assert!(stored[0].id.starts_with("d-"));
}

#[tokio::test]
async fn test_delete_source_removes_descriptors() {
    let db = setup().await;
    db.sources.upsert("s1", &meta("s1")).await.unwrap();
    db.descriptors
        .insert_batch("s1", &[descriptor("a", "Mug")])
        .await
        .unwrap();

    assert!(db.sources.delete("s1").await.unwrap());
    assert!(!db.sources.delete("s1").await.unwrap());
    assert!(db.sources.get("s1").await.unwrap().is_none());
    assert_eq!(db.descriptors.count_for_source("s1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_record_error_then_analysis_clears_it() {
    let db = setup().await;
    db.sources.upsert("s1", &meta("s1")).await.unwrap();
    db.sources.record_error("s1", "boom").await.unwrap();

    let failed = db.sources.get("s1").await.unwrap().unwrap();
    assert_eq!(failed.last_error.unwrap().message, "boom");

    db.sources
        .store_analysis("s1", &TagGraph::new(), &[], Utc::now())
        .await
        .unwrap();
    let ok = db.sources.get("s1").await.unwrap().unwrap();
    assert!(ok.last_error.is_none());
}

#[tokio::test]
async fn test_store_analysis_on_missing_source_fails() {
    let db = setup().await;
    let err = db
        .sources
        .store_analysis("ghost", &TagGraph::new(), &[], Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, sieve_db::Error::NoSuchSource(_)));
}

#[tokio::test]
async fn test_profile_update_and_source_ref_cleanup() {
    let db = setup().await;
    let profile = Profile::new(
        "Mom".to_string(),
        vec!["s1".to_string(), "s2".to_string()],
        vec![],
    );
    db.profiles.insert(&profile).await.unwrap();

    let updated = db
        .profiles
        .update(
            &profile.id,
            &ProfileUpdate {
                manual_tags: Some(vec!["pottery".to_string()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Mom");
    assert_eq!(updated.manual_tags, vec!["pottery".to_string()]);

    assert_eq!(db.profiles.remove_source_refs("s1").await.unwrap(), 1);
    let reloaded = db.profiles.get(&profile.id).await.unwrap().unwrap();
    assert_eq!(reloaded.source_ids, vec!["s2".to_string()]);

    let missing = db
        .profiles
        .update("nope", &ProfileUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(missing, sieve_db::Error::ProfileNotFound(_)));
}

#[tokio::test]
async fn test_master_graph_round_trip() {
    let db = setup().await;
    assert!(db.master.get().await.unwrap().is_none());

    let mut graph = TagGraph::new();
    graph.merge_signals(&TagSignals::new().with("colors", &["sage"]));
    let master = MasterGraph {
        graph,
        source_ids: vec!["s1".to_string()],
        updated_at: Utc::now(),
    };
    db.master.put(&master).await.unwrap();
    db.master.put(&master).await.unwrap();

    let stored = db.master.get().await.unwrap().unwrap();
    assert_eq!(stored.graph, master.graph);
    assert_eq!(stored.source_ids, master.source_ids);
}

#[tokio::test]
async fn test_saved_recommendations_filter_by_profile() {
    let db = setup().await;
    for (id, profile) in [("r1", Some("p1")), ("r2", None), ("r3", Some("p1"))] {
        db.saved
            .save(&SavedRecommendation {
                item: item(id, profile),
                saved_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    assert_eq!(db.saved.list(None).await.unwrap().len(), 3);
    assert_eq!(db.saved.list(Some("p1")).await.unwrap().len(), 2);
    assert!(db.saved.delete("r2").await.unwrap());
    assert!(!db.saved.delete("r2").await.unwrap());
}

#[tokio::test]
async fn test_settings_and_clear_all() {
    let db = setup().await;
    db.settings.set_setting("k", "v1").await.unwrap();
    db.settings.set_setting("k", "v2").await.unwrap();
    assert_eq!(db.settings.get_setting("k").await.unwrap().as_deref(), Some("v2"));

    db.sources.upsert("s1", &meta("s1")).await.unwrap();
    db.descriptors
        .insert_batch("s1", &[descriptor("a", "Mug")])
        .await
        .unwrap();
    let stats = db.stats().await.unwrap();
    assert_eq!(stats.source_count, 1);
    assert_eq!(stats.item_count, 1);

    db.clear_all().await.unwrap();
    let stats = db.stats().await.unwrap();
    assert_eq!(stats.source_count, 0);
    assert_eq!(stats.item_count, 0);
    assert!(db.settings.get_setting("k").await.unwrap().is_none());
}
