//! Integration tests for the PostgreSQL store in both storage shapes.
//!
//! Each test runs in its own schema. Requires DATABASE_URL pointing at a
//! PostgreSQL instance where the test user may create schemas.

use std::sync::Arc;

use storymap_core::{
    Actor, Error, MapStore, NewStory, PinCategory, PinRepository, SourceShape, StoryKind, StoryMap,
    StoryStatus,
};
use storymap_db::test_fixtures::{TestDatabase, LEGACY_SCHEMA_SQL};

fn admin() -> Actor {
    Actor::new("admin@example.org")
}

fn nairobi_org() -> NewStory {
    NewStory {
        id: Some("org-1".to_string()),
        kind: StoryKind::Organization,
        title: Some("Legal Aid Kenya".to_string()),
        organization_name: Some("Legal Aid Kenya".to_string()),
        organization_description: Some("Free legal help for survivors.".to_string()),
        website: Some("https://legalaid.example.org".to_string()),
        focus_areas: vec!["legal".to_string(), "advocacy".to_string()],
        country: Some("Kenya".to_string()),
        city: Some("Nairobi".to_string()),
        ..NewStory::default()
    }
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_full_shape_lifecycle() {
    let test_db = TestDatabase::migrated().await;
    let db = Arc::new(test_db.db.clone());
    assert_eq!(db.shape(), SourceShape::Full);

    let map = StoryMap::new(db.clone());
    map.submit_story(NewStory {
        id: Some("s1".to_string()),
        title: Some("Healthcare Access in Lagos".to_string()),
        story: "I waited three days to see a doctor.".to_string(),
        country: Some("Nigeria".to_string()),
        city: Some("Lagos".to_string()),
        ..NewStory::default()
    })
    .await
    .unwrap();

    let outcome = map.approve_and_publish(&admin(), "s1").await.unwrap();
    assert_eq!(outcome.story.unwrap().status, StoryStatus::OnMap);

    let pins = map.list_pins().await.unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].id, "s1");
    assert_eq!((pins[0].lat, pins[0].lng), (6.5244, 3.3792));

    map.unpublish_story(&admin(), "s1").await.unwrap();
    assert!(map.list_pins().await.unwrap().is_empty());
    assert_eq!(
        map.list_stories().await.unwrap()[0].status,
        StoryStatus::Approved
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_failed_batch_rolls_back() {
    let test_db = TestDatabase::migrated().await;
    let map = StoryMap::new(Arc::new(test_db.db.clone()));

    map.submit_story(NewStory {
        id: Some("s2".to_string()),
        title: Some("Nowhere story".to_string()),
        country: Some("Atlantis".to_string()),
        ..NewStory::default()
    })
    .await
    .unwrap();
    map.approve_story(&admin(), "s2").await.unwrap();

    // Geocoding fails before anything is written.
    let err = map.publish_story(&admin(), "s2").await.unwrap_err();
    assert!(err.is_validation());
    assert!(test_db.db.load_pins().await.unwrap().is_empty());

    // A second approve is rejected by the stored status.
    let err = map.approve_story(&admin(), "s2").await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition(_)));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_duplicate_identifier_is_rejected() {
    let test_db = TestDatabase::migrated().await;
    let map = StoryMap::new(Arc::new(test_db.db.clone()));

    map.submit_story(nairobi_org()).await.unwrap();
    let err = map.submit_story(nairobi_org()).await.unwrap_err();
    assert!(err.is_validation());
    assert!(test_db.db.id_in_use("org-1").await.unwrap());
    assert!(!test_db.db.id_in_use("org-2").await.unwrap());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_legacy_shape_folds_organization_fields() {
    let test_db = TestDatabase::empty().await;
    test_db.execute(LEGACY_SCHEMA_SQL).await;
    let db = Arc::new(test_db.db.clone());
    assert_eq!(db.shape(), SourceShape::Legacy);

    let map = StoryMap::new(db.clone());
    map.submit_story(nairobi_org()).await.unwrap();

    let narrative: String = sqlx::query_scalar("SELECT story FROM stories WHERE id = 'org-1'")
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
    assert!(narrative.starts_with("Free legal help for survivors."));
    assert!(narrative.contains("\nWebsite: https://legalaid.example.org"));
    assert!(narrative.contains("\nFocus Areas: legal, advocacy"));

    let story = &map.list_stories().await.unwrap()[0];
    assert_eq!(story.kind, StoryKind::Organization);
    assert_eq!(story.website.as_deref(), Some("https://legalaid.example.org"));
    assert_eq!(
        story.organization_description.as_deref(),
        Some("Free legal help for survivors.")
    );

    map.approve_and_publish(&admin(), "org-1").await.unwrap();
    let pins = map.list_pins().await.unwrap();
    assert_eq!(pins[0].pin_type, PinCategory::Organization);

    let report = map.storage_report().await.unwrap();
    assert_eq!(report.backend, "postgres");
    assert_eq!(report.shape, SourceShape::Legacy);
    assert!(report
        .missing_columns
        .contains(&"stories.organization_name".to_string()));
    assert_eq!((report.story_count, report.pin_count), (1, 1));

    // Without an explicit id, website or focus areas nothing in the row marks
    // the organization except its id.
    let bare = map
        .submit_story(NewStory {
            kind: StoryKind::Organization,
            title: Some("Mombasa Shelter".to_string()),
            organization_description: Some("Beds for families.".to_string()),
            country: Some("Kenya".to_string()),
            city: Some("Mombasa".to_string()),
            ..NewStory::default()
        })
        .await
        .unwrap();
    assert!(bare.id.starts_with("organization_"));

    let stories = map.list_stories().await.unwrap();
    let listed = stories.iter().find(|s| s.id == bare.id).unwrap();
    assert_eq!(listed.kind, StoryKind::Organization);
    assert_eq!(
        listed.organization_description.as_deref(),
        Some("Beds for families.")
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_legacy_rows_with_odd_status_spelling() {
    let test_db = TestDatabase::empty().await;
    test_db.execute(LEGACY_SCHEMA_SQL).await;
    test_db
        .execute(
            "INSERT INTO stories (id, title, story, country, status) \
             VALUES ('old-1', 'Old story', 'text', 'Kenya', 'on_map'), \
                    ('old-2', 'No status', 'text', 'Kenya', NULL)",
        )
        .await;
    let map = StoryMap::new(Arc::new(test_db.db.clone()));

    let stories = map.list_stories().await.unwrap();
    let status = |id: &str| stories.iter().find(|s| s.id == id).unwrap().status;
    assert_eq!(status("old-1"), StoryStatus::OnMap);
    assert_eq!(status("old-2"), StoryStatus::Pending);

    // Compare-and-set matches the legacy spelling.
    map.unpublish_story(&admin(), "old-1").await.unwrap();
    map.approve_story(&admin(), "old-2").await.unwrap();
    let stories = map.list_stories().await.unwrap();
    assert!(stories.iter().all(|s| s.status == StoryStatus::Approved));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_missing_tables_are_schema_unavailable() {
    let test_db = TestDatabase::empty().await;
    let err = test_db.db.load_pins().await.unwrap_err();
    assert!(matches!(err, Error::SchemaUnavailable(_)));
    assert!(err.is_storage_failure());
    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_dropped_column_is_reprobed() {
    let test_db = TestDatabase::migrated().await;
    let map = StoryMap::new(Arc::new(test_db.db.clone()));
    map.submit_story(nairobi_org()).await.unwrap();

    // Drop a column behind the cache's back; the read retries after re-probing.
    sqlx::query("ALTER TABLE stories DROP COLUMN website")
        .execute(&test_db.pool)
        .await
        .unwrap();
    let stories = map.list_stories().await.unwrap();
    assert_eq!(stories.len(), 1);
    assert_eq!(test_db.db.shape(), SourceShape::Legacy);
    assert_eq!(test_db.db.story_shape(), SourceShape::Legacy);

    // Surviving organization columns are still read.
    assert_eq!(stories[0].kind, StoryKind::Organization);
    assert_eq!(
        stories[0].organization_description.as_deref(),
        Some("Free legal help for survivors.")
    );

    // New organizations carry the website in the narrative.
    let mut second = nairobi_org();
    second.id = Some("org-2".to_string());
    map.submit_story(second).await.unwrap();
    let narrative: String = sqlx::query_scalar("SELECT story FROM stories WHERE id = 'org-2'")
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
    assert!(narrative.contains("\nWebsite: https://legalaid.example.org"));

    let stories = map.list_stories().await.unwrap();
    let org2 = stories.iter().find(|s| s.id == "org-2").unwrap();
    assert_eq!(org2.website.as_deref(), Some("https://legalaid.example.org"));
    assert_eq!(
        org2.organization_description.as_deref(),
        Some("Free legal help for survivors.")
    );

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_old_pin_table_keeps_story_table_current() {
    let test_db = TestDatabase::migrated().await;
    let db = Arc::new(test_db.db.clone());
    let map = StoryMap::new(db.clone());

    sqlx::query("ALTER TABLE map_pins DROP COLUMN story")
        .execute(&test_db.pool)
        .await
        .unwrap();
    assert!(map.list_pins().await.unwrap().is_empty());
    assert_eq!(db.shape(), SourceShape::Legacy);
    assert_eq!(db.story_shape(), SourceShape::Full);

    map.submit_story(nairobi_org()).await.unwrap();
    let narrative: String = sqlx::query_scalar("SELECT story FROM stories WHERE id = 'org-1'")
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
    assert!(!narrative.contains("Website:"));

    let story = &map.list_stories().await.unwrap()[0];
    assert_eq!(story.website.as_deref(), Some("https://legalaid.example.org"));
    assert_eq!(story.focus_areas, vec!["legal", "advocacy"]);
    assert_eq!(
        story.organization_description.as_deref(),
        Some("Free legal help for survivors.")
    );

    map.approve_and_publish(&admin(), "org-1").await.unwrap();
    let pins = map.list_pins().await.unwrap();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].pin_type, PinCategory::Organization);

    test_db.cleanup().await;
}
