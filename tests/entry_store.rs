use std::sync::Arc;

use anyhow::Result;
use dream_journal_lib::{DreamDraft, EntryStore};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::tempdir;

fn draft(title: &str) -> DreamDraft {
    DreamDraft {
        title: title.into(),
        body: format!("I dreamt of {title}"),
        date: "3/14/2024".into(),
        mood: 4,
        is_lucid: true,
        is_nightmare: false,
        tags: vec!["#flying".into(), "#ocean".into()],
        images: vec!["file:///photos/a.png".into()],
        interpretation: String::new(),
    }
}

#[tokio::test]
async fn added_entry_round_trips_through_mirror() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    let id = store.add(draft("sea")).await.expect("insert succeeds");

    let entries = store.list();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.id, id);
    assert_eq!(entry.title, "sea");
    assert_eq!(entry.mood, 4);
    assert!(entry.is_lucid);
    assert!(!entry.is_nightmare);
    assert_eq!(entry.tags, vec!["#flying", "#ocean"]);
    assert_eq!(entry.images, vec!["file:///photos/a.png"]);
    assert_eq!(entry.interpretation, "");
    assert!(store.last_error().is_none());
    Ok(())
}

#[tokio::test]
async fn mirror_is_newest_first() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    let first = store.add(DreamDraft::titled("first")).await.expect("first");
    let second = store.add(DreamDraft::titled("second")).await.expect("second");
    assert!(second > first);

    let ids: Vec<i64> = store.list().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![second, first]);
    Ok(())
}

#[tokio::test]
async fn update_overwrites_every_field() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    let id = store.add(draft("forest")).await.expect("insert");

    let mut entry = store.get(id).expect("present");
    entry.title = "forest at night".into();
    entry.body = String::new();
    entry.mood = 0;
    entry.is_lucid = false;
    entry.is_nightmare = true;
    entry.tags.clear();
    entry.images.clear();
    entry.interpretation = "fear of the unknown".into();
    assert!(store.update(&entry).await);

    let stored = store.get(id).expect("still present");
    assert_eq!(stored, entry);
    assert_eq!(store.list().len(), 1);
    Ok(())
}

#[tokio::test]
async fn update_of_unknown_id_changes_nothing() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    store.add(DreamDraft::titled("only")).await.expect("insert");
    let ghost = DreamDraft::titled("ghost").into_entry(9_999);

    assert!(store.update(&ghost).await);
    let entries = store.list();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "only");
    Ok(())
}

#[tokio::test]
async fn delete_is_idempotent() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    let keep = store.add(DreamDraft::titled("keep")).await.expect("keep");
    let gone = store.add(DreamDraft::titled("gone")).await.expect("gone");

    assert!(store.delete(gone).await);
    assert!(store.delete(gone).await);
    let ids: Vec<i64> = store.list().iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![keep]);
    assert!(store.last_error().is_none());
    Ok(())
}

#[tokio::test]
async fn clear_all_empties_the_journal() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    for title in ["a", "b", "c"] {
        store.add(DreamDraft::titled(title)).await.expect("insert");
    }
    assert!(store.clear_all().await);
    assert!(store.list().is_empty());

    // Ids keep counting after a wipe.
    let next = store.add(DreamDraft::titled("d")).await.expect("insert");
    assert!(next > 3);
    Ok(())
}

#[tokio::test]
async fn subscribers_see_each_replacement() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    let mut rx = store.subscribe();

    store.add(DreamDraft::titled("watched")).await.expect("insert");
    assert!(rx.has_changed()?);
    let seen = rx.borrow_and_update().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].title, "watched");
    Ok(())
}

#[tokio::test]
async fn import_skips_invalid_records() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    let existing = store.add(DreamDraft::titled("existing")).await.expect("insert");

    let payload = json!([
        { "id": existing, "title": "restored", "mood": 3, "isLucid": true, "tags": ["#a"] },
        { "body": "no title here" },
        { "title": "second", "images": ["https://example.com/x.png"] }
    ]);
    let summary = store.import_bulk(&payload).await?;

    assert_eq!(summary.inserted.len(), 2);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].index, 1);

    let entries = store.list();
    assert_eq!(entries.len(), 3);
    // The id in the record is ignored; imports always get fresh ids.
    assert!(summary.inserted.iter().all(|id| *id != existing));
    let restored = entries
        .iter()
        .find(|e| e.title == "restored")
        .expect("restored entry");
    assert_eq!(restored.mood, 3);
    assert!(restored.is_lucid);
    assert_eq!(restored.tags, vec!["#a"]);
    Ok(())
}

#[tokio::test]
async fn import_rejects_non_list_payload_without_writing() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    store.add(DreamDraft::titled("keep")).await.expect("insert");

    let err = store
        .import_bulk(&json!({ "dreams": [] }))
        .await
        .expect_err("object payload rejected");
    assert_eq!(err.code(), "IMPORT/NOT_A_LIST");

    let err = store
        .import_json("this is not json")
        .await
        .expect_err("garbage rejected");
    assert_eq!(err.code(), "IMPORT/UNPARSEABLE");

    assert_eq!(store.list().len(), 1);
    Ok(())
}

#[tokio::test]
async fn undecodable_list_columns_fall_back_to_empty() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    sqlx::query("INSERT INTO dreams (title, tags, images) VALUES ('broken', '#not json', NULL)")
        .execute(store.pool())
        .await?;
    store.reload().await;

    let entries = store.list();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "broken");
    assert!(entries[0].tags.is_empty());
    assert!(entries[0].images.is_empty());
    assert!(store.last_error().is_none());
    Ok(())
}

#[tokio::test]
async fn read_failure_sets_error_and_empties_mirror() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    store.add(DreamDraft::titled("soon unreadable")).await.expect("insert");

    sqlx::query("DROP TABLE dreams").execute(store.pool()).await?;
    store.reload().await;

    assert!(store.list().is_empty());
    let err = store.last_error().expect("error recorded");
    assert_eq!(err.code(), "STORE/READ");

    store.dismiss_error();
    assert!(store.last_error().is_none());
    Ok(())
}

#[tokio::test]
async fn write_failure_is_reported_not_raised() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    sqlx::query("DROP TABLE dreams").execute(store.pool()).await?;

    assert_eq!(store.add(DreamDraft::titled("lost")).await, None);
    let err = store.last_error().expect("error recorded");
    assert!(err.code().starts_with("STORE/"));
    Ok(())
}

#[tokio::test]
async fn interpretation_and_images_attach_to_existing_entries() -> Result<()> {
    let store = EntryStore::open_in_memory().await?;
    let id = store.add(DreamDraft::titled("teeth")).await.expect("insert");

    store.set_interpretation(id, "Anxiety about appearance.").await?;
    store.attach_image(id, "/data/images/dream-1.png").await?;
    store.attach_image(id, "/data/images/dream-1b.png").await?;

    let entry = store.get(id).expect("present");
    assert_eq!(entry.interpretation, "Anxiety about appearance.");
    assert_eq!(
        entry.images,
        vec!["/data/images/dream-1.png", "/data/images/dream-1b.png"]
    );

    let err = store
        .set_interpretation(id + 100, "nobody")
        .await
        .expect_err("unknown id");
    assert_eq!(err.code(), "STORE/NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn schema_failure_is_returned_and_recorded() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("locked.sqlite3");
    // An empty file is a valid database with no schema yet.
    std::fs::File::create(&db_path)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(&db_path).read_only(true))
        .await?;

    let store = EntryStore::new(pool);
    let err = store.initialize().await.expect_err("read-only database");
    assert_eq!(err.code(), "STORE/INIT");
    assert!(err.cause().is_some());
    assert_eq!(store.last_error().map(|e| e.code().to_string()).as_deref(), Some("STORE/INIT"));
    assert!(store.list().is_empty());
    Ok(())
}

#[tokio::test]
async fn unusable_database_path_fails_to_open() -> Result<()> {
    let dir = tempdir()?;
    // The path names a directory, which sqlite cannot open as a file.
    let err = match EntryStore::open(dir.path()).await {
        Ok(_) => panic!("directory opened as database"),
        Err(err) => err,
    };
    assert_eq!(err.code(), "STORE/INIT");
    assert_eq!(
        err.context().get("path").map(String::as_str),
        Some(dir.path().display().to_string().as_str())
    );
    Ok(())
}

#[tokio::test]
async fn concurrent_image_attachments_are_all_kept() -> Result<()> {
    let store = Arc::new(EntryStore::open_in_memory().await?);
    let id = store.add(DreamDraft::titled("gallery")).await.expect("insert");

    let mut handles = Vec::new();
    for n in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.attach_image(id, &format!("/data/images/dream-{id}-{n}.png")).await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let entry = store.get(id).expect("present");
    assert_eq!(entry.images.len(), 8);
    for n in 0..8 {
        let expected = format!("/data/images/dream-{id}-{n}.png");
        assert!(entry.images.contains(&expected), "missing {expected}");
    }
    Ok(())
}
