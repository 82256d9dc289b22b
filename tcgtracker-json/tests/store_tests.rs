use std::fs;
use std::sync::Arc;
use tcgtracker_core::{
    repo::Repository, CardInput, CoreError, ImportMode, MatchPatch, NewDeck, NewMatch, Snapshot,
};
use tcgtracker_json::{JsonStore, StoreConfig};
use tempfile::TempDir;

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path().join("tcgtracker.json"), dir.path().join("backups"))
}

fn fire_deck() -> NewDeck {
    NewDeck::new("Fire Deck", vec![CardInput::new("Charmander", 4)])
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();

    let store = JsonStore::open(config(&dir)).await.unwrap();
    assert!(store.list_decks().await.unwrap().is_empty());
    let deck = store.add_deck(fire_deck()).await.unwrap();
    let m = store
        .add_match(NewMatch::new(deck.id, "Water Deck", "win"))
        .await
        .unwrap();
    store.save().await.unwrap();
    drop(store);

    let reopened = JsonStore::open(config(&dir)).await.unwrap();
    assert_eq!(reopened.list_decks().await.unwrap(), vec![deck]);
    assert_eq!(reopened.list_matches(None).await.unwrap(), vec![m]);
}

#[tokio::test]
async fn missing_file_is_created_and_optionally_seeded() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir).with_sample_data(true);

    let store = JsonStore::open(cfg.clone()).await.unwrap();
    assert!(cfg.data_file.exists());
    assert_eq!(store.list_decks().await.unwrap().len(), 2);

    // Seeding only applies to a brand-new file.
    store
        .delete_deck(store.list_decks().await.unwrap()[0].id)
        .await
        .unwrap();
    let again = JsonStore::open(cfg).await.unwrap();
    assert_eq!(again.list_decks().await.unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_result_leaves_store_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    let deck = store.add_deck(fire_deck()).await.unwrap();
    let before = fs::read(store.data_file()).unwrap();

    let err = store
        .add_match(NewMatch::new(deck.id, "Water Deck", "tie"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert!(store.list_matches(None).await.unwrap().is_empty());
    assert_eq!(fs::read(store.data_file()).unwrap(), before);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    let ghost = uuid::Uuid::new_v4();

    assert!(matches!(store.get_match(ghost).await, Err(CoreError::NotFound { .. })));
    assert!(matches!(
        store.update_match(ghost, MatchPatch::default()).await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(store.delete_deck(ghost).await, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn referenced_deck_delete_is_always_rejected() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    let deck = store.add_deck(fire_deck()).await.unwrap();
    let m = store
        .add_match(NewMatch::new(deck.id, "Water Deck", "loss"))
        .await
        .unwrap();

    for _ in 0..3 {
        let err = store.delete_deck(deck.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)), "{err}");
        assert_eq!(store.list_decks().await.unwrap().len(), 1);
        assert_eq!(store.list_matches(None).await.unwrap().len(), 1);
    }

    store.delete_match(m.id).await.unwrap();
    store.delete_deck(deck.id).await.unwrap();
    assert!(store.list_decks().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_write_keeps_memory_and_disk_consistent() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    store.add_deck(fire_deck()).await.unwrap();

    // A directory at the data path makes the final rename fail.
    fs::remove_file(store.data_file()).unwrap();
    fs::create_dir(store.data_file()).unwrap();

    let err = store
        .add_deck(NewDeck::new("Water Deck", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Io(_)), "{err}");
    assert_eq!(store.list_decks().await.unwrap().len(), 1);
    assert!(store.save().await.is_err());
}

#[tokio::test]
async fn retention_evicts_oldest_backup() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir).with_max_backups(3)).await.unwrap();
    store.add_deck(fire_deck()).await.unwrap();

    let mut made = Vec::new();
    for _ in 0..4 {
        made.push(store.backup().await.unwrap());
    }

    let listed = store.list_backups().await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(!listed.iter().any(|b| b.name == made[0].name));
    assert_eq!(listed[0].name, made[3].name);

    let on_disk = fs::read_dir(dir.path().join("backups")).unwrap().count();
    assert_eq!(on_disk, 3);
    assert!(made.windows(2).all(|w| w[0].name < w[1].name));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_are_not_lost() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonStore::open(config(&dir)).await.unwrap());
    let deck = store.add_deck(fire_deck()).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .add_match(NewMatch::new(deck.id, format!("Opponent {i}"), "win"))
                .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    assert_eq!(store.list_matches(None).await.unwrap().len(), 16);
    let reopened = JsonStore::open(config(&dir)).await.unwrap();
    assert_eq!(reopened.list_matches(None).await.unwrap().len(), 16);
}

#[tokio::test]
async fn corrupt_file_is_reported_then_restored_from_backup() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let store = JsonStore::open(cfg.clone()).await.unwrap();
    let deck = store.add_deck(fire_deck()).await.unwrap();
    store.backup().await.unwrap();
    drop(store);

    fs::write(&cfg.data_file, b"{\"format\": \"tcgtracker-snapshot\", \"decks\": [").unwrap();
    let err = JsonStore::open(cfg.clone()).await.err().unwrap();
    assert!(matches!(err, CoreError::CorruptStore { .. }), "{err}");
    // Nothing was repaired behind the caller's back.
    assert!(fs::read_to_string(&cfg.data_file).unwrap().ends_with('['));

    JsonStore::restore_latest_backup(&cfg).await.unwrap();
    let store = JsonStore::open(cfg).await.unwrap();
    assert_eq!(store.list_decks().await.unwrap(), vec![deck]);

    let aside = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .count();
    assert_eq!(aside, 1);
}

#[tokio::test]
async fn restore_without_backups_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = JsonStore::restore_latest_backup(&config(&dir)).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { kind: "backup", .. }));
}

#[tokio::test]
async fn newer_file_version_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let mut snap = Snapshot::empty();
    snap.version = 99;
    fs::write(&cfg.data_file, snap.encode().unwrap()).unwrap();

    let err = JsonStore::open(cfg).await.err().unwrap();
    assert!(matches!(err, CoreError::CorruptStore { .. }));
}

#[tokio::test]
async fn export_import_reproduces_state() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    let deck = store.add_deck(fire_deck()).await.unwrap();
    store.set_current_deck(Some(deck.id)).await.unwrap();
    store
        .add_match(NewMatch::new(deck.id, "Water Deck", "draw"))
        .await
        .unwrap();
    let exported = store.export_snapshot().await.unwrap();
    let bytes = exported.encode().unwrap();

    let other_dir = TempDir::new().unwrap();
    let other = JsonStore::open(config(&other_dir)).await.unwrap();
    other.add_deck(NewDeck::new("Scratch", vec![])).await.unwrap();
    other
        .import_snapshot(Snapshot::decode(&bytes).unwrap(), ImportMode::Replace)
        .await
        .unwrap();

    let back = other.export_snapshot().await.unwrap();
    assert!(back.same_contents(&exported));
    assert_eq!(other.current_deck().await.unwrap().map(|d| d.id), Some(deck.id));

    // Persisted too.
    let reopened = JsonStore::open(config(&other_dir)).await.unwrap();
    assert!(reopened.export_snapshot().await.unwrap().same_contents(&exported));
}

#[tokio::test]
async fn malformed_import_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    let deck = store.add_deck(fire_deck()).await.unwrap();
    let before = store.export_snapshot().await.unwrap();

    let mut bad = before.clone();
    bad.matches.push(tcgtracker_core::MatchRecord::new(
        uuid::Uuid::new_v4(),
        "Water Deck",
        tcgtracker_core::MatchResult::Win,
    ));
    for mode in [ImportMode::Replace, ImportMode::Merge] {
        let err = store.import_snapshot(bad.clone(), mode).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    assert!(store.export_snapshot().await.unwrap().same_contents(&before));
    assert_eq!(store.list_decks().await.unwrap(), vec![deck]);
}

#[tokio::test]
async fn deck_names_differing_in_accented_case_are_one_name() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    let eclair = store.add_deck(NewDeck::new("Éclair", vec![])).await.unwrap();

    let err = store
        .add_deck(NewDeck::new("éclair", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)), "{err}");

    let found = tcgtracker_core::resolve_deck(&store, "ÉCLAIR").await.unwrap();
    assert_eq!(found.id, eclair.id);
    drop(store);

    let reopened = JsonStore::open(config(&dir)).await.unwrap();
    assert_eq!(reopened.list_decks().await.unwrap(), vec![eclair]);
}

#[tokio::test]
async fn legacy_file_is_upgraded_once_and_ids_stay_put() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    let legacy = r#"{
        "matches": [
            {"date": "2024-03-09", "myDeck": "Fire Deck", "opponentDeck": "Water Deck", "result": "Win"}
        ],
        "decks": {
            "Fire Deck": [{"name": "Charmander", "count": 4, "type": "Pokemon"}]
        }
    }"#;
    fs::write(&cfg.data_file, legacy).unwrap();

    let first = JsonStore::open(cfg.clone()).await.unwrap();
    let decks = first.list_decks().await.unwrap();
    let matches = first.list_matches(None).await.unwrap();
    assert_eq!((decks.len(), matches.len()), (1, 1));
    drop(first);

    // The original bytes are kept as a backup before the rewrite.
    let backups = JsonStore::open(cfg.clone()).await.unwrap();
    let kept = backups.list_backups().await.unwrap();
    assert_eq!(kept.len(), 1);
    let kept_bytes = fs::read(cfg.backup_dir.join(&kept[0].name)).unwrap();
    assert_eq!(kept_bytes, legacy.as_bytes());
    drop(backups);

    let again = JsonStore::open(cfg.clone()).await.unwrap();
    assert_eq!(again.list_decks().await.unwrap(), decks);
    assert_eq!(again.list_matches(None).await.unwrap(), matches);
    assert!(Snapshot::is_current(&fs::read(&cfg.data_file).unwrap()));
}

#[tokio::test]
async fn single_card_changes_persist() {
    let dir = TempDir::new().unwrap();
    let store = JsonStore::open(config(&dir)).await.unwrap();
    let deck = store.add_deck(fire_deck()).await.unwrap();

    store
        .upsert_card(deck.id, CardInput::new("Fire Energy", 8).with_kind("energy"))
        .await
        .unwrap();
    store.remove_card(deck.id, "charmander".into()).await.unwrap();
    let err = store.remove_card(deck.id, "charmander".into()).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    drop(store);

    let reopened = JsonStore::open(config(&dir)).await.unwrap();
    let d = reopened.get_deck(deck.id).await.unwrap();
    assert_eq!(d.cards.len(), 1);
    assert_eq!((d.cards[0].name.as_str(), d.cards[0].quantity), ("Fire Energy", 8));
    assert_eq!(reopened.history().await.unwrap().len(), 3);
}
