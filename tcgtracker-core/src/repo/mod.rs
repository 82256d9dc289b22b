use crate::{
    validate, CardInput, CoreError, DeckId, DeckPatch, DeckRecord, HistoryEntry, ImportMode, ImportReport, MatchId,
    MatchPatch, MatchRecord, NewDeck, NewMatch, Snapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod memory;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

#[async_trait]
pub trait Repository: Send + Sync {
    // Decks
    async fn add_deck(&self, deck: NewDeck) -> Result<DeckRecord, CoreError>;
    async fn get_deck(&self, id: DeckId) -> Result<DeckRecord, CoreError>;
    async fn list_decks(&self) -> Result<Vec<DeckRecord>, CoreError>;
    async fn update_deck(&self, id: DeckId, patch: DeckPatch) -> Result<DeckRecord, CoreError>;
    async fn delete_deck(&self, id: DeckId) -> Result<DeckRecord, CoreError>;
    /// Adds a card or sets the quantity of one already listed.
    async fn upsert_card(&self, deck_id: DeckId, card: CardInput) -> Result<DeckRecord, CoreError>;
    async fn remove_card(&self, deck_id: DeckId, card_name: String) -> Result<DeckRecord, CoreError>;
    async fn current_deck(&self) -> Result<Option<DeckRecord>, CoreError>;
    async fn set_current_deck(&self, id: Option<DeckId>) -> Result<Option<DeckRecord>, CoreError>;
    async fn history(&self) -> Result<Vec<HistoryEntry>, CoreError>;

    // Matches
    async fn add_match(&self, m: NewMatch) -> Result<MatchRecord, CoreError>;
    async fn get_match(&self, id: MatchId) -> Result<MatchRecord, CoreError>;
    async fn list_matches(&self, deck_id: Option<DeckId>) -> Result<Vec<MatchRecord>, CoreError>;
    async fn update_match(&self, id: MatchId, patch: MatchPatch) -> Result<MatchRecord, CoreError>;
    async fn delete_match(&self, id: MatchId) -> Result<MatchRecord, CoreError>;

    // Durability
    async fn save(&self) -> Result<(), CoreError>;
    async fn backup(&self) -> Result<BackupInfo, CoreError>;
    /// Newest first.
    async fn list_backups(&self) -> Result<Vec<BackupInfo>, CoreError>;
    async fn export_snapshot(&self) -> Result<Snapshot, CoreError>;
    async fn import_snapshot(&self, snapshot: Snapshot, mode: ImportMode) -> Result<ImportReport, CoreError>;
}

/// Finds a deck by id or, failing that, by case-insensitive name.
pub async fn resolve_deck<R: Repository + ?Sized>(repo: &R, sel: &str) -> Result<DeckRecord, CoreError> {
    if let Ok(id) = Uuid::parse_str(sel) {
        if let Ok(d) = repo.get_deck(id).await {
            return Ok(d);
        }
    }
    let key = validate::name_key(sel);
    let decks = repo.list_decks().await?;
    decks
        .into_iter()
        .find(|d| validate::name_key(&d.name) == key)
        .ok_or_else(|| CoreError::not_found("deck", sel))
}

/// Backup names sort chronologically: `<prefix>-<YYYYmmddTHHMMSS.mmmZ>-<seq>`.
pub fn backup_stem(prefix: &str, at: DateTime<Utc>, seq: u32) -> String {
    format!("{prefix}-{}-{seq:04}", at.format("%Y%m%dT%H%M%S%.3fZ"))
}
