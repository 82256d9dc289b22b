use crate::{
    backup_stem, BackupInfo, CardInput, CoreError, DeckId, DeckPatch, DeckRecord, HistoryEntry, ImportMode,
    ImportReport, Ledger, MatchId, MatchPatch, MatchRecord, NewDeck, NewMatch, Snapshot,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Non-durable store over a [`Ledger`]. Backups are retained snapshots.
pub struct MemoryRepo {
    state: Mutex<Ledger>,
    backups: Mutex<VecDeque<(BackupInfo, Snapshot)>>,
    max_backups: usize,
}

impl Default for MemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::with_ledger(Ledger::new(), 10)
    }

    pub fn with_ledger(ledger: Ledger, max_backups: usize) -> Self {
        Self {
            state: Mutex::new(ledger),
            backups: Mutex::new(VecDeque::new()),
            max_backups: max_backups.max(1),
        }
    }

    /// Snapshot held by a backup taken earlier.
    pub fn backup_snapshot(&self, name: &str) -> Option<Snapshot> {
        self.backups
            .lock()
            .iter()
            .find(|(info, _)| info.name == name)
            .map(|(_, s)| s.clone())
    }
}

#[async_trait]
impl crate::repo::Repository for MemoryRepo {
    async fn add_deck(&self, deck: NewDeck) -> Result<DeckRecord, CoreError> {
        self.state.lock().add_deck(deck)
    }

    async fn get_deck(&self, id: DeckId) -> Result<DeckRecord, CoreError> {
        self.state.lock().deck(id).cloned()
    }

    async fn list_decks(&self) -> Result<Vec<DeckRecord>, CoreError> {
        Ok(self.state.lock().decks())
    }

    async fn update_deck(&self, id: DeckId, patch: DeckPatch) -> Result<DeckRecord, CoreError> {
        self.state.lock().update_deck(id, patch)
    }

    async fn delete_deck(&self, id: DeckId) -> Result<DeckRecord, CoreError> {
        self.state.lock().delete_deck(id)
    }

    async fn upsert_card(&self, deck_id: DeckId, card: CardInput) -> Result<DeckRecord, CoreError> {
        self.state.lock().upsert_card(deck_id, card)
    }

    async fn remove_card(&self, deck_id: DeckId, card_name: String) -> Result<DeckRecord, CoreError> {
        self.state.lock().remove_card(deck_id, &card_name)
    }

    async fn current_deck(&self) -> Result<Option<DeckRecord>, CoreError> {
        Ok(self.state.lock().current_deck().cloned())
    }

    async fn set_current_deck(&self, id: Option<DeckId>) -> Result<Option<DeckRecord>, CoreError> {
        self.state.lock().set_current_deck(id)
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, CoreError> {
        Ok(self.state.lock().history().to_vec())
    }

    async fn add_match(&self, m: NewMatch) -> Result<MatchRecord, CoreError> {
        self.state.lock().add_match(m)
    }

    async fn get_match(&self, id: MatchId) -> Result<MatchRecord, CoreError> {
        self.state.lock().get_match(id).cloned()
    }

    async fn list_matches(&self, deck_id: Option<DeckId>) -> Result<Vec<MatchRecord>, CoreError> {
        Ok(self.state.lock().matches(deck_id))
    }

    async fn update_match(&self, id: MatchId, patch: MatchPatch) -> Result<MatchRecord, CoreError> {
        self.state.lock().update_match(id, patch)
    }

    async fn delete_match(&self, id: MatchId) -> Result<MatchRecord, CoreError> {
        self.state.lock().delete_match(id)
    }

    async fn save(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn backup(&self) -> Result<BackupInfo, CoreError> {
        let snapshot = self.state.lock().snapshot();
        let size_bytes = snapshot.encode()?.len() as u64;
        let now = Utc::now();

        let mut backups = self.backups.lock();
        let mut seq = 0;
        let mut name = backup_stem("memory", now, seq);
        while backups.iter().any(|(b, _)| b.name == name) {
            seq += 1;
            name = backup_stem("memory", now, seq);
        }
        let info = BackupInfo {
            name,
            created_at: now,
            size_bytes,
        };
        backups.push_back((info.clone(), snapshot));
        while backups.len() > self.max_backups {
            backups.pop_front();
        }
        Ok(info)
    }

    async fn list_backups(&self) -> Result<Vec<BackupInfo>, CoreError> {
        Ok(self.backups.lock().iter().rev().map(|(b, _)| b.clone()).collect())
    }

    async fn export_snapshot(&self) -> Result<Snapshot, CoreError> {
        Ok(self.state.lock().snapshot())
    }

    async fn import_snapshot(&self, snapshot: Snapshot, mode: ImportMode) -> Result<ImportReport, CoreError> {
        self.state.lock().import(snapshot, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardInput, Repository};

    #[tokio::test]
    async fn backups_keep_only_newest() {
        let repo = MemoryRepo::with_ledger(Ledger::new(), 2);
        let first = repo.backup().await.unwrap();
        repo.add_deck(NewDeck::new("Fire Deck", vec![CardInput::new("Charmander", 4)]))
            .await
            .unwrap();
        let second = repo.backup().await.unwrap();
        let third = repo.backup().await.unwrap();

        let names: Vec<String> = repo.list_backups().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec![third.name.clone(), second.name.clone()]);
        assert!(repo.backup_snapshot(&first.name).is_none());
        assert_eq!(repo.backup_snapshot(&second.name).unwrap().decks.len(), 1);
    }

    #[tokio::test]
    async fn delete_match_returns_removed_record() {
        let repo = MemoryRepo::new();
        let d = repo.add_deck(NewDeck::new("Fire Deck", vec![])).await.unwrap();
        let m = repo.add_match(NewMatch::new(d.id, "Water Deck", "win")).await.unwrap();
        let gone = repo.delete_match(m.id).await.unwrap();
        assert_eq!(gone, m);
        assert!(matches!(repo.get_match(m.id).await, Err(CoreError::NotFound { .. })));
    }
}
