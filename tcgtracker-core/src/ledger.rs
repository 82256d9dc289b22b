//! The canonical in-memory record set and every rule for changing it.
//!
//! Each mutating method validates completely before touching state, so an
//! `Err` always leaves the ledger as it was.

use crate::{
    validate, CardInput, CoreError, DeckChange, DeckId, DeckPatch, DeckRecord, HistoryEntry, MatchId,
    MatchPatch, MatchRecord, NewDeck, NewMatch, Snapshot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Discard current records and take the snapshot's.
    #[default]
    Replace,
    /// Upsert snapshot records by id into the current set.
    Merge,
}

impl FromStr for ImportMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(ImportMode::Replace),
            "merge" => Ok(ImportMode::Merge),
            other => Err(CoreError::invalid(format!("import mode must be replace or merge (got {other:?})"))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportReport {
    pub mode: ImportMode,
    pub decks: usize,
    pub matches: usize,
    pub history: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Ledger {
    decks: HashMap<DeckId, DeckRecord>,
    matches: HashMap<MatchId, MatchRecord>,
    history: Vec<HistoryEntry>,
    current_deck: Option<DeckId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, CoreError> {
        snapshot.validate()?;
        Ok(Self {
            decks: snapshot.decks.into_iter().map(|d| (d.id, d)).collect(),
            matches: snapshot.matches.into_iter().map(|m| (m.id, m)).collect(),
            history: snapshot.history,
            current_deck: snapshot.current_deck,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut snap = Snapshot::empty();
        snap.current_deck = self.current_deck;
        snap.decks = self.decks();
        snap.matches = self.matches(None);
        snap.history = self.history.clone();
        snap
    }

    // ===== Reads =====

    pub fn deck_count(&self) -> usize {
        self.decks.len()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn decks(&self) -> Vec<DeckRecord> {
        let mut v: Vec<DeckRecord> = self.decks.values().cloned().collect();
        v.sort_by_key(|d| (d.created_at, d.id));
        v
    }

    pub fn deck(&self, id: DeckId) -> Result<&DeckRecord, CoreError> {
        self.decks.get(&id).ok_or_else(|| CoreError::not_found("deck", id))
    }

    pub fn matches(&self, deck_id: Option<DeckId>) -> Vec<MatchRecord> {
        let mut v: Vec<MatchRecord> = self
            .matches
            .values()
            .filter(|m| deck_id.map_or(true, |d| m.deck_id == d))
            .cloned()
            .collect();
        v.sort_by_key(|m| (m.played_at, m.id));
        v
    }

    pub fn get_match(&self, id: MatchId) -> Result<&MatchRecord, CoreError> {
        self.matches.get(&id).ok_or_else(|| CoreError::not_found("match", id))
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn current_deck(&self) -> Option<&DeckRecord> {
        self.current_deck.and_then(|id| self.decks.get(&id))
    }

    // ===== Decks =====

    fn ensure_unique_name(&self, name: &str, except: Option<DeckId>) -> Result<(), CoreError> {
        let key = validate::name_key(name);
        let taken = self
            .decks
            .values()
            .any(|d| Some(d.id) != except && validate::name_key(&d.name) == key);
        if taken {
            return Err(CoreError::invalid(format!("deck name {name:?} already exists")));
        }
        Ok(())
    }

    pub fn add_deck(&mut self, input: NewDeck) -> Result<DeckRecord, CoreError> {
        let name = validate::deck_name(&input.name)?;
        let cards = validate::cards(&input.cards)?;
        self.ensure_unique_name(&name, None)?;

        let deck = DeckRecord::new(name, cards);
        self.history.push(HistoryEntry::new(
            &deck,
            DeckChange::Created,
            format!("new deck with {} cards", deck.total_cards()),
        ));
        self.decks.insert(deck.id, deck.clone());
        Ok(deck)
    }

    pub fn update_deck(&mut self, id: DeckId, patch: DeckPatch) -> Result<DeckRecord, CoreError> {
        let current = self.deck(id)?;
        let mut next = current.clone();
        if let Some(name) = &patch.name {
            next.name = validate::deck_name(name)?;
            self.ensure_unique_name(&next.name, Some(id))?;
        }
        if let Some(cards) = &patch.cards {
            next.cards = validate::cards(cards)?;
        }
        next.updated_at = Utc::now();

        let detail = if current.name != next.name {
            format!("renamed from {:?}", current.name)
        } else {
            format!("{} -> {} cards", current.total_cards(), next.total_cards())
        };
        self.history.push(HistoryEntry::new(&next, DeckChange::Modified, detail));
        self.decks.insert(id, next.clone());
        Ok(next)
    }

    /// Decks still referenced by matches cannot be deleted.
    pub fn delete_deck(&mut self, id: DeckId) -> Result<DeckRecord, CoreError> {
        let deck = self.deck(id)?;
        let refs = self.matches.values().filter(|m| m.deck_id == id).count();
        if refs > 0 {
            return Err(CoreError::invalid(format!(
                "deck {:?} is referenced by {refs} match(es); delete or reassign them first",
                deck.name
            )));
        }

        let deck = self.decks.remove(&id).ok_or_else(|| CoreError::not_found("deck", id))?;
        if self.current_deck == Some(id) {
            self.current_deck = None;
        }
        self.history.push(HistoryEntry::new(
            &deck,
            DeckChange::Deleted,
            format!("removed deck with {} cards", deck.total_cards()),
        ));
        Ok(deck)
    }

    /// Sets a card's quantity, adding the card when the deck doesn't list it.
    /// Without an explicit kind, an existing card keeps its kind.
    pub fn upsert_card(&mut self, id: DeckId, card: CardInput) -> Result<DeckRecord, CoreError> {
        let mut next = self.deck(id)?.clone();
        let mut entry = validate::card(&card)?;
        let key = validate::name_key(&entry.name);

        let (change, detail) = match next.cards.iter_mut().find(|c| validate::name_key(&c.name) == key) {
            Some(existing) => {
                let detail = format!("{} ({}→{})", existing.name, existing.quantity, entry.quantity);
                if card.kind.as_deref().map_or(true, |k| k.trim().is_empty()) {
                    entry.kind = existing.kind;
                }
                existing.quantity = entry.quantity;
                existing.kind = entry.kind;
                (DeckChange::Modified, detail)
            }
            None => {
                let detail = format!("{} ({})", entry.name, entry.quantity);
                next.cards.push(entry);
                (DeckChange::CardAdded, detail)
            }
        };
        validate::check_cards(&next.cards)?;
        next.updated_at = Utc::now();

        self.history.push(HistoryEntry::new(&next, change, detail));
        self.decks.insert(id, next.clone());
        Ok(next)
    }

    pub fn remove_card(&mut self, id: DeckId, card_name: &str) -> Result<DeckRecord, CoreError> {
        let mut next = self.deck(id)?.clone();
        let key = validate::name_key(card_name);
        let pos = next
            .cards
            .iter()
            .position(|c| validate::name_key(&c.name) == key)
            .ok_or_else(|| CoreError::not_found("card", card_name.trim()))?;
        let removed = next.cards.remove(pos);
        next.updated_at = Utc::now();

        self.history.push(HistoryEntry::new(
            &next,
            DeckChange::CardRemoved,
            format!("{} ({})", removed.name, removed.quantity),
        ));
        self.decks.insert(id, next.clone());
        Ok(next)
    }

    pub fn set_current_deck(&mut self, id: Option<DeckId>) -> Result<Option<DeckRecord>, CoreError> {
        let deck = match id {
            Some(id) => Some(self.deck(id)?.clone()),
            None => None,
        };
        self.current_deck = id;
        Ok(deck)
    }

    // ===== Matches =====

    pub fn add_match(&mut self, input: NewMatch) -> Result<MatchRecord, CoreError> {
        let m = validate::new_match(&input)?;
        self.require_deck(m.deck_id)?;
        self.matches.insert(m.id, m.clone());
        Ok(m)
    }

    pub fn update_match(&mut self, id: MatchId, patch: MatchPatch) -> Result<MatchRecord, CoreError> {
        let next = validate::patch_match(self.get_match(id)?, &patch)?;
        self.require_deck(next.deck_id)?;
        self.matches.insert(id, next.clone());
        Ok(next)
    }

    pub fn delete_match(&mut self, id: MatchId) -> Result<MatchRecord, CoreError> {
        self.matches.remove(&id).ok_or_else(|| CoreError::not_found("match", id))
    }

    fn require_deck(&self, id: DeckId) -> Result<(), CoreError> {
        if !self.decks.contains_key(&id) {
            return Err(CoreError::invalid(format!("deck {id} does not exist")));
        }
        Ok(())
    }

    // ===== Snapshots =====

    pub fn import(&mut self, snapshot: Snapshot, mode: ImportMode) -> Result<ImportReport, CoreError> {
        let mut report = ImportReport {
            mode,
            decks: snapshot.decks.len(),
            matches: snapshot.matches.len(),
            history: snapshot.history.len(),
        };

        let next = match mode {
            ImportMode::Replace => Ledger::from_snapshot(snapshot)?,
            ImportMode::Merge => {
                snapshot.validate_records()?;
                let mut draft = self.clone();
                for d in snapshot.decks {
                    draft.decks.insert(d.id, d);
                }
                for m in snapshot.matches {
                    draft.matches.insert(m.id, m);
                }
                // Entries already on record are skipped so re-merging an export is a no-op.
                let mut seen: HashSet<(DateTime<Utc>, Option<DeckId>, DeckChange, String)> = draft
                    .history
                    .iter()
                    .map(history_key)
                    .collect();
                let before = draft.history.len();
                for h in snapshot.history {
                    if seen.insert(history_key(&h)) {
                        draft.history.push(h);
                    }
                }
                report.history = draft.history.len() - before;
                if snapshot.current_deck.is_some() {
                    draft.current_deck = snapshot.current_deck;
                }
                draft.history.push(HistoryEntry {
                    at: Utc::now(),
                    deck_id: None,
                    deck_name: String::new(),
                    change: DeckChange::Imported,
                    detail: format!("merged {} decks and {} matches", report.decks, report.matches),
                });
                // The merged whole must hold together, not just the incoming part.
                draft.snapshot().validate()?;
                draft
            }
        };

        *self = next;
        Ok(report)
    }
}

fn history_key(h: &HistoryEntry) -> (DateTime<Utc>, Option<DeckId>, DeckChange, String) {
    (h.at, h.deck_id, h.change, h.detail.clone())
}
