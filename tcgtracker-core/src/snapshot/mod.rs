//! Versioned, self-contained serialization of the whole store.
//!
//! The primary data file, every backup and every export share this format.
//! `decode` also accepts older versions and the legacy web-tracker export.

use crate::{validate, CoreError, DeckId, DeckRecord, HistoryEntry, MatchId, MatchRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub mod legacy;

pub const SNAPSHOT_FORMAT: &str = "tcgtracker-snapshot";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub format: String,
    pub version: u32,
    pub taken_at: DateTime<Utc>,
    #[serde(default)]
    pub current_deck: Option<DeckId>,
    #[serde(default)]
    pub decks: Vec<DeckRecord>,
    #[serde(default)]
    pub matches: Vec<MatchRecord>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Malformed(String),
    #[error("snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("unrecognized payload: {0}")]
    UnknownFormat(String),
}

impl From<SnapshotError> for CoreError {
    fn from(e: SnapshotError) -> Self {
        CoreError::Validation(e.to_string())
    }
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            format: SNAPSHOT_FORMAT.to_string(),
            version: SNAPSHOT_VERSION,
            taken_at: Utc::now(),
            current_deck: None,
            decks: Vec::new(),
            matches: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| SnapshotError::Malformed(e.to_string()))?;
        let Some(obj) = value.as_object() else {
            return Err(SnapshotError::UnknownFormat("expected a JSON object".into()));
        };
        let tag = obj.get("format").and_then(|f| f.as_str()).map(str::to_owned);
        let has_records = obj.contains_key("matches") || obj.contains_key("decks");
        let version = obj.get("version").and_then(|v| v.as_u64());

        match tag.as_deref() {
            Some(SNAPSHOT_FORMAT) => {
                let found = version
                    .ok_or_else(|| SnapshotError::Malformed("missing version".into()))?;
                let found = u32::try_from(found)
                    .map_err(|_| SnapshotError::Malformed(format!("version {found} out of range")))?;
                if found > SNAPSHOT_VERSION {
                    return Err(SnapshotError::UnsupportedVersion {
                        found,
                        supported: SNAPSHOT_VERSION,
                    });
                }
                let mut snap: Snapshot = serde_json::from_value(value)
                    .map_err(|e| SnapshotError::Malformed(e.to_string()))?;
                snap.version = SNAPSHOT_VERSION;
                Ok(snap)
            }
            Some(other) => Err(SnapshotError::UnknownFormat(format!("format {other:?}"))),
            None if has_records => legacy::convert(value),
            None => Err(SnapshotError::UnknownFormat("no format tag".into())),
        }
    }

    /// Whether `bytes` already carry the current format tag and version, so
    /// loading them needs no rewrite.
    pub fn is_current(bytes: &[u8]) -> bool {
        #[derive(Deserialize)]
        struct Header {
            format: Option<String>,
            version: Option<u64>,
        }
        serde_json::from_slice::<Header>(bytes).map_or(false, |h| {
            h.format.as_deref() == Some(SNAPSHOT_FORMAT) && h.version == Some(u64::from(SNAPSHOT_VERSION))
        })
    }

    /// Field-level checks plus id uniqueness, without cross-references.
    pub fn validate_records(&self) -> Result<(), CoreError> {
        if self.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            }
            .into());
        }

        let mut deck_ids: HashSet<DeckId> = HashSet::new();
        let mut names: HashSet<String> = HashSet::new();
        for d in &self.decks {
            validate::check_deck(d)?;
            if !deck_ids.insert(d.id) {
                return Err(CoreError::invalid(format!("duplicate deck id {}", d.id)));
            }
            if !names.insert(validate::name_key(&d.name)) {
                return Err(CoreError::invalid(format!("duplicate deck name {:?}", d.name)));
            }
        }

        let mut match_ids: HashSet<MatchId> = HashSet::new();
        for m in &self.matches {
            validate::check_match(m)?;
            if !match_ids.insert(m.id) {
                return Err(CoreError::invalid(format!("duplicate match id {}", m.id)));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.validate_records()?;
        let deck_ids: HashSet<DeckId> = self.decks.iter().map(|d| d.id).collect();
        if let Some(m) = self.matches.iter().find(|m| !deck_ids.contains(&m.deck_id)) {
            return Err(CoreError::invalid(format!(
                "match {} references missing deck {}",
                m.id, m.deck_id
            )));
        }
        if let Some(cur) = self.current_deck {
            if !deck_ids.contains(&cur) {
                return Err(CoreError::invalid(format!("current deck {cur} does not exist")));
            }
        }
        Ok(())
    }

    /// Same records and relationships, ignoring when the snapshot was taken.
    pub fn same_contents(&self, other: &Snapshot) -> bool {
        self.current_deck == other.current_deck
            && self.decks == other.decks
            && self.matches == other.matches
            && self.history == other.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MatchRecord, MatchResult};

    fn one_deck_one_match() -> Snapshot {
        let deck = DeckRecord::new("Fire Deck", vec![]);
        let m = MatchRecord::new(deck.id, "Water Deck", MatchResult::Win);
        let mut s = Snapshot::empty();
        s.decks.push(deck);
        s.matches.push(m);
        s
    }

    #[test]
    fn decode_reads_what_encode_writes() {
        let s = one_deck_one_match();
        let back = Snapshot::decode(&s.encode().unwrap()).unwrap();
        assert!(back.same_contents(&s));
        assert_eq!(back.version, SNAPSHOT_VERSION);
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut s = one_deck_one_match();
        s.version = SNAPSHOT_VERSION + 1;
        let bytes = serde_json::to_vec(&s).unwrap();
        assert!(matches!(
            Snapshot::decode(&bytes),
            Err(SnapshotError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn older_version_is_upgraded() {
        let mut s = one_deck_one_match();
        s.version = 0;
        let bytes = serde_json::to_vec(&s).unwrap();
        let back = Snapshot::decode(&bytes).unwrap();
        assert_eq!(back.version, SNAPSHOT_VERSION);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            Snapshot::decode(b"{\"format\": \"tcgtracker-snapshot\", \"vers"),
            Err(SnapshotError::Malformed(_))
        ));
        assert!(matches!(
            Snapshot::decode(b"[1, 2, 3]"),
            Err(SnapshotError::UnknownFormat(_))
        ));
    }

    #[test]
    fn dangling_deck_reference_fails_validation() {
        let mut s = one_deck_one_match();
        s.decks.clear();
        assert!(s.validate_records().is_ok());
        assert!(matches!(s.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn duplicate_ids_fail_validation() {
        let mut s = one_deck_one_match();
        let dup = s.matches[0].clone();
        s.matches.push(dup);
        assert!(s.validate().is_err());
    }
}
