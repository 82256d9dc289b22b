//! Import path for exports produced by the original web tracker.
//!
//! Those payloads key decks by name, reference decks from matches by name,
//! and carry free-form strings for enumerated fields.

use super::{Snapshot, SnapshotError};
use crate::{
    validate, CardEntry, CardKind, DeckChange, DeckId, DeckRecord, HistoryEntry, MatchRecord, MatchResult,
    TurnOrder, WinCondition, MAX_TURNS,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

#[derive(Deserialize)]
struct LegacyExport {
    #[serde(default)]
    matches: Vec<LegacyMatch>,
    #[serde(default)]
    decks: BTreeMap<String, Vec<LegacyCard>>,
    #[serde(default)]
    history: Vec<LegacyHistory>,
    #[serde(default, rename = "currentDeck")]
    current_deck: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyMatch {
    #[serde(default)]
    date: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    my_deck: String,
    #[serde(default)]
    opponent_deck: String,
    #[serde(default)]
    result: String,
    #[serde(default)]
    turns: serde_json::Value,
    #[serde(default)]
    went_first: String,
    #[serde(default)]
    win_condition: String,
    #[serde(default)]
    notable_cards: String,
    #[serde(default)]
    notes: String,
}

#[derive(Deserialize)]
struct LegacyCard {
    #[serde(default)]
    name: String,
    #[serde(default = "one")]
    count: u32,
    #[serde(default, rename = "type")]
    kind: String,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize)]
struct LegacyHistory {
    #[serde(default)]
    date: String,
    #[serde(default)]
    change: String,
    #[serde(default)]
    cards: String,
    #[serde(default)]
    reason: String,
}

pub(crate) fn convert(value: serde_json::Value) -> Result<Snapshot, SnapshotError> {
    let export: LegacyExport =
        serde_json::from_value(value).map_err(|e| SnapshotError::Malformed(e.to_string()))?;

    let mut snap = Snapshot::empty();
    let mut by_name: HashMap<String, DeckId> = HashMap::new();

    for (name, cards) in export.decks {
        let name = name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        let deck = DeckRecord::new(name.clone(), convert_cards(cards));
        by_name.insert(validate::name_key(&name), deck.id);
        snap.decks.push(deck);
    }

    for (i, m) in export.matches.into_iter().enumerate() {
        let deck_name = m.my_deck.trim();
        if deck_name.is_empty() {
            return Err(SnapshotError::Malformed(format!("match {i} has no deck")));
        }
        // Matches may name decks that were deleted before the export.
        let deck_id = match by_name.get(&validate::name_key(deck_name)) {
            Some(id) => *id,
            None => {
                let deck = DeckRecord::new(deck_name, Vec::new());
                by_name.insert(validate::name_key(deck_name), deck.id);
                let id = deck.id;
                snap.decks.push(deck);
                id
            }
        };

        let result = m
            .result
            .parse::<MatchResult>()
            .map_err(|e| SnapshotError::Malformed(format!("match {i}: {e}")))?;
        let played_at = parse_when(&m.timestamp)
            .or_else(|| parse_when(&m.date))
            .ok_or_else(|| SnapshotError::Malformed(format!("match {i} has no usable date")))?;

        snap.matches.push(MatchRecord {
            id: Uuid::new_v4(),
            played_at,
            deck_id,
            opponent_deck: non_empty(&m.opponent_deck).unwrap_or_else(|| "Unknown".to_string()),
            result,
            went_first: m.went_first.parse::<TurnOrder>().ok(),
            turns: parse_turns(&m.turns),
            win_condition: m.win_condition.parse::<WinCondition>().ok(),
            notable_cards: non_empty(&m.notable_cards),
            notes: non_empty(&m.notes),
        });
    }

    for h in export.history {
        let change = match h.change.trim().to_lowercase().as_str() {
            "created" => DeckChange::Created,
            "deleted" => DeckChange::Deleted,
            "added" => DeckChange::CardAdded,
            "removed" => DeckChange::CardRemoved,
            _ => DeckChange::Modified,
        };
        let detail = match (h.cards.trim(), h.reason.trim()) {
            ("", r) => r.to_string(),
            (c, "") => c.to_string(),
            (c, r) => format!("{c} ({r})"),
        };
        snap.history.push(HistoryEntry {
            at: parse_when(&h.date).unwrap_or(snap.taken_at),
            deck_id: None,
            deck_name: String::new(),
            change,
            detail,
        });
    }

    snap.current_deck = export
        .current_deck
        .and_then(|n| by_name.get(&validate::name_key(&n)).copied());

    Ok(snap)
}

// The old tracker clamped counts instead of rejecting them.
fn convert_cards(cards: Vec<LegacyCard>) -> Vec<CardEntry> {
    let mut seen = HashSet::new();
    cards
        .into_iter()
        .filter_map(|c| {
            let name = c.name.trim().to_string();
            if name.is_empty() || !seen.insert(validate::name_key(&name)) {
                return None;
            }
            let kind = c.kind.parse::<CardKind>().unwrap_or_default();
            let quantity = c.count.clamp(1, kind.max_copies());
            Some(CardEntry { name, quantity, kind })
        })
        .collect()
}

fn parse_when(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(|d| {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
        Utc.from_utc_datetime(&d.and_time(noon))
    })
}

fn parse_turns(v: &serde_json::Value) -> Option<u8> {
    let n = match v {
        serde_json::Value::Number(n) => n.as_u64()?,
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    u8::try_from(n).ok().filter(|t| (1..=MAX_TURNS).contains(t))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy_payload() -> serde_json::Value {
        json!({
            "matches": [
                {
                    "date": "2024-03-02",
                    "timestamp": "2024-03-02T18:30:00",
                    "myDeck": "Charizard ex",
                    "opponentDeck": "Lost Box",
                    "result": "Win",
                    "turns": "8",
                    "wentFirst": "Opp",
                    "winCondition": "Prize Cards Taken",
                    "notableCards": "Rare Candy",
                    "notes": ""
                },
                {
                    "date": "2024-03-03",
                    "myDeck": "Retired Deck",
                    "opponentDeck": "Gardevoir ex",
                    "result": "Loss",
                    "turns": ""
                }
            ],
            "decks": {
                "Charizard ex": [
                    {"name": "Charizard ex", "count": 3, "type": "Pokemon"},
                    {"name": "Fire Energy", "count": 10, "type": "Energy"},
                    {"name": "Ultra Ball", "count": 9, "type": "Trainer"}
                ]
            },
            "history": [
                {"date": "2024-03-01", "change": "Created", "cards": "New deck with 3 cards", "reason": "Created deck: Charizard ex"}
            ],
            "currentDeck": "Charizard ex",
            "version": "2.1.0"
        })
    }

    #[test]
    fn converts_legacy_export() {
        let snap = convert(legacy_payload()).unwrap();
        snap.validate().unwrap();

        assert_eq!(snap.decks.len(), 2);
        assert_eq!(snap.matches.len(), 2);
        assert_eq!(snap.history.len(), 1);

        let charizard = snap.decks.iter().find(|d| d.name == "Charizard ex").unwrap();
        assert_eq!(snap.current_deck, Some(charizard.id));
        let ultra = charizard.cards.iter().find(|c| c.name == "Ultra Ball").unwrap();
        assert_eq!(ultra.quantity, 4);
        assert_eq!(ultra.kind, CardKind::Trainer);

        let first = &snap.matches[0];
        assert_eq!(first.deck_id, charizard.id);
        assert_eq!(first.result, MatchResult::Win);
        assert_eq!(first.turns, Some(8));
        assert_eq!(first.went_first, Some(TurnOrder::Opponent));
        assert_eq!(first.win_condition, Some(WinCondition::PrizeCards));
        assert_eq!(first.notes, None);

        let retired = snap.decks.iter().find(|d| d.name == "Retired Deck").unwrap();
        assert!(retired.cards.is_empty());
        assert_eq!(snap.matches[1].deck_id, retired.id);
        assert_eq!(snap.matches[1].turns, None);
    }

    #[test]
    fn decode_routes_untagged_payloads_here() {
        let bytes = serde_json::to_vec(&legacy_payload()).unwrap();
        let snap = Snapshot::decode(&bytes).unwrap();
        assert_eq!(snap.matches.len(), 2);
    }

    #[test]
    fn unknown_legacy_result_is_rejected() {
        let payload = json!({
            "matches": [{"date": "2024-03-02", "myDeck": "A", "opponentDeck": "B", "result": "Tie"}]
        });
        assert!(matches!(convert(payload), Err(SnapshotError::Malformed(_))));
    }
}
