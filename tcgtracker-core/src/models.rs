use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

pub type DeckId = Uuid;
pub type MatchId = Uuid;

pub const MAX_TURNS: u8 = 50;
pub const DECK_SIZE: u32 = 60;
pub const MAX_COPIES: u32 = 4;
pub const MAX_ENERGY_COPIES: u32 = 30;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Win,
    Loss,
    Draw,
}

impl MatchResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchResult::Win => "win",
            MatchResult::Loss => "loss",
            MatchResult::Draw => "draw",
        }
    }
}

impl FromStr for MatchResult {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" | "w" => Ok(MatchResult::Win),
            "loss" | "l" => Ok(MatchResult::Loss),
            "draw" | "d" => Ok(MatchResult::Draw),
            other => Err(CoreError::invalid(format!(
                "result must be one of win, loss, draw (got {other:?})"
            ))),
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who took the first turn.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TurnOrder {
    You,
    Opponent,
}

impl TurnOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOrder::You => "you",
            TurnOrder::Opponent => "opponent",
        }
    }
}

impl FromStr for TurnOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "you" | "me" | "first" => Ok(TurnOrder::You),
            "opp" | "opponent" | "second" => Ok(TurnOrder::Opponent),
            other => Err(CoreError::invalid(format!(
                "went_first must be you or opponent (got {other:?})"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum WinCondition {
    PrizeCards,
    NoBenchedPokemon,
    DeckOut,
    Concession,
}

impl WinCondition {
    pub const ALL: [WinCondition; 4] = [
        WinCondition::PrizeCards,
        WinCondition::NoBenchedPokemon,
        WinCondition::DeckOut,
        WinCondition::Concession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WinCondition::PrizeCards => "prize_cards",
            WinCondition::NoBenchedPokemon => "no_benched_pokemon",
            WinCondition::DeckOut => "deck_out",
            WinCondition::Concession => "concession",
        }
    }
}

impl FromStr for WinCondition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "prize_cards" | "prize_cards_taken" | "prizes" => Ok(WinCondition::PrizeCards),
            "no_benched_pokemon" | "no_bench" => Ok(WinCondition::NoBenchedPokemon),
            "deck_out" | "deck_milled" | "milled" => Ok(WinCondition::DeckOut),
            "concession" | "conceded" | "conceded_first_turn" => Ok(WinCondition::Concession),
            _ => Err(CoreError::invalid(format!("unknown win condition {s:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    #[default]
    Pokemon,
    Trainer,
    Energy,
}

impl CardKind {
    pub fn max_copies(&self) -> u32 {
        match self {
            CardKind::Energy => MAX_ENERGY_COPIES,
            _ => MAX_COPIES,
        }
    }
}

impl FromStr for CardKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pokemon" | "pokémon" => Ok(CardKind::Pokemon),
            "trainer" => Ok(CardKind::Trainer),
            "energy" => Ok(CardKind::Energy),
            other => Err(CoreError::invalid(format!(
                "card kind must be pokemon, trainer or energy (got {other:?})"
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardEntry {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub kind: CardKind,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeckRecord {
    pub id: DeckId,
    pub name: String,
    pub cards: Vec<CardEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeckRecord {
    pub fn new(name: impl Into<String>, cards: Vec<CardEntry>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            cards,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_cards(&self) -> u32 {
        self.cards.iter().map(|c| c.quantity).sum()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRecord {
    pub id: MatchId,
    pub played_at: DateTime<Utc>,
    pub deck_id: DeckId,
    pub opponent_deck: String,
    pub result: MatchResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub went_first: Option<TurnOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turns: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_condition: Option<WinCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notable_cards: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl MatchRecord {
    pub fn new(deck_id: DeckId, opponent_deck: impl Into<String>, result: MatchResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            played_at: Utc::now(),
            deck_id,
            opponent_deck: opponent_deck.into(),
            result,
            went_first: None,
            turns: None,
            win_condition: None,
            notable_cards: None,
            notes: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeckChange {
    Created,
    Modified,
    Deleted,
    CardAdded,
    CardRemoved,
    Imported,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck_id: Option<DeckId>,
    pub deck_name: String,
    pub change: DeckChange,
    #[serde(default)]
    pub detail: String,
}

impl HistoryEntry {
    pub fn new(deck: &DeckRecord, change: DeckChange, detail: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            deck_id: Some(deck.id),
            deck_name: deck.name.clone(),
            change,
            detail: detail.into(),
        }
    }
}

// ===== Inputs =====
//
// Enumerated fields arrive as text and are parsed during validation, so a
// bad value is a `CoreError::Validation` rather than a decode failure.

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardInput {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub kind: Option<String>,
}

impl CardInput {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewDeck {
    pub name: String,
    #[serde(default)]
    pub cards: Vec<CardInput>,
}

impl NewDeck {
    pub fn new(name: impl Into<String>, cards: Vec<CardInput>) -> Self {
        Self {
            name: name.into(),
            cards,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeckPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cards: Option<Vec<CardInput>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewMatch {
    pub deck_id: DeckId,
    pub opponent_deck: String,
    pub result: String,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub went_first: Option<String>,
    #[serde(default)]
    pub turns: Option<u8>,
    #[serde(default)]
    pub win_condition: Option<String>,
    #[serde(default)]
    pub notable_cards: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewMatch {
    pub fn new(deck_id: DeckId, opponent_deck: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            deck_id,
            opponent_deck: opponent_deck.into(),
            result: result.into(),
            ..Default::default()
        }
    }
}

/// Partial match update. Outer `None` leaves a field alone; for optional
/// fields `Some(None)` clears it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MatchPatch {
    #[serde(default)]
    pub deck_id: Option<DeckId>,
    #[serde(default)]
    pub opponent_deck: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub played_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub went_first: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub turns: Option<Option<u8>>,
    #[serde(default, deserialize_with = "double_option")]
    pub win_condition: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notable_cards: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

// absent -> None, null -> Some(None), value -> Some(Some(v))
fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}
