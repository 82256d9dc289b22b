//! Field validation for records entering the ledger.
//!
//! Inputs are parsed into typed records here; snapshot records that arrive
//! already typed are re-checked with the `check_*` functions.

use crate::{
    CardEntry, CardInput, CardKind, CoreError, DeckRecord, MatchPatch, MatchRecord, MatchResult,
    NewMatch, TurnOrder, WinCondition, MAX_TURNS,
};
use chrono::Utc;
use std::collections::HashSet;
use uuid::Uuid;

/// Comparison key for deck, card and opponent names.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn deck_name(raw: &str) -> Result<String, CoreError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CoreError::invalid("deck name is required"));
    }
    Ok(name.to_string())
}

pub fn cards(input: &[CardInput]) -> Result<Vec<CardEntry>, CoreError> {
    let cards = input.iter().map(entry).collect::<Result<Vec<_>, CoreError>>()?;
    check_cards(&cards)?;
    Ok(cards)
}

/// A single card, checked on its own.
pub fn card(input: &CardInput) -> Result<CardEntry, CoreError> {
    let c = entry(input)?;
    check_cards(std::slice::from_ref(&c))?;
    Ok(c)
}

fn entry(c: &CardInput) -> Result<CardEntry, CoreError> {
    let kind = match c.kind.as_deref() {
        Some(k) if !k.trim().is_empty() => k.parse::<CardKind>()?,
        _ => CardKind::default(),
    };
    Ok(CardEntry {
        name: c.name.trim().to_string(),
        quantity: c.quantity,
        kind,
    })
}

pub fn check_cards(cards: &[CardEntry]) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for c in cards {
        if c.name.trim().is_empty() {
            return Err(CoreError::invalid("card name is required"));
        }
        if c.quantity == 0 {
            return Err(CoreError::invalid(format!("{}: quantity must be at least 1", c.name)));
        }
        if c.quantity > c.kind.max_copies() {
            return Err(CoreError::invalid(format!(
                "{}: at most {} copies allowed, got {}",
                c.name,
                c.kind.max_copies(),
                c.quantity
            )));
        }
        if !seen.insert(name_key(&c.name)) {
            return Err(CoreError::invalid(format!("{} is listed twice", c.name)));
        }
    }
    Ok(())
}

pub fn check_deck(deck: &DeckRecord) -> Result<(), CoreError> {
    if deck.name.trim().is_empty() {
        return Err(CoreError::invalid(format!("deck {} has no name", deck.id)));
    }
    check_cards(&deck.cards)
}

fn opponent(raw: &str) -> Result<String, CoreError> {
    let label = raw.trim();
    if label.is_empty() {
        return Err(CoreError::invalid("opponent deck is required"));
    }
    Ok(label.to_string())
}

fn turns(t: Option<u8>) -> Result<Option<u8>, CoreError> {
    match t {
        Some(n) if n == 0 || n > MAX_TURNS => Err(CoreError::invalid(format!(
            "turns must be between 1 and {MAX_TURNS}, got {n}"
        ))),
        other => Ok(other),
    }
}

fn text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_opt<T: std::str::FromStr<Err = CoreError>>(raw: Option<&str>) -> Result<Option<T>, CoreError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some),
        None => Ok(None),
    }
}

/// Builds a record from caller input. Deck existence is checked by the ledger.
pub fn new_match(input: &NewMatch) -> Result<MatchRecord, CoreError> {
    Ok(MatchRecord {
        id: Uuid::new_v4(),
        played_at: input.played_at.unwrap_or_else(Utc::now),
        deck_id: input.deck_id,
        opponent_deck: opponent(&input.opponent_deck)?,
        result: input.result.parse::<MatchResult>()?,
        went_first: parse_opt::<TurnOrder>(input.went_first.as_deref())?,
        turns: turns(input.turns)?,
        win_condition: parse_opt::<WinCondition>(input.win_condition.as_deref())?,
        notable_cards: text(input.notable_cards.as_deref()),
        notes: text(input.notes.as_deref()),
    })
}

/// Returns the patched copy; the original is untouched.
pub fn patch_match(current: &MatchRecord, patch: &MatchPatch) -> Result<MatchRecord, CoreError> {
    let mut m = current.clone();
    if let Some(d) = patch.deck_id {
        m.deck_id = d;
    }
    if let Some(o) = &patch.opponent_deck {
        m.opponent_deck = opponent(o)?;
    }
    if let Some(r) = &patch.result {
        m.result = r.parse()?;
    }
    if let Some(at) = patch.played_at {
        m.played_at = at;
    }
    if let Some(w) = &patch.went_first {
        m.went_first = parse_opt(w.as_deref())?;
    }
    if let Some(t) = patch.turns {
        m.turns = turns(t)?;
    }
    if let Some(w) = &patch.win_condition {
        m.win_condition = parse_opt(w.as_deref())?;
    }
    if let Some(n) = &patch.notable_cards {
        m.notable_cards = text(n.as_deref());
    }
    if let Some(n) = &patch.notes {
        m.notes = text(n.as_deref());
    }
    Ok(m)
}

pub fn check_match(m: &MatchRecord) -> Result<(), CoreError> {
    opponent(&m.opponent_deck).map_err(|_| CoreError::invalid(format!("match {} has no opponent deck", m.id)))?;
    turns(m.turns)?;
    Ok(())
}
