use crate::validate::name_key;
use crate::{CardKind, DeckId, DeckRecord, MatchRecord, MatchResult, TurnOrder, WinCondition, DECK_SIZE};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const RECENT_FORM_LEN: usize = 10;

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct Totals {
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl Totals {
    pub fn record(&mut self, r: MatchResult) {
        self.total += 1;
        match r {
            MatchResult::Win => self.wins += 1,
            MatchResult::Loss => self.losses += 1,
            MatchResult::Draw => self.draws += 1,
        }
    }

    /// Fraction of all games won, draws included in the denominator.
    pub fn win_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.wins as f32 / self.total as f32
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct StatsSummary {
    pub totals: Totals,
    pub win_rate: f32,
    pub per_day: BTreeMap<NaiveDate, Totals>,
    pub average_turns: Option<f32>,
    pub fastest_win: Option<u8>,
    pub longest_game: Option<u8>,
    pub unique_decks: usize,
    pub unique_opponents: usize,
}

pub fn summarize(matches: &[MatchRecord]) -> StatsSummary {
    let mut summary = StatsSummary::default();
    let mut turns = Vec::new();
    let mut decks = HashSet::new();
    let mut opponents = HashSet::new();

    for m in matches {
        summary.totals.record(m.result);
        summary.per_day.entry(m.played_at.date_naive()).or_default().record(m.result);
        decks.insert(m.deck_id);
        opponents.insert(name_key(&m.opponent_deck));
        if let Some(t) = m.turns {
            turns.push(t);
            if m.result == MatchResult::Win {
                summary.fastest_win = Some(summary.fastest_win.map_or(t, |f| f.min(t)));
            }
        }
    }

    summary.win_rate = summary.totals.win_rate();
    if !turns.is_empty() {
        summary.average_turns = Some(turns.iter().map(|&t| t as f32).sum::<f32>() / turns.len() as f32);
        summary.longest_game = turns.iter().copied().max();
    }
    summary.unique_decks = decks.len();
    summary.unique_opponents = opponents.len();
    summary
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DeckPerformance {
    pub totals: Totals,
    pub going_first: Totals,
    pub going_second: Totals,
    /// Oldest to newest, at most `RECENT_FORM_LEN` entries.
    pub recent_form: Vec<MatchResult>,
    pub most_faced_opponent: Option<String>,
}

pub fn per_deck_performance(matches: &[MatchRecord]) -> HashMap<DeckId, DeckPerformance> {
    let mut sorted = matches.to_vec();
    sorted.sort_by_key(|m| (m.played_at, m.id));

    let mut map: HashMap<DeckId, DeckPerformance> = HashMap::new();
    // Keyed by normalized label; the first spelling seen is reported.
    let mut faced: HashMap<DeckId, BTreeMap<String, (String, u32)>> = HashMap::new();
    for m in &sorted {
        let p = map.entry(m.deck_id).or_default();
        p.totals.record(m.result);
        match m.went_first {
            Some(TurnOrder::You) => p.going_first.record(m.result),
            Some(TurnOrder::Opponent) => p.going_second.record(m.result),
            None => {}
        }
        p.recent_form.push(m.result);
        if p.recent_form.len() > RECENT_FORM_LEN {
            p.recent_form.remove(0);
        }
        faced
            .entry(m.deck_id)
            .or_default()
            .entry(name_key(&m.opponent_deck))
            .or_insert_with(|| (m.opponent_deck.clone(), 0))
            .1 += 1;
    }

    for (deck_id, counts) in faced {
        if let Some(p) = map.get_mut(&deck_id) {
            // Ties go to the alphabetically first label.
            p.most_faced_opponent = counts
                .into_iter()
                .max_by(|(ka, (_, na)), (kb, (_, nb))| na.cmp(nb).then(kb.cmp(ka)))
                .map(|(_, (label, _))| label);
        }
    }
    map
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FirstPlayerAdvantage {
    pub going_first: Totals,
    pub going_second: Totals,
    /// Win-rate difference, first minus second.
    pub advantage: f32,
}

pub fn first_player_advantage(matches: &[MatchRecord]) -> FirstPlayerAdvantage {
    let mut out = FirstPlayerAdvantage::default();
    for m in matches {
        match m.went_first {
            Some(TurnOrder::You) => out.going_first.record(m.result),
            Some(TurnOrder::Opponent) => out.going_second.record(m.result),
            None => {}
        }
    }
    out.advantage = out.going_first.win_rate() - out.going_second.win_rate();
    out
}

/// Counts of recorded win conditions, split by result.
pub fn win_condition_breakdown(matches: &[MatchRecord]) -> BTreeMap<WinCondition, Totals> {
    let mut map: BTreeMap<WinCondition, Totals> = BTreeMap::new();
    for m in matches {
        if let Some(c) = m.win_condition {
            map.entry(c).or_default().record(m.result);
        }
    }
    map
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Streak {
    pub result: MatchResult,
    pub length: u32,
}

/// Run of identical results ending at the most recent match.
pub fn current_streak(matches: &[MatchRecord]) -> Option<Streak> {
    let mut sorted: Vec<&MatchRecord> = matches.iter().collect();
    sorted.sort_by_key(|m| (m.played_at, m.id));
    let last = sorted.last()?.result;
    let length = sorted.iter().rev().take_while(|m| m.result == last).count() as u32;
    Some(Streak { result: last, length })
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DeckComposition {
    pub unique_cards: usize,
    pub total_cards: u32,
    pub by_kind: BTreeMap<CardKind, u32>,
    pub tournament_legal: bool,
    /// Progress toward a full deck, capped at 100.
    pub completion_pct: f32,
    pub suggestions: Vec<String>,
}

pub fn deck_composition(deck: &DeckRecord) -> DeckComposition {
    let mut by_kind: BTreeMap<CardKind, u32> = BTreeMap::new();
    for c in &deck.cards {
        *by_kind.entry(c.kind).or_default() += c.quantity;
    }
    let total_cards = deck.total_cards();
    let within_limits = deck.cards.iter().all(|c| c.quantity <= c.kind.max_copies());
    let suggestions = suggestions(total_cards, &by_kind);
    DeckComposition {
        unique_cards: deck.cards.len(),
        total_cards,
        by_kind,
        tournament_legal: total_cards == DECK_SIZE && within_limits,
        completion_pct: (total_cards as f32 / DECK_SIZE as f32 * 100.0).min(100.0),
        suggestions,
    }
}

/// Balance hints. A kind is only judged once the deck has some of it.
fn suggestions(total: u32, by_kind: &BTreeMap<CardKind, u32>) -> Vec<String> {
    let mut out = Vec::new();
    if total < DECK_SIZE {
        out.push(format!("Add {} more cards to reach {DECK_SIZE}", DECK_SIZE - total));
    }
    let hints = [
        (CardKind::Pokemon, 10, "Consider adding more Pokemon for consistency"),
        (CardKind::Energy, 12, "Consider adding more Energy cards"),
        (CardKind::Trainer, 20, "Consider adding more Trainer cards"),
    ];
    for (kind, min, hint) in hints {
        if by_kind.get(&kind).is_some_and(|&n| n < min) {
            out.push(hint.to_string());
        }
    }
    out
}
