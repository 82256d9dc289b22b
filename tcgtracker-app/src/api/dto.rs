use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tcgtracker_core::{
    stats::{DeckPerformance, FirstPlayerAdvantage, StatsSummary, Streak, Totals},
    DeckId, WinCondition,
};

#[derive(Serialize)]
pub struct HealthOut {
    pub status: &'static str,
    pub version: &'static str,
    pub decks: usize,
    pub matches: usize,
}

#[derive(Deserialize, Default)]
pub struct MatchQuery {
    pub deck: Option<String>,
    pub opponent: Option<String>,
    pub result: Option<String>,
    /// Free text over opponent, notes and notable cards
    pub q: Option<String>,
    /// Newest N only
    pub limit: Option<usize>,
}

#[derive(Deserialize, Default)]
pub struct StatsQuery {
    pub deck: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ImportQuery {
    pub mode: Option<String>,
}

/// `deck` is an id or name; `null` clears the current deck.
#[derive(Deserialize)]
pub struct CurrentDeckIn {
    pub deck: Option<String>,
}

#[derive(Serialize)]
pub struct StatsOut {
    pub summary: StatsSummary,
    pub first_player_advantage: FirstPlayerAdvantage,
    pub win_conditions: BTreeMap<WinCondition, Totals>,
    pub streak: Option<Streak>,
}

#[derive(Serialize)]
pub struct DeckStatsOut {
    pub deck_id: DeckId,
    pub deck_name: String,
    #[serde(flatten)]
    pub performance: DeckPerformance,
}
