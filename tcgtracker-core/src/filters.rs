use crate::validate::name_key;
use crate::{DeckId, MatchRecord, MatchResult};

pub fn filter_by_text(matches: &[MatchRecord], query: &str) -> Vec<MatchRecord> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return matches.to_vec();
    }
    let hit = |s: &Option<String>| s.as_ref().map(|v| v.to_lowercase().contains(&q)).unwrap_or(false);
    matches
        .iter()
        .filter(|m| m.opponent_deck.to_lowercase().contains(&q) || hit(&m.notes) || hit(&m.notable_cards))
        .cloned()
        .collect()
}

pub fn filter_by_deck(matches: &[MatchRecord], deck_id: DeckId) -> Vec<MatchRecord> {
    matches.iter().filter(|m| m.deck_id == deck_id).cloned().collect()
}

pub fn filter_by_opponent(matches: &[MatchRecord], opponent: &str) -> Vec<MatchRecord> {
    let q = name_key(opponent);
    matches
        .iter()
        .filter(|m| name_key(&m.opponent_deck) == q)
        .cloned()
        .collect()
}

pub fn filter_by_result(matches: &[MatchRecord], want: MatchResult) -> Vec<MatchRecord> {
    matches.iter().filter(|m| m.result == want).cloned().collect()
}

/// Newest first.
pub fn recent(matches: &[MatchRecord], limit: usize) -> Vec<MatchRecord> {
    let mut v = matches.to_vec();
    v.sort_by(|a, b| b.played_at.cmp(&a.played_at).then(b.id.cmp(&a.id)));
    v.truncate(limit);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    #[test]
    fn text_matches_opponent_notes_and_cards() {
        let deck = Uuid::new_v4();
        let mut a = MatchRecord::new(deck, "Lost Box", MatchResult::Win);
        a.notable_cards = Some("Comfey, Sableye".into());
        let mut b = MatchRecord::new(deck, "Gardevoir ex", MatchResult::Loss);
        b.notes = Some("bricked on turn 2".into());
        let v = vec![a, b];

        assert_eq!(filter_by_text(&v, "sableye").len(), 1);
        assert_eq!(filter_by_text(&v, "BRICKED").len(), 1);
        assert_eq!(filter_by_text(&v, "gardevoir").len(), 1);
        assert_eq!(filter_by_text(&v, "  ").len(), 2);
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let deck = Uuid::new_v4();
        let now = Utc::now();
        let mut v = Vec::new();
        for i in 0..5 {
            let mut m = MatchRecord::new(deck, format!("Opp {i}"), MatchResult::Win);
            m.played_at = now - Duration::days(i);
            v.push(m);
        }
        let r = recent(&v, 3);
        assert_eq!(r.len(), 3);
        assert_eq!(r[0].opponent_deck, "Opp 0");
        assert_eq!(r[2].opponent_deck, "Opp 2");
    }
}
