use chrono::{Duration, Utc};
use tcgtracker_core::{
    current_streak, deck_composition, filter_by_opponent, filter_by_result, filter_by_text,
    per_deck_performance, recent, summarize, CardInput, DeckRecord, ImportMode, Ledger, MatchResult,
    NewDeck, NewMatch, Snapshot,
};

fn season() -> (Ledger, DeckRecord, DeckRecord) {
    let mut l = Ledger::new();
    let fire = l
        .add_deck(NewDeck::new("Fire Deck", vec![CardInput::new("Charmander", 4)]))
        .unwrap();
    let water = l.add_deck(NewDeck::new("Water Deck", vec![])).unwrap();

    let now = Utc::now();
    let games = [
        (fire.id, "Lost Box", "win", Some("you"), Some(7), 5),
        (fire.id, "Gardevoir ex", "loss", Some("opponent"), Some(11), 4),
        (water.id, "Lost Box", "win", None, None, 3),
        (fire.id, "lost box", "win", Some("you"), Some(6), 2),
        (fire.id, "Miraidon ex", "win", Some("opponent"), Some(9), 1),
    ];
    for (deck, opp, result, first, turns, days_ago) in games {
        let mut m = NewMatch::new(deck, opp, result);
        m.played_at = Some(now - Duration::days(days_ago));
        m.went_first = first.map(str::to_string);
        m.turns = turns;
        if opp == "Miraidon ex" {
            m.notes = Some("opponent bricked".into());
        }
        l.add_match(m).unwrap();
    }
    (l, fire, water)
}

#[test]
fn filters_over_a_season() {
    let (l, fire, _) = season();
    let all = l.matches(None);
    assert_eq!(all.len(), 5);
    assert_eq!(l.matches(Some(fire.id)).len(), 4);

    assert_eq!(filter_by_opponent(&all, "LOST BOX").len(), 3);
    assert_eq!(filter_by_result(&all, MatchResult::Loss).len(), 1);
    assert_eq!(filter_by_text(&all, "bricked")[0].opponent_deck, "Miraidon ex");

    let last_two = recent(&all, 2);
    assert_eq!(last_two[0].opponent_deck, "Miraidon ex");
    assert_eq!(last_two[1].opponent_deck, "lost box");
}

#[test]
fn stats_over_a_season() {
    let (l, fire, water) = season();
    let all = l.matches(None);

    let s = summarize(&all);
    assert_eq!((s.totals.wins, s.totals.losses, s.totals.draws), (4, 1, 0));
    assert!((s.win_rate - 0.8).abs() < 1e-6);
    assert_eq!(s.fastest_win, Some(6));
    assert_eq!(s.longest_game, Some(11));

    let streak = current_streak(&all).unwrap();
    assert_eq!((streak.result, streak.length), (MatchResult::Win, 3));

    let perf = per_deck_performance(&all);
    assert_eq!(perf[&fire.id].totals.total, 4);
    assert_eq!(perf[&fire.id].going_first.wins, 2);
    assert_eq!(perf[&water.id].totals.wins, 1);

    let comp = deck_composition(&fire);
    assert_eq!((comp.unique_cards, comp.total_cards), (1, 4));
    assert!(!comp.tournament_legal);
}

#[test]
fn snapshot_round_trip_through_bytes() {
    let (l, fire, _) = season();
    let mut l = l;
    l.set_current_deck(Some(fire.id)).unwrap();
    let exported = l.snapshot();

    let bytes = exported.encode().unwrap();
    let mut fresh = Ledger::new();
    fresh.add_deck(NewDeck::new("Leftover", vec![])).unwrap();
    fresh
        .import(Snapshot::decode(&bytes).unwrap(), ImportMode::Replace)
        .unwrap();

    assert!(fresh.snapshot().same_contents(&exported));
    assert_eq!(fresh.current_deck().map(|d| d.id), Some(fire.id));
}
