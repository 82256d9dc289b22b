//! CSV exchange for match records.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use tcgtracker_core::{DeckId, MatchRecord, NewMatch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvMatch {
    pub played_at: DateTime<Utc>,
    pub deck: String,
    pub opponent_deck: String,
    pub result: String,
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

impl CsvMatch {
    pub fn from_record(m: &MatchRecord, deck_name: &str) -> Self {
        Self {
            played_at: m.played_at,
            deck: deck_name.to_string(),
            opponent_deck: m.opponent_deck.clone(),
            result: m.result.as_str().to_string(),
            went_first: m.went_first.map(|t| t.as_str().to_string()),
            turns: m.turns,
            win_condition: m.win_condition.map(|c| c.as_str().to_string()),
            notable_cards: m.notable_cards.clone(),
            notes: m.notes.clone(),
        }
    }

    pub fn into_new_match(self, deck_id: DeckId) -> NewMatch {
        NewMatch {
            deck_id,
            opponent_deck: self.opponent_deck,
            result: self.result,
            played_at: Some(self.played_at),
            went_first: self.went_first,
            turns: self.turns,
            win_condition: self.win_condition,
            notable_cards: self.notable_cards,
            notes: self.notes,
        }
    }
}

pub fn write_matches<W: Write>(out: W, matches: &[MatchRecord], deck_names: &HashMap<DeckId, String>) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    for m in matches {
        let name = deck_names
            .get(&m.deck_id)
            .cloned()
            .unwrap_or_else(|| m.deck_id.to_string());
        wtr.serialize(CsvMatch::from_record(m, &name))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_matches<R: Read>(input: R) -> Result<Vec<CsvMatch>> {
    let mut rdr = csv::Reader::from_reader(input);
    let mut rows = Vec::new();
    for (i, row) in rdr.deserialize().enumerate() {
        // Header is line 1.
        let row: CsvMatch = row.with_context(|| format!("bad CSV row at line {}", i + 2))?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcgtracker_core::{MatchResult, TurnOrder, WinCondition};
    use uuid::Uuid;

    #[test]
    fn writes_header_and_reads_back() {
        let deck = Uuid::new_v4();
        let mut m = MatchRecord::new(deck, "Water Deck", MatchResult::Win);
        m.went_first = Some(TurnOrder::You);
        m.turns = Some(7);
        m.win_condition = Some(WinCondition::PrizeCards);
        m.notes = Some("close, game".into());
        let names = HashMap::from([(deck, "Fire Deck".to_string())]);

        let mut buf = Vec::new();
        write_matches(&mut buf, &[m.clone()], &names).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with(
            "played_at,deck,opponent_deck,result,went_first,turns,win_condition,notable_cards,notes"
        ));

        let rows = read_matches(buf.as_slice()).unwrap();
        assert_eq!(rows, vec![CsvMatch::from_record(&m, "Fire Deck")]);
        assert_eq!(rows[0].notes.as_deref(), Some("close, game"));
        assert_eq!(rows[0].notable_cards, None);
    }

    #[test]
    fn reports_line_of_bad_row() {
        let input = "played_at,deck,opponent_deck,result,went_first,turns,win_condition,notable_cards,notes\n\
                     yesterday,Fire Deck,Water Deck,win,,,,,\n";
        let err = read_matches(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}
