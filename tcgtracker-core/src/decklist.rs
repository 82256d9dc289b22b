//! Plain-text deck list, the format players paste into deck builders.

use crate::{CardKind, DeckRecord};
use chrono::NaiveDate;

const SECTIONS: [(CardKind, &str); 3] = [
    (CardKind::Pokemon, "Pokemon"),
    (CardKind::Trainer, "Trainers"),
    (CardKind::Energy, "Energy"),
];

/// `# name` header, one `## section` per kind present, `Nx Card` lines and
/// a closing `Total Cards: N`.
pub fn render(deck: &DeckRecord, exported_on: NaiveDate) -> String {
    let mut lines = vec![
        format!("# {}", deck.name),
        format!("# Exported on {}", exported_on.format("%Y-%m-%d")),
        String::new(),
    ];
    for (kind, title) in SECTIONS {
        let mut cards = deck.cards.iter().filter(|c| c.kind == kind).peekable();
        if cards.peek().is_none() {
            continue;
        }
        lines.push(format!("## {title}"));
        lines.extend(cards.map(|c| format!("{}x {}", c.quantity, c.name)));
        lines.push(String::new());
    }
    lines.push(format!("Total Cards: {}", deck.total_cards()));
    lines.join("\n")
}
