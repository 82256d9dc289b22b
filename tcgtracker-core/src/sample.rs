use crate::{CardInput, NewDeck};

/// Starter decks written into a brand-new store when seeding is enabled.
pub fn sample_decks() -> Vec<NewDeck> {
    vec![
        NewDeck::new(
            "Pikachu ex",
            vec![
                CardInput::new("Pikachu ex", 3),
                CardInput::new("Raichu", 2),
                CardInput::new("Professor's Research", 4).with_kind("trainer"),
                CardInput::new("Ultra Ball", 4).with_kind("trainer"),
                CardInput::new("Electric Energy", 12).with_kind("energy"),
            ],
        ),
        NewDeck::new(
            "Charizard ex",
            vec![
                CardInput::new("Charizard ex", 3),
                CardInput::new("Charmander", 4),
                CardInput::new("Arcanine ex", 2),
                CardInput::new("Professor's Research", 4).with_kind("trainer"),
                CardInput::new("Fire Energy", 10).with_kind("energy"),
            ],
        ),
    ]
}
