use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Profile;

#[derive(Debug, Clone, ValueEnum)]
pub enum StoreKind {
    /// Durable JSON file
    Json,
    /// Nothing persists past the process
    Memory,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "tcgtracker", version, about = "Pokémon TCG match and deck tracker")]
pub struct Cli {
    /// TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Configuration profile (overrides TCGTRACKER_PROFILE)
    #[arg(long, value_enum)]
    pub profile: Option<Profile>,

    /// Storage backend
    #[arg(long, value_enum, default_value_t = StoreKind::Json)]
    pub store: StoreKind,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Deck operations
    #[command(subcommand)]
    Deck(DeckCmd),
    /// Match operations
    #[command(subcommand)]
    Match(MatchCmd),
    /// Deck change history, newest first
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Win/loss statistics
    Stats {
        #[arg(long)]
        deck: Option<String>,
    },
    /// Export data
    #[command(subcommand)]
    Export(ExportCmd),
    /// Import data
    #[command(subcommand)]
    Import(ImportCmd),
    /// Backups of the data file
    #[command(subcommand)]
    Backup(BackupCmd),
    /// Launch the HTTP API with auto-save and auto-backup
    Serve(ServeCmd),
}

#[derive(Debug, Subcommand, Clone)]
pub enum DeckCmd {
    /// Create a deck. Cards are NAME:QTY or NAME:QTY:KIND
    Add {
        name: String,
        #[arg(long = "card")]
        cards: Vec<String>,
    },
    List,
    Show {
        deck: String,
    },
    Edit(DeckEdit),
    Rm {
        deck: String,
    },
    /// Change one card without rewriting the list
    #[command(subcommand)]
    Card(CardCmd),
    /// Set (or with --clear, unset) the current deck
    Use {
        deck: Option<String>,
        #[arg(long, conflicts_with = "deck")]
        clear: bool,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    /// Add a card or set its quantity: NAME:QTY or NAME:QTY:KIND
    Add { deck: String, card: String },
    Rm { deck: String, name: String },
}

#[derive(Debug, Args, Clone)]
pub struct DeckEdit {
    pub deck: String,
    #[arg(long)]
    pub name: Option<String>,
    /// Replaces the whole card list
    #[arg(long = "card")]
    pub cards: Vec<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum MatchCmd {
    Add(MatchAdd),
    List(MatchList),
    Edit(MatchEdit),
    Rm { match_id: String },
}

#[derive(Debug, Args, Clone)]
pub struct MatchAdd {
    /// Deck id or name; defaults to the current deck
    #[arg(long)]
    pub deck: Option<String>,
    #[arg(long)]
    pub opponent: String,
    /// win, loss or draw
    #[arg(long)]
    pub result: String,
    /// you or opponent
    #[arg(long)]
    pub first: Option<String>,
    #[arg(long)]
    pub turns: Option<u8>,
    #[arg(long)]
    pub win_condition: Option<String>,
    #[arg(long)]
    pub notable: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    /// RFC 3339 timestamp; defaults to now
    #[arg(long)]
    pub played_at: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MatchList {
    #[arg(long)]
    pub deck: Option<String>,
    #[arg(long)]
    pub opponent: Option<String>,
    #[arg(long)]
    pub result: Option<String>,
    /// Free text over opponent, notes and notable cards
    #[arg(long)]
    pub search: Option<String>,
    /// Newest N only
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct MatchEdit {
    pub match_id: String,
    #[arg(long)]
    pub deck: Option<String>,
    #[arg(long)]
    pub opponent: Option<String>,
    #[arg(long)]
    pub result: Option<String>,
    #[arg(long)]
    pub first: Option<String>,
    #[arg(long)]
    pub turns: Option<u8>,
    #[arg(long)]
    pub win_condition: Option<String>,
    #[arg(long)]
    pub notable: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long, conflicts_with = "notes")]
    pub clear_notes: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ExportCmd {
    /// Full snapshot
    Json { path: PathBuf },
    /// Matches only
    Csv { path: PathBuf, #[arg(long)] deck: Option<String> },
    /// One deck as a text deck list
    Decklist { deck: String, path: PathBuf },
}

#[derive(Debug, Subcommand, Clone)]
pub enum ImportCmd {
    /// Snapshot or legacy export; replaces everything unless --merge
    Json { path: PathBuf, #[arg(long)] merge: bool },
    /// Matches; unknown decks are created by name
    Csv { path: PathBuf },
}

#[derive(Debug, Subcommand, Clone)]
pub enum BackupCmd {
    Create,
    List,
    /// Replace an unreadable data file with the newest usable backup
    Restore,
}

#[derive(Debug, Args, Clone)]
pub struct ServeCmd {
    /// Bind address (host:port); defaults to the configured one
    #[arg(long)]
    pub addr: Option<String>,
}
