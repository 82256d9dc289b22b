use crate::api::server as api_server;
use crate::cli::exchange;
use crate::cli::opts::*;
use crate::config::AppConfig;
use crate::maintenance;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tcgtracker_core::{
    filters::{filter_by_opponent, filter_by_result, filter_by_text, recent},
    decklist, resolve_deck, sample_decks, stats, validate, CardInput, CoreError, DeckId, DeckPatch,
    DeckRecord, ImportMode, Ledger, MatchPatch, MatchResult, MemoryRepo, NewDeck, NewMatch,
    Repository, Snapshot,
};
use tcgtracker_json::JsonStore;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

pub async fn run_cli(args: Cli, cfg: AppConfig) -> Result<()> {
    match args.cmd.clone() {
        // Must work while the data file is unreadable.
        Command::Backup(BackupCmd::Restore) => restore_cmd(&args.store, &cfg).await,
        cmd => {
            let repo = open_repo(&args.store, &cfg).await?;
            match cmd {
                Command::Deck(c) => deck_cmd(repo, c).await,
                Command::Match(c) => match_cmd(repo, c).await,
                Command::History { limit } => history_cmd(repo, limit).await,
                Command::Stats { deck } => stats_cmd(repo, deck).await,
                Command::Export(c) => export_cmd(repo, c).await,
                Command::Import(c) => import_cmd(repo, c).await,
                Command::Backup(c) => backup_cmd(repo, c).await,
                Command::Serve(c) => serve_cmd(repo, &cfg, c).await,
            }
        }
    }
}

pub async fn open_repo(store: &StoreKind, cfg: &AppConfig) -> Result<Arc<dyn Repository>> {
    match store {
        StoreKind::Json => match JsonStore::open(cfg.store_config()).await {
            Ok(s) => Ok(Arc::new(s)),
            Err(e @ CoreError::CorruptStore { .. }) => Err(anyhow::Error::new(e).context(
                "the data file could not be read; run `tcgtracker backup restore` to recover the newest backup",
            )),
            Err(e) => Err(e.into()),
        },
        StoreKind::Memory => {
            let repo = MemoryRepo::with_ledger(Ledger::new(), cfg.store.max_backups);
            if cfg.store.seed_sample_data {
                for d in sample_decks() {
                    repo.add_deck(d).await?;
                }
            }
            Ok(Arc::new(repo))
        }
    }
}

async fn deck_cmd(repo: Arc<dyn Repository>, cmd: DeckCmd) -> Result<()> {
    match cmd {
        DeckCmd::Add { name, cards } => {
            let cards = parse_cards(&cards)?;
            let d = repo.add_deck(NewDeck::new(name, cards)).await?;
            println!("{}", d.id);
        }
        DeckCmd::List => {
            let current = repo.current_deck().await?.map(|d| d.id);
            for d in repo.list_decks().await? {
                let mark = if Some(d.id) == current { "*" } else { " " };
                println!("{mark} {}\t{}\t{} cards", d.id, d.name, d.total_cards());
            }
        }
        DeckCmd::Show { deck } => {
            let d = resolve_deck(&*repo, &deck).await?;
            print_deck(&d);
        }
        DeckCmd::Edit(e) => {
            let d = resolve_deck(&*repo, &e.deck).await?;
            let patch = DeckPatch {
                name: e.name,
                cards: if e.cards.is_empty() { None } else { Some(parse_cards(&e.cards)?) },
            };
            if patch.name.is_none() && patch.cards.is_none() {
                bail!("nothing to change: pass --name and/or --card");
            }
            let d = repo.update_deck(d.id, patch).await?;
            print_deck(&d);
        }
        DeckCmd::Rm { deck } => {
            let d = resolve_deck(&*repo, &deck).await?;
            repo.delete_deck(d.id).await?;
            println!("ok");
        }
        DeckCmd::Card(CardCmd::Add { deck, card }) => {
            let d = resolve_deck(&*repo, &deck).await?;
            let d = repo.upsert_card(d.id, parse_card(&card)?).await?;
            print_deck(&d);
        }
        DeckCmd::Card(CardCmd::Rm { deck, name }) => {
            let d = resolve_deck(&*repo, &deck).await?;
            let d = repo.remove_card(d.id, name).await?;
            print_deck(&d);
        }
        DeckCmd::Use { deck, clear } => {
            if clear {
                repo.set_current_deck(None).await?;
                println!("ok");
            } else if let Some(sel) = deck {
                let d = resolve_deck(&*repo, &sel).await?;
                repo.set_current_deck(Some(d.id)).await?;
                println!("{}\t{}", d.id, d.name);
            } else {
                match repo.current_deck().await? {
                    Some(d) => println!("{}\t{}", d.id, d.name),
                    None => println!("no current deck"),
                }
            }
        }
    }
    Ok(())
}

async fn match_cmd(repo: Arc<dyn Repository>, cmd: MatchCmd) -> Result<()> {
    match cmd {
        MatchCmd::Add(a) => {
            let deck = match a.deck {
                Some(sel) => resolve_deck(&*repo, &sel).await?,
                None => repo
                    .current_deck()
                    .await?
                    .ok_or_else(|| anyhow!("no --deck given and no current deck set"))?,
            };
            let played_at = a.played_at.as_deref().map(parse_time).transpose()?;
            let m = repo
                .add_match(NewMatch {
                    deck_id: deck.id,
                    opponent_deck: a.opponent,
                    result: a.result,
                    played_at,
                    went_first: a.first,
                    turns: a.turns,
                    win_condition: a.win_condition,
                    notable_cards: a.notable,
                    notes: a.notes,
                })
                .await?;
            println!("{}", m.id);
        }
        MatchCmd::List(l) => {
            let deck_id = match l.deck {
                Some(sel) => Some(resolve_deck(&*repo, &sel).await?.id),
                None => None,
            };
            let mut v = repo.list_matches(deck_id).await?;
            if let Some(o) = l.opponent {
                v = filter_by_opponent(&v, &o);
            }
            if let Some(r) = l.result {
                v = filter_by_result(&v, r.parse::<MatchResult>()?);
            }
            if let Some(q) = l.search {
                v = filter_by_text(&v, &q);
            }
            let v = recent(&v, l.limit.unwrap_or(usize::MAX));

            let names = deck_names(&*repo).await?;
            for m in v {
                let deck = names.get(&m.deck_id).map(String::as_str).unwrap_or("?");
                let turns = m.turns.map(|t| format!("\t{t} turns")).unwrap_or_default();
                println!(
                    "{}\t{}\t{} vs {}\t{}{}",
                    m.id,
                    m.played_at.format("%Y-%m-%d %H:%M"),
                    deck,
                    m.opponent_deck,
                    m.result,
                    turns
                );
            }
        }
        MatchCmd::Edit(e) => {
            let id = parse_uuid(&e.match_id)?;
            let deck_id = match e.deck {
                Some(sel) => Some(resolve_deck(&*repo, &sel).await?.id),
                None => None,
            };
            let notes = if e.clear_notes { Some(None) } else { e.notes.map(Some) };
            let patch = MatchPatch {
                deck_id,
                opponent_deck: e.opponent,
                result: e.result,
                played_at: None,
                went_first: e.first.map(Some),
                turns: e.turns.map(Some),
                win_condition: e.win_condition.map(Some),
                notable_cards: e.notable.map(Some),
                notes,
            };
            let m = repo.update_match(id, patch).await?;
            println!("{}", m.id);
        }
        MatchCmd::Rm { match_id } => {
            let id = parse_uuid(&match_id)?;
            repo.delete_match(id).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn history_cmd(repo: Arc<dyn Repository>, limit: Option<usize>) -> Result<()> {
    let history = repo.history().await?;
    for h in history.iter().rev().take(limit.unwrap_or(usize::MAX)) {
        println!(
            "{}\t{:?}\t{}\t{}",
            h.at.format("%Y-%m-%d %H:%M"),
            h.change,
            h.deck_name,
            h.detail
        );
    }
    Ok(())
}

async fn stats_cmd(repo: Arc<dyn Repository>, deck: Option<String>) -> Result<()> {
    let deck_id = match deck {
        Some(sel) => Some(resolve_deck(&*repo, &sel).await?.id),
        None => None,
    };
    let matches = repo.list_matches(deck_id).await?;
    if matches.is_empty() {
        println!("no matches recorded");
        return Ok(());
    }

    let s = stats::summarize(&matches);
    println!(
        "record {}-{}-{} ({} games, {:.1}% wins)",
        s.totals.wins,
        s.totals.losses,
        s.totals.draws,
        s.totals.total,
        s.win_rate * 100.0
    );
    if let Some(avg) = s.average_turns {
        println!("average turns {avg:.1}");
    }
    if let Some(streak) = stats::current_streak(&matches) {
        println!("streak {} x{}", streak.result, streak.length);
    }
    let fpa = stats::first_player_advantage(&matches);
    if fpa.going_first.total + fpa.going_second.total > 0 {
        println!(
            "going first {:.1}% / second {:.1}%",
            fpa.going_first.win_rate() * 100.0,
            fpa.going_second.win_rate() * 100.0
        );
    }
    for (cond, t) in stats::win_condition_breakdown(&matches) {
        println!("  {}: {} won, {} lost", cond.as_str(), t.wins, t.losses);
    }

    if deck_id.is_none() {
        let names = deck_names(&*repo).await?;
        let mut per_deck: Vec<_> = stats::per_deck_performance(&matches).into_iter().collect();
        per_deck.sort_by(|a, b| b.1.totals.total.cmp(&a.1.totals.total));
        for (id, p) in per_deck {
            let name = names.get(&id).map(String::as_str).unwrap_or("?");
            println!(
                "{name}\t{}-{}-{}\t{:.1}%",
                p.totals.wins,
                p.totals.losses,
                p.totals.draws,
                p.totals.win_rate() * 100.0
            );
        }
    }
    Ok(())
}

async fn export_cmd(repo: Arc<dyn Repository>, cmd: ExportCmd) -> Result<()> {
    match cmd {
        ExportCmd::Json { path } => {
            let snapshot = repo.export_snapshot().await?;
            std::fs::write(&path, snapshot.encode()?)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        ExportCmd::Csv { path, deck } => {
            let deck_id = match deck {
                Some(sel) => Some(resolve_deck(&*repo, &sel).await?.id),
                None => None,
            };
            let matches = repo.list_matches(deck_id).await?;
            let names = deck_names(&*repo).await?;
            let file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            exchange::write_matches(file, &matches, &names)?;
            println!("wrote {} matches to {}", matches.len(), path.display());
        }
        ExportCmd::Decklist { deck, path } => {
            let d = resolve_deck(&*repo, &deck).await?;
            let text = decklist::render(&d, Utc::now().date_naive());
            std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {} ({} cards) to {}", d.name, d.total_cards(), path.display());
        }
    }
    Ok(())
}

async fn import_cmd(repo: Arc<dyn Repository>, cmd: ImportCmd) -> Result<()> {
    match cmd {
        ImportCmd::Json { path, merge } => {
            let bytes = read_file(&path)?;
            let snapshot = Snapshot::decode(&bytes).map_err(CoreError::from)?;
            let mode = if merge { ImportMode::Merge } else { ImportMode::Replace };
            let r = repo.import_snapshot(snapshot, mode).await?;
            println!("imported {} decks, {} matches ({:?})", r.decks, r.matches, r.mode);
        }
        ImportCmd::Csv { path } => {
            let rows = exchange::read_matches(std::fs::File::open(&path)
                .with_context(|| format!("opening {}", path.display()))?)?;
            let incoming = csv_snapshot(&*repo, rows).await?;
            let r = repo.import_snapshot(incoming, ImportMode::Merge).await?;
            println!("imported {} matches, created {} decks", r.matches, r.decks);
        }
    }
    Ok(())
}

/// All CSV rows as one merge, so a bad row imports nothing.
async fn csv_snapshot<R: Repository + ?Sized>(repo: &R, rows: Vec<exchange::CsvMatch>) -> Result<Snapshot> {
    let mut by_name: HashMap<String, DeckId> = repo
        .list_decks()
        .await?
        .into_iter()
        .map(|d| (validate::name_key(&d.name), d.id))
        .collect();

    let mut incoming = Snapshot::empty();
    for (i, row) in rows.into_iter().enumerate() {
        let key = validate::name_key(&row.deck);
        let deck_id = match by_name.get(&key) {
            Some(id) => *id,
            None => {
                let d = DeckRecord::new(row.deck.trim(), vec![]);
                by_name.insert(key, d.id);
                let id = d.id;
                incoming.decks.push(d);
                id
            }
        };
        let m = validate::new_match(&row.into_new_match(deck_id))
            .with_context(|| format!("CSV line {}", i + 2))?;
        incoming.matches.push(m);
    }
    Ok(incoming)
}

async fn backup_cmd(repo: Arc<dyn Repository>, cmd: BackupCmd) -> Result<()> {
    match cmd {
        BackupCmd::Create => {
            let b = repo.backup().await?;
            println!("{}\t{} bytes", b.name, b.size_bytes);
        }
        BackupCmd::List => {
            for b in repo.list_backups().await? {
                println!("{}\t{}\t{} bytes", b.name, b.created_at.format("%Y-%m-%d %H:%M:%S"), b.size_bytes);
            }
        }
        BackupCmd::Restore => bail!("restore must run before the store is opened"),
    }
    Ok(())
}

async fn restore_cmd(store: &StoreKind, cfg: &AppConfig) -> Result<()> {
    if !matches!(store, StoreKind::Json) {
        bail!("restore only applies to the json store");
    }
    let b = JsonStore::restore_latest_backup(&cfg.store_config()).await?;
    println!("restored {} into {}", b.name, cfg.store.data_file.display());
    Ok(())
}

async fn serve_cmd(repo: Arc<dyn Repository>, cfg: &AppConfig, cmd: ServeCmd) -> Result<()> {
    let addr: SocketAddr = match cmd.addr {
        Some(a) => a.parse().with_context(|| format!("invalid --addr {a:?}"))?,
        None => cfg.server.bind_addr,
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let worker = maintenance::spawn(Arc::clone(&repo), &cfg.maintenance, shutdown_tx.subscribe());

    let tx = shutdown_tx.clone();
    let signal = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        let _ = tx.send(());
    };
    let served = api_server::run(Arc::clone(&repo), addr, &cfg.server.cors_origins, signal).await;

    let _ = shutdown_tx.send(());
    worker.await.context("maintenance task panicked")?;
    repo.save().await?;
    info!("store saved");
    served
}

// ===== Helpers =====
fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| anyhow!("invalid id: {s}"))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| anyhow!("invalid timestamp {s:?} (expected RFC 3339, e.g. 2024-03-09T14:05:00Z)"))
}

/// `NAME:QTY` or `NAME:QTY:KIND`.
pub fn parse_card(s: &str) -> Result<CardInput> {
    let (head, tail) = s
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("card {s:?} must look like NAME:QTY or NAME:QTY:KIND"))?;
    if let Ok(qty) = tail.trim().parse::<u32>() {
        return Ok(CardInput::new(head.trim(), qty));
    }
    let (name, qty) = head
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("card {s:?} must look like NAME:QTY or NAME:QTY:KIND"))?;
    let qty = qty
        .trim()
        .parse::<u32>()
        .map_err(|_| anyhow!("card {s:?} has a non-numeric quantity"))?;
    Ok(CardInput::new(name.trim(), qty).with_kind(tail.trim()))
}

fn parse_cards(specs: &[String]) -> Result<Vec<CardInput>> {
    specs.iter().map(|s| parse_card(s)).collect()
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

async fn deck_names<R: Repository + ?Sized>(repo: &R) -> Result<HashMap<DeckId, String>> {
    Ok(repo.list_decks().await?.into_iter().map(|d| (d.id, d.name)).collect())
}

fn print_deck(d: &DeckRecord) {
    let c = stats::deck_composition(d);
    println!("{}\t{}", d.id, d.name);
    for card in &d.cards {
        println!("  {}x {} ({:?})", card.quantity, card.name, card.kind);
    }
    println!(
        "{} cards, {} unique, {:.0}% complete{}",
        c.total_cards,
        c.unique_cards,
        c.completion_pct,
        if c.tournament_legal { ", tournament legal" } else { "" }
    );
    for s in &c.suggestions {
        println!("  - {s}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcgtracker_core::CardKind;

    #[test]
    fn parses_card_specs() {
        let c = parse_card("Charmander:4").unwrap();
        assert_eq!((c.name.as_str(), c.quantity, c.kind.as_deref()), ("Charmander", 4, None));

        let e = parse_card("Fire Energy:10:energy").unwrap();
        assert_eq!(e.quantity, 10);
        assert_eq!(e.kind.as_deref(), Some("energy"));
        assert!("energy".parse::<CardKind>().is_ok());

        let odd = parse_card("Team Rocket's: Mewtwo:2").unwrap();
        assert_eq!(odd.name, "Team Rocket's: Mewtwo");

        assert!(parse_card("Charmander").is_err());
        assert!(parse_card("Charmander:four:pokemon").is_err());
    }

    #[tokio::test]
    async fn exported_files_import_into_a_fresh_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let json_path = dir.path().join("export.json");
        let csv_path = dir.path().join("matches.csv");

        let source: Arc<dyn Repository> = Arc::new(MemoryRepo::new());
        let d = source.add_deck(NewDeck::new("Fire Deck", vec![])).await.unwrap();
        source.add_match(NewMatch::new(d.id, "Water Deck", "win")).await.unwrap();
        export_cmd(source.clone(), ExportCmd::Json { path: json_path.clone() }).await.unwrap();
        export_cmd(source.clone(), ExportCmd::Csv { path: csv_path.clone(), deck: None }).await.unwrap();

        let from_json: Arc<dyn Repository> = Arc::new(MemoryRepo::new());
        import_cmd(from_json.clone(), ImportCmd::Json { path: json_path, merge: false }).await.unwrap();
        let expected = source.export_snapshot().await.unwrap();
        assert!(from_json.export_snapshot().await.unwrap().same_contents(&expected));

        let from_csv: Arc<dyn Repository> = Arc::new(MemoryRepo::new());
        import_cmd(from_csv.clone(), ImportCmd::Csv { path: csv_path }).await.unwrap();
        let decks = from_csv.list_decks().await.unwrap();
        assert_eq!(decks.len(), 1);
        assert_eq!(decks[0].name, "Fire Deck");
        let m = &from_csv.list_matches(None).await.unwrap()[0];
        assert_eq!((m.opponent_deck.as_str(), m.result), ("Water Deck", MatchResult::Win));
    }

    #[tokio::test]
    async fn card_commands_and_decklist_export() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fire.txt");
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepo::new());
        repo.add_deck(NewDeck::new("Fire Deck", vec![])).await.unwrap();

        let add = |card: &str| DeckCmd::Card(CardCmd::Add { deck: "fire deck".into(), card: card.into() });
        deck_cmd(repo.clone(), add("Charmander:4")).await.unwrap();
        deck_cmd(repo.clone(), add("Fire Energy:8:energy")).await.unwrap();
        deck_cmd(repo.clone(), add("Charmander:3")).await.unwrap();
        deck_cmd(
            repo.clone(),
            DeckCmd::Card(CardCmd::Rm { deck: "Fire Deck".into(), name: "fire energy".into() }),
        )
        .await
        .unwrap();

        export_cmd(repo.clone(), ExportCmd::Decklist { deck: "Fire Deck".into(), path: path.clone() })
            .await
            .unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("## Pokemon\n3x Charmander\n"));
        assert!(!text.contains("Energy"));
        assert!(text.ends_with("Total Cards: 3"));
    }

    #[tokio::test]
    async fn csv_rows_reuse_decks_and_create_missing_ones() {
        let repo = MemoryRepo::new();
        let fire = repo.add_deck(NewDeck::new("Fire Deck", vec![])).await.unwrap();
        let row = |deck: &str, result: &str| exchange::CsvMatch {
            played_at: Utc::now(),
            deck: deck.to_string(),
            opponent_deck: "Water Deck".to_string(),
            result: result.to_string(),
            went_first: None,
            turns: Some(6),
            win_condition: None,
            notable_cards: None,
            notes: None,
        };

        let snap = csv_snapshot(&repo, vec![row("fire deck", "win"), row("Grass Deck", "loss"), row("Grass Deck", "draw")])
            .await
            .unwrap();
        assert_eq!(snap.decks.len(), 1);
        assert_eq!(snap.matches[0].deck_id, fire.id);
        repo.import_snapshot(snap, ImportMode::Merge).await.unwrap();
        assert_eq!(repo.list_decks().await.unwrap().len(), 2);
        assert_eq!(repo.list_matches(None).await.unwrap().len(), 3);

        let bad = csv_snapshot(&repo, vec![row("Fire Deck", "win"), row("Fire Deck", "tie")]).await;
        assert!(bad.unwrap_err().to_string().contains("line 3"));
        assert_eq!(repo.list_matches(None).await.unwrap().len(), 3);
    }
}
