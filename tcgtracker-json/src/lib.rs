use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tcgtracker_core::{
    repo::Repository, sample_decks, BackupInfo, CardInput, CoreError, DeckId, DeckPatch, DeckRecord,
    HistoryEntry, ImportMode, ImportReport, Ledger, MatchId, MatchPatch, MatchRecord, NewDeck,
    NewMatch, Snapshot,
};
use tokio::task;
use tracing::{info, warn};

mod atomic;
mod backup;
pub mod paths;

pub const DEFAULT_MAX_BACKUPS: usize = 10;

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub data_file: PathBuf,
    pub backup_dir: PathBuf,
    /// Backups kept after rotation; at least one is always kept.
    pub max_backups: usize,
    /// Seed the starter decks when the data file does not exist yet.
    pub seed_sample_data: bool,
}

impl StoreConfig {
    pub fn new(data_file: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_file: data_file.into(),
            backup_dir: backup_dir.into(),
            max_backups: DEFAULT_MAX_BACKUPS,
            seed_sample_data: false,
        }
    }

    /// Platform data directory, see [`paths::default_store_file`].
    pub fn default_location() -> Self {
        let (file, backups) = paths::default_store_file();
        Self::new(file, backups)
    }

    pub fn with_max_backups(mut self, n: usize) -> Self {
        self.max_backups = n.max(1);
        self
    }

    pub fn with_sample_data(mut self, seed: bool) -> Self {
        self.seed_sample_data = seed;
        self
    }
}

struct Inner {
    config: StoreConfig,
    /// Committed state. Write-locked only to swap in a persisted draft.
    state: RwLock<Ledger>,
    /// Serializes everything that writes the data file.
    writer: Mutex<()>,
}

/// Single-file durable store. Every mutation is written through to disk
/// before it becomes visible in memory.
#[derive(Clone)]
pub struct JsonStore {
    inner: Arc<Inner>,
}

impl JsonStore {
    pub async fn open_default() -> Result<Self, CoreError> {
        Self::open(StoreConfig::default_location()).await
    }

    /// Loads the data file, creating it when absent. An unreadable file is
    /// reported as [`CoreError::CorruptStore`] and left untouched.
    pub async fn open(config: StoreConfig) -> Result<Self, CoreError> {
        let cfg = config.clone();
        let ledger = blocking(move || load_or_init(&cfg)).await?;
        info!(
            file = %config.data_file.display(),
            decks = ledger.deck_count(),
            matches = ledger.match_count(),
            "store opened"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(ledger),
                writer: Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn data_file(&self) -> &Path {
        &self.inner.config.data_file
    }

    /// Moves an unreadable data file aside and puts the newest usable
    /// backup in its place. Works without an open store.
    pub async fn restore_latest_backup(config: &StoreConfig) -> Result<BackupInfo, CoreError> {
        let cfg = config.clone();
        blocking(move || restore_latest(&cfg)).await
    }

    /// Runs `f` against a copy of the ledger and persists the copy. Memory
    /// only changes once the file is safely replaced.
    async fn mutate<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Ledger) -> Result<T, CoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let _writer = inner.writer.lock();
            let mut draft = inner.state.read().clone();
            let out = f(&mut draft)?;
            if let Err(e) = write_ledger(&inner.config.data_file, &draft) {
                warn!(error = %e, "persist failed, change discarded");
                return Err(e);
            }
            *inner.state.write() = draft;
            Ok(out)
        })
        .await
    }

    /// Never waits on disk I/O: writers only hold the state lock for the swap.
    fn read<T>(&self, f: impl FnOnce(&Ledger) -> T) -> T {
        f(&self.inner.state.read())
    }
}

async fn blocking<T, F>(f: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| CoreError::Io(io::Error::new(io::ErrorKind::Other, e)))?
}

fn write_ledger(path: &Path, ledger: &Ledger) -> Result<(), CoreError> {
    let bytes = ledger.snapshot().encode()?;
    atomic::write_atomic(path, &bytes)?;
    Ok(())
}

fn load_or_init(config: &StoreConfig) -> Result<Ledger, CoreError> {
    let path = &config.data_file;
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let mut ledger = Ledger::new();
            if config.seed_sample_data {
                for deck in sample_decks() {
                    ledger.add_deck(deck)?;
                }
            }
            write_ledger(path, &ledger)?;
            info!(file = %path.display(), seeded = config.seed_sample_data, "new store created");
            return Ok(ledger);
        }
        Err(e) => return Err(e.into()),
    };

    let corrupt = |reason: String| CoreError::CorruptStore {
        path: path.clone(),
        reason,
    };
    let snapshot = Snapshot::decode(&bytes).map_err(|e| corrupt(e.to_string()))?;
    let ledger = Ledger::from_snapshot(snapshot).map_err(|e| corrupt(e.to_string()))?;

    // Older files are upgraded in place so ids assigned during conversion
    // stay stable across opens. The original bytes are kept as a backup.
    if !Snapshot::is_current(&bytes) {
        let kept = backup::create(path, &config.backup_dir, config.max_backups)?;
        write_ledger(path, &ledger)?;
        info!(file = %path.display(), backup = %kept.name, "store upgraded to current format");
    }
    Ok(ledger)
}

fn restore_latest(config: &StoreConfig) -> Result<BackupInfo, CoreError> {
    let Some((info, bytes)) = backup::newest_valid(&config.backup_dir)? else {
        return Err(CoreError::not_found(
            "backup",
            config.backup_dir.display(),
        ));
    };

    let path = &config.data_file;
    if path.exists() {
        let aside = corrupt_path(path);
        fs::rename(path, &aside)?;
        warn!(moved_to = %aside.display(), "unreadable store moved aside");
    }
    atomic::write_atomic(path, &bytes)?;
    info!(backup = %info.name, file = %path.display(), "store restored from backup");
    Ok(info)
}

fn corrupt_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{stamp}"));
    path.with_file_name(name)
}

#[async_trait]
impl Repository for JsonStore {
    async fn add_deck(&self, deck: NewDeck) -> Result<DeckRecord, CoreError> {
        let d = self.mutate(move |l| l.add_deck(deck)).await?;
        info!(deck_id = %d.id, name = %d.name, "deck created");
        Ok(d)
    }

    async fn get_deck(&self, id: DeckId) -> Result<DeckRecord, CoreError> {
        self.read(|l| l.deck(id).cloned())
    }

    async fn list_decks(&self) -> Result<Vec<DeckRecord>, CoreError> {
        Ok(self.read(|l| l.decks()))
    }

    async fn update_deck(&self, id: DeckId, patch: DeckPatch) -> Result<DeckRecord, CoreError> {
        let d = self.mutate(move |l| l.update_deck(id, patch)).await?;
        info!(deck_id = %d.id, name = %d.name, "deck updated");
        Ok(d)
    }

    async fn delete_deck(&self, id: DeckId) -> Result<DeckRecord, CoreError> {
        let d = self.mutate(move |l| l.delete_deck(id)).await?;
        info!(deck_id = %d.id, name = %d.name, "deck deleted");
        Ok(d)
    }

    async fn upsert_card(&self, deck_id: DeckId, card: CardInput) -> Result<DeckRecord, CoreError> {
        let d = self.mutate(move |l| l.upsert_card(deck_id, card)).await?;
        info!(deck_id = %d.id, total = d.total_cards(), "deck card set");
        Ok(d)
    }

    async fn remove_card(&self, deck_id: DeckId, card_name: String) -> Result<DeckRecord, CoreError> {
        let name = card_name.clone();
        let d = self.mutate(move |l| l.remove_card(deck_id, &name)).await?;
        info!(deck_id = %d.id, card = %card_name, "deck card removed");
        Ok(d)
    }

    async fn current_deck(&self) -> Result<Option<DeckRecord>, CoreError> {
        Ok(self.read(|l| l.current_deck().cloned()))
    }

    async fn set_current_deck(&self, id: Option<DeckId>) -> Result<Option<DeckRecord>, CoreError> {
        self.mutate(move |l| l.set_current_deck(id)).await
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>, CoreError> {
        Ok(self.read(|l| l.history().to_vec()))
    }

    async fn add_match(&self, m: NewMatch) -> Result<MatchRecord, CoreError> {
        let rec = self.mutate(move |l| l.add_match(m)).await?;
        info!(match_id = %rec.id, deck_id = %rec.deck_id, result = %rec.result, "match recorded");
        Ok(rec)
    }

    async fn get_match(&self, id: MatchId) -> Result<MatchRecord, CoreError> {
        self.read(|l| l.get_match(id).cloned())
    }

    async fn list_matches(&self, deck_id: Option<DeckId>) -> Result<Vec<MatchRecord>, CoreError> {
        Ok(self.read(|l| l.matches(deck_id)))
    }

    async fn update_match(&self, id: MatchId, patch: MatchPatch) -> Result<MatchRecord, CoreError> {
        self.mutate(move |l| l.update_match(id, patch)).await
    }

    async fn delete_match(&self, id: MatchId) -> Result<MatchRecord, CoreError> {
        let rec = self.mutate(move |l| l.delete_match(id)).await?;
        info!(match_id = %rec.id, "match deleted");
        Ok(rec)
    }

    async fn save(&self) -> Result<(), CoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            let _writer = inner.writer.lock();
            let ledger = inner.state.read().clone();
            write_ledger(&inner.config.data_file, &ledger)
        })
        .await
    }

    async fn backup(&self) -> Result<BackupInfo, CoreError> {
        let inner = Arc::clone(&self.inner);
        blocking(move || {
            // Held so no mutation lands between the flush and the copy.
            let _writer = inner.writer.lock();
            let cfg = &inner.config;
            if !cfg.data_file.exists() {
                let ledger = inner.state.read().clone();
                write_ledger(&cfg.data_file, &ledger)?;
            }
            backup::create(&cfg.data_file, &cfg.backup_dir, cfg.max_backups)
        })
        .await
    }

    async fn list_backups(&self) -> Result<Vec<BackupInfo>, CoreError> {
        let dir = self.inner.config.backup_dir.clone();
        blocking(move || Ok(backup::list(&dir)?.into_iter().map(|b| b.info).collect())).await
    }

    async fn export_snapshot(&self) -> Result<Snapshot, CoreError> {
        Ok(self.read(|l| l.snapshot()))
    }

    async fn import_snapshot(&self, snapshot: Snapshot, mode: ImportMode) -> Result<ImportReport, CoreError> {
        let report = self.mutate(move |l| l.import(snapshot, mode)).await?;
        info!(?mode, decks = report.decks, matches = report.matches, "snapshot imported");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_path_keeps_original_name() {
        let p = corrupt_path(Path::new("/data/tcgtracker.json"));
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tcgtracker.json.corrupt-"), "{name}");
        assert_eq!(p.parent(), Some(Path::new("/data")));
    }

    #[tokio::test]
    async fn reads_do_not_wait_for_an_in_flight_write() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = StoreConfig::new(dir.path().join("tcgtracker.json"), dir.path().join("backups"));
        let store = JsonStore::open(cfg).await.unwrap();

        // Stands in for a mutation that is still writing the file.
        let _writer = store.inner.writer.lock();
        assert!(store.list_decks().await.unwrap().is_empty());
        assert!(store.export_snapshot().await.unwrap().decks.is_empty());
    }
}
