//! Periodic auto-save and auto-backup while the server runs.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use tcgtracker_core::Repository;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::MaintenanceSettings;

pub struct Maintenance {
    repo: Arc<dyn Repository>,
    auto_save: Option<Duration>,
    auto_backup: Option<Duration>,
}

pub fn spawn(
    repo: Arc<dyn Repository>,
    settings: &MaintenanceSettings,
    shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));
    let m = Maintenance::new(repo, secs(settings.auto_save_secs), secs(settings.auto_backup_secs));
    tokio::spawn(m.run(shutdown_rx))
}

impl Maintenance {
    /// `None` disables that task.
    pub fn new(repo: Arc<dyn Repository>, auto_save: Option<Duration>, auto_backup: Option<Duration>) -> Self {
        Self {
            repo,
            auto_save,
            auto_backup,
        }
    }

    /// One loop for both timers, so a save and a backup never run at once.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            auto_save = ?self.auto_save,
            auto_backup = ?self.auto_backup,
            "maintenance started"
        );
        let mut save_tick = ticker(self.auto_save);
        let mut backup_tick = ticker(self.auto_backup);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("maintenance shutting down");
                    return;
                }
                _ = tick(&mut save_tick) => {
                    match self.repo.save().await {
                        Ok(()) => debug!("auto-save complete"),
                        Err(e) => warn!(error = %e, "auto-save failed"),
                    }
                }
                _ = tick(&mut backup_tick) => {
                    match self.repo.backup().await {
                        Ok(b) => info!(backup = %b.name, "auto-backup complete"),
                        Err(e) => warn!(error = %e, "auto-backup failed"),
                    }
                }
            }
        }
    }
}

fn ticker(period: Option<Duration>) -> Option<Interval> {
    period.map(|p| {
        // First tick one period from now, not immediately.
        let mut i = interval_at(Instant::now() + p, p);
        i.set_missed_tick_behavior(MissedTickBehavior::Delay);
        i
    })
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcgtracker_core::{MemoryRepo, NewDeck};

    #[tokio::test]
    async fn backs_up_on_schedule_and_stops_on_shutdown() {
        let repo = Arc::new(MemoryRepo::new());
        repo.add_deck(NewDeck::new("Fire Deck", vec![])).await.unwrap();
        let (tx, rx) = broadcast::channel(1);

        let m = Maintenance::new(
            repo.clone(),
            Some(Duration::from_millis(10)),
            Some(Duration::from_millis(25)),
        );
        let handle = tokio::spawn(m.run(rx));

        tokio::time::sleep(Duration::from_millis(150)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let taken = repo.list_backups().await.unwrap().len();
        assert!(taken >= 1, "expected scheduled backups, got {taken}");

        // Nothing runs after shutdown.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(repo.list_backups().await.unwrap().len(), taken);
    }

    #[tokio::test]
    async fn disabled_timers_only_wait_for_shutdown() {
        let repo = Arc::new(MemoryRepo::new());
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(Maintenance::new(repo.clone(), None, None).run(rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(repo.list_backups().await.unwrap().is_empty());
    }
}
