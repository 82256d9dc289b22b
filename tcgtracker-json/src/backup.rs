use crate::atomic::write_atomic;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tcgtracker_core::{backup_stem, BackupInfo, CoreError, Snapshot};
use tracing::{debug, info, warn};

pub(crate) const BACKUP_PREFIX: &str = "tcgtracker";
const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

#[derive(Debug)]
pub(crate) struct BackupFile {
    pub info: BackupInfo,
    pub path: PathBuf,
}

/// Copies `data_file` into a new timestamped backup, then evicts the oldest
/// backups beyond `keep`.
pub(crate) fn create(data_file: &Path, dir: &Path, keep: usize) -> Result<BackupInfo, CoreError> {
    fs::create_dir_all(dir)?;
    let bytes = fs::read(data_file)?;
    let now = Utc::now();

    // Within one millisecond, continue after the highest sequence so a
    // later backup never sorts before an earlier one.
    let first = backup_stem(BACKUP_PREFIX, now, 0);
    let instant = first.rsplit_once('-').map_or(first.as_str(), |(head, _)| head);
    let seq = list(dir)?
        .iter()
        .filter_map(|b| {
            b.info
                .name
                .strip_prefix(instant)?
                .strip_prefix('-')?
                .strip_suffix(".json")?
                .parse::<u32>()
                .ok()
        })
        .max()
        .map_or(0, |s| s + 1);
    let path = dir.join(format!("{}.json", backup_stem(BACKUP_PREFIX, now, seq)));
    write_atomic(&path, &bytes)?;

    let info = BackupInfo {
        name: file_name(&path),
        created_at: now,
        size_bytes: bytes.len() as u64,
    };
    info!(backup = %info.name, bytes = info.size_bytes, "backup created");

    for evicted in rotate(dir, keep)? {
        info!(backup = %evicted, "old backup removed");
    }
    Ok(info)
}

/// Backups in `dir`, newest first. Files that don't follow the naming
/// scheme are ignored; a missing directory has no backups.
pub(crate) fn list(dir: &Path) -> Result<Vec<BackupFile>, CoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let name = file_name(&path);
        let Some(created_at) = parse_stamp(&name) else {
            debug!(file = %name, "skipping non-backup file");
            continue;
        };
        let size_bytes = entry.metadata()?.len();
        out.push(BackupFile {
            info: BackupInfo {
                name,
                created_at,
                size_bytes,
            },
            path,
        });
    }
    // Stamp and zero-padded sequence make name order chronological.
    out.sort_by(|a, b| b.info.name.cmp(&a.info.name));
    Ok(out)
}

fn rotate(dir: &Path, keep: usize) -> Result<Vec<String>, CoreError> {
    let keep = keep.max(1);
    let mut evicted = Vec::new();
    for old in list(dir)?.into_iter().skip(keep) {
        fs::remove_file(&old.path)?;
        evicted.push(old.info.name);
    }
    Ok(evicted)
}

/// Newest backup that decodes and validates, with its raw bytes.
pub(crate) fn newest_valid(dir: &Path) -> Result<Option<(BackupInfo, Vec<u8>)>, CoreError> {
    for b in list(dir)? {
        let bytes = fs::read(&b.path)?;
        let checked = Snapshot::decode(&bytes)
            .map_err(CoreError::from)
            .and_then(|s| s.validate());
        match checked {
            Ok(()) => return Ok(Some((b.info, bytes))),
            Err(e) => warn!(backup = %b.info.name, error = %e, "skipping unusable backup"),
        }
    }
    Ok(None)
}

fn parse_stamp(name: &str) -> Option<DateTime<Utc>> {
    let stem = name.strip_suffix(".json")?;
    let rest = stem.strip_prefix(BACKUP_PREFIX)?.strip_prefix('-')?;
    let (stamp, seq) = rest.rsplit_once('-')?;
    if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
        .ok()
        .map(|n| n.and_utc())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
