use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Persisted set of message ids that have already been inspected.
///
/// Ids are only ever added. Every newly marked id is written through to disk right
/// away, so an interrupted run never re-inspects a message it already judged.
#[derive(Debug)]
pub struct SeenLedger {
    path: PathBuf,
    ids: HashSet<String>,
    read_only: bool,
}

impl SeenLedger {
    /// Loads the ledger at `path`. A missing or unreadable file yields an empty ledger.
    ///
    /// Accepts a JSON array of strings or one id per line.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match fs::read_to_string(&path) {
            Ok(raw) => parse_ids(&raw).unwrap_or_else(|| {
                warn!(path = %path.display(), "seen-ids ledger is corrupt, starting fresh");
                HashSet::new()
            }),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no seen-ids ledger yet");
                HashSet::new()
            }
        };
        Self {
            path,
            ids,
            read_only: false,
        }
    }

    /// Keeps marks in memory only; nothing is written back (dry runs).
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Records `id` and persists the ledger if it was new. Returns whether it was new.
    /// The id stays marked in memory even if the write fails.
    pub fn mark(&mut self, id: &str) -> Result<bool> {
        if !self.ids.insert(id.to_string()) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Rewrites the whole ledger as a sorted JSON array via temp file + rename.
    pub fn persist(&self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating ledger directory {}", parent.display()))?;
        }

        let mut sorted: Vec<&String> = self.ids.iter().collect();
        sorted.sort();
        let json = serde_json::to_string(&sorted)?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("writing temp ledger {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("replacing ledger {}", self.path.display()))?;
        Ok(())
    }
}

fn parse_ids(raw: &str) -> Option<HashSet<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(HashSet::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(trimmed)
            .ok()
            .map(|ids| ids.into_iter().collect());
    }
    Some(
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
