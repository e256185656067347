use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::feed_item::Feed;

/// On-disk snapshot of every tracked feed, keyed by id. Persisted the same
/// way the bot persists its dedup state: serialize whole, write to a `.tmp`
/// sibling, then rename over the target so a crash mid-write never leaves a
/// half-written state file behind.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    feeds: Vec<Feed>,
}

/// C-adjacent persistence layer: an in-memory table of `Feed` rows backed by
/// a JSON snapshot on disk, loaded once at startup and rewritten after every
/// mutation (spec.md §3/§6 — no external database, a local file is the
/// store).
pub struct FeedStore {
    path: PathBuf,
    feeds: Vec<Feed>,
}

impl FeedStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let feeds = if path.exists() {
            let data = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let state: StateFile =
                serde_json::from_slice(&data).with_context(|| "parse feed state JSON".to_string())?;
            state.feeds
        } else {
            Vec::new()
        };
        Ok(Self { path, feeds })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let state = StateFile { feeds: self.feeds.clone() };
        let json = serde_json::to_vec_pretty(&state).context("serialize feed state JSON")?;
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("atomic rename {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }

    pub fn list_enabled(&self) -> Vec<&Feed> {
        self.feeds.iter().filter(|f| f.enabled).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Feed> {
        self.feeds.iter().find(|f| f.id == id)
    }

    /// Inserts or replaces a feed by id, then persists to disk.
    pub fn upsert(&mut self, feed: Feed) -> Result<()> {
        match self.feeds.iter_mut().find(|f| f.id == feed.id) {
            Some(existing) => *existing = feed,
            None => self.feeds.push(feed),
        }
        self.save()
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.feeds.retain(|f| f.id != id);
        self.save()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}
