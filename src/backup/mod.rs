//! ## Cab call persistence
//!
//! The local cab table is written to `<backup_dir>/cab_calls_<id>.json` after every change, and
//! read back on startup so a restarted node still serves the cab calls it had accepted.
//! Cab calls are also recovered from peers through gossip, so a missing file is not an error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config;
use crate::print;
use crate::world_view::request::CabRequests;

/// Location of one node's cab call file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CabBackup {
    path: PathBuf,
}

impl CabBackup {
    /// Backup file of elevator `id` inside `dir`.
    pub fn new(dir: &Path, id: &str) -> Self {
        CabBackup { path: dir.join(format!("{}{}.json", config::CAB_BACKUP_PREFIX, id)) }
    }

    /// Full path of the backup file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cab table.
    ///
    /// ## Returns
    /// `Ok(None)` if there is no file yet.
    pub fn load(&self) -> anyhow::Result<Option<CabRequests>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("could not read {}", self.path.display()))?;
        let cabs = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a cab call table", self.path.display()))?;
        Ok(Some(cabs))
    }

    /// Like [`CabBackup::load`], but logs failures and returns `None` for them.
    pub fn load_or_empty(&self) -> Option<CabRequests> {
        match self.load() {
            Ok(Some(cabs)) => {
                print::ok(format!("Restored cab calls from {}", self.path.display()));
                Some(cabs)
            }
            Ok(None) => {
                print::info(format!("No cab call backup at {}, starting empty", self.path.display()));
                None
            }
            Err(e) => {
                print::err(format!("Ignoring cab call backup: {:#}", e));
                None
            }
        }
    }

    /// Writes the cab table.
    ///
    /// The table is written next to the target first and renamed over it, so a crash mid-write
    /// leaves the previous file intact.
    pub fn save(&self, cabs: &CabRequests) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(cabs).context("could not serialize cab calls")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).with_context(|| format!("could not write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("could not replace {}", self.path.display()))?;
        Ok(())
    }
}
