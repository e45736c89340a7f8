use crate::error::{ReelError, Result};
use crate::hooks::Hook;
use crate::logi;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Append-only record of hook texts already turned into videos.
#[derive(Debug, Clone)]
pub struct HookLedger {
    path: PathBuf,
}

impl HookLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absence of the file means nothing has been used yet.
    pub async fn load(&self) -> Result<HashSet<String>> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                logi("No used hooks file found. Starting fresh.");
                return Ok(HashSet::new());
            }
            Err(e) => return Err(ReelError::storage(&self.path, e)),
        };

        let used: HashSet<String> = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        logi(format!("Loaded {} used hooks.", used.len()));
        Ok(used)
    }

    /// Appends one line. The caller guarantees `text` is new.
    pub async fn record(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ReelError::storage(parent, e))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ReelError::storage(&self.path, e))?;
        let line = format!("{}\n", text.replace(['\r', '\n'], " "));
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ReelError::storage(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| ReelError::storage(&self.path, e))?;
        logi(format!("Saved used hook: {}", text));
        Ok(())
    }
}

/// Uniform choice among hooks whose text is not in `used`.
pub fn pick_unused<R: Rng + ?Sized>(
    rng: &mut R,
    all_hooks: &[Hook],
    used: &HashSet<String>,
) -> Result<Hook> {
    let candidates: Vec<&Hook> = all_hooks
        .iter()
        .filter(|h| !used.contains(&h.text))
        .collect();
    candidates
        .choose(rng)
        .map(|h| (*h).clone())
        .ok_or(ReelError::Exhausted)
}
