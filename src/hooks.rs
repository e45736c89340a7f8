use crate::error::{ReelError, Result};
use crate::records;
use crate::{logi, logw};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub id: i64,
    pub text: String,
    /// Alternate text for the narration voice.
    pub tts: Option<String>,
}

impl Hook {
    pub fn narration_text(&self) -> &str {
        match self.tts.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.text,
        }
    }
}

/// Line breaks inside a quoted hook become spaces, matching what the
/// ledger stores.
fn single_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

pub fn parse_hooks(text: &str) -> Result<Vec<Hook>> {
    let mut records = records::parse_records(text).into_iter();
    let header = records
        .next()
        .ok_or_else(|| ReelError::Config("hooks file is empty".to_string()))?;
    let columns: Vec<String> = header
        .into_iter()
        .map(|c| c.trim().to_ascii_lowercase())
        .collect();

    let col = |name: &str| columns.iter().position(|c| c == name);
    let id_col = col("id").ok_or_else(|| ReelError::Config("hooks file has no `id` column".into()))?;
    let text_col =
        col("text").ok_or_else(|| ReelError::Config("hooks file has no `text` column".into()))?;
    let tts_col = col("tts");

    let mut seen = HashSet::new();
    let mut hooks = Vec::new();
    for (row, fields) in records.enumerate() {
        let field = |i: usize| fields.get(i).map(|s| s.trim()).unwrap_or("");

        let text = single_line(field(text_col));
        if text.is_empty() {
            logw(format!("Skipping hook row {} (empty text)", row + 1));
            continue;
        }
        let id = match field(id_col).parse::<i64>() {
            Ok(id) => id,
            Err(_) => {
                logw(format!("Skipping hook row {} (bad id {:?})", row + 1, field(id_col)));
                continue;
            }
        };
        if !seen.insert(text.clone()) {
            logw(format!("Duplicate hook text ignored (id {}): {}", id, text));
            continue;
        }
        let tts = tts_col
            .map(field)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        hooks.push(Hook { id, text, tts });
    }

    Ok(hooks)
}

pub async fn load_hooks(path: &Path) -> Result<Vec<Hook>> {
    if fs::metadata(path).await.is_err() {
        return Err(ReelError::Config(format!(
            "Hooks CSV file not found: {}",
            path.display()
        )));
    }
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| ReelError::storage(path, e))?;
    let hooks = parse_hooks(&text)?;
    logi(format!("Loaded {} hooks from {}", hooks.len(), path.display()));
    Ok(hooks)
}

pub fn filter_by_ids(hooks: Vec<Hook>, ids: &[i64]) -> Vec<Hook> {
    if ids.is_empty() {
        return hooks;
    }
    for id in ids {
        if !hooks.iter().any(|h| h.id == *id) {
            logw(format!("Requested hook id {} not found", id));
        }
    }
    hooks.into_iter().filter(|h| ids.contains(&h.id)).collect()
}
