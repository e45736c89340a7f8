use crate::assets::{CtaBudget, MediaAsset, MediaKind, MediaProber};
use crate::error::{ReelError, Result};
use crate::{logi, logw};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;

async fn read_tracking(path: &Path) -> Map<String, Value> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(_) => return Map::new(),
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => map,
        _ => {
            logw(format!(
                "Could not load tracking file {}, creating new",
                path.display()
            ));
            Map::new()
        }
    }
}

async fn write_tracking(path: &Path, data: &Map<String, Value>) {
    let result = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(data)?;
        fs::write(path, body).await?;
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(err) = result {
        logw(format!(
            "Error updating tracking file {}: {}",
            path.display(),
            err
        ));
    }
}

/// Round-robin cursor over sorted asset folders, persisted as JSON.
#[derive(Debug, Clone)]
pub struct SequentialTracker {
    path: PathBuf,
}

impl SequentialTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn key(category: &str, folder: &Path) -> String {
        format!("{}:{}", category, folder.display())
    }

    /// Next asset after the last one handed out for `category`.
    pub async fn next_asset(
        &self,
        category: &str,
        folder: &Path,
        pool: &[MediaAsset],
        kind: MediaKind,
    ) -> Result<MediaAsset> {
        if pool.is_empty() {
            return Err(ReelError::EmptyPool { kind });
        }
        let mut data = read_tracking(&self.path).await;
        let key = Self::key(category, folder);
        let last = data.get(&key).and_then(Value::as_i64).unwrap_or(-1);
        let next = ((last + 1).max(0) as usize) % pool.len();

        data.insert(key, Value::from(next as i64));
        write_tracking(&self.path, &data).await;

        let picked = pool[next].clone();
        logi(format!(
            "Selected {} sequentially ({}/{}): {}",
            kind,
            next + 1,
            pool.len(),
            picked.file_name()
        ));
        Ok(picked)
    }

    /// Walks the pool in order from the saved cursor, at most twice around,
    /// accepting clips under the same count and duration limits as the
    /// random packer.
    pub async fn next_cta_bundle(
        &self,
        folder: &Path,
        prober: &dyn MediaProber,
        pool: &mut [MediaAsset],
        max_count: usize,
        max_duration: f64,
    ) -> Vec<MediaAsset> {
        if pool.is_empty() {
            return Vec::new();
        }
        let mut data = read_tracking(&self.path).await;
        let key = Self::key("ugc_cta_video", folder);
        let mut current = data.get(&key).and_then(Value::as_i64).unwrap_or(-1);

        let n = pool.len();
        let mut budget = CtaBudget::new(max_count, max_duration);
        let mut bundle: Vec<MediaAsset> = Vec::new();
        let mut checked = 0;
        while !budget.is_full() && checked < n * 2 {
            let idx = ((current + 1).max(0) as usize) % n;
            let duration = pool[idx].ensure_duration(prober).await;
            // The same file never appears twice in one bundle.
            let already = bundle.iter().any(|a| a.path == pool[idx].path);
            if !already && budget.try_accept(duration) {
                bundle.push(pool[idx].clone());
                logi(format!(
                    "Selected sequential CTA video {}/{}: {}",
                    idx + 1,
                    n,
                    pool[idx].file_name()
                ));
            }
            current = idx as i64;
            checked += 1;
        }

        data.insert(key, Value::from(current));
        write_tracking(&self.path, &data).await;

        logi(format!(
            "Selected {} sequential CTA videos with total duration {:.2}s",
            bundle.len(),
            budget.total()
        ));
        bundle
    }
}

/// Music rotation: every file is used once before any repeats.
#[derive(Debug, Clone)]
pub struct MusicRotation {
    path: PathBuf,
}

impl MusicRotation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn next_track(&self, folder: &Path, pool: &[MediaAsset]) -> Result<MediaAsset> {
        if pool.is_empty() {
            return Err(ReelError::EmptyPool {
                kind: MediaKind::Music,
            });
        }
        let mut data = read_tracking(&self.path).await;
        let key = folder.display().to_string();
        let mut used: Vec<String> = data
            .get(&key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let picked = match pool.iter().find(|a| !used.contains(&a.file_name())) {
            Some(asset) => {
                used.push(asset.file_name());
                asset.clone()
            }
            None => {
                logi("All music files have been used, starting fresh cycle");
                used = vec![pool[0].file_name()];
                pool[0].clone()
            }
        };

        data.insert(key, Value::from(used));
        write_tracking(&self.path, &data).await;
        logi(format!("Selected sequential music: {}", picked.file_name()));
        Ok(picked)
    }
}
