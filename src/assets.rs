use crate::error::{ReelError, Result};
use crate::{logi, logw};
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];
const MUSIC_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Hook,
    Cta,
    Music,
}

impl MediaKind {
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Hook | MediaKind::Cta => VIDEO_EXTENSIONS,
            MediaKind::Music => MUSIC_EXTENSIONS,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Hook => "hook",
            MediaKind::Cta => "cta",
            MediaKind::Music => "music",
        };
        f.write_str(name)
    }
}

/// Read-only view of an external media prober (ffprobe in production).
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe_duration(&self, path: &Path) -> Result<f64>;
    async fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32)>;
    async fn has_audio(&self, path: &Path) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub kind: MediaKind,
    /// Seconds; `None` until probed.
    pub duration: Option<f64>,
}

impl MediaAsset {
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind) -> Self {
        Self {
            path: path.into(),
            kind,
            duration: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Probes once and caches. A failed probe counts as zero seconds.
    pub async fn ensure_duration(&mut self, prober: &dyn MediaProber) -> f64 {
        if let Some(d) = self.duration {
            return d;
        }
        let d = match prober.probe_duration(&self.path).await {
            Ok(d) => d,
            Err(err) => {
                logw(format!(
                    "Error getting duration for {}: {} (treating as 0s)",
                    self.path.display(),
                    err
                ));
                0.0
            }
        };
        self.duration = Some(d);
        d
    }
}

/// Lists the media files of `kind` directly inside `dir`, sorted by name.
pub fn list_pool(dir: &Path, kind: MediaKind) -> Result<Vec<MediaAsset>> {
    if !dir.is_dir() {
        return Err(ReelError::Config(format!(
            "Folder not found: {}",
            dir.display()
        )));
    }

    let exts = kind.extensions();
    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| ReelError::Config(format!("{}: {}", dir.display(), e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(OsStr::to_str)
            .map(|ext| exts.iter().any(|want| ext.eq_ignore_ascii_case(want)))
            .unwrap_or(false);
        if matches {
            out.push(MediaAsset::new(entry.path(), kind));
        }
    }

    if out.is_empty() {
        logw(format!("No {} files found in {}", kind, dir.display()));
    }
    Ok(out)
}

pub fn pick_random<R: Rng + ?Sized>(
    rng: &mut R,
    pool: &[MediaAsset],
    kind: MediaKind,
) -> Result<MediaAsset> {
    let picked = pool
        .choose(rng)
        .cloned()
        .ok_or(ReelError::EmptyPool { kind })?;
    logi(format!("Selected {}: {}", kind, picked.file_name()));
    Ok(picked)
}

pub fn pick_music<R: Rng + ?Sized>(rng: &mut R, pool: &[MediaAsset]) -> Result<MediaAsset> {
    pick_random(rng, pool, MediaKind::Music)
}

/// Count and duration limits for one CTA bundle.
#[derive(Debug, Clone)]
pub struct CtaBudget {
    max_count: usize,
    max_duration: f64,
    count: usize,
    total: f64,
}

impl CtaBudget {
    pub fn new(max_count: usize, max_duration: f64) -> Self {
        Self {
            max_count,
            max_duration,
            count: 0,
            total: 0.0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.max_count
    }

    pub fn try_accept(&mut self, duration: f64) -> bool {
        let duration = duration.max(0.0);
        if self.is_full() || self.total + duration > self.max_duration {
            return false;
        }
        self.count += 1;
        self.total += duration;
        true
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

/// Greedy single pass over a shuffled pool. Not an optimal packing: an
/// early long clip can crowd out several shorter ones that would have fit.
pub async fn pick_cta_bundle<R: Rng + ?Sized>(
    rng: &mut R,
    prober: &dyn MediaProber,
    pool: &mut [MediaAsset],
    max_count: usize,
    max_duration: f64,
) -> Vec<MediaAsset> {
    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.shuffle(rng);

    for &idx in &order {
        pool[idx].ensure_duration(prober).await;
    }

    let mut budget = CtaBudget::new(max_count, max_duration);
    let mut bundle = Vec::new();
    for &idx in &order {
        if budget.is_full() {
            break;
        }
        let asset = &pool[idx];
        if budget.try_accept(asset.duration.unwrap_or(0.0)) {
            bundle.push(asset.clone());
        }
    }

    logi(format!(
        "Selected {} CTA videos with total duration {:.2}s",
        bundle.len(),
        budget.total()
    ));
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProber;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn cta_pool(durations: &[f64]) -> (FakeProber, Vec<MediaAsset>) {
        let mut prober = FakeProber::default();
        let mut pool = Vec::new();
        for (i, d) in durations.iter().enumerate() {
            let path = PathBuf::from(format!("ctas/cta_{}.mp4", i));
            prober.set_duration(&path, *d);
            pool.push(MediaAsset::new(path, MediaKind::Cta));
        }
        (prober, pool)
    }

    #[test]
    fn test_budget_rejects_overflow() {
        let mut budget = CtaBudget::new(3, 25.0);
        assert!(budget.try_accept(10.0));
        assert!(!budget.try_accept(20.0));
        assert!(budget.try_accept(10.0));
        assert!(!budget.try_accept(10.0));
        assert!(budget.try_accept(5.0));
        assert!(budget.is_full());
        assert!(!budget.try_accept(0.0));
        assert_eq!(budget.total(), 25.0);
    }

    #[tokio::test]
    async fn test_cta_bundle_respects_budget_across_seeds() {
        for seed in 0..64 {
            let (prober, mut pool) = cta_pool(&[10.0, 10.0, 10.0, 20.0]);
            let mut rng = StdRng::seed_from_u64(seed);
            let bundle = pick_cta_bundle(&mut rng, &prober, &mut pool, 3, 25.0).await;
            let total: f64 = bundle.iter().map(|a| a.duration.unwrap()).sum();
            assert!(bundle.len() <= 3, "seed {seed}");
            assert!(total <= 25.0, "seed {seed}: {total}");
            assert!(!bundle.is_empty(), "seed {seed}");
        }
    }

    #[tokio::test]
    async fn test_oversized_assets_are_skipped() {
        let (prober, mut pool) = cta_pool(&[90.0, 120.0, 61.0]);
        let mut rng = StdRng::seed_from_u64(7);
        let bundle = pick_cta_bundle(&mut rng, &prober, &mut pool, 3, 60.0).await;
        assert!(bundle.is_empty());
    }

    #[tokio::test]
    async fn test_count_limit_stops_packing() {
        let (prober, mut pool) = cta_pool(&[1.0; 8]);
        let mut rng = StdRng::seed_from_u64(3);
        let bundle = pick_cta_bundle(&mut rng, &prober, &mut pool, 3, 60.0).await;
        assert_eq!(bundle.len(), 3);
    }

    #[tokio::test]
    async fn test_probe_failure_counts_as_zero() {
        let (prober, mut pool) = cta_pool(&[30.0]);
        pool.push(MediaAsset::new("ctas/broken.mp4", MediaKind::Cta));
        let mut rng = StdRng::seed_from_u64(11);
        let bundle = pick_cta_bundle(&mut rng, &prober, &mut pool, 3, 30.0).await;
        assert_eq!(bundle.len(), 2);
        let broken = pool.iter().find(|a| a.file_name() == "broken.mp4").unwrap();
        assert_eq!(broken.duration, Some(0.0));
    }

    #[test]
    fn test_pick_random_empty_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = pick_music(&mut rng, &[]).unwrap_err();
        assert!(matches!(err, ReelError::EmptyPool { kind: MediaKind::Music }));
    }

    #[test]
    fn test_list_pool_filters_extensions() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["b.mp4", "a.MOV", "c.mp3", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let videos = list_pool(dir.path(), MediaKind::Hook).unwrap();
        let names: Vec<String> = videos.iter().map(|a| a.file_name()).collect();
        assert_eq!(names, vec!["a.MOV", "b.mp4"]);

        let music = list_pool(dir.path(), MediaKind::Music).unwrap();
        assert_eq!(music.len(), 1);
        assert_eq!(music[0].kind, MediaKind::Music);
    }

    #[test]
    fn test_list_pool_missing_dir_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = list_pool(&dir.path().join("missing"), MediaKind::Cta).unwrap_err();
        assert!(matches!(err, ReelError::Config(_)));
    }
}
