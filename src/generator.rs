//! The run loop: select, plan, render, record, one video at a time.

use crate::assets::{self, MediaAsset, MediaKind, MediaProber};
use crate::config::{Config, SelectionMode};
use crate::error::{ReelError, Result};
use crate::hooks::{self, Hook};
use crate::init;
use crate::ledger::{self, HookLedger};
use crate::manifest::{VideoManifest, VideoManifestEntry};
use crate::naming::{self, FilenameParts};
use crate::narration::{Narration, NarrationSynthesizer};
use crate::plan::{CompositionPlanner, PlanInput, Renderer, VideoInfo};
use crate::tracking::{MusicRotation, SequentialTracker};
use crate::{loge, logi, logok, logw};
use chrono::NaiveDate;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Selecting,
    Rendering,
    Recording,
    Done,
    StoppedExhausted,
    FailedItem,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "INIT",
            RunState::Selecting => "SELECTING",
            RunState::Rendering => "RENDERING",
            RunState::Recording => "RECORDING",
            RunState::Done => "DONE",
            RunState::StoppedExhausted => "STOPPED_EXHAUSTED",
            RunState::FailedItem => "FAILED_ITEM",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Random hooks, each used at most once across runs.
    Random { count: usize },
    /// Every hook paired with every hook video, optionally capped.
    AllCombinations { cap: Option<usize> },
}

impl RunMode {
    pub fn from_config(config: &Config) -> Self {
        if config.generate_all_combinations {
            RunMode::AllCombinations {
                cap: (config.num_videos > 0).then_some(config.num_videos),
            }
        } else {
            RunMode::Random {
                count: config.num_videos,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub status: RunStatus,
    pub produced: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

struct Pools {
    hooks: Vec<Hook>,
    hook_videos: Vec<MediaAsset>,
    ctas: Vec<MediaAsset>,
    music: Vec<MediaAsset>,
}

pub struct RunDriver<R: Rng> {
    config: Config,
    prober: Arc<dyn MediaProber>,
    narrator: Option<Arc<dyn NarrationSynthesizer>>,
    renderer: Arc<dyn Renderer>,
    rng: R,
    today: NaiveDate,
    state: RunState,
}

impl<R: Rng> RunDriver<R> {
    pub fn new(
        config: Config,
        prober: Arc<dyn MediaProber>,
        renderer: Arc<dyn Renderer>,
        rng: R,
    ) -> Self {
        Self {
            config,
            prober,
            narrator: None,
            renderer,
            rng,
            today: chrono::Local::now().date_naive(),
            state: RunState::Init,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn NarrationSynthesizer>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    /// Date stamped into output file names.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.today = date;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, state: RunState) {
        tracing::debug!(from = %self.state, to = %state, "run state");
        self.state = state;
    }

    async fn load_pools(&self) -> Result<Pools> {
        let cfg = &self.config;
        let mut hooks = hooks::load_hooks(&cfg.hooks_file).await?;
        if !cfg.specific_hook_ids.is_empty() {
            hooks = hooks::filter_by_ids(hooks, &cfg.specific_hook_ids);
        }
        if hooks.is_empty() {
            return Err(ReelError::Config(format!(
                "No hooks available from {}",
                cfg.hooks_file.display()
            )));
        }

        Ok(Pools {
            hooks,
            hook_videos: assets::list_pool(&cfg.hook_videos_folder, MediaKind::Hook)?,
            ctas: assets::list_pool(&cfg.cta_videos_folder, MediaKind::Cta)?,
            music: assets::list_pool(&cfg.music_folder, MediaKind::Music)?,
        })
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        self.enter(RunState::Init);

        init::ensure_directories(&self.config).await?;
        let mut pools = self.load_pools().await?;
        let manifest = VideoManifest::new(&self.config.video_list_file);
        let last = manifest.last_number().await?;

        let mode = RunMode::from_config(&self.config);
        logi(format!(
            "Starting run: {:?}, {} hooks, {} hook videos, {} CTA clips, {} music tracks",
            mode,
            pools.hooks.len(),
            pools.hook_videos.len(),
            pools.ctas.len(),
            pools.music.len()
        ));

        let (status, produced, failed) = match mode {
            RunMode::Random { count } => self.run_random(&mut pools, &manifest, last, count).await?,
            RunMode::AllCombinations { cap } => {
                self.run_combinations(&mut pools, &manifest, last, cap).await
            }
        };

        self.enter(match status {
            RunStatus::Completed => RunState::Done,
            RunStatus::Exhausted => RunState::StoppedExhausted,
        });
        let summary = RunSummary {
            status,
            produced,
            failed,
            elapsed: started.elapsed(),
        };
        logok(format!(
            "Run finished: {} produced, {} failed in {:.1}s",
            summary.produced,
            summary.failed,
            summary.elapsed.as_secs_f64()
        ));
        Ok(summary)
    }

    async fn run_random(
        &mut self,
        pools: &mut Pools,
        manifest: &VideoManifest,
        last: u32,
        count: usize,
    ) -> Result<(RunStatus, usize, usize)> {
        let ledger = HookLedger::new(&self.config.used_hooks_file);
        let mut used = ledger.load().await?;
        if pools.hooks.iter().all(|h| used.contains(&h.text)) {
            logw("All hooks have been used. Add new hooks to continue.");
            return Ok((RunStatus::Exhausted, 0, 0));
        }

        let (mut produced, mut failed) = (0, 0);
        for i in 0..count {
            let number = last + i as u32 + 1;
            logi(format!("=== Video {}/{} (#{:03}) ===", i + 1, count, number));
            self.enter(RunState::Selecting);

            let hook = match ledger::pick_unused(&mut self.rng, &pools.hooks, &used) {
                Ok(hook) => hook,
                Err(e) if e.is_exhausted() => {
                    logw("No more unused hooks. Stopping.");
                    return Ok((RunStatus::Exhausted, produced, failed));
                }
                Err(e) => return Err(e),
            };
            logi(format!("Selected hook #{}: {}", hook.id, hook.text));

            let item = match self.pick_hook_video(pools).await {
                Ok(video) => self.produce(pools, number, &hook, video).await,
                Err(e) => Err(e),
            };
            match item {
                Ok(entry) => {
                    self.enter(RunState::Recording);
                    record_manifest(manifest, &entry).await;
                    if let Err(e) = ledger.record(&hook.text).await {
                        loge(format!(
                            "Could not persist used hook, it may repeat in a later run: {}",
                            e
                        ));
                    }
                    used.insert(hook.text.clone());
                    produced += 1;
                    logok(format!("DONE: {}", entry.final_video));
                }
                Err(e) => {
                    self.enter(RunState::FailedItem);
                    loge(format!("Video #{:03} failed: {}", number, e));
                    failed += 1;
                }
            }
        }
        Ok((RunStatus::Completed, produced, failed))
    }

    async fn run_combinations(
        &mut self,
        pools: &mut Pools,
        manifest: &VideoManifest,
        last: u32,
        cap: Option<usize>,
    ) -> (RunStatus, usize, usize) {
        let combos: Vec<(Hook, MediaAsset)> = pools
            .hooks
            .iter()
            .flat_map(|h| pools.hook_videos.iter().map(move |v| (h.clone(), v.clone())))
            .collect();
        if combos.is_empty() {
            logw("No hook/video combinations to generate.");
        }
        let total = cap.map_or(combos.len(), |c| c.min(combos.len()));
        logi(format!(
            "Generating {} of {} hook/video combinations",
            total,
            combos.len()
        ));

        let (mut produced, mut failed) = (0, 0);
        for (i, (hook, video)) in combos.into_iter().take(total).enumerate() {
            let number = last + i as u32 + 1;
            logi(format!(
                "=== Combination {}/{}: hook #{} x {} ===",
                i + 1,
                total,
                hook.id,
                video.file_name()
            ));
            self.enter(RunState::Selecting);
            match self.produce(pools, number, &hook, video).await {
                Ok(entry) => {
                    self.enter(RunState::Recording);
                    record_manifest(manifest, &entry).await;
                    produced += 1;
                    logok(format!("DONE: {}", entry.final_video));
                }
                Err(e) => {
                    self.enter(RunState::FailedItem);
                    loge(format!("Video #{:03} failed: {}", number, e));
                    failed += 1;
                }
            }
        }
        (RunStatus::Completed, produced, failed)
    }

    async fn pick_hook_video(&mut self, pools: &Pools) -> Result<MediaAsset> {
        match self.config.selection_mode {
            SelectionMode::Random => {
                assets::pick_random(&mut self.rng, &pools.hook_videos, MediaKind::Hook)
            }
            SelectionMode::Sequential => {
                SequentialTracker::new(&self.config.sequential_tracking_file)
                    .next_asset(
                        "ugc_hook_video",
                        &self.config.hook_videos_folder,
                        &pools.hook_videos,
                        MediaKind::Hook,
                    )
                    .await
            }
        }
    }

    async fn pick_ctas(&mut self, pools: &mut Pools) -> Vec<MediaAsset> {
        let cfg = &self.config;
        match cfg.selection_mode {
            SelectionMode::Random => {
                assets::pick_cta_bundle(
                    &mut self.rng,
                    self.prober.as_ref(),
                    &mut pools.ctas,
                    cfg.max_cta_videos,
                    cfg.max_cta_duration,
                )
                .await
            }
            SelectionMode::Sequential => {
                SequentialTracker::new(&cfg.sequential_tracking_file)
                    .next_cta_bundle(
                        &cfg.cta_videos_folder,
                        self.prober.as_ref(),
                        &mut pools.ctas,
                        cfg.max_cta_videos,
                        cfg.max_cta_duration,
                    )
                    .await
            }
        }
    }

    async fn pick_music(&mut self, pools: &Pools) -> Result<MediaAsset> {
        match self.config.music_mode() {
            SelectionMode::Random => assets::pick_music(&mut self.rng, &pools.music),
            SelectionMode::Sequential => {
                MusicRotation::new(&self.config.music_tracking_file)
                    .next_track(&self.config.music_folder, &pools.music)
                    .await
            }
        }
    }

    async fn narrate(&self, hook: &Hook) -> Option<Narration> {
        let narrator = self.narrator.as_ref()?;
        match narrator.synthesize(hook.narration_text()).await {
            Ok(narration) => Some(narration),
            Err(e) => {
                logw(format!("Continuing without narration: {}", e));
                None
            }
        }
    }

    /// Selects the remaining assets for one video, renders it, and returns
    /// the manifest row. Nothing is recorded here.
    async fn produce(
        &mut self,
        pools: &mut Pools,
        number: u32,
        hook: &Hook,
        hook_video: MediaAsset,
    ) -> Result<VideoManifestEntry> {
        let bundle = self.pick_ctas(pools).await;
        let music = self.pick_music(pools).await?;

        let prober = self.prober.as_ref();
        let hook_info = VideoInfo::probe(prober, &hook_video.path).await?;
        let mut ctas = Vec::with_capacity(bundle.len());
        for asset in bundle {
            match VideoInfo::probe(prober, &asset.path).await {
                Ok(info) if info.duration > 0.0 => ctas.push((asset, info)),
                Ok(_) => logw(format!("Skipping CTA with no duration: {}", asset.file_name())),
                Err(e) => logw(format!("Skipping unreadable CTA {}: {}", asset.file_name(), e)),
            }
        }
        let music_duration = prober.probe_duration(&music.path).await?;

        let narration = self.narrate(hook).await;
        let narration_path = narration.as_ref().map(|n| n.path.clone());

        let planned = CompositionPlanner::new(&self.config).plan(PlanInput {
            hook_asset: hook_video.clone(),
            hook_text: hook.text.clone(),
            hook_info,
            narration,
            ctas,
            music_asset: music.clone(),
            music_duration,
        });

        let rendered = match planned {
            Ok(plan) => {
                let final_video = naming::descriptive_filename(&FilenameParts {
                    date: self.today,
                    project: &self.config.project_name,
                    number,
                    hook_id: hook.id,
                    hook_text: &hook.text,
                    hook_video_stem: &hook_video.stem(),
                    cta_count: plan.ctas.len(),
                });
                let output = self.config.output_folder.join(&final_video);
                self.enter(RunState::Rendering);
                self.renderer.render(&plan, &output).await.map(|_| VideoManifestEntry {
                    hook_video: hook_video.file_name(),
                    hook_text: hook.text.clone(),
                    cta_videos: plan.cta_selection.iter().map(MediaAsset::file_name).collect(),
                    music_file: music.file_name(),
                    final_video,
                })
            }
            Err(e) => Err(e),
        };

        if let Some(path) = narration_path {
            let _ = fs::remove_file(&path).await;
        }
        rendered
    }
}

/// A lost manifest row breaks numbering for later runs, so it is logged as
/// an error, but the run goes on.
async fn record_manifest(manifest: &VideoManifest, entry: &VideoManifestEntry) {
    if let Err(e) = manifest.append(entry).await {
        loge(format!(
            "Could not append to manifest {}: {}",
            manifest.path().display(),
            e
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNarrator, FakeProber, FakeRenderer};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::Path;
    use tempfile::TempDir;

    const CTA_DURATIONS: [(&str, f64); 4] = [
        ("c1.mp4", 10.0),
        ("c2.mp4", 10.0),
        ("c3.mp4", 10.0),
        ("c4.mp4", 20.0),
    ];

    struct Fixture {
        dir: TempDir,
        config: Config,
        prober: Arc<FakeProber>,
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("content")).unwrap();
        std::fs::write(
            root.join("content/hooks.csv"),
            "id,text,tts\n1,Stop scrolling right now,\n2,\"Wait, watch this\",Wait and watch this\n3,Nobody tells you this,\n",
        )
        .unwrap();

        let mut prober = FakeProber::default();
        for name in ["h1.mp4", "h2.mp4"] {
            let p = root.join("hooks").join(name);
            touch(&p);
            prober.set_duration(&p, 4.0);
        }
        for (name, d) in CTA_DURATIONS {
            let p = root.join("ctas").join(name);
            touch(&p);
            prober.set_duration(&p, d);
        }
        let song = root.join("music/song.mp3");
        touch(&song);
        prober.set_duration(&song, 10.0);

        let mut config = Config::default();
        config.project_name = "test".into();
        config.hooks_file = root.join("content/hooks.csv");
        config.hook_videos_folder = root.join("hooks");
        config.cta_videos_folder = root.join("ctas");
        config.music_folder = root.join("music");
        config.output_folder = root.join("out");
        config.tts_files_folder = root.join("out/tts");
        config.used_hooks_file = root.join("content/used_hooks.txt");
        config.video_list_file = root.join("out/video_list.txt");
        config.log_file = root.join("out/run.log");
        config.sequential_tracking_file = root.join("out/seq.json");
        config.music_tracking_file = root.join("out/music.json");
        config.max_cta_videos = 3;
        config.max_cta_duration = 25.0;
        config.num_videos = 3;

        Fixture {
            dir,
            config,
            prober: Arc::new(prober),
        }
    }

    fn driver(fx: &Fixture, renderer: Arc<FakeRenderer>, seed: u64) -> RunDriver<StdRng> {
        RunDriver::new(
            fx.config.clone(),
            fx.prober.clone(),
            renderer,
            StdRng::seed_from_u64(seed),
        )
        .with_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn ledger_lines(fx: &Fixture) -> Vec<String> {
        std::fs::read_to_string(&fx.config.used_hooks_file)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_respects_cta_budget() {
        let fx = fixture();
        let renderer = Arc::new(FakeRenderer::default());
        let summary = driver(&fx, renderer.clone(), 7).run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.produced, 3);
        assert_eq!(summary.failed, 0);

        let plans = renderer.plans();
        assert_eq!(plans.len(), 3);
        for plan in &plans {
            assert!(plan.ctas.len() <= 3);
            let total: f64 = plan.ctas.iter().map(|s| s.play_duration).sum();
            assert!(total <= 25.0);
            assert_eq!(plan.music.segment, plan.total_duration);
            assert!(plan.narration.is_none());
        }

        let mut used = ledger_lines(&fx);
        used.sort();
        assert_eq!(
            used,
            vec!["Nobody tells you this", "Stop scrolling right now", "Wait, watch this"]
        );

        let manifest = VideoManifest::new(&fx.config.video_list_file);
        assert_eq!(manifest.last_number().await.unwrap(), 3);
        let outputs: Vec<String> = renderer
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, out)| out.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(outputs[0].starts_with("20240101_test_001_h"));
        assert!(outputs[2].starts_with("20240101_test_003_h"));
    }

    #[tokio::test]
    async fn test_stops_cleanly_when_hooks_run_out() {
        let mut fx = fixture();
        fx.config.num_videos = 5;
        let renderer = Arc::new(FakeRenderer::default());
        let mut first = driver(&fx, renderer.clone(), 1);
        let summary = first.run().await.unwrap();
        assert_eq!(summary.status, RunStatus::Exhausted);
        assert_eq!(summary.produced, 3);
        assert_eq!(first.state(), RunState::StoppedExhausted);

        // A later run stops before selecting anything.
        let again = Arc::new(FakeRenderer::default());
        let summary = driver(&fx, again.clone(), 2).run().await.unwrap();
        assert_eq!(summary.status, RunStatus::Exhausted);
        assert_eq!(summary.produced, 0);
        assert!(again.plans().is_empty());
    }

    #[tokio::test]
    async fn test_failed_render_does_not_consume_hook() {
        let mut fx = fixture();
        fx.config.num_videos = 1;
        let renderer = Arc::new(FakeRenderer::failing_on(&[0]));
        let mut d = driver(&fx, renderer.clone(), 3);
        let summary = d.run().await.unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!((summary.produced, summary.failed), (0, 1));
        assert_eq!(d.state(), RunState::Done);
        assert!(ledger_lines(&fx).is_empty());
        assert!(!fx.config.video_list_file.exists());

        let failed_hook = renderer.plans()[0].hook_text.clone();

        // Every hook, including the one that failed, is still available.
        fx.config.num_videos = 3;
        let renderer = Arc::new(FakeRenderer::default());
        let summary = driver(&fx, renderer.clone(), 4).run().await.unwrap();
        assert_eq!(summary.produced, 3);
        assert!(renderer.plans().iter().any(|p| p.hook_text == failed_hook));
        assert!(ledger_lines(&fx).contains(&failed_hook));
    }

    #[tokio::test]
    async fn test_failed_hook_can_be_picked_again_in_same_run() {
        let mut fx = fixture();
        fx.config.num_videos = 2;
        let renderer = Arc::new(FakeRenderer::failing_on(&[0]));
        let summary = driver(&fx, renderer.clone(), 5).run().await.unwrap();
        assert_eq!((summary.produced, summary.failed), (1, 1));

        let plans = renderer.plans();
        let used = ledger_lines(&fx);
        assert_eq!(used, vec![plans[1].hook_text.clone()]);
        // Only a later successful render may put the failed hook in the ledger.
        assert_eq!(
            used.contains(&plans[0].hook_text),
            plans[1].hook_text == plans[0].hook_text
        );
    }

    #[tokio::test]
    async fn test_numbering_continues_from_manifest() {
        let mut fx = fixture();
        fx.config.num_videos = 1;
        std::fs::create_dir_all(fx.dir.path().join("out")).unwrap();
        std::fs::write(
            &fx.config.video_list_file,
            "hook_video,hook_text,cta_videos,music_file,final_video\nh1.mp4,x,c1.mp4,song.mp3,20231231_test_007_h1_x_h1_1cta.mp4\n",
        )
        .unwrap();

        let renderer = Arc::new(FakeRenderer::default());
        driver(&fx, renderer.clone(), 6).run().await.unwrap();
        let calls = renderer.calls.lock().unwrap();
        let name = calls[0].1.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("20240101_test_008_h"), "{}", name);
        drop(calls);

        let manifest = VideoManifest::new(&fx.config.video_list_file);
        assert_eq!(manifest.last_number().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_all_combinations_with_and_without_cap() {
        let mut fx = fixture();
        fx.config.generate_all_combinations = true;
        fx.config.num_videos = 0;
        let renderer = Arc::new(FakeRenderer::default());
        let summary = driver(&fx, renderer.clone(), 8).run().await.unwrap();
        assert_eq!(summary.produced, 6);
        assert!(ledger_lines(&fx).is_empty());

        let pairs: Vec<(String, String)> = renderer
            .plans()
            .iter()
            .map(|p| (p.hook_text.clone(), p.hook_asset.file_name()))
            .collect();
        assert_eq!(pairs[0], ("Stop scrolling right now".to_string(), "h1.mp4".to_string()));
        assert_eq!(pairs[1], ("Stop scrolling right now".to_string(), "h2.mp4".to_string()));
        assert_eq!(pairs[2].0, "Wait, watch this");

        fx.config.num_videos = 4;
        let renderer = Arc::new(FakeRenderer::default());
        let summary = driver(&fx, renderer.clone(), 9).run().await.unwrap();
        assert_eq!(summary.produced, 4);
    }

    #[tokio::test]
    async fn test_missing_asset_dir_is_config_error() {
        let mut fx = fixture();
        fx.config.cta_videos_folder = fx.dir.path().join("nope");
        let renderer = Arc::new(FakeRenderer::default());
        let err = driver(&fx, renderer.clone(), 10).run().await.unwrap_err();
        assert!(matches!(err, ReelError::Config(_)));
        assert!(renderer.plans().is_empty());
    }

    #[tokio::test]
    async fn test_narration_extends_hook_and_uses_tts_text() {
        let mut fx = fixture();
        fx.config.specific_hook_ids = vec![2];
        fx.config.num_videos = 1;
        let narrator = Arc::new(FakeNarrator::new(Some(9.0)));
        let renderer = Arc::new(FakeRenderer::default());
        driver(&fx, renderer.clone(), 11)
            .with_narrator(narrator.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(*narrator.spoken.lock().unwrap(), vec!["Wait and watch this"]);
        let plan = &renderer.plans()[0];
        assert_eq!(plan.hook_play_duration(), 9.0);
        assert_eq!(plan.hook.loops, 3);
        assert!((plan.volumes.music - 0.06).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_narration_failure_falls_back_to_plain_hook() {
        let mut fx = fixture();
        fx.config.num_videos = 1;
        let renderer = Arc::new(FakeRenderer::default());
        let summary = driver(&fx, renderer.clone(), 12)
            .with_narrator(Arc::new(FakeNarrator::new(None)))
            .run()
            .await
            .unwrap();
        assert_eq!(summary.produced, 1);
        let plan = &renderer.plans()[0];
        assert!(plan.narration.is_none());
        assert_eq!(plan.hook_play_duration(), 4.0);
    }

    #[tokio::test]
    async fn test_sequential_mode_rotates_hook_videos() {
        let mut fx = fixture();
        fx.config.selection_mode = SelectionMode::Sequential;
        let renderer = Arc::new(FakeRenderer::default());
        driver(&fx, renderer.clone(), 13).run().await.unwrap();
        let videos: Vec<String> = renderer
            .plans()
            .iter()
            .map(|p| p.hook_asset.file_name())
            .collect();
        assert_eq!(videos, vec!["h1.mp4", "h2.mp4", "h1.mp4"]);
        for plan in renderer.plans() {
            let total: f64 = plan.ctas.iter().map(|s| s.play_duration).sum();
            assert!(plan.ctas.len() <= 3 && total <= 25.0);
        }
    }

    #[tokio::test]
    async fn test_ledger_write_failure_keeps_hooks_used_in_memory() {
        let fx = fixture();
        let ledger_path = fx.config.used_hooks_file.clone();
        // A directory in place of the ledger file makes every append fail.
        let renderer = Arc::new(FakeRenderer::after_render(move |_| {
            let _ = std::fs::create_dir_all(&ledger_path);
        }));
        let summary = driver(&fx, renderer.clone(), 14).run().await.unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!((summary.produced, summary.failed), (3, 0));
        assert!(fx.config.used_hooks_file.is_dir());

        let mut texts: Vec<String> = renderer.plans().iter().map(|p| p.hook_text.clone()).collect();
        texts.sort();
        texts.dedup();
        assert_eq!(texts.len(), 3);

        let manifest = VideoManifest::new(&fx.config.video_list_file);
        assert_eq!(manifest.last_number().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_manifest_write_failure_does_not_stop_run() {
        let fx = fixture();
        let manifest_path = fx.config.video_list_file.clone();
        let renderer = Arc::new(FakeRenderer::after_render(move |_| {
            let _ = std::fs::create_dir_all(&manifest_path);
        }));
        let summary = driver(&fx, renderer.clone(), 15).run().await.unwrap();
        assert_eq!((summary.produced, summary.failed), (3, 0));
        assert!(fx.config.video_list_file.is_dir());
        assert_eq!(ledger_lines(&fx).len(), 3);

        let names: Vec<String> = renderer
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, out)| out.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        for (i, name) in names.iter().enumerate() {
            let prefix = format!("20240101_test_{:03}_h", i + 1);
            assert!(name.starts_with(&prefix), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_unprobeable_cta_is_dropped_from_video() {
        let mut fx = fixture();
        touch(&fx.dir.path().join("ctas/broken.mp4"));
        fx.config.num_videos = 1;
        fx.config.max_cta_videos = 5;
        let renderer = Arc::new(FakeRenderer::default());
        let summary = driver(&fx, renderer.clone(), 16).run().await.unwrap();
        assert_eq!((summary.produced, summary.failed), (1, 0));

        let plan = &renderer.plans()[0];
        assert!(!plan.ctas.is_empty());
        assert!(plan.ctas.iter().all(|s| !s.path.ends_with("broken.mp4")));
        let total: f64 = plan.ctas.iter().map(|s| s.play_duration).sum();
        assert!(total <= 25.0);

        let manifest = std::fs::read_to_string(&fx.config.video_list_file).unwrap();
        assert!(!manifest.contains("broken.mp4"));
    }

    #[tokio::test]
    async fn test_log_hook_sees_progress_lines() {
        let mut fx = fixture();
        fx.config.project_name = "hookedRun".into();
        let lines = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let sink = lines.clone();
        let hook: crate::GeneratorLogHook = Arc::new(std::sync::Mutex::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }));

        crate::set_log_hook(Some(hook));
        let summary = driver(&fx, Arc::new(FakeRenderer::default()), 17).run().await;
        crate::set_log_hook(None);

        assert_eq!(summary.unwrap().produced, 3);
        let lines = lines.lock().unwrap();
        let done = lines
            .iter()
            .filter(|l| l.starts_with("[OK] DONE: 20240101_hookedRun_"))
            .count();
        assert_eq!(done, 3);
    }
}
