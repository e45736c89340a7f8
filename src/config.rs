use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Random,
    Sequential,
}

/// Short-form safe area, in pixels of the target frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeMargins {
    pub enabled: bool,
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
    pub horizontal_text_margin: u32,
    pub text_y_position: Option<u32>,
}

impl Default for SafeMargins {
    fn default() -> Self {
        Self {
            enabled: true,
            top: 252,
            bottom: 640,
            left: 120,
            right: 240,
            horizontal_text_margin: 240,
            text_y_position: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub enabled: bool,
    #[serde(rename = "elevenlabs_api_key")]
    pub elevenlabs_key: String,
    #[serde(rename = "eleven_voice_id")]
    pub voice_id: String,
    #[serde(rename = "eleven_model_id")]
    pub model_id: String,
    pub save_tts_files: bool,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            elevenlabs_key: String::new(),
            voice_id: default_voice_id(),
            model_id: default_model_id(),
            save_tts_files: true,
        }
    }
}

fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}

fn default_model_id() -> String {
    "eleven_monolingual_v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project_name: String,
    pub target_resolution: Resolution,
    pub fps: u32,

    pub hooks_file: PathBuf,
    #[serde(rename = "hooks_videos_folder")]
    pub hook_videos_folder: PathBuf,
    pub cta_videos_folder: PathBuf,
    pub music_folder: PathBuf,
    pub output_folder: PathBuf,
    pub tts_files_folder: PathBuf,
    pub used_hooks_file: PathBuf,
    pub video_list_file: PathBuf,
    pub log_file: PathBuf,

    pub font: PathBuf,
    pub font_size: u32,
    pub text_color: String,
    pub stroke_color: String,
    pub stroke_width: u32,

    pub num_videos: usize,
    pub max_cta_videos: usize,
    pub max_cta_duration: f64,
    pub generate_all_combinations: bool,
    pub specific_hook_ids: Vec<i64>,

    #[serde(rename = "file_selection_mode")]
    pub selection_mode: SelectionMode,
    pub music_selection_mode: Option<SelectionMode>,
    pub sequential_tracking_file: PathBuf,
    pub music_tracking_file: PathBuf,

    pub tiktok_margins: SafeMargins,
    pub narration: NarrationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: "ugcReelGen".to_string(),
            target_resolution: Resolution::default(),
            fps: 24,
            hooks_file: PathBuf::from("content/hooks.csv"),
            hook_videos_folder: PathBuf::from("assets/videos/hooks"),
            cta_videos_folder: PathBuf::from("assets/videos/ctas"),
            music_folder: PathBuf::from("assets/music"),
            output_folder: PathBuf::from("output/ugc"),
            tts_files_folder: PathBuf::from("output/ugc/tts_files"),
            used_hooks_file: PathBuf::from("content/used_hooks.txt"),
            video_list_file: PathBuf::from("output/ugc/video_list.txt"),
            log_file: PathBuf::from("output/ugc/video_creation.log"),
            font: PathBuf::from("assets/fonts/BeVietnamPro-Bold.ttf"),
            font_size: 70,
            text_color: "white".to_string(),
            stroke_color: "black".to_string(),
            stroke_width: 2,
            num_videos: 1,
            max_cta_videos: 3,
            max_cta_duration: 60.0,
            generate_all_combinations: false,
            specific_hook_ids: Vec::new(),
            selection_mode: SelectionMode::Random,
            music_selection_mode: None,
            sequential_tracking_file: PathBuf::from("output/ugc/sequential_tracking.json"),
            music_tracking_file: PathBuf::from("output/music_tracking.json"),
            tiktok_margins: SafeMargins::default(),
            narration: NarrationConfig::default(),
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid config: {}", path.as_ref().display()))
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if fs::metadata(&path).await.is_ok() {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;

        if config.target_resolution.width == 0 || config.target_resolution.height == 0 {
            anyhow::bail!("config: target_resolution must be non-zero");
        }
        if config.max_cta_duration < 0.0 {
            anyhow::bail!("config: max_cta_duration must not be negative");
        }

        Ok(config)
    }

    /// Applies `ELEVENLABS_API_KEY` and `ELEVENLABS_VOICE` when set.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("ELEVENLABS_API_KEY") {
            if !key.trim().is_empty() {
                self.narration.elevenlabs_key = key.trim().to_string();
            }
        }
        if let Ok(voice) = std::env::var("ELEVENLABS_VOICE") {
            if !voice.trim().is_empty() {
                self.narration.voice_id = voice.trim().to_string();
            }
        }
    }

    pub fn music_mode(&self) -> SelectionMode {
        self.music_selection_mode.unwrap_or(self.selection_mode)
    }

    pub fn narration_available(&self) -> bool {
        self.narration.enabled && !self.narration.elevenlabs_key.is_empty()
    }
}
