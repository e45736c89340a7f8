//! Turns a selected hook, narration, CTA bundle and music track into a fully
//! resolved timeline. Nothing here touches media; the result is handed to a
//! [`Renderer`].

use crate::assets::{MediaAsset, MediaProber};
use crate::config::{Config, Resolution, SafeMargins};
use crate::error::{ReelError, Result};
use crate::narration::Narration;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Hook soundtrack level while narration plays over it.
pub const HOOK_AUDIO_UNDER_NARRATION: f64 = 0.1;
pub const NARRATION_VOLUME: f64 = 1.0;
pub const MUSIC_BASE_VOLUME: f64 = 0.3;
/// Extra factor on the music bed when narration is present.
pub const MUSIC_UNDER_NARRATION: f64 = 0.2;

const DEFAULT_TEXT_Y: u32 = 350;
const DEFAULT_TEXT_MARGIN: u32 = 120;
const SAFE_AREA_TEXT_FACTOR: f64 = 0.33;
const GLYPH_WIDTH_RATIO: f64 = 0.55;
const SHADOW_OPACITY: f64 = 0.2;

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, plan: &CompositionPlan, output: &Path) -> Result<()>;
}

/// Probed facts about one video file.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub has_audio: bool,
}

impl VideoInfo {
    pub async fn probe(prober: &dyn MediaProber, path: &Path) -> Result<Self> {
        let (width, height) = prober.probe_dimensions(path).await?;
        let duration = prober.probe_duration(path).await?;
        let has_audio = prober.has_audio(path).await;
        Ok(Self {
            width,
            height,
            duration,
            has_audio,
        })
    }
}

/// Uniform scale that covers the target frame, then a centred crop.
/// The frame is always filled; overflow on one axis is cut away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameFit {
    pub scale: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub crop_x: u32,
    pub crop_y: u32,
    pub target: Resolution,
}

pub fn fill_and_crop(width: u32, height: u32, target: Resolution) -> Result<FrameFit> {
    if width == 0 || height == 0 {
        return Err(ReelError::Plan(format!(
            "invalid source dimensions {}x{}",
            width, height
        )));
    }
    let scale = f64::max(
        target.width as f64 / width as f64,
        target.height as f64 / height as f64,
    );
    let scaled_width = ((width as f64 * scale).round() as u32).max(target.width);
    let scaled_height = ((height as f64 * scale).round() as u32).max(target.height);

    Ok(FrameFit {
        scale,
        scaled_width,
        scaled_height,
        crop_x: (scaled_width - target.width) / 2,
        crop_y: (scaled_height - target.height) / 2,
        target,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub path: PathBuf,
    pub fit: FrameFit,
    pub source_duration: f64,
    pub play_duration: f64,
    /// Times the source is played back to back; the last pass is cut at
    /// `play_duration`.
    pub loops: u32,
    pub has_audio: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub lines: Vec<String>,
    pub font: PathBuf,
    pub font_size: u32,
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    pub shadow_opacity: f64,
    /// Horizontal centre of the text block.
    pub center_x: u32,
    pub box_width: u32,
    /// Top of the text block.
    pub y: u32,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicPlan {
    pub path: PathBuf,
    pub source_duration: f64,
    pub loops: u32,
    /// Trimmed length, equal to the whole timeline.
    pub segment: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volumes {
    /// `None` when the hook clip has no soundtrack.
    pub hook_audio: Option<f64>,
    pub narration: Option<f64>,
    pub music: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositionPlan {
    pub hook_asset: MediaAsset,
    pub hook_text: String,
    pub narration: Option<Narration>,
    pub hook: Segment,
    pub overlay: TextOverlay,
    pub cta_selection: Vec<MediaAsset>,
    pub ctas: Vec<Segment>,
    pub music_asset: MediaAsset,
    pub music: MusicPlan,
    pub volumes: Volumes,
    pub total_duration: f64,
    pub frame: Resolution,
    pub fps: u32,
}

impl CompositionPlan {
    pub fn narration_duration(&self) -> Option<f64> {
        self.narration.as_ref().map(|n| n.duration)
    }

    pub fn hook_play_duration(&self) -> f64 {
        self.hook.play_duration
    }

    pub fn music_segment(&self) -> f64 {
        self.music.segment
    }
}

pub struct PlanInput {
    pub hook_asset: MediaAsset,
    pub hook_text: String,
    pub hook_info: VideoInfo,
    pub narration: Option<Narration>,
    pub ctas: Vec<(MediaAsset, VideoInfo)>,
    pub music_asset: MediaAsset,
    pub music_duration: f64,
}

/// Repetitions of `unit` needed to reach `target`, at least one.
pub fn loops_to_cover(unit: f64, target: f64) -> u32 {
    if unit >= target {
        1
    } else {
        (target / unit).ceil().max(1.0) as u32
    }
}

/// Greedy word wrap on character count. Words longer than a line keep a
/// line of their own.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut cur = String::new();
    for word in text.split_whitespace() {
        let needed = if cur.is_empty() {
            word.chars().count()
        } else {
            cur.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !cur.is_empty() {
            lines.push(std::mem::take(&mut cur));
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
    }
    if !cur.is_empty() {
        lines.push(cur);
    }
    lines
}

#[derive(Debug, Clone)]
pub struct CompositionPlanner {
    frame: Resolution,
    fps: u32,
    font: PathBuf,
    font_size: u32,
    text_color: String,
    stroke_color: String,
    stroke_width: u32,
    margins: SafeMargins,
}

impl CompositionPlanner {
    pub fn new(config: &Config) -> Self {
        Self {
            frame: config.target_resolution,
            fps: config.fps,
            font: config.font.clone(),
            font_size: config.font_size.max(1),
            text_color: config.text_color.clone(),
            stroke_color: config.stroke_color.clone(),
            stroke_width: config.stroke_width,
            margins: config.tiktok_margins.clone(),
        }
    }

    fn segment(&self, path: &Path, info: &VideoInfo, play_duration: f64) -> Result<Segment> {
        if info.duration <= 0.0 {
            return Err(ReelError::Plan(format!(
                "{} has no usable duration",
                path.display()
            )));
        }
        Ok(Segment {
            path: path.to_path_buf(),
            fit: fill_and_crop(info.width, info.height, self.frame)?,
            source_duration: info.duration,
            play_duration,
            loops: loops_to_cover(info.duration, play_duration),
            has_audio: info.has_audio,
        })
    }

    fn overlay(&self, text: &str, duration: f64) -> TextOverlay {
        let w = self.frame.width;
        let h = self.frame.height;
        let m = &self.margins;

        let (center_x, box_width, y) = if m.enabled {
            let safe_left = m.left.min(w);
            let safe_width = w.saturating_sub(m.left).saturating_sub(m.right);
            let safe_top = m.top.min(h);
            let safe_height = h.saturating_sub(m.bottom).saturating_sub(m.top);
            let y = m
                .text_y_position
                .unwrap_or(safe_top + (safe_height as f64 * SAFE_AREA_TEXT_FACTOR) as u32);
            (
                safe_left + safe_width / 2,
                w.saturating_sub(m.horizontal_text_margin),
                y,
            )
        } else {
            (w / 2, w.saturating_sub(DEFAULT_TEXT_MARGIN), DEFAULT_TEXT_Y)
        };

        let glyph = self.font_size as f64 * GLYPH_WIDTH_RATIO;
        let max_chars = (box_width as f64 / glyph).floor() as usize;

        TextOverlay {
            lines: wrap_text(text, max_chars),
            font: self.font.clone(),
            font_size: self.font_size,
            color: self.text_color.clone(),
            stroke_color: self.stroke_color.clone(),
            stroke_width: self.stroke_width,
            shadow_opacity: SHADOW_OPACITY,
            center_x,
            box_width,
            y,
            duration,
        }
    }

    pub fn plan(&self, input: PlanInput) -> Result<CompositionPlan> {
        let native = input.hook_info.duration;
        if native <= 0.0 {
            return Err(ReelError::Plan(format!(
                "hook video {} has no usable duration",
                input.hook_asset.path.display()
            )));
        }

        let hook_play = match &input.narration {
            Some(n) if n.duration > native => n.duration,
            _ => native,
        };
        let hook = self.segment(&input.hook_asset.path, &input.hook_info, hook_play)?;
        let overlay = self.overlay(&input.hook_text, hook_play);

        let mut cta_selection = Vec::with_capacity(input.ctas.len());
        let mut ctas = Vec::with_capacity(input.ctas.len());
        for (asset, info) in &input.ctas {
            ctas.push(self.segment(&asset.path, info, info.duration)?);
            cta_selection.push(asset.clone());
        }

        let total_duration = hook_play + ctas.iter().map(|s| s.play_duration).sum::<f64>();

        if input.music_duration <= 0.0 {
            return Err(ReelError::Plan(format!(
                "music {} has no usable duration",
                input.music_asset.path.display()
            )));
        }

        let narrated = input.narration.is_some();
        let volumes = if narrated {
            Volumes {
                hook_audio: hook.has_audio.then_some(HOOK_AUDIO_UNDER_NARRATION),
                narration: Some(NARRATION_VOLUME),
                music: MUSIC_BASE_VOLUME * MUSIC_UNDER_NARRATION,
            }
        } else {
            Volumes {
                hook_audio: hook.has_audio.then_some(1.0),
                narration: None,
                music: MUSIC_BASE_VOLUME,
            }
        };

        let music = MusicPlan {
            path: input.music_asset.path.clone(),
            source_duration: input.music_duration,
            loops: loops_to_cover(input.music_duration, total_duration),
            segment: total_duration,
            volume: volumes.music,
        };

        Ok(CompositionPlan {
            hook_asset: input.hook_asset,
            hook_text: input.hook_text,
            narration: input.narration,
            hook,
            overlay,
            cta_selection,
            ctas,
            music_asset: input.music_asset,
            music,
            volumes,
            total_duration,
            frame: self.frame,
            fps: self.fps,
        })
    }
}
