use crate::assets::MediaProber;
use crate::error::{ReelError, Result as ReelResult};
use crate::plan::{CompositionPlan, Renderer, Segment};
use crate::{logi, logok};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use tokio::process::Command;

/// Every audio branch is normalized to this before concat and mixing.
const AUDIO_FORMAT: &str = "aresample=44100,aformat=sample_fmts=fltp:sample_rates=44100:channel_layouts=stereo";
const SILENCE: &str = "anullsrc=r=44100:cl=stereo";

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
        return Err(anyhow::anyhow!("{} exited with {}: {}", args[0], output.status, tail));
    }

    Ok(())
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let h = parts
        .next()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    if w == 0 || h == 0 {
        return Err(anyhow::anyhow!("Invalid dimensions {:?}", text));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

pub async fn ffprobe_has_audio(path: &Path) -> Result<bool> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "a",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe audio check failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }
    Ok(String::from_utf8_lossy(&output.stdout).contains("audio"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeProber;

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe_duration(&self, path: &Path) -> ReelResult<f64> {
        ffprobe_duration_seconds(path)
            .await
            .map_err(|e| ReelError::Probe {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    async fn probe_dimensions(&self, path: &Path) -> ReelResult<(u32, u32)> {
        ffprobe_video_dimensions(path)
            .await
            .map_err(|e| ReelError::Probe {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    async fn has_audio(&self, path: &Path) -> bool {
        let has = ffprobe_has_audio(path).await.unwrap_or(false);
        logi(format!("{} has audio: {}", path.display(), has));
        has
    }
}

/// Quotes a value for use inside a filtergraph option.
fn filter_quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "/")
        .replace('\'', "'\\''")
        .replace(':', "\\:");
    format!("'{}'", escaped)
}

fn video_chain(input: usize, seg: &Segment, fps: u32) -> String {
    let fit = &seg.fit;
    format!(
        "[{}:v]trim=duration={:.3},setpts=PTS-STARTPTS,scale={}:{},crop={}:{}:{}:{},setsar=1,fps={}",
        input,
        seg.play_duration,
        fit.scaled_width,
        fit.scaled_height,
        fit.target.width,
        fit.target.height,
        fit.crop_x,
        fit.crop_y,
        fps
    )
}

fn drawtext(plan: &CompositionPlan, text_file: &Path) -> String {
    let o = &plan.overlay;
    let shadow = o.stroke_width + 1;
    format!(
        "drawtext=fontfile={}:textfile={}:expansion=none:fontsize={}:fontcolor={}:borderw={}:bordercolor={}:shadowcolor=black@{:.2}:shadowx={}:shadowy={}:line_spacing={}:x={}-text_w/2:y={}",
        filter_quote(&o.font.display().to_string()),
        filter_quote(&text_file.display().to_string()),
        o.font_size,
        o.color,
        o.stroke_width,
        o.stroke_color,
        o.shadow_opacity,
        shadow,
        shadow,
        o.font_size / 5,
        o.center_x,
        o.y
    )
}

/// Builds the single ffmpeg invocation that renders `plan` to `output`.
/// `text_file` holds the wrapped overlay text, one line per row.
pub fn build_render_args(plan: &CompositionPlan, text_file: &Path, output: &Path) -> Vec<String> {
    let mut args: Vec<String> = ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let push_input = |args: &mut Vec<String>, path: &Path, looped: bool| {
        if looped {
            args.extend(["-stream_loop".to_string(), "-1".to_string()]);
        }
        args.extend(["-i".to_string(), path.display().to_string()]);
    };

    push_input(&mut args, &plan.hook.path, plan.hook.loops > 1);
    for seg in &plan.ctas {
        push_input(&mut args, &seg.path, false);
    }
    let narration_input = plan.narration.as_ref().map(|n| {
        push_input(&mut args, &n.path, false);
        1 + plan.ctas.len()
    });
    let music_input = 1 + plan.ctas.len() + usize::from(narration_input.is_some());
    push_input(&mut args, &plan.music.path, plan.music.loops > 1);

    let hook_dur = plan.hook.play_duration;
    let mut graph: Vec<String> = Vec::new();

    // Hook segment: picture with overlay, then its resolved soundtrack.
    graph.push(format!(
        "{},{}[v0]",
        video_chain(0, &plan.hook, plan.fps),
        drawtext(plan, text_file)
    ));

    let hook_audio = plan.volumes.hook_audio.map(|v| {
        format!(
            "[0:a]atrim=duration={:.3},asetpts=PTS-STARTPTS,volume={:.2},{}",
            hook_dur, v, AUDIO_FORMAT
        )
    });
    let narration_audio = narration_input.map(|idx| {
        format!(
            "[{}:a]asetpts=PTS-STARTPTS,volume={:.2},{}",
            idx,
            plan.volumes.narration.unwrap_or(1.0),
            AUDIO_FORMAT
        )
    });
    match (hook_audio, narration_audio) {
        (Some(h), Some(n)) => {
            graph.push(format!("{}[ha]", h));
            graph.push(format!("{}[na]", n));
            graph.push(format!(
                "[ha][na]amix=inputs=2:duration=longest:normalize=0,apad,atrim=duration={:.3}[a0]",
                hook_dur
            ));
        }
        (Some(only), None) | (None, Some(only)) => {
            graph.push(format!("{},apad,atrim=duration={:.3}[a0]", only, hook_dur));
        }
        (None, None) => {
            graph.push(format!(
                "{},{},atrim=duration={:.3}[a0]",
                SILENCE, AUDIO_FORMAT, hook_dur
            ));
        }
    }

    // CTA segments keep their own audio, or silence of the same length.
    for (i, seg) in plan.ctas.iter().enumerate() {
        let input = i + 1;
        graph.push(format!("{}[v{}]", video_chain(input, seg, plan.fps), input));
        if seg.has_audio {
            graph.push(format!(
                "[{}:a]asetpts=PTS-STARTPTS,{},apad,atrim=duration={:.3}[a{}]",
                input, AUDIO_FORMAT, seg.play_duration, input
            ));
        } else {
            graph.push(format!(
                "{},{},atrim=duration={:.3}[a{}]",
                SILENCE, AUDIO_FORMAT, seg.play_duration, input
            ));
        }
    }

    let segments = 1 + plan.ctas.len();
    let labels: String = (0..segments).map(|i| format!("[v{}][a{}]", i, i)).collect();
    graph.push(format!(
        "{}concat=n={}:v=1:a=1[vcat][acat]",
        labels, segments
    ));

    graph.push(format!(
        "[{}:a]atrim=duration={:.3},asetpts=PTS-STARTPTS,volume={:.2},{}[bg]",
        music_input, plan.music.segment, plan.music.volume, AUDIO_FORMAT
    ));
    graph.push("[acat][bg]amix=inputs=2:duration=first:normalize=0[aout]".to_string());

    let graph = graph.join(";");
    let total = format!("{:.3}", plan.total_duration);
    let fps = plan.fps.to_string();
    args.extend(
        [
            "-filter_complex",
            graph.as_str(),
            "-map",
            "[vcat]",
            "-map",
            "[aout]",
            "-t",
            total.as_str(),
            "-r",
            fps.as_str(),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-preset",
            "medium",
            "-crf",
            "22",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-movflags",
            "+faststart",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(output.display().to_string());
    args
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegRenderer;

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, plan: &CompositionPlan, output: &Path) -> ReelResult<()> {
        let fail = |reason: String| ReelError::Render {
            output: output.to_path_buf(),
            reason,
        };

        let mut text_file = tempfile::Builder::new()
            .prefix("overlay_")
            .suffix(".txt")
            .tempfile()?;
        text_file.write_all(plan.overlay.lines.join("\n").as_bytes())?;
        text_file.flush()?;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let args = build_render_args(plan, text_file.path(), output);
        logi(format!(
            "Rendering {:.2}s timeline ({} CTA clips) -> {}",
            plan.total_duration,
            plan.ctas.len(),
            output.display()
        ));
        run_cmd(&args).await.map_err(|e| fail(e.to_string()))?;

        if !output.exists() {
            return Err(fail("ffmpeg reported success but wrote no file".to_string()));
        }
        logok(format!("Successfully wrote video file: {}", output.display()));
        Ok(())
    }
}
