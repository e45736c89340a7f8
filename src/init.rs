use crate::config::Config;
use crate::error::{ReelError, Result};
use crate::logi;
use std::path::{Path, PathBuf};
use tokio::fs;

fn parent_of(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Directories the run writes into: outputs, saved narration, and the
/// parents of the log, manifest, ledger and tracking files.
pub fn required_dirs(config: &Config) -> Vec<PathBuf> {
    let mut dirs = vec![config.output_folder.clone()];
    if config.narration.save_tts_files {
        dirs.push(config.tts_files_folder.clone());
    }
    for file in [
        &config.log_file,
        &config.video_list_file,
        &config.used_hooks_file,
        &config.sequential_tracking_file,
        &config.music_tracking_file,
    ] {
        if let Some(dir) = parent_of(file) {
            dirs.push(dir);
        }
    }
    dirs.dedup();
    dirs
}

pub async fn ensure_directories(config: &Config) -> Result<()> {
    for dir in required_dirs(config) {
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| ReelError::storage(&dir, e))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
