use crate::error::{ReelError, Result};
use crate::records::{self, quote_field};
use crate::{logi, logw};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const MANIFEST_HEADER: &str = "hook_video,hook_text,cta_videos,music_file,final_video";
const FINAL_VIDEO_COLUMN: usize = 4;

static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d{3,})_h-?\d+_").expect("valid regex"));
static LEGACY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^final_video_(\d+)\.mp4$").expect("valid regex"));

/// One finished video. Asset columns hold file names, not full paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoManifestEntry {
    pub hook_video: String,
    pub hook_text: String,
    pub cta_videos: Vec<String>,
    pub music_file: String,
    pub final_video: String,
}

impl VideoManifestEntry {
    pub fn to_row(&self) -> String {
        let ctas = self.cta_videos.join(";");
        [
            quote_field(&self.hook_video),
            quote_field(&self.hook_text),
            quote_field(&ctas),
            quote_field(&self.music_file),
            quote_field(&self.final_video),
        ]
        .join(",")
    }
}

/// Sequence number embedded in an output file name, if any.
pub fn number_from_filename(name: &str) -> Option<u32> {
    let name = name.trim().trim_matches('"');
    if let Some(cap) = NUMBERED.captures(name) {
        return cap[1].parse().ok();
    }
    LEGACY.captures(name).and_then(|cap| cap[1].parse().ok())
}

/// Append-only CSV record of every produced video.
#[derive(Debug, Clone)]
pub struct VideoManifest {
    path: PathBuf,
}

impl VideoManifest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest sequence number recorded so far, 0 for a new manifest.
    pub async fn last_number(&self) -> Result<u32> {
        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ReelError::storage(&self.path, e)),
        };

        let mut rows = records::parse_records(&text).into_iter();
        let column = rows
            .next()
            .and_then(|header| header.iter().position(|c| c.trim() == "final_video"))
            .unwrap_or(FINAL_VIDEO_COLUMN);

        let mut last = 0;
        for row in rows {
            match row.get(column).and_then(|f| number_from_filename(f)) {
                Some(n) => last = last.max(n),
                None => logw(format!("Error parsing manifest row '{}'", row.join(","))),
            }
        }
        logi(format!("Found last video number: {}", last));
        Ok(last)
    }

    pub async fn append(&self, entry: &VideoManifestEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ReelError::storage(parent, e))?;
        }
        let needs_header = fs::metadata(&self.path).await.is_err();

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ReelError::storage(&self.path, e))?;

        let mut out = String::new();
        if needs_header {
            out.push_str(MANIFEST_HEADER);
            out.push('\n');
        }
        let row = entry.to_row();
        out.push_str(&row);
        out.push('\n');

        file.write_all(out.as_bytes())
            .await
            .map_err(|e| ReelError::storage(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| ReelError::storage(&self.path, e))?;
        logi(format!("Saved video details: {}", row));
        Ok(())
    }
}
