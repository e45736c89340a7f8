use crate::assets::MediaProber;
use crate::config::Config;
use crate::error::{ReelError, Result};
use crate::narration::{Narration, NarrationSynthesizer};
use crate::{logi, logok, logw};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

const API_BASE: &str = "https://api.elevenlabs.io/v1";

#[derive(Debug, Deserialize)]
struct VoiceList {
    voices: Vec<Voice>,
}

#[derive(Debug, Deserialize)]
struct Voice {
    voice_id: String,
    #[serde(default)]
    name: String,
}

pub async fn elevenlabs_tts_to_mp3(
    client: &Client,
    api_key: &str,
    voice_id: &str,
    model_id: &str,
    text: &str,
    out_mp3_path: &Path,
) -> Result<bool> {
    let url = format!(
        "{}/text-to-speech/{}?output_format=mp3_44100_128",
        API_BASE, voice_id
    );

    let body = serde_json::json!({
        "text": text,
        "model_id": model_id,
    });

    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("xi-api-key", api_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await?;

    if !resp.status().is_success() {
        logw(format!("ElevenLabs TTS failed HTTP {}", resp.status().as_u16()));
        return Ok(false);
    }

    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        logw("ElevenLabs returned an empty audio body");
        return Ok(false);
    }
    if let Some(parent) = out_mp3_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(out_mp3_path, &bytes).await?;

    Ok(fs::metadata(out_mp3_path).await.is_ok())
}

async fn first_account_voice(client: &Client, api_key: &str) -> Result<Option<Voice>> {
    let resp = client
        .get(format!("{}/voices", API_BASE))
        .header("xi-api-key", api_key)
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await?;
    if !resp.status().is_success() {
        logw(format!("ElevenLabs voice list failed HTTP {}", resp.status().as_u16()));
        return Ok(None);
    }
    let list: VoiceList = resp.json().await?;
    Ok(list.voices.into_iter().next())
}

/// `tts_<first 20 chars>_<unix seconds>.mp3`
fn saved_copy_name(text: &str, unix_secs: u64) -> String {
    let head: String = text
        .chars()
        .take(20)
        .map(|c| match c {
            ' ' => '_',
            '/' | '\\' | ':' => '-',
            c => c,
        })
        .collect();
    format!("tts_{}_{}.mp3", head, unix_secs)
}

pub struct ElevenLabsNarrator {
    client: Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    save_dir: Option<PathBuf>,
    prober: Arc<dyn MediaProber>,
}

impl ElevenLabsNarrator {
    pub fn new(cfg: &Config, prober: Arc<dyn MediaProber>) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            api_key: cfg.narration.elevenlabs_key.clone(),
            voice_id: cfg.narration.voice_id.clone(),
            model_id: cfg.narration.model_id.clone(),
            save_dir: cfg
                .narration
                .save_tts_files
                .then(|| cfg.tts_files_folder.clone()),
            prober,
        })
    }

    async fn speak(&self, voice_id: &str, text: &str, out: &Path) -> bool {
        match elevenlabs_tts_to_mp3(
            &self.client,
            &self.api_key,
            voice_id,
            &self.model_id,
            text,
            out,
        )
        .await
        {
            Ok(ok) => ok,
            Err(err) => {
                logw(format!("ElevenLabs request failed: {}", err));
                false
            }
        }
    }

    async fn save_copy(&self, text: &str, mp3: &Path) {
        let Some(dir) = &self.save_dir else {
            return;
        };
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let dest = dir.join(saved_copy_name(text, secs));
        let copied = async {
            fs::create_dir_all(dir).await?;
            fs::copy(mp3, &dest).await
        }
        .await;
        match copied {
            Ok(_) => logi(format!("Saved copy of TTS file to {}", dest.display())),
            Err(err) => logw(format!("Could not save TTS copy {}: {}", dest.display(), err)),
        }
    }
}

#[async_trait]
impl NarrationSynthesizer for ElevenLabsNarrator {
    async fn synthesize(&self, text: &str) -> Result<Narration> {
        let (_file, out) = tempfile::Builder::new()
            .prefix("tts_")
            .suffix(".mp3")
            .tempfile()?
            .keep()
            .map_err(|e| ReelError::Narration(e.to_string()))?;

        logi(format!(
            "Generating TTS with voice '{}' and model '{}'",
            self.voice_id, self.model_id
        ));
        let mut spoken = self.speak(&self.voice_id, text, &out).await;

        if !spoken {
            logw(format!(
                "Could not use configured voice '{}', fetching available voices...",
                self.voice_id
            ));
            match first_account_voice(&self.client, &self.api_key).await {
                Ok(Some(voice)) => {
                    logi(format!("Using alternative voice: {}", voice.name));
                    spoken = self.speak(&voice.voice_id, text, &out).await;
                }
                Ok(None) => logw("No voices found in the ElevenLabs account"),
                Err(err) => logw(format!("ElevenLabs voice lookup failed: {}", err)),
            }
        }

        if !spoken {
            let _ = fs::remove_file(&out).await;
            return Err(ReelError::Narration(format!(
                "ElevenLabs produced no audio for: {}",
                text
            )));
        }

        let duration = match self.prober.probe_duration(&out).await {
            Ok(d) => d,
            Err(err) => {
                let _ = fs::remove_file(&out).await;
                return Err(ReelError::Narration(format!("bad TTS audio: {}", err)));
            }
        };
        logok(format!("TTS audio duration: {:.2} seconds", duration));

        self.save_copy(text, &out).await;
        Ok(Narration {
            path: out,
            duration,
        })
    }
}
