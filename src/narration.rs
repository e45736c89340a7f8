use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Synthesized speech ready to be laid over the hook.
#[derive(Debug, Clone, PartialEq)]
pub struct Narration {
    pub path: PathBuf,
    pub duration: f64,
}

#[async_trait]
pub trait NarrationSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Narration>;
}
