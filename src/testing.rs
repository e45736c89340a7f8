//! In-memory stand-ins for the external seams.

use crate::assets::MediaProber;
use crate::error::{ReelError, Result};
use crate::narration::{Narration, NarrationSynthesizer};
use crate::plan::{CompositionPlan, Renderer};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct FakeProber {
    durations: HashMap<PathBuf, f64>,
}

impl FakeProber {
    pub fn set_duration(&mut self, path: impl AsRef<Path>, seconds: f64) {
        self.durations.insert(path.as_ref().to_path_buf(), seconds);
    }
}

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        self.durations
            .get(path)
            .copied()
            .ok_or_else(|| ReelError::Probe {
                path: path.to_path_buf(),
                reason: "unknown file".into(),
            })
    }

    async fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        if self.durations.contains_key(path) {
            Ok((1920, 1080))
        } else {
            Err(ReelError::Probe {
                path: path.to_path_buf(),
                reason: "unknown file".into(),
            })
        }
    }

    async fn has_audio(&self, _path: &Path) -> bool {
        true
    }
}

/// Returns a fixed-length narration, or fails when `duration` is `None`.
#[derive(Debug)]
pub struct FakeNarrator {
    pub duration: Option<f64>,
    pub spoken: Mutex<Vec<String>>,
}

impl FakeNarrator {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration,
            spoken: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl NarrationSynthesizer for FakeNarrator {
    async fn synthesize(&self, text: &str) -> Result<Narration> {
        self.spoken.lock().unwrap().push(text.to_string());
        match self.duration {
            Some(duration) => Ok(Narration {
                path: std::env::temp_dir().join("fake_narration_does_not_exist.mp3"),
                duration,
            }),
            None => Err(ReelError::Narration("service unavailable".into())),
        }
    }
}

type RenderAction = Box<dyn Fn(&Path) + Send + Sync>;

/// Records every plan it is given. Calls whose index is in `fail_on` fail.
/// `after_render` runs after each successful call with the output path.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail_on: HashSet<usize>,
    pub calls: Mutex<Vec<(CompositionPlan, PathBuf)>>,
    after_render: Option<RenderAction>,
}

impl FakeRenderer {
    pub fn failing_on(indices: &[usize]) -> Self {
        Self {
            fail_on: indices.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn after_render(action: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        Self {
            after_render: Some(Box::new(action)),
            ..Self::default()
        }
    }

    pub fn plans(&self) -> Vec<CompositionPlan> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, plan: &CompositionPlan, output: &Path) -> Result<()> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((plan.clone(), output.to_path_buf()));
            calls.len() - 1
        };
        if self.fail_on.contains(&index) {
            return Err(ReelError::Render {
                output: output.to_path_buf(),
                reason: "encoder crashed".into(),
            });
        }
        if let Some(action) = &self.after_render {
            action(output);
        }
        Ok(())
    }
}
