use anyhow::{anyhow, Result};
use std::collections::VecDeque;

use crate::detect::backend::{DetectionCancelled, DetectorBackend};
use crate::frame::Frame;
use crate::geometry::BoundingBox;

/// One scripted detector response.
#[derive(Clone, Debug)]
pub enum ScriptedResponse {
    Boxes(Vec<BoundingBox>),
    Cancelled,
    Failed(String),
}

/// Scripted backend for tests and demos.
///
/// Plays back queued responses in order. Once the script is exhausted it
/// keeps returning the last `Boxes` response (or nothing, if there was none).
#[derive(Default)]
pub struct ScriptedBackend {
    script: VecDeque<ScriptedResponse>,
    last: Vec<BoundingBox>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Always report the same boxes.
    pub fn constant(boxes: Vec<BoundingBox>) -> Self {
        Self {
            last: boxes,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<BoundingBox>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(ScriptedResponse::Boxes(boxes)) => {
                self.last = boxes.clone();
                Ok(boxes)
            }
            Some(ScriptedResponse::Cancelled) => Err(DetectionCancelled.into()),
            Some(ScriptedResponse::Failed(reason)) => Err(anyhow!(reason)),
            None => Ok(self.last.clone()),
        }
    }
}
