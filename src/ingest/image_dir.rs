//! Image directory frame source.
//!
//! Replays the still images in a local directory (JPEG or PNG, lexical order)
//! as a looping video at the target frame rate. Each image is decoded to RGB8
//! with the `image` crate when it is due.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FramePacer, FrameSource, SourceStats};
use crate::frame::{Frame, PixelFormat};

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    pacer: FramePacer,
    next_index: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>, target_fps: u32) -> Result<Self> {
        let dir = dir.into();
        if dir.as_os_str().is_empty() {
            return Err(anyhow!("image directory path is empty"));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            pacer: FramePacer::new(target_fps),
            next_index: 0,
            frame_count: 0,
            last_error: None,
        })
    }

    fn decode(&self, path: &Path) -> Result<Frame> {
        let rgb = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        Frame::new(
            rgb.into_raw(),
            width,
            height,
            PixelFormat::Rgb8,
            self.frame_count,
        )
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .with_context(|| format!("read image directory {}", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(anyhow!("no images found in {}", self.dir.display()));
        }
        log::info!(
            "ImageDirSource: {} images in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.next_index = 0;
        Ok(())
    }

    fn latest_frame(&mut self) -> Result<Option<Frame>> {
        if self.files.is_empty() {
            return Err(anyhow!("image directory source is not connected"));
        }
        if !self.pacer.due() {
            return Ok(None);
        }
        let path = self.files[self.next_index].clone();
        self.next_index = (self.next_index + 1) % self.files.len();

        match self.decode(&path) {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_error = None;
                Ok(Some(frame))
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        !self.files.is_empty() && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: format!("dir://{}", self.dir.display()),
        }
    }
}
