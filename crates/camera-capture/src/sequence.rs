//! Still-image frame source
//!
//! Replays `.png`/`.jpg` files from a directory in name order, looping, and
//! scales every image to the configured capture size.

use crate::{CameraConfig, CameraError, FrameSource, VideoFrame};
use image::imageops::{self, FilterType};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Frame source backed by image files on disk
#[derive(Debug, Default)]
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    cursor: usize,
    width: u32,
    height: u32,
    opened_at: Option<Instant>,
}

impl ImageSequenceSource {
    /// Create a closed source; the directory comes from `CameraConfig::device`
    pub fn new() -> Self {
        Self::default()
    }

    fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::DeviceUnavailable(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        let dir = Path::new(&config.device);
        let files = Self::list_images(dir)?;
        if files.is_empty() {
            return Err(CameraError::DeviceUnavailable(format!(
                "no images in {}",
                dir.display()
            )));
        }

        info!(
            "Opened image sequence {} ({} frames, {}x{})",
            dir.display(),
            files.len(),
            config.width,
            config.height
        );

        self.files = files;
        self.cursor = 0;
        self.width = config.width;
        self.height = config.height;
        self.opened_at = Some(Instant::now());
        Ok(())
    }

    fn read_frame(&mut self) -> Result<VideoFrame, CameraError> {
        let Some(opened_at) = self.opened_at else {
            return Err(CameraError::NotOpen);
        };

        let path = &self.files[self.cursor % self.files.len()];
        let mut rgb = image::open(path)
            .map_err(|e| CameraError::Read(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        if rgb.width() != self.width || rgb.height() != self.height {
            rgb = imageops::resize(&rgb, self.width, self.height, FilterType::Nearest);
        }

        debug!("Read frame {} from {}", self.cursor, path.display());

        let sequence = self.cursor as u32;
        self.cursor += 1;

        Ok(VideoFrame::new(
            rgb.into_raw(),
            self.width,
            self.height,
            opened_at.elapsed().as_nanos() as u64,
            sequence,
        ))
    }

    fn close(&mut self) {
        if self.opened_at.take().is_some() {
            debug!("Closed image sequence");
            self.files.clear();
            self.cursor = 0;
        }
    }

    fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }
}
