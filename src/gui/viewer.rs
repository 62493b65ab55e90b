//! Live frame viewer.

use std::sync::Arc;

use egui::{ColorImage, TextureHandle, TextureOptions, Ui};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

use crate::decoder::{Frame, FrameData};

/// Convert a decoded frame into an egui image.
///
/// Mono and Bayer planes are shown as grey, colour frames as RGB or RGBa.
pub fn color_image(frame: &Frame) -> ColorImage {
    let size = [frame.width(), frame.height()];
    match &frame.data {
        FrameData::Mono(plane) => match plane.as_slice() {
            Some(pixels) => ColorImage::from_gray(size, pixels),
            None => ColorImage::from_gray(size, &plane.iter().copied().collect::<Vec<_>>()),
        },
        FrameData::Color(pixels) => {
            let owned;
            let samples = match pixels.as_slice() {
                Some(samples) => samples,
                None => {
                    owned = pixels.iter().copied().collect::<Vec<_>>();
                    &owned
                }
            };
            if frame.channels() == 4 {
                ColorImage::from_rgba_unmultiplied(size, samples)
            } else {
                ColorImage::from_rgb(size, samples)
            }
        }
    }
}

/// Keeps the newest frame of a broadcast stream on screen.
#[derive(Default)]
pub struct FrameViewer {
    texture: Option<TextureHandle>,
    latest: Option<Arc<Frame>>,
    received: u64,
    dropped: u64,
}

impl FrameViewer {
    /// Viewer with no frame yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every frame waiting on `frames`, keeping only the newest.
    ///
    /// Returns whether a new frame arrived. Frames the receiver lagged behind on are counted
    /// as dropped.
    pub fn poll(&mut self, frames: &mut broadcast::Receiver<Arc<Frame>>) -> bool {
        let mut fresh = false;
        loop {
            match frames.try_recv() {
                Ok(frame) => {
                    self.latest = Some(frame);
                    self.received += 1;
                    fresh = true;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Viewer lagged behind the frame stream");
                    self.dropped += skipped;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return fresh,
            }
        }
    }

    /// Newest frame received so far.
    pub fn latest(&self) -> Option<&Frame> {
        self.latest.as_deref()
    }

    /// Frames taken off the stream.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Frames lost because the viewer lagged behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Upload the newest frame if it changed and draw it scaled to the available space.
    pub fn show(&mut self, ui: &mut Ui, fresh: bool) {
        let Some(frame) = self.latest.as_ref() else {
            ui.centered_and_justified(|ui| ui.label("Waiting for frames"));
            return;
        };

        if fresh || self.texture.is_none() {
            let image = color_image(frame);
            match &mut self.texture {
                Some(texture) => texture.set(image, TextureOptions::NEAREST),
                None => {
                    self.texture =
                        Some(ui.ctx().load_texture("camera_frame", image, TextureOptions::NEAREST));
                }
            }
        }

        ui.label(format!(
            "#{} {}x{} {} | mean {:.1} | dropped {}",
            frame.sequence,
            frame.width(),
            frame.height(),
            frame.format,
            frame.mean(),
            self.dropped
        ));
        if let Some(texture) = &self.texture {
            ui.add(egui::Image::new(texture).shrink_to_fit());
        }
    }
}
