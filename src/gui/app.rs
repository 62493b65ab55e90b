//! Main application window.

use std::sync::Arc;
use std::time::Duration;

use eframe::egui;
use tokio::sync::{broadcast, mpsc};

use super::{FeaturePanel, FrameViewer};
use crate::control::ControlSynchronizer;
use crate::decoder::Frame;
use crate::feature::{FeatureValue, Visibility};
use crate::session::{CameraSession, ControlMessage};

/// Repaint interval while idle, so queued control messages are picked up promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(16);

/// Control panel and live view of one camera session.
pub struct BridgeApp {
    session: Arc<CameraSession>,
    sync: ControlSynchronizer,
    inbound: mpsc::UnboundedReceiver<ControlMessage>,
    frames: broadcast::Receiver<Arc<Frame>>,
    panel: FeaturePanel,
    viewer: FrameViewer,
}

impl BridgeApp {
    /// Window bound to `session`.
    ///
    /// `inbound` is the session's control stream, `outbound` the sender whose receiver was
    /// handed to [`CameraSession::spawn`].
    pub fn new(
        session: Arc<CameraSession>,
        inbound: mpsc::UnboundedReceiver<ControlMessage>,
        outbound: mpsc::UnboundedSender<FeatureValue>,
        visibility: Visibility,
    ) -> Self {
        let mut sync = ControlSynchronizer::new(outbound);
        sync.set_visibility_level(visibility);
        let frames = session.subscribe_frames();
        Self {
            session,
            sync,
            inbound,
            frames,
            panel: FeaturePanel::new(),
            viewer: FrameViewer::new(),
        }
    }
}

impl eframe::App for BridgeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.sync.drain(&mut self.inbound);
        let fresh = self.viewer.poll(&mut self.frames);

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let bound = if self.session.is_bound() {
                    "device bound"
                } else {
                    "no device"
                };
                ui.label(format!("{bound} | mode: {}", self.session.mode()));
                ui.separator();
                ui.label(format!(
                    "frames: {} | dropped: {}",
                    self.viewer.received(),
                    self.viewer.dropped()
                ));
            });
        });

        egui::SidePanel::left("features")
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| {
                ui.heading("Features");
                self.panel.show(ui, &mut self.sync);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.viewer.show(ui, fresh);
        });

        ctx.request_repaint_after(POLL_INTERVAL);
    }
}
