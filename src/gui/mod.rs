//! Native control panel built with `eframe`/`egui`.
//!
//! The window has two halves:
//!
//! - a side panel drawing the [`ControlSynchronizer`](crate::control::ControlSynchronizer),
//!   one widget per feature, with a visibility level selector on top;
//! - a central viewer showing the most recent decoded frame.
//!
//! Nothing here touches the camera. Edits leave through the synchroniser's outbound channel and
//! the session answers on the control stream, which [`BridgeApp`] drains every repaint.

mod app;
mod feature_panel;
mod viewer;

pub use app::BridgeApp;
pub use feature_panel::FeaturePanel;
pub use viewer::{color_image, FrameViewer};
