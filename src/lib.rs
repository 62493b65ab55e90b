//! # GenICam Bridge
//!
//! Connects a GenICam camera, reached through a GenTL producer, to a streaming application and
//! a live control panel of the camera's features.
//!
//! ## Crate Structure
//!
//! - **`genicam`**: The device seam. Traits for the transport backend, image acquirer and
//!   acquired buffers, the live feature node model, the PFNC pixel format table and a simulated
//!   backend.
//! - **`feature`**: Serializable feature snapshots (`FeatureSpec`) and the builder that derives
//!   them from a live node tree together with a `LiveNodeMapping` back to the nodes.
//! - **`decoder`**: Turns raw image components into 8-bit `ndarray` frames.
//! - **`session`**: `CameraSession`, the state machine that owns the device, applies control
//!   edits and runs the acquisition loop.
//! - **`control`**: `ControlSynchronizer`, the toolkit-independent control panel model.
//! - **`gui`**: The `eframe`/`egui` window drawing the control panel and the live view.
//! - **`config`**: Layered configuration loaded with `figment`.
//! - **`error`**: The crate-wide `BridgeError`.
//! - **`tracing_setup`**: Subscriber installation for the binary.
//!
//! ## Data Flow
//!
//! ```text
//!  ControlSynchronizer --FeatureValue--> CameraSession --writes--> live nodes
//!          ^                                 |
//!          +-----ControlMessage (Specs,Value)+
//!                                            |
//!                   viewers <--Arc<Frame>----+ (broadcast)
//! ```

pub mod config;
pub mod control;
pub mod decoder;
pub mod error;
pub mod feature;
pub mod genicam;
pub mod gui;
pub mod session;
pub mod tracing_setup;

pub use error::{BridgeError, BridgeResult};
