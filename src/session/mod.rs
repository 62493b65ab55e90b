//! Camera session
//!
//! Owns the transport backend and the bound device, and runs the two halves of the bridge:
//!
//! - **Control path** ([`CameraSession::serve_controls`]): controller edits are resolved
//!   through the current [`LiveNodeMapping`] and written to the live nodes. Rejected writes are
//!   answered with one corrective camera-origin value. `AcquisitionStart`/`AcquisitionStop`
//!   commands switch the acquisition mode and publish a rebuilt feature tree, since access
//!   modes change with the device state.
//! - **Image path** ([`CameraSession::run_acquisition`]): while started, fetches buffers with a
//!   bounded timeout, decodes them and broadcasts the frames. While stopped it sleeps on the
//!   mode-change signal.
//!
//! # Locking
//!
//! Session state sits behind one `parking_lot::Mutex` and every critical section on it is
//! synchronous. The bound acquirer has a lock of its own: the bounded fetch runs on the
//! blocking pool holding only that lock, so control writes never wait on a fetch. Lock order
//! is state, then acquirer.

pub mod signal;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::decoder::{self, Frame};
use crate::error::{BridgeError, BridgeResult};
use crate::feature::{
    build_feature_specs, normalize_name, FeatureSpecs, FeatureValue, LiveNodeMapping, Origin,
    Value,
};
use crate::genicam::{
    FeatureNode, FetchError, ImageAcquirer, NodeError, TransportBackend, ACQUISITION_START,
    ACQUISITION_STOP,
};
pub use signal::ModeSignal;

// =============================================================================
// Types
// =============================================================================

/// Acquisition mode of a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Not streaming. The acquisition loop sleeps.
    #[default]
    Stopped,
    /// Not streaming. Nothing switches into this mode yet; it idles like `Stopped`.
    Paused,
    /// Streaming. The acquisition loop fetches buffers.
    Started,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not yet initialized.
    #[default]
    Uninitialized,
    /// Backend opened; a device may or may not be bound.
    Connected,
    /// Device and backend released. Terminal.
    Shutdown,
}

/// Message on the ordered stream from the session to the control panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// A new feature tree generation. Replaces every control.
    Specs(FeatureSpecs),
    /// A value pushed by the camera side.
    Value(FeatureValue),
}

/// Construction settings of a [`CameraSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// GenTL producer to load.
    pub cti_file: PathBuf,
    /// Bind device 0 if the producer reports any device.
    pub connect_first_available: bool,
    /// Start acquisition right after binding.
    pub auto_start: bool,
    /// Upper bound of one buffer fetch.
    pub fetch_timeout: Duration,
    /// Pause after a fetch timed out.
    pub timeout_backoff: Duration,
    /// Pause after each delivered frame.
    pub frame_interval: Duration,
    /// Frames buffered per viewer before the slowest one starts losing frames.
    pub frame_channel_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cti_file: PathBuf::new(),
            connect_first_available: false,
            auto_start: false,
            fetch_timeout: Duration::from_micros(100),
            timeout_backoff: Duration::from_millis(100),
            frame_interval: Duration::from_secs_f64(1.0 / 90.0),
            frame_channel_capacity: 16,
        }
    }
}

type SharedAcquirer = Arc<Mutex<Box<dyn ImageAcquirer>>>;

/// Outcome of one acquisition step.
enum Step {
    Frame(Arc<Frame>),
    TimedOut,
    Idle,
    Shutdown,
}

struct SessionState {
    phase: Phase,
    mode: Mode,
    backend: Box<dyn TransportBackend>,
    acquirer: Option<SharedAcquirer>,
    mapping: LiveNodeMapping,
    sequence: u64,
}

/// Join handles of a spawned session.
#[derive(Debug)]
pub struct SessionTasks {
    /// Task running [`CameraSession::run_acquisition`].
    pub acquisition: JoinHandle<BridgeResult<()>>,
    /// Task running [`CameraSession::serve_controls`].
    pub controls: JoinHandle<BridgeResult<()>>,
}

// =============================================================================
// CameraSession
// =============================================================================

/// One camera bridged to a control panel and a frame stream.
pub struct CameraSession {
    settings: SessionSettings,
    state: Mutex<SessionState>,
    mode_changed: ModeSignal,
    terminated: ModeSignal,
    ctrl_tx: mpsc::UnboundedSender<ControlMessage>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
}

impl CameraSession {
    /// Open the backend, load the producer and enumerate devices.
    ///
    /// Device 0 is bound when `connect_first_available` is set and a device exists. With
    /// `auto_start` the bound device starts streaming immediately.
    pub fn initialize(
        settings: SessionSettings,
        mut backend: Box<dyn TransportBackend>,
        ctrl_tx: mpsc::UnboundedSender<ControlMessage>,
    ) -> BridgeResult<Self> {
        backend.add_file(&settings.cti_file)?;
        backend.update()?;

        let devices = backend.device_info_list();
        info!(
            cti_file = %settings.cti_file.display(),
            devices = devices.len(),
            "GenTL producer loaded"
        );

        let mut acquirer = None;
        if settings.connect_first_available {
            if let Some(device) = devices.first() {
                acquirer = Some(backend.create(0)?);
                info!(
                    device = %device.id,
                    model = %device.model,
                    serial = %device.serial_number,
                    "Bound first available device"
                );
            } else {
                warn!("No device available to bind");
            }
        }

        let mut mode = Mode::Stopped;
        if settings.auto_start {
            if let Some(acquirer) = acquirer.as_mut() {
                acquirer.start()?;
                mode = Mode::Started;
                info!("Acquisition auto-started");
            }
        }
        let acquirer = acquirer.map(|acquirer| Arc::new(Mutex::new(acquirer)));

        let (frame_tx, _) = broadcast::channel(settings.frame_channel_capacity.max(1));
        Ok(Self {
            settings,
            state: Mutex::new(SessionState {
                phase: Phase::Connected,
                mode,
                backend,
                acquirer,
                mapping: LiveNodeMapping::new(),
                sequence: 0,
            }),
            mode_changed: ModeSignal::new(),
            terminated: ModeSignal::new(),
            ctrl_tx,
            frame_tx,
        })
    }

    /// Settings the session was created with.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Current acquisition mode.
    pub fn mode(&self) -> Mode {
        self.state.lock().mode
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Whether a device is bound.
    pub fn is_bound(&self) -> bool {
        self.state.lock().acquirer.is_some()
    }

    /// New receiver on the decoded frame stream.
    pub fn subscribe_frames(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.frame_tx.subscribe()
    }

    /// Build the feature tree of the bound device and publish it.
    ///
    /// Does nothing when no device is bound.
    pub fn publish_specs(&self) -> BridgeResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(acquirer) = state.acquirer.as_ref() else {
            debug!("No device bound, nothing to publish");
            return Ok(());
        };
        let roots = acquirer.lock().root_features();
        let (specs, mapping) = build_feature_specs(&roots)?;
        state.mapping = mapping;
        info!(features = state.mapping.len(), "Publishing feature tree");
        self.send(ControlMessage::Specs(specs))
    }

    /// Apply one control message from the panel.
    ///
    /// Camera-origin messages and ids outside the current generation are ignored. Rejected
    /// writes are logged and answered with the node's current value.
    pub fn apply_control(&self, message: FeatureValue) -> BridgeResult<()> {
        if message.origin != Origin::Controller {
            return Ok(());
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.phase == Phase::Shutdown {
            debug!(id = %message.id, "Session shut down, dropping control message");
            return Ok(());
        }
        let Some(node) = state.mapping.get(&message.id).cloned() else {
            warn!(id = %message.id, "Feature id not found in current mapping");
            return Ok(());
        };
        info!(feature = %node.display_name(), value = %message.value, "Applying control");

        let written = match &node {
            FeatureNode::Category(_) => return Ok(()),
            FeatureNode::Command(command) => {
                if let Err(e) = command.execute() {
                    warn!(feature = %command.display_name(), error = %e, "Command rejected");
                    return Ok(());
                }
                let target = match normalize_name(command.display_name()).as_str() {
                    ACQUISITION_START if state.mode != Mode::Started => Mode::Started,
                    ACQUISITION_STOP if state.mode != Mode::Stopped => Mode::Stopped,
                    _ => return Ok(()),
                };
                return self.transition(state, target);
            }
            FeatureNode::Integer(n) => match &message.value {
                Value::Int(v) => n.set_value(*v),
                other => Err(mismatch("integer", other)),
            },
            FeatureNode::Float(n) => match &message.value {
                Value::Float(v) => n.set_value(*v),
                Value::Int(v) => n.set_value(*v as f64),
                other => Err(mismatch("float", other)),
            },
            FeatureNode::Boolean(n) => match &message.value {
                Value::Bool(v) => n.set_value(*v),
                other => Err(mismatch("boolean", other)),
            },
            FeatureNode::Enumeration(n) => match &message.value {
                Value::Text(v) => n.set_value(v),
                other => Err(mismatch("text", other)),
            },
            FeatureNode::String(n) => match &message.value {
                Value::Text(v) => n.set_value(v),
                other => Err(mismatch("text", other)),
            },
            FeatureNode::Unsupported(_, interface) => {
                return Err(BridgeError::UnsupportedInterface {
                    feature: node.display_name().to_string(),
                    interface: interface.to_string(),
                });
            }
        };

        if let Err(e) = written {
            warn!(feature = %node.display_name(), error = %e, "Feature write rejected");
            match current_value(&node) {
                Ok(Some(value)) => {
                    self.send(ControlMessage::Value(FeatureValue::from_camera(message.id, value)))?;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(feature = %node.display_name(), error = %e, "Cannot read back feature");
                }
            }
        }
        Ok(())
    }

    /// Switch the device to `target`, wake the acquisition loop and rebuild the feature tree.
    ///
    /// The loop is woken as soon as the device has switched. If the rebuild fails afterwards
    /// the previous mapping stays in place and the error is returned.
    fn transition(&self, state: &mut SessionState, target: Mode) -> BridgeResult<()> {
        let acquirer = state.acquirer.as_ref().ok_or(BridgeError::NoDeviceBound)?;
        let mut acquirer = acquirer.lock();
        match target {
            Mode::Started => acquirer.start()?,
            Mode::Stopped => acquirer.stop()?,
            Mode::Paused => {}
        }
        info!(from = %state.mode, to = %target, "Acquisition mode changed");
        state.mode = target;
        self.mode_changed.set();

        let roots = acquirer.root_features();
        drop(acquirer);
        let (specs, mapping) = build_feature_specs(&roots).inspect_err(|e| {
            warn!(error = %e, mode = %target, "Feature tree rebuild failed, keeping previous tree");
        })?;
        state.mapping = mapping;
        self.send(ControlMessage::Specs(specs))
    }

    /// Stream frames until the session shuts down.
    ///
    /// Returns the first fatal error, which is a frame that could not be decoded.
    pub async fn run_acquisition(&self) -> BridgeResult<()> {
        info!("Acquisition loop started");
        loop {
            match self.step().await {
                Ok(Step::Frame(frame)) => {
                    trace!(sequence = frame.sequence, "Frame received");
                    // No subscriber is fine.
                    let _ = self.frame_tx.send(frame);
                    tokio::time::sleep(self.settings.frame_interval).await;
                }
                Ok(Step::TimedOut) => {
                    tokio::time::sleep(self.settings.timeout_backoff).await;
                }
                Ok(Step::Idle) => {
                    self.mode_changed.wait().await;
                    self.mode_changed.clear();
                }
                Ok(Step::Shutdown) => {
                    info!("Acquisition loop stopped");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Acquisition loop failed");
                    return Err(e);
                }
            }
        }
    }

    async fn step(&self) -> BridgeResult<Step> {
        let acquirer = {
            let state = self.state.lock();
            if state.phase == Phase::Shutdown {
                return Ok(Step::Shutdown);
            }
            if state.mode != Mode::Started {
                return Ok(Step::Idle);
            }
            match &state.acquirer {
                Some(acquirer) => Arc::clone(acquirer),
                None => return Ok(Step::Idle),
            }
        };

        // The fetch blocks for up to the timeout.
        let timeout = self.settings.fetch_timeout;
        let fetched = tokio::task::spawn_blocking(move || fetch_frame(&acquirer, timeout)).await?;
        let Some(mut frame) = fetched? else {
            return Ok(Step::TimedOut);
        };

        let mut state = self.state.lock();
        if state.phase == Phase::Shutdown {
            return Ok(Step::Shutdown);
        }
        if state.mode != Mode::Started {
            debug!("Acquisition stopped during fetch, dropping frame");
            return Ok(Step::Idle);
        }
        state.sequence += 1;
        frame.sequence = state.sequence;
        Ok(Step::Frame(Arc::new(frame)))
    }

    /// Apply controller messages in order until the channel closes or the session shuts down.
    ///
    /// Recoverable errors are logged and skipped; the first fatal error ends the loop.
    pub async fn serve_controls(
        &self,
        mut controls: mpsc::UnboundedReceiver<FeatureValue>,
    ) -> BridgeResult<()> {
        loop {
            let message = tokio::select! {
                message = controls.recv() => message,
                () = self.terminated.wait() => None,
            };
            let Some(message) = message else {
                debug!("Control stream closed");
                return Ok(());
            };
            if let Err(e) = self.apply_control(message) {
                if e.is_fatal() {
                    error!(error = %e, "Control path failed");
                    return Err(e);
                }
                warn!(error = %e, "Control message failed");
            }
        }
    }

    /// Stop the device, release it and reset the backend. Safe to call more than once.
    ///
    /// Every step runs even if an earlier one failed; the failures are returned together.
    pub fn shutdown(&self) -> BridgeResult<()> {
        let mut errors = Vec::new();
        {
            let mut state = self.state.lock();
            if state.phase == Phase::Shutdown {
                debug!("Session already shut down");
                return Ok(());
            }
            if let Some(acquirer) = state.acquirer.take() {
                if let Err(e) = acquirer.lock().stop() {
                    errors.push(BridgeError::from(e));
                }
            }
            state.backend.reset();
            state.mapping = LiveNodeMapping::new();
            state.mode = Mode::Stopped;
            state.phase = Phase::Shutdown;
        }
        self.terminated.set();
        self.mode_changed.set();
        info!("Camera session shut down");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::ShutdownFailed(errors))
        }
    }

    /// Run the acquisition loop and the control loop as tokio tasks.
    pub fn spawn(
        self: &Arc<Self>,
        controls: mpsc::UnboundedReceiver<FeatureValue>,
    ) -> SessionTasks {
        let session = Arc::clone(self);
        let acquisition = tokio::spawn(async move { session.run_acquisition().await });
        let session = Arc::clone(self);
        let controls = tokio::spawn(async move { session.serve_controls(controls).await });
        SessionTasks {
            acquisition,
            controls,
        }
    }

    fn send(&self, message: ControlMessage) -> BridgeResult<()> {
        self.ctrl_tx
            .send(message)
            .map_err(|_| BridgeError::ChannelClosed("control"))
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CameraSession")
            .field("phase", &state.phase)
            .field("mode", &state.mode)
            .field("bound", &state.acquirer.is_some())
            .field("features", &state.mapping.len())
            .finish()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Shutdown on drop reported errors");
        }
    }
}

/// Fetch and decode one buffer. `None` when no buffer arrived in time.
fn fetch_frame(
    acquirer: &Mutex<Box<dyn ImageAcquirer>>,
    timeout: Duration,
) -> BridgeResult<Option<Frame>> {
    let mut acquirer = acquirer.lock();
    let buffer = match acquirer.fetch(timeout) {
        Ok(buffer) => buffer,
        Err(FetchError::Timeout) => {
            trace!("Fetch timed out");
            return Ok(None);
        }
        Err(e) => {
            warn!(error = %e, "Fetch failed");
            return Ok(None);
        }
    };

    let decoded = match buffer.components().first() {
        Some(component) => decoder::decode(component),
        None => Err(BridgeError::Decode("buffer carries no image component".into())),
    };
    buffer.queue();
    decoded.map(Some)
}

fn mismatch(expected: &'static str, got: &Value) -> NodeError {
    NodeError::TypeMismatch {
        expected,
        got: got.type_name(),
    }
}

/// Value the node holds right now, `None` for kinds without a value.
fn current_value(node: &FeatureNode) -> Result<Option<Value>, NodeError> {
    Ok(match node {
        FeatureNode::Integer(n) => Some(Value::Int(n.value()?)),
        FeatureNode::Float(n) => Some(Value::Float(n.value()?)),
        FeatureNode::Boolean(n) => Some(Value::Bool(n.value()?)),
        FeatureNode::Enumeration(n) => Some(Value::Text(n.value()?)),
        FeatureNode::String(n) => Some(Value::Text(n.value()?)),
        FeatureNode::Category(_) | FeatureNode::Command(_) | FeatureNode::Unsupported(..) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use crate::genicam::{SimOptions, SimSystem};
    use tracing_test::traced_test;

    fn open_session(settings: SessionSettings) -> (CameraSession, mpsc::UnboundedReceiver<ControlMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let backend = Box::new(SimSystem::with_options(SimOptions::default()));
        (CameraSession::initialize(settings, backend, tx).unwrap(), rx)
    }

    fn sim_settings() -> SessionSettings {
        SessionSettings {
            cti_file: PathBuf::from("sim.cti"),
            connect_first_available: true,
            ..SessionSettings::default()
        }
    }

    #[test]
    fn test_initialize_binds_first_device() {
        let (session, _rx) = open_session(sim_settings());
        assert!(session.is_bound());
        assert_eq!(session.phase(), Phase::Connected);
        assert_eq!(session.mode(), Mode::Stopped);

        let (session, _rx) = open_session(SessionSettings {
            auto_start: true,
            ..sim_settings()
        });
        assert_eq!(session.mode(), Mode::Started);
    }

    #[test]
    fn test_initialize_without_binding() {
        let (session, mut rx) = open_session(SessionSettings {
            connect_first_available: false,
            auto_start: true,
            ..sim_settings()
        });
        assert!(!session.is_bound());
        assert_eq!(session.mode(), Mode::Stopped);
        session.publish_specs().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_bad_producer_fails_initialize() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = SessionSettings {
            cti_file: PathBuf::from("producer.dll"),
            ..SessionSettings::default()
        };
        let err = CameraSession::initialize(settings, Box::new(SimSystem::new()), tx).unwrap_err();
        assert!(matches!(err, BridgeError::Device(_)));
        assert!(!err.is_fatal());
    }

    #[traced_test]
    #[test]
    fn test_unknown_id_is_logged_and_ignored() {
        let (session, mut rx) = open_session(sim_settings());
        session.publish_specs().unwrap();
        assert!(matches!(rx.try_recv(), Ok(ControlMessage::Specs(_))));

        session
            .apply_control(FeatureValue::from_controller(FeatureId::new_v4(), Value::Int(1)))
            .unwrap();
        assert!(logs_contain("Feature id not found in current mapping"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_camera_origin_is_ignored() {
        let (session, mut rx) = open_session(sim_settings());
        session.publish_specs().unwrap();
        let Ok(ControlMessage::Specs(specs)) = rx.try_recv() else {
            panic!("expected a feature tree");
        };
        let width = specs.find_by_name("Width").unwrap().id();

        session
            .apply_control(FeatureValue::from_camera(width, Value::Int(7)))
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (session, _rx) = open_session(sim_settings());
        session.shutdown().unwrap();
        session.shutdown().unwrap();
        assert_eq!(session.phase(), Phase::Shutdown);
        assert!(!session.is_bound());
    }
}
