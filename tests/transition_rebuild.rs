//! Start transitions on a device whose feature tree cannot be read once it streams.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use genicam_bridge::feature::{AccessMode, FeatureValue, Value, Visibility};
use genicam_bridge::genicam::{
    AcquiredBuffer, CommandNode, DeviceError, DeviceInfo, FeatureNode, FetchError, FloatNode,
    ImageAcquirer, NodeError, NodeInfo, TransportBackend,
};
use genicam_bridge::session::{CameraSession, ControlMessage, Mode, SessionSettings};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Default)]
struct DeviceState {
    streaming: AtomicBool,
    fetches: AtomicUsize,
}

/// Sensor readout that is only readable while the device is idle.
struct Temperature(Arc<DeviceState>);

impl NodeInfo for Temperature {
    fn name(&self) -> &str {
        "DeviceTemperature"
    }
    fn display_name(&self) -> &str {
        "Device Temperature"
    }
    fn visibility(&self) -> Visibility {
        Visibility::Beginner
    }
    fn access_mode(&self) -> AccessMode {
        AccessMode::ReadOnly
    }
}

impl FloatNode for Temperature {
    fn value(&self) -> Result<f64, NodeError> {
        if self.0.streaming.load(Ordering::SeqCst) {
            Err(NodeError::Busy)
        } else {
            Ok(31.5)
        }
    }
    fn set_value(&self, _value: f64) -> Result<(), NodeError> {
        Err(NodeError::AccessDenied(AccessMode::ReadOnly))
    }
    fn min(&self) -> Result<f64, NodeError> {
        Ok(-20.0)
    }
    fn max(&self) -> Result<f64, NodeError> {
        Ok(90.0)
    }
    fn inc(&self) -> Result<Option<f64>, NodeError> {
        Ok(None)
    }
}

struct Start;

impl NodeInfo for Start {
    fn name(&self) -> &str {
        "AcquisitionStart"
    }
    fn display_name(&self) -> &str {
        "Acquisition Start"
    }
    fn visibility(&self) -> Visibility {
        Visibility::Beginner
    }
    fn access_mode(&self) -> AccessMode {
        AccessMode::ReadWrite
    }
}

impl CommandNode for Start {
    fn execute(&self) -> Result<(), NodeError> {
        Ok(())
    }
}

struct Camera(Arc<DeviceState>);

impl ImageAcquirer for Camera {
    fn root_features(&self) -> Vec<FeatureNode> {
        vec![
            FeatureNode::Command(Arc::new(Start)),
            FeatureNode::Float(Arc::new(Temperature(Arc::clone(&self.0)))),
        ]
    }
    fn start(&mut self) -> Result<(), DeviceError> {
        self.0.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn stop(&mut self) -> Result<(), DeviceError> {
        self.0.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }
    fn fetch(&mut self, _timeout: Duration) -> Result<Box<dyn AcquiredBuffer>, FetchError> {
        self.0.fetches.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Timeout)
    }
}

struct Backend(Arc<DeviceState>);

impl TransportBackend for Backend {
    fn add_file(&mut self, _path: &Path) -> Result<(), DeviceError> {
        Ok(())
    }
    fn update(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }
    fn device_info_list(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            id: "thermal-0".into(),
            vendor: "Bench".into(),
            model: "Thermal".into(),
            serial_number: "0001".into(),
        }]
    }
    fn create(&mut self, _index: usize) -> Result<Box<dyn ImageAcquirer>, DeviceError> {
        Ok(Box::new(Camera(Arc::clone(&self.0))))
    }
    fn reset(&mut self) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_rebuild_still_wakes_acquisition() {
    let device = Arc::new(DeviceState::default());
    let (tx, mut messages) = mpsc::unbounded_channel();
    let settings = SessionSettings {
        cti_file: PathBuf::from("bench.cti"),
        connect_first_available: true,
        fetch_timeout: Duration::from_millis(1),
        timeout_backoff: Duration::from_millis(5),
        ..SessionSettings::default()
    };
    let session = Arc::new(
        CameraSession::initialize(settings, Box::new(Backend(Arc::clone(&device))), tx).unwrap(),
    );
    session.publish_specs().unwrap();
    let Ok(ControlMessage::Specs(specs)) = messages.try_recv() else {
        panic!("initial feature tree not published");
    };
    let start = specs.find_by_name("Acquisition Start").unwrap().id();

    let (edits, edit_rx) = mpsc::unbounded_channel();
    let tasks = session.spawn(edit_rx);
    edits
        .send(FeatureValue::from_controller(start, Value::Empty))
        .unwrap();

    // The rebuild fails on the busy sensor, yet the loop is polling the device.
    tokio::time::timeout(WAIT, async {
        while device.fetches.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(session.mode(), Mode::Started);
    assert!(device.streaming.load(Ordering::SeqCst));
    assert!(messages.try_recv().is_err());

    // The control loop survived the failed rebuild.
    assert!(!tasks.controls.is_finished());

    session.shutdown().unwrap();
    assert!(!device.streaming.load(Ordering::SeqCst));
    assert!(tokio::time::timeout(WAIT, tasks.acquisition)
        .await
        .unwrap()
        .unwrap()
        .is_ok());
    assert!(tokio::time::timeout(WAIT, tasks.controls)
        .await
        .unwrap()
        .unwrap()
        .is_ok());
}
