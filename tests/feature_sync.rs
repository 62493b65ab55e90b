//! Control panel synchronised with a live session, without a window.

use std::path::PathBuf;

use genicam_bridge::control::{ControlSynchronizer, Widget};
use genicam_bridge::feature::{FeatureId, FeatureValue, Value, Visibility};
use genicam_bridge::genicam::{SimProbe, SimSystem};
use genicam_bridge::session::{CameraSession, ControlMessage, Mode, SessionSettings};
use tokio::sync::mpsc;

struct Bench {
    session: CameraSession,
    from_session: mpsc::UnboundedReceiver<ControlMessage>,
    panel: ControlSynchronizer,
    from_panel: mpsc::UnboundedReceiver<FeatureValue>,
    probe: SimProbe,
}

impl Bench {
    fn new() -> Self {
        let system = SimSystem::new();
        let probe = system.probe();
        let (session_tx, from_session) = mpsc::unbounded_channel();
        let settings = SessionSettings {
            cti_file: PathBuf::from("producer.cti"),
            connect_first_available: true,
            ..SessionSettings::default()
        };
        let session = CameraSession::initialize(settings, Box::new(system), session_tx).unwrap();
        let (panel_tx, from_panel) = mpsc::unbounded_channel();
        let mut bench = Self {
            session,
            from_session,
            panel: ControlSynchronizer::new(panel_tx),
            from_panel,
            probe,
        };
        bench.session.publish_specs().unwrap();
        bench.pump();
        bench
    }

    /// Deliver every pending message in both directions until both queues are empty.
    fn pump(&mut self) {
        loop {
            let mut moved = self.panel.drain(&mut self.from_session);
            while let Ok(edit) = self.from_panel.try_recv() {
                self.session.apply_control(edit).unwrap();
                moved += 1;
            }
            if moved == 0 {
                return;
            }
        }
    }

    fn id(&self, label: &str) -> FeatureId {
        let mut stack = self.panel.roots().to_vec();
        while let Some(idx) = stack.pop() {
            let control = self.panel.get(idx);
            if control.label == label {
                return control.id;
            }
            if let Widget::Group { children } = &control.widget {
                stack.extend(children);
            }
        }
        panic!("no control labelled {label}");
    }
}

#[test]
fn test_panel_mirrors_device_tree() {
    let bench = Bench::new();
    assert_eq!(bench.panel.roots().len(), 5);

    let width = bench.panel.control(bench.id("Width")).unwrap();
    assert_eq!(
        width.widget,
        Widget::SpinBox {
            value: 64,
            min: 8,
            max: 4096,
            step: 8
        }
    );
    assert!(width.enabled);
    assert_eq!(bench.panel.is_enabled(bench.id("Vendor Name")), Some(false));
    assert_eq!(
        bench.panel.value_of(bench.id("Pixel Format")),
        Some(Value::Text("Mono8".into()))
    );
    assert!(matches!(
        bench.panel.control(bench.id("Gain")).unwrap().widget,
        Widget::FloatField { step: Some(step), .. } if (step - 0.1).abs() < 1e-9
    ));
}

#[test]
#[should_panic(expected = "no control labelled Timestamp")]
fn test_unavailable_features_are_not_shown() {
    let bench = Bench::new();
    bench.id("Timestamp");
}

#[test]
fn test_visibility_levels_on_device_tree() {
    let mut bench = Bench::new();
    let transport = bench.id("Transport Layer Control");
    let device = bench.id("Device Control");

    assert_eq!(bench.panel.visibility_level(), Visibility::Beginner);
    assert_eq!(bench.panel.label_visible(transport), Some(false));
    assert_eq!(bench.panel.label_visible(device), Some(true));
    assert_eq!(bench.panel.is_visible(bench.id("Serial Number")), Some(false));

    bench.panel.set_visibility_level(Visibility::Expert);
    assert_eq!(bench.panel.label_visible(transport), Some(true));
    assert_eq!(bench.panel.is_visible(bench.id("Packet Size")), Some(true));
    assert_eq!(bench.panel.is_visible(bench.id("Timestamp Tick Frequency")), Some(false));

    // The level survives a rebuild.
    bench.session.publish_specs().unwrap();
    bench.pump();
    assert_eq!(bench.panel.visibility_level(), Visibility::Expert);
    assert_eq!(bench.panel.label_visible(bench.id("Transport Layer Control")), Some(true));
}

#[test]
fn test_rejected_edit_snaps_back_without_echo() {
    let mut bench = Bench::new();
    let width = bench.id("Width");

    bench.panel.user_edit(width, Value::Int(65)).unwrap();
    assert_eq!(bench.panel.value_of(width), Some(Value::Int(65)));

    // Edit reaches the session, the correction comes back and is applied silently.
    let edit = bench.from_panel.try_recv().unwrap();
    bench.session.apply_control(edit).unwrap();
    assert_eq!(bench.panel.drain(&mut bench.from_session), 1);
    assert_eq!(bench.panel.value_of(width), Some(Value::Int(64)));
    assert!(bench.from_panel.try_recv().is_err());
    assert_eq!(bench.probe.read_value("Width"), Some(Value::Int(64)));
}

#[test]
fn test_accepted_edit_reaches_device() {
    let mut bench = Bench::new();
    let exposure = bench.id("Exposure Time");
    bench.panel.user_edit(exposure, Value::Float(800.0)).unwrap();
    bench.pump();
    assert_eq!(bench.probe.read_value("ExposureTime"), Some(Value::Float(800.0)));
    assert_eq!(bench.panel.value_of(exposure), Some(Value::Float(800.0)));
}

#[test]
fn test_start_button_rebuilds_panel() {
    let mut bench = Bench::new();
    let old_width = bench.id("Width");

    bench.panel.activate(bench.id("Acquisition Start")).unwrap();
    bench.pump();

    assert_eq!(bench.session.mode(), Mode::Started);
    assert!(bench.panel.control(old_width).is_none());
    let width = bench.id("Width");
    assert_eq!(bench.panel.is_enabled(width), Some(false));
    assert_eq!(bench.probe.executed_commands(), vec!["AcquisitionStart"]);

    bench.panel.activate(bench.id("Acquisition Stop")).unwrap();
    bench.pump();
    assert_eq!(bench.session.mode(), Mode::Stopped);
    assert_eq!(bench.panel.is_enabled(bench.id("Width")), Some(true));
}
