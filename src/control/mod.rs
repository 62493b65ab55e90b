//! Control panel model.
//!
//! [`ControlSynchronizer`] keeps one control per feature of the latest tree generation and
//! synchronises it with the camera session in both directions:
//!
//! - inbound [`ControlMessage::Specs`] rebuild every control from scratch;
//! - inbound camera-origin [`FeatureValue`]s overwrite a control with its change
//!   notifications blocked, so nothing is echoed back;
//! - user edits update the control and emit a controller-origin [`FeatureValue`] on the
//!   outbound channel.
//!
//! Controls live in a flat arena addressed by [`ControlIndex`]. Groups reference their
//! children by index. The model is independent of any GUI toolkit; `crate::gui` draws it.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::feature::{
    AccessMode, FeatureId, FeatureSpec, FeatureSpecs, FeatureValue, Origin, Value, Visibility,
};
use crate::session::ControlMessage;

/// Position of a control in the arena.
pub type ControlIndex = usize;

/// Widget a feature is edited with.
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    /// Integer feature.
    SpinBox {
        /// Current value.
        value: i64,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
        /// Increment between accepted values.
        step: i64,
    },
    /// Float feature.
    FloatField {
        /// Current value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
        /// Increment between accepted values.
        step: Option<f64>,
    },
    /// Boolean feature.
    Checkbox {
        /// Current value.
        checked: bool,
    },
    /// Enumeration feature.
    ComboBox {
        /// Entries in device order.
        items: Vec<String>,
        /// Current entry.
        selected: String,
    },
    /// String feature.
    LineEdit {
        /// Current text.
        text: String,
    },
    /// Command feature.
    Button,
    /// Category with a label above its children.
    Group {
        /// Child controls in device order.
        children: Vec<ControlIndex>,
    },
}

impl Widget {
    fn from_spec(spec: &FeatureSpec) -> Self {
        match spec {
            FeatureSpec::Category(_) => Widget::Group {
                children: Vec::new(),
            },
            FeatureSpec::Integer(s) => Widget::SpinBox {
                value: s.value,
                min: s.min.unwrap_or(i64::MIN),
                max: s.max.unwrap_or(i64::MAX),
                step: s.inc.unwrap_or(1),
            },
            FeatureSpec::Float(s) => Widget::FloatField {
                value: s.value,
                min: s.min.unwrap_or(f64::MIN),
                max: s.max.unwrap_or(f64::MAX),
                step: s.inc,
            },
            FeatureSpec::Boolean(s) => Widget::Checkbox { checked: s.value },
            FeatureSpec::Enum(s) => Widget::ComboBox {
                items: s.items.clone(),
                selected: s.value.clone(),
            },
            FeatureSpec::String(s) => Widget::LineEdit {
                text: s.value.clone(),
            },
            FeatureSpec::Command(_) => Widget::Button,
        }
    }

    /// Value shown by the widget, `None` for buttons and groups.
    pub fn value(&self) -> Option<Value> {
        match self {
            Widget::SpinBox { value, .. } => Some(Value::Int(*value)),
            Widget::FloatField { value, .. } => Some(Value::Float(*value)),
            Widget::Checkbox { checked } => Some(Value::Bool(*checked)),
            Widget::ComboBox { selected, .. } => Some(Value::Text(selected.clone())),
            Widget::LineEdit { text } => Some(Value::Text(text.clone())),
            Widget::Button | Widget::Group { .. } => None,
        }
    }

    /// Store `value` in the widget. Returns whether the shown value changed.
    fn set_value(&mut self, value: Value) -> BridgeResult<bool> {
        let changed = match (self, value) {
            (Widget::SpinBox { value: current, .. }, Value::Int(v)) => replace(current, v),
            (Widget::FloatField { value: current, .. }, Value::Float(v)) => replace(current, v),
            (Widget::FloatField { value: current, .. }, Value::Int(v)) => replace(current, v as f64),
            (Widget::Checkbox { checked }, Value::Bool(v)) => replace(checked, v),
            (Widget::ComboBox { selected, .. }, Value::Text(v)) => replace(selected, v),
            (Widget::LineEdit { text }, Value::Text(v)) => replace(text, v),
            (widget, value) => {
                return Err(BridgeError::ValueType {
                    expected: widget.expected_type(),
                    got: value.type_name(),
                });
            }
        };
        Ok(changed)
    }

    fn expected_type(&self) -> &'static str {
        match self {
            Widget::SpinBox { .. } => "integer",
            Widget::FloatField { .. } => "float",
            Widget::Checkbox { .. } => "boolean",
            Widget::ComboBox { .. } | Widget::LineEdit { .. } => "text",
            Widget::Button | Widget::Group { .. } => "empty",
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// One control of the panel.
#[derive(Debug, Clone)]
pub struct Control {
    /// Feature this control edits.
    pub id: FeatureId,
    /// Display name of the feature.
    pub label: String,
    /// Visibility level of the feature.
    pub visibility: Visibility,
    /// Editor and its current state.
    pub widget: Widget,
    /// False for read-only leaves. Buttons and groups are always enabled.
    pub enabled: bool,
    /// For leaves: visibility within the selected level. For groups: whether the label is
    /// shown, which is the case when at least one descendant leaf is visible.
    pub visible: bool,
    notifications_blocked: bool,
}

impl Control {
    /// Whether this control is a category label.
    pub fn is_group(&self) -> bool {
        matches!(self.widget, Widget::Group { .. })
    }
}

/// Toolkit-independent control panel, synchronised with a camera session.
#[derive(Debug)]
pub struct ControlSynchronizer {
    controls: Vec<Control>,
    roots: Vec<ControlIndex>,
    index: HashMap<FeatureId, ControlIndex>,
    level: Visibility,
    outbound: mpsc::UnboundedSender<FeatureValue>,
}

impl ControlSynchronizer {
    /// Empty panel emitting edits on `outbound`. Shows beginner features until told otherwise.
    pub fn new(outbound: mpsc::UnboundedSender<FeatureValue>) -> Self {
        Self {
            controls: Vec::new(),
            roots: Vec::new(),
            index: HashMap::new(),
            level: Visibility::Beginner,
            outbound,
        }
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Replace every control with one per spec of `specs`.
    pub fn render(&mut self, specs: &FeatureSpecs) {
        self.controls.clear();
        self.index.clear();
        let roots = specs.roots().iter().map(|spec| self.add(spec)).collect();
        self.roots = roots;
        self.refresh_visibility();
        debug!(controls = self.controls.len(), "Control panel rebuilt");
    }

    fn add(&mut self, spec: &FeatureSpec) -> ControlIndex {
        let enabled = match spec.access_mode() {
            Some(access_mode) => access_mode == AccessMode::ReadWrite,
            None => true,
        };
        let idx = self.controls.len();
        self.controls.push(Control {
            id: spec.id(),
            label: spec.display_name().to_string(),
            visibility: spec.visibility(),
            widget: Widget::from_spec(spec),
            enabled,
            visible: true,
            notifications_blocked: false,
        });
        self.index.insert(spec.id(), idx);

        if !spec.children().is_empty() {
            let children: Vec<_> = spec.children().iter().map(|child| self.add(child)).collect();
            self.controls[idx].widget = Widget::Group { children };
        }
        idx
    }

    /// Top level controls, in device order.
    pub fn roots(&self) -> &[ControlIndex] {
        &self.roots
    }

    /// Control at `idx`. Panics if `idx` is not from the current generation.
    pub fn get(&self, idx: ControlIndex) -> &Control {
        &self.controls[idx]
    }

    /// Control of the feature `id`.
    pub fn control(&self, id: FeatureId) -> Option<&Control> {
        self.index.get(&id).map(|&idx| &self.controls[idx])
    }

    /// Number of controls, groups included.
    /// Number of controls, groups included.
    pub fn len(&self) -> usize {
        self.controls.len()
    }

    /// Whether the panel holds no controls.
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    // =========================================================================
    // Visibility
    // =========================================================================

    /// Currently selected visibility level.
    pub fn visibility_level(&self) -> Visibility {
        self.level
    }

    /// Show every leaf up to `level` and recompute group labels.
    pub fn set_visibility_level(&mut self, level: Visibility) {
        self.level = level;
        self.refresh_visibility();
    }

    fn refresh_visibility(&mut self) {
        for idx in self.roots.clone() {
            self.refresh(idx);
        }
    }

    fn refresh(&mut self, idx: ControlIndex) -> bool {
        let visible = match &self.controls[idx].widget {
            Widget::Group { children } => {
                let children = children.clone();
                // No short-circuit: every descendant needs its flag updated.
                children
                    .into_iter()
                    .fold(false, |any, child| self.refresh(child) | any)
            }
            _ => self.controls[idx].visibility <= self.level,
        };
        self.controls[idx].visible = visible;
        visible
    }

    /// Whether the leaf `id` is shown.
    pub fn is_visible(&self, id: FeatureId) -> Option<bool> {
        self.control(id).map(|c| c.visible)
    }

    /// Whether the label of group `id` is shown. `None` if `id` is not a group.
    pub fn label_visible(&self, id: FeatureId) -> Option<bool> {
        self.control(id).filter(|c| c.is_group()).map(|c| c.visible)
    }

    /// Whether the control of `id` accepts edits.
    pub fn is_enabled(&self, id: FeatureId) -> Option<bool> {
        self.control(id).map(|c| c.enabled)
    }

    /// Value currently shown by the control of `id`.
    pub fn value_of(&self, id: FeatureId) -> Option<Value> {
        self.control(id).and_then(|c| c.widget.value())
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// The user changed the control of `id` to `value`.
    ///
    /// Edits on disabled controls and on groups are dropped. An edit on a button activates it.
    pub fn user_edit(&mut self, id: FeatureId, value: Value) -> BridgeResult<()> {
        let idx = self.lookup(id)?;
        let control = &self.controls[idx];
        if control.is_group() {
            return Ok(());
        }
        if control.widget == Widget::Button {
            return self.activate(id);
        }
        if !control.enabled {
            debug!(feature = %control.label, "Ignoring edit on read-only control");
            return Ok(());
        }
        self.set_value(idx, value)
    }

    /// The user pressed the button of command `id`.
    pub fn activate(&mut self, id: FeatureId) -> BridgeResult<()> {
        let idx = self.lookup(id)?;
        if self.controls[idx].widget != Widget::Button {
            return Ok(());
        }
        self.value_changed(idx, Value::Empty)
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Show a value pushed by the camera without echoing it back.
    pub fn apply_incoming(&mut self, message: FeatureValue) -> BridgeResult<()> {
        if message.origin != Origin::Camera {
            return Ok(());
        }
        let Some(&idx) = self.index.get(&message.id) else {
            trace!(id = %message.id, "Value for unknown control");
            return Ok(());
        };
        self.controls[idx].notifications_blocked = true;
        let result = self.set_value(idx, message.value);
        self.controls[idx].notifications_blocked = false;
        result
    }

    /// Dispatch one message from the session.
    pub fn handle(&mut self, message: ControlMessage) -> BridgeResult<()> {
        match message {
            ControlMessage::Specs(specs) => {
                self.render(&specs);
                Ok(())
            }
            ControlMessage::Value(value) => self.apply_incoming(value),
        }
    }

    /// Handle every message already waiting on `inbound`. Returns how many were handled.
    pub fn drain(&mut self, inbound: &mut mpsc::UnboundedReceiver<ControlMessage>) -> usize {
        let mut handled = 0;
        while let Ok(message) = inbound.try_recv() {
            if let Err(e) = self.handle(message) {
                warn!(error = %e, "Failed to apply session message");
            }
            handled += 1;
        }
        handled
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lookup(&self, id: FeatureId) -> BridgeResult<ControlIndex> {
        self.index
            .get(&id)
            .copied()
            .ok_or(BridgeError::UnknownFeature(id))
    }

    fn set_value(&mut self, idx: ControlIndex, value: Value) -> BridgeResult<()> {
        if self.controls[idx].widget.set_value(value)? {
            if let Some(value) = self.controls[idx].widget.value() {
                self.value_changed(idx, value)?;
            }
        }
        Ok(())
    }

    fn value_changed(&mut self, idx: ControlIndex, value: Value) -> BridgeResult<()> {
        let control = &self.controls[idx];
        if control.notifications_blocked {
            return Ok(());
        }
        self.outbound
            .send(FeatureValue::from_controller(control.id, value))
            .map_err(|_| BridgeError::ChannelClosed("controller"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{
        BooleanSpec, CategorySpec, CommandSpec, EnumSpec, FloatSpec, IntegerSpec, StringSpec,
    };

    struct Ids {
        device: FeatureId,
        vendor: FeatureId,
        user_id: FeatureId,
        acquisition: FeatureId,
        width: FeatureId,
        exposure: FeatureId,
        reverse_x: FeatureId,
        mode: FeatureId,
        start: FeatureId,
        guru: FeatureId,
        nested: FeatureId,
        ticks: FeatureId,
    }

    fn tree() -> (FeatureSpecs, Ids) {
        let ids = Ids {
            device: FeatureId::new_v4(),
            vendor: FeatureId::new_v4(),
            user_id: FeatureId::new_v4(),
            acquisition: FeatureId::new_v4(),
            width: FeatureId::new_v4(),
            exposure: FeatureId::new_v4(),
            reverse_x: FeatureId::new_v4(),
            mode: FeatureId::new_v4(),
            start: FeatureId::new_v4(),
            guru: FeatureId::new_v4(),
            nested: FeatureId::new_v4(),
            ticks: FeatureId::new_v4(),
        };
        let specs = FeatureSpecs(vec![
            FeatureSpec::Category(CategorySpec {
                id: ids.device,
                display_name: "Device Control".into(),
                visibility: Visibility::Beginner,
                children: vec![
                    FeatureSpec::String(StringSpec {
                        id: ids.vendor,
                        display_name: "Vendor Name".into(),
                        visibility: Visibility::Beginner,
                        access_mode: AccessMode::ReadOnly,
                        value: "ACME".into(),
                    }),
                    FeatureSpec::String(StringSpec {
                        id: ids.user_id,
                        display_name: "Device User ID".into(),
                        visibility: Visibility::Expert,
                        access_mode: AccessMode::ReadWrite,
                        value: String::new(),
                    }),
                ],
            }),
            FeatureSpec::Category(CategorySpec {
                id: ids.acquisition,
                display_name: "Acquisition Control".into(),
                visibility: Visibility::Beginner,
                children: vec![
                    FeatureSpec::Integer(IntegerSpec {
                        id: ids.width,
                        display_name: "Width".into(),
                        visibility: Visibility::Beginner,
                        access_mode: AccessMode::ReadWrite,
                        value: 640,
                        min: Some(8),
                        max: Some(4096),
                        inc: Some(8),
                    }),
                    FeatureSpec::Float(FloatSpec {
                        id: ids.exposure,
                        display_name: "Exposure Time".into(),
                        visibility: Visibility::Beginner,
                        access_mode: AccessMode::ReadWrite,
                        value: 5000.0,
                        min: Some(10.0),
                        max: Some(1.0e6),
                        inc: None,
                    }),
                    FeatureSpec::Boolean(BooleanSpec {
                        id: ids.reverse_x,
                        display_name: "Reverse X".into(),
                        visibility: Visibility::Expert,
                        access_mode: AccessMode::ReadWrite,
                        value: false,
                    }),
                    FeatureSpec::Enum(EnumSpec {
                        id: ids.mode,
                        display_name: "Acquisition Mode".into(),
                        visibility: Visibility::Beginner,
                        access_mode: AccessMode::ReadWrite,
                        value: "Continuous".into(),
                        items: vec!["Continuous".into(), "SingleFrame".into()],
                    }),
                    FeatureSpec::Command(CommandSpec {
                        id: ids.start,
                        display_name: "Acquisition Start".into(),
                        visibility: Visibility::Beginner,
                    }),
                ],
            }),
            FeatureSpec::Category(CategorySpec {
                id: ids.guru,
                display_name: "Transport Layer Control".into(),
                visibility: Visibility::Beginner,
                children: vec![FeatureSpec::Category(CategorySpec {
                    id: ids.nested,
                    display_name: "Timing".into(),
                    visibility: Visibility::Beginner,
                    children: vec![FeatureSpec::Integer(IntegerSpec {
                        id: ids.ticks,
                        display_name: "Timestamp Tick Frequency".into(),
                        visibility: Visibility::Guru,
                        access_mode: AccessMode::ReadOnly,
                        value: 1_000_000_000,
                        min: None,
                        max: None,
                        inc: None,
                    })],
                })],
            }),
        ]);
        (specs, ids)
    }

    fn panel() -> (ControlSynchronizer, mpsc::UnboundedReceiver<FeatureValue>, Ids) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sync = ControlSynchronizer::new(tx);
        let (specs, ids) = tree();
        sync.render(&specs);
        (sync, rx, ids)
    }

    #[test]
    fn test_render_picks_widget_per_kind() {
        let (sync, _rx, ids) = panel();
        assert_eq!(sync.len(), 12);
        assert_eq!(sync.roots().len(), 3);

        assert_eq!(
            sync.control(ids.width).unwrap().widget,
            Widget::SpinBox {
                value: 640,
                min: 8,
                max: 4096,
                step: 8
            }
        );
        assert!(matches!(
            sync.control(ids.exposure).unwrap().widget,
            Widget::FloatField { step: None, .. }
        ));
        assert_eq!(
            sync.control(ids.reverse_x).unwrap().widget,
            Widget::Checkbox { checked: false }
        );
        assert_eq!(sync.value_of(ids.mode), Some(Value::Text("Continuous".into())));
        assert_eq!(sync.control(ids.start).unwrap().widget, Widget::Button);
        assert_eq!(sync.value_of(ids.start), None);
        let Widget::Group { children } = &sync.control(ids.acquisition).unwrap().widget else {
            panic!("category should render as a group");
        };
        assert_eq!(children.len(), 5);
    }

    #[test]
    fn test_read_only_leaves_are_disabled() {
        let (sync, _rx, ids) = panel();
        assert_eq!(sync.is_enabled(ids.vendor), Some(false));
        assert_eq!(sync.is_enabled(ids.ticks), Some(false));
        assert_eq!(sync.is_enabled(ids.user_id), Some(true));
        assert_eq!(sync.is_enabled(ids.start), Some(true));
        assert_eq!(sync.is_enabled(ids.device), Some(true));
    }

    #[test]
    fn test_group_label_follows_descendants() {
        let (mut sync, _rx, ids) = panel();
        for level in Visibility::ALL {
            sync.set_visibility_level(level);
            for spec_id in [ids.device, ids.acquisition, ids.guru, ids.nested] {
                let control = sync.control(spec_id).unwrap();
                let Widget::Group { children } = &control.widget else {
                    panic!("expected a group");
                };
                let mut stack = children.clone();
                let mut any_leaf = false;
                while let Some(idx) = stack.pop() {
                    match &sync.get(idx).widget {
                        Widget::Group { children } => stack.extend(children),
                        _ => any_leaf |= sync.get(idx).visible,
                    }
                }
                assert_eq!(sync.label_visible(spec_id), Some(any_leaf), "{level}");
            }
        }

        sync.set_visibility_level(Visibility::Beginner);
        assert_eq!(sync.label_visible(ids.guru), Some(false));
        assert_eq!(sync.label_visible(ids.nested), Some(false));
        assert_eq!(sync.is_visible(ids.user_id), Some(false));
        assert_eq!(sync.label_visible(ids.device), Some(true));

        sync.set_visibility_level(Visibility::Guru);
        assert_eq!(sync.label_visible(ids.guru), Some(true));
        assert_eq!(sync.is_visible(ids.ticks), Some(true));
        assert_eq!(sync.label_visible(ids.width), None);
    }

    #[test]
    fn test_user_edit_emits_controller_value() {
        let (mut sync, mut rx, ids) = panel();
        sync.user_edit(ids.width, Value::Int(1024)).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            FeatureValue::from_controller(ids.width, Value::Int(1024))
        );
        assert_eq!(sync.value_of(ids.width), Some(Value::Int(1024)));

        sync.user_edit(ids.exposure, Value::Float(250.0)).unwrap();
        assert_eq!(rx.try_recv().unwrap().value, Value::Float(250.0));

        sync.activate(ids.start).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            FeatureValue::from_controller(ids.start, Value::Empty)
        );

        sync.user_edit(ids.acquisition, Value::Empty).unwrap();
        sync.user_edit(ids.vendor, Value::Text("Other".into())).unwrap();
        assert!(rx.try_recv().is_err());

        let err = sync.user_edit(ids.reverse_x, Value::Int(1)).unwrap_err();
        assert!(matches!(err, BridgeError::ValueType { expected: "boolean", got: "integer" }));
        assert!(matches!(
            sync.user_edit(FeatureId::new_v4(), Value::Int(1)),
            Err(BridgeError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_camera_values_are_not_echoed() {
        let (mut sync, mut rx, ids) = panel();
        sync.apply_incoming(FeatureValue::from_camera(ids.width, Value::Int(320)))
            .unwrap();
        sync.apply_incoming(FeatureValue::from_camera(ids.mode, Value::Text("SingleFrame".into())))
            .unwrap();
        assert_eq!(sync.value_of(ids.width), Some(Value::Int(320)));
        assert_eq!(sync.value_of(ids.mode), Some(Value::Text("SingleFrame".into())));
        assert!(rx.try_recv().is_err());

        // Edits after an inbound update still emit.
        sync.user_edit(ids.width, Value::Int(328)).unwrap();
        assert_eq!(rx.try_recv().unwrap().value, Value::Int(328));
    }

    #[test]
    fn test_foreign_and_unknown_values_are_ignored() {
        let (mut sync, mut rx, ids) = panel();
        sync.apply_incoming(FeatureValue::from_controller(ids.width, Value::Int(16)))
            .unwrap();
        assert_eq!(sync.value_of(ids.width), Some(Value::Int(640)));

        sync.apply_incoming(FeatureValue::from_camera(FeatureId::new_v4(), Value::Int(16)))
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drain_handles_messages_in_order() {
        let (tx, _out) = mpsc::unbounded_channel();
        let mut sync = ControlSynchronizer::new(tx);
        let (specs, ids) = tree();
        let (session_tx, mut session_rx) = mpsc::unbounded_channel();

        session_tx.send(ControlMessage::Specs(specs.clone())).unwrap();
        session_tx
            .send(ControlMessage::Value(FeatureValue::from_camera(ids.width, Value::Int(64))))
            .unwrap();
        assert_eq!(sync.drain(&mut session_rx), 2);
        assert_eq!(sync.value_of(ids.width), Some(Value::Int(64)));

        // A new generation drops every old control.
        let (other, _) = tree();
        session_tx.send(ControlMessage::Specs(other)).unwrap();
        assert_eq!(sync.drain(&mut session_rx), 1);
        assert!(sync.control(ids.width).is_none());
        assert_eq!(sync.len(), 12);
    }
}
