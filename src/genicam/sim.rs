//! Simulated GenTL backend
//!
//! Provides a transport backend and camera that behave like a GenICam device without
//! hardware or a vendor SDK.
//!
//! # Available simulations
//!
//! - `SimSystem` - transport backend: producer loading, device enumeration, acquirer creation
//! - `SimCamera` - opened device with an SFNC-style feature tree and a test-pattern stream
//! - `SimProbe` - shared handle for tests to observe and steer the simulation
//!
//! # Behaviour
//!
//! - Width, Height and PixelFormat become read-only while acquiring
//! - Writes are validated against range, increment grid, access mode and enum entries
//! - Fetches can be made to time out on demand (`SimProbe::inject_timeouts`, `set_stalled`)
//! - Every fetched buffer must be queued back; `SimProbe::outstanding_buffers` counts the rest

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::device::{
    AcquiredBuffer, DeviceError, DeviceInfo, FetchError, ImageAcquirer, ImageComponent, Samples,
    TransportBackend,
};
use super::node::{
    BooleanNode, CategoryNode, CommandNode, EnumerationNode, FeatureNode, FloatNode,
    IntegerNode, InterfaceType, NodeError, NodeInfo, StringNode,
};
use super::pfnc;
use crate::feature::{AccessMode, Value, Visibility};

// =============================================================================
// SimProbe - observation and fault injection
// =============================================================================

#[derive(Default)]
struct ProbeState {
    starts: AtomicUsize,
    stops: AtomicUsize,
    resets: AtomicUsize,
    fetches: AtomicUsize,
    outstanding: AtomicUsize,
    pending_timeouts: AtomicUsize,
    stalled: AtomicBool,
    busy: AtomicBool,
    commands: Mutex<Vec<String>>,
    nodes: RwLock<HashMap<String, FeatureNode>>,
}

/// Shared view into a [`SimSystem`] and every camera it opens.
///
/// Cloning is cheap; all clones observe the same counters.
#[derive(Clone, Default)]
pub struct SimProbe {
    state: Arc<ProbeState>,
}

impl SimProbe {
    /// Number of acquisition starts.
    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    /// Number of acquisition stops.
    pub fn stops(&self) -> usize {
        self.state.stops.load(Ordering::SeqCst)
    }

    /// Number of backend resets.
    pub fn resets(&self) -> usize {
        self.state.resets.load(Ordering::SeqCst)
    }

    /// Number of fetch calls, successful or not.
    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    /// Buffers handed out and not yet queued back.
    pub fn outstanding_buffers(&self) -> usize {
        self.state.outstanding.load(Ordering::SeqCst)
    }

    /// Machine names of executed commands, in order.
    pub fn executed_commands(&self) -> Vec<String> {
        self.state.commands.lock().clone()
    }

    /// Make the next `count` fetches time out.
    pub fn inject_timeouts(&self, count: usize) {
        self.state.pending_timeouts.fetch_add(count, Ordering::SeqCst);
    }

    /// While stalled, every fetch times out.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.stalled.store(stalled, Ordering::SeqCst);
    }

    /// While busy, every feature write is rejected with [`NodeError::Busy`].
    pub fn set_busy(&self, busy: bool) {
        self.state.busy.store(busy, Ordering::SeqCst);
    }

    /// Live node of the most recently opened camera, by machine name.
    pub fn node(&self, name: &str) -> Option<FeatureNode> {
        self.state.nodes.read().get(name).cloned()
    }

    /// Current value of a live node, read straight from the device.
    pub fn read_value(&self, name: &str) -> Option<Value> {
        match self.node(name)? {
            FeatureNode::Integer(n) => n.value().ok().map(Value::Int),
            FeatureNode::Float(n) => n.value().ok().map(Value::Float),
            FeatureNode::Boolean(n) => n.value().ok().map(Value::Bool),
            FeatureNode::Enumeration(n) => n.value().ok().map(Value::Text),
            FeatureNode::String(n) => n.value().ok().map(Value::Text),
            FeatureNode::Category(_) | FeatureNode::Command(_) | FeatureNode::Unsupported(..) => {
                None
            }
        }
    }

    fn take_timeout(&self) -> bool {
        if self.state.stalled.load(Ordering::SeqCst) {
            return true;
        }
        self.state
            .pending_timeouts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn register(&self, node: &FeatureNode) {
        self.state
            .nodes
            .write()
            .insert(node.name().to_string(), node.clone());
        if let FeatureNode::Category(category) = node {
            for child in category.features() {
                self.register(&child);
            }
        }
    }
}

impl std::fmt::Debug for SimProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimProbe")
            .field("starts", &self.starts())
            .field("stops", &self.stops())
            .field("resets", &self.resets())
            .field("outstanding", &self.outstanding_buffers())
            .finish()
    }
}

// =============================================================================
// Simulated nodes
// =============================================================================

struct DeviceState {
    acquiring: AtomicBool,
    probe: SimProbe,
}

struct Base {
    name: String,
    display_name: String,
    visibility: Visibility,
    access: AccessMode,
    lock_while_acquiring: bool,
    device: Arc<DeviceState>,
}

impl Base {
    fn access_mode(&self) -> AccessMode {
        if self.lock_while_acquiring
            && self.access == AccessMode::ReadWrite
            && self.device.acquiring.load(Ordering::SeqCst)
        {
            AccessMode::ReadOnly
        } else {
            self.access
        }
    }

    fn check_readable(&self) -> Result<(), NodeError> {
        match self.access_mode() {
            AccessMode::NotAvailable => Err(NodeError::AccessDenied(AccessMode::NotAvailable)),
            _ => Ok(()),
        }
    }

    fn check_writable(&self) -> Result<(), NodeError> {
        if self.device.probe.state.busy.load(Ordering::SeqCst) {
            return Err(NodeError::Busy);
        }
        let mode = self.access_mode();
        if mode.is_writable() {
            Ok(())
        } else {
            Err(NodeError::AccessDenied(mode))
        }
    }
}

macro_rules! impl_node_info {
    ($($ty:ty),* $(,)?) => {
        $(impl NodeInfo for $ty {
            fn name(&self) -> &str {
                &self.base.name
            }
            fn display_name(&self) -> &str {
                &self.base.display_name
            }
            fn visibility(&self) -> Visibility {
                self.base.visibility
            }
            fn access_mode(&self) -> AccessMode {
                self.base.access_mode()
            }
        })*
    };
}

struct SimCategory {
    base: Base,
    children: Vec<FeatureNode>,
}

impl CategoryNode for SimCategory {
    fn features(&self) -> Vec<FeatureNode> {
        self.children.clone()
    }
}

struct SimInteger {
    base: Base,
    value: RwLock<i64>,
    min: i64,
    max: i64,
    inc: i64,
}

impl IntegerNode for SimInteger {
    fn value(&self) -> Result<i64, NodeError> {
        self.base.check_readable()?;
        Ok(*self.value.read())
    }

    fn set_value(&self, value: i64) -> Result<(), NodeError> {
        self.base.check_writable()?;
        if value < self.min || value > self.max || (value - self.min) % self.inc != 0 {
            return Err(NodeError::OutOfRange {
                value: value.to_string(),
                min: self.min.to_string(),
                max: self.max.to_string(),
            });
        }
        *self.value.write() = value;
        Ok(())
    }

    fn min(&self) -> Result<i64, NodeError> {
        Ok(self.min)
    }

    fn max(&self) -> Result<i64, NodeError> {
        Ok(self.max)
    }

    fn inc(&self) -> Result<i64, NodeError> {
        Ok(self.inc)
    }
}

struct SimFloat {
    base: Base,
    value: RwLock<f64>,
    min: f64,
    max: f64,
    inc: Option<f64>,
}

impl FloatNode for SimFloat {
    fn value(&self) -> Result<f64, NodeError> {
        self.base.check_readable()?;
        Ok(*self.value.read())
    }

    fn set_value(&self, value: f64) -> Result<(), NodeError> {
        self.base.check_writable()?;
        if !(self.min..=self.max).contains(&value) {
            return Err(NodeError::OutOfRange {
                value: value.to_string(),
                min: self.min.to_string(),
                max: self.max.to_string(),
            });
        }
        *self.value.write() = value;
        Ok(())
    }

    fn min(&self) -> Result<f64, NodeError> {
        Ok(self.min)
    }

    fn max(&self) -> Result<f64, NodeError> {
        Ok(self.max)
    }

    fn inc(&self) -> Result<Option<f64>, NodeError> {
        Ok(self.inc)
    }
}

struct SimBoolean {
    base: Base,
    value: RwLock<bool>,
}

impl BooleanNode for SimBoolean {
    fn value(&self) -> Result<bool, NodeError> {
        self.base.check_readable()?;
        Ok(*self.value.read())
    }

    fn set_value(&self, value: bool) -> Result<(), NodeError> {
        self.base.check_writable()?;
        *self.value.write() = value;
        Ok(())
    }
}

struct SimEnumeration {
    base: Base,
    value: RwLock<String>,
    entries: Vec<String>,
}

impl EnumerationNode for SimEnumeration {
    fn value(&self) -> Result<String, NodeError> {
        self.base.check_readable()?;
        Ok(self.value.read().clone())
    }

    fn set_value(&self, symbolic: &str) -> Result<(), NodeError> {
        self.base.check_writable()?;
        if !self.entries.iter().any(|entry| entry == symbolic) {
            return Err(NodeError::InvalidEntry(symbolic.to_string()));
        }
        *self.value.write() = symbolic.to_string();
        Ok(())
    }

    fn entries(&self) -> Vec<String> {
        self.entries.clone()
    }
}

struct SimString {
    base: Base,
    value: RwLock<String>,
}

impl StringNode for SimString {
    fn value(&self) -> Result<String, NodeError> {
        self.base.check_readable()?;
        Ok(self.value.read().clone())
    }

    fn set_value(&self, value: &str) -> Result<(), NodeError> {
        self.base.check_writable()?;
        *self.value.write() = value.to_string();
        Ok(())
    }
}

struct SimCommand {
    base: Base,
}

impl CommandNode for SimCommand {
    fn execute(&self) -> Result<(), NodeError> {
        self.base.check_readable()?;
        debug!(command = %self.base.name, "SimCamera: executing command");
        self.base
            .device
            .probe
            .state
            .commands
            .lock()
            .push(self.base.name.clone());
        Ok(())
    }
}

struct SimRegister {
    base: Base,
}

impl_node_info!(
    SimCategory,
    SimInteger,
    SimFloat,
    SimBoolean,
    SimEnumeration,
    SimString,
    SimCommand,
    SimRegister,
);

// =============================================================================
// Feature tree
// =============================================================================

/// Pixel formats the simulated camera offers.
const PIXEL_FORMATS: &[&str] = &[
    "Mono8", "Mono12", "Mono16", "BayerRG8", "RGB8", "BGR8", "BGRa8", "YUV422_8",
];

struct TreeBuilder {
    device: Arc<DeviceState>,
}

impl TreeBuilder {
    fn base(&self, name: &str, display_name: &str, visibility: Visibility, access: AccessMode) -> Base {
        Base {
            name: name.to_string(),
            display_name: display_name.to_string(),
            visibility,
            access,
            lock_while_acquiring: false,
            device: Arc::clone(&self.device),
        }
    }

    fn category(&self, name: &str, display_name: &str, children: Vec<FeatureNode>) -> FeatureNode {
        FeatureNode::Category(Arc::new(SimCategory {
            base: self.base(name, display_name, Visibility::Beginner, AccessMode::ReadOnly),
            children,
        }))
    }

    fn integer(&self, base: Base, value: i64, (min, max, inc): (i64, i64, i64)) -> Arc<SimInteger> {
        Arc::new(SimInteger {
            base,
            value: RwLock::new(value),
            min,
            max,
            inc,
        })
    }

    fn float(&self, base: Base, value: f64, min: f64, max: f64, inc: Option<f64>) -> FeatureNode {
        FeatureNode::Float(Arc::new(SimFloat {
            base,
            value: RwLock::new(value),
            min,
            max,
            inc,
        }))
    }

    fn string(&self, base: Base, value: &str) -> FeatureNode {
        FeatureNode::String(Arc::new(SimString {
            base,
            value: RwLock::new(value.to_string()),
        }))
    }

    fn enumeration(&self, base: Base, value: &str, entries: &[&str]) -> Arc<SimEnumeration> {
        Arc::new(SimEnumeration {
            base,
            value: RwLock::new(value.to_string()),
            entries: entries.iter().map(|e| e.to_string()).collect(),
        })
    }

    fn command(&self, name: &str, display_name: &str) -> FeatureNode {
        FeatureNode::Command(Arc::new(SimCommand {
            base: self.base(name, display_name, Visibility::Beginner, AccessMode::ReadWrite),
        }))
    }
}

// =============================================================================
// SimCamera - opened device
// =============================================================================

/// Simulated camera opened by [`SimSystem::create`].
///
/// Streams a diagonal gradient that shifts by one grey level per frame, in whatever pixel
/// format the `PixelFormat` feature selects.
pub struct SimCamera {
    device: Arc<DeviceState>,
    root: Vec<FeatureNode>,
    width: Arc<SimInteger>,
    height: Arc<SimInteger>,
    pixel_format: Arc<SimEnumeration>,
    sequence: AtomicU64,
}

impl SimCamera {
    fn new(serial: &str, options: &SimOptions, probe: SimProbe) -> Self {
        use AccessMode::{NotAvailable, ReadOnly, ReadWrite};
        use Visibility::{Beginner, Expert, Guru};

        let device = Arc::new(DeviceState {
            acquiring: AtomicBool::new(false),
            probe: probe.clone(),
        });
        let t = TreeBuilder {
            device: Arc::clone(&device),
        };

        let mut width_base = t.base("Width", "Width", Beginner, ReadWrite);
        width_base.lock_while_acquiring = true;
        let width = t.integer(width_base, options.width, (8, 4096, 8));

        let mut height_base = t.base("Height", "Height", Beginner, ReadWrite);
        height_base.lock_while_acquiring = true;
        let height = t.integer(height_base, options.height, (8, 3072, 2));

        let mut format_base = t.base("PixelFormat", "Pixel Format", Beginner, ReadWrite);
        format_base.lock_while_acquiring = true;
        let pixel_format = t.enumeration(format_base, &options.pixel_format, PIXEL_FORMATS);

        let device_control = t.category(
            "DeviceControl",
            "Device Control",
            vec![
                t.string(t.base("DeviceVendorName", "Vendor Name", Beginner, ReadOnly), "GenICam Bridge"),
                t.string(t.base("DeviceModelName", "Model Name", Beginner, ReadOnly), "SimCamera"),
                t.string(t.base("DeviceSerialNumber", "Serial Number", Expert, ReadOnly), serial),
                t.string(t.base("DeviceUserID", "Device User ID", Expert, ReadWrite), ""),
                t.float(
                    t.base("DeviceTemperature", "Device Temperature", Expert, ReadOnly),
                    42.5,
                    -20.0,
                    90.0,
                    None,
                ),
                FeatureNode::Integer(t.integer(
                    t.base("Timestamp", "Timestamp", Guru, NotAvailable),
                    0,
                    (0, i64::MAX, 1),
                )),
            ],
        );

        let mut image_format = vec![
            FeatureNode::Integer(width.clone()),
            FeatureNode::Integer(height.clone()),
            FeatureNode::Enumeration(pixel_format.clone()),
            FeatureNode::Boolean(Arc::new(SimBoolean {
                base: t.base("ReverseX", "Reverse X", Expert, ReadWrite),
                value: RwLock::new(false),
            })),
        ];
        if options.register_node {
            image_format.push(FeatureNode::Unsupported(
                Arc::new(SimRegister {
                    base: t.base("LUTValueAll", "LUT Value All", Guru, ReadWrite),
                }),
                InterfaceType::Register,
            ));
        }
        let image_format = t.category("ImageFormatControl", "Image Format Control", image_format);

        let acquisition_control = t.category(
            "AcquisitionControl",
            "Acquisition Control",
            vec![
                FeatureNode::Enumeration(t.enumeration(
                    t.base("AcquisitionMode", "Acquisition Mode", Beginner, ReadWrite),
                    "Continuous",
                    &["Continuous", "SingleFrame", "MultiFrame"],
                )),
                t.command("AcquisitionStart", "Acquisition Start"),
                t.command("AcquisitionStop", "Acquisition Stop"),
                t.float(
                    t.base("ExposureTime", "Exposure Time", Beginner, ReadWrite),
                    5000.0,
                    10.0,
                    1.0e6,
                    None,
                ),
                t.float(
                    t.base("AcquisitionFrameRate", "Acquisition Frame Rate", Expert, ReadWrite),
                    30.0,
                    1.0,
                    120.0,
                    None,
                ),
            ],
        );

        let analog_control = t.category(
            "AnalogControl",
            "Analog Control",
            vec![
                t.float(t.base("Gain", "Gain", Beginner, ReadWrite), 0.0, 0.0, 24.0, Some(0.1)),
                t.float(
                    t.base("BlackLevel", "Black Level", Expert, ReadWrite),
                    0.0,
                    0.0,
                    64.0,
                    Some(0.25),
                ),
            ],
        );

        let transport_layer = t.category(
            "TransportLayerControl",
            "Transport Layer Control",
            vec![
                FeatureNode::Integer(t.integer(
                    t.base("GevSCPSPacketSize", "Packet Size", Expert, ReadWrite),
                    1500,
                    (576, 9000, 4),
                )),
                FeatureNode::Integer(t.integer(
                    t.base("GevTimestampTickFrequency", "Timestamp Tick Frequency", Guru, ReadOnly),
                    1_000_000_000,
                    (0, i64::MAX, 1),
                )),
            ],
        );

        let root = vec![
            device_control,
            image_format,
            acquisition_control,
            analog_control,
            transport_layer,
        ];
        for node in &root {
            probe.register(node);
        }

        Self {
            device,
            root,
            width,
            height,
            pixel_format,
            sequence: AtomicU64::new(0),
        }
    }

    fn probe(&self) -> &SimProbe {
        &self.device.probe
    }

    fn render(&self) -> Result<SimBuffer, FetchError> {
        let width = usize::try_from(*self.width.value.read())
            .map_err(|e| FetchError::Device(e.to_string()))?;
        let height = usize::try_from(*self.height.value.read())
            .map_err(|e| FetchError::Device(e.to_string()))?;
        let format_name = self.pixel_format.value.read().clone();
        let format = pfnc::by_name(&format_name)
            .ok_or_else(|| FetchError::Device(format!("no PFNC entry for {format_name}")))?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let channels = format.channels;
        let level = |index: usize| {
            let pixel = index / channels;
            let (row, col, ch) = (pixel / width, pixel % width, index % channels);
            ((row + col + ch * 64) as u64 + sequence) % 256
        };
        let count = width * height * channels;
        let samples = if format.bytes_per_sample() == 1 {
            SimSamples::U8((0..count).map(|i| level(i) as u8).collect())
        } else {
            let shift = format.bits_per_channel - 8;
            SimSamples::U16((0..count).map(|i| (level(i) << shift) as u16).collect())
        };

        Ok(SimBuffer {
            width,
            height,
            data_format: format.code,
            channels,
            samples,
            probe: self.probe().clone(),
        })
    }
}

impl ImageAcquirer for SimCamera {
    fn root_features(&self) -> Vec<FeatureNode> {
        self.root.clone()
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.device.acquiring.store(true, Ordering::SeqCst);
        self.probe().state.starts.fetch_add(1, Ordering::SeqCst);
        info!("SimCamera: acquisition started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.device.acquiring.store(false, Ordering::SeqCst);
        self.probe().state.stops.fetch_add(1, Ordering::SeqCst);
        info!("SimCamera: acquisition stopped");
        Ok(())
    }

    fn fetch(&mut self, timeout: Duration) -> Result<Box<dyn AcquiredBuffer>, FetchError> {
        self.probe().state.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.device.acquiring.load(Ordering::SeqCst) {
            return Err(FetchError::NotStarted);
        }
        if self.probe().take_timeout() {
            std::thread::sleep(timeout);
            return Err(FetchError::Timeout);
        }
        let buffer = self.render()?;
        self.probe().state.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(buffer))
    }
}

enum SimSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

struct SimBuffer {
    width: usize,
    height: usize,
    data_format: u32,
    channels: usize,
    samples: SimSamples,
    probe: SimProbe,
}

impl AcquiredBuffer for SimBuffer {
    fn components(&self) -> Vec<ImageComponent<'_>> {
        let data = match &self.samples {
            SimSamples::U8(data) => Samples::U8(data),
            SimSamples::U16(data) => Samples::U16(data),
        };
        vec![ImageComponent {
            width: self.width,
            height: self.height,
            data_format: self.data_format,
            num_components_per_pixel: self.channels,
            data,
        }]
    }

    fn queue(self: Box<Self>) {
        self.probe.state.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// SimSystem - transport backend
// =============================================================================

/// Construction options for [`SimSystem`].
#[derive(Debug, Clone)]
pub struct SimOptions {
    /// Number of devices reported once a producer is loaded.
    pub devices: usize,
    /// Initial `Width`.
    pub width: i64,
    /// Initial `Height`.
    pub height: i64,
    /// Initial `PixelFormat` entry.
    pub pixel_format: String,
    /// Add an `IRegister` node to the image format category.
    pub register_node: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            devices: 1,
            width: 64,
            height: 48,
            pixel_format: "Mono8".to_string(),
            register_node: false,
        }
    }
}

/// Simulated GenTL consumer.
///
/// Any path with a `.cti` extension is accepted as a producer; the file does not have to
/// exist. Devices are only reported after a producer has been loaded and
/// [`update`](TransportBackend::update) has run.
pub struct SimSystem {
    options: SimOptions,
    producers: Vec<PathBuf>,
    devices: Vec<DeviceInfo>,
    opened: Vec<usize>,
    probe: SimProbe,
}

impl SimSystem {
    /// Backend with one Mono8 camera.
    pub fn new() -> Self {
        Self::with_options(SimOptions::default())
    }

    /// Backend with custom options.
    pub fn with_options(options: SimOptions) -> Self {
        Self {
            options,
            producers: Vec::new(),
            devices: Vec::new(),
            opened: Vec::new(),
            probe: SimProbe::default(),
        }
    }

    /// Probe shared with every camera this backend opens.
    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }
}

impl Default for SimSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportBackend for SimSystem {
    fn add_file(&mut self, path: &Path) -> Result<(), DeviceError> {
        if path.extension().and_then(|e| e.to_str()) != Some("cti") {
            return Err(DeviceError::ProducerLoad {
                path: path.display().to_string(),
                reason: "not a GenTL producer (.cti)".to_string(),
            });
        }
        debug!(path = %path.display(), "SimSystem: producer loaded");
        self.producers.push(path.to_path_buf());
        Ok(())
    }

    fn update(&mut self) -> Result<(), DeviceError> {
        self.devices = if self.producers.is_empty() {
            Vec::new()
        } else {
            (0..self.options.devices)
                .map(|index| DeviceInfo {
                    id: format!("sim-{index}"),
                    vendor: "GenICam Bridge".to_string(),
                    model: "SimCamera".to_string(),
                    serial_number: format!("SIM{index:05}"),
                })
                .collect()
        };
        Ok(())
    }

    fn device_info_list(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }

    fn create(&mut self, index: usize) -> Result<Box<dyn ImageAcquirer>, DeviceError> {
        let info = self
            .devices
            .get(index)
            .ok_or(DeviceError::NoSuchDevice(index))?;
        if self.opened.contains(&index) {
            return Err(DeviceError::Busy);
        }
        let camera = SimCamera::new(&info.serial_number, &self.options, self.probe.clone());
        info!(device = %info.id, "SimSystem: device opened");
        self.opened.push(index);
        Ok(Box::new(camera))
    }

    fn reset(&mut self) {
        self.producers.clear();
        self.devices.clear();
        self.opened.clear();
        self.probe.state.resets.fetch_add(1, Ordering::SeqCst);
        debug!("SimSystem: reset");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn open(options: SimOptions) -> (Box<dyn ImageAcquirer>, SimProbe) {
        let mut system = SimSystem::with_options(options);
        system.add_file(Path::new("/opt/sim/producer.cti")).unwrap();
        system.update().unwrap();
        let camera = system.create(0).unwrap();
        (camera, system.probe())
    }

    #[test]
    fn test_devices_require_producer() {
        let mut system = SimSystem::new();
        system.update().unwrap();
        assert!(system.device_info_list().is_empty());
        assert!(matches!(
            system.add_file(Path::new("libproducer.so")),
            Err(DeviceError::ProducerLoad { .. })
        ));

        system.add_file(Path::new("producer.cti")).unwrap();
        system.update().unwrap();
        assert_eq!(system.device_info_list().len(), 1);
        assert!(matches!(system.create(3), Err(DeviceError::NoSuchDevice(3))));

        system.create(0).unwrap();
        assert!(matches!(system.create(0), Err(DeviceError::Busy)));
        system.reset();
        assert_eq!(system.probe().resets(), 1);
        assert!(system.device_info_list().is_empty());
    }

    #[test]
    fn test_writes_are_validated() {
        let (_camera, probe) = open(SimOptions::default());
        let Some(FeatureNode::Integer(width)) = probe.node("Width") else {
            panic!("Width should be an integer node");
        };
        assert!(width.set_value(128).is_ok());
        assert!(matches!(width.set_value(130), Err(NodeError::OutOfRange { .. })));
        assert!(matches!(width.set_value(1), Err(NodeError::OutOfRange { .. })));
        assert_eq!(width.value().unwrap(), 128);

        let Some(FeatureNode::Enumeration(format)) = probe.node("PixelFormat") else {
            panic!("PixelFormat should be an enumeration node");
        };
        assert!(matches!(format.set_value("Mono42"), Err(NodeError::InvalidEntry(_))));

        let Some(FeatureNode::String(vendor)) = probe.node("DeviceVendorName") else {
            panic!("DeviceVendorName should be a string node");
        };
        assert_eq!(
            vendor.set_value("ACME"),
            Err(NodeError::AccessDenied(AccessMode::ReadOnly))
        );

        probe.set_busy(true);
        assert_eq!(width.set_value(64), Err(NodeError::Busy));
    }

    #[test]
    fn test_geometry_locked_while_acquiring() {
        let (mut camera, probe) = open(SimOptions::default());
        let width = probe.node("Width").unwrap();
        assert_eq!(width.access_mode(), AccessMode::ReadWrite);

        camera.start().unwrap();
        assert_eq!(width.access_mode(), AccessMode::ReadOnly);
        camera.stop().unwrap();
        assert_eq!(width.access_mode(), AccessMode::ReadWrite);
        assert_eq!((probe.starts(), probe.stops()), (1, 1));
    }

    #[test]
    fn test_fetch_and_queue() {
        let (mut camera, probe) = open(SimOptions {
            pixel_format: "Mono16".into(),
            ..SimOptions::default()
        });
        assert!(matches!(
            camera.fetch(Duration::from_millis(1)),
            Err(FetchError::NotStarted)
        ));

        camera.start().unwrap();
        probe.inject_timeouts(1);
        assert!(matches!(
            camera.fetch(Duration::from_millis(1)),
            Err(FetchError::Timeout)
        ));

        let buffer = camera.fetch(Duration::from_millis(1)).unwrap();
        assert_eq!(probe.outstanding_buffers(), 1);
        {
            let components = buffer.components();
            let component = components[0];
            assert_eq!((component.width, component.height), (64, 48));
            assert_eq!(component.data_format, 0x0110_0007);
            let Samples::U16(data) = component.data else {
                panic!("Mono16 should deliver u16 samples");
            };
            assert_eq!(data.len(), 64 * 48);
            assert_eq!(data[1], 1 << 8);
        }
        buffer.queue();
        assert_eq!(probe.outstanding_buffers(), 0);
    }

    #[test]
    fn test_register_node_is_unsupported() {
        let (_camera, probe) = open(SimOptions {
            register_node: true,
            ..SimOptions::default()
        });
        let node = probe.node("LUTValueAll").unwrap();
        assert_eq!(node.interface_name(), "IRegister");
    }
}
