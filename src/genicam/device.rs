//! Transport layer and acquisition traits.
//!
//! These traits are the seam between the bridge and a vendor GenTL SDK. They follow the shape
//! of a GenTL consumer: a [`TransportBackend`] loads one or more producer (`.cti`) files,
//! enumerates devices and opens an [`ImageAcquirer`] on one of them. The acquirer exposes the
//! remote device node map and hands out buffers which must be queued back once consumed.
//!
//! All calls are synchronous. A fetch blocks for up to the caller's timeout, so async callers
//! run it on the blocking pool.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use super::node::FeatureNode;

/// Failure reported by the transport layer or a device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// A producer file could not be loaded.
    #[error("failed to load producer '{path}': {reason}")]
    ProducerLoad {
        /// Path that was given.
        path: String,
        /// SDK reason.
        reason: String,
    },

    /// No device at the requested index.
    #[error("no device at index {0}")]
    NoSuchDevice(usize),

    /// The device is opened elsewhere or mid-transition.
    #[error("device busy")]
    Busy,

    /// Any other SDK failure.
    #[error("{0}")]
    Backend(String),
}

/// Failure of a single buffer fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// No buffer became ready within the timeout. Expected while streaming.
    #[error("fetch timed out")]
    Timeout,

    /// The stream is not running.
    #[error("acquisition not started")]
    NotStarted,

    /// Any other SDK failure.
    #[error("{0}")]
    Device(String),
}

/// Entry of the device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Producer-unique device id.
    pub id: String,
    /// Vendor name.
    pub vendor: String,
    /// Model name.
    pub model: String,
    /// Serial number.
    pub serial_number: String,
}

/// Raw samples of one image component, as delivered by the SDK.
///
/// Formats with more than 8 bits per sample are delivered unpacked, one `u16` per sample.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    /// One byte per sample.
    U8(&'a [u8]),
    /// Two bytes per sample.
    U16(&'a [u16]),
}

impl Samples<'_> {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Samples::U8(data) => data.len(),
            Samples::U16(data) => data.len(),
        }
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Borrowed view of one component of a fetched buffer's payload.
#[derive(Debug, Clone, Copy)]
pub struct ImageComponent<'a> {
    /// Pixels per row.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// PFNC pixel format code.
    pub data_format: u32,
    /// Samples per pixel.
    pub num_components_per_pixel: usize,
    /// Samples in row-major order.
    pub data: Samples<'a>,
}

/// A buffer lent out by the SDK. Must be handed back with [`AcquiredBuffer::queue`].
pub trait AcquiredBuffer: Send {
    /// Image components of the payload. The first one carries the image.
    fn components(&self) -> Vec<ImageComponent<'_>>;

    /// Return the buffer to the device's pool so the SDK can fill it again.
    fn queue(self: Box<Self>);
}

/// An opened device with its stream.
pub trait ImageAcquirer: Send {
    /// Top level features of the remote device node map (`Root`).
    fn root_features(&self) -> Vec<FeatureNode>;

    /// Start the stream and the device acquisition.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Stop the device acquisition and the stream.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Wait at most `timeout` for the next filled buffer.
    fn fetch(&mut self, timeout: Duration) -> Result<Box<dyn AcquiredBuffer>, FetchError>;
}

/// A GenTL consumer: producer loading, device discovery, acquirer creation.
pub trait TransportBackend: Send {
    /// Load a GenTL producer file.
    fn add_file(&mut self, path: &Path) -> Result<(), DeviceError>;

    /// Refresh the device list from every loaded producer.
    fn update(&mut self) -> Result<(), DeviceError>;

    /// Devices found by the last [`update`](TransportBackend::update).
    fn device_info_list(&self) -> Vec<DeviceInfo>;

    /// Open the device at `index` of the device list.
    fn create(&mut self, index: usize) -> Result<Box<dyn ImageAcquirer>, DeviceError>;

    /// Release every acquirer and producer. Safe to call more than once.
    fn reset(&mut self);
}
