//! GenICam device access.
//!
//! - [`node`]: live feature nodes, one closed enum over the seven feature kinds
//! - [`device`]: transport backend, acquirer and buffer traits (the vendor SDK seam)
//! - [`pfnc`]: pixel format codes
//! - [`sim`]: simulated backend used by the headless mode and the tests

pub mod device;
pub mod node;
pub mod pfnc;
pub mod sim;

pub use device::{
    AcquiredBuffer, DeviceError, DeviceInfo, FetchError, ImageAcquirer, ImageComponent, Samples,
    TransportBackend,
};
pub use node::{
    BooleanNode, CategoryNode, CommandNode, EnumerationNode, FeatureNode, FloatNode,
    IntegerNode, InterfaceType, NodeError, NodeInfo, StringNode,
};
pub use sim::{SimOptions, SimProbe, SimSystem};

/// SFNC name of the command that starts streaming.
pub const ACQUISITION_START: &str = "AcquisitionStart";
/// SFNC name of the command that stops streaming.
pub const ACQUISITION_STOP: &str = "AcquisitionStop";
