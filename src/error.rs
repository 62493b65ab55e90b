//! Custom error types for the bridge.
//!
//! `BridgeError` is the error type shared by every component. Errors fall into two groups,
//! which [`BridgeError::is_fatal`] tells apart:
//!
//! - **Recoverable**: a device call failed, a channel peer went away, a value had the wrong
//!   type for the control it was aimed at. The session logs these and keeps running.
//! - **Fatal**: the camera exposed a feature interface or pixel format this crate does not
//!   understand, or a buffer did not match its declared layout. These indicate a device
//!   compatibility defect and abort the unit of work that hit them (feature tree build, decode).
//!
//! Transient fetch timeouts and rejected feature writes are not `BridgeError`s at all: they
//! are [`FetchError::Timeout`](crate::genicam::FetchError) and
//! [`NodeError`](crate::genicam::NodeError) values handled locally by the session.

use thiserror::Error;

use crate::feature::FeatureId;
use crate::genicam::{DeviceError, NodeError};

/// Convenience alias for results using the bridge error type.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Primary error type for the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Standard I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport backend or device refused an operation.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// A live node could not be read while projecting the feature tree.
    #[error("Failed to read feature '{feature}': {source}")]
    NodeRead {
        /// Display name of the node.
        feature: String,
        /// Underlying node failure.
        source: NodeError,
    },

    /// An operation needed a bound device but none is connected.
    #[error("No device bound to the session")]
    NoDeviceBound,

    /// The camera exposed a node whose interface is not one of the seven feature kinds.
    #[error("Unsupported interface type '{interface}' on feature '{feature}'")]
    UnsupportedInterface {
        /// Display name of the node.
        feature: String,
        /// Interface type reported by the node.
        interface: String,
    },

    /// A frame arrived in a pixel format outside the mono/bayer/rgb(a)/bgr(a) families.
    #[error("Unsupported pixel format {name} (0x{code:08X})")]
    UnsupportedPixelFormat {
        /// Raw PFNC code.
        code: u32,
        /// Format name when known, `custom` or `unknown` otherwise.
        name: String,
    },

    /// A buffer did not match the layout its metadata declared.
    #[error("Frame decode error: {0}")]
    Decode(String),

    /// A value did not fit the control or feature it was aimed at.
    #[error("Expected a {expected} value, got {got}")]
    ValueType {
        /// Kind of value the target accepts.
        expected: &'static str,
        /// Kind of value that was supplied.
        got: &'static str,
    },

    /// An identifier is not part of the current feature tree generation.
    #[error("Unknown feature id {0}")]
    UnknownFeature(FeatureId),

    /// The peer of a session channel was dropped.
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A blocking device call panicked or was cancelled.
    #[error("Device task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Shutdown completed but one or more steps reported errors.
    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<BridgeError>),
}

impl BridgeError {
    /// Returns `true` for errors that signal an incompatible device or a broken internal
    /// invariant rather than an operational hiccup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::UnsupportedInterface { .. }
                | BridgeError::UnsupportedPixelFormat { .. }
                | BridgeError::Decode(_)
        )
    }
}

impl From<figment::Error> for BridgeError {
    fn from(value: figment::Error) -> Self {
        BridgeError::Config(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::UnsupportedInterface {
            feature: "DeviceLinkRegister".into(),
            interface: "IRegister".into(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported interface type 'IRegister' on feature 'DeviceLinkRegister'"
        );

        let err = BridgeError::UnsupportedPixelFormat {
            code: 0x0210_0032,
            name: "YUV422_8".into(),
        };
        assert_eq!(err.to_string(), "Unsupported pixel format YUV422_8 (0x02100032)");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::Decode("short buffer".into()).is_fatal());
        assert!(!BridgeError::NoDeviceBound.is_fatal());
        assert!(!BridgeError::ChannelClosed("control").is_fatal());
        assert!(!BridgeError::Device(DeviceError::Busy).is_fatal());
    }

    #[test]
    fn test_shutdown_failed_error() {
        let err = BridgeError::ShutdownFailed(vec![
            BridgeError::Device(DeviceError::Backend("stop refused".into())),
            BridgeError::NoDeviceBound,
        ]);
        assert!(err.to_string().contains("Shutdown failed"));
    }
}
