//! Live GenICam node handles.
//!
//! The vendor SDK exposes a node map whose nodes are discovered at runtime. Instead of probing
//! each node for the interfaces it implements, the backend hands out a [`FeatureNode`]: a
//! closed enum with one case per feature kind, each wrapping a shared handle to a trait object.
//! Everything downstream matches on it exhaustively.
//!
//! Anything that is not one of the seven feature kinds (registers, ports, raw value nodes)
//! arrives as [`FeatureNode::Unsupported`] so that callers can fail loudly instead of guessing.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::feature::{AccessMode, Visibility};

/// Failure reported by a live node.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    /// The value lies outside `[min, max]` or off the increment grid.
    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Rejected value, formatted.
        value: String,
        /// Lower bound, formatted.
        min: String,
        /// Upper bound, formatted.
        max: String,
    },

    /// The value does not match the node type.
    #[error("expected a {expected} value, got {got}")]
    TypeMismatch {
        /// Type the node accepts.
        expected: &'static str,
        /// Type that was supplied.
        got: &'static str,
    },

    /// The symbolic is not one of the enumeration entries.
    #[error("'{0}' is not a valid entry")]
    InvalidEntry(String),

    /// The node is not writable (or not readable) in its current access mode.
    #[error("access denied (node is {0:?})")]
    AccessDenied(AccessMode),

    /// The device is busy and rejected the request.
    #[error("device busy")]
    Busy,

    /// Any other SDK failure.
    #[error("{0}")]
    Device(String),
}

/// Attributes common to every node.
pub trait NodeInfo: Send + Sync {
    /// SFNC machine name, e.g. `ExposureTime`.
    fn name(&self) -> &str;

    /// Human readable name, e.g. `Exposure Time`.
    fn display_name(&self) -> &str;

    /// Visibility level.
    fn visibility(&self) -> Visibility;

    /// Current access mode. May change with the device state.
    fn access_mode(&self) -> AccessMode;
}

/// Grouping node.
pub trait CategoryNode: NodeInfo {
    /// Child nodes in device order.
    fn features(&self) -> Vec<FeatureNode>;
}

/// Integer node.
pub trait IntegerNode: NodeInfo {
    /// Current value.
    fn value(&self) -> Result<i64, NodeError>;
    /// Write a new value.
    fn set_value(&self, value: i64) -> Result<(), NodeError>;
    /// Lower bound.
    fn min(&self) -> Result<i64, NodeError>;
    /// Upper bound.
    fn max(&self) -> Result<i64, NodeError>;
    /// Increment.
    fn inc(&self) -> Result<i64, NodeError>;
}

/// Float node.
pub trait FloatNode: NodeInfo {
    /// Current value.
    fn value(&self) -> Result<f64, NodeError>;
    /// Write a new value.
    fn set_value(&self, value: f64) -> Result<(), NodeError>;
    /// Lower bound.
    fn min(&self) -> Result<f64, NodeError>;
    /// Upper bound.
    fn max(&self) -> Result<f64, NodeError>;
    /// Increment, if the node defines one.
    fn inc(&self) -> Result<Option<f64>, NodeError>;
}

/// Boolean node.
pub trait BooleanNode: NodeInfo {
    /// Current value.
    fn value(&self) -> Result<bool, NodeError>;
    /// Write a new value.
    fn set_value(&self, value: bool) -> Result<(), NodeError>;
}

/// Enumeration node.
pub trait EnumerationNode: NodeInfo {
    /// Symbolic of the current entry.
    fn value(&self) -> Result<String, NodeError>;
    /// Select the entry with the given symbolic.
    fn set_value(&self, symbolic: &str) -> Result<(), NodeError>;
    /// Symbolics of all entries, in device order.
    fn entries(&self) -> Vec<String>;
}

/// String node.
pub trait StringNode: NodeInfo {
    /// Current value.
    fn value(&self) -> Result<String, NodeError>;
    /// Write a new value.
    fn set_value(&self, value: &str) -> Result<(), NodeError>;
}

/// Command node.
pub trait CommandNode: NodeInfo {
    /// Execute the command.
    fn execute(&self) -> Result<(), NodeError>;
}

/// Interface types outside the seven feature kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    /// `IRegister`
    Register,
    /// `IPort`
    Port,
    /// `IValue`
    Value,
    /// `IEnumEntry`
    EnumEntry,
    /// `IBase`
    Base,
}

impl fmt::Display for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InterfaceType::Register => "IRegister",
            InterfaceType::Port => "IPort",
            InterfaceType::Value => "IValue",
            InterfaceType::EnumEntry => "IEnumEntry",
            InterfaceType::Base => "IBase",
        };
        f.write_str(label)
    }
}

/// Handle on one live node, tagged by kind.
#[derive(Clone)]
pub enum FeatureNode {
    /// `ICategory`
    Category(Arc<dyn CategoryNode>),
    /// `IInteger`
    Integer(Arc<dyn IntegerNode>),
    /// `IFloat`
    Float(Arc<dyn FloatNode>),
    /// `IBoolean`
    Boolean(Arc<dyn BooleanNode>),
    /// `IEnumeration`
    Enumeration(Arc<dyn EnumerationNode>),
    /// `IString`
    String(Arc<dyn StringNode>),
    /// `ICommand`
    Command(Arc<dyn CommandNode>),
    /// A node whose interface is not a feature kind.
    Unsupported(Arc<dyn NodeInfo>, InterfaceType),
}

/// Dispatch a method call to whichever node a [`FeatureNode`] wraps.
macro_rules! on_node {
    ($node:expr, $n:ident => $body:expr) => {
        match $node {
            FeatureNode::Category($n) => $body,
            FeatureNode::Integer($n) => $body,
            FeatureNode::Float($n) => $body,
            FeatureNode::Boolean($n) => $body,
            FeatureNode::Enumeration($n) => $body,
            FeatureNode::String($n) => $body,
            FeatureNode::Command($n) => $body,
            FeatureNode::Unsupported($n, _) => $body,
        }
    };
}

impl FeatureNode {
    /// SFNC machine name of the wrapped node.
    pub fn name(&self) -> &str {
        on_node!(self, n => n.name())
    }

    /// Human readable name of the wrapped node.
    pub fn display_name(&self) -> &str {
        on_node!(self, n => n.display_name())
    }

    /// Visibility of the wrapped node.
    pub fn visibility(&self) -> Visibility {
        on_node!(self, n => n.visibility())
    }

    /// Current access mode of the wrapped node.
    pub fn access_mode(&self) -> AccessMode {
        on_node!(self, n => n.access_mode())
    }

    /// Interface name, as GenApi would report it.
    pub fn interface_name(&self) -> String {
        match self {
            FeatureNode::Category(_) => "ICategory".into(),
            FeatureNode::Integer(_) => "IInteger".into(),
            FeatureNode::Float(_) => "IFloat".into(),
            FeatureNode::Boolean(_) => "IBoolean".into(),
            FeatureNode::Enumeration(_) => "IEnumeration".into(),
            FeatureNode::String(_) => "IString".into(),
            FeatureNode::Command(_) => "ICommand".into(),
            FeatureNode::Unsupported(_, interface) => interface.to_string(),
        }
    }
}

impl fmt::Debug for FeatureNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureNode")
            .field("interface", &self.interface_name())
            .field("name", &self.name())
            .finish()
    }
}
