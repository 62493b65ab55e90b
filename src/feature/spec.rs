//! Serializable description of a camera feature tree.
//!
//! A [`FeatureSpec`] is a snapshot of one GenICam node: what kind of feature it is, how it
//! should be labelled, who should see it, whether it can be written, and its value at the time
//! the snapshot was taken. Specs carry no reference to the live camera, so a tree of them can be
//! shipped to a GUI, serialized, or diffed in tests. The link back to the camera is the
//! [`FeatureId`], which the session resolves through its live-node mapping.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Identity, visibility, access
// =============================================================================

/// Opaque identifier of one spec within one tree generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(Uuid);

impl FeatureId {
    /// Generate a fresh random identifier.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The wrapped UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// GenICam visibility level. Ordered from most to least commonly shown.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Visibility {
    /// Shown to every user.
    #[default]
    Beginner,
    /// Shown to users who understand the camera.
    Expert,
    /// Shown to users who understand GenICam internals.
    Guru,
    /// Never shown in a user interface.
    Invisible,
}

impl Visibility {
    /// All levels, in ascending order.
    pub const ALL: [Visibility; 4] = [
        Visibility::Beginner,
        Visibility::Expert,
        Visibility::Guru,
        Visibility::Invisible,
    ];

    /// Level name as used in GenICam XML and in the GUI selector.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Beginner => "Beginner",
            Visibility::Expert => "Expert",
            Visibility::Guru => "Guru",
            Visibility::Invisible => "Invisible",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Visibility::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("Invalid visibility '{s}'. Must be one of: Beginner, Expert, Guru, Invisible")
            })
    }
}

/// Access mode of a valued feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    /// Readable and writable.
    ReadWrite,
    /// Readable only.
    ReadOnly,
    /// Currently neither readable nor writable.
    NotAvailable,
}

impl AccessMode {
    /// Whether a controller may write this feature.
    pub fn is_writable(&self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

// =============================================================================
// Values and messages
// =============================================================================

/// A feature value as it travels between camera and controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Integer feature value.
    Int(i64),
    /// Float feature value.
    Float(f64),
    /// Boolean feature value.
    Bool(bool),
    /// Enum symbolic or string feature value.
    Text(String),
    /// No payload, used for command activations.
    Empty,
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Text(_) => "text",
            Value::Empty => "empty",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Empty => f.write_str("<empty>"),
        }
    }
}

/// Which side of the bridge produced a [`FeatureValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Pushed by the camera session (corrections, refreshed values).
    Camera,
    /// Requested by the control panel.
    Controller,
}

/// Value change for one feature, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    /// Producer of the message. Components drop messages carrying their own origin.
    pub origin: Origin,
    /// Feature the value belongs to.
    pub id: FeatureId,
    /// The value itself.
    pub value: Value,
}

impl FeatureValue {
    /// Message produced by the camera side.
    pub fn from_camera(id: FeatureId, value: Value) -> Self {
        Self {
            origin: Origin::Camera,
            id,
            value,
        }
    }

    /// Message produced by the controller side.
    pub fn from_controller(id: FeatureId, value: Value) -> Self {
        Self {
            origin: Origin::Controller,
            id,
            value,
        }
    }
}

// =============================================================================
// FeatureSpec
// =============================================================================

/// Feature kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    /// Grouping node.
    Category,
    /// Integer node.
    Integer,
    /// Float node.
    Float,
    /// Boolean node.
    Boolean,
    /// Enumeration node.
    Enum,
    /// String node.
    String,
    /// Command node.
    Command,
}

/// Grouping node with ordered children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpec {
    /// Identifier of this feature within its tree generation.
    pub id: FeatureId,
    /// Human readable name.
    pub display_name: String,
    /// Visibility level.
    pub visibility: Visibility,
    /// Child features in device order.
    pub children: Vec<FeatureSpec>,
}

/// Integer feature. Constraints are only captured for writable nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegerSpec {
    /// Identifier of this feature within its tree generation.
    pub id: FeatureId,
    /// Human readable name.
    pub display_name: String,
    /// Visibility level.
    pub visibility: Visibility,
    /// Access mode when the snapshot was taken.
    pub access_mode: AccessMode,
    /// Value when the snapshot was taken.
    pub value: i64,
    /// Lower bound, writable nodes only.
    pub min: Option<i64>,
    /// Upper bound, writable nodes only.
    pub max: Option<i64>,
    /// Increment, writable nodes only.
    pub inc: Option<i64>,
}

/// Float feature. Constraints are only captured for writable nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatSpec {
    /// Identifier of this feature within its tree generation.
    pub id: FeatureId,
    /// Human readable name.
    pub display_name: String,
    /// Visibility level.
    pub visibility: Visibility,
    /// Access mode when the snapshot was taken.
    pub access_mode: AccessMode,
    /// Value when the snapshot was taken.
    pub value: f64,
    /// Lower bound, writable nodes only.
    pub min: Option<f64>,
    /// Upper bound, writable nodes only.
    pub max: Option<f64>,
    /// Increment, writable nodes only.
    pub inc: Option<f64>,
}

/// Boolean feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanSpec {
    /// Identifier of this feature within its tree generation.
    pub id: FeatureId,
    /// Human readable name.
    pub display_name: String,
    /// Visibility level.
    pub visibility: Visibility,
    /// Access mode when the snapshot was taken.
    pub access_mode: AccessMode,
    /// Value when the snapshot was taken.
    pub value: bool,
}

/// Enumeration feature with its symbolic entries in device order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumSpec {
    /// Identifier of this feature within its tree generation.
    pub id: FeatureId,
    /// Human readable name.
    pub display_name: String,
    /// Visibility level.
    pub visibility: Visibility,
    /// Access mode when the snapshot was taken.
    pub access_mode: AccessMode,
    /// Value when the snapshot was taken.
    pub value: String,
    /// Symbolic entries.
    pub items: Vec<String>,
}

/// Free text feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringSpec {
    /// Identifier of this feature within its tree generation.
    pub id: FeatureId,
    /// Human readable name.
    pub display_name: String,
    /// Visibility level.
    pub visibility: Visibility,
    /// Access mode when the snapshot was taken.
    pub access_mode: AccessMode,
    /// Value when the snapshot was taken.
    pub value: String,
}

/// Command feature. Carries no value and no access mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Identifier of this feature within its tree generation.
    pub id: FeatureId,
    /// Human readable name.
    pub display_name: String,
    /// Visibility level.
    pub visibility: Visibility,
}

/// Snapshot of one camera feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FeatureSpec {
    /// Grouping node.
    Category(CategorySpec),
    /// Integer node.
    Integer(IntegerSpec),
    /// Float node.
    Float(FloatSpec),
    /// Boolean node.
    Boolean(BooleanSpec),
    /// Enumeration node.
    Enum(EnumSpec),
    /// String node.
    String(StringSpec),
    /// Command node.
    Command(CommandSpec),
}

impl FeatureSpec {
    /// Identifier of this spec.
    pub fn id(&self) -> FeatureId {
        match self {
            FeatureSpec::Category(s) => s.id,
            FeatureSpec::Integer(s) => s.id,
            FeatureSpec::Float(s) => s.id,
            FeatureSpec::Boolean(s) => s.id,
            FeatureSpec::Enum(s) => s.id,
            FeatureSpec::String(s) => s.id,
            FeatureSpec::Command(s) => s.id,
        }
    }

    /// Human readable label.
    pub fn display_name(&self) -> &str {
        match self {
            FeatureSpec::Category(s) => &s.display_name,
            FeatureSpec::Integer(s) => &s.display_name,
            FeatureSpec::Float(s) => &s.display_name,
            FeatureSpec::Boolean(s) => &s.display_name,
            FeatureSpec::Enum(s) => &s.display_name,
            FeatureSpec::String(s) => &s.display_name,
            FeatureSpec::Command(s) => &s.display_name,
        }
    }

    /// Visibility level.
    pub fn visibility(&self) -> Visibility {
        match self {
            FeatureSpec::Category(s) => s.visibility,
            FeatureSpec::Integer(s) => s.visibility,
            FeatureSpec::Float(s) => s.visibility,
            FeatureSpec::Boolean(s) => s.visibility,
            FeatureSpec::Enum(s) => s.visibility,
            FeatureSpec::String(s) => s.visibility,
            FeatureSpec::Command(s) => s.visibility,
        }
    }

    /// Kind tag.
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureSpec::Category(_) => FeatureKind::Category,
            FeatureSpec::Integer(_) => FeatureKind::Integer,
            FeatureSpec::Float(_) => FeatureKind::Float,
            FeatureSpec::Boolean(_) => FeatureKind::Boolean,
            FeatureSpec::Enum(_) => FeatureKind::Enum,
            FeatureSpec::String(_) => FeatureKind::String,
            FeatureSpec::Command(_) => FeatureKind::Command,
        }
    }

    /// Access mode, `None` for categories and commands.
    pub fn access_mode(&self) -> Option<AccessMode> {
        match self {
            FeatureSpec::Category(_) | FeatureSpec::Command(_) => None,
            FeatureSpec::Integer(s) => Some(s.access_mode),
            FeatureSpec::Float(s) => Some(s.access_mode),
            FeatureSpec::Boolean(s) => Some(s.access_mode),
            FeatureSpec::Enum(s) => Some(s.access_mode),
            FeatureSpec::String(s) => Some(s.access_mode),
        }
    }

    /// Captured value, `None` for categories and commands.
    pub fn value(&self) -> Option<Value> {
        match self {
            FeatureSpec::Category(_) | FeatureSpec::Command(_) => None,
            FeatureSpec::Integer(s) => Some(Value::Int(s.value)),
            FeatureSpec::Float(s) => Some(Value::Float(s.value)),
            FeatureSpec::Boolean(s) => Some(Value::Bool(s.value)),
            FeatureSpec::Enum(s) => Some(Value::Text(s.value.clone())),
            FeatureSpec::String(s) => Some(Value::Text(s.value.clone())),
        }
    }

    /// Children of a category, empty for every other kind.
    pub fn children(&self) -> &[FeatureSpec] {
        match self {
            FeatureSpec::Category(s) => &s.children,
            _ => &[],
        }
    }
}

/// One full feature tree generation, as published by the camera session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSpecs(pub Vec<FeatureSpec>);

impl FeatureSpecs {
    /// Top level specs in device order.
    pub fn roots(&self) -> &[FeatureSpec] {
        &self.0
    }

    /// Number of top level specs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Depth-first pre-order walk over every spec in the tree.
    pub fn walk(&self) -> Vec<&FeatureSpec> {
        fn visit<'a>(specs: &'a [FeatureSpec], out: &mut Vec<&'a FeatureSpec>) {
            for spec in specs {
                out.push(spec);
                visit(spec.children(), out);
            }
        }
        let mut out = Vec::new();
        visit(&self.0, &mut out);
        out
    }

    /// Find a spec anywhere in the tree.
    pub fn find(&self, id: FeatureId) -> Option<&FeatureSpec> {
        self.walk().into_iter().find(|spec| spec.id() == id)
    }

    /// Find a spec by display name, ignoring whitespace.
    pub fn find_by_name(&self, name: &str) -> Option<&FeatureSpec> {
        let wanted = normalize_name(name);
        self.walk()
            .into_iter()
            .find(|spec| normalize_name(spec.display_name()) == wanted)
    }
}

/// Strip all whitespace from a display name, so "Acquisition Start" and "AcquisitionStart"
/// compare equal.
pub fn normalize_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> FeatureSpecs {
        FeatureSpecs(vec![FeatureSpec::Category(CategorySpec {
            id: FeatureId::new_v4(),
            display_name: "Acquisition Control".into(),
            visibility: Visibility::Beginner,
            children: vec![
                FeatureSpec::Command(CommandSpec {
                    id: FeatureId::new_v4(),
                    display_name: "Acquisition Start".into(),
                    visibility: Visibility::Beginner,
                }),
                FeatureSpec::Float(FloatSpec {
                    id: FeatureId::new_v4(),
                    display_name: "Exposure Time".into(),
                    visibility: Visibility::Beginner,
                    access_mode: AccessMode::ReadWrite,
                    value: 5000.0,
                    min: Some(10.0),
                    max: Some(1.0e6),
                    inc: None,
                }),
            ],
        })])
    }

    #[test]
    fn test_visibility_ordering() {
        assert!(Visibility::Beginner < Visibility::Expert);
        assert!(Visibility::Expert < Visibility::Guru);
        assert!(Visibility::Guru < Visibility::Invisible);
        assert_eq!("guru".parse::<Visibility>(), Ok(Visibility::Guru));
        assert!("wizard".parse::<Visibility>().is_err());
    }

    #[test]
    fn test_walk_is_depth_first() {
        let tree = sample_tree();
        let names: Vec<_> = tree.walk().iter().map(|s| s.display_name()).collect();
        assert_eq!(
            names,
            vec!["Acquisition Control", "Acquisition Start", "Exposure Time"]
        );
    }

    #[test]
    fn test_find_by_name_ignores_whitespace() {
        let tree = sample_tree();
        let spec = tree.find_by_name("AcquisitionStart").unwrap();
        assert_eq!(spec.kind(), FeatureKind::Command);
        assert_eq!(spec.access_mode(), None);
        assert_eq!(spec.value(), None);
        assert_eq!(tree.find(spec.id()).unwrap().display_name(), "Acquisition Start");
    }

    #[test]
    fn test_tree_serializes_with_kind_tag() {
        let tree = sample_tree();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["kind"], "Category");
        assert_eq!(json[0]["children"][1]["kind"], "Float");
        assert_eq!(json[0]["children"][1]["access_mode"], "ReadWrite");

        let back: FeatureSpecs = serde_json::from_value(json).unwrap();
        assert_eq!(back, tree);
    }
}
