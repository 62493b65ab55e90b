//! Camera feature model.
//!
//! [`spec`] holds the serializable snapshot types exchanged between the camera session and the
//! control panel; [`builder`] produces them from a live node tree.

pub mod builder;
pub mod spec;

pub use builder::{build_feature_specs, LiveNodeMapping, SpecBuilder};
pub use spec::{
    normalize_name, AccessMode, BooleanSpec, CategorySpec, CommandSpec, EnumSpec, FeatureId,
    FeatureKind, FeatureSpec, FeatureSpecs, FeatureValue, FloatSpec, IntegerSpec, Origin,
    StringSpec, Value, Visibility,
};
