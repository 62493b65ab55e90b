//! Projection of a live node tree into [`FeatureSpec`]s.
//!
//! The builder walks the device's node map depth-first, snapshots every feature into a spec,
//! and records which live node each fresh id stands for. The resulting [`LiveNodeMapping`] is
//! the only way back from an id to the camera, so a tree generation and its mapping are
//! always produced together and replaced together.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::spec::{
    AccessMode, BooleanSpec, CategorySpec, CommandSpec, EnumSpec, FeatureId, FeatureSpec,
    FeatureSpecs, FloatSpec, IntegerSpec, StringSpec,
};
use crate::error::{BridgeError, BridgeResult};
use crate::genicam::{FeatureNode, NodeError};

/// Ids of one tree generation and the live nodes they stand for.
#[derive(Debug, Default, Clone)]
pub struct LiveNodeMapping {
    nodes: HashMap<FeatureId, FeatureNode>,
}

impl LiveNodeMapping {
    /// Empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live node for `id`, if `id` belongs to this generation.
    pub fn get(&self, id: &FeatureId) -> Option<&FeatureNode> {
        self.nodes.get(id)
    }

    /// Whether `id` belongs to this generation.
    pub fn contains(&self, id: &FeatureId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of mapped nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, id: FeatureId, node: FeatureNode) {
        self.nodes.insert(id, node);
    }
}

/// Depth-first spec builder.
pub struct SpecBuilder {
    id_source: Box<dyn FnMut() -> FeatureId + Send>,
}

impl SpecBuilder {
    /// Builder drawing random v4 ids.
    pub fn new() -> Self {
        Self::with_id_source(FeatureId::new_v4)
    }

    /// Builder drawing ids from `source`. Ids already in the mapping are drawn again.
    pub fn with_id_source(source: impl FnMut() -> FeatureId + Send + 'static) -> Self {
        Self {
            id_source: Box::new(source),
        }
    }

    /// Snapshot `features` and their descendants, registering every spec's id in `mapping`.
    ///
    /// Integer features that are currently not available are left out entirely. Read-only
    /// integers carry their value but no constraints. Any node whose interface is not a
    /// feature kind aborts the build with [`BridgeError::UnsupportedInterface`].
    pub fn build(
        &mut self,
        features: &[FeatureNode],
        mapping: &mut LiveNodeMapping,
    ) -> BridgeResult<Vec<FeatureSpec>> {
        let mut specs = Vec::with_capacity(features.len());

        for node in features {
            let display_name = node.display_name().to_string();
            let visibility = node.visibility();

            let spec = match node {
                FeatureNode::Category(category) => {
                    let id = self.fresh_id(mapping);
                    mapping.insert(id, node.clone());
                    let children = self.build(&category.features(), mapping)?;
                    specs.push(FeatureSpec::Category(CategorySpec {
                        id,
                        display_name,
                        visibility,
                        children,
                    }));
                    continue;
                }
                FeatureNode::Integer(integer) => {
                    let access_mode = integer.access_mode();
                    if access_mode == AccessMode::NotAvailable {
                        debug!(feature = %display_name, "Skipping unavailable integer");
                        continue;
                    }
                    let value = read(&display_name, integer.value())?;
                    let (min, max, inc) = if access_mode == AccessMode::ReadWrite {
                        (
                            Some(read(&display_name, integer.min())?),
                            Some(read(&display_name, integer.max())?),
                            Some(read(&display_name, integer.inc())?),
                        )
                    } else {
                        (None, None, None)
                    };
                    FeatureSpec::Integer(IntegerSpec {
                        id: self.fresh_id(mapping),
                        display_name,
                        visibility,
                        access_mode,
                        value,
                        min,
                        max,
                        inc,
                    })
                }
                FeatureNode::Float(float) => {
                    let access_mode = float.access_mode();
                    let value = read(&display_name, float.value())?;
                    let (min, max, inc) = if access_mode == AccessMode::ReadWrite {
                        (
                            Some(read(&display_name, float.min())?),
                            Some(read(&display_name, float.max())?),
                            read(&display_name, float.inc())?,
                        )
                    } else {
                        (None, None, None)
                    };
                    FeatureSpec::Float(FloatSpec {
                        id: self.fresh_id(mapping),
                        display_name,
                        visibility,
                        access_mode,
                        value,
                        min,
                        max,
                        inc,
                    })
                }
                FeatureNode::Boolean(boolean) => FeatureSpec::Boolean(BooleanSpec {
                    access_mode: boolean.access_mode(),
                    value: read(&display_name, boolean.value())?,
                    id: self.fresh_id(mapping),
                    display_name,
                    visibility,
                }),
                FeatureNode::Enumeration(enumeration) => FeatureSpec::Enum(EnumSpec {
                    access_mode: enumeration.access_mode(),
                    value: read(&display_name, enumeration.value())?,
                    items: enumeration.entries(),
                    id: self.fresh_id(mapping),
                    display_name,
                    visibility,
                }),
                FeatureNode::String(string) => FeatureSpec::String(StringSpec {
                    access_mode: string.access_mode(),
                    value: read(&display_name, string.value())?,
                    id: self.fresh_id(mapping),
                    display_name,
                    visibility,
                }),
                FeatureNode::Command(_) => FeatureSpec::Command(CommandSpec {
                    id: self.fresh_id(mapping),
                    display_name,
                    visibility,
                }),
                FeatureNode::Unsupported(_, interface) => {
                    return Err(BridgeError::UnsupportedInterface {
                        feature: display_name,
                        interface: interface.to_string(),
                    });
                }
            };

            mapping.insert(spec.id(), node.clone());
            specs.push(spec);
        }

        Ok(specs)
    }

    fn fresh_id(&mut self, mapping: &LiveNodeMapping) -> FeatureId {
        loop {
            let id = (self.id_source)();
            if !mapping.contains(&id) {
                return id;
            }
            debug!(%id, "Feature id collision, drawing again");
        }
    }
}

impl Default for SpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpecBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecBuilder").finish_non_exhaustive()
    }
}

fn read<T>(feature: &str, result: Result<T, NodeError>) -> BridgeResult<T> {
    result.map_err(|source| BridgeError::NodeRead {
        feature: feature.to_string(),
        source,
    })
}

/// Build one full tree generation with random ids.
pub fn build_feature_specs(
    features: &[FeatureNode],
) -> BridgeResult<(FeatureSpecs, LiveNodeMapping)> {
    let mut mapping = LiveNodeMapping::new();
    let specs = SpecBuilder::new().build(features, &mut mapping)?;
    Ok((FeatureSpecs(specs), mapping))
}
