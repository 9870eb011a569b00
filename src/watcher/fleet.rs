//! In-memory map of node name to its latest observation.

use std::collections::BTreeMap;

use crate::models::node::NodeObservation;

/// Latest observation per node for the current cycle.
///
/// A node with no observation this cycle has no entry; it is excluded from
/// the majority rather than counted as voting for anything.
#[derive(Debug, Default)]
pub struct FleetState {
    observations: BTreeMap<String, NodeObservation>,
}

impl FleetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was known about the node.
    pub fn record(&mut self, observation: NodeObservation) {
        self.observations
            .insert(observation.identity.name.clone(), observation);
    }

    /// Forget the node for this cycle.
    pub fn clear(&mut self, node: &str) {
        self.observations.remove(node);
    }

    pub fn get(&self, node: &str) -> Option<&NodeObservation> {
        self.observations.get(node)
    }

    pub fn observations(&self) -> impl Iterator<Item = &NodeObservation> {
        self.observations.values()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
