//! Cluster-wide resource snapshot.
//!
//! Holds two independent views:
//!
//! - the latest report pushed by each node, replaced wholesale on every
//!   report and listed in first-observed order;
//! - the totals each node declared when it registered, listed in
//!   first-registration order.
//!
//! Nothing here is persisted. Declared totals are rebuilt from the node table
//! on start; reported views start empty.

use std::collections::HashMap;

use ephemeris_proto::{NodeId, NodeRecord, ResourceMap, ResourceUsage, ResourceUsageBatch, ResourceViewReport, TotalResources};
use tracing::trace;

#[derive(Debug, Default)]
pub struct ResourceViewRegistry {
    views: HashMap<NodeId, ResourceUsage>,
    view_order: Vec<NodeId>,
    declared: HashMap<NodeId, ResourceMap>,
    declared_order: Vec<NodeId>,
}

impl ResourceViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the latest report from `node_id`, creating its entry if needed.
    /// An empty report still creates an entry.
    pub fn update_from_resource_view(&mut self, node_id: NodeId, report: ResourceViewReport) {
        let ResourceViewReport {
            resources_total,
            resources_available,
        } = report;

        match self.views.get_mut(&node_id) {
            Some(view) => {
                view.resources_total = resources_total;
                view.resources_available = resources_available;
            }
            None => {
                self.view_order.push(node_id);
                self.views.insert(
                    node_id,
                    ResourceUsage {
                        node_id,
                        resources_total,
                        resources_available,
                    },
                );
            }
        }
        trace!(%node_id, "resource view updated");
    }

    /// One entry per node that has reported since start.
    pub fn get_all_resource_usage(&self) -> ResourceUsageBatch {
        let batch = self
            .view_order
            .iter()
            .filter_map(|id| self.views.get(id))
            .cloned()
            .collect();
        ResourceUsageBatch { batch }
    }

    /// Declared totals of every registered node.
    pub fn get_all_total_resources(&self) -> Vec<TotalResources> {
        self.declared_order
            .iter()
            .filter_map(|id| {
                self.declared.get(id).map(|resources_total| TotalResources {
                    node_id: *id,
                    resources_total: resources_total.clone(),
                })
            })
            .collect()
    }

    /// Takes the declared totals from a (re-)registration. The last
    /// registration wins; the node keeps its original position.
    pub fn on_node_registered(&mut self, node: &NodeRecord) {
        if self
            .declared
            .insert(node.node_id, node.resources_total.clone())
            .is_none()
        {
            self.declared_order.push(node.node_id);
        }
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn registered_count(&self) -> usize {
        self.declared.len()
    }
}
