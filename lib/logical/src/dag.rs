use crate::node::OpNode;
use itertools::Itertools;
use mpc_fusion_common::{RewriteError, RwResult};
use mpc_fusion_model::Relation;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};

/// Stable identifier of an operator node within an [`OpDag`].
pub type OpId = NodeIndex;

/// Position of an edge among the inputs of its target operator.
///
/// Operand order is meaningful: a join's left parent feeds slot 0 and its
/// right parent slot 1; the flag input of a `FlagJoin` is slot 2. Structural
/// edits preserve the slot of the edge they splice, so operand order
/// survives arbitrary rewriting.
pub type InputSlot = usize;

/// The operator DAG.
///
/// Nodes are owned by the arena and addressed by stable ids; edges are
/// directed parent → child and carry the child's input slot. All iteration
/// orders exposed here are deterministic so that rewrites are reproducible:
/// parents are ordered by input slot, children and topological ties by node
/// id (insertion order).
#[derive(Debug, Clone)]
pub struct OpDag {
    graph: StableDiGraph<OpNode, InputSlot>,
}

impl Default for OpDag {
    fn default() -> Self {
        Self::new()
    }
}

impl OpDag {
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, id: OpId) -> bool {
        self.graph.contains_node(id)
    }

    pub fn add_node(&mut self, node: OpNode) -> OpId {
        self.graph.add_node(node)
    }

    /// Adds a parent → child edge feeding the given input slot of `child`.
    pub fn add_edge(&mut self, parent: OpId, child: OpId, slot: InputSlot) {
        self.graph.add_edge(parent, child, slot);
    }

    pub fn node(&self, id: OpId) -> &OpNode {
        &self.graph[id]
    }

    pub fn node_mut(&mut self, id: OpId) -> &mut OpNode {
        &mut self.graph[id]
    }

    /// All node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = OpId> + '_ {
        self.graph.node_indices()
    }

    /// Parents ordered by the input slot they feed.
    pub fn parents(&self, id: OpId) -> Vec<OpId> {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .sorted_by_key(|edge| *edge.weight())
            .map(|edge| edge.source())
            .collect()
    }

    /// The slot-0 parent, if any. For unary operators this is the sole
    /// input.
    pub fn parent(&self, id: OpId) -> Option<OpId> {
        self.parents(id).first().copied()
    }

    /// Children ordered by node id.
    pub fn children(&self, id: OpId) -> Vec<OpId> {
        self.graph
            .edges_directed(id, Direction::Outgoing)
            .map(|edge| edge.target())
            .sorted()
            .collect()
    }

    pub fn is_leaf(&self, id: OpId) -> bool {
        self.graph
            .edges_directed(id, Direction::Outgoing)
            .next()
            .is_none()
    }

    pub fn is_root(&self, id: OpId) -> bool {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .next()
            .is_none()
    }

    /// Root nodes in insertion order.
    pub fn roots(&self) -> Vec<OpId> {
        self.graph
            .node_indices()
            .filter(|id| self.is_root(*id))
            .collect()
    }

    /// The input slot `parent` feeds on `child`, if that edge exists.
    pub fn in_slot(&self, parent: OpId, child: OpId) -> Option<InputSlot> {
        self.graph
            .find_edge(parent, child)
            .and_then(|edge| self.graph.edge_weight(edge).copied())
    }

    /// Output relations of the parents, in slot order.
    pub fn in_rels(&self, id: OpId) -> Vec<&Relation> {
        self.parents(id)
            .into_iter()
            .map(|parent| &self.node(parent).out_rel)
            .collect()
    }

    /// Output relation of the slot-0 parent.
    pub fn in_rel(&self, id: OpId) -> RwResult<&Relation> {
        self.parent(id)
            .map(|parent| &self.node(parent).out_rel)
            .ok_or_else(|| {
                RewriteError::invariant(
                    "dag",
                    self.node(id).name(),
                    "operator has no input relation",
                )
            })
    }

    /// Deterministic topological order: Kahn's algorithm with ties broken by
    /// node id.
    pub fn top_sort(&self) -> RwResult<Vec<OpId>> {
        let mut in_degree: BTreeMap<OpId, usize> = self
            .graph
            .node_indices()
            .map(|id| {
                (
                    id,
                    self.graph.edges_directed(id, Direction::Incoming).count(),
                )
            })
            .collect();

        let mut ready: BTreeSet<OpId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for child in self.children(id) {
                let degree = in_degree.get_mut(&child).map(|d| {
                    *d -= 1;
                    *d
                });
                if degree == Some(0) {
                    ready.insert(child);
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(RewriteError::malformed("operator graph contains a cycle"));
        }
        Ok(order)
    }

    /// Splices `node` onto the edge `parent` → `child`: the edge is removed,
    /// `parent` feeds `node`'s slot 0, and `node` takes over the input slot
    /// the edge occupied on `child`. With `child` absent, `node` simply
    /// becomes a child of `parent`.
    pub fn insert_between(
        &mut self,
        parent: OpId,
        child: Option<OpId>,
        node: OpId,
    ) -> RwResult<()> {
        match child {
            Some(child) => {
                let edge = self.graph.find_edge(parent, child).ok_or_else(|| {
                    self.missing_edge("insert_between", parent, child)
                })?;
                let slot = self.graph[edge];
                self.graph.remove_edge(edge);
                self.graph.add_edge(parent, node, 0);
                self.graph.add_edge(node, child, slot);
            }
            None => {
                self.graph.add_edge(parent, node, 0);
            }
        }
        Ok(())
    }

    /// Inverse of [`OpDag::insert_between`]: unhooks `node` from the path
    /// `parent` → `node` → `child` and reconnects `parent` to `child` on the
    /// slot `node` occupied. `node` is left in the arena without those
    /// edges.
    pub fn remove_between(
        &mut self,
        parent: OpId,
        child: Option<OpId>,
        node: OpId,
    ) -> RwResult<()> {
        let upper = self
            .graph
            .find_edge(parent, node)
            .ok_or_else(|| self.missing_edge("remove_between", parent, node))?;
        self.graph.remove_edge(upper);

        if let Some(child) = child {
            let lower = self
                .graph
                .find_edge(node, child)
                .ok_or_else(|| self.missing_edge("remove_between", node, child))?;
            let slot = self.graph[lower];
            self.graph.remove_edge(lower);
            self.graph.add_edge(parent, child, slot);
        }
        Ok(())
    }

    /// Puts `node` between `parent` and all of `parent`'s current children.
    /// Each child keeps the input slot it had on the original edge.
    pub fn insert_between_children(&mut self, parent: OpId, node: OpId) {
        let outgoing: Vec<(OpId, InputSlot)> = self
            .graph
            .edges_directed(parent, Direction::Outgoing)
            .map(|edge| (edge.target(), *edge.weight()))
            .collect();
        for (child, slot) in outgoing {
            if let Some(edge) = self.graph.find_edge(parent, child) {
                self.graph.remove_edge(edge);
            }
            self.graph.add_edge(node, child, slot);
        }
        self.graph.add_edge(parent, node, 0);
    }

    /// Retargets the edge `old_parent` → `child` to come from `new_parent`,
    /// keeping the input slot.
    pub fn replace_parent(
        &mut self,
        child: OpId,
        old_parent: OpId,
        new_parent: OpId,
    ) -> RwResult<()> {
        let edge = self
            .graph
            .find_edge(old_parent, child)
            .ok_or_else(|| self.missing_edge("replace_parent", old_parent, child))?;
        let slot = self.graph[edge];
        self.graph.remove_edge(edge);
        self.graph.add_edge(new_parent, child, slot);
        Ok(())
    }

    /// Retargets the edge `parent` → `old_child` to point at `new_child`,
    /// keeping the input slot.
    pub fn replace_child(
        &mut self,
        parent: OpId,
        old_child: OpId,
        new_child: OpId,
    ) -> RwResult<()> {
        let edge = self
            .graph
            .find_edge(parent, old_child)
            .ok_or_else(|| self.missing_edge("replace_child", parent, old_child))?;
        let slot = self.graph[edge];
        self.graph.remove_edge(edge);
        self.graph.add_edge(parent, new_child, slot);
        Ok(())
    }

    /// Removes the edge `parent` → `child` without reconnecting anything.
    pub fn remove_edge_between(&mut self, parent: OpId, child: OpId) -> RwResult<()> {
        let edge = self
            .graph
            .find_edge(parent, child)
            .ok_or_else(|| self.missing_edge("remove_edge_between", parent, child))?;
        self.graph.remove_edge(edge);
        Ok(())
    }

    /// Drops a node and all its incident edges.
    pub fn remove_node(&mut self, id: OpId) {
        self.graph.remove_node(id);
    }

    /// Deterministic one-line-per-node rendering in topological order, used
    /// by tests and debug output.
    pub fn dbg_str(&self) -> String {
        let order = self
            .top_sort()
            .unwrap_or_else(|_| self.graph.node_indices().collect());
        order
            .into_iter()
            .map(|id| {
                let node = self.node(id);
                let mpc = if node.is_mpc { "MPC " } else { "" };
                let parents = self
                    .parents(id)
                    .into_iter()
                    .map(|parent| self.node(parent).name().to_owned())
                    .join(", ");
                format!("{} {}{} <- [{}]", node.kind.name(), mpc, node.out_rel.dbg_str(), parents)
            })
            .join("\n")
    }

    fn missing_edge(&self, op: &str, parent: OpId, child: OpId) -> RewriteError {
        RewriteError::invariant(
            "dag",
            self.node(child).name(),
            format!(
                "{op}: no edge from '{}' to '{}'",
                self.node(parent).name(),
                self.node(child).name()
            ),
        )
    }
}
