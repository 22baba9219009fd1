// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Iterative traversals: tree/tree, tree/volume, and ray.

use alloc::vec::Vec;

use bracken_geom::{Aabb3, RayCast, Vec3, ray_slab_hit};
use smallvec::SmallVec;

use crate::node::NodeIndex;
use crate::tree::Dbvt;

/// Inline capacity of the traversal stacks; spills to the heap past this.
const STACK_SIZE: usize = 64;

/// Sink for [`Dbvt::write`].
pub trait TreeWriter {
    /// Called once before any node, with the root's slot in the upcoming
    /// sequence (`None` for an empty tree) and the node count.
    fn prepare(&mut self, root: Option<usize>, node_count: usize);
    /// An internal node. `parent`, `child0` and `child1` are sequence slots.
    fn write_internal(
        &mut self,
        index: usize,
        parent: Option<usize>,
        child0: usize,
        child1: usize,
        volume: &Aabb3,
    );
    /// A leaf and its payload.
    fn write_leaf(&mut self, index: usize, parent: Option<usize>, volume: &Aabb3, data: u32);
}

impl Dbvt {
    /// Collide the subtrees under `root0` and `root1` of this tree, invoking
    /// `policy` with the payloads of every intersecting leaf pair.
    ///
    /// Handles the self-collide case (`root0 == root1`) without reporting a
    /// leaf against itself. The stack is caller-owned so a persistent buffer
    /// can stay warm across frames; it is cleared on entry and grows
    /// geometrically on demand.
    pub fn collide_tt(
        &self,
        root0: NodeIndex,
        root1: NodeIndex,
        stack: &mut Vec<(NodeIndex, NodeIndex)>,
        policy: &mut dyn FnMut(u32, u32),
    ) {
        self.collide_tt_with(root0, self, root1, stack, policy);
    }

    /// [`Dbvt::collide_tt`] across two trees: `root0` lives in `self`,
    /// `root1` in `other`. Node handles on the two sides index different
    /// arenas, so the identity case only applies when both sides are the
    /// same tree.
    pub fn collide_tt_with(
        &self,
        root0: NodeIndex,
        other: &Self,
        root1: NodeIndex,
        stack: &mut Vec<(NodeIndex, NodeIndex)>,
        policy: &mut dyn FnMut(u32, u32),
    ) {
        if root0.is_none() || root1.is_none() {
            return;
        }
        let same_tree = core::ptr::eq(self, other);
        stack.clear();
        stack.reserve(STACK_SIZE * 2);
        stack.push((root0, root1));
        while let Some((a, b)) = stack.pop() {
            if same_tree && a == b {
                if self.node(a).is_internal() {
                    let [c0, c1] = self.node(a).children;
                    stack.push((c0, c0));
                    stack.push((c1, c1));
                    stack.push((c0, c1));
                }
            } else if self.node(a).volume.overlaps(&other.node(b).volume) {
                match (self.node(a).is_internal(), other.node(b).is_internal()) {
                    (true, true) => {
                        let [a0, a1] = self.node(a).children;
                        let [b0, b1] = other.node(b).children;
                        stack.push((a0, b0));
                        stack.push((a1, b0));
                        stack.push((a0, b1));
                        stack.push((a1, b1));
                    }
                    (true, false) => {
                        let [a0, a1] = self.node(a).children;
                        stack.push((a0, b));
                        stack.push((a1, b));
                    }
                    (false, true) => {
                        let [b0, b1] = other.node(b).children;
                        stack.push((a, b0));
                        stack.push((a, b1));
                    }
                    (false, false) => policy(self.node(a).data, other.node(b).data),
                }
            }
        }
    }

    /// Report every leaf under `root` whose volume intersects `volume`.
    /// `policy` returning `true` short-circuits the traversal.
    pub fn collide_tv(
        &self,
        root: NodeIndex,
        volume: &Aabb3,
        policy: &mut dyn FnMut(u32) -> bool,
    ) {
        if root.is_none() {
            return;
        }
        let mut stack: SmallVec<[NodeIndex; STACK_SIZE]> = SmallVec::new();
        stack.push(root);
        while let Some(n) = stack.pop() {
            if self.node(n).volume.overlaps(volume) {
                if self.node(n).is_internal() {
                    let [c0, c1] = self.node(n).children;
                    stack.push(c0);
                    stack.push(c1);
                } else if policy(self.node(n).data) {
                    return;
                }
            }
        }
    }

    /// Ray traversal with precomputed ray state and a caller-supplied stack.
    ///
    /// Re-entrant: every per-call state lives in `ray` and `stack`, so
    /// concurrent callers each supply their own. `clip_min`/`clip_max`
    /// conservatively fatten every node volume before the slab test (pass
    /// zero vectors for a pure ray). `ray.lambda_max` is re-read on every
    /// node, so `policy` may shrink it through the reference it receives;
    /// returning `true` stops the walk outright.
    pub fn ray_test_internal(
        &self,
        root: NodeIndex,
        from: Vec3,
        ray: &mut RayCast,
        clip_min: Vec3,
        clip_max: Vec3,
        stack: &mut Vec<NodeIndex>,
        policy: &mut dyn FnMut(u32, &mut RayCast) -> bool,
    ) {
        if root.is_none() {
            return;
        }
        stack.clear();
        stack.reserve(STACK_SIZE * 2);
        stack.push(root);
        while let Some(node) = stack.pop() {
            if ray.lambda_max <= 0.0 {
                return;
            }
            let bounds = [
                self.node(node).volume.min - clip_max,
                self.node(node).volume.max - clip_min,
            ];
            let hit = ray_slab_hit(
                from,
                ray.direction_inverse,
                ray.signs,
                &bounds,
                0.0,
                ray.lambda_max,
            );
            if hit.is_some() {
                if self.node(node).is_internal() {
                    let [c0, c1] = self.node(node).children;
                    stack.push(c0);
                    stack.push(c1);
                } else if policy(self.node(node).data, ray) {
                    return;
                }
            }
        }
    }

    /// Serialize the tree through `writer` in depth-first pre-order.
    pub fn write(&self, writer: &mut dyn TreeWriter) {
        if self.root.is_none() {
            writer.prepare(None, 0);
            return;
        }
        // Sequence slots are assigned in pre-order; `slot_of` maps arena ids
        // to them so parent/child references stay index-based.
        let mut order = Vec::with_capacity(self.leaf_count() * 2);
        let mut stack: SmallVec<[NodeIndex; STACK_SIZE]> = SmallVec::new();
        stack.push(self.root);
        while let Some(n) = stack.pop() {
            order.push(n);
            if self.node(n).is_internal() {
                let [c0, c1] = self.node(n).children;
                stack.push(c1);
                stack.push(c0);
            }
        }
        let mut slot_of = Vec::new();
        slot_of.resize(self.nodes.len(), usize::MAX);
        for (slot, &n) in order.iter().enumerate() {
            slot_of[n.idx()] = slot;
        }

        writer.prepare(Some(slot_of[self.root.idx()]), order.len());
        for (slot, &n) in order.iter().enumerate() {
            let node = self.node(n);
            let parent = if node.parent.is_some() {
                Some(slot_of[node.parent.idx()])
            } else {
                None
            };
            if node.is_internal() {
                writer.write_internal(
                    slot,
                    parent,
                    slot_of[node.children[0].idx()],
                    slot_of[node.children[1].idx()],
                    &node.volume,
                );
            } else {
                writer.write_leaf(slot, parent, &node.volume, node.data);
            }
        }
    }

    /// Rebuild `self` as a compacted deep copy of `source`, walking the
    /// source iteratively and wiring parent links as nodes are created.
    /// `on_leaf` runs on every cloned leaf and may rewrite its payload.
    pub fn clone_from(&mut self, source: &Self, on_leaf: &mut dyn FnMut(NodeIndex, &mut u32)) {
        self.clear();
        if source.root.is_none() {
            return;
        }
        let mut stack: Vec<(NodeIndex, NodeIndex, usize)> =
            Vec::with_capacity(source.leaf_count());
        // (source node, cloned parent, child slot in that parent)
        stack.push((source.root, NodeIndex::NONE, 0));
        while let Some((src, parent, slot)) = stack.pop() {
            let node = source.node(src);
            let cloned = self.insert_raw(parent, node.volume, node.data);
            if parent.is_some() {
                self.node_mut(parent).children[slot] = cloned;
            } else {
                self.root = cloned;
            }
            if node.is_internal() {
                stack.push((node.children[0], cloned, 0));
                stack.push((node.children[1], cloned, 1));
            } else {
                let mut data = self.node(cloned).data;
                on_leaf(cloned, &mut data);
                self.node_mut(cloned).data = data;
            }
        }
        self.set_leaf_count(source.leaf_count());
    }
}
