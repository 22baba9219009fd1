// Copyright 2025 the Bracken Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree structure and mutators.

use alloc::vec::Vec;

use bracken_geom::{Aabb3, Vec3};

use crate::node::{Node, NodeIndex};

/// A dynamic bounding volume tree over [`Aabb3`] leaf volumes.
///
/// See the crate docs for the design overview. All operations are infallible;
/// arena growth is amortized doubling.
pub struct Dbvt {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeIndex,
    /// One-slot cache in front of the free list; absorbs the
    /// delete-then-insert pattern of leaf updates.
    free_cache: Option<NodeIndex>,
    free_list: Vec<NodeIndex>,
    /// Reinsertion entry-point depth for [`Dbvt::update`]: how many parents
    /// above the removed position to restart from. Negative means the root.
    pub lookahead: i32,
    leaf_count: usize,
    /// Path counter driving [`Dbvt::optimize_incremental`].
    opath: u32,
}

impl Default for Dbvt {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Dbvt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dbvt")
            .field("leaves", &self.leaf_count)
            .field("slots", &self.nodes.len())
            .field("free", &self.free_list.len())
            .finish_non_exhaustive()
    }
}

impl Dbvt {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NodeIndex::NONE,
            free_cache: None,
            free_list: Vec::new(),
            lookahead: -1,
            leaf_count: 0,
            opath: 0,
        }
    }

    /// The root node, or [`NodeIndex::NONE`] for an empty tree.
    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Whether the tree holds no leaves.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of leaves.
    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// A node's volume.
    #[inline]
    pub fn volume(&self, index: NodeIndex) -> Aabb3 {
        self.node(index).volume
    }

    /// A leaf's payload.
    #[inline]
    pub fn data(&self, index: NodeIndex) -> u32 {
        self.node(index).data
    }

    /// Whether `index` is a leaf.
    #[inline]
    pub fn is_leaf(&self, index: NodeIndex) -> bool {
        self.node(index).is_leaf()
    }

    /// A node's parent, or [`NodeIndex::NONE`] at the root.
    #[inline]
    pub fn parent(&self, index: NodeIndex) -> NodeIndex {
        self.node(index).parent
    }

    /// A node's children. Both are [`NodeIndex::NONE`] on leaves.
    #[inline]
    pub fn children(&self, index: NodeIndex) -> [NodeIndex; 2] {
        self.node(index).children
    }

    #[inline]
    pub(crate) fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.idx()]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index.idx()]
    }

    /// Which child slot of its parent `child` occupies.
    #[inline]
    fn slot_of(&self, child: NodeIndex) -> usize {
        let parent = self.node(child).parent;
        usize::from(self.node(parent).children[1] == child)
    }

    fn alloc_node(&mut self, parent: NodeIndex, volume: Aabb3, data: u32) -> NodeIndex {
        let node = Node {
            volume,
            parent,
            children: [NodeIndex::NONE, NodeIndex::NONE],
            data,
        };
        if let Some(index) = self.free_cache.take() {
            self.nodes[index.idx()] = node;
            return index;
        }
        if let Some(index) = self.free_list.pop() {
            self.nodes[index.idx()] = node;
            return index;
        }
        self.nodes.push(node);
        NodeIndex::new((self.nodes.len() - 1) as u32)
    }

    fn free_node(&mut self, index: NodeIndex) {
        if let Some(previous) = self.free_cache.replace(index) {
            self.free_list.push(previous);
        }
    }

    /// Allocate an unlinked node, for walks that wire topology themselves.
    pub(crate) fn insert_raw(&mut self, parent: NodeIndex, volume: Aabb3, data: u32) -> NodeIndex {
        self.alloc_node(parent, volume, data)
    }

    pub(crate) fn set_leaf_count(&mut self, count: usize) {
        self.leaf_count = count;
    }

    /// Child pick for insertion: the side whose volume grows less in surface
    /// area when merged with `volume`; ties go left.
    fn select(&self, volume: &Aabb3, left: NodeIndex, right: NodeIndex) -> usize {
        let lv = self.node(left).volume;
        let rv = self.node(right).volume;
        let growth_l = lv.union(volume).surface_area() - lv.surface_area();
        let growth_r = rv.union(volume).surface_area() - rv.surface_area();
        usize::from(growth_r < growth_l)
    }

    pub(crate) fn insert_leaf(&mut self, root_hint: NodeIndex, leaf: NodeIndex) {
        if self.root.is_none() {
            self.root = leaf;
            self.node_mut(leaf).parent = NodeIndex::NONE;
            return;
        }

        let leaf_volume = self.node(leaf).volume;
        let mut sibling = if root_hint.is_some() { root_hint } else { self.root };
        while self.node(sibling).is_internal() {
            let [c0, c1] = self.node(sibling).children;
            sibling = [c0, c1][self.select(&leaf_volume, c0, c1)];
        }

        let old_parent = self.node(sibling).parent;
        let merged = self.node(sibling).volume.union(&leaf_volume);
        let new_parent = self.alloc_node(old_parent, merged, 0);
        self.node_mut(new_parent).children = [sibling, leaf];
        self.node_mut(sibling).parent = new_parent;
        self.node_mut(leaf).parent = new_parent;

        if old_parent.is_none() {
            self.root = new_parent;
            return;
        }
        let slot = usize::from(self.node(old_parent).children[1] == sibling);
        self.node_mut(old_parent).children[slot] = new_parent;

        // Refit upward, stopping at the first ancestor that already covers
        // the new aggregate.
        let mut node = new_parent;
        let mut previous = old_parent;
        while previous.is_some() {
            let child_volume = self.node(node).volume;
            if self.node(previous).volume.contains(&child_volume) {
                break;
            }
            let [c0, c1] = self.node(previous).children;
            self.node_mut(previous).volume =
                self.node(c0).volume.union(&self.node(c1).volume);
            node = previous;
            previous = self.node(node).parent;
        }
    }

    /// Unlink `leaf`, promote its sibling, refit upward. Returns the deepest
    /// ancestor whose volume stabilized (the natural reinsertion entry), the
    /// root when refitting ran all the way up, or `NONE` when the tree
    /// emptied.
    pub(crate) fn remove_leaf(&mut self, leaf: NodeIndex) -> NodeIndex {
        if leaf == self.root {
            self.root = NodeIndex::NONE;
            return NodeIndex::NONE;
        }

        let parent = self.node(leaf).parent;
        let grandparent = self.node(parent).parent;
        let leaf_slot = self.slot_of(leaf);
        let sibling = self.node(parent).children[1 - leaf_slot];

        if grandparent.is_none() {
            self.root = sibling;
            self.node_mut(sibling).parent = NodeIndex::NONE;
            self.free_node(parent);
            return self.root;
        }

        let parent_slot = self.slot_of(parent);
        self.node_mut(grandparent).children[parent_slot] = sibling;
        self.node_mut(sibling).parent = grandparent;
        self.free_node(parent);

        let mut previous = grandparent;
        loop {
            let before = self.node(previous).volume;
            let [c0, c1] = self.node(previous).children;
            let after = self.node(c0).volume.union(&self.node(c1).volume);
            self.node_mut(previous).volume = after;
            if after == before {
                break;
            }
            let up = self.node(previous).parent;
            if up.is_none() {
                break;
            }
            previous = up;
        }
        previous
    }

    /// Insert a leaf with `volume` and `data`, rebalancing along the
    /// insertion path.
    pub fn insert(&mut self, volume: Aabb3, data: u32) -> NodeIndex {
        let leaf = self.alloc_node(NodeIndex::NONE, volume, data);
        self.insert_leaf(self.root, leaf);
        self.leaf_count += 1;
        leaf
    }

    /// Remove a leaf, returning its slot to the pool.
    pub fn remove(&mut self, leaf: NodeIndex) {
        debug_assert!(self.node(leaf).is_leaf(), "remove expects a leaf");
        self.remove_leaf(leaf);
        self.free_node(leaf);
        self.leaf_count -= 1;
    }

    /// Reinsert `leaf` where it now belongs, restarting the descent
    /// `lookahead` parents above its old position (negative: from the root).
    pub fn update_lookahead(&mut self, leaf: NodeIndex, lookahead: i32) {
        let mut entry = self.remove_leaf(leaf);
        if entry.is_some() {
            if lookahead >= 0 {
                for _ in 0..lookahead {
                    let up = self.node(entry).parent;
                    if up.is_none() {
                        break;
                    }
                    entry = up;
                }
            } else {
                entry = self.root;
            }
        }
        self.insert_leaf(entry, leaf);
    }

    /// Move `leaf` to `volume`, reinserting via the tree's configured
    /// [`Dbvt::lookahead`].
    pub fn update(&mut self, leaf: NodeIndex, volume: Aabb3) {
        let mut entry = self.remove_leaf(leaf);
        if entry.is_some() {
            if self.lookahead >= 0 {
                for _ in 0..self.lookahead {
                    let up = self.node(entry).parent;
                    if up.is_none() {
                        break;
                    }
                    entry = up;
                }
            } else {
                entry = self.root;
            }
        }
        self.node_mut(leaf).volume = volume;
        self.insert_leaf(entry, leaf);
    }

    /// Conditional update: does nothing while the stored (fattened) volume
    /// still contains `volume`. Otherwise expands `volume` by `margin` on
    /// every face and by `velocity` along its direction, then reinserts.
    /// Returns whether a reinsertion happened.
    pub fn update_with_velocity(
        &mut self,
        leaf: NodeIndex,
        mut volume: Aabb3,
        velocity: Vec3,
        margin: f32,
    ) -> bool {
        if self.node(leaf).volume.contains(&volume) {
            return false;
        }
        volume.expand(Vec3::splat(margin));
        volume.signed_expand(velocity);
        self.update(leaf, volume);
        true
    }

    /// Remove every node and reset the pools.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = NodeIndex::NONE;
        self.free_cache = None;
        self.free_list.clear();
        self.lookahead = -1;
        self.leaf_count = 0;
        self.opath = 0;
    }

    // --- rebalancing ---

    /// Rotate `node` above its parent when the parent occupies a higher
    /// arena slot, pulling hot nodes toward the low end of the arena.
    /// Returns the node now holding `node`'s former position.
    fn rotate_up(&mut self, node: NodeIndex) -> NodeIndex {
        let parent = self.node(node).parent;
        if parent.is_none() || parent.raw() < node.raw() {
            return node;
        }
        debug_assert!(self.node(node).is_internal(), "only internal nodes rotate");

        let i = self.slot_of(node);
        let j = 1 - i;
        let sibling = self.node(parent).children[j];
        let grandparent = self.node(parent).parent;

        if grandparent.is_some() {
            let parent_slot = self.slot_of(parent);
            self.node_mut(grandparent).children[parent_slot] = node;
        } else {
            self.root = node;
        }

        let node_children = self.node(node).children;
        self.node_mut(sibling).parent = node;
        self.node_mut(parent).parent = node;
        self.node_mut(node).parent = grandparent;
        self.node_mut(parent).children = node_children;
        self.node_mut(node_children[0]).parent = parent;
        self.node_mut(node_children[1]).parent = parent;
        self.node_mut(node).children[i] = parent;
        self.node_mut(node).children[j] = sibling;

        let parent_volume = self.node(parent).volume;
        let node_volume = self.node(node).volume;
        self.node_mut(parent).volume = node_volume;
        self.node_mut(node).volume = parent_volume;

        parent
    }

    /// Amortized rebalance: each pass walks one root-to-leaf path chosen by
    /// the low bits of an internal counter, rotating as it goes, and
    /// reinserts the leaf it lands on. Negative `passes` rebalances once per
    /// leaf.
    pub fn optimize_incremental(&mut self, passes: i32) {
        let mut passes = if passes < 0 { self.leaf_count as i32 } else { passes };
        if self.root.is_none() {
            return;
        }
        while passes > 0 {
            let mut node = self.root;
            let mut bit = 0;
            while self.node(node).is_internal() {
                let continue_from = self.rotate_up(node);
                node = self.node(continue_from).children[((self.opath >> bit) & 1) as usize];
                bit = (bit + 1) & 31;
            }
            self.update_lookahead(node, -1);
            self.opath = self.opath.wrapping_add(1);
            passes -= 1;
        }
    }

    /// Full rebuild by greedy pairwise merging. Quadratic; only sensible for
    /// small trees or as the base case of the top-down build.
    pub fn optimize_bottom_up(&mut self) {
        if self.root.is_none() {
            return;
        }
        let mut leaves = Vec::with_capacity(self.leaf_count);
        self.fetch_leaves(self.root, &mut leaves, -1);
        self.bottom_up(&mut leaves);
        self.root = leaves[0];
        self.node_mut(self.root).parent = NodeIndex::NONE;
    }

    /// Full rebuild by recursive median split, switching to bottom-up
    /// merging below `bu_threshold` leaves.
    pub fn optimize_top_down(&mut self, bu_threshold: usize) {
        debug_assert!(bu_threshold > 2, "bottom-up threshold must exceed 2");
        if self.root.is_none() {
            return;
        }
        let mut leaves = Vec::with_capacity(self.leaf_count);
        self.fetch_leaves(self.root, &mut leaves, -1);
        self.root = self.top_down(&mut leaves, bu_threshold);
        self.node_mut(self.root).parent = NodeIndex::NONE;
    }

    /// Collect leaves under `root` into `out`, recycling the internal nodes
    /// (they will be rebuilt). `depth` bounds the descent; negative is
    /// unbounded.
    fn fetch_leaves(&mut self, root: NodeIndex, out: &mut Vec<NodeIndex>, depth: i32) {
        if self.node(root).is_internal() && depth != 0 {
            let [c0, c1] = self.node(root).children;
            self.fetch_leaves(c0, out, depth - 1);
            self.fetch_leaves(c1, out, depth - 1);
            self.free_node(root);
        } else {
            out.push(root);
        }
    }

    fn bottom_up(&mut self, leaves: &mut Vec<NodeIndex>) {
        while leaves.len() > 1 {
            let mut min_size = f32::MAX;
            let mut min_pair = (0, 1);
            for i in 0..leaves.len() {
                for j in (i + 1)..leaves.len() {
                    let merged = self
                        .node(leaves[i])
                        .volume
                        .union(&self.node(leaves[j]).volume);
                    let size = merged.surface_area();
                    if size < min_size {
                        min_size = size;
                        min_pair = (i, j);
                    }
                }
            }
            let (i, j) = min_pair;
            let (a, b) = (leaves[i], leaves[j]);
            let merged = self.node(a).volume.union(&self.node(b).volume);
            let parent = self.alloc_node(NodeIndex::NONE, merged, 0);
            self.node_mut(parent).children = [a, b];
            self.node_mut(a).parent = parent;
            self.node_mut(b).parent = parent;
            leaves[i] = parent;
            leaves.swap_remove(j);
        }
    }

    fn top_down(&mut self, leaves: &mut [NodeIndex], bu_threshold: usize) -> NodeIndex {
        const AXES: [Vec3; 3] = [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ];
        if leaves.len() == 1 {
            return leaves[0];
        }
        if leaves.len() <= bu_threshold {
            let mut vec = leaves.to_vec();
            self.bottom_up(&mut vec);
            return vec[0];
        }

        let bounds = self.bounds_of(leaves);
        let origin = bounds.center();

        // Pick the axis splitting the centroids most evenly.
        let mut split_count = [[0usize; 2]; 3];
        for &leaf in leaves.iter() {
            let x = self.node(leaf).volume.center() - origin;
            for (axis_index, axis) in AXES.iter().enumerate() {
                split_count[axis_index][usize::from(x.dot(*axis) > 0.0)] += 1;
            }
        }
        let mut best_axis = None;
        let mut best_midp = leaves.len();
        for (axis_index, counts) in split_count.iter().enumerate() {
            if counts[0] > 0 && counts[1] > 0 {
                let midp = counts[0].abs_diff(counts[1]);
                if midp < best_midp {
                    best_axis = Some(axis_index);
                    best_midp = midp;
                }
            }
        }
        let partition = match best_axis {
            Some(axis) => self.partition(leaves, origin, AXES[axis]),
            None => leaves.len() / 2 + 1,
        };
        debug_assert!(partition != 0 && partition != leaves.len(), "degenerate split");

        let node = self.alloc_node(NodeIndex::NONE, bounds, 0);
        let (left, right) = leaves.split_at_mut(partition);
        let c0 = self.top_down(left, bu_threshold);
        let c1 = self.top_down(right, bu_threshold);
        self.node_mut(node).children = [c0, c1];
        self.node_mut(c0).parent = node;
        self.node_mut(c1).parent = node;
        node
    }

    /// Hoare partition of `leaves` by centroid side of the plane through
    /// `origin` with normal `axis`. Returns the split point.
    fn partition(&self, leaves: &mut [NodeIndex], origin: Vec3, axis: Vec3) -> usize {
        let left_of = |tree: &Self, n: NodeIndex| {
            axis.dot(tree.node(n).volume.center() - origin) <= 0.0
        };
        let mut begin = 0;
        let mut end = leaves.len();
        loop {
            while begin != end && left_of(self, leaves[begin]) {
                begin += 1;
            }
            if begin == end {
                break;
            }
            while begin != end && !left_of(self, leaves[end - 1]) {
                end -= 1;
            }
            if begin == end {
                break;
            }
            end -= 1;
            leaves.swap(begin, end);
            begin += 1;
        }
        begin
    }

    fn bounds_of(&self, leaves: &[NodeIndex]) -> Aabb3 {
        let mut bounds = self.node(leaves[0]).volume;
        for &leaf in &leaves[1..] {
            bounds = bounds.union(&self.node(leaf).volume);
        }
        bounds
    }

    // --- introspection ---

    /// Depth of the deepest node under `node` (1 for a bare leaf).
    pub fn max_depth(&self, node: NodeIndex) -> usize {
        if node.is_none() {
            return 0;
        }
        if self.node(node).is_leaf() {
            return 1;
        }
        let [c0, c1] = self.node(node).children;
        1 + self.max_depth(c0).max(self.max_depth(c1))
    }

    /// Append every leaf under `node` to `out`.
    pub fn extract_leaves(&self, node: NodeIndex, out: &mut Vec<NodeIndex>) {
        if node.is_none() {
            return;
        }
        if self.node(node).is_internal() {
            let [c0, c1] = self.node(node).children;
            self.extract_leaves(c0, out);
            self.extract_leaves(c1, out);
        } else {
            out.push(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Aabb3, Dbvt, NodeIndex, Vec3};
    use alloc::vec::Vec;

    fn aabb(min: [f32; 3], max: [f32; 3]) -> Aabb3 {
        Aabb3::new(
            Vec3::new(min[0], min[1], min[2]),
            Vec3::new(max[0], max[1], max[2]),
        )
    }

    fn unit_box_at(x: f32, y: f32, z: f32) -> Aabb3 {
        aabb([x, y, z], [x + 1.0, y + 1.0, z + 1.0])
    }

    /// Every internal node must contain both children, and the leaf count
    /// must match the structural leaf population.
    fn check_invariants(tree: &Dbvt) {
        fn walk(tree: &Dbvt, node: NodeIndex, leaves: &mut usize) {
            if tree.is_leaf(node) {
                *leaves += 1;
                return;
            }
            let [c0, c1] = tree.children(node);
            let volume = tree.volume(node);
            assert!(
                volume.contains(&tree.volume(c0)),
                "internal volume must contain child 0"
            );
            assert!(
                volume.contains(&tree.volume(c1)),
                "internal volume must contain child 1"
            );
            assert_eq!(tree.parent(c0), node);
            assert_eq!(tree.parent(c1), node);
            walk(tree, c0, leaves);
            walk(tree, c1, leaves);
        }
        if tree.root().is_none() {
            assert_eq!(tree.leaf_count(), 0);
            return;
        }
        let mut leaves = 0;
        walk(tree, tree.root(), &mut leaves);
        assert_eq!(leaves, tree.leaf_count());
    }

    #[test]
    fn insert_builds_containing_hierarchy() {
        let mut tree = Dbvt::new();
        for i in 0..32 {
            let f = i as f32;
            tree.insert(unit_box_at(f * 2.0, (i % 4) as f32 * 3.0, 0.0), i);
        }
        assert_eq!(tree.leaf_count(), 32);
        check_invariants(&tree);
    }

    #[test]
    fn leaf_lifecycle() {
        let mut tree = Dbvt::new();
        let a = tree.insert(unit_box_at(0.0, 0.0, 0.0), 0);
        let b = tree.insert(unit_box_at(5.0, 0.0, 0.0), 1);
        let c = tree.insert(unit_box_at(10.0, 0.0, 0.0), 2);
        check_invariants(&tree);

        tree.remove(b);
        assert_eq!(tree.leaf_count(), 2);
        check_invariants(&tree);

        tree.update(a, unit_box_at(20.0, 0.0, 0.0));
        check_invariants(&tree);
        assert!(tree.volume(tree.root()).contains(&unit_box_at(20.0, 0.0, 0.0)));

        tree.remove(a);
        tree.remove(c);
        assert!(tree.is_empty());
        check_invariants(&tree);
    }

    #[test]
    fn update_with_velocity_skips_contained_moves() {
        let mut tree = Dbvt::new();
        let fat = aabb([-1.0, -1.0, -1.0], [2.0, 2.0, 2.0]);
        let leaf = tree.insert(fat, 0);

        // New box inside the fattened volume: no reinsertion.
        assert!(!tree.update_with_velocity(leaf, unit_box_at(0.0, 0.0, 0.0), Vec3::ZERO, 0.05));
        assert_eq!(tree.volume(leaf), fat);

        // Escaping box: reinserted with margin and velocity expansion.
        let moved = unit_box_at(10.0, 0.0, 0.0);
        assert!(tree.update_with_velocity(leaf, moved, Vec3::new(1.0, 0.0, 0.0), 0.05));
        let volume = tree.volume(leaf);
        assert!(volume.contains(&moved));
        // Expanded forward along +x, by margin only along -x.
        assert!(volume.max.x >= 12.0);
        assert!((volume.min.x - (10.0 - 0.05)).abs() < 1e-5);
        check_invariants(&tree);
    }

    #[test]
    fn incremental_optimize_preserves_population() {
        let mut tree = Dbvt::new();
        let mut leaves = Vec::new();
        for i in 0..24 {
            let f = i as f32;
            leaves.push(tree.insert(unit_box_at(f, f * 0.5, -f), i));
        }
        for _ in 0..8 {
            tree.optimize_incremental(4);
            check_invariants(&tree);
        }
        assert_eq!(tree.leaf_count(), 24);
        // Payloads survive rebalancing.
        let mut found = Vec::new();
        tree.extract_leaves(tree.root(), &mut found);
        let mut data: Vec<u32> = found.iter().map(|&n| tree.data(n)).collect();
        data.sort_unstable();
        let expected: Vec<u32> = (0..24).collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn top_down_rebuild_shrinks_depth() {
        let mut tree = Dbvt::new();
        // Sorted insertion produces a skewed tree.
        for i in 0..64 {
            tree.insert(unit_box_at(i as f32 * 1.5, 0.0, 0.0), i);
        }
        let before = tree.max_depth(tree.root());
        tree.optimize_top_down(8);
        check_invariants(&tree);
        let after = tree.max_depth(tree.root());
        assert!(after <= before, "rebuild must not deepen the tree");
        assert!(after <= 16, "64 leaves should pack well below depth 16, got {after}");
    }

    #[test]
    fn bottom_up_rebuild_keeps_invariants() {
        let mut tree = Dbvt::new();
        for i in 0..12 {
            tree.insert(unit_box_at((i % 3) as f32 * 4.0, (i / 3) as f32 * 4.0, 0.0), i);
        }
        tree.optimize_bottom_up();
        check_invariants(&tree);
        assert_eq!(tree.leaf_count(), 12);
    }

    #[test]
    fn node_ids_stay_stable_across_mutations() {
        let mut tree = Dbvt::new();
        let a = tree.insert(unit_box_at(0.0, 0.0, 0.0), 100);
        let b = tree.insert(unit_box_at(8.0, 0.0, 0.0), 200);
        for i in 0..16 {
            tree.insert(unit_box_at(i as f32, 4.0, 0.0), i);
        }
        tree.optimize_incremental(16);
        tree.update(a, unit_box_at(3.0, 3.0, 3.0));
        assert_eq!(tree.data(a), 100);
        assert_eq!(tree.data(b), 200);
        assert_eq!(tree.volume(a), unit_box_at(3.0, 3.0, 3.0));
    }
}
