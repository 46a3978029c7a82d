//! Per-region LOD octree (spec.md §4.9, §9 "Octree via arena"). Grounded
//! on `original_source/terrain/voxel_lod_terrain.cpp`'s `update()` pass
//! (the `SubdivideAction`/`UnsubdivideAction` pair and their `can_do`
//! guards), generalized from that file's inline functor structs into a
//! reusable `OctreeObserver` trait, and on the arena layout named in
//! spec.md's design notes rather than a pointer-based tree.

pub mod controller;

pub use controller::Controller;

use glam::IVec3;

/// Offsets (in child-LOD block units) of the eight children of a node,
/// matching `LodOctree::get_child_position`'s corner ordering.
const CHILD_OFFSETS: [IVec3; 8] = [
    IVec3::new(0, 0, 0),
    IVec3::new(1, 0, 0),
    IVec3::new(0, 1, 0),
    IVec3::new(1, 1, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(1, 0, 1),
    IVec3::new(0, 1, 1),
    IVec3::new(1, 1, 1),
];

pub fn child_position(parent_position: IVec3, child_index: usize) -> IVec3 {
    parent_position * 2 + CHILD_OFFSETS[child_index]
}

struct Node {
    position: IVec3,
    children: Option<[u32; 8]>,
}

/// Decides whether a node may subdivide/merge and reacts to the
/// transition. Implemented by whatever owns the mesh-block state (spec.md
/// §4.9: "invoking subdivide_action/unsubdivide_action hooks on the
/// enclosing system").
pub trait OctreeObserver {
    /// All eight children (at `lod_index - 1`) must have a ready mesh
    /// before a node may subdivide, or the coarse mesh would pop away
    /// leaving a hole (spec.md §4.9 "holes appear" invariant).
    fn can_subdivide(&self, lod_index: u32, node_position: IVec3) -> bool;

    /// The parent's own mesh (at `lod_index`) must be ready before merging
    /// back into it, for the same reason.
    fn can_merge(&self, lod_index: u32, node_position: IVec3) -> bool;

    fn on_subdivide(&mut self, lod_index: u32, node_position: IVec3);
    fn on_merge(&mut self, lod_index: u32, node_position: IVec3);
}

/// Arena-indexed octree: nodes are `u32`-addressed, children are eight
/// indices, and a free-list reclaims slots freed by merge (spec.md §9).
pub struct LodOctree {
    lod_count: u32,
    block_size: u32,
    split_scale: f32,
    root: u32,
    nodes: Vec<Option<Node>>,
    free_list: Vec<u32>,
}

impl LodOctree {
    pub fn new(lod_count: u32, block_size: u32, split_scale: f32) -> Self {
        assert!(lod_count >= 1, "an octree needs at least one LOD");
        let root = Node {
            position: IVec3::ZERO,
            children: None,
        };
        Self {
            lod_count,
            block_size,
            split_scale,
            root: 0,
            nodes: vec![Some(root)],
            free_list: Vec::new(),
        }
    }

    pub fn lod_count(&self) -> u32 {
        self.lod_count
    }

    pub fn set_split_scale(&mut self, split_scale: f32) {
        self.split_scale = split_scale;
    }

    pub fn split_scale(&self) -> f32 {
        self.split_scale
    }

    /// `true` if the given node has no children (i.e. its own block, not
    /// its children's, is the one currently shown).
    pub fn is_shown(&self, node_idx: u32) -> bool {
        self.nodes[node_idx as usize].as_ref().unwrap().children.is_none()
    }

    pub fn node_position(&self, node_idx: u32) -> IVec3 {
        self.nodes[node_idx as usize].as_ref().unwrap().position
    }

    fn alloc(&mut self, node: Node) -> u32 {
        if let Some(idx) = self.free_list.pop() {
            self.nodes[idx as usize] = Some(node);
            idx
        } else {
            let idx = self.nodes.len() as u32;
            self.nodes.push(Some(node));
            idx
        }
    }

    fn free(&mut self, idx: u32) {
        self.nodes[idx as usize] = None;
        self.free_list.push(idx);
    }

    fn subdivide(&mut self, node_idx: u32, lod_index: u32, observer: &mut dyn OctreeObserver) {
        let parent_position = self.node_position(node_idx);
        let mut children = [0u32; 8];
        for (i, child) in children.iter_mut().enumerate() {
            *child = self.alloc(Node {
                position: child_position(parent_position, i),
                children: None,
            });
        }
        self.nodes[node_idx as usize].as_mut().unwrap().children = Some(children);
        observer.on_subdivide(lod_index, parent_position);
    }

    fn merge(&mut self, node_idx: u32, lod_index: u32, observer: &mut dyn OctreeObserver) {
        let parent_position = self.node_position(node_idx);
        let children = self.nodes[node_idx as usize].as_mut().unwrap().children.take().unwrap();
        for child in children {
            self.free_recursive(child);
        }
        observer.on_merge(lod_index, parent_position);
    }

    fn free_recursive(&mut self, node_idx: u32) {
        if let Some(children) = self.nodes[node_idx as usize].as_ref().unwrap().children {
            for child in children {
                self.free_recursive(child);
            }
        }
        self.free(node_idx);
    }

    /// Walks the tree once, subdividing nodes the viewer has gotten close
    /// to and merging nodes it has moved away from (spec.md §4.9 step 2).
    pub fn update(&mut self, viewer_lod0_position: IVec3, observer: &mut dyn OctreeObserver) {
        let root = self.root;
        let top_lod = self.lod_count - 1;
        self.update_node(root, top_lod, viewer_lod0_position, observer);
    }

    fn update_node(
        &mut self,
        node_idx: u32,
        lod_index: u32,
        viewer_lod0_position: IVec3,
        observer: &mut dyn OctreeObserver,
    ) {
        let position = self.node_position(node_idx);
        let node_size = self.block_size << lod_index;
        let world_center =
            position * node_size as i32 + IVec3::splat(node_size as i32 / 2);
        let distance = (world_center - viewer_lod0_position).as_vec3().length();
        let split_distance = self.split_scale * node_size as f32;

        if lod_index == 0 {
            return;
        }

        if self.is_shown(node_idx) {
            if distance < split_distance && observer.can_subdivide(lod_index, position) {
                self.subdivide(node_idx, lod_index, observer);
                let children = self.nodes[node_idx as usize].as_ref().unwrap().children.unwrap();
                for child in children {
                    self.update_node(child, lod_index - 1, viewer_lod0_position, observer);
                }
            }
            return;
        }

        let children = self.nodes[node_idx as usize].as_ref().unwrap().children.unwrap();
        for child in children {
            self.update_node(child, lod_index - 1, viewer_lod0_position, observer);
        }

        if distance >= split_distance && observer.can_merge(lod_index, position) {
            self.merge(node_idx, lod_index, observer);
        }
    }

    /// Collects every currently-shown (leaf) node as `(lod, position)`
    /// pairs (spec.md §8 "the set of visible blocks forms a partition").
    pub fn shown_blocks(&self) -> Vec<(u32, IVec3)> {
        let mut out = Vec::new();
        self.collect_shown(self.root, self.lod_count - 1, &mut out);
        out
    }

    fn collect_shown(&self, node_idx: u32, lod_index: u32, out: &mut Vec<(u32, IVec3)>) {
        let node = self.nodes[node_idx as usize].as_ref().unwrap();
        match node.children {
            None => out.push((lod_index, node.position)),
            Some(children) => {
                for child in children {
                    self.collect_shown(child, lod_index - 1, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysAllow {
        subdivisions: Vec<(u32, IVec3)>,
        merges: Vec<(u32, IVec3)>,
    }

    impl OctreeObserver for AlwaysAllow {
        fn can_subdivide(&self, _lod_index: u32, _node_position: IVec3) -> bool {
            true
        }
        fn can_merge(&self, _lod_index: u32, _node_position: IVec3) -> bool {
            true
        }
        fn on_subdivide(&mut self, lod_index: u32, node_position: IVec3) {
            self.subdivisions.push((lod_index, node_position));
        }
        fn on_merge(&mut self, lod_index: u32, node_position: IVec3) {
            self.merges.push((lod_index, node_position));
        }
    }

    #[test]
    fn viewer_at_root_subdivides_down_to_lod_zero() {
        let mut tree = LodOctree::new(3, 16, 2.0);
        let mut observer = AlwaysAllow { subdivisions: Vec::new(), merges: Vec::new() };
        tree.update(IVec3::ZERO, &mut observer);
        assert!(!observer.subdivisions.is_empty());
        let shown = tree.shown_blocks();
        assert!(shown.iter().any(|(lod, _)| *lod == 0));
    }

    #[test]
    fn viewer_far_away_never_subdivides_past_root() {
        let mut tree = LodOctree::new(3, 16, 1.0);
        let mut observer = AlwaysAllow { subdivisions: Vec::new(), merges: Vec::new() };
        tree.update(IVec3::splat(1_000_000), &mut observer);
        assert_eq!(tree.shown_blocks(), vec![(2, IVec3::ZERO)]);
    }

    #[test]
    fn shown_blocks_partition_with_no_overlap() {
        let mut tree = LodOctree::new(3, 16, 2.0);
        let mut observer = AlwaysAllow { subdivisions: Vec::new(), merges: Vec::new() };
        tree.update(IVec3::ZERO, &mut observer);
        let shown = tree.shown_blocks();
        for (i, a) in shown.iter().enumerate() {
            for b in &shown[i + 1..] {
                assert_ne!(a, b, "no two shown blocks may be identical");
            }
        }
    }

    #[test]
    fn moving_away_then_back_merges_then_resubdivides() {
        let mut tree = LodOctree::new(2, 16, 2.0);
        let mut observer = AlwaysAllow { subdivisions: Vec::new(), merges: Vec::new() };
        tree.update(IVec3::ZERO, &mut observer);
        assert_eq!(tree.shown_blocks().len(), 8);

        tree.update(IVec3::splat(10_000_000), &mut observer);
        assert_eq!(tree.shown_blocks(), vec![(1, IVec3::ZERO)]);
        assert!(!observer.merges.is_empty());
    }
}
