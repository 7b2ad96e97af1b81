use std::ops::Range;
use std::time::Instant;

use log::{debug, info};
use raytracer_shared::{Aabb, Axis, GpuNode, RaytracerConfig, Triangle};

use crate::scene::{ensure_capacity, BufferKind, Scene, SceneError};

/// Whether a node has children
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    /// Children live at `first_child` and `first_child + 1`
    Internal { first_child: usize },
}

/// BVH node in the scene-wide flat node list
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Node {
    pub bounds: Aabb,
    pub first_triangle: usize,
    pub triangle_count: usize,
    pub kind: NodeKind,
}

impl Node {
    pub fn leaf(bounds: Aabb, first_triangle: usize, triangle_count: usize) -> Self {
        Self {
            bounds,
            first_triangle,
            triangle_count,
            kind: NodeKind::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == NodeKind::Leaf
    }

    pub fn children(&self) -> Option<[usize; 2]> {
        match self.kind {
            NodeKind::Leaf => None,
            NodeKind::Internal { first_child } => Some([first_child, first_child + 1]),
        }
    }

    pub fn triangle_range(&self) -> Range<usize> {
        self.first_triangle..self.first_triangle + self.triangle_count
    }

    pub fn to_gpu(&self) -> GpuNode {
        let (child_index, is_leaf) = match self.children() {
            None => (0, 1),
            Some([first_child, _]) => (first_child as u32, 0),
        };
        GpuNode {
            bounds: self.bounds,
            triangle_index: self.first_triangle as u32,
            triangle_count: self.triangle_count as u32,
            child_index,
            is_leaf,
        }
    }
}

/// Number of nodes a full binary tree of `depth` levels below the root holds
pub fn node_count_for_depth(depth: u32) -> usize {
    (1usize << (depth + 1)) - 1
}

/// Reorder `triangles` so those with centroid below `split` on `axis` come first.
/// Returns the number of triangles in that first group.
pub fn partition(triangles: &mut [Triangle], axis: Axis, split: f32) -> usize {
    let mut boundary = 0;
    for i in 0..triangles.len() {
        if triangles[i].centroid_on_axis(axis) < split {
            triangles.swap(boundary, i);
            boundary += 1;
        }
    }
    boundary
}

/// Union of the triangles' boxes, `None` for an empty slice
fn bounds_of(triangles: &[Triangle]) -> Option<Aabb> {
    let (first, rest) = triangles.split_first()?;
    let mut bounds = first.bounding_box();
    for triangle in rest {
        bounds.grow_triangle(triangle);
    }
    Some(bounds)
}

fn split_node(nodes: &mut Vec<Node>, triangles: &mut [Triangle], parent: usize, depth: u32) {
    if depth == 0 {
        return;
    }

    let node = nodes[parent];
    let axis = node.bounds.longest_axis();
    let split = node.bounds.center_on_axis(axis);
    let range = node.triangle_range();
    let below = partition(&mut triangles[range.clone()], axis, split);
    let middle = range.start + below;

    // An empty side collapses onto the parent's center
    let empty = Aabb::from_point(node.bounds.center());
    let child_a = Node::leaf(
        bounds_of(&triangles[range.start..middle]).unwrap_or(empty),
        range.start,
        below,
    );
    let child_b = Node::leaf(
        bounds_of(&triangles[middle..range.end]).unwrap_or(empty),
        middle,
        range.end - middle,
    );

    let first_child = nodes.len();
    nodes.push(child_a);
    nodes.push(child_b);
    nodes[parent].kind = NodeKind::Internal { first_child };

    split_node(nodes, triangles, first_child, depth - 1);
    split_node(nodes, triangles, first_child + 1, depth - 1);
}

impl Scene {
    /// Rebuild the hierarchy of every mesh from scratch.
    ///
    /// Each mesh gets a full tree of its requested depth. Triangles are only reordered
    /// within their own mesh's range. If the whole forest would not fit the node
    /// capacity the scene is left with no nodes and no mesh roots.
    pub fn build_bvhs(&mut self) -> Result<(), SceneError> {
        self.nodes.clear();
        for mesh in &mut self.meshes {
            mesh.root_node = None;
        }

        let mut required = 0usize;
        for mesh in &self.meshes {
            if mesh.bvh_depth > RaytracerConfig::MAX_BVH_DEPTH {
                return Err(SceneError::DepthTooLarge {
                    depth: mesh.bvh_depth,
                    max: RaytracerConfig::MAX_BVH_DEPTH,
                });
            }
            required += node_count_for_depth(mesh.bvh_depth);
        }
        ensure_capacity(BufferKind::Nodes, required, self.capacities().nodes)?;

        let start = Instant::now();
        self.nodes.reserve(required);
        for mesh in &mut self.meshes {
            let root = self.nodes.len();
            self.nodes
                .push(Node::leaf(mesh.bounds, mesh.first_triangle, mesh.triangle_count));
            split_node(&mut self.nodes, &mut self.triangles, root, mesh.bvh_depth);
            mesh.root_node = Some(root);
            debug!(
                "BVH for triangles {:?}: {} nodes from index {}",
                mesh.triangle_range(),
                self.nodes.len() - root,
                root
            );
        }

        let stats = self.stats();
        info!(
            "Built {} BVHs: {} nodes, {} leaves in {:.2}ms",
            stats.meshes,
            stats.nodes,
            stats.leaves,
            start.elapsed().as_secs_f32() * RaytracerConfig::MILLISECONDS_PER_SECOND
        );
        Ok(())
    }

    /// Log the bounds of every leaf at debug level
    pub fn log_leaf_bounds(&self) {
        for (index, node) in self.nodes.iter().enumerate().filter(|(_, node)| node.is_leaf()) {
            debug!(
                "leaf {}: {} triangles, min {:?} max {:?}",
                index, node.triangle_count, node.bounds.min, node.bounds.max
            );
        }
    }
}
