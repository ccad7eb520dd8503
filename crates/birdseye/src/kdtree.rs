//! 2-D k-d tree over the current frame's blobs.
//!
//! Built incrementally in blob order (the first blob becomes the root) with
//! splits alternating between x and y. Equal coordinates go to the right
//! subtree, so identical inputs always produce the identical tree. The tree
//! borrows the frame's blob slice and must not outlive it.

use nalgebra::Vector2;

use crate::extract::RawBlob;

#[derive(Debug)]
struct Node {
    blob: u32,
    left: Option<u32>,
    right: Option<u32>,
}

#[derive(Debug)]
pub struct KdTree<'a> {
    blobs: &'a [RawBlob],
    nodes: Vec<Node>,
}

impl<'a> KdTree<'a> {
    /// Build the tree by inserting the blobs in slice order.
    pub fn build(blobs: &'a [RawBlob]) -> Self {
        let mut tree = Self {
            blobs,
            nodes: Vec::with_capacity(blobs.len()),
        };
        for index in 0..blobs.len() {
            tree.insert(index as u32);
        }
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn insert(&mut self, blob: u32) {
        let new_node = self.nodes.len() as u32;
        self.nodes.push(Node {
            blob,
            left: None,
            right: None,
        });
        if new_node == 0 {
            return;
        }

        let pos = self.blobs[blob as usize].field_pos;
        let mut current = 0u32;
        let mut axis = 0;
        loop {
            let node = &self.nodes[current as usize];
            let split = coord(self.blobs[node.blob as usize].field_pos, axis);
            let slot = if coord(pos, axis) < split {
                node.left
            } else {
                node.right
            };
            match slot {
                Some(child) => {
                    current = child;
                    axis ^= 1;
                }
                None => {
                    let node = &mut self.nodes[current as usize];
                    if coord(pos, axis) < split {
                        node.left = Some(new_node);
                    } else {
                        node.right = Some(new_node);
                    }
                    return;
                }
            }
        }
    }

    /// Indices of all blobs within Euclidean `radius` of `point`.
    pub fn range_search(&self, point: Vector2<f32>, radius: f32) -> Vec<usize> {
        let mut found = Vec::new();
        if !self.nodes.is_empty() {
            self.search(0, 0, point, radius, &mut found);
        }
        found
    }

    fn search(
        &self,
        node_index: u32,
        axis: usize,
        point: Vector2<f32>,
        radius: f32,
        found: &mut Vec<usize>,
    ) {
        let node = &self.nodes[node_index as usize];
        let pos = self.blobs[node.blob as usize].field_pos;

        if (pos - point).norm() <= radius {
            found.push(node.blob as usize);
        }

        let delta = coord(point, axis) - coord(pos, axis);
        if delta - radius < 0.0 {
            if let Some(left) = node.left {
                self.search(left, axis ^ 1, point, radius, found);
            }
        }
        if delta + radius >= 0.0 {
            if let Some(right) = node.right {
                self.search(right, axis ^ 1, point, radius, found);
            }
        }
    }
}

#[inline]
fn coord(pos: Vector2<f32>, axis: usize) -> f32 {
    if axis == 0 {
        pos.x
    } else {
        pos.y
    }
}
