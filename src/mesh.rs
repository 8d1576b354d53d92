/*
 * Mesh Module
 *
 * Sub-mesh metadata read by the indirect argument block, plus a small
 * CPU-side mesh type the demo host uploads. Mesh asset loading is the
 * host's business; the pipeline only ever asks a mesh for its sub-mesh
 * ranges through the MeshAsset trait.
 */

use serde::{Deserialize, Serialize};

// Index range of one sub-mesh inside a shared index buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMesh {
    pub index_start: u32,
    pub index_count: u32,
    pub base_vertex: u32,
}

pub trait MeshAsset {
    fn submesh(&self, index: usize) -> Option<SubMesh>;

    fn submesh_count(&self) -> usize;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
}

impl MeshData {
    // A mesh whose whole index buffer is sub-mesh 0
    pub fn single(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        let submeshes = vec![SubMesh {
            index_start: 0,
            index_count: indices.len() as u32,
            base_vertex: 0,
        }];
        Self {
            positions,
            indices,
            submeshes,
        }
    }

    // Unit octahedron, used for flock agents
    pub fn octahedron() -> Self {
        let positions = vec![
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, -1.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 0.0, -1.0],
        ];
        let indices = vec![
            0, 2, 4, 4, 2, 1, 1, 2, 5, 5, 2, 0, //
            4, 3, 0, 1, 3, 4, 5, 3, 1, 0, 3, 5,
        ];
        Self::single(positions, indices)
    }

    // Stretched tetrahedron pointing down +Z, used for hand avatars
    pub fn dart() -> Self {
        let positions = vec![
            [0.0, 0.0, 1.0],
            [-0.5, -0.3, -0.5],
            [0.5, -0.3, -0.5],
            [0.0, 0.5, -0.5],
        ];
        let indices = vec![0, 1, 2, 0, 2, 3, 0, 3, 1, 1, 3, 2];
        Self::single(positions, indices)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

impl MeshAsset for MeshData {
    fn submesh(&self, index: usize) -> Option<SubMesh> {
        self.submeshes.get(index).copied()
    }

    fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }
}
