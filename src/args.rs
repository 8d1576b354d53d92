/*
 * Indirect Draw Arguments Module
 *
 * The five-word argument block consumed directly by the indexed indirect
 * draw. Three words mirror the mesh's first sub-mesh, one is the instance
 * count, and the instance offset is always zero. The block is derived once
 * at setup and uploaded once; the instance count never changes afterwards.
 */

use bytemuck::{Pod, Zeroable};

use crate::error::PipelineError;
use crate::mesh::MeshAsset;

// Sub-mesh the pipeline draws
pub const DRAW_SUBMESH: u32 = 0;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: u32,
    pub start_instance_location: u32,
}

impl IndirectDrawArgs {
    pub const WORDS: usize = 5;

    pub const fn byte_size() -> usize {
        Self::WORDS * std::mem::size_of::<u32>()
    }

    pub fn as_words(&self) -> [u32; Self::WORDS] {
        [
            self.index_count,
            self.instance_count,
            self.start_index_location,
            self.base_vertex_location,
            self.start_instance_location,
        ]
    }
}

const _: () = assert!(std::mem::size_of::<IndirectDrawArgs>() == IndirectDrawArgs::byte_size());

// Pairs the mesh's first sub-mesh with the caller's instance count
pub fn build_args<M: MeshAsset + ?Sized>(
    mesh: &M,
    instance_count: u32,
) -> Result<IndirectDrawArgs, PipelineError> {
    let submesh = mesh
        .submesh(DRAW_SUBMESH as usize)
        .ok_or(PipelineError::MissingSubmesh(DRAW_SUBMESH))?;

    Ok(IndirectDrawArgs {
        index_count: submesh.index_count,
        instance_count,
        start_index_location: submesh.index_start,
        base_vertex_location: submesh.base_vertex,
        start_instance_location: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{MeshData, SubMesh};

    #[test]
    fn args_mirror_first_submesh() {
        let mesh = MeshData {
            positions: vec![[0.0; 3]; 8],
            indices: vec![0; 36],
            submeshes: vec![
                SubMesh { index_start: 6, index_count: 24, base_vertex: 2 },
                SubMesh { index_start: 30, index_count: 6, base_vertex: 0 },
            ],
        };

        let args = build_args(&mesh, 128).unwrap();
        assert_eq!(args.as_words(), [24, 128, 6, 2, 0]);
        assert_eq!(bytemuck::bytes_of(&args).len(), 20);
    }

    #[test]
    fn building_twice_gives_the_same_block() {
        let mesh = MeshData::octahedron();
        assert_eq!(build_args(&mesh, 7).unwrap(), build_args(&mesh, 7).unwrap());
    }

    #[test]
    fn zero_instances_is_a_valid_block() {
        let args = build_args(&MeshData::dart(), 0).unwrap();
        assert_eq!(args.instance_count, 0);
        assert_eq!(args.index_count, 12);
    }

    #[test]
    fn mesh_without_submeshes_is_rejected() {
        let mesh = MeshData::default();
        assert!(matches!(build_args(&mesh, 1), Err(PipelineError::MissingSubmesh(0))));
    }
}
