/*
 * Host Module
 *
 * The GpuHost trait is the seam between the pipeline and whatever owns the
 * GPU device. A host allocates and uploads buffers, binds them to named slots
 * on a compute kernel or a render material, pushes kernel uniforms, records
 * dispatches and indirect draws, and frees buffers on request.
 *
 * Submission is fire-and-forget. The pipeline never waits for the GPU; its
 * only ordering promise is dispatch before draw within a frame, and hosts
 * must preserve that order when they hand work to the queue.
 */

use std::fmt;

use crate::bounds::Bounds;
use crate::error::HostError;
use crate::mesh::MeshAsset;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    // Array of fixed-stride records, read/write from compute, read from render
    Structured,
    // Argument block for indirect draws
    IndirectArguments,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: &'static str,
    pub count: usize,
    pub stride: usize,
    pub kind: BufferKind,
}

impl BufferDesc {
    pub fn byte_size(&self) -> u64 {
        self.count as u64 * self.stride as u64
    }
}

// Where a buffer gets bound: a compute kernel or a render material
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage<K, M> {
    Compute(K),
    Render(M),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Uint(u32),
    Float(f32),
    Vec3([f32; 3]),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uniform {
    pub name: &'static str,
    pub value: UniformValue,
}

impl Uniform {
    pub fn uint(name: &'static str, value: u32) -> Self {
        Self { name, value: UniformValue::Uint(value) }
    }

    pub fn float(name: &'static str, value: f32) -> Self {
        Self { name, value: UniformValue::Float(value) }
    }

    pub fn vec3(name: &'static str, value: [f32; 3]) -> Self {
        Self { name, value: UniformValue::Vec3(value) }
    }
}

pub struct IndirectDraw<'a, H: GpuHost + ?Sized> {
    pub mesh: &'a H::Mesh,
    pub submesh: u32,
    pub material: H::Material,
    pub bounds: Bounds,
    pub args: &'a H::Buffer,
}

pub type HostStage<H> = Stage<<H as GpuHost>::Kernel, <H as GpuHost>::Material>;

pub trait GpuHost {
    type Buffer;
    type Kernel: Copy + fmt::Debug + PartialEq;
    type Material: Copy + fmt::Debug + PartialEq;
    type Shader;
    type Mesh: MeshAsset;

    // Reserves exactly desc.byte_size() bytes of GPU-visible storage
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<Self::Buffer, HostError>;

    // Full replace of the buffer's contents
    fn write_buffer(&mut self, buffer: &Self::Buffer, bytes: &[u8]) -> Result<(), HostError>;

    fn bind_buffer(
        &mut self,
        buffer: &Self::Buffer,
        stage: HostStage<Self>,
        slot: &'static str,
    ) -> Result<(), HostError>;

    // Clears the slot only while it still holds `buffer`
    fn unbind_buffer(&mut self, buffer: &Self::Buffer, stage: HostStage<Self>, slot: &'static str);

    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    fn find_kernel(
        &mut self,
        shader: &Self::Shader,
        entry_point: &str,
    ) -> Result<Self::Kernel, HostError>;

    fn set_uniforms(&mut self, kernel: Self::Kernel, uniforms: &[Uniform]) -> Result<(), HostError>;

    fn dispatch(&mut self, kernel: Self::Kernel, groups: [u32; 3]) -> Result<(), HostError>;

    // Frees whatever find_kernel created. Unknown kernels are ignored.
    fn release_kernel(&mut self, _kernel: Self::Kernel) {}

    fn draw_mesh_instanced_indirect(&mut self, draw: IndirectDraw<'_, Self>) -> Result<(), HostError>;

    // Blocking copy of a buffer back to the CPU. Only diagnostics use this.
    fn read_buffer(&mut self, _buffer: &Self::Buffer) -> Result<Vec<u8>, HostError> {
        Err(HostError::Unsupported("buffer read-back"))
    }
}
