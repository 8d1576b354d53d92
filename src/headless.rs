/*
 * Headless Host Module
 *
 * An in-memory GpuHost. Buffers are byte vectors, kernels and materials are
 * plain ids, and every call is appended to a log so tests and benchmarks can
 * check exactly what the pipeline asked the platform to do.
 *
 * A kernel can be given a CPU program that runs on each dispatch against the
 * buffer bound to its "properties" slot, standing in for the real compute
 * shader.
 */

use std::collections::{HashMap, HashSet};

use crate::agent::AgentRecord;
use crate::bounds::Bounds;
use crate::error::HostError;
use crate::host::{BufferDesc, BufferKind, GpuHost, HostStage, IndirectDraw, Stage, Uniform};
use crate::mesh::MeshData;
use crate::PROPERTIES_SLOT;

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessBuffer {
    id: u64,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

#[derive(Clone, Debug)]
pub struct HeadlessShader {
    pub entry_points: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    CreateBuffer { id: u64, label: &'static str, bytes: u64, kind: BufferKind },
    WriteBuffer { id: u64, bytes: usize },
    BindBuffer { id: u64, stage: Stage<KernelId, MaterialId>, slot: &'static str },
    UnbindBuffer { id: u64, stage: Stage<KernelId, MaterialId>, slot: &'static str },
    DestroyBuffer { id: u64 },
    FindKernel { kernel: KernelId, entry_point: String },
    ReleaseKernel { kernel: KernelId },
    SetUniforms { kernel: KernelId, uniforms: Vec<Uniform> },
    Dispatch { kernel: KernelId, groups: [u32; 3] },
    DrawIndirect {
        material: MaterialId,
        submesh: u32,
        bounds: Bounds,
        args_buffer: u64,
        args: Option<[u32; 5]>,
    },
    ReadBuffer { id: u64 },
}

type KernelProgram = Box<dyn FnMut(&[Uniform], &mut [AgentRecord])>;

#[derive(Default)]
pub struct HeadlessHost {
    buffers: HashMap<u64, Vec<u8>>,
    bindings: HashMap<(Stage<KernelId, MaterialId>, &'static str), u64>,
    last_uniforms: HashMap<KernelId, Vec<Uniform>>,
    programs: HashMap<KernelId, KernelProgram>,
    live_kernels: HashSet<KernelId>,
    calls: Vec<HostCall>,
    next_buffer: u64,
    next_kernel: u32,
    next_material: u32,
    // Fail the allocation with this (zero-based) index
    fail_allocation_at: Option<usize>,
    allocations: usize,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_shader(&mut self, entry_points: &[&str]) -> HeadlessShader {
        HeadlessShader {
            entry_points: entry_points.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn add_material(&mut self) -> MaterialId {
        let id = MaterialId(self.next_material);
        self.next_material += 1;
        id
    }

    pub fn fail_allocation_at(&mut self, index: usize) {
        self.fail_allocation_at = Some(index);
    }

    pub fn set_kernel_program<F>(&mut self, kernel: KernelId, program: F)
    where
        F: FnMut(&[Uniform], &mut [AgentRecord]) + 'static,
    {
        self.programs.insert(kernel, Box::new(program));
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_kernel_count(&self) -> usize {
        self.live_kernels.len()
    }

    pub fn bound_slot_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn bound_buffer(&self, stage: Stage<KernelId, MaterialId>, slot: &'static str) -> Option<u64> {
        self.bindings.get(&(stage, slot)).copied()
    }

    pub fn buffer_size(&self, buffer: &HeadlessBuffer) -> Option<u64> {
        self.buffers.get(&buffer.id).map(|b| b.len() as u64)
    }

    pub fn buffer_contents(&self, buffer: &HeadlessBuffer) -> Option<&[u8]> {
        self.buffers.get(&buffer.id).map(Vec::as_slice)
    }

    pub fn last_uniforms(&self, kernel: KernelId) -> Option<&[Uniform]> {
        self.last_uniforms.get(&kernel).map(Vec::as_slice)
    }

    fn live_kernel(&self, kernel: KernelId) -> Result<(), HostError> {
        if self.live_kernels.contains(&kernel) {
            Ok(())
        } else {
            Err(HostError::UnknownHandle { kind: "kernel", id: kernel.0 as u64 })
        }
    }

    fn bound_properties(&self, stage: Stage<KernelId, MaterialId>) -> Result<u64, HostError> {
        self.bound_buffer(stage, PROPERTIES_SLOT)
            .ok_or_else(|| HostError::Backend(format!("{stage:?} has no buffer bound to `{PROPERTIES_SLOT}`")))
    }

    fn run_program(&mut self, kernel: KernelId, buffer_id: u64) {
        let Some(program) = self.programs.get_mut(&kernel) else {
            return;
        };
        let Some(bytes) = self.buffers.get_mut(&buffer_id) else {
            return;
        };

        let mut records: Vec<AgentRecord> = bytemuck::pod_collect_to_vec(bytes.as_slice());
        let uniforms = self.last_uniforms.get(&kernel).cloned().unwrap_or_default();
        program(&uniforms, &mut records);
        bytes.copy_from_slice(bytemuck::cast_slice(&records));
    }
}

impl GpuHost for HeadlessHost {
    type Buffer = HeadlessBuffer;
    type Kernel = KernelId;
    type Material = MaterialId;
    type Shader = HeadlessShader;
    type Mesh = MeshData;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<HeadlessBuffer, HostError> {
        let index = self.allocations;
        self.allocations += 1;

        if self.fail_allocation_at == Some(index) {
            return Err(HostError::Allocation {
                label: desc.label,
                bytes: desc.byte_size(),
                reason: "injected allocation failure".to_string(),
            });
        }

        let id = self.next_buffer;
        self.next_buffer += 1;
        self.buffers.insert(id, vec![0; desc.byte_size() as usize]);
        self.calls.push(HostCall::CreateBuffer {
            id,
            label: desc.label,
            bytes: desc.byte_size(),
            kind: desc.kind,
        });

        Ok(HeadlessBuffer { id })
    }

    fn write_buffer(&mut self, buffer: &HeadlessBuffer, bytes: &[u8]) -> Result<(), HostError> {
        let storage = self
            .buffers
            .get_mut(&buffer.id)
            .ok_or(HostError::UnknownHandle { kind: "buffer", id: buffer.id })?;

        if storage.len() != bytes.len() {
            return Err(HostError::Backend(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                storage.len()
            )));
        }

        storage.copy_from_slice(bytes);
        self.calls.push(HostCall::WriteBuffer { id: buffer.id, bytes: bytes.len() });
        Ok(())
    }

    fn bind_buffer(
        &mut self,
        buffer: &HeadlessBuffer,
        stage: HostStage<Self>,
        slot: &'static str,
    ) -> Result<(), HostError> {
        if !self.buffers.contains_key(&buffer.id) {
            return Err(HostError::UnknownHandle { kind: "buffer", id: buffer.id });
        }

        self.bindings.insert((stage, slot), buffer.id);
        self.calls.push(HostCall::BindBuffer { id: buffer.id, stage, slot });
        Ok(())
    }

    fn unbind_buffer(&mut self, buffer: &HeadlessBuffer, stage: HostStage<Self>, slot: &'static str) {
        if self.bindings.get(&(stage, slot)) == Some(&buffer.id) {
            self.bindings.remove(&(stage, slot));
        }
        self.calls.push(HostCall::UnbindBuffer { id: buffer.id, stage, slot });
    }

    fn destroy_buffer(&mut self, buffer: HeadlessBuffer) {
        self.buffers.remove(&buffer.id);
        self.bindings.retain(|_, id| *id != buffer.id);
        self.calls.push(HostCall::DestroyBuffer { id: buffer.id });
    }

    fn find_kernel(&mut self, shader: &HeadlessShader, entry_point: &str) -> Result<KernelId, HostError> {
        if !shader.entry_points.iter().any(|e| e == entry_point) {
            return Err(HostError::KernelNotFound(entry_point.to_string()));
        }

        let kernel = KernelId(self.next_kernel);
        self.next_kernel += 1;
        self.live_kernels.insert(kernel);
        self.calls.push(HostCall::FindKernel {
            kernel,
            entry_point: entry_point.to_string(),
        });
        Ok(kernel)
    }

    fn release_kernel(&mut self, kernel: KernelId) {
        if !self.live_kernels.remove(&kernel) {
            return;
        }
        self.programs.remove(&kernel);
        self.last_uniforms.remove(&kernel);
        self.bindings.retain(|(stage, _), _| *stage != Stage::Compute(kernel));
        self.calls.push(HostCall::ReleaseKernel { kernel });
    }

    fn set_uniforms(&mut self, kernel: KernelId, uniforms: &[Uniform]) -> Result<(), HostError> {
        self.live_kernel(kernel)?;
        self.last_uniforms.insert(kernel, uniforms.to_vec());
        self.calls.push(HostCall::SetUniforms {
            kernel,
            uniforms: uniforms.to_vec(),
        });
        Ok(())
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) -> Result<(), HostError> {
        self.live_kernel(kernel)?;
        let buffer_id = self.bound_properties(Stage::Compute(kernel))?;
        self.calls.push(HostCall::Dispatch { kernel, groups });
        self.run_program(kernel, buffer_id);
        Ok(())
    }

    fn draw_mesh_instanced_indirect(&mut self, draw: IndirectDraw<'_, Self>) -> Result<(), HostError> {
        self.bound_properties(Stage::Render(draw.material))?;

        let args_bytes = self
            .buffers
            .get(&draw.args.id)
            .ok_or(HostError::UnknownHandle { kind: "buffer", id: draw.args.id })?;
        let args = (args_bytes.len() == 20).then(|| {
            let words: Vec<u32> = bytemuck::pod_collect_to_vec(args_bytes.as_slice());
            [words[0], words[1], words[2], words[3], words[4]]
        });

        self.calls.push(HostCall::DrawIndirect {
            material: draw.material,
            submesh: draw.submesh,
            bounds: draw.bounds,
            args_buffer: draw.args.id,
            args,
        });
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &HeadlessBuffer) -> Result<Vec<u8>, HostError> {
        let bytes = self
            .buffers
            .get(&buffer.id)
            .cloned()
            .ok_or(HostError::UnknownHandle { kind: "buffer", id: buffer.id })?;
        self.calls.push(HostCall::ReadBuffer { id: buffer.id });
        Ok(bytes)
    }
}
