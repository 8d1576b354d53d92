/*
 * wgpu Host Module
 *
 * GpuHost on top of nannou's wgpu device and queue.
 *
 * - Structured buffers are STORAGE | COPY_DST | COPY_SRC, argument buffers
 *   INDIRECT | COPY_DST
 * - A kernel is a compute pipeline over one uniform block (binding 0) and
 *   the properties storage buffer (binding 1)
 * - A material is a render pipeline reading a camera block (binding 0) and
 *   the same properties buffer (binding 1), indexed by instance
 *
 * Dispatches are encoded and submitted immediately. Indirect draws are
 * queued and encoded into the window frame by encode_draws() during view,
 * which nannou submits after update(), so every dispatch lands on the queue
 * before the draw that reads its output. Draws stay queued until the next
 * begin_frame().
 */

use std::cell::Cell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use glam::Mat4;
use nannou::prelude::Frame;
use nannou::wgpu;

use crate::bounds::Bounds;
use crate::culling::Frustum;
use crate::error::HostError;
use crate::host::{BufferDesc, BufferKind, GpuHost, HostStage, IndirectDraw, Stage, Uniform, UniformValue};
use crate::mesh::{MeshAsset, MeshData, SubMesh};
use crate::PROPERTIES_SLOT;

// wgpu rejects zero-sized bindings and unaligned copies
const MIN_BUFFER_SIZE: u64 = 4;
const UNIFORM_ALIGN: usize = 16;

#[derive(Debug, PartialEq, Eq)]
pub struct WgpuBuffer {
    id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KernelId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialId(usize);

pub struct WgpuShader {
    module: wgpu::ShaderModule,
    entry_points: Vec<&'static str>,
    uniform_size: u64,
}

#[derive(Clone)]
pub struct WgpuMesh {
    vertices: Arc<wgpu::Buffer>,
    indices: Arc<wgpu::Buffer>,
    submeshes: Vec<SubMesh>,
}

impl MeshAsset for WgpuMesh {
    fn submesh(&self, index: usize) -> Option<SubMesh> {
        self.submeshes.get(index).copied()
    }

    fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }
}

struct BufferEntry {
    buffer: wgpu::Buffer,
    len: u64,
    kind: BufferKind,
}

struct KernelSlot {
    entry_point: String,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    uniform_size: u64,
    properties: Option<u64>,
    bind_group: Option<wgpu::BindGroup>,
}

struct MaterialSlot {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    properties: Option<u64>,
    bind_group: Option<wgpu::BindGroup>,
}

struct QueuedDraw {
    material: MaterialId,
    mesh: WgpuMesh,
    args: u64,
    bounds: Bounds,
}

pub struct WgpuHost {
    device_queue: Arc<wgpu::DeviceQueuePair>,
    buffers: HashMap<u64, BufferEntry>,
    // Released kernels leave a hole that the next find_kernel reuses
    kernels: Vec<Option<KernelSlot>>,
    materials: Vec<MaterialSlot>,
    camera: wgpu::Buffer,
    view_projection: Mat4,
    queued: Vec<QueuedDraw>,
    next_buffer: u64,
    culled_draws: Cell<u64>,
}

// Lays uniforms out in push order with WGSL uniform alignment:
// scalars on 4 bytes, vec3 on 16, whole block rounded up to 16.
pub fn pack_uniforms(uniforms: &[Uniform]) -> Vec<u8> {
    let mut bytes: Vec<u8> = Vec::new();

    for uniform in uniforms {
        let (align, field): (usize, &[u8]) = match &uniform.value {
            UniformValue::Uint(v) => (4, bytemuck::bytes_of(v)),
            UniformValue::Float(v) => (4, bytemuck::bytes_of(v)),
            UniformValue::Vec3(v) => (16, bytemuck::cast_slice(v)),
        };
        bytes.resize(align_to(bytes.len(), align), 0);
        bytes.extend_from_slice(field);
    }

    bytes.resize(align_to(bytes.len().max(1), UNIFORM_ALIGN), 0);
    bytes
}

pub fn uniform_block_size(uniforms: &[Uniform]) -> u64 {
    pack_uniforms(uniforms).len() as u64
}

fn align_to(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

impl WgpuHost {
    pub fn new(device_queue: Arc<wgpu::DeviceQueuePair>) -> Self {
        let camera = device_queue.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("flock_indirect-camera"),
            size: std::mem::size_of::<[f32; 16]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            device_queue,
            buffers: HashMap::new(),
            kernels: Vec::new(),
            materials: Vec::new(),
            camera,
            view_projection: Mat4::IDENTITY,
            queued: Vec::new(),
            next_buffer: 0,
            culled_draws: Cell::new(0),
        }
    }

    fn device(&self) -> &wgpu::Device {
        self.device_queue.device()
    }

    fn queue(&self) -> &wgpu::Queue {
        self.device_queue.queue()
    }

    pub fn load_compute_shader(
        &self,
        desc: &wgpu::ShaderModuleDescriptor,
        entry_points: &[&'static str],
        uniform_size: u64,
    ) -> WgpuShader {
        WgpuShader {
            module: self.device().create_shader_module(desc),
            entry_points: entry_points.to_vec(),
            uniform_size: uniform_size.max(UNIFORM_ALIGN as u64),
        }
    }

    pub fn create_material(
        &mut self,
        vertex: &wgpu::ShaderModuleDescriptor,
        fragment: &wgpu::ShaderModuleDescriptor,
        format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> MaterialId {
        let device = self.device_queue.device();
        let vs_mod = device.create_shader_module(vertex);
        let fs_mod = device.create_shader_module(fragment);

        let layout = wgpu::BindGroupLayoutBuilder::new()
            .uniform_buffer(wgpu::ShaderStages::VERTEX, false)
            .storage_buffer(wgpu::ShaderStages::VERTEX, false, true)
            .build(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("flock_indirect-material"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = wgpu::RenderPipelineBuilder::from_layout(&pipeline_layout, &vs_mod)
            .fragment_shader(&fs_mod)
            .color_format(format)
            .add_vertex_buffer::<[f32; 3]>(&wgpu::vertex_attr_array![0 => Float32x3])
            .sample_count(sample_count)
            .build(device);

        self.materials.push(MaterialSlot {
            pipeline,
            layout,
            properties: None,
            bind_group: None,
        });
        MaterialId(self.materials.len() - 1)
    }

    pub fn upload_mesh(&self, mesh: &MeshData) -> WgpuMesh {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.positions);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);

        let vertices = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("flock_indirect-vertices"),
            size: (vertex_bytes.len() as u64).max(MIN_BUFFER_SIZE),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let indices = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("flock_indirect-indices"),
            size: (index_bytes.len() as u64).max(MIN_BUFFER_SIZE),
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue().write_buffer(&vertices, 0, vertex_bytes);
        self.queue().write_buffer(&indices, 0, index_bytes);

        WgpuMesh {
            vertices: Arc::new(vertices),
            indices: Arc::new(indices),
            submeshes: mesh.submeshes.clone(),
        }
    }

    pub fn set_view_projection(&mut self, view_projection: Mat4) {
        self.view_projection = view_projection;
        self.device_queue
            .queue()
            .write_buffer(&self.camera, 0, bytemuck::cast_slice(&view_projection.to_cols_array()));
    }

    pub fn culled_draws(&self) -> u64 {
        self.culled_draws.get()
    }

    pub fn live_kernel_count(&self) -> usize {
        self.kernels.iter().flatten().count()
    }

    pub fn queued_draws(&self) -> usize {
        self.queued.len()
    }

    // Drops last frame's draws. Skipping this keeps re-drawing them, which
    // is how a paused simulation stays on screen.
    pub fn begin_frame(&mut self) {
        self.queued.clear();
    }

    // Records every queued draw into the frame; returns how many were encoded
    pub fn encode_draws(&self, frame: &Frame) -> usize {
        let frustum = Frustum::from_view_projection(self.view_projection);
        let (visible, culled): (Vec<&QueuedDraw>, Vec<&QueuedDraw>) = self
            .queued
            .iter()
            .partition(|draw| frustum.intersects_bounds(&draw.bounds));
        self.culled_draws.set(self.culled_draws.get() + culled.len() as u64);

        let mut encoder = frame.command_encoder();
        let mut render_pass = wgpu::RenderPassBuilder::new()
            .color_attachment(frame.texture_view(), |color| color.load_op(wgpu::LoadOp::Load))
            .begin(&mut encoder);

        let mut encoded = 0;
        for draw in visible {
            let Some(material) = self.materials.get(draw.material.0) else {
                continue;
            };
            let (Some(bind_group), Some(args)) = (material.bind_group.as_ref(), self.buffers.get(&draw.args)) else {
                continue;
            };

            render_pass.set_pipeline(&material.pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.set_vertex_buffer(0, draw.mesh.vertices.slice(..));
            render_pass.set_index_buffer(draw.mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed_indirect(&args.buffer, 0);
            encoded += 1;
        }

        encoded
    }

    fn kernel_bind_group(&self, slot: &KernelSlot, properties: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("flock_indirect-kernel"),
            layout: &slot.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: slot.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: properties.as_entire_binding(),
                },
            ],
        })
    }

    fn material_bind_group(&self, slot: &MaterialSlot, properties: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("flock_indirect-material"),
            layout: &slot.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: properties.as_entire_binding(),
                },
            ],
        })
    }

    fn buffer(&self, id: u64) -> Result<&BufferEntry, HostError> {
        self.buffers
            .get(&id)
            .ok_or(HostError::UnknownHandle { kind: "buffer", id })
    }

    fn kernel(&self, kernel: KernelId) -> Result<&KernelSlot, HostError> {
        self.kernels
            .get(kernel.0)
            .and_then(Option::as_ref)
            .ok_or(HostError::UnknownHandle { kind: "kernel", id: kernel.0 as u64 })
    }
}

impl GpuHost for WgpuHost {
    type Buffer = WgpuBuffer;
    type Kernel = KernelId;
    type Material = MaterialId;
    type Shader = WgpuShader;
    type Mesh = WgpuMesh;

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<WgpuBuffer, HostError> {
        let len = desc.byte_size();
        let usage = match desc.kind {
            BufferKind::Structured => {
                let limit = self.device().limits().max_storage_buffer_binding_size as u64;
                if len > limit {
                    return Err(HostError::Allocation {
                        label: desc.label,
                        bytes: len,
                        reason: format!("exceeds the device storage binding limit of {limit} bytes"),
                    });
                }
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC
            }
            BufferKind::IndirectArguments => wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::COPY_DST,
        };

        let buffer = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: len.max(MIN_BUFFER_SIZE),
            usage,
            mapped_at_creation: false,
        });

        let id = self.next_buffer;
        self.next_buffer += 1;
        self.buffers.insert(id, BufferEntry { buffer, len, kind: desc.kind });
        Ok(WgpuBuffer { id })
    }

    fn write_buffer(&mut self, buffer: &WgpuBuffer, bytes: &[u8]) -> Result<(), HostError> {
        let entry = self.buffer(buffer.id)?;
        if bytes.len() as u64 != entry.len {
            return Err(HostError::Backend(format!(
                "write of {} bytes into a {} byte buffer",
                bytes.len(),
                entry.len
            )));
        }

        if !bytes.is_empty() {
            self.queue().write_buffer(&entry.buffer, 0, bytes);
        }
        Ok(())
    }

    fn bind_buffer(
        &mut self,
        buffer: &WgpuBuffer,
        stage: HostStage<Self>,
        slot: &'static str,
    ) -> Result<(), HostError> {
        if slot != PROPERTIES_SLOT {
            return Err(HostError::UnknownSlot(slot.to_string()));
        }
        let entry = self.buffer(buffer.id)?;
        if entry.kind != BufferKind::Structured {
            return Err(HostError::Backend(format!("buffer {} is not a structured buffer", buffer.id)));
        }

        match stage {
            Stage::Compute(kernel) => {
                let bind_group = self.kernel_bind_group(self.kernel(kernel)?, &entry.buffer);
                if let Some(slot) = self.kernels.get_mut(kernel.0).and_then(Option::as_mut) {
                    slot.properties = Some(buffer.id);
                    slot.bind_group = Some(bind_group);
                }
            }
            Stage::Render(material) => {
                let slot = self
                    .materials
                    .get(material.0)
                    .ok_or(HostError::UnknownHandle { kind: "material", id: material.0 as u64 })?;
                let bind_group = self.material_bind_group(slot, &entry.buffer);
                let slot = &mut self.materials[material.0];
                slot.properties = Some(buffer.id);
                slot.bind_group = Some(bind_group);
            }
        }
        Ok(())
    }

    fn unbind_buffer(&mut self, buffer: &WgpuBuffer, stage: HostStage<Self>, slot: &'static str) {
        if slot != PROPERTIES_SLOT {
            return;
        }
        let (properties, bind_group) = match stage {
            Stage::Compute(kernel) => match self.kernels.get_mut(kernel.0).and_then(Option::as_mut) {
                Some(slot) => (&mut slot.properties, &mut slot.bind_group),
                None => return,
            },
            Stage::Render(material) => match self.materials.get_mut(material.0) {
                Some(slot) => (&mut slot.properties, &mut slot.bind_group),
                None => return,
            },
        };
        if *properties != Some(buffer.id) {
            return;
        }
        *properties = None;
        *bind_group = None;
    }

    fn destroy_buffer(&mut self, buffer: WgpuBuffer) {
        let Some(entry) = self.buffers.remove(&buffer.id) else {
            return;
        };
        entry.buffer.destroy();

        for slot in self.kernels.iter_mut().flatten().filter(|s| s.properties == Some(buffer.id)) {
            slot.properties = None;
            slot.bind_group = None;
        }
        for slot in self.materials.iter_mut().filter(|s| s.properties == Some(buffer.id)) {
            slot.properties = None;
            slot.bind_group = None;
        }
        self.queued.retain(|draw| draw.args != buffer.id);
    }

    fn find_kernel(&mut self, shader: &WgpuShader, entry_point: &str) -> Result<KernelId, HostError> {
        if !shader.entry_points.iter().any(|e| *e == entry_point) {
            return Err(HostError::KernelNotFound(entry_point.to_string()));
        }

        let device = self.device_queue.device();
        let layout = wgpu::BindGroupLayoutBuilder::new()
            .uniform_buffer(wgpu::ShaderStages::COMPUTE, false)
            .storage_buffer(wgpu::ShaderStages::COMPUTE, false, false)
            .build(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("flock_indirect-kernel"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("flock_indirect-kernel"),
            layout: Some(&pipeline_layout),
            module: &shader.module,
            entry_point,
        });
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("flock_indirect-uniforms"),
            size: shader.uniform_size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let slot = KernelSlot {
            entry_point: entry_point.to_string(),
            pipeline,
            layout,
            uniforms,
            uniform_size: shader.uniform_size,
            properties: None,
            bind_group: None,
        };
        let index = match self.kernels.iter().position(Option::is_none) {
            Some(free) => {
                self.kernels[free] = Some(slot);
                free
            }
            None => {
                self.kernels.push(Some(slot));
                self.kernels.len() - 1
            }
        };
        Ok(KernelId(index))
    }

    fn release_kernel(&mut self, kernel: KernelId) {
        if let Some(slot) = self.kernels.get_mut(kernel.0).and_then(Option::take) {
            slot.uniforms.destroy();
            tracing::debug!(kernel = kernel.0, entry_point = %slot.entry_point, "released compute kernel");
        }
    }

    fn set_uniforms(&mut self, kernel: KernelId, uniforms: &[Uniform]) -> Result<(), HostError> {
        let slot = self.kernel(kernel)?;
        let bytes = pack_uniforms(uniforms);
        if bytes.len() as u64 > slot.uniform_size {
            return Err(HostError::SizeMismatch {
                label: "uniforms",
                expected: slot.uniform_size,
                actual: bytes.len() as u64,
            });
        }

        self.queue().write_buffer(&slot.uniforms, 0, &bytes);
        Ok(())
    }

    fn dispatch(&mut self, kernel: KernelId, groups: [u32; 3]) -> Result<(), HostError> {
        let slot = self.kernel(kernel)?;
        let bind_group = slot.bind_group.as_ref().ok_or_else(|| {
            HostError::Backend(format!("kernel `{}` has no buffer bound to `{PROPERTIES_SLOT}`", slot.entry_point))
        })?;

        if groups.contains(&0) {
            return Ok(());
        }

        let mut encoder = self.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("flock_indirect-dispatch"),
        });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("flock_indirect-compute_pass"),
            });
            cpass.set_pipeline(&slot.pipeline);
            cpass.set_bind_group(0, bind_group, &[]);
            cpass.dispatch(groups[0], groups[1], groups[2]);
        }
        self.queue().submit(Some(encoder.finish()));
        Ok(())
    }

    fn draw_mesh_instanced_indirect(&mut self, draw: IndirectDraw<'_, Self>) -> Result<(), HostError> {
        let material = self
            .materials
            .get(draw.material.0)
            .ok_or(HostError::UnknownHandle { kind: "material", id: draw.material.0 as u64 })?;
        if material.bind_group.is_none() {
            return Err(HostError::Backend(format!(
                "material {} has no buffer bound to `{PROPERTIES_SLOT}`",
                draw.material.0
            )));
        }
        self.buffer(draw.args.id)?;

        self.queued.push(QueuedDraw {
            material: draw.material,
            mesh: draw.mesh.clone(),
            args: draw.args.id,
            bounds: draw.bounds,
        });
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &WgpuBuffer) -> Result<Vec<u8>, HostError> {
        let entry = self.buffer(buffer.id)?;
        if entry.len == 0 {
            return Ok(Vec::new());
        }

        let staging = self.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("flock_indirect-readback"),
            size: entry.len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device().create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("flock_indirect-readback"),
        });
        encoder.copy_buffer_to_buffer(&entry.buffer, 0, &staging, 0, entry.len);
        self.queue().submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let mapping = slice.map_async(wgpu::MapMode::Read);
        self.device().poll(wgpu::Maintain::Wait);

        let mut mapping = std::pin::pin!(mapping);
        match mapping.as_mut().poll(&mut Context::from_waker(Waker::noop())) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(err)) => return Err(HostError::Backend(format!("read-back failed: {err:?}"))),
            Poll::Pending => return Err(HostError::Backend("read-back did not complete".to_string())),
        }

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}
