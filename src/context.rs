/*
 * Simulation Context Module
 *
 * SimulationContext is everything a running pipeline owns: the kernel and
 * material handles, the bounding volume, the argument block and the two GPU
 * buffers. It is built once by setup() and consumed by step() each frame.
 * release() frees the buffers and the kernel; the material belongs to the
 * host and outlives any one context.
 *
 * step() is a plain function of the context and this frame's uniforms:
 * 1. push every uniform to the kernel
 * 2. dispatch ceil(population / 64) work-groups
 * 3. submit the indirect draw that reads the buffer the kernel just wrote
 */

use glam::Vec3;
use rand::Rng;

use crate::agent::record_size;
use crate::args::{build_args, IndirectDrawArgs, DRAW_SUBMESH};
use crate::bounds::Bounds;
use crate::buffers::ManagedBuffer;
use crate::error::{HostError, PipelineError};
use crate::host::{BufferKind, GpuHost, IndirectDraw, Stage, Uniform};
use crate::simulation::AgentSimulation;
use crate::{KERNEL_ENTRY_POINT, PROPERTIES_SLOT, WORKGROUP_SIZE};

// Assets the host supplies before setup
pub struct PipelineAssets<H: GpuHost> {
    pub mesh: H::Mesh,
    pub material: H::Material,
    pub shader: H::Shader,
}

pub struct SimulationContext<H: GpuHost> {
    pub kernel: H::Kernel,
    pub material: H::Material,
    pub bounds: Bounds,
    pub args: IndirectDrawArgs,
    pub agents: ManagedBuffer<H>,
    pub arguments: ManagedBuffer<H>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameReport {
    Skipped,
    Submitted { groups: [u32; 3], instances: u32 },
}

// Work-groups needed to cover `population` items, one axis only
pub fn dispatch_groups(population: u32) -> [u32; 3] {
    let groups = (population as u64 + WORKGROUP_SIZE as u64 - 1) / WORKGROUP_SIZE as u64;
    [groups as u32, 1, 1]
}

impl<H: GpuHost> SimulationContext<H> {
    pub fn setup<S, R>(
        host: &mut H,
        assets: &PipelineAssets<H>,
        simulation: &S,
        origin: Vec3,
        rng: &mut R,
    ) -> Result<Self, PipelineError>
    where
        S: AgentSimulation,
        R: Rng + ?Sized,
    {
        let bounds = Bounds::from_range(origin, simulation.range());
        let args = build_args(&assets.mesh, simulation.population())?;
        let kernel = host.find_kernel(&assets.shader, KERNEL_ENTRY_POINT)?;

        let mut arguments = ManagedBuffer::unallocated("indirect_args", BufferKind::IndirectArguments);
        let mut agents = ManagedBuffer::unallocated("properties", BufferKind::Structured);

        let filled = fill_buffers(
            host,
            &mut arguments,
            &mut agents,
            &args,
            simulation,
            kernel,
            assets.material,
            rng,
        );

        if let Err(err) = filled {
            agents.release(host);
            arguments.release(host);
            host.release_kernel(kernel);
            return Err(err);
        }

        Ok(Self {
            kernel,
            material: assets.material,
            bounds,
            args,
            agents,
            arguments,
        })
    }

    // Buffers first, then the kernel that was bound to them
    pub fn release(&mut self, host: &mut H) {
        self.agents.release(host);
        self.arguments.release(host);
        host.release_kernel(self.kernel);
    }
}

#[allow(clippy::too_many_arguments)]
fn fill_buffers<H, S, R>(
    host: &mut H,
    arguments: &mut ManagedBuffer<H>,
    agents: &mut ManagedBuffer<H>,
    args: &IndirectDrawArgs,
    simulation: &S,
    kernel: H::Kernel,
    material: H::Material,
    rng: &mut R,
) -> Result<(), PipelineError>
where
    H: GpuHost,
    S: AgentSimulation,
    R: Rng + ?Sized,
{
    *arguments = ManagedBuffer::allocate(
        host,
        "indirect_args",
        1,
        IndirectDrawArgs::byte_size(),
        BufferKind::IndirectArguments,
    )?;
    arguments.upload(host, std::slice::from_ref(args))?;

    let records = simulation.populate(rng);
    *agents = ManagedBuffer::allocate(
        host,
        "properties",
        records.len(),
        record_size(),
        BufferKind::Structured,
    )?;
    agents.upload(host, &records)?;

    // Kernel and renderer must see the very same buffer
    agents.bind(host, Stage::Compute(kernel), PROPERTIES_SLOT)?;
    agents.bind(host, Stage::Render(material), PROPERTIES_SLOT)?;
    Ok(())
}

pub fn step<H: GpuHost>(
    ctx: &SimulationContext<H>,
    host: &mut H,
    mesh: &H::Mesh,
    population: u32,
    uniforms: &[Uniform],
) -> Result<FrameReport, PipelineError> {
    host.set_uniforms(ctx.kernel, uniforms)?;

    let groups = dispatch_groups(population);
    host.dispatch(ctx.kernel, groups)?;

    let args = ctx
        .arguments
        .raw()
        .ok_or(HostError::Released(ctx.arguments.label()))?;
    host.draw_mesh_instanced_indirect(IndirectDraw {
        mesh,
        submesh: DRAW_SUBMESH,
        material: ctx.material,
        bounds: ctx.bounds,
        args,
    })?;

    Ok(FrameReport::Submitted {
        groups,
        instances: ctx.args.instance_count,
    })
}
