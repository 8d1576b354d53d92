/*
 * Indirect Pipeline Module
 *
 * IndirectPipeline drives one simulated population through its lifetime:
 *
 *   Uninitialized --start()--> Running --stop()--> Stopped
 *
 * start() builds the SimulationContext once. frame() runs one step while
 * Running and reports Skipped in every other state. stop() releases both
 * buffers; after that the pipeline is inert and cannot be restarted. Hosts
 * wanting a fresh population build a new pipeline.
 *
 * A failed start releases whatever was already allocated and leaves the
 * pipeline Uninitialized.
 */

use glam::Vec3;
use rand::Rng;

use crate::agent::AgentRecord;
use crate::context::{step, FrameReport, PipelineAssets, SimulationContext};
use crate::diagnostics::DiagnosticsSink;
use crate::error::PipelineError;
use crate::host::GpuHost;
use crate::simulation::AgentSimulation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Running,
    Stopped,
}

enum Lifecycle<H: GpuHost> {
    Uninitialized,
    Running(SimulationContext<H>),
    Stopped,
}

struct Diagnostics {
    sink: Box<dyn DiagnosticsSink>,
    every_n_frames: u64,
}

pub struct IndirectPipeline<H: GpuHost, S: AgentSimulation> {
    assets: PipelineAssets<H>,
    settings: S,
    lifecycle: Lifecycle<H>,
    frames: u64,
    diagnostics: Option<Diagnostics>,
}

impl<H: GpuHost, S: AgentSimulation> IndirectPipeline<H, S> {
    pub fn new(assets: PipelineAssets<H>, settings: S) -> Self {
        Self {
            assets,
            settings,
            lifecycle: Lifecycle::Uninitialized,
            frames: 0,
            diagnostics: None,
        }
    }

    // Read the agent buffer back every `every_n_frames` submitted frames,
    // starting with the first. Zero is treated as one.
    pub fn with_diagnostics<D>(mut self, sink: D, every_n_frames: u64) -> Self
    where
        D: DiagnosticsSink + 'static,
    {
        self.diagnostics = Some(Diagnostics {
            sink: Box::new(sink),
            every_n_frames: every_n_frames.max(1),
        });
        self
    }

    pub fn state(&self) -> PipelineState {
        match self.lifecycle {
            Lifecycle::Uninitialized => PipelineState::Uninitialized,
            Lifecycle::Running(_) => PipelineState::Running,
            Lifecycle::Stopped => PipelineState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running(_))
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    // Tunables are read fresh every frame. The population fixes the buffer
    // length at start, so changing it afterwards only resizes the dispatch.
    pub fn settings_mut(&mut self) -> &mut S {
        &mut self.settings
    }

    pub fn assets(&self) -> &PipelineAssets<H> {
        &self.assets
    }

    pub fn context(&self) -> Option<&SimulationContext<H>> {
        match &self.lifecycle {
            Lifecycle::Running(ctx) => Some(ctx),
            _ => None,
        }
    }

    // Frames submitted since start
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn start<R: Rng + ?Sized>(
        &mut self,
        host: &mut H,
        origin: Vec3,
        rng: &mut R,
    ) -> Result<(), PipelineError> {
        match self.lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Running(_) => {
                tracing::warn!(pipeline = self.settings.label(), "start called while running, ignoring");
                return Ok(());
            }
            Lifecycle::Stopped => {
                tracing::warn!(pipeline = self.settings.label(), "start called after stop, ignoring");
                return Ok(());
            }
        }

        let ctx = SimulationContext::setup(host, &self.assets, &self.settings, origin, rng).map_err(|err| {
            tracing::error!(pipeline = self.settings.label(), error = %err, "pipeline setup failed");
            err
        })?;

        tracing::info!(
            pipeline = self.settings.label(),
            population = self.settings.population(),
            bytes = ctx.agents.byte_size(),
            index_count = ctx.args.index_count,
            "pipeline running"
        );

        self.frames = 0;
        self.lifecycle = Lifecycle::Running(ctx);
        Ok(())
    }

    pub fn frame(&mut self, host: &mut H) -> Result<FrameReport, PipelineError> {
        let Lifecycle::Running(ctx) = &self.lifecycle else {
            return Ok(FrameReport::Skipped);
        };

        let uniforms = self.settings.uniforms(&ctx.bounds);
        let report = step(ctx, host, &self.assets.mesh, self.settings.population(), &uniforms)?;

        let frame = self.frames;
        self.frames += 1;

        if let Some(diagnostics) = self.diagnostics.as_mut() {
            if frame % diagnostics.every_n_frames == 0 {
                if let Some(raw) = ctx.agents.raw() {
                    match host.read_buffer(raw) {
                        Ok(bytes) => {
                            let agents: Vec<AgentRecord> = bytemuck::pod_collect_to_vec(bytes.as_slice());
                            diagnostics.sink.observe(frame, &agents);
                        }
                        Err(err) => {
                            tracing::warn!(
                                pipeline = self.settings.label(),
                                frame,
                                error = %err,
                                "diagnostics read-back failed"
                            );
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    pub fn stop(&mut self, host: &mut H) {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(mut ctx) => {
                ctx.release(host);
                tracing::info!(pipeline = self.settings.label(), frames = self.frames, "pipeline stopped");
            }
            Lifecycle::Uninitialized => {
                self.lifecycle = Lifecycle::Uninitialized;
            }
            Lifecycle::Stopped => {}
        }
    }
}

impl<H: GpuHost, S: AgentSimulation> Drop for IndirectPipeline<H, S> {
    fn drop(&mut self) {
        if self.is_running() {
            tracing::warn!(
                pipeline = self.settings.label(),
                "pipeline dropped while running; gpu buffers were not released"
            );
        }
    }
}
