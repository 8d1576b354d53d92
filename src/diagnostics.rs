/*
 * Diagnostics Module
 *
 * Optional observers for a running pipeline:
 * - DiagnosticsSink: receives a read-back snapshot of the agent buffer every
 *   N frames. Any FnMut(u64, &[AgentRecord]) closure is a sink.
 * - VelocityProbe: a ready-made sink that traces per-agent velocities
 * - FrameStats: fps, frame time and dispatch sizes shown in the UI
 */

use std::time::Duration;

use glam::Vec3;

use crate::agent::AgentRecord;
use crate::context::FrameReport;

pub trait DiagnosticsSink {
    fn observe(&mut self, frame: u64, agents: &[AgentRecord]);
}

impl<F> DiagnosticsSink for F
where
    F: FnMut(u64, &[AgentRecord]),
{
    fn observe(&mut self, frame: u64, agents: &[AgentRecord]) {
        self(frame, agents)
    }
}

#[derive(Debug, Default)]
pub struct VelocityProbe {
    frame: Option<u64>,
    velocities: Vec<Vec3>,
}

impl VelocityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    // Frame of the most recent snapshot
    pub fn frame(&self) -> Option<u64> {
        self.frame
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    pub fn mean_speed(&self) -> f32 {
        if self.velocities.is_empty() {
            return 0.0;
        }
        self.velocities.iter().map(|v| v.length()).sum::<f32>() / self.velocities.len() as f32
    }
}

impl DiagnosticsSink for VelocityProbe {
    fn observe(&mut self, frame: u64, agents: &[AgentRecord]) {
        self.velocities.clear();
        self.velocities.extend(agents.iter().map(AgentRecord::velocity));
        self.frame = Some(frame);

        for (index, velocity) in self.velocities.iter().enumerate() {
            tracing::trace!(frame, index, x = velocity.x, y = velocity.y, z = velocity.z, "agent velocity");
        }
        tracing::debug!(frame, agents = agents.len(), mean_speed = self.mean_speed(), "velocity snapshot");
    }
}

// Per-frame numbers displayed in the UI
#[derive(Clone, Debug, Default)]
pub struct FrameStats {
    pub fps: f32,
    pub frame_time: Duration,
    pub frames_submitted: u64,
    pub frames_skipped: u64,
    pub last_groups: [u32; 3],
    pub last_instances: u32,
}

impl FrameStats {
    pub fn record_timing(&mut self, fps: f32, frame_time: Duration) {
        self.fps = fps;
        self.frame_time = frame_time;
    }

    pub fn record(&mut self, report: FrameReport) {
        match report {
            FrameReport::Submitted { groups, instances } => {
                self.frames_submitted += 1;
                self.last_groups = groups;
                self.last_instances = instances;
            }
            FrameReport::Skipped => self.frames_skipped += 1,
        }
    }

    pub fn frame_time_ms(&self) -> f64 {
        self.frame_time.as_secs_f64() * 1000.0
    }
}
