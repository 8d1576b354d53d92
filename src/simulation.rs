/*
 * Simulation Module
 *
 * AgentSimulation ties a parameter set to the population it seeds and the
 * uniforms its kernel expects. The orchestrator is generic over it, so the
 * flock and the hand avatars share one pipeline with different configuration.
 */

use rand::Rng;

use crate::agent::AgentRecord;
use crate::bounds::Bounds;
use crate::host::Uniform;
use crate::params::{FlockParameters, HandParameters};
use crate::population::{initialize_flock, initialize_hand_avatars};

pub trait AgentSimulation {
    fn label(&self) -> &'static str;

    // Instance count for this frame's dispatch; also fixes the buffer length at setup
    fn population(&self) -> u32;

    fn range(&self) -> f32;

    fn populate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<AgentRecord>;

    fn uniforms(&self, bounds: &Bounds) -> Vec<Uniform>;
}

impl AgentSimulation for FlockParameters {
    fn label(&self) -> &'static str {
        "flock"
    }

    fn population(&self) -> u32 {
        self.population
    }

    fn range(&self) -> f32 {
        self.range
    }

    fn populate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<AgentRecord> {
        initialize_flock(
            self.population as usize,
            self.leader_count as usize,
            self.range,
            self.follower_span,
            rng,
        )
    }

    fn uniforms(&self, bounds: &Bounds) -> Vec<Uniform> {
        FlockParameters::uniforms(self, bounds)
    }
}

impl AgentSimulation for HandParameters {
    fn label(&self) -> &'static str {
        "hand_avatars"
    }

    fn population(&self) -> u32 {
        self.count
    }

    fn range(&self) -> f32 {
        self.range
    }

    fn populate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<AgentRecord> {
        initialize_hand_avatars(self.count as usize, self.range, rng)
    }

    fn uniforms(&self, bounds: &Bounds) -> Vec<Uniform> {
        HandParameters::uniforms(self, bounds)
    }
}
