/*
 * Simulation Parameters Module
 *
 * This module defines the parameter sets for the two pipeline variants:
 * - FlockParameters: the large leader/follower flock and its behaviour weights
 * - HandParameters: the small fixed hand-avatar population
 *
 * These are plain settable fields. Nothing here validates values; a zero
 * population simply draws nothing. Every field the kernel reads is pushed to
 * it on every frame, unchanged. Slider ranges for the UI live here too.
 */

use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;
use crate::host::Uniform;
use crate::population::FollowerSpan;

// Names of the kernel uniforms, in the order they are pushed
pub mod uniform_names {
    pub const POPULATION: &str = "population";
    pub const DELTA_TIME: &str = "delta_time";
    pub const NEIGHBOR_RADIUS: &str = "neighbor_radius";
    pub const AVOIDANCE_RADIUS: &str = "avoidance_radius";
    pub const MIN_DISTANCE: &str = "min_distance";
    pub const COHESION_WEIGHT: &str = "cohesion_weight";
    pub const ALIGNMENT_WEIGHT: &str = "alignment_weight";
    pub const AVOIDANCE_WEIGHT: &str = "avoidance_weight";
    pub const BOUNDS_SIZE: &str = "bounds_size";
    pub const LEADER_COUNT: &str = "leader_count";
    pub const COUNT: &str = "count";
}

use uniform_names::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockParameters {
    pub population: u32,
    pub leader_count: u32,
    pub range: f32,
    pub delta_time: f32,
    pub neighbor_radius: f32,
    // Cohesion
    pub cohesion_weight: f32,
    // Alignment
    pub alignment_weight: f32,
    // Avoidance
    pub avoidance_weight: f32,
    pub avoidance_radius: f32,
    pub min_distance: f32,
    pub follower_span: FollowerSpan,
}

impl Default for FlockParameters {
    fn default() -> Self {
        Self {
            population: 8192,
            leader_count: 27,
            range: 10.0,
            delta_time: 0.02,
            neighbor_radius: 1.0,
            cohesion_weight: 1.0,
            alignment_weight: 1.0,
            avoidance_weight: 1.5,
            avoidance_radius: 0.5,
            min_distance: 0.15,
            follower_span: FollowerSpan::Legacy,
        }
    }
}

impl FlockParameters {
    // Every kernel input, every frame; no dirty tracking
    pub fn uniforms(&self, bounds: &Bounds) -> Vec<Uniform> {
        vec![
            Uniform::uint(POPULATION, self.population),
            Uniform::float(DELTA_TIME, self.delta_time),
            Uniform::float(NEIGHBOR_RADIUS, self.neighbor_radius),
            Uniform::float(AVOIDANCE_RADIUS, self.avoidance_radius),
            Uniform::float(MIN_DISTANCE, self.min_distance),
            Uniform::float(COHESION_WEIGHT, self.cohesion_weight),
            Uniform::float(ALIGNMENT_WEIGHT, self.alignment_weight),
            Uniform::float(AVOIDANCE_WEIGHT, self.avoidance_weight),
            Uniform::vec3(BOUNDS_SIZE, bounds.size),
            Uniform::uint(LEADER_COUNT, self.leader_count),
        ]
    }

    // Get parameter ranges for UI sliders
    pub fn get_delta_time_range() -> std::ops::RangeInclusive<f32> {
        0.0..=0.1
    }

    pub fn get_weight_range() -> std::ops::RangeInclusive<f32> {
        0.0..=3.0
    }

    pub fn get_radius_range() -> std::ops::RangeInclusive<f32> {
        0.0..=5.0
    }

    pub fn get_min_distance_range() -> std::ops::RangeInclusive<f32> {
        0.0..=1.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandParameters {
    pub count: u32,
    pub range: f32,
}

impl Default for HandParameters {
    fn default() -> Self {
        Self { count: 2, range: 10.0 }
    }
}

impl HandParameters {
    pub fn uniforms(&self, bounds: &Bounds) -> Vec<Uniform> {
        vec![
            Uniform::uint(COUNT, self.count),
            Uniform::vec3(BOUNDS_SIZE, bounds.size),
        ]
    }
}
