/*
 * Bounds Module
 *
 * Axis-aligned bounding volume handed to the renderer with every indirect
 * draw. It is built once, when a pipeline starts, from the host's world
 * position and the configured spatial range.
 */

use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub center: [f32; 3],
    pub size: [f32; 3],
}

impl Bounds {
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self {
            center: center.to_array(),
            size: size.to_array(),
        }
    }

    // Agents spawn inside range/2 of the origin; the volume gets one unit of slack
    pub fn from_range(origin: Vec3, range: f32) -> Self {
        Self::new(origin, Vec3::splat(range + 1.0))
    }

    pub fn center(&self) -> Vec3 {
        Vec3::from(self.center)
    }

    pub fn size(&self) -> Vec3 {
        Vec3::from(self.size)
    }

    pub fn extents(&self) -> Vec3 {
        self.size() * 0.5
    }

    pub fn min(&self) -> Vec3 {
        self.center() - self.extents()
    }

    pub fn max(&self) -> Vec3 {
        self.center() + self.extents()
    }

    pub fn contains(&self, point: Vec3) -> bool {
        let (min, max) = (self.min(), self.max());
        point.cmpge(min).all() && point.cmple(max).all()
    }
}
