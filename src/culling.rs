/*
 * Culling Module
 *
 * Whole-draw visibility. Each indirect draw carries one bounding volume for
 * its entire population; the renderer drops the draw when that volume lies
 * completely outside the camera frustum. Individual agents are never
 * culled on the CPU since their positions live on the GPU.
 */

use glam::{Mat4, Vec3, Vec4};

use crate::bounds::Bounds;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    // left, right, bottom, top, near, far; normals point inward
    planes: [Vec4; 6],
}

impl Frustum {
    // Gribb/Hartmann plane extraction for a 0..1 depth range
    pub fn from_view_projection(view_projection: Mat4) -> Self {
        let row = |i: usize| view_projection.row(i);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(normalize_plane);
        Self { planes }
    }

    pub fn intersects_bounds(&self, bounds: &Bounds) -> bool {
        let center = bounds.center();
        let extents = bounds.extents();

        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            // Projected radius of the box onto the plane normal
            let radius = extents.dot(normal.abs());
            normal.dot(center) + plane.w >= -radius
        })
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(point) + plane.w >= 0.0)
    }
}

fn normalize_plane(plane: Vec4) -> Vec4 {
    let length = plane.truncate().length();
    if length > 0.0 {
        plane / length
    } else {
        plane
    }
}
