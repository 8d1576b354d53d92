/*
 * Agent Module
 *
 * This module defines the AgentRecord struct, the fixed binary record shared by
 * the population initializer, the compute kernel and the instanced renderer.
 * Each record holds:
 * - a 4x4 transform (translate * rotate * scale, column-major)
 * - an RGBA color
 * - a velocity vector, the kernel's read/write simulation state
 *
 * All buffer sizing goes through record_size(); nothing else computes the
 * stride by hand.
 */

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AgentRecord {
    pub transform: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub velocity: [f32; 3],
}

const _: () = assert!(
    std::mem::size_of::<AgentRecord>() == record_size(),
    "size of AgentRecord does not match the kernel's record stride"
);

// Byte size of one record: matrix + color + velocity
pub const fn record_size() -> usize {
    std::mem::size_of::<f32>() * 4 * 4 // transform
        + std::mem::size_of::<f32>() * 4 // color
        + std::mem::size_of::<f32>() * 3 // velocity
}

impl AgentRecord {
    pub fn new(transform: Mat4, color: [f32; 4], velocity: Vec3) -> Self {
        Self {
            transform: transform.to_cols_array_2d(),
            color,
            velocity: velocity.to_array(),
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.transform)
    }

    pub fn position(&self) -> Vec3 {
        let w = self.transform[3];
        Vec3::new(w[0], w[1], w[2])
    }

    // Length of the x basis column; records are built with uniform scale
    pub fn uniform_scale(&self) -> f32 {
        let x = self.transform[0];
        Vec3::new(x[0], x[1], x[2]).length()
    }

    pub fn velocity(&self) -> Vec3 {
        Vec3::from(self.velocity)
    }

    // A record nobody wrote to is all zero bytes
    pub fn is_zeroed(&self) -> bool {
        bytemuck::bytes_of(self).iter().all(|&b| b == 0)
    }
}

// Converts HSV (all components in [0, 1]) to opaque RGBA.
// Hue wraps, so 1.0 maps to the same color as 0.0.
pub fn hsv_to_rgba(hue: f32, saturation: f32, value: f32) -> [f32; 4] {
    if saturation <= 0.0 {
        return [value, value, value, 1.0];
    }

    let h = hue.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;

    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * f);
    let t = value * (1.0 - saturation * (1.0 - f));

    let (r, g, b) = match sector as u32 % 6 {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };

    [r, g, b, 1.0]
}

// Recovers the hue in [0, 1) of an RGB color. Greys report 0.
pub fn rgba_hue(color: [f32; 4]) -> f32 {
    let [r, g, b, _] = color;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    if delta <= f32::EPSILON {
        return 0.0;
    }

    let sector = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    (sector / 6.0).rem_euclid(1.0)
}
