/*
 * Population Module
 *
 * Builds the initial agent records uploaded once at setup.
 *
 * Flock populations are split into two ordered segments:
 * 1. Leaders: larger, with hues swept evenly across the leader count
 * 2. Followers: smaller, with cool blue/violet tones
 *
 * With the legacy follower span the follower loop stops at
 * population - leader_count, so the last leader_count records stay zeroed.
 * That boundary is kept as-is and reported with a warning; FollowerSpan::Full
 * fills the tail as well.
 *
 * Hand-avatar populations are uniform: large, black and motionless.
 */

use std::ops::Range;

use glam::{Mat4, Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{hsv_to_rgba, AgentRecord};

pub const LEADER_SCALE: f32 = 0.2;
pub const FOLLOWER_SCALE: f32 = 0.1;
pub const HAND_AVATAR_SCALE: f32 = 5.0;
pub const MAX_INITIAL_SPEED: f32 = 0.2;
pub const FOLLOWER_HUE: Range<f32> = 0.65..0.8;
pub const FOLLOWER_SATURATION: Range<f32> = 0.4..0.6;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowerSpan {
    // Followers fill [leaders, population - leaders)
    #[default]
    Legacy,
    // Followers fill [leaders, population)
    Full,
}

// Leader and follower index ranges for a population
pub fn segments(population: usize, leader_count: usize, span: FollowerSpan) -> (Range<usize>, Range<usize>) {
    let leaders = leader_count.min(population);
    let follower_end = match span {
        FollowerSpan::Legacy => population.saturating_sub(leaders),
        FollowerSpan::Full => population,
    };

    (0..leaders, leaders..follower_end.max(leaders))
}

// Records the initializer leaves zeroed
pub fn unfilled_tail(population: usize, leader_count: usize, span: FollowerSpan) -> Range<usize> {
    let (leaders, followers) = segments(population, leader_count, span);
    let filled_to = leaders.end.max(followers.end);
    filled_to..population
}

pub fn initialize_flock<R: Rng + ?Sized>(
    population: usize,
    leader_count: usize,
    range: f32,
    span: FollowerSpan,
    rng: &mut R,
) -> Vec<AgentRecord> {
    if leader_count > population {
        tracing::warn!(
            leader_count,
            population,
            "leader count exceeds population, clamping"
        );
    }

    let mut records = vec![AgentRecord::default(); population];
    let (leaders, followers) = segments(population, leader_count, span);
    let leader_total = leaders.len();

    for i in leaders {
        let transform = random_transform(rng, range, LEADER_SCALE);
        let color = hsv_to_rgba(i as f32 * (1.0 / leader_total as f32), 1.0, 1.0);
        records[i] = AgentRecord::new(transform, color, random_velocity(rng));
    }

    for i in followers {
        let transform = random_transform(rng, range, FOLLOWER_SCALE);
        let color = hsv_to_rgba(
            rng.gen_range(FOLLOWER_HUE),
            rng.gen_range(FOLLOWER_SATURATION),
            1.0,
        );
        records[i] = AgentRecord::new(transform, color, random_velocity(rng));
    }

    let gap = unfilled_tail(population, leader_count, span);
    if !gap.is_empty() {
        tracing::warn!(
            start = gap.start,
            end = gap.end,
            "follower span leaves trailing agent records zeroed"
        );
    }

    tracing::debug!(population, leaders = leader_total, "initialized flock population");
    records
}

pub fn initialize_hand_avatars<R: Rng + ?Sized>(count: usize, range: f32, rng: &mut R) -> Vec<AgentRecord> {
    (0..count)
        .map(|_| {
            let transform = random_transform(rng, range, HAND_AVATAR_SCALE);
            AgentRecord::new(transform, [0.0, 0.0, 0.0, 1.0], Vec3::ZERO)
        })
        .collect()
}

// Position inside the range cube, whole-degree Euler rotation, uniform scale
fn random_transform<R: Rng + ?Sized>(rng: &mut R, range: f32, scale: f32) -> Mat4 {
    let half = range / 2.0;
    let position = Vec3::new(
        symmetric(rng, half),
        symmetric(rng, half),
        symmetric(rng, half),
    );

    let x = (rng.gen_range(-180..180) as f32).to_radians();
    let y = (rng.gen_range(-180..180) as f32).to_radians();
    let z = (rng.gen_range(-180..180) as f32).to_radians();
    // Z first, then X, then Y
    let rotation = Quat::from_rotation_y(y) * Quat::from_rotation_x(x) * Quat::from_rotation_z(z);

    Mat4::from_scale_rotation_translation(Vec3::splat(scale), rotation, position)
}

fn random_velocity<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    Vec3::new(
        symmetric(rng, MAX_INITIAL_SPEED),
        symmetric(rng, MAX_INITIAL_SPEED),
        symmetric(rng, MAX_INITIAL_SPEED),
    )
}

// Uniform in [-half, half); a degenerate range yields 0
fn symmetric<R: Rng + ?Sized>(rng: &mut R, half: f32) -> f32 {
    if half > 0.0 {
        rng.gen_range(-half..half)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::rgba_hue;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0x5EED)
    }

    #[test]
    fn legacy_segments_leave_a_tail() {
        let (leaders, followers) = segments(128, 27, FollowerSpan::Legacy);
        assert_eq!(leaders, 0..27);
        assert_eq!(followers, 27..101);
        assert_eq!(unfilled_tail(128, 27, FollowerSpan::Legacy), 101..128);
    }

    #[test]
    fn full_segments_cover_everything() {
        let (leaders, followers) = segments(128, 27, FollowerSpan::Full);
        assert_eq!(leaders, 0..27);
        assert_eq!(followers, 27..128);
        assert!(unfilled_tail(128, 27, FollowerSpan::Full).is_empty());
    }

    #[test]
    fn more_than_half_leaders_leaves_no_followers() {
        let (leaders, followers) = segments(40, 27, FollowerSpan::Legacy);
        assert_eq!(leaders, 0..27);
        assert!(followers.is_empty());
        assert_eq!(unfilled_tail(40, 27, FollowerSpan::Legacy), 27..40);
    }

    #[test]
    fn flock_of_128_with_27_leaders() {
        let records = initialize_flock(128, 27, 10.0, FollowerSpan::Legacy, &mut rng());
        assert_eq!(records.len(), 128);

        for (i, record) in records[..27].iter().enumerate() {
            assert!((record.uniform_scale() - LEADER_SCALE).abs() < 1e-5);
            let expected = i as f32 / 27.0;
            assert!((rgba_hue(record.color) - expected).abs() < 1e-4, "leader {i}");
            assert_eq!(record.color, hsv_to_rgba(i as f32 * (1.0 / 27.0), 1.0, 1.0));
        }

        for record in &records[27..101] {
            assert!((record.uniform_scale() - FOLLOWER_SCALE).abs() < 1e-5);
            let hue = rgba_hue(record.color);
            assert!(FOLLOWER_HUE.start - 1e-4 <= hue && hue < FOLLOWER_HUE.end + 1e-4);
        }

        assert!(records[101..].iter().all(AgentRecord::is_zeroed));
    }

    #[test]
    fn leader_count_above_population_is_clamped() {
        for span in [FollowerSpan::Legacy, FollowerSpan::Full] {
            let (leaders, followers) = segments(10, 27, span);
            assert_eq!(leaders, 0..10);
            assert!(followers.is_empty());
            assert!(unfilled_tail(10, 27, span).is_empty());

            let records = initialize_flock(10, 27, 10.0, span, &mut rng());
            assert_eq!(records.len(), 10);
            assert!(!records.iter().any(AgentRecord::is_zeroed));

            // Hue sweeps over the clamped count, not the requested one
            for (i, record) in records.iter().enumerate() {
                assert!((record.uniform_scale() - LEADER_SCALE).abs() < 1e-5);
                assert_eq!(record.color, hsv_to_rgba(i as f32 * (1.0 / 10.0), 1.0, 1.0));
            }
            assert!((rgba_hue(records[1].color) - 0.1).abs() < 1e-4);
        }
    }

    #[test]
    fn positions_and_velocities_stay_in_range() {
        let range = 10.0;
        let records = initialize_flock(500, 27, range, FollowerSpan::Full, &mut rng());
        for record in &records {
            let p = record.position();
            assert!(p.abs().max_element() <= range / 2.0);
            assert!(record.velocity().abs().max_element() <= MAX_INITIAL_SPEED);
        }
    }

    #[test]
    fn zero_population_yields_no_records() {
        let records = initialize_flock(0, 27, 10.0, FollowerSpan::Legacy, &mut rng());
        assert!(records.is_empty());
    }

    #[test]
    fn zero_range_places_everyone_at_the_origin() {
        let records = initialize_flock(10, 2, 0.0, FollowerSpan::Full, &mut rng());
        assert!(records.iter().all(|r| r.position() == Vec3::ZERO));
    }

    #[test]
    fn same_seed_same_population() {
        let a = initialize_flock(64, 8, 5.0, FollowerSpan::Legacy, &mut rng());
        let b = initialize_flock(64, 8, 5.0, FollowerSpan::Legacy, &mut rng());
        assert_eq!(a, b);
    }

    #[test]
    fn hand_avatars_are_large_black_and_still() {
        let records = initialize_hand_avatars(3, 10.0, &mut rng());
        assert_eq!(records.len(), 3);
        for record in &records {
            assert!((record.uniform_scale() - HAND_AVATAR_SCALE).abs() < 1e-4);
            assert_eq!(record.color, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(record.velocity(), Vec3::ZERO);
        }
    }
}
