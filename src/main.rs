/*
 * Flock Indirect
 *
 * Viewer for the GPU flock. A compute kernel steers every agent each frame
 * and a single indirect instanced draw renders them straight from the
 * buffer the kernel wrote:
 * 1. Cohesion: steer towards the centre of nearby agents
 * 2. Alignment: match the heading of nearby agents
 * 3. Avoidance: push away from agents that come too close
 *
 * Set FLOCK_CONFIG to a JSON file to override the defaults and RUST_LOG to
 * control logging.
 */

use flock_indirect::app::{exit, model, update};
use tracing_subscriber::EnvFilter;

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    nannou::app(model).update(update).exit(exit).run();
}
