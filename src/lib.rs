/*
 * Flock Indirect - Module Definitions
 *
 * GPU-driven agent simulation rendered through one indirect instanced draw.
 * The core (agent records, population, argument block, buffer lifecycle and
 * the per-frame pipeline) is host-agnostic behind the GpuHost trait. The
 * headless host backs tests and benchmarks; the wgpu host and the nannou
 * modules make up the viewer.
 */

// Re-export key components for easier access
pub use agent::{record_size, AgentRecord};
pub use args::{build_args, IndirectDrawArgs};
pub use bounds::Bounds;
pub use buffers::ManagedBuffer;
pub use config::AppConfig;
pub use context::{dispatch_groups, FrameReport, PipelineAssets, SimulationContext};
pub use diagnostics::{DiagnosticsSink, FrameStats, VelocityProbe};
pub use error::{ConfigError, HostError, PipelineError};
pub use headless::HeadlessHost;
pub use host::GpuHost;
pub use params::{FlockParameters, HandParameters};
pub use pipeline::{IndirectPipeline, PipelineState};
pub use population::FollowerSpan;
pub use simulation::AgentSimulation;

// Define modules
pub mod agent;
pub mod app;
pub mod args;
pub mod bounds;
pub mod buffers;
pub mod camera;
pub mod config;
pub mod context;
pub mod culling;
pub mod diagnostics;
pub mod error;
pub mod headless;
pub mod host;
pub mod input;
pub mod mesh;
pub mod params;
pub mod pipeline;
pub mod population;
pub mod simulation;
pub mod ui;
pub mod wgpu_host;

// Constants
pub const WORKGROUP_SIZE: u32 = 64;
pub const KERNEL_ENTRY_POINT: &str = "cs_main";
pub const PROPERTIES_SLOT: &str = "properties";
