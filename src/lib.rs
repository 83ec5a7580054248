//! Render stage pipeline engine on top of `wgpu`.
//!
//! A [`Renderer`] runs an ordered list of render stages once per frame.
//! Stages find each other's framebuffers through relative
//! [`PipelineLink`]s, and in deferred mode one lighting stage is injected per
//! distinct lighting program. All GPU work goes through a
//! [`gpu::GraphicsBackend`]: [`gpu::WgpuBackend`] for a real device,
//! [`gpu::HeadlessBackend`] to record and inspect the command stream.

pub mod asset;
pub mod error;
pub mod gpu;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use error::{ErrorClass, RenderError, Result};
pub use renderer::{PipelineLink, Renderer, StageConfig, StageKind};
pub use settings::{RenderMode, RenderSettings};

/// Installs `env_logger` at `info` unless `RUST_LOG` says otherwise. Safe to
/// call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
