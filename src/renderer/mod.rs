pub(crate) mod context;
pub mod framebuffer;
pub mod geometry;
mod internal;
pub mod invalidation;
pub mod lights;
pub mod link;
pub mod materials;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod stage;
pub mod stats;
pub mod uniforms;
pub mod vertex;

pub use framebuffer::Framebuffer;
pub use geometry::{GeometryBuffers, GeometryStore, GeometryUpload};
pub use invalidation::{FlushPlan, Invalidations};
pub use lights::{LightKind, LightSlotTable, LightTables};
pub use link::PipelineLink;
pub use materials::{MaterialBinding, MaterialBindings};
pub use pipeline::Pipeline;
pub use renderer::Renderer;
pub use shader::ShaderProgram;
pub use stage::{
    RenderStage, StageClass, StageConfig, StageFlags, StageHandle, StageKind, StageLinks,
    StageStatus, Viewport,
};
pub use stats::FrameStats;
pub use uniforms::{CameraUniform, ObjectData};
pub use vertex::Vertex;
