pub mod handle;
pub mod mesh;
pub mod registry;
pub mod texture;

pub use handle::Handle;
pub use mesh::{Aabb, MeshData, MAX_BONES};
pub use registry::Registry;
pub use texture::TextureData;
