// scene/mod.rs

pub mod camera;
pub mod components;
pub mod events;
pub mod material;
pub mod scene;
pub mod transform;

pub use camera::Camera;
pub use components::{
    DirectionalLight, Light, MeshComponent, Name, ObjectKind, Parent, PointLight, SpotLight,
    TransformComponent,
};
pub use events::SceneEvent;
pub use material::Material;
pub use scene::{Drawable, Scene};
pub use transform::Transform;
