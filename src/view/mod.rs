//! The two contracts between the core and whatever displays it.
//!
//! - [`camera`]: turn a screen pixel into a world-space [`Ray`]
//! - [`render`]: hand vertex/index buffers and draw instances to a
//!   [`RenderSink`]

pub mod camera;
pub mod render;

pub use camera::{unproject_ray, OrbitCamera, Ray};
pub use render::{
    submit, BufferDirty, DrawInstance, InstanceUniforms, LightParams, MeshBuffers, RecordingSink,
    RenderSink, RenderVertex, FRAMES_IN_FLIGHT,
};
