//! Render submission.
//!
//! The crate never talks to a graphics API. It hands flattened vertex and
//! index arrays plus a list of [`DrawInstance`]s to a [`RenderSink`], which
//! is whatever the host application draws with. Buffers are uploaded only
//! while a [`BufferDirty`] counter says the GPU copies are stale.

use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3};

/// Number of frames the host may have in flight at once.
///
/// Each in-flight frame owns its own copy of the buffers, so a geometry
/// change has to be uploaded this many times.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Vertex layout shared with the host: position then normal, tightly packed.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct RenderVertex {
    /// Position.
    pub position: [f32; 3],
    /// Unit normal.
    pub normal: [f32; 3],
}

impl RenderVertex {
    /// Size of one vertex in bytes.
    pub const STRIDE: usize = std::mem::size_of::<RenderVertex>();

    /// Narrow a position and normal to `f32`.
    pub fn new(position: &Point3<f64>, normal: &Vector3<f64>) -> Self {
        Self {
            position: [position.x as f32, position.y as f32, position.z as f32],
            normal: [normal.x as f32, normal.y as f32, normal.z as f32],
        }
    }
}

/// Borrowed vertex and index arrays ready for upload.
#[derive(Debug, Clone, Copy)]
pub struct MeshBuffers<'a> {
    /// Vertex array.
    pub vertices: &'a [RenderVertex],
    /// Triangle list indices into `vertices`.
    pub indices: &'a [u32],
}

impl<'a> MeshBuffers<'a> {
    /// Pair a vertex and an index array.
    pub fn new(vertices: &'a [RenderVertex], indices: &'a [u32]) -> Self {
        Self { vertices, indices }
    }

    /// The vertex array as raw bytes.
    pub fn vertex_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.vertices)
    }

    /// The index array as raw bytes.
    pub fn index_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.indices)
    }
}

/// A directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    /// Direction the light travels, normalized, in world space.
    pub direction: Vector3<f32>,
    /// Brightness multiplier.
    pub intensity: f32,
}

impl Default for LightParams {
    fn default() -> Self {
        Self {
            direction: Vector3::new(-0.3, -1.0, -0.5).normalize(),
            intensity: 1.0,
        }
    }
}

/// One draw call: a transform, colours and lighting for the uploaded buffers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawInstance {
    /// Mesh to world transform.
    pub model: Matrix4<f64>,
    /// Triangle fill colour.
    pub fill_color: [f32; 4],
    /// Colour of the edge overlay, `None` to draw filled triangles only.
    pub wireframe_color: Option<[f32; 4]>,
    /// Light for the fill.
    pub light: LightParams,
}

impl DrawInstance {
    /// A filled instance with the default light and no wireframe.
    pub fn new(model: Matrix4<f64>, fill_color: [f32; 4]) -> Self {
        Self {
            model,
            fill_color,
            wireframe_color: None,
            light: LightParams::default(),
        }
    }

    /// Add an edge overlay.
    pub fn with_wireframe(mut self, color: [f32; 4]) -> Self {
        self.wireframe_color = Some(color);
        self
    }

    /// Replace the light.
    pub fn with_light(mut self, light: LightParams) -> Self {
        self.light = light;
        self
    }

    /// Pack this instance for a uniform buffer.
    pub fn uniforms(&self) -> InstanceUniforms {
        let m = self.model.cast::<f32>();
        let mut model = [[0.0f32; 4]; 4];
        for (c, column) in model.iter_mut().enumerate() {
            for (r, value) in column.iter_mut().enumerate() {
                *value = m[(r, c)];
            }
        }
        InstanceUniforms {
            model,
            fill_color: self.fill_color,
            wireframe_color: self.wireframe_color.unwrap_or([0.0; 4]),
            light_dir: self.light.direction.into(),
            light_intensity: self.light.intensity,
        }
    }
}

/// GPU-ready layout of a [`DrawInstance`]. The model matrix is column-major.
///
/// A zero wireframe alpha means no overlay.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceUniforms {
    /// Model matrix, one array per column.
    pub model: [[f32; 4]; 4],
    /// Fill colour.
    pub fill_color: [f32; 4],
    /// Edge colour.
    pub wireframe_color: [f32; 4],
    /// Light direction.
    pub light_dir: [f32; 3],
    /// Light intensity.
    pub light_intensity: f32,
}

/// Host-side renderer.
pub trait RenderSink {
    /// Replace the buffers for the object being submitted.
    fn upload(&mut self, buffers: &MeshBuffers<'_>);

    /// Draw `index_count` indices of the current buffers.
    fn draw(&mut self, index_count: usize, instance: &DrawInstance);
}

/// Counts how many more frames need a fresh upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDirty {
    frames_in_flight: usize,
    remaining: usize,
}

impl BufferDirty {
    /// A counter that starts dirty.
    pub fn new(frames_in_flight: usize) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            frames_in_flight,
            remaining: frames_in_flight,
        }
    }

    /// Geometry changed; every in-flight frame needs the new buffers.
    pub fn mark(&mut self) {
        self.remaining = self.frames_in_flight;
    }

    /// Whether an upload is still pending.
    pub fn is_dirty(&self) -> bool {
        self.remaining > 0
    }

    /// Consume one pending upload. Returns whether an upload is due.
    pub fn take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

impl Default for BufferDirty {
    fn default() -> Self {
        Self::new(FRAMES_IN_FLIGHT)
    }
}

/// Upload `buffers` if they are dirty, then issue one draw per instance.
///
/// Returns whether an upload happened.
pub fn submit(
    sink: &mut dyn RenderSink,
    dirty: &mut BufferDirty,
    buffers: &MeshBuffers<'_>,
    instances: &[DrawInstance],
) -> bool {
    let uploaded = dirty.take();
    if uploaded {
        sink.upload(buffers);
    }
    for instance in instances {
        sink.draw(buffers.indices.len(), instance);
    }
    uploaded
}

/// A sink that only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Vertex and index counts of each upload.
    pub uploads: Vec<(usize, usize)>,
    /// Index count and instance of each draw.
    pub draws: Vec<(usize, DrawInstance)>,
    /// Total bytes uploaded.
    pub bytes: usize,
}

impl RenderSink for RecordingSink {
    fn upload(&mut self, buffers: &MeshBuffers<'_>) {
        self.uploads.push((buffers.vertices.len(), buffers.indices.len()));
        self.bytes += buffers.vertex_bytes().len() + buffers.index_bytes().len();
    }

    fn draw(&mut self, index_count: usize, instance: &DrawInstance) {
        self.draws.push((index_count, *instance));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> (Vec<RenderVertex>, Vec<u32>) {
        let n = Vector3::z();
        let vertices = vec![
            RenderVertex::new(&Point3::new(0.0, 0.0, 0.0), &n),
            RenderVertex::new(&Point3::new(1.0, 0.0, 0.0), &n),
            RenderVertex::new(&Point3::new(0.0, 1.0, 0.0), &n),
        ];
        (vertices, vec![0, 1, 2])
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(RenderVertex::STRIDE, 24);
        let v = RenderVertex::new(&Point3::new(1.0, 2.0, 3.0), &Vector3::y());
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&v));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_uploads_once_per_frame_in_flight() {
        let (vertices, indices) = triangle();
        let buffers = MeshBuffers::new(&vertices, &indices);
        let instances = [DrawInstance::new(Matrix4::identity(), [1.0; 4])];
        let mut sink = RecordingSink::default();
        let mut dirty = BufferDirty::new(2);

        assert!(submit(&mut sink, &mut dirty, &buffers, &instances));
        assert!(submit(&mut sink, &mut dirty, &buffers, &instances));
        assert!(!submit(&mut sink, &mut dirty, &buffers, &instances));
        assert_eq!(sink.uploads, vec![(3, 3), (3, 3)]);
        assert_eq!(sink.draws.len(), 3);
        assert_eq!(sink.bytes, 2 * (3 * 24 + 3 * 4));

        dirty.mark();
        assert!(dirty.is_dirty());
        submit(&mut sink, &mut dirty, &buffers, &[]);
        assert_eq!(sink.uploads.len(), 3);
    }

    #[test]
    fn test_instance_uniforms() {
        let model = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let instance = DrawInstance::new(model, [0.5, 0.5, 0.5, 1.0]).with_wireframe([0.0, 0.0, 0.0, 1.0]);
        let uniforms = instance.uniforms();
        // Column-major: translation in the last column
        assert_eq!(uniforms.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniforms.wireframe_color[3], 1.0);
        assert!((Vector3::from(uniforms.light_dir).norm() - 1.0).abs() < 1e-6);

        let plain = DrawInstance::new(model, [1.0; 4]).uniforms();
        assert_eq!(plain.wireframe_color, [0.0; 4]);
    }

    #[test]
    fn test_dirty_counter_floor() {
        let mut dirty = BufferDirty::new(0);
        assert!(dirty.take());
        assert!(!dirty.take());
    }
}
