use crate::error::InitError;
use crate::particle_store::{current_render_buffer, ParticleStore};
use crate::provider::{
    BufferDesc, BufferRole, DrawDesc, GpuProvider, LoadMode, RenderProgramDesc, StepMode,
    VertexAttribute, VertexLayout,
};

// The shared boid shape: one triangle in local coordinates, pointing up.
pub const SHAPE_VERTICES: [f32; 6] = [-0.01, -0.02, 0.01, -0.02, 0.00, 0.02];

const PARTICLE_ATTRIBUTES: [VertexAttribute; 2] = [
    // Particle position.
    VertexAttribute {
        offset: 0,
        shader_location: 0,
    },
    // Particle velocity.
    VertexAttribute {
        offset: 2 * 4,
        shader_location: 1,
    },
];

const SHAPE_ATTRIBUTES: [VertexAttribute; 1] = [VertexAttribute {
    offset: 0,
    shader_location: 2,
}];

/// Vertex buffer layouts in binding order: the particle generation stepped
/// per instance, then the shape stepped per vertex.
pub fn vertex_layouts() -> [VertexLayout<'static>; 2] {
    [
        VertexLayout {
            array_stride: std::mem::size_of::<crate::particle::Particle>() as u64,
            step_mode: StepMode::Instance,
            attributes: &PARTICLE_ATTRIBUTES,
        },
        VertexLayout {
            array_stride: 2 * 4,
            step_mode: StepMode::Vertex,
            attributes: &SHAPE_ATTRIBUTES,
        },
    ]
}

/// Draws one triangle per particle from the generation computed this frame.
pub struct RenderStage<P: GpuProvider> {
    pipeline: P::RenderProgram,
    vertex_buffer: P::Buffer,
}

impl<P: GpuProvider> RenderStage<P> {
    pub fn init(provider: &mut P) -> Result<Self, InitError> {
        let layouts = vertex_layouts();
        let pipeline = provider.compile_render_program(&RenderProgramDesc {
            label: "draw.wgsl",
            source: crate::include_shader!("draw.wgsl"),
            vertex_entry_point: "main_vs",
            fragment_entry_point: "main_fs",
            vertex_layouts: &layouts,
        })?;
        let vertex_buffer = provider.allocate_buffer(&BufferDesc {
            label: "Vertex Buffer",
            role: BufferRole::Shape,
            contents: bytemuck::cast_slice(&SHAPE_VERTICES),
        })?;
        Ok(RenderStage {
            pipeline,
            vertex_buffer,
        })
    }

    /// Records the single render pass of `frame`. Must come after the compute
    /// pass of the same frame in the same batch.
    pub fn record(
        &self,
        provider: &mut P,
        batch: &mut P::Batch,
        target: &P::Target,
        store: &ParticleStore<P>,
        frame: u64,
    ) {
        log::trace!(
            "Frame {}: drawing {} instances from buffer {}",
            frame,
            store.count(),
            current_render_buffer(frame)
        );
        let vertex_buffers = [store.render_buffer(frame), &self.vertex_buffer];
        provider.record_render_pass(
            batch,
            target,
            &self.pipeline,
            &DrawDesc {
                vertex_buffers: &vertex_buffers,
                vertex_count: 3,
                instance_count: store.count(),
                // Boids leave trails on the persistent surface contents.
                load: LoadMode::Load,
            },
        );
    }
}
