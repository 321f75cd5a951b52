//! The execution provider seam.
//!
//! Everything that actually touches a GPU (buffer allocation, program
//! compilation, command recording, submission and presentation) sits behind
//! [`GpuProvider`]. The simulation core only decides *what* to allocate,
//! which bind group to select and in which order passes are recorded.
//!
//! Handles are owned values released by `Drop`. Pass objects never escape
//! the `record_*` calls, so a pass can not outlive its recording.

use std::cell::Cell;

use crate::error::{ProviderError, SurfaceError};

/// What a buffer is used for. Providers map this to their own usage flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// Read-only simulation parameters, bound as a uniform.
    Parameters,
    /// A particle generation: compute storage and per-instance vertex data.
    Particles,
    /// Per-vertex shape data shared by every instance.
    Shape,
}

pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub role: BufferRole,
    pub contents: &'a [u8],
}

pub struct ComputeProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub entry_point: &'a str,
}

/// One attribute of a vertex buffer, always two packed f32s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub offset: u64,
    pub shader_location: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexLayout<'a> {
    pub array_stride: u64,
    pub step_mode: StepMode,
    pub attributes: &'a [VertexAttribute],
}

pub struct RenderProgramDesc<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub vertex_entry_point: &'a str,
    pub fragment_entry_point: &'a str,
    pub vertex_layouts: &'a [VertexLayout<'a>],
}

/// A bind group slot. Buffers are always bound whole.
pub struct Binding<'a, B> {
    pub slot: u32,
    pub buffer: &'a B,
}

/// What the render pass does with the existing target contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Load,
    Clear,
}

pub struct DrawDesc<'a, B> {
    pub vertex_buffers: &'a [&'a B],
    pub vertex_count: u32,
    pub instance_count: u32,
    pub load: LoadMode,
}

/// Completion signal for one submitted batch.
///
/// Returned once the queue has accepted the batch. The signal fires when the
/// GPU has finished executing it.
pub struct Submission {
    done: crossbeam_channel::Receiver<()>,
    // Latched once the signal arrived or the provider dropped its sender.
    complete: Cell<bool>,
}

impl Submission {
    pub fn new(done: crossbeam_channel::Receiver<()>) -> Self {
        Submission {
            done,
            complete: Cell::new(false),
        }
    }

    /// A submission whose work is already known to be finished.
    pub fn completed() -> Self {
        let (sender, done) = crossbeam_channel::bounded(1);
        let _ = sender.send(());
        Submission::new(done)
    }

    pub fn is_complete(&self) -> bool {
        if !self.complete.get() {
            match self.done.try_recv() {
                Ok(()) | Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    self.complete.set(true)
                }
                Err(crossbeam_channel::TryRecvError::Empty) => {}
            }
        }
        self.complete.get()
    }

    /// Blocks until the GPU reports the batch finished. A provider that
    /// drops its side of the channel counts as finished.
    pub fn wait(&self) {
        if !self.complete.get() {
            let _ = self.done.recv();
            self.complete.set(true);
        }
    }
}

pub trait GpuProvider {
    type Buffer;
    type BindGroup;
    type ComputeProgram;
    type RenderProgram;
    type Batch;
    type Target;

    fn allocate_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, ProviderError>;

    fn compile_compute_program(
        &mut self,
        desc: &ComputeProgramDesc<'_>,
    ) -> Result<Self::ComputeProgram, ProviderError>;

    fn compile_render_program(
        &mut self,
        desc: &RenderProgramDesc<'_>,
    ) -> Result<Self::RenderProgram, ProviderError>;

    /// Binds buffers against the layout of bind group 0 of `program`.
    fn create_bind_group(
        &mut self,
        label: &str,
        program: &Self::ComputeProgram,
        bindings: &[Binding<'_, Self::Buffer>],
    ) -> Result<Self::BindGroup, ProviderError>;

    /// Acquires the next presentable surface target.
    fn acquire_target(&mut self) -> Result<Self::Target, SurfaceError>;

    fn begin_batch(&mut self) -> Result<Self::Batch, ProviderError>;

    fn record_compute_pass(
        &mut self,
        batch: &mut Self::Batch,
        program: &Self::ComputeProgram,
        bind_group: &Self::BindGroup,
        workgroups_x: u32,
    );

    fn record_render_pass(
        &mut self,
        batch: &mut Self::Batch,
        target: &Self::Target,
        program: &Self::RenderProgram,
        draw: &DrawDesc<'_, Self::Buffer>,
    );

    /// Finishes the batch and hands it to the queue. Returns once the queue
    /// accepted it.
    fn submit(&mut self, batch: Self::Batch) -> Result<Submission, ProviderError>;

    /// Blocks until the GPU finished executing `submission`.
    fn wait(&mut self, submission: Submission) {
        submission.wait();
    }

    fn present(&mut self, target: Self::Target);

    /// Current drawable size of the window behind the surface.
    fn surface_size(&self) -> (u32, u32);

    /// Reconfigures the surface for a new window size.
    fn configure_surface(&mut self, width: u32, height: u32);
}
