//! A headless [`GpuProvider`] that executes recorded work on the CPU.
//!
//! Compute passes run [`flock_step`] over the bound buffers when their batch
//! is submitted, in recording order. Render passes produce no pixels; they
//! are logged together with the generation of the buffer they read, which
//! is what the double-buffering rules are about. Every handle reports its
//! release, so callers can check that nothing leaks or is freed twice.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::compute_stage::PARTICLES_PER_GROUP;
use crate::error::{ProviderError, SurfaceError};
use crate::particle::{flock_step, Particle};
use crate::provider::{
    Binding, BufferDesc, BufferRole, ComputeProgramDesc, DrawDesc, GpuProvider, LoadMode,
    RenderProgramDesc, Submission,
};
use crate::sim_params::SimParams;

#[derive(Debug, Default)]
struct ResourceCounts {
    created: Cell<usize>,
    released: Cell<usize>,
}

// Counts one live handle for as long as it exists.
#[derive(Debug)]
struct Tracked(Rc<ResourceCounts>);

impl Tracked {
    fn new(counts: &Rc<ResourceCounts>) -> Self {
        counts.created.set(counts.created.get() + 1);
        Tracked(counts.clone())
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.released.set(self.0.released.get() + 1);
    }
}

#[derive(Debug)]
struct Storage {
    bytes: Vec<u8>,
    // Bumped every time a compute pass writes this buffer.
    generation: u64,
}

#[derive(Debug)]
pub struct SoftBuffer {
    id: usize,
    label: String,
    role: BufferRole,
    storage: Rc<RefCell<Storage>>,
    _tracked: Tracked,
}

impl SoftBuffer {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    pub fn generation(&self) -> u64 {
        self.storage.borrow().generation
    }

    pub fn read_particles(&self) -> Vec<Particle> {
        bytemuck::pod_collect_to_vec(&self.storage.borrow().bytes)
    }
}

#[derive(Debug, Clone)]
struct BoundBuffer {
    id: usize,
    storage: Rc<RefCell<Storage>>,
}

#[derive(Debug)]
pub struct SoftBindGroup {
    params: BoundBuffer,
    src: BoundBuffer,
    dst: BoundBuffer,
    _tracked: Tracked,
}

#[derive(Debug)]
pub struct SoftComputeProgram {
    _tracked: Tracked,
}

#[derive(Debug)]
pub struct SoftRenderProgram {
    _tracked: Tracked,
}

#[derive(Debug)]
pub struct SoftTarget {
    index: u64,
}

#[derive(Debug)]
enum Command {
    Compute {
        params: BoundBuffer,
        src: BoundBuffer,
        dst: BoundBuffer,
        work_groups: u32,
    },
    Render {
        target: u64,
        buffer: BoundBuffer,
        vertex_count: u32,
        instance_count: u32,
        load: LoadMode,
    },
}

#[derive(Debug, Default)]
pub struct SoftBatch {
    commands: Vec<Command>,
}

/// One executed compute pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeRecord {
    pub batch: u64,
    pub src: usize,
    pub dst: usize,
    pub work_groups: u32,
}

/// One executed render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRecord {
    pub batch: u64,
    pub target: u64,
    pub buffer: usize,
    // Generation of `buffer` at the time the pass read it.
    pub generation: u64,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub load: LoadMode,
}

pub struct SoftwareProvider {
    counts: Rc<ResourceCounts>,
    next_buffer_id: usize,
    next_target: u64,
    submitted: u64,
    presented: u64,
    size: (u32, u32),
    configured: u32,
    compute_log: Vec<ComputeRecord>,
    render_log: Vec<RenderRecord>,
    acquire_failures: VecDeque<SurfaceError>,
    // An outdated or lost surface keeps failing until it is configured.
    stale: Option<SurfaceError>,
    submit_failure: Option<ProviderError>,
    failing_allocation: Option<String>,
}

impl SoftwareProvider {
    pub fn new(size: (u32, u32)) -> Self {
        SoftwareProvider {
            counts: Rc::new(ResourceCounts::default()),
            next_buffer_id: 0,
            next_target: 0,
            submitted: 0,
            presented: 0,
            size,
            configured: 0,
            compute_log: vec![],
            render_log: vec![],
            acquire_failures: VecDeque::new(),
            stale: None,
            submit_failure: None,
            failing_allocation: None,
        }
    }

    /// The next acquisitions fail with these errors, in order. `Outdated`
    /// and `Lost` keep failing until the surface is configured again.
    pub fn fail_acquisitions(&mut self, errors: impl IntoIterator<Item = SurfaceError>) {
        self.acquire_failures.extend(errors);
    }

    /// The next submission is rejected with `error`.
    pub fn fail_next_submit(&mut self, error: ProviderError) {
        self.submit_failure = Some(error);
    }

    /// Allocating a buffer with this label fails.
    pub fn fail_allocation_of(&mut self, label: &str) {
        self.failing_allocation = Some(label.to_string());
    }

    pub fn live_resources(&self) -> usize {
        self.counts.created.get() - self.counts.released.get()
    }

    pub fn created_resources(&self) -> usize {
        self.counts.created.get()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn configured(&self) -> u32 {
        self.configured
    }

    pub fn compute_log(&self) -> &[ComputeRecord] {
        &self.compute_log
    }

    pub fn render_log(&self) -> &[RenderRecord] {
        &self.render_log
    }

    fn bound(buffer: &SoftBuffer) -> BoundBuffer {
        BoundBuffer {
            id: buffer.id,
            storage: buffer.storage.clone(),
        }
    }

    fn execute(&mut self, command: Command) {
        let batch = self.submitted;
        match command {
            Command::Compute {
                params,
                src,
                dst,
                work_groups,
            } => {
                let params: SimParams =
                    bytemuck::pod_read_unaligned(&params.storage.borrow().bytes);
                let source: Vec<Particle> = bytemuck::pod_collect_to_vec(&src.storage.borrow().bytes);
                let mut next = vec![Particle::default(); source.len()];
                flock_step(&params, &source, &mut next);
                // Lanes past the dispatch never run; their records keep the
                // stale generation.
                let lanes = (work_groups as usize) * PARTICLES_PER_GROUP as usize;
                let covered = lanes.min(next.len());
                let mut dst_storage = dst.storage.borrow_mut();
                let mut written: Vec<Particle> = bytemuck::pod_collect_to_vec(&dst_storage.bytes);
                written[..covered].copy_from_slice(&next[..covered]);
                dst_storage.bytes = bytemuck::cast_slice(&written).to_vec();
                dst_storage.generation += 1;
                self.compute_log.push(ComputeRecord {
                    batch,
                    src: src.id,
                    dst: dst.id,
                    work_groups,
                });
            }
            Command::Render {
                target,
                buffer,
                vertex_count,
                instance_count,
                load,
            } => {
                let generation = buffer.storage.borrow().generation;
                self.render_log.push(RenderRecord {
                    batch,
                    target,
                    buffer: buffer.id,
                    generation,
                    vertex_count,
                    instance_count,
                    load,
                });
            }
        }
    }
}

impl GpuProvider for SoftwareProvider {
    type Buffer = SoftBuffer;
    type BindGroup = SoftBindGroup;
    type ComputeProgram = SoftComputeProgram;
    type RenderProgram = SoftRenderProgram;
    type Batch = SoftBatch;
    type Target = SoftTarget;

    fn allocate_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<SoftBuffer, ProviderError> {
        if self.failing_allocation.as_deref() == Some(desc.label) {
            return Err(ProviderError::Allocation {
                label: desc.label.to_string(),
                size: desc.contents.len() as u64,
                message: "out of memory".into(),
            });
        }
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        Ok(SoftBuffer {
            id,
            label: desc.label.to_string(),
            role: desc.role,
            storage: Rc::new(RefCell::new(Storage {
                bytes: desc.contents.to_vec(),
                generation: 0,
            })),
            _tracked: Tracked::new(&self.counts),
        })
    }

    fn compile_compute_program(
        &mut self,
        desc: &ComputeProgramDesc<'_>,
    ) -> Result<SoftComputeProgram, ProviderError> {
        let signature = format!("fn {}(", desc.entry_point);
        if !desc.source.contains(&signature) {
            return Err(ProviderError::ShaderCompile {
                label: desc.label.to_string(),
                message: format!("entry point '{}' not found", desc.entry_point),
            });
        }
        Ok(SoftComputeProgram {
            _tracked: Tracked::new(&self.counts),
        })
    }

    fn compile_render_program(
        &mut self,
        desc: &RenderProgramDesc<'_>,
    ) -> Result<SoftRenderProgram, ProviderError> {
        for entry_point in [desc.vertex_entry_point, desc.fragment_entry_point].iter() {
            if !desc.source.contains(&format!("fn {}(", entry_point)) {
                return Err(ProviderError::ShaderCompile {
                    label: desc.label.to_string(),
                    message: format!("entry point '{}' not found", entry_point),
                });
            }
        }
        Ok(SoftRenderProgram {
            _tracked: Tracked::new(&self.counts),
        })
    }

    fn create_bind_group(
        &mut self,
        _label: &str,
        _program: &SoftComputeProgram,
        bindings: &[Binding<'_, SoftBuffer>],
    ) -> Result<SoftBindGroup, ProviderError> {
        let slot = |index: u32| {
            bindings
                .iter()
                .find(|binding| binding.slot == index)
                .map(|binding| Self::bound(binding.buffer))
                .ok_or_else(|| ProviderError::BindGroup(format!("missing binding {}", index)))
        };
        let params = slot(0)?;
        let src = slot(1)?;
        let dst = slot(2)?;
        if src.id == dst.id {
            return Err(ProviderError::BindGroup(
                "source and destination alias the same buffer".into(),
            ));
        }
        Ok(SoftBindGroup {
            params,
            src,
            dst,
            _tracked: Tracked::new(&self.counts),
        })
    }

    fn acquire_target(&mut self) -> Result<SoftTarget, SurfaceError> {
        if let Some(error) = &self.stale {
            return Err(error.clone());
        }
        if let Some(error) = self.acquire_failures.pop_front() {
            if error.needs_reconfigure() {
                self.stale = Some(error.clone());
            }
            return Err(error);
        }
        let index = self.next_target;
        self.next_target += 1;
        Ok(SoftTarget { index })
    }

    fn begin_batch(&mut self) -> Result<SoftBatch, ProviderError> {
        Ok(SoftBatch::default())
    }

    fn record_compute_pass(
        &mut self,
        batch: &mut SoftBatch,
        _program: &SoftComputeProgram,
        bind_group: &SoftBindGroup,
        workgroups_x: u32,
    ) {
        batch.commands.push(Command::Compute {
            params: bind_group.params.clone(),
            src: bind_group.src.clone(),
            dst: bind_group.dst.clone(),
            work_groups: workgroups_x,
        });
    }

    fn record_render_pass(
        &mut self,
        batch: &mut SoftBatch,
        target: &SoftTarget,
        _program: &SoftRenderProgram,
        draw: &DrawDesc<'_, SoftBuffer>,
    ) {
        // Slot 0 carries the per-instance particle data.
        if let Some(particles) = draw.vertex_buffers.first() {
            batch.commands.push(Command::Render {
                target: target.index,
                buffer: Self::bound(particles),
                vertex_count: draw.vertex_count,
                instance_count: draw.instance_count,
                load: draw.load,
            });
        }
    }

    fn submit(&mut self, batch: SoftBatch) -> Result<Submission, ProviderError> {
        if let Some(error) = self.submit_failure.take() {
            return Err(error);
        }
        for command in batch.commands {
            self.execute(command);
        }
        self.submitted += 1;
        Ok(Submission::completed())
    }

    fn present(&mut self, _target: SoftTarget) {
        self.presented += 1;
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn configure_surface(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.size = (width, height);
            self.configured += 1;
            self.stale = None;
        }
    }
}
