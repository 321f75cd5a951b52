use crate::error::InitError;
use crate::particle_store::{dest_index, source_index, ParticleStore};
use crate::provider::{Binding, BufferDesc, BufferRole, ComputeProgramDesc, GpuProvider};
use crate::sim_params::SimParams;

// This needs to match the workgroup size in compute.wgsl; build.rs injects
// the same value into the shader template.
pub const PARTICLES_PER_GROUP: u32 = 64;

/// Number of workgroups needed to cover `count` particles. The last group
/// may be partial; its extra lanes bounds-check and do nothing.
pub fn work_group_count(count: u32) -> Result<u32, InitError> {
    if count == 0 {
        return Err(InitError::EmptySimulation);
    }
    Ok(count.div_ceil(PARTICLES_PER_GROUP))
}

/// The flocking update: reads the source generation, writes the
/// destination generation.
pub struct ComputeStage<P: GpuProvider> {
    // Bind group i reads buffer i and writes buffer (i + 1) % 2.
    bind_groups: [P::BindGroup; 2],
    pipeline: P::ComputeProgram,
    // Kept alive for the bind groups that reference it.
    _params_buffer: P::Buffer,
    work_groups: u32,
}

impl<P: GpuProvider> ComputeStage<P> {
    pub fn init(
        provider: &mut P,
        store: &ParticleStore<P>,
        params: &SimParams,
    ) -> Result<Self, InitError> {
        let work_groups = work_group_count(store.count())?;
        log::info!(
            "Work groups: {}, Size: {}",
            work_groups,
            PARTICLES_PER_GROUP
        );

        let pipeline = provider.compile_compute_program(&ComputeProgramDesc {
            label: "compute.wgsl",
            source: crate::include_shader!("compute.wgsl"),
            entry_point: "main",
        })?;

        let params_buffer = provider.allocate_buffer(&BufferDesc {
            label: "Simulation Param Buffer",
            role: BufferRole::Parameters,
            contents: bytemuck::bytes_of(params),
        })?;

        let bind_group_a = Self::make_bind_group(provider, &pipeline, &params_buffer, store, 0)?;
        let bind_group_b = Self::make_bind_group(provider, &pipeline, &params_buffer, store, 1)?;

        Ok(ComputeStage {
            bind_groups: [bind_group_a, bind_group_b],
            pipeline,
            _params_buffer: params_buffer,
            work_groups,
        })
    }

    fn make_bind_group(
        provider: &mut P,
        pipeline: &P::ComputeProgram,
        params_buffer: &P::Buffer,
        store: &ParticleStore<P>,
        index: usize,
    ) -> Result<P::BindGroup, InitError> {
        let label = format!("Particle Bind Group {}", index);
        let bind_group = provider.create_bind_group(
            &label,
            pipeline,
            &[
                // Uniform inputs
                Binding {
                    slot: 0,
                    buffer: params_buffer,
                },
                // Source generation
                Binding {
                    slot: 1,
                    buffer: store.buffer(index),
                },
                // Destination generation
                Binding {
                    slot: 2,
                    buffer: store.buffer((index + 1) % 2),
                },
            ],
        )?;
        Ok(bind_group)
    }

    pub fn work_groups(&self) -> u32 {
        self.work_groups
    }

    /// Records the single compute pass of `frame`.
    pub fn record(&self, provider: &mut P, batch: &mut P::Batch, frame: u64) {
        let bind_group = &self.bind_groups[source_index(frame)];
        log::trace!(
            "Frame {}: compute {} -> {}, {} work groups",
            frame,
            source_index(frame),
            dest_index(frame),
            self.work_groups
        );
        provider.record_compute_pass(batch, &self.pipeline, bind_group, self.work_groups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_groups_cover_remainder() {
        assert_eq!(work_group_count(1).unwrap(), 1);
        assert_eq!(work_group_count(64).unwrap(), 1);
        assert_eq!(work_group_count(65).unwrap(), 2);
        assert_eq!(work_group_count(1500).unwrap(), 24);
    }

    #[test]
    fn empty_simulation_is_rejected() {
        assert!(matches!(
            work_group_count(0),
            Err(InitError::EmptySimulation)
        ));
    }
}
