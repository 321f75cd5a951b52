use rand::{Rng, SeedableRng};

use crate::error::InitError;
use crate::particle::Particle;
use crate::provider::{BufferDesc, BufferRole, GpuProvider};

// Initial velocities are scaled down relative to the position range so the
// visible motion starts gentle.
const INITIAL_VELOCITY_SCALE: f32 = 0.1;

/// Builds the initial generation. Same seed and count, same bits.
pub fn initial_particles(count: u32, seed: u64) -> Vec<Particle> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let pos = [rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0)];
            let vel = [
                rng.gen_range(-1.0f32..=1.0) * INITIAL_VELOCITY_SCALE,
                rng.gen_range(-1.0f32..=1.0) * INITIAL_VELOCITY_SCALE,
            ];
            Particle::new(pos, vel)
        })
        .collect()
}

/// Index of the buffer the compute stage reads on `frame`.
pub fn source_index(frame: u64) -> usize {
    (frame % 2) as usize
}

/// Index of the buffer the compute stage writes on `frame`.
pub fn dest_index(frame: u64) -> usize {
    ((frame % 2 + 1) % 2) as usize
}

/// Index of the buffer the render stage reads on `frame`: the one the
/// compute stage of the same frame just wrote.
pub fn current_render_buffer(frame: u64) -> usize {
    dest_index(frame)
}

/// Owns the two particle generations.
///
/// Buffer `i` is the compute source on frames with parity `i` and the
/// compute destination on the others. Nothing here changes after
/// construction; the frame counter alone selects the roles.
pub struct ParticleStore<P: GpuProvider> {
    buffers: [P::Buffer; 2],
    count: u32,
}

impl<P: GpuProvider> ParticleStore<P> {
    pub fn init(provider: &mut P, count: u32, seed: u64) -> Result<Self, InitError> {
        if count == 0 {
            return Err(InitError::EmptySimulation);
        }
        let particles = initial_particles(count, seed);
        let contents: &[u8] = bytemuck::cast_slice(&particles);
        // Both generations start out identical.
        let buffer_a = provider.allocate_buffer(&BufferDesc {
            label: "Particle Buffer 0",
            role: BufferRole::Particles,
            contents,
        })?;
        let buffer_b = provider.allocate_buffer(&BufferDesc {
            label: "Particle Buffer 1",
            role: BufferRole::Particles,
            contents,
        })?;
        log::info!(
            "Num particles: {}, buffer size: {} bytes",
            count,
            contents.len()
        );
        Ok(ParticleStore {
            buffers: [buffer_a, buffer_b],
            count,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn buffer(&self, index: usize) -> &P::Buffer {
        &self.buffers[index]
    }

    pub fn buffers(&self) -> &[P::Buffer; 2] {
        &self.buffers
    }

    pub fn render_buffer(&self, frame: u64) -> &P::Buffer {
        &self.buffers[current_render_buffer(frame)]
    }
}
