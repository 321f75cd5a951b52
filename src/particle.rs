use cgmath::{InnerSpace, MetricSpace, Vector2, Zero};

use crate::sim_params::SimParams;

// Velocities are clamped to this magnitude after every update.
pub const MAX_SPEED: f32 = 0.1;

// This should match the struct defined in compute.wgsl.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Particle {
    pub pos: [f32; 2],
    pub vel: [f32; 2],
}
const _: () = assert!(std::mem::size_of::<Particle>() == 16);
const _: () = assert!(std::mem::offset_of!(Particle, pos) == 0);
const _: () = assert!(std::mem::offset_of!(Particle, vel) == 8);

impl Particle {
    pub fn new(pos: [f32; 2], vel: [f32; 2]) -> Self {
        Particle { pos, vel }
    }

    fn position(&self) -> Vector2<f32> {
        Vector2::new(self.pos[0], self.pos[1])
    }

    fn velocity(&self) -> Vector2<f32> {
        Vector2::new(self.vel[0], self.vel[1])
    }

    pub fn speed(&self) -> f32 {
        self.velocity().magnitude()
    }
}

// Brings a coordinate that left [-1, 1] back in from the opposite edge.
fn wrap(coordinate: f32) -> f32 {
    if coordinate < -1.0 {
        coordinate + 2.0
    } else if coordinate > 1.0 {
        coordinate - 2.0
    } else {
        coordinate
    }
}

/// Computes the next generation of `src` into `dst` on the CPU.
///
/// This is the per-particle contract of the flocking compute shader,
/// evaluated serially: every particle scans every other particle of the
/// previous generation and never sees a partially written `dst`.
pub fn flock_step(params: &SimParams, src: &[Particle], dst: &mut [Particle]) {
    assert_eq!(
        src.len(),
        dst.len(),
        "source and destination generations differ in size"
    );
    for (index, out) in dst.iter_mut().enumerate() {
        *out = step_one(params, src, index);
    }
}

fn step_one(params: &SimParams, src: &[Particle], index: usize) -> Particle {
    let me = &src[index];
    let v_pos = me.position();
    let mut v_vel = me.velocity();

    let mut c_mass = Vector2::zero();
    let mut c_vel = Vector2::zero();
    let mut col_vel = Vector2::zero();
    let mut c_mass_count = 0u32;
    let mut c_vel_count = 0u32;

    for (i, other) in src.iter().enumerate() {
        if i == index {
            continue;
        }
        let pos = other.position();
        let d = pos.distance(v_pos);
        if d < params.rule1_distance {
            c_mass += pos;
            c_mass_count += 1;
        }
        if d < params.rule2_distance {
            col_vel += v_pos - pos;
        }
        if d < params.rule3_distance {
            c_vel += other.velocity();
            c_vel_count += 1;
        }
    }
    if c_mass_count > 0 {
        c_mass = c_mass / c_mass_count as f32 - v_pos;
    }
    if c_vel_count > 0 {
        c_vel /= c_vel_count as f32;
    }

    v_vel += c_mass * params.rule1_scale + col_vel * params.rule2_scale + c_vel * params.rule3_scale;

    let speed = v_vel.magnitude();
    if speed > MAX_SPEED {
        v_vel *= MAX_SPEED / speed;
    }

    let next = v_pos + v_vel * params.delta_t;
    Particle {
        pos: [wrap(next.x), wrap(next.y)],
        vel: [v_vel.x, v_vel.y],
    }
}
