use cgmath::{InnerSpace, Vector3};
use rand::{rngs::SmallRng, SeedableRng};
use rayon::prelude::*;

use crate::buffer::{side_for, BufferPair, StateBuffer, Texel};
use crate::initialize::{AttractorSet, SourceSet};
use crate::ConfigError;

/// Distances are floored to this before any division; the kernel stays free
/// of NaN even for coincident points.
pub const DIST_EPSILON: f32 = 0.1;

/// Acceleration factor swinging particles around their owning source.
const ROTATION_FACTOR: f32 = 1.0;
/// Acceleration factor pushing particles away from foreign sources.
const REPULSION_FACTOR: f32 = 10.0;
/// Amplitude of the position jitter applied at respawn.
const SPAWN_JITTER: f32 = 1.0;

/// Per-tick kernel inputs. Rebuilt by the driver every tick; the kernel
/// keeps no state of its own between invocations.
#[derive(Clone, Copy, Debug)]
pub struct StepParams {
  /// Seconds since the previous tick, pre-clamped by the caller.
  pub delta: f32,
  /// Seconds since simulation start.
  pub time: f32,
  /// Amplitude of the ambient acceleration noise.
  pub noise_amplitude: f32,
  /// Linear drag coefficient.
  pub drag: f32,
}

impl Default for StepParams {
  fn default() -> Self {
    Self {
      delta: 1.0 / 60.0,
      time: 0.0,
      noise_amplitude: 5.0,
      drag: 0.1,
    }
  }
}

fn hash_noise(u: f32, v: f32, time: f32) -> f32 {
  let val = (u + 0.01) * (v + 0.01) * (time + 1.0) * 1000.0;
  let val = val.rem_euclid(13.0) * val.rem_euclid(123.0);
  100.0 * val.rem_euclid(0.01)
}

/// Deterministic pseudo-random vector in [-1, 1]^3 for a texel coordinate
/// and time; re-randomized only insofar as `time` changes.
fn noise_vec(u: f32, v: f32, time: f32) -> Vector3<f32> {
  Vector3::new(
    2.0 * hash_noise(u, v, time + 17.0) - 1.0,
    2.0 * hash_noise(u, v, time + 31.0) - 1.0,
    2.0 * hash_noise(u, v, time + 61.0) - 1.0,
  )
}

/// Advances one particle by one tick. Pure function of the previous state
/// and the shared tick inputs; particles never read each other's state.
///
/// `uv` is the particle's position-texel coordinate normalized to (0, 1),
/// used only to decorrelate the noise terms between particles.
#[must_use]
pub fn step_particle(
  head: Texel,
  tail: Texel,
  uv: (f32, f32),
  params: &StepParams,
  sources: &SourceSet,
  attractors: &AttractorSet,
) -> (Texel, Texel) {
  let mut position = Vector3::new(head[0], head[1], head[2]);
  let source_tag = head[3];
  let mut velocity = Vector3::new(tail[0], tail[1], tail[2]);
  let mut time_left = tail[3];

  time_left -= params.delta;
  if time_left < 0.0 {
    match sources.owner_of(source_tag) {
      Some(source) => {
        time_left = source.fade_time;
        position = source.position + noise_vec(uv.0, uv.1, params.time + 31.0) * SPAWN_JITTER;
        velocity = source.velocity;
      }
      // Unknown owner: hold the particle in place instead of guessing.
      None => time_left = 0.0,
    }
  }

  let owner_index = source_tag.round() as i64;
  let mut acceleration = Vector3::new(0.0, 0.0, 0.0);

  for source in sources.iter() {
    let offset = source.position - position;
    let dist = offset.magnitude().max(DIST_EPSILON);
    let dir = offset / dist;
    if source.index() as i64 == owner_index {
      // Swing around the emitting source
      acceleration += dir.cross(source.velocity) * (ROTATION_FACTOR / (dist * dist));
    } else {
      // Repel from the other sources
      acceleration -= dir * (REPULSION_FACTOR / dist);
    }
  }

  for attractor in attractors.iter() {
    let offset = attractor.position - position;
    let dist = offset.magnitude().max(DIST_EPSILON);
    let dir = offset / dist;
    if dist < attractor.capture_radius {
      // Clamp onto the capture sphere; only tangential motion survives
      position = attractor.position - dir * attractor.capture_radius;
      velocity -= dir * velocity.dot(dir);
    }
    acceleration += dir * (attractor.mass / (dist * dist));
  }

  acceleration += noise_vec(uv.0, uv.1, params.time) * params.noise_amplitude;
  acceleration -= velocity * params.drag;
  velocity += acceleration * params.delta;
  position += velocity * params.delta;

  (
    [position.x, position.y, position.z, source_tag],
    [velocity.x, velocity.y, velocity.z, time_left],
  )
}

/// Owns the ping-pong state buffers and advances the whole particle
/// population one tick at a time.
pub struct Simulation {
  buffers: BufferPair,
  particle_count: usize,
  side: usize,
  frame: usize,
}

impl Simulation {
  /// Allocates the state buffers for the registered sources and seeds them.
  /// Fails when the particle budget exceeds the largest supported buffer;
  /// the pair is never resized afterwards.
  pub fn new(sources: &SourceSet, seed: u64) -> Result<Self, ConfigError> {
    let particle_count = sources.total_particles();
    let side = side_for(particle_count)?;
    let mut seed_buffer = StateBuffer::new(side);
    let mut rng = SmallRng::seed_from_u64(seed);
    sources.encode_all(&mut seed_buffer, &mut rng);
    Ok(Self {
      buffers: BufferPair::from_seed(seed_buffer),
      particle_count,
      side,
      frame: 0,
    })
  }

  #[must_use]
  pub fn particle_count(&self) -> usize {
    self.particle_count
  }

  #[must_use]
  pub fn side(&self) -> usize {
    self.side
  }

  #[must_use]
  pub fn frame(&self) -> usize {
    self.frame
  }

  /// Buffer holding the most recent tick's results.
  #[must_use]
  pub fn current(&self) -> &StateBuffer {
    self.buffers.read_target(self.frame)
  }

  /// Mutable view of the state the next step will read. Used to re-encode a
  /// source's range between ticks.
  pub fn state_mut(&mut self) -> &mut StateBuffer {
    self.buffers.read_target_mut(self.frame)
  }

  /// Runs the kernel over every particle into the inactive buffer, then
  /// flips the pair. Particles are independent, so the sweep is a parallel
  /// map over the write target.
  pub fn step(&mut self, params: &StepParams, sources: &SourceSet, attractors: &AttractorSet) {
    let side = self.side;
    let count = self.particle_count;
    let (read, write) = self.buffers.split(self.frame);

    write
      .particles_mut(count)
      .par_chunks_mut(2)
      .enumerate()
      .for_each(|(index, out)| {
        let (head, tail) = read.particle(index);
        let (x, y) = read.particle_coords(index);
        let uv = (
          (x as f32 + 0.5) / side as f32,
          (y as f32 + 0.5) / side as f32,
        );
        let (head, tail) = step_particle(head, tail, uv, params, sources, attractors);
        out[0] = head;
        out[1] = tail;
      });

    self.frame += 1;
  }
}
