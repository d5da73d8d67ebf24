use cgmath::Vector3;
use rand::{rngs::SmallRng, Rng};

use crate::buffer::StateBuffer;
use crate::{ConfigError, MAX_ATTRACTORS, MAX_SOURCES};

/// Position placeholder written at encode time, far outside the simulation
/// volume so unspawned particles stay out of sight.
pub const OFFSCREEN: [f32; 3] = [1000.0, 1000.0, 1000.0];

/// Emitter of simulation particles. The index is assigned once at
/// registration and tags every particle the source owns inside the state
/// buffer; position and velocity are updated by the scene driver every tick.
#[derive(Clone, Debug)]
pub struct ParticleSource {
  pub position: Vector3<f32>,
  pub velocity: Vector3<f32>,
  pub color: [f32; 3],
  pub fade_time: f32,
  particle_count: usize,
  index: usize,
  first_particle: usize,
}

impl ParticleSource {
  #[must_use]
  pub fn index(&self) -> usize {
    self.index
  }

  #[must_use]
  pub fn particle_count(&self) -> usize {
    self.particle_count
  }

  /// Offset of this source's first particle in the global particle range.
  #[must_use]
  pub fn first_particle(&self) -> usize {
    self.first_particle
  }

  /// Seed this source's particle range: sentinel position tagged with the
  /// source index, zero velocity, and a randomized time to fade so the
  /// source's particles do not respawn in lockstep. Overwrites only this
  /// source's texels.
  pub fn encode(&self, buffer: &mut StateBuffer, rng: &mut SmallRng) {
    for i in 0..self.particle_count {
      let head = [OFFSCREEN[0], OFFSCREEN[1], OFFSCREEN[2], self.index as f32];
      let tail = [0.0, 0.0, 0.0, rng.gen::<f32>() * self.fade_time];
      buffer.set_particle(self.first_particle + i, head, tail);
    }
  }
}

/// Setup-time description of a particle source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
  pub position: Vector3<f32>,
  pub velocity: Vector3<f32>,
  pub color: [f32; 3],
  pub particle_count: usize,
  pub fade_time: f32,
}

impl Default for SourceConfig {
  fn default() -> Self {
    Self {
      position: Vector3::new(0.0, 0.0, 0.0),
      velocity: Vector3::new(0.0, 0.0, 0.0),
      color: [1.0, 1.0, 1.0],
      particle_count: 1000,
      fade_time: 10.0,
    }
  }
}

/// Registry of particle sources. Indices are consecutive from zero and the
/// set refuses to grow past the kernel bound.
#[derive(Default)]
pub struct SourceSet {
  sources: Vec<ParticleSource>,
  total_particles: usize,
}

impl SourceSet {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a source and returns its stable index.
  pub fn push(&mut self, config: SourceConfig) -> Result<usize, ConfigError> {
    if self.sources.len() == MAX_SOURCES {
      return Err(ConfigError::TooManySources(self.sources.len() + 1));
    }
    let index = self.sources.len();
    self.sources.push(ParticleSource {
      position: config.position,
      velocity: config.velocity,
      color: config.color,
      fade_time: config.fade_time,
      particle_count: config.particle_count,
      index,
      first_particle: self.total_particles,
    });
    self.total_particles += config.particle_count;
    Ok(index)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.sources.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.sources.is_empty()
  }

  #[must_use]
  pub fn total_particles(&self) -> usize {
    self.total_particles
  }

  #[must_use]
  pub fn get(&self, index: usize) -> Option<&ParticleSource> {
    self.sources.get(index)
  }

  pub fn get_mut(&mut self, index: usize) -> Option<&mut ParticleSource> {
    self.sources.get_mut(index)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ParticleSource> {
    self.sources.iter()
  }

  /// Source owning a particle, looked up from the float index channel. The
  /// channel holds a small integer; identity is exact after rounding.
  #[must_use]
  pub fn owner_of(&self, tag: f32) -> Option<&ParticleSource> {
    if tag.round() < 0.0 {
      return None;
    }
    self.sources.get(tag.round() as usize)
  }

  /// Seeds every source's particle range.
  pub fn encode_all(&self, buffer: &mut StateBuffer, rng: &mut SmallRng) {
    for source in &self.sources {
      source.encode(buffer, rng);
    }
  }
}

/// Gravitating body. Inside `capture_radius` a particle is clamped onto the
/// radius and its radial velocity removed, leaving it in orbit.
#[derive(Clone, Debug)]
pub struct Attractor {
  pub position: Vector3<f32>,
  pub mass: f32,
  pub capture_radius: f32,
}

/// Registry of attractors, bounded like `SourceSet`.
#[derive(Default)]
pub struct AttractorSet {
  attractors: Vec<Attractor>,
}

impl AttractorSet {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, attractor: Attractor) -> Result<usize, ConfigError> {
    if self.attractors.len() == MAX_ATTRACTORS {
      return Err(ConfigError::TooManyAttractors(self.attractors.len() + 1));
    }
    self.attractors.push(attractor);
    Ok(self.attractors.len() - 1)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.attractors.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.attractors.is_empty()
  }

  pub fn get_mut(&mut self, index: usize) -> Option<&mut Attractor> {
    self.attractors.get_mut(index)
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Attractor> {
    self.attractors.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::buffer::side_for;
  use rand::SeedableRng;

  fn small_source(count: usize) -> SourceConfig {
    SourceConfig {
      particle_count: count,
      fade_time: 4.0,
      ..SourceConfig::default()
    }
  }

  #[test]
  fn indices_are_consecutive() {
    let mut set = SourceSet::new();
    for expected in 0..3 {
      let index = set.push(small_source(10)).unwrap();
      assert_eq!(index, expected);
    }
    assert_eq!(set.total_particles(), 30);
    assert_eq!(set.get(1).unwrap().first_particle(), 10);
  }

  #[test]
  fn source_capacity_is_enforced() {
    let mut set = SourceSet::new();
    for _ in 0..crate::MAX_SOURCES {
      set.push(small_source(1)).unwrap();
    }
    assert!(matches!(
      set.push(small_source(1)),
      Err(ConfigError::TooManySources(_))
    ));
  }

  #[test]
  fn attractor_capacity_is_enforced() {
    let mut set = AttractorSet::new();
    let body = Attractor {
      position: Vector3::new(0.0, 0.0, 0.0),
      mass: 1.0,
      capture_radius: 1.0,
    };
    for _ in 0..crate::MAX_ATTRACTORS {
      set.push(body.clone()).unwrap();
    }
    assert!(set.push(body).is_err());
  }

  #[test]
  fn encode_writes_sentinel_and_randomized_fade() {
    let mut set = SourceSet::new();
    set.push(small_source(8)).unwrap();
    set.push(small_source(8)).unwrap();

    let side = side_for(set.total_particles()).unwrap();
    let mut buffer = StateBuffer::new(side);
    let mut rng = SmallRng::seed_from_u64(7);
    set.encode_all(&mut buffer, &mut rng);

    for i in 0..16 {
      let (head, tail) = buffer.particle(i);
      assert_eq!(&head[..3], &OFFSCREEN);
      assert_eq!(head[3], if i < 8 { 0.0 } else { 1.0 });
      assert_eq!(&tail[..3], &[0.0; 3]);
      assert!(tail[3] >= 0.0 && tail[3] < 4.0);
    }

    // Spawn times must not be uniform across a source.
    let first = buffer.particle(0).1[3];
    assert!((0..8).any(|i| buffer.particle(i).1[3] != first));
  }

  #[test]
  fn owner_lookup_rounds_to_exact_index() {
    let mut set = SourceSet::new();
    set.push(small_source(1)).unwrap();
    set.push(small_source(1)).unwrap();

    assert_eq!(set.owner_of(1.02).unwrap().index(), 1);
    assert_eq!(set.owner_of(0.0).unwrap().index(), 0);
    assert!(set.owner_of(-1.0).is_none());
    assert!(set.owner_of(2.0).is_none());
  }
}
