pub mod buffer;
pub mod camera;
pub mod initialize;
pub mod lights;
pub mod render;
pub mod state;
pub mod stepper;

/// Capacity bounds baked into the simulation and compositing kernels.
/// Registries reject configurations exceeding them at setup time; nothing is
/// re-checked on the per-tick paths.
pub const MAX_SOURCES: usize = 5;
pub const MAX_ATTRACTORS: usize = 5;
pub const MAX_LIGHTS: usize = 10;

/// Largest state-buffer side length the simulation will allocate.
pub const MAX_BUFFER_SIDE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("too many particle sources: {0} (max {MAX_SOURCES})")]
  TooManySources(usize),

  #[error("too many attractors: {0} (max {MAX_ATTRACTORS})")]
  TooManyAttractors(usize),

  #[error("too many halo lights: {0} (max {MAX_LIGHTS})")]
  TooManyLights(usize),

  #[error("particle budget needs a {0}x{0} state buffer (max side {MAX_BUFFER_SIDE})")]
  BufferBudget(usize),
}
