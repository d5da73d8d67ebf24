//! Particle Kernel Invariant Tests
//!
//! Drives whole-buffer simulations the way the scene driver does and checks
//! the respawn, capture and ownership invariants of the physics stepper.

use cgmath::{InnerSpace, Vector3};
use comet_sim::initialize::{Attractor, AttractorSet, SourceConfig, SourceSet};
use comet_sim::stepper::{Simulation, StepParams};

/// Step inputs with ambient noise and drag switched off, leaving only the
/// source and attractor terms.
fn quiet(delta: f32, time: f32) -> StepParams {
  StepParams {
    delta,
    time,
    noise_amplitude: 0.0,
    drag: 0.0,
  }
}

fn source_at(
  position: Vector3<f32>,
  velocity: Vector3<f32>,
  particle_count: usize,
  fade_time: f32,
) -> SourceConfig {
  SourceConfig {
    position,
    velocity,
    particle_count,
    fade_time,
    ..SourceConfig::default()
  }
}

// ==================== RESPAWN CLOCK ====================

#[test]
fn fade_clock_never_leaves_its_band() {
  const FADE: f32 = 2.0;
  const DELTA: f32 = 0.3;

  let mut sources = SourceSet::new();
  sources
    .push(source_at(
      Vector3::new(0.0, 0.0, 0.0),
      Vector3::new(0.0, 0.0, 0.0),
      32,
      FADE,
    ))
    .unwrap();
  let attractors = AttractorSet::new();
  let mut sim = Simulation::new(&sources, 7).unwrap();

  for step in 0..40 {
    let previous: Vec<f32> = (0..32).map(|i| sim.current().particle(i).1[3]).collect();
    sim.step(&quiet(DELTA, step as f32 * DELTA), &sources, &attractors);

    for (i, prev) in previous.iter().enumerate() {
      let remaining = sim.current().particle(i).1[3];
      assert!(remaining >= 0.0, "particle {i} clock went negative");
      assert!(remaining <= FADE, "particle {i} clock exceeded the fade time");
      let ticked = (remaining - (prev - DELTA)).abs() < 1e-6;
      assert!(
        ticked || remaining == FADE,
        "particle {i}: {remaining} is neither {prev} - {DELTA} nor a fresh respawn",
      );
    }
  }
}

// ==================== OWNERSHIP ====================

#[test]
fn particles_never_change_owner() {
  let mut sources = SourceSet::new();
  sources
    .push(source_at(
      Vector3::new(-5.0, 0.0, 0.0),
      Vector3::new(0.0, 0.0, 1.0),
      16,
      0.5,
    ))
    .unwrap();
  sources
    .push(source_at(
      Vector3::new(5.0, 0.0, 0.0),
      Vector3::new(0.0, 0.0, -1.0),
      16,
      0.5,
    ))
    .unwrap();
  let attractors = AttractorSet::new();
  let mut sim = Simulation::new(&sources, 11).unwrap();

  // Short fade and a coarse step force several respawns over the run.
  for step in 0..30 {
    sim.step(&quiet(0.2, step as f32 * 0.2), &sources, &attractors);
    for i in 0..32 {
      let tag = sim.current().particle(i).0[3];
      let expected = if i < 16 { 0.0 } else { 1.0 };
      assert_eq!(tag, expected, "particle {i} switched owner");
    }
  }
}

// ==================== ORBITAL CAPTURE ====================

#[test]
fn captured_particle_stays_on_the_capture_sphere() {
  const CAPTURE_RADIUS: f32 = 2.0;
  const DELTA: f32 = 1e-3;

  let mut sources = SourceSet::new();
  sources
    .push(source_at(
      Vector3::new(0.0, 0.0, 0.0),
      Vector3::new(0.0, 0.0, 0.0),
      1,
      1000.0,
    ))
    .unwrap();
  let mut attractors = AttractorSet::new();
  attractors
    .push(Attractor {
      position: Vector3::new(10.0, 0.0, 0.0),
      mass: 5.0,
      capture_radius: CAPTURE_RADIUS,
    })
    .unwrap();

  let mut sim = Simulation::new(&sources, 3).unwrap();
  // Expire the spawn clock so the first step respawns near the source.
  sim.state_mut().texel_mut(1)[3] = 0.0;

  let attractor_pos = Vector3::new(10.0, 0.0, 0.0);
  let mut time = 0.0;
  let mut captured = false;
  for _ in 0..100_000 {
    sim.step(&quiet(DELTA, time), &sources, &attractors);
    time += DELTA;
    let head = sim.current().particle(0).0;
    let offset = Vector3::new(head[0], head[1], head[2]) - attractor_pos;
    if offset.magnitude() < CAPTURE_RADIUS {
      captured = true;
      break;
    }
  }
  assert!(captured, "particle never fell inside the capture radius");

  // From here on every step re-clamps: on the sphere, tangential motion only.
  for _ in 0..100 {
    sim.step(&quiet(DELTA, time), &sources, &attractors);
    time += DELTA;

    let (head, tail) = sim.current().particle(0);
    let offset = Vector3::new(head[0], head[1], head[2]) - attractor_pos;
    let dist = offset.magnitude();
    assert!(
      (dist - CAPTURE_RADIUS).abs() < 1e-4,
      "particle drifted off the capture sphere: {dist}",
    );
    let radial = Vector3::new(tail[0], tail[1], tail[2]).dot(offset / dist);
    assert!(
      radial.abs() < 5e-3,
      "captured particle kept a radial velocity component: {radial}",
    );
  }
}

// ==================== RESPAWN RESEED ====================

#[test]
fn expired_particle_respawns_at_its_source() {
  const FADE: f32 = 10.0;
  let source_pos = Vector3::new(3.0, 4.0, 5.0);

  let mut sources = SourceSet::new();
  sources
    .push(source_at(source_pos, Vector3::new(0.0, 0.0, 0.0), 1, FADE))
    .unwrap();
  let attractors = AttractorSet::new();
  let mut sim = Simulation::new(&sources, 19).unwrap();

  // Known spawn clock partway through the fade window.
  sim.state_mut().texel_mut(1)[3] = 0.37 * FADE;

  sim.step(&quiet(FADE, 1.0), &sources, &attractors);

  let (head, tail) = sim.current().particle(0);
  assert_eq!(tail[3], FADE, "respawn must reset the clock exactly");
  assert_eq!(&tail[..3], &[0.0; 3], "respawn must copy the source velocity");
  for axis in 0..3 {
    let jitter = head[axis] - source_pos[axis];
    assert!(
      jitter.abs() <= 1.0,
      "respawn position left the spawn-noise bound on axis {axis}: {jitter}",
    );
  }
}
