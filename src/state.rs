use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::UnitSphere;
use winit::{
  dpi::LogicalSize,
  event::{ElementState, Event, KeyEvent, StartCause, WindowEvent},
  event_loop::{EventLoop, EventLoopWindowTarget},
  keyboard::{KeyCode, PhysicalKey},
  window::Window,
};

use crate::camera::{Camera, CameraController, CameraUniform};
use crate::initialize::{Attractor, AttractorSet, SourceConfig, SourceSet};
use crate::lights::{FrameImage, HaloParams, Light, LightShape, LightsPass, SpriteImage};
use crate::render::{ParticleInstance, Render};
use crate::stepper::{Simulation, StepParams};
use crate::ConfigError;

/// Upper bound on the per-tick timestep; stalls degrade to slow motion
/// instead of an integration blow-up.
const DELTA_CLAMP: f32 = 0.05;
const COMET_FADE: f32 = 10.0;
const SUN_MASS: f32 = 40.0;
const SUN_RADIUS: f32 = 3.0;

const COMET_COLORS: [[f32; 3]; 5] = [
  [0.55, 0.75, 1.00],
  [1.00, 0.60, 0.35],
  [0.65, 1.00, 0.55],
  [0.95, 0.50, 0.90],
  [1.00, 0.90, 0.45],
];

/// Scene parameters collected from the command line.
#[derive(Clone, Debug)]
pub struct SceneArgs {
  pub comets: u32,
  pub particles_per_comet: u32,
  pub planets: u32,
  pub seed: u64,
  pub headless: bool,
  pub ticks: u64,
}

/// Closed elliptic track a comet source travels; the velocity fed to the
/// simulation is the unit tangent of the track.
struct CometPath {
  axis_u: Vector3<f32>,
  axis_v: Vector3<f32>,
  radius: f32,
  rate: f32,
  phase: f32,
}

impl CometPath {
  fn random(rng: &mut SmallRng) -> Self {
    let normal: [f32; 3] = rng.sample(UnitSphere);
    let normal = Vector3::from(normal);
    let helper = if normal.x.abs() < 0.9 {
      Vector3::unit_x()
    } else {
      Vector3::unit_y()
    };
    let axis_u = normal.cross(helper).normalize();
    let axis_v = normal.cross(axis_u);
    Self {
      axis_u,
      axis_v,
      radius: 12.0 + rng.gen::<f32>() * 8.0,
      rate: 0.15 + rng.gen::<f32>() * 0.2,
      phase: rng.gen::<f32>() * std::f32::consts::TAU,
    }
  }

  fn position(&self, time: f32) -> Vector3<f32> {
    let angle = self.rate * time + self.phase;
    (self.axis_u * angle.cos() + self.axis_v * angle.sin()) * self.radius
  }

  fn velocity(&self, time: f32) -> Vector3<f32> {
    let angle = self.rate * time + self.phase;
    (self.axis_v * angle.cos() - self.axis_u * angle.sin()).normalize()
  }
}

/// Circular planet orbit in the ecliptic; rate follows a
/// Kepler-style speed-for-radius rule.
struct PlanetOrbit {
  orbit_radius: f32,
  rate: f32,
  phase: f32,
  body_radius: f32,
  mass: f32,
}

impl PlanetOrbit {
  fn random(rng: &mut SmallRng) -> Self {
    let orbit_radius = 8.0 + rng.gen::<f32>() * 10.0;
    Self {
      orbit_radius,
      rate: 10.0 * orbit_radius.powf(-1.5),
      phase: rng.gen::<f32>() * std::f32::consts::TAU,
      body_radius: 1.5 + rng.gen::<f32>() * 1.5,
      mass: 15.0 + rng.gen::<f32>() * 20.0,
    }
  }

  fn position(&self, time: f32) -> Vector3<f32> {
    let angle = self.rate * time + self.phase;
    Vector3::new(
      angle.cos() * self.orbit_radius,
      0.0,
      angle.sin() * self.orbit_radius,
    )
  }
}

/// Aggregate per-tick numbers reported by the headless loop.
pub struct SceneStats {
  pub mean_speed: f32,
  pub max_speed: f32,
  pub halo_luminance: f32,
}

/// The demo scene: comet particle sources, planet attractors, halo-tagged
/// lights, and the two core passes wired into one per-tick pipeline.
pub struct Scene {
  time: f32,
  sources: SourceSet,
  attractors: AttractorSet,
  simulation: Simulation,
  lights: LightsPass,
  halo_sprite: SpriteImage,
  overlay: FrameImage,
  comet_paths: Vec<CometPath>,
  planet_orbits: Vec<PlanetOrbit>,
  comet_lights: Vec<usize>,
  instances: Vec<ParticleInstance>,
  overlay_bytes: Vec<u8>,
}

impl Scene {
  /// Registers sources, attractors and lights, then allocates the
  /// simulation buffers. Any capacity overflow surfaces here, before the
  /// first tick.
  pub fn build(
    args: &SceneArgs,
    overlay_width: usize,
    overlay_height: usize,
  ) -> Result<Self, ConfigError> {
    let mut rng = SmallRng::seed_from_u64(args.seed);

    let mut sources = SourceSet::new();
    let mut comet_paths = Vec::new();
    for i in 0..args.comets {
      let path = CometPath::random(&mut rng);
      sources.push(SourceConfig {
        position: path.position(0.0),
        velocity: path.velocity(0.0),
        color: COMET_COLORS[i as usize % COMET_COLORS.len()],
        particle_count: args.particles_per_comet as usize,
        fade_time: COMET_FADE,
      })?;
      comet_paths.push(path);
    }

    let mut attractors = AttractorSet::new();
    attractors.push(Attractor {
      position: Vector3::new(0.0, 0.0, 0.0),
      mass: SUN_MASS,
      capture_radius: SUN_RADIUS,
    })?;
    let mut planet_orbits = Vec::new();
    for _ in 0..args.planets {
      let orbit = PlanetOrbit::random(&mut rng);
      attractors.push(Attractor {
        position: orbit.position(0.0),
        mass: orbit.mass,
        capture_radius: orbit.body_radius,
      })?;
      planet_orbits.push(orbit);
    }

    let simulation = Simulation::new(&sources, args.seed)?;

    let mut lights = LightsPass::new(overlay_width, overlay_height);
    lights.add_light(
      Light {
        position: Point3::new(0.0, 0.0, 0.0),
        color: [1.0, 0.9, 0.7],
        intensity: 1.5,
        range: 0.0,
        shape: LightShape::Point,
      },
      HaloParams {
        light_radius: SUN_RADIUS,
        halo_size: 0.5,
      },
    )?;
    let mut comet_lights = Vec::new();
    for source in sources.iter() {
      let index = lights.add_light(
        Light {
          position: Point3::from_vec(source.position),
          color: source.color,
          intensity: 1.0,
          range: 80.0,
          shape: LightShape::Point,
        },
        HaloParams {
          light_radius: 0.5,
          halo_size: 4.0,
        },
      )?;
      comet_lights.push(index);
    }

    log::info!(
      "scene: {} comets x {} particles, {} planets, {} lights ({}x{} state buffer)",
      args.comets,
      args.particles_per_comet,
      args.planets,
      lights.len(),
      simulation.side(),
      simulation.side(),
    );

    Ok(Self {
      time: 0.0,
      sources,
      attractors,
      simulation,
      lights,
      halo_sprite: SpriteImage::radial_halo(64),
      overlay: FrameImage::new(overlay_width, overlay_height),
      comet_paths,
      planet_orbits,
      comet_lights,
      instances: Vec::new(),
      overlay_bytes: Vec::new(),
    })
  }

  /// One tick of the full pipeline: advance the scene bodies, step the
  /// particle kernel into the inactive buffer, then rebuild the halo
  /// overlay from the same frame's camera.
  pub fn tick(&mut self, delta: f32, camera: &Camera) {
    let delta = delta.clamp(0.0, DELTA_CLAMP);
    self.time += delta;

    for (i, path) in self.comet_paths.iter().enumerate() {
      if let Some(source) = self.sources.get_mut(i) {
        source.position = path.position(self.time);
        source.velocity = path.velocity(self.time);
      }
    }
    for (i, orbit) in self.planet_orbits.iter().enumerate() {
      if let Some(attractor) = self.attractors.get_mut(i + 1) {
        attractor.position = orbit.position(self.time);
      }
    }

    let params = StepParams {
      delta,
      time: self.time,
      ..StepParams::default()
    };
    self.simulation.step(&params, &self.sources, &self.attractors);

    for (i, light_index) in self.comet_lights.iter().enumerate() {
      if let Some(entry) = self.lights.entry_mut(*light_index) {
        if let Some(path) = self.comet_paths.get(i) {
          entry.light.position = Point3::from_vec(path.position(self.time));
        }
      }
    }

    self.render_depth(camera);

    let frame = camera.frame();
    let sprites = self.lights.project(&frame);
    self.overlay.clear([0.0; 4]);
    self.lights.composite(&sprites, &self.halo_sprite, &mut self.overlay);
  }

  /// Depth pre-pass stand-in: stamps the sun's and planets' silhouettes
  /// into the pass's depth target from the committed camera state.
  fn render_depth(&mut self, camera: &Camera) {
    let frame = camera.frame();
    let width = self.overlay.width() as f32;
    let height = self.overlay.height() as f32;
    let tan_half = (camera.fovy.to_radians() / 2.0).tan();

    self.lights.depth_mut().clear();
    let mut bodies = vec![(Vector3::new(0.0, 0.0, 0.0), SUN_RADIUS)];
    for orbit in &self.planet_orbits {
      bodies.push((orbit.position(self.time), orbit.body_radius));
    }

    for (position, body_radius) in bodies {
      let clip = frame.proj_view * Point3::from_vec(position).to_homogeneous();
      if clip.w <= 0.0 {
        continue;
      }
      let u = clip.x / clip.w * 0.5 + 0.5;
      let v = clip.y / clip.w * 0.5 + 0.5;
      let distance = (Point3::from_vec(position) - frame.position).magnitude();
      if distance <= body_radius {
        continue;
      }
      let radius_px = body_radius / distance / tan_half * height / 2.0;
      let value = frame.far - clip.z;
      self
        .lights
        .depth_mut()
        .splat_disc(u * width, v * height, radius_px, value);
    }
  }

  /// Rebuilds the particle draw list from the current state buffer,
  /// blending each particle's owner color with light from the other
  /// sources and scaling by its remaining fade time.
  pub fn update_instances(&mut self) -> &[ParticleInstance] {
    let state = self.simulation.current();
    self.instances.clear();
    self.instances.reserve(self.simulation.particle_count());

    for i in 0..self.simulation.particle_count() {
      let (head, tail) = state.particle(i);
      let position = Vector3::new(head[0], head[1], head[2]);
      let owner_tag = head[3].round() as i64;

      let mut lighting = Vector3::new(0.2, 0.2, 0.2);
      let mut lighting_alpha = 0.0;
      let mut fade = 0.0;
      for source in self.sources.iter() {
        if source.index() as i64 == owner_tag {
          lighting += Vector3::from(source.color);
          lighting_alpha += 1.0;
          if source.fade_time > 0.0 {
            fade = (tail[3] / source.fade_time).clamp(0.0, 1.0);
          }
        } else {
          let weight = (1.0 - (source.position - position).magnitude() / 20.0).max(0.0);
          lighting += Vector3::from(source.color) * weight;
          lighting_alpha += weight;
        }
      }

      let color = lighting * fade;
      self.instances.push(ParticleInstance {
        position: [head[0], head[1], head[2]],
        color: [
          color.x,
          color.y,
          color.z,
          (0.5 * lighting_alpha * fade).min(1.0),
        ],
      });
    }
    &self.instances
  }

  /// The composited halo overlay as tightly packed RGBA8.
  pub fn overlay_rgba(&mut self) -> &[u8] {
    self.overlay.write_rgba8(&mut self.overlay_bytes);
    &self.overlay_bytes
  }

  #[must_use]
  pub fn particle_capacity(&self) -> u32 {
    self.simulation.particle_count() as u32
  }

  #[must_use]
  pub fn stats(&self) -> SceneStats {
    let state = self.simulation.current();
    let count = self.simulation.particle_count();
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for i in 0..count {
      let (_, tail) = state.particle(i);
      let speed = Vector3::new(tail[0], tail[1], tail[2]).magnitude();
      sum += speed;
      max = max.max(speed);
    }
    SceneStats {
      mean_speed: if count > 0 { sum / count as f32 } else { 0.0 },
      max_speed: max,
      halo_luminance: self.overlay.luminance_sum(),
    }
  }
}

struct EventLoopWrapper {
  event_loop: EventLoop<()>,
  window: Arc<Window>,
}

impl EventLoopWrapper {
  pub fn new(title: &str) -> Self {
    let event_loop = EventLoop::new().unwrap();
    let mut builder = winit::window::WindowBuilder::new();
    builder = builder
      .with_title(title)
      .with_inner_size(LogicalSize::new(1280.0, 720.0))
      .with_resizable(false);
    let window = Arc::new(builder.build(&event_loop).unwrap());

    Self { event_loop, window }
  }
}

struct SurfaceWrapper {
  surface: Option<wgpu::Surface<'static>>,
  config: Option<wgpu::SurfaceConfiguration>,
}

impl SurfaceWrapper {
  fn new() -> Self {
    Self {
      surface: None,
      config: None,
    }
  }

  fn resume(&mut self, context: &State, window: Arc<Window>) {
    let window_size = window.inner_size();
    let width = window_size.width.max(1);
    let height = window_size.height.max(1);
    self.surface = Some(context.instance.create_surface(window).unwrap());
    let surface = self.surface.as_ref().unwrap();
    let mut config = surface
      .get_default_config(&context.adapter, width, height)
      .unwrap();
    let view_format = config.format.add_srgb_suffix();
    config.view_formats.push(view_format);
    surface.configure(&context.device, &config);
    self.config = Some(config);
  }

  fn acquire(&mut self, context: &State) -> wgpu::SurfaceTexture {
    let surface = self.surface.as_ref().unwrap();

    match surface.get_current_texture() {
      Ok(frame) => frame,
      Err(wgpu::SurfaceError::Timeout) => surface.get_current_texture().unwrap(),
      Err(
        wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost | wgpu::SurfaceError::OutOfMemory,
      ) => {
        surface.configure(&context.device, self.config());
        surface.get_current_texture().unwrap()
      }
    }
  }

  fn config(&self) -> &wgpu::SurfaceConfiguration {
    self.config.as_ref().unwrap()
  }
}

struct State {
  instance: wgpu::Instance,
  adapter: wgpu::Adapter,
  device: wgpu::Device,
  queue: wgpu::Queue,
  camera: Camera,
  camera_uniform: CameraUniform,
  camera_buffer: wgpu::Buffer,
  camera_bind_group: wgpu::BindGroup,
  camera_controller: CameraController,
  camera_bind_group_layout: wgpu::BindGroupLayout,
}

impl State {
  fn input(&mut self, event: &WindowEvent) -> bool {
    self.camera_controller.process_events(event)
  }

  fn update(&mut self) {
    self.camera_controller.update_camera(&mut self.camera);
    self.camera_uniform.update_view_proj(&self.camera);
    self.queue.write_buffer(
      &self.camera_buffer,
      0,
      bytemuck::cast_slice(&[self.camera_uniform]),
    );
  }

  async fn init(aspect: f32) -> Self {
    use wgpu::util::DeviceExt;

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
      backends: wgpu::Backends::PRIMARY,
      ..Default::default()
    });

    let adapter = instance
      .request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::default(),
        compatible_surface: None,
        force_fallback_adapter: false,
      })
      .await
      .unwrap();

    let (device, queue) = adapter
      .request_device(
        &wgpu::DeviceDescriptor {
          label: None,
          required_features: wgpu::Features::empty(),
          required_limits: wgpu::Limits::default(),
          memory_hints: Default::default(),
        },
        None,
      )
      .await
      .unwrap();

    let camera = Camera {
      eye: (0.0, 14.0, 32.0).into(),
      target: (0.0, 0.0, 0.0).into(),
      up: cgmath::Vector3::unit_y(),
      aspect,
      fovy: 45.0,
      znear: 0.1,
      zfar: 200.0,
    };
    let mut camera_uniform = CameraUniform::new();
    camera_uniform.update_view_proj(&camera);

    let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some("Camera Buffer"),
      contents: bytemuck::cast_slice(&[camera_uniform]),
      usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let camera_bind_group_layout =
      device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
          binding: 0,
          visibility: wgpu::ShaderStages::VERTEX,
          ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
          },
          count: None,
        }],
        label: Some("camera_bind_group_layout"),
      });
    let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
      layout: &camera_bind_group_layout,
      entries: &[wgpu::BindGroupEntry {
        binding: 0,
        resource: camera_buffer.as_entire_binding(),
      }],
      label: Some("camera_bind_group"),
    });
    let camera_controller = CameraController::init(0.2, 0.02);

    Self {
      instance,
      adapter,
      device,
      queue,
      camera,
      camera_uniform,
      camera_buffer,
      camera_bind_group,
      camera_controller,
      camera_bind_group_layout,
    }
  }
}

async fn start(args: SceneArgs) -> Result<(), ConfigError> {
  let window_loop = EventLoopWrapper::new("Comet Sim");
  let window_size = window_loop.window.inner_size();
  let overlay_size = (
    (window_size.width / 2).max(1) as usize,
    (window_size.height / 2).max(1) as usize,
  );

  let mut scene = Scene::build(&args, overlay_size.0, overlay_size.1)?;
  let mut context = State::init(window_size.width.max(1) as f32 / window_size.height.max(1) as f32).await;
  let mut surface = SurfaceWrapper::new();
  let event_loop_function = EventLoop::run;
  let mut renderer = None;
  let mut last_frame = Instant::now();

  let _ = (event_loop_function)(
    window_loop.event_loop,
    move |event, target: &EventLoopWindowTarget<()>| match event {
      Event::NewEvents(StartCause::Init) => {
        surface.resume(&context, window_loop.window.clone());
        if renderer.is_none() {
          renderer = Some(Render::init(
            surface.config(),
            &context.device,
            &context.camera_bind_group_layout,
            scene.particle_capacity(),
            (overlay_size.0 as u32, overlay_size.1 as u32),
          ));
        }
      }
      Event::WindowEvent { event, window_id } if window_id == window_loop.window.id() => {
        if !context.input(&event) {
          match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
              event:
                KeyEvent {
                  state: ElementState::Pressed,
                  physical_key: PhysicalKey::Code(KeyCode::Escape),
                  ..
                },
              ..
            } => target.exit(),
            WindowEvent::RedrawRequested => {
              window_loop.window.request_redraw();
              if renderer.is_none() {
                return;
              }
              context.update();

              let now = Instant::now();
              let delta = now.duration_since(last_frame).as_secs_f32();
              last_frame = now;
              scene.tick(delta, &context.camera);

              if let Some(renderer) = &mut renderer {
                renderer.update_particles(&context.queue, scene.update_instances());
                renderer.update_overlay(&context.queue, scene.overlay_rgba());

                let frame = surface.acquire(&context);
                let view = frame.texture.create_view(&wgpu::TextureViewDescriptor {
                  format: Some(surface.config().view_formats[0]),
                  ..wgpu::TextureViewDescriptor::default()
                });
                renderer.render(
                  &view,
                  &context.device,
                  &context.queue,
                  &context.camera_bind_group,
                );
                frame.present();
              }
            }
            _ => {}
          }
        }
      }
      _ => {}
    },
  );
  Ok(())
}

fn run_headless(args: &SceneArgs) -> Result<(), ConfigError> {
  let mut scene = Scene::build(args, 640, 360)?;
  let camera = Camera {
    eye: (0.0, 14.0, 32.0).into(),
    target: (0.0, 0.0, 0.0).into(),
    up: cgmath::Vector3::unit_y(),
    aspect: 16.0 / 9.0,
    fovy: 45.0,
    znear: 0.1,
    zfar: 200.0,
  };

  let stop = Arc::new(AtomicBool::new(false));
  let handler_stop = stop.clone();
  if ctrlc::set_handler(move || handler_stop.store(true, Ordering::SeqCst)).is_err() {
    log::warn!("could not install interrupt handler; run will not stop on ctrl-c");
  }

  let delta = 1.0 / 60.0;
  let mut tick = 0u64;
  while !stop.load(Ordering::SeqCst) && (args.ticks == 0 || tick < args.ticks) {
    scene.tick(delta, &camera);
    tick += 1;
    if tick % 300 == 0 {
      let stats = scene.stats();
      log::info!(
        "tick {tick}: mean speed {:.2}, max speed {:.2}, halo luminance {:.1}",
        stats.mean_speed,
        stats.max_speed,
        stats.halo_luminance,
      );
    }
  }

  let stats = scene.stats();
  log::info!(
    "simulated {tick} ticks ({:.1}s scene time), final mean speed {:.2}",
    tick as f32 * delta,
    stats.mean_speed,
  );
  Ok(())
}

pub fn run(args: SceneArgs) -> Result<(), ConfigError> {
  env_logger::init();
  if args.headless {
    run_headless(&args)
  } else {
    pollster::block_on(start(args))
  }
}
