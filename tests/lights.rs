//! Halo Pass Visibility Tests
//!
//! Checks the screen-space culling, the 4-tap OR occlusion semantics and
//! the behind-camera guard of the light compositing pass.

use cgmath::{Point3, Vector2};
use comet_sim::camera::Camera;
use comet_sim::lights::{
  FrameImage, HaloParams, Light, LightShape, LightSprite, LightsPass, SpriteImage,
};

fn test_camera(eye: Point3<f32>) -> Camera {
  Camera {
    eye,
    target: (0.0, 0.0, 0.0).into(),
    up: cgmath::Vector3::unit_y(),
    aspect: 1.0,
    fovy: 45.0,
    znear: 0.1,
    zfar: 100.0,
  }
}

fn point_light(position: Point3<f32>) -> Light {
  Light {
    position,
    color: [1.0, 1.0, 1.0],
    intensity: 1.0,
    range: 0.0,
    shape: LightShape::Point,
  }
}

// ==================== FOOTPRINT CULLING ====================

#[test]
fn offscreen_halo_contributes_nothing() {
  let mut pass = LightsPass::new(64, 64);
  // In front of the camera but far off to the side.
  pass
    .add_light(point_light(Point3::new(100.0, 0.0, -20.0)), HaloParams::default())
    .unwrap();

  let camera = test_camera((0.0, 0.0, 10.0).into());
  let sprites = pass.project(&camera.frame());
  assert_eq!(sprites.len(), 1);
  assert_eq!(sprites[0].color, [0.0; 3], "out-of-view light must be culled");

  let halo = SpriteImage::radial_halo(32);
  let mut frame = FrameImage::new(64, 64);
  pass.composite(&sprites, &halo, &mut frame);
  assert_eq!(frame.luminance_sum(), 0.0);
}

#[test]
fn onscreen_halo_does_contribute() {
  let mut pass = LightsPass::new(64, 64);
  pass
    .add_light(point_light(Point3::new(0.0, 0.0, 0.0)), HaloParams::default())
    .unwrap();

  let camera = test_camera((0.0, 0.0, 10.0).into());
  let sprites = pass.project(&camera.frame());
  assert!(sprites[0].color != [0.0; 3]);

  let halo = SpriteImage::radial_halo(32);
  let mut frame = FrameImage::new(64, 64);
  pass.composite(&sprites, &halo, &mut frame);
  assert!(frame.luminance_sum() > 0.0);
}

// ==================== DEPTH TEST OR SEMANTICS ====================

#[test]
fn one_passing_corner_keeps_the_halo_visible() {
  let mut pass = LightsPass::new(40, 40);
  let sprite = LightSprite {
    uv: Vector2::new(0.5, 0.5),
    inv_size: 1.0,
    depth_limit: 50.0,
    color: [1.0, 0.0, 0.0],
  };
  let halo = SpriteImage::radial_halo(32);

  // Occluding geometry everywhere: every tap reads nearer than the light.
  for y in 0..40 {
    for x in 0..40 {
      pass.depth_mut().set(x, y, 60.0);
    }
  }
  let mut frame = FrameImage::new(40, 40);
  pass.composite(&[sprite], &halo, &mut frame);
  assert_eq!(
    frame.luminance_sum(),
    0.0,
    "fully occluded light must not render"
  );

  // Taps land at uv 0.475/0.525, i.e. pixels 19 and 21. Open one corner.
  pass.depth_mut().set(21, 21, 40.0);
  let mut frame = FrameImage::new(40, 40);
  pass.composite(&[sprite], &halo, &mut frame);
  assert!(
    frame.luminance_sum() > 0.0,
    "a single passing corner must keep the halo visible"
  );
}

// ==================== BEHIND-CAMERA GUARD ====================

#[test]
fn light_behind_the_camera_is_skipped() {
  let mut pass = LightsPass::new(64, 64);
  pass
    .add_light(point_light(Point3::new(0.0, 0.0, 50.0)), HaloParams::default())
    .unwrap();

  let camera = test_camera((0.0, 0.0, 5.0).into());
  let sprites = pass.project(&camera.frame());
  assert!(sprites[0].inv_size <= 1e-2);

  let halo = SpriteImage::radial_halo(32);
  let mut frame = FrameImage::new(64, 64);
  pass.composite(&sprites, &halo, &mut frame);
  assert_eq!(frame.luminance_sum(), 0.0);
}

// ==================== ATTENUATION ====================

#[test]
fn range_falloff_silences_distant_lights() {
  let mut pass = LightsPass::new(64, 64);
  let mut light = point_light(Point3::new(0.0, 0.0, 0.0));
  light.range = 5.0;
  pass.add_light(light, HaloParams::default()).unwrap();

  // Camera 10 units away; the light's range ends at 5.
  let camera = test_camera((0.0, 0.0, 10.0).into());
  let sprites = pass.project(&camera.frame());
  assert_eq!(sprites[0].color, [0.0; 3]);
}

#[test]
fn spot_cone_gates_the_halo() {
  let mut pass = LightsPass::new(64, 64);
  // Spot at the origin aimed away from the camera.
  pass
    .add_light(
      Light {
        position: Point3::new(0.0, 0.0, 0.0),
        color: [1.0, 1.0, 1.0],
        intensity: 1.0,
        range: 0.0,
        shape: LightShape::Spot {
          target: Point3::new(0.0, 0.0, -10.0),
          angle: 0.4,
          exponent: 2.0,
        },
      },
      HaloParams::default(),
    )
    .unwrap();

  let camera = test_camera((0.0, 0.0, 10.0).into());
  let sprites = pass.project(&camera.frame());
  assert_eq!(sprites[0].color, [0.0; 3], "camera outside the cone");
}
