use cgmath::{Deg, InnerSpace, Matrix4, Point3, Rad, Rotation, Rotation3, SquareMatrix, Vector3};
use winit::{
  event::{ElementState, KeyEvent, WindowEvent},
  keyboard::{KeyCode, PhysicalKey},
};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.5,
    0.0, 0.0, 0.0, 1.0,
);

pub struct Camera {
  pub eye: Point3<f32>,
  pub target: Point3<f32>,
  pub up: Vector3<f32>,
  pub aspect: f32,
  pub fovy: f32,
  pub znear: f32,
  pub zfar: f32,
}

impl Camera {
  fn projection(&self) -> Matrix4<f32> {
    cgmath::perspective(Deg(self.fovy), self.aspect, self.znear, self.zfar)
  }

  fn view(&self) -> Matrix4<f32> {
    Matrix4::look_at_rh(self.eye, self.target, self.up)
  }

  fn build_view_projection_matrix(&self) -> Matrix4<f32> {
    OPENGL_TO_WGPU_MATRIX * self.projection() * self.view()
  }

  /// Per-tick snapshot consumed by the lights pass: the plain clip-space
  /// projection (no wgpu depth remap) plus what the attenuation math needs.
  #[must_use]
  pub fn frame(&self) -> CameraFrame {
    CameraFrame {
      proj_view: self.projection() * self.view(),
      position: self.eye,
      far: self.zfar,
      aspect: self.aspect,
    }
  }
}

/// Committed camera state for one tick. The depth pre-pass and the light
/// projection both derive from the same snapshot, so halo positions can
/// never lag the occlusion test.
#[derive(Clone, Copy, Debug)]
pub struct CameraFrame {
  pub proj_view: Matrix4<f32>,
  pub position: Point3<f32>,
  pub far: f32,
  pub aspect: f32,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
  view_proj: [[f32; 4]; 4],
}

impl CameraUniform {
  #[must_use]
  pub fn new() -> Self {
    Self {
      view_proj: Matrix4::identity().into(),
    }
  }

  pub fn update_view_proj(&mut self, camera: &Camera) {
    self.view_proj = camera.build_view_projection_matrix().into();
  }
}

impl Default for CameraUniform {
  fn default() -> Self {
    Self::new()
  }
}

pub struct CameraController {
  speed: f32,
  rotation_speed: f32,
  is_forward_pressed: bool,
  is_backward_pressed: bool,
  is_left_pressed: bool,
  is_right_pressed: bool,
  is_rotate_up_pressed: bool,
  is_rotate_down_pressed: bool,
}

impl CameraController {
  #[must_use]
  pub fn init(speed: f32, rotation_speed: f32) -> Self {
    Self {
      speed,
      rotation_speed,
      is_forward_pressed: false,
      is_backward_pressed: false,
      is_left_pressed: false,
      is_right_pressed: false,
      is_rotate_up_pressed: false,
      is_rotate_down_pressed: false,
    }
  }

  pub fn process_events(&mut self, event: &WindowEvent) -> bool {
    match event {
      WindowEvent::KeyboardInput {
        event:
          KeyEvent {
            state,
            physical_key: PhysicalKey::Code(keycode),
            ..
          },
        ..
      } => {
        let is_pressed = *state == ElementState::Pressed;
        match keycode {
          KeyCode::KeyW | KeyCode::ArrowUp => {
            self.is_forward_pressed = is_pressed;
            true
          }
          KeyCode::KeyA | KeyCode::ArrowLeft => {
            self.is_left_pressed = is_pressed;
            true
          }
          KeyCode::KeyS | KeyCode::ArrowDown => {
            self.is_backward_pressed = is_pressed;
            true
          }
          KeyCode::KeyD | KeyCode::ArrowRight => {
            self.is_right_pressed = is_pressed;
            true
          }
          KeyCode::KeyQ => {
            self.is_rotate_up_pressed = is_pressed;
            true
          }
          KeyCode::KeyE => {
            self.is_rotate_down_pressed = is_pressed;
            true
          }
          _ => false,
        }
      }
      _ => false,
    }
  }

  pub fn update_camera(&self, camera: &mut Camera) {
    let forward = camera.target - camera.eye;
    let forward_norm = forward.normalize();
    let forward_mag = forward.magnitude();

    if self.is_forward_pressed && forward_mag > self.speed {
      camera.eye += forward_norm * self.speed;
    }
    if self.is_backward_pressed {
      camera.eye -= forward_norm * self.speed;
    }

    let right = forward_norm.cross(camera.up);

    if self.is_right_pressed {
      camera.eye = camera.target - (forward + right * self.speed).normalize() * forward_mag;
    }
    if self.is_left_pressed {
      camera.eye = camera.target - (forward - right * self.speed).normalize() * forward_mag;
    }

    if self.is_rotate_up_pressed {
      let rotation = cgmath::Quaternion::from_axis_angle(right.normalize(), Rad(self.rotation_speed));
      camera.eye = camera.target - rotation.rotate_vector(forward);
      camera.up = rotation.rotate_vector(camera.up);
    }
    if self.is_rotate_down_pressed {
      let rotation = cgmath::Quaternion::from_axis_angle(right.normalize(), Rad(-self.rotation_speed));
      camera.eye = camera.target - rotation.rotate_vector(forward);
      camera.up = rotation.rotate_vector(camera.up);
    }
  }
}
