use cgmath::{InnerSpace, Point3, Vector2, Vector3};

use crate::camera::CameraFrame;
use crate::{ConfigError, MAX_LIGHTS};

/// Halos whose reciprocal size falls below this are degenerate or behind
/// the camera and contribute nothing for the frame.
const MIN_INV_SIZE: f32 = 1e-2;
/// Corner offset factor of the 4-tap occlusion test, in halo-scaled uv.
const DEPTH_TAP_SHIFT: f32 = 0.025;
/// Half-extent factor of the out-of-view culling footprint.
const FOOTPRINT_EXTENT: f32 = 0.05;

#[derive(Clone, Copy, Debug)]
pub enum LightShape {
  Point,
  /// Cone-restricted light aimed at `target`; the halo dims as the view
  /// axis leaves the cone.
  Spot {
    target: Point3<f32>,
    angle: f32,
    exponent: f32,
  },
}

#[derive(Clone, Debug)]
pub struct Light {
  pub position: Point3<f32>,
  pub color: [f32; 3],
  pub intensity: f32,
  /// Distance-falloff range; zero or negative disables the falloff.
  pub range: f32,
  pub shape: LightShape,
}

/// Per-light halo parameters supplied at registration.
#[derive(Clone, Copy, Debug)]
pub struct HaloParams {
  /// World-space slack added to the depth comparison, letting a halo
  /// survive partial occlusion by nearby geometry.
  pub light_radius: f32,
  /// Larger values shrink the on-screen halo.
  pub halo_size: f32,
}

impl Default for HaloParams {
  fn default() -> Self {
    Self {
      light_radius: 0.0,
      halo_size: 1.0,
    }
  }
}

#[derive(Clone, Debug)]
pub struct LightEntry {
  pub light: Light,
  pub halo: HaloParams,
}

/// A light projected into screen space for one tick. Not persisted; derived
/// from the light's current transform every frame.
#[derive(Clone, Copy, Debug)]
pub struct LightSprite {
  /// Screen position in [0, 1] uv.
  pub uv: Vector2<f32>,
  /// clip.z / halo_size; scales the halo footprint down with distance.
  pub inv_size: f32,
  /// far - clip.z + light_radius; samples at or below this pass the test.
  pub depth_limit: f32,
  /// Effective color after intensity, falloff, cone and view culling.
  pub color: [f32; 3],
}

/// Float depth target storing `far - clip.z` per pixel. Cleared to zero,
/// which reads as infinitely far; nearer geometry stores larger values.
pub struct DepthImage {
  width: usize,
  height: usize,
  texels: Vec<f32>,
}

impl DepthImage {
  #[must_use]
  pub fn new(width: usize, height: usize) -> Self {
    Self {
      width,
      height,
      texels: vec![0.0; width * height],
    }
  }

  pub fn clear(&mut self) {
    self.texels.fill(0.0);
  }

  pub fn set(&mut self, x: usize, y: usize, value: f32) {
    self.texels[y * self.width + x] = value;
  }

  #[must_use]
  pub fn get(&self, x: usize, y: usize) -> f32 {
    self.texels[y * self.width + x]
  }

  /// Nearest sample with clamp-to-edge addressing.
  #[must_use]
  pub fn sample(&self, u: f32, v: f32) -> f32 {
    let x = (u * self.width as f32).floor().clamp(0.0, (self.width - 1) as f32) as usize;
    let y = (v * self.height as f32).floor().clamp(0.0, (self.height - 1) as f32) as usize;
    self.texels[y * self.width + x]
  }

  /// Writes a filled disc, keeping the nearest depth where discs overlap.
  /// Lets a scene renderer stamp silhouettes without a full depth pass.
  pub fn splat_disc(&mut self, cx: f32, cy: f32, radius: f32, value: f32) {
    let x0 = (cx - radius).floor().max(0.0) as usize;
    let x1 = ((cx + radius).ceil() as usize).min(self.width.saturating_sub(1));
    let y0 = (cy - radius).floor().max(0.0) as usize;
    let y1 = ((cy + radius).ceil() as usize).min(self.height.saturating_sub(1));
    if x0 > x1 || y0 > y1 {
      return;
    }
    for y in y0..=y1 {
      for x in x0..=x1 {
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        if dx * dx + dy * dy <= radius * radius {
          let texel = &mut self.texels[y * self.width + x];
          *texel = texel.max(value);
        }
      }
    }
  }
}

/// RGBA float frame the halo pass composites into.
pub struct FrameImage {
  width: usize,
  height: usize,
  texels: Vec<[f32; 4]>,
}

impl FrameImage {
  #[must_use]
  pub fn new(width: usize, height: usize) -> Self {
    Self {
      width,
      height,
      texels: vec![[0.0; 4]; width * height],
    }
  }

  #[must_use]
  pub fn width(&self) -> usize {
    self.width
  }

  #[must_use]
  pub fn height(&self) -> usize {
    self.height
  }

  pub fn clear(&mut self, color: [f32; 4]) {
    self.texels.fill(color);
  }

  #[must_use]
  pub fn pixel(&self, x: usize, y: usize) -> [f32; 4] {
    self.texels[y * self.width + x]
  }

  pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [f32; 4] {
    &mut self.texels[y * self.width + x]
  }

  /// Total color across the frame; cheap way for callers to notice whether
  /// a pass contributed anything.
  #[must_use]
  pub fn luminance_sum(&self) -> f32 {
    self
      .texels
      .iter()
      .map(|texel| texel[0] + texel[1] + texel[2])
      .sum()
  }

  /// 8-bit copy for texture upload, clamped per channel.
  pub fn write_rgba8(&self, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(self.texels.len() * 4);
    for texel in &self.texels {
      for channel in texel {
        out.push((channel.clamp(0.0, 1.0) * 255.0) as u8);
      }
    }
  }
}

/// Sprite texture sampled over a halo footprint.
pub struct SpriteImage {
  side: usize,
  texels: Vec<[f32; 4]>,
}

impl SpriteImage {
  /// Procedural radial-falloff halo: white, alpha smoothly fading from the
  /// center to the edge.
  #[must_use]
  pub fn radial_halo(side: usize) -> Self {
    let mut texels = vec![[0.0; 4]; side * side];
    let center = side as f32 / 2.0;
    for y in 0..side {
      for x in 0..side {
        let dx = (x as f32 + 0.5 - center) / center;
        let dy = (y as f32 + 0.5 - center) / center;
        let fade = (1.0 - (dx * dx + dy * dy).sqrt()).clamp(0.0, 1.0);
        let alpha = fade * fade * (3.0 - 2.0 * fade);
        texels[y * side + x] = [1.0, 1.0, 1.0, alpha];
      }
    }
    Self { side, texels }
  }

  /// Bilinear sample with clamp-to-edge addressing.
  #[must_use]
  pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
    let side = self.side as f32;
    let x = (u * side - 0.5).clamp(0.0, side - 1.0);
    let y = (v * side - 0.5).clamp(0.0, side - 1.0);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(self.side - 1);
    let y1 = (y0 + 1).min(self.side - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let mut out = [0.0; 4];
    for c in 0..4 {
      let top = self.texels[y0 * self.side + x0][c] * (1.0 - fx)
        + self.texels[y0 * self.side + x1][c] * fx;
      let bottom = self.texels[y1 * self.side + x0][c] * (1.0 - fx)
        + self.texels[y1 * self.side + x1][c] * fx;
      out[c] = top * (1.0 - fy) + bottom * fy;
    }
    out
  }
}

fn in_unit(x: f32, y: f32) -> bool {
  (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)
}

/// Postprocessing pass projecting registered lights into screen space and
/// compositing their halo sprites over the rendered frame. Owns the depth
/// target; the scene renderer rewrites it from the same camera snapshot
/// before `composite` runs.
pub struct LightsPass {
  entries: Vec<LightEntry>,
  depth: DepthImage,
  aspect: f32,
}

impl LightsPass {
  #[must_use]
  pub fn new(width: usize, height: usize) -> Self {
    Self {
      entries: Vec::new(),
      depth: DepthImage::new(width, height),
      aspect: width as f32 / height as f32,
    }
  }

  pub fn add_light(&mut self, light: Light, halo: HaloParams) -> Result<usize, ConfigError> {
    if self.entries.len() == MAX_LIGHTS {
      return Err(ConfigError::TooManyLights(self.entries.len() + 1));
    }
    self.entries.push(LightEntry { light, halo });
    Ok(self.entries.len() - 1)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn entry_mut(&mut self, index: usize) -> Option<&mut LightEntry> {
    self.entries.get_mut(index)
  }

  pub fn depth_mut(&mut self) -> &mut DepthImage {
    &mut self.depth
  }

  #[must_use]
  pub fn depth(&self) -> &DepthImage {
    &self.depth
  }

  /// Control side of the pass: projects every registered light and settles
  /// its effective color for the frame.
  #[must_use]
  pub fn project(&self, camera: &CameraFrame) -> Vec<LightSprite> {
    self
      .entries
      .iter()
      .map(|entry| self.project_one(camera, entry))
      .collect()
  }

  fn project_one(&self, camera: &CameraFrame, entry: &LightEntry) -> LightSprite {
    let light = &entry.light;
    let clip = camera.proj_view * light.position.to_homogeneous();
    let uv = Vector2::new(
      clip.x / clip.w * 0.5 + 0.5,
      clip.y / clip.w * 0.5 + 0.5,
    );
    let inv_size = clip.z / entry.halo.halo_size;
    let depth_limit = camera.far - clip.z + entry.halo.light_radius;

    let mut color = Vector3::from(light.color) * light.intensity;

    // Cheap out-of-view cull on the halo footprint, ahead of the depth taps
    let extent_x = FOOTPRINT_EXTENT / inv_size;
    let extent_y = extent_x * self.aspect;
    let on_screen = [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)]
      .iter()
      .any(|(sx, sy)| in_unit(uv.x + sx * extent_x, uv.y + sy * extent_y));

    if !on_screen {
      color = Vector3::new(0.0, 0.0, 0.0);
    } else {
      let to_light = light.position - camera.position;
      if light.range > 0.0 {
        color = color * (1.0 - (to_light.magnitude() / light.range).min(1.0));
      }
      if let LightShape::Spot {
        target,
        angle,
        exponent,
      } = light.shape
      {
        let beam = (light.position - target).normalize();
        let mut theta = beam.dot(to_light.normalize()).max(0.0);
        if theta < angle.cos() {
          theta = 0.0;
        }
        color = color * theta.powf(exponent);
      }
    }

    LightSprite {
      uv,
      inv_size,
      depth_limit,
      color: color.into(),
    }
  }

  /// Pixel side of the pass: occlusion-tests each sprite against the depth
  /// target (4 taps, OR semantics) and additively blends the halo sprite
  /// into `frame`.
  pub fn composite(&self, sprites: &[LightSprite], halo: &SpriteImage, frame: &mut FrameImage) {
    let aspect = self.aspect;
    let width = frame.width() as f32;
    let height = frame.height() as f32;

    for sprite in sprites {
      if sprite.inv_size <= MIN_INV_SIZE {
        continue;
      }
      if sprite.color == [0.0; 3] {
        continue;
      }

      let shift = Vector2::new(1.0, aspect) * (DEPTH_TAP_SHIFT / sprite.inv_size);
      let visible = [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)]
        .iter()
        .any(|(sx, sy)| {
          let depth = self
            .depth
            .sample(sprite.uv.x + sx * shift.x, sprite.uv.y + sy * shift.y);
          depth <= sprite.depth_limit
        });
      if !visible {
        continue;
      }

      // Pixel bounds of the halo footprint
      let half_u = 1.0 / (sprite.inv_size * aspect);
      let half_v = 1.0 / sprite.inv_size;
      let x0 = ((sprite.uv.x - half_u) * width).floor().clamp(0.0, width - 1.0) as usize;
      let x1 = ((sprite.uv.x + half_u) * width).ceil().clamp(0.0, width - 1.0) as usize;
      let y0 = ((sprite.uv.y - half_v) * height).floor().clamp(0.0, height - 1.0) as usize;
      let y1 = ((sprite.uv.y + half_v) * height).ceil().clamp(0.0, height - 1.0) as usize;

      for y in y0..=y1 {
        for x in x0..=x1 {
          let pixel_u = (x as f32 + 0.5) / width;
          let pixel_v = (y as f32 + 0.5) / height;
          let halo_u = (pixel_u - sprite.uv.x) * aspect * sprite.inv_size * 0.5 + 0.5;
          let halo_v = (pixel_v - sprite.uv.y) * sprite.inv_size * 0.5 + 0.5;
          if !in_unit(halo_u, halo_v) {
            continue;
          }
          let texel = halo.sample(halo_u, halo_v);
          let pixel = frame.pixel_mut(x, y);
          pixel[0] += sprite.color[0] * texel[0] * texel[3];
          pixel[1] += sprite.color[1] * texel[1] * texel[3];
          pixel[2] += sprite.color[2] * texel[2] * texel[3];
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn depth_sample_clamps_to_edges() {
    let mut depth = DepthImage::new(4, 4);
    depth.set(0, 0, 5.0);
    depth.set(3, 3, 9.0);
    assert_eq!(depth.sample(-1.0, -1.0), 5.0);
    assert_eq!(depth.sample(2.0, 2.0), 9.0);
  }

  #[test]
  fn splat_disc_keeps_nearest_depth() {
    let mut depth = DepthImage::new(8, 8);
    depth.splat_disc(4.0, 4.0, 3.0, 2.0);
    depth.splat_disc(4.0, 4.0, 1.5, 1.0);
    assert_eq!(depth.get(4, 4), 2.0);
  }

  #[test]
  fn halo_sprite_fades_to_the_edge() {
    let sprite = SpriteImage::radial_halo(32);
    let center = sprite.sample(0.5, 0.5);
    let edge = sprite.sample(0.0, 0.5);
    assert!(center[3] > 0.9);
    assert!(edge[3] < 0.1);
    assert!(center[3] > edge[3]);
  }

  #[test]
  fn light_capacity_is_enforced() {
    let mut pass = LightsPass::new(64, 64);
    let light = Light {
      position: Point3::new(0.0, 0.0, 0.0),
      color: [1.0, 1.0, 1.0],
      intensity: 1.0,
      range: 0.0,
      shape: LightShape::Point,
    };
    for _ in 0..crate::MAX_LIGHTS {
      pass.add_light(light.clone(), HaloParams::default()).unwrap();
    }
    assert!(matches!(
      pass.add_light(light, HaloParams::default()),
      Err(ConfigError::TooManyLights(_))
    ));
  }
}
