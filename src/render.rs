use std::borrow::Cow;

use wgpu::{util::DeviceExt, PipelineCompilationOptions};

/// Per-particle draw data rebuilt from the simulation state every frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleInstance {
  pub position: [f32; 3],
  pub color: [f32; 4],
}

const INSTANCE_STRIDE: u64 = std::mem::size_of::<ParticleInstance>() as u64;

pub struct Render {
  particle_pipeline: wgpu::RenderPipeline,
  overlay_pipeline: wgpu::RenderPipeline,
  vertices_buffer: wgpu::Buffer,
  instance_buffer: wgpu::Buffer,
  instance_capacity: u32,
  instance_count: u32,
  overlay_texture: wgpu::Texture,
  overlay_extent: wgpu::Extent3d,
  overlay_bind_group: wgpu::BindGroup,
}

impl Render {
  #[must_use]
  pub fn init(
    config: &wgpu::SurfaceConfiguration,
    device: &wgpu::Device,
    camera_bind_group_layout: &wgpu::BindGroupLayout,
    instance_capacity: u32,
    overlay_size: (u32, u32),
  ) -> Self {
    let draw_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
      label: Some("particle draw"),
      source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/draw.wgsl"))),
    });
    let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
      label: Some("halo overlay"),
      source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!("shaders/blit.wgsl"))),
    });

    // ========================================================================
    // particle pipeline
    // ========================================================================

    let particle_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some("particles"),
      bind_group_layouts: &[camera_bind_group_layout],
      push_constant_ranges: &[],
    });
    let instance_layout = wgpu::VertexBufferLayout {
      array_stride: INSTANCE_STRIDE,
      step_mode: wgpu::VertexStepMode::Instance,
      attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4],
    };
    let vertex_layout = wgpu::VertexBufferLayout {
      array_stride: 3 * 4,
      step_mode: wgpu::VertexStepMode::Vertex,
      attributes: &wgpu::vertex_attr_array![2 => Float32x3],
    };
    let additive = wgpu::BlendState {
      color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
      },
      alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
      },
    };
    let particle_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
      label: Some("particle pipeline"),
      layout: Some(&particle_pipeline_layout),
      vertex: wgpu::VertexState {
        module: &draw_shader,
        entry_point: "main_vs",
        compilation_options: PipelineCompilationOptions::default(),
        buffers: &[instance_layout, vertex_layout],
      },
      fragment: Some(wgpu::FragmentState {
        module: &draw_shader,
        entry_point: "main_fs",
        compilation_options: PipelineCompilationOptions::default(),
        targets: &[Some(wgpu::ColorTargetState {
          format: config.view_formats[0],
          blend: Some(additive),
          write_mask: wgpu::ColorWrites::ALL,
        })],
      }),
      primitive: wgpu::PrimitiveState::default(),
      depth_stencil: None,
      multisample: wgpu::MultisampleState::default(),
      multiview: None,
      cache: None,
    });

    // ========================================================================
    // halo overlay pipeline
    // ========================================================================

    let overlay_extent = wgpu::Extent3d {
      width: overlay_size.0,
      height: overlay_size.1,
      depth_or_array_layers: 1,
    };
    let overlay_texture = device.create_texture(&wgpu::TextureDescriptor {
      label: Some("halo overlay"),
      size: overlay_extent,
      mip_level_count: 1,
      sample_count: 1,
      dimension: wgpu::TextureDimension::D2,
      format: wgpu::TextureFormat::Rgba8Unorm,
      usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
      view_formats: &[],
    });
    let overlay_view = overlay_texture.create_view(&wgpu::TextureViewDescriptor::default());
    let overlay_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
      label: Some("halo overlay sampler"),
      mag_filter: wgpu::FilterMode::Linear,
      min_filter: wgpu::FilterMode::Linear,
      ..Default::default()
    });
    let overlay_bind_group_layout =
      device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
          wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
              sample_type: wgpu::TextureSampleType::Float { filterable: true },
              view_dimension: wgpu::TextureViewDimension::D2,
              multisampled: false,
            },
            count: None,
          },
          wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
          },
        ],
        label: Some("overlay_bind_group_layout"),
      });
    let overlay_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
      layout: &overlay_bind_group_layout,
      entries: &[
        wgpu::BindGroupEntry {
          binding: 0,
          resource: wgpu::BindingResource::TextureView(&overlay_view),
        },
        wgpu::BindGroupEntry {
          binding: 1,
          resource: wgpu::BindingResource::Sampler(&overlay_sampler),
        },
      ],
      label: Some("overlay_bind_group"),
    });
    let overlay_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some("overlay"),
      bind_group_layouts: &[&overlay_bind_group_layout],
      push_constant_ranges: &[],
    });
    let overlay_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
      label: Some("overlay pipeline"),
      layout: Some(&overlay_pipeline_layout),
      vertex: wgpu::VertexState {
        module: &blit_shader,
        entry_point: "main_vs",
        compilation_options: PipelineCompilationOptions::default(),
        buffers: &[],
      },
      fragment: Some(wgpu::FragmentState {
        module: &blit_shader,
        entry_point: "main_fs",
        compilation_options: PipelineCompilationOptions::default(),
        targets: &[Some(wgpu::ColorTargetState {
          format: config.view_formats[0],
          blend: Some(additive),
          write_mask: wgpu::ColorWrites::ALL,
        })],
      }),
      primitive: wgpu::PrimitiveState::default(),
      depth_stencil: None,
      multisample: wgpu::MultisampleState::default(),
      multiview: None,
      cache: None,
    });

    let size = 0.12f32;
    let vertex_buffer_data = [
      -0.866 * size,
      -0.5 * size,
      0.0,
      0.866 * size,
      -0.5 * size,
      0.0,
      0.0,
      size,
      0.0,
    ];
    let vertices_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
      label: Some("Vertex Buffer"),
      contents: bytemuck::bytes_of(&vertex_buffer_data),
      usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    });

    let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
      label: Some("Particle Instance Buffer"),
      size: u64::from(instance_capacity) * INSTANCE_STRIDE,
      usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
      mapped_at_creation: false,
    });

    Render {
      particle_pipeline,
      overlay_pipeline,
      vertices_buffer,
      instance_buffer,
      instance_capacity,
      instance_count: 0,
      overlay_texture,
      overlay_extent,
      overlay_bind_group,
    }
  }

  /// Uploads this frame's particle draw data.
  pub fn update_particles(&mut self, queue: &wgpu::Queue, instances: &[ParticleInstance]) {
    self.instance_count = (instances.len() as u32).min(self.instance_capacity);
    let used = &instances[..self.instance_count as usize];
    if !used.is_empty() {
      queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(used));
    }
  }

  /// Uploads this frame's composited halo overlay (tightly packed RGBA8).
  pub fn update_overlay(&mut self, queue: &wgpu::Queue, rgba: &[u8]) {
    queue.write_texture(
      wgpu::ImageCopyTexture {
        texture: &self.overlay_texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
      },
      rgba,
      wgpu::ImageDataLayout {
        offset: 0,
        bytes_per_row: Some(4 * self.overlay_extent.width),
        rows_per_image: Some(self.overlay_extent.height),
      },
      self.overlay_extent,
    );
  }

  pub fn render(
    &mut self,
    view: &wgpu::TextureView,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    camera_bind_group: &wgpu::BindGroup,
  ) {
    let color_attachments = [Some(wgpu::RenderPassColorAttachment {
      view,
      resolve_target: None,
      ops: wgpu::Operations {
        load: wgpu::LoadOp::Clear(wgpu::Color {
          r: 0.004,
          g: 0.004,
          b: 0.012,
          a: 1.0,
        }),
        store: wgpu::StoreOp::Store,
      },
    })];
    let mut command_encoder =
      device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    {
      let mut rpass = command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: None,
        color_attachments: &color_attachments,
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
      });
      rpass.set_pipeline(&self.particle_pipeline);
      rpass.set_bind_group(0, camera_bind_group, &[]);
      rpass.set_vertex_buffer(0, self.instance_buffer.slice(..));
      rpass.set_vertex_buffer(1, self.vertices_buffer.slice(..));
      rpass.draw(0..3, 0..self.instance_count);

      rpass.set_pipeline(&self.overlay_pipeline);
      rpass.set_bind_group(0, &self.overlay_bind_group, &[]);
      rpass.draw(0..3, 0..1);
    }
    queue.submit(Some(command_encoder.finish()));
  }
}
