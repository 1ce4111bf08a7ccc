use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Mat4;
use log::{debug, info};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::camera::aspect_ratio;
use crate::error::ContextError;
use crate::shader::{ProgramLayout, ProgramSource, FRAGMENT_ENTRY, VERTEX_ENTRY};

use super::{
    AttributeSlot, BufferUsage, ClearMask, Color, FrameCommands, FramePlan, FrameRecorder,
    MatrixSlots, MatrixState, MeshDescriptor, MeshHandle, MeshInfo, ProgramHandle,
    RenderContext, ResourceFactory, ResourceTable, Topology, UniformValue,
};

/// Render context backed by wgpu, drawing into a window surface.
///
/// Frame commands are validated and recorded as they are issued, then
/// encoded and submitted by [`GpuContext::present`].
pub struct GpuContext {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    aspect: f32,
    depth: DepthBuffer,
    resources: ResourceTable,
    matrices: MatrixSlots,
    recorder: FrameRecorder,
    programs: Vec<GpuProgram>,
    meshes: Vec<GpuMesh>,
}

impl GpuContext {
    /// Acquires an adapter and device and configures the window surface.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("sphere-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Colors are authored in display space; a non-sRGB target passes
        // them through unchanged.
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| !format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no supported formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            aspect: aspect_ratio(size.width, size.height),
            depth,
            resources: ResourceTable::default(),
            matrices: MatrixSlots::default(),
            recorder: FrameRecorder::default(),
            programs: Vec::new(),
            meshes: Vec::new(),
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain and depth buffer. The reported aspect ratio
    /// keeps the value measured at creation.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Reconfigures the surface with its current size after it was lost.
    pub fn reconfigure(&mut self) {
        self.resize(self.size);
    }

    /// Encodes the commands recorded since the last call and presents them.
    pub fn present(&mut self) -> Result<(), wgpu::SurfaceError> {
        let commands = self.recorder.take();
        let plan = FramePlan::from_commands(&commands);
        if plan.passes.is_empty() {
            return Ok(());
        }

        self.write_uniforms(&plan);
        for draw in plan.draws() {
            let topology = self.meshes[draw.mesh.index()].topology;
            self.programs[draw.program.index()].ensure_pipeline(
                &self.device,
                self.config.format,
                topology,
                draw.depth_test,
            );
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("sphere-encoder"),
            });

        for pass in &plan.passes {
            let color_load = match pass.clear_color {
                Some(color) => wgpu::LoadOp::Clear(to_wgpu_color(color)),
                None => wgpu::LoadOp::Load,
            };
            let depth_load = if pass.clear_depth {
                wgpu::LoadOp::Clear(1.0)
            } else {
                wgpu::LoadOp::Load
            };
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("sphere-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            for draw in &pass.draws {
                let program = &self.programs[draw.program.index()];
                let mesh = &self.meshes[draw.mesh.index()];
                let Some(pipeline) = program.pipelines.get(&(mesh.topology, draw.depth_test))
                else {
                    continue;
                };
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, &program.bind_group, &[]);
                for (slot, location) in program.layout.attribute_locations.iter().enumerate() {
                    if let Some(buffer) = mesh.vertex_buffer(*location) {
                        rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
                    }
                }
                rpass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        debug!("presented {} pass(es)", plan.passes.len());
        Ok(())
    }

    fn write_uniforms(&self, plan: &FramePlan) {
        let mut drawn: Vec<ProgramHandle> = plan.draws().map(|draw| draw.program).collect();
        drawn.sort_by_key(|handle| handle.index());
        drawn.dedup();
        for handle in drawn {
            let program = &self.programs[handle.index()];
            for (name, matrix) in self.matrices.named() {
                if let Some(buffer) = program.uniform_buffer(name) {
                    let bytes = UniformValue::Mat4(matrix).to_bytes();
                    self.queue.write_buffer(buffer, 0, &bytes);
                }
            }
        }
        for (handle, name, value) in &plan.uniforms {
            if let Some(buffer) = self.programs[handle.index()].uniform_buffer(name) {
                self.queue.write_buffer(buffer, 0, &value.to_bytes());
            }
        }
    }
}

impl MatrixState for GpuContext {
    fn set_projection_matrix(&mut self, projection: Mat4) {
        self.matrices.projection = Some(projection);
    }

    fn set_view_matrix(&mut self, view: Mat4) {
        self.matrices.view = Some(view);
    }

    fn set_model_matrix(&mut self, model: Mat4) {
        self.matrices.model = Some(model);
    }
}

impl ResourceFactory for GpuContext {
    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramHandle, ContextError> {
        let layout = source.link()?;
        let mut program = GpuProgram::new(&self.device, source, layout.clone());
        // The pipeline every frame step needs is built now so GPU-side
        // validation failures surface during setup.
        program.ensure_pipeline(&self.device, self.config.format, Topology::Triangles, true);
        self.programs.push(program);
        let handle = self.resources.add_program(layout);
        info!("created program {handle}");
        Ok(handle)
    }

    fn create_mesh(&mut self, mesh: &MeshDescriptor<'_>) -> Result<MeshHandle, ContextError> {
        let info = MeshInfo::validate(mesh)?;
        self.meshes.push(GpuMesh::upload(&self.device, mesh, &info));
        let handle = self.resources.add_mesh(info);
        info!("created mesh {handle}");
        Ok(handle)
    }
}

impl FrameCommands for GpuContext {
    fn set_clear_color(&mut self, color: Color) {
        self.recorder.set_clear_color(color);
    }

    fn clear(&mut self, mask: ClearMask) {
        self.recorder.clear(mask);
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.recorder.set_depth_test(enabled);
    }

    fn bind_program(&mut self, program: ProgramHandle) -> Result<(), ContextError> {
        self.recorder.bind_program(program, &self.resources)
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), ContextError> {
        self.recorder.set_uniform(name, value, &self.resources)
    }

    fn bind_mesh(&mut self, mesh: MeshHandle) -> Result<(), ContextError> {
        self.recorder.bind_mesh(mesh, &self.resources)
    }

    fn draw_mesh(&mut self) -> Result<(), ContextError> {
        self.recorder.draw_mesh(&self.resources, &self.matrices)
    }
}

impl RenderContext for GpuContext {
    fn aspect_ratio(&self) -> f32 {
        self.aspect
    }
}

fn to_wgpu_color(color: Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}

fn to_wgpu_topology(topology: Topology) -> wgpu::PrimitiveTopology {
    match topology {
        Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        Topology::Lines => wgpu::PrimitiveTopology::LineList,
        Topology::Points => wgpu::PrimitiveTopology::PointList,
    }
}

/// Shader modules, uniform buffers and the pipelines built so far for one
/// linked program.
struct GpuProgram {
    layout: ProgramLayout,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group: wgpu::BindGroup,
    uniform_buffers: HashMap<String, wgpu::Buffer>,
    pipelines: HashMap<(Topology, bool), wgpu::RenderPipeline>,
}

impl GpuProgram {
    fn new(device: &wgpu::Device, source: &ProgramSource, layout: ProgramLayout) -> Self {
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sphere-vertex-shader"),
            source: wgpu::ShaderSource::Wgsl(source.vertex.as_str().into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sphere-fragment-shader"),
            source: wgpu::ShaderSource::Wgsl(source.fragment.as_str().into()),
        });

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = layout
            .uniforms
            .iter()
            .map(|uniform| wgpu::BindGroupLayoutEntry {
                binding: uniform.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("uniform-bind-layout"),
            entries: &layout_entries,
        });

        let uniform_buffers: HashMap<String, wgpu::Buffer> = layout
            .uniforms
            .iter()
            .map(|uniform| {
                let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&uniform.name),
                    size: uniform.kind.buffer_size(),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (uniform.name.clone(), buffer)
            })
            .collect();

        let bind_entries: Vec<wgpu::BindGroupEntry> = layout
            .uniforms
            .iter()
            .map(|uniform| wgpu::BindGroupEntry {
                binding: uniform.binding,
                resource: uniform_buffers[&uniform.name].as_entire_binding(),
            })
            .collect();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("uniform-bind-group"),
            layout: &bind_layout,
            entries: &bind_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sphere-pipeline-layout"),
            bind_group_layouts: &[&bind_layout],
            immediate_size: 0,
        });

        Self {
            layout,
            vertex,
            fragment,
            pipeline_layout,
            bind_group,
            uniform_buffers,
            pipelines: HashMap::new(),
        }
    }

    fn uniform_buffer(&self, name: &str) -> Option<&wgpu::Buffer> {
        self.uniform_buffers.get(name)
    }

    fn ensure_pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        topology: Topology,
        depth_test: bool,
    ) {
        if self.pipelines.contains_key(&(topology, depth_test)) {
            return;
        }

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = self
            .layout
            .attribute_locations
            .iter()
            .map(|&location| {
                [wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .map(|attribute| wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attribute,
            })
            .collect();

        let (depth_write_enabled, depth_compare) = if depth_test {
            (true, wgpu::CompareFunction::Less)
        } else {
            (false, wgpu::CompareFunction::Always)
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sphere-pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: to_wgpu_topology(topology),
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled,
                depth_compare,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &self.fragment,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview_mask: None,
            cache: None,
        });
        debug!("built pipeline for {topology} primitives, depth test {depth_test}");
        self.pipelines.insert((topology, depth_test), pipeline);
    }
}

/// One vertex buffer per attribute slot plus the index buffer.
struct GpuMesh {
    vertex: Vec<(AttributeSlot, wgpu::Buffer)>,
    index: wgpu::Buffer,
    index_count: u32,
    topology: Topology,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &MeshDescriptor<'_>, info: &MeshInfo) -> Self {
        let vertex = mesh
            .attributes
            .iter()
            .map(|attribute| {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("mesh-{}", attribute.slot)),
                    contents: bytemuck::cast_slice(attribute.data),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                (attribute.slot, buffer)
            })
            .collect();
        let index_usage = match mesh.indices.usage {
            BufferUsage::Static => wgpu::BufferUsages::INDEX,
            BufferUsage::Dynamic => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        };
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh-indices"),
            contents: bytemuck::cast_slice(mesh.indices.indices),
            usage: index_usage,
        });
        Self {
            vertex,
            index,
            index_count: info.index_count,
            topology: info.topology,
        }
    }

    fn vertex_buffer(&self, location: u32) -> Option<&wgpu::Buffer> {
        self.vertex
            .iter()
            .find(|(slot, _)| slot.location() == location)
            .map(|(_, buffer)| buffer)
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
