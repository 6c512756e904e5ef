use std::collections::HashMap;
use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, trace, warn};
use wgpu::util::DeviceExt;

use crate::controller::{CameraUniform, ShadowSlot, TransformUniform, WorldUniform};
use crate::error::Result;
use crate::model::lighting::{LIGHT_BUFFER_LEN, MAX_LIGHTS, MAX_SHADOW_LAYERS, SHADOW_MAP_RES};
use crate::model::AssetStore;
use crate::utils::{LineVertex, Mesh, MeshBuffer, Vertex};
use crate::view::draw::{DrawCommand, RenderTarget};
use crate::view::gpu_init::GpuContext;
use crate::view::shaders::ShaderKind;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.5,
    g: 0.8,
    b: 1.0,
    a: 1.0,
};

/// Camera block plus world constants, one dynamic-offset slot per publish
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraSlot {
    pub camera: CameraUniform,
    pub world: WorldUniform,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanItem {
    Mesh {
        shader: ShaderKind,
        camera: u32,
        model: u32,
        /// Index into `FramePlan::meshes`
        mesh: usize,
        texture: Option<String>,
    },
    Lines {
        camera: u32,
        vertices: Range<u32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPass {
    pub target: RenderTarget,
    pub items: Vec<PlanItem>,
}

/// A recorded frame resolved into passes and flat upload arrays
#[derive(Debug, Default)]
pub struct FramePlan {
    pub passes: Vec<PlannedPass>,
    pub cameras: Vec<CameraSlot>,
    pub models: Vec<TransformUniform>,
    pub meshes: Vec<Arc<Mesh>>,
    pub lines: Vec<LineVertex>,
    /// Last lighting publish of the frame
    pub lighting: Option<(Vec<f32>, Vec<ShadowSlot>)>,
}

impl FramePlan {
    pub fn build(commands: &[DrawCommand]) -> Self {
        let mut plan = FramePlan::default();
        let mut mesh_index: HashMap<usize, usize> = HashMap::new();
        let mut shader = ShaderKind::Normal;
        let mut world = WorldUniform {
            near: 0.0,
            far: 1.0,
            _pad: [0.0; 2],
        };
        let mut camera: Option<u32> = None;

        for command in commands {
            match command {
                DrawCommand::Target(target) => plan.passes.push(PlannedPass {
                    target: *target,
                    items: Vec::new(),
                }),
                DrawCommand::Shader(kind) => shader = *kind,
                DrawCommand::World(w) => world = *w,
                DrawCommand::Camera(c) => {
                    plan.cameras.push(CameraSlot { camera: *c, world });
                    camera = Some(plan.cameras.len() as u32 - 1);
                }
                DrawCommand::Lighting { buffer, shadows } => {
                    plan.lighting = Some((buffer.clone(), shadows.clone()));
                }
                DrawCommand::Mesh(draw) => {
                    let (Some(camera), Some(pass)) = (camera, plan.passes.last_mut()) else {
                        trace!("mesh drawn before a target and camera, dropped");
                        continue;
                    };
                    let key = Arc::as_ptr(&draw.mesh) as usize;
                    let mesh = *mesh_index.entry(key).or_insert_with(|| {
                        plan.meshes.push(Arc::clone(&draw.mesh));
                        plan.meshes.len() - 1
                    });
                    plan.models.push(TransformUniform {
                        model: draw.transform.to_cols_array_2d(),
                    });
                    pass.items.push(PlanItem::Mesh {
                        shader,
                        camera,
                        model: plan.models.len() as u32 - 1,
                        mesh,
                        texture: draw.texture.clone(),
                    });
                }
                DrawCommand::Lines(lines) => {
                    let (Some(camera), Some(pass)) = (camera, plan.passes.last_mut()) else {
                        continue;
                    };
                    let start = plan.lines.len() as u32;
                    for line in lines {
                        let color = line.color.to_array();
                        plan.lines.push(LineVertex {
                            pos: line.from.to_array(),
                            color,
                        });
                        plan.lines.push(LineVertex {
                            pos: line.to.to_array(),
                            color,
                        });
                    }
                    let end = plan.lines.len() as u32;
                    if end > start {
                        pass.items.push(PlanItem::Lines {
                            camera,
                            vertices: start..end,
                        });
                    }
                }
            }
        }
        plan
    }

    pub fn has_target(&self, target: RenderTarget) -> bool {
        self.passes.iter().any(|p| p.target == target)
    }
}

/// egui output for one frame
pub struct GuiFrame<'a> {
    pub primitives: &'a [egui::ClippedPrimitive],
    pub textures: &'a egui::TexturesDelta,
    pub screen: egui_wgpu::ScreenDescriptor,
}

/// Uniform buffer addressed with dynamic offsets, grown on demand
struct DynamicUniform {
    label: &'static str,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    item_size: u64,
    stride: u64,
    capacity: u64,
}

impl DynamicUniform {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        item_size: u64,
        capacity: u64,
    ) -> Self {
        let align = device.limits().min_uniform_buffer_offset_alignment as u64;
        let stride = item_size.div_ceil(align) * align;
        let (buffer, bind_group) = Self::allocate(device, layout, label, item_size, stride, capacity);
        Self {
            label,
            buffer,
            bind_group,
            item_size,
            stride,
            capacity,
        }
    }

    fn allocate(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        label: &'static str,
        item_size: u64,
        stride: u64,
        capacity: u64,
    ) -> (wgpu::Buffer, wgpu::BindGroup) {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: stride * capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(item_size),
                }),
            }],
        });
        (buffer, bind_group)
    }

    fn write<T: bytemuck::Pod>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        items: &[T],
    ) {
        if items.is_empty() {
            return;
        }
        let needed = items.len() as u64;
        if needed > self.capacity {
            let capacity = needed.next_power_of_two();
            debug!(label = self.label, capacity, "growing dynamic uniform buffer");
            let (buffer, bind_group) =
                Self::allocate(device, layout, self.label, self.item_size, self.stride, capacity);
            self.buffer = buffer;
            self.bind_group = bind_group;
            self.capacity = capacity;
        }
        let mut bytes = vec![0u8; (self.stride * needed) as usize];
        for (i, item) in items.iter().enumerate() {
            let at = i * self.stride as usize;
            let src = bytemuck::bytes_of(item);
            bytes[at..at + src.len()].copy_from_slice(src);
        }
        queue.write_buffer(&self.buffer, 0, &bytes);
    }

    fn offset(&self, index: u32) -> u32 {
        (index as u64 * self.stride) as u32
    }
}

struct MeshEntry {
    mesh: Arc<Mesh>,
    revision: u64,
    buffer: MeshBuffer,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

const MESH_ATTRIBUTES: [wgpu::VertexAttribute; 4] = [
    wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 12, shader_location: 1, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 24, shader_location: 2, format: wgpu::VertexFormat::Float32x4 },
    wgpu::VertexAttribute { offset: 40, shader_location: 3, format: wgpu::VertexFormat::Float32x2 },
];

const LINE_ATTRIBUTES: [wgpu::VertexAttribute; 2] = [
    wgpu::VertexAttribute { offset: 0, shader_location: 0, format: wgpu::VertexFormat::Float32x3 },
    wgpu::VertexAttribute { offset: 12, shader_location: 1, format: wgpu::VertexFormat::Float32x3 },
];

struct PipelineDesc<'a> {
    label: &'static str,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    color: Option<wgpu::TextureFormat>,
    topology: wgpu::PrimitiveTopology,
    cull_mode: Option<wgpu::Face>,
    bias: wgpu::DepthBiasState,
}

fn create_pipeline(device: &wgpu::Device, desc: PipelineDesc<'_>) -> wgpu::RenderPipeline {
    let targets = desc.color.map(|format| {
        [Some(wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })]
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.shader,
            entry_point: Some("vs_main"),
            buffers: desc.buffers,
            compilation_options: Default::default(),
        },
        fragment: targets.as_ref().map(|targets| wgpu::FragmentState {
            module: desc.shader,
            entry_point: Some("fs_main"),
            targets,
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: desc.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: desc.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: desc.bias,
        }),
        multisample: wgpu::MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
        cache: None,
    })
}

pub fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
    (depth_texture, depth_view)
}

/// Replays recorded draw commands with wgpu and paints the egui overlay
pub struct Renderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    depth_view: wgpu::TextureView,
    camera_bgl: wgpu::BindGroupLayout,
    model_bgl: wgpu::BindGroupLayout,
    material_bgl: wgpu::BindGroupLayout,
    cameras: DynamicUniform,
    models: DynamicUniform,
    light_buffer: wgpu::Buffer,
    shadow_buffer: wgpu::Buffer,
    shadow_layers: Vec<wgpu::TextureView>,
    lighting_bind_group: wgpu::BindGroup,
    material_sampler: wgpu::Sampler,
    default_material: wgpu::BindGroup,
    normal_pipeline: wgpu::RenderPipeline,
    depth_pipeline: wgpu::RenderPipeline,
    lines_pipeline: wgpu::RenderPipeline,
    line_buffer: Option<wgpu::Buffer>,
    meshes: HashMap<usize, MeshEntry>,
    materials: HashMap<String, Option<wgpu::BindGroup>>,
    pub egui: egui_wgpu::Renderer,
}

impl Renderer {
    pub fn new(gpu: &GpuContext) -> Self {
        let device = Arc::clone(&gpu.device);
        let queue = Arc::clone(&gpu.queue);
        let (_, depth_view) = create_depth_texture(&device, gpu.config.width, gpu.config.height);

        let camera_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera_bind_group_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT, true)],
        });
        let model_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("model_bind_group_layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX, true)],
        });
        let lighting_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lighting_bind_group_layout"),
            entries: &[
                storage_entry(0),
                storage_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });
        let material_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_bind_group_layout"),
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
        });

        let cameras = DynamicUniform::new(
            &device,
            &camera_bgl,
            "camera_slots",
            std::mem::size_of::<CameraSlot>() as u64,
            16,
        );
        let models = DynamicUniform::new(
            &device,
            &model_bgl,
            "model_slots",
            std::mem::size_of::<TransformUniform>() as u64,
            256,
        );

        let light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lighting_buffer"),
            size: (LIGHT_BUFFER_LEN * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shadow_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow_slots"),
            size: (MAX_LIGHTS * std::mem::size_of::<ShadowSlot>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let shadow_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow_maps"),
            size: wgpu::Extent3d {
                width: SHADOW_MAP_RES,
                height: SHADOW_MAP_RES,
                depth_or_array_layers: MAX_SHADOW_LAYERS,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let shadow_layers = (0..MAX_SHADOW_LAYERS)
            .map(|layer| {
                shadow_texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("shadow_layer"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let shadow_array = shadow_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("shadow_array"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let lighting_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lighting_bind_group"),
            layout: &lighting_bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: light_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: shadow_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&shadow_array) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&shadow_sampler) },
            ],
        });

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let default_material = create_material(
            &device,
            &queue,
            &material_bgl,
            &material_sampler,
            &crate::model::assets::TextureData::solid([255, 255, 255, 255]),
        );

        let normal_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("normal_shader"),
            source: wgpu::ShaderSource::Wgsl(ShaderKind::Normal.source().into()),
        });
        let depth_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("depth_shader"),
            source: wgpu::ShaderSource::Wgsl(ShaderKind::Depth.source().into()),
        });
        let lines_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("debug_lines_shader"),
            source: wgpu::ShaderSource::Wgsl(ShaderKind::PhysDebug.source().into()),
        });

        let normal_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("normal_pipeline_layout"),
            bind_group_layouts: &[&camera_bgl, &model_bgl, &lighting_bgl, &material_bgl],
            push_constant_ranges: &[],
        });
        let depth_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("depth_pipeline_layout"),
            bind_group_layouts: &[&camera_bgl, &model_bgl],
            push_constant_ranges: &[],
        });
        let lines_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lines_pipeline_layout"),
            bind_group_layouts: &[&camera_bgl],
            push_constant_ranges: &[],
        });

        let mesh_buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRIBUTES,
        }];
        let depth_buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &MESH_ATTRIBUTES[..1],
        }];
        let line_buffers = [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &LINE_ATTRIBUTES,
        }];

        let normal_pipeline = create_pipeline(
            &device,
            PipelineDesc {
                label: "normal_pipeline",
                layout: &normal_layout,
                shader: &normal_shader,
                buffers: &mesh_buffers,
                color: Some(gpu.format),
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                bias: wgpu::DepthBiasState::default(),
            },
        );
        let depth_pipeline = create_pipeline(
            &device,
            PipelineDesc {
                label: "depth_pipeline",
                layout: &depth_layout,
                shader: &depth_shader,
                buffers: &depth_buffers,
                color: None,
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            },
        );
        let lines_pipeline = create_pipeline(
            &device,
            PipelineDesc {
                label: "debug_lines_pipeline",
                layout: &lines_layout,
                shader: &lines_shader,
                buffers: &line_buffers,
                color: Some(gpu.format),
                topology: wgpu::PrimitiveTopology::LineList,
                cull_mode: None,
                bias: wgpu::DepthBiasState::default(),
            },
        );

        let egui = egui_wgpu::Renderer::new(&device, gpu.format, egui_wgpu::RendererOptions::default());

        Self {
            device,
            queue,
            depth_view,
            camera_bgl,
            model_bgl,
            material_bgl,
            cameras,
            models,
            light_buffer,
            shadow_buffer,
            shadow_layers,
            lighting_bind_group,
            material_sampler,
            default_material,
            normal_pipeline,
            depth_pipeline,
            lines_pipeline,
            line_buffer: None,
            meshes: HashMap::new(),
            materials: HashMap::new(),
            egui,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let (_, depth_view) = create_depth_texture(&self.device, width, height);
        self.depth_view = depth_view;
    }

    /// Draw one frame: shadow layers, the scene, then the GUI overlay.
    /// A lost or outdated surface is reconfigured and the frame skipped.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        commands: &[DrawCommand],
        assets: &AssetStore,
        gui: GuiFrame<'_>,
    ) -> Result<()> {
        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost, reconfiguring");
                gpu.surface.configure(&self.device, &gpu.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout, skipping frame");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let plan = FramePlan::build(commands);
        self.upload(&plan, assets);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });

        for (id, image_delta) in &gui.textures.set {
            self.egui.update_texture(&self.device, &self.queue, *id, image_delta);
        }
        let egui_commands =
            self.egui
                .update_buffers(&self.device, &self.queue, &mut encoder, gui.primitives, &gui.screen);

        if !plan.has_target(RenderTarget::Screen) {
            self.encode_screen(&mut encoder, &view, &[], &plan);
        }
        let mut gui_drawn = false;
        for pass in &plan.passes {
            match pass.target {
                RenderTarget::ShadowLayer(layer) => self.encode_shadow(&mut encoder, layer, &pass.items, &plan),
                RenderTarget::Screen => self.encode_screen(&mut encoder, &view, &pass.items, &plan),
                RenderTarget::Overlay => {
                    self.encode_gui(&mut encoder, &view, &gui);
                    gui_drawn = true;
                }
            }
        }
        if !gui_drawn {
            self.encode_gui(&mut encoder, &view, &gui);
        }

        for id in &gui.textures.free {
            self.egui.free_texture(id);
        }

        self.queue
            .submit(egui_commands.into_iter().chain(std::iter::once(encoder.finish())));
        output.present();

        // Drop GPU meshes nothing references any more
        self.meshes.retain(|_, entry| Arc::strong_count(&entry.mesh) > 1);
        Ok(())
    }

    fn upload(&mut self, plan: &FramePlan, assets: &AssetStore) {
        self.cameras
            .write(&self.device, &self.queue, &self.camera_bgl, &plan.cameras);
        self.models
            .write(&self.device, &self.queue, &self.model_bgl, &plan.models);

        match &plan.lighting {
            Some((buffer, shadows)) => {
                let buffer = &buffer[..buffer.len().min(LIGHT_BUFFER_LEN)];
                let shadows = &shadows[..shadows.len().min(MAX_LIGHTS)];
                self.queue
                    .write_buffer(&self.light_buffer, 0, bytemuck::cast_slice(buffer));
                if !shadows.is_empty() {
                    self.queue
                        .write_buffer(&self.shadow_buffer, 0, bytemuck::cast_slice(shadows));
                }
            }
            None => self.queue.write_buffer(&self.light_buffer, 0, &[0u8; 16]),
        }

        for mesh in &plan.meshes {
            let key = Arc::as_ptr(mesh) as usize;
            let stale = self
                .meshes
                .get(&key)
                .map_or(true, |entry| entry.revision != mesh.revision());
            if stale && !mesh.is_empty() {
                trace!(revision = mesh.revision(), "uploading mesh");
                self.meshes.insert(
                    key,
                    MeshEntry {
                        mesh: Arc::clone(mesh),
                        revision: mesh.revision(),
                        buffer: mesh.upload(&self.device),
                    },
                );
            }
        }

        for pass in &plan.passes {
            for item in &pass.items {
                let PlanItem::Mesh { texture: Some(path), .. } = item else {
                    continue;
                };
                if self.materials.contains_key(path) {
                    continue;
                }
                let material = assets.cached_texture(path).map(|tex| {
                    create_material(&self.device, &self.queue, &self.material_bgl, &self.material_sampler, &tex)
                });
                if material.is_none() {
                    debug!(path, "texture not loaded, using plain material");
                }
                self.materials.insert(path.clone(), material);
            }
        }

        self.line_buffer = (!plan.lines.is_empty()).then(|| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("debug_lines"),
                contents: bytemuck::cast_slice(&plan.lines),
                usage: wgpu::BufferUsages::VERTEX,
            })
        });
    }

    fn mesh_buffer(&self, plan: &FramePlan, index: usize) -> Option<&MeshBuffer> {
        let mesh = plan.meshes.get(index)?;
        self.meshes
            .get(&(Arc::as_ptr(mesh) as usize))
            .map(|entry| &entry.buffer)
            .filter(|buffer| buffer.index_count > 0)
    }

    fn encode_shadow(&self, encoder: &mut wgpu::CommandEncoder, layer: u32, items: &[PlanItem], plan: &FramePlan) {
        let Some(target) = self.shadow_layers.get(layer as usize) else {
            warn!(layer, "shadow layer out of range");
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow_pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.depth_pipeline);
        for item in items {
            let PlanItem::Mesh { camera, model, mesh, .. } = item else {
                continue;
            };
            let Some(buffer) = self.mesh_buffer(plan, *mesh) else {
                continue;
            };
            pass.set_bind_group(0, &self.cameras.bind_group, &[self.cameras.offset(*camera)]);
            pass.set_bind_group(1, &self.models.bind_group, &[self.models.offset(*model)]);
            pass.set_vertex_buffer(0, buffer.vertex_buffer.slice(..));
            pass.set_index_buffer(buffer.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..buffer.index_count, 0, 0..1);
        }
    }

    fn encode_screen(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        items: &[PlanItem],
        plan: &FramePlan,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let mut current: Option<ShaderKind> = None;
        for item in items {
            match item {
                PlanItem::Mesh { shader: ShaderKind::Normal, camera, model, mesh, texture } => {
                    let Some(buffer) = self.mesh_buffer(plan, *mesh) else {
                        continue;
                    };
                    if current != Some(ShaderKind::Normal) {
                        pass.set_pipeline(&self.normal_pipeline);
                        pass.set_bind_group(2, &self.lighting_bind_group, &[]);
                        current = Some(ShaderKind::Normal);
                    }
                    let material = texture
                        .as_ref()
                        .and_then(|path| self.materials.get(path))
                        .and_then(Option::as_ref)
                        .unwrap_or(&self.default_material);
                    pass.set_bind_group(0, &self.cameras.bind_group, &[self.cameras.offset(*camera)]);
                    pass.set_bind_group(1, &self.models.bind_group, &[self.models.offset(*model)]);
                    pass.set_bind_group(3, material, &[]);
                    pass.set_vertex_buffer(0, buffer.vertex_buffer.slice(..));
                    pass.set_index_buffer(buffer.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..buffer.index_count, 0, 0..1);
                }
                PlanItem::Mesh { shader, .. } => {
                    trace!(?shader, "mesh under a non-scene shader skipped on screen");
                }
                PlanItem::Lines { camera, vertices } => {
                    let Some(lines) = &self.line_buffer else {
                        continue;
                    };
                    if current != Some(ShaderKind::PhysDebug) {
                        pass.set_pipeline(&self.lines_pipeline);
                        current = Some(ShaderKind::PhysDebug);
                    }
                    pass.set_bind_group(0, &self.cameras.bind_group, &[self.cameras.offset(*camera)]);
                    pass.set_vertex_buffer(0, lines.slice(..));
                    pass.draw(vertices.clone(), 0..1);
                }
            }
        }
    }

    fn encode_gui(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, gui: &GuiFrame<'_>) {
        let egui_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui_render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.egui
            .render(&mut egui_pass.forget_lifetime(), gui.primitives, &gui.screen);
    }
}

fn create_material(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    texture: &crate::model::assets::TextureData,
) -> wgpu::BindGroup {
    let size = wgpu::Extent3d {
        width: texture.width.max(1),
        height: texture.height.max(1),
        depth_or_array_layers: 1,
    };
    let gpu_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("material_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &gpu_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &texture.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * size.width),
            rows_per_image: Some(size.height),
        },
        size,
    );
    let view = gpu_texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("material_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&view) },
            wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(sampler) },
        ],
    })
}
