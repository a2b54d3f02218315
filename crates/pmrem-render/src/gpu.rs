//! wgpu implementation of [`RenderDevice`].
//!
//! Every draw is recorded into its own command buffer and submitted
//! immediately, so draws execute in submission order and a uniform write is
//! always observed by the draw it belongs to. Sources are read with
//! `textureLoad` and filtered in the shader, which keeps `Rgba32Float`
//! sources usable without the float-filtering feature and gives the exact
//! clamp-to-face behaviour of the software device.

use std::collections::HashMap;

use glam::Vec4;
use wgpu::util::DeviceExt;

use crate::device::{validate_upload, validate_viewport};
use crate::program::PmremParams;
use crate::{
    DeviceError, DrawCommand, ProgramKind, QuadVertex, RenderDevice, TexelFormat,
    TextureDescriptor, TextureHandle,
};

/// WGSL module holding the quad vertex stage and the three PMREM fragment programs.
pub const PMREM_SHADER_SOURCE: &str = r#"
const PI: f32 = 3.14159265358979;
const TAU: f32 = 6.28318530717959;
const POLE_EPSILON: f32 = 1e-4;
const MAX_SAMPLES: u32 = 20u;

struct PmremParams {
    weights: array<vec4<f32>, 5>,
    d_theta: f32,
    samples: u32,
    latitudinal: u32,
    source_lod: u32,
    input_encoding: u32,
    output_encoding: u32,
    lod_max: u32,
    lod_min: u32,
};

@group(0) @binding(0) var<uniform> params: PmremParams;
@group(1) @binding(0) var source_2d: texture_2d<f32>;
@group(1) @binding(1) var source_faces: texture_2d_array<f32>;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) face_index: f32,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) @interpolate(flat) face_index: f32,
};

@vertex
fn vs_quad(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.uv = in.uv;
    out.face_index = in.face_index;
    return out;
}

// ---- colour encodings ----

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let low = c / 12.92;
    let high = pow((c + vec3<f32>(0.055)) / 1.055, vec3<f32>(2.4));
    return select(high, low, c <= vec3<f32>(0.04045));
}

fn linear_to_srgb(c: vec3<f32>) -> vec3<f32> {
    let low = c * 12.92;
    let high = 1.055 * pow(max(c, vec3<f32>(0.0)), vec3<f32>(1.0 / 2.4)) - vec3<f32>(0.055);
    return select(high, low, c <= vec3<f32>(0.0031308));
}

fn decode(stored: vec4<f32>, encoding: u32) -> vec4<f32> {
    if encoding == 1u {
        return vec4<f32>(srgb_to_linear(stored.rgb), stored.a);
    }
    if encoding == 2u {
        return vec4<f32>(stored.rgb * exp2(stored.a * 255.0 - 128.0), 1.0);
    }
    return stored;
}

fn encode(linear: vec4<f32>, encoding: u32) -> vec4<f32> {
    if encoding == 1u {
        return vec4<f32>(linear_to_srgb(linear.rgb), linear.a);
    }
    if encoding == 2u {
        let max_component = max(max(linear.r, linear.g), linear.b);
        if max_component <= 0.0 {
            return vec4<f32>(0.0);
        }
        let exponent = clamp(ceil(log2(max_component)), -128.0, 127.0);
        return vec4<f32>(linear.rgb / exp2(exponent), (exponent + 128.0) / 255.0);
    }
    return linear;
}

// ---- cube geometry ----

// Columns: tangent, bitangent, normal.
fn face_basis(face: u32) -> mat3x3<f32> {
    switch face {
        case 0u: {
            return mat3x3<f32>(vec3<f32>(0.0, 0.0, -1.0), vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(1.0, 0.0, 0.0));
        }
        case 1u: {
            return mat3x3<f32>(vec3<f32>(0.0, 0.0, 1.0), vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(-1.0, 0.0, 0.0));
        }
        case 2u: {
            return mat3x3<f32>(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 0.0, -1.0), vec3<f32>(0.0, 1.0, 0.0));
        }
        case 3u: {
            return mat3x3<f32>(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 0.0, 1.0), vec3<f32>(0.0, -1.0, 0.0));
        }
        case 4u: {
            return mat3x3<f32>(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(0.0, 0.0, 1.0));
        }
        default: {
            return mat3x3<f32>(vec3<f32>(-1.0, 0.0, 0.0), vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(0.0, 0.0, -1.0));
        }
    }
}

fn face_direction(face: u32, uv: vec2<f32>) -> vec3<f32> {
    let basis = face_basis(face);
    let st = uv * 2.0 - vec2<f32>(1.0);
    return normalize(basis[2] + st.x * basis[0] + st.y * basis[1]);
}

fn direction_face(dir: vec3<f32>) -> u32 {
    let a = abs(dir);
    if a.x >= a.y && a.x >= a.z {
        return select(1u, 0u, dir.x >= 0.0);
    }
    if a.y >= a.z {
        return select(3u, 2u, dir.y >= 0.0);
    }
    return select(5u, 4u, dir.z >= 0.0);
}

fn direction_face_uv(dir: vec3<f32>, face: u32) -> vec2<f32> {
    let basis = face_basis(face);
    let d = dot(dir, basis[2]);
    if abs(d) < 1e-30 {
        return vec2<f32>(0.5);
    }
    let projected = dir / d;
    let st = vec2<f32>(dot(projected, basis[0]), dot(projected, basis[1]));
    return clamp((st + vec2<f32>(1.0)) * 0.5, vec2<f32>(0.0), vec2<f32>(1.0));
}

// ---- filtered lookups ----

fn load_2d(p: vec2<i32>) -> vec4<f32> {
    return decode(textureLoad(source_2d, p, 0), params.input_encoding);
}

fn load_face(p: vec2<i32>, layer: u32) -> vec4<f32> {
    return decode(textureLoad(source_faces, p, layer, 0), params.input_encoding);
}

fn bilinear_2d(p: vec2<f32>, rect_min: vec2<i32>, rect_max: vec2<i32>) -> vec4<f32> {
    let q = p - vec2<f32>(0.5);
    let base = floor(q);
    let f = q - base;
    let lo = clamp(vec2<i32>(base), rect_min, rect_max);
    let hi = clamp(vec2<i32>(base) + vec2<i32>(1), rect_min, rect_max);
    let top = mix(load_2d(vec2<i32>(lo.x, lo.y)), load_2d(vec2<i32>(hi.x, lo.y)), f.x);
    let bottom = mix(load_2d(vec2<i32>(lo.x, hi.y)), load_2d(vec2<i32>(hi.x, hi.y)), f.x);
    return mix(top, bottom, f.y);
}

fn lod_size(lod: u32) -> u32 {
    let exponent = select(0u, params.lod_max - lod, params.lod_max > lod);
    return 1u << max(exponent, params.lod_min);
}

fn sample_cube_uv(dir: vec3<f32>, lod: u32) -> vec4<f32> {
    let face = direction_face(dir);
    let uv = direction_face_uv(dir, face);

    let size = lod_size(lod);
    let size_max = 1u << params.lod_max;
    let last_halving = params.lod_max - params.lod_min;
    let region_x = select(0u, 3u * (size_max - 2u * size), size_max > 2u * size);
    let extra_index = select(0u, lod - last_halving, lod > last_halving);
    let region_y = select(2u * size_max, 0u, lod == 0u) + 2u * size * extra_index;

    let origin = vec2<u32>(region_x + (face % 3u) * size, region_y + (face / 3u) * size);
    let span = f32(size - 1u);
    let p = vec2<f32>(origin) + vec2<f32>(0.5) + vec2<f32>(uv.x, 1.0 - uv.y) * span;
    let rect_min = vec2<i32>(origin);
    let rect_max = rect_min + vec2<i32>(i32(size) - 1);
    return bilinear_2d(p, rect_min, rect_max);
}

fn sample_equirect(dir: vec3<f32>) -> vec4<f32> {
    let dims = vec2<i32>(textureDimensions(source_2d));
    let uv = vec2<f32>(atan2(dir.z, dir.x) / TAU + 0.5, 0.5 - asin(clamp(dir.y, -1.0, 1.0)) / PI);
    let q = uv * vec2<f32>(dims) - vec2<f32>(0.5);
    let base = floor(q);
    let f = q - base;
    let x0 = ((i32(base.x) % dims.x) + dims.x) % dims.x;
    let x1 = (x0 + 1) % dims.x;
    let y0 = clamp(i32(base.y), 0, dims.y - 1);
    let y1 = clamp(i32(base.y) + 1, 0, dims.y - 1);
    let top = mix(load_2d(vec2<i32>(x0, y0)), load_2d(vec2<i32>(x1, y0)), f.x);
    let bottom = mix(load_2d(vec2<i32>(x0, y1)), load_2d(vec2<i32>(x1, y1)), f.x);
    return mix(top, bottom, f.y);
}

fn sample_cube_faces(dir: vec3<f32>) -> vec4<f32> {
    let face = direction_face(dir);
    let uv = direction_face_uv(dir, face);
    let dims = vec2<i32>(textureDimensions(source_faces).xy);
    let q = vec2<f32>(uv.x, 1.0 - uv.y) * vec2<f32>(dims) - vec2<f32>(0.5);
    let base = floor(q);
    let f = q - base;
    let lo = clamp(vec2<i32>(base), vec2<i32>(0), dims - vec2<i32>(1));
    let hi = clamp(vec2<i32>(base) + vec2<i32>(1), vec2<i32>(0), dims - vec2<i32>(1));
    let top = mix(load_face(vec2<i32>(lo.x, lo.y), face), load_face(vec2<i32>(hi.x, lo.y), face), f.x);
    let bottom = mix(load_face(vec2<i32>(lo.x, hi.y), face), load_face(vec2<i32>(hi.x, hi.y), face), f.x);
    return mix(top, bottom, f.y);
}

// ---- blur ----

fn rotate(v: vec3<f32>, axis: vec3<f32>, theta: f32) -> vec3<f32> {
    let c = cos(theta);
    let s = sin(theta);
    return v * c + cross(axis, v) * s + axis * dot(axis, v) * (1.0 - c);
}

fn rotate_for_blur(dir: vec3<f32>, theta: f32) -> vec3<f32> {
    if theta == 0.0 {
        return dir;
    }
    let up = vec3<f32>(0.0, 1.0, 0.0);
    if params.latitudinal == 1u {
        let xz = max(length(dir.xz), POLE_EPSILON);
        return rotate(dir, up, theta / xz);
    }
    let pivot = cross(up, dir);
    let len = length(pivot);
    let axis = select(vec3<f32>(1.0, 0.0, 0.0), pivot / len, len > 0.0);
    return rotate(dir, axis, theta);
}

fn blur_weight(i: u32) -> f32 {
    return params.weights[i / 4u][i % 4u];
}

fn blur_tap(dir: vec3<f32>, theta: f32) -> vec3<f32> {
    return sample_cube_uv(rotate_for_blur(dir, theta), params.source_lod).rgb;
}

// ---- fragment programs ----

fn fragment_direction(in: VertexOutput) -> vec3<f32> {
    return face_direction(u32(max(round(in.face_index), 0.0)) % 6u, in.uv);
}

@fragment
fn fs_equirect(in: VertexOutput) -> @location(0) vec4<f32> {
    let colour = vec4<f32>(sample_equirect(fragment_direction(in)).rgb, 1.0);
    return encode(colour, params.output_encoding);
}

@fragment
fn fs_cubemap(in: VertexOutput) -> @location(0) vec4<f32> {
    let colour = vec4<f32>(sample_cube_faces(fragment_direction(in)).rgb, 1.0);
    return encode(colour, params.output_encoding);
}

@fragment
fn fs_blur(in: VertexOutput) -> @location(0) vec4<f32> {
    let dir = fragment_direction(in);
    let taps = clamp(params.samples, 1u, MAX_SAMPLES);
    var colour = blur_weight(0u) * blur_tap(dir, 0.0);
    for (var i = 1u; i < taps; i += 1u) {
        let theta = params.d_theta * f32(i);
        colour += blur_weight(i) * (blur_tap(dir, -theta) + blur_tap(dir, theta));
    }
    return encode(vec4<f32>(colour, 1.0), params.output_encoding);
}
"#;

struct GpuTexture {
    descriptor: TextureDescriptor,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// GPU-backed [`RenderDevice`].
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    source_bgl: wgpu::BindGroupLayout,
    placeholder_2d: wgpu::TextureView,
    placeholder_faces: wgpu::TextureView,
    pipelines: HashMap<(ProgramKind, TexelFormat), wgpu::RenderPipeline>,
    textures: HashMap<u32, GpuTexture>,
    next_id: u32,
}

impl WgpuDevice {
    /// Wrap an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pmrem-shader"),
            source: wgpu::ShaderSource::Wgsl(PMREM_SHADER_SOURCE.into()),
        });

        let params_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pmrem-params-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(
                        std::mem::size_of::<PmremParams>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let source_entry = |binding, view_dimension| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension,
                multisampled: false,
            },
            count: None,
        };
        let source_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pmrem-source-bgl"),
            entries: &[
                source_entry(0, wgpu::TextureViewDimension::D2),
                source_entry(1, wgpu::TextureViewDimension::D2Array),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pmrem-pipeline-layout"),
            bind_group_layouts: &[&params_bgl, &source_bgl],
            immediate_size: 0,
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pmrem-params"),
            size: std::mem::size_of::<PmremParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pmrem-params-bind-group"),
            layout: &params_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: params_buffer.as_entire_binding(),
            }],
        });

        let placeholder_2d = placeholder_view(&device, 1, wgpu::TextureViewDimension::D2);
        let placeholder_faces = placeholder_view(&device, 6, wgpu::TextureViewDimension::D2Array);

        log::info!("PMREM wgpu device ready");
        Self {
            device,
            queue,
            shader,
            pipeline_layout,
            params_buffer,
            params_bind_group,
            source_bgl,
            placeholder_2d,
            placeholder_faces,
            pipelines: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
        }
    }

    /// Open the default adapter without a surface and build a device on it.
    pub async fn new_headless() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| DeviceError::NoAdapter)?;

        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pmrem-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self::new(device, queue))
    }

    /// Blocking variant of [`WgpuDevice::new_headless`].
    pub fn new_headless_blocking() -> Result<Self, DeviceError> {
        pollster::block_on(Self::new_headless())
    }

    /// Number of textures currently allocated.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn texture(&self, handle: TextureHandle) -> Result<&GpuTexture, DeviceError> {
        self.textures
            .get(&handle.0)
            .ok_or(DeviceError::UnknownTexture(handle))
    }

    fn allocate(&mut self, descriptor: &TextureDescriptor, usage: wgpu::TextureUsages) -> TextureHandle {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&descriptor.label),
            size: wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: descriptor.layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.format.to_wgpu(),
            usage,
            view_formats: &[],
        });
        let dimension = if descriptor.layers == 1 {
            wgpu::TextureViewDimension::D2
        } else {
            wgpu::TextureViewDimension::D2Array
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&descriptor.label),
            dimension: Some(dimension),
            ..Default::default()
        });

        let handle = TextureHandle(self.next_id);
        self.next_id += 1;
        log::debug!(
            "Allocated GPU texture '{}' ({}x{}x{}, {:?}) as {handle:?}",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            descriptor.layers,
            descriptor.format
        );
        self.textures.insert(
            handle.0,
            GpuTexture {
                descriptor: descriptor.clone(),
                texture,
                view,
            },
        );
        handle
    }

    fn pipeline(&mut self, kind: ProgramKind, format: TexelFormat) -> &wgpu::RenderPipeline {
        let device = &self.device;
        let shader = &self.shader;
        let layout = &self.pipeline_layout;
        self.pipelines.entry((kind, format)).or_insert_with(|| {
            log::debug!("Building PMREM pipeline {kind:?} for {format:?}");
            create_quad_pipeline(device, shader, layout, kind, format)
        })
    }
}

impl RenderDevice for WgpuDevice {
    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
        texels: &[Vec4],
    ) -> Result<TextureHandle, DeviceError> {
        validate_upload(descriptor, Some(texels))?;
        let handle = self.allocate(
            descriptor,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
        );
        let texture = self.texture(handle)?;
        let bytes = descriptor.format.pack(texels);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(descriptor.width * descriptor.format.bytes_per_texel()),
                rows_per_image: Some(descriptor.height),
            },
            wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: descriptor.layers,
            },
        );
        Ok(handle)
    }

    fn create_render_target(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, DeviceError> {
        validate_upload(descriptor, None)?;
        let descriptor = TextureDescriptor {
            render_target: true,
            ..descriptor.clone()
        };
        // wgpu zero-initialises new textures.
        Ok(self.allocate(
            &descriptor,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        ))
    }

    fn submit_draw(&mut self, draw: &DrawCommand<'_>) -> Result<(), DeviceError> {
        let kind = draw.program.kind();
        let format = {
            let target = self.texture(draw.target)?;
            if !target.descriptor.render_target || target.descriptor.layers != 1 {
                return Err(DeviceError::InvalidUsage {
                    label: target.descriptor.label.clone(),
                    usage: "a render target",
                });
            }
            validate_viewport(&draw.viewport, &target.descriptor)?;
            target.descriptor.format
        };
        if draw.vertices.is_empty() {
            return Ok(());
        }
        let pipeline = self.pipeline(kind, format).clone();

        let target = self.texture(draw.target)?;
        let source = self.texture(draw.program.source())?;
        let expected_layers = if kind == ProgramKind::CubemapToCubeUv { 6 } else { 1 };
        if source.descriptor.layers != expected_layers {
            return Err(DeviceError::InvalidUsage {
                label: source.descriptor.label.clone(),
                usage: if expected_layers == 6 {
                    "a cube source"
                } else {
                    "a 2D source"
                },
            });
        }

        let params = PmremParams::new(
            &draw.program,
            source.descriptor.encoding,
            target.descriptor.encoding,
        );
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        let (view_2d, view_faces) = if kind == ProgramKind::CubemapToCubeUv {
            (&self.placeholder_2d, &source.view)
        } else {
            (&source.view, &self.placeholder_faces)
        };
        let source_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(draw.label),
            layout: &self.source_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view_2d),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view_faces),
                },
            ],
        });

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(draw.label),
                contents: bytemuck::cast_slice(draw.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(draw.label),
            });
        {
            let vp = draw.viewport;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(draw.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
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
                multiview_mask: None,
            });
            pass.set_viewport(
                vp.x as f32,
                vp.y as f32,
                vp.width as f32,
                vp.height as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(vp.x, vp.y, vp.width, vp.height);
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &self.params_bind_group, &[]);
            pass.set_bind_group(1, &source_bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..draw.vertices.len() as u32, 0..1);
        }
        self.queue.submit([encoder.finish()]);

        log::trace!("Submitted draw '{}' into {:?}", draw.label, draw.viewport);
        Ok(())
    }

    fn prepare(&mut self, kind: ProgramKind, format: TexelFormat) -> Result<(), DeviceError> {
        self.pipeline(kind, format);
        Ok(())
    }

    fn descriptor(&self, handle: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&handle.0).map(|t| &t.descriptor)
    }

    fn read_texels(&mut self, handle: TextureHandle) -> Result<Vec<Vec4>, DeviceError> {
        let texture = self.texture(handle)?;
        let desc = &texture.descriptor;
        let bytes_per_texel = desc.format.bytes_per_texel();
        let unpadded = desc.width * bytes_per_texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("pmrem-readback"),
            size: u64::from(padded) * u64::from(desc.height) * u64::from(desc.layers),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pmrem-readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(desc.height),
                },
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layers,
            },
        );
        self.queue.submit([encoder.finish()]);

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })?;
        rx.recv()
            .map_err(|_| DeviceError::ReadbackDropped(desc.label.clone()))??;

        let mapped = slice.get_mapped_range();
        let mut texels = Vec::with_capacity(desc.texel_count());
        for row in 0..desc.height * desc.layers {
            let start = (row * padded) as usize;
            let row_bytes = &mapped[start..start + unpadded as usize];
            texels.extend(
                row_bytes
                    .chunks_exact(bytes_per_texel as usize)
                    .map(|bytes| desc.format.unpack_texel(bytes)),
            );
        }
        drop(mapped);
        buffer.unmap();
        Ok(texels)
    }

    fn dispose(&mut self, handle: TextureHandle) {
        if let Some(texture) = self.textures.remove(&handle.0) {
            log::debug!("Disposed GPU texture '{}' ({handle:?})", texture.descriptor.label);
            texture.texture.destroy();
        }
    }
}

fn placeholder_view(
    device: &wgpu::Device,
    layers: u32,
    dimension: wgpu::TextureViewDimension,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("pmrem-placeholder"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("pmrem-placeholder"),
        dimension: Some(dimension),
        ..Default::default()
    })
}

fn create_quad_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    kind: ProgramKind,
    format: TexelFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(kind.fragment_entry()),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_quad"),
            buffers: &[QuadVertex::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(kind.fragment_entry()),
            targets: &[Some(wgpu::ColorTargetState {
                format: format.to_wgpu(),
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

/// Create a headless device for tests. Returns `None` if no GPU is available.
#[cfg(test)]
pub(crate) fn create_test_device() -> Option<WgpuDevice> {
    WgpuDevice::new_headless_blocking().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CpuDevice, Program};
    use pmrem_cubeuv::AtlasRect;

    fn face_quad(face: f32) -> Vec<QuadVertex> {
        let v = |x: f32, y: f32, u: f32, w: f32| QuadVertex {
            position: [x, y],
            uv: [u, w],
            face_index: face,
        };
        vec![
            v(-1.0, -1.0, 0.0, 0.0),
            v(1.0, -1.0, 1.0, 0.0),
            v(1.0, 1.0, 1.0, 1.0),
            v(-1.0, -1.0, 0.0, 0.0),
            v(1.0, 1.0, 1.0, 1.0),
            v(-1.0, 1.0, 0.0, 1.0),
        ]
    }

    fn gradient(width: u32, height: u32) -> Vec<Vec4> {
        (0..width * height)
            .map(|i| {
                let (x, y) = (i % width, i / width);
                Vec4::new(x as f32 / width as f32, y as f32 / height as f32, 0.25, 1.0)
            })
            .collect()
    }

    fn run_equirect<D: RenderDevice>(device: &mut D) -> Vec<Vec4> {
        let source_desc =
            TextureDescriptor::equirect("gradient", 16, 8).with_format(TexelFormat::Rgba32Float);
        let source = device.create_texture(&source_desc, &gradient(16, 8)).unwrap();
        let target_desc =
            TextureDescriptor::equirect("target", 8, 8).with_format(TexelFormat::Rgba32Float);
        let target = device.create_render_target(&target_desc).unwrap();
        device
            .submit_draw(&DrawCommand {
                label: "equirect",
                target,
                viewport: AtlasRect {
                    x: 0,
                    y: 0,
                    width: 8,
                    height: 8,
                },
                vertices: &face_quad(4.0),
                program: Program::EquirectToCubeUv { source },
            })
            .unwrap();
        device.read_texels(target).unwrap()
    }

    #[test]
    fn test_shader_source_declares_entry_points() {
        for kind in [
            ProgramKind::EquirectToCubeUv,
            ProgramKind::CubemapToCubeUv,
            ProgramKind::Blur,
        ] {
            assert!(PMREM_SHADER_SOURCE.contains(&format!("fn {}(", kind.fragment_entry())));
        }
        assert!(PMREM_SHADER_SOURCE.contains("fn vs_quad("));
    }

    #[test]
    fn test_prepare_builds_every_pipeline() {
        let Some(mut device) = create_test_device() else {
            return;
        };
        for kind in [
            ProgramKind::EquirectToCubeUv,
            ProgramKind::CubemapToCubeUv,
            ProgramKind::Blur,
        ] {
            for format in [
                TexelFormat::Rgba8Unorm,
                TexelFormat::Rgba16Float,
                TexelFormat::Rgba32Float,
            ] {
                assert!(device.prepare(kind, format).is_ok());
            }
        }
        assert_eq!(device.pipelines.len(), 9);
    }

    #[test]
    fn test_upload_readback_roundtrip() {
        let Some(mut device) = create_test_device() else {
            return;
        };
        let desc = TextureDescriptor::equirect("roundtrip", 5, 3).with_format(TexelFormat::Rgba16Float);
        let texels = gradient(5, 3);
        let handle = device.create_texture(&desc, &texels).unwrap();
        let back = device.read_texels(handle).unwrap();
        for (a, b) in texels.iter().zip(&back) {
            assert!((*a - *b).abs().max_element() < 1e-3);
        }
    }

    #[test]
    fn test_gpu_matches_software_device() {
        let Some(mut gpu) = create_test_device() else {
            return;
        };
        let mut cpu = CpuDevice::new();
        let expected = run_equirect(&mut cpu);
        let actual = run_equirect(&mut gpu);
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(&actual) {
            assert!((*e - *a).abs().max_element() < 1e-3, "cpu {e:?} vs gpu {a:?}");
        }
    }

    #[test]
    fn test_dispose_releases_texture() {
        let Some(mut device) = create_test_device() else {
            return;
        };
        let handle = device
            .create_render_target(&TextureDescriptor::equirect("tmp", 4, 4))
            .unwrap();
        assert_eq!(device.live_textures(), 1);
        device.dispose(handle);
        assert_eq!(device.live_textures(), 0);
    }
}
