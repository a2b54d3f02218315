//! Texture descriptors, handles, texel formats and colour encodings.
//!
//! Texel data crosses the device boundary as RGBA `f32` values in the
//! texture's *stored* representation: encoded by its [`ColorEncoding`] and
//! quantised to its [`TexelFormat`]. Programs decode on read and encode on write.

use glam::Vec4;

/// Opaque handle to a texture owned by a [`RenderDevice`](crate::RenderDevice).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u32);

impl TextureHandle {
    /// Raw id, unique per device.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Storage format of a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    /// 8 bits per channel, normalised.
    #[default]
    Rgba8Unorm,
    /// 16-bit float per channel.
    Rgba16Float,
    /// 32-bit float per channel.
    Rgba32Float,
}

impl TexelFormat {
    /// Bytes per texel.
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TexelFormat::Rgba8Unorm => 4,
            TexelFormat::Rgba16Float => 8,
            TexelFormat::Rgba32Float => 16,
        }
    }

    /// Round a value to what this format can store.
    pub fn quantize(self, value: Vec4) -> Vec4 {
        match self {
            TexelFormat::Rgba8Unorm => {
                (value.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round() / 255.0
            }
            TexelFormat::Rgba16Float => {
                Vec4::from_array(value.to_array().map(|c| half::f16::from_f32(c).to_f32()))
            }
            TexelFormat::Rgba32Float => value,
        }
    }

    /// Equivalent wgpu format. The sRGB transfer is applied in shaders, never by the format.
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TexelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TexelFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Pack stored values into tightly packed bytes for upload.
    pub fn pack(self, texels: &[Vec4]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(texels.len() * self.bytes_per_texel() as usize);
        for texel in texels {
            match self {
                TexelFormat::Rgba8Unorm => {
                    let q = (texel.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
                    bytes.extend(q.to_array().map(|c| c as u8));
                }
                TexelFormat::Rgba16Float => {
                    for c in texel.to_array() {
                        bytes.extend_from_slice(&half::f16::from_f32(c).to_le_bytes());
                    }
                }
                TexelFormat::Rgba32Float => {
                    bytes.extend_from_slice(bytemuck::cast_slice(&texel.to_array()));
                }
            }
        }
        bytes
    }

    /// Unpack tightly packed bytes of one texel.
    pub fn unpack_texel(self, bytes: &[u8]) -> Vec4 {
        match self {
            TexelFormat::Rgba8Unorm => {
                Vec4::new(bytes[0] as f32, bytes[1] as f32, bytes[2] as f32, bytes[3] as f32)
                    / 255.0
            }
            TexelFormat::Rgba16Float => {
                let c = |i: usize| half::f16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]).to_f32();
                Vec4::new(c(0), c(1), c(2), c(3))
            }
            TexelFormat::Rgba32Float => {
                let c = |i: usize| {
                    f32::from_le_bytes([bytes[4 * i], bytes[4 * i + 1], bytes[4 * i + 2], bytes[4 * i + 3]])
                };
                Vec4::new(c(0), c(1), c(2), c(3))
            }
        }
    }
}

/// Colour encoding of stored texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorEncoding {
    /// Values are linear radiance.
    #[default]
    Linear,
    /// sRGB transfer function on RGB; alpha linear.
    Srgb,
    /// Shared-exponent HDR: RGB mantissas, exponent in alpha (`a·255 − 128`).
    Rgbe,
}

impl ColorEncoding {
    /// Numeric id used in GPU uniforms.
    pub fn shader_id(self) -> u32 {
        match self {
            ColorEncoding::Linear => 0,
            ColorEncoding::Srgb => 1,
            ColorEncoding::Rgbe => 2,
        }
    }

    /// Stored value → linear RGBA.
    pub fn decode(self, stored: Vec4) -> Vec4 {
        match self {
            ColorEncoding::Linear => stored,
            ColorEncoding::Srgb => {
                let rgb = stored.truncate().to_array().map(srgb_to_linear);
                Vec4::new(rgb[0], rgb[1], rgb[2], stored.w)
            }
            ColorEncoding::Rgbe => {
                let scale = (stored.w * 255.0 - 128.0).exp2();
                (stored.truncate() * scale).extend(1.0)
            }
        }
    }

    /// Linear RGBA → stored value.
    pub fn encode(self, linear: Vec4) -> Vec4 {
        match self {
            ColorEncoding::Linear => linear,
            ColorEncoding::Srgb => {
                let rgb = linear.truncate().to_array().map(linear_to_srgb);
                Vec4::new(rgb[0], rgb[1], rgb[2], linear.w)
            }
            ColorEncoding::Rgbe => {
                let max_component = linear.truncate().max_element().max(0.0);
                let exponent = max_component.log2().ceil().clamp(-128.0, 127.0);
                (linear.truncate() / exponent.exp2()).extend((exponent + 128.0) / 255.0)
            }
        }
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Texture sampling filter recorded for consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Everything a device needs to allocate a texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureDescriptor {
    /// Debug label.
    pub label: String,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Array layers: 1 for 2D images, 6 for cube sources.
    pub layers: u32,
    /// Storage format.
    pub format: TexelFormat,
    /// Colour encoding of stored values.
    pub encoding: ColorEncoding,
    /// Anisotropic filtering level consumers should sample with.
    pub anisotropy: u16,
    /// Filter consumers should sample with.
    pub filter: FilterMode,
    /// Whether a hardware mip chain exists.
    pub mipmaps: bool,
    /// Whether the texture can be drawn into.
    pub render_target: bool,
}

impl TextureDescriptor {
    /// A 2D equirectangular source image.
    pub fn equirect(label: &str, width: u32, height: u32) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            layers: 1,
            format: TexelFormat::default(),
            encoding: ColorEncoding::default(),
            anisotropy: 1,
            filter: FilterMode::Linear,
            mipmaps: false,
            render_target: false,
        }
    }

    /// A six-layer cube source with square faces.
    pub fn cube(label: &str, size: u32) -> Self {
        Self {
            layers: 6,
            ..Self::equirect(label, size, size)
        }
    }

    /// Set the storage format.
    pub fn with_format(mut self, format: TexelFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the colour encoding.
    pub fn with_encoding(mut self, encoding: ColorEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set the anisotropy level.
    pub fn with_anisotropy(mut self, anisotropy: u16) -> Self {
        self.anisotropy = anisotropy;
        self
    }

    /// Number of texels across all layers.
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.layers as usize
    }
}
