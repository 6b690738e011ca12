use std::borrow::Cow;

use glam::{Vec3, Vec4};
use id_arena::Id;

pub type MaterialId = Id<MaterialData>;

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageData {
    /// Shrinks the image, keeping its aspect ratio, until both sides fit in `max_dimension`.
    /// Returns `None` for empty images or pixel data that does not match the size.
    pub fn fit_within(&self, max_dimension: u32) -> Option<Cow<'_, ImageData>> {
        if self.width == 0 || self.height == 0 || max_dimension == 0 {
            return None;
        }

        let largest = self.width.max(self.height);
        if largest <= max_dimension {
            return Some(Cow::Borrowed(self));
        }

        let scale = max_dimension as f64 / largest as f64;
        let width = ((self.width as f64 * scale).round() as u32).clamp(1, max_dimension);
        let height = ((self.height as f64 * scale).round() as u32).clamp(1, max_dimension);

        let buffer = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())?;
        let resized =
            image::imageops::resize(&buffer, width, height, image::imageops::FilterType::Triangle);

        Some(Cow::Owned(ImageData {
            width,
            height,
            pixels: resized.into_raw(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MaterialData {
    pub name: String,
    pub base_color_factor: Vec4,
    pub base_color_image: Option<ImageData>,
    pub double_sided: bool,
}

impl MaterialData {
    pub fn solid(name: impl Into<String>, color: Vec3, double_sided: bool) -> Self {
        Self {
            name: name.into(),
            base_color_factor: color.extend(1.0),
            base_color_image: None,
            double_sided,
        }
    }

    pub fn from_gltf(
        material: &gltf::Material,
        images: &[gltf::image::Data],
    ) -> anyhow::Result<Self> {
        let name = material.name().unwrap_or("Unnamed material").to_string();
        let pbr = material.pbr_metallic_roughness();

        let base_color_image = match pbr.base_color_texture() {
            Some(info) => {
                let image_index = info.texture().source().index();
                let data = images.get(image_index).ok_or_else(|| {
                    anyhow::anyhow!("Image index {} out of bounds ({})", image_index, name)
                })?;
                Some(convert_to_rgba(data)?)
            }
            None => None,
        };

        Ok(Self {
            name,
            base_color_factor: Vec4::from(pbr.base_color_factor()),
            base_color_image,
            double_sided: material.double_sided(),
        })
    }
}

pub fn convert_to_rgba(data: &gltf::image::Data) -> anyhow::Result<ImageData> {
    use gltf::image::Format;
    use image::{DynamicImage, ImageBuffer};

    let (w, h) = (data.width, data.height);
    let invalid = || anyhow::anyhow!("Image data does not match {}x{} {:?}", w, h, data.format);

    let to_u16 = |bytes: &[u8]| -> Vec<u16> {
        bytes
            .chunks_exact(2)
            .map(|b| u16::from_ne_bytes([b[0], b[1]]))
            .collect()
    };
    let to_f32 = |bytes: &[u8]| -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    };

    let pixels = data.pixels.clone();
    let image = match data.format {
        Format::R8G8B8A8 => {
            DynamicImage::ImageRgba8(ImageBuffer::from_raw(w, h, pixels).ok_or_else(invalid)?)
        }
        Format::R8G8B8 => {
            DynamicImage::ImageRgb8(ImageBuffer::from_raw(w, h, pixels).ok_or_else(invalid)?)
        }
        Format::R8G8 => {
            DynamicImage::ImageLumaA8(ImageBuffer::from_raw(w, h, pixels).ok_or_else(invalid)?)
        }
        Format::R8 => {
            DynamicImage::ImageLuma8(ImageBuffer::from_raw(w, h, pixels).ok_or_else(invalid)?)
        }
        Format::R16 => DynamicImage::ImageLuma16(
            ImageBuffer::from_raw(w, h, to_u16(&pixels)).ok_or_else(invalid)?,
        ),
        Format::R16G16 => DynamicImage::ImageLumaA16(
            ImageBuffer::from_raw(w, h, to_u16(&pixels)).ok_or_else(invalid)?,
        ),
        Format::R16G16B16 => DynamicImage::ImageRgb16(
            ImageBuffer::from_raw(w, h, to_u16(&pixels)).ok_or_else(invalid)?,
        ),
        Format::R16G16B16A16 => DynamicImage::ImageRgba16(
            ImageBuffer::from_raw(w, h, to_u16(&pixels)).ok_or_else(invalid)?,
        ),
        Format::R32G32B32FLOAT => DynamicImage::ImageRgb32F(
            ImageBuffer::from_raw(w, h, to_f32(&pixels)).ok_or_else(invalid)?,
        ),
        Format::R32G32B32A32FLOAT => DynamicImage::ImageRgba32F(
            ImageBuffer::from_raw(w, h, to_f32(&pixels)).ok_or_else(invalid)?,
        ),
    };

    Ok(ImageData {
        width: w,
        height: h,
        pixels: image.to_rgba8().into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_images_gain_opaque_alpha() {
        let data = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: gltf::image::Format::R8G8B8,
            width: 2,
            height: 1,
        };

        let rgba = convert_to_rgba(&data).unwrap();
        assert_eq!(rgba.pixels, vec![10, 20, 30, 255, 40, 50, 60, 255]);
    }

    fn checker(width: u32, height: u32) -> ImageData {
        ImageData {
            width,
            height,
            pixels: vec![128; (width * height * 4) as usize],
        }
    }

    #[test]
    fn images_within_limits_are_kept() {
        let image = checker(64, 32);
        assert!(matches!(image.fit_within(64), Some(Cow::Borrowed(_))));
    }

    #[test]
    fn oversized_images_are_downscaled_keeping_aspect() {
        let image = checker(400, 100);
        let fitted = image.fit_within(200).unwrap();

        assert_eq!((fitted.width, fitted.height), (200, 50));
        assert_eq!(fitted.pixels.len(), 200 * 50 * 4);
    }

    #[test]
    fn empty_images_do_not_fit() {
        assert!(checker(0, 16).fit_within(1024).is_none());
        assert!(checker(16, 0).fit_within(1024).is_none());
    }

    #[test]
    fn short_pixel_buffers_are_rejected() {
        let data = gltf::image::Data {
            pixels: vec![0; 3],
            format: gltf::image::Format::R8G8B8A8,
            width: 2,
            height: 2,
        };

        assert!(convert_to_rgba(&data).is_err());
    }
}
