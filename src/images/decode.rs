use image::ImageResult;

/// Pixel layout of a [`DecodedImage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 16 bits per pixel, little-endian 5-6-5.
    Rgb565,
    /// 32 bits per pixel.
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb565 => 2,
            PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Bytes this image occupies in the cache budget
    pub fn byte_size(&self) -> usize {
        self.pixels.len()
    }

    /// Expand to RGBA8 for upload, whatever the stored format.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgba8 => self.pixels.clone(),
            PixelFormat::Rgb565 => {
                let mut out = Vec::with_capacity(self.pixels.len() * 2);
                for chunk in self.pixels.chunks_exact(2) {
                    let packed = u16::from_le_bytes([chunk[0], chunk[1]]);
                    let r = ((packed >> 11) & 0x1f) as u8;
                    let g = ((packed >> 5) & 0x3f) as u8;
                    let b = (packed & 0x1f) as u8;
                    out.extend_from_slice(&[
                        (r << 3) | (r >> 2),
                        (g << 2) | (g >> 4),
                        (b << 3) | (b >> 2),
                        255,
                    ]);
                }
                out
            }
        }
    }
}

/// Decode at 16 bits per pixel. Used for circle cuts, which are numerous and small.
pub fn decode_reduced(bytes: &[u8]) -> ImageResult<DecodedImage> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut pixels = Vec::with_capacity(width as usize * height as usize * 2);
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let packed = (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3);
        pixels.extend_from_slice(&packed.to_le_bytes());
    }

    Ok(DecodedImage {
        width,
        height,
        format: PixelFormat::Rgb565,
        pixels,
    })
}

/// Decode at full color depth. Used for map rasters and other common images.
pub fn decode_full(bytes: &[u8]) -> ImageResult<DecodedImage> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        width,
        height,
        format: PixelFormat::Rgba8,
        pixels: rgba.into_raw(),
    })
}
