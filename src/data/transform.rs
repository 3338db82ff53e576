use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use rand::Rng;

/// ImageNet channel statistics expected by the pretrained backbones.
pub const MEANS: [f32; 3] = [0.485, 0.456, 0.406];
pub const STDEVS: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    Random,
    Center,
}

/// Resize the short side to `resize`, crop a `crop × crop` window, normalize.
#[derive(Debug, Clone, Copy)]
pub struct ImageTransform {
    pub resize: u32,
    pub crop: u32,
    pub mode: CropMode,
}

impl ImageTransform {
    pub fn train(resize: u32, crop: u32) -> Self {
        ImageTransform {
            resize,
            crop,
            mode: CropMode::Random,
        }
    }

    pub fn eval(resize: u32, crop: u32) -> Self {
        ImageTransform {
            resize,
            crop,
            mode: CropMode::Center,
        }
    }

    /// Number of `f32` values one transformed image occupies (`3 × crop × crop`).
    pub fn image_len(&self) -> usize {
        3 * (self.crop as usize) * (self.crop as usize)
    }

    /// Apply the transform, returning a normalized CHW buffer.
    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> Vec<f32> {
        let resized = resize_short_side(image, self.resize.max(self.crop));
        let (w, h) = resized.dimensions();

        let (x, y) = match self.mode {
            CropMode::Center => ((w - self.crop) / 2, (h - self.crop) / 2),
            CropMode::Random => (
                rng.random_range(0..=w - self.crop),
                rng.random_range(0..=h - self.crop),
            ),
        };
        let cropped = imageops::crop_imm(&resized, x, y, self.crop, self.crop).to_image();
        normalize_chw(&cropped)
    }
}

fn resize_short_side(image: &DynamicImage, target: u32) -> RgbImage {
    let (w, h) = (image.width().max(1), image.height().max(1));
    let (nw, nh) = if w <= h {
        (target, ((h as u64 * target as u64) / w as u64).max(target as u64) as u32)
    } else {
        (((w as u64 * target as u64) / h as u64).max(target as u64) as u32, target)
    };
    image.resize_exact(nw, nh, FilterType::Triangle).to_rgb8()
}

fn normalize_chw(image: &RgbImage) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let plane = (w * h) as usize;
    let mut out = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = (y * w + x) as usize;
        for c in 0..3 {
            let v = pixel.0[c] as f32 / 255.0;
            out[c * plane + offset] = (v - MEANS[c]) / STDEVS[c];
        }
    }
    out
}
