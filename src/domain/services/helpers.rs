use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Per-channel mean of the images the CLIP vision towers were trained on
pub const CLIP_IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
/// Per-channel standard deviation of the images the CLIP vision towers were trained on
pub const CLIP_IMAGE_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Scales `vector` to a unit L2 norm, in place.
///
/// A zero vector is left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
}

/// Turns an image into the flat NCHW pixel buffer expected by the vision tower.
///
/// - center-crops the largest square of the source image
/// - resizes that square to `size` x `size` (bicubic)
/// - scales to [0, 1] then normalizes each channel with the CLIP mean and std
///
/// Cropping happens in source coordinates: the resized buffer is always `size` x `size`,
/// whatever the aspect ratio of the input.
///
/// The returned buffer has `3 * size * size` values: all red values, then green, then blue.
pub fn image_to_chw(image: &DynamicImage, size: u32) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let side = width.min(height);
    let left = (width - side) / 2;
    let top = (height - side) / 2;

    let cropped = image
        .crop_imm(left, top, side, side)
        .resize_exact(size, size, FilterType::CatmullRom)
        .to_rgb8();

    let plane = (size * size) as usize;
    let mut pixels = vec![0.0; 3 * plane];
    for (x, y, pixel) in cropped.enumerate_pixels() {
        let offset = (y * size + x) as usize;
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            pixels[channel * plane + offset] =
                (value - CLIP_IMAGE_MEAN[channel]) / CLIP_IMAGE_STD[channel];
        }
    }

    pixels
}
