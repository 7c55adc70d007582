use image::{DynamicImage, ImageReader};
use ndarray::Array4;
use std::io::Cursor;
use std::path::Path;

use super::config::ModelConfig;
use super::model::InferenceError;

pub fn load_image(path: &Path) -> Result<DynamicImage, InferenceError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.decode()?)
}

/// Decodes uploaded bytes, guessing the format from their content rather than any file name.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, InferenceError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.decode()?)
}

/// Converts an image into a single-batch NHWC tensor with channels scaled to [0, 1].
pub fn preprocess(image: &DynamicImage, config: &ModelConfig) -> Result<Array4<f32>, InferenceError> {
    let (width, height) = config.input_size();
    let scale = config.image.preprocessing.scale;
    let filter = config.image.preprocessing.resize_method.filter();

    let rgb = image.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(InferenceError::Preprocessing("image has no pixels".into()));
    }
    let resized = image::imageops::resize(&rgb, width, height, filter);

    let tensor = Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| f32::from(resized.get_pixel(x as u32, y as u32)[c]) / scale,
    );
    Ok(tensor)
}
