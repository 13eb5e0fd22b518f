use findme_core::{EncodeError, Embedding, FaceEncoder};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// One face per image, embedded as the normalized colour of its first pixel.
/// Black images have no face.
pub struct ColorEncoder;

impl FaceEncoder for ColorEncoder {
    fn encode_image(&mut self, image: &RgbImage) -> Result<Vec<Embedding>, EncodeError> {
        let p = image.get_pixel(0, 0).0;
        if p == [0, 0, 0] {
            return Ok(vec![]);
        }
        Ok(vec![Embedding::new(
            p.iter().map(|&c| c as f32 / 255.0).collect(),
        )])
    }
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(8, 8, Rgb(color))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn write_photo(dir: &Path, name: &str, color: [u8; 3]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), png_bytes(color)).unwrap();
}
