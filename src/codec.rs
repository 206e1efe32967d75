//! Image decoding.
//!
//! Only the containers compiled into the `image` crate features are
//! accepted (JPEG, PNG, GIF, WebP, BMP, TIFF). Everything else, including
//! HEIC/AVIF/RAW, surfaces as [`DetectError::Decode`].

use image::RgbImage;

use crate::error::DetectError;

/// Decode an encoded image buffer into an 8-bit RGB pixel grid.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DetectError> {
    if bytes.is_empty() {
        return Err(DetectError::Decode("image payload is empty".to_string()));
    }
    let decoded =
        image::load_from_memory(bytes).map_err(|e| DetectError::Decode(e.to_string()))?;
    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(DetectError::Decode(format!(
            "image has zero size ({}x{})",
            rgb.width(),
            rgb.height()
        )));
    }
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode(img: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_and_jpeg() {
        let img = RgbImage::from_pixel(100, 80, Rgb([10, 20, 30]));
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp] {
            let decoded = decode_image(&encode(&img, format)).unwrap();
            assert_eq!(decoded.dimensions(), (100, 80));
        }
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = decode_image(b"invalid!@#$").unwrap_err();
        assert!(matches!(err, DetectError::Decode(_)));
    }

    #[test]
    fn rejects_empty_buffer() {
        assert!(matches!(decode_image(&[]), Err(DetectError::Decode(_))));
    }

    #[test]
    fn rejects_unsupported_container() {
        // ISO-BMFF header of an AVIF/HEIC file; no decoder is compiled in.
        let mut avif = vec![0, 0, 0, 0x1c];
        avif.extend_from_slice(b"ftypavif");
        avif.extend_from_slice(&[0; 16]);
        assert!(matches!(decode_image(&avif), Err(DetectError::Decode(_))));
    }
}
