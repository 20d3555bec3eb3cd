//! Turn uploaded or downloaded bytes into an RGB bitmap the pipeline accepts

use crate::error::{Error, Result};
use image::{ImageFormat, RgbImage};

/// Decode `bytes` and normalize the result to 8-bit RGB.
///
/// The format is sniffed from the magic bytes, so the upload's file name and
/// declared content type are irrelevant. Grayscale, alpha and palette images
/// are converted; alpha is dropped.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(Error::Decode("image data is empty".into()));
    }

    let format = image::guess_format(bytes)?;
    let image = image::load_from_memory_with_format(bytes, format)?;
    Ok(image.into_rgb8())
}

/// MIME type of the encoded image, for echoing it back as a `data:` URI
pub fn image_mime_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test;
    use image::{GrayImage, Luma};

    #[test]
    fn decodes_png_to_rgb() {
        let bytes = test::png_bytes(32, 16, [200, 10, 10]);
        let image = decode_image(&bytes).unwrap();
        assert_eq!(image.dimensions(), (32, 16));
        assert_eq!(image.get_pixel(0, 0).0, [200, 10, 10]);
    }

    #[test]
    fn decodes_jpeg() {
        let bytes = test::jpeg_bytes(40, 30);
        let image = decode_image(&bytes).unwrap();
        assert_eq!(image.dimensions(), (40, 30));
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let gray = image::DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([77])));
        let bytes = test::encode_png(&gray);
        let image = decode_image(&bytes).unwrap();
        assert_eq!(image.get_pixel(3, 3).0, [77, 77, 77]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn empty_is_a_decode_error() {
        assert!(matches!(decode_image(&[]), Err(Error::Decode(_))));
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let bytes = test::png_bytes(64, 64, [1, 2, 3]);
        let err = decode_image(&bytes[..20]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn mime_type_follows_magic_bytes() {
        assert_eq!(image_mime_type(&test::png_bytes(2, 2, [0, 0, 0])), "image/png");
        assert_eq!(image_mime_type(&test::jpeg_bytes(2, 2)), "image/jpeg");
        assert_eq!(image_mime_type(b"nope"), "application/octet-stream");
    }
}
