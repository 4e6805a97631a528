//! Still-image codec for reference uploads and one-shot previews
//!
//! Browsers send images as base64 data URLs; the processor works on BGR24
//! buffers. Everything here converts between the two.

use crate::error::{MediaError, MediaResult};
use crate::tracks::ImageBuffer;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

/// Default JPEG quality for preview responses
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Decode an encoded still image (JPEG, PNG, ...) into a BGR24 buffer
pub fn decode_image(encoded: &[u8]) -> MediaResult<ImageBuffer> {
    if encoded.is_empty() {
        return Err(MediaError::invalid_input("empty image payload"));
    }

    let decoded = image::load_from_memory(encoded)
        .map_err(|e| MediaError::invalid_input(format!("undecodable image: {}", e)))?;
    let rgb: RgbImage = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut bgr = rgb.into_raw();
    for px in bgr.chunks_exact_mut(3) {
        px.swap(0, 2);
    }

    ImageBuffer::new(width, height, bgr)
}

/// Encode a BGR24 buffer as JPEG
pub fn encode_jpeg(image: &ImageBuffer, quality: u8) -> MediaResult<Vec<u8>> {
    image.validate()?;

    let mut rgb = image.data.to_vec();
    for px in rgb.chunks_exact_mut(3) {
        px.swap(0, 2);
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(&rgb, image.width, image.height, ExtendedColorType::Rgb8)
        .map_err(|e| MediaError::EncodingFailed {
            codec: "jpeg".to_string(),
            reason: e.to_string(),
        })?;
    Ok(out)
}

/// Strip an optional `data:<mime>;base64,` prefix and base64-decode the rest
pub fn decode_data_url_bytes(data_url: &str) -> MediaResult<Bytes> {
    let payload = match data_url.split_once(',') {
        Some((_, payload)) => payload,
        None => data_url,
    };

    STANDARD
        .decode(payload.trim())
        .map(Bytes::from)
        .map_err(|e| MediaError::invalid_input(format!("invalid base64 payload: {}", e)))
}

/// Decode a base64 data URL (or bare base64) into a BGR24 buffer
pub fn decode_data_url(data_url: &str) -> MediaResult<ImageBuffer> {
    decode_image(&decode_data_url_bytes(data_url)?)
}

/// Encode a buffer as a `data:image/jpeg;base64,...` URL
pub fn encode_data_url_jpeg(image: &ImageBuffer, quality: u8) -> MediaResult<String> {
    let jpeg = encode_jpeg(image, quality)?;
    Ok(jpeg_data_url(&jpeg))
}

/// Wrap already-encoded JPEG bytes in a data URL
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_round_trip_keeps_dimensions() {
        let image = ImageBuffer::filled(32, 16, [40, 80, 200]);
        let jpeg = encode_jpeg(&image, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!((decoded.width, decoded.height), (32, 16));

        // lossy, but a flat colour survives closely and stays BGR ordered
        let [b, g, r] = decoded.pixel(5, 5).unwrap();
        assert!((b as i32 - 40).abs() < 12);
        assert!((g as i32 - 80).abs() < 12);
        assert!((r as i32 - 200).abs() < 12);
    }

    #[test]
    fn test_data_url_prefix_is_optional() {
        let image = ImageBuffer::filled(8, 8, [0, 0, 0]);
        let url = encode_data_url_jpeg(&image, 80).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let with_prefix = decode_data_url(&url).unwrap();
        let bare = decode_data_url(url.split_once(',').unwrap().1).unwrap();
        assert_eq!(with_prefix.width, 8);
        assert_eq!(bare.height, 8);
    }

    #[test]
    fn test_garbage_is_invalid_input() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(MediaError::InvalidInput { .. })
        ));
        assert!(matches!(
            decode_image(&[]),
            Err(MediaError::InvalidInput { .. })
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@@"),
            Err(MediaError::InvalidInput { .. })
        ));
    }
}
