//! Watermark image loading

use crate::capture::VideoFrame;
use crate::utils::error::{EngineError, EngineResult};
use std::io::Read;
use std::path::Path;

/// Load a PNG file as an RGBA frame
pub fn load_watermark(path: &Path) -> EngineResult<VideoFrame> {
    let file = std::fs::File::open(path)?;
    let image = decode_png(file)?;
    tracing::info!(
        "Loaded watermark {:?} ({}x{})",
        path,
        image.width,
        image.height
    );
    Ok(image)
}

/// Decode PNG bytes as an RGBA frame
pub fn decode_png<R: Read>(source: R) -> EngineResult<VideoFrame> {
    let mut decoder = png::Decoder::new(source);
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder
        .read_info()
        .map_err(|e| EngineError::Image(format!("PNG decode error: {}", e)))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| EngineError::Image(format!("PNG frame error: {}", e)))?;

    if info.bit_depth != png::BitDepth::Eight {
        return Err(EngineError::Image(format!(
            "Unsupported PNG bit depth: {:?}",
            info.bit_depth
        )));
    }

    let raw = &buf[..info.buffer_size()];
    let data = match info.color_type {
        png::ColorType::Rgba => raw.to_vec(),
        png::ColorType::Rgb => {
            let mut rgba = Vec::with_capacity(raw.len() / 3 * 4);
            for chunk in raw.chunks(3) {
                rgba.extend_from_slice(chunk);
                rgba.push(255);
            }
            rgba
        }
        png::ColorType::GrayscaleAlpha => {
            let mut rgba = Vec::with_capacity(raw.len() * 2);
            for chunk in raw.chunks(2) {
                rgba.extend_from_slice(&[chunk[0], chunk[0], chunk[0], chunk[1]]);
            }
            rgba
        }
        png::ColorType::Grayscale => {
            let mut rgba = Vec::with_capacity(raw.len() * 4);
            for &v in raw {
                rgba.extend_from_slice(&[v, v, v, 255]);
            }
            rgba
        }
        other => {
            return Err(EngineError::Image(format!(
                "Unsupported PNG color type: {:?}",
                other
            )));
        }
    };

    Ok(VideoFrame {
        width: info.width,
        height: info.height,
        data,
    })
}
