//! Joint text + image encoding in the layout ViLT expects

use crate::error::{Error, Result};
use anyhow::{anyhow, Context};
use image::{imageops::FilterType, RgbImage};
use std::path::Path;
use tch::{Device, Kind, Tensor};
use tokenizers::Tokenizer;

/// Target length of the shorter image edge
pub const SHORTEST_EDGE: u32 = 384;

/// Both image edges are floored to a multiple of this
pub const SIZE_DIVISOR: u32 = 32;

/// Per-channel normalization
pub const MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Text window of the ViLT position embeddings
pub const DEFAULT_MAX_TEXT_LEN: usize = 40;

/// Model inputs for a single question/image pair. Every tensor has a batch
/// dimension of 1 and lives on the CPU.
#[derive(Debug)]
pub struct Encoding {
    /// `[1, T]` int64
    pub input_ids: Tensor,
    /// `[1, T]` int64
    pub attention_mask: Tensor,
    /// `[1, T]` int64
    pub token_type_ids: Tensor,
    /// `[1, 3, H, W]` float
    pub pixel_values: Tensor,
    /// `[1, H, W]` int64
    pub pixel_mask: Tensor,
}

pub struct Processor {
    tokenizer: Tokenizer,
    max_text_len: usize,
}

impl Processor {
    pub fn new(tokenizer: Tokenizer, max_text_len: usize) -> Self {
        Processor {
            tokenizer,
            max_text_len: max_text_len.max(2),
        }
    }

    /// Load a Hugging Face `tokenizer.json`
    pub fn from_file(path: &Path, max_text_len: usize) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("failed to load tokenizer from {}", path.display()))?;
        Ok(Self::new(tokenizer, max_text_len))
    }

    pub fn encode(&self, question: &str, image: &RgbImage) -> Result<Encoding> {
        let (input_ids, attention_mask, token_type_ids) = self.encode_text(question)?;
        let (pixel_values, pixel_mask) = encode_image(image)?;
        Ok(Encoding {
            input_ids,
            attention_mask,
            token_type_ids,
            pixel_values,
            pixel_mask,
        })
    }

    fn encode_text(&self, question: &str) -> Result<(Tensor, Tensor, Tensor)> {
        let encoding = self
            .tokenizer
            .encode(question, true)
            .map_err(|e| Error::Inference(format!("tokenization failed: {e}")))?;

        let ids = truncate(encoding.get_ids(), self.max_text_len);
        let mask = truncate(encoding.get_attention_mask(), self.max_text_len);
        let type_ids = truncate(encoding.get_type_ids(), self.max_text_len);

        let len = ids.len() as i64;
        Ok((
            Tensor::f_from_slice(&ids)?.f_view([1, len])?,
            Tensor::f_from_slice(&mask)?.f_view([1, len])?,
            Tensor::f_from_slice(&type_ids)?.f_view([1, len])?,
        ))
    }
}

/// Keep at most `max` tokens. The final token (`[SEP]`) is always kept.
fn truncate(values: &[u32], max: usize) -> Vec<i64> {
    let mut out: Vec<i64> = values.iter().map(|&v| v as i64).collect();
    if out.len() > max {
        let last = out[out.len() - 1];
        out.truncate(max - 1);
        out.push(last);
    }
    out
}

/// Output size for an input of `width` x `height`, or `None` when an edge
/// would collapse to zero.
///
/// The shorter edge is scaled to [`SHORTEST_EDGE`], the longer edge is capped
/// at `1333 / 800` times that, and both are rounded and floored to a multiple
/// of [`SIZE_DIVISOR`].
pub fn resized_dimensions(width: u32, height: u32) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }

    let shortest = SHORTEST_EDGE as f64;
    let longest_cap = (1333.0 / 800.0 * shortest).floor();
    let (w, h) = (width as f64, height as f64);

    let scale = shortest / w.min(h);
    let (mut new_w, mut new_h) = if h < w {
        (scale * w, shortest)
    } else {
        (shortest, scale * h)
    };

    let longest = new_w.max(new_h);
    if longest > longest_cap {
        let scale = longest_cap / longest;
        new_w *= scale;
        new_h *= scale;
    }

    let new_w = (new_w + 0.5) as u32 / SIZE_DIVISOR * SIZE_DIVISOR;
    let new_h = (new_h + 0.5) as u32 / SIZE_DIVISOR * SIZE_DIVISOR;
    match (new_w, new_h) {
        (0, _) | (_, 0) => None,
        dims => Some(dims),
    }
}

/// Resize, rescale to `[0, 1]`, normalize and lay out as NCHW
fn encode_image(image: &RgbImage) -> Result<(Tensor, Tensor)> {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = resized_dimensions(width, height).ok_or_else(|| {
        Error::Inference(format!(
            "image of {width}x{height} pixels cannot be resized for the model"
        ))
    })?;

    let resized = image::imageops::resize(image, new_w, new_h, FilterType::CatmullRom);

    let plane = (new_w * new_h) as usize;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y * new_w + x) as usize;
        for c in 0..3 {
            data[c * plane + offset] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
        }
    }

    let (h, w) = (new_h as i64, new_w as i64);
    let pixel_values = Tensor::f_from_slice(&data)?.f_view([1, 3, h, w])?;
    let pixel_mask = Tensor::f_ones([1, h, w], (Kind::Int64, Device::Cpu))?;
    Ok((pixel_values, pixel_mask))
}
