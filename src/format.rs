//! Fixed binary layout for trained parameters.
//!
//! This file is the sole durable interface between the trainer and any
//! inference runtime, so the layout is byte-invariant across
//! implementations. All integers and floats are little-endian:
//!
//! | offset | field      | type        | constraint                |
//! |--------|------------|-------------|---------------------------|
//! | 0      | inputSize  | u32         | must equal 256            |
//! | 4      | hiddenSize | u32         | H, any positive value     |
//! | 8      | numLayers  | u32         | must equal 1              |
//! | 12     | reserved   | u32         | must equal 0              |
//! | 16     | w_ih       | f32[4H*256] | row-major                 |
//! | +      | w_hh       | f32[4H*H]   | row-major                 |
//! | +      | b_ih       | f32[4H]     |                           |
//! | +      | b_hh       | f32[4H]     |                           |
//! | +      | w_out      | f32[256*H]  | row-major                 |
//! | +      | b_out      | f32[256]    |                           |
//!
//! The 4H-sized arrays are four stacked H-blocks in gate order input,
//! forget, candidate, output. Readers reject a nonzero `reserved` field
//! rather than ignoring it; that field gates incompatible structural
//! revisions. Bytes after the declared extent are ignored, which leaves
//! room for appended metadata in compatible revisions.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use memmap2::MmapOptions;
use ndarray::{Array1, Array2};

use crate::error::{Error, Result};
use crate::model::{LstmWeights, ALPHABET};

/// Fixed one-hot input width written to every header.
pub const INPUT_SIZE: u32 = 256;
/// The format carries exactly one recurrent layer.
pub const NUM_LAYERS: u32 = 1;
/// Header length in bytes.
pub const HEADER_LEN: usize = 16;

/// Float counts per tensor for hidden size `h`, in serialization order.
pub fn tensor_counts(h: usize) -> [(&'static str, usize); 6] {
    [
        ("w_ih", 4 * h * ALPHABET),
        ("w_hh", 4 * h * h),
        ("b_ih", 4 * h),
        ("b_hh", 4 * h),
        ("w_out", ALPHABET * h),
        ("b_out", ALPHABET),
    ]
}

/// Exact file length for hidden size `h`.
pub fn expected_len(h: usize) -> usize {
    HEADER_LEN + 4 * tensor_counts(h).iter().map(|(_, n)| n).sum::<usize>()
}

/// Serialize a parameter set into the fixed layout.
///
/// Shape validity is guaranteed by the `LstmWeights` constructor, so this
/// cannot fail: every representable parameter set has exactly one encoding.
pub fn to_bytes(weights: &LstmWeights) -> Vec<u8> {
    let mut out = Vec::with_capacity(expected_len(weights.hidden_size()));
    out.extend_from_slice(&INPUT_SIZE.to_le_bytes());
    out.extend_from_slice(&(weights.hidden_size() as u32).to_le_bytes());
    out.extend_from_slice(&NUM_LAYERS.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    let floats = weights
        .w_ih()
        .iter()
        .chain(weights.w_hh().iter())
        .chain(weights.b_ih().iter())
        .chain(weights.b_hh().iter())
        .chain(weights.w_out().iter())
        .chain(weights.b_out().iter());
    for &v in floats {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn read_u32(blob: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([blob[off], blob[off + 1], blob[off + 2], blob[off + 3]])
}

fn read_f32s(blob: &[u8], off: &mut usize, n: usize) -> Result<Vec<f32>> {
    let end = *off + n * 4;
    if blob.len() < end {
        return Err(Error::TruncatedFile {
            required: end,
            provided: blob.len(),
        });
    }
    let out = blob[*off..end]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    *off = end;
    Ok(out)
}

/// Deserialize a parameter set from the fixed layout.
///
/// Validates the fixed header fields, then reads exactly the declared
/// number of floats per tensor and nothing more. Trailing bytes are
/// ignored. A blob that ends before the declared arrays do is rejected,
/// never zero-padded: a guessed weight would desynchronize the encoder and
/// decoder of any stream compressed with this model.
pub fn from_bytes(blob: &[u8]) -> Result<LstmWeights> {
    if blob.len() < HEADER_LEN {
        return Err(Error::TruncatedFile {
            required: HEADER_LEN,
            provided: blob.len(),
        });
    }
    let input_size = read_u32(blob, 0);
    let hidden = read_u32(blob, 4);
    let layers = read_u32(blob, 8);
    let reserved = read_u32(blob, 12);

    if input_size != INPUT_SIZE {
        return Err(Error::MalformedHeader(format!(
            "inputSize {} (expected {})",
            input_size, INPUT_SIZE
        )));
    }
    if layers != NUM_LAYERS {
        return Err(Error::MalformedHeader(format!(
            "numLayers {} (expected {})",
            layers, NUM_LAYERS
        )));
    }
    if reserved != 0 {
        return Err(Error::MalformedHeader(format!(
            "reserved field is {}, file uses an unknown format revision",
            reserved
        )));
    }
    if hidden == 0 {
        return Err(Error::MalformedHeader("hiddenSize is 0".to_string()));
    }

    let h = hidden as usize;
    let counts = tensor_counts(h);
    let mut off = HEADER_LEN;
    let w_ih = read_f32s(blob, &mut off, counts[0].1)?;
    let w_hh = read_f32s(blob, &mut off, counts[1].1)?;
    let b_ih = read_f32s(blob, &mut off, counts[2].1)?;
    let b_hh = read_f32s(blob, &mut off, counts[3].1)?;
    let w_out = read_f32s(blob, &mut off, counts[4].1)?;
    let b_out = read_f32s(blob, &mut off, counts[5].1)?;

    let shape_err = |e: ndarray::ShapeError| Error::MalformedHeader(e.to_string());
    LstmWeights::new(
        h,
        Array2::from_shape_vec((4 * h, ALPHABET), w_ih).map_err(shape_err)?,
        Array2::from_shape_vec((4 * h, h), w_hh).map_err(shape_err)?,
        Array1::from(b_ih),
        Array1::from(b_hh),
        Array2::from_shape_vec((ALPHABET, h), w_out).map_err(shape_err)?,
        Array1::from(b_out),
    )
}

/// Write a parameter set to `path` in the fixed layout.
pub fn write_model<P: AsRef<Path>>(path: P, weights: &LstmWeights) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(&to_bytes(weights))?;
    Ok(())
}

/// Load a parameter set from `path` via a read-only memory map.
pub fn read_model<P: AsRef<Path>>(path: P) -> Result<LstmWeights> {
    let file = File::open(path)?;
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    from_bytes(&mmap)
}

/// Header-only report produced by [`inspect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSummary {
    pub input_size: u32,
    pub hidden_size: u32,
    pub num_layers: u32,
    pub reserved: u32,
    /// Payload bytes actually present after the header.
    pub payload_present: usize,
}

impl ModelSummary {
    /// Element counts the header implies, in serialization order.
    pub fn tensor_counts(&self) -> [(&'static str, usize); 6] {
        tensor_counts(self.hidden_size as usize)
    }

    /// File length the header implies.
    pub fn expected_len(&self) -> usize {
        expected_len(self.hidden_size as usize)
    }
}

/// Structural inspection: read the 16-byte header and derive the expected
/// array sizes without decoding the float payload.
///
/// Deliberately applies none of the import-time fixed-value checks; this is
/// a diagnostic for looking at whatever a file claims to be, not a
/// gatekeeper. Only a blob shorter than the header itself is an error.
pub fn inspect(blob: &[u8]) -> Result<ModelSummary> {
    if blob.len() < HEADER_LEN {
        return Err(Error::TruncatedFile {
            required: HEADER_LEN,
            provided: blob.len(),
        });
    }
    Ok(ModelSummary {
        input_size: read_u32(blob, 0),
        hidden_size: read_u32(blob, 4),
        num_layers: read_u32(blob, 8),
        reserved: read_u32(blob, 12),
        payload_present: blob.len() - HEADER_LEN,
    })
}
