//! Single-layer LSTM predictor over raw bytes.
//!
//! The predictor maps one byte of history plus a recurrent state to logits
//! over the 256 possible next bytes. An external entropy coder consumes the
//! softmax of those logits once per byte, on both its encode and decode
//! paths, so `step` must be bit-for-bit reproducible: for fixed weights and
//! fixed input history it returns identical logits regardless of process or
//! thread. Every sum below is therefore accumulated in a fixed order with no
//! batch dimension anywhere; training replays the exact same code path one
//! sample at a time.

use ndarray::{Array1, Array2};
use rand::Rng;

use crate::error::{Error, Result};

/// Size of the byte alphabet and of the one-hot input vector.
pub const ALPHABET: usize = 256;

/// Trained parameters of the single-layer predictor.
///
/// The `4H` axis of `w_ih`, `w_hh`, `b_ih`, and `b_hh` is four stacked
/// `H`-sized blocks in the fixed gate order input, forget, candidate, output.
/// Gate semantics are defined purely by block position, so that ordering is
/// part of the serialized format and must never be permuted.
#[derive(Clone, Debug)]
pub struct LstmWeights {
    hidden_size: usize,
    w_ih: Array2<f32>,  // (4H, 256)
    w_hh: Array2<f32>,  // (4H, H)
    b_ih: Array1<f32>,  // (4H,)
    b_hh: Array1<f32>,  // (4H,)
    w_out: Array2<f32>, // (256, H)
    b_out: Array1<f32>, // (256,)
}

fn check2(tensor: &'static str, arr: &Array2<f32>, rows: usize, cols: usize) -> Result<()> {
    if arr.dim() != (rows, cols) {
        return Err(Error::ShapeMismatch {
            tensor,
            expected: format!("({}, {})", rows, cols),
            got: format!("{:?}", arr.dim()),
        });
    }
    Ok(())
}

fn check1(tensor: &'static str, arr: &Array1<f32>, len: usize) -> Result<()> {
    if arr.len() != len {
        return Err(Error::ShapeMismatch {
            tensor,
            expected: format!("({},)", len),
            got: format!("({},)", arr.len()),
        });
    }
    Ok(())
}

impl LstmWeights {
    /// Build a parameter set, validating every tensor shape against
    /// `hidden_size`.
    pub fn new(
        hidden_size: usize,
        w_ih: Array2<f32>,
        w_hh: Array2<f32>,
        b_ih: Array1<f32>,
        b_hh: Array1<f32>,
        w_out: Array2<f32>,
        b_out: Array1<f32>,
    ) -> Result<Self> {
        if hidden_size == 0 {
            return Err(Error::ShapeMismatch {
                tensor: "hidden_size",
                expected: "positive".to_string(),
                got: "0".to_string(),
            });
        }
        let h = hidden_size;
        check2("w_ih", &w_ih, 4 * h, ALPHABET)?;
        check2("w_hh", &w_hh, 4 * h, h)?;
        check1("b_ih", &b_ih, 4 * h)?;
        check1("b_hh", &b_hh, 4 * h)?;
        check2("w_out", &w_out, ALPHABET, h)?;
        check1("b_out", &b_out, ALPHABET)?;
        Ok(Self {
            hidden_size,
            w_ih,
            w_hh,
            b_ih,
            b_hh,
            w_out,
            b_out,
        })
    }

    /// Fresh parameters with uniform init in `[-1/sqrt(H), 1/sqrt(H)]`.
    pub fn random(hidden_size: usize) -> Result<Self> {
        if hidden_size == 0 {
            return Err(Error::ShapeMismatch {
                tensor: "hidden_size",
                expected: "positive".to_string(),
                got: "0".to_string(),
            });
        }
        let h = hidden_size;
        let k = 1.0 / (h as f32).sqrt();
        let mut rng = rand::thread_rng();
        Self::new(
            h,
            Array2::from_shape_fn((4 * h, ALPHABET), |_| rng.gen_range(-k..k)),
            Array2::from_shape_fn((4 * h, h), |_| rng.gen_range(-k..k)),
            Array1::from_shape_fn(4 * h, |_| rng.gen_range(-k..k)),
            Array1::from_shape_fn(4 * h, |_| rng.gen_range(-k..k)),
            Array2::from_shape_fn((ALPHABET, h), |_| rng.gen_range(-k..k)),
            Array1::from_shape_fn(ALPHABET, |_| rng.gen_range(-k..k)),
        )
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn w_ih(&self) -> &Array2<f32> {
        &self.w_ih
    }

    pub fn w_hh(&self) -> &Array2<f32> {
        &self.w_hh
    }

    pub fn b_ih(&self) -> &Array1<f32> {
        &self.b_ih
    }

    pub fn b_hh(&self) -> &Array1<f32> {
        &self.b_hh
    }

    pub fn w_out(&self) -> &Array2<f32> {
        &self.w_out
    }

    pub fn b_out(&self) -> &Array1<f32> {
        &self.b_out
    }

    pub(crate) fn tensors_mut(
        &mut self,
    ) -> (
        &mut Array2<f32>,
        &mut Array2<f32>,
        &mut Array1<f32>,
        &mut Array1<f32>,
        &mut Array2<f32>,
        &mut Array1<f32>,
    ) {
        (
            &mut self.w_ih,
            &mut self.w_hh,
            &mut self.b_ih,
            &mut self.b_hh,
            &mut self.w_out,
            &mut self.b_out,
        )
    }

    /// FNV-1a over the little-endian float payload in serialization order.
    ///
    /// Matches the hash an inference runtime computes after loading the
    /// model file, so both sides of a pipeline can cheaply confirm they hold
    /// the same weights.
    pub fn fingerprint(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        let mut eat = |values: &mut dyn Iterator<Item = f32>| {
            for v in values {
                for b in v.to_le_bytes() {
                    hash ^= b as u64;
                    hash = hash.wrapping_mul(PRIME);
                }
            }
        };
        eat(&mut self.w_ih.iter().copied());
        eat(&mut self.w_hh.iter().copied());
        eat(&mut self.b_ih.iter().copied());
        eat(&mut self.b_hh.iter().copied());
        eat(&mut self.w_out.iter().copied());
        eat(&mut self.b_out.iter().copied());
        hash
    }
}

/// Recurrent state for one prediction stream: hidden and cell vectors.
///
/// Reset to zero at the start of every independent stream and owned by the
/// caller; a loaded model may serve many concurrent streams as long as each
/// one carries its own state.
#[derive(Clone, Debug)]
pub struct LstmState {
    pub h: Array1<f32>,
    pub c: Array1<f32>,
}

/// Per-step activations cached for backpropagation through time.
pub(crate) struct StepTrace {
    pub(crate) byte: u8,
    pub(crate) h_prev: Array1<f32>,
    pub(crate) c_prev: Array1<f32>,
    pub(crate) i: Array1<f32>,
    pub(crate) f: Array1<f32>,
    pub(crate) g: Array1<f32>,
    pub(crate) o: Array1<f32>,
    pub(crate) c: Array1<f32>,
    pub(crate) h: Array1<f32>,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Single-layer LSTM byte predictor.
#[derive(Clone)]
pub struct TinyLstm {
    weights: LstmWeights,
}

impl TinyLstm {
    /// Randomly initialized model.
    pub fn new(hidden_size: usize) -> Result<Self> {
        Ok(Self {
            weights: LstmWeights::random(hidden_size)?,
        })
    }

    /// Wrap an existing parameter set, e.g. one imported from disk.
    pub fn from_weights(weights: LstmWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &LstmWeights {
        &self.weights
    }

    pub(crate) fn weights_mut(&mut self) -> &mut LstmWeights {
        &mut self.weights
    }

    pub fn hidden_size(&self) -> usize {
        self.weights.hidden_size
    }

    /// Zeroed recurrent state for the start of a stream.
    pub fn init_state(&self) -> LstmState {
        LstmState {
            h: Array1::zeros(self.weights.hidden_size),
            c: Array1::zeros(self.weights.hidden_size),
        }
    }

    /// Gate preactivations `b_ih + b_hh + w_ih[:, byte] + w_hh . h_prev`.
    ///
    /// The one-hot input never materializes: multiplying `w_ih` by a one-hot
    /// vector is a column gather. The recurrent term accumulates row by row
    /// so the summation order is fixed.
    fn gate_preact(&self, byte: u8, h_prev: &Array1<f32>) -> Array1<f32> {
        let w = &self.weights;
        let mut a = &w.b_ih + &w.b_hh;
        a += &w.w_ih.column(byte as usize);
        for (row, w_row) in w.w_hh.rows().into_iter().enumerate() {
            a[row] += w_row.dot(h_prev);
        }
        a
    }

    /// Advance the cell one step, recording every activation.
    pub(crate) fn step_traced(&self, byte: u8, state: &mut LstmState) -> StepTrace {
        let hs = self.weights.hidden_size;
        let a = self.gate_preact(byte, &state.h);
        let h_prev = state.h.clone();
        let c_prev = state.c.clone();
        let mut i = Array1::zeros(hs);
        let mut f = Array1::zeros(hs);
        let mut g = Array1::zeros(hs);
        let mut o = Array1::zeros(hs);
        for k in 0..hs {
            i[k] = sigmoid(a[k]);
            f[k] = sigmoid(a[hs + k]);
            g[k] = a[2 * hs + k].tanh();
            o[k] = sigmoid(a[3 * hs + k]);
            state.c[k] = f[k] * c_prev[k] + i[k] * g[k];
            state.h[k] = o[k] * state.c[k].tanh();
        }
        StepTrace {
            byte,
            h_prev,
            c_prev,
            i,
            f,
            g,
            o,
            c: state.c.clone(),
            h: state.h.clone(),
        }
    }

    /// Project a hidden vector to 256 logits: `w_out . h + b_out`.
    pub fn project(&self, h: &Array1<f32>) -> Array1<f32> {
        let w = &self.weights;
        let mut logits = w.b_out.clone();
        for (row, w_row) in w.w_out.rows().into_iter().enumerate() {
            logits[row] += w_row.dot(h);
        }
        logits
    }

    /// Consume one history byte, update `state`, and return next-byte logits.
    pub fn step(&self, byte: u8, state: &mut LstmState) -> Array1<f32> {
        self.step_traced(byte, state);
        self.project(&state.h)
    }

    /// Like `step`, but returns a normalized probability distribution.
    pub fn predict(&self, byte: u8, state: &mut LstmState) -> Array1<f32> {
        softmax(&self.step(byte, state))
    }
}

/// Numerically guarded softmax over 256 logits.
///
/// Falls back to the uniform distribution if the exponential sum underflows
/// to zero; a coder fed an all-zero distribution would stall.
pub fn softmax(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut probs = logits.mapv(|v| (v - max).exp());
    let sum: f32 = probs.iter().sum();
    if sum <= 0.0 {
        let p = 1.0 / probs.len() as f32;
        probs.fill(p);
        return probs;
    }
    probs.mapv_inplace(|v| v / sum);
    probs
}

/// The seam an entropy coder drives: one state per stream, one prediction
/// per byte, in identical order on the encode and decode sides. The first
/// call of a stream conventionally passes byte 0.
pub trait CompressionModel {
    type State;

    fn init_state(&self) -> Self::State;

    /// Update `state` with `prev` and return the distribution over the next
    /// byte. Must sum to 1.
    fn predict_next(&self, state: &mut Self::State, prev: u8) -> Array1<f32>;

    /// Stable identifier for the loaded weights.
    fn model_hash(&self) -> u64;
}

impl CompressionModel for TinyLstm {
    type State = LstmState;

    fn init_state(&self) -> LstmState {
        TinyLstm::init_state(self)
    }

    fn predict_next(&self, state: &mut LstmState, prev: u8) -> Array1<f32> {
        self.predict(prev, state)
    }

    fn model_hash(&self) -> u64 {
        self.weights.fingerprint()
    }
}
