//! Supervised next-byte training.
//!
//! Minimizes mean cross-entropy over shuffled batches of overlapping byte
//! windows with Adam and global gradient-norm clipping. The batch dimension
//! is a sequential loop over single windows running the same traced forward
//! the coder replays at inference time; no vectorized batch math exists to
//! drift from the single-sample computation.

use std::time::Instant;

use ndarray::{Array, Array1, Array2, Dimension, Zip};
use rand::seq::SliceRandom;

use crate::dataset::ByteWindows;
use crate::error::Result;
use crate::model::{softmax, TinyLstm};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;
const MAX_GRAD_NORM: f32 = 1.0;

/// Training hyperparameters.
#[derive(Clone, Debug)]
pub struct TrainConfig {
    /// Window length in bytes.
    pub window_len: usize,
    /// Windows contributing to one optimizer step.
    pub batch_size: usize,
    /// Hidden units; ignored by `train_model`, which keeps the model's size.
    pub hidden_size: usize,
    /// Full passes over the window set.
    pub epochs: usize,
    /// Adam step size.
    pub learning_rate: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            window_len: 256,
            batch_size: 64,
            hidden_size: 256,
            epochs: 2,
            learning_rate: 1e-3,
        }
    }
}

/// Per-tensor Adam moment state.
struct Adam<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Adam<D> {
    fn like(params: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(params.raw_dim()),
            v: Array::zeros(params.raw_dim()),
        }
    }

    fn update(&mut self, params: &mut Array<f32, D>, grads: &Array<f32, D>, lr: f32, t: i32) {
        let bc1 = 1.0 - BETA1.powi(t);
        let bc2 = 1.0 - BETA2.powi(t);
        Zip::from(params)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grads)
            .for_each(|p, m, v, &g| {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                let m_hat = *m / bc1;
                let v_hat = *v / bc2;
                *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
            });
    }
}

struct Optimizer {
    t: i32,
    w_ih: Adam<ndarray::Ix2>,
    w_hh: Adam<ndarray::Ix2>,
    b_ih: Adam<ndarray::Ix1>,
    b_hh: Adam<ndarray::Ix1>,
    w_out: Adam<ndarray::Ix2>,
    b_out: Adam<ndarray::Ix1>,
}

impl Optimizer {
    fn new(model: &TinyLstm) -> Self {
        let w = model.weights();
        Self {
            t: 0,
            w_ih: Adam::like(w.w_ih()),
            w_hh: Adam::like(w.w_hh()),
            b_ih: Adam::like(w.b_ih()),
            b_hh: Adam::like(w.b_hh()),
            w_out: Adam::like(w.w_out()),
            b_out: Adam::like(w.b_out()),
        }
    }

    fn step(&mut self, model: &mut TinyLstm, grads: &Grads, lr: f32) {
        self.t += 1;
        let (w_ih, w_hh, b_ih, b_hh, w_out, b_out) = model.weights_mut().tensors_mut();
        self.w_ih.update(w_ih, &grads.w_ih, lr, self.t);
        self.w_hh.update(w_hh, &grads.w_hh, lr, self.t);
        self.b_ih.update(b_ih, &grads.b_ih, lr, self.t);
        self.b_hh.update(b_hh, &grads.b_hh, lr, self.t);
        self.w_out.update(w_out, &grads.w_out, lr, self.t);
        self.b_out.update(b_out, &grads.b_out, lr, self.t);
    }
}

/// Gradient accumulator matching the parameter tensors.
struct Grads {
    w_ih: Array2<f32>,
    w_hh: Array2<f32>,
    b_ih: Array1<f32>,
    b_hh: Array1<f32>,
    w_out: Array2<f32>,
    b_out: Array1<f32>,
}

impl Grads {
    fn zeros(hidden: usize) -> Self {
        let h = hidden;
        Self {
            w_ih: Array2::zeros((4 * h, crate::model::ALPHABET)),
            w_hh: Array2::zeros((4 * h, h)),
            b_ih: Array1::zeros(4 * h),
            b_hh: Array1::zeros(4 * h),
            w_out: Array2::zeros((crate::model::ALPHABET, h)),
            b_out: Array1::zeros(crate::model::ALPHABET),
        }
    }

    fn reset(&mut self) {
        self.w_ih.fill(0.0);
        self.w_hh.fill(0.0);
        self.b_ih.fill(0.0);
        self.b_hh.fill(0.0);
        self.w_out.fill(0.0);
        self.b_out.fill(0.0);
    }

    fn scale(&mut self, s: f32) {
        self.w_ih.mapv_inplace(|g| g * s);
        self.w_hh.mapv_inplace(|g| g * s);
        self.b_ih.mapv_inplace(|g| g * s);
        self.b_hh.mapv_inplace(|g| g * s);
        self.w_out.mapv_inplace(|g| g * s);
        self.b_out.mapv_inplace(|g| g * s);
    }

    fn norm(&self) -> f32 {
        let sq: f32 = self.w_ih.iter().map(|g| g * g).sum::<f32>()
            + self.w_hh.iter().map(|g| g * g).sum::<f32>()
            + self.b_ih.iter().map(|g| g * g).sum::<f32>()
            + self.b_hh.iter().map(|g| g * g).sum::<f32>()
            + self.w_out.iter().map(|g| g * g).sum::<f32>()
            + self.b_out.iter().map(|g| g * g).sum::<f32>();
        sq.sqrt()
    }

    fn clip(&mut self, max_norm: f32) {
        let norm = self.norm();
        if norm > max_norm {
            self.scale(max_norm / (norm + 1e-6));
        }
    }
}

/// Forward one window, backpropagate through time, add gradients of the
/// summed cross-entropy into `grads`. Returns the window's summed loss in
/// nats. State starts at zero for every window.
fn accumulate_window(model: &TinyLstm, input: &[u8], target: &[u8], grads: &mut Grads) -> f64 {
    let hs = model.hidden_size();
    let len = input.len();
    let mut state = model.init_state();
    let mut traces = Vec::with_capacity(len);
    let mut dlogits = Vec::with_capacity(len);
    let mut nll = 0.0f64;

    for t in 0..len {
        let trace = model.step_traced(input[t], &mut state);
        let probs = softmax(&model.project(&trace.h));
        let y = target[t] as usize;
        let p = probs[y].max(f32::MIN_POSITIVE);
        nll -= (p as f64).ln();
        let mut dl = probs;
        dl[y] -= 1.0;
        traces.push(trace);
        dlogits.push(dl);
    }

    let w = model.weights();
    let mut dh_next = Array1::<f32>::zeros(hs);
    let mut dc_next = Array1::<f32>::zeros(hs);

    for t in (0..len).rev() {
        let trace = &traces[t];
        let dl = &dlogits[t];

        // Output projection: dW_out = dl (x) h, dh = W_out^T . dl
        grads.b_out += dl;
        let mut dh = dh_next;
        for (row, w_row) in w.w_out().rows().into_iter().enumerate() {
            let coeff = dl[row];
            grads.w_out.row_mut(row).scaled_add(coeff, &trace.h);
            dh.scaled_add(coeff, &w_row);
        }

        // Cell: gate preactivation gradients in block order i, f, g, o.
        let mut da = Array1::<f32>::zeros(4 * hs);
        let mut dc_prev = Array1::<f32>::zeros(hs);
        for k in 0..hs {
            let tanh_c = trace.c[k].tanh();
            let d_o = dh[k] * tanh_c;
            let dc = dc_next[k] + dh[k] * trace.o[k] * (1.0 - tanh_c * tanh_c);
            let d_i = dc * trace.g[k];
            let d_g = dc * trace.i[k];
            let d_f = dc * trace.c_prev[k];
            da[k] = d_i * trace.i[k] * (1.0 - trace.i[k]);
            da[hs + k] = d_f * trace.f[k] * (1.0 - trace.f[k]);
            da[2 * hs + k] = d_g * (1.0 - trace.g[k] * trace.g[k]);
            da[3 * hs + k] = d_o * trace.o[k] * (1.0 - trace.o[k]);
            dc_prev[k] = dc * trace.f[k];
        }

        grads.b_ih += &da;
        grads.b_hh += &da;
        // One-hot input makes dW_ih a single-column update.
        grads.w_ih.column_mut(trace.byte as usize).scaled_add(1.0, &da);

        let mut dh_prev = Array1::<f32>::zeros(hs);
        for (row, w_row) in w.w_hh().rows().into_iter().enumerate() {
            let coeff = da[row];
            grads.w_hh.row_mut(row).scaled_add(coeff, &trace.h_prev);
            dh_prev.scaled_add(coeff, &w_row);
        }

        dh_next = dh_prev;
        dc_next = dc_prev;
    }

    nll
}

/// Train a freshly initialized model. Returns the model and per-epoch mean
/// loss in nats.
pub fn train(data: &[u8], config: &TrainConfig) -> Result<(TinyLstm, Vec<f32>)> {
    let mut model = TinyLstm::new(config.hidden_size)?;
    let losses = train_model(&mut model, data, config)?;
    Ok((model, losses))
}

/// Continue training an existing model in place.
///
/// The model's own hidden size is authoritative; `config.hidden_size` is
/// not consulted. Prints one line per epoch and returns the per-epoch mean
/// losses. Writing the result to disk is the caller's job.
pub fn train_model(model: &mut TinyLstm, data: &[u8], config: &TrainConfig) -> Result<Vec<f32>> {
    let windows = ByteWindows::new(data, config.window_len)?;
    let batch_size = config.batch_size.max(1);
    let mut optimizer = Optimizer::new(model);
    let mut grads = Grads::zeros(model.hidden_size());
    let mut indices: Vec<usize> = (0..windows.len()).collect();
    let mut rng = rand::thread_rng();
    let mut epoch_losses = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        let start = Instant::now();
        indices.shuffle(&mut rng);
        let mut total_nll = 0.0f64;
        let mut total_targets = 0usize;

        for batch in indices.chunks(batch_size) {
            grads.reset();
            for &idx in batch {
                if let Some((input, target)) = windows.get(idx) {
                    total_nll += accumulate_window(model, input, target, &mut grads);
                }
            }
            let targets = batch.len() * config.window_len;
            grads.scale(1.0 / targets as f32);
            grads.clip(MAX_GRAD_NORM);
            optimizer.step(model, &grads, config.learning_rate);
            total_targets += targets;
        }

        let mean = (total_nll / total_targets as f64) as f32;
        println!(
            "epoch {}/{}: loss {:.4} ({:.1}s)",
            epoch,
            config.epochs,
            mean,
            start.elapsed().as_secs_f64()
        );
        epoch_losses.push(mean);
    }

    Ok(epoch_losses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_loss(model: &TinyLstm, input: &[u8], target: &[u8]) -> f64 {
        let mut state = model.init_state();
        let mut nll = 0.0f64;
        for t in 0..input.len() {
            let probs = model.predict(input[t], &mut state);
            nll -= (probs[target[t] as usize] as f64).ln();
        }
        nll
    }

    fn perturbed(model: &TinyLstm, which: usize, idx: (usize, usize), eps: f32) -> TinyLstm {
        let mut m = model.clone();
        let (w_ih, w_hh, b_ih, b_hh, w_out, b_out) = m.weights_mut().tensors_mut();
        match which {
            0 => w_ih[idx] += eps,
            1 => w_hh[idx] += eps,
            2 => b_ih[idx.0] += eps,
            3 => b_hh[idx.0] += eps,
            4 => w_out[idx] += eps,
            _ => b_out[idx.0] += eps,
        }
        m
    }

    #[test]
    fn analytic_gradients_match_finite_differences() {
        let model = TinyLstm::new(3).unwrap();
        let input = [1u8, 7, 3, 1, 9, 7];
        let target = [7u8, 3, 1, 9, 7, 4];
        let mut grads = Grads::zeros(3);
        accumulate_window(&model, &input, &target, &mut grads);

        // A sample of entries from every tensor; (tensor, index) pairs.
        let probes: &[(usize, (usize, usize))] = &[
            (0, (0, 1)),
            (0, (5, 7)),
            (0, (11, 9)),
            (1, (2, 0)),
            (1, (7, 2)),
            (2, (1, 0)),
            (2, (10, 0)),
            (3, (4, 0)),
            (4, (7, 1)),
            (4, (3, 2)),
            (5, (7, 0)),
            (5, (3, 0)),
            (5, (200, 0)),
        ];

        let eps = 1e-3f32;
        for &(which, idx) in probes {
            let analytic = match which {
                0 => grads.w_ih[idx],
                1 => grads.w_hh[idx],
                2 => grads.b_ih[idx.0],
                3 => grads.b_hh[idx.0],
                4 => grads.w_out[idx],
                _ => grads.b_out[idx.0],
            } as f64;
            let plus = window_loss(&perturbed(&model, which, idx, eps), &input, &target);
            let minus = window_loss(&perturbed(&model, which, idx, -eps), &input, &target);
            let numeric = (plus - minus) / (2.0 * eps as f64);
            if analytic.abs() > 0.05 {
                let rel = ((analytic - numeric) / analytic).abs();
                assert!(
                    rel < 0.1,
                    "tensor {} index {:?}: analytic {:.6}, numeric {:.6}",
                    which,
                    idx,
                    analytic,
                    numeric
                );
            } else {
                assert!(
                    (analytic - numeric).abs() < 0.05,
                    "tensor {} index {:?}: analytic {:.6}, numeric {:.6}",
                    which,
                    idx,
                    analytic,
                    numeric
                );
            }
        }
    }

    #[test]
    fn clip_leaves_small_gradients_alone() {
        let mut grads = Grads::zeros(2);
        grads.b_out[0] = 0.3;
        grads.clip(1.0);
        assert_eq!(grads.b_out[0], 0.3);
        grads.b_out[0] = 5.0;
        grads.clip(1.0);
        assert!(grads.norm() <= 1.0 + 1e-4);
    }
}
