//! Compression-theoretic quality measurement.

use crate::error::{Error, Result};
use crate::model::TinyLstm;

/// Average Shannon code length, in bits per byte, that the model's
/// predictions would need to encode `data`.
///
/// One sequential pass over the buffer: the recurrent state is carried
/// across the entire stream and never reset mid-buffer, so every byte after
/// the first is scored against a prediction conditioned on its full
/// preceding history. A value near 8 means no predictive structure; trained
/// models on compressible data land well below that.
pub fn bits_per_byte(model: &TinyLstm, data: &[u8]) -> Result<f64> {
    if data.len() < 2 {
        return Err(Error::InsufficientData {
            len: data.len(),
            window: 1,
        });
    }
    let mut state = model.init_state();
    let mut nats = 0.0f64;
    for t in 0..data.len() - 1 {
        let probs = model.predict(data[t], &mut state);
        let p = probs[data[t + 1] as usize].max(f32::MIN_POSITIVE);
        nats -= (p as f64).ln();
    }
    let targets = (data.len() - 1) as f64;
    Ok(nats / targets / std::f64::consts::LN_2)
}
