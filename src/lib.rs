//! Byte-level LSTM predictor and model codec for predictive compression.
//!
//! A small recurrent model predicts a distribution over the next byte given
//! the preceding bytes; an external entropy coder turns those distributions
//! into near-optimal code lengths. The coder is out of scope here. What this
//! crate owns is the contract the coder depends on: a numerically
//! deterministic predictor and a fixed little-endian binary layout for its
//! trained parameters, loadable by independent encoder and decoder
//! processes that must replay identical distributions byte for byte.

pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod format;
pub mod model;
pub mod train;

pub use dataset::ByteWindows;
pub use error::{Error, Result};
pub use evaluate::bits_per_byte;
pub use model::{softmax, CompressionModel, LstmState, LstmWeights, TinyLstm};
pub use train::{train, train_model, TrainConfig};
