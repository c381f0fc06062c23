use bytepress::{softmax, CompressionModel, TinyLstm};
use ndarray::Array1;

#[test]
fn replayed_history_gives_bit_identical_logits() {
    let model = TinyLstm::new(8).unwrap();
    let history = [10u8, 0, 255, 7, 7, 128, 3];

    let mut first = Vec::new();
    let mut state = model.init_state();
    for &byte in &history {
        first.push(model.step(byte, &mut state));
    }

    let mut state = model.init_state();
    for (t, &byte) in history.iter().enumerate() {
        let logits = model.step(byte, &mut state);
        for (a, b) in logits.iter().zip(first[t].iter()) {
            assert_eq!(a.to_bits(), b.to_bits(), "step {t} diverged");
        }
    }
}

#[test]
fn initial_state_is_zero() {
    let model = TinyLstm::new(4).unwrap();
    let state = model.init_state();
    assert_eq!(state.h.len(), 4);
    assert_eq!(state.c.len(), 4);
    assert!(state.h.iter().all(|&v| v == 0.0));
    assert!(state.c.iter().all(|&v| v == 0.0));
}

#[test]
fn step_advances_state() {
    let model = TinyLstm::new(4).unwrap();
    let mut state = model.init_state();
    let logits = model.step(65, &mut state);
    assert_eq!(logits.len(), 256);
    assert!(state.h.iter().any(|&v| v != 0.0));
}

#[test]
fn predictions_are_normalized() {
    let model = TinyLstm::new(8).unwrap();
    let mut state = model.init_state();
    for &byte in &[0u8, 9, 200, 31] {
        let probs = model.predict(byte, &mut state);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sum was {sum}");
        assert!(probs.iter().all(|&p| p >= 0.0));
    }
}

#[test]
fn softmax_handles_extreme_logits() {
    let mut logits = Array1::from_elem(256, -1.0e30f32);
    logits[17] = 1000.0;
    let probs = softmax(&logits);
    assert!((probs[17] - 1.0).abs() < 1e-6);
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-4);
}

#[test]
fn coder_interface_matches_direct_prediction() {
    let model = TinyLstm::new(4).unwrap();

    let mut s1 = CompressionModel::init_state(&model);
    let mut s2 = model.init_state();
    for &byte in &[0u8, 1, 2, 3] {
        let via_trait = model.predict_next(&mut s1, byte);
        let direct = model.predict(byte, &mut s2);
        for (a, b) in via_trait.iter().zip(direct.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
    assert_eq!(model.model_hash(), model.weights().fingerprint());
}

#[test]
fn fingerprint_is_stable_and_weight_sensitive() {
    let model = TinyLstm::new(4).unwrap();
    let a = model.weights().fingerprint();
    let b = model.weights().fingerprint();
    assert_eq!(a, b);

    let other = TinyLstm::new(4).unwrap();
    assert_ne!(
        model.weights().fingerprint(),
        other.weights().fingerprint()
    );
}
