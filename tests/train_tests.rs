use bytepress::{bits_per_byte, train, train_model, Error, TinyLstm, TrainConfig};

fn repetitive_corpus() -> Vec<u8> {
    b"abcdefgh".repeat(100)
}

fn small_config() -> TrainConfig {
    TrainConfig {
        window_len: 8,
        batch_size: 16,
        hidden_size: 8,
        epochs: 2,
        learning_rate: 1e-2,
    }
}

#[test]
fn training_beats_a_random_model() {
    let data = repetitive_corpus();
    let config = small_config();

    let untrained = TinyLstm::new(config.hidden_size).unwrap();
    let baseline = bits_per_byte(&untrained, &data).unwrap();

    let (trained, losses) = train(&data, &config).unwrap();
    let improved = bits_per_byte(&trained, &data).unwrap();

    assert_eq!(losses.len(), config.epochs);
    assert!(
        improved < baseline,
        "trained {improved:.3} bpb vs untrained {baseline:.3} bpb"
    );
}

#[test]
fn loss_decreases_across_epochs() {
    let data = repetitive_corpus();
    let (_, losses) = train(&data, &small_config()).unwrap();
    assert!(
        losses.last().unwrap() < losses.first().unwrap(),
        "losses: {losses:?}"
    );
}

#[test]
fn continued_training_keeps_model_shape() {
    let data = repetitive_corpus();
    let mut model = TinyLstm::new(4).unwrap();
    let config = TrainConfig {
        hidden_size: 99, // ignored: the model's own size is authoritative
        epochs: 1,
        ..small_config()
    };
    let losses = train_model(&mut model, &data, &config).unwrap();
    assert_eq!(model.hidden_size(), 4);
    assert_eq!(losses.len(), 1);
}

#[test]
fn training_needs_at_least_one_window() {
    let data = b"short".to_vec();
    let config = TrainConfig {
        window_len: 16,
        ..small_config()
    };
    assert!(matches!(
        train(&data, &config),
        Err(Error::InsufficientData { len: 5, window: 16 })
    ));
}

#[test]
fn evaluation_needs_two_bytes() {
    let model = TinyLstm::new(4).unwrap();
    assert!(matches!(
        bits_per_byte(&model, b"x"),
        Err(Error::InsufficientData { .. })
    ));
    assert!(bits_per_byte(&model, b"xy").is_ok());
}

#[test]
fn random_model_scores_near_eight_bits() {
    let model = TinyLstm::new(8).unwrap();
    let data = b"some ordinary text for scoring".to_vec();
    let bpb = bits_per_byte(&model, &data).unwrap();
    // An untrained model is close to uniform over 256 symbols.
    assert!(bpb > 6.0 && bpb < 10.0, "bpb was {bpb:.3}");
}
