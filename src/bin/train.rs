use std::path::PathBuf;

use clap::Parser;

use bytepress::{format, train, train_model, TinyLstm, TrainConfig};

/// Train a byte-level LSTM on a raw byte corpus and write the model file.
#[derive(Parser)]
#[command(name = "train")]
struct Args {
    /// Training corpus, read as raw bytes
    #[arg(long)]
    data: PathBuf,

    /// Window length in bytes
    #[arg(long, default_value_t = 256)]
    window_len: usize,

    /// Windows per optimizer step
    #[arg(long, default_value_t = 64)]
    batch_size: usize,

    /// Hidden units (ignored when resuming)
    #[arg(long, default_value_t = 256)]
    hidden_size: usize,

    /// Passes over the training windows
    #[arg(long, default_value_t = 2)]
    epochs: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    lr: f32,

    /// Output model file
    #[arg(long)]
    output: PathBuf,

    /// Continue training from an existing model file
    #[arg(long)]
    resume: Option<PathBuf>,
}

fn main() -> bytepress::Result<()> {
    let args = Args::parse();
    let data = std::fs::read(&args.data)?;
    println!("loaded {} bytes from {:?}", data.len(), args.data);

    let config = TrainConfig {
        window_len: args.window_len,
        batch_size: args.batch_size,
        hidden_size: args.hidden_size,
        epochs: args.epochs,
        learning_rate: args.lr,
    };

    let model = match &args.resume {
        Some(path) => {
            let mut model = TinyLstm::from_weights(format::read_model(path)?);
            println!(
                "resuming from {:?} (hidden size {})",
                path,
                model.hidden_size()
            );
            train_model(&mut model, &data, &config)?;
            model
        }
        None => train(&data, &config)?.0,
    };

    format::write_model(&args.output, model.weights())?;
    println!(
        "saved model to {:?} (fingerprint {:016x})",
        args.output,
        model.weights().fingerprint()
    );
    Ok(())
}
