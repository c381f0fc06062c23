use std::path::PathBuf;

use clap::Parser;

use bytepress::{bits_per_byte, format, TinyLstm};

/// Report bits per byte of a trained model over a held-out corpus.
#[derive(Parser)]
#[command(name = "evaluate")]
struct Args {
    /// Model file
    #[arg(long)]
    model: PathBuf,

    /// Held-out corpus, read as raw bytes
    #[arg(long)]
    data: PathBuf,
}

fn main() -> bytepress::Result<()> {
    let args = Args::parse();
    let model = TinyLstm::from_weights(format::read_model(&args.model)?);
    let data = std::fs::read(&args.data)?;
    let bpb = bits_per_byte(&model, &data)?;
    println!("bits per byte: {:.4}", bpb);
    println!("model fingerprint: {:016x}", model.weights().fingerprint());
    Ok(())
}
