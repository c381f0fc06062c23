use std::path::PathBuf;

use clap::Parser;

use bytepress::format;

/// Print the structural layout a model file's header declares.
///
/// Reads the 16-byte header, derives the expected array sizes, and reports
/// them without decoding the float payload. A size mismatch is noted, not
/// fatal.
#[derive(Parser)]
#[command(name = "inspect")]
struct Args {
    /// Model file
    file: PathBuf,
}

fn main() -> bytepress::Result<()> {
    let args = Args::parse();
    let blob = std::fs::read(&args.file)?;
    let summary = format::inspect(&blob)?;

    println!("input size:  {}", summary.input_size);
    println!("hidden size: {}", summary.hidden_size);
    println!("layers:      {}", summary.num_layers);
    println!("reserved:    {}", summary.reserved);
    println!("expected parameter counts:");
    for (name, count) in summary.tensor_counts() {
        println!("  {:<6} {}", name, count);
    }

    let expected = summary.expected_len();
    println!("file length: {} bytes (layout implies {})", blob.len(), expected);
    if blob.len() < expected {
        println!("note: payload falls short of the declared layout");
    } else if blob.len() > expected {
        println!(
            "note: {} trailing bytes beyond the declared layout",
            blob.len() - expected
        );
    }
    Ok(())
}
