//! logmel CLI - log-mel spectrogram extraction from audio files

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use logmel::{pad_or_trim_samples, FrontendConfig, N_SAMPLES, VERSION};

/// Log-mel spectrogram front-end for speech models
#[derive(Parser, Debug)]
#[command(name = "logmel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use CPU instead of GPU
    #[arg(long, global = true)]
    cpu: bool,

    /// Path to a YAML config file (defaults are used when absent)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode audio and write one spectrogram per channel as .npy
    Extract {
        /// Input audio file (any format ffmpeg can read)
        #[arg(short, long)]
        input: PathBuf,

        /// Output path; a channel suffix is inserted for multi-channel audio
        #[arg(short, long, default_value = "mel.npy")]
        output: PathBuf,

        /// Number of mel bands (overrides the config file)
        #[arg(long)]
        mel_bands: Option<usize>,

        /// Pad or trim each channel to one 30-second chunk first
        #[arg(long)]
        chunk: bool,

        /// Zero samples appended to the right of each waveform
        #[arg(long, default_value = "0")]
        padding: usize,
    },

    /// Print channel and duration information for an audio file
    Info {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb
}

fn select_device(cpu: bool) -> Device {
    if cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available(0).unwrap_or(Device::Cpu)
    }
}

/// mel.npy -> mel.ch2.npy for channel 2 of a multi-channel file
fn channel_path(base: &Path, channel: usize, channels: usize) -> PathBuf {
    if channels == 1 {
        return base.to_path_buf();
    }
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("mel");
    let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("npy");
    base.with_file_name(format!("{stem}.ch{channel}.{ext}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("logmel v{}", VERSION);

    let config = match &cli.config {
        Some(path) => FrontendConfig::load(path).context("Failed to load config")?,
        None => FrontendConfig::default(),
    };

    match cli.command {
        Commands::Extract {
            input,
            output,
            mel_bands,
            chunk,
            padding,
        } => {
            let device = select_device(cli.cpu);
            let n_mels = mel_bands.unwrap_or(config.n_mels);

            let pb = create_progress_bar("Decoding audio...");
            let waveforms = config
                .decoder()
                .decode(&input, config.sample_rate)
                .with_context(|| format!("Failed to decode {}", input.display()))?;
            pb.finish_with_message(format!("Decoded {} channel(s)", waveforms.len()));

            let waveforms: Vec<Vec<f32>> = if chunk {
                waveforms
                    .iter()
                    .map(|w| pad_or_trim_samples(w, N_SAMPLES))
                    .collect()
            } else {
                waveforms
            };

            let extractor = config.extractor(device);
            let mels = extractor
                .compute_all(&waveforms, n_mels, padding)
                .context("Failed to compute spectrograms")?;

            let channels = mels.len();
            for (ch, mel) in mels.iter().enumerate() {
                let path = channel_path(&output, ch, channels);
                mel.write_npy(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote {:?} spectrogram to {}", mel.shape(), path.display());
            }
            Ok(())
        }

        Commands::Info { input } => {
            let waveforms = config
                .decoder()
                .decode(&input, config.sample_rate)
                .with_context(|| format!("Failed to decode {}", input.display()))?;

            println!("channels: {}", waveforms.len());
            for (ch, wave) in waveforms.iter().enumerate() {
                println!(
                    "channel {}: {} samples ({:.2} s)",
                    ch,
                    wave.len(),
                    wave.len() as f32 / config.sample_rate as f32
                );
            }
            Ok(())
        }
    }
}
