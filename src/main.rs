use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use videoio::{fourcc, Config, FourCC, Frame, PropertyId, Source, VideoCapture, VideoWriter};

#[derive(Parser)]
#[command(
    name = "videoio",
    version,
    about = "Capture, convert and inspect video through pluggable backends",
    long_about = "videoio opens video files, image sequences and cameras behind one property-driven API, and writes AVI, Matroska, MP4 or image-sequence output."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pack a 4-character code, or unpack an integer (decimal or 0x-hex)
    Fourcc { value: String },

    /// Print every property a source reports
    Probe {
        /// File, image pattern (img_%03d.png), camera index or URI
        source: String,
    },

    /// Copy frames from a source into a new output
    Convert {
        source: String,
        output: PathBuf,

        /// Output codec (defaults to the configured one)
        #[arg(long)]
        fourcc: Option<FourCC>,

        /// Output frame rate (defaults to the source's)
        #[arg(long)]
        fps: Option<f64>,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
    },

    /// Write a colour-cycling test pattern
    Synth {
        output: PathBuf,

        #[arg(long, default_value_t = 320)]
        width: u32,

        #[arg(long, default_value_t = 240)]
        height: u32,

        #[arg(long)]
        fps: Option<f64>,

        #[arg(long, default_value_t = 90)]
        frames: u32,

        #[arg(long)]
        fourcc: Option<FourCC>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Fourcc { value } => fourcc_command(&value),
        Command::Probe { source } => probe(&source, &config),
        Command::Convert {
            source,
            output,
            fourcc,
            fps,
            max_frames,
        } => convert(&source, &output, fourcc, fps, max_frames, &config),
        Command::Synth {
            output,
            width,
            height,
            fps,
            frames,
            fourcc,
        } => synth(&output, (width, height), fps, frames, fourcc, &config),
    }
}

fn fourcc_command(value: &str) -> Result<()> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None if value.len() != 4 => value.parse::<u32>().ok(),
        None => None,
    };

    match parsed {
        Some(number) => println!("{} -> {:?}", number, fourcc::unpack(number)),
        None => {
            let packed = fourcc::pack(value)?;
            println!("{:?} -> {} (0x{:08x})", value, packed, packed);
        }
    }
    Ok(())
}

fn probe(source: &str, config: &Config) -> Result<()> {
    let source = Source::from(source);
    let capture = VideoCapture::open_with(source.clone(), &config.capture)
        .with_context(|| format!("Could not open {}", source))?;

    println!("source:  {}", source);
    println!("backend: {}", capture.backend_name().unwrap_or("none"));
    for id in PropertyId::in_scope(videoio::property::PropertyScope::Capture) {
        if let Some(value) = capture.get(id)? {
            if id == PropertyId::Fourcc {
                println!("{:>22}: {}", id, FourCC::from_u32(value as u32));
            } else {
                println!("{:>22}: {}", id, value);
            }
        }
    }
    Ok(())
}

fn convert(
    source: &str,
    output: &Path,
    fourcc: Option<FourCC>,
    fps: Option<f64>,
    max_frames: Option<u64>,
    config: &Config,
) -> Result<()> {
    let source = Source::from(source);
    let mut capture = VideoCapture::open_with(source.clone(), &config.capture)
        .with_context(|| format!("Could not open {}", source))?;

    let first = capture
        .read()?
        .ok_or_else(|| anyhow::anyhow!("{} has no frames", source))?;
    let fps = fps
        .or(capture.get(PropertyId::Fps)?.filter(|f| *f > 0.0))
        .unwrap_or(config.writer.fps);
    let fourcc = fourcc.unwrap_or(config.writer.fourcc);

    let mut writer = VideoWriter::open_with(output, fourcc, fps, first.size(), first.is_color(), &config.writer)
        .with_context(|| format!("Could not create {}", output.display()))?;

    let limit = max_frames.unwrap_or(u64::MAX);
    if limit > 0 {
        writer.write(&first)?;
    }
    while writer.frames_written() < limit {
        match capture.read() {
            Ok(Some(frame)) => writer.write(&frame)?,
            Ok(None) => break,
            Err(e) if e.is_frame_local() => warn!("Skipping frame: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    writer.close()?;
    info!("Wrote {} frames to {}", writer.frames_written(), output.display());
    Ok(())
}

fn synth(
    output: &Path,
    size: (u32, u32),
    fps: Option<f64>,
    frames: u32,
    fourcc: Option<FourCC>,
    config: &Config,
) -> Result<()> {
    let fps = fps.unwrap_or(config.writer.fps);
    let fourcc = fourcc.unwrap_or(config.writer.fourcc);
    let mut writer = VideoWriter::open_with(output, fourcc, fps, size, true, &config.writer)
        .with_context(|| format!("Could not create {}", output.display()))?;

    for i in 0..frames {
        let hue = (i as f32 / frames.max(1) as f32) * 360.0;
        let mut frame = Frame::new_filled(size.0, size.1, hsv_to_rgb(hue, 0.7, 0.9));
        // moving diagonal stripes make dropped frames visible
        for y in 0..size.1 {
            for x in 0..size.0 {
                if (x + y + i * 4) % 32 < 2 {
                    frame.set_pixel(x, y, [255, 255, 255]);
                }
            }
        }
        writer.write(&frame)?;
    }

    writer.close()?;
    info!("Wrote {} test frames to {}", frames, output.display());
    Ok(())
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    [
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_convert_frame_limit() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let input = dir.path().join("input.avi");
        synth(&input, (32, 24), Some(10.0), 5, Some(FourCC::MPNG), &config).unwrap();

        for (limit, expected) in [(Some(0), 0.0), (Some(2), 2.0), (None, 5.0)] {
            let output = dir.path().join(format!("out_{}.avi", expected));
            convert(input.to_str().unwrap(), &output, Some(FourCC::MPNG), None, limit, &config).unwrap();
            let capture = VideoCapture::open(&output).unwrap();
            assert_eq!(capture.get(PropertyId::FrameCount).unwrap(), Some(expected), "limit {:?}", limit);
        }
    }
}
