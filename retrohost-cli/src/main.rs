mod capture;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use retrohost_core::{Frame, HostConfig, RetroHost};

use crate::capture::CapturedFrame;

/// Run a libretro core headless for a fixed number of frames.
#[derive(Parser, Debug)]
#[command(name = "retrohost", version, about)]
struct Args {
    /// Path to the core's shared library
    core: PathBuf,

    /// Path to the game image
    game: PathBuf,

    /// Number of frames to run
    #[arg(long, default_value_t = 60)]
    frames: u32,

    /// Host config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory reported to the core as the system (BIOS) directory
    #[arg(long)]
    system_dir: Option<PathBuf>,

    /// Directory reported to the core as the save directory
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Restore this save state before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Write a save state after running
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Write the last presented frame as PNG
    #[arg(long)]
    dump_frame: Option<PathBuf>,

    /// Write all produced audio as WAV
    #[arg(long)]
    dump_audio: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Default)]
struct Stats {
    frames: u64,
    audio_chunks: u64,
    last_frame: Option<CapturedFrame>,
    audio: Vec<u8>,
}

fn build_config(args: &Args) -> HostConfig {
    let mut config = args
        .config
        .as_deref()
        .map(HostConfig::load_from_file)
        .unwrap_or_default();
    if let Some(dir) = &args.system_dir {
        config.system_directory = dir.clone();
    }
    if let Some(dir) = &args.save_dir {
        config.save_directory = Some(dir.clone());
    }
    config
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = build_config(&args);
    let mut host = RetroHost::load_core(&args.core, config)
        .with_context(|| format!("loading core {}", args.core.display()))?;

    let loaded = host
        .load_game(&args.game)
        .with_context(|| format!("loading game {}", args.game.display()))?;
    if !loaded {
        bail!("core refused game {}", args.game.display());
    }

    let descriptor = host.descriptor().unwrap_or_default();
    println!(
        "{} {}: {}x{} (aspect {:.3}) @ {:.4} fps, {} Hz, {:?}",
        descriptor.name,
        descriptor.version,
        host.width(),
        host.height(),
        host.aspect_ratio(),
        host.fps(),
        host.sample_rate(),
        host.pixel_format()
    );

    if let Some(path) = &args.load_state {
        let restored = host
            .load_state(path)
            .with_context(|| format!("loading state {}", path.display()))?;
        if !restored {
            warn!("core rejected state {}", path.display());
        }
    }

    let stats = Rc::new(RefCell::new(Stats::default()));
    let keep_frame = args.dump_frame.is_some();
    let keep_audio = args.dump_audio.is_some();

    let s = stats.clone();
    host.set_frame_sink(move |frame: &Frame<'_>| {
        let mut s = s.borrow_mut();
        s.frames += 1;
        if keep_frame {
            s.last_frame = Some(CapturedFrame::from(frame));
        }
    });
    let s = stats.clone();
    host.set_audio_sink(move |samples: &[u8]| {
        let mut s = s.borrow_mut();
        s.audio_chunks += 1;
        if keep_audio {
            s.audio.extend_from_slice(samples);
        }
    });

    for _ in 0..args.frames {
        host.run()?;
    }
    info!("ran {} frames", args.frames);

    if let Some(path) = &args.save_state {
        host.save_state(path)
            .with_context(|| format!("saving state {}", path.display()))?;
        info!("saved state to {}", path.display());
    }

    let stats = stats.take();
    println!(
        "{} frames presented, {} audio chunks ({} bytes)",
        stats.frames,
        stats.audio_chunks,
        stats.audio.len()
    );

    if let Some(path) = &args.dump_frame {
        match &stats.last_frame {
            Some(frame) => {
                let swapped = host.config().channel_swap.applies_to(&descriptor.name);
                capture::write_png(path, frame, swapped)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("wrote {}", path.display());
            }
            None => warn!("core presented no frame; {} not written", path.display()),
        }
    }

    if let Some(path) = &args.dump_audio {
        let rate = host.sample_rate().round() as u32;
        capture::write_wav(path, &stats.audio, rate)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("wrote {}", path.display());
    }

    host.dispose();
    Ok(())
}
