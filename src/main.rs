use std::cell::RefCell;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use glyphdance::engine::Engine;
use glyphdance::fnv1a64;
use glyphdance::options::{load_options, DanceOptions};
use glyphdance::pixmap_surface::PixmapSurface;
use glyphdance::scheduler::ManualScheduler;
use glyphdance::surface::FixedHost;
use glyphdance::text_surface::TextSurface;

#[derive(Debug, Parser)]
#[command(name = "glyphdance")]
#[command(about = "Procedural ASCII glyph-field animator")]
#[command(version = version_string())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate an options manifest and print a summary.
    Check { manifest: PathBuf },
    /// Render frames to numbered PNGs through the raster surface.
    Render {
        /// Options manifest; defaults apply when omitted.
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Monospace TTF used for glyph rasterization.
        #[arg(long)]
        font: PathBuf,
        #[arg(long, default_value_t = 120)]
        frames: u32,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 360)]
        height: u32,
        /// Write a JSON sidecar with per-frame and sequence hashes.
        #[arg(long)]
        sidecar: bool,
        /// Fail unless the sequence hash matches (e.g. 0x1234abcd...).
        #[arg(long)]
        expected_hash: Option<String>,
    },
    /// Play the animation in the terminal.
    Play {
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(long, default_value_t = 300)]
        frames: u32,
        #[arg(long, default_value_t = 30)]
        fps: u32,
        #[arg(long, default_value_t = 80)]
        cols: u32,
        #[arg(long, default_value_t = 24)]
        rows: u32,
    },
}

fn version_string() -> &'static str {
    static VERSION: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION.get_or_init(|| match option_env!("GLYPHDANCE_GIT_HASH") {
        Some(hash) => format!("{} ({hash})", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_owned(),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { manifest } => run_check(&manifest),
        Commands::Render {
            manifest,
            output,
            font,
            frames,
            fps,
            width,
            height,
            sidecar,
            expected_hash,
        } => run_render(RenderArgs {
            manifest,
            output,
            font,
            frames,
            fps,
            width,
            height,
            sidecar,
            expected_hash,
        }),
        Commands::Play {
            manifest,
            frames,
            fps,
            cols,
            rows,
        } => run_play(manifest.as_deref(), frames, fps, cols, rows),
    }
}

fn load_or_default(manifest: Option<&Path>) -> Result<DanceOptions> {
    match manifest {
        Some(path) => load_options(path),
        None => Ok(DanceOptions::default()),
    }
}

fn run_check(manifest_path: &Path) -> Result<()> {
    let options = load_options(manifest_path)?;

    println!(
        "OK: {} ({} glyph palette, seed {}, {} octave(s), {:?} sizing)",
        manifest_path.display(),
        options.palette.chars().count(),
        options.seed,
        options.octaves,
        options.size_mode
    );
    println!(
        "Tonemap: auto_level={} gamma={} contrast={} invert={}",
        options.auto_level, options.gamma, options.contrast, options.invert
    );
    Ok(())
}

struct RenderArgs {
    manifest: Option<PathBuf>,
    output: PathBuf,
    font: PathBuf,
    frames: u32,
    fps: u32,
    width: u32,
    height: u32,
    sidecar: bool,
    expected_hash: Option<String>,
}

#[derive(serde::Serialize)]
struct SequenceSidecar {
    width: u32,
    height: u32,
    fps: u32,
    frame_hashes: Vec<String>,
    sequence_hash: String,
}

fn run_render(args: RenderArgs) -> Result<()> {
    if args.fps == 0 {
        bail!("fps must be > 0");
    }
    let options = load_or_default(args.manifest.as_deref())?;

    let surface = Rc::new(RefCell::new(PixmapSurface::new(&args.font)?));
    let host = Rc::new(RefCell::new(FixedHost::new(
        args.width as f32,
        args.height as f32,
    )));
    let scheduler = Rc::new(RefCell::new(ManualScheduler::new()));
    let mut engine = Engine::new(
        Box::new(surface.clone()),
        Box::new(host),
        Box::new(scheduler),
        options,
    )?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create output directory {}", args.output.display()))?;

    println!(
        "[glyphdance] Rendering {} frame(s) at {}x{} to {}",
        args.frames,
        args.width,
        args.height,
        args.output.display()
    );

    let mut frame_hashes = Vec::with_capacity(args.frames as usize);
    engine.start();
    for frame in 0..args.frames {
        let elapsed_ms = f64::from(frame) * 1000.0 / f64::from(args.fps);
        engine.tick(elapsed_ms);

        let frame_path = args.output.join(format!("frame_{frame:05}.png"));
        {
            let surface = surface.borrow();
            frame_hashes.push(fnv1a64(surface.data()));
            surface.save_png(&frame_path)?;
        }

        if frame % args.fps == 0 {
            eprintln!("rendered frame {}/{}", frame + 1, args.frames);
        }
    }
    engine.destroy();

    let mut sequence_bytes = Vec::with_capacity(frame_hashes.len() * 8);
    for hash in &frame_hashes {
        sequence_bytes.extend_from_slice(&hash.to_le_bytes());
    }
    let sequence_hash = fnv1a64(&sequence_bytes);

    if let Some(expected) = &args.expected_hash {
        let expected = parse_hash(expected)?;
        if expected != sequence_hash {
            bail!("Sequence hash mismatch! Expected 0x{expected:016x}, got 0x{sequence_hash:016x}");
        }
        println!("[glyphdance] Regression check passed: 0x{sequence_hash:016x}");
    } else {
        println!("[glyphdance] Sequence hash: 0x{sequence_hash:016x}");
    }

    if args.sidecar {
        let sidecar = SequenceSidecar {
            width: args.width,
            height: args.height,
            fps: args.fps,
            frame_hashes: frame_hashes
                .iter()
                .map(|hash| format!("0x{hash:016x}"))
                .collect(),
            sequence_hash: format!("0x{sequence_hash:016x}"),
        };
        let sidecar_path = args.output.join("sequence.json");
        let json = serde_json::to_string_pretty(&sidecar)?;
        fs::write(&sidecar_path, json)?;
        println!("[glyphdance] Wrote sidecar to {}", sidecar_path.display());
    }

    println!("[glyphdance] Done.");
    Ok(())
}

fn parse_hash(raw: &str) -> Result<u64> {
    let digits = raw.trim().trim_start_matches("0x");
    u64::from_str_radix(digits, 16)
        .with_context(|| format!("expected a hex sequence hash, got '{raw}'"))
}

fn run_play(manifest: Option<&Path>, frames: u32, fps: u32, cols: u32, rows: u32) -> Result<()> {
    if fps == 0 {
        bail!("fps must be > 0");
    }
    if cols == 0 || rows == 0 {
        bail!("terminal grid must be at least 1x1");
    }
    let options = load_or_default(manifest)?;

    let surface = Rc::new(RefCell::new(TextSurface::new()));
    let host = Rc::new(RefCell::new(FixedHost::new(1.0, 1.0)));
    let scheduler = Rc::new(RefCell::new(ManualScheduler::new()));
    let mut engine = Engine::new(
        Box::new(surface.clone()),
        Box::new(host.clone()),
        Box::new(scheduler),
        options,
    )?;

    // Size the viewport from the derived glyph cell so the grid is exactly
    // cols x rows. Half a cell of margin keeps accumulated float steps from
    // spilling an extra row or column.
    let (glyph_w, glyph_h) = engine.glyph_metrics();
    host.borrow_mut().set_viewport(
        (cols as f32 - 0.5) * glyph_w,
        (rows as f32 - 0.5) * glyph_h,
    );
    engine.resize()?;

    let frame_budget = Duration::from_millis(1000 / u64::from(fps));
    let mut stdout = std::io::stdout();

    write!(stdout, "\x1b[2J")?;
    engine.start();
    for frame in 0..frames {
        let elapsed_ms = f64::from(frame) * 1000.0 / f64::from(fps);
        engine.tick(elapsed_ms);
        write!(stdout, "\x1b[H{}", surface.borrow().to_text())?;
        stdout.flush()?;
        thread::sleep(frame_budget);
    }
    engine.destroy();

    eprintln!("[glyphdance] Played {frames} frame(s) at {cols}x{rows}.");
    Ok(())
}
