use anyhow::{anyhow, Context, Result};
use cine::playback::cursor_down;
use cine::{prepare_work_dir, AppConfig, Converter, RenderSettings, TerminalSize, RESET};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(p) = explicit {
        return AppConfig::from_file(p).with_context(|| format!("loading config {}", p.display()));
    }

    // Look for cine.json in app support, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(mut d) = dirs::data_dir() {
        d.push("cine");
        d.push("cine.json");
        tried.push(d);
    }
    tried.push(PathBuf::from("cine.json"));

    for p in &tried {
        if p.exists() {
            info!(path = %p.display(), "using config file");
            return AppConfig::from_file(p).with_context(|| format!("loading config {}", p.display()));
        }
    }

    Ok(AppConfig::default())
}

#[derive(Parser, Debug)]
#[command(version, about = "Render an image or video as colour ANSI art sized to the terminal.")]
struct Args {
    /// Image or video file to render
    #[arg(long)]
    file: PathBuf,

    /// Working directory for intermediate frames
    #[arg(long)]
    save: Option<PathBuf>,

    /// Render in grayscale
    #[arg(long, default_value_t = false)]
    grayscale: bool,

    /// Only colour the background, no characters
    #[arg(long, default_value_t = false)]
    no_font: bool,

    /// Characters to use, indexed from dark to bright pixels
    #[arg(long)]
    charset: Option<String>,

    /// Log timings and full error detail to standard error
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Config file (defaults to cine.json in the data dir or current dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many passes over a video instead of looping forever
    #[arg(long)]
    loops: Option<usize>,

    /// Conversion worker threads
    #[arg(long)]
    jobs: Option<usize>,

    /// Keep the intermediate scaled frames in the working directory
    #[arg(long, default_value_t = false)]
    keep_frames: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "cine=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn reset_colors() {
    let mut out = io::stdout();
    let _ = out.write_all(RESET.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

fn install_interrupt_handler() {
    // Playback only ends by signal; leave the terminal uncoloured when it does.
    if let Err(e) = ctrlc::set_handler(|| {
        reset_colors();
        std::process::exit(130);
    }) {
        warn!("could not install interrupt handler: {}", e);
    }
}

fn terminal_size() -> Result<TerminalSize> {
    let (terminal_size::Width(w), terminal_size::Height(h)) =
        terminal_size::terminal_size().ok_or_else(|| anyhow!("Failed to get terminal size"))?;
    if w == 0 || h == 0 {
        return Err(anyhow!("Failed to get terminal size: {}x{}", w, h));
    }
    Ok(TerminalSize::new(w as u32, h as u32))
}

fn run(args: &Args) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.jobs.is_some() {
        config.workers = args.jobs;
    }
    let save_dir = args.save.clone().unwrap_or_else(|| config.save_dir.clone());
    let converter = Converter::with_config(config).context("Invalid configuration")?;

    let mode = converter.render_mode(&RenderSettings {
        grayscale: args.grayscale,
        no_font: args.no_font,
        charset: args.charset.clone(),
    })?;

    let terminal = terminal_size()?;
    prepare_work_dir(&save_dir).context("Failed to create save directory")?;

    let progress_bar = ProgressBar::new(0);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")?
            .progress_chars("#>-"),
    );

    let frames = converter
        .render(
            &args.file,
            &save_dir,
            terminal,
            &mode,
            args.keep_frames,
            |_completed, total| {
                progress_bar.set_length(total as u64);
                progress_bar.inc(1);
            },
        )
        .with_context(|| format!("Failed to render {}", args.file.display()))?;
    progress_bar.finish_and_clear();
    info!(frames = frames.len(), "rendering complete");

    let mut stdout = io::stdout();
    converter
        .player(args.loops)
        .play(&frames, &mut stdout)
        .context("Failed to write to the terminal")?;

    // A bounded run leaves the cursor at the top of the last frame.
    if frames.len() > 1 && args.loops.unwrap_or(0) > 0 {
        if let Some(last) = frames.last() {
            stdout.write_all(cursor_down(last.row_count()).as_bytes())?;
        }
    }
    Ok(())
}

/// Outer context plus the root cause; the whole chain when verbose.
fn fatal_message(err: &anyhow::Error, verbose: bool) -> String {
    if verbose {
        return format!("{:#}", err);
    }
    let root = err.root_cause().to_string();
    let outer = err.to_string();
    if root == outer {
        outer
    } else {
        format!("{}: {}", outer, root)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    install_interrupt_handler();

    let code = match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("Fatal: {}", fatal_message(&err, args.verbose));
            ExitCode::from(1)
        }
    };

    reset_colors();
    code
}
