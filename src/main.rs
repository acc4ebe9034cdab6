use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use keytape::config::{self, Config};
use keytape::evaluator::{MemoryClipboard, ScriptEngine};
use keytape::interpreter::Environment;
use keytape::persist::{self, FileLoader};
use keytape::simulator::{DryRunSimulator, FixedProbe, Simulator};
use keytape::{CancelToken, Outcome, PersistError, PlaybackReport, Scheduler, Sequence, compile};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a script into a JSON sequence
    Compile {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (default: INPUT with a .json extension)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Play a script or JSON sequence through the dry-run backend
    Run {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Playback rate multiplier
        #[arg(long)]
        speed: Option<f64>,

        /// Report timing statistics
        #[arg(long)]
        timing: bool,
    },

    /// Print a sequence one instruction per line
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    let args = Args::parse();

    let config = config::load(args.config.as_deref()).unwrap_or_else(|err| {
        eprintln!("Failed to load config: {:#}", err);
        process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Command::Compile { input, output } => cmd_compile(&input, output),
        Command::Run {
            file,
            speed,
            timing,
        } => cmd_run(&config, &file, speed, timing),
        Command::Dump { file } => cmd_dump(&file),
    };

    // Error messages already embed their causes.
    if let Err(err) = result {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

fn load_sequence(file: &Path) -> Result<Sequence> {
    persist::load_or_compile(file).map_err(|err| match err {
        PersistError::Compile(err) => err.into(),
        other => anyhow!("{}: {}", file.display(), other),
    })
}

fn cmd_compile(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| input.with_extension("json"));
    if output == input {
        bail!("{} would overwrite its own input; pass --output", output.display());
    }
    let source = fs::read_to_string(input)
        .map_err(|err| anyhow!("Failed to read {}: {}", input.display(), err))?;
    let sequence = compile(&source)?;
    persist::save(&output, &sequence)
        .map_err(|err| anyhow!("Failed to write {}: {}", output.display(), err))?;
    println!(
        "{} compiled ({} instruction{} written to {}).",
        input.display(),
        sequence.len(),
        plural(sequence.len()),
        output.display()
    );
    Ok(())
}

fn cmd_run(config: &Config, file: &Path, speed: Option<f64>, timing: bool) -> Result<()> {
    let sequence = load_sequence(file)?;

    let mut options = config.playback_options();
    if let Some(speed) = speed {
        if !(speed.is_finite() && speed > 0.0) {
            bail!("--speed must be greater than 0");
        }
        options.speed = speed;
    }
    options.capture_timing |= timing;

    let timer = config.timer();
    let probe = FixedProbe(config.probe_color()?);
    let (width, height) = (config.playback.screen_width, config.playback.screen_height);
    let release_on_stop = config.playback.release_on_stop;
    let loader = FileLoader::beside(file);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .map_err(|err| anyhow!("Failed to install Ctrl-C handler: {}", err))?;

    let playback = thread::Builder::new()
        .name("playback".to_string())
        .spawn(move || -> Result<PlaybackReport> {
            let mut sim = DryRunSimulator::default();
            sim.set_screen_resolution(width, height)?;
            let mut engine = ScriptEngine::new();
            let mut clipboard = MemoryClipboard::default();
            let env = Environment {
                simulator: &mut sim,
                probe: &probe,
                evaluator: &mut engine,
                clipboard: &mut clipboard,
            };

            let result = Scheduler::new(timer, env, options)
                .with_cancel_token(cancel)
                .play(&sequence, Some(&loader));

            let clean = matches!(&result, Ok(report) if report.outcome != Outcome::Cancelled);
            if !clean && release_on_stop {
                tracing::info!("Releasing held input after abnormal stop");
                if let Err(err) = sim.release_all_keys().and_then(|_| sim.release_all_mouse()) {
                    tracing::warn!("Failed to release input: {}", err);
                }
            }
            Ok(result?)
        })
        .map_err(|err| anyhow!("Failed to start playback thread: {}", err))?;

    let report = playback
        .join()
        .map_err(|_| anyhow!("playback thread panicked"))??;

    println!(
        "{:?}: {} instruction{} executed, {} transfer{}.",
        report.outcome,
        report.executed,
        plural(report.executed),
        report.transfers,
        plural(report.transfers)
    );
    if timing {
        println!("samples:      {}", report.samples.len());
        if let Some(mean) = report.mean_lateness() {
            println!("mean lateness: {:?}", mean);
        }
        println!("max lateness:  {:?}", report.max_lateness);
    }
    Ok(())
}

fn cmd_dump(file: &Path) -> Result<()> {
    let sequence = load_sequence(file)?;
    for (index, instr) in sequence.instructions().iter().enumerate() {
        if instr.time_since_previous_ms > 0.0 {
            println!("{:>5}  +{}ms  {}", index, instr.time_since_previous_ms, instr);
        } else {
            println!("{:>5}  {}", index, instr);
        }
    }
    Ok(())
}
