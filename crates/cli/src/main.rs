//! Binary entry point for the caption sync tool.

mod controls;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use controls::{Command as Input, HELP};
use cuesync_core::cue::{format_srt, format_timestamp, format_vtt};
use cuesync_core::{
    parse, parse_report, run_overlay, Cue, CueRenderer, MediaKey, SyncConfig, SyncSession,
};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::{info, trace, warn};
use tracing_subscriber::EnvFilter;

/// Command line options for the binary.
#[derive(Parser)]
#[command(version, about = "Parse caption files and play them against a manual clock")]
struct Cli {
    /// Enable verbose debug and trace logs.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the cues found in a caption file.
    Parse {
        /// SRT or VTT file to read.
        input: PathBuf,

        /// Print the cues as JSON instead of one line per cue.
        #[arg(long)]
        json: bool,
    },
    /// Rewrite a caption file as SRT or VTT.
    Convert {
        input: PathBuf,

        #[arg(long, value_enum)]
        to: Format,

        /// Seconds to delay every cue by, negative to show them earlier.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        offset: f64,

        /// Output path. Defaults to the input path with the new extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show captions in sync with a local clock controlled from stdin.
    Play {
        input: PathBuf,

        /// JSON file with tick interval and nudge sizes.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the tick interval in milliseconds.
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Title the captions belong to. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Srt,
    Vtt,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Srt => "srt",
            Format::Vtt => "vtt",
        }
    }
}

/// Application entry point which parses CLI args and performs actions.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.debug {
        EnvFilter::default()
            .add_directive("cuesync=trace".parse()?)
            .add_directive("cuesync_core=trace".parse()?)
            .add_directive("info".parse()?)
    } else {
        EnvFilter::default()
            .add_directive("cuesync=info".parse()?)
            .add_directive("cuesync_core=info".parse()?)
            .add_directive("warn".parse()?)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    match cli.command {
        Command::Parse { input, json } => print_cues(&input, json),
        Command::Convert {
            input,
            to,
            offset,
            output,
        } => convert(&input, to, offset, output),
        Command::Play {
            input,
            config,
            tick_ms,
            title,
        } => {
            let mut config = match config {
                Some(path) => SyncConfig::load(&path)?,
                None => SyncConfig::default(),
            };
            if let Some(ms) = tick_ms {
                config.tick_interval_ms = ms;
            }
            play(&input, config, title).await
        }
    }
}

fn read_captions(path: &Path) -> Result<String> {
    trace!("read_captions(path={})", path.display());
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn print_cues(input: &Path, json: bool) -> Result<()> {
    let report = parse_report(&read_captions(input)?);
    if json {
        println!("{}", serde_json::to_string_pretty(&report.cues)?);
    } else {
        for cue in &report.cues {
            println!(
                "#{} {} --> {} {}",
                cue.id,
                format_timestamp(cue.start, '.'),
                format_timestamp(cue.end, '.'),
                cue.text.replace('\n', " | ")
            );
        }
    }
    info!(
        "{} cues, {} unrecognised blocks skipped",
        report.cues.len(),
        report.skipped
    );
    Ok(())
}

fn convert(input: &Path, to: Format, offset: f64, output: Option<PathBuf>) -> Result<()> {
    let cues: Vec<Cue> = parse(&read_captions(input)?)
        .iter()
        .map(|cue| cue.shifted(offset))
        .collect();
    let text = match to {
        Format::Srt => format_srt(&cues),
        Format::Vtt => format_vtt(&cues),
    };
    let out = output.unwrap_or_else(|| input.with_extension(to.extension()));
    if same_file(input, &out)? {
        anyhow::bail!("refusing to overwrite {}", input.display());
    }
    fs::write(&out, text).with_context(|| format!("writing {}", out.display()))?;
    info!("wrote {} cues to {}", cues.len(), out.display());
    Ok(())
}

/// Whether `out` names the file at `input`, however the path is spelled.
fn same_file(input: &Path, out: &Path) -> Result<bool> {
    if !out.exists() {
        return Ok(false);
    }
    let input =
        fs::canonicalize(input).with_context(|| format!("resolving {}", input.display()))?;
    let out = fs::canonicalize(out).with_context(|| format!("resolving {}", out.display()))?;
    Ok(input == out)
}

/// Prints each caption change to stdout.
struct TerminalRenderer {
    out: Stdout,
}

#[async_trait]
impl CueRenderer for TerminalRenderer {
    async fn render(&mut self, cue: Option<&Cue>) -> Result<()> {
        let line = match cue {
            Some(cue) => format!(
                "[{}] {}\n",
                format_timestamp(cue.start, '.'),
                cue.lines().collect::<Vec<_>>().join("\n               ")
            ),
            None => "[            ]\n".to_string(),
        };
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }
}

/// Run an interactive session until `q` or end of input.
async fn play(input: &Path, config: SyncConfig, title: Option<String>) -> Result<()> {
    let title = title.unwrap_or_else(|| {
        input
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    });
    let mut session = SyncSession::new(config);
    session.set_media(MediaKey::movie(title));
    session.load_cues(parse(&read_captions(input)?));
    let overlay = tokio::spawn(run_overlay(
        session.subscribe(),
        TerminalRenderer { out: io::stdout() },
    ));
    eprintln!("{HELP}");

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Input>() {
            Ok(Input::Control(control)) => session.apply(control),
            Ok(Input::Load(path)) => match read_captions(&path) {
                Ok(text) => session.load_cues(parse(&text)),
                Err(err) => warn!("{err:#}"),
            },
            Ok(Input::Status) => eprintln!("{}", serde_json::to_string(&session.snapshot())?),
            Ok(Input::Help) => eprintln!("{HELP}"),
            Ok(Input::Quit) => break,
            Err(err) => warn!("{err}"),
        }
    }

    drop(session);
    overlay.await??;
    Ok(())
}
