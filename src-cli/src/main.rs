mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use scorepulse_ports::playback::SubdivisionMode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("scorepulse error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "scorepulse", about = "Practice metronome and score click-track player")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    /// Output device id, as printed by `scorepulse devices`.
    #[arg(long, global = true)]
    pub device: Option<String>,
    /// Settings and score library directory.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List audio output devices.
    Devices,
    /// Play a constant-tempo click.
    Click(ClickArgs),
    /// Play the click track of a score.
    Play(PlayArgs),
    /// Convert a semicolon-separated bar sheet into a score file.
    ImportCsv(ImportArgs),
    /// Print a score's contents, or what applies at one bar.
    Inspect(InspectArgs),
    /// List scores saved in the library.
    Library,
}

#[derive(Args, Debug)]
pub struct ClickArgs {
    #[arg(long, default_value_t = 120)]
    pub bpm: u32,
    #[arg(long, default_value = "4/4")]
    pub time_signature: String,
    /// Beat grouping such as 2+2+3.
    #[arg(long)]
    pub accents: Option<String>,
    #[arg(long, value_enum)]
    pub subdivision: Option<Subdivision>,
    /// Stop after this many seconds instead of waiting for Enter.
    #[arg(long)]
    pub seconds: Option<u64>,
}

#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Score file path, or the name of a library score.
    pub score: String,
    #[arg(long, default_value_t = 1)]
    pub start_bar: u32,
    #[arg(long, default_value_t = 1.0)]
    pub tempo_multiplier: f64,
    #[arg(long, value_enum)]
    pub subdivision: Option<Subdivision>,
    #[arg(long)]
    pub count_in: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub csv: PathBuf,
    /// Output score file.
    pub out: PathBuf,
    #[arg(long)]
    pub title: String,
    #[arg(long, default_value = "")]
    pub composer: String,
    /// Also save the score into the library under this name.
    #[arg(long)]
    pub library_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Score file path, or the name of a library score.
    pub score: String,
    #[arg(long)]
    pub bar: Option<u32>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Subdivision {
    Quarter,
    Eighth,
}

impl From<Subdivision> for SubdivisionMode {
    fn from(value: Subdivision) -> Self {
        match value {
            Subdivision::Quarter => SubdivisionMode::Quarter,
            Subdivision::Eighth => SubdivisionMode::Eighth,
        }
    }
}
