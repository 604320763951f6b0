use crate::{ClickArgs, Cli, Command, ImportArgs, InspectArgs, PlayArgs};
use anyhow::{bail, Context, Result};
use crossbeam_channel::{after, never, select, unbounded, Receiver};
use scorepulse_core::{ClickPlanner, EngineConfig, MetronomeEngine};
use scorepulse_domain_score::{import_csv_path, parse_accent_pattern, Score, TimeSignature};
use scorepulse_infra_audio_cpal::CpalAudioOutputPort;
use scorepulse_infra_storage_fs::FsStorage;
use scorepulse_ports::audio::AudioOutputPort;
use scorepulse_ports::playback::{PlaybackStatus, PositionCallback, PositionUpdate, SubdivisionMode};
use scorepulse_ports::storage::{SettingsDto, StoragePort};
use scorepulse_ports::types::DeviceId;
use std::fs;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn run(cli: Cli) -> Result<()> {
    let Cli {
        device,
        data_dir,
        command,
        ..
    } = cli;
    let storage = match data_dir {
        Some(dir) => FsStorage::new(dir),
        None => FsStorage::default(),
    };

    match command {
        Command::Devices => list_devices(),
        Command::Click(args) => click(&storage, device, args),
        Command::Play(args) => play(&storage, device, args),
        Command::ImportCsv(args) => import(&storage, args),
        Command::Inspect(args) => inspect(&storage, args),
        Command::Library => {
            for name in storage.list_scores()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn list_devices() -> Result<()> {
    let port = CpalAudioOutputPort::new();
    let default_id = port.default_output().ok().map(|device| device.id);
    for device in port.list_outputs()? {
        let marker = if Some(&device.id) == default_id.as_ref() { "*" } else { " " };
        println!(
            "{marker} {}  ({} Hz, {} ch)  {}",
            device.name, device.default_config.sample_rate_hz, device.default_config.channels, device.id
        );
    }
    Ok(())
}

fn load_settings(storage: &FsStorage) -> SettingsDto {
    storage.load_settings().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "falling back to default settings");
        SettingsDto::default()
    })
}

fn open_engine(settings: &SettingsDto, device: Option<String>) -> Result<MetronomeEngine> {
    let port = CpalAudioOutputPort::new();
    let device_id = match device.map(DeviceId).or_else(|| settings.selected_audio_out.clone()) {
        Some(id) => id,
        None => {
            port.default_output()
                .context("no default audio output")?
                .id
        }
    };

    let mut config = EngineConfig::from_settings(settings);
    if let Some(output) = port
        .list_outputs()?
        .into_iter()
        .find(|output| output.id == device_id)
    {
        config.sample_rate_hz = output.default_config.sample_rate_hz;
    }

    MetronomeEngine::new(config, &port, &device_id)
        .with_context(|| format!("failed to open audio output {device_id}"))
}

fn click(storage: &FsStorage, device: Option<String>, args: ClickArgs) -> Result<()> {
    let time_signature = match args.accents.as_deref() {
        Some(accents) => {
            let pattern = parse_accent_pattern(accents)
                .with_context(|| format!("invalid accent pattern '{accents}'"))?;
            TimeSignature::parse_with_pattern(&args.time_signature, Some(pattern))?
        }
        None => args.time_signature.parse::<TimeSignature>()?,
    };

    let settings = load_settings(storage);
    let subdivision = args
        .subdivision
        .map(SubdivisionMode::from)
        .unwrap_or(settings.default_subdivision);

    let mut engine = open_engine(&settings, device)?;
    engine.start_metronome(args.bpm, &time_signature, subdivision)?;
    println!(
        "{} bpm in {}, press Enter to stop",
        args.bpm, time_signature
    );

    wait_for_end(engine.subscribe(), args.seconds.map(Duration::from_secs));
    engine.stop();
    Ok(())
}

fn play(storage: &FsStorage, device: Option<String>, args: PlayArgs) -> Result<()> {
    let score = Arc::new(read_score(storage, &args.score)?);
    let settings = load_settings(storage);
    let subdivision = args
        .subdivision
        .map(SubdivisionMode::from)
        .unwrap_or(settings.default_subdivision);

    let mut engine = open_engine(&settings, device)?;
    let on_position: PositionCallback = Arc::new(|update: PositionUpdate| {
        if update.bar < 0 {
            println!("count-in  beat {}", update.beat);
        } else {
            println!("bar {:>4}  beat {}  {} bpm", update.bar, update.beat, update.tempo);
        }
    });
    engine.start_score_playback(
        score.clone(),
        args.start_bar,
        args.tempo_multiplier,
        subdivision,
        args.count_in || settings.count_in,
        Some(on_position),
    )?;
    println!("playing '{}' from bar {}, press Enter to stop", score.title(), args.start_bar);

    wait_for_end(engine.subscribe(), None);
    engine.stop();
    Ok(())
}

fn import(storage: &FsStorage, args: ImportArgs) -> Result<()> {
    let score = import_csv_path(&args.csv, &args.title, &args.composer)
        .with_context(|| format!("failed to import {}", args.csv.display()))?;
    let json = score.to_json_pretty()?;
    fs::write(&args.out, &json).with_context(|| format!("failed to write {}", args.out.display()))?;
    tracing::info!(
        bars = score.total_bars(),
        out = %args.out.display(),
        "score imported"
    );

    if let Some(name) = args.library_name.as_deref() {
        storage.save_score(name, &json)?;
        tracing::info!(name, "score added to library");
    }
    Ok(())
}

fn inspect(storage: &FsStorage, args: InspectArgs) -> Result<()> {
    let score = read_score(storage, &args.score)?;
    println!("{} - {}", score.title(), score.composer());
    println!("{} bars, default tempo {} bpm", score.total_bars(), score.default_tempo());

    let Some(bar) = args.bar else {
        for entry in score.bars() {
            println!("  bar {:>4}  meter {}", entry.number, describe_meter(&entry.time_signature));
        }
        for change in score.tempo_changes() {
            let tempo = change
                .tempo
                .map(|tempo| format!("{tempo} bpm"))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  bar {:>4}  tempo {}  {:?}  {}",
                change.bar,
                tempo,
                change.transition,
                change.marking.as_deref().unwrap_or("")
            );
        }
        for mark in score.rehearsal_marks() {
            println!("  bar {:>4}  rehearsal {}", mark.bar, mark.name);
        }
        return Ok(());
    };

    if !score.contains_bar(bar) {
        bail!("bar {} is outside 1..={}", bar, score.total_bars());
    }
    let time_signature = score.time_signature_at(bar);
    println!("bar {bar}");
    println!("  meter      {}", describe_meter(&time_signature));
    match score.transition_range_at(bar) {
        Some(range) => println!(
            "  tempo      {} -> {} bpm ({:?}, bars {}..{})",
            range.tempo_at(bar, 0.0),
            range.tempo_at(bar, 1.0),
            range.kind,
            range.start_bar,
            range.end_bar
        ),
        None => println!("  tempo      {} bpm", score.tempo_at(bar)),
    }
    if let Some(marking) = score.tempo_marking_at(bar) {
        println!("  marking    {marking}");
    }
    if let Some(mark) = score.rehearsal_mark_at(bar) {
        println!("  rehearsal  {} (bar {})", mark.name, mark.bar);
    }
    for mode in [SubdivisionMode::Quarter, SubdivisionMode::Eighth] {
        let planner = ClickPlanner::new(&time_signature, mode);
        println!("  {:<9}  {} clicks", format!("{mode:?}").to_lowercase(), planner.total_clicks_per_bar());
    }
    Ok(())
}

fn describe_meter(time_signature: &TimeSignature) -> String {
    match time_signature.effective_accent_pattern() {
        Some(pattern) => {
            let groups: Vec<String> = pattern.iter().map(u32::to_string).collect();
            format!("{} ({})", time_signature, groups.join("+"))
        }
        None => time_signature.to_string(),
    }
}

fn read_score(storage: &FsStorage, source: &str) -> Result<Score> {
    let json = if Path::new(source).is_file() {
        fs::read_to_string(source).with_context(|| format!("failed to read {source}"))?
    } else {
        storage
            .load_score(source)
            .with_context(|| format!("'{source}' is neither a file nor a library score"))?
    };
    Score::from_json(&json).with_context(|| format!("'{source}' is not a valid score"))
}

/// Blocks until playback ends, Enter is pressed, or `limit` elapses.
fn wait_for_end(status: Receiver<PlaybackStatus>, limit: Option<Duration>) {
    let enter = stdin_enter();
    let closed = never();
    let mut stdin_open = true;
    let deadline = limit.map(after).unwrap_or_else(never);
    loop {
        let input = if stdin_open { &enter } else { &closed };
        select! {
            recv(status) -> msg => match msg {
                Ok(status) if !status.is_playing => return,
                Ok(_) => {}
                Err(_) => return,
            },
            recv(input) -> msg => {
                if msg.is_ok() {
                    return;
                }
                stdin_open = false;
            },
            recv(deadline) -> _ => return,
        }
    }
}

fn stdin_enter() -> Receiver<()> {
    let (tx, rx) = unbounded();
    let _ = thread::Builder::new()
        .name("scorepulse-stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            if let Ok(read) = std::io::stdin().lock().read_line(&mut line) {
                if read > 0 {
                    let _ = tx.send(());
                }
            }
        });
    rx
}
