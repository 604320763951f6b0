use crate::click_renderer::{ClickRenderer, ClickTrack};
use crate::config::EngineConfig;
use crate::position_dispatch::{PendingPosition, PositionDispatcher, PositionSender};
use crate::scheduler::ClickScheduler;
use crate::status::StatusBoard;
use crate::timing::{ms_to_samples, samples_to_duration};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use scorepulse_domain_score::{Score, TimeSignature};
use scorepulse_ports::audio::{AudioError, AudioOutputPort, AudioStreamHandle};
use scorepulse_ports::playback::{
    PlaybackStatus, PositionCallback, ScheduledClick, SubdivisionMode, COUNT_IN_BAR,
};
use scorepulse_ports::types::{AudioConfig, DeviceId, SampleTime, Volume01};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("invalid tempo: {0} bpm")]
    InvalidTempo(u32),
    #[error("invalid tempo multiplier: {0}")]
    InvalidTempoMultiplier(f64),
    #[error("start bar {bar} is outside 1..={total_bars}")]
    StartBarOutOfRange { bar: u32, total_bars: u32 },
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),
    #[error("thread error: {0}")]
    Thread(String),
}

/// Maps sample times of one session onto wall-clock deadlines.
#[derive(Clone, Copy, Debug)]
struct SessionClock {
    generation: u64,
    origin_sample: SampleTime,
    origin_instant: Instant,
    sample_rate_hz: u32,
}

impl SessionClock {
    fn deadline(&self, sample_time: SampleTime) -> Instant {
        let offset = sample_time.saturating_sub(self.origin_sample);
        self.origin_instant + samples_to_duration(offset, self.sample_rate_hz)
    }
}

#[derive(Clone, Copy, Debug)]
enum Refill {
    /// Keep at least `low_water_samples` queued, topping up `batch_bars` at a time.
    Continuous {
        batch_bars: usize,
        low_water_samples: u64,
    },
    /// Plan the whole piece up front, then wait for it to play out.
    WholePiece,
}

struct Worker {
    cancel: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    join: JoinHandle<()>,
}

/// Metronome and score-playback engine.
///
/// One session plays at a time. Starting always stops the previous session
/// first, and every click or position report carries the generation of the
/// session that produced it so nothing from a stopped session survives.
pub struct MetronomeEngine {
    config: EngineConfig,
    sample_rate_hz: u32,
    track: ClickTrack,
    generation: Arc<AtomicU64>,
    status: Arc<StatusBoard>,
    dispatcher: PositionDispatcher,
    worker: Option<Worker>,
    stream: Option<Box<dyn AudioStreamHandle>>,
}

impl MetronomeEngine {
    pub fn new(
        config: EngineConfig,
        audio_port: &dyn AudioOutputPort,
        device_id: &DeviceId,
    ) -> Result<Self, EngineError> {
        let track = ClickTrack::new(config.queue_capacity, config.volume);
        let renderer = ClickRenderer::new(
            track.clone(),
            config.sample_rate_hz,
            config.decay_per_sample,
        );
        let audio_config = AudioConfig {
            sample_rate_hz: config.sample_rate_hz,
            channels: 2,
            buffer_size_frames: config.buffer_size_frames,
        };

        let stream = audio_port.open_output(device_id, audio_config, Box::new(renderer))?;
        let sample_rate_hz = stream.sample_rate_hz();
        if sample_rate_hz != config.sample_rate_hz {
            tracing::warn!(
                requested = config.sample_rate_hz,
                actual = sample_rate_hz,
                "output stream runs at a different sample rate"
            );
        }
        tracing::info!(device = %device_id, sample_rate_hz, "audio output opened");

        Self::assemble(config, track, sample_rate_hz, Some(stream))
    }

    /// Engine without an audio device. The caller drives the returned
    /// renderer, which makes rendering deterministic.
    pub fn with_renderer(config: EngineConfig) -> Result<(Self, ClickRenderer), EngineError> {
        let track = ClickTrack::new(config.queue_capacity, config.volume);
        let renderer = ClickRenderer::new(
            track.clone(),
            config.sample_rate_hz,
            config.decay_per_sample,
        );
        let sample_rate_hz = config.sample_rate_hz;
        let engine = Self::assemble(config, track, sample_rate_hz, None)?;
        Ok((engine, renderer))
    }

    fn assemble(
        config: EngineConfig,
        track: ClickTrack,
        sample_rate_hz: u32,
        stream: Option<Box<dyn AudioStreamHandle>>,
    ) -> Result<Self, EngineError> {
        let generation = Arc::new(AtomicU64::new(0));
        let status = Arc::new(StatusBoard::new());
        let dispatcher = PositionDispatcher::spawn(generation.clone(), status.clone())
            .map_err(|e| EngineError::Thread(e.to_string()))?;

        Ok(Self {
            config,
            sample_rate_hz,
            track,
            generation,
            status,
            dispatcher,
            worker: None,
            stream,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn sample_time(&self) -> SampleTime {
        self.track.sample_time()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.snapshot()
    }

    /// Receives the current status immediately, then every change.
    pub fn subscribe(&self) -> Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    pub fn is_playing(&self) -> bool {
        self.status.snapshot().is_playing
    }

    pub fn set_volume(&self, volume: Volume01) {
        self.track.set_volume(volume);
    }

    pub fn start_metronome(
        &mut self,
        bpm: u32,
        time_signature: &TimeSignature,
        subdivision: SubdivisionMode,
    ) -> Result<(), EngineError> {
        if bpm == 0 {
            return Err(EngineError::InvalidTempo(bpm));
        }

        self.stop();
        let clock = self.begin_session();
        let scheduler = ClickScheduler::fixed(
            bpm,
            time_signature,
            subdivision,
            self.sample_rate_hz,
            self.config.click_frequencies,
            self.first_click_sample(&clock),
        );
        let bar_samples = scheduler.fixed_bar_samples().unwrap_or(0);
        let refill = Refill::Continuous {
            batch_bars: self.config.lookahead_bars.max(1) as usize,
            low_water_samples: bar_samples * self.config.refill_threshold_bars as u64,
        };

        self.status.reset(PlaybackStatus {
            bar: 1,
            beat: 0,
            tempo: bpm,
            is_playing: true,
        });
        tracing::info!(bpm, time_signature = %time_signature, ?subdivision, "metronome started");
        self.spawn_worker(scheduler, clock, refill, None)
    }

    pub fn start_score_playback(
        &mut self,
        score: Arc<Score>,
        start_bar: u32,
        tempo_multiplier: f64,
        subdivision: SubdivisionMode,
        count_in: bool,
        on_position_update: Option<PositionCallback>,
    ) -> Result<(), EngineError> {
        if !score.contains_bar(start_bar) {
            return Err(EngineError::StartBarOutOfRange {
                bar: start_bar,
                total_bars: score.total_bars(),
            });
        }
        if !tempo_multiplier.is_finite() || tempo_multiplier <= 0.0 {
            return Err(EngineError::InvalidTempoMultiplier(tempo_multiplier));
        }

        self.stop();
        let clock = self.begin_session();
        let initial_tempo =
            (score.tempo_at_progress(start_bar, 0.0) as f64 * tempo_multiplier).round() as u32;
        let scheduler = ClickScheduler::score(
            score.clone(),
            start_bar,
            tempo_multiplier,
            subdivision,
            count_in,
            self.sample_rate_hz,
            self.config.click_frequencies,
            self.first_click_sample(&clock),
        );

        self.status.reset(PlaybackStatus {
            bar: if count_in { COUNT_IN_BAR } else { start_bar as i32 },
            beat: 0,
            tempo: initial_tempo,
            is_playing: true,
        });
        tracing::info!(
            title = score.title(),
            start_bar,
            tempo_multiplier,
            count_in,
            "score playback started"
        );
        self.spawn_worker(scheduler, clock, Refill::WholePiece, on_position_update)
    }

    /// Stops the current session. After this returns no further click of it
    /// will sound and no further position report of it will be delivered.
    /// Calling it while stopped does nothing observable.
    pub fn stop(&mut self) {
        let worker = self.worker.take();
        if let Some(worker) = worker.as_ref() {
            worker.cancel.store(true, Ordering::Release);
            let _ = worker.wake_tx.try_send(());
        }

        let next = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.track.silence(next);
        self.dispatcher.wake();

        if let Some(worker) = worker {
            if worker.join.join().is_err() {
                tracing::warn!("scheduler thread panicked");
            }
            tracing::info!("playback stopped");
        }
        self.status.set_playing(false);
    }

    fn begin_session(&mut self) -> SessionClock {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let origin_sample = self.track.begin_session(generation);
        SessionClock {
            generation,
            origin_sample,
            origin_instant: Instant::now(),
            sample_rate_hz: self.sample_rate_hz,
        }
    }

    fn first_click_sample(&self, clock: &SessionClock) -> SampleTime {
        clock.origin_sample + ms_to_samples(self.config.start_latency_ms, self.sample_rate_hz)
    }

    fn spawn_worker(
        &mut self,
        scheduler: ClickScheduler,
        clock: SessionClock,
        refill: Refill,
        callback: Option<PositionCallback>,
    ) -> Result<(), EngineError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded(1);
        let session = SessionWorker {
            scheduler,
            backlog: VecDeque::new(),
            clock,
            refill,
            callback,
            track: self.track.clone(),
            positions: self.dispatcher.sender(),
            status: self.status.clone(),
            generation: self.generation.clone(),
            cancel: cancel.clone(),
            wake_rx,
            poll_interval: Duration::from_millis(self.config.poll_interval_ms.max(1)),
        };

        let spawned = thread::Builder::new()
            .name("scorepulse-scheduler".to_string())
            .spawn(move || session.run());
        match spawned {
            Ok(join) => {
                self.worker = Some(Worker {
                    cancel,
                    wake_tx,
                    join,
                });
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(EngineError::Thread(e.to_string()))
            }
        }
    }
}

impl Drop for MetronomeEngine {
    fn drop(&mut self) {
        self.stop();
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
    }
}

/// Scheduler thread of one session. Planned clicks wait in `backlog` and
/// move into the shared queue only as it has room, so the audio lock never
/// covers more than a bounded chunk of work.
struct SessionWorker {
    scheduler: ClickScheduler,
    backlog: VecDeque<ScheduledClick>,
    clock: SessionClock,
    refill: Refill,
    callback: Option<PositionCallback>,
    track: ClickTrack,
    positions: PositionSender,
    status: Arc<StatusBoard>,
    generation: Arc<AtomicU64>,
    cancel: Arc<AtomicBool>,
    wake_rx: Receiver<()>,
    poll_interval: Duration,
}

impl SessionWorker {
    fn run(mut self) {
        let mut end_sample = None;
        loop {
            if self.cancelled() {
                return;
            }

            match self.refill {
                Refill::Continuous {
                    batch_bars,
                    low_water_samples,
                } => {
                    let runway = self
                        .scheduler
                        .next_click_sample_time()
                        .saturating_sub(self.track.sample_time());
                    if runway < low_water_samples.max(1) {
                        let clicks = self.scheduler.schedule_bars(batch_bars);
                        tracing::debug!(clicks = clicks.len(), runway, "scheduled click batch");
                        self.backlog.extend(clicks);
                    }
                }
                Refill::WholePiece => {
                    if end_sample.is_none() {
                        self.backlog.extend(self.scheduler.schedule_all());
                        let end = self.scheduler.next_click_sample_time();
                        tracing::debug!(
                            clicks = self.backlog.len(),
                            end_sample = end,
                            "score fully scheduled"
                        );
                        end_sample = Some(end);
                    }
                }
            }

            if !self.feed() {
                return;
            }

            if let Some(end) = end_sample {
                if self.backlog.is_empty() && self.track.sample_time() >= end {
                    self.finish();
                    return;
                }
            }

            let late = self.track.take_late_clicks();
            if late > 0 {
                tracing::warn!(late, "clicks rendered after their scheduled time");
            }

            match self.wake_rx.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Moves backlog clicks into the shared queue while it has room and arms
    /// a position report for each one. Returns `false` once the session is
    /// over.
    fn feed(&mut self) -> bool {
        while !self.backlog.is_empty() {
            if self.cancelled() {
                return false;
            }
            let (ready, _) = self.backlog.as_slices();
            let Some(taken) = self.track.enqueue(self.clock.generation, ready) else {
                return false;
            };
            if taken == 0 {
                break;
            }
            for click in self.backlog.drain(..taken) {
                self.positions.arm(PendingPosition {
                    deadline: self.clock.deadline(click.sample_time),
                    session: self.clock.generation,
                    update: click.position(),
                    callback: self.callback.clone(),
                });
            }
        }
        true
    }

    fn finish(&self) {
        if self.generation.load(Ordering::Acquire) == self.clock.generation {
            self.status.set_playing(false);
            tracing::info!("score playback finished");
        }
    }
}
