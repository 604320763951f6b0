use parking_lot::Mutex;
use scorepulse_ports::audio::AudioRenderCallback;
use scorepulse_ports::playback::ScheduledClick;
use scorepulse_ports::types::{SampleTime, Volume01};
use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const SILENCE_FLOOR: f32 = 1.0e-4;

/// Most clicks moved into the queue per lock acquisition.
const ENQUEUE_CHUNK: usize = 64;

/// Most clicks triggered in one render block; the rest wait for the next.
const MAX_TRIGGERS_PER_BLOCK: usize = 64;

#[derive(Clone, Copy, Debug, Default)]
struct Oscillator {
    phase: f32,
    phase_step: f32,
    amplitude: f32,
}

impl Oscillator {
    fn trigger(&mut self, phase_step: f32, amplitude: f32) {
        self.phase = 0.0;
        self.phase_step = phase_step;
        self.amplitude = amplitude;
    }

    fn next_sample(&mut self, decay_per_sample: f32) -> f32 {
        if self.amplitude < SILENCE_FLOOR {
            self.amplitude = 0.0;
            return 0.0;
        }
        let sample = self.phase.sin() * self.amplitude;
        self.phase += self.phase_step;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        self.amplitude *= decay_per_sample;
        sample
    }
}

/// Everything the audio thread touches, guarded by one lock so that clearing
/// the queue and silencing the oscillator happen atomically. The queue is
/// allocated once and never grows past its capacity.
#[derive(Debug)]
struct RenderState {
    queue: VecDeque<ScheduledClick>,
    sample_clock: SampleTime,
    session: u64,
    silenced: bool,
    late_clicks: u64,
    oscillator: Oscillator,
}

/// Shared handle between the scheduler side and the audio callback.
#[derive(Clone, Debug)]
pub struct ClickTrack {
    state: Arc<Mutex<RenderState>>,
    volume: Arc<AtomicU32>,
    capacity: usize,
}

impl ClickTrack {
    pub fn new(queue_capacity: usize, volume: Volume01) -> Self {
        let capacity = queue_capacity.max(1);
        Self {
            state: Arc::new(Mutex::new(RenderState {
                queue: VecDeque::with_capacity(capacity),
                sample_clock: 0,
                session: 0,
                silenced: true,
                late_clicks: 0,
                oscillator: Oscillator::default(),
            })),
            volume: Arc::new(AtomicU32::new(volume.get().to_bits())),
            capacity,
        }
    }

    /// Frames rendered so far.
    pub fn sample_time(&self) -> SampleTime {
        self.state.lock().sample_clock
    }

    pub fn set_volume(&self, volume: Volume01) {
        self.volume.store(volume.get().to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Opens `session` for clicks and returns the current sample clock.
    pub fn begin_session(&self, session: u64) -> SampleTime {
        let mut state = self.state.lock();
        state.queue.clear();
        state.oscillator = Oscillator::default();
        state.session = session;
        state.silenced = false;
        state.sample_clock
    }

    /// Drops every pending click and mutes output until the next session.
    /// After this returns no click from an earlier session can sound.
    pub fn silence(&self, session: u64) {
        let mut state = self.state.lock();
        state.queue.clear();
        state.oscillator = Oscillator::default();
        state.silenced = true;
        state.session = session;
    }

    /// Moves as many leading `clicks` as fit into the queue, a bounded chunk
    /// per lock acquisition, and returns how many were taken. `None` means
    /// the session has been superseded and nothing was taken.
    pub fn enqueue(&self, session: u64, clicks: &[ScheduledClick]) -> Option<usize> {
        let mut taken = 0;
        while taken < clicks.len() {
            let mut state = self.state.lock();
            if state.session != session || state.silenced {
                return if taken == 0 { None } else { Some(taken) };
            }
            let room = self.capacity.saturating_sub(state.queue.len());
            let chunk = room.min(ENQUEUE_CHUNK).min(clicks.len() - taken);
            if chunk == 0 {
                break;
            }
            state
                .queue
                .extend(clicks[taken..taken + chunk].iter().copied());
            taken += chunk;
        }
        Some(taken)
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_silenced(&self) -> bool {
        self.state.lock().silenced
    }

    /// Clicks that were due before the block in which they were played.
    pub fn take_late_clicks(&self) -> u64 {
        std::mem::take(&mut self.state.lock().late_clicks)
    }
}

/// Audio callback that turns queued clicks into decaying sine pings.
pub struct ClickRenderer {
    track: ClickTrack,
    sample_rate_hz: f32,
    decay_per_sample: f32,
}

impl ClickRenderer {
    pub fn new(track: ClickTrack, sample_rate_hz: u32, decay_per_sample: f32) -> Self {
        Self {
            track,
            sample_rate_hz: sample_rate_hz.max(1) as f32,
            decay_per_sample: decay_per_sample.clamp(0.0, 1.0),
        }
    }

    pub fn track(&self) -> &ClickTrack {
        &self.track
    }
}

impl AudioRenderCallback for ClickRenderer {
    fn render(&mut self, sample_time_start: SampleTime, out: &mut [f32]) {
        let volume = self.track.volume();
        let frames = out.len();
        let mut triggers = [(0usize, 0.0f32); MAX_TRIGGERS_PER_BLOCK];
        let mut trigger_count = 0;

        let claimed = {
            let mut state = self.track.state.lock();
            state.sample_clock = sample_time_start.saturating_add(frames as u64);
            if state.silenced {
                None
            } else {
                // at most one trigger per frame keeps the work per block bounded
                let mut next_free = 0usize;
                while trigger_count < MAX_TRIGGERS_PER_BLOCK && next_free < frames {
                    let Some(click) = state.queue.front().copied() else {
                        break;
                    };
                    let offset = click.sample_time.saturating_sub(sample_time_start);
                    if offset >= frames as u64 {
                        break;
                    }
                    state.queue.pop_front();
                    if click.sample_time < sample_time_start {
                        state.late_clicks += 1;
                    }
                    let frame = (offset as usize).max(next_free);
                    triggers[trigger_count] =
                        (frame, TAU * click.frequency_hz / self.sample_rate_hz);
                    trigger_count += 1;
                    next_free = frame + 1;
                }
                Some((state.session, state.oscillator))
            }
        };

        let Some((session, mut oscillator)) = claimed else {
            out.fill(0.0);
            return;
        };

        let mut next_trigger = 0;
        for (offset, sample) in out.iter_mut().enumerate() {
            if next_trigger < trigger_count && triggers[next_trigger].0 == offset {
                oscillator.trigger(triggers[next_trigger].1, volume);
                next_trigger += 1;
            }
            *sample = oscillator.next_sample(self.decay_per_sample);
        }

        let mut state = self.track.state.lock();
        if state.session == session && !state.silenced {
            state.oscillator = oscillator;
        }
    }
}
