use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use scorepulse_ports::playback::{PlaybackStatus, PositionUpdate};

/// Latest observable playback status plus a fan-out of changes to
/// subscribers. Subscribers that hang up are dropped on the next publish.
#[derive(Debug, Default)]
pub struct StatusBoard {
    current: RwLock<PlaybackStatus>,
    subscribers: Mutex<Vec<Sender<PlaybackStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PlaybackStatus {
        *self.current.read()
    }

    pub fn subscribe(&self) -> Receiver<PlaybackStatus> {
        let (tx, rx) = unbounded();
        let _ = tx.send(self.snapshot());
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn set_position(&self, update: PositionUpdate) {
        self.update(|status| {
            status.bar = update.bar;
            status.beat = update.beat;
            status.tempo = update.tempo;
        });
    }

    pub fn set_playing(&self, is_playing: bool) {
        self.update(|status| status.is_playing = is_playing);
    }

    pub fn reset(&self, status: PlaybackStatus) {
        self.update(|current| *current = status);
    }

    fn update(&self, apply: impl FnOnce(&mut PlaybackStatus)) {
        let status = {
            let mut current = self.current.write();
            let before = *current;
            apply(&mut current);
            if *current == before {
                return;
            }
            *current
        };
        self.subscribers.lock().retain(|tx| tx.send(status).is_ok());
    }
}
