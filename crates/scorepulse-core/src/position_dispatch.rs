use crate::status::StatusBoard;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use scorepulse_ports::playback::{PositionCallback, PositionUpdate};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// A position report due at `deadline`, valid only while `session` is the
/// engine's current session.
#[derive(Clone)]
pub struct PendingPosition {
    pub deadline: Instant,
    pub session: u64,
    pub update: PositionUpdate,
    pub callback: Option<PositionCallback>,
}

enum DispatchMsg {
    Arm(PendingPosition),
    Wake,
    Shutdown,
}

/// Sending side handed to scheduling threads.
#[derive(Clone)]
pub struct PositionSender {
    tx: Sender<DispatchMsg>,
}

impl PositionSender {
    pub fn arm(&self, pending: PendingPosition) -> bool {
        self.tx.send(DispatchMsg::Arm(pending)).is_ok()
    }
}

/// Single timer thread that fires position reports in deadline order.
///
/// Deadlines arrive already sorted per session, so a FIFO is enough. Every
/// report re-checks the session counter right before it fires; reports from
/// a stopped session are discarded instead of delivered.
pub struct PositionDispatcher {
    tx: Sender<DispatchMsg>,
    join: Option<JoinHandle<()>>,
}

impl PositionDispatcher {
    pub fn spawn(
        session: Arc<AtomicU64>,
        status: Arc<StatusBoard>,
    ) -> Result<Self, std::io::Error> {
        let (tx, rx) = unbounded();
        let join = thread::Builder::new()
            .name("scorepulse-position".to_string())
            .spawn(move || run(rx, session, status))?;
        Ok(Self {
            tx,
            join: Some(join),
        })
    }

    pub fn sender(&self) -> PositionSender {
        PositionSender {
            tx: self.tx.clone(),
        }
    }

    /// Makes the thread drop reports of superseded sessions now rather than
    /// at their deadlines.
    pub fn wake(&self) {
        let _ = self.tx.send(DispatchMsg::Wake);
    }
}

impl Drop for PositionDispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(DispatchMsg::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::warn!("position dispatcher thread panicked");
            }
        }
    }
}

fn run(rx: Receiver<DispatchMsg>, session: Arc<AtomicU64>, status: Arc<StatusBoard>) {
    let mut pending: VecDeque<PendingPosition> = VecDeque::new();
    let mut seen_session = session.load(Ordering::Acquire);

    loop {
        let current = session.load(Ordering::Acquire);
        if current != seen_session {
            pending.retain(|entry| entry.session == current);
            seen_session = current;
        }

        let msg = match pending.front() {
            None => match rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => return,
            },
            Some(next) => match rx.recv_deadline(next.deadline) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            },
        };

        match msg {
            Some(DispatchMsg::Arm(entry)) => {
                if entry.session == session.load(Ordering::Acquire) {
                    pending.push_back(entry);
                }
            }
            Some(DispatchMsg::Wake) | None => {}
            Some(DispatchMsg::Shutdown) => return,
        }

        fire_due(&mut pending, &session, &status);
    }
}

fn fire_due(pending: &mut VecDeque<PendingPosition>, session: &AtomicU64, status: &StatusBoard) {
    let now = Instant::now();
    while pending.front().is_some_and(|entry| entry.deadline <= now) {
        let Some(entry) = pending.pop_front() else {
            break;
        };
        if entry.session != session.load(Ordering::Acquire) {
            continue;
        }
        status.set_position(entry.update);
        if let Some(callback) = entry.callback.as_ref() {
            callback(entry.update);
        }
    }
}
