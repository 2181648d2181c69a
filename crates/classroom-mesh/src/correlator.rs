//! Side-channel bookkeeping that tags inbound streams with a semantic kind.
//!
//! Each session runs a small handshake over its side channel: the polite end
//! sends `{"kind":"ready"}` when the channel opens, the other end answers with
//! its own marker, and from then on both sides announce `{sid, kind}` for
//! every stream before the media track is added. Inbound tracks consume one
//! announcement for their stream; tracks that arrive first wait until the
//! announcement shows up or the deadline passes.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::connection::RemoteMediaTrack;
use crate::protocol::{CorrelationMessage, StreamKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// First marker from the remote side. `reply` is set when this side has
    /// not sent its own marker yet.
    BecameReady { reply: bool },
    AlreadyReady,
}

struct WaitingTrack<R> {
    track: R,
    deadline: Instant,
}

pub struct StreamCorrelator<R> {
    ready_sent: bool,
    ready: bool,
    timeout: Duration,
    pending: HashMap<String, VecDeque<StreamKind>>,
    waiting: Vec<WaitingTrack<R>>,
    /// Announcements still due for tracks that left the waiting list
    /// unclassified. Each one is discarded on arrival.
    owed: HashMap<String, usize>,
}

impl<R: RemoteMediaTrack> StreamCorrelator<R> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ready_sent: false,
            ready: false,
            timeout,
            pending: HashMap::new(),
            waiting: Vec::new(),
            owed: HashMap::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The side channel opened. Returns the marker to send, if this side is
    /// the one that opens the handshake.
    pub fn on_channel_open(&mut self, polite: bool) -> Option<CorrelationMessage> {
        if !polite || self.ready_sent {
            return None;
        }
        self.ready_sent = true;
        Some(CorrelationMessage::ready())
    }

    pub fn on_ready(&mut self) -> ReadyOutcome {
        if self.ready {
            return ReadyOutcome::AlreadyReady;
        }
        self.ready = true;
        let reply = !self.ready_sent;
        self.ready_sent = true;
        ReadyOutcome::BecameReady { reply }
    }

    /// Record a `{sid, kind}` announcement and release any tracks that were
    /// waiting for it.
    pub fn on_stream(&mut self, sid: String, kind: StreamKind) -> Vec<(R, StreamKind)> {
        if let Some(count) = self.owed.get_mut(&sid) {
            *count -= 1;
            if *count == 0 {
                self.owed.remove(&sid);
            }
            tracing::debug!(target = "mesh", sid = %sid, kind = %kind, "discarding late announcement");
            return Vec::new();
        }
        self.pending.entry(sid.clone()).or_default().push_back(kind);
        let mut released = Vec::new();
        let mut index = 0;
        while index < self.waiting.len() {
            if self.waiting[index].track.stream_id() != sid {
                index += 1;
                continue;
            }
            match self.take_pending(&sid) {
                Some(kind) => {
                    let waiting = self.waiting.remove(index);
                    released.push((waiting.track, kind));
                }
                None => break,
            }
        }
        released
    }

    /// Classify an inbound track. `None` means it is parked until its
    /// announcement arrives or [`expire`](Self::expire) releases it.
    pub fn classify(&mut self, track: R, now: Instant) -> Option<(R, StreamKind)> {
        let sid = track.stream_id();
        if let Some(kind) = self.take_pending(&sid) {
            return Some((track, kind));
        }
        self.waiting.push(WaitingTrack {
            track,
            deadline: now + self.timeout,
        });
        None
    }

    pub fn expire(&mut self, now: Instant) -> Vec<R> {
        let (expired, waiting): (Vec<_>, Vec<_>) = self
            .waiting
            .drain(..)
            .partition(|entry| entry.deadline <= now);
        self.waiting = waiting;
        expired
            .into_iter()
            .map(|entry| {
                self.owe(entry.track.stream_id());
                entry.track
            })
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.waiting.iter().map(|entry| entry.deadline).min()
    }

    /// Drop a parked track that ended before it was classified.
    pub fn forget(&mut self, track_id: &str) -> bool {
        let Some(index) = self
            .waiting
            .iter()
            .position(|entry| entry.track.id() == track_id)
        else {
            return false;
        };
        let entry = self.waiting.remove(index);
        self.owe(entry.track.stream_id());
        true
    }

    fn owe(&mut self, sid: String) {
        *self.owed.entry(sid).or_default() += 1;
    }

    fn take_pending(&mut self, sid: &str) -> Option<StreamKind> {
        let queue = self.pending.get_mut(sid)?;
        let kind = queue.pop_front();
        if queue.is_empty() {
            self.pending.remove(sid);
        }
        kind
    }
}
