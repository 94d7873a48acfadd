use std::sync::{Mutex, MutexGuard};

use tokio::sync::watch;

use crate::domain::track::PlaybackState;
use crate::domain::view::{SessionPhase, ViewState};
use crate::services::fetcher::FetchOutcome;

#[derive(Debug, Default)]
struct Ledger {
    /// Sequence number of the most recently started fetch.
    issued: u64,
    /// Fetch whose loading window is currently shown.
    loading: Option<u64>,
    /// Sequence number of the fetch whose playback is currently shown.
    applied: u64,
    /// Highest sequence number whose fetch has finished, whatever its outcome.
    settled: u64,
    /// Value of `issued` when the view last became authenticated.
    connected_at: u64,
}

/// Owner of the `ViewState`. Every mutation goes through the ledger lock and a
/// single `send_if_modified`, so overlapping fetches are applied one at a time
/// and no-op updates are never broadcast.
pub struct ViewStore {
    tx: watch::Sender<ViewState>,
    ledger: Mutex<Ledger>,
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ViewState::default());
        Self {
            tx,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ViewState {
        self.tx.borrow().clone()
    }

    /// `Authenticating` until a fetch started after the last connect has
    /// finished; afterwards `Authenticated` for as long as a credential is held.
    pub fn phase(&self) -> SessionPhase {
        let ledger = self.ledger();
        if !self.tx.borrow().is_authenticated {
            SessionPhase::Unauthenticated
        } else if ledger.settled <= ledger.connected_at {
            SessionPhase::Authenticating
        } else {
            SessionPhase::Authenticated
        }
    }

    /// Opens a loading window for a new fetch. The window closes when the
    /// returned guard is dropped, on every exit path.
    pub fn begin_fetch(&self) -> LoadingGuard<'_> {
        let mut ledger = self.ledger();
        ledger.issued += 1;
        let seq = ledger.issued;
        ledger.loading = Some(seq);
        self.tx.send_if_modified(|view| !std::mem::replace(&mut view.is_loading, true));
        LoadingGuard { store: self, seq }
    }

    /// Applies a resolved outcome. Returns whether the playback changed.
    pub fn apply(&self, seq: u64, outcome: &FetchOutcome) -> bool {
        let playback = match outcome {
            FetchOutcome::Playing(track) => PlaybackState {
                track: Some(track.clone()),
                is_playing: true,
            },
            FetchOutcome::RecentlyPlayed(track) => PlaybackState {
                track: Some(track.clone()),
                is_playing: false,
            },
            FetchOutcome::Empty | FetchOutcome::Expired | FetchOutcome::TransientFailure => {
                return false;
            }
        };

        let mut ledger = self.ledger();
        if seq < ledger.applied {
            tracing::debug!(
                seq,
                applied = ledger.applied,
                "Discarding playback from superseded fetch"
            );
            return false;
        }
        ledger.applied = seq;
        self.tx.send_if_modified(|view| {
            if view.playback == playback {
                return false;
            }
            view.playback = playback;
            true
        })
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        let mut ledger = self.ledger();
        let changed = self.tx.send_if_modified(|view| {
            if view.is_authenticated == authenticated {
                return false;
            }
            view.is_authenticated = authenticated;
            true
        });
        if changed && authenticated {
            ledger.connected_at = ledger.issued;
        }
    }

    fn finish(&self, seq: u64) {
        let mut ledger = self.ledger();
        ledger.settled = ledger.settled.max(seq);
        if ledger.loading != Some(seq) {
            return;
        }
        ledger.loading = None;
        self.tx.send_if_modified(|view| std::mem::replace(&mut view.is_loading, false));
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Scoped loading window for one fetch invocation.
#[must_use]
pub struct LoadingGuard<'a> {
    store: &'a ViewStore,
    seq: u64,
}

impl LoadingGuard<'_> {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.finish(self.seq);
    }
}
