//! Observer callbacks registered by the presentation layer.
//!
//! Callbacks are cloned out of the registry and invoked after the engine has
//! released its state lock, on whichever thread caused the transition (a
//! control call or the progress monitor). They may call back into the engine's
//! accessors but should return quickly.
//!
//! Progress is the one notification sampled under the lock and delivered
//! after it. Teardown waits for an in-flight progress delivery before it
//! reports the new state, so a progress callback never lands after the
//! `Stopped` of its own session.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::catalog::Track;
use crate::error::PlayerError;

use super::types::TransportState;

pub type StateCallback = Arc<dyn Fn(TransportState) + Send + Sync>;
pub type TrackCallback = Arc<dyn Fn(&Track) + Send + Sync>;
pub type ProgressCallback = Arc<dyn Fn(Duration, Duration) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&PlayerError) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    state: Option<StateCallback>,
    track: Option<TrackCallback>,
    progress: Option<ProgressCallback>,
    error: Option<ErrorCallback>,
}

#[derive(Default)]
pub(super) struct Observers {
    callbacks: Mutex<Callbacks>,
    /// Thread currently inside the progress callback.
    delivering: Mutex<Option<ThreadId>>,
    delivered: Condvar,
}

impl Observers {
    fn with<R>(&self, f: impl FnOnce(&mut Callbacks) -> R) -> R {
        let mut callbacks = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut callbacks)
    }

    pub(super) fn set_state(&self, cb: StateCallback) {
        self.with(|c| c.state = Some(cb));
    }

    pub(super) fn set_track(&self, cb: TrackCallback) {
        self.with(|c| c.track = Some(cb));
    }

    pub(super) fn set_progress(&self, cb: ProgressCallback) {
        self.with(|c| c.progress = Some(cb));
    }

    pub(super) fn set_error(&self, cb: ErrorCallback) {
        self.with(|c| c.error = Some(cb));
    }

    pub(super) fn state_changed(&self, state: TransportState) {
        if let Some(cb) = self.with(|c| c.state.clone()) {
            cb(state);
        }
    }

    pub(super) fn track_changed(&self, track: &Track) {
        if let Some(cb) = self.with(|c| c.track.clone()) {
            cb(track);
        }
    }

    /// Reserve a progress delivery. Take it while the sample is still valid,
    /// i.e. under the engine lock.
    pub(super) fn claim_progress(&self) -> ProgressDelivery<'_> {
        *self.delivering.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(thread::current().id());
        ProgressDelivery { observers: self }
    }

    /// Block until no other thread is delivering progress.
    pub(super) fn wait_for_progress(&self) {
        let me = thread::current().id();
        let mut delivering = self.delivering.lock().unwrap_or_else(PoisonError::into_inner);
        while delivering.is_some_and(|id| id != me) {
            delivering = self
                .delivered
                .wait(delivering)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub(super) fn error(&self, error: &PlayerError) {
        if let Some(cb) = self.with(|c| c.error.clone()) {
            cb(error);
        }
    }
}

pub(super) struct ProgressDelivery<'a> {
    observers: &'a Observers,
}

impl ProgressDelivery<'_> {
    pub(super) fn send(self, position: Duration, duration: Duration) {
        if let Some(cb) = self.observers.with(|c| c.progress.clone()) {
            cb(position, duration);
        }
    }
}

impl Drop for ProgressDelivery<'_> {
    fn drop(&mut self) {
        *self
            .observers
            .delivering
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.observers.delivered.notify_all();
    }
}
