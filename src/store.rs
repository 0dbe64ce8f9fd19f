//! Frame store and playback state for one cycle.
//!
//! Everything the pipeline shares — the rendered-frame window, the playback
//! cursor, pause/speed/seek state, cancellation and the user's track action —
//! lives behind a single mutex, with one condition variable carrying every
//! wakeup: frame readiness, room-available, cancellation and state changes.
//!
//! The store is bounded. The dispatcher may run at most [`AHEAD_CAPACITY`]
//! frames past the playback cursor, and the engine evicts frame bytes more
//! than one seek-window behind it. Prefix bookkeeping survives eviction, so
//! an evicted (or failed) frame reads back as `None` — a skipped paint — and
//! never stalls the contiguous high-water mark.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::{DEFAULT_SPEED_INDEX, SPEED_LADDER};

/// Upper bound on frames buffered ahead of the playback cursor.
pub const AHEAD_CAPACITY: u64 = 512;

/// Track-level action requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAction {
    Next,
    Prev,
    Quit,
}

/// How one playback cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Natural end with looping on; the same video plays again.
    Finished,
    Next,
    Prev,
    Quit,
}

impl From<TrackAction> for CycleOutcome {
    fn from(action: TrackAction) -> Self {
        match action {
            TrackAction::Next => Self::Next,
            TrackAction::Prev => Self::Prev,
            TrackAction::Quit => Self::Quit,
        }
    }
}

/// Snapshot of the fields the status line shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    /// Frame index the line describes (the one being displayed, or the cursor).
    pub frame: u64,
    /// 0 when the total is unknown.
    pub total: u64,
    pub speed: f64,
}

/// One playback-engine loop iteration, resolved under a single lock hold.
#[derive(Debug)]
pub enum Tick {
    Cancelled,
    /// Natural end of the video.
    Finished,
    /// The cursor's frame is not rendered yet.
    Buffering { frame: u64, total: u64 },
    Paused(StatusSnapshot),
    /// Display this frame. `bytes` is `None` for skipped or evicted frames.
    Frame {
        index: u64,
        bytes: Option<Arc<[u8]>>,
        status: StatusSnapshot,
    },
}

#[derive(Debug)]
struct CycleState {
    paused: bool,
    speed_index: usize,
    /// Next index to display; 1-based.
    current_frame: u64,
    /// Estimated frame count at the target rate; 0 when unknown.
    total_frames: u64,
    /// Sticky: set once the decoder process terminates.
    extraction_complete: bool,
    /// Set once the dispatcher stops enqueueing work.
    dispatch_complete: bool,
    /// Highest index handed to the converter pool.
    dispatched_up_to: u64,
    cancelled: bool,
    user_action: Option<TrackAction>,
    /// Largest N with frames 1..=N all rendered (possibly empty or evicted).
    last_rendered: u64,
    /// Rendered indices above the contiguous prefix.
    pending: BTreeSet<u64>,
    frames: BTreeMap<u64, Arc<[u8]>>,
}

#[derive(Debug)]
pub struct FrameStore {
    state: Mutex<CycleState>,
    ready: Condvar,
    /// Frames retained behind the cursor for cheap backward seeks.
    keep_behind: u64,
}

impl FrameStore {
    pub fn new(total_frames: u64, keep_behind: u64) -> Self {
        Self {
            state: Mutex::new(CycleState {
                paused: false,
                speed_index: DEFAULT_SPEED_INDEX,
                current_frame: 1,
                total_frames,
                extraction_complete: false,
                dispatch_complete: false,
                dispatched_up_to: 0,
                cancelled: false,
                user_action: None,
                last_rendered: 0,
                pending: BTreeSet::new(),
                frames: BTreeMap::new(),
            }),
            ready: Condvar::new(),
            keep_behind,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, CycleState>) -> MutexGuard<'a, CycleState> {
        self.ready
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, CycleState>,
        timeout: Duration,
    ) -> MutexGuard<'a, CycleState> {
        self.ready
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }

    // --- converter pool side ---------------------------------------------

    /// Stores a rendered frame. Entries are write-once per cycle; an empty
    /// buffer marks a failed render that playback will skip. Advances the
    /// contiguous prefix and wakes every waiter.
    pub fn put(&self, index: u64, bytes: Vec<u8>) {
        let mut s = self.lock();
        if index == 0 || index <= s.last_rendered || s.pending.contains(&index) {
            return;
        }
        if !bytes.is_empty() && index.saturating_add(self.keep_behind) >= s.current_frame {
            s.frames.insert(index, bytes.into());
        }
        s.pending.insert(index);
        while {
            let next = s.last_rendered + 1;
            s.pending.remove(&next)
        } {
            s.last_rendered += 1;
        }
        self.ready.notify_all();
    }

    /// Parks the dispatcher until the window has room for `index` or the
    /// cycle is cancelled. Returns false on cancellation.
    pub fn wait_room(&self, index: u64) -> bool {
        let mut s = self.lock();
        while !s.cancelled && index > s.current_frame.saturating_add(AHEAD_CAPACITY) {
            s = self.wait(s);
        }
        !s.cancelled
    }

    pub fn note_dispatched(&self, index: u64) {
        let mut s = self.lock();
        s.dispatched_up_to = s.dispatched_up_to.max(index);
    }

    pub fn mark_dispatch_complete(&self) {
        let mut s = self.lock();
        s.dispatch_complete = true;
        drop(s);
        self.ready.notify_all();
    }

    // --- decoder side -----------------------------------------------------

    pub fn mark_extraction_complete(&self) {
        let mut s = self.lock();
        s.extraction_complete = true;
        drop(s);
        self.ready.notify_all();
    }

    pub fn extraction_complete(&self) -> bool {
        self.lock().extraction_complete
    }

    // --- playback engine side --------------------------------------------

    /// Blocks briefly at cycle start so playback begins with either a frame
    /// in hand or the startup grace period spent.
    pub fn wait_first_frame(&self, grace: Duration) {
        let deadline = Instant::now() + grace;
        let mut s = self.lock();
        loop {
            if s.cancelled || s.last_rendered >= 1 || s.extraction_complete {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            s = self.wait_timeout(s, deadline - now);
        }
    }

    /// Resolves the next engine iteration under one lock hold. A `Frame`
    /// result consumes the cursor position: the cursor advances by one, old
    /// frame bytes are evicted and room-waiters are woken.
    pub fn next_tick(&self) -> Tick {
        let mut s = self.lock();
        if s.cancelled {
            return Tick::Cancelled;
        }
        if s.extraction_complete && s.total_frames > 0 && s.current_frame > s.total_frames {
            return Tick::Finished;
        }
        if pipeline_drained(&s) && s.current_frame > s.last_rendered {
            return Tick::Finished;
        }
        if s.last_rendered < s.current_frame {
            return Tick::Buffering {
                frame: s.current_frame,
                total: s.total_frames,
            };
        }
        if s.paused {
            let status = snapshot(&s, s.current_frame);
            return Tick::Paused(status);
        }

        let index = s.current_frame;
        let bytes = s.frames.get(&index).cloned();
        let status = snapshot(&s, index);
        s.current_frame += 1;
        let floor = s.current_frame.saturating_sub(self.keep_behind);
        s.frames = s.frames.split_off(&floor);
        drop(s);
        self.ready.notify_all();
        Tick::Frame {
            index,
            bytes,
            status,
        }
    }

    /// Parks until `index` is rendered, the cycle can be declared over, or
    /// cancellation. The caller re-evaluates with [`Self::next_tick`].
    pub fn wait_ready(&self, index: u64) {
        let mut s = self.lock();
        while !s.cancelled
            && s.last_rendered < index
            && !pipeline_drained(&s)
            && !(s.extraction_complete && s.total_frames > 0 && index > s.total_frames)
        {
            s = self.wait(s);
        }
    }

    /// Cancellable sleep on the shared condition. Returns false if the cycle
    /// was cancelled before the duration elapsed.
    pub fn sleep_cancellable(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.lock().cancelled;
        }
        let deadline = Instant::now() + duration;
        let mut s = self.lock();
        loop {
            if s.cancelled {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            s = self.wait_timeout(s, deadline - now);
        }
    }

    /// Post-playback wait: parks until the user picks a track action (or the
    /// cycle is cancelled outright, which reads as quit).
    pub fn wait_user_action(&self) -> CycleOutcome {
        let mut s = self.lock();
        loop {
            if let Some(action) = s.user_action {
                return action.into();
            }
            if s.cancelled {
                return CycleOutcome::Quit;
            }
            s = self.wait(s);
        }
    }

    /// The outcome of a cancelled cycle: whatever action the user requested,
    /// or quit by convention.
    pub fn take_outcome(&self) -> CycleOutcome {
        let s = self.lock();
        s.user_action.map(Into::into).unwrap_or(CycleOutcome::Quit)
    }

    // --- control plane ----------------------------------------------------

    pub fn cancel(&self) {
        let mut s = self.lock();
        s.cancelled = true;
        drop(s);
        self.ready.notify_all();
    }

    pub fn cancel_with_action(&self, action: TrackAction) {
        let mut s = self.lock();
        if s.user_action.is_none() {
            s.user_action = Some(action);
        }
        s.cancelled = true;
        drop(s);
        self.ready.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn toggle_pause(&self) {
        let mut s = self.lock();
        s.paused = !s.paused;
        drop(s);
        self.ready.notify_all();
    }

    pub fn speed_up(&self) {
        let mut s = self.lock();
        if s.speed_index + 1 < SPEED_LADDER.len() {
            s.speed_index += 1;
        }
        drop(s);
        self.ready.notify_all();
    }

    pub fn speed_down(&self) {
        let mut s = self.lock();
        if s.speed_index > 0 {
            s.speed_index -= 1;
        }
        drop(s);
        self.ready.notify_all();
    }

    /// Seek forward, clamped below the known total so the last frame still
    /// displays. With an unknown total the target stands and playback
    /// buffers until rendering catches up.
    pub fn seek_forward(&self, frames: u64) {
        let mut s = self.lock();
        s.current_frame = s.current_frame.saturating_add(frames);
        if s.total_frames > 0 {
            let max = s.total_frames.saturating_sub(1).max(1);
            s.current_frame = s.current_frame.min(max);
        }
        let floor = s.current_frame.saturating_sub(self.keep_behind);
        s.frames = s.frames.split_off(&floor);
        drop(s);
        self.ready.notify_all();
    }

    pub fn seek_backward(&self, frames: u64) {
        let mut s = self.lock();
        s.current_frame = s.current_frame.saturating_sub(frames).max(1);
        drop(s);
        self.ready.notify_all();
    }

    // --- observers --------------------------------------------------------

    pub fn current_frame(&self) -> u64 {
        self.lock().current_frame
    }

    pub fn total_frames(&self) -> u64 {
        self.lock().total_frames
    }

    pub fn last_rendered(&self) -> u64 {
        self.lock().last_rendered
    }

    pub fn speed_index(&self) -> usize {
        self.lock().speed_index
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    #[cfg(test)]
    fn stored_frame(&self, index: u64) -> Option<Arc<[u8]>> {
        self.lock().frames.get(&index).cloned()
    }
}

/// True once nothing further can ever be rendered: extraction ended, the
/// dispatcher stopped, and every dispatched frame reached the store.
fn pipeline_drained(s: &CycleState) -> bool {
    s.extraction_complete && s.dispatch_complete && s.last_rendered >= s.dispatched_up_to
}

fn snapshot(s: &CycleState, frame: u64) -> StatusSnapshot {
    StatusSnapshot {
        frame,
        total: s.total_frames,
        speed: SPEED_LADDER[s.speed_index],
    }
}
