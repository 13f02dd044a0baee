use std::time::{Duration, Instant};

use crate::controller::{FrameHandle, FrameScheduler};

/// Wall-clock frame scheduler driven by the shell's event loop.
///
/// At most one request is outstanding. It becomes due one frame period after
/// the previous frame fired, or immediately if none has fired yet.
pub struct FrameClock {
    period: Duration,
    next_id: u64,
    pending: Option<(FrameHandle, Instant)>,
    last_fired: Option<Instant>,
}

impl FrameClock {
    pub fn new(fps: u32) -> Self {
        Self {
            period: Duration::from_nanos(1_000_000_000 / u64::from(fps.max(1))),
            next_id: 0,
            pending: None,
            last_fired: None,
        }
    }

    /// Hand out the pending handle if its time has come.
    pub fn take_due(&mut self, now: Instant) -> Option<FrameHandle> {
        match self.pending {
            Some((handle, due)) if now >= due => {
                self.pending = None;
                self.last_fired = Some(now);
                Some(handle)
            }
            _ => None,
        }
    }

    /// How long the host may sleep before the pending frame is due.
    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.pending
            .map(|(_, due)| due.saturating_duration_since(now))
    }
}

impl FrameScheduler for FrameClock {
    fn request_frame(&mut self) -> FrameHandle {
        let handle = FrameHandle(self.next_id);
        self.next_id += 1;

        let due = match self.last_fired {
            Some(fired) => fired + self.period,
            None => Instant::now(),
        };
        self.pending = Some((handle, due));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if matches!(self.pending, Some((pending, _)) if pending == handle) {
            self.pending = None;
        }
    }
}
