//! Capture loop state: frame pacing and the streaming on/off flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Detector passes per second, independent of the display refresh rate.
pub const DEFAULT_PROCESSING_FPS: u32 = 10;

/// State owned by the capture loop between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureState {
    /// When the last frame was dispatched to the extractor.
    pub last_processed_at: Option<Instant>,
    pub is_streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Ready,
    Wait(Duration),
}

/// Rate limiter for detector passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePacer {
    interval: Duration,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs(1) / fps.max(1))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn check(&self, state: &CaptureState, now: Instant) -> Pace {
        let Some(last) = state.last_processed_at else {
            return Pace::Ready;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.interval {
            Pace::Wait(self.interval - elapsed)
        } else {
            Pace::Ready
        }
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::from_fps(DEFAULT_PROCESSING_FPS)
    }
}

/// Identifies the streaming session a detector pass was dispatched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamToken(u64);

/// Streaming switch shared between the handle and the capture thread.
///
/// Every stop bumps the generation, so a pass dispatched before the stop can
/// tell its result is stale even if streaming was switched on again since.
#[derive(Debug, Default)]
pub struct StreamFlag {
    streaming: AtomicBool,
    generation: AtomicU64,
}

impl StreamFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> StreamToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.streaming.store(true, Ordering::SeqCst);
        StreamToken(generation)
    }

    pub fn stop(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> StreamToken {
        StreamToken(self.generation.load(Ordering::SeqCst))
    }

    /// True if streaming is on and nothing has toggled it since `token`.
    pub fn is_current(&self, token: StreamToken) -> bool {
        self.is_streaming() && self.generation.load(Ordering::SeqCst) == token.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_first_frame_ready() {
        let pacer = FramePacer::default();
        assert_eq!(pacer.interval(), Duration::from_millis(100));
        assert_eq!(pacer.check(&CaptureState::default(), Instant::now()), Pace::Ready);
    }

    #[test]
    fn test_pacer_waits_out_interval() {
        let pacer = FramePacer::from_fps(10);
        let t0 = Instant::now();
        let state = CaptureState {
            last_processed_at: Some(t0),
            is_streaming: true,
        };
        assert_eq!(
            pacer.check(&state, t0 + Duration::from_millis(40)),
            Pace::Wait(Duration::from_millis(60))
        );
        assert_eq!(pacer.check(&state, t0 + Duration::from_millis(100)), Pace::Ready);
        assert_eq!(pacer.check(&state, t0 + Duration::from_millis(250)), Pace::Ready);
    }

    #[test]
    fn test_pacer_zero_fps_does_not_divide_by_zero() {
        assert_eq!(FramePacer::from_fps(0).interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_flag_start_stop() {
        let flag = StreamFlag::new();
        assert!(!flag.is_streaming());

        let token = flag.start();
        assert!(flag.is_streaming());
        assert!(flag.is_current(token));
        assert_eq!(flag.token(), token);

        flag.stop();
        assert!(!flag.is_streaming());
        assert!(!flag.is_current(token));
    }

    #[test]
    fn test_token_stale_after_restart() {
        let flag = StreamFlag::new();
        let first = flag.start();
        flag.stop();
        let second = flag.start();
        assert!(!flag.is_current(first));
        assert!(flag.is_current(second));
    }
}
