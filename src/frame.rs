//! Frame pacing.
//!
//! `delta_time` drives camera integration while `current_time` (time since
//! the scheduler started) drives particle animation; the two are tracked
//! separately so particle motion is a pure function of elapsed time.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;

/// Monotonic time source.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Clock that only moves when told to; sleeping advances it instantly.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub frame_index: u64,
    /// Seconds since the previous frame started; zero for the first frame.
    pub delta_time: f32,
    /// Seconds since the scheduler was created.
    pub current_time: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Init,
    Running,
    ShuttingDown,
}

/// Caps the frame rate at one frame per `loop_interval`.
#[derive(Debug)]
pub struct FrameScheduler<C: Clock> {
    clock: C,
    origin: Duration,
    loop_interval: Duration,
    state: SchedulerState,
    frame_start: Duration,
    last_frame_start: Option<Duration>,
    frame_index: u64,
}

impl<C: Clock> FrameScheduler<C> {
    pub fn new(clock: C, loop_interval: f32) -> Self {
        let origin = clock.now();
        Self {
            clock,
            origin,
            loop_interval: interval(loop_interval),
            state: SchedulerState::Init,
            frame_start: origin,
            last_frame_start: None,
            frame_index: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn loop_interval(&self) -> Duration {
        self.loop_interval
    }

    pub fn set_loop_interval(&mut self, seconds: f32) {
        self.loop_interval = interval(seconds);
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Marks the start of a frame and reports its timing.
    pub fn begin_frame(&mut self) -> FrameTiming {
        if self.state == SchedulerState::Init {
            self.state = SchedulerState::Running;
        }
        let start = self.clock.now();
        let delta = self
            .last_frame_start
            .map(|last| start.saturating_sub(last))
            .unwrap_or(Duration::ZERO);
        self.frame_start = start;
        self.last_frame_start = Some(start);
        let timing = FrameTiming {
            frame_index: self.frame_index,
            delta_time: delta.as_secs_f32(),
            current_time: start.saturating_sub(self.origin).as_secs_f32(),
        };
        self.frame_index += 1;
        timing
    }

    /// Blocks until `loop_interval` has passed since the frame started.
    ///
    /// Returns how long the scheduler slept. Sub-millisecond precision is not
    /// guaranteed by the platform sleep.
    pub fn finish_frame(&mut self) -> Duration {
        let elapsed = self.clock.now().saturating_sub(self.frame_start);
        match self.loop_interval.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => {
                self.clock.sleep(remaining);
                remaining
            }
            _ => {
                if elapsed > self.loop_interval {
                    debug!(
                        "frame {} overran the loop interval by {:?}",
                        self.frame_index.saturating_sub(1),
                        elapsed - self.loop_interval
                    );
                }
                Duration::ZERO
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.state = SchedulerState::ShuttingDown;
    }
}

/// Negative, NaN and out-of-range intervals disable pacing.
fn interval(seconds: f32) -> Duration {
    Duration::try_from_secs_f32(seconds.max(0.0)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_zero_delta() {
        let mut scheduler = FrameScheduler::new(ManualClock::new(), 0.02);
        assert_eq!(scheduler.state(), SchedulerState::Init);
        let timing = scheduler.begin_frame();
        assert_eq!(scheduler.state(), SchedulerState::Running);
        assert_eq!(timing.frame_index, 0);
        assert_eq!(timing.delta_time, 0.0);
        assert_eq!(timing.current_time, 0.0);
    }

    #[test]
    fn pads_short_frames_to_the_interval() {
        let mut scheduler = FrameScheduler::new(ManualClock::new(), 0.02);
        scheduler.begin_frame();
        scheduler.clock_mut().advance(Duration::from_millis(5));
        let slept = scheduler.finish_frame();
        assert!((slept.as_secs_f32() - 0.015).abs() < 1e-6);

        let timing = scheduler.begin_frame();
        assert!((timing.delta_time - 0.02).abs() < 1e-6);
        assert!((timing.current_time - 0.02).abs() < 1e-6);
    }

    #[test]
    fn long_frames_are_not_padded() {
        let mut scheduler = FrameScheduler::new(ManualClock::new(), 0.02);
        scheduler.begin_frame();
        scheduler.clock_mut().advance(Duration::from_millis(50));
        assert_eq!(scheduler.finish_frame(), Duration::ZERO);
        let timing = scheduler.begin_frame();
        assert!((timing.delta_time - 0.05).abs() < 1e-6);
    }

    #[test]
    fn current_time_is_absolute_while_delta_is_relative() {
        let mut clock = ManualClock::new();
        clock.advance(Duration::from_secs(3));
        let mut scheduler = FrameScheduler::new(clock, 0.0);
        scheduler.begin_frame();
        scheduler.clock_mut().advance(Duration::from_secs(2));
        let timing = scheduler.begin_frame();
        assert!((timing.delta_time - 2.0).abs() < 1e-6);
        assert!((timing.current_time - 2.0).abs() < 1e-6);
        scheduler.shutdown();
        assert_eq!(scheduler.state(), SchedulerState::ShuttingDown);
    }

    #[test]
    fn non_finite_interval_disables_pacing() {
        for seconds in [f32::INFINITY, f32::NAN, -1.0] {
            let mut scheduler = FrameScheduler::new(ManualClock::new(), seconds);
            assert_eq!(scheduler.loop_interval(), Duration::ZERO);
            scheduler.begin_frame();
            assert_eq!(scheduler.finish_frame(), Duration::ZERO);
        }
        let mut scheduler = FrameScheduler::new(ManualClock::new(), 0.02);
        scheduler.set_loop_interval(f32::INFINITY);
        assert_eq!(scheduler.loop_interval(), Duration::ZERO);
    }
}
