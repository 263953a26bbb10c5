/// Target frame rate of the interpreter loop.
pub const FRAME_HZ: f32 = 60.0;

const FRAME_TIME_STEP: f32 = 1.0 / FRAME_HZ;

/// Upper bound on catch-up frames after a stall, to avoid a long redraw
/// pause turning into a burst of execution.
const MAX_PENDING_FRAMES: u32 = 4;

/// Converts wall-clock delta times into a 60 Hz frame schedule.
///
/// Frontends feed in elapsed seconds each redraw and run one
/// `run_frame` per frame returned.
pub struct FrameClock {
    accumulator: f32,
}

impl FrameClock {
    pub fn new() -> Self {
        Self { accumulator: 0.0 }
    }

    /// Advances the clock by `dt` seconds and returns how many frames are
    /// due.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.accumulator += dt;

        let mut due = 0;
        while self.accumulator >= FRAME_TIME_STEP {
            self.accumulator -= FRAME_TIME_STEP;
            due += 1;
        }

        if due > MAX_PENDING_FRAMES {
            self.accumulator = 0.0;
            due = MAX_PENDING_FRAMES;
        }

        due
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_partial_frames() {
        let mut clock = FrameClock::new();

        assert_eq!(clock.advance(0.01), 0);
        // 10ms + 10ms crosses the 16.6ms frame boundary once
        assert_eq!(clock.advance(0.01), 1);
        assert_eq!(clock.advance(0.0), 0);
    }

    #[test]
    fn caps_catch_up_after_a_stall() {
        let mut clock = FrameClock::new();

        assert_eq!(clock.advance(2.0), MAX_PENDING_FRAMES);
        // Stall backlog was dropped, not carried over
        assert_eq!(clock.advance(0.0), 0);
    }
}
