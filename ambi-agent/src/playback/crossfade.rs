//! Gain ramp for ducking and restoring the ambient stream
//!
//! A fade always starts from the gain the stream is *currently* at, and its
//! length is proportional to the distance left to travel:
//!
//! - fade-in:  `frames_total = round((1 - gain) * max_fade_frames)`
//! - fade-out: `frames_total = round(gain * max_fade_frames)`
//!
//! both clamped to at least one frame. Reversing direction mid-fade therefore
//! continues from the exact current gain and takes proportionally less time,
//! so there is never a step in the output level.
//!
//! Each call to [`Crossfader::apply`] advances one frame. The last frame of a
//! fade lands exactly on 1.0 or 0.0.

use crate::audio::types::apply_gain;

/// Direction of the active fade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    None,
    FadeIn,
    FadeOut,
}

impl FadeDirection {
    fn target(self) -> Option<f32> {
        match self {
            FadeDirection::None => None,
            FadeDirection::FadeIn => Some(1.0),
            FadeDirection::FadeOut => Some(0.0),
        }
    }
}

/// Snapshot of the fade state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeState {
    pub direction: FadeDirection,
    pub frames_remaining: u32,
    pub frames_total: u32,
    pub current_gain: f32,
}

/// Result of advancing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeStep {
    /// No fade active; static gain applied
    Steady,
    /// Fade in progress
    Fading,
    /// This frame completed a fade-in (gain is exactly 1.0)
    FadeInComplete,
    /// This frame completed a fade-out (gain is exactly 0.0); the
    /// publisher has nothing left to emit
    FadeOutComplete,
}

/// Frames needed to fade from `gain` in `direction`, never less than one.
///
/// Returns 0 for `FadeDirection::None`.
pub fn frames_total_for(direction: FadeDirection, gain: f32, max_fade_frames: u32) -> u32 {
    let distance = match direction {
        FadeDirection::None => return 0,
        FadeDirection::FadeIn => 1.0 - gain.clamp(0.0, 1.0),
        FadeDirection::FadeOut => gain.clamp(0.0, 1.0),
    };
    let frames = (distance as f64 * max_fade_frames as f64).round() as u32;
    frames.max(1)
}

/// Per-frame gain state machine
#[derive(Debug, Clone)]
pub struct Crossfader {
    state: CrossfadeState,
    start_gain: f32,
    max_fade_frames: u32,
}

impl Crossfader {
    /// New crossfader at full gain with no fade active
    pub fn new(max_fade_frames: u32) -> Self {
        Self::with_gain(max_fade_frames, 1.0)
    }

    pub fn with_gain(max_fade_frames: u32, gain: f32) -> Self {
        let gain = gain.clamp(0.0, 1.0);
        Self {
            state: CrossfadeState {
                direction: FadeDirection::None,
                frames_remaining: 0,
                frames_total: 0,
                current_gain: gain,
            },
            start_gain: gain,
            max_fade_frames: max_fade_frames.max(1),
        }
    }

    /// Begin a fade from the current gain.
    ///
    /// `FadeDirection::None` cancels any fade and holds the current gain.
    pub fn start_fade(&mut self, direction: FadeDirection) {
        let total = frames_total_for(direction, self.state.current_gain, self.max_fade_frames);
        self.start_gain = self.state.current_gain;
        self.state.direction = direction;
        self.state.frames_total = total;
        self.state.frames_remaining = total;
    }

    /// Jump to a static gain, cancelling any fade
    pub fn set_gain(&mut self, gain: f32) {
        let gain = gain.clamp(0.0, 1.0);
        self.state = CrossfadeState {
            direction: FadeDirection::None,
            frames_remaining: 0,
            frames_total: 0,
            current_gain: gain,
        };
        self.start_gain = gain;
    }

    /// Advance one frame and return the gain for that frame
    pub fn next_gain(&mut self) -> (f32, FadeStep) {
        let Some(target) = self.state.direction.target() else {
            return (self.state.current_gain, FadeStep::Steady);
        };

        self.state.frames_remaining = self.state.frames_remaining.saturating_sub(1);

        if self.state.frames_remaining == 0 {
            let finished = self.state.direction;
            self.state.current_gain = target;
            self.state.direction = FadeDirection::None;
            self.state.frames_total = 0;
            self.start_gain = target;
            let step = match finished {
                FadeDirection::FadeOut => FadeStep::FadeOutComplete,
                _ => FadeStep::FadeInComplete,
            };
            return (target, step);
        }

        let progress =
            1.0 - self.state.frames_remaining as f32 / self.state.frames_total as f32;
        let gain = self.start_gain + (target - self.start_gain) * progress;
        self.state.current_gain = gain.clamp(0.0, 1.0);
        (self.state.current_gain, FadeStep::Fading)
    }

    /// Advance one frame and scale `samples` by that frame's gain
    pub fn apply(&mut self, samples: &mut [i16]) -> FadeStep {
        let (gain, step) = self.next_gain();
        apply_gain(samples, gain);
        step
    }

    pub fn state(&self) -> CrossfadeState {
        self.state
    }

    pub fn gain(&self) -> f32 {
        self.state.current_gain
    }

    pub fn direction(&self) -> FadeDirection {
        self.state.direction
    }

    pub fn is_fading(&self) -> bool {
        self.state.direction != FadeDirection::None
    }

    /// Fully muted with nothing scheduled to bring it back
    pub fn is_silent(&self) -> bool {
        !self.is_fading() && self.state.current_gain <= 0.0
    }

    pub fn max_fade_frames(&self) -> u32 {
        self.max_fade_frames
    }
}
