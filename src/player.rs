//! State model for the watch-page media controls. The browser wiring in
//! `assets/js/player.js` mirrors this exactly; keeping the transitions here
//! makes them testable without a DOM.

/// Control state for a media element: play/pause, mute, and the volume
/// slider, including the last non-zero volume restored after unmuting.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaControls {
    paused: bool,
    muted: bool,
    volume: f32,
    last_volume: f32,
}

pub const DEFAULT_VOLUME: f32 = 0.5;

impl Default for MediaControls {
    fn default() -> Self {
        Self {
            paused: true,
            muted: false,
            volume: DEFAULT_VOLUME,
            last_volume: DEFAULT_VOLUME,
        }
    }
}

impl MediaControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// What the volume slider should display: zero while muted, otherwise
    /// the actual volume.
    pub fn slider_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    /// Flip between playing and paused. Returns true when now playing.
    pub fn toggle_play(&mut self) -> bool {
        self.paused = !self.paused;
        !self.paused
    }

    /// Flip mute. Unmuting restores the last non-zero volume.
    pub fn toggle_mute(&mut self) {
        if self.muted {
            self.muted = false;
            self.volume = self.last_volume;
        } else {
            self.muted = true;
        }
    }

    /// Slider input: un-mutes, and non-zero values become the restore point.
    pub fn set_volume(&mut self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.muted = false;
        self.volume = value;
        if value > 0.0 {
            self.last_volume = value;
        }
    }
}

/// Format a second count as `mm:ss`. Durations of an hour or more keep
/// accumulating minutes rather than rolling over.
pub fn format_time(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}", minutes, seconds)
}
