//! Per-device position and down-state tracking
//!
//! # Down-state phases
//!
//! A button or key goes through two independent acknowledgements: the event
//! builders mark it *posted* when they synthesize the press or release, and
//! the event-processing layer marks it *processed* once it has delivered
//! that event. Keeping both bits lets the keyboard builder detect driver
//! auto-repeat (a second press for a key that is already posted down) before
//! higher layers have caught up.
//!
//! ```text
//!            post_down            process_down
//!   ┌──────┐ ────────► ┌────────────┐ ────────► ┌───────────────┐
//!   │  Up  │           │ PostedDown │           │ ProcessedDown │
//!   └──────┘ ◄──────── └────────────┘           └───────┬───────┘
//!       ▲    process_up ┌──────────┐   post_up          │
//!       └────────────── │ PostedUp │ ◄──────────────────┘
//!                       └──────────┘
//! ```

use bitflags::bitflags;

use crate::bitset::CodeBits;
use crate::MAX_VALUATORS;

bitflags! {
    /// Which acknowledgement phase(s) a down-state query or update refers to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DownPhase: u8 {
        /// Set by the event builders when the event is synthesized.
        const POSTED = 1 << 0;
        /// Set by the processing layer when the event has been delivered.
        const PROCESSED = 1 << 1;
    }
}

/// Combined state of a single key or button across both phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    /// Neither phase considers the code down.
    Up,
    /// A press has been synthesized but not processed yet.
    PostedDown,
    /// The press has been synthesized and processed.
    ProcessedDown,
    /// A release has been synthesized, processing still sees it down.
    PostedUp,
}

/// Posted and processed down-bits for every button or key code.
#[derive(Debug, Clone, Default)]
pub struct DownState {
    posted: CodeBits,
    processed: CodeBits,
}

impl DownState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `code` down in the given phase(s).
    pub fn set_down(&mut self, code: usize, phase: DownPhase) {
        if phase.contains(DownPhase::POSTED) {
            self.posted.set(code);
        }
        if phase.contains(DownPhase::PROCESSED) {
            self.processed.set(code);
        }
    }

    /// Mark `code` up in the given phase(s).
    pub fn set_up(&mut self, code: usize, phase: DownPhase) {
        if phase.contains(DownPhase::POSTED) {
            self.posted.clear(code);
        }
        if phase.contains(DownPhase::PROCESSED) {
            self.processed.clear(code);
        }
    }

    /// True if `code` is down in any of the queried phases.
    pub fn is_down(&self, code: usize, phase: DownPhase) -> bool {
        (phase.contains(DownPhase::POSTED) && self.posted.test(code))
            || (phase.contains(DownPhase::PROCESSED) && self.processed.test(code))
    }

    pub fn phase(&self, code: usize) -> KeyPhase {
        match (self.posted.test(code), self.processed.test(code)) {
            (false, false) => KeyPhase::Up,
            (true, false) => KeyPhase::PostedDown,
            (true, true) => KeyPhase::ProcessedDown,
            (false, true) => KeyPhase::PostedUp,
        }
    }

    pub fn posted(&self) -> &CodeBits {
        &self.posted
    }

    pub fn processed(&self) -> &CodeBits {
        &self.processed
    }
}

/// Last known position of a device.
///
/// For slaves every entry is in absolute device coordinates. For masters
/// entries 0 and 1 are screen coordinates; higher entries are only
/// meaningful right after a device switch.
#[derive(Debug, Clone, PartialEq)]
pub struct LastPosition {
    pub valuators: [i32; MAX_VALUATORS],
    pub remainder: [f64; MAX_VALUATORS],
    pub num_valuators: usize,
}

impl Default for LastPosition {
    fn default() -> Self {
        Self {
            valuators: [0; MAX_VALUATORS],
            remainder: [0.0; MAX_VALUATORS],
            num_valuators: 0,
        }
    }
}
