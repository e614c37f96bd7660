//! Error types for event synthesis

use thiserror::Error;

use crate::device::DeviceId;
use crate::event::EventType;

/// Reasons an event builder refuses a sample.
///
/// A rejected call never writes to the event list and never mutates device
/// state; the infallible builders report it as zero events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    #[error("device {0} is not registered")]
    UnknownDevice(DeviceId),

    #[error("device {0} is disabled")]
    DeviceDisabled(DeviceId),

    #[error("event list holds {len} slots, at least {required} are needed")]
    EventListTooSmall { len: usize, required: usize },

    #[error("device {device} has no {class} class")]
    MissingClass {
        device: DeviceId,
        class: &'static str,
    },

    #[error("{num} valuators starting at {first} exceed the {axes} axes of the device")]
    ValuatorRange { first: usize, num: usize, axes: usize },

    #[error("{event:?} cannot be generated by the {builder} builder")]
    WrongEventType {
        event: EventType,
        builder: &'static str,
    },

    #[error("key code {0} outside of 8..=255")]
    KeyCodeOutOfRange(u32),

    #[error("button events need a button number between 1 and 255, got {0}")]
    InvalidButton(u32),

    #[error("motion events need at least one valuator")]
    NoValuators,

    #[error("device {0} has no screen")]
    NoScreen(DeviceId),

    #[error("repeat of key {0} suppressed")]
    RepeatSuppressed(u32),
}

/// Motion history buffer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("failed to allocate motion history ({bytes} bytes)")]
    AllocationFailed { bytes: usize },
}

/// Device registration and attachment failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device id {0} is outside of 0..256")]
    IdOutOfRange(DeviceId),

    #[error("device id {0} is already registered")]
    DuplicateId(DeviceId),

    #[error("device {0} is not registered")]
    UnknownDevice(DeviceId),

    #[error("device {0} is not a master device")]
    NotAMaster(DeviceId),

    #[error("device {0} is not a slave device")]
    NotASlave(DeviceId),
}
