//! Device event synthesis for multi-pointer input.
//!
//! Drivers hand raw samples (axis values, button and key transitions) to
//! the builders on [`InputContext`], which validate them, reconcile the
//! sending slave with its master, update positions and motion history, and
//! write typed records into a caller-owned [`EventList`].

pub mod accel;
pub mod axis;
pub mod bitset;
pub mod clock;
pub mod context;
pub mod device;
pub mod error;
pub mod event;
pub mod history;
pub mod motion;
pub mod reconcile;
pub mod screen;
pub mod state;

/// Maximum number of axes per device.
pub const MAX_VALUATORS: usize = 36;
/// Button numbers and labels per device.
pub const MAX_BUTTONS: usize = 256;
/// Device ids are below this.
pub const MAX_DEVICES: usize = 256;
pub const MIN_KEYCODE: u32 = 8;
pub const MAX_KEYCODE: u32 = 255;

pub use accel::{Accelerator, ThresholdAccel};
pub use axis::{rescale, transform_absolute, Atom, AxisInfo, AxisMode, Transform};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use context::{InputContext, PointerFlags};
pub use device::{
    Device, DeviceArena, DeviceId, DeviceRole, KeyboardFeedback, Keymap, MasterKind,
};
pub use error::{DeviceError, HistoryError, SynthError};
pub use event::{
    get_maximum_events_num, DeviceChangeFlags, DeviceChangedEvent, DeviceEvent, EventList,
    EventType, InternalEvent, RawDeviceEvent, MAX_EVENTS,
};
pub use history::{get_motion_history_size, MotionHistory, QueryMode, MOTION_HISTORY_SIZE};
pub use screen::{Screen, ScreenGeometry, ScreenLayout};
pub use state::DownPhase;
