//! Event records produced by the builders
//!
//! Builders write into a caller-owned [`EventList`] that is allocated once
//! with [`get_maximum_events_num`] slots and reused for every call. Each
//! call overwrites slots from the front and returns how many it used.

use std::fmt;

use bitflags::bitflags;

use crate::axis::{Atom, AxisInfo};
use crate::bitset::ValuatorMask;
use crate::device::DeviceId;
use crate::{MAX_BUTTONS, MAX_VALUATORS};

/// Maximum number of records a single builder call produces: one device
/// changed record, one raw record and one processed record.
pub const MAX_EVENTS: usize = 3;

/// Number of event-list slots every builder call requires. Never changes.
pub const fn get_maximum_events_num() -> usize {
    MAX_EVENTS
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EventType {
    KeyPress,
    KeyRelease,
    ButtonPress,
    ButtonRelease,
    #[default]
    Motion,
    ProximityIn,
    ProximityOut,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::KeyPress => "key-press",
            EventType::KeyRelease => "key-release",
            EventType::ButtonPress => "button-press",
            EventType::ButtonRelease => "button-release",
            EventType::Motion => "motion",
            EventType::ProximityIn => "proximity-in",
            EventType::ProximityOut => "proximity-out",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Why a device changed record was generated.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct DeviceChangeFlags: u32 {
        /// The master's active slave changed.
        const SLAVE_SWITCH = 0x2;
        /// Triggered by a pointer event.
        const POINTER_EVENT = 0x4;
        /// Triggered by a keyboard event.
        const KEYBOARD_EVENT = 0x8;
    }
}

/// Valuator payload of a processed record.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuatorData {
    pub mask: ValuatorMask,
    /// Set for valuators reported while the class is in absolute mode.
    pub mode: ValuatorMask,
    pub data: [i32; MAX_VALUATORS],
    /// Fractional part of each value, scaled by 2^32.
    pub data_frac: [i32; MAX_VALUATORS],
}

impl Default for ValuatorData {
    fn default() -> Self {
        Self {
            mask: ValuatorMask::new(),
            mode: ValuatorMask::new(),
            data: [0; MAX_VALUATORS],
            data_frac: [0; MAX_VALUATORS],
        }
    }
}

impl ValuatorData {
    /// `(axis, value)` for every masked valuator.
    pub fn values(&self) -> impl Iterator<Item = (usize, i32)> + '_ {
        self.mask.iter().map(move |i| (i, self.data[i]))
    }
}

/// A processed key, button, motion or proximity record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceEvent {
    pub event_type: EventType,
    pub time: u32,
    pub device_id: DeviceId,
    pub source_id: DeviceId,
    /// Key code or button number; zero for motion.
    pub detail: u32,
    /// Screen coordinates, for pointer records.
    pub root_x: i32,
    pub root_y: i32,
    pub root_x_frac: f64,
    pub root_y_frac: f64,
    pub valuators: ValuatorData,
}

impl DeviceEvent {
    pub fn new(device: DeviceId, event_type: EventType, time: u32) -> Self {
        Self {
            event_type,
            time,
            device_id: device,
            source_id: device,
            ..Default::default()
        }
    }

    /// Fill the valuator payload for axes `first..first + values.len()`.
    ///
    /// `remainder` is the device's per-axis fractional carry; `absolute`
    /// marks the values as absolute in the mode mask.
    pub fn set_valuators(&mut self, first: usize, values: &[i32], remainder: &[f64], absolute: bool) {
        let v = &mut self.valuators;
        for (i, value) in values.iter().enumerate() {
            let axis = first + i;
            v.mask.set(axis);
            if absolute {
                v.mode.set(axis);
            }
            // float to int casts saturate
            v.data_frac[axis] = (remainder.get(axis).copied().unwrap_or(0.0) * FRAC_SCALE) as i32;
            v.data[axis] = *value;
        }
    }
}

const FRAC_SCALE: f64 = 4_294_967_296.0;

/// Mirror of the driver sample that produced an event.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDeviceEvent {
    pub event_type: EventType,
    pub time: u32,
    pub device_id: DeviceId,
    pub source_id: DeviceId,
    pub detail: u32,
    pub mask: ValuatorMask,
    /// Values after motion was applied (absolute values for relative axes
    /// past x/y, clipped values for keyboards).
    pub data: [i32; MAX_VALUATORS],
    /// Values exactly as the driver passed them.
    pub data_raw: [i32; MAX_VALUATORS],
}

impl Default for RawDeviceEvent {
    fn default() -> Self {
        Self {
            event_type: EventType::default(),
            time: 0,
            device_id: DeviceId::default(),
            source_id: DeviceId::default(),
            detail: 0,
            mask: ValuatorMask::new(),
            data: [0; MAX_VALUATORS],
            data_raw: [0; MAX_VALUATORS],
        }
    }
}

impl RawDeviceEvent {
    pub fn new(device: DeviceId, event_type: EventType, time: u32, detail: u32) -> Self {
        Self {
            event_type,
            time,
            device_id: device,
            source_id: device,
            detail,
            ..Default::default()
        }
    }

    /// Mark `first..first + values.len()` and copy `values` into `data_raw`.
    pub fn set_raw_valuators(&mut self, first: usize, values: &[i32]) {
        if values.is_empty() {
            return;
        }
        self.mask.set_range(first, first + values.len());
        self.data_raw[first..first + values.len()].copy_from_slice(values);
    }

    /// Mark `first..first + values.len()` and copy `values` into `data`.
    pub fn set_valuators(&mut self, first: usize, values: &[i32]) {
        if values.is_empty() {
            return;
        }
        self.mask.set_range(first, first + values.len());
        self.data[first..first + values.len()].copy_from_slice(values);
    }
}

/// Capability snapshot of a slave that just became a master's active slave.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceChangedEvent {
    pub time: u32,
    /// The slave.
    pub device_id: DeviceId,
    pub master_id: DeviceId,
    pub source_id: DeviceId,
    pub flags: DeviceChangeFlags,
    pub num_buttons: usize,
    pub button_labels: [Atom; MAX_BUTTONS],
    pub num_valuators: usize,
    /// Axis ranges, with `mode` being the slave's valuator class mode.
    pub valuators: [AxisInfo; MAX_VALUATORS],
    pub min_keycode: u8,
    pub max_keycode: u8,
}

impl Default for DeviceChangedEvent {
    fn default() -> Self {
        Self {
            time: 0,
            device_id: DeviceId::default(),
            master_id: DeviceId::default(),
            source_id: DeviceId::default(),
            flags: DeviceChangeFlags::empty(),
            num_buttons: 0,
            button_labels: [Atom::NONE; MAX_BUTTONS],
            num_valuators: 0,
            valuators: [AxisInfo::default(); MAX_VALUATORS],
            min_keycode: 0,
            max_keycode: 0,
        }
    }
}

impl DeviceChangedEvent {
    pub fn button_labels(&self) -> &[Atom] {
        &self.button_labels[..self.num_buttons]
    }

    pub fn valuators(&self) -> &[AxisInfo] {
        &self.valuators[..self.num_valuators]
    }
}

/// One slot of an event list.
#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    DeviceChanged(DeviceChangedEvent),
    Raw(RawDeviceEvent),
    Device(DeviceEvent),
}

impl Default for InternalEvent {
    fn default() -> Self {
        InternalEvent::Device(DeviceEvent::default())
    }
}

impl InternalEvent {
    pub fn time(&self) -> u32 {
        match self {
            InternalEvent::DeviceChanged(e) => e.time,
            InternalEvent::Raw(e) => e.time,
            InternalEvent::Device(e) => e.time,
        }
    }

    pub fn as_device(&self) -> Option<&DeviceEvent> {
        match self {
            InternalEvent::Device(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawDeviceEvent> {
        match self {
            InternalEvent::Raw(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_device_changed(&self) -> Option<&DeviceChangedEvent> {
        match self {
            InternalEvent::DeviceChanged(e) => Some(e),
            _ => None,
        }
    }
}

/// Pre-allocated, reusable event storage.
#[derive(Debug, Clone)]
pub struct EventList {
    events: Vec<InternalEvent>,
}

impl EventList {
    /// Allocate `num_events` default records.
    pub fn new(num_events: usize) -> Self {
        Self {
            events: vec![InternalEvent::default(); num_events],
        }
    }

    /// A list large enough for any single builder call.
    pub fn with_maximum() -> Self {
        Self::new(get_maximum_events_num())
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    /// The buffer handed to builders, together with its capacity.
    pub fn slots_mut(&mut self) -> (&mut [InternalEvent], usize) {
        let capacity = self.events.len();
        (&mut self.events, capacity)
    }

    pub fn as_slice(&self) -> &[InternalEvent] {
        &self.events
    }

    /// The first `count` records, as returned by a builder.
    pub fn produced(&self, count: usize) -> &[InternalEvent] {
        &self.events[..count.min(self.events.len())]
    }
}

impl Default for EventList {
    fn default() -> Self {
        Self::with_maximum()
    }
}
