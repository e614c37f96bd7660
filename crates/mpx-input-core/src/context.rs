//! Event builders
//!
//! [`InputContext`] owns the device arena together with the screen and
//! clock collaborators, and turns driver samples into event records.
//!
//! Every builder comes in two forms: `try_*` reports why a sample was
//! rejected, the plain form returns 0 instead. A rejected call never writes
//! to the event list and never touches device state.

use bitflags::bitflags;

use crate::axis::{rescale, transform_absolute, AxisInfo, AxisMode};
use crate::clock::{Clock, MonotonicClock};
use crate::device::{Device, DeviceArena, DeviceId, MasterKind};
use crate::error::SynthError;
use crate::event::{
    get_maximum_events_num, DeviceChangeFlags, DeviceEvent, EventType, InternalEvent,
    RawDeviceEvent,
};
use crate::history::{MotionHistory, QueryMode};
use crate::motion::{
    accel_pointer, clip_valuators, move_absolute, move_relative, position_sprite, update_history,
    x_index, y_index,
};
use crate::reconcile::update_from_master;
use crate::screen::{Screen, ScreenGeometry, ScreenLayout};
use crate::state::DownPhase;
use crate::{MAX_BUTTONS, MAX_KEYCODE, MAX_VALUATORS, MIN_KEYCODE};

bitflags! {
    /// How the valuators of a pointer sample are to be interpreted.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct PointerFlags: u32 {
        const RELATIVE = 1 << 1;
        const ABSOLUTE = 1 << 2;
        /// Run relative deltas through the device's accelerator.
        const ACCELERATE = 1 << 3;
        /// Absolute x/y are in screen coordinates.
        const SCREEN = 1 << 4;
    }
}

/// Device arena plus the collaborators the builders need.
#[derive(Debug)]
pub struct InputContext<S = ScreenLayout, C = MonotonicClock> {
    devices: DeviceArena,
    screens: S,
    clock: C,
}

impl<S: ScreenGeometry, C: Clock> InputContext<S, C> {
    pub fn new(devices: DeviceArena, screens: S, clock: C) -> Self {
        Self {
            devices,
            screens,
            clock,
        }
    }

    pub fn devices(&self) -> &DeviceArena {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceArena {
        &mut self.devices
    }

    pub fn screens(&self) -> &S {
        &self.screens
    }

    pub fn screens_mut(&mut self) -> &mut S {
        &mut self.screens
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn enabled_device(&self, dev: DeviceId) -> Result<&Device, SynthError> {
        let device = self.devices.get(dev).ok_or(SynthError::UnknownDevice(dev))?;
        if !device.enabled {
            return Err(SynthError::DeviceDisabled(dev));
        }
        Ok(device)
    }

    fn current_screen(&self, dev: DeviceId) -> Option<Screen> {
        self.screens.current_screen(self.devices.sprite_owner(dev))
    }

    fn check_event_list(events: &[InternalEvent]) -> Result<(), SynthError> {
        let required = get_maximum_events_num();
        if events.len() < required {
            return Err(SynthError::EventListTooSmall {
                len: events.len(),
                required,
            });
        }
        Ok(())
    }

    fn check_valuator_range(device: &Device, first: usize, num: usize) -> Result<(), SynthError> {
        let axes = device.num_axes();
        let out_of_range = first.checked_add(num).map_or(true, |end| end > axes);
        if num > MAX_VALUATORS || out_of_range {
            return Err(SynthError::ValuatorRange { first, num, axes });
        }
        Ok(())
    }

    /// Build the records for a pointer motion or button sample.
    ///
    /// `valuators` holds axes `first..first + valuators.len()`. Produces an
    /// optional device changed record, a raw record and the processed
    /// record, and returns how many slots were used.
    #[allow(clippy::too_many_arguments)]
    pub fn try_get_pointer_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        button: u32,
        flags: PointerFlags,
        first: usize,
        valuators: &[i32],
    ) -> Result<usize, SynthError> {
        self.pointer_events(events, dev, event_type, button, flags, first, valuators)
            .map_err(|e| {
                tracing::debug!("dropping {} from device {}: {}", event_type, dev, e);
                e
            })
    }

    /// [`InputContext::try_get_pointer_events`], returning 0 on rejection.
    #[allow(clippy::too_many_arguments)]
    pub fn get_pointer_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        button: u32,
        flags: PointerFlags,
        first: usize,
        valuators: &[i32],
    ) -> usize {
        self.try_get_pointer_events(events, dev, event_type, button, flags, first, valuators)
            .unwrap_or(0)
    }

    #[allow(clippy::too_many_arguments)]
    fn pointer_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        button: u32,
        flags: PointerFlags,
        first: usize,
        valuators_in: &[i32],
    ) -> Result<usize, SynthError> {
        let device = self.enabled_device(dev)?;
        // sampled before the position update
        let time = self.clock.now_ms();

        let screen = self.current_screen(dev).ok_or(SynthError::NoScreen(dev))?;
        if device.valuator.is_none() {
            return Err(SynthError::MissingClass {
                device: dev,
                class: "valuator",
            });
        }
        let num = valuators_in.len();
        Self::check_valuator_range(device, first, num)?;
        match event_type {
            EventType::Motion => {
                if num == 0 {
                    return Err(SynthError::NoValuators);
                }
            }
            EventType::ButtonPress | EventType::ButtonRelease => {
                if device.button.is_none() {
                    return Err(SynthError::MissingClass {
                        device: dev,
                        class: "button",
                    });
                }
                if button == 0 || button as usize >= MAX_BUTTONS {
                    return Err(SynthError::InvalidButton(button));
                }
            }
            _ => {
                return Err(SynthError::WrongEventType {
                    event: event_type,
                    builder: "pointer",
                })
            }
        }
        Self::check_event_list(events)?;

        let mut slot = update_from_master(
            &mut self.devices,
            &self.screens,
            dev,
            DeviceChangeFlags::POINTER_EVENT,
            time,
            &mut events[0],
        );

        let detail = if event_type == EventType::Motion { 0 } else { button };
        let mut raw = RawDeviceEvent::new(dev, event_type, time, detail);
        raw.set_raw_valuators(first, valuators_in);

        let mut buffer = [0i32; MAX_VALUATORS];
        let valuators = &mut buffer[..num];
        valuators.copy_from_slice(valuators_in);

        let attached = self.devices.get_master(dev, MasterKind::Pointer).is_some();
        let device = self
            .devices
            .get_mut(dev)
            .ok_or(SynthError::UnknownDevice(dev))?;

        let x_index = x_index(first, num);
        let y_index = y_index(first, num);

        let (mut x_frac, mut y_frac) = (0.0, 0.0);
        let (x, y) = if flags.contains(PointerFlags::ABSOLUTE) {
            if flags.contains(PointerFlags::SCREEN) {
                if let Some(i) = x_index {
                    (valuators[i], x_frac) =
                        rescale(valuators[i], 0.0, None, device.axis(0), screen.width);
                }
                if let Some(i) = y_index {
                    (valuators[i], y_frac) =
                        rescale(valuators[i], 0.0, None, device.axis(1), screen.height);
                }
            }
            if let (Some(i), Some(_)) = (x_index, y_index) {
                transform_absolute(&device.transform, &mut valuators[i..i + 2]);
            }
            move_absolute(device, first, valuators)
        } else {
            if flags.contains(PointerFlags::ACCELERATE) {
                accel_pointer(device, first, valuators, time);
                x_frac = device.last.remainder[0];
                y_frac = device.last.remainder[1];
            }
            move_relative(device, attached, first, valuators)
        };

        raw.set_valuators(first, valuators);

        let pos = position_sprite(
            &mut self.devices,
            &mut self.screens,
            dev,
            x,
            y,
            x_frac,
            y_frac,
            screen,
        )
        .ok_or(SynthError::UnknownDevice(dev))?;
        update_history(&mut self.devices, dev, first, num, time);

        if let Some(i) = x_index {
            valuators[i] = pos.x;
        }
        if let Some(i) = y_index {
            valuators[i] = pos.y;
        }

        let device = self
            .devices
            .get_mut(dev)
            .ok_or(SynthError::UnknownDevice(dev))?;
        clip_valuators(device, first, valuators);

        let mut event = DeviceEvent::new(dev, event_type, time);
        match event_type {
            EventType::ButtonPress => device.set_button_down(button, DownPhase::POSTED),
            EventType::ButtonRelease => device.set_button_up(button, DownPhase::POSTED),
            _ => {}
        }
        event.detail = detail;
        event.root_x = pos.screen_x;
        event.root_y = pos.screen_y;
        event.root_x_frac = pos.screen_x_frac;
        event.root_y_frac = pos.screen_y_frac;
        event.set_valuators(
            first,
            valuators,
            &device.last.remainder,
            device.valuator_mode() == AxisMode::Absolute,
        );

        events[slot] = InternalEvent::Raw(raw);
        events[slot + 1] = InternalEvent::Device(event);
        slot += 2;

        tracing::trace!(
            "device {}: {} at {},{} ({} records)",
            dev,
            event_type,
            pos.screen_x,
            pos.screen_y,
            slot
        );
        Ok(slot)
    }

    /// [`InputContext::get_keyboard_valuator_events`] without valuators.
    pub fn get_keyboard_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        key_code: u32,
    ) -> usize {
        self.get_keyboard_valuator_events(events, dev, event_type, key_code, 0, &[])
    }

    pub fn try_get_keyboard_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        key_code: u32,
    ) -> Result<usize, SynthError> {
        self.try_get_keyboard_valuator_events(events, dev, event_type, key_code, 0, &[])
    }

    /// [`InputContext::try_get_keyboard_valuator_events`], returning 0 on
    /// rejection.
    pub fn get_keyboard_valuator_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        key_code: u32,
        first: usize,
        valuators: &[i32],
    ) -> usize {
        self.try_get_keyboard_valuator_events(events, dev, event_type, key_code, first, valuators)
            .unwrap_or(0)
    }

    /// Build the records for a key press or release, optionally carrying
    /// valuators.
    ///
    /// A press for a key that is already posted down is a driver repeat. It
    /// is only let through when auto-repeat is on for the device and for the
    /// key, and the key is not a modifier.
    pub fn try_get_keyboard_valuator_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        key_code: u32,
        first: usize,
        valuators: &[i32],
    ) -> Result<usize, SynthError> {
        self.keyboard_events(events, dev, event_type, key_code, first, valuators)
            .map_err(|e| {
                tracing::debug!("dropping {} from device {}: {}", event_type, dev, e);
                e
            })
    }

    fn keyboard_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        key_code: u32,
        first: usize,
        valuators_in: &[i32],
    ) -> Result<usize, SynthError> {
        let device = self.enabled_device(dev)?;

        let Some(key) = device.key.as_ref() else {
            return Err(SynthError::MissingClass {
                device: dev,
                class: "key",
            });
        };
        let Some(feedback) = device.kbd_feedback.as_ref() else {
            return Err(SynthError::MissingClass {
                device: dev,
                class: "keyboard feedback",
            });
        };
        if !matches!(event_type, EventType::KeyPress | EventType::KeyRelease) {
            return Err(SynthError::WrongEventType {
                event: event_type,
                builder: "keyboard",
            });
        }
        if !(MIN_KEYCODE..=MAX_KEYCODE).contains(&key_code) {
            return Err(SynthError::KeyCodeOutOfRange(key_code));
        }
        let num = valuators_in.len();
        Self::check_valuator_range(device, first, num)?;
        Self::check_event_list(events)?;

        if event_type == EventType::KeyPress
            && device.key_is_down(key_code, DownPhase::POSTED)
            && (!feedback.autorepeat
                || !feedback.key_autorepeats(key_code)
                || key.keymap.is_modifier(key_code))
        {
            return Err(SynthError::RepeatSuppressed(key_code));
        }

        let time = self.clock.now_ms();
        let mut slot = update_from_master(
            &mut self.devices,
            &self.screens,
            dev,
            DeviceChangeFlags::KEYBOARD_EVENT,
            time,
            &mut events[0],
        );

        let device = self
            .devices
            .get_mut(dev)
            .ok_or(SynthError::UnknownDevice(dev))?;

        let mut buffer = [0i32; MAX_VALUATORS];
        let valuators = &mut buffer[..num];
        valuators.copy_from_slice(valuators_in);

        let mut raw = RawDeviceEvent::new(dev, event_type, time, key_code);
        raw.set_raw_valuators(first, valuators);
        clip_valuators(device, first, valuators);
        raw.set_valuators(first, valuators);

        let mut event = DeviceEvent::new(dev, event_type, time);
        event.detail = key_code;
        if event_type == EventType::KeyPress {
            device.set_key_down(key_code, DownPhase::POSTED);
        } else {
            device.set_key_up(key_code, DownPhase::POSTED);
        }
        event.set_valuators(
            first,
            valuators,
            &device.last.remainder,
            device.valuator_mode() == AxisMode::Absolute,
        );

        events[slot] = InternalEvent::Raw(raw);
        events[slot + 1] = InternalEvent::Device(event);
        slot += 2;

        tracing::trace!("device {}: {} key {} ({} records)", dev, event_type, key_code, slot);
        Ok(slot)
    }

    /// [`InputContext::try_get_proximity_events`], returning 0 on rejection.
    pub fn get_proximity_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        first: usize,
        valuators: &[i32],
    ) -> usize {
        self.try_get_proximity_events(events, dev, event_type, first, valuators)
            .unwrap_or(0)
    }

    /// Build the records for a proximity in/out sample.
    ///
    /// Valuators are dropped for devices in relative mode.
    pub fn try_get_proximity_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        first: usize,
        valuators: &[i32],
    ) -> Result<usize, SynthError> {
        self.proximity_events(events, dev, event_type, first, valuators)
            .map_err(|e| {
                tracing::debug!("dropping {} from device {}: {}", event_type, dev, e);
                e
            })
    }

    fn proximity_events(
        &mut self,
        events: &mut [InternalEvent],
        dev: DeviceId,
        event_type: EventType,
        first: usize,
        valuators_in: &[i32],
    ) -> Result<usize, SynthError> {
        let device = self.enabled_device(dev)?;

        if !matches!(event_type, EventType::ProximityIn | EventType::ProximityOut) {
            return Err(SynthError::WrongEventType {
                event: event_type,
                builder: "proximity",
            });
        }
        let Some(valuator) = device.valuator.as_ref() else {
            return Err(SynthError::MissingClass {
                device: dev,
                class: "valuator",
            });
        };
        let valuators_in: &[i32] = if valuator.mode == AxisMode::Relative {
            &[]
        } else {
            valuators_in
        };
        let num = valuators_in.len();
        Self::check_valuator_range(device, first, num)?;
        Self::check_event_list(events)?;

        let time = self.clock.now_ms();
        let mut slot = update_from_master(
            &mut self.devices,
            &self.screens,
            dev,
            DeviceChangeFlags::POINTER_EVENT,
            time,
            &mut events[0],
        );

        let device = self
            .devices
            .get_mut(dev)
            .ok_or(SynthError::UnknownDevice(dev))?;

        let mut buffer = [0i32; MAX_VALUATORS];
        let valuators = &mut buffer[..num];
        valuators.copy_from_slice(valuators_in);

        let mut raw = RawDeviceEvent::new(dev, event_type, time, 0);
        raw.set_raw_valuators(first, valuators);
        clip_valuators(device, first, valuators);
        raw.set_valuators(first, valuators);

        let mut event = DeviceEvent::new(dev, event_type, time);
        event.set_valuators(
            first,
            valuators,
            &device.last.remainder,
            device.valuator_mode() == AxisMode::Absolute,
        );

        events[slot] = InternalEvent::Raw(raw);
        events[slot + 1] = InternalEvent::Device(event);
        slot += 2;

        tracing::trace!("device {}: {} ({} records)", dev, event_type, slot);
        Ok(slot)
    }

    /// A single motion record placing `dev`'s pointer at screen position
    /// `x`/`y`, for when cursor confinement moves the pointer.
    ///
    /// No device state is touched and no raw record is produced.
    pub fn post_synthetic_motion(
        &self,
        dev: DeviceId,
        x: i32,
        y: i32,
        time: u32,
    ) -> Result<DeviceEvent, SynthError> {
        if !self.devices.contains(dev) {
            return Err(SynthError::UnknownDevice(dev));
        }
        let mut event = DeviceEvent::new(dev, EventType::Motion, time);
        event.root_x = x;
        event.root_y = y;
        tracing::trace!("device {}: synthetic motion to {},{}", dev, x, y);
        Ok(event)
    }

    /// Axes a device's history is reported in. A master mirrors the ranges
    /// of the slave that last drove it.
    fn reporting_axes<'a>(&'a self, device: &'a Device) -> Option<&'a [AxisInfo]> {
        let own = device.valuator.as_ref()?;
        if device.is_master() {
            if let Some(v) = device
                .last_slave
                .and_then(|id| self.devices.get(id))
                .and_then(|slave| slave.valuator.as_ref())
            {
                return Some(&v.axes);
            }
        }
        Some(&own.axes)
    }

    /// Bytes [`InputContext::get_motion_history`] may write for `dev`.
    pub fn motion_history_buffer_size(&self, dev: DeviceId, mode: QueryMode) -> usize {
        let Some(device) = self.devices.get(dev) else {
            return 0;
        };
        let (Some(valuator), Some(axes)) = (device.valuator.as_ref(), self.reporting_axes(device))
        else {
            return 0;
        };
        valuator.motion.capacity() * MotionHistory::output_stride(mode, axes.len())
    }

    /// Copy `dev`'s motion history between `start` and `stop` (inclusive)
    /// into `out`. Returns the number of records written.
    pub fn get_motion_history(
        &self,
        dev: DeviceId,
        start: u32,
        stop: u32,
        mode: QueryMode,
        out: &mut [u8],
    ) -> Result<usize, SynthError> {
        let device = self.devices.get(dev).ok_or(SynthError::UnknownDevice(dev))?;
        let (Some(valuator), Some(axes)) = (device.valuator.as_ref(), self.reporting_axes(device))
        else {
            return Err(SynthError::MissingClass {
                device: dev,
                class: "valuator",
            });
        };
        let screen = self.current_screen(dev);
        Ok(valuator.motion.query(axes, start, stop, screen, mode, out))
    }
}
