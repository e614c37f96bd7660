//! Device-switch reconciliation
//!
//! When a slave generates an event and its master last heard from a
//! different slave, the master's position is pulled into the new slave so
//! that relative motion continues from where the pointer actually is, and a
//! [`DeviceChangedEvent`] describing the new slave is emitted ahead of the
//! sample's own records.

use crate::axis::{rescale, AxisInfo};
use crate::device::{Device, DeviceArena, DeviceId, MasterKind};
use crate::event::{DeviceChangeFlags, DeviceChangedEvent, InternalEvent};
use crate::screen::{Screen, ScreenGeometry};
use crate::MAX_VALUATORS;

/// Snapshot `slave`'s classes for `master`.
///
/// `flags` says which kind of event triggered the switch; the slave-switch
/// flag is always added.
pub fn create_classes_changed_event(
    master: &Device,
    slave: &Device,
    flags: DeviceChangeFlags,
    time: u32,
) -> DeviceChangedEvent {
    let mut dce = DeviceChangedEvent {
        time,
        device_id: slave.id,
        master_id: master.id,
        source_id: slave.id,
        flags: flags | DeviceChangeFlags::SLAVE_SWITCH,
        ..Default::default()
    };

    if let Some(button) = &slave.button {
        dce.num_buttons = button.num_buttons();
        dce.button_labels[..dce.num_buttons].copy_from_slice(&button.labels);
    }

    if let Some(valuator) = &slave.valuator {
        dce.num_valuators = valuator.num_axes();
        for (out, axis) in dce.valuators.iter_mut().zip(&valuator.axes) {
            // per-axis modes are not reported yet, the class mode stands in
            *out = AxisInfo {
                mode: valuator.mode,
                ..*axis
            };
        }
    }

    if let Some(key) = &slave.key {
        dce.min_keycode = key.keymap.min_key_code;
        dce.max_keycode = key.keymap.max_key_code;
    }

    dce
}

/// Bring `slave`'s stored position in line with `master`.
///
/// Axes 0 and 1 take the master's screen position, rescaled into the
/// slave's ranges when a screen is known. Higher axes are rescaled from the
/// previously active slave's ranges (`prev_axes`); axes the previous slave
/// lacked are zeroed. Without a previous slave they are left alone.
pub fn update_slave_device_coords(
    master: &Device,
    slave: &mut Device,
    prev_axes: Option<&[AxisInfo]>,
    screen: Option<Screen>,
) {
    for i in 0..2 {
        slave.last.valuators[i] = master.last.valuators[i];
        slave.last.remainder[i] = master.last.remainder[i];
    }

    let Some(valuator) = slave.valuator.as_ref() else {
        return;
    };

    if let Some(screen) = screen {
        let extents = [screen.width, screen.height];
        for (i, extent) in extents.into_iter().enumerate().take(valuator.num_axes()) {
            let (coord, remainder) = rescale(
                slave.last.valuators[i],
                slave.last.remainder[i],
                None,
                valuator.axis(i),
                extent,
            );
            slave.last.valuators[i] = coord;
            slave.last.remainder[i] = remainder;
        }
    }

    let Some(prev_axes) = prev_axes else {
        return;
    };

    for i in 2..valuator.num_axes() {
        match prev_axes.get(i) {
            None => {
                slave.last.valuators[i] = 0;
                slave.last.remainder[i] = 0.0;
            }
            Some(prev) => {
                let (coord, remainder) = rescale(
                    slave.last.valuators[i],
                    slave.last.remainder[i],
                    Some(prev),
                    valuator.axis(i),
                    0,
                );
                slave.last.valuators[i] = coord;
                slave.last.remainder[i] = remainder;
            }
        }
    }
}

/// Run the device-switch check for an event from `dev`.
///
/// If `dev`'s master (pointer or keyboard, per `flags`) last heard from a
/// different slave, writes a [`DeviceChangedEvent`] into `out`, reconciles
/// positions for pointer masters and makes `dev` the master's last slave.
/// Returns the number of slots used (0 or 1).
pub fn update_from_master<S: ScreenGeometry>(
    devices: &mut DeviceArena,
    screens: &S,
    dev: DeviceId,
    flags: DeviceChangeFlags,
    time: u32,
    out: &mut InternalEvent,
) -> usize {
    let kind = if flags.contains(DeviceChangeFlags::POINTER_EVENT) {
        MasterKind::Pointer
    } else {
        MasterKind::Keyboard
    };

    let Some(master_id) = devices.get_master(dev, kind) else {
        return 0;
    };

    // the previous slave's axes are copied out before the mutable borrow below
    let mut prev_axes = [AxisInfo::default(); MAX_VALUATORS];
    let mut num_prev_axes = None;
    match devices.get(master_id).and_then(|m| m.last_slave) {
        Some(last) if last == dev => return 0,
        Some(last) => {
            if let Some(v) = devices.get(last).and_then(|d| d.valuator.as_ref()) {
                prev_axes[..v.num_axes()].copy_from_slice(&v.axes);
                num_prev_axes = Some(v.num_axes());
            }
        }
        None => {}
    }

    let screen = screens.current_screen(devices.sprite_owner(dev));
    let Some((master, slave)) = devices.pair_mut(master_id, dev) else {
        return 0;
    };

    *out = InternalEvent::DeviceChanged(create_classes_changed_event(master, slave, flags, time));

    if master.is_pointer_device() {
        let prev = num_prev_axes.map(|n| &prev_axes[..n]);
        update_slave_device_coords(master, slave, prev, screen);
        master.last.num_valuators = slave.last.num_valuators;
    }
    master.last_slave = Some(dev);

    tracing::trace!("master {} switched to slave {}", master_id, dev);
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{Atom, AxisMode};
    use crate::device::Keymap;
    use crate::screen::ScreenLayout;

    fn setup(s1_range: i32, s2_range: i32) -> DeviceArena {
        let mut arena = DeviceArena::new();
        arena
            .add(Device::master_pointer(DeviceId(2), "Virtual core pointer"))
            .unwrap();
        arena
            .add(
                Device::slave(DeviceId(7), "S1")
                    .with_valuators(&[AxisInfo::new(0, s1_range); 3], AxisMode::Absolute),
            )
            .unwrap();
        arena
            .add(
                Device::slave(DeviceId(8), "S2")
                    .with_valuators(&[AxisInfo::new(0, s2_range); 4], AxisMode::Absolute)
                    .with_buttons(&[Atom(11), Atom(12)]),
            )
            .unwrap();
        arena.attach(DeviceId(7), DeviceId(2)).unwrap();
        arena.attach(DeviceId(8), DeviceId(2)).unwrap();
        arena
    }

    #[test]
    fn test_switch_rescales_master_position_into_new_slave() {
        let mut arena = setup(100, 1000);
        let screens = ScreenLayout::single(1000, 1000);
        {
            let master = arena.get_mut(DeviceId(2)).unwrap();
            master.last.valuators[0] = 500;
            master.last.valuators[1] = 250;
            master.last_slave = Some(DeviceId(7));
        }
        arena.get_mut(DeviceId(8)).unwrap().last.valuators[2] = 40;

        let mut out = InternalEvent::default();
        let used = update_from_master(
            &mut arena,
            &screens,
            DeviceId(8),
            DeviceChangeFlags::POINTER_EVENT,
            99,
            &mut out,
        );
        assert_eq!(used, 1);

        let s2 = arena.get(DeviceId(8)).unwrap();
        assert_eq!(s2.last.valuators[0], 500);
        assert_eq!(s2.last.valuators[1], 250);
        assert_eq!(s2.last.valuators[2], 400, "axis 2 rescaled from S1's [0,100]");
        assert_eq!(s2.last.valuators[3], 0, "S1 has no axis 3");
        assert_eq!(arena.get(DeviceId(2)).unwrap().last_slave, Some(DeviceId(8)));
        assert_eq!(arena.get(DeviceId(2)).unwrap().last.num_valuators, 4);

        let dce = out.as_device_changed().expect("device changed record");
        assert!(dce.flags.contains(DeviceChangeFlags::SLAVE_SWITCH));
        assert!(dce.flags.contains(DeviceChangeFlags::POINTER_EVENT));
        assert_eq!(dce.device_id, DeviceId(8));
        assert_eq!(dce.master_id, DeviceId(2));
        assert_eq!(dce.time, 99);
        assert_eq!(dce.button_labels(), &[Atom(11), Atom(12)]);
        assert_eq!(dce.valuators().len(), 4);
        assert_eq!(dce.valuators()[0].max_value, 1000);
    }

    #[test]
    fn test_same_slave_is_a_noop() {
        let mut arena = setup(100, 1000);
        let screens = ScreenLayout::single(1000, 1000);
        arena.get_mut(DeviceId(2)).unwrap().last_slave = Some(DeviceId(8));
        arena.get_mut(DeviceId(8)).unwrap().last.valuators[0] = 17;

        let mut out = InternalEvent::default();
        let used = update_from_master(
            &mut arena,
            &screens,
            DeviceId(8),
            DeviceChangeFlags::POINTER_EVENT,
            1,
            &mut out,
        );
        assert_eq!(used, 0);
        assert_eq!(out, InternalEvent::default());
        assert_eq!(arena.get(DeviceId(8)).unwrap().last.valuators[0], 17);
    }

    #[test]
    fn test_floating_slave_never_switches() {
        let mut arena = setup(100, 1000);
        arena.detach(DeviceId(8)).unwrap();
        let screens = ScreenLayout::single(1000, 1000);

        let mut out = InternalEvent::default();
        let used = update_from_master(
            &mut arena,
            &screens,
            DeviceId(8),
            DeviceChangeFlags::POINTER_EVENT,
            1,
            &mut out,
        );
        assert_eq!(used, 0);
    }

    #[test]
    fn test_keyboard_switch_keeps_position() {
        let mut arena = DeviceArena::new();
        arena
            .add(Device::master_pointer(DeviceId(2), "Virtual core pointer"))
            .unwrap();
        arena
            .add(Device::master_keyboard(DeviceId(3), "Virtual core keyboard"))
            .unwrap();
        arena.pair(DeviceId(2), DeviceId(3)).unwrap();
        let keymap = Keymap {
            min_key_code: 9,
            max_key_code: 200,
            ..Keymap::default()
        };
        arena
            .add(Device::slave(DeviceId(9), "kbd").with_keys(keymap))
            .unwrap();
        arena.attach(DeviceId(9), DeviceId(3)).unwrap();
        arena.get_mut(DeviceId(9)).unwrap().last.valuators[0] = 5;

        let screens = ScreenLayout::single(1000, 1000);
        let mut out = InternalEvent::default();
        let used = update_from_master(
            &mut arena,
            &screens,
            DeviceId(9),
            DeviceChangeFlags::KEYBOARD_EVENT,
            1,
            &mut out,
        );
        assert_eq!(used, 1);
        let dce = out.as_device_changed().unwrap();
        assert_eq!((dce.min_keycode, dce.max_keycode), (9, 200));
        assert_eq!(dce.master_id, DeviceId(3));
        assert_eq!(
            arena.get(DeviceId(9)).unwrap().last.valuators[0],
            5,
            "keyboard masters do not carry a position"
        );
    }

    #[test]
    fn test_unranged_slave_takes_screen_coords() {
        let master = {
            let mut m = Device::master_pointer(DeviceId(2), "mp");
            m.last.valuators[0] = 640;
            m.last.valuators[1] = 480;
            m.last.remainder[0] = 0.25;
            m
        };
        let mut slave = Device::slave(DeviceId(7), "mouse")
            .with_valuators(&[AxisInfo::unranged(); 2], AxisMode::Relative);

        update_slave_device_coords(&master, &mut slave, None, Some(Screen::new(0, 1280, 960)));
        assert_eq!(&slave.last.valuators[..2], &[640, 480]);
        assert_eq!(slave.last.remainder[0], 0.25);
    }
}
