//! Motion composition
//!
//! Turns a partial valuator update into the device's new position: absolute
//! or relative application, clipping, acceleration and sprite placement.
//! `valuators` slices always cover axes `first..first + valuators.len()`.

use crate::axis::{rescale, AxisMode};
use crate::device::{Device, DeviceArena, DeviceId, MasterKind};
use crate::screen::{Screen, ScreenGeometry};

/// Index into `valuators` of axis 0, if present.
pub(crate) fn x_index(first: usize, num: usize) -> Option<usize> {
    (first == 0 && num >= 1).then_some(0)
}

/// Index into `valuators` of axis 1, if present.
pub(crate) fn y_index(first: usize, num: usize) -> Option<usize> {
    (first <= 1 && num.saturating_add(first) >= 2).then(|| 1 - first)
}

/// Indices into `valuators` whose axis is 2 or higher.
fn extra_axes(first: usize, num: usize) -> std::ops::Range<usize> {
    2usize.saturating_sub(first).min(num)..num
}

/// Clip `value` to axis `axis` of `dev`; axes the device lacks are left alone.
pub fn clip_axis(dev: &Device, axis: usize, value: i32) -> i32 {
    dev.axis(axis).map_or(value, |a| a.clip(value))
}

/// Clip every value in `valuators` to its axis range.
pub fn clip_valuators(dev: &Device, first: usize, valuators: &mut [i32]) {
    for (i, value) in valuators.iter_mut().enumerate() {
        *value = clip_axis(dev, first + i, *value);
    }
}

/// Apply an absolute sample. Returns the new device-space x/y; higher axes
/// are stored into the device's last position directly.
pub fn move_absolute(dev: &mut Device, first: usize, valuators: &[i32]) -> (i32, i32) {
    let num = valuators.len();
    let x = x_index(first, num).map_or(dev.last.valuators[0], |i| valuators[i]);
    let y = y_index(first, num).map_or(dev.last.valuators[1], |i| valuators[i]);
    let x = clip_axis(dev, 0, x);
    let y = clip_axis(dev, 1, y);

    for i in extra_axes(first, num) {
        let axis = first + i;
        dev.last.valuators[axis] = clip_axis(dev, axis, valuators[i]);
    }

    (x, y)
}

/// Apply a relative sample. Returns the new device-space x/y.
///
/// x/y are only clipped when the device is attached and its valuator class
/// is absolute; a floating device must be able to leave its range to cross
/// screens. Higher axes are accumulated, clipped if the axis is absolute,
/// and the resulting absolute values are written back into `valuators`.
pub fn move_relative(dev: &mut Device, attached: bool, first: usize, valuators: &mut [i32]) -> (i32, i32) {
    let num = valuators.len();
    let mut x = dev.last.valuators[0];
    let mut y = dev.last.valuators[1];

    if let Some(i) = x_index(first, num) {
        x = x.saturating_add(valuators[i]);
    }
    if let Some(i) = y_index(first, num) {
        y = y.saturating_add(valuators[i]);
    }

    if attached && dev.valuator_mode() == AxisMode::Absolute {
        x = clip_axis(dev, 0, x);
        y = clip_axis(dev, 1, y);
    }

    for i in extra_axes(first, num) {
        let axis = first + i;
        let mut value = dev.last.valuators[axis].saturating_add(valuators[i]);
        if dev.axis(axis).map_or(false, |a| a.mode == AxisMode::Absolute) {
            value = clip_axis(dev, axis, value);
        }
        dev.last.valuators[axis] = value;
        valuators[i] = value;
    }

    (x, y)
}

/// Run the device's accelerator over the deltas, if it has one.
pub fn accel_pointer(dev: &mut Device, first: usize, valuators: &mut [i32], time: u32) {
    let Device { valuator, last, .. } = dev;
    if let Some(accel) = valuator.as_mut().and_then(|v| v.accel.as_mut()) {
        accel.accelerate(first, valuators, &mut last.remainder, time);
    }
}

/// Where a sprite ended up after [`position_sprite`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpritePosition {
    /// Device-space coordinates.
    pub x: i32,
    pub y: i32,
    /// Screen coordinates.
    pub screen_x: i32,
    pub screen_y: i32,
    pub screen_x_frac: f64,
    pub screen_y_frac: f64,
}

/// Convert device-space `x`/`y` into screen space, place the sprite and
/// store the results.
///
/// The master pointer (if `dev` is attached) receives the screen position.
/// If the sprite changed screens, the device-space position is recomputed
/// against the new screen. `dev`'s last position always receives the final
/// device-space coordinates and remainders.
#[allow(clippy::too_many_arguments)]
pub fn position_sprite<S: ScreenGeometry>(
    devices: &mut DeviceArena,
    screens: &mut S,
    dev: DeviceId,
    mut x: i32,
    mut y: i32,
    mut x_frac: f64,
    mut y_frac: f64,
    screen: Screen,
) -> Option<SpritePosition> {
    let master = devices.get_master(dev, MasterKind::Pointer);
    let owner = master.unwrap_or(dev);
    let device = devices.get(dev)?;

    let (mut screen_x, mut screen_x_frac) = match device.axis(0) {
        Some(axis) => rescale(x, x_frac, Some(axis), None, screen.width),
        None => (device.last.valuators[0], device.last.remainder[0]),
    };
    let (mut screen_y, mut screen_y_frac) = match device.axis(1) {
        Some(axis) => rescale(y, y_frac, Some(axis), None, screen.height),
        None => (device.last.valuators[1], device.last.remainder[1]),
    };

    // pressing against the top/left edge must not build up a negative carry
    if screen_x <= 0 && screen_x_frac < 0.0 {
        screen_x_frac = 0.0;
        x_frac = 0.0;
    }
    if screen_y <= 0 && screen_y_frac < 0.0 {
        screen_y_frac = 0.0;
        y_frac = 0.0;
    }

    let (old_x, old_y) = (screen_x, screen_y);
    let new_screen = screens.set_sprite_position(owner, &mut screen_x, &mut screen_y);

    if let Some(master) = master.and_then(|id| devices.get_mut(id)) {
        master.last.valuators[0] = screen_x;
        master.last.valuators[1] = screen_y;
        master.last.remainder[0] = screen_x_frac;
        master.last.remainder[1] = screen_y_frac;
    }

    let device = devices.get_mut(dev)?;
    if screen_x != old_x {
        (x, x_frac) = rescale(screen_x, screen_x_frac, None, device.axis(0), new_screen.width);
    }
    if screen_y != old_y {
        (y, y_frac) = rescale(screen_y, screen_y_frac, None, device.axis(1), new_screen.height);
    }

    device.last.valuators[0] = x;
    device.last.valuators[1] = y;
    device.last.remainder[0] = x_frac;
    device.last.remainder[1] = y_frac;

    Some(SpritePosition {
        x,
        y,
        screen_x,
        screen_y,
        screen_x_frac,
        screen_y_frac,
    })
}

/// Record `dev`'s last position for axes `first..first + num` in its own
/// motion history and, when attached, in its master's.
///
/// The master's record carries the slave's axis ranges, which are the
/// ranges the master reports while this slave is active.
pub fn update_history(devices: &mut DeviceArena, dev: DeviceId, first: usize, num: usize, time: u32) {
    let master = devices.get_master(dev, MasterKind::Pointer);
    let Some(master_id) = master else {
        if let Some(device) = devices.get_mut(dev) {
            let Device { valuator, last, .. } = device;
            if let Some(v) = valuator.as_mut() {
                v.motion.record(&v.axes, time, first, &last.valuators[first..first + num]);
            }
        }
        return;
    };

    let Some((device, master)) = devices.pair_mut(dev, master_id) else {
        return;
    };
    let values = &device.last.valuators[first..first + num];
    if let Some(v) = device.valuator.as_mut() {
        v.motion.record(&v.axes, time, first, values);
    }
    if let (Some(mv), Some(dv)) = (master.valuator.as_mut(), device.valuator.as_ref()) {
        mv.motion.record(&dv.axes, time, first, values);
    }
}
