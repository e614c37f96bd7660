//! Devices and the device arena
//!
//! Devices live in a [`DeviceArena`] indexed by [`DeviceId`]. The
//! master/slave association is stored as plain ids on both sides and always
//! resolved through the arena:
//!
//! - a slave's `master` is the master it is attached to (if any)
//! - a master's `last_slave` is the slave that generated its most recent event
//! - a master's `paired` is its counterpart of the other kind (pointer/keyboard)

use std::fmt;

use crate::accel::Accelerator;
use crate::axis::{Atom, AxisInfo, AxisMode, Transform};
use crate::bitset::CodeBits;
use crate::error::DeviceError;
use crate::history::{HistoryLayout, MotionHistory, MOTION_HISTORY_SIZE};
use crate::state::{DownPhase, DownState, LastPosition};
use crate::{MAX_BUTTONS, MAX_DEVICES, MAX_VALUATORS};

/// Small integer identifying a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u16);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which kind of master device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MasterKind {
    Pointer,
    Keyboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Master(MasterKind),
    Slave,
}

/// Valuator class: axes, mode, motion history and acceleration.
#[derive(Debug)]
pub struct ValuatorClass {
    pub axes: Vec<AxisInfo>,
    pub mode: AxisMode,
    pub num_motion_events: usize,
    pub motion: MotionHistory,
    pub accel: Option<Box<dyn Accelerator>>,
}

impl ValuatorClass {
    pub fn num_axes(&self) -> usize {
        self.axes.len()
    }

    pub fn axis(&self, index: usize) -> Option<&AxisInfo> {
        self.axes.get(index)
    }
}

/// Button class: labels and down-state.
#[derive(Debug, Clone)]
pub struct ButtonClass {
    pub labels: Vec<Atom>,
    pub down: DownState,
}

impl ButtonClass {
    pub fn num_buttons(&self) -> usize {
        self.labels.len()
    }
}

/// Key-code bounds and modifier map supplied by the keymap layer.
#[derive(Debug, Clone)]
pub struct Keymap {
    pub min_key_code: u8,
    pub max_key_code: u8,
    /// Modifier bits per key code; nonzero means the key is a modifier.
    pub modmap: [u8; 256],
}

impl Default for Keymap {
    fn default() -> Self {
        Self {
            min_key_code: crate::MIN_KEYCODE as u8,
            max_key_code: crate::MAX_KEYCODE as u8,
            modmap: [0; 256],
        }
    }
}

impl Keymap {
    pub fn is_modifier(&self, key_code: u32) -> bool {
        self.modmap
            .get(key_code as usize)
            .map_or(false, |bits| *bits != 0)
    }
}

/// Key class: keymap and down-state.
#[derive(Debug, Clone, Default)]
pub struct KeyClass {
    pub keymap: Keymap,
    pub down: DownState,
}

/// Keyboard feedback controls relevant to event generation.
#[derive(Debug, Clone)]
pub struct KeyboardFeedback {
    /// Global auto-repeat switch.
    pub autorepeat: bool,
    /// Per-key auto-repeat enable bits.
    pub auto_repeats: CodeBits,
}

impl Default for KeyboardFeedback {
    fn default() -> Self {
        let mut auto_repeats = CodeBits::new();
        auto_repeats.set_range(0, 256);
        Self {
            autorepeat: true,
            auto_repeats,
        }
    }
}

impl KeyboardFeedback {
    pub fn key_autorepeats(&self, key_code: u32) -> bool {
        self.auto_repeats.test(key_code as usize)
    }
}

/// A master or slave input device.
#[derive(Debug)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub role: DeviceRole,
    pub enabled: bool,
    /// Attached master, for slaves.
    pub master: Option<DeviceId>,
    /// Paired master of the other kind, for masters.
    pub paired: Option<DeviceId>,
    /// Slave that generated the master's last event, for masters.
    pub last_slave: Option<DeviceId>,
    pub last: LastPosition,
    pub valuator: Option<ValuatorClass>,
    pub button: Option<ButtonClass>,
    pub key: Option<KeyClass>,
    pub kbd_feedback: Option<KeyboardFeedback>,
    pub transform: Transform,
}

impl Device {
    pub fn new(id: DeviceId, name: impl Into<String>, role: DeviceRole) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            enabled: true,
            master: None,
            paired: None,
            last_slave: None,
            last: LastPosition::default(),
            valuator: None,
            button: None,
            key: None,
            kbd_feedback: None,
            transform: Transform::identity(),
        }
    }

    pub fn slave(id: DeviceId, name: impl Into<String>) -> Self {
        Self::new(id, name, DeviceRole::Slave)
    }

    /// A master pointer with relative x/y axes and the default history size.
    pub fn master_pointer(id: DeviceId, name: impl Into<String>) -> Self {
        let mut axes = [AxisInfo::unranged(); 2];
        for axis in &mut axes {
            axis.mode = AxisMode::Relative;
        }
        Self::new(id, name, DeviceRole::Master(MasterKind::Pointer))
            .with_valuators(&axes, AxisMode::Relative)
            .with_buttons(&[Atom::NONE; 10])
            .with_history_size(MOTION_HISTORY_SIZE)
    }

    pub fn master_keyboard(id: DeviceId, name: impl Into<String>) -> Self {
        Self::new(id, name, DeviceRole::Master(MasterKind::Keyboard))
            .with_keys(Keymap::default())
            .with_kbd_feedback(KeyboardFeedback::default())
    }

    /// Install a valuator class with the given axes (truncated to
    /// `MAX_VALUATORS`). History is disabled until a size is set.
    pub fn with_valuators(mut self, axes: &[AxisInfo], mode: AxisMode) -> Self {
        let axes: Vec<AxisInfo> = axes.iter().take(MAX_VALUATORS).copied().collect();
        self.last.num_valuators = axes.len();
        let layout = self.history_layout(axes.len());
        self.valuator = Some(ValuatorClass {
            axes,
            mode,
            num_motion_events: 0,
            motion: MotionHistory::disabled(layout),
            accel: None,
        });
        self
    }

    pub fn with_buttons(mut self, labels: &[Atom]) -> Self {
        self.button = Some(ButtonClass {
            labels: labels.iter().take(MAX_BUTTONS).copied().collect(),
            down: DownState::new(),
        });
        self
    }

    pub fn with_keys(mut self, keymap: Keymap) -> Self {
        self.key = Some(KeyClass {
            keymap,
            down: DownState::new(),
        });
        self
    }

    pub fn with_kbd_feedback(mut self, feedback: KeyboardFeedback) -> Self {
        self.kbd_feedback = Some(feedback);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_accel(mut self, accel: Box<dyn Accelerator>) -> Self {
        if let Some(v) = self.valuator.as_mut() {
            v.accel = Some(accel);
        }
        self
    }

    /// Set the motion history capacity and (re)allocate the ring.
    pub fn with_history_size(mut self, num_motion_events: usize) -> Self {
        if let Some(v) = self.valuator.as_mut() {
            v.num_motion_events = num_motion_events;
        }
        self.allocate_motion_history();
        self
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, DeviceRole::Master(_))
    }

    pub fn master_kind(&self) -> Option<MasterKind> {
        match self.role {
            DeviceRole::Master(kind) => Some(kind),
            DeviceRole::Slave => None,
        }
    }

    /// Master pointers, and devices with valuators that either have buttons
    /// or are not keyboards.
    pub fn is_pointer_device(&self) -> bool {
        self.master_kind() == Some(MasterKind::Pointer)
            || (self.valuator.is_some() && (self.button.is_some() || self.key.is_none()))
    }

    pub fn num_axes(&self) -> usize {
        self.valuator.as_ref().map_or(0, |v| v.num_axes())
    }

    pub fn axis(&self, index: usize) -> Option<&AxisInfo> {
        self.valuator.as_ref().and_then(|v| v.axis(index))
    }

    /// Valuator class mode; devices without valuators count as relative.
    pub fn valuator_mode(&self) -> AxisMode {
        self.valuator.as_ref().map_or(AxisMode::Relative, |v| v.mode)
    }

    fn history_layout(&self, num_axes: usize) -> HistoryLayout {
        if self.is_master() {
            HistoryLayout::Master
        } else {
            HistoryLayout::Slave { num_axes }
        }
    }

    /// Drop the current motion history and allocate a fresh ring sized by
    /// the valuator class. On allocation failure the device keeps running
    /// without history.
    pub fn allocate_motion_history(&mut self) {
        let Some(num_axes) = self.valuator.as_ref().map(|v| v.num_axes()) else {
            return;
        };
        let layout = self.history_layout(num_axes);
        let Some(v) = self.valuator.as_mut() else {
            return;
        };

        v.motion = match MotionHistory::allocate(layout, v.num_motion_events) {
            Ok(history) => history,
            Err(e) => {
                tracing::error!("{}: {}", self.name, e);
                MotionHistory::disabled(layout)
            }
        };
    }

    pub fn set_button_down(&mut self, button: u32, phase: DownPhase) {
        if let Some(b) = self.button.as_mut() {
            b.down.set_down(button as usize, phase);
        }
    }

    pub fn set_button_up(&mut self, button: u32, phase: DownPhase) {
        if let Some(b) = self.button.as_mut() {
            b.down.set_up(button as usize, phase);
        }
    }

    pub fn button_is_down(&self, button: u32, phase: DownPhase) -> bool {
        self.button
            .as_ref()
            .map_or(false, |b| b.down.is_down(button as usize, phase))
    }

    pub fn set_key_down(&mut self, key_code: u32, phase: DownPhase) {
        if let Some(k) = self.key.as_mut() {
            k.down.set_down(key_code as usize, phase);
        }
    }

    pub fn set_key_up(&mut self, key_code: u32, phase: DownPhase) {
        if let Some(k) = self.key.as_mut() {
            k.down.set_up(key_code as usize, phase);
        }
    }

    pub fn key_is_down(&self, key_code: u32, phase: DownPhase) -> bool {
        self.key
            .as_ref()
            .map_or(false, |k| k.down.is_down(key_code as usize, phase))
    }
}

/// All registered devices, indexed by id.
#[derive(Debug, Default)]
pub struct DeviceArena {
    slots: Vec<Option<Device>>,
}

impl DeviceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Ids must be unique and below `MAX_DEVICES`.
    pub fn add(&mut self, device: Device) -> Result<DeviceId, DeviceError> {
        let id = device.id;
        let index = usize::from(id.0);
        if index >= MAX_DEVICES {
            return Err(DeviceError::IdOutOfRange(id));
        }
        if self.contains(id) {
            return Err(DeviceError::DuplicateId(id));
        }
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        tracing::debug!("registered device {} ({:?}) as {}", device.name, device.role, id);
        self.slots[index] = Some(device);
        Ok(id)
    }

    /// Unregister a device, detaching anything that refers to it.
    pub fn remove(&mut self, id: DeviceId) -> Option<Device> {
        let device = self.slots.get_mut(usize::from(id.0))?.take()?;
        for other in self.iter_mut() {
            if other.master == Some(id) {
                other.master = None;
            }
            if other.last_slave == Some(id) {
                other.last_slave = None;
            }
            if other.paired == Some(id) {
                other.paired = None;
            }
        }
        Some(device)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.slots.get(usize::from(id.0)).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.slots.get_mut(usize::from(id.0)).and_then(Option::as_mut)
    }

    /// Mutable access to two distinct devices at once.
    pub fn pair_mut(&mut self, a: DeviceId, b: DeviceId) -> Option<(&mut Device, &mut Device)> {
        let (ia, ib) = (usize::from(a.0), usize::from(b.0));
        if ia == ib || ia >= self.slots.len() || ib >= self.slots.len() {
            return None;
        }
        if ia < ib {
            let (left, right) = self.slots.split_at_mut(ib);
            Some((left[ia].as_mut()?, right[0].as_mut()?))
        } else {
            let (left, right) = self.slots.split_at_mut(ia);
            Some((right[0].as_mut()?, left[ib].as_mut()?))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pair a master pointer with a master keyboard.
    pub fn pair(&mut self, pointer: DeviceId, keyboard: DeviceId) -> Result<(), DeviceError> {
        for id in [pointer, keyboard] {
            let device = self.get(id).ok_or(DeviceError::UnknownDevice(id))?;
            if !device.is_master() {
                return Err(DeviceError::NotAMaster(id));
            }
        }
        let (p, k) = self
            .pair_mut(pointer, keyboard)
            .ok_or(DeviceError::NotAMaster(keyboard))?;
        p.paired = Some(keyboard);
        k.paired = Some(pointer);
        Ok(())
    }

    /// Attach `slave` to `master`, replacing any previous attachment.
    pub fn attach(&mut self, slave: DeviceId, master: DeviceId) -> Result<(), DeviceError> {
        match self.get(master) {
            None => return Err(DeviceError::UnknownDevice(master)),
            Some(m) if !m.is_master() => return Err(DeviceError::NotAMaster(master)),
            _ => {}
        }
        self.detach(slave)?;
        let device = self.get_mut(slave).ok_or(DeviceError::UnknownDevice(slave))?;
        device.master = Some(master);
        tracing::debug!("attached device {} to master {}", slave, master);
        Ok(())
    }

    /// Float `slave`, clearing it as its master's last slave.
    pub fn detach(&mut self, slave: DeviceId) -> Result<(), DeviceError> {
        let device = self.get_mut(slave).ok_or(DeviceError::UnknownDevice(slave))?;
        if device.is_master() {
            return Err(DeviceError::NotASlave(slave));
        }
        let Some(old) = device.master.take() else {
            return Ok(());
        };
        if let Some(master) = self.get_mut(old) {
            if master.last_slave == Some(slave) {
                master.last_slave = None;
            }
        }
        Ok(())
    }

    /// The master of `kind` that events from `dev` are routed to.
    ///
    /// For a slave this is its attached master, or that master's pair when
    /// the attached master is of the other kind. Masters and floating
    /// slaves have none.
    pub fn get_master(&self, dev: DeviceId, kind: MasterKind) -> Option<DeviceId> {
        let device = self.get(dev)?;
        if device.is_master() {
            return None;
        }
        let master = self.get(device.master?)?;
        if master.master_kind() == Some(kind) {
            Some(master.id)
        } else {
            master.paired
        }
    }

    /// Device whose sprite `dev` moves: its master pointer when attached,
    /// the device itself otherwise.
    pub fn sprite_owner(&self, dev: DeviceId) -> DeviceId {
        self.get_master(dev, MasterKind::Pointer).unwrap_or(dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_with_masters() -> DeviceArena {
        let mut arena = DeviceArena::new();
        arena
            .add(Device::master_pointer(DeviceId(2), "Virtual core pointer"))
            .unwrap();
        arena
            .add(Device::master_keyboard(DeviceId(3), "Virtual core keyboard"))
            .unwrap();
        arena.pair(DeviceId(2), DeviceId(3)).unwrap();
        arena
    }

    #[test]
    fn test_add_rejects_duplicates_and_range() {
        let mut arena = arena_with_masters();
        assert_eq!(
            arena.add(Device::slave(DeviceId(2), "dup")),
            Err(DeviceError::DuplicateId(DeviceId(2)))
        );
        assert_eq!(
            arena.add(Device::slave(DeviceId(300), "big")),
            Err(DeviceError::IdOutOfRange(DeviceId(300)))
        );
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_get_master_follows_pairing() {
        let mut arena = arena_with_masters();
        arena.add(Device::slave(DeviceId(8), "keyboard")).unwrap();
        arena.attach(DeviceId(8), DeviceId(3)).unwrap();

        assert_eq!(arena.get_master(DeviceId(8), MasterKind::Keyboard), Some(DeviceId(3)));
        assert_eq!(arena.get_master(DeviceId(8), MasterKind::Pointer), Some(DeviceId(2)));
        assert_eq!(arena.get_master(DeviceId(2), MasterKind::Pointer), None);
        assert_eq!(arena.sprite_owner(DeviceId(8)), DeviceId(2));
    }

    #[test]
    fn test_attach_requires_master() {
        let mut arena = arena_with_masters();
        arena.add(Device::slave(DeviceId(8), "a")).unwrap();
        arena.add(Device::slave(DeviceId(9), "b")).unwrap();
        assert_eq!(
            arena.attach(DeviceId(8), DeviceId(9)),
            Err(DeviceError::NotAMaster(DeviceId(9)))
        );
        assert_eq!(
            arena.attach(DeviceId(8), DeviceId(42)),
            Err(DeviceError::UnknownDevice(DeviceId(42)))
        );
    }

    #[test]
    fn test_detach_clears_last_slave() {
        let mut arena = arena_with_masters();
        arena.add(Device::slave(DeviceId(8), "mouse")).unwrap();
        arena.attach(DeviceId(8), DeviceId(2)).unwrap();
        arena.get_mut(DeviceId(2)).unwrap().last_slave = Some(DeviceId(8));

        arena.detach(DeviceId(8)).unwrap();
        assert_eq!(arena.get(DeviceId(8)).unwrap().master, None);
        assert_eq!(arena.get(DeviceId(2)).unwrap().last_slave, None);
        assert_eq!(arena.sprite_owner(DeviceId(8)), DeviceId(8));
    }

    #[test]
    fn test_remove_clears_references() {
        let mut arena = arena_with_masters();
        arena.add(Device::slave(DeviceId(8), "mouse")).unwrap();
        arena.attach(DeviceId(8), DeviceId(2)).unwrap();

        let removed = arena.remove(DeviceId(2)).unwrap();
        assert_eq!(removed.name, "Virtual core pointer");
        assert_eq!(arena.get(DeviceId(8)).unwrap().master, None);
        assert_eq!(arena.get(DeviceId(3)).unwrap().paired, None);
    }

    #[test]
    fn test_pair_mut_distinct() {
        let mut arena = arena_with_masters();
        assert!(arena.pair_mut(DeviceId(2), DeviceId(2)).is_none());
        let (a, b) = arena.pair_mut(DeviceId(3), DeviceId(2)).unwrap();
        assert_eq!(a.id, DeviceId(3));
        assert_eq!(b.id, DeviceId(2));
    }

    #[test]
    fn test_history_layout_follows_role() {
        let master = Device::master_pointer(DeviceId(2), "mp");
        let v = master.valuator.as_ref().unwrap();
        assert_eq!(v.motion.layout(), HistoryLayout::Master);
        assert_eq!(v.motion.capacity(), MOTION_HISTORY_SIZE);

        let slave = Device::slave(DeviceId(7), "tablet")
            .with_valuators(&[AxisInfo::new(0, 100); 3], AxisMode::Absolute)
            .with_history_size(16);
        let v = slave.valuator.as_ref().unwrap();
        assert_eq!(v.motion.layout(), HistoryLayout::Slave { num_axes: 3 });
        assert_eq!(v.motion.capacity(), 16);
    }

    #[test]
    fn test_button_and_key_state() {
        let mut dev = Device::slave(DeviceId(7), "combo")
            .with_buttons(&[Atom::NONE; 3])
            .with_keys(Keymap::default());

        dev.set_button_down(1, DownPhase::POSTED);
        assert!(dev.button_is_down(1, DownPhase::POSTED));
        assert!(!dev.button_is_down(1, DownPhase::PROCESSED));
        dev.set_button_up(1, DownPhase::POSTED);
        assert!(!dev.button_is_down(1, DownPhase::all()));

        dev.set_key_down(41, DownPhase::PROCESSED);
        assert!(dev.key_is_down(41, DownPhase::all()));
        assert!(!dev.key_is_down(41, DownPhase::POSTED));
    }

    #[test]
    fn test_is_pointer_device() {
        let keyboard = Device::slave(DeviceId(8), "kbd").with_keys(Keymap::default());
        assert!(!keyboard.is_pointer_device());

        let mouse = Device::slave(DeviceId(9), "mouse")
            .with_valuators(&[AxisInfo::unranged(); 2], AxisMode::Relative);
        assert!(mouse.is_pointer_device());

        assert!(Device::master_pointer(DeviceId(2), "mp").is_pointer_device());
    }
}
