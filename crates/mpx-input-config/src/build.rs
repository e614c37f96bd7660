//! Turning a parsed [`Config`] into live devices and screens

use mpx_input_core::{
    Atom, AxisInfo, Clock, Device, DeviceArena, DeviceId, InputContext, KeyboardFeedback, Keymap,
    ScreenLayout, ThresholdAccel, Transform,
};

use crate::error::ConfigError;
use crate::model::*;

/// Screen layout for `config`, left to right.
pub fn build_screens(config: &Config) -> ScreenLayout {
    let sizes: Vec<(i32, i32)> = config.screens.iter().map(|s| (s.width, s.height)).collect();
    ScreenLayout::new(&sizes)
}

/// Create every declared device, pair masters in declaration order and
/// attach slaves.
pub fn build_devices(config: &Config) -> Result<DeviceArena, ConfigError> {
    let mut arena = DeviceArena::new();

    for cfg in &config.devices {
        let device = build_device(cfg, config.global.motion_history_size);
        arena.add(device).map_err(|e| ConfigError::invalid(e.to_string()))?;
    }

    let pointers = config
        .devices
        .iter()
        .filter(|d| d.kind == DeviceKind::MasterPointer);
    let keyboards = config
        .devices
        .iter()
        .filter(|d| d.kind == DeviceKind::MasterKeyboard);
    for (pointer, keyboard) in pointers.zip(keyboards) {
        arena
            .pair(DeviceId(pointer.id), DeviceId(keyboard.id))
            .map_err(|e| ConfigError::invalid(e.to_string()))?;
    }

    for cfg in &config.devices {
        if let Some(master) = cfg.attach {
            arena
                .attach(DeviceId(cfg.id), DeviceId(master))
                .map_err(|e| ConfigError::invalid(e.to_string()))?;
        }
    }

    tracing::debug!("built {} devices", arena.len());
    Ok(arena)
}

/// Devices and screens from `config`, ready to synthesize events.
pub fn build_context<C: Clock>(
    config: &Config,
    clock: C,
) -> Result<InputContext<ScreenLayout, C>, ConfigError> {
    let devices = build_devices(config)?;
    Ok(InputContext::new(devices, build_screens(config), clock))
}

fn build_device(cfg: &DeviceConfig, default_history: usize) -> Device {
    let id = DeviceId(cfg.id);
    let mut device = match cfg.kind {
        DeviceKind::MasterPointer => Device::master_pointer(id, &cfg.name),
        DeviceKind::MasterKeyboard => Device::master_keyboard(id, &cfg.name),
        DeviceKind::Slave => Device::slave(id, &cfg.name),
    };

    if !cfg.axes.is_empty() {
        let axes: Vec<AxisInfo> = cfg
            .axes
            .iter()
            .map(|a| AxisInfo {
                min_value: a.min,
                max_value: a.max,
                resolution: a.resolution,
                mode: a.mode.unwrap_or(cfg.mode),
                label: Atom(a.label),
            })
            .collect();
        device = device.with_valuators(&axes, cfg.mode);
    }

    if let Some(buttons) = cfg.buttons {
        device = device.with_buttons(&vec![Atom::NONE; buttons]);
    }

    if let Some(keys) = &cfg.keys {
        let (keymap, feedback) = build_keys(keys);
        device = device.with_keys(keymap).with_kbd_feedback(feedback);
    }

    if let Some(matrix) = cfg.transform {
        device = device.with_transform(Transform::from_row_major(matrix));
    }

    if let Some(accel) = cfg.accel {
        device = device.with_accel(Box::new(ThresholdAccel::new(
            accel.threshold,
            accel.numerator,
            accel.denominator,
        )));
    }

    device = device.with_history_size(cfg.history_size.unwrap_or(default_history));
    device.enabled = cfg.enabled;
    device
}

fn build_keys(keys: &KeysConfig) -> (Keymap, KeyboardFeedback) {
    let mut keymap = Keymap {
        min_key_code: keys.min,
        max_key_code: keys.max,
        ..Keymap::default()
    };
    for code in &keys.modifiers {
        keymap.modmap[usize::from(*code)] = 1;
    }

    let mut feedback = KeyboardFeedback {
        autorepeat: keys.autorepeat,
        ..KeyboardFeedback::default()
    };
    if let Some(repeat) = &keys.repeat {
        feedback.auto_repeats.reset();
        for code in repeat {
            feedback.auto_repeats.set(usize::from(*code));
        }
    }

    (keymap, feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_config_str;
    use mpx_input_core::{AxisMode, EventList, EventType, ManualClock, MasterKind, PointerFlags};

    const CONFIG: &str = r#"
screen width=1000 height=500
master-pointer "Virtual core pointer" id=2
master-keyboard "Virtual core keyboard" id=3
device "Tablet" id=7 attach=2 {
    mode "absolute"
    history-size 16
    axis min=0 max=1000
    axis min=0 max=1000
    buttons 3
}
device "Keyboard" id=8 attach=3 {
    keys min=9 max=200 {
        repeat 38
        modifiers 50
    }
}
device "Floating" id=9 {
    axis
    axis
    accel
}
"#;

    #[test]
    fn test_build_devices() {
        let config = parse_config_str(CONFIG).unwrap();
        let arena = build_devices(&config).unwrap();
        assert_eq!(arena.len(), 5);

        let mp = arena.get(DeviceId(2)).unwrap();
        assert_eq!(mp.master_kind(), Some(MasterKind::Pointer));
        assert_eq!(mp.paired, Some(DeviceId(3)));

        let tablet = arena.get(DeviceId(7)).unwrap();
        assert_eq!(tablet.master, Some(DeviceId(2)));
        assert_eq!(tablet.valuator_mode(), AxisMode::Absolute);
        assert_eq!(tablet.axis(1).map(|a| a.max_value), Some(1000));
        assert_eq!(tablet.axis(1).map(|a| a.mode), Some(AxisMode::Absolute));
        assert_eq!(tablet.valuator.as_ref().unwrap().motion.capacity(), 16);
        assert_eq!(tablet.button.as_ref().unwrap().num_buttons(), 3);

        let kbd = arena.get(DeviceId(8)).unwrap();
        assert_eq!(arena.get_master(DeviceId(8), MasterKind::Keyboard), Some(DeviceId(3)));
        let keymap = &kbd.key.as_ref().unwrap().keymap;
        assert_eq!((keymap.min_key_code, keymap.max_key_code), (9, 200));
        assert!(keymap.is_modifier(50));
        assert!(!keymap.is_modifier(38));
        let feedback = kbd.kbd_feedback.as_ref().unwrap();
        assert!(feedback.key_autorepeats(38));
        assert!(!feedback.key_autorepeats(41), "only listed keys repeat");

        let floating = arena.get(DeviceId(9)).unwrap();
        assert_eq!(floating.master, None);
        assert!(floating.valuator.as_ref().unwrap().accel.is_some());
        assert_eq!(
            floating.valuator.as_ref().unwrap().motion.capacity(),
            256,
            "global default history size"
        );
    }

    #[test]
    fn test_keys_without_repeat_list_all_repeat() {
        let config = parse_config_str(
            r#"
device "kbd" id=8 {
    keys
}
"#,
        )
        .unwrap();
        let arena = build_devices(&config).unwrap();
        let feedback = arena.get(DeviceId(8)).unwrap().kbd_feedback.clone().unwrap();
        assert!(feedback.autorepeat);
        assert!(feedback.key_autorepeats(41));
        assert!(feedback.key_autorepeats(200));
    }

    #[test]
    fn test_disabled_device() {
        let config = parse_config_str(
            r#"
device "mouse" id=7 {
    disabled
}
"#,
        )
        .unwrap();
        let arena = build_devices(&config).unwrap();
        assert!(!arena.get(DeviceId(7)).unwrap().enabled);
    }

    #[test]
    fn test_default_screen() {
        let screens = build_screens(&Config::default());
        assert_eq!(screens.screens().len(), 1);
        assert_eq!(screens.screens()[0].width, 1024);
        assert_eq!(screens.screens()[0].height, 768);
    }

    #[test]
    fn test_build_context_synthesizes() {
        let config = parse_config_str(CONFIG).unwrap();
        let mut ctx = build_context(&config, ManualClock::new(40)).unwrap();
        let mut list = EventList::with_maximum();
        let (events, _) = list.slots_mut();

        let count = ctx.get_pointer_events(
            events,
            DeviceId(7),
            EventType::Motion,
            0,
            PointerFlags::ABSOLUTE,
            0,
            &[500, 500],
        );
        assert_eq!(count, 3, "device changed, raw and motion");
        let motion = events[2].as_device().unwrap();
        assert_eq!(motion.time, 40);
        assert_eq!((motion.root_x, motion.root_y), (500, 250));
    }
}
