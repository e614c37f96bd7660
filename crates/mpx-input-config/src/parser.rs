//! KDL configuration parser

use std::collections::HashMap;
use std::path::Path;

use mpx_input_core::{MAX_BUTTONS, MAX_DEVICES, MAX_VALUATORS};

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path. A leading `~` is
/// expanded to the home directory.
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc = parse_document(content)?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "screen" => {
                config.screens.push(parse_screen(node)?);
            }
            "master-pointer" => {
                config.devices.push(parse_device(node, DeviceKind::MasterPointer)?);
            }
            "master-keyboard" => {
                config.devices.push(parse_device(node, DeviceKind::MasterKeyboard)?);
            }
            "device" => {
                config.devices.push(parse_device(node, DeviceKind::Slave)?);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    validate(&config)?;
    Ok(config)
}

pub(crate) fn parse_document(content: &str) -> Result<kdl::KdlDocument, ConfigError> {
    content.parse().map_err(|e: kdl::KdlError| {
        // kdl carries its own miette version, so the span is rebuilt by hand
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })
}

/// Value of the property `key`, if present.
pub(crate) fn property<'a>(node: &'a kdl::KdlNode, key: &str) -> Option<&'a kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(key))
        .map(|e| e.value())
}

/// Positional arguments, in order.
pub(crate) fn arguments(node: &kdl::KdlNode) -> impl Iterator<Item = &kdl::KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

/// Integer conversion with a message naming the offending node.
pub(crate) fn int<T: TryFrom<i64>>(
    value: &kdl::KdlValue,
    node: &kdl::KdlNode,
    what: &str,
) -> Result<T, ConfigError> {
    value
        .as_i64()
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| {
            ConfigError::invalid(format!(
                "`{}`: {} must be an integer in range, got {}",
                node.name().value(),
                what,
                value
            ))
        })
}

fn int_property<T: TryFrom<i64>>(node: &kdl::KdlNode, key: &str) -> Result<Option<T>, ConfigError> {
    property(node, key).map(|v| int(v, node, key)).transpose()
}

pub(crate) fn bool_property(node: &kdl::KdlNode, key: &str) -> Result<Option<bool>, ConfigError> {
    property(node, key)
        .map(|v| {
            v.as_bool().ok_or_else(|| {
                ConfigError::invalid(format!(
                    "`{}`: {} must be true or false, got {}",
                    node.name().value(),
                    key,
                    v
                ))
            })
        })
        .transpose()
}

fn first_int<T: TryFrom<i64>>(node: &kdl::KdlNode) -> Result<T, ConfigError> {
    let value = arguments(node).next().ok_or_else(|| ConfigError::MissingField {
        field: format!("value for `{}`", node.name().value()),
    })?;
    int(value, node, "value")
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    if let Some(val) = arguments(child).next().and_then(|v| v.as_string()) {
                        global.log_level = val.parse().map_err(|e| ConfigError::Invalid {
                            message: e,
                        })?;
                    }
                }
                "motion-history-size" => {
                    global.motion_history_size = first_int(child)?;
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_screen(node: &kdl::KdlNode) -> Result<ScreenConfig, ConfigError> {
    let width: i32 = int_property(node, "width")?.ok_or_else(|| ConfigError::MissingField {
        field: "screen width (e.g., `screen width=1920 height=1080`)".to_string(),
    })?;
    let height: i32 = int_property(node, "height")?.ok_or_else(|| ConfigError::MissingField {
        field: "screen height (e.g., `screen width=1920 height=1080`)".to_string(),
    })?;

    if width <= 0 || height <= 0 {
        return Err(ConfigError::invalid(format!(
            "screen size must be positive, got {}x{}",
            width, height
        )));
    }

    Ok(ScreenConfig { width, height })
}

fn parse_device(node: &kdl::KdlNode, kind: DeviceKind) -> Result<DeviceConfig, ConfigError> {
    let name = arguments(node)
        .next()
        .and_then(|v| v.as_string())
        .ok_or_else(|| ConfigError::MissingField {
            field: format!(
                "device name (e.g., `{} \"My Device\" id=7`)",
                node.name().value()
            ),
        })?;

    let id: u16 = int_property(node, "id")?.ok_or_else(|| ConfigError::MissingField {
        field: format!("id for device '{}'", name),
    })?;

    let mut device = DeviceConfig::new(name, id, kind);
    device.attach = int_property(node, "attach")?;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "mode" => {
                    if let Some(val) = arguments(child).next().and_then(|v| v.as_string()) {
                        device.mode = val.parse().map_err(|e| ConfigError::Invalid {
                            message: e,
                        })?;
                    }
                }
                "history-size" => {
                    device.history_size = Some(first_int(child)?);
                }
                "axis" => {
                    device.axes.push(parse_axis(child)?);
                }
                "buttons" => {
                    device.buttons = Some(first_int(child)?);
                }
                "transform" => {
                    device.transform = Some(parse_transform(child)?);
                }
                "accel" => {
                    device.accel = Some(parse_accel(child)?);
                }
                "keys" => {
                    device.keys = Some(parse_keys(child)?);
                }
                "disabled" => {
                    device.enabled = false;
                }
                name => {
                    tracing::warn!("Unknown device config option: {}", name);
                }
            }
        }
    }

    Ok(device)
}

fn parse_axis(node: &kdl::KdlNode) -> Result<AxisConfig, ConfigError> {
    let mut axis = AxisConfig::default();
    if let Some(min) = int_property(node, "min")? {
        axis.min = min;
    }
    if let Some(max) = int_property(node, "max")? {
        axis.max = max;
    }
    if let Some(resolution) = int_property(node, "resolution")? {
        axis.resolution = resolution;
    }
    if let Some(label) = int_property(node, "label")? {
        axis.label = label;
    }
    if let Some(mode) = property(node, "mode").and_then(|v| v.as_string()) {
        axis.mode = Some(mode.parse().map_err(|e| ConfigError::Invalid { message: e })?);
    }
    Ok(axis)
}

fn parse_transform(node: &kdl::KdlNode) -> Result<[f64; 9], ConfigError> {
    let values = arguments(node)
        .map(|v| {
            v.as_f64()
                .or_else(|| v.as_i64().map(|i| i as f64))
                .ok_or_else(|| ConfigError::invalid(format!("transform value is not a number: {}", v)))
        })
        .collect::<Result<Vec<f64>, _>>()?;

    values.try_into().map_err(|values: Vec<f64>| {
        ConfigError::invalid(format!(
            "transform needs 9 values (a row-major 3x3 matrix), got {}",
            values.len()
        ))
    })
}

fn parse_accel(node: &kdl::KdlNode) -> Result<AccelConfig, ConfigError> {
    let mut accel = AccelConfig::default();
    if let Some(threshold) = int_property(node, "threshold")? {
        accel.threshold = threshold;
    }
    if let Some(numerator) = int_property(node, "numerator")? {
        accel.numerator = numerator;
    }
    if let Some(denominator) = int_property(node, "denominator")? {
        accel.denominator = denominator;
    }
    if accel.denominator == 0 {
        return Err(ConfigError::invalid("accel denominator must not be zero"));
    }
    Ok(accel)
}

fn parse_keys(node: &kdl::KdlNode) -> Result<KeysConfig, ConfigError> {
    let mut keys = KeysConfig::default();
    if let Some(min) = int_property(node, "min")? {
        keys.min = min;
    }
    if let Some(max) = int_property(node, "max")? {
        keys.max = max;
    }
    if keys.min > keys.max {
        return Err(ConfigError::invalid(format!(
            "keys: min {} is above max {}",
            keys.min, keys.max
        )));
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "autorepeat" => {
                    keys.autorepeat = arguments(child)
                        .next()
                        .and_then(|v| v.as_bool())
                        .ok_or_else(|| ConfigError::invalid("autorepeat must be true or false"))?;
                }
                "repeat" => {
                    let codes = key_codes(child)?;
                    keys.repeat.get_or_insert_with(Vec::new).extend(codes);
                }
                "modifiers" => {
                    keys.modifiers.extend(key_codes(child)?);
                }
                name => {
                    tracing::warn!("Unknown keys option: {}", name);
                }
            }
        }
    }

    Ok(keys)
}

fn key_codes(node: &kdl::KdlNode) -> Result<Vec<u8>, ConfigError> {
    arguments(node).map(|v| int(v, node, "key code")).collect()
}

/// Cross-device checks that need the whole document.
fn validate(config: &Config) -> Result<(), ConfigError> {
    let mut kinds = HashMap::new();

    for device in &config.devices {
        if usize::from(device.id) >= MAX_DEVICES {
            return Err(ConfigError::invalid(format!(
                "device '{}': id {} is out of range (0..{})",
                device.name, device.id, MAX_DEVICES
            )));
        }
        if kinds.insert(device.id, device.kind).is_some() {
            return Err(ConfigError::invalid(format!(
                "device '{}': id {} is already in use",
                device.name, device.id
            )));
        }
        if device.axes.len() > MAX_VALUATORS {
            return Err(ConfigError::invalid(format!(
                "device '{}' has {} axes, at most {} are supported",
                device.name,
                device.axes.len(),
                MAX_VALUATORS
            )));
        }
        if device.buttons.map_or(false, |n| n > MAX_BUTTONS) {
            return Err(ConfigError::invalid(format!(
                "device '{}' has more than {} buttons",
                device.name, MAX_BUTTONS
            )));
        }
        if device.kind != DeviceKind::Slave && device.attach.is_some() {
            return Err(ConfigError::invalid(format!(
                "master '{}' cannot be attached",
                device.name
            )));
        }
    }

    for device in &config.devices {
        let Some(master) = device.attach else {
            continue;
        };
        let wanted = if device.is_key_only() {
            DeviceKind::MasterKeyboard
        } else {
            DeviceKind::MasterPointer
        };
        match kinds.get(&master) {
            None => return Err(ConfigError::UnknownDevice { id: master }),
            Some(kind) if *kind != wanted => {
                return Err(ConfigError::invalid(format!(
                    "device '{}' must attach to a {}, but {} is not one",
                    device.name,
                    if wanted == DeviceKind::MasterKeyboard {
                        "master keyboard"
                    } else {
                        "master pointer"
                    },
                    master
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpx_input_core::AxisMode;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config_str(
            r#"
global {
    log-level "debug"
    motion-history-size 128
}
screen width=1920 height=1080
screen width=1280 height=1024
master-pointer "Virtual core pointer" id=2
master-keyboard "Virtual core keyboard" id=3
device "Tablet" id=7 attach=2 {
    mode "absolute"
    history-size 64
    axis min=0 max=1000
    axis min=0 max=1000 resolution=10 label=42 mode="relative"
    buttons 3
    transform 0.0 1.0 0.0 1.0 0.0 0.0 0.0 0.0 1.0
    accel threshold=2 numerator=3 denominator=2
}
device "Keyboard" id=8 attach=3 {
    keys min=9 max=200 {
        autorepeat false
        repeat 38 41
        modifiers 50 62
    }
    disabled
}
"#,
        )
        .unwrap();

        assert_eq!(config.global.log_level, LogLevel::Debug);
        assert_eq!(config.global.motion_history_size, 128);
        assert_eq!(
            config.screens,
            vec![
                ScreenConfig { width: 1920, height: 1080 },
                ScreenConfig { width: 1280, height: 1024 },
            ]
        );
        assert_eq!(config.devices.len(), 4);

        let tablet = &config.devices[2];
        assert_eq!(tablet.name, "Tablet");
        assert_eq!(tablet.kind, DeviceKind::Slave);
        assert_eq!(tablet.attach, Some(2));
        assert_eq!(tablet.mode, AxisMode::Absolute);
        assert_eq!(tablet.history_size, Some(64));
        assert_eq!(tablet.axes.len(), 2);
        assert_eq!(tablet.axes[0].mode, None);
        assert_eq!(tablet.axes[1].resolution, 10);
        assert_eq!(tablet.axes[1].label, 42);
        assert_eq!(tablet.axes[1].mode, Some(AxisMode::Relative));
        assert_eq!(tablet.buttons, Some(3));
        assert_eq!(tablet.transform.map(|m| m[1]), Some(1.0));
        assert_eq!(
            tablet.accel,
            Some(AccelConfig { threshold: 2, numerator: 3, denominator: 2 })
        );

        let kbd = &config.devices[3];
        assert!(!kbd.enabled);
        assert!(kbd.is_key_only());
        let keys = kbd.keys.as_ref().unwrap();
        assert_eq!((keys.min, keys.max), (9, 200));
        assert!(!keys.autorepeat);
        assert_eq!(keys.repeat, Some(vec![38, 41]));
        assert_eq!(keys.modifiers, vec![50, 62]);
    }

    #[test]
    fn test_empty_config_has_defaults() {
        let config = parse_config_str("").unwrap();
        assert_eq!(config.global.log_level, LogLevel::Info);
        assert_eq!(config.global.motion_history_size, 256);
        assert!(config.screens.is_empty());
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_unknown_nodes_are_ignored() {
        let config = parse_config_str(
            r#"
frobnicate 1
device "Mouse" id=7 {
    wobble true
}
"#,
        )
        .unwrap();
        assert_eq!(config.devices.len(), 1);
    }

    #[test]
    fn test_syntax_error_has_span() {
        let err = parse_config_str("device \"unterminated { ").unwrap_err();
        match err {
            ConfigError::ParseError { src, .. } => assert!(src.contains("unterminated")),
            other => panic!("Expected ParseError, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_device_id() {
        let err = parse_config_str(r#"device "Mouse""#).unwrap_err();
        match err {
            ConfigError::MissingField { field } => assert!(field.contains("Mouse"), "{}", field),
            other => panic!("Expected MissingField, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_device_name() {
        let err = parse_config_str("device id=7").unwrap_err();
        assert!(
            matches!(err, ConfigError::MissingField { .. }),
            "Expected MissingField, got: {:?}",
            err
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = parse_config_str(
            r#"
device "A" id=7
device "B" id=7
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Invalid { message } => assert!(message.contains("already in use")),
            other => panic!("Expected Invalid, got: {:?}", other),
        }
    }

    #[test]
    fn test_id_out_of_range() {
        let err = parse_config_str(r#"device "A" id=256"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got: {:?}", err);

        let err = parse_config_str(r#"device "A" id=-1"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_attach_to_unknown_master() {
        let err = parse_config_str(r#"device "A" id=7 attach=2"#).unwrap_err();
        match err {
            ConfigError::UnknownDevice { id } => assert_eq!(id, 2),
            other => panic!("Expected UnknownDevice, got: {:?}", other),
        }
    }

    #[test]
    fn test_attach_kind_must_match() {
        let err = parse_config_str(
            r#"
master-pointer "mp" id=2
master-keyboard "mk" id=3
device "kbd" id=8 attach=2 {
    keys
}
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Invalid { message } => assert!(message.contains("master keyboard"), "{}", message),
            other => panic!("Expected Invalid, got: {:?}", other),
        }

        let err = parse_config_str(
            r#"
master-pointer "mp" id=2
master-keyboard "mk" id=3
device "mouse" id=7 attach=3
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_attach_to_slave_rejected() {
        let err = parse_config_str(
            r#"
device "A" id=7
device "B" id=8 attach=7
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_too_many_axes() {
        let axes = "axis min=0 max=10\n".repeat(MAX_VALUATORS + 1);
        let err = parse_config_str(&format!("device \"A\" id=7 {{\n{}}}", axes)).unwrap_err();
        match err {
            ConfigError::Invalid { message } => assert!(message.contains("37 axes"), "{}", message),
            other => panic!("Expected Invalid, got: {:?}", other),
        }
    }

    #[test]
    fn test_transform_needs_nine_values() {
        let err = parse_config_str(
            r#"
device "A" id=7 {
    transform 1.0 0.0 0.0
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_transform_accepts_integers() {
        let config = parse_config_str(
            r#"
device "A" id=7 {
    transform 1 0 0 0 1 0 0 0 1
}
"#,
        )
        .unwrap();
        assert_eq!(config.devices[0].transform.unwrap()[4], 1.0);
    }

    #[test]
    fn test_invalid_screen() {
        let err = parse_config_str("screen width=0 height=10").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got: {:?}", err);

        let err = parse_config_str("screen width=10").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_invalid_log_level() {
        let err = parse_config_str(
            r#"
global {
    log-level "chatty"
}
"#,
        )
        .unwrap_err();
        match err {
            ConfigError::Invalid { message } => assert!(message.contains("chatty")),
            other => panic!("Expected Invalid, got: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"master-pointer \"mp\" id=2\ndevice \"mouse\" id=7 attach=2\n",
        )
        .unwrap();

        let config = parse_config(file.path()).unwrap();
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[1].attach, Some(2));
    }

    #[test]
    fn test_parse_config_missing_file() {
        let err = parse_config(Path::new("/nonexistent/mpx-input.kdl")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)), "got: {:?}", err);
    }
}
