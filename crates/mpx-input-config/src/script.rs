//! Replay scripts
//!
//! A script is a KDL document with one node per driver sample:
//!
//! ```kdl
//! motion 7 500 500 time=10 absolute=true
//! button-press 7 button=1 time=12
//! key-press 3 key=41 time=20
//! proximity-out 7 time=31
//! ```
//!
//! The first argument is the device id; any further arguments are valuator
//! values for axes `first..`.

use std::path::Path;

use mpx_input_core::{
    Clock, DeviceId, EventType, InputContext, InternalEvent, PointerFlags, ScreenGeometry,
    SynthError,
};

use crate::error::ConfigError;
use crate::parser::{arguments, bool_property, int, parse_document, property};

/// One driver sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub device: DeviceId,
    pub event_type: EventType,
    /// Clock value to set before the sample is built.
    pub time: Option<u32>,
    /// Button number or key code.
    pub detail: u32,
    pub flags: PointerFlags,
    pub first: usize,
    pub valuators: Vec<i32>,
}

impl Sample {
    pub fn new(device: DeviceId, event_type: EventType) -> Self {
        Self {
            device,
            event_type,
            time: None,
            detail: 0,
            flags: PointerFlags::RELATIVE,
            first: 0,
            valuators: Vec::new(),
        }
    }

    /// Run the builder matching this sample's event type.
    pub fn synthesize<S: ScreenGeometry, C: Clock>(
        &self,
        ctx: &mut InputContext<S, C>,
        events: &mut [InternalEvent],
    ) -> Result<usize, SynthError> {
        match self.event_type {
            EventType::Motion | EventType::ButtonPress | EventType::ButtonRelease => ctx
                .try_get_pointer_events(
                    events,
                    self.device,
                    self.event_type,
                    self.detail,
                    self.flags,
                    self.first,
                    &self.valuators,
                ),
            EventType::KeyPress | EventType::KeyRelease => ctx.try_get_keyboard_valuator_events(
                events,
                self.device,
                self.event_type,
                self.detail,
                self.first,
                &self.valuators,
            ),
            EventType::ProximityIn | EventType::ProximityOut => ctx.try_get_proximity_events(
                events,
                self.device,
                self.event_type,
                self.first,
                &self.valuators,
            ),
        }
    }
}

/// Parse a replay script from the given path.
pub fn parse_script(path: &Path) -> Result<Vec<Sample>, ConfigError> {
    let path = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let content = std::fs::read_to_string(path)?;
    parse_script_str(&content)
}

/// Parse a replay script from a string.
pub fn parse_script_str(content: &str) -> Result<Vec<Sample>, ConfigError> {
    let doc = parse_document(content)?;

    let mut samples = Vec::new();
    for node in doc.nodes() {
        let event_type = match node.name().value() {
            "motion" => EventType::Motion,
            "button-press" => EventType::ButtonPress,
            "button-release" => EventType::ButtonRelease,
            "key-press" => EventType::KeyPress,
            "key-release" => EventType::KeyRelease,
            "proximity-in" => EventType::ProximityIn,
            "proximity-out" => EventType::ProximityOut,
            name => {
                tracing::warn!("Unknown sample type: {}", name);
                continue;
            }
        };
        samples.push(parse_sample(node, event_type)?);
    }

    Ok(samples)
}

fn parse_sample(node: &kdl::KdlNode, event_type: EventType) -> Result<Sample, ConfigError> {
    let mut args = arguments(node);
    let device: u16 = match args.next() {
        Some(value) => int(value, node, "device id")?,
        None => {
            return Err(ConfigError::MissingField {
                field: format!("device id (e.g., `{} 7`)", node.name().value()),
            })
        }
    };

    let mut sample = Sample::new(DeviceId(device), event_type);
    sample.valuators = args
        .map(|v| int(v, node, "valuator"))
        .collect::<Result<_, _>>()?;

    if let Some(time) = property(node, "time") {
        sample.time = Some(int(time, node, "time")?);
    }
    if let Some(first) = property(node, "first") {
        sample.first = int(first, node, "first")?;
    }

    let detail_key = match event_type {
        EventType::ButtonPress | EventType::ButtonRelease => Some("button"),
        EventType::KeyPress | EventType::KeyRelease => Some("key"),
        _ => None,
    };
    if let Some(key) = detail_key {
        let value = property(node, key).ok_or_else(|| ConfigError::MissingField {
            field: format!("{} for `{}`", key, node.name().value()),
        })?;
        sample.detail = int(value, node, key)?;
    }

    if bool_property(node, "absolute")?.unwrap_or(false) {
        sample.flags = PointerFlags::ABSOLUTE;
    }
    if bool_property(node, "accelerate")?.unwrap_or(false) {
        sample.flags |= PointerFlags::ACCELERATE;
    }
    if bool_property(node, "screen")?.unwrap_or(false) {
        sample.flags |= PointerFlags::SCREEN;
    }

    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::build_context;
    use crate::parser::parse_config_str;
    use mpx_input_core::{EventList, ManualClock};

    #[test]
    fn test_parse_samples() {
        let samples = parse_script_str(
            r#"
motion 7 500 500 time=10 absolute=true screen=false accelerate=false first=0
motion 7 3 -4 accelerate=true
button-press 7 button=1 time=12
key-press 3 key=41 time=20
proximity-in 7 10 10 time=30
proximity-out 7 time=31
"#,
        )
        .unwrap();
        assert_eq!(samples.len(), 6);

        let abs = &samples[0];
        assert_eq!(abs.device, DeviceId(7));
        assert_eq!(abs.time, Some(10));
        assert_eq!(abs.flags, PointerFlags::ABSOLUTE);
        assert_eq!(abs.valuators, vec![500, 500]);

        let rel = &samples[1];
        assert_eq!(rel.time, None);
        assert_eq!(rel.flags, PointerFlags::RELATIVE | PointerFlags::ACCELERATE);
        assert_eq!(rel.valuators, vec![3, -4]);

        assert_eq!(samples[2].event_type, EventType::ButtonPress);
        assert_eq!(samples[2].detail, 1);
        assert!(samples[2].valuators.is_empty());
        assert_eq!(samples[3].event_type, EventType::KeyPress);
        assert_eq!(samples[3].detail, 41);
        assert_eq!(samples[4].valuators, vec![10, 10]);
        assert_eq!(samples[5].event_type, EventType::ProximityOut);
    }

    #[test]
    fn test_first_offsets_valuators() {
        let samples = parse_script_str("motion 7 12 first=2").unwrap();
        assert_eq!(samples[0].first, 2);
        assert_eq!(samples[0].valuators, vec![12]);
    }

    #[test]
    fn test_missing_detail() {
        let err = parse_script_str("button-press 7").unwrap_err();
        match err {
            ConfigError::MissingField { field } => assert!(field.contains("button"), "{}", field),
            other => panic!("Expected MissingField, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_device() {
        let err = parse_script_str("motion").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_bad_flag_value() {
        let err = parse_script_str(r#"motion 7 1 1 absolute="yes""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got: {:?}", err);
    }

    #[test]
    fn test_unknown_sample_is_skipped() {
        let samples = parse_script_str("wiggle 7\nmotion 7 1 1").unwrap();
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_replay_through_context() {
        let config = parse_config_str(
            r#"
screen width=1000 height=1000
master-pointer "mp" id=2
master-keyboard "mk" id=3
device "mouse" id=7 attach=2 {
    axis
    axis
    buttons 3
}
device "kbd" id=8 attach=3 {
    keys
}
"#,
        )
        .unwrap();
        let samples = parse_script_str(
            r#"
motion 7 10 20 time=5
button-press 7 button=1 time=6
key-press 8 key=41 time=7
key-press 8 key=300 time=8
"#,
        )
        .unwrap();

        let mut ctx = build_context(&config, ManualClock::new(0)).unwrap();
        let mut list = EventList::with_maximum();
        let mut counts = Vec::new();
        for sample in &samples {
            if let Some(time) = sample.time {
                ctx.clock().set(time);
            }
            let (events, _) = list.slots_mut();
            counts.push(sample.synthesize(&mut ctx, events));
        }

        assert_eq!(counts[0], Ok(3), "first motion switches the master to the mouse");
        assert_eq!(counts[1], Ok(2));
        assert_eq!(counts[2], Ok(3), "first key switches the master keyboard");
        assert_eq!(counts[3], Err(SynthError::KeyCodeOutOfRange(300)));

        let master = ctx.devices().get(DeviceId(2)).unwrap();
        assert_eq!(&master.last.valuators[..2], &[10, 20]);
    }
}
