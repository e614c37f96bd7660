//! Motion history ring buffer
//!
//! Each device with a valuator class keeps a fixed number of timestamped
//! position snapshots. Records are stored back to back in a byte buffer in
//! one of two little-endian layouts:
//!
//! ```text
//! slave:  [time u32][val_0 i32] ... [val_{n-1} i32]
//! master: [time u32]([min_0 i32][max_0 i32][val_0 i32]) ... x MAX_VALUATORS
//! ```
//!
//! Masters keep the range each value was recorded against, since their
//! effective range changes whenever the active slave changes. Axes outside
//! the recorded span are zero.
//!
//! Query output uses two more layouts:
//!
//! ```text
//! core:   [time u32][x i16][y i16]               (screen coordinates)
//! device: [time u32][val_0 i32] ... [val_{n-1} i32]
//! ```

use crate::axis::{rescale, AxisInfo};
use crate::error::HistoryError;
use crate::screen::Screen;
use crate::MAX_VALUATORS;

/// Default ring capacity.
pub const MOTION_HISTORY_SIZE: usize = 256;

const TIME_SIZE: usize = 4;
const VALUE_SIZE: usize = 4;
const MASTER_AXIS_SIZE: usize = 3 * VALUE_SIZE;

/// Size of one record in the legacy core output layout.
pub const CORE_RECORD_SIZE: usize = TIME_SIZE + 2 * 2;

/// Number of records a motion history holds by default.
pub fn get_motion_history_size() -> usize {
    MOTION_HISTORY_SIZE
}

fn write_u32(out: &mut [u8], value: u32) {
    out[..4].copy_from_slice(&value.to_le_bytes());
}

fn write_i32(out: &mut [u8], value: i32) {
    out[..4].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Binary layout of the records in a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLayout {
    Master,
    Slave { num_axes: usize },
}

impl HistoryLayout {
    pub fn record_size(&self) -> usize {
        match self {
            HistoryLayout::Master => TIME_SIZE + MASTER_AXIS_SIZE * MAX_VALUATORS,
            HistoryLayout::Slave { num_axes } => TIME_SIZE + VALUE_SIZE * num_axes,
        }
    }
}

/// One axis of a master record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisSample {
    pub min_value: i32,
    pub max_value: i32,
    pub value: i32,
}

impl AxisSample {
    fn range(&self) -> AxisInfo {
        AxisInfo::new(self.min_value, self.max_value)
    }
}

/// Decoded master-layout record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRecord {
    pub time: u32,
    pub axes: [AxisSample; MAX_VALUATORS],
}

impl MasterRecord {
    pub fn encode(&self, out: &mut [u8]) {
        write_u32(out, self.time);
        for (i, axis) in self.axes.iter().enumerate() {
            let at = TIME_SIZE + i * MASTER_AXIS_SIZE;
            write_i32(&mut out[at..], axis.min_value);
            write_i32(&mut out[at + 4..], axis.max_value);
            write_i32(&mut out[at + 8..], axis.value);
        }
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let mut axes = [AxisSample::default(); MAX_VALUATORS];
        for (i, axis) in axes.iter_mut().enumerate() {
            let at = TIME_SIZE + i * MASTER_AXIS_SIZE;
            axis.min_value = read_i32(&bytes[at..]);
            axis.max_value = read_i32(&bytes[at + 4..]);
            axis.value = read_i32(&bytes[at + 8..]);
        }
        Self {
            time: read_u32(bytes),
            axes,
        }
    }
}

/// Decoded slave-layout record. Only the first `num_axes` values are used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveRecord {
    pub time: u32,
    pub num_axes: usize,
    pub values: [i32; MAX_VALUATORS],
}

impl SlaveRecord {
    pub fn encode(&self, out: &mut [u8]) {
        write_u32(out, self.time);
        for (i, value) in self.values[..self.num_axes].iter().enumerate() {
            write_i32(&mut out[TIME_SIZE + i * VALUE_SIZE..], *value);
        }
    }

    pub fn decode(bytes: &[u8], num_axes: usize) -> Self {
        let mut values = [0; MAX_VALUATORS];
        for (i, value) in values[..num_axes].iter_mut().enumerate() {
            *value = read_i32(&bytes[TIME_SIZE + i * VALUE_SIZE..]);
        }
        Self {
            time: read_u32(bytes),
            num_axes,
            values,
        }
    }

    pub fn values(&self) -> &[i32] {
        &self.values[..self.num_axes]
    }
}

/// A record as stored in the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryRecord {
    Master(MasterRecord),
    Slave(SlaveRecord),
}

impl HistoryRecord {
    pub fn time(&self) -> u32 {
        match self {
            HistoryRecord::Master(r) => r.time,
            HistoryRecord::Slave(r) => r.time,
        }
    }
}

/// One record of [`QueryMode::Core`] output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreTimeCoord {
    pub time: u32,
    pub x: i16,
    pub y: i16,
}

impl CoreTimeCoord {
    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            time: read_u32(bytes),
            x: i16::from_le_bytes([bytes[4], bytes[5]]),
            y: i16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }
}

/// How [`MotionHistory::query`] lays out its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// x/y only, as 16-bit screen coordinates.
    Core,
    /// Every current axis, as 32-bit values in the device's current ranges.
    Device,
}

/// Fixed-capacity ring of motion records.
#[derive(Debug, Clone)]
pub struct MotionHistory {
    layout: HistoryLayout,
    capacity: usize,
    first: usize,
    last: usize,
    len: usize,
    buffer: Vec<u8>,
}

impl MotionHistory {
    /// A history that records nothing.
    pub fn disabled(layout: HistoryLayout) -> Self {
        Self {
            layout,
            capacity: 0,
            first: 0,
            last: 0,
            len: 0,
            buffer: Vec::new(),
        }
    }

    /// Allocate a zeroed ring for `capacity` records.
    pub fn allocate(layout: HistoryLayout, capacity: usize) -> Result<Self, HistoryError> {
        if capacity == 0 {
            return Ok(Self::disabled(layout));
        }

        let bytes = layout
            .record_size()
            .checked_mul(capacity)
            .ok_or(HistoryError::AllocationFailed { bytes: usize::MAX })?;

        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(bytes)
            .map_err(|_| HistoryError::AllocationFailed { bytes })?;
        buffer.resize(bytes, 0);

        Ok(Self {
            layout,
            capacity,
            first: 0,
            last: 0,
            len: 0,
            buffer,
        })
    }

    pub fn layout(&self) -> HistoryLayout {
        self.layout
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Bytes per record written by [`MotionHistory::query`] for a device
    /// with `num_axes` current axes.
    pub fn output_stride(mode: QueryMode, num_axes: usize) -> usize {
        match mode {
            QueryMode::Core => CORE_RECORD_SIZE,
            QueryMode::Device => TIME_SIZE + VALUE_SIZE * num_axes,
        }
    }

    fn slot(&self, index: usize) -> &[u8] {
        let size = self.layout.record_size();
        &self.buffer[index * size..(index + 1) * size]
    }

    fn slot_mut(&mut self, index: usize) -> &mut [u8] {
        let size = self.layout.record_size();
        &mut self.buffer[index * size..(index + 1) * size]
    }

    /// Append a record for valuators `first_valuator..first_valuator + values.len()`.
    ///
    /// `axes` are the recording device's axes; masters store each value
    /// together with its axis range. Values beyond the device's axes are
    /// dropped. Once full, the oldest record is overwritten.
    pub fn record(&mut self, axes: &[AxisInfo], time: u32, first_valuator: usize, values: &[i32]) {
        if self.capacity == 0 {
            return;
        }

        let span = first_valuator..(first_valuator + values.len()).min(axes.len());
        let index = self.last;

        match self.layout {
            HistoryLayout::Master => {
                let mut record = MasterRecord {
                    time,
                    axes: [AxisSample::default(); MAX_VALUATORS],
                };
                for i in span.clone().take_while(|i| *i < MAX_VALUATORS) {
                    record.axes[i] = AxisSample {
                        min_value: axes[i].min_value,
                        max_value: axes[i].max_value,
                        value: values[i - first_valuator],
                    };
                }
                record.encode(self.slot_mut(index));
            }
            HistoryLayout::Slave { num_axes } => {
                let mut record = SlaveRecord {
                    time,
                    num_axes,
                    values: [0; MAX_VALUATORS],
                };
                for i in span.take_while(|i| *i < num_axes) {
                    record.values[i] = values[i - first_valuator];
                }
                record.encode(self.slot_mut(index));
            }
        }

        self.last = (self.last + 1) % self.capacity;
        if self.len == self.capacity {
            self.first = (self.first + 1) % self.capacity;
        } else {
            self.len += 1;
        }
    }

    /// Decode the stored records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = HistoryRecord> + '_ {
        (0..self.len).map(move |n| {
            let bytes = self.slot((self.first + n) % self.capacity);
            match self.layout {
                HistoryLayout::Master => HistoryRecord::Master(MasterRecord::decode(bytes)),
                HistoryLayout::Slave { num_axes } => {
                    HistoryRecord::Slave(SlaveRecord::decode(bytes, num_axes))
                }
            }
        })
    }

    /// Copy records with `start <= time <= stop` into `out`, returning how
    /// many were written.
    ///
    /// Records are time ordered, so the scan ends at the first record newer
    /// than `stop`. `axes` are the device's current axes. In
    /// [`QueryMode::Core`] a screen is required and x/y are scaled to it;
    /// in [`QueryMode::Device`] master records are rescaled from their
    /// recorded ranges into the current ones. `out` should hold
    /// `capacity * output_stride` bytes; copying stops when it is full.
    pub fn query(
        &self,
        axes: &[AxisInfo],
        start: u32,
        stop: u32,
        screen: Option<Screen>,
        mode: QueryMode,
        out: &mut [u8],
    ) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        if mode == QueryMode::Core && screen.is_none() {
            return 0;
        }

        let num_axes = axes.len().min(MAX_VALUATORS);
        let stride = Self::output_stride(mode, num_axes);
        let mut written = 0;

        for record in self.records() {
            if record.time() > stop {
                break;
            }
            if record.time() < start {
                continue;
            }
            let at = written * stride;
            if at + stride > out.len() {
                break;
            }
            let out = &mut out[at..at + stride];

            match mode {
                QueryMode::Core => {
                    if let Some(screen) = screen {
                        self.write_core(&record, axes, screen, out);
                    }
                }
                QueryMode::Device => self.write_device(&record, axes, num_axes, screen, out),
            }
            written += 1;
        }

        written
    }

    fn write_core(&self, record: &HistoryRecord, axes: &[AxisInfo], screen: Screen, out: &mut [u8]) {
        let extents = [screen.width, screen.height];
        let mut coords = [0i16; 2];

        for (i, coord) in coords.iter_mut().enumerate() {
            let (value, from) = match record {
                HistoryRecord::Master(r) => (r.axes[i].value, r.axes[i].range()),
                HistoryRecord::Slave(r) => (
                    r.values[i],
                    axes.get(i).copied().unwrap_or_else(AxisInfo::unranged),
                ),
            };
            let to = AxisInfo::new(0, extents[i]);
            let (scaled, _) = rescale(value, 0.0, Some(&from), Some(&to), extents[i]);
            *coord = scaled.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        }

        write_u32(out, record.time());
        out[4..6].copy_from_slice(&coords[0].to_le_bytes());
        out[6..8].copy_from_slice(&coords[1].to_le_bytes());
    }

    fn write_device(
        &self,
        record: &HistoryRecord,
        axes: &[AxisInfo],
        num_axes: usize,
        screen: Option<Screen>,
        out: &mut [u8],
    ) {
        write_u32(out, record.time());

        for (j, axis) in axes.iter().take(num_axes).enumerate() {
            let value = match record {
                HistoryRecord::Slave(r) => r.values.get(j).copied().unwrap_or(0),
                HistoryRecord::Master(r) => {
                    let extent = match (j, screen) {
                        (0, Some(s)) => s.width,
                        (1, Some(s)) => s.height,
                        _ => 0,
                    };
                    let mut from = r.axes[j].range();
                    if j < 2 && !from.has_range() {
                        from = AxisInfo::new(0, extent);
                    }
                    rescale(r.axes[j].value, 0.0, Some(&from), Some(axis), extent).0
                }
            };
            write_i32(&mut out[TIME_SIZE + j * VALUE_SIZE..], value);
        }
    }
}
