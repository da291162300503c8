//! Environmental sample notifications and their CSV rendering.
//!
//! Wire layout (11 bytes, little endian, packed):
//!
//! ```text
//! [seq:u16][temp_val:i16][temp_scale:i8][hum_val:i16][hum_scale:i8][press_val:i16][press_scale:i8]
//! ```
//!
//! A value/scale pair means `value * 10^scale` in the unit of the sensor
//! (°C, %RH, hPa). Extra trailing bytes are ignored.

use core::fmt;

/// Size of one sample on the wire.
pub const SAMPLE_LEN: usize = 11;

/// First line written by every sink.
pub const CSV_HEADER: &str =
    "device,seq,temp_val,temp_scale,hum_val,hum_scale,press_val,press_scale,rssi";

/// A value with its decimal exponent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Measurement {
    pub value: i16,
    pub scale: i8,
}

impl Measurement {
    pub const fn new(value: i16, scale: i8) -> Self {
        Self { value, scale }
    }

    fn from_le(bytes: &[u8]) -> Self {
        Self {
            value: i16::from_le_bytes([bytes[0], bytes[1]]),
            scale: bytes[2] as i8,
        }
    }

    fn write_le(&self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.value.to_le_bytes());
        out[2] = self.scale as u8;
    }
}

/// One decoded sensor notification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub seq: u16,
    pub temperature: Measurement,
    pub humidity: Measurement,
    pub pressure: Measurement,
}

impl Sample {
    /// Parse from raw notification bytes. `None` if shorter than
    /// [`SAMPLE_LEN`].
    pub fn from_ble_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < SAMPLE_LEN {
            return None;
        }
        Some(Self {
            seq: u16::from_le_bytes([data[0], data[1]]),
            temperature: Measurement::from_le(&data[2..5]),
            humidity: Measurement::from_le(&data[5..8]),
            pressure: Measurement::from_le(&data[8..11]),
        })
    }

    /// Serialize into `buf`, returning bytes written (0 if `buf` is too small).
    pub fn serialize(&self, buf: &mut [u8]) -> usize {
        if buf.len() < SAMPLE_LEN {
            return 0;
        }
        buf[..2].copy_from_slice(&self.seq.to_le_bytes());
        self.temperature.write_le(&mut buf[2..5]);
        self.humidity.write_le(&mut buf[5..8]);
        self.pressure.write_le(&mut buf[8..11]);
        SAMPLE_LEN
    }
}

/// A sample paired with the identity and signal strength of its sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleRecord<'a> {
    pub device: &'a str,
    pub sample: Sample,
    pub rssi: i8,
}

/// One CSV line, without the trailing newline.
impl fmt::Display for SampleRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.sample;
        write!(
            f,
            "{},{},{},{},{},{},{},{},{}",
            self.device,
            s.seq,
            s.temperature.value,
            s.temperature.scale,
            s.humidity.value,
            s.humidity.scale,
            s.pressure.value,
            s.pressure.scale,
            self.rssi
        )
    }
}

/// Destination for decoded samples.
pub trait RecordSink {
    /// Called once at startup, before any record.
    fn header(&mut self);

    fn record(&mut self, record: &SampleRecord<'_>);
}

/// Writes newline-terminated CSV lines to any `fmt::Write`.
pub struct CsvWriter<W> {
    out: W,
}

impl<W: fmt::Write> CsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: fmt::Write> RecordSink for CsvWriter<W> {
    fn header(&mut self) {
        if writeln!(self.out, "{}", CSV_HEADER).is_err() {
            warn!("csv header dropped");
        }
    }

    fn record(&mut self, record: &SampleRecord<'_>) {
        if writeln!(self.out, "{}", record).is_err() {
            warn!("csv record dropped (seq={})", record.sample.seq);
        }
    }
}

/// Prints each line over the defmt transport (RTT on the target).
#[cfg(feature = "defmt")]
pub struct DefmtSink;

/// Longest rendered record: a full-length name plus eight numeric fields.
#[cfg(feature = "defmt")]
const CSV_LINE_MAX: usize = 96;

#[cfg(feature = "defmt")]
impl RecordSink for DefmtSink {
    fn header(&mut self) {
        defmt::println!("{=str}", CSV_HEADER);
    }

    fn record(&mut self, record: &SampleRecord<'_>) {
        use core::fmt::Write as _;

        let mut line: heapless::String<CSV_LINE_MAX> = heapless::String::new();
        if write!(line, "{}", record).is_err() {
            warn!("csv record dropped: {}", crate::error::Error::BufferOverflow);
            return;
        }
        defmt::println!("{=str}", line.as_str());
    }
}
