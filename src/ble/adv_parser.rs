//! Advertisement data (AD structure) parsing.
//!
//! Layout: repeated `[len][type][value; len - 1]`. A zero length byte
//! ends the list (padding); a structure that overruns the buffer makes
//! the whole advertisement malformed.

use heapless::{String, Vec};

use crate::config::DEVICE_NAME_MAX_LEN;
use crate::error::Error;

const AD_TYPE_UUID16_INCOMPLETE: u8 = 0x02;
const AD_TYPE_UUID16_COMPLETE: u8 = 0x03;
const AD_TYPE_NAME_SHORT: u8 = 0x08;
const AD_TYPE_NAME_COMPLETE: u8 = 0x09;

/// 31-byte legacy advertisements fit at most 14 16-bit UUIDs.
pub const MAX_ADV_UUIDS16: usize = 14;

/// Fields of interest from one advertisement.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AdvFields<'a> {
    /// Complete or shortened local name, raw bytes.
    pub name: Option<&'a [u8]>,
    /// All advertised 16-bit service UUIDs (complete and incomplete lists).
    pub uuids16: Vec<u16, MAX_ADV_UUIDS16>,
}

impl AdvFields<'_> {
    pub fn has_uuid16(&self, uuid: u16) -> bool {
        self.uuids16.iter().any(|&u| u == uuid)
    }

    /// Name present and non-empty.
    pub fn has_name(&self) -> bool {
        self.name.is_some_and(|n| !n.is_empty())
    }
}

/// Parse raw advertisement bytes.
pub fn parse_fields(data: &[u8]) -> Result<AdvFields<'_>, Error> {
    let mut fields = AdvFields::default();

    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 {
            break;
        }
        if i + len >= data.len() {
            return Err(Error::AdvMalformed);
        }
        let ad_type = data[i + 1];
        let value = &data[i + 2..i + 1 + len];
        match ad_type {
            AD_TYPE_UUID16_INCOMPLETE | AD_TYPE_UUID16_COMPLETE => {
                for chunk in value.chunks_exact(2) {
                    // Lists longer than a legacy PDU can carry are clipped.
                    let _ = fields.uuids16.push(u16::from_le_bytes([chunk[0], chunk[1]]));
                }
            }
            AD_TYPE_NAME_SHORT | AD_TYPE_NAME_COMPLETE => {
                fields.name = Some(value);
            }
            _ => {}
        }
        i += len + 1;
    }

    Ok(fields)
}

/// Check if raw advertisement data lists `uuid` as a 16-bit service.
pub fn contains_service_uuid(data: &[u8], uuid: u16) -> bool {
    parse_fields(data).is_ok_and(|f| f.has_uuid16(uuid))
}

/// Copy a raw name into a bounded display string.
///
/// One byte becomes one char; anything outside printable ASCII is
/// shown as `?` so the result never exceeds `DEVICE_NAME_MAX_LEN` bytes.
pub fn truncated_name(raw: &[u8]) -> String<DEVICE_NAME_MAX_LEN> {
    let mut name = String::new();
    for &b in raw.iter().take(DEVICE_NAME_MAX_LEN) {
        let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
        if name.push(c).is_err() {
            break;
        }
    }
    name
}

/// Name for diagnostics: the truncated name, or `<none>`.
pub fn display_name(raw: Option<&[u8]>) -> String<DEVICE_NAME_MAX_LEN> {
    match raw {
        Some(n) if !n.is_empty() => truncated_name(n),
        _ => {
            let mut s = String::new();
            let _ = s.push_str("<none>");
            s
        }
    }
}
