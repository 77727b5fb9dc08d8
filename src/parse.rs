//! Binary decoder for ECG characteristic payloads.
//!
//! [`decode`] is pure and allocation-free; it is safe to call from any async
//! or sync context.  The wire format is chosen by payload length alone:
//!
//! | Length | Format | Conversion |
//! |---|---|---|
//! | ≥ 4 | [`PayloadFormat::Float32`] | bytes 0–3 as `f32` LE, already mV |
//! | 2–3 | [`PayloadFormat::Int16Milli`] | bytes 0–1 as `i16` LE ÷ 1000 |
//! | 1 | [`PayloadFormat::Byte`] | byte 0 as `u8` ÷ 10 |
//! | 0 | - | [`EcgError::InvalidPayload`] |
//!
//! Bytes beyond the first 4 are ignored.  A `Float32` payload holding NaN or
//! an infinity is also [`EcgError::InvalidPayload`].

use crate::error::{EcgError, Result};

/// Scale of the 16-bit format: raw counts are µV.
const INT16_COUNTS_PER_MV: f64 = 1000.0;

/// Scale of the 8-bit format: raw counts are tenths of a mV.
const BYTE_COUNTS_PER_MV: f64 = 10.0;

/// The three payload encodings, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Float32,
    Int16Milli,
    Byte,
}

impl PayloadFormat {
    /// Pick the format for a payload of `len` bytes; `None` when empty.
    pub fn detect(len: usize) -> Option<Self> {
        match len {
            0 => None,
            1 => Some(PayloadFormat::Byte),
            2 | 3 => Some(PayloadFormat::Int16Milli),
            _ => Some(PayloadFormat::Float32),
        }
    }
}

/// Decode one notification or read into a millivolt value.
///
/// # Example
///
/// ```
/// # use ecg_rs::parse::decode;
/// assert_eq!(decode(&[0x00, 0x00, 0x80, 0x3F]).unwrap(), 1.0);
/// assert_eq!(decode(&[0xE8, 0x03]).unwrap(), 1.0);
/// assert_eq!(decode(&[10]).unwrap(), 1.0);
/// assert!(decode(&[]).is_err());
/// ```
pub fn decode(data: &[u8]) -> Result<f64> {
    let format = PayloadFormat::detect(data.len()).ok_or(EcgError::InvalidPayload)?;
    let mv = match format {
        PayloadFormat::Float32 => {
            let v = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            if !v.is_finite() {
                return Err(EcgError::InvalidPayload);
            }
            v as f64
        }
        PayloadFormat::Int16Milli => {
            i16::from_le_bytes([data[0], data[1]]) as f64 / INT16_COUNTS_PER_MV
        }
        PayloadFormat::Byte => data[0] as f64 / BYTE_COUNTS_PER_MV,
    };
    Ok(mv)
}
