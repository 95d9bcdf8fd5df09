// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Strata Authors

//! Logical-type conversion: physical values into dates, times,
//! timestamps, decimals and UUIDs.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use snafu::location;
use strata_core::{Error, Result};

use crate::meta::TimeUnit;

/// DATE: days since the Unix epoch.
pub fn date_from_days(days: i32) -> Result<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
    epoch
        .checked_add_signed(chrono::Duration::days(days as i64))
        .ok_or_else(|| {
            Error::type_mismatch(format!("date value {days} days is out of range"), location!())
        })
}

/// TIME: time of day in the annotated unit.
pub fn time_from_value(value: i64, unit: TimeUnit) -> Result<NaiveTime> {
    let (secs, nanos) = match unit {
        TimeUnit::Millis => (value / 1_000, (value % 1_000) * 1_000_000),
        TimeUnit::Micros => (value / 1_000_000, (value % 1_000_000) * 1_000),
        TimeUnit::Nanos => (value / 1_000_000_000, value % 1_000_000_000),
    };
    if !(0..86_400).contains(&secs) || nanos < 0 {
        return Err(Error::type_mismatch(
            format!("time value {value} ({unit:?}) is out of range"),
            location!(),
        ));
    }
    NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, nanos as u32).ok_or_else(|| {
        Error::type_mismatch(
            format!("time value {value} ({unit:?}) is out of range"),
            location!(),
        )
    })
}

/// TIMESTAMP: instant since the Unix epoch in the annotated unit.
pub fn timestamp_from_value(value: i64, unit: TimeUnit) -> Result<DateTime<Utc>> {
    let timestamp = match unit {
        TimeUnit::Millis => DateTime::from_timestamp_millis(value),
        TimeUnit::Micros => DateTime::from_timestamp_micros(value),
        TimeUnit::Nanos => Some(DateTime::from_timestamp_nanos(value)),
    };
    timestamp.ok_or_else(|| {
        Error::type_mismatch(
            format!("timestamp value {value} ({unit:?}) is out of range"),
            location!(),
        )
    })
}

/// A DECIMAL value: an unscaled integer and its scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: i32,
}

impl Decimal {
    pub fn from_i64(value: i64, scale: i32) -> Self {
        Self {
            unscaled: value as i128,
            scale,
        }
    }

    /// From the big-endian two's-complement bytes of a (fixed-length)
    /// byte-array decimal.
    pub fn from_be_bytes(bytes: &[u8], scale: i32) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > 16 {
            return Err(Error::type_mismatch(
                format!("decimal of {} bytes is not representable", bytes.len()),
                location!(),
            ));
        }
        let negative = bytes[0] & 0x80 != 0;
        let mut buf = if negative { [0xFFu8; 16] } else { [0u8; 16] };
        buf[16 - bytes.len()..].copy_from_slice(bytes);
        Ok(Self {
            unscaled: i128::from_be_bytes(buf),
            scale,
        })
    }
}

impl std::fmt::Display for Decimal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scale <= 0 {
            let mut value = self.unscaled;
            for _ in 0..-self.scale {
                value *= 10;
            }
            return write!(f, "{value}");
        }
        let scale = self.scale as u32;
        let divisor = 10i128.pow(scale);
        let whole = self.unscaled / divisor;
        let frac = (self.unscaled % divisor).unsigned_abs();
        let sign = if self.unscaled < 0 && whole == 0 { "-" } else { "" };
        write!(f, "{sign}{whole}.{frac:0width$}", width = scale as usize)
    }
}

/// UUID: the 16-byte fixed value, hyphenated lowercase.
pub fn uuid_string(bytes: &[u8]) -> Result<String> {
    if bytes.len() != 16 {
        return Err(Error::type_mismatch(
            format!("UUID needs 16 bytes, found {}", bytes.len()),
            location!(),
        ));
    }
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    Ok(format!(
        "{}-{}-{}-{}-{}",
        hex[0..4].join(""),
        hex[4..6].join(""),
        hex[6..8].join(""),
        hex[8..10].join(""),
        hex[10..16].join("")
    ))
}
