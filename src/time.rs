//! Date and time fields used by DVB Service Information tables.
//!
//! Times are carried as a 16-bit _Modified Julian Date_ followed by six binary coded decimal
//! digits `hh mm ss`, e.g. the `start_time` of an event in the Event Information Table.
//! Durations are just the six BCD digits.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::fmt;

/// Decodes a pair of binary coded decimal digits, returning `None` if either nibble is not a
/// decimal digit.
fn bcd(v: u8) -> Option<u8> {
    let hi = v >> 4;
    let lo = v & 0x0f;
    if hi > 9 || lo > 9 {
        None
    } else {
        Some(hi * 10 + lo)
    }
}

/// A calendar date decoded from a Modified Julian Date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MjdDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl MjdDate {
    /// Converts a Modified Julian Date to a Gregorian calendar date, using the conversion given
    /// in _ETSI EN 300 468, Annex C_.  The conversion is valid for dates between 1900-03-01 and
    /// 2100-02-28.
    pub fn from_mjd(mjd: u16) -> MjdDate {
        let mjd = f64::from(mjd);
        let y = ((mjd - 15078.2) / 365.25).floor();
        let y_days = (y * 365.25).floor();
        let m = ((mjd - 14956.1 - y_days) / 30.6001).floor();
        let d = mjd - 14956.0 - y_days - (m * 30.6001).floor();
        let k = if m == 14.0 || m == 15.0 { 1.0 } else { 0.0 };
        MjdDate {
            year: (y + k + 1900.0) as i32,
            month: (m - 1.0 - 12.0 * k) as u32,
            day: d as u32,
        }
    }

    /// `None` if the decoded values do not form a real date
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// A 40-bit UTC date and time value: 16 bits of MJD, then `hh mm ss` as BCD.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StartTime(u64);

impl StartTime {
    /// The all-ones bit pattern, signalling that the time is undefined (e.g. for an NVOD
    /// reference event).
    pub const UNDEFINED: u64 = 0xff_ffff_ffff;

    /// The top 24 bits of the given value are ignored.
    pub fn new(raw: u64) -> StartTime {
        StartTime(raw & Self::UNDEFINED)
    }

    /// Panics if fewer than 5 bytes are supplied
    pub(crate) fn from_slice(data: &[u8]) -> StartTime {
        StartTime(
            u64::from(data[0]) << 32
                | u64::from(data[1]) << 24
                | u64::from(data[2]) << 16
                | u64::from(data[3]) << 8
                | u64::from(data[4]),
        )
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_undefined(&self) -> bool {
        self.0 == Self::UNDEFINED
    }

    /// The Modified Julian Date from the top 16 bits
    pub fn mjd(&self) -> u16 {
        (self.0 >> 24) as u16
    }

    pub fn date(&self) -> MjdDate {
        MjdDate::from_mjd(self.mjd())
    }

    fn bcd_byte(&self, shift: u32) -> u8 {
        (self.0 >> shift) as u8
    }

    pub fn hour(&self) -> Option<u8> {
        bcd(self.bcd_byte(16))
    }
    pub fn minute(&self) -> Option<u8> {
        bcd(self.bcd_byte(8))
    }
    pub fn second(&self) -> Option<u8> {
        bcd(self.bcd_byte(0))
    }

    /// Converts to a `chrono` date-time, returning `None` if the value is undefined, has
    /// non-decimal BCD digits, or does not describe a real point in time.
    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        if self.is_undefined() {
            return None;
        }
        self.date().to_naive_date()?.and_hms_opt(
            u32::from(self.hour()?),
            u32::from(self.minute()?),
            u32::from(self.second()?),
        )
    }
}

impl fmt::Debug for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StartTime({:010x} {})", self.0, self)
    }
}

impl fmt::Display for StartTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_undefined() {
            return f.write_str("undefined");
        }
        let date = self.date();
        write!(
            f,
            "{:04}-{:02}-{:02} {:02x}:{:02x}:{:02x}",
            date.year,
            date.month,
            date.day,
            self.bcd_byte(16),
            self.bcd_byte(8),
            self.bcd_byte(0)
        )
    }
}

/// A 24-bit duration value, `hh mm ss` as BCD.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventDuration(u32);

impl EventDuration {
    pub const UNDEFINED: u32 = 0xff_ffff;

    /// The top 8 bits of the given value are ignored.
    pub fn new(raw: u32) -> EventDuration {
        EventDuration(raw & Self::UNDEFINED)
    }

    /// Panics if fewer than 3 bytes are supplied
    pub(crate) fn from_slice(data: &[u8]) -> EventDuration {
        EventDuration(u32::from(data[0]) << 16 | u32::from(data[1]) << 8 | u32::from(data[2]))
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_undefined(&self) -> bool {
        self.0 == Self::UNDEFINED
    }

    pub fn hours(&self) -> Option<u8> {
        bcd((self.0 >> 16) as u8)
    }
    pub fn minutes(&self) -> Option<u8> {
        bcd((self.0 >> 8) as u8)
    }
    pub fn seconds(&self) -> Option<u8> {
        bcd(self.0 as u8)
    }

    /// `None` if undefined or if any digit is not valid BCD
    pub fn to_duration(&self) -> Option<TimeDelta> {
        if self.is_undefined() {
            return None;
        }
        let minutes = self.minutes()?;
        let seconds = self.seconds()?;
        if minutes > 59 || seconds > 59 {
            return None;
        }
        let total = i64::from(self.hours()?) * 3600 + i64::from(minutes) * 60 + i64::from(seconds);
        TimeDelta::try_seconds(total)
    }
}

impl fmt::Debug for EventDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventDuration({:06x})", self.0)
    }
}

impl fmt::Display for EventDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}",
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8
        )
    }
}
