//! Timezone handling and timestamp labels.

use std::fmt;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use time_tz::{OffsetDateTimeExt, TimeZone, Tz, timezones};

use crate::error::{ExportError, Result};

const FULL_24: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday], [day padding:none] [month repr:long] [year] [hour]:[minute]"
);
const FULL_12: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday], [day padding:none] [month repr:long] [year] [hour repr:12 padding:none]:[minute] [period]"
);
const TIME_24: &[BorrowedFormatItem<'_>] = format_description!("[hour]:[minute]");
const TIME_12: &[BorrowedFormatItem<'_>] =
    format_description!("[hour repr:12 padding:none]:[minute] [period]");
const SECONDS_24: &[BorrowedFormatItem<'_>] = format_description!("[hour]:[minute]:[second]");
const SECONDS_12: &[BorrowedFormatItem<'_>] =
    format_description!("[hour repr:12 padding:none]:[minute]:[second] [period]");
const SHORT_DATE: &[BorrowedFormatItem<'_>] = format_description!("[day]/[month]/[year]");
const LONG_DATE: &[BorrowedFormatItem<'_>] =
    format_description!("[day padding:none] [month repr:long] [year]");

/// A transcript timezone: a tz database zone or a fixed offset.
#[derive(Clone, Copy)]
pub enum Zone {
    Fixed(UtcOffset),
    /// Offset depends on the instant (DST rules)
    Named(&'static Tz),
}

impl Zone {
    fn localize(&self, at: OffsetDateTime) -> OffsetDateTime {
        match self {
            Zone::Fixed(offset) => at.to_offset(*offset),
            Zone::Named(tz) => at.to_timezone(*tz),
        }
    }

    /// `UTC`, `UTC+05:30` or the zone name, e.g. `Europe/London`
    pub fn label(&self) -> String {
        match self {
            Zone::Fixed(offset) if offset.is_utc() => "UTC".to_string(),
            Zone::Fixed(offset) => {
                let (h, m, _) = offset.as_hms();
                let sign = if offset.is_negative() { '-' } else { '+' };
                format!("UTC{sign}{:02}:{:02}", h.abs(), m.abs())
            }
            Zone::Named(tz) => tz.name().to_string(),
        }
    }
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Zone::Fixed(a), Zone::Fixed(b)) => a == b,
            (Zone::Named(a), Zone::Named(b)) => a.name() == b.name(),
            _ => false,
        }
    }
}

impl Eq for Zone {}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zone({})", self.label())
    }
}

/// Formats instants in the transcript's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    zone: Zone,
    military_time: bool,
    fancy_times: bool,
}

impl Clock {
    pub fn new(timezone: &str, military_time: bool, fancy_times: bool) -> Result<Self> {
        Ok(Self {
            zone: parse_timezone(timezone)?,
            military_time,
            fancy_times,
        })
    }

    pub fn fancy_times(&self) -> bool {
        self.fancy_times
    }

    pub fn zone_label(&self) -> String {
        self.zone.label()
    }

    fn local(&self, at: OffsetDateTime) -> OffsetDateTime {
        self.zone.localize(at)
    }

    fn render(&self, at: OffsetDateTime, format: &[BorrowedFormatItem<'_>]) -> String {
        self.local(at).format(format).unwrap_or_default()
    }

    pub fn full(&self, at: OffsetDateTime) -> String {
        let format = if self.military_time { FULL_24 } else { FULL_12 };
        self.render(at, format)
    }

    pub fn time_of_day(&self, at: OffsetDateTime) -> String {
        let format = if self.military_time { TIME_24 } else { TIME_12 };
        self.render(at, format)
    }

    /// Header label for a message group. With fancy times, messages from the
    /// export day and the day before read "Today at"/"Yesterday at".
    pub fn label(&self, at: OffsetDateTime, now: OffsetDateTime) -> String {
        if !self.fancy_times {
            return self.full(at);
        }
        let day = self.local(at).date();
        let today = self.local(now).date();
        if day == today {
            format!("Today at {}", self.time_of_day(at))
        } else if today.previous_day() == Some(day) {
            format!("Yesterday at {}", self.time_of_day(at))
        } else {
            format!("{} {}", self.render(at, SHORT_DATE), self.time_of_day(at))
        }
    }

    /// Text for an inline `<t:unix:style>` token.
    pub fn styled(&self, at: OffsetDateTime, style: char) -> String {
        match style {
            't' => self.time_of_day(at),
            'T' => {
                let format = if self.military_time { SECONDS_24 } else { SECONDS_12 };
                self.render(at, format)
            }
            'd' => self.render(at, SHORT_DATE),
            'D' => self.render(at, LONG_DATE),
            'F' | 'R' => self.full(at),
            _ => format!("{} {}", self.render(at, LONG_DATE), self.time_of_day(at)),
        }
    }
}

/// Accepts `UTC`/`GMT`/`Z`, tz database names such as `Europe/London`, and
/// fixed offsets such as `+05:30`, `-0800`, `UTC+1`.
pub fn parse_timezone(value: &str) -> Result<Zone> {
    let invalid = || ExportError::InvalidTimezone(value.to_string());
    let trimmed = value.trim();
    let upper = trimmed.to_uppercase();
    if matches!(upper.as_str(), "UTC" | "GMT" | "Z" | "ETC/UTC" | "ETC/GMT") {
        return Ok(Zone::Fixed(UtcOffset::UTC));
    }
    if let Some(tz) = timezones::get_by_name(trimmed) {
        return Ok(Zone::Named(tz));
    }
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    let (sign, digits) = match rest.chars().next() {
        Some('+') => (1i8, &rest[1..]),
        Some('-') => (-1i8, &rest[1..]),
        _ => return Err(invalid()),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() > 2 => digits.split_at(digits.len() - 2),
        None => (digits, "0"),
    };
    let hours: i8 = hours.parse().map_err(|_| invalid())?;
    let minutes: i8 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(invalid());
    }
    UtcOffset::from_hms(sign * hours, sign * minutes, 0)
        .map(Zone::Fixed)
        .map_err(|_| invalid())
}
