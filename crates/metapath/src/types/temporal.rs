//! Calendar and duration values.
//!
//! Seconds are held as [`Decimal`] so that fractional seconds compare exactly. Every
//! calendar value can be projected onto an instant (seconds relative to the Unix epoch)
//! given the implicit timezone to assume when the value carries none.

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

const SECONDS_PER_DAY: i64 = 86_400;

/// Days either side of the epoch whose calendar year still fits in an `i32`.
const MAX_EPOCH_DAYS: i64 = 365 * i32::MAX as i64;

static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-?\d{4,})-(\d{2})-(\d{2})T(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)(Z|[+-]\d{2}:\d{2})?$",
    )
    .expect("BUG: invalid DATETIME_RE regex literal")
});

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d{4,})-(\d{2})-(\d{2})(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid DATE_RE regex literal")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}):(\d{2}):(\d{2}(?:\.\d+)?)(Z|[+-]\d{2}:\d{2})?$")
        .expect("BUG: invalid TIME_RE regex literal")
});

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("BUG: invalid DURATION_RE regex literal")
});

/// A timezone offset in minutes east of UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timezone {
    pub offset_minutes: i32,
}

impl Timezone {
    pub const UTC: Timezone = Timezone { offset_minutes: 0 };

    pub fn new(offset_minutes: i32) -> Self {
        Self { offset_minutes }
    }

    fn parse(s: &str) -> Option<Self> {
        if s == "Z" {
            return Some(Self::UTC);
        }
        let sign = if s.starts_with('-') { -1 } else { 1 };
        let hours: i32 = s.get(1..3)?.parse().ok()?;
        let minutes: i32 = s.get(4..6)?.parse().ok()?;
        if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
            return None;
        }
        Some(Self::new(sign * (hours * 60 + minutes)))
    }

    /// The offset as a day-time duration.
    pub fn to_duration(&self) -> Duration {
        Duration::day_time(Decimal::from(self.offset_minutes as i64 * 60))
    }

    /// The timezone a day-time duration denotes: a whole number of minutes between
    /// `-PT14H` and `PT14H`.
    pub fn from_duration(duration: &Duration) -> Option<Self> {
        if duration.months != 0 {
            return None;
        }
        let minutes = duration.seconds / Decimal::from(60);
        if !minutes.fract().is_zero() {
            return None;
        }
        let minutes = minutes.to_i32().filter(|m| m.abs() <= 14 * 60)?;
        Some(Self::new(minutes))
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset_minutes == 0 {
            return f.write_str("Z");
        }
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.abs();
        write!(f, "{}{:02}:{:02}", sign, abs / 60, abs % 60)
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub(crate) fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i32, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year as i64 - 1 } else { year as i64 };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(days: i64) -> (i32, u8, u8) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    ((if m <= 2 { y + 1 } else { y }) as i32, m, d)
}

fn parse_seconds(s: &str) -> Option<Decimal> {
    let seconds: Decimal = s.parse().ok()?;
    if seconds >= Decimal::from(60) {
        return None;
    }
    Some(seconds)
}

fn write_seconds(f: &mut fmt::Formatter<'_>, seconds: Decimal) -> fmt::Result {
    let normalized = seconds.normalize();
    if normalized.fract().is_zero() {
        write!(f, "{:02}", normalized.trunc().to_i64().unwrap_or_default())
    } else if normalized < Decimal::TEN {
        write!(f, "0{}", normalized)
    } else {
        write!(f, "{}", normalized)
    }
}

fn offset_seconds(timezone: Option<Timezone>, implicit: Timezone) -> i64 {
    timezone.unwrap_or(implicit).offset_minutes as i64 * 60
}

/// A calendar date with an optional timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Date {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub timezone: Option<Timezone>,
}

impl Date {
    pub fn new(year: i32, month: u8, day: u8, timezone: Option<Timezone>) -> Option<Self> {
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return None;
        }
        Some(Self {
            year,
            month,
            day,
            timezone,
        })
    }

    pub fn parse(s: &str) -> Option<Self> {
        let caps = DATE_RE.captures(s.trim())?;
        let timezone = match caps.get(4) {
            Some(tz) => Some(Timezone::parse(tz.as_str())?),
            None => None,
        };
        Self::new(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
            timezone,
        )
    }

    pub fn instant(&self, implicit: Timezone) -> Decimal {
        Decimal::from(
            days_from_civil(self.year, self.month, self.day) * SECONDS_PER_DAY
                - offset_seconds(self.timezone, implicit),
        )
    }

    pub fn to_date_time(&self) -> DateTime {
        DateTime {
            year: self.year,
            month: self.month,
            day: self.day,
            hour: 0,
            minute: 0,
            second: Decimal::ZERO,
            timezone: self.timezone,
        }
    }

    /// Adjusts midnight of this date to `timezone` and keeps the resulting date.
    pub fn adjust_to_timezone(&self, timezone: Option<Timezone>, implicit: Timezone) -> Option<Self> {
        Some(self.to_date_time().adjust_to_timezone(timezone, implicit)?.date())
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)?;
        if let Some(tz) = self.timezone {
            write!(f, "{}", tz)?;
        }
        Ok(())
    }
}

/// A date and time of day with an optional timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: Decimal,
    pub timezone: Option<Timezone>,
}

impl DateTime {
    pub const EPOCH: DateTime = DateTime {
        year: 1970,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: Decimal::ZERO,
        timezone: Some(Timezone::UTC),
    };

    pub fn parse(s: &str) -> Option<Self> {
        let caps = DATETIME_RE.captures(s.trim())?;
        let date = Date::new(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
            None,
        )?;
        let hour: u8 = caps[4].parse().ok()?;
        let minute: u8 = caps[5].parse().ok()?;
        let second = parse_seconds(&caps[6])?;
        if hour > 24 || minute > 59 || (hour == 24 && (minute != 0 || !second.is_zero())) {
            return None;
        }
        let timezone = match caps.get(7) {
            Some(tz) => Some(Timezone::parse(tz.as_str())?),
            None => None,
        };
        let value = DateTime {
            year: date.year,
            month: date.month,
            day: date.day,
            hour,
            minute,
            second,
            timezone,
        };
        if hour == 24 {
            // 24:00:00 is the first instant of the following day
            return value.with_hour_zero().plus_seconds(Decimal::from(SECONDS_PER_DAY));
        }
        Some(value)
    }

    fn with_hour_zero(mut self) -> Self {
        self.hour = 0;
        self
    }

    /// Builds a value from an instant, rendered in the given timezone. `None` when the
    /// instant lies outside the representable years.
    pub fn from_instant(instant: Decimal, timezone: Option<Timezone>) -> Option<Self> {
        let local = instant.checked_add(Decimal::from(offset_seconds(timezone, Timezone::UTC)))?;
        let day_seconds = Decimal::from(SECONDS_PER_DAY);
        let mut days = (local / day_seconds).floor();
        let mut rem = local - days * day_seconds;
        if rem.is_sign_negative() && !rem.is_zero() {
            days -= Decimal::ONE;
            rem += day_seconds;
        }
        let days = days.to_i64().filter(|d| d.abs() <= MAX_EPOCH_DAYS)?;
        let (year, month, day) = civil_from_days(days);
        let whole = rem.trunc().to_i64().unwrap_or_default();
        Some(DateTime {
            year,
            month,
            day,
            hour: (whole / 3600) as u8,
            minute: ((whole % 3600) / 60) as u8,
            second: rem - Decimal::from(whole - whole % 60),
            timezone,
        })
    }

    pub fn instant(&self, implicit: Timezone) -> Decimal {
        let days = days_from_civil(self.year, self.month, self.day);
        let whole = days * SECONDS_PER_DAY + self.hour as i64 * 3600 + self.minute as i64 * 60
            - offset_seconds(self.timezone, implicit);
        Decimal::from(whole) + self.second
    }

    pub fn plus_seconds(&self, seconds: Decimal) -> Option<Self> {
        Self::from_instant(self.instant(Timezone::UTC).checked_add(seconds)?, self.timezone)
    }

    pub fn plus_months(&self, months: i64) -> Option<Self> {
        let total = (self.year as i64 * 12 + (self.month as i64 - 1)).checked_add(months)?;
        let year = i32::try_from(total.div_euclid(12)).ok()?;
        let month = (total.rem_euclid(12) + 1) as u8;
        Some(DateTime {
            year,
            month,
            day: self.day.min(days_in_month(year, month)),
            ..*self
        })
    }

    /// `None` when the result falls outside the representable years.
    pub fn plus(&self, duration: &Duration) -> Option<Self> {
        self.plus_months(duration.months)?.plus_seconds(duration.seconds)
    }

    /// Moves this value into `timezone`.
    ///
    /// A value without a timezone is first taken to be in `implicit`, unless the target is
    /// also `None`. With a `None` target the local time is kept and the timezone dropped.
    pub fn adjust_to_timezone(&self, timezone: Option<Timezone>, implicit: Timezone) -> Option<Self> {
        match (self.timezone, timezone) {
            (None, None) => Some(*self),
            (Some(_), None) => Some(DateTime {
                timezone: None,
                ..*self
            }),
            (None, Some(target)) => {
                let local = DateTime {
                    timezone: Some(implicit),
                    ..*self
                };
                Self::from_instant(local.instant(implicit), Some(target))
            }
            (Some(_), Some(target)) => Self::from_instant(self.instant(implicit), Some(target)),
        }
    }

    pub fn date(&self) -> Date {
        Date {
            year: self.year,
            month: self.month,
            day: self.day,
            timezone: self.timezone,
        }
    }

    pub fn time(&self) -> Time {
        Time {
            hour: self.hour,
            minute: self.minute,
            second: self.second,
            timezone: self.timezone,
        }
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:",
            self.year, self.month, self.day, self.hour, self.minute
        )?;
        write_seconds(f, self.second)?;
        if let Some(tz) = self.timezone {
            write!(f, "{}", tz)?;
        }
        Ok(())
    }
}

/// A time of day with an optional timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: Decimal,
    pub timezone: Option<Timezone>,
}

impl Time {
    pub fn parse(s: &str) -> Option<Self> {
        let caps = TIME_RE.captures(s.trim())?;
        let hour: u8 = caps[1].parse().ok()?;
        let minute: u8 = caps[2].parse().ok()?;
        let second = parse_seconds(&caps[3])?;
        if hour > 24 || minute > 59 || (hour == 24 && (minute != 0 || !second.is_zero())) {
            return None;
        }
        let timezone = match caps.get(4) {
            Some(tz) => Some(Timezone::parse(tz.as_str())?),
            None => None,
        };
        Some(Time {
            hour: hour % 24,
            minute,
            second,
            timezone,
        })
    }

    /// Seconds relative to midnight UTC of the reference day.
    pub fn instant(&self, implicit: Timezone) -> Decimal {
        Decimal::from(
            self.hour as i64 * 3600 + self.minute as i64 * 60 - offset_seconds(self.timezone, implicit),
        ) + self.second
    }

    /// Adjusts the time as if it fell on 1972-12-31, wrapping around midnight.
    pub fn adjust_to_timezone(&self, timezone: Option<Timezone>, implicit: Timezone) -> Option<Self> {
        let on_reference_day = DateTime {
            year: 1972,
            month: 12,
            day: 31,
            hour: self.hour,
            minute: self.minute,
            second: self.second,
            timezone: self.timezone,
        };
        Some(on_reference_day.adjust_to_timezone(timezone, implicit)?.time())
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:", self.hour, self.minute)?;
        write_seconds(f, self.second)?;
        if let Some(tz) = self.timezone {
            write!(f, "{}", tz)?;
        }
        Ok(())
    }
}

/// A duration split into a month component and a seconds component, both carrying the
/// sign of the whole duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Duration {
    pub months: i64,
    pub seconds: Decimal,
}

impl Duration {
    pub fn day_time(seconds: Decimal) -> Self {
        Self { months: 0, seconds }
    }

    pub fn year_month(months: i64) -> Self {
        Self {
            months,
            seconds: Decimal::ZERO,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let caps = DURATION_RE.captures(s)?;
        if s.ends_with('P') || s.ends_with('T') {
            return None;
        }
        let number = |i: usize| -> Option<i64> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(0),
            }
        };
        let months = number(2)?.checked_mul(12)?.checked_add(number(3)?)?;
        let whole_seconds = number(4)?
            .checked_mul(SECONDS_PER_DAY)?
            .checked_add(number(5)?.checked_mul(3600)?)?
            .checked_add(number(6)?.checked_mul(60)?)?;
        let mut seconds = Decimal::from(whole_seconds);
        if let Some(sec) = caps.get(7) {
            seconds = seconds.checked_add(sec.as_str().parse::<Decimal>().ok()?)?;
        }
        let sign = if caps.get(1).is_some() { -1 } else { 1 };
        Some(Self {
            months: months * sign,
            seconds: seconds * Decimal::from(sign),
        })
    }

    pub fn parse_day_time(s: &str) -> Option<Self> {
        let value = Self::parse(s)?;
        let date_part = s.split('T').next().unwrap_or_default();
        if date_part.contains('Y') || date_part.contains('M') {
            return None;
        }
        Some(value)
    }

    pub fn parse_year_month(s: &str) -> Option<Self> {
        if s.contains('T') || s.contains('D') {
            return None;
        }
        Self::parse(s)
    }

    pub fn is_negative(&self) -> bool {
        self.months < 0 || self.seconds.is_sign_negative() && !self.seconds.is_zero()
    }

    pub fn negate(&self) -> Self {
        Self {
            months: self.months.saturating_neg(),
            seconds: -self.seconds,
        }
    }

    pub fn plus(&self, other: &Duration) -> Option<Self> {
        Some(Self {
            months: self.months.checked_add(other.months)?,
            seconds: self.seconds.checked_add(other.seconds)?,
        })
    }

    /// Orders two durations of the same family; mixed durations are incomparable.
    pub fn compare(&self, other: &Duration) -> Option<Ordering> {
        if self.months == other.months {
            Some(self.seconds.cmp(&other.seconds))
        } else if self.seconds == other.seconds {
            Some(self.months.cmp(&other.months))
        } else {
            None
        }
    }

    pub fn write_year_month(&self, f: &mut impl fmt::Write) -> fmt::Result {
        let months = self.months.abs();
        if self.months < 0 {
            f.write_char('-')?;
        }
        f.write_char('P')?;
        if months == 0 {
            return f.write_str("0M");
        }
        if months / 12 > 0 {
            write!(f, "{}Y", months / 12)?;
        }
        if months % 12 > 0 {
            write!(f, "{}M", months % 12)?;
        }
        Ok(())
    }

    pub fn write_day_time(&self, f: &mut impl fmt::Write) -> fmt::Result {
        let negative = self.seconds.is_sign_negative() && !self.seconds.is_zero();
        let total = self.seconds.abs();
        if negative {
            f.write_char('-')?;
        }
        f.write_char('P')?;
        if total.is_zero() {
            return f.write_str("T0S");
        }
        let whole = total.trunc().to_i64().unwrap_or_default();
        let fraction = total - total.trunc();
        let days = whole / SECONDS_PER_DAY;
        let hours = (whole % SECONDS_PER_DAY) / 3600;
        let minutes = (whole % 3600) / 60;
        let seconds = Decimal::from(whole % 60) + fraction;
        if days > 0 {
            write!(f, "{}D", days)?;
        }
        if hours > 0 || minutes > 0 || !seconds.is_zero() {
            f.write_char('T')?;
            if hours > 0 {
                write!(f, "{}H", hours)?;
            }
            if minutes > 0 {
                write!(f, "{}M", minutes)?;
            }
            if !seconds.is_zero() {
                write!(f, "{}S", seconds.normalize())?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months == 0 {
            return self.write_day_time(f);
        }
        if self.seconds.is_zero() {
            return self.write_year_month(f);
        }
        let mut year_month = String::new();
        self.write_year_month(&mut year_month)?;
        let mut day_time = String::new();
        Duration::day_time(self.seconds).write_day_time(&mut day_time)?;
        let day_time = day_time.trim_start_matches('-').trim_start_matches('P');
        write!(f, "{}{}", year_month, day_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_parse_and_display() {
        let date = Date::parse("2024-02-29Z").unwrap();
        assert_eq!(date.day, 29);
        assert_eq!(date.timezone, Some(Timezone::UTC));
        assert_eq!(date.to_string(), "2024-02-29Z");
        assert!(Date::parse("2023-02-29").is_none());
        assert!(Date::parse("2023-13-01").is_none());
    }

    #[test]
    fn test_date_time_instant_respects_offset() {
        let a = DateTime::parse("2020-01-01T12:00:00+02:00").unwrap();
        let b = DateTime::parse("2020-01-01T10:00:00Z").unwrap();
        assert_eq!(a.instant(Timezone::UTC), b.instant(Timezone::UTC));
        let local = DateTime::parse("2020-01-01T10:00:00").unwrap();
        assert_eq!(local.instant(Timezone::UTC), b.instant(Timezone::UTC));
        assert_ne!(local.instant(Timezone::new(60)), b.instant(Timezone::UTC));
    }

    #[test]
    fn test_date_time_midnight_rollover() {
        let dt = DateTime::parse("2020-12-31T24:00:00Z").unwrap();
        assert_eq!(dt.to_string(), "2021-01-01T00:00:00Z");
    }

    #[test]
    fn test_civil_round_trip_epoch() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(days_from_civil(2000, 2, 29)), (2000, 2, 29));
    }

    #[test]
    fn test_duration_parse_and_display() {
        let d = Duration::parse("P1DT2H30M").unwrap();
        assert_eq!(d.months, 0);
        assert_eq!(d.seconds, Decimal::from(95_400));
        assert_eq!(d.to_string(), "P1DT2H30M");

        let ym = Duration::parse_year_month("-P1Y2M").unwrap();
        assert_eq!(ym.months, -14);
        assert_eq!(ym.to_string(), "-P1Y2M");

        assert!(Duration::parse("P").is_none());
        assert!(Duration::parse_day_time("P1Y").is_none());
        assert_eq!(Duration::day_time(Decimal::ZERO).to_string(), "PT0S");
    }

    #[test]
    fn test_plus_months_clamps_day() {
        let dt = DateTime::parse("2021-01-31T00:00:00").unwrap();
        let next = dt.plus(&Duration::year_month(1)).unwrap();
        assert_eq!(next.to_string(), "2021-02-28T00:00:00");
    }

    #[test]
    fn test_plus_out_of_range() {
        let dt = DateTime::parse("2020-01-01T00:00:00").unwrap();
        assert!(dt.plus(&Duration::year_month(i64::MAX)).is_none());
        assert!(dt.plus(&Duration::year_month(i64::MIN)).is_none());
        assert!(dt.plus_seconds(Decimal::MAX).is_none());
        let max = Duration::year_month(i64::MAX);
        assert!(max.plus(&Duration::year_month(1)).is_none());
        assert!(Duration::parse("P9999999999999999999Y").is_none());
        assert!(Duration::parse("P999999999999999999Y").is_none());
    }

    #[test]
    fn test_timezone_from_duration() {
        let five_hours_west = Duration::parse_day_time("-PT5H").unwrap();
        assert_eq!(Timezone::from_duration(&five_hours_west), Some(Timezone::new(-300)));
        assert!(Timezone::from_duration(&Duration::parse_day_time("PT15H").unwrap()).is_none());
        assert!(Timezone::from_duration(&Duration::parse_day_time("PT1M30S").unwrap()).is_none());
        assert!(Timezone::from_duration(&Duration::year_month(1)).is_none());
    }

    #[test]
    fn test_adjust_to_timezone() {
        let implicit = Timezone::new(-300);
        let eastern = Some(Timezone::new(-300));
        let pacific = Some(Timezone::new(-600));

        let local = DateTime::parse("2002-03-07T10:00:00").unwrap();
        assert_eq!(local.adjust_to_timezone(eastern, implicit).unwrap().to_string(), "2002-03-07T10:00:00-05:00");
        assert_eq!(local.adjust_to_timezone(pacific, implicit).unwrap().to_string(), "2002-03-07T05:00:00-10:00");
        assert_eq!(local.adjust_to_timezone(None, implicit).unwrap(), local);

        let zoned = DateTime::parse("2002-03-07T10:00:00-07:00").unwrap();
        assert_eq!(zoned.adjust_to_timezone(eastern, implicit).unwrap().to_string(), "2002-03-07T12:00:00-05:00");
        assert_eq!(zoned.adjust_to_timezone(None, implicit).unwrap().to_string(), "2002-03-07T10:00:00");

        let date = Date::parse("2002-03-07-07:00").unwrap();
        assert_eq!(date.adjust_to_timezone(pacific, implicit).unwrap().to_string(), "2002-03-06-10:00");

        let time = Time::parse("10:00:00-07:00").unwrap();
        assert_eq!(time.adjust_to_timezone(Some(Timezone::new(600)), implicit).unwrap().to_string(), "03:00:00+10:00");
    }

    #[test]
    fn test_time_display_fractional_seconds() {
        let t = Time::parse("09:05:03.250-05:00").unwrap();
        assert_eq!(t.to_string(), "09:05:03.25-05:00");
    }
}
