//! Runtime arithmetic: summing `H:MM` entries and converting to fractional hours

use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeEntry {
    pub hours: u64,
    pub minutes: u64,
}

impl TimeEntry {
    /// `None` when the entry does not fit in a `u64` count of minutes
    pub fn total_minutes(&self) -> Option<u64> {
        self.hours.checked_mul(60)?.checked_add(self.minutes)
    }

    pub fn as_hours(&self) -> f64 {
        self.hours as f64 + self.minutes as f64 / 60.0
    }
}

impl FromStr for TimeEntry {
    type Err = LedgerError;

    /// Accepts `H` or `H:MM`; minutes may exceed 59 and are carried on sum
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidTime(s.to_string());
        let (hours, minutes) = match s.trim().split_once(':') {
            Some((h, m)) => (h.trim(), m.trim()),
            None => (s.trim(), "0"),
        };
        let hours = if hours.is_empty() { Ok(0) } else { hours.parse() };
        let minutes = if minutes.is_empty() { Ok(0) } else { minutes.parse() };
        match (hours, minutes) {
            (Ok(hours), Ok(minutes)) => {
                let entry = Self { hours, minutes };
                entry.total_minutes().map(|_| entry).ok_or_else(invalid)
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for TimeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.hours, self.minutes)
    }
}

/// Sum entries and normalize so that minutes stay below 60
pub fn sum_entries(entries: &[TimeEntry]) -> Result<TimeEntry, LedgerError> {
    let mut total: u64 = 0;
    for entry in entries {
        total = entry
            .total_minutes()
            .and_then(|minutes| total.checked_add(minutes))
            .ok_or_else(|| LedgerError::InvalidTime(entry.to_string()))?;
    }
    Ok(TimeEntry {
        hours: total / 60,
        minutes: total % 60,
    })
}

/// Fractional hours from an hours + minutes pair; minutes are capped at 59
pub fn hours_from_parts(hours: u64, minutes: u64) -> f64 {
    hours as f64 + minutes.min(59) as f64 / 60.0
}

/// Split fractional hours into whole hours and rounded minutes
pub fn split_hours(total: f64) -> TimeEntry {
    if !total.is_finite() || total <= 0.0 {
        return TimeEntry::default();
    }
    let mut hours = total.floor() as u64;
    let mut minutes = ((total - hours as f64) * 60.0).round() as u64;
    if minutes == 60 {
        hours += 1;
        minutes = 0;
    }
    TimeEntry { hours, minutes }
}

/// Parse a value for an hours field: either a plain number or `H:MM`
pub fn parse_hours(raw: &str) -> Result<f64, LedgerError> {
    if raw.contains(':') {
        let entry: TimeEntry = raw.parse()?;
        return Ok(hours_from_parts(entry.hours, entry.minutes));
    }
    raw.trim()
        .parse::<f64>()
        .map_err(|_| LedgerError::InvalidNumber(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_and_minutes() {
        assert_eq!("2:30".parse::<TimeEntry>().unwrap(), TimeEntry { hours: 2, minutes: 30 });
        assert_eq!("7".parse::<TimeEntry>().unwrap(), TimeEntry { hours: 7, minutes: 0 });
        assert_eq!(":45".parse::<TimeEntry>().unwrap(), TimeEntry { hours: 0, minutes: 45 });
        assert!(matches!("x:10".parse::<TimeEntry>(), Err(LedgerError::InvalidTime(_))));
        assert!("-1:00".parse::<TimeEntry>().is_err());
    }

    #[test]
    fn sums_with_carry() {
        let entries: Vec<TimeEntry> = ["1:30", "2:45", "0:50"].iter().map(|s| s.parse().unwrap()).collect();
        let total = sum_entries(&entries).unwrap();
        assert_eq!(total, TimeEntry { hours: 5, minutes: 5 });
        assert_eq!(total.to_string(), "5:05");
        assert_eq!(sum_entries(&[]).unwrap(), TimeEntry::default());
    }

    #[test]
    fn huge_entries_are_rejected_instead_of_wrapping() {
        assert!(matches!(
            "307445734561825861:00".parse::<TimeEntry>(),
            Err(LedgerError::InvalidTime(_))
        ));
        let half = TimeEntry {
            hours: u64::MAX / 120,
            minutes: 0,
        };
        assert!(half.total_minutes().is_some());
        assert!(matches!(
            sum_entries(&[half, half, half]),
            Err(LedgerError::InvalidTime(_))
        ));
    }

    #[test]
    fn converts_between_representations() {
        assert_eq!(hours_from_parts(1, 30), 1.5);
        assert_eq!(hours_from_parts(1, 75), 1.0 + 59.0 / 60.0);
        assert_eq!(split_hours(2.25), TimeEntry { hours: 2, minutes: 15 });
        assert_eq!(split_hours(1.999), TimeEntry { hours: 2, minutes: 0 });
        assert_eq!(split_hours(-3.0), TimeEntry::default());
    }

    #[test]
    fn parses_field_values() {
        assert_eq!(parse_hours("1:30").unwrap(), 1.5);
        assert_eq!(parse_hours(" 4.25 ").unwrap(), 4.25);
        assert!(matches!(parse_hours("abc"), Err(LedgerError::InvalidNumber(_))));
    }
}
