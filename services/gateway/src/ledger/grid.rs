//! The half-hour slot grid.
//!
//! Every bookable instant sits on a half-hour mark of the lab's wall clock,
//! giving 48 slots per day. [`SlotTime`] can only be built on that grid, so
//! the ledger never stores an off-grid reservation regardless of which entry
//! point the request came through.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use thiserror::Error;

/// Length of every slot, in minutes.
pub const SLOT_MINUTES: i64 = 30;

/// Number of slots in a day.
pub const SLOTS_PER_DAY: usize = 48;

/// The only duration string accepted from legacy clients.
const LEGACY_DURATION: &str = "00:30";

/// Duration of every slot.
pub fn slot_duration() -> Duration {
    Duration::minutes(SLOT_MINUTES)
}

/// Slot validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SlotError {
    /// The input could not be parsed as a time of day or timestamp.
    #[error("malformed slot time '{0}'")]
    Malformed(String),

    /// The input parsed but does not fall on a half-hour mark.
    #[error("slot time '{0}' is not on the half-hour grid")]
    OffGrid(String),

    /// The period is neither a half-day label nor the fixed slot duration.
    #[error("unsupported slot period '{0}'; slots are fixed at 30 minutes")]
    UnsupportedPeriod(String),
}

/// A validated slot start on the half-hour grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(NaiveDateTime);

impl SlotTime {
    /// Validates an arbitrary wall-clock instant against the grid.
    pub fn new(at: NaiveDateTime) -> Result<Self, SlotError> {
        let on_grid =
            at.minute() % 30 == 0 && at.second() == 0 && at.nanosecond() == 0;
        if !on_grid {
            return Err(SlotError::OffGrid(at.format("%Y-%m-%dT%H:%M:%S%.f").to_string()));
        }
        Ok(Self(at))
    }

    /// Resolves an `HH:MM` label against `day`.
    ///
    /// Labels must be zero-padded (`09:30`, not `9:30`), matching what the
    /// booking grid shows.
    pub fn on_day(day: NaiveDate, label: &str) -> Result<Self, SlotError> {
        let (hour, minute) = parse_label(label)?;
        let at = day
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| SlotError::Malformed(label.to_string()))?;
        Self::new(at).map_err(|_| SlotError::OffGrid(label.to_string()))
    }

    /// Parses a full timestamp (`YYYY-MM-DDTHH:MM[:SS]`, a space also works
    /// as the separator).
    pub fn parse_timestamp(value: &str) -> Result<Self, SlotError> {
        const FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M",
        ];

        let trimmed = value.trim();
        let at = FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
            .ok_or_else(|| SlotError::Malformed(value.to_string()))?;
        Self::new(at)
    }

    /// Slot start.
    pub fn starts_at(&self) -> NaiveDateTime {
        self.0
    }

    /// Slot end. The end instant itself still belongs to the slot.
    pub fn ends_at(&self) -> NaiveDateTime {
        self.0 + slot_duration()
    }

    /// Calendar day of the slot start.
    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// `HH:MM` label.
    pub fn label(&self) -> String {
        self.0.format("%H:%M").to_string()
    }

    /// Returns true when `now` lies in `[start, start + 30min]`.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.starts_at() <= now && now <= self.ends_at()
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M"))
    }
}

fn parse_label(label: &str) -> Result<(u32, u32), SlotError> {
    let malformed = || SlotError::Malformed(label.to_string());

    let (hour, minute) = label.split_once(':').ok_or_else(malformed)?;
    if hour.len() != 2 || minute.len() != 2 {
        return Err(malformed());
    }
    if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    let hour: u32 = hour.parse().map_err(|_| malformed())?;
    let minute: u32 = minute.parse().map_err(|_| malformed())?;
    if hour > 23 || minute > 59 {
        return Err(malformed());
    }
    Ok((hour, minute))
}

/// The 48 canonical labels, `00:00` through `23:30`.
pub fn canonical_labels() -> Vec<String> {
    (0..24)
        .flat_map(|hour| [0, 30].map(|minute| format!("{hour:02}:{minute:02}")))
        .collect()
}

/// Half-day label stored with each booking.
///
/// Slots are always 30 minutes long; the label is display metadata derived
/// from the slot start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotPeriod {
    Am,
    Pm,
}

impl SlotPeriod {
    /// Label for the half of the day `slot_time` falls in.
    pub fn for_time(slot_time: SlotTime) -> Self {
        if slot_time.starts_at().hour() < 12 {
            SlotPeriod::Am
        } else {
            SlotPeriod::Pm
        }
    }

    /// Accepts what clients send as `slotPeriod`: nothing, `AM`/`PM`, or the
    /// fixed duration `00:30`. The stored label is always derived from the
    /// slot start.
    pub fn resolve(raw: Option<&str>, slot_time: SlotTime) -> Result<Self, SlotError> {
        match raw.map(str::trim) {
            None | Some("") | Some(LEGACY_DURATION) => Ok(Self::for_time(slot_time)),
            Some(label) if label.eq_ignore_ascii_case("am") || label.eq_ignore_ascii_case("pm") => {
                Ok(Self::for_time(slot_time))
            }
            Some(other) => Err(SlotError::UnsupportedPeriod(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotPeriod::Am => "AM",
            SlotPeriod::Pm => "PM",
        }
    }

    /// Parses a stored label.
    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "AM" => Some(SlotPeriod::Am),
            "PM" => Some(SlotPeriod::Pm),
            _ => None,
        }
    }
}

impl fmt::Display for SlotPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[test]
    fn test_canonical_labels() {
        let labels = canonical_labels();
        assert_eq!(labels.len(), SLOTS_PER_DAY);
        assert_eq!(labels.first().map(String::as_str), Some("00:00"));
        assert_eq!(labels.get(1).map(String::as_str), Some("00:30"));
        assert_eq!(labels.last().map(String::as_str), Some("23:30"));
    }

    #[test]
    fn test_every_canonical_label_resolves() {
        for label in canonical_labels() {
            let slot = SlotTime::on_day(day(), &label).unwrap();
            assert_eq!(slot.label(), label);
            assert_eq!(slot.date(), day());
        }
    }

    #[rstest]
    #[case::quarter("14:15", true)]
    #[case::unpadded("9:30", false)]
    #[case::hour_overflow("24:00", false)]
    #[case::minute_overflow("10:60", false)]
    #[case::seconds("10:00:00", false)]
    #[case::empty("", false)]
    #[case::words("noon", false)]
    #[case::sign("+1:30", false)]
    fn test_on_day_rejects(#[case] label: &str, #[case] off_grid: bool) {
        let err = SlotTime::on_day(day(), label).unwrap_err();
        assert_eq!(matches!(err, SlotError::OffGrid(_)), off_grid, "{label}: {err}");
    }

    #[rstest]
    #[case("2026-10-19T14:00:00")]
    #[case("2026-10-19T14:30")]
    #[case("2026-10-19 00:00")]
    #[case("2026-10-19T23:30:00.000")]
    fn test_parse_timestamp_on_grid(#[case] value: &str) {
        assert!(SlotTime::parse_timestamp(value).is_ok(), "{value}");
    }

    #[rstest]
    #[case("2026-10-19T14:10:00")]
    #[case("2026-10-19T14:00:01")]
    #[case("2026-10-19T14:00:00.5")]
    fn test_parse_timestamp_off_grid(#[case] value: &str) {
        assert!(matches!(
            SlotTime::parse_timestamp(value),
            Err(SlotError::OffGrid(_))
        ));
    }

    #[test]
    fn test_contains_is_inclusive_on_both_ends() {
        let slot = SlotTime::on_day(day(), "14:00").unwrap();
        let start = slot.starts_at();
        let end = slot.ends_at();

        assert_eq!(end - start, Duration::minutes(30));
        assert!(slot.contains(start));
        assert!(slot.contains(end));
        assert!(!slot.contains(start - Duration::nanoseconds(1)));
        assert!(!slot.contains(end + Duration::nanoseconds(1)));
    }

    #[test]
    fn test_last_slot_of_day_crosses_midnight() {
        let slot = SlotTime::on_day(day(), "23:30").unwrap();
        assert_eq!(slot.ends_at().date(), day().succ_opt().unwrap());
    }

    #[rstest]
    #[case("09:00", None, SlotPeriod::Am)]
    #[case("11:30", Some("AM"), SlotPeriod::Am)]
    #[case("12:00", Some("pm"), SlotPeriod::Pm)]
    #[case("12:00", Some("AM"), SlotPeriod::Pm)]
    #[case("18:30", Some("00:30"), SlotPeriod::Pm)]
    fn test_period_resolution(
        #[case] label: &str,
        #[case] raw: Option<&str>,
        #[case] expected: SlotPeriod,
    ) {
        let slot = SlotTime::on_day(day(), label).unwrap();
        assert_eq!(SlotPeriod::resolve(raw, slot).unwrap(), expected);
    }

    #[test]
    fn test_period_rejects_other_durations() {
        let slot = SlotTime::on_day(day(), "10:00").unwrap();
        assert_eq!(
            SlotPeriod::resolve(Some("01:00"), slot),
            Err(SlotError::UnsupportedPeriod("01:00".to_string()))
        );
    }

    #[test]
    fn test_period_stored_roundtrip() {
        for period in [SlotPeriod::Am, SlotPeriod::Pm] {
            assert_eq!(SlotPeriod::from_stored(period.as_str()), Some(period));
        }
        assert_eq!(SlotPeriod::from_stored("00:30"), None);
    }
}
