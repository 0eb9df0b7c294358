//! Conversions between wire epochs and the service's naive instants.
//!
//! Instants are wall-clock `NaiveDateTime`s. On the wire they travel as whole
//! seconds since the epoch, read as UTC, so a client sends its local wall time
//! encoded that way and gets the same wall time back.
//!
//! A zero epoch on an optional field means "absent" (for an end time: the fact
//! is still running) and never the epoch instant itself.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Result, TimekeepError};

/// Convert an epoch to an instant. Zero is a real instant here; use
/// [`to_optional_instant`] for fields where zero means absent.
pub fn to_instant(epoch: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| TimekeepError::Invalid(format!("timestamp {} is out of range", epoch)))
}

/// Convert an optional epoch; `None` and `0` both normalize to absent.
pub fn to_optional_instant(epoch: Option<i64>) -> Result<Option<NaiveDateTime>> {
    match epoch {
        None | Some(0) => Ok(None),
        Some(e) => to_instant(e).map(Some),
    }
}

pub fn to_epoch(instant: &NaiveDateTime) -> i64 {
    instant.and_utc().timestamp()
}

/// Absent instants serialize as `0`.
pub fn optional_to_epoch(instant: Option<&NaiveDateTime>) -> i64 {
    instant.map(to_epoch).unwrap_or(0)
}

/// Midnight of `date`, as an epoch.
pub fn date_to_epoch(date: &NaiveDate) -> i64 {
    to_epoch(&date.and_time(NaiveTime::MIN))
}

/// Calendar date of an epoch; `0` means "not given".
pub fn epoch_to_date(epoch: u32) -> Result<Option<NaiveDate>> {
    match epoch {
        0 => Ok(None),
        e => to_instant(i64::from(e)).map(|dt| Some(dt.date())),
    }
}

/// Total whole seconds of a duration (`days * 86400 + seconds`).
pub fn delta_seconds(delta: &Duration) -> i64 {
    delta.num_seconds()
}

/// The day a fact starting at `instant` is attributed to. Anything before
/// `day_start` still belongs to the previous day.
pub fn service_date(instant: &NaiveDateTime, day_start: NaiveTime) -> NaiveDate {
    let date = instant.date();
    if instant.time() < day_start {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

/// Current local wall time at one-second resolution.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_round_trip_at_second_resolution() {
        let instant = at(2024, 3, 15, 9, 30, 12);
        assert_eq!(to_instant(to_epoch(&instant)).unwrap(), instant);

        for epoch in [1, 86_399, 1_700_000_000, 4_102_444_800] {
            assert_eq!(to_epoch(&to_instant(epoch).unwrap()), epoch);
        }
    }

    #[test]
    fn test_epochs_are_read_as_utc() {
        assert_eq!(to_instant(86_400 + 3_600).unwrap(), at(1970, 1, 2, 1, 0, 0));
    }

    #[test]
    fn test_zero_and_missing_are_absent() {
        assert_eq!(to_optional_instant(Some(0)).unwrap(), None);
        assert_eq!(to_optional_instant(None).unwrap(), None);
        assert_eq!(optional_to_epoch(None), 0);

        let instant = to_optional_instant(Some(1_700_000_000)).unwrap();
        assert_eq!(optional_to_epoch(instant.as_ref()), 1_700_000_000);
    }

    #[test]
    fn test_out_of_range_epoch_is_invalid() {
        assert!(matches!(
            to_instant(i64::MAX),
            Err(TimekeepError::Invalid(_))
        ));
    }

    #[test]
    fn test_delta_is_total_seconds() {
        let delta = Duration::days(2) + Duration::seconds(75);
        assert_eq!(delta_seconds(&delta), 2 * 86_400 + 75);
        assert_eq!(delta_seconds(&Duration::zero()), 0);
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let epoch = date_to_epoch(&date);
        assert_eq!(epoch % 86_400, 0);
        assert_eq!(epoch_to_date(epoch as u32).unwrap(), Some(date));
        assert_eq!(epoch_to_date(epoch as u32 + 3_600).unwrap(), Some(date));
        assert_eq!(epoch_to_date(0).unwrap(), None);
    }

    #[test]
    fn test_service_date_respects_day_start() {
        let five = NaiveTime::from_hms_opt(5, 0, 0).unwrap();
        let after_midnight = at(2024, 3, 15, 2, 0, 0);
        let morning = at(2024, 3, 15, 8, 0, 0);

        assert_eq!(
            service_date(&after_midnight, five),
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
        );
        assert_eq!(service_date(&morning, five), morning.date());
        assert_eq!(service_date(&after_midnight, NaiveTime::MIN), after_midnight.date());
    }

    #[test]
    fn test_now_has_no_fraction() {
        assert_eq!(now().nanosecond(), 0);
    }
}
