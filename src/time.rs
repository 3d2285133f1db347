//! Conversion between calendar timestamps and the numeric time axis.
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

/// Calendar attribute written on the time coordinate. chrono does all date
/// arithmetic in the proleptic Gregorian calendar, so that is what we declare.
pub const CALENDAR: &str = "gregorian";

/// Encodes timestamps as whole seconds since a fixed epoch.
///
/// The epoch is fixed when the encoder is constructed and never changes
/// afterwards, so one encoder describes exactly one time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeEncoder {
    epoch: NaiveDateTime,
}

impl Default for TimeEncoder {
    fn default() -> Self {
        Self::unix()
    }
}

impl TimeEncoder {
    pub fn new(epoch: NaiveDateTime) -> Self {
        Self { epoch }
    }

    /// An encoder anchored at 1970-01-01 00:00:00 UTC.
    pub fn unix() -> Self {
        Self { epoch: DateTime::<Utc>::UNIX_EPOCH.naive_utc() }
    }

    pub fn epoch(&self) -> NaiveDateTime {
        self.epoch
    }

    /// The CF `units` attribute for the time coordinate.
    pub fn units(&self) -> String {
        format!("seconds since {} UTC", self.epoch.format("%Y-%m-%d %H:%M:%S"))
    }

    pub fn calendar(&self) -> &'static str {
        CALENDAR
    }

    /// Convert a UTC timestamp to seconds since the epoch.
    ///
    /// The offset is first taken as a continuous number of seconds (including
    /// any sub-second part) and then rounded once to the nearest whole second,
    /// half away from zero.
    pub fn encode(&self, t: NaiveDateTime) -> i64 {
        let delta = t - self.epoch;
        let whole = delta.num_seconds();
        let frac = delta.subsec_nanos() as f64 * 1e-9;
        whole + frac.round() as i64
    }

    /// Convert seconds since the epoch back to a UTC timestamp. Returns `None`
    /// if the result is outside the range chrono can represent.
    pub fn decode(&self, seconds: i64) -> Option<NaiveDateTime> {
        let delta = TimeDelta::try_seconds(seconds)?;
        self.epoch.checked_add_signed(delta)
    }
}

/// Parse an epoch given as "YYYY-MM-DD" or "YYYY-MM-DD HH:MM:SS" (a "T" separator is also accepted).
pub fn parse_epoch(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, mn: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, mn, s).unwrap()
    }

    #[rstest]
    #[case(dt(1970, 1, 1, 0, 0, 0), 0)]
    #[case(dt(2015, 11, 1, 0, 0, 0), 1446336000)]
    #[case(dt(2015, 11, 1, 1, 0, 0), 1446339600)]
    #[case(dt(2015, 11, 1, 2, 0, 0), 1446343200)]
    #[case(dt(2016, 2, 29, 12, 34, 56), 1456749296)]
    #[case(dt(1969, 12, 31, 23, 59, 59), -1)]
    fn test_encode_unix(#[case] t: NaiveDateTime, #[case] expected: i64) {
        assert_eq!(TimeEncoder::unix().encode(t), expected);
    }

    #[rstest]
    #[case(dt(2015, 11, 1, 0, 17, 23))]
    #[case(dt(1900, 3, 1, 6, 0, 1))]
    #[case(dt(2038, 1, 19, 3, 14, 8))]
    #[case(dt(1969, 7, 20, 20, 17, 40))]
    fn test_round_trip(#[case] t: NaiveDateTime) {
        let enc = TimeEncoder::unix();
        assert_eq!(enc.decode(enc.encode(t)), Some(t));
    }

    #[test]
    fn test_rounds_once_at_seconds() {
        let enc = TimeEncoder::unix();
        let base = dt(2015, 11, 1, 0, 20, 0);
        // 20 minutes past the hour must not collapse to the hour
        assert_eq!(enc.encode(base), 1446337200);
        let half = base + TimeDelta::milliseconds(500);
        assert_eq!(enc.encode(half), 1446337201);
        let under = base + TimeDelta::milliseconds(499);
        assert_eq!(enc.encode(under), 1446337200);
        let before_epoch = dt(1969, 12, 31, 23, 59, 59) + TimeDelta::milliseconds(500);
        assert_eq!(enc.encode(before_epoch), -1);
    }

    #[test]
    fn test_units_and_custom_epoch() {
        let enc = TimeEncoder::new(dt(2000, 1, 1, 0, 0, 0));
        assert_eq!(enc.units(), "seconds since 2000-01-01 00:00:00 UTC");
        assert_eq!(TimeEncoder::unix().units(), "seconds since 1970-01-01 00:00:00 UTC");
        assert_eq!(enc.encode(dt(2000, 1, 1, 0, 1, 0)), 60);
        assert_eq!(enc.calendar(), "gregorian");
    }

    #[test]
    fn test_parse_epoch() {
        assert_eq!(parse_epoch("1970-01-01"), Some(dt(1970, 1, 1, 0, 0, 0)));
        assert_eq!(parse_epoch("2000-01-01 12:00:00"), Some(dt(2000, 1, 1, 12, 0, 0)));
        assert_eq!(parse_epoch("2000-01-01T12:00:00"), Some(dt(2000, 1, 1, 12, 0, 0)));
        assert_eq!(parse_epoch("not a date"), None);
    }
}
