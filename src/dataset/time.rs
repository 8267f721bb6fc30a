use chrono::{Duration, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn millis(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1_000.0,
            TimeUnit::Minutes => 60_000.0,
            TimeUnit::Hours => 3_600_000.0,
            TimeUnit::Days => 86_400_000.0,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

/// A CF `"<unit> since <epoch>"` time encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeUnits {
    pub unit: TimeUnit,
    pub epoch: NaiveDateTime,
}

impl TimeUnits {
    /// Encoding of every consolidated file.
    pub fn hours_since_1980() -> Self {
        Self {
            unit: TimeUnit::Hours,
            epoch: NaiveDate::from_ymd_opt(1980, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
        }
    }

    /// Parses strings such as `minutes since 2015-11-01 00:30:00` or
    /// `hours since 1980-01-01`. Returns `None` for anything else.
    pub fn parse(units: &str) -> Option<Self> {
        let mut parts = units.trim().splitn(3, ' ');
        let unit = match parts.next()?.to_ascii_lowercase().as_str() {
            "second" | "seconds" | "s" => TimeUnit::Seconds,
            "minute" | "minutes" | "min" => TimeUnit::Minutes,
            "hour" | "hours" | "h" => TimeUnit::Hours,
            "day" | "days" | "d" => TimeUnit::Days,
            _ => return None,
        };
        if !parts.next()?.eq_ignore_ascii_case("since") {
            return None;
        }
        let epoch = parse_epoch(parts.next()?)?;
        Some(Self { unit, epoch })
    }

    /// Decodes an offset, rounded to the millisecond.
    pub fn decode(&self, offset: f64) -> Option<NaiveDateTime> {
        if !offset.is_finite() {
            return None;
        }
        let millis = (offset * self.unit.millis()).round();
        if millis.abs() > i64::MAX as f64 {
            return None;
        }
        self.epoch
            .checked_add_signed(Duration::milliseconds(millis as i64))
    }

    pub fn encode(&self, time: NaiveDateTime) -> f64 {
        (time - self.epoch).num_milliseconds() as f64 / self.unit.millis()
    }
}

impl std::fmt::Display for TimeUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} since {}",
            self.unit.as_str(),
            self.epoch.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

fn parse_epoch(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw
        .trim()
        .trim_end_matches("UTC")
        .trim_end_matches('Z')
        .trim();
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn parses_merra2_granule_units() {
        let units = TimeUnits::parse("minutes since 2015-11-01 00:30:00").unwrap();
        assert_eq!(units.unit, TimeUnit::Minutes);
        assert_eq!(units.decode(60.0), Some(dt(2015, 11, 1, 1, 30)));
    }

    #[test]
    fn parses_date_only_and_iso_variants() {
        assert_eq!(
            TimeUnits::parse("days since 2000-01-01").unwrap().decode(1.5),
            Some(dt(2000, 1, 2, 12, 0))
        );
        assert_eq!(
            TimeUnits::parse("seconds since 1970-01-01T00:00:00Z")
                .unwrap()
                .decode(3600.0),
            Some(dt(1970, 1, 1, 1, 0))
        );
        assert_eq!(
            TimeUnits::parse("hours since 1980-01-01 00:00").unwrap().epoch,
            dt(1980, 1, 1, 0, 0)
        );
        assert!(TimeUnits::parse("fortnights since 2000-01-01").is_none());
        assert!(TimeUnits::parse("hours after 2000-01-01").is_none());
    }

    #[test]
    fn hours_since_1980_round_trips_half_hours() {
        let units = TimeUnits::hours_since_1980();
        let t = dt(2015, 11, 1, 0, 30);
        let encoded = units.encode(t);
        assert_eq!(units.decode(encoded), Some(t));
        assert_eq!(units.to_string(), "hours since 1980-01-01 00:00:00");
    }
}
