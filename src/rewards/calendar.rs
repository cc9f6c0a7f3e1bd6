use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Maps instants to calendar days in one fixed UTC offset.
///
/// Every day comparison in the reward engine goes through the same
/// calendar, so check-ins and daily tasks agree on when a day starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Calendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Parse an offset such as `+08:00` or `-05:30`.
    pub fn parse(offset: &str) -> Result<Self, chrono::ParseError> {
        offset.trim().parse::<FixedOffset>().map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.day_of(Utc::now())
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self::utc()
    }
}

/// Storage form of a day (`YYYY-MM-DD`).
pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn day_follows_configured_offset() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 17, 30, 0).unwrap();
        let utc = Calendar::utc();
        let shanghai = Calendar::parse("+08:00").unwrap();
        assert_eq!(utc.day_of(at), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(
            shanghai.day_of(at),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
    }

    #[test]
    fn negative_offsets_parse() {
        let calendar = Calendar::parse("-05:30").unwrap();
        assert_eq!(calendar.offset().local_minus_utc(), -(5 * 3600 + 30 * 60));
    }

    #[test]
    fn garbage_offset_is_rejected() {
        assert!(Calendar::parse("tomorrow").is_err());
    }

    #[test]
    fn day_keys_round_trip() {
        let day = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        assert_eq!(day_key(day), "2026-12-31");
        assert_eq!(parse_day_key("2026-12-31"), Some(day));
        assert_eq!(parse_day_key("31/12/2026"), None);
    }
}
