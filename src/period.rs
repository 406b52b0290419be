use anyhow::bail;
use chrono::{
    DateTime, Datelike as _, Days, Local, LocalResult, Months, NaiveDate, NaiveDateTime,
    NaiveTime, TimeZone,
};
use chrono_tz::Tz;

/// An inclusive range of calendar days that a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> anyhow::Result<Self> {
        if end < start {
            bail!("period ends ({end}) before it starts ({start})");
        }
        Ok(Self { start, end })
    }

    /// The whole calendar month that `date` falls in.
    pub fn month_containing(date: NaiveDate) -> Self {
        let start = date.with_day(1).expect("the first of the month always exists");
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.checked_sub_days(Days::new(1)))
            .expect("month arithmetic should stay in chrono's range");
        Self { start, end }
    }

    /// The calendar month before the month that this period starts in. This
    /// follows real month lengths rather than stepping back a fixed number of
    /// days.
    pub fn previous_month(&self) -> Self {
        let this_month_start = self.start.with_day(1).expect("the first of the month always exists");
        let last_day_of_previous = this_month_start.pred_opt().expect("date should not underflow");
        Self::month_containing(last_day_of_previous)
    }

    /// Parses a month selector. Valid options are "this-month", "last-month",
    /// a month of the form "%Y-%m", or any date "%Y-%m-%d" within the target
    /// month.
    pub fn parse_month(selector: &str) -> anyhow::Result<Self> {
        let today = Local::now().date_naive();
        match selector {
            "this-month" => Ok(Self::month_containing(today)),
            "last-month" => Ok(Self::month_containing(today).previous_month()),
            selector => {
                if let Ok(date) = NaiveDate::parse_from_str(selector, "%Y-%m-%d") {
                    return Ok(Self::month_containing(date));
                }
                if let Ok(date) = NaiveDate::parse_from_str(&format!("{selector}-01"), "%Y-%m-%d")
                {
                    return Ok(Self::month_containing(date));
                }
                bail!("invalid month \"{selector}\". Use 'this-month', 'last-month', '%Y-%m', or '%Y-%m-%d'")
            }
        }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |day| *day <= self.end)
    }

    pub fn len_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// The first and last instants of the period in the given zone: midnight
    /// of the first day through 23:59:59 of the last day.
    pub fn bounds(&self, tz: &Tz) -> (DateTime<Tz>, DateTime<Tz>) {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).expect("hardcoded time is valid");
        (
            localize_lenient(tz, self.start.and_time(NaiveTime::MIN)),
            localize_lenient(tz, self.end.and_time(end_of_day)),
        )
    }

    /// The period bounds as Unix seconds, which is what the report API takes.
    pub fn interval(&self, tz: &Tz) -> (i64, i64) {
        let (from, to) = self.bounds(tz);
        (from.timestamp(), to.timestamp())
    }

    pub fn describe(&self) -> String {
        format!("{} to {}", self.start.format("%d %b %Y"), self.end.format("%d %b %Y"))
    }
}

/// Localizes a naive timestamp, returning `None` when the local time is
/// ambiguous or does not exist in that zone.
pub fn localize_strict(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(_, _) | LocalResult::None => None,
    }
}

/// Localizes a period boundary. Boundaries must always resolve, so an
/// ambiguous time takes the earlier instant and a skipped time is read as UTC.
fn localize_lenient(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    tz.from_local_datetime(&naive).earliest().unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

/// Column label for a day of the period, e.g. "M-14" for Monday the 14th.
pub fn day_label(date: NaiveDate) -> String {
    let weekday = date.format("%a").to_string();
    format!("{}-{}", &weekday[..1], date.day())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn previous_month_follows_calendar_boundaries() {
        let march = Period::month_containing(date(2024, 3, 5));
        assert_eq!(march, Period { start: date(2024, 3, 1), end: date(2024, 3, 31) });
        assert_eq!(
            march.previous_month(),
            Period { start: date(2024, 2, 1), end: date(2024, 2, 29) }
        );

        let march_2023 = Period::month_containing(date(2023, 3, 5));
        assert_eq!(march_2023.previous_month().end, date(2023, 2, 28));

        let january = Period::month_containing(date(2024, 1, 20));
        assert_eq!(
            january.previous_month(),
            Period { start: date(2023, 12, 1), end: date(2023, 12, 31) }
        );
    }

    #[test]
    fn parses_month_selectors() {
        let expected = Period { start: date(2024, 3, 1), end: date(2024, 3, 31) };
        assert_eq!(Period::parse_month("2024-03").unwrap(), expected);
        assert_eq!(Period::parse_month("2024-03-17").unwrap(), expected);
        assert!(Period::parse_month("March").is_err());
    }

    #[test]
    fn days_cover_the_whole_period() {
        let period = Period::month_containing(date(2024, 2, 10));
        assert_eq!(period.len_days(), 29);
        assert_eq!(period.days().count(), 29);
        assert_eq!(period.days().last(), Some(date(2024, 2, 29)));
    }

    #[test]
    fn bounds_span_whole_local_days() {
        let tz: Tz = "Africa/Nairobi".parse().unwrap();
        let period = Period::month_containing(date(2024, 3, 1));
        let (from, to) = period.interval(&tz);
        // Nairobi is UTC+3 all year.
        assert_eq!(from, 1_709_240_400);
        assert_eq!(to - from, 31 * 86_400 - 1);
    }

    #[test]
    fn strict_localization_rejects_ambiguous_times() {
        let tz: Tz = "Europe/London".parse().unwrap();
        let ambiguous = date(2024, 10, 27).and_hms_opt(1, 30, 0).unwrap();
        let skipped = date(2024, 3, 31).and_hms_opt(1, 30, 0).unwrap();
        let normal = date(2024, 6, 1).and_hms_opt(12, 0, 0).unwrap();
        assert!(localize_strict(&tz, ambiguous).is_none());
        assert!(localize_strict(&tz, skipped).is_none());
        assert!(localize_strict(&tz, normal).is_some());
    }

    #[test]
    fn labels_days_by_weekday_initial() {
        assert_eq!(day_label(date(2024, 3, 1)), "F-1");
        assert_eq!(day_label(date(2024, 3, 11)), "M-11");
    }
}
