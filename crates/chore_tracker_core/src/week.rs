//! crates/chore_tracker_core/src/week.rs
//!
//! Monday-to-Sunday week arithmetic used by the weekly statistics.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::Serialize;

use crate::ports::{PortError, PortResult};

/// An inclusive Monday..Sunday window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekRange {
    pub monday: NaiveDate,
    pub sunday: NaiveDate,
}

impl WeekRange {
    /// The week containing `reference`. Sunday belongs to the week that
    /// started six days earlier.
    ///
    /// Dates whose week would leave chrono's calendar range are rejected.
    pub fn containing(reference: NaiveDate) -> PortResult<Self> {
        let back = match reference.weekday().num_days_from_sunday() {
            0 => 6,
            dow => u64::from(dow - 1),
        };
        let out_of_range =
            || PortError::Validation(format!("{} is outside the supported calendar", reference));
        let monday = reference
            .checked_sub_days(Days::new(back))
            .ok_or_else(out_of_range)?;
        let sunday = monday
            .checked_add_days(Days::new(6))
            .ok_or_else(out_of_range)?;
        Ok(Self { monday, sunday })
    }

    /// The seven dates of the week, Monday first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.monday.iter_days().take_while(move |d| *d <= self.sunday)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.monday <= date && date <= self.sunday
    }
}

/// Short English label for a weekday ("Mon", "Tue", ...).
pub fn day_label(weekday: Weekday) -> String {
    weekday.to_string()
}

/// `round(done / total * 100)`, or 0 when there is nothing to do.
pub fn completion_percentage(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn wednesday_maps_to_its_monday_and_sunday() {
        let week = WeekRange::containing(date(2024, 6, 12)).unwrap();
        assert_eq!(week.monday, date(2024, 6, 10));
        assert_eq!(week.sunday, date(2024, 6, 16));
    }

    #[test]
    fn sunday_belongs_to_the_preceding_monday() {
        let week = WeekRange::containing(date(2024, 6, 16)).unwrap();
        assert_eq!(week.monday, date(2024, 6, 10));
        let week = WeekRange::containing(date(2024, 6, 10)).unwrap();
        assert_eq!(week.monday, date(2024, 6, 10));
    }

    #[test]
    fn window_always_brackets_the_reference_date() {
        let mut reference = date(2023, 12, 20);
        // Crosses a year boundary and a leap day.
        while reference <= date(2024, 3, 10) {
            let week = WeekRange::containing(reference).unwrap();
            assert!(week.contains(reference), "{} not in {:?}", reference, week);
            assert_eq!(week.monday.weekday(), Weekday::Mon);
            assert_eq!(week.sunday.weekday(), Weekday::Sun);
            assert_eq!((week.sunday - week.monday).num_days(), 6);
            let days: Vec<_> = week.days().collect();
            assert_eq!(days.len(), 7);
            assert_eq!(days[0], week.monday);
            assert_eq!(days[6], week.sunday);
            reference = reference.succ_opt().unwrap();
        }
    }

    #[test]
    fn weeks_past_the_calendar_edges_are_rejected() {
        let last: NaiveDate = serde_json::from_str("\"+262142-12-31\"").unwrap();
        assert!(matches!(WeekRange::containing(last), Err(PortError::Validation(_))));
        // The last full week inside the range still works.
        let week = WeekRange::containing(date(2024, 1, 3)).unwrap();
        assert_eq!(week.days().count(), 7);
    }

    #[test]
    fn percentage_rounds_and_guards_zero_totals() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(3, 0), 0);
        assert_eq!(completion_percentage(1, 2), 50);
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(4, 4), 100);
    }

    #[test]
    fn labels_are_short_names() {
        assert_eq!(day_label(Weekday::Mon), "Mon");
        assert_eq!(day_label(Weekday::Sun), "Sun");
    }
}
