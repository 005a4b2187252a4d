use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{Datelike, Months, NaiveDate};

use crate::datetime;

pub const DAYS_PER_WEEK: usize = 7;
pub const GRID_WEEKS: usize = 6;
pub const GRID_CELLS: usize = DAYS_PER_WEEK * GRID_WEEKS;

/// A displayed month. Months are 0-based (`0` = January) at the API
/// boundary; `YYYY-MM` text uses the usual 1-based month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarMonth {
    first: NaiveDate,
}

impl CalendarMonth {
    pub fn new(year: i32, month0: u32) -> Option<Self> {
        if month0 > 11 {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month0 + 1, 1).map(|first| Self { first })
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first: date.with_day(1).unwrap_or(date),
        }
    }

    pub fn current() -> Self {
        Self::containing(datetime::today_in_display_zone())
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month0(&self) -> u32 {
        self.first.month0()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn last_day(&self) -> NaiveDate {
        self.first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(self.first)
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    /// Sunday-aligned column of the 1st (0 = Sunday).
    pub fn leading_blanks(&self) -> usize {
        self.first.weekday().num_days_from_sunday() as usize
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first && date <= self.last_day()
    }

    /// Grid position of an in-month date.
    pub fn cell_index_of(&self, date: NaiveDate) -> Option<usize> {
        self.contains(date)
            .then(|| self.leading_blanks() + date.day0() as usize)
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        let day0 = index.checked_sub(self.leading_blanks())?;
        if day0 >= self.days_in_month() as usize {
            return None;
        }
        self.first.with_day0(day0 as u32)
    }

    pub fn next(&self) -> Self {
        self.first
            .checked_add_months(Months::new(1))
            .map(|first| Self { first })
            .unwrap_or(*self)
    }

    pub fn prev(&self) -> Self {
        self.first
            .checked_sub_months(Months::new(1))
            .map(|first| Self { first })
            .unwrap_or(*self)
    }

    pub fn title(&self) -> String {
        datetime::month_title(self.first)
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month0() + 1)
    }
}

impl FromStr for CalendarMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow!("expected YYYY-MM, got: {s}"))?;
        let year: i32 = year.parse().with_context(|| format!("invalid year in {s}"))?;
        let month: u32 = month.parse().with_context(|| format!("invalid month in {s}"))?;
        month
            .checked_sub(1)
            .and_then(|month0| Self::new(year, month0))
            .ok_or_else(|| anyhow!("month out of range in {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarCell {
    pub index: usize,
    pub date: Option<NaiveDate>,
    pub week: usize,
    pub weekday: usize,
    pub in_month: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
    month: CalendarMonth,
    cells: Vec<CalendarCell>,
}

impl MonthGrid {
    /// Always 6 rows of 7, even for months that fit in fewer rows; the
    /// trailing rows are then entirely blank.
    #[tracing::instrument(level = "debug", skip_all, fields(month = %month))]
    pub fn build(month: CalendarMonth) -> Self {
        let cells = (0..GRID_CELLS)
            .map(|index| {
                let date = month.date_at(index);
                CalendarCell {
                    index,
                    date,
                    week: index / DAYS_PER_WEEK,
                    weekday: index % DAYS_PER_WEEK,
                    in_month: date.is_some(),
                }
            })
            .collect();

        Self { month, cells }
    }

    pub fn month(&self) -> CalendarMonth {
        self.month
    }

    pub fn cells(&self) -> &[CalendarCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&CalendarCell> {
        self.cells.get(index)
    }

    pub fn week(&self, week: usize) -> &[CalendarCell] {
        let start = (week * DAYS_PER_WEEK).min(self.cells.len());
        let end = (start + DAYS_PER_WEEK).min(self.cells.len());
        &self.cells[start..end]
    }

    pub fn date_at(&self, week: usize, column: usize) -> Option<NaiveDate> {
        if column >= DAYS_PER_WEEK {
            return None;
        }
        self.cell(week * DAYS_PER_WEEK + column).and_then(|cell| cell.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(year: i32, month0: u32) -> CalendarMonth {
        CalendarMonth::new(year, month0).expect("valid month")
    }

    #[test]
    fn may_2025_starts_on_thursday() {
        let grid = MonthGrid::build(month(2025, 4));
        assert_eq!(grid.cells().len(), GRID_CELLS);
        assert!(grid.cells()[..4].iter().all(|cell| !cell.in_month && cell.date.is_none()));

        let first = grid.cell(4).expect("cell 4");
        assert!(first.in_month);
        assert_eq!(first.date.map(|d| d.to_string()), Some("2025-05-01".to_string()));
        assert_eq!((first.week, first.weekday), (0, 4));

        let last = grid.cell(34).expect("cell 34");
        assert_eq!(last.date.map(|d| d.to_string()), Some("2025-05-31".to_string()));
        assert!(grid.cells()[35..].iter().all(|cell| !cell.in_month));
    }

    #[test]
    fn short_month_keeps_six_rows() {
        // February 2015 begins on a Sunday and fills exactly four rows.
        let grid = MonthGrid::build(month(2015, 1));
        assert_eq!(grid.cells().len(), GRID_CELLS);
        assert_eq!(grid.cell(0).and_then(|c| c.date).map(|d| d.to_string()), Some("2015-02-01".to_string()));
        assert!(grid.week(4).iter().chain(grid.week(5)).all(|cell| !cell.in_month));
    }

    #[test]
    fn leap_february_has_29_days() {
        let feb = month(2024, 1);
        assert_eq!(feb.days_in_month(), 29);
        assert_eq!(feb.leading_blanks(), 4);
    }

    #[test]
    fn navigation_wraps_years() {
        let jan = month(2025, 0);
        assert_eq!(jan.prev(), month(2024, 11));
        assert_eq!(month(2024, 11).next(), jan);
        assert_eq!(jan.title(), "January 2025");
    }

    #[test]
    fn parses_year_month_text() {
        let parsed: CalendarMonth = "2025-05".parse().expect("parse month");
        assert_eq!(parsed, month(2025, 4));
        assert_eq!(parsed.to_string(), "2025-05");
        assert!("2025-13".parse::<CalendarMonth>().is_err());
        assert!("2025-00".parse::<CalendarMonth>().is_err());
        assert!(CalendarMonth::new(2025, 12).is_none());
    }

    #[test]
    fn cell_index_round_trips_for_in_month_dates() {
        let may = month(2025, 4);
        let date = NaiveDate::from_ymd_opt(2025, 5, 30).expect("valid date");
        assert_eq!(may.cell_index_of(date), Some(33));
        assert_eq!(may.date_at(33), Some(date));
        assert_eq!(may.cell_index_of(NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")), None);
    }
}
