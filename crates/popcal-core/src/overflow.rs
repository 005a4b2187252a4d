use chrono::NaiveDate;
use tracing::debug;

use crate::grid::{DAYS_PER_WEEK, MonthGrid};
use crate::item::{ItemId, TimeBoundedItem};
use crate::placement::{VisibleCap, WeekPlacement};

/// A day whose assigned items exceed the visible cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowEntry {
    pub week: usize,
    pub column: usize,
    pub date: NaiveDate,
    /// The `N` in "+N more".
    pub hidden_count: usize,
    /// Every item touching `date`, in collection order.
    pub items: Vec<ItemId>,
}

/// Builds one entry per in-month day whose column count exceeds `cap`.
///
/// Counts come from placement; the item list for each day is looked up
/// again from `items` so that spans the slot pass dropped still appear.
#[tracing::instrument(level = "debug", skip_all, fields(cap = cap.get()))]
pub fn resolve_overflow<'a, I>(
    grid: &MonthGrid,
    weeks: &[WeekPlacement],
    items: I,
    cap: VisibleCap,
) -> Vec<OverflowEntry>
where
    I: IntoIterator<Item = &'a TimeBoundedItem> + Clone,
{
    let mut entries = Vec::new();

    for placement in weeks {
        for column in 0..DAYS_PER_WEEK {
            let hidden_count = placement.hidden_count(column, cap);
            if hidden_count == 0 {
                continue;
            }
            let Some(date) = grid.date_at(placement.week, column) else {
                continue;
            };

            entries.push(OverflowEntry {
                week: placement.week,
                column,
                date,
                hidden_count,
                items: items_on_date(date, items.clone())
                    .map(|item| item.id.clone())
                    .collect(),
            });
        }
    }

    debug!(days = entries.len(), "resolved overflow");
    entries
}

/// Items whose calendar days include `date`, compared as plain dates with
/// both ends inclusive. Independent of slots and visibility.
pub fn items_on_date<'a, I>(date: NaiveDate, items: I) -> impl Iterator<Item = &'a TimeBoundedItem>
where
    I: IntoIterator<Item = &'a TimeBoundedItem>,
{
    items.into_iter().filter(move |item| {
        item.day_span()
            .is_some_and(|span| span.contains(date))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CalendarMonth;
    use crate::item::ItemRecord;
    use crate::placement::{SLOT_CEILING, place_month};

    fn item(name: &str, start: &str, end: &str) -> TimeBoundedItem {
        TimeBoundedItem::from_record(ItemRecord {
            name: Some(name.to_string()),
            start_datetime: Some(start.to_string()),
            end_datetime: Some(end.to_string()),
            ..ItemRecord::default()
        })
    }

    fn may() -> CalendarMonth {
        CalendarMonth::new(2025, 4).expect("valid month")
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).expect("valid date")
    }

    fn cap(n: usize) -> VisibleCap {
        VisibleCap::new(n).expect("positive cap")
    }

    fn overflow_for(items: &[TimeBoundedItem], visible: usize) -> Vec<OverflowEntry> {
        let grid = MonthGrid::build(may());
        let placement = place_month(items, may(), cap(visible));
        resolve_overflow(&grid, &placement.weeks, items, cap(visible))
    }

    #[test]
    fn counts_only_days_over_the_cap() {
        let items = vec![
            item("Brunch", "2025-05-14 10:00", "2025-05-14 12:00"),
            item("Lunch", "2025-05-14 12:00", "2025-05-14 13:00"),
            item("Dinner", "2025-05-14 18:00", "2025-05-14 21:00"),
            item("Other Day", "2025-05-15", ""),
        ];

        let entries = overflow_for(&items, 2);
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!((entry.week, entry.column, entry.date), (2, 3, date(14)));
        assert_eq!(entry.hidden_count, 1);
        let ids: Vec<&str> = entry.items.iter().map(ItemId::as_str).collect();
        assert_eq!(ids, vec!["brunch", "lunch", "dinner"]);

        assert!(overflow_for(&items, 3).is_empty());
    }

    #[test]
    fn multi_day_items_count_on_each_day() {
        let items = vec![
            item("A", "2025-05-12", "2025-05-13"),
            item("B", "2025-05-12", "2025-05-13"),
            item("C", "2025-05-13", "2025-05-15"),
        ];

        let entries = overflow_for(&items, 2);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, date(13));
        assert_eq!(entries[0].hidden_count, 1);
        assert_eq!(entries[0].items.len(), 3);
    }

    #[test]
    fn lookup_includes_items_without_a_slot() {
        let items: Vec<TimeBoundedItem> = (0..SLOT_CEILING + 2)
            .map(|n| item(&format!("Booth {n}"), "2025-05-14", ""))
            .collect();

        let entries = overflow_for(&items, 4);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].hidden_count, SLOT_CEILING + 2 - 4);
        assert_eq!(entries[0].items.len(), SLOT_CEILING + 2);
    }

    #[test]
    fn date_lookup_is_inclusive_and_ignores_unreadable_starts() {
        let items = vec![
            item("Span", "2025-05-10", "2025-05-12"),
            item("Open", "2025-05-01", "Ongoing"),
            item("Broken", "whenever", ""),
            item("Timed", "2025-05-12 23:30", ""),
        ];

        let names = |day: u32| {
            items_on_date(date(day), &items)
                .map(|item| item.name.as_str())
                .collect::<Vec<_>>()
        };

        assert_eq!(names(10), vec!["Span", "Open"]);
        assert_eq!(names(12), vec!["Span", "Open", "Timed"]);
        assert_eq!(names(13), vec!["Open"]);
    }
}
