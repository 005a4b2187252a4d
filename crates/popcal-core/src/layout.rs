//! One complete render pass over an immutable item snapshot.
//!
//! A pass is `grid -> per-week placement -> overflow`, recomputed from
//! scratch for every trigger (load, navigation, resize). All inputs travel
//! in a [`RenderContext`]; nothing here reads globals or the viewport.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{info, instrument};

pub use crate::grid::CalendarMonth;
use crate::grid::MonthGrid;
use crate::item::{DataQualityIssue, ItemId, TimeBoundedItem};
use crate::overflow::{OverflowEntry, items_on_date, resolve_overflow};
use crate::placement::{PlacedBar, WeekPlacement, place_month};
pub use crate::placement::VisibleCap;
use crate::store::ItemSnapshot;

/// Maps a viewport width to a visible cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapPolicy {
    pub narrow_breakpoint: u32,
    pub narrow_cap: VisibleCap,
    pub wide_cap: VisibleCap,
}

impl Default for CapPolicy {
    fn default() -> Self {
        Self {
            narrow_breakpoint: 900,
            narrow_cap: VisibleCap::new(2).unwrap_or(VisibleCap::MIN),
            wide_cap: VisibleCap::new(4).unwrap_or(VisibleCap::MIN),
        }
    }
}

impl CapPolicy {
    pub fn cap_for_width(&self, width_px: u32) -> VisibleCap {
        if width_px <= self.narrow_breakpoint {
            self.narrow_cap
        } else {
            self.wide_cap
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderContext {
    pub month: CalendarMonth,
    pub visible_cap: VisibleCap,
    pub snapshot: Arc<ItemSnapshot>,
}

impl RenderContext {
    pub fn new(month: CalendarMonth, visible_cap: VisibleCap, snapshot: Arc<ItemSnapshot>) -> Self {
        Self {
            month,
            visible_cap,
            snapshot,
        }
    }

    pub fn with_month(&self, month: CalendarMonth) -> Self {
        Self {
            month,
            ..self.clone()
        }
    }

    pub fn with_cap(&self, visible_cap: VisibleCap) -> Self {
        Self {
            visible_cap,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonthLayout {
    pub month: CalendarMonth,
    pub visible_cap: VisibleCap,
    pub grid: MonthGrid,
    pub weeks: Vec<WeekPlacement>,
    pub overflow: Vec<OverflowEntry>,
    pub issues: Vec<DataQualityIssue>,
    snapshot: Arc<ItemSnapshot>,
}

impl MonthLayout {
    pub fn item(&self, id: &ItemId) -> Option<&TimeBoundedItem> {
        self.snapshot.get(id)
    }

    /// Every visible segment of `id`, in week order. Highlighting one
    /// segment highlights all of these.
    pub fn segments_for(&self, id: &ItemId) -> Vec<&PlacedBar> {
        self.weeks
            .iter()
            .flat_map(|week| week.visible_bars())
            .filter(|bar| &bar.item == id)
            .collect()
    }

    /// Resolves a hit on `(week, column, slot)` to the visible bar there.
    pub fn item_at(&self, week: usize, column: usize, slot: usize) -> Option<&ItemId> {
        self.weeks
            .get(week)?
            .visible_bars()
            .find(|bar| bar.slot == slot && bar.covers(column))
            .map(|bar| &bar.item)
    }

    pub fn overflow_at(&self, week: usize, column: usize) -> Option<&OverflowEntry> {
        self.overflow
            .iter()
            .find(|entry| entry.week == week && entry.column == column)
    }

    pub fn overflow_on(&self, date: NaiveDate) -> Option<&OverflowEntry> {
        self.overflow.iter().find(|entry| entry.date == date)
    }

    /// Calendar-visible items touching `date`, whether or not they overflow.
    pub fn items_on(&self, date: NaiveDate) -> Vec<&TimeBoundedItem> {
        items_on_date(date, calendar_items(&self.snapshot)).collect()
    }

    /// Highest visible slot in `week`, i.e. how many bar rows to draw.
    pub fn visible_rows(&self, week: usize) -> usize {
        self.weeks
            .get(week)
            .and_then(|placement| placement.visible_bars().map(|bar| bar.slot + 1).max())
            .unwrap_or(0)
    }
}

fn calendar_items(snapshot: &ItemSnapshot) -> impl Iterator<Item = &TimeBoundedItem> + Clone {
    snapshot.items().iter().filter(|item| item.on_calendar())
}

#[instrument(level = "debug", skip_all, fields(month = %ctx.month, cap = ctx.visible_cap.get(), generation = ctx.snapshot.generation()))]
pub fn render_month(ctx: &RenderContext) -> MonthLayout {
    let grid = MonthGrid::build(ctx.month);
    let placement = place_month(calendar_items(&ctx.snapshot), ctx.month, ctx.visible_cap);
    let overflow = resolve_overflow(
        &grid,
        &placement.weeks,
        calendar_items(&ctx.snapshot),
        ctx.visible_cap,
    );

    info!(
        month = %ctx.month,
        bars = placement.weeks.iter().map(|week| week.bars.len()).sum::<usize>(),
        overflow_days = overflow.len(),
        issues = placement.issues.len(),
        "month laid out"
    );

    MonthLayout {
        month: ctx.month,
        visible_cap: ctx.visible_cap,
        grid,
        weeks: placement.weeks,
        overflow,
        issues: placement.issues,
        snapshot: Arc::clone(&ctx.snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Flag, ItemRecord};
    use crate::store::ItemStore;

    fn item(name: &str, start: &str, end: &str) -> TimeBoundedItem {
        TimeBoundedItem::from_record(ItemRecord {
            name: Some(name.to_string()),
            start_datetime: Some(start.to_string()),
            end_datetime: Some(end.to_string()),
            ..ItemRecord::default()
        })
    }

    fn ctx(items: Vec<TimeBoundedItem>, cap: usize) -> RenderContext {
        let store = ItemStore::with_items(items);
        RenderContext::new(
            CalendarMonth::new(2025, 4).expect("valid month"),
            VisibleCap::new(cap).expect("positive cap"),
            store.snapshot(),
        )
    }

    #[test]
    fn cap_policy_switches_at_breakpoint() {
        let policy = CapPolicy::default();
        assert_eq!(policy.cap_for_width(375).get(), 2);
        assert_eq!(policy.cap_for_width(900).get(), 2);
        assert_eq!(policy.cap_for_width(901).get(), 4);
    }

    #[test]
    fn hidden_from_calendar_is_not_placed() {
        let mut hidden = ItemRecord {
            name: Some("Private".to_string()),
            start_datetime: Some("2025-05-14".to_string()),
            ..ItemRecord::default()
        };
        hidden.display_in_calendar = Some(Flag::Text("FALSE".to_string()));
        let items = vec![
            TimeBoundedItem::from_record(hidden),
            item("Public", "2025-05-14", ""),
        ];

        let layout = render_month(&ctx(items, 4));
        let placed: Vec<&str> = layout
            .weeks
            .iter()
            .flat_map(|week| week.bars.iter().map(|bar| bar.item.as_str()))
            .collect();
        assert_eq!(placed, vec!["public"]);

        let day = NaiveDate::from_ymd_opt(2025, 5, 14).expect("valid date");
        assert_eq!(layout.items_on(day).len(), 1);
    }

    #[test]
    fn segments_and_hits_resolve_to_ids() {
        let layout = render_month(&ctx(vec![item("Long Run", "2025-05-08", "2025-05-22")], 4));
        let id = ItemId::new("long-run");

        let segments = layout.segments_for(&id);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|bar| bar.slot == 0));

        assert_eq!(layout.item_at(2, 3, 0), Some(&id));
        assert_eq!(layout.item_at(1, 0, 0), None);
        assert_eq!(layout.item_at(2, 3, 1), None);
        assert_eq!(layout.item(&id).map(|item| item.name.as_str()), Some("Long Run"));
        assert_eq!(layout.visible_rows(2), 1);
        assert_eq!(layout.visible_rows(5), 0);
    }

    #[test]
    fn resize_changes_only_visibility() {
        let items = vec![
            item("One", "2025-05-14", ""),
            item("Two", "2025-05-14", ""),
            item("Three", "2025-05-14", ""),
        ];
        let wide = ctx(items, 4);
        let narrow = wide.with_cap(VisibleCap::new(2).expect("positive cap"));

        let wide_layout = render_month(&wide);
        let narrow_layout = render_month(&narrow);

        assert!(wide_layout.overflow.is_empty());
        let entry = narrow_layout.overflow_at(2, 3).expect("overflow on the 14th");
        assert_eq!(entry.hidden_count, 1);
        assert_eq!(entry.items.len(), 3);
        assert_eq!(
            narrow_layout.overflow_on(entry.date).map(|e| e.column),
            Some(3)
        );

        let slots = |layout: &MonthLayout| -> Vec<usize> {
            layout.weeks[2].bars.iter().map(|bar| bar.slot).collect()
        };
        assert_eq!(slots(&wide_layout), slots(&narrow_layout));
    }

    #[test]
    fn navigation_reuses_the_snapshot() {
        let may = ctx(vec![item("Tail", "2025-05-30", "2025-06-02")], 4);
        let june = may.with_month(may.month.next());

        let june_layout = render_month(&june);
        let bar = june_layout.weeks[0].bars.first().expect("june segment");
        assert_eq!((bar.start_column, bar.end_column), (0, 1));
        assert!(bar.show_label);
        assert_eq!(bar.corners, crate::placement::CornerStyle::BothRounded);
    }
}
