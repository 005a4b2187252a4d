//! Week-local bar placement.
//!
//! Items are clamped to the displayed month, turned into grid cell spans,
//! then placed one week at a time: multi-day spans first, first-fit into the
//! lowest slot that is free across every column the span covers. Occupancy is
//! a slot × column table that lives only for the week being placed.

use std::num::NonZeroUsize;

use tracing::{debug, trace, warn};

use crate::grid::{CalendarMonth, DAYS_PER_WEEK, GRID_CELLS, GRID_WEEKS};
use crate::item::{DataQualityIssue, ItemId, TimeBoundedItem};

/// Upper bound on stacked rows per week. Spans that find no free row below
/// it are left unplaced and only show up in the overflow count.
pub const SLOT_CEILING: usize = 20;

/// Maximum number of bars drawn per day. Chosen by the caller (usually from
/// viewport width); never read from the environment here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VisibleCap(NonZeroUsize);

impl VisibleCap {
    pub const MIN: Self = Self(NonZeroUsize::MIN);

    pub fn new(cap: usize) -> Option<Self> {
        NonZeroUsize::new(cap).map(Self)
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerStyle {
    BothRounded,
    LeftRounded,
    RightRounded,
    Square,
}

/// An item clamped to the displayed month, as grid cell indices.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSpan<'a> {
    pub item: &'a TimeBoundedItem,
    pub start_cell: usize,
    pub end_cell: usize,
}

impl ResolvedSpan<'_> {
    pub fn is_multi_day(&self) -> bool {
        self.start_cell != self.end_cell
    }

    fn start_week(&self) -> usize {
        self.start_cell / DAYS_PER_WEEK
    }

    fn end_week(&self) -> usize {
        self.end_cell / DAYS_PER_WEEK
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedBar {
    pub item: ItemId,
    pub week: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub slot: usize,
    pub is_multi_day: bool,
    pub show_label: bool,
    pub corners: CornerStyle,
    /// False when the bar sits at or beyond the visible cap on any of its
    /// columns. Hidden bars keep their slot and still count as overflow.
    pub visible: bool,
}

impl PlacedBar {
    pub fn columns(&self) -> std::ops::RangeInclusive<usize> {
        self.start_column..=self.end_column
    }

    pub fn covers(&self, column: usize) -> bool {
        self.columns().contains(&column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekPlacement {
    pub week: usize,
    /// Slotted bars in placement order (multi-day first).
    pub bars: Vec<PlacedBar>,
    /// Spans that overlapped the week but found no slot under the ceiling.
    pub unplaced: Vec<ItemId>,
    /// Items assigned to each column, hidden and unplaced ones included.
    pub column_counts: [usize; DAYS_PER_WEEK],
}

impl WeekPlacement {
    pub fn visible_bars(&self) -> impl Iterator<Item = &PlacedBar> {
        self.bars.iter().filter(|bar| bar.visible)
    }

    pub fn hidden_count(&self, column: usize, cap: VisibleCap) -> usize {
        self.column_counts
            .get(column)
            .map(|count| count.saturating_sub(cap.get()))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthPlacement {
    pub weeks: Vec<WeekPlacement>,
    pub issues: Vec<DataQualityIssue>,
}

/// Resolves every item to a month-clamped cell span. Items without a
/// readable start, or with no overlap with the month, are dropped.
#[tracing::instrument(level = "debug", skip_all, fields(month = %month))]
pub fn resolve_spans<'a, I>(items: I, month: CalendarMonth) -> (Vec<ResolvedSpan<'a>>, Vec<DataQualityIssue>)
where
    I: IntoIterator<Item = &'a TimeBoundedItem>,
{
    let first = month.first_day();
    let last = month.last_day();
    let mut spans = Vec::new();
    let mut issues = Vec::new();

    for item in items {
        let Some(span) = item.day_span() else {
            if !item.start.trim().is_empty() && !crate::datetime::is_ongoing(&item.start) {
                warn!(id = %item.id, start = %item.start, "unparseable start; item left off the grid");
                issues.push(DataQualityIssue::UnparseableStart {
                    id: item.id.clone(),
                });
            }
            continue;
        };

        if span.reversed {
            warn!(id = %item.id, start = %item.start, end = %item.end, "end before start; treating as a single day");
            issues.push(DataQualityIssue::EndBeforeStart {
                id: item.id.clone(),
            });
        }

        let start = span.start;
        let end = span.end.unwrap_or_else(|| last.max(start));
        if end < first || start > last {
            trace!(id = %item.id, "outside displayed month");
            continue;
        }

        let (Some(start_cell), Some(end_cell)) = (
            month.cell_index_of(start.max(first)),
            month.cell_index_of(end.min(last)),
        ) else {
            continue;
        };

        spans.push(ResolvedSpan {
            item,
            start_cell,
            end_cell: end_cell.min(GRID_CELLS - 1),
        });
    }

    debug!(spans = spans.len(), issues = issues.len(), "resolved month spans");
    (spans, issues)
}

/// Places a single week from raw items. The issues cover every item
/// resolved for the month plus the slot-ceiling misses of this week.
pub fn place_week<'a, I>(
    week: usize,
    items: I,
    month: CalendarMonth,
    cap: VisibleCap,
) -> (WeekPlacement, Vec<DataQualityIssue>)
where
    I: IntoIterator<Item = &'a TimeBoundedItem>,
{
    let (spans, mut issues) = resolve_spans(items, month);
    let placement = place_resolved_week(week, &spans, cap);
    issues.extend(ceiling_issues(&placement));
    (placement, issues)
}

/// Places all six weeks, resolving spans once.
#[tracing::instrument(level = "debug", skip_all, fields(month = %month, cap = cap.get()))]
pub fn place_month<'a, I>(items: I, month: CalendarMonth, cap: VisibleCap) -> MonthPlacement
where
    I: IntoIterator<Item = &'a TimeBoundedItem>,
{
    let (spans, mut issues) = resolve_spans(items, month);
    let weeks: Vec<WeekPlacement> = (0..GRID_WEEKS)
        .map(|week| place_resolved_week(week, &spans, cap))
        .collect();

    for placement in &weeks {
        issues.extend(ceiling_issues(placement));
    }

    MonthPlacement { weeks, issues }
}

fn ceiling_issues(placement: &WeekPlacement) -> impl Iterator<Item = DataQualityIssue> + '_ {
    placement.unplaced.iter().map(|id| DataQualityIssue::SlotCeilingExceeded {
        id: id.clone(),
        week: placement.week,
    })
}

struct WeekCandidate<'s, 'a> {
    span: &'s ResolvedSpan<'a>,
    start_column: usize,
    end_column: usize,
}

pub fn place_resolved_week(week: usize, spans: &[ResolvedSpan<'_>], cap: VisibleCap) -> WeekPlacement {
    let base = week * DAYS_PER_WEEK;
    let last = base + DAYS_PER_WEEK - 1;

    let mut candidates: Vec<WeekCandidate<'_, '_>> = spans
        .iter()
        .filter(|span| span.end_cell >= base && span.start_cell <= last)
        .filter_map(|span| {
            let start_column = span.start_cell.saturating_sub(base);
            let end_column = (span.end_cell - base).min(DAYS_PER_WEEK - 1);
            (start_column <= end_column).then_some(WeekCandidate {
                span,
                start_column,
                end_column,
            })
        })
        .collect();

    candidates.sort_by_key(|candidate| (!candidate.span.is_multi_day(), candidate.span.start_cell));

    let mut occupied = vec![[false; DAYS_PER_WEEK]; SLOT_CEILING];
    let mut column_counts = [0_usize; DAYS_PER_WEEK];
    let mut bars = Vec::with_capacity(candidates.len());
    let mut unplaced = Vec::new();

    for candidate in candidates {
        let columns = candidate.start_column..=candidate.end_column;
        let slot = occupied
            .iter()
            .position(|row| columns.clone().all(|column| !row[column]));

        let mut visible = true;
        for column in columns.clone() {
            visible &= column_counts[column] < cap.get();
            column_counts[column] += 1;
        }

        let id = candidate.span.item.id.clone();
        let Some(slot) = slot else {
            warn!(id = %id, week, "slot ceiling reached; span counted as overflow only");
            unplaced.push(id);
            continue;
        };

        for column in columns {
            occupied[slot][column] = true;
        }

        let span = candidate.span;
        trace!(id = %id, week, slot, visible, "placed span");
        bars.push(PlacedBar {
            item: id,
            week,
            start_column: candidate.start_column,
            end_column: candidate.end_column,
            slot,
            is_multi_day: span.is_multi_day(),
            show_label: !span.is_multi_day() || week == span.start_week() || candidate.start_column == 0,
            corners: corners_for(week, span),
            visible,
        });
    }

    WeekPlacement {
        week,
        bars,
        unplaced,
        column_counts,
    }
}

fn corners_for(week: usize, span: &ResolvedSpan<'_>) -> CornerStyle {
    match (week == span.start_week(), week == span.end_week()) {
        (true, true) => CornerStyle::BothRounded,
        (true, false) => CornerStyle::LeftRounded,
        (false, true) => CornerStyle::RightRounded,
        (false, false) => CornerStyle::Square,
    }
}
