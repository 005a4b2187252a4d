use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{Datelike, NaiveDate};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::Config;
use crate::datetime::{day_heading, today_in_display_zone};
use crate::grid::DAYS_PER_WEEK;
use crate::item::TimeBoundedItem;
use crate::layout::MonthLayout;
use crate::overflow::OverflowEntry;
use crate::placement::{CornerStyle, PlacedBar};

const WEEKDAYS: [&str; DAYS_PER_WEEK] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MIN_CELL_WIDTH: usize = 6;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all, fields(month = %layout.month))]
    pub fn print_month(&self, layout: &MonthLayout, cell_width: usize) -> anyhow::Result<()> {
        self.write_month(io::stdout().lock(), layout, cell_width)
    }

    pub fn write_month<W: Write>(&self, mut out: W, layout: &MonthLayout, cell_width: usize) -> anyhow::Result<()> {
        let width = cell_width.max(MIN_CELL_WIDTH);
        let rule = format!("+{}", format!("{}+", "-".repeat(width)).repeat(DAYS_PER_WEEK));
        let today = today_in_display_zone();

        let title = layout.month.title();
        let total = rule.chars().count();
        let pad = total.saturating_sub(UnicodeWidthStr::width(title.as_str())) / 2;
        writeln!(out, "{}{}", " ".repeat(pad), self.paint(&title, "1"))?;

        writeln!(out, "{rule}")?;
        let header: Vec<String> = WEEKDAYS.iter().map(|day| fit(day, width)).collect();
        writeln!(out, "|{}|", header.join("|"))?;
        writeln!(out, "{rule}")?;

        for (week, placement) in layout.weeks.iter().enumerate() {
            let days: Vec<String> = layout
                .grid
                .week(week)
                .iter()
                .map(|cell| match cell.date {
                    Some(date) => {
                        let text = fit(&format!("{:>2}", date.day()), width);
                        if date == today { self.paint(&text, "7") } else { text }
                    }
                    None => " ".repeat(width),
                })
                .collect();
            writeln!(out, "|{}|", days.join("|"))?;

            for slot in 0..layout.visible_rows(week) {
                let bars: Vec<&PlacedBar> = placement.visible_bars().filter(|bar| bar.slot == slot).collect();
                writeln!(out, "{}", self.bar_row(&bars, layout, width))?;
            }

            let markers: Vec<String> = (0..DAYS_PER_WEEK)
                .map(|column| match layout.overflow_at(week, column) {
                    Some(entry) => self.paint(&fit(&format!("+{} more", entry.hidden_count), width), "33"),
                    None => " ".repeat(width),
                })
                .collect();
            if (0..DAYS_PER_WEEK).any(|column| layout.overflow_at(week, column).is_some()) {
                writeln!(out, "|{}|", markers.join("|"))?;
            }

            writeln!(out, "{rule}")?;
        }

        Ok(())
    }

    fn bar_row(&self, bars: &[&PlacedBar], layout: &MonthLayout, width: usize) -> String {
        let mut row = String::from("|");
        let mut column = 0;

        while column < DAYS_PER_WEEK {
            let Some(bar) = bars.iter().find(|bar| bar.start_column == column) else {
                row.push_str(&" ".repeat(width));
                row.push('|');
                column += 1;
                continue;
            };

            let span = bar.end_column - bar.start_column + 1;
            let inner = span * width + (span - 1);
            let label = if bar.show_label {
                layout.item(&bar.item).map(|item| item.name.as_str()).unwrap_or(bar.item.as_str())
            } else {
                ""
            };
            row.push_str(&self.paint(&bar_text(label, bar.corners, inner), "36"));
            row.push('|');
            column = bar.end_column + 1;
        }

        row
    }

    #[tracing::instrument(skip_all, fields(date = %date, items = items.len()))]
    pub fn print_day(
        &self,
        date: NaiveDate,
        items: &[&TimeBoundedItem],
        overflow: Option<&OverflowEntry>,
    ) -> anyhow::Result<()> {
        self.write_day(io::stdout().lock(), date, items, overflow)
    }

    pub fn write_day<W: Write>(
        &self,
        mut out: W,
        date: NaiveDate,
        items: &[&TimeBoundedItem],
        overflow: Option<&OverflowEntry>,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&day_heading(date), "1"))?;
        if let Some(entry) = overflow {
            writeln!(out, "{} hidden on the calendar", entry.hidden_count)?;
        }
        writeln!(out)?;

        if items.is_empty() {
            writeln!(out, "No items.")?;
            return Ok(());
        }

        let rows = items
            .iter()
            .map(|item| {
                vec![
                    self.paint(&item.name, "36"),
                    item.formatted_dates(),
                    item.location.clone(),
                ]
            })
            .collect();
        write_table(&mut out, vec!["Name".to_string(), "When".to_string(), "Where".to_string()], rows)
    }

    #[tracing::instrument(skip_all, fields(items = items.len()))]
    pub fn print_listing(&self, items: &[&TimeBoundedItem]) -> anyhow::Result<()> {
        self.write_listing(io::stdout().lock(), items)
    }

    pub fn write_listing<W: Write>(&self, mut out: W, items: &[&TimeBoundedItem]) -> anyhow::Result<()> {
        let headers = vec![
            "Name".to_string(),
            "When".to_string(),
            "Where".to_string(),
            "About".to_string(),
        ];

        let rows = items
            .iter()
            .map(|item| {
                let when = item.formatted_dates();
                let when = if item.is_expired() { self.paint(&when, "31") } else { when };
                vec![
                    self.paint(&item.name, "33"),
                    when,
                    item.location.clone(),
                    item.short_description.replace('\n', " "),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// `(Label====)` style bar exactly `width` columns wide. Square ends mark a
/// continuation into the neighbouring week.
fn bar_text(label: &str, corners: CornerStyle, width: usize) -> String {
    let (left, right) = match corners {
        CornerStyle::BothRounded => ('(', ')'),
        CornerStyle::LeftRounded => ('(', '>'),
        CornerStyle::RightRounded => ('<', ')'),
        CornerStyle::Square => ('<', '>'),
    };

    if width < 2 {
        return fit("", width);
    }

    let body_width = width - 2;
    let mut body = truncate(label, body_width);
    let used = UnicodeWidthStr::width(body.as_str());
    body.push_str(&"=".repeat(body_width.saturating_sub(used)));
    format!("{left}{body}{right}")
}

fn fit(text: &str, width: usize) -> String {
    let mut out = truncate(text, width);
    let used = UnicodeWidthStr::width(out.as_str());
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}

fn truncate(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out
}

fn write_table<W: Write>(mut writer: W, headers: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{:width$} ", header, width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
