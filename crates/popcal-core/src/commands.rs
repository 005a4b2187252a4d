use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::{debug, info, warn};

use crate::cli::{Command, MonthArgs};
use crate::config::{self, Config};
use crate::format::format_range;
use crate::grid::CalendarMonth;
use crate::item::TimeBoundedItem;
use crate::layout::{RenderContext, VisibleCap, render_month};
use crate::render::Renderer;
use crate::source::{load_items, save_items_jsonl};
use crate::store::{ItemSnapshot, ItemStore};

#[tracing::instrument(skip_all)]
pub fn dispatch(cfg: &Config, renderer: &Renderer, data: Option<&Path>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Month(args) => cmd_month(cfg, renderer, data, args),
        Command::Day { date } => {
            let store = ItemStore::new();
            let snapshot = load_snapshot(&store, cfg, data)?;
            let cap = configured_cap(cfg, None, None)?;
            let ctx = RenderContext::new(CalendarMonth::containing(date), cap, snapshot);
            let layout = render_month(&ctx);

            let items = layout.items_on(date);
            debug!(date = %date, items = items.len(), "day view");
            renderer.print_day(date, &items, layout.overflow_on(date))
        }
        Command::Format {
            start,
            end,
            all_day,
            recurring,
        } => {
            println!("{}", format_range(&start, &end, all_day, recurring));
            Ok(())
        }
        Command::List { upcoming } => {
            let store = ItemStore::new();
            let snapshot = load_snapshot(&store, cfg, data)?;
            let upcoming = upcoming || cfg.get_bool("list.upcoming_only").unwrap_or(false);

            let items: Vec<&TimeBoundedItem> = snapshot
                .items()
                .iter()
                .filter(|item| item.on_listing())
                .filter(|item| !upcoming || !item.is_expired())
                .collect();
            info!(shown = items.len(), total = snapshot.len(), upcoming, "listing");
            renderer.print_listing(&items)
        }
        Command::Export { out } => {
            let path = config::resolve_data_path(cfg, data)?;
            let loaded = load_items(&path)?;
            save_items_jsonl(&out, &loaded.items).with_context(|| format!("failed exporting to {}", out.display()))?;
            println!("Exported {} items to {}.", loaded.items.len(), out.display());
            Ok(())
        }
    }
}

#[tracing::instrument(skip_all)]
fn cmd_month(cfg: &Config, renderer: &Renderer, data: Option<&Path>, args: MonthArgs) -> anyhow::Result<()> {
    let store = ItemStore::new();
    let snapshot = load_snapshot(&store, cfg, data)?;
    let month = args.month.unwrap_or_else(CalendarMonth::current);
    let cap = configured_cap(cfg, args.cap, args.width)?;

    let layout = render_month(&RenderContext::new(month, cap, snapshot));
    for issue in &layout.issues {
        debug!(issue = %issue, "data quality");
    }

    let cell_width = cfg.get_usize("calendar.cell_width")?.unwrap_or(14);
    renderer.print_month(&layout, cell_width)
}

/// `--cap` wins, then `--width`, then `calendar.viewport_width`.
fn configured_cap(cfg: &Config, cap: Option<usize>, width: Option<u32>) -> anyhow::Result<VisibleCap> {
    if let Some(cap) = cap {
        return VisibleCap::new(cap).ok_or_else(|| anyhow!("--cap must be at least 1"));
    }

    let policy = cfg.cap_policy()?;
    let width = match width {
        Some(width) => width,
        None => cfg
            .get_usize("calendar.viewport_width")?
            .map(|raw| u32::try_from(raw).unwrap_or(u32::MAX))
            .unwrap_or(1280),
    };
    let cap = policy.cap_for_width(width);
    debug!(width, cap = cap.get(), "visible cap from width");
    Ok(cap)
}

fn load_snapshot(store: &ItemStore, cfg: &Config, data: Option<&Path>) -> anyhow::Result<Arc<ItemSnapshot>> {
    let path = config::resolve_data_path(cfg, data)?;
    let ticket = store.begin_load();
    let loaded = load_items(&path)?;
    for issue in &loaded.issues {
        warn!(issue = %issue, "data quality");
    }

    if !store.commit(ticket, loaded.items) {
        debug!(ticket = ticket.number(), "load superseded");
    }
    Ok(store.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_cap_beats_width() {
        let cfg = Config::default();
        assert_eq!(configured_cap(&cfg, Some(3), Some(300)).expect("cap").get(), 3);
        assert!(configured_cap(&cfg, Some(0), None).is_err());
    }

    #[test]
    fn width_maps_through_policy() {
        let mut cfg = Config::default();
        assert_eq!(configured_cap(&cfg, None, Some(800)).expect("cap").get(), 2);
        assert_eq!(configured_cap(&cfg, None, None).expect("cap").get(), 4);

        cfg.apply_overrides([("calendar.viewport_width".to_string(), "640".to_string())]);
        assert_eq!(configured_cap(&cfg, None, None).expect("cap").get(), 2);
    }
}
