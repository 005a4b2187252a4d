use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::datetime::{self, Stamp};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility {
    pub overall: bool,
    pub calendar: bool,
    pub listing: bool,
    pub carousel: bool,
}

impl Default for Visibility {
    fn default() -> Self {
        Self {
            overall: true,
            calendar: true,
            listing: true,
            carousel: true,
        }
    }
}

/// A boolean as it arrives from a data source: a real JSON bool or a
/// spreadsheet-style `TRUE`/`FALSE` cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Text(String),
}

impl Flag {
    pub fn resolve(&self) -> Option<bool> {
        match self {
            Flag::Bool(value) => Some(*value),
            Flag::Text(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(true),
                "false" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlugField {
    Plain(String),
    Document { current: String },
}

impl SlugField {
    fn as_str(&self) -> &str {
        match self {
            SlugField::Plain(raw) => raw,
            SlugField::Document { current } => current,
        }
    }
}

/// A document-store `image`: either a plain URL or an asset object
/// (`{"_type":"image","asset":{"_ref":..}}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageField {
    Url(String),
    Asset(serde_json::Value),
}

impl ImageField {
    /// The URL, or the asset reference when only an asset is present.
    pub fn reference(&self) -> Option<String> {
        match self {
            ImageField::Url(url) => Some(url.clone()),
            ImageField::Asset(value) => value
                .pointer("/asset/_ref")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Loosely-typed row at the data-source boundary. Spreadsheet headers and
/// document-store field names both land here via aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<SlugField>,

    #[serde(default, alias = "start")]
    pub start_datetime: Option<String>,

    #[serde(default, alias = "end")]
    pub end_datetime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,

    #[serde(default)]
    pub all_day: Option<Flag>,

    #[serde(default)]
    pub recurring: Option<Flag>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default, alias = "short_desc")]
    pub short_description: Option<String>,

    #[serde(default, alias = "long_desc")]
    pub long_description: Option<String>,

    #[serde(default, alias = "img")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageField>,

    #[serde(default)]
    pub link: Option<String>,

    #[serde(default)]
    pub link_text: Option<String>,

    #[serde(default, alias = "master_display")]
    pub display_overall: Option<Flag>,

    #[serde(default, alias = "calendar")]
    pub display_in_calendar: Option<Flag>,

    #[serde(default, alias = "popups_page", alias = "events_page")]
    pub display_in_popups_page: Option<Flag>,

    #[serde(default, alias = "carousel")]
    pub display_in_carousel: Option<Flag>,
}

/// Calendar-day extent of an item. `end` is `None` for an open
/// (`Ongoing`) end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySpan {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    /// The source end preceded the start and was collapsed onto it.
    pub reversed: bool,
}

impl DaySpan {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.is_none_or(|end| date <= end)
    }

    pub fn is_multi_day(&self) -> bool {
        self.end != Some(self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBoundedItem {
    pub id: ItemId,
    pub name: String,
    pub start: String,
    pub end: String,
    pub all_day: bool,
    pub recurring: bool,
    pub location: String,
    pub short_description: String,
    pub long_description: String,
    pub image_ref: String,
    pub external_link: String,
    pub link_text: String,
    pub visibility: Visibility,
}

impl TimeBoundedItem {
    /// Applies the defaulting rules once: absent flags are false, absent
    /// visibility flags are true, absent text is empty. The id is derived
    /// from the slug when present, otherwise from the name.
    pub fn from_record(record: ItemRecord) -> Self {
        let flag = |value: &Option<Flag>, default: bool| {
            value.as_ref().and_then(Flag::resolve).unwrap_or(default)
        };

        let all_day = flag(&record.all_day, false);
        let recurring = flag(&record.recurring, false);
        let visibility = Visibility {
            overall: flag(&record.display_overall, true),
            calendar: flag(&record.display_in_calendar, true),
            listing: flag(&record.display_in_popups_page, true),
            carousel: flag(&record.display_in_carousel, true),
        };

        let name = text(record.name);
        let id_source = record
            .slug
            .as_ref()
            .map(|slug| slug.as_str().to_string())
            .filter(|slug| !slug.trim().is_empty())
            .unwrap_or_else(|| name.clone());

        let (start, end) = pick_bounds(
            all_day,
            record.start_datetime,
            record.end_datetime,
            record.start_date,
            record.end_date,
        );

        Self {
            id: ItemId::new(slugify(&id_source)),
            name,
            start,
            end,
            all_day,
            recurring,
            location: text(record.location),
            short_description: text(record.short_description),
            long_description: text(record.long_description),
            image_ref: text(
                record
                    .image_url
                    .filter(|url| !url.trim().is_empty())
                    .or_else(|| record.image.as_ref().and_then(ImageField::reference)),
            ),
            external_link: text(record.link),
            link_text: text(record.link_text),
            visibility,
        }
    }

    pub fn to_record(&self) -> ItemRecord {
        let some = |value: &str| (!value.is_empty()).then(|| value.to_string());
        ItemRecord {
            name: some(&self.name),
            slug: Some(SlugField::Plain(self.id.as_str().to_string())),
            start_datetime: some(&self.start),
            end_datetime: some(&self.end),
            start_date: None,
            end_date: None,
            all_day: Some(Flag::Bool(self.all_day)),
            recurring: Some(Flag::Bool(self.recurring)),
            location: some(&self.location),
            short_description: some(&self.short_description),
            long_description: some(&self.long_description),
            image_url: some(&self.image_ref),
            image: None,
            link: some(&self.external_link),
            link_text: some(&self.link_text),
            display_overall: Some(Flag::Bool(self.visibility.overall)),
            display_in_calendar: Some(Flag::Bool(self.visibility.calendar)),
            display_in_popups_page: Some(Flag::Bool(self.visibility.listing)),
            display_in_carousel: Some(Flag::Bool(self.visibility.carousel)),
        }
    }

    pub fn on_calendar(&self) -> bool {
        self.visibility.overall && self.visibility.calendar
    }

    pub fn on_listing(&self) -> bool {
        self.visibility.overall && self.visibility.listing
    }

    pub fn on_carousel(&self) -> bool {
        self.visibility.overall && self.visibility.carousel
    }

    pub fn start_stamp(&self) -> Option<Stamp> {
        datetime::parse_stamp(&self.start)
    }

    pub fn end_stamp(&self) -> Option<Stamp> {
        datetime::parse_stamp(&self.end)
    }

    pub fn has_ongoing_end(&self) -> bool {
        datetime::is_ongoing(&self.end)
    }

    /// `None` when the start cannot be read. A missing or unreadable end
    /// means a single day.
    pub fn day_span(&self) -> Option<DaySpan> {
        let start = self.start_stamp()?.date();
        if self.has_ongoing_end() {
            return Some(DaySpan {
                start,
                end: None,
                reversed: false,
            });
        }

        let end = self.end_stamp().map_or(start, |stamp| stamp.date());
        Some(DaySpan {
            start,
            end: Some(end.max(start)),
            reversed: end < start,
        })
    }

    /// An item with no end, an open end, or an unreadable end never
    /// expires. A date-only end stays live for the whole of that day.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        let Some(end) = self.end_stamp() else {
            return false;
        };
        if end.has_time {
            end.local < now
        } else {
            end.date() < now.date()
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(datetime::now_in_display_zone())
    }

    pub fn formatted_dates(&self) -> String {
        crate::format::format_range(&self.start, &self.end, self.all_day, self.recurring)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataQualityIssue {
    EndBeforeStart { id: ItemId },
    UnparseableStart { id: ItemId },
    SlotCeilingExceeded { id: ItemId, week: usize },
    DuplicateId { id: ItemId, name: String },
}

impl DataQualityIssue {
    pub fn item_id(&self) -> &ItemId {
        match self {
            DataQualityIssue::EndBeforeStart { id }
            | DataQualityIssue::UnparseableStart { id }
            | DataQualityIssue::SlotCeilingExceeded { id, .. }
            | DataQualityIssue::DuplicateId { id, .. } => id,
        }
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityIssue::EndBeforeStart { id } => {
                write!(f, "{id}: end is before start; treated as a single day")
            }
            DataQualityIssue::UnparseableStart { id } => {
                write!(f, "{id}: start could not be parsed; left off the grid")
            }
            DataQualityIssue::SlotCeilingExceeded { id, week } => {
                write!(f, "{id}: no free slot in week {week}; counted as overflow")
            }
            DataQualityIssue::DuplicateId { id, name } => {
                write!(f, "{id}: id renamed to stay unique (name {name:?})")
            }
        }
    }
}

/// Lowercases and collapses every run of characters outside `[a-z0-9]`
/// into a single `-`, trimming leading and trailing dashes.
pub fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;

    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }

    out
}

/// Builds items from boundary records, keeping ids unique within the load
/// by suffixing `-2`, `-3`, ... in input order.
#[tracing::instrument(skip_all, fields(count = records.len()))]
pub fn normalize_records(
    records: Vec<ItemRecord>,
) -> (Vec<TimeBoundedItem>, Vec<DataQualityIssue>) {
    let mut seen = BTreeSet::new();
    let mut issues = Vec::new();
    let mut items = Vec::with_capacity(records.len());

    for (idx, record) in records.into_iter().enumerate() {
        let mut item = TimeBoundedItem::from_record(record);
        if item.id.as_str().is_empty() {
            item.id = ItemId::new(format!("item-{}", idx + 1));
        }

        if seen.contains(item.id.as_str()) {
            let base = item.id.as_str().to_string();
            let mut suffix = 2;
            while seen.contains(&format!("{base}-{suffix}")) {
                suffix += 1;
            }
            item.id = ItemId::new(format!("{base}-{suffix}"));
            warn!(id = %item.id, base = %base, "duplicate item id renamed");
            issues.push(DataQualityIssue::DuplicateId {
                id: item.id.clone(),
                name: item.name.clone(),
            });
        }

        seen.insert(item.id.as_str().to_string());
        items.push(item);
    }

    (items, issues)
}

fn text(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn pick_bounds(
    all_day: bool,
    start_datetime: Option<String>,
    end_datetime: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
) -> (String, String) {
    let non_empty = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let (start_datetime, end_datetime) = (non_empty(start_datetime), non_empty(end_datetime));
    let (start_date, end_date) = (non_empty(start_date), non_empty(end_date));

    if all_day && start_date.is_some() {
        return (
            start_date.unwrap_or_default(),
            end_date.unwrap_or_default(),
        );
    }

    (
        start_datetime.or(start_date).unwrap_or_default(),
        end_datetime.or(end_date).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn record(name: &str) -> ItemRecord {
        ItemRecord {
            name: Some(name.to_string()),
            ..ItemRecord::default()
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Pizza Pop-Up!"), "pizza-pop-up");
        assert_eq!(slugify("  --Night   Market-- "), "night-market");
        assert_eq!(slugify("Café #2"), "caf-2");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn defaults_are_applied_once_at_the_boundary() {
        let item = TimeBoundedItem::from_record(record("Dumpling Fest"));
        assert_eq!(item.id.as_str(), "dumpling-fest");
        assert!(!item.all_day);
        assert!(!item.recurring);
        assert_eq!(item.visibility, Visibility::default());
        assert!(item.on_calendar());
    }

    #[test]
    fn spreadsheet_flags_are_case_insensitive() {
        let mut raw = record("Hidden");
        raw.display_in_calendar = Some(Flag::Text("false".to_string()));
        raw.all_day = Some(Flag::Text("TRUE".to_string()));
        let item = TimeBoundedItem::from_record(raw);
        assert!(item.all_day);
        assert!(!item.on_calendar());
        assert!(item.on_listing());
    }

    #[test]
    fn all_day_documents_use_date_fields() {
        let mut raw = record("Street Fair");
        raw.all_day = Some(Flag::Bool(true));
        raw.start_date = Some("2025-05-11".to_string());
        raw.end_date = Some("2025-05-13".to_string());
        raw.start_datetime = Some("2025-05-11T14:00:00Z".to_string());
        let item = TimeBoundedItem::from_record(raw);
        assert_eq!(item.start, "2025-05-11");
        assert_eq!(item.end, "2025-05-13");
    }

    #[test]
    fn duplicate_names_get_suffixed_ids() {
        let (items, issues) = normalize_records(vec![
            record("Taco Night"),
            record("Taco Night"),
            record("Taco Night"),
            record(""),
        ]);
        let ids: Vec<_> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["taco-night", "taco-night-2", "taco-night-3", "item-4"]);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn day_span_collapses_reversed_and_opens_ongoing() {
        let span_of = |start: &str, end: &str| {
            let mut raw = record("x");
            raw.start_datetime = Some(start.to_string());
            raw.end_datetime = Some(end.to_string());
            TimeBoundedItem::from_record(raw).day_span()
        };
        let day = |d: u32| NaiveDate::from_ymd_opt(2025, 5, d).expect("valid date");

        let reversed = span_of("2025-05-20", "2025-05-18").expect("span");
        assert_eq!((reversed.start, reversed.end, reversed.reversed), (day(20), Some(day(20)), true));
        assert!(!reversed.is_multi_day());

        let open = span_of("2025-05-28", "ongoing").expect("span");
        assert_eq!(open.end, None);
        assert!(open.contains(day(31)));
        assert!(!open.contains(day(27)));

        let timed = span_of("2025-05-11 22:00", "2025-05-12 01:00").expect("span");
        assert!(timed.contains(day(12)));
        assert!(timed.is_multi_day());

        assert_eq!(span_of("garbage", "2025-05-12"), None);
        assert_eq!(span_of("2025-05-11", "").map(|s| s.end), Some(Some(day(11))));
    }

    #[test]
    fn expiry_follows_end_precision() {
        let now = at(2025, 5, 12, 12);
        let with_end = |end: &str| {
            let mut raw = record("x");
            raw.end_datetime = Some(end.to_string());
            TimeBoundedItem::from_record(raw)
        };

        assert!(!with_end("").is_expired_at(now));
        assert!(!with_end("Ongoing").is_expired_at(now));
        assert!(!with_end("ongoing").is_expired_at(now));
        assert!(!with_end("not-a-date").is_expired_at(now));
        assert!(with_end("2020-01-01 10:00:00").is_expired_at(now));
        assert!(!with_end("2099-12-31 23:59:00").is_expired_at(now));
        assert!(with_end("2025-05-11").is_expired_at(now));
        assert!(!with_end("2025-05-12").is_expired_at(now));
        assert!(with_end("2025-05-12 09:00").is_expired_at(now));
    }
}
