use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::item::{DataQualityIssue, ItemRecord, TimeBoundedItem, normalize_records};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    JsonLines,
}

impl SourceFormat {
    pub fn for_path(path: &Path) -> anyhow::Result<Self> {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "jsonl" | "ndjson" | "json" => Ok(Self::JsonLines),
            other => Err(anyhow!(
                "unsupported data file extension {other:?} for {}",
                path.display()
            )),
        }
    }
}

/// A normalized collection plus whatever was wrong with it.
#[derive(Debug, Default)]
pub struct LoadedItems {
    pub items: Vec<TimeBoundedItem>,
    pub issues: Vec<DataQualityIssue>,
}

#[tracing::instrument(skip(path), fields(file = %path.display()))]
pub fn load_items(path: &Path) -> anyhow::Result<LoadedItems> {
    let format = SourceFormat::for_path(path)?;
    let records = match format {
        SourceFormat::Csv => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            parse_csv_records(&text).with_context(|| format!("failed parsing {}", path.display()))?
        }
        SourceFormat::JsonLines => load_jsonl(path)?,
    };

    let (items, issues) = normalize_records(records);
    info!(
        file = %path.display(),
        ?format,
        items = items.len(),
        issues = issues.len(),
        "loaded items"
    );
    Ok(LoadedItems { items, issues })
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<ItemRecord>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path).with_context(|| format!("failed opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: ItemRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
pub fn save_items_jsonl(path: &Path, items: &[TimeBoundedItem]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed creating temp file in {}", dir.display()))?;
    for item in items {
        let serialized = serde_json::to_string(&item.to_record())?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    info!(file = %path.display(), count = items.len(), "exported items");
    Ok(())
}

/// Parses spreadsheet text with a header row. A logical row keeps
/// absorbing physical lines while its quote count is odd, so quoted
/// fields may span lines.
pub fn parse_csv_records(text: &str) -> anyhow::Result<Vec<ItemRecord>> {
    let mut lines = text.trim().lines();
    let Some(header_line) = lines.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = split_csv_line(header_line)
        .into_iter()
        .map(|header| header.to_ascii_lowercase())
        .collect();

    let mut records = Vec::new();
    let mut pending = String::new();
    let mut first_line = 2;

    for (idx, line) in lines.enumerate() {
        if pending.is_empty() {
            first_line = idx + 2;
        } else {
            pending.push('\n');
        }
        pending.push_str(line);

        if pending.matches('"').count() % 2 != 0 {
            continue;
        }

        let row = std::mem::take(&mut pending);
        if row.trim().is_empty() {
            continue;
        }
        let record = row_to_record(&headers, split_csv_line(&row))
            .with_context(|| format!("invalid row starting at line {first_line}"))?;
        records.push(record);
    }

    if !pending.trim().is_empty() {
        warn!(line = first_line, "unterminated quoted field; row dropped");
    }

    debug!(count = records.len(), "parsed csv records");
    Ok(records)
}

fn row_to_record(headers: &[String], values: Vec<String>) -> anyhow::Result<ItemRecord> {
    let mut map = Map::new();
    for (header, value) in headers.iter().zip(values) {
        if header.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(header.clone(), Value::String(value));
    }

    // Older sheets name the listing column `events_page`.
    if let Some(legacy) = map.remove("events_page")
        && !map.contains_key("popups_page")
    {
        map.insert("popups_page".to_string(), legacy);
    }

    Ok(serde_json::from_value(Value::Object(map))?)
}

/// Splits on commas outside double quotes, then trims and unquotes each
/// field (`""` inside quotes is a literal quote).
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => fields.push(unquote(&std::mem::take(&mut current))),
            _ => current.push(ch),
        }
    }
    fields.push(unquote(&current));
    fields
}

fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed);
    inner.replace("\"\"", "\"").trim().to_string()
}
