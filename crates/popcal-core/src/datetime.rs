use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "popcal-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "POPCAL_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "POPCAL_TIME_CONFIG";
const DEFAULT_DISPLAY_TIMEZONE: &str =
  "America/New_York";

/// Literal marker used by data sources
/// for items without a fixed bound.
pub const ONGOING: &str = "Ongoing";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// A parsed date/time value expressed
/// in the display zone.
///
/// `has_time` records whether the
/// source text carried a clock
/// component; date-only inputs sit at
/// local midnight.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct Stamp {
  pub local:    NaiveDateTime,
  pub has_time: bool
}

impl Stamp {
  #[must_use]
  pub fn date(&self) -> NaiveDate {
    self.local.date()
  }

  #[must_use]
  pub fn time(&self) -> NaiveTime {
    self.local.time()
  }
}

pub fn display_timezone() -> &'static Tz
{
  static DISPLAY_TZ: OnceLock<Tz> =
    OnceLock::new();
  DISPLAY_TZ.get_or_init(
    resolve_display_timezone
  )
}

#[must_use]
pub fn today_in_display_zone()
-> NaiveDate {
  now_in_display_zone().date()
}

#[must_use]
pub fn now_in_display_zone()
-> NaiveDateTime {
  Utc::now()
    .with_timezone(display_timezone())
    .naive_local()
}

#[must_use]
pub fn is_ongoing(raw: &str) -> bool {
  raw
    .trim()
    .eq_ignore_ascii_case(ONGOING)
}

/// Parses `raw` using the process-wide
/// display zone.
#[must_use]
pub fn parse_stamp(
  raw: &str
) -> Option<Stamp> {
  parse_stamp_in(
    raw,
    display_timezone()
  )
}

/// Tries, in order: RFC 3339 (converted
/// into `tz`), ISO forms without an
/// offset, `May 11, 2025 [2:00 PM]`,
/// `M/D/YYYY [H:MM[:SS]] [AM|PM]`, then
/// `YYYY-M-D [H:MM[:SS]] [AM|PM]`.
/// Values without an offset are literal
/// display-zone values.
#[tracing::instrument(level = "trace", skip_all, fields(input = raw))]
pub fn parse_stamp_in(
  raw: &str,
  tz: &Tz
) -> Option<Stamp> {
  let token = raw.trim();
  if token.is_empty()
    || is_ongoing(token)
  {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(Stamp {
      local:    dt
        .with_timezone(tz)
        .naive_local(),
      has_time: true
    });
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(local) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(Stamp {
        local,
        has_time: true
      });
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Some(Stamp {
      local:    date
        .and_time(NaiveTime::MIN),
      has_time: false
    });
  }

  parse_month_name(token)
    .or_else(|| parse_month_first(token))
    .or_else(|| parse_year_first(token))
}

/// `%B` also accepts abbreviated names
/// when parsing.
const MONTH_NAME_DATETIME_FORMATS:
  &[&str] = &[
  "%B %d, %Y %I:%M:%S %p",
  "%B %d, %Y %I:%M %p",
  "%B %d, %Y %H:%M:%S",
  "%B %d, %Y %H:%M"
];

fn parse_month_name(
  token: &str
) -> Option<Stamp> {
  let normalized = token
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ");

  for fmt in MONTH_NAME_DATETIME_FORMATS
  {
    if let Ok(local) =
      NaiveDateTime::parse_from_str(
        &normalized,
        fmt
      )
    {
      return Some(Stamp {
        local,
        has_time: true
      });
    }
  }

  NaiveDate::parse_from_str(
    &normalized,
    "%B %d, %Y"
  )
  .ok()
  .map(|date| Stamp {
    local:    date
      .and_time(NaiveTime::MIN),
    has_time: false
  })
}

fn month_first_re()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r"^(?P<month>\d{1,2})[/-](?P<day>\d{1,2})[/-](?P<year>\d{2,4})(?:\s+(?P<hour>\d{1,2}):(?P<minute>\d{2})(?::(?P<second>\d{2}))?(?:\s*(?P<meridiem>(?i:am|pm)))?)?$",
    )
    .ok()
  })
  .as_ref()
}

fn year_first_re()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r"^(?P<year>\d{4})[/-](?P<month>\d{1,2})[/-](?P<day>\d{1,2})(?:[\sT]+(?P<hour>\d{1,2}):(?P<minute>\d{2})(?::(?P<second>\d{2}))?(?:\s*(?P<meridiem>(?i:am|pm)))?)?$",
    )
    .ok()
  })
  .as_ref()
}

fn parse_month_first(
  token: &str
) -> Option<Stamp> {
  let caps = month_first_re()?
    .captures(token)?;
  let raw_year = caps.name("year")?;
  let mut year = raw_year
    .as_str()
    .parse::<i32>()
    .ok()?;
  if raw_year.as_str().len() == 2 {
    year += 2000;
  }
  stamp_from_captures(&caps, year)
}

fn parse_year_first(
  token: &str
) -> Option<Stamp> {
  let caps = year_first_re()?
    .captures(token)?;
  let year = caps
    .name("year")?
    .as_str()
    .parse::<i32>()
    .ok()?;
  stamp_from_captures(&caps, year)
}

fn stamp_from_captures(
  caps: &regex::Captures<'_>,
  year: i32
) -> Option<Stamp> {
  let number = |name: &str| {
    caps
      .name(name)
      .and_then(|m| {
        m.as_str().parse::<u32>().ok()
      })
  };

  let date = NaiveDate::from_ymd_opt(
    year,
    number("month")?,
    number("day")?
  )?;

  let has_time =
    caps.name("hour").is_some();
  let hour = number("hour").unwrap_or(0);
  let hour = match caps
    .name("meridiem")
    .map(|m| m.as_str().to_ascii_lowercase())
  {
    | Some(meridiem) => {
      twenty_four_hour(hour, &meridiem)?
    }
    | None => hour
  };
  let time = NaiveTime::from_hms_opt(
    hour,
    number("minute").unwrap_or(0),
    number("second").unwrap_or(0)
  )?;

  Some(Stamp {
    local: date.and_time(time),
    has_time
  })
}

/// 12-hour clock to 24-hour; `0` and
/// anything past 12 are rejected.
fn twenty_four_hour(
  hour: u32,
  meridiem: &str
) -> Option<u32> {
  match (hour, meridiem) {
    | (1..=11, "pm") => Some(hour + 12),
    | (12, "am") => Some(0),
    | (1..=12, _) => Some(hour),
    | _ => None
  }
}

/// `Sun, May 11`
#[must_use]
pub fn short_date(
  date: NaiveDate
) -> String {
  date.format("%a, %b %-d").to_string()
}

/// `10:00 AM`
#[must_use]
pub fn clock_time(
  time: NaiveTime
) -> String {
  time.format("%-I:%M %p").to_string()
}

/// `May 2025`
#[must_use]
pub fn month_title(
  first_of_month: NaiveDate
) -> String {
  first_of_month
    .format("%B %Y")
    .to_string()
}

/// `Sunday, May 11, 2025`
#[must_use]
pub fn day_heading(
  date: NaiveDate
) -> String {
  date
    .format("%A, %B %-d, %Y")
    .to_string()
}

fn resolve_display_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_DISPLAY_TIMEZONE,
    "DEFAULT_DISPLAY_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}
