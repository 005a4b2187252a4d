//! Human-readable date ranges for calendar items.
//!
//! [`classify`] maps a `(start, end, all_day, recurring)` tuple onto exactly
//! one [`RangeCase`]; the rules are checked in a fixed order and the first
//! match wins. [`RangeCase`]'s `Display` impl produces the text.

use std::fmt;

use chrono_tz::Tz;

use crate::datetime::{self, Stamp, clock_time, is_ongoing, parse_stamp_in, short_date};

pub const TO_BE_ANNOUNCED: &str = "Date and time to be announced";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCase {
    /// `Ongoing`
    Ongoing,
    /// `Starting Sun, May 11, ongoing`
    StartingOngoing { start: Stamp },
    /// `Sun, May 11, 10:00 AM – 5:00 PM`
    SameDayTimed { start: Stamp, end: Stamp },
    /// `Sun, May 11, 10:00 AM - Tue, May 13, 5:00 PM`
    MultiDayTimed { start: Stamp, end: Stamp },
    /// `Sun, May 11`
    SingleDate { start: Stamp },
    /// `Sun, May 11 – Tue, May 13`
    DateSpan { start: Stamp, end: Stamp },
    /// `Sun, May 11 (all day)`
    AllDaySingle { start: Stamp },
    /// `Sun, May 11 - Tue, May 13 (all day)`
    AllDaySpan { start: Stamp, end: Stamp },
    /// `Fri, May 16, 5:30 PM – 8:30 PM`, framed as the next occurrence.
    Recurring { start: Stamp, end: Stamp },
    /// `Sun, May 11, starting at 2:00 PM`
    StartingAt { start: Stamp },
    /// `Sun, May 11, ending at 5:00 PM`
    EndingAt { end: Stamp },
    /// `Date and time to be announced`
    ToBeAnnounced,
    /// One side timed and the other date-only; rendered as a plain span.
    MixedSpan { start: Stamp, end: Stamp },
}

impl fmt::Display for RangeCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = |stamp: &Stamp| short_date(stamp.date());
        let time = |stamp: &Stamp| clock_time(stamp.time());

        match self {
            RangeCase::Ongoing => f.write_str(datetime::ONGOING),
            RangeCase::StartingOngoing { start } => {
                write!(f, "Starting {}, ongoing", date(start))
            }
            RangeCase::SameDayTimed { start, end } | RangeCase::Recurring { start, end } => {
                write!(f, "{}, {} – {}", date(start), time(start), time(end))
            }
            RangeCase::MultiDayTimed { start, end } => write!(
                f,
                "{}, {} - {}, {}",
                date(start),
                time(start),
                date(end),
                time(end)
            ),
            RangeCase::SingleDate { start } => f.write_str(&date(start)),
            RangeCase::DateSpan { start, end } | RangeCase::MixedSpan { start, end } => {
                write!(f, "{} – {}", date(start), date(end))
            }
            RangeCase::AllDaySingle { start } => write!(f, "{} (all day)", date(start)),
            RangeCase::AllDaySpan { start, end } => {
                write!(f, "{} - {} (all day)", date(start), date(end))
            }
            RangeCase::StartingAt { start } => {
                write!(f, "{}, starting at {}", date(start), time(start))
            }
            RangeCase::EndingAt { end } => write!(f, "{}, ending at {}", date(end), time(end)),
            RangeCase::ToBeAnnounced => f.write_str(TO_BE_ANNOUNCED),
        }
    }
}

/// Formats a range in the process-wide display zone.
pub fn format_range(start: &str, end: &str, all_day: bool, recurring: bool) -> String {
    format_range_in(start, end, all_day, recurring, datetime::display_timezone())
}

pub fn format_range_in(start: &str, end: &str, all_day: bool, recurring: bool, tz: &Tz) -> String {
    classify(start, end, all_day, recurring, tz).to_string()
}

/// Picks the display case. Unparseable values count as absent, so malformed
/// input drifts toward [`RangeCase::ToBeAnnounced`] instead of failing.
pub fn classify(start: &str, end: &str, all_day: bool, recurring: bool, tz: &Tz) -> RangeCase {
    let start_raw = start.trim();
    let end_raw = end.trim();
    let start_stamp = parse_stamp_in(start_raw, tz);
    let end_stamp = parse_stamp_in(end_raw, tz);
    let plain = !all_day && !recurring;

    if is_ongoing(start_raw) && end_stamp.is_none() && !is_ongoing(end_raw) {
        return RangeCase::Ongoing;
    }

    if let Some(start) = start_stamp
        && is_ongoing(end_raw)
    {
        return RangeCase::StartingOngoing { start };
    }

    match (start_stamp, end_stamp) {
        (Some(start), Some(end)) => classify_bounded(start, end, all_day, recurring, plain),
        (Some(start), None) => {
            if plain && !start.has_time {
                RangeCase::SingleDate { start }
            } else if all_day {
                RangeCase::AllDaySingle { start }
            } else {
                RangeCase::StartingAt { start }
            }
        }
        (None, Some(end)) => RangeCase::EndingAt { end },
        (None, None) => RangeCase::ToBeAnnounced,
    }
}

fn classify_bounded(
    start: Stamp,
    end: Stamp,
    all_day: bool,
    recurring: bool,
    plain: bool,
) -> RangeCase {
    let same_day = start.date() == end.date();
    let both_timed = start.has_time && end.has_time;
    let neither_timed = !start.has_time && !end.has_time;

    if plain && both_timed {
        return if same_day {
            RangeCase::SameDayTimed { start, end }
        } else {
            RangeCase::MultiDayTimed { start, end }
        };
    }

    if plain && neither_timed {
        return if same_day {
            RangeCase::SingleDate { start }
        } else {
            RangeCase::DateSpan { start, end }
        };
    }

    // All-day wins over recurring when both flags are set.
    if all_day {
        return if same_day {
            RangeCase::AllDaySingle { start }
        } else {
            RangeCase::AllDaySpan { start, end }
        };
    }

    if recurring {
        return RangeCase::Recurring { start, end };
    }

    RangeCase::MixedSpan { start, end }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(start: &str, end: &str, all_day: bool, recurring: bool) -> String {
        format_range_in(start, end, all_day, recurring, &chrono_tz::America::New_York)
    }

    #[test]
    fn ongoing_without_end() {
        assert_eq!(fmt("Ongoing", "", true, false), "Ongoing");
    }

    #[test]
    fn starting_then_ongoing() {
        assert_eq!(fmt("2025-05-11", "Ongoing", false, false), "Starting Sun, May 11, ongoing");
    }

    #[test]
    fn same_day_with_times() {
        assert_eq!(
            fmt("2025-05-11 10:00:00", "2025-05-11 17:00:00", false, false),
            "Sun, May 11, 10:00 AM – 5:00 PM"
        );
    }

    #[test]
    fn twelve_hour_and_month_name_inputs() {
        assert_eq!(
            fmt("5/11/2025 2:00 PM", "5/11/2025 5:00 PM", false, false),
            "Sun, May 11, 2:00 PM – 5:00 PM"
        );
        assert_eq!(fmt("May 11, 2025", "", false, false), "Sun, May 11");
    }

    #[test]
    fn multi_day_with_times() {
        assert_eq!(
            fmt("2025-05-11 10:00:00", "2025-05-13 17:00:00", false, false),
            "Sun, May 11, 10:00 AM - Tue, May 13, 5:00 PM"
        );
    }

    #[test]
    fn date_only_single_day() {
        assert_eq!(fmt("2025-05-11", "", false, false), "Sun, May 11");
        assert_eq!(fmt("2025-05-11", "2025-05-11", false, false), "Sun, May 11");
    }

    #[test]
    fn date_only_span() {
        assert_eq!(fmt("2025-05-11", "2025-05-13", false, false), "Sun, May 11 – Tue, May 13");
    }

    #[test]
    fn all_day_single_and_span() {
        assert_eq!(fmt("2025-05-11", "2025-05-11", true, false), "Sun, May 11 (all day)");
        assert_eq!(fmt("2025-05-11", "", true, false), "Sun, May 11 (all day)");
        assert_eq!(
            fmt("2025-05-11", "2025-05-13", true, false),
            "Sun, May 11 - Tue, May 13 (all day)"
        );
    }

    #[test]
    fn recurring_uses_next_occurrence_times() {
        assert_eq!(
            fmt("2025-05-16 17:30:00", "2025-05-16 20:30:00", false, true),
            "Fri, May 16, 5:30 PM – 8:30 PM"
        );
    }

    #[test]
    fn recurring_all_day_keeps_all_day_shape() {
        assert_eq!(fmt("2025-05-16", "2025-05-16", true, true), "Fri, May 16 (all day)");
    }

    #[test]
    fn drop_in_and_closing() {
        assert_eq!(fmt("2025-05-11 14:00:00", "", false, false), "Sun, May 11, starting at 2:00 PM");
        assert_eq!(fmt("", "2025-05-11 17:00:00", false, false), "Sun, May 11, ending at 5:00 PM");
    }

    #[test]
    fn nothing_known() {
        assert_eq!(fmt("", "", false, false), TO_BE_ANNOUNCED);
        assert_eq!(fmt("soon", "later", false, false), TO_BE_ANNOUNCED);
    }

    #[test]
    fn mixed_precision_falls_back_to_span() {
        assert_eq!(
            fmt("2025-05-11 10:00", "2025-05-13", false, false),
            "Sun, May 11 – Tue, May 13"
        );
    }

    #[test]
    fn offset_inputs_render_in_display_zone() {
        assert_eq!(
            fmt("2025-05-11T14:00:00Z", "2025-05-11T21:00:00Z", false, false),
            "Sun, May 11, 10:00 AM – 5:00 PM"
        );
    }

    #[test]
    fn classification_is_exposed() {
        let tz = chrono_tz::America::New_York;
        assert!(matches!(classify("", "", false, false, &tz), RangeCase::ToBeAnnounced));
        assert!(matches!(
            classify("2025-05-11", "Ongoing", false, false, &tz),
            RangeCase::StartingOngoing { .. }
        ));
    }
}
