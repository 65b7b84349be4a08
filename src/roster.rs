use chrono::{Datelike, NaiveDate};
use std::cmp::Ordering;

/// Placeholder date for students who have never been interrogated.
/// Sorts after every real date under `last_interrogation ASC`.
pub const NO_DATE_SENTINEL: &str = "9999-12-31";

/// Days since the last interrogation before a student counts as overdue.
pub const STALE_AFTER_DAYS: i64 = 14;

pub const MAX_STUDENT_NAME_LEN: usize = 100;
pub const MAX_SUBJECT_NAME_LEN: usize = 50;

pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    // Strict YYYY-MM-DD; chrono also rejects impossible calendar dates.
    let d = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    if format_iso_date(d) == s {
        Some(d)
    } else {
        None
    }
}

pub fn format_iso_date(d: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day())
}

/// Whole days elapsed since `date`. None for the sentinel (never interrogated)
/// and for unparseable values. Future dates yield negative counts, matching
/// how the planner treats a pre-booked interrogation.
pub fn days_since(date: &str, today: NaiveDate) -> Option<i64> {
    if date == NO_DATE_SENTINEL {
        return None;
    }
    let d = parse_iso_date(date)?;
    Some((today - d).num_days())
}

pub fn is_overdue(date: &str, today: NaiveDate) -> bool {
    matches!(days_since(date, today), Some(d) if d > STALE_AFTER_DAYS)
}

/// "Who goes next" order within a subject: fewest grades first, then the
/// student untouched the longest. Never-interrogated students sort after
/// dated ones with the same grade count; the dated ones are the ones the
/// rotation owes a turn.
pub fn next_up_cmp(
    a_grades: i64,
    a_days: Option<i64>,
    b_grades: i64,
    b_days: Option<i64>,
) -> Ordering {
    a_grades.cmp(&b_grades).then_with(|| match (a_days, b_days) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

pub fn is_hex_color(s: &str) -> bool {
    let Some(rest) = s.strip_prefix('#') else {
        return false;
    };
    rest.len() == 6 && rest.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Field checks for students.create. All problems are reported at once.
pub fn validate_new_student(
    name: &str,
    subject: &str,
    last_interrogation: Option<&str>,
    grades_count: Option<i64>,
) -> Vec<String> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push("missing or empty 'name'".to_string());
    } else if name.chars().count() > MAX_STUDENT_NAME_LEN {
        errors.push(format!(
            "'name' must be {} characters or less",
            MAX_STUDENT_NAME_LEN
        ));
    }

    if subject.trim().is_empty() {
        errors.push("missing or empty 'subject'".to_string());
    } else if subject.chars().count() > MAX_SUBJECT_NAME_LEN {
        errors.push(format!(
            "'subject' must be {} characters or less",
            MAX_SUBJECT_NAME_LEN
        ));
    }

    if let Some(date) = last_interrogation {
        if date != NO_DATE_SENTINEL && parse_iso_date(date).is_none() {
            errors.push("'lastInterrogation' must be a YYYY-MM-DD date".to_string());
        }
    }

    if let Some(count) = grades_count {
        if count < 0 {
            errors.push("'gradesCount' must be a non-negative number".to_string());
        }
    }

    errors
}

/// Field checks for students.update patches. Absent fields are untouched.
pub fn validate_student_patch(
    name: Option<&str>,
    last_interrogation: Option<&str>,
    grades_count: Option<i64>,
) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(n) = name {
        if n.trim().is_empty() {
            errors.push("'name' must not be empty".to_string());
        } else if n.chars().count() > MAX_STUDENT_NAME_LEN {
            errors.push(format!(
                "'name' must be {} characters or less",
                MAX_STUDENT_NAME_LEN
            ));
        }
    }

    if let Some(date) = last_interrogation {
        if date != NO_DATE_SENTINEL && parse_iso_date(date).is_none() {
            errors.push("'lastInterrogation' must be a YYYY-MM-DD date".to_string());
        }
    }

    if let Some(count) = grades_count {
        if count < 0 {
            errors.push("'gradesCount' must be a non-negative number".to_string());
        }
    }

    errors
}

pub fn validate_subject(name: &str, color: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push("missing or empty 'name'".to_string());
    } else if name.chars().count() > MAX_SUBJECT_NAME_LEN {
        errors.push(format!(
            "'name' must be {} characters or less",
            MAX_SUBJECT_NAME_LEN
        ));
    }

    if !is_hex_color(color) {
        errors.push("'color' must be a hex code like #FF0000".to_string());
    }

    errors
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RosterStats {
    pub total_students: usize,
    pub overdue_count: usize,
    pub recent_count: usize,
    pub subject_count: usize,
}

/// Dashboard counters: overdue = interrogated more than the threshold ago,
/// recent = within the threshold (today included). Sentinel dates count in
/// neither bucket.
pub fn roster_stats<'a, I>(entries: I, today: NaiveDate) -> RosterStats
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut stats = RosterStats::default();
    let mut subjects = std::collections::HashSet::new();
    for (subject, last_interrogation) in entries {
        stats.total_students += 1;
        subjects.insert(subject);
        match days_since(last_interrogation, today) {
            Some(d) if d > STALE_AFTER_DAYS => stats.overdue_count += 1,
            Some(d) if d >= 0 => stats.recent_count += 1,
            _ => {}
        }
    }
    stats.subject_count = subjects.len();
    stats
}
