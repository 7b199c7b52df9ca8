//! Typed filter predicates. Jobs compose these; each backend decides what to
//! do with them — the Airtable backend compiles a formula string, the memory
//! backend evaluates them structurally. No free-form filter strings cross
//! the store boundary.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// String equality: `{field}='value'`.
    Eq(String, String),
    /// Numeric equality: `{field}=value`.
    EqNum(String, i64),
    /// String inequality: `{field}!='value'`.
    Ne(String, String),
    /// Field is empty or missing.
    Empty(String),
    /// Field is present and non-empty.
    NotEmpty(String),
    /// String length below a bound.
    LenLt(String, u32),
    /// Checkbox field is set.
    IsTrue(String),
    /// Timestamp within the last N hours.
    IsAfterNowHours(String, i64),
    /// Date within the last N days.
    IsAfterTodayDays(String, i64),
    /// Timestamp falls on today's date.
    IsSameDayToday(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<String>) -> Self {
        Predicate::Eq(field.to_string(), value.into())
    }

    pub fn eq_num(field: &str, value: i64) -> Self {
        Predicate::EqNum(field.to_string(), value)
    }

    pub fn ne(field: &str, value: impl Into<String>) -> Self {
        Predicate::Ne(field.to_string(), value.into())
    }

    pub fn empty(field: &str) -> Self {
        Predicate::Empty(field.to_string())
    }

    pub fn not_empty(field: &str) -> Self {
        Predicate::NotEmpty(field.to_string())
    }

    pub fn len_lt(field: &str, bound: u32) -> Self {
        Predicate::LenLt(field.to_string(), bound)
    }

    pub fn is_true(field: &str) -> Self {
        Predicate::IsTrue(field.to_string())
    }

    pub fn is_after_now_hours(field: &str, hours: i64) -> Self {
        Predicate::IsAfterNowHours(field.to_string(), hours)
    }

    pub fn is_after_today_days(field: &str, days: i64) -> Self {
        Predicate::IsAfterTodayDays(field.to_string(), days)
    }

    pub fn is_same_day_today(field: &str) -> Self {
        Predicate::IsSameDayToday(field.to_string())
    }

    pub fn and(predicates: Vec<Predicate>) -> Self {
        Predicate::And(predicates)
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Predicate::Or(predicates)
    }

    /// Compile to an Airtable filter formula.
    pub fn to_formula(&self) -> String {
        match self {
            Predicate::Eq(field, value) => format!("{{{field}}}='{}'", escape(value)),
            Predicate::EqNum(field, value) => format!("{{{field}}}={value}"),
            Predicate::Ne(field, value) => format!("{{{field}}}!='{}'", escape(value)),
            Predicate::Empty(field) => format!("{{{field}}}=''"),
            Predicate::NotEmpty(field) => format!("{{{field}}}!=''"),
            Predicate::LenLt(field, bound) => format!("LEN({{{field}}})<{bound}"),
            Predicate::IsTrue(field) => format!("{{{field}}}=TRUE()"),
            Predicate::IsAfterNowHours(field, hours) => {
                format!("IS_AFTER({{{field}}}, DATEADD(NOW(), -{hours}, 'hours'))")
            }
            Predicate::IsAfterTodayDays(field, days) => {
                format!("IS_AFTER({{{field}}}, DATEADD(TODAY(), -{days}, 'days'))")
            }
            Predicate::IsSameDayToday(field) => {
                format!("IS_SAME({{{field}}}, TODAY(), 'day')")
            }
            Predicate::And(parts) => combine("AND", parts),
            Predicate::Or(parts) => combine("OR", parts),
        }
    }

    /// Evaluate against a field map at a fixed instant. This is the memory
    /// backend's query engine and the reference semantics for the compiled
    /// formulas.
    pub fn matches(&self, fields: &Map<String, Value>, now: DateTime<Utc>) -> bool {
        match self {
            Predicate::Eq(field, value) => string_of(fields, field) == *value,
            Predicate::EqNum(field, value) => {
                fields.get(field).and_then(Value::as_i64) == Some(*value)
                    || string_of(fields, field) == value.to_string()
            }
            Predicate::Ne(field, value) => string_of(fields, field) != *value,
            Predicate::Empty(field) => string_of(fields, field).is_empty(),
            Predicate::NotEmpty(field) => !string_of(fields, field).is_empty(),
            Predicate::LenLt(field, bound) => {
                (string_of(fields, field).chars().count() as u32) < *bound
            }
            Predicate::IsTrue(field) => {
                fields.get(field).and_then(Value::as_bool).unwrap_or(false)
            }
            Predicate::IsAfterNowHours(field, hours) => datetime_of(fields, field)
                .map(|t| t > now - Duration::hours(*hours))
                .unwrap_or(false),
            Predicate::IsAfterTodayDays(field, days) => datetime_of(fields, field)
                .map(|t| t.date_naive() > (now - Duration::days(*days)).date_naive())
                .unwrap_or(false),
            Predicate::IsSameDayToday(field) => datetime_of(fields, field)
                .map(|t| t.date_naive() == now.date_naive())
                .unwrap_or(false),
            Predicate::And(parts) => parts.iter().all(|p| p.matches(fields, now)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(fields, now)),
        }
    }
}

fn combine(op: &str, parts: &[Predicate]) -> String {
    let inner: Vec<String> = parts.iter().map(Predicate::to_formula).collect();
    format!("{op}({})", inner.join(", "))
}

/// Formula strings are single-quoted; escape embedded quotes so field values
/// can never terminate the literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn string_of(fields: &Map<String, Value>, field: &str) -> String {
    match fields.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Parse a stored timestamp. Accepts RFC 3339 (with offset or Z) and bare
/// dates, which count as civil midnight UTC.
pub(crate) fn datetime_of(fields: &Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    let raw = match fields.get(field) {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => return None,
    };
    parse_datetime(raw)
}

pub(crate) fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&t));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0)?));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn compiles_scalar_formulas() {
        assert_eq!(
            Predicate::eq("status", "pending").to_formula(),
            "{status}='pending'"
        );
        assert_eq!(Predicate::eq_num("slot", 3).to_formula(), "{slot}=3");
        assert_eq!(Predicate::empty("raw_body").to_formula(), "{raw_body}=''");
        assert_eq!(
            Predicate::len_lt("raw_body", 500).to_formula(),
            "LEN({raw_body})<500"
        );
        assert_eq!(
            Predicate::is_after_now_hours("published_at", 24).to_formula(),
            "IS_AFTER({published_at}, DATEADD(NOW(), -24, 'hours'))"
        );
        assert_eq!(
            Predicate::is_after_today_days("issue_date", 14).to_formula(),
            "IS_AFTER({issue_date}, DATEADD(TODAY(), -14, 'days'))"
        );
    }

    #[test]
    fn compiles_nested_combinators() {
        let p = Predicate::and(vec![
            Predicate::eq_num("slot", 1),
            Predicate::or(vec![
                Predicate::empty("raw_body"),
                Predicate::len_lt("raw_body", 500),
            ]),
        ]);
        assert_eq!(
            p.to_formula(),
            "AND({slot}=1, OR({raw_body}='', LEN({raw_body})<500))"
        );
    }

    #[test]
    fn escapes_quotes_in_values() {
        let p = Predicate::eq("headline", "It's Alive");
        assert_eq!(p.to_formula(), "{headline}='It\\'s Alive'");
    }

    #[test]
    fn evaluates_equality_and_emptiness() {
        let now = Utc::now();
        let f = fields(json!({"status": "pending", "slot": 1, "raw_body": ""}));
        assert!(Predicate::eq("status", "pending").matches(&f, now));
        assert!(Predicate::eq_num("slot", 1).matches(&f, now));
        assert!(Predicate::empty("raw_body").matches(&f, now));
        assert!(Predicate::empty("missing_field").matches(&f, now));
        assert!(!Predicate::not_empty("raw_body").matches(&f, now));
    }

    #[test]
    fn evaluates_time_windows() {
        let now = Utc::now();
        let recent = (now - Duration::hours(5)).to_rfc3339();
        let stale = (now - Duration::hours(50)).to_rfc3339();
        let f = fields(json!({"fresh": recent, "old": stale}));

        assert!(Predicate::is_after_now_hours("fresh", 24).matches(&f, now));
        assert!(!Predicate::is_after_now_hours("old", 24).matches(&f, now));
        // Missing timestamps never match a freshness window.
        assert!(!Predicate::is_after_now_hours("missing", 24).matches(&f, now));
    }

    #[test]
    fn evaluates_day_windows_on_bare_dates() {
        let now = Utc::now();
        let yesterday = (now - Duration::days(1)).date_naive().to_string();
        let two_weeks_ago = (now - Duration::days(15)).date_naive().to_string();
        let f = fields(json!({"recent": yesterday, "old": two_weeks_ago}));

        assert!(Predicate::is_after_today_days("recent", 14).matches(&f, now));
        assert!(!Predicate::is_after_today_days("old", 14).matches(&f, now));
    }

    #[test]
    fn same_day_today() {
        let now = Utc::now();
        let f = fields(json!({"ts": now.to_rfc3339()}));
        assert!(Predicate::is_same_day_today("ts").matches(&f, now));
        let f = fields(json!({"ts": (now - Duration::days(2)).to_rfc3339()}));
        assert!(!Predicate::is_same_day_today("ts").matches(&f, now));
    }
}
