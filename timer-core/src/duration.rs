//! Raw timer values from the row backend, normalized to whole seconds.

use serde_json::Value;

/// Where a raw timer value may live in a backend row response.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Candidate {
    /// Top-level field.
    Field(&'static str),
    /// Field inside a top-level object.
    Nested(&'static str, &'static str),
}

impl Candidate {
    fn lookup<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        match *self {
            Candidate::Field(key) => record.get(key),
            Candidate::Nested(outer, inner) => record.get(outer).and_then(|o| o.get(inner)),
        }
    }
}

/// Backend shapes seen so far, highest priority first.
pub const TIMER_CANDIDATES: &[Candidate] = &[
    Candidate::Field("timer_seconds"),
    Candidate::Nested("timer", "seconds"),
    Candidate::Field("timer_duration"),
];

/// Returns the first non-empty timer value in `record`.
pub fn extract_timer(record: &Value) -> Option<&Value> {
    extract_with(record, TIMER_CANDIDATES)
}

pub fn extract_with<'a>(record: &'a Value, candidates: &[Candidate]) -> Option<&'a Value> {
    candidates
        .iter()
        .filter_map(|c| c.lookup(record))
        .find(|v| !is_empty(v))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// A parsed duration together with the text it came from.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ParsedDuration {
    pub seconds: u64,
    pub raw: String,
}

impl ParsedDuration {
    /// True when a non-empty, non-zero-looking input produced 0 seconds.
    pub fn is_suspicious(&self) -> bool {
        let raw = self.raw.trim();
        self.seconds == 0
            && !raw.is_empty()
            && raw != "null"
            && !raw.chars().all(|c| c == '0' || c == ':' || c == '.')
    }
}

/// Parses any JSON timer value. Never fails; unrecognized input is 0 seconds.
pub fn parse(raw: &Value) -> ParsedDuration {
    let seconds = match raw {
        Value::Null => 0,
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                v
            } else if let Some(v) = n.as_i64() {
                v.max(0) as u64
            } else {
                n.as_f64().map(round_seconds).unwrap_or(0)
            }
        }
        Value::String(s) => parse_str(s),
        _ => 0,
    };
    let raw = match raw {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    ParsedDuration { seconds, raw }
}

/// Parses `"120"`, `"02:00"` or `"01:02:03"`. Other text, including
/// float or signed literals, is 0.
pub fn parse_str(raw: &str) -> u64 {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return 0;
    }
    if is_digits(s) {
        return s.parse().unwrap_or(0);
    }
    if s.contains(':') {
        return parse_clock(s).unwrap_or(0);
    }
    0
}

fn parse_clock(s: &str) -> Option<u64> {
    let groups: Vec<&str> = s.split(':').collect();
    if !groups.iter().all(|g| is_digits(g)) {
        return None;
    }
    let nums = groups
        .iter()
        .map(|g| g.parse::<u64>().ok())
        .collect::<Option<Vec<u64>>>()?;
    match nums.as_slice() {
        [m, sec] => m.checked_mul(60)?.checked_add(*sec),
        [h, m, sec] => h
            .checked_mul(3600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(*sec),
        _ => None,
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn round_seconds(v: f64) -> u64 {
    if !v.is_finite() || v <= 0.0 {
        return 0;
    }
    let rounded = v.round_ties_even();
    if rounded >= u64::MAX as f64 {
        0
    } else {
        rounded as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!(parse(&json!("120")).seconds, 120);
        assert_eq!(parse(&json!(120)).seconds, 120);
        assert_eq!(parse(&json!(" 45 ")).seconds, 45);
    }

    #[test]
    fn test_parse_clock_forms() {
        assert_eq!(parse(&json!("02:00")).seconds, 120);
        assert_eq!(parse(&json!("01:02:03")).seconds, 3723);
        assert_eq!(parse(&json!("00:02:00")).seconds, 120);
        assert_eq!(parse(&json!("90:00")).seconds, 5400);
    }

    #[test]
    fn test_parse_failures_are_zero() {
        assert_eq!(parse(&json!("")).seconds, 0);
        assert_eq!(parse(&Value::Null).seconds, 0);
        assert_eq!(parse(&json!("garbage")).seconds, 0);
        assert_eq!(parse(&json!("1:2:3:4")).seconds, 0);
        assert_eq!(parse(&json!("aa:10")).seconds, 0);
        assert_eq!(parse(&json!("10:")).seconds, 0);
        assert_eq!(parse(&json!(true)).seconds, 0);
        assert_eq!(parse(&json!({"seconds": 5})).seconds, 0);
        assert_eq!(parse(&json!("99999999999999999999:00")).seconds, 0);
    }

    #[test]
    fn test_parse_clamps_and_rounds() {
        assert_eq!(parse(&json!(-5)).seconds, 0);
        assert_eq!(parse(&json!("-5")).seconds, 0);
        assert_eq!(parse(&json!(2.5)).seconds, 2);
        assert_eq!(parse(&json!(3.5)).seconds, 4);
    }

    #[test]
    fn test_numeric_strings_are_not_rounded() {
        for raw in ["10.6", "1e3", "+7", "-5", "inf"] {
            let parsed = parse(&json!(raw));
            assert_eq!(parsed.seconds, 0, "{}", raw);
            assert!(parsed.is_suspicious(), "{}", raw);
        }
        assert_eq!(parse(&json!(10.6)).seconds, 11);
        assert_eq!(parse(&json!(1e3)).seconds, 1000);
    }

    #[test]
    fn test_suspicious_zero_keeps_raw() {
        let parsed = parse(&json!("ten minutes"));
        assert_eq!(parsed.seconds, 0);
        assert_eq!(parsed.raw, "ten minutes");
        assert!(parsed.is_suspicious());

        assert!(!parse(&json!("00:00")).is_suspicious());
        assert!(!parse(&json!(0)).is_suspicious());
        assert!(!parse(&json!("")).is_suspicious());
        assert!(!parse(&json!("120")).is_suspicious());
        assert!(parse(&json!(-5)).is_suspicious());
    }

    #[test]
    fn test_extract_precedence() {
        let record = json!({
            "timer_seconds": "",
            "timer": {"seconds": "05:00"},
            "timer_duration": 30,
        });
        assert_eq!(extract_timer(&record), Some(&json!("05:00")));

        let record = json!({"timer_seconds": 90, "timer_duration": 30});
        assert_eq!(extract_timer(&record), Some(&json!(90)));

        let record = json!({"timer": null, "timer_duration": "00:30"});
        assert_eq!(extract_timer(&record), Some(&json!("00:30")));

        let record = json!({"status": "ok"});
        assert_eq!(extract_timer(&record), None);
    }
}
