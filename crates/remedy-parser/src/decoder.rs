//! Line format decoder.
//!
//! Matches one raw line against the AR Server grammar and produces a typed
//! [`LogEntry`], or signals "skip" by returning `None`. Never returns an
//! error: malformed input is always a skip, not a failure.

use std::sync::OnceLock;

use chrono::{NaiveDateTime, TimeZone, Utc};
use fancy_regex::Regex;
use remedy_core::model::{LogEntry, LogType};
use smol_str::SmolStr;

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?x)
            ^<(?P<type>[A-Z]+)>
            <TrID:\s*(?P<trid>[^>]*)>
            <TID:\s*(?P<tid>[^>]*)>
            <RPC\ ID:\s*(?P<rpcid>[^>]*)>
            <Queue:\s*(?P<queue>[^>]*)>
            <Client-RPC:\s*(?P<clientrpc>[^>]*)>
            <USER:\s*(?P<user>[^>]*)>
            <Overlay-Group:\s*(?P<overlay>[^>]*)>
            \s*/\*\s*(?P<ts>[^*]+?)\s*\*/\s*
            (?P<content>.*)$
            "#,
        )
        .expect("header pattern is a fixed, valid regex")
    })
}

fn pool_annotation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?P<name>.*?)\s*\(Pool[^)]*\)\s*$").expect("fixed pattern")
    })
}

/// Duration extraction patterns, tried in order; the first to match wins.
/// Each closure converts its captured numeric literal to milliseconds.
fn duration_patterns() -> &'static [(Regex, fn(f64) -> f64)] {
    static PATTERNS: OnceLock<Vec<(Regex, fn(f64) -> f64)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)OK\s*\(\s*\d+\s*rows\s*(\d+(?:\.\d+)?)\s*secs\s*\)").unwrap(),
                (|secs: f64| secs * 1000.0) as fn(f64) -> f64,
            ),
            (
                Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*secs?\b").unwrap(),
                (|secs: f64| secs * 1000.0) as fn(f64) -> f64,
            ),
            (
                Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*ms\b").unwrap(),
                (|ms: f64| ms) as fn(f64) -> f64,
            ),
            (
                Regex::new(r"(?i)elapsed\s*[:=]?\s*(\d+(?:\.\d+)?)").unwrap(),
                (|secs: f64| secs * 1000.0) as fn(f64) -> f64,
            ),
        ]
    })
}

fn sql_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:FROM|INTO|UPDATE|DELETE\s+FROM)\s+(\w+)").expect("fixed pattern")
    })
}

fn filter_checking_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"Checking\s+"([^"]+)""#).expect("fixed pattern"))
}

fn filter_colon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Filter:\s*(\S+)").expect("fixed pattern"))
}

fn filter_operation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Operation\s*-\s*(\w+)\s+on\s+(\S+)").expect("fixed pattern"))
}

const TIMESTAMP_LAYOUT: &str = "%a %b %d %Y %H:%M:%S%.f";

/// Round half-to-even, the rounding mode every duration pattern shares.
fn round_half_to_even(v: f64) -> u32 {
    let rounded = v.round_ties_even();
    if rounded < 0.0 {
        0
    } else if rounded > u32::MAX as f64 {
        u32::MAX
    } else {
        rounded as u32
    }
}

fn extract_duration_ms(content: &str) -> u32 {
    for (re, to_ms) in duration_patterns() {
        if let Ok(Some(caps)) = re.captures(content) {
            if let Some(m) = caps.get(1) {
                if let Ok(v) = m.as_str().parse::<f64>() {
                    return round_half_to_even(to_ms(v));
                }
            }
        }
    }
    0
}

fn strip_pool_annotation(user: &str) -> SmolStr {
    let trimmed = user.trim();
    match pool_annotation_re().captures(trimmed) {
        Ok(Some(caps)) => SmolStr::new(caps.name("name").map(|m| m.as_str()).unwrap_or(trimmed)),
        _ => SmolStr::new(trimmed),
    }
}

fn decode_sql(entry: &mut LogEntry, content: &str) {
    entry.sql_statement = SmolStr::new(content);
    let upper = content.trim_start().to_uppercase();
    let skip_table = upper.starts_with("OK")
        || upper.starts_with("COMMIT")
        || upper.starts_with("BEGIN")
        || upper.starts_with("NO.");
    if !skip_table {
        if let Ok(Some(caps)) = sql_table_re().captures(content) {
            if let Some(m) = caps.get(1) {
                entry.sql_table = SmolStr::new(m.as_str());
            }
        }
    }
    entry.duration_ms = extract_duration_ms(content);
}

fn decode_fltr(entry: &mut LogEntry, content: &str) {
    if let Ok(Some(caps)) = filter_checking_re().captures(content) {
        if let Some(m) = caps.get(1) {
            entry.filter_name = SmolStr::new(m.as_str());
        }
    } else if let Ok(Some(caps)) = filter_colon_re().captures(content) {
        if let Some(m) = caps.get(1) {
            entry.filter_name = SmolStr::new(m.as_str());
        }
    }
    if let Ok(Some(caps)) = filter_operation_re().captures(content) {
        if let (Some(verb), Some(form)) = (caps.get(1), caps.get(2)) {
            entry.operation = SmolStr::new(verb.as_str());
            entry.form = SmolStr::new(form.as_str());
        }
    }
    entry.duration_ms = extract_duration_ms(content);
}

fn decode_escl(entry: &mut LogEntry, content: &str) {
    let name = match content.find('(') {
        Some(idx) => content[..idx].trim(),
        None => content.trim(),
    };
    entry.esc_name = SmolStr::new(name);
    entry.duration_ms = extract_duration_ms(content);
}

fn decode_api(entry: &mut LogEntry, content: &str) {
    let mut parts = content.split_whitespace();
    if let Some(code) = parts.next() {
        entry.api_code = SmolStr::new(code);
    }
    if let Some(form) = parts.next() {
        entry.form = SmolStr::new(form);
    }
    entry.duration_ms = extract_duration_ms(content);
}

/// Decode one raw line. Returns `None` on any grammar mismatch — unknown
/// `TYPE` token, malformed header, or an unparseable timestamp — all of
/// which are skip conditions, never errors.
pub fn parse_line(line: &str) -> Option<LogEntry> {
    let caps = header_re().captures(line).ok().flatten()?;

    let log_type: LogType = caps.name("type")?.as_str().parse().ok()?;

    let ts_raw = caps.name("ts")?.as_str();
    let naive = NaiveDateTime::parse_from_str(ts_raw, TIMESTAMP_LAYOUT).ok()?;
    let timestamp = Utc.from_utc_datetime(&naive);

    let content = caps.name("content")?.as_str();

    let mut entry = LogEntry::blank(log_type, timestamp);
    entry.trace_id = SmolStr::new(caps.name("trid").map(|m| m.as_str().trim()).unwrap_or(""));
    entry.thread_id = SmolStr::new(caps.name("tid").map(|m| m.as_str().trim()).unwrap_or(""));
    entry.rpc_id = SmolStr::new(caps.name("rpcid").map(|m| m.as_str().trim()).unwrap_or(""));
    entry.queue = SmolStr::new(caps.name("queue").map(|m| m.as_str().trim()).unwrap_or(""));
    entry.user = strip_pool_annotation(caps.name("user").map(|m| m.as_str()).unwrap_or(""));
    entry.raw_text = SmolStr::new(content);

    match log_type {
        LogType::Sql => decode_sql(&mut entry, content),
        LogType::Fltr => decode_fltr(&mut entry, content),
        LogType::Escl => decode_escl(&mut entry, content),
        LogType::Api => decode_api(&mut entry, content),
    }

    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ty: &str, ts: &str, content: &str) -> String {
        format!(
            "<{ty}><TrID: T1><TID: TH1><RPC ID: R1><Queue: Q1><Client-RPC: C1><USER: bob (Pool 3)><Overlay-Group: OG1> /* {ts} */ {content}"
        )
    }

    #[test]
    fn decodes_api_line_with_form_and_duration() {
        let l = line("API", "Mon Jan 02 2006 15:04:05.0000", "GETENTRY HPD:Help Desk OK (5 rows 0.250 secs)");
        let e = parse_line(&l).expect("should decode");
        assert_eq!(e.log_type, LogType::Api);
        assert_eq!(e.api_code.as_str(), "GETENTRY");
        assert_eq!(e.form.as_str(), "HPD:Help");
        assert_eq!(e.duration_ms, 250);
        assert_eq!(e.trace_id.as_str(), "T1");
        assert_eq!(e.thread_id.as_str(), "TH1");
        pretty_assertions::assert_eq!(e.user.as_str(), "bob");
    }

    #[test]
    fn decodes_sql_table_from_from_clause() {
        let l = line("SQL", "Tue Feb 03 2007 01:02:03.0000", "SELECT * FROM T501 WHERE 1=1 (12 ms)");
        let e = parse_line(&l).expect("should decode");
        assert_eq!(e.sql_table.as_str(), "T501");
        assert_eq!(e.duration_ms, 12);
    }

    #[test]
    fn sql_ok_prefix_skips_table_extraction() {
        let l = line("SQL", "Tue Feb 03 2007 01:02:03.0000", "OK (3 rows 0.010 secs)");
        let e = parse_line(&l).expect("should decode");
        assert!(e.sql_table.is_empty());
        assert_eq!(e.duration_ms, 10);
    }

    #[test]
    fn decodes_filter_checking_quoted_name() {
        let l = line(
            "FLTR",
            "Wed Mar 04 2008 02:03:04.0000",
            r#"Checking "MyFilter" Operation - MODIFY on HPD:Help Desk elapsed: 0.5"#,
        );
        let e = parse_line(&l).expect("should decode");
        assert_eq!(e.filter_name.as_str(), "MyFilter");
        assert_eq!(e.operation.as_str(), "MODIFY");
        assert_eq!(e.form.as_str(), "HPD:Help");
        assert_eq!(e.duration_ms, 500);
    }

    #[test]
    fn decodes_escalation_name_before_paren() {
        let l = line("ESCL", "Thu May 05 2009 03:04:05.0000", "Nightly Cleanup (Pool Main) 42 ms");
        let e = parse_line(&l).expect("should decode");
        assert_eq!(e.esc_name.as_str(), "Nightly Cleanup");
        assert_eq!(e.duration_ms, 42);
    }

    #[test]
    fn unknown_type_is_skipped() {
        let l = line("XYZZY", "Mon Jan 02 2006 15:04:05.0000", "anything");
        assert!(parse_line(&l).is_none());
    }

    #[test]
    fn unparseable_timestamp_is_skipped() {
        let l = "<API><TrID: T><TID: T><RPC ID: R><Queue: Q><Client-RPC: C><USER: U><Overlay-Group: O> /* not a date */ content";
        assert!(parse_line(l).is_none());
    }

    #[test]
    fn malformed_header_is_skipped() {
        assert!(parse_line("this is not a log line at all").is_none());
    }

    #[test]
    fn duration_overflow_saturates_at_u32_max() {
        let l = line("API", "Mon Jan 02 2006 15:04:05.0000", "CODE FORM 5000000000 secs");
        let e = parse_line(&l).expect("should decode");
        assert_eq!(e.duration_ms, u32::MAX);
    }
}
