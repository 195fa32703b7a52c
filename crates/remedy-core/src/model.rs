use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The closed set of AR Server trace kinds. Encoded as a 1-byte tag on disk
/// (see the physical layout in the columnar store schema).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogType {
    Api = 0,
    Sql = 1,
    Fltr = 2,
    Escl = 3,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Api => "API",
            LogType::Sql => "SQL",
            LogType::Fltr => "FLTR",
            LogType::Escl => "ESCL",
        }
    }
}

impl std::str::FromStr for LogType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "API" => Ok(LogType::Api),
            "SQL" => Ok(LogType::Sql),
            "FLTR" => Ok(LogType::Fltr),
            "ESCL" => Ok(LogType::Escl),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The central record of the system. Immutable after ingest, identified by
/// `(tenant_id, job_id, entry_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    // Scope
    pub tenant_id: SmolStr,
    pub job_id: SmolStr,
    pub entry_id: SmolStr,

    // Position
    pub line_number: u32,
    pub file_number: u16,

    // Time
    pub timestamp: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,

    // Kind
    pub log_type: LogType,

    // Correlation
    pub trace_id: SmolStr,
    pub rpc_id: SmolStr,
    pub thread_id: SmolStr,
    pub queue: SmolStr,
    pub user: SmolStr,

    // Timing
    pub duration_ms: u32,
    pub queue_time_ms: u32,

    // Outcome
    pub success: bool,
    pub error_message: SmolStr,
    pub error_encountered: bool,

    // API-specific
    pub api_code: SmolStr,
    pub form: SmolStr,

    // SQL-specific
    pub sql_table: SmolStr,
    pub sql_statement: SmolStr,

    // Filter-specific
    pub filter_name: SmolStr,
    pub filter_level: u8,
    pub operation: SmolStr,
    pub request_id: SmolStr,

    // Escalation-specific
    pub esc_name: SmolStr,
    pub esc_pool: SmolStr,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub delay_ms: u32,

    // Raw
    pub raw_text: SmolStr,
}

impl LogEntry {
    /// A blank entry with `success = true` and everything else empty/zero,
    /// as the starting point for the line decoder's content sub-parsers.
    pub fn blank(log_type: LogType, timestamp: DateTime<Utc>) -> Self {
        Self {
            tenant_id: SmolStr::default(),
            job_id: SmolStr::default(),
            entry_id: SmolStr::default(),
            line_number: 0,
            file_number: 0,
            timestamp,
            ingested_at: timestamp,
            log_type,
            trace_id: SmolStr::default(),
            rpc_id: SmolStr::default(),
            thread_id: SmolStr::default(),
            queue: SmolStr::default(),
            user: SmolStr::default(),
            duration_ms: 0,
            queue_time_ms: 0,
            success: true,
            error_message: SmolStr::default(),
            error_encountered: false,
            api_code: SmolStr::default(),
            form: SmolStr::default(),
            sql_table: SmolStr::default(),
            sql_statement: SmolStr::default(),
            filter_name: SmolStr::default(),
            filter_level: 0,
            operation: SmolStr::default(),
            request_id: SmolStr::default(),
            esc_name: SmolStr::default(),
            esc_pool: SmolStr::default(),
            scheduled_time: None,
            delay_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_type_round_trips_through_str() {
        for lt in [LogType::Api, LogType::Sql, LogType::Fltr, LogType::Escl] {
            let s = lt.as_str();
            assert_eq!(s.parse::<LogType>().unwrap(), lt);
        }
    }

    #[test]
    fn unknown_type_token_does_not_parse() {
        assert!("BOGUS".parse::<LogType>().is_err());
    }

    #[test]
    fn blank_entry_defaults_success_true() {
        let e = LogEntry::blank(LogType::Api, Utc::now());
        assert!(e.success);
        assert!(!e.error_encountered);
        assert_eq!(e.duration_ms, 0);
        assert!(e.scheduled_time.is_none());
    }

    #[test]
    fn serializes_log_type_as_uppercase() {
        let e = LogEntry::blank(LogType::Fltr, Utc::now());
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["log_type"], "FLTR");
    }
}
