//! Result types returned by [`crate::engine::AnalyticsEngine`] and produced
//! by [`crate::store::StoreClient`].

use chrono::{DateTime, Utc};
use remedy_core::LogType;
use remedy_kql::QueryNode;
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Timestamp,
    DurationMs,
    LineNumber,
    User,
    LogType,
}

impl SortColumn {
    pub fn column_name(self) -> &'static str {
        match self {
            SortColumn::Timestamp => "timestamp",
            SortColumn::DurationMs => "duration_ms",
            SortColumn::LineNumber => "line_number",
            SortColumn::User => "user",
            SortColumn::LogType => "log_type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn sql_keyword(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// The free-text half of a search/facet predicate, already resolved
/// by `crate::engine` — a KQL parse success carries the AST through
/// unlowered so a non-SQL [`crate::store::StoreClient`] (the in-memory fake)
/// can evaluate it directly; [`crate::store::ClickHouseStore`] lowers it to
/// SQL via `remedy_kql::to_where_clause` at the point of use.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TextFilter {
    #[default]
    MatchAll,
    Kql(QueryNode),
    /// KQL failed to parse; sanitized substring match over
    /// `raw_text OR error_message`.
    Fallback { pattern: String },
}

/// A fully assembled search/facet predicate: the free-text
/// filter plus the structured filters every search call accepts.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub text: TextFilter,
    pub log_types: Vec<LogType>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub users: Vec<String>,
    pub queues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub entries: Vec<remedy_core::LogEntry>,
    pub total_count: u64,
    pub took_ms: u64,
}

#[derive(Debug, Clone, PartialEq, clickhouse::Row, serde::Deserialize)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetsResult {
    pub log_type: Vec<FacetBucket>,
    pub user: Vec<FacetBucket>,
    pub queue: Vec<FacetBucket>,
}

#[derive(Debug, Clone, PartialEq, clickhouse::Row, serde::Deserialize)]
pub struct AutocompleteItem {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopNDetails {
    Api,
    Sql { sql_statement: SmolStr, sql_table: SmolStr },
    Fltr { filter_name: SmolStr, filter_level: u8 },
    Escl { esc_pool: SmolStr, delay_ms: u32, error_encountered: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopNEntry {
    pub rank: u32,
    pub entry: remedy_core::LogEntry,
    pub details: TopNDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    pub bucket: DateTime<Utc>,
    pub api_count: u64,
    pub sql_count: u64,
    pub fltr_count: u64,
    pub escl_count: u64,
    pub avg_duration_ms: f64,
    pub error_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateGroup {
    pub key: String,
    pub count: u64,
    pub total_ms: u64,
    pub avg_ms: f64,
    pub min_ms: u32,
    pub max_ms: u32,
    pub error_count: u64,
    pub error_rate: f64,
    pub unique_traces: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSection {
    pub groups: Vec<AggregateGroup>,
    pub grand_total: Option<AggregateGroup>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatesResult {
    pub by_form: Option<AggregateSection>,
    pub by_sql_table: Option<AggregateSection>,
    pub by_filter_name: Option<AggregateSection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GapRow {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    pub next_timestamp: DateTime<Utc>,
    pub line_number: u32,
    pub next_line_number: u32,
    pub gap_ms: i64,
}

#[derive(Debug, Clone, PartialEq, clickhouse::Row, serde::Deserialize)]
pub struct QueueHealthRow {
    pub queue: String,
    pub total_calls: u64,
    pub avg_ms: f64,
    pub error_rate: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapsResult {
    pub gaps: Vec<GapRow>,
    pub queue_health: Vec<QueueHealthRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadStat {
    pub thread_id: String,
    pub count: u64,
    pub sum_ms: u64,
    pub avg_ms: f64,
    pub max_ms: u32,
    pub error_count: u64,
    pub busy_pct: f64,
    pub active_start: String,
    pub active_end: String,
}

#[derive(Debug, Clone, PartialEq, clickhouse::Row, serde::Deserialize)]
pub struct FilterCountRow {
    pub filter_name: String,
    pub count: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, PartialEq, clickhouse::Row, serde::Deserialize)]
pub struct TraceFilterComboRow {
    pub trace_id: String,
    pub filter_name: String,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u32,
    pub total_ms: u64,
    pub queue: String,
    pub form: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterComplexity {
    pub top_filters: Vec<FilterCountRow>,
    pub top_combos: Vec<TraceFilterComboRow>,
    pub total_filter_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBucket {
    pub bucket: DateTime<Utc>,
    pub api_count: u64,
    pub sql_count: u64,
    pub fltr_count: u64,
    pub escl_count: u64,
    pub total_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextWindow {
    pub before: Vec<remedy_core::LogEntry>,
    pub target: remedy_core::LogEntry,
    pub after: Vec<remedy_core::LogEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionGroup {
    pub corr_id: String,
    pub corr_type: CorrelationKind,
    pub primary_user: String,
    pub primary_form: String,
    pub primary_operation: String,
    pub primary_queue: String,
    pub total_duration_ms: u64,
    pub span_count: u64,
    pub error_count: u64,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationKind {
    Trace,
    Rpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeRange {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthFactors {
    pub error_rate: f64,
    pub avg_duration_ms: f64,
    pub max_thread_busy_pct: f64,
    pub max_gap_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Red,
    Yellow,
    Green,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Red => "red",
            Severity::Yellow => "yellow",
            Severity::Green => "green",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorScore {
    pub score: u8,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthScore {
    pub error_rate: FactorScore,
    pub response_time: FactorScore,
    pub thread_saturation: FactorScore,
    pub gap_frequency: FactorScore,
    pub composite: u8,
    pub status: Severity,
}

/// A row-ready marker for the `log_type` sort column and filter values — the
/// store trait works with the string form so SQL binding stays uniform.
pub fn log_type_sql_value(log_type: LogType) -> &'static str {
    log_type.as_str()
}
