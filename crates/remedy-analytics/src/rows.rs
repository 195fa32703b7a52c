//! Wire-shaped row DTOs for `clickhouse::Client` fetches, and the
//! conversions/post-processing into this crate's domain types (`crate::
//! types`). Kept separate from the domain types themselves because
//! ClickHouse's driver wants plain scalars (millisecond `i64`, `String`) at
//! the row boundary while the domain types carry `chrono::DateTime<Utc>` and
//! computed fields (`error_rate`, `busy_pct`) that never come back from a
//! single `SELECT` as-is.

use chrono::{DateTime, TimeZone, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

use remedy_core::{LogEntry, LogType};

use crate::types::{
    AggregateGroup, AggregateSection, CorrelationKind, GapRow, HistogramBucket, JobTimeRange,
    ThreadStat, TimeSeriesPoint, TopNDetails, TopNEntry, TransactionGroup,
};

pub(crate) fn millis_to_dt(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
}

pub(crate) fn dt_to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// The on-disk shape of `log_entries`, one field per column.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct LogEntryRow {
    pub tenant_id: String,
    pub job_id: String,
    pub entry_id: String,
    pub line_number: u32,
    pub file_number: u16,
    pub timestamp: i64,
    pub ingested_at: i64,
    pub log_type: String,
    pub trace_id: String,
    pub rpc_id: String,
    pub thread_id: String,
    pub queue: String,
    pub user: String,
    pub duration_ms: u32,
    pub queue_time_ms: u32,
    pub success: u8,
    pub error_message: String,
    pub error_encountered: u8,
    pub api_code: String,
    pub form: String,
    pub sql_table: String,
    pub sql_statement: String,
    pub filter_name: String,
    pub filter_level: u8,
    pub operation: String,
    pub request_id: String,
    pub esc_name: String,
    pub esc_pool: String,
    pub scheduled_time: i64,
    pub has_scheduled_time: u8,
    pub delay_ms: u32,
    pub raw_text: String,
}

impl From<&LogEntry> for LogEntryRow {
    fn from(e: &LogEntry) -> Self {
        Self {
            tenant_id: e.tenant_id.to_string(),
            job_id: e.job_id.to_string(),
            entry_id: e.entry_id.to_string(),
            line_number: e.line_number,
            file_number: e.file_number,
            timestamp: dt_to_millis(e.timestamp),
            ingested_at: dt_to_millis(e.ingested_at),
            log_type: e.log_type.as_str().to_string(),
            trace_id: e.trace_id.to_string(),
            rpc_id: e.rpc_id.to_string(),
            thread_id: e.thread_id.to_string(),
            queue: e.queue.to_string(),
            user: e.user.to_string(),
            duration_ms: e.duration_ms,
            queue_time_ms: e.queue_time_ms,
            success: u8::from(e.success),
            error_message: e.error_message.to_string(),
            error_encountered: u8::from(e.error_encountered),
            api_code: e.api_code.to_string(),
            form: e.form.to_string(),
            sql_table: e.sql_table.to_string(),
            sql_statement: e.sql_statement.to_string(),
            filter_name: e.filter_name.to_string(),
            filter_level: e.filter_level,
            operation: e.operation.to_string(),
            request_id: e.request_id.to_string(),
            esc_name: e.esc_name.to_string(),
            esc_pool: e.esc_pool.to_string(),
            // Null `scheduled_time` is normalized to the zero sentinel on
            // write and restored to `None` on read via `has_scheduled_time`
            //.
            scheduled_time: e.scheduled_time.map(dt_to_millis).unwrap_or(0),
            has_scheduled_time: u8::from(e.scheduled_time.is_some()),
            delay_ms: e.delay_ms,
            raw_text: e.raw_text.to_string(),
        }
    }
}

impl From<LogEntryRow> for LogEntry {
    fn from(r: LogEntryRow) -> Self {
        LogEntry {
            tenant_id: r.tenant_id.into(),
            job_id: r.job_id.into(),
            entry_id: r.entry_id.into(),
            line_number: r.line_number,
            file_number: r.file_number,
            timestamp: millis_to_dt(r.timestamp),
            ingested_at: millis_to_dt(r.ingested_at),
            log_type: r.log_type.parse::<LogType>().unwrap_or(LogType::Api),
            trace_id: r.trace_id.into(),
            rpc_id: r.rpc_id.into(),
            thread_id: r.thread_id.into(),
            queue: r.queue.into(),
            user: r.user.into(),
            duration_ms: r.duration_ms,
            queue_time_ms: r.queue_time_ms,
            success: r.success != 0,
            error_message: r.error_message.into(),
            error_encountered: r.error_encountered != 0,
            api_code: r.api_code.into(),
            form: r.form.into(),
            sql_table: r.sql_table.into(),
            sql_statement: r.sql_statement.into(),
            filter_name: r.filter_name.into(),
            filter_level: r.filter_level,
            operation: r.operation.into(),
            request_id: r.request_id.into(),
            esc_name: r.esc_name.into(),
            esc_pool: r.esc_pool.into(),
            scheduled_time: if r.has_scheduled_time != 0 {
                Some(millis_to_dt(r.scheduled_time))
            } else {
                None
            },
            delay_ms: r.delay_ms,
            raw_text: r.raw_text.into(),
        }
    }
}

/// Builds the rank-ordered top-N list. `entries` must already be
/// sorted by `duration_ms` descending by the query that produced them.
pub fn rank_top_n(entries: Vec<LogEntry>) -> Vec<TopNEntry> {
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let details = match entry.log_type {
                LogType::Api => TopNDetails::Api,
                LogType::Sql => TopNDetails::Sql {
                    sql_statement: entry.sql_statement.clone(),
                    sql_table: entry.sql_table.clone(),
                },
                LogType::Fltr => TopNDetails::Fltr {
                    filter_name: entry.filter_name.clone(),
                    filter_level: entry.filter_level,
                },
                LogType::Escl => TopNDetails::Escl {
                    esc_pool: entry.esc_pool.clone(),
                    delay_ms: entry.delay_ms,
                    error_encountered: entry.error_encountered,
                },
            };
            TopNEntry {
                rank: (i + 1) as u32,
                entry,
                details,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct GapRowStore {
    pub entry_id: String,
    pub timestamp: i64,
    pub next_timestamp: i64,
    pub line_number: u32,
    pub next_line_number: u32,
    pub gap_ms: i64,
}

impl From<GapRowStore> for GapRow {
    fn from(r: GapRowStore) -> Self {
        GapRow {
            entry_id: r.entry_id.into(),
            timestamp: millis_to_dt(r.timestamp),
            next_timestamp: millis_to_dt(r.next_timestamp),
            line_number: r.line_number,
            next_line_number: r.next_line_number,
            gap_ms: r.gap_ms,
        }
    }
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct TimeSeriesRowStore {
    pub bucket: i64,
    pub api_count: u64,
    pub sql_count: u64,
    pub fltr_count: u64,
    pub escl_count: u64,
    pub avg_duration_ms: f64,
    pub error_count: u64,
}

impl From<TimeSeriesRowStore> for TimeSeriesPoint {
    fn from(r: TimeSeriesRowStore) -> Self {
        TimeSeriesPoint {
            bucket: millis_to_dt(r.bucket),
            api_count: r.api_count,
            sql_count: r.sql_count,
            fltr_count: r.fltr_count,
            escl_count: r.escl_count,
            avg_duration_ms: r.avg_duration_ms,
            error_count: r.error_count,
        }
    }
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct HistogramRowStore {
    pub bucket: i64,
    pub api_count: u64,
    pub sql_count: u64,
    pub fltr_count: u64,
    pub escl_count: u64,
    pub total_count: u64,
}

impl From<HistogramRowStore> for HistogramBucket {
    fn from(r: HistogramRowStore) -> Self {
        HistogramBucket {
            bucket: millis_to_dt(r.bucket),
            api_count: r.api_count,
            sql_count: r.sql_count,
            fltr_count: r.fltr_count,
            escl_count: r.escl_count,
            total_count: r.total_count,
        }
    }
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct TransactionRowStore {
    pub corr_id: String,
    pub corr_type: String,
    pub primary_user: String,
    pub primary_form: String,
    pub primary_operation: String,
    pub primary_queue: String,
    pub total_duration_ms: u64,
    pub span_count: u64,
    pub error_count: u64,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
}

impl From<TransactionRowStore> for TransactionGroup {
    fn from(r: TransactionRowStore) -> Self {
        TransactionGroup {
            corr_id: r.corr_id.into(),
            corr_type: if r.corr_type == "trace" {
                CorrelationKind::Trace
            } else {
                CorrelationKind::Rpc
            },
            primary_user: r.primary_user.into(),
            primary_form: r.primary_form.into(),
            primary_operation: r.primary_operation.into(),
            primary_queue: r.primary_queue.into(),
            total_duration_ms: r.total_duration_ms,
            span_count: r.span_count,
            error_count: r.error_count,
            first_timestamp: millis_to_dt(r.first_timestamp),
            last_timestamp: millis_to_dt(r.last_timestamp),
        }
    }
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct AggregateGroupRow {
    pub key: String,
    pub count: u64,
    pub total_ms: u64,
    pub avg_ms: f64,
    pub min_ms: u32,
    pub max_ms: u32,
    pub error_count: u64,
    pub unique_traces: u64,
}

fn group_from_row(r: &AggregateGroupRow) -> AggregateGroup {
    AggregateGroup {
        key: r.key.clone(),
        count: r.count,
        total_ms: r.total_ms,
        avg_ms: r.avg_ms,
        min_ms: r.min_ms,
        max_ms: r.max_ms,
        error_count: r.error_count,
        error_rate: if r.count == 0 {
            0.0
        } else {
            r.error_count as f64 / r.count as f64
        },
        unique_traces: r.unique_traces,
    }
}

/// Assembles a aggregate section: per-group rows plus a grand total
/// whose min/max are the min-of-mins/max-of-maxes across groups.
pub fn finish_aggregate_section(rows: Vec<AggregateGroupRow>) -> AggregateSection {
    if rows.is_empty() {
        return AggregateSection::default();
    }
    let groups: Vec<AggregateGroup> = rows.iter().map(group_from_row).collect();

    let mut total_count = 0u64;
    let mut total_ms = 0u64;
    let mut total_errors = 0u64;
    let mut total_unique_traces = 0u64;
    let mut grand_min: Option<u32> = None;
    let mut grand_max: Option<u32> = None;
    for g in &groups {
        total_count += g.count;
        total_ms += g.total_ms;
        total_errors += g.error_count;
        total_unique_traces += g.unique_traces;
        grand_min = Some(match grand_min {
            None => g.min_ms,
            Some(current) if g.min_ms < current => g.min_ms,
            Some(current) => current,
        });
        grand_max = Some(match grand_max {
            None => g.max_ms,
            Some(current) if g.max_ms > current => g.max_ms,
            Some(current) => current,
        });
    }

    let grand_total = AggregateGroup {
        key: "__total__".to_string(),
        count: total_count,
        total_ms,
        avg_ms: if total_count == 0 {
            0.0
        } else {
            total_ms as f64 / total_count as f64
        },
        min_ms: grand_min.unwrap_or(0),
        max_ms: grand_max.unwrap_or(0),
        error_count: total_errors,
        error_rate: if total_count == 0 {
            0.0
        } else {
            total_errors as f64 / total_count as f64
        },
        unique_traces: total_unique_traces,
    };

    AggregateSection {
        groups,
        grand_total: Some(grand_total),
    }
}

#[derive(Debug, Clone, Row, Deserialize)]
pub struct ThreadStatRow {
    pub thread_id: String,
    pub count: u64,
    pub sum_ms: u64,
    pub avg_ms: f64,
    pub max_ms: u32,
    pub error_count: u64,
    pub active_start_ts: i64,
    pub active_end_ts: i64,
}

/// Computes busy percentage and formats the active window, then
/// orders by `busy_pct` descending.
pub fn finish_thread_stats(rows: Vec<ThreadStatRow>) -> Vec<ThreadStat> {
    let mut stats: Vec<ThreadStat> = rows
        .into_iter()
        .map(|r| {
            let span_ms = r.active_end_ts - r.active_start_ts;
            let busy_pct = if span_ms <= 0 {
                0.0
            } else {
                (r.sum_ms as f64 / span_ms as f64 * 100.0).min(100.0)
            };
            ThreadStat {
                thread_id: r.thread_id.into(),
                count: r.count,
                sum_ms: r.sum_ms,
                avg_ms: r.avg_ms,
                max_ms: r.max_ms,
                error_count: r.error_count,
                busy_pct,
                active_start: millis_to_dt(r.active_start_ts)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                active_end: millis_to_dt(r.active_end_ts)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            }
        })
        .collect();
    stats.sort_by(|a, b| b.busy_pct.partial_cmp(&a.busy_pct).unwrap_or(std::cmp::Ordering::Equal));
    stats
}

pub fn job_time_range_from_millis(min_ms: i64, max_ms: i64) -> Option<JobTimeRange> {
    if min_ms == 0 && max_ms == 0 {
        return None;
    }
    Some(JobTimeRange {
        min: millis_to_dt(min_ms),
        max: millis_to_dt(max_ms),
    })
}
