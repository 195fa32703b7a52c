//! An in-memory [`StoreClient`] for engine-level tests that don't need
//! a live ClickHouse instance. Holds entries in a `Mutex<Vec<LogEntry>>` and
//! re-derives every operation's answer by filtering/grouping in Rust —
//! deliberately mirroring [`crate::store::ClickHouseStore`]'s SQL shapes one
//! method at a time so the two stay behaviorally identical.

use std::cmp::Ordering;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use remedy_core::{LogEntry, LogType};
use remedy_helpers::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::error::AnalyticsError;
use crate::matcher;
use crate::rows::{self, AggregateGroupRow, ThreadStatRow};
use crate::store::{StoreClient, TransactionFilter};
use crate::types::{
    AggregateSection, AutocompleteItem, CorrelationKind, FacetBucket, FilterComplexity,
    FilterCountRow, GapRow, HistogramBucket, JobTimeRange, QueueHealthRow, SearchFilter,
    SortColumn, SortDirection, TextFilter, ThreadStat, TimeSeriesPoint, TopNEntry,
    TraceFilterComboRow, TransactionGroup,
};

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<Vec<LogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(entries: Vec<LogEntry>) -> Self {
        Self { entries: Mutex::new(entries) }
    }

    fn scoped(&self, tenant_id: &str, job_id: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.tenant_id.as_str() == tenant_id && e.job_id.as_str() == job_id)
            .cloned()
            .collect()
    }

    fn check_cancelled(cancel: &CancellationToken, op: &'static str) -> Result<(), AnalyticsError> {
        if cancel.is_cancelled() {
            return Err(AnalyticsError::Cancelled { operation: op });
        }
        Ok(())
    }
}

fn matches_predicate(entry: &LogEntry, predicate: &SearchFilter) -> bool {
    let text_ok = match &predicate.text {
        TextFilter::MatchAll => true,
        TextFilter::Kql(ast) => matcher::matches(entry, ast),
        TextFilter::Fallback { pattern } => {
            let needle = pattern.trim_matches('%').to_lowercase();
            matcher::contains_ci(&entry.raw_text, &needle) || matcher::contains_ci(&entry.error_message, &needle)
        }
    };
    if !text_ok {
        return false;
    }
    if !predicate.log_types.is_empty() && !predicate.log_types.contains(&entry.log_type) {
        return false;
    }
    if let Some(from) = predicate.time_from {
        if entry.timestamp < from {
            return false;
        }
    }
    if let Some(to) = predicate.time_to {
        if entry.timestamp > to {
            return false;
        }
    }
    if !predicate.users.is_empty() && !predicate.users.iter().any(|u| u.as_str() == entry.user.as_str()) {
        return false;
    }
    if !predicate.queues.is_empty() && !predicate.queues.iter().any(|q| q.as_str() == entry.queue.as_str()) {
        return false;
    }
    true
}

fn sort_cmp(a: &LogEntry, b: &LogEntry, sort: SortColumn) -> Ordering {
    match sort {
        SortColumn::Timestamp => a.timestamp.cmp(&b.timestamp),
        SortColumn::DurationMs => a.duration_ms.cmp(&b.duration_ms),
        SortColumn::LineNumber => a.line_number.cmp(&b.line_number),
        SortColumn::User => a.user.cmp(&b.user),
        SortColumn::LogType => a.log_type.as_str().cmp(b.log_type.as_str()),
    }
}

/// Nearest-rank p95 over an already-populated slice of durations.
fn p95(mut values: Vec<u32>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable();
    let rank = ((values.len() as f64) * 0.95).ceil() as usize;
    let idx = rank.saturating_sub(1).min(values.len() - 1);
    values[idx] as f64
}

/// Reverses `crate::histogram::bucket_interval_sql`'s literal back into a
/// bucket width, so the in-memory fake can group by the same bucket the
/// caller asked for without re-deriving it from a time range.
fn bucket_seconds(literal: &str) -> i64 {
    let mut parts = literal.split_whitespace();
    let n: i64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(300);
    let unit = parts.next().unwrap_or("SECOND");
    match unit {
        "SECOND" => n,
        "MINUTE" => n * 60,
        "HOUR" => n * 3600,
        _ => n,
    }
}

#[async_trait::async_trait]
impl StoreClient for InMemoryStore {
    async fn bulk_insert(&self, cancel: &CancellationToken, entries: &[LogEntry]) -> Result<(), AnalyticsError> {
        Self::check_cancelled(cancel, "bulk_insert")?;
        self.entries.lock().unwrap().extend(entries.iter().cloned());
        Ok(())
    }

    async fn get_entry(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        entry_id: &str,
    ) -> Result<LogEntry, AnalyticsError> {
        Self::check_cancelled(cancel, "get_entry")?;
        self.scoped(tenant_id, job_id)
            .into_iter()
            .find(|e| e.entry_id.as_str() == entry_id)
            .ok_or(AnalyticsError::NotFound { operation: "get_entry" })
    }

    async fn search(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        predicate: &SearchFilter,
        sort: SortColumn,
        direction: SortDirection,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<LogEntry>, u64), AnalyticsError> {
        Self::check_cancelled(cancel, "search")?;
        let mut matched: Vec<LogEntry> =
            self.scoped(tenant_id, job_id).into_iter().filter(|e| matches_predicate(e, predicate)).collect();
        matched.sort_by(|a, b| {
            let ord = sort_cmp(a, b, sort);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        });
        let total_count = matched.len() as u64;
        let page: Vec<LogEntry> =
            matched.into_iter().skip(offset as usize).take(limit as usize).collect();
        Ok((page, total_count))
    }

    async fn facet_counts(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        predicate: &SearchFilter,
        column: &str,
        limit: u32,
    ) -> Result<Vec<FacetBucket>, AnalyticsError> {
        Self::check_cancelled(cancel, "facet_counts")?;
        let mut counts: IndexMap<String, u64> = IndexMap::default();
        for e in self.scoped(tenant_id, job_id).iter().filter(|e| matches_predicate(e, predicate)) {
            let value = matcher::field_value(e, column);
            if value.is_empty() {
                continue;
            }
            *counts.entry(value).or_insert(0) += 1;
        }
        let mut buckets: Vec<FacetBucket> =
            counts.into_iter().map(|(value, count)| FacetBucket { value, count }).collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        buckets.truncate(limit as usize);
        Ok(buckets)
    }

    async fn autocomplete(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        column: &str,
        prefix_pattern: &str,
        limit: u32,
    ) -> Result<Vec<AutocompleteItem>, AnalyticsError> {
        Self::check_cancelled(cancel, "autocomplete")?;
        let prefix = prefix_pattern.trim_end_matches('%').replace("\\%", "%").replace("\\_", "_").to_lowercase();
        let mut counts: IndexMap<String, u64> = IndexMap::default();
        for e in self.scoped(tenant_id, job_id) {
            let value = matcher::field_value(&e, column);
            if value.is_empty() || !value.to_lowercase().starts_with(&prefix) {
                continue;
            }
            *counts.entry(value).or_insert(0) += 1;
        }
        let mut items: Vec<AutocompleteItem> =
            counts.into_iter().map(|(value, count)| AutocompleteItem { value, count }).collect();
        items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn top_n(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        log_type: LogType,
        top_n: u32,
    ) -> Result<Vec<TopNEntry>, AnalyticsError> {
        Self::check_cancelled(cancel, "top_n")?;
        let mut entries: Vec<LogEntry> =
            self.scoped(tenant_id, job_id).into_iter().filter(|e| e.log_type == log_type).collect();
        entries.sort_by(|a, b| b.duration_ms.cmp(&a.duration_ms));
        entries.truncate(top_n as usize);
        Ok(rows::rank_top_n(entries))
    }

    async fn time_series(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<TimeSeriesPoint>, AnalyticsError> {
        Self::check_cancelled(cancel, "time_series")?;
        let mut buckets: std::collections::BTreeMap<i64, Vec<LogEntry>> = std::collections::BTreeMap::new();
        for e in self.scoped(tenant_id, job_id) {
            let minute = e.timestamp.timestamp() / 60 * 60;
            buckets.entry(minute).or_default().push(e);
        }
        Ok(buckets
            .into_iter()
            .map(|(minute, group)| {
                let error_count = group.iter().filter(|e| !e.success).count() as u64;
                let total: u64 = group.iter().map(|e| e.duration_ms as u64).sum();
                TimeSeriesPoint {
                    bucket: DateTime::from_timestamp(minute, 0).unwrap_or_else(Utc::now),
                    api_count: group.iter().filter(|e| e.log_type == LogType::Api).count() as u64,
                    sql_count: group.iter().filter(|e| e.log_type == LogType::Sql).count() as u64,
                    fltr_count: group.iter().filter(|e| e.log_type == LogType::Fltr).count() as u64,
                    escl_count: group.iter().filter(|e| e.log_type == LogType::Escl).count() as u64,
                    avg_duration_ms: if group.is_empty() { 0.0 } else { total as f64 / group.len() as f64 },
                    error_count,
                }
            })
            .collect())
    }

    async fn aggregate(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        log_type: LogType,
        group_column: &str,
    ) -> Result<AggregateSection, AnalyticsError> {
        Self::check_cancelled(cancel, "aggregate")?;
        let mut groups: IndexMap<String, Vec<&LogEntry>> = IndexMap::default();
        let scoped = self.scoped(tenant_id, job_id);
        for e in scoped.iter().filter(|e| e.log_type == log_type) {
            let key = matcher::field_value(e, group_column);
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(e);
        }
        let mut rows: Vec<AggregateGroupRow> = groups
            .into_iter()
            .map(|(key, es)| {
                let count = es.len() as u64;
                let total_ms: u64 = es.iter().map(|e| e.duration_ms as u64).sum();
                let min_ms = es.iter().map(|e| e.duration_ms).min().unwrap_or(0);
                let max_ms = es.iter().map(|e| e.duration_ms).max().unwrap_or(0);
                let error_count = es.iter().filter(|e| !e.success).count() as u64;
                let unique_traces = es
                    .iter()
                    .map(|e| e.trace_id.as_str())
                    .filter(|t| !t.is_empty())
                    .collect::<std::collections::HashSet<_>>()
                    .len() as u64;
                AggregateGroupRow {
                    key,
                    count,
                    total_ms,
                    avg_ms: if count == 0 { 0.0 } else { total_ms as f64 / count as f64 },
                    min_ms,
                    max_ms,
                    error_count,
                    unique_traces,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.total_ms.cmp(&a.total_ms));
        Ok(rows::finish_aggregate_section(rows))
    }

    async fn gaps(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        top_n: u32,
    ) -> Result<Vec<GapRow>, AnalyticsError> {
        Self::check_cancelled(cancel, "gaps")?;
        let mut entries = self.scoped(tenant_id, job_id);
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.line_number.cmp(&b.line_number)));
        let mut gaps: Vec<GapRow> = entries
            .windows(2)
            .filter_map(|pair| {
                let gap_ms = (pair[1].timestamp - pair[0].timestamp).num_milliseconds();
                if gap_ms <= 0 {
                    return None;
                }
                Some(GapRow {
                    entry_id: pair[0].entry_id.to_string(),
                    timestamp: pair[0].timestamp,
                    next_timestamp: pair[1].timestamp,
                    line_number: pair[0].line_number,
                    next_line_number: pair[1].line_number,
                    gap_ms,
                })
            })
            .collect();
        gaps.sort_by(|a, b| b.gap_ms.cmp(&a.gap_ms));
        gaps.truncate(top_n as usize);
        Ok(gaps)
    }

    async fn queue_health(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<QueueHealthRow>, AnalyticsError> {
        Self::check_cancelled(cancel, "queue_health")?;
        let mut groups: IndexMap<String, Vec<LogEntry>> = IndexMap::default();
        for e in self.scoped(tenant_id, job_id) {
            if e.queue.is_empty() {
                continue;
            }
            groups.entry(e.queue.to_string()).or_default().push(e);
        }
        let mut out: Vec<QueueHealthRow> = groups
            .into_iter()
            .map(|(queue, es)| {
                let total_calls = es.len() as u64;
                let total_ms: u64 = es.iter().map(|e| e.duration_ms as u64).sum();
                let errors = es.iter().filter(|e| !e.success).count() as u64;
                QueueHealthRow {
                    queue,
                    total_calls,
                    avg_ms: if total_calls == 0 { 0.0 } else { total_ms as f64 / total_calls as f64 },
                    error_rate: if total_calls == 0 { 0.0 } else { errors as f64 / total_calls as f64 },
                    p95_ms: p95(es.iter().map(|e| e.duration_ms).collect()),
                }
            })
            .collect();
        out.sort_by(|a, b| b.total_calls.cmp(&a.total_calls));
        Ok(out)
    }

    async fn thread_stats(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<ThreadStat>, AnalyticsError> {
        Self::check_cancelled(cancel, "thread_stats")?;
        let mut groups: IndexMap<String, Vec<LogEntry>> = IndexMap::default();
        for e in self.scoped(tenant_id, job_id) {
            if e.thread_id.is_empty() {
                continue;
            }
            groups.entry(e.thread_id.to_string()).or_default().push(e);
        }
        let rows: Vec<ThreadStatRow> = groups
            .into_iter()
            .map(|(thread_id, es)| {
                let count = es.len() as u64;
                let sum_ms: u64 = es.iter().map(|e| e.duration_ms as u64).sum();
                let max_ms = es.iter().map(|e| e.duration_ms).max().unwrap_or(0);
                let error_count = es.iter().filter(|e| !e.success).count() as u64;
                let active_start_ts = es.iter().map(|e| e.timestamp.timestamp_millis()).min().unwrap_or(0);
                let active_end_ts = es.iter().map(|e| e.timestamp.timestamp_millis()).max().unwrap_or(0);
                ThreadStatRow {
                    thread_id,
                    count,
                    sum_ms,
                    avg_ms: if count == 0 { 0.0 } else { sum_ms as f64 / count as f64 },
                    max_ms,
                    error_count,
                    active_start_ts,
                    active_end_ts,
                }
            })
            .collect();
        Ok(rows::finish_thread_stats(rows))
    }

    async fn filter_complexity(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        top_count: u32,
        combo_count: u32,
    ) -> Result<FilterComplexity, AnalyticsError> {
        Self::check_cancelled(cancel, "filter_complexity")?;
        let scoped = self.scoped(tenant_id, job_id);
        let fltr: Vec<&LogEntry> = scoped.iter().filter(|e| e.log_type == LogType::Fltr).collect();

        let mut by_filter: IndexMap<String, (u64, u64)> = IndexMap::default();
        for e in &fltr {
            if e.filter_name.is_empty() {
                continue;
            }
            let entry = by_filter.entry(e.filter_name.to_string()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += e.duration_ms as u64;
        }
        let mut top_filters: Vec<FilterCountRow> = by_filter
            .into_iter()
            .map(|(filter_name, (count, total_ms))| FilterCountRow { filter_name, count, total_ms })
            .collect();
        top_filters.sort_by(|a, b| b.count.cmp(&a.count));
        top_filters.truncate(top_count as usize);

        let mut by_combo: IndexMap<(String, String), Vec<&LogEntry>> = IndexMap::default();
        for e in &fltr {
            if e.trace_id.is_empty() || e.filter_name.is_empty() {
                continue;
            }
            by_combo.entry((e.trace_id.to_string(), e.filter_name.to_string())).or_default().push(e);
        }
        let mut top_combos: Vec<TraceFilterComboRow> = by_combo
            .into_iter()
            .map(|((trace_id, filter_name), es)| {
                let count = es.len() as u64;
                let total_ms: u64 = es.iter().map(|e| e.duration_ms as u64).sum();
                let max_ms = es.iter().map(|e| e.duration_ms).max().unwrap_or(0);
                TraceFilterComboRow {
                    trace_id,
                    filter_name,
                    count,
                    avg_ms: if count == 0 { 0.0 } else { total_ms as f64 / count as f64 },
                    max_ms,
                    total_ms,
                    queue: es.first().map(|e| e.queue.to_string()).unwrap_or_default(),
                    form: es.first().map(|e| e.form.to_string()).unwrap_or_default(),
                }
            })
            .collect();
        top_combos.sort_by(|a, b| b.total_ms.cmp(&a.total_ms));
        top_combos.truncate(combo_count as usize);

        let total_filter_ms: u64 = fltr.iter().map(|e| e.duration_ms as u64).sum();

        Ok(FilterComplexity { top_filters, top_combos, total_filter_ms })
    }

    async fn histogram(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        bucket_sql_literal: &str,
    ) -> Result<Vec<HistogramBucket>, AnalyticsError> {
        Self::check_cancelled(cancel, "histogram")?;
        let width_s = bucket_seconds(bucket_sql_literal).max(1);
        let mut buckets: std::collections::BTreeMap<i64, Vec<LogEntry>> = std::collections::BTreeMap::new();
        for e in self.scoped(tenant_id, job_id) {
            if e.timestamp < time_from || e.timestamp > time_to {
                continue;
            }
            let bucket = e.timestamp.timestamp().div_euclid(width_s) * width_s;
            buckets.entry(bucket).or_default().push(e);
        }
        Ok(buckets
            .into_iter()
            .map(|(bucket, group)| HistogramBucket {
                bucket: DateTime::from_timestamp(bucket, 0).unwrap_or_else(Utc::now),
                api_count: group.iter().filter(|e| e.log_type == LogType::Api).count() as u64,
                sql_count: group.iter().filter(|e| e.log_type == LogType::Sql).count() as u64,
                fltr_count: group.iter().filter(|e| e.log_type == LogType::Fltr).count() as u64,
                escl_count: group.iter().filter(|e| e.log_type == LogType::Escl).count() as u64,
                total_count: group.len() as u64,
            })
            .collect())
    }

    async fn entries_in_line_range(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        low: u32,
        high: u32,
    ) -> Result<Vec<LogEntry>, AnalyticsError> {
        Self::check_cancelled(cancel, "entries_in_line_range")?;
        let mut entries: Vec<LogEntry> = self
            .scoped(tenant_id, job_id)
            .into_iter()
            .filter(|e| e.line_number >= low && e.line_number <= high)
            .collect();
        entries.sort_by_key(|e| e.line_number);
        Ok(entries)
    }

    async fn transactions(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        filter: &TransactionFilter,
        limit: u32,
    ) -> Result<Vec<TransactionGroup>, AnalyticsError> {
        Self::check_cancelled(cancel, "transactions")?;
        let scoped: Vec<LogEntry> = self
            .scoped(tenant_id, job_id)
            .into_iter()
            .filter(|e| filter.user.as_deref().is_none_or(|v| v == e.user.as_str()))
            .filter(|e| filter.thread_id.as_deref().is_none_or(|v| v == e.thread_id.as_str()))
            .filter(|e| filter.trace_id.as_deref().is_none_or(|v| v == e.trace_id.as_str()))
            .filter(|e| filter.rpc_id.as_deref().is_none_or(|v| v == e.rpc_id.as_str()))
            .filter(|e| filter.has_errors.is_none_or(|want| want == e.error_encountered))
            .collect();

        let mut groups: IndexMap<(String, CorrelationKind), Vec<LogEntry>> = IndexMap::default();
        for e in scoped {
            let key = if !e.trace_id.is_empty() {
                (e.trace_id.to_string(), CorrelationKind::Trace)
            } else if !e.rpc_id.is_empty() {
                (e.rpc_id.to_string(), CorrelationKind::Rpc)
            } else {
                continue;
            };
            groups.entry(key).or_default().push(e);
        }

        let mut out: Vec<TransactionGroup> = groups
            .into_iter()
            .filter_map(|((corr_id, corr_type), es)| {
                let first_timestamp = es.iter().map(|e| e.timestamp).min()?;
                let last_timestamp = es.iter().map(|e| e.timestamp).max()?;
                let total_duration_ms = (last_timestamp - first_timestamp).num_milliseconds().max(0) as u64;
                if let Some(min) = filter.min_duration_ms {
                    if total_duration_ms < min {
                        return None;
                    }
                }
                let span_count = es.len() as u64;
                let error_count = es.iter().filter(|e| !e.success).count() as u64;
                let head = es.first()?;
                Some(TransactionGroup {
                    corr_id,
                    corr_type,
                    primary_user: head.user.to_string(),
                    primary_form: head.form.to_string(),
                    primary_operation: head.operation.to_string(),
                    primary_queue: head.queue.to_string(),
                    total_duration_ms,
                    span_count,
                    error_count,
                    first_timestamp,
                    last_timestamp,
                })
            })
            .collect();
        out.sort_by(|a, b| b.first_timestamp.cmp(&a.first_timestamp));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn job_time_range(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<JobTimeRange, AnalyticsError> {
        Self::check_cancelled(cancel, "job_time_range")?;
        let scoped = self.scoped(tenant_id, job_id);
        let min = scoped.iter().map(|e| e.timestamp).min();
        let max = scoped.iter().map(|e| e.timestamp).max();
        match (min, max) {
            (Some(min), Some(max)) => Ok(JobTimeRange { min, max }),
            _ => Err(AnalyticsError::NotFound { operation: "job_time_range" }),
        }
    }

    async fn overall_error_rate_and_avg_duration(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<(f64, f64), AnalyticsError> {
        Self::check_cancelled(cancel, "health_error_rate")?;
        let scoped = self.scoped(tenant_id, job_id);
        if scoped.is_empty() {
            return Ok((0.0, 0.0));
        }
        let total = scoped.len() as f64;
        let errors = scoped.iter().filter(|e| !e.success).count() as f64;
        let total_ms: u64 = scoped.iter().map(|e| e.duration_ms as u64).sum();
        Ok((errors / total, total_ms as f64 / total))
    }

    async fn max_thread_busy_pct(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<f64, AnalyticsError> {
        let stats = self.thread_stats(cancel, tenant_id, job_id).await?;
        Ok(stats.iter().map(|s| s.busy_pct).fold(0.0, f64::max))
    }

    async fn max_gap_seconds(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<f64, AnalyticsError> {
        let gaps = self.gaps(cancel, tenant_id, job_id, 1).await?;
        Ok(gaps.first().map(|g| g.gap_ms as f64 / 1000.0).unwrap_or(0.0))
    }
}
