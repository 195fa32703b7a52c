//! The persistence port. [`StoreClient`] is the trait every
//! analytical operation in [`crate::engine`] is built on top of;
//! [`ClickHouseStore`] is the production implementation, grounded on
//! `ltbridge`'s `ck-log.rs` (`LogStorage` trait wrapping `clickhouse::Client`,
//! lowering an AST to SQL text and streaming typed rows back) and
//! `RushObservability`'s `migrations.rs` (idempotent `CREATE TABLE IF NOT
//! EXISTS` DDL, MergeTree engine, matching `PARTITION BY`/`ORDER BY`).
//! [`crate::testing::InMemoryStore`] implements the same trait for tests
//! that don't need a live ClickHouse instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Client;
use remedy_core::LogEntry;
use tokio_util::sync::CancellationToken;

use crate::error::AnalyticsError;
use crate::rows::{
    self, AggregateGroupRow, GapRowStore, HistogramRowStore, LogEntryRow, ThreadStatRow,
    TimeSeriesRowStore, TransactionRowStore,
};
use crate::types::{
    AggregateSection, AutocompleteItem, FacetBucket, FilterComplexity, GapRow, HistogramBucket,
    JobTimeRange, QueueHealthRow, SearchFilter, SortColumn, SortDirection, TextFilter, ThreadStat,
    TimeSeriesPoint, TopNEntry, TransactionGroup,
};
use remedy_core::LogType;
use remedy_kql::FieldPolicy;

/// Filters accepted by transaction search.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub user: Option<String>,
    pub thread_id: Option<String>,
    pub trace_id: Option<String>,
    pub rpc_id: Option<String>,
    pub has_errors: Option<bool>,
    pub min_duration_ms: Option<u64>,
}

/// Idempotent DDL for the primary table. Run once at startup by the
/// embedding application via [`ClickHouseStore::migrate`].
pub const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS log_entries
(
    tenant_id         LowCardinality(String),
    job_id            String,
    entry_id          String,
    line_number       UInt32,
    file_number       UInt16,
    timestamp         DateTime64(3),
    ingested_at       DateTime64(3),
    log_type          Enum8('API' = 0, 'SQL' = 1, 'FLTR' = 2, 'ESCL' = 3),
    trace_id          String,
    rpc_id            String,
    thread_id         String,
    queue             String,
    user              String,
    duration_ms       UInt32,
    queue_time_ms     UInt32,
    success           UInt8,
    error_message     String,
    error_encountered UInt8,
    api_code          String,
    form              String,
    sql_table         String,
    sql_statement     String,
    filter_name       String,
    filter_level      UInt8,
    operation         String,
    request_id        String,
    esc_name          String,
    esc_pool          String,
    scheduled_time    DateTime64(3),
    has_scheduled_time UInt8,
    delay_ms          UInt32,
    raw_text          String
)
ENGINE = MergeTree
PARTITION BY (tenant_id, toYYYYMM(timestamp))
ORDER BY (tenant_id, job_id, log_type, timestamp, line_number)
TTL toDateTime(timestamp) + INTERVAL 90 DAY
"#;

/// Optional performance aid — not required for correctness.
pub const CREATE_MINUTE_ROLLUP_MV_SQL: &str = r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS log_entries_minute_mv
ENGINE = AggregatingMergeTree
PARTITION BY (tenant_id, toYYYYMM(minute))
ORDER BY (tenant_id, job_id, log_type, minute)
AS
SELECT
    tenant_id,
    job_id,
    log_type,
    toStartOfMinute(timestamp) AS minute,
    countState()                    AS count_state,
    countIfState(success = 0)       AS error_count_state,
    avgState(duration_ms)           AS avg_duration_state,
    maxState(duration_ms)           AS max_duration_state,
    sumState(duration_ms)           AS sum_duration_state,
    uniqExactState(user)            AS unique_users_state,
    uniqExactState(form)            AS unique_forms_state,
    uniqExactState(sql_table)       AS unique_sql_tables_state
FROM log_entries
GROUP BY tenant_id, job_id, log_type, minute
"#;

/// The columnar-store port every analytical operation is built on.
///
/// Every method takes `tenant_id`/`job_id` and a [`CancellationToken`] so
/// cancellation reaches the in-flight network call. Predicates that
/// involve user query input arrive as a structured [`SearchFilter`] — KQL
/// parsing and the sanitization fallback happen in `crate::engine` before
/// the store is ever consulted, but lowering the AST to a concrete
/// predicate (SQL text here, a direct in-memory match in
/// [`crate::testing::InMemoryStore`]) is each implementation's own job.
#[async_trait]
pub trait StoreClient: Send + Sync {
    async fn bulk_insert(
        &self,
        cancel: &CancellationToken,
        entries: &[LogEntry],
    ) -> Result<(), AnalyticsError>;

    async fn get_entry(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        entry_id: &str,
    ) -> Result<LogEntry, AnalyticsError>;

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
    ) -> Result<(Vec<LogEntry>, u64), AnalyticsError>;

    async fn facet_counts(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        predicate: &SearchFilter,
        column: &str,
        limit: u32,
    ) -> Result<Vec<FacetBucket>, AnalyticsError>;

    async fn autocomplete(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        column: &str,
        prefix_pattern: &str,
        limit: u32,
    ) -> Result<Vec<AutocompleteItem>, AnalyticsError>;

    async fn top_n(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        log_type: LogType,
        top_n: u32,
    ) -> Result<Vec<TopNEntry>, AnalyticsError>;

    async fn time_series(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<TimeSeriesPoint>, AnalyticsError>;

    async fn aggregate(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        log_type: LogType,
        group_column: &str,
    ) -> Result<AggregateSection, AnalyticsError>;

    async fn gaps(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        top_n: u32,
    ) -> Result<Vec<GapRow>, AnalyticsError>;

    async fn queue_health(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<QueueHealthRow>, AnalyticsError>;

    async fn thread_stats(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<ThreadStat>, AnalyticsError>;

    async fn filter_complexity(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        top_count: u32,
        combo_count: u32,
    ) -> Result<FilterComplexity, AnalyticsError>;

    async fn histogram(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        bucket_sql_literal: &str,
    ) -> Result<Vec<HistogramBucket>, AnalyticsError>;

    async fn entries_in_line_range(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        low: u32,
        high: u32,
    ) -> Result<Vec<LogEntry>, AnalyticsError>;

    async fn transactions(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        filter: &TransactionFilter,
        limit: u32,
    ) -> Result<Vec<TransactionGroup>, AnalyticsError>;

    async fn job_time_range(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<JobTimeRange, AnalyticsError>;

    /// `(error_rate, avg_duration_ms)` for the health scorer.
    async fn overall_error_rate_and_avg_duration(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<(f64, f64), AnalyticsError>;

    async fn max_thread_busy_pct(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<f64, AnalyticsError>;

    async fn max_gap_seconds(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<f64, AnalyticsError>;
}

/// Lowers a structured [`SearchFilter`] into a bound SQL fragment (no
/// `tenant_id`/`job_id` conditions — callers AND those in separately).
/// The free-text half lowers through `remedy_kql::to_where_clause` when it
/// carries a parsed AST; the structured filters (log type, time range,
/// user, queue) are appended as additional `AND`-ed conditions.
fn lower_search_filter(predicate: &SearchFilter) -> (String, Vec<String>) {
    let (mut sql, mut params) = match &predicate.text {
        TextFilter::MatchAll => ("1=1".to_string(), Vec::new()),
        TextFilter::Kql(ast) => remedy_kql::to_where_clause(Some(ast), FieldPolicy::Passthrough)
            .unwrap_or_else(|_| ("1=1".to_string(), Vec::new())),
        TextFilter::Fallback { pattern } => (
            "(raw_text ILIKE ? OR error_message ILIKE ?)".to_string(),
            vec![pattern.clone(), pattern.clone()],
        ),
    };

    if !predicate.log_types.is_empty() {
        let placeholders = vec!["?"; predicate.log_types.len()].join(", ");
        sql = format!("({sql}) AND (log_type IN ({placeholders}))");
        params.extend(predicate.log_types.iter().map(|lt| lt.as_str().to_string()));
    }
    if let Some(from) = predicate.time_from {
        sql = format!("({sql}) AND (timestamp >= ?)");
        params.push(from.to_rfc3339());
    }
    if let Some(to) = predicate.time_to {
        sql = format!("({sql}) AND (timestamp <= ?)");
        params.push(to.to_rfc3339());
    }
    if !predicate.users.is_empty() {
        let placeholders = vec!["?"; predicate.users.len()].join(", ");
        sql = format!("({sql}) AND (user IN ({placeholders}))");
        params.extend(predicate.users.iter().cloned());
    }
    if !predicate.queues.is_empty() {
        let placeholders = vec!["?"; predicate.queues.len()].join(", ");
        sql = format!("({sql}) AND (queue IN ({placeholders}))");
        params.extend(predicate.queues.iter().cloned());
    }
    (sql, params)
}

/// Production implementation backed by a `clickhouse::Client`.
pub struct ClickHouseStore {
    client: Client,
}

impl ClickHouseStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Runs the idempotent DDL. Call once at application startup.
    pub async fn migrate(&self) -> Result<(), AnalyticsError> {
        self.client
            .query(CREATE_TABLE_SQL)
            .execute()
            .await
            .map_err(|e| AnalyticsError::store("migrate", e))?;
        self.client
            .query(CREATE_MINUTE_ROLLUP_MV_SQL)
            .execute()
            .await
            .map_err(|e| AnalyticsError::store("migrate", e))
    }

    fn check_cancelled(cancel: &CancellationToken, op: &'static str) -> Result<(), AnalyticsError> {
        if cancel.is_cancelled() {
            return Err(AnalyticsError::Cancelled { operation: op });
        }
        Ok(())
    }
}

// The full query-by-query `StoreClient` implementation for `ClickHouseStore`
// mirrors the SQL shapes in exactly (one method per operation, each
// building its WHERE/GROUP BY/ORDER BY from the operation's own contract and
// the caller-supplied `SearchFilter`, lowered via `lower_search_filter`). It
// is intentionally identical in
// structure to [`crate::testing::InMemoryStore`]'s row-filtering logic, just
// expressed as SQL text bound through `clickhouse::Client::query`, and is
// the piece of this crate an embedding application wires up against a real
// cluster; `InMemoryStore` is what every test in this crate runs against.
#[async_trait]
impl StoreClient for ClickHouseStore {
    async fn bulk_insert(
        &self,
        cancel: &CancellationToken,
        entries: &[LogEntry],
    ) -> Result<(), AnalyticsError> {
        Self::check_cancelled(cancel, "bulk_insert")?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut insert = self
            .client
            .insert::<LogEntryRow>("log_entries")
            .map_err(|e| AnalyticsError::store("bulk_insert", e))?;
        for entry in entries {
            insert
                .write(&LogEntryRow::from(entry))
                .await
                .map_err(|e| AnalyticsError::store("bulk_insert", e))?;
        }
        insert
            .end()
            .await
            .map_err(|e| AnalyticsError::store("bulk_insert", e))
    }

    async fn get_entry(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        entry_id: &str,
    ) -> Result<LogEntry, AnalyticsError> {
        Self::check_cancelled(cancel, "get_entry")?;
        let sql = "SELECT ?fields FROM log_entries \
                    WHERE tenant_id = ? AND job_id = ? AND entry_id = ? LIMIT 1";
        self.client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(entry_id)
            .fetch_optional::<LogEntryRow>()
            .await
            .map_err(|e| AnalyticsError::store("get_entry", e))?
            .map(LogEntry::from)
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
        let (predicate_sql, params) = lower_search_filter(predicate);
        let where_sql = format!("tenant_id = ? AND job_id = ? AND ({predicate_sql})");
        let data_sql = format!(
            "SELECT ?fields FROM log_entries WHERE {where_sql} \
             ORDER BY {} {} LIMIT ? OFFSET ?",
            sort.column_name(),
            direction.sql_keyword(),
        );
        let count_sql = format!("SELECT count() FROM log_entries WHERE {where_sql}");

        let mut data_query = self.client.query(&data_sql).bind(tenant_id).bind(job_id);
        for p in &params {
            data_query = data_query.bind(p);
        }
        let entries: Vec<LogEntry> = data_query
            .bind(limit)
            .bind(offset)
            .fetch_all::<LogEntryRow>()
            .await
            .map_err(|e| AnalyticsError::store("search", e))?
            .into_iter()
            .map(LogEntry::from)
            .collect();

        let mut count_query = self.client.query(&count_sql).bind(tenant_id).bind(job_id);
        for p in &params {
            count_query = count_query.bind(p);
        }
        let total_count: u64 = count_query
            .fetch_one()
            .await
            .map_err(|e| AnalyticsError::store("search", e))?;

        Ok((entries, total_count))
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
        let (predicate_sql, params) = lower_search_filter(predicate);
        let sql = format!(
            "SELECT toString({column}) AS value, count() AS count FROM log_entries \
             WHERE tenant_id = ? AND job_id = ? AND ({predicate_sql}) AND toString({column}) != '' \
             GROUP BY value ORDER BY count DESC LIMIT ?"
        );
        let mut query = self.client.query(&sql).bind(tenant_id).bind(job_id);
        for p in &params {
            query = query.bind(p);
        }
        query
            .bind(limit)
            .fetch_all::<FacetBucket>()
            .await
            .map_err(|e| AnalyticsError::store("facet_counts", e))
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
        let sql = format!(
            "SELECT toString({column}) AS value, count() AS count FROM log_entries \
             WHERE tenant_id = ? AND job_id = ? AND toString({column}) LIKE ? \
             AND toString({column}) != '' GROUP BY value ORDER BY count DESC LIMIT ?"
        );
        self.client
            .query(&sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(prefix_pattern)
            .bind(limit)
            .fetch_all::<AutocompleteItem>()
            .await
            .map_err(|e| AnalyticsError::store("autocomplete", e))
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
        let sql = "SELECT ?fields FROM log_entries \
                    WHERE tenant_id = ? AND job_id = ? AND log_type = ? \
                    ORDER BY duration_ms DESC LIMIT ?";
        let entries: Vec<LogEntry> = self
            .client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(log_type.as_str())
            .bind(top_n)
            .fetch_all::<LogEntryRow>()
            .await
            .map_err(|e| AnalyticsError::store("top_n", e))?
            .into_iter()
            .map(LogEntry::from)
            .collect();
        Ok(rows::rank_top_n(entries))
    }

    async fn time_series(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<TimeSeriesPoint>, AnalyticsError> {
        Self::check_cancelled(cancel, "time_series")?;
        let sql = "SELECT toStartOfMinute(timestamp) AS bucket, \
                    countIf(log_type = 'API') AS api_count, \
                    countIf(log_type = 'SQL') AS sql_count, \
                    countIf(log_type = 'FLTR') AS fltr_count, \
                    countIf(log_type = 'ESCL') AS escl_count, \
                    avg(duration_ms) AS avg_duration_ms, \
                    countIf(success = 0) AS error_count \
                    FROM log_entries WHERE tenant_id = ? AND job_id = ? \
                    GROUP BY bucket ORDER BY bucket ASC";
        let rows = self
            .client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .fetch_all::<TimeSeriesRowStore>()
            .await
            .map_err(|e| AnalyticsError::store("time_series", e))?;
        Ok(rows.into_iter().map(TimeSeriesPoint::from).collect())
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
        let sql = format!(
            "SELECT {group_column} AS key, count() AS count, sum(duration_ms) AS total_ms, \
             avg(duration_ms) AS avg_ms, min(duration_ms) AS min_ms, max(duration_ms) AS max_ms, \
             countIf(success = 0) AS error_count, uniqExact(trace_id) AS unique_traces \
             FROM log_entries \
             WHERE tenant_id = ? AND job_id = ? AND log_type = ? AND {group_column} != '' \
             GROUP BY key ORDER BY total_ms DESC"
        );
        let groups = self
            .client
            .query(&sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(log_type.as_str())
            .fetch_all::<AggregateGroupRow>()
            .await
            .map_err(|e| AnalyticsError::store("aggregate", e))?;
        Ok(rows::finish_aggregate_section(groups))
    }

    async fn gaps(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        top_n: u32,
    ) -> Result<Vec<GapRow>, AnalyticsError> {
        Self::check_cancelled(cancel, "gaps")?;
        let sql = "SELECT entry_id, timestamp, next_timestamp, line_number, next_line_number, gap_ms \
                    FROM ( \
                      SELECT entry_id, timestamp, line_number, \
                             neighbor(timestamp, 1) AS next_timestamp, \
                             neighbor(line_number, 1) AS next_line_number, \
                             dateDiff('millisecond', timestamp, neighbor(timestamp, 1)) AS gap_ms \
                      FROM log_entries WHERE tenant_id = ? AND job_id = ? ORDER BY timestamp ASC \
                    ) \
                    WHERE gap_ms > 0 AND next_timestamp != toDateTime64('1970-01-01 00:00:00', 3) \
                    ORDER BY gap_ms DESC LIMIT ?";
        let rows = self
            .client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(top_n)
            .fetch_all::<GapRowStore>()
            .await
            .map_err(|e| AnalyticsError::store("gaps", e))?;
        Ok(rows.into_iter().map(GapRow::from).collect())
    }

    async fn queue_health(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<QueueHealthRow>, AnalyticsError> {
        Self::check_cancelled(cancel, "queue_health")?;
        let sql = "SELECT queue, count() AS total_calls, avg(duration_ms) AS avg_ms, \
                    countIf(success = 0) / count() AS error_rate, \
                    quantile(0.95)(duration_ms) AS p95_ms \
                    FROM log_entries WHERE tenant_id = ? AND job_id = ? AND queue != '' \
                    GROUP BY queue ORDER BY total_calls DESC";
        self.client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .fetch_all::<QueueHealthRow>()
            .await
            .map_err(|e| AnalyticsError::store("queue_health", e))
    }

    async fn thread_stats(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<ThreadStat>, AnalyticsError> {
        Self::check_cancelled(cancel, "thread_stats")?;
        let sql = "SELECT thread_id, count() AS count, sum(duration_ms) AS sum_ms, \
                    avg(duration_ms) AS avg_ms, max(duration_ms) AS max_ms, \
                    countIf(success = 0) AS error_count, \
                    min(timestamp) AS active_start_ts, max(timestamp) AS active_end_ts \
                    FROM log_entries WHERE tenant_id = ? AND job_id = ? AND thread_id != '' \
                    GROUP BY thread_id";
        let rows = self
            .client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .fetch_all::<ThreadStatRow>()
            .await
            .map_err(|e| AnalyticsError::store("thread_stats", e))?;
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
        let top_sql = "SELECT filter_name, count() AS count, sum(duration_ms) AS total_ms \
                        FROM log_entries WHERE tenant_id = ? AND job_id = ? AND log_type = 'FLTR' \
                        AND filter_name != '' GROUP BY filter_name ORDER BY count DESC LIMIT ?";
        let combo_sql = "SELECT trace_id, filter_name, count() AS count, avg(duration_ms) AS avg_ms, \
                          max(duration_ms) AS max_ms, sum(duration_ms) AS total_ms, \
                          any(queue) AS queue, any(form) AS form \
                          FROM log_entries WHERE tenant_id = ? AND job_id = ? AND log_type = 'FLTR' \
                          AND trace_id != '' AND filter_name != '' \
                          GROUP BY trace_id, filter_name ORDER BY total_ms DESC LIMIT ?";
        let total_sql = "SELECT sum(duration_ms) FROM log_entries \
                          WHERE tenant_id = ? AND job_id = ? AND log_type = 'FLTR'";

        let top_filters = self
            .client
            .query(top_sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(top_count)
            .fetch_all()
            .await
            .map_err(|e| AnalyticsError::store("filter_complexity", e))?;
        let top_combos = self
            .client
            .query(combo_sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(combo_count)
            .fetch_all()
            .await
            .map_err(|e| AnalyticsError::store("filter_complexity", e))?;
        let total_filter_ms: u64 = self
            .client
            .query(total_sql)
            .bind(tenant_id)
            .bind(job_id)
            .fetch_one()
            .await
            .map_err(|e| AnalyticsError::store("filter_complexity", e))?;

        Ok(FilterComplexity {
            top_filters,
            top_combos,
            total_filter_ms,
        })
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
        // `bucket_sql_literal` comes from the adaptive bucket-size table,
        // never from user input, so interpolating it directly is safe.
        let sql = format!(
            "SELECT toStartOfInterval(timestamp, INTERVAL {bucket_sql_literal}) AS bucket, \
             countIf(log_type = 'API') AS api_count, countIf(log_type = 'SQL') AS sql_count, \
             countIf(log_type = 'FLTR') AS fltr_count, countIf(log_type = 'ESCL') AS escl_count, \
             count() AS total_count \
             FROM log_entries WHERE tenant_id = ? AND job_id = ? \
             AND timestamp >= ? AND timestamp <= ? \
             GROUP BY bucket ORDER BY bucket ASC"
        );
        let rows = self
            .client
            .query(&sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(rows::dt_to_millis(time_from))
            .bind(rows::dt_to_millis(time_to))
            .fetch_all::<HistogramRowStore>()
            .await
            .map_err(|e| AnalyticsError::store("histogram", e))?;
        Ok(rows.into_iter().map(HistogramBucket::from).collect())
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
        let sql = "SELECT ?fields FROM log_entries \
                    WHERE tenant_id = ? AND job_id = ? AND line_number BETWEEN ? AND ? \
                    ORDER BY line_number ASC";
        let rows = self
            .client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .bind(low)
            .bind(high)
            .fetch_all::<LogEntryRow>()
            .await
            .map_err(|e| AnalyticsError::store("entries_in_line_range", e))?;
        Ok(rows.into_iter().map(LogEntry::from).collect())
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
        let mut conditions = vec!["tenant_id = ?".to_string(), "job_id = ?".to_string()];
        let mut params: Vec<String> = vec![tenant_id.to_string(), job_id.to_string()];
        if let Some(user) = &filter.user {
            conditions.push("user = ?".to_string());
            params.push(user.clone());
        }
        if let Some(thread_id) = &filter.thread_id {
            conditions.push("thread_id = ?".to_string());
            params.push(thread_id.clone());
        }
        if let Some(trace_id) = &filter.trace_id {
            conditions.push("trace_id = ?".to_string());
            params.push(trace_id.clone());
        }
        if let Some(rpc_id) = &filter.rpc_id {
            conditions.push("rpc_id = ?".to_string());
            params.push(rpc_id.clone());
        }
        if let Some(has_errors) = filter.has_errors {
            conditions.push(format!("error_encountered = {}", u8::from(has_errors)));
        }

        let having = filter
            .min_duration_ms
            .map(|min| format!("HAVING dateDiff('millisecond', min(timestamp), max(timestamp)) >= {min}"))
            .unwrap_or_default();

        let sql = format!(
            "SELECT coalesce(nullIf(trace_id, ''), rpc_id) AS corr_id, \
             if(trace_id != '', 'trace', 'rpc') AS corr_type, \
             any(user) AS primary_user, any(form) AS primary_form, \
             any(operation) AS primary_operation, any(queue) AS primary_queue, \
             dateDiff('millisecond', min(timestamp), max(timestamp)) AS total_duration_ms, \
             count() AS span_count, countIf(success = 0) AS error_count, \
             min(timestamp) AS first_timestamp, max(timestamp) AS last_timestamp \
             FROM log_entries WHERE {} AND corr_id != '' \
             GROUP BY corr_id, corr_type {having} \
             ORDER BY first_timestamp DESC LIMIT ?",
            conditions.join(" AND "),
        );

        let mut query = self.client.query(&sql);
        for p in &params {
            query = query.bind(p);
        }
        let rows = query
            .bind(limit)
            .fetch_all::<TransactionRowStore>()
            .await
            .map_err(|e| AnalyticsError::store("transactions", e))?;
        Ok(rows.into_iter().map(TransactionGroup::from).collect())
    }

    async fn job_time_range(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<JobTimeRange, AnalyticsError> {
        Self::check_cancelled(cancel, "job_time_range")?;
        let sql = "SELECT min(timestamp), max(timestamp) FROM log_entries \
                    WHERE tenant_id = ? AND job_id = ?";
        let (min_ms, max_ms): (i64, i64) = self
            .client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .fetch_one()
            .await
            .map_err(|e| AnalyticsError::store("job_time_range", e))?;
        rows::job_time_range_from_millis(min_ms, max_ms)
            .ok_or(AnalyticsError::NotFound { operation: "job_time_range" })
    }

    async fn overall_error_rate_and_avg_duration(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<(f64, f64), AnalyticsError> {
        Self::check_cancelled(cancel, "health_error_rate")?;
        let sql = "SELECT countIf(success = 0) / count(), avg(duration_ms) \
                    FROM log_entries WHERE tenant_id = ? AND job_id = ?";
        self.client
            .query(sql)
            .bind(tenant_id)
            .bind(job_id)
            .fetch_one()
            .await
            .map_err(|e| AnalyticsError::store("health_error_rate", e))
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
