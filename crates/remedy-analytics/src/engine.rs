//! The analytics engine. Orchestrates KQL parsing/whitelisting/
//! sanitization and health-score composition on top of the [`StoreClient`]
//! port; every method enforces tenant scoping and pagination/limit caps
//! before a single query reaches the store.

use chrono::{DateTime, Utc};
use remedy_core::{validate_tenant_id, LogType};
use remedy_kql::KqlError;
use tokio_util::sync::CancellationToken;

use crate::config::AnalyticsConfig;
use crate::error::AnalyticsError;
use crate::health;
use crate::sanitize;
use crate::store::{StoreClient, TransactionFilter};
use crate::types::{
    AggregatesResult, ContextWindow, FacetsResult, FilterComplexity, GapsResult, HealthFactors,
    HealthScore, JobTimeRange, SearchFilter, SearchPage, SortColumn, SortDirection, TextFilter,
    ThreadStat, TimeSeriesPoint, TopNEntry, TransactionGroup,
};
use crate::whitelist;

/// Parameters accepted by [`AnalyticsEngine::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub query: String,
    pub log_types: Vec<LogType>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub users: Vec<String>,
    pub queues: Vec<String>,
    pub sort: Option<SortColumn>,
    pub direction: SortDirection,
    pub page: u32,
    pub page_size: Option<u32>,
    pub export_mode: bool,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Descending
    }
}

pub struct AnalyticsEngine<S: StoreClient> {
    store: S,
    config: AnalyticsConfig,
}

impl<S: StoreClient> AnalyticsEngine<S> {
    pub fn new(store: S, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    fn check_tenant(tenant_id: &str) -> Result<(), AnalyticsError> {
        validate_tenant_id(tenant_id)?;
        Ok(())
    }

    /// Lowers `query` through the KQL pipeline; on a parse failure, falls
    /// back to a sanitized `ILIKE` over `raw_text OR error_message`. Note
    /// this fallback is wider than a KQL `FullText` leaf, which only
    /// searches `raw_text` — the two paths are kept deliberately distinct
    /// rather than unified. The AST itself is carried through unlowered:
    /// [`crate::store::ClickHouseStore`]
    /// lowers it to SQL, [`crate::testing::InMemoryStore`] evaluates it
    /// directly via `crate::matcher`.
    fn lower_search_query(query: &str) -> TextFilter {
        match remedy_kql::parse(query) {
            Ok(Some(ast)) => TextFilter::Kql(ast),
            Ok(None) => TextFilter::MatchAll,
            Err(err) => {
                log::warn!("kql parse failed, falling back to sanitized search: {err}");
                TextFilter::Fallback { pattern: sanitize::contains_pattern(query) }
            }
        }
    }

    fn build_search_predicate(&self, params: &SearchParams, include_user_queue: bool) -> SearchFilter {
        SearchFilter {
            text: Self::lower_search_query(&params.query),
            log_types: params.log_types.clone(),
            time_from: params.time_from,
            time_to: params.time_to,
            users: if include_user_queue { params.users.clone() } else { Vec::new() },
            queues: if include_user_queue { params.queues.clone() } else { Vec::new() },
        }
    }

    pub async fn search(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        params: SearchParams,
    ) -> Result<SearchPage, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let start = std::time::Instant::now();

        let cap = if params.export_mode {
            self.config.search_export_page_size_cap
        } else {
            self.config.search_page_size_cap
        };
        let page_size = params
            .page_size
            .unwrap_or(self.config.search_page_size_default)
            .min(cap)
            .max(1);
        let page = params.page.max(1);
        let offset = (page as u64 - 1) * page_size as u64;
        let sort = params.sort.unwrap_or(SortColumn::Timestamp);
        let direction = params.direction;

        let predicate = self.build_search_predicate(&params, true);

        let (entries, total_count) = self
            .store
            .search(cancel, tenant_id, job_id, &predicate, sort, direction, page_size, offset)
            .await?;

        Ok(SearchPage {
            entries,
            total_count,
            took_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub async fn facets(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        query: &str,
    ) -> Result<FacetsResult, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let params = SearchParams {
            query: query.to_string(),
            ..Default::default()
        };
        // Facets intentionally widen beyond user/queue so a facet can surface
        // values a narrowing filter would otherwise hide.
        let predicate = self.build_search_predicate(&params, false);
        let limit = self.config.facet_bucket_limit;

        let mut result = FacetsResult::default();
        for (column, failed_log) in [("log_type", "log_type"), ("user", "user"), ("queue", "queue")] {
            match self.store.facet_counts(cancel, tenant_id, job_id, &predicate, column, limit).await {
                Ok(buckets) => match column {
                    "log_type" => result.log_type = buckets,
                    "user" => result.user = buckets,
                    _ => result.queue = buckets,
                },
                Err(err) => log::warn!("facet {failed_log} failed, skipping: {err}"),
            }
        }
        Ok(result)
    }

    pub async fn autocomplete(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        field: &str,
        prefix: &str,
        limit: Option<u32>,
    ) -> Result<Vec<crate::types::AutocompleteItem>, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        if !whitelist::is_facetable_column(field) {
            return Err(AnalyticsError::UnknownField {
                operation: "autocomplete",
                field: field.to_string(),
            });
        }
        let limit = limit
            .unwrap_or(self.config.autocomplete_limit_default)
            .min(self.config.autocomplete_limit_cap)
            .max(1);
        let pattern = sanitize::prefix_pattern(prefix);
        self.store.autocomplete(cancel, tenant_id, job_id, field, &pattern, limit).await
    }

    pub async fn top_n(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        log_type: LogType,
        top_n: i64,
    ) -> Result<Vec<TopNEntry>, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let top_n = if top_n <= 0 { self.config.top_n_default } else { top_n as u32 };
        self.store.top_n(cancel, tenant_id, job_id, log_type, top_n).await
    }

    pub async fn time_series(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<TimeSeriesPoint>, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        self.store.time_series(cancel, tenant_id, job_id).await
    }

    pub async fn aggregates(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<AggregatesResult, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let by_form = self.store.aggregate(cancel, tenant_id, job_id, LogType::Api, "form").await?;
        let by_sql_table = self
            .store
            .aggregate(cancel, tenant_id, job_id, LogType::Sql, "sql_table")
            .await?;
        let by_filter_name = self
            .store
            .aggregate(cancel, tenant_id, job_id, LogType::Fltr, "filter_name")
            .await?;

        Ok(AggregatesResult {
            by_form: omit_if_empty(by_form),
            by_sql_table: omit_if_empty(by_sql_table),
            by_filter_name: omit_if_empty(by_filter_name),
        })
    }

    pub async fn gaps(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<GapsResult, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let gaps = self.store.gaps(cancel, tenant_id, job_id, self.config.gaps_top_n).await?;
        let queue_health = self.store.queue_health(cancel, tenant_id, job_id).await?;
        Ok(GapsResult { gaps, queue_health })
    }

    pub async fn thread_stats(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<Vec<ThreadStat>, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        self.store.thread_stats(cancel, tenant_id, job_id).await
    }

    pub async fn filter_complexity(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<FilterComplexity, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        self.store
            .filter_complexity(
                cancel,
                tenant_id,
                job_id,
                self.config.filter_top_count,
                self.config.filter_combo_count,
            )
            .await
    }

    pub async fn histogram(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
    ) -> Result<Vec<crate::types::HistogramBucket>, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let bucket_sql = crate::histogram::bucket_interval_sql(time_to - time_from);
        self.store
            .histogram(cancel, tenant_id, job_id, time_from, time_to, bucket_sql)
            .await
    }

    pub async fn context_window(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        entry_id: &str,
        window: Option<u32>,
    ) -> Result<ContextWindow, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let window = window
            .unwrap_or(self.config.context_window_default)
            .min(self.config.context_window_cap)
            .max(1);

        let target = self.store.get_entry(cancel, tenant_id, job_id, entry_id).await?;
        let low = target.line_number.saturating_sub(window);
        let high = target.line_number.saturating_add(window);
        let mut window_entries = self
            .store
            .entries_in_line_range(cancel, tenant_id, job_id, low, high)
            .await?;
        window_entries.retain(|e| e.entry_id != target.entry_id);

        let before = window_entries.iter().filter(|e| e.line_number < target.line_number).cloned().collect();
        let after = window_entries.into_iter().filter(|e| e.line_number > target.line_number).collect();

        Ok(ContextWindow { before, target, after })
    }

    pub async fn transactions(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
        filter: TransactionFilter,
        limit: Option<u32>,
    ) -> Result<Vec<TransactionGroup>, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let limit = limit
            .unwrap_or(self.config.transactions_limit_default)
            .min(self.config.transactions_limit_cap)
            .max(1);
        self.store.transactions(cancel, tenant_id, job_id, &filter, limit).await
    }

    pub async fn job_time_range(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<JobTimeRange, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        self.store.job_time_range(cancel, tenant_id, job_id).await
    }

    pub async fn health_score(
        &self,
        cancel: &CancellationToken,
        tenant_id: &str,
        job_id: &str,
    ) -> Result<HealthScore, AnalyticsError> {
        Self::check_tenant(tenant_id)?;
        let (error_rate, avg_duration_ms) = self
            .store
            .overall_error_rate_and_avg_duration(cancel, tenant_id, job_id)
            .await?;
        let max_thread_busy_pct = self.store.max_thread_busy_pct(cancel, tenant_id, job_id).await?;
        let max_gap_s = self.store.max_gap_seconds(cancel, tenant_id, job_id).await?;

        Ok(health::compute(HealthFactors {
            error_rate,
            avg_duration_ms,
            max_thread_busy_pct,
            max_gap_s,
        }))
    }
}

fn omit_if_empty(section: crate::types::AggregateSection) -> Option<crate::types::AggregateSection> {
    if section.groups.is_empty() {
        None
    } else {
        Some(section)
    }
}

/// Surfaced for callers that need to distinguish a KQL syntax failure from
/// a genuine store failure around the search fallback.
pub fn is_kql_syntax_error(query: &str) -> Option<KqlError> {
    remedy_kql::parse(query).err()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use remedy_core::{LogEntry, LogType};

    use super::*;
    use crate::testing::InMemoryStore;

    fn entry(tenant: &str, job: &str, entry_id: &str, log_type: LogType, ts: DateTime<Utc>, duration_ms: u32) -> LogEntry {
        let mut e = LogEntry::blank(log_type, ts);
        e.tenant_id = tenant.into();
        e.job_id = job.into();
        e.entry_id = entry_id.into();
        e.line_number = 1;
        e.duration_ms = duration_ms;
        e
    }

    fn engine(entries: Vec<LogEntry>) -> AnalyticsEngine<InMemoryStore> {
        AnalyticsEngine::new(InMemoryStore::seed(entries), AnalyticsConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    const TENANT_A: &str = "550e8400-e29b-41d4-a716-446655440000";
    const TENANT_B: &str = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";

    // Scenario 1 — tenant isolation.
    #[tokio::test]
    async fn tenant_isolation_keeps_same_entry_id_separate_per_tenant() {
        let e = engine(vec![
            entry(TENANT_A, "job-1", "e1", LogType::Api, t0(), 10),
            entry(TENANT_B, "job-1", "e1", LogType::Api, t0(), 20),
        ]);
        let cancel = CancellationToken::new();

        let a = e.store.get_entry(&cancel, TENANT_A, "job-1", "e1").await.unwrap();
        let b = e.store.get_entry(&cancel, TENANT_B, "job-1", "e1").await.unwrap();

        assert_eq!(a.tenant_id.as_str(), TENANT_A);
        assert_eq!(b.tenant_id.as_str(), TENANT_B);
        assert_ne!(a.duration_ms, b.duration_ms);
    }

    // Scenario 2 — search + KQL.
    #[tokio::test]
    async fn search_with_kql_filters_by_type_and_duration() {
        let e = engine(vec![
            entry(TENANT_A, "j", "e1", LogType::Api, t0(), 50),
            entry(TENANT_A, "j", "e2", LogType::Api, t0(), 500),
            entry(TENANT_A, "j", "e3", LogType::Sql, t0(), 5000),
        ]);
        let cancel = CancellationToken::new();
        let page = e
            .search(
                &cancel,
                TENANT_A,
                "j",
                SearchParams { query: "type:API AND duration:>1000".into(), ..Default::default() },
            )
            .await
            .unwrap();

        assert_eq!(page.total_count, 0);
        assert!(page.entries.is_empty());

        // Durations {50, 500, 5000} with type:SQL AND duration:>1000 should hit e3.
        let page = e
            .search(
                &cancel,
                TENANT_A,
                "j",
                SearchParams { query: "type:SQL AND duration:>1000".into(), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.entries[0].entry_id.as_str(), "e3");
        assert_eq!(page.entries[0].duration_ms, 5000);
    }

    // Scenario 3 — gaps.
    #[tokio::test]
    async fn gaps_orders_largest_gap_first() {
        let base = t0();
        let e = engine(vec![
            entry(TENANT_A, "j", "e1", LogType::Api, base, 10),
            entry(TENANT_A, "j", "e2", LogType::Api, base + Duration::milliseconds(100), 10),
            entry(TENANT_A, "j", "e3", LogType::Api, base + Duration::milliseconds(10_100), 10),
        ]);
        let cancel = CancellationToken::new();
        let result = e.gaps(&cancel, TENANT_A, "j").await.unwrap();

        assert_eq!(result.gaps.len(), 2);
        assert!((result.gaps[0].gap_ms - 9_900).abs() <= 1);
        assert_eq!(result.gaps[1].gap_ms, 100);
    }

    // Scenario 4 — histogram bucketing.
    #[tokio::test]
    async fn histogram_over_two_minutes_buckets_at_five_seconds() {
        let base = t0();
        let e = engine(vec![
            entry(TENANT_A, "j", "e1", LogType::Api, base, 10),
            entry(TENANT_A, "j", "e2", LogType::Api, base + Duration::seconds(30), 10),
            entry(TENANT_A, "j", "e3", LogType::Api, base + Duration::seconds(90), 10),
        ]);
        let cancel = CancellationToken::new();
        let buckets = e.histogram(&cancel, TENANT_A, "j", base, base + Duration::minutes(2)).await.unwrap();

        assert_eq!(crate::histogram::bucket_interval_sql(Duration::minutes(2)), "5 SECOND");
        let non_empty = buckets.iter().filter(|b| b.total_count > 0).count();
        assert!(non_empty >= 3, "expected at least 3 non-empty buckets, got {non_empty}");
    }

    // Scenario 6 — top-N ordering.
    #[tokio::test]
    async fn top_n_ranks_by_duration_descending() {
        let e = engine(vec![
            entry(TENANT_A, "j", "e1", LogType::Api, t0(), 50),
            entry(TENANT_A, "j", "e2", LogType::Api, t0(), 500),
            entry(TENANT_A, "j", "e3", LogType::Api, t0(), 5000),
        ]);
        let cancel = CancellationToken::new();
        let top = e.top_n(&cancel, TENANT_A, "j", LogType::Api, 2).await.unwrap();

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].rank, 1);
        assert_eq!(top[0].entry.duration_ms, 5000);
        assert_eq!(top[1].rank, 2);
        assert_eq!(top[1].entry.duration_ms, 500);
    }

    // Invariant — page_size never exceeds the configured cap.
    #[tokio::test]
    async fn search_page_size_is_clamped_to_cap() {
        let entries: Vec<LogEntry> =
            (0..10u32).map(|i| entry(TENANT_A, "j", &format!("e{i}"), LogType::Api, t0(), i)).collect();
        let e = engine(entries);
        let cancel = CancellationToken::new();
        let page = e
            .search(&cancel, TENANT_A, "j", SearchParams { page_size: Some(3), page: 1, ..Default::default() })
            .await
            .unwrap();

        assert!(page.entries.len() <= 3);
        assert_eq!(page.total_count, 10);
    }

    #[tokio::test]
    async fn invalid_tenant_id_is_rejected_before_any_store_call() {
        let e = engine(vec![]);
        let cancel = CancellationToken::new();
        let err = e.search(&cancel, "not-a-uuid", "j", SearchParams::default()).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidTenant(_)));
    }
}
