/// Tunables the embedding application configures the engine with.
/// There is no file-based config layer here — ingest orchestration and HTTP
/// wiring own that, and pass this struct in.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Ingest bulk-insert batch size; typical range 5,000–20,000.
    pub batch_size: usize,

    pub search_page_size_default: u32,
    pub search_page_size_cap: u32,
    pub search_export_page_size_cap: u32,

    pub autocomplete_limit_default: u32,
    pub autocomplete_limit_cap: u32,

    pub top_n_default: u32,

    pub context_window_default: u32,
    pub context_window_cap: u32,

    pub transactions_limit_default: u32,
    pub transactions_limit_cap: u32,

    pub gaps_top_n: u32,
    pub filter_top_count: u32,
    pub filter_combo_count: u32,
    pub facet_bucket_limit: u32,

    /// Retention for `log_entries`, applied as a table TTL on `timestamp`.
    pub ttl_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            search_page_size_default: 50,
            search_page_size_cap: 500,
            search_export_page_size_cap: 50_000,
            autocomplete_limit_default: 10,
            autocomplete_limit_cap: 50,
            top_n_default: 25,
            context_window_default: 10,
            context_window_cap: 50,
            transactions_limit_default: 50,
            transactions_limit_cap: 100,
            gaps_top_n: 50,
            filter_top_count: 50,
            filter_combo_count: 100,
            facet_bucket_limit: 10,
            ttl_days: 90,
        }
    }
}
