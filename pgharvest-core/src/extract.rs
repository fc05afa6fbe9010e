//! Paginated row extraction through the data API.
//!
//! Pages are requested as `[offset, offset + page_size)` windows until one
//! comes back short. There is no total-count query and no snapshot: rows
//! inserted behind the cursor during extraction are never seen, and deletes
//! can shift rows across page boundaries.
//!
//! Without an ordering, PostgreSQL may return an unordered scan in a
//! different order for each page (synchronized sequential scans do this on
//! large tables), so pages can overlap or skip rows. Callers that know the
//! primary key pass it to [`RowExtractor::extract_table_ordered`].

use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::error::HarvestError;
use crate::models::{ExtractedRow, TableDescriptor};
use crate::source::DataApi;
use crate::Result;
use std::sync::Arc;

/// Rows requested per page.
pub const PAGE_SIZE: usize = DEFAULT_PAGE_SIZE;

/// Reads whole tables page by page.
pub struct RowExtractor {
    api: Arc<dyn DataApi>,
    page_size: usize,
}

impl RowExtractor {
    /// Creates an extractor with [`PAGE_SIZE`] rows per page.
    pub fn new(api: Arc<dyn DataApi>) -> Self {
        Self {
            api,
            page_size: PAGE_SIZE,
        }
    }

    /// Overrides the page size, clamped to `1..=MAX_PAGE_SIZE`.
    ///
    /// A page the API truncated would look like the last one, so sizes
    /// above the API's row cap are never requested.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Returns the configured page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetches every row of `table` in fetch order, without an ordering.
    ///
    /// # Errors
    /// Returns [`HarvestError::Extraction`] wrapping the first failed page
    /// request. Rows fetched before the failure are discarded.
    pub async fn extract_table(&self, table: &TableDescriptor) -> Result<Vec<ExtractedRow>> {
        self.extract_table_ordered(table, &[]).await
    }

    /// Fetches every row of `table`, paging in ascending `order_by` order.
    ///
    /// # Errors
    /// Returns [`HarvestError::Extraction`] wrapping the first failed page
    /// request
    pub async fn extract_table_ordered(
        &self,
        table: &TableDescriptor,
        order_by: &[String],
    ) -> Result<Vec<ExtractedRow>> {
        let mut rows = Vec::new();
        let mut offset = 0usize;

        loop {
            let page = self
                .api
                .select_range(table, order_by, offset, self.page_size)
                .await
                .map_err(|e| HarvestError::extraction_failed(&table.name, e))?;

            let fetched = page.len();
            rows.extend(page);
            tracing::debug!(
                "Fetched {} rows of {} at offset {} ({} total)",
                fetched,
                table.qualified(),
                offset,
                rows.len()
            );

            if fetched < self.page_size {
                break;
            }
            offset = offset.saturating_add(self.page_size);
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves `total` numbered rows and records every requested window.
    struct CountingApi {
        total: usize,
        fail_at_offset: Option<usize>,
        /// Server-side `max-rows`: pages never exceed it
        row_cap: Option<usize>,
        requests: Mutex<Vec<(usize, usize)>>,
        orders: Mutex<Vec<Vec<String>>>,
    }

    impl CountingApi {
        fn new(total: usize) -> Self {
            Self {
                total,
                fail_at_offset: None,
                row_cap: None,
                requests: Mutex::new(Vec::new()),
                orders: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(usize, usize)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DataApi for CountingApi {
        async fn call_procedure(&self, _name: &str) -> Result<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }

        async fn select_range(
            &self,
            _table: &TableDescriptor,
            order_by: &[String],
            offset: usize,
            limit: usize,
        ) -> Result<Vec<ExtractedRow>> {
            self.requests.lock().unwrap().push((offset, limit));
            self.orders.lock().unwrap().push(order_by.to_vec());
            if self.fail_at_offset == Some(offset) {
                return Err(HarvestError::api(500, "statement timeout"));
            }

            let limit = self.row_cap.map_or(limit, |cap| limit.min(cap));
            let end = (offset + limit).min(self.total);
            Ok((offset..end)
                .map(|i| {
                    let mut row = ExtractedRow::new();
                    row.insert("id".to_string(), FieldValue::from(i as i64));
                    row
                })
                .collect())
        }
    }

    async fn extract(api: &Arc<CountingApi>, page_size: usize) -> Result<Vec<ExtractedRow>> {
        RowExtractor::new(api.clone())
            .with_page_size(page_size)
            .extract_table(&TableDescriptor::new("items"))
            .await
    }

    #[tokio::test]
    async fn test_partial_last_page_stops() {
        let api = Arc::new(CountingApi::new(2500));
        let rows = extract(&api, PAGE_SIZE).await.unwrap();

        assert_eq!(rows.len(), 2500);
        assert_eq!(api.requests(), vec![(0, 1000), (1000, 1000), (2000, 1000)]);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let api = Arc::new(CountingApi::new(2000));
        let rows = extract(&api, PAGE_SIZE).await.unwrap();

        assert_eq!(rows.len(), 2000);
        assert_eq!(api.requests(), vec![(0, 1000), (1000, 1000), (2000, 1000)]);
    }

    #[tokio::test]
    async fn test_empty_table_single_request() {
        let api = Arc::new(CountingApi::new(0));
        let rows = extract(&api, PAGE_SIZE).await.unwrap();

        assert!(rows.is_empty());
        assert_eq!(api.requests(), vec![(0, 1000)]);
    }

    #[tokio::test]
    async fn test_rows_keep_fetch_order() {
        let api = Arc::new(CountingApi::new(7));
        let rows = extract(&api, 3).await.unwrap();

        let ids: Vec<FieldValue> = rows.iter().map(|row| row["id"].clone()).collect();
        let expected: Vec<FieldValue> = (0..7_i64).map(FieldValue::from).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_failure_is_wrapped_with_table_name() {
        let api = Arc::new(CountingApi {
            fail_at_offset: Some(1000),
            ..CountingApi::new(5000)
        });

        let error = extract(&api, PAGE_SIZE).await.unwrap_err();
        match error {
            HarvestError::Extraction { table, source } => {
                assert_eq!(table, "items");
                assert!(matches!(*source, HarvestError::Api { status: 500, .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_ordering_is_sent_with_every_page() {
        let api = Arc::new(CountingApi::new(1500));
        let order_by = vec!["id".to_string()];

        RowExtractor::new(api.clone())
            .extract_table_ordered(&TableDescriptor::new("items"), &order_by)
            .await
            .unwrap();

        let orders = api.orders.lock().unwrap().clone();
        assert_eq!(orders, vec![order_by.clone(), order_by]);
    }

    #[test]
    fn test_page_size_is_clamped() {
        let api = Arc::new(CountingApi::new(0));
        assert_eq!(RowExtractor::new(api.clone()).with_page_size(0).page_size(), 1);
        assert_eq!(
            RowExtractor::new(api).with_page_size(5000).page_size(),
            MAX_PAGE_SIZE
        );
    }

    #[tokio::test]
    async fn test_oversized_page_request_cannot_truncate_table() {
        let api = Arc::new(CountingApi {
            row_cap: Some(1000),
            ..CountingApi::new(3000)
        });

        let rows = extract(&api, 5000).await.unwrap();
        assert_eq!(rows.len(), 3000);
    }
}
