//! Fetch -> extract -> normalize -> sweep -> reconcile, for one facility at a time.

use crate::config::Config;
use crate::error::CrawlError;
use crate::models::{CrawlOutcome, DetailMap, Reservation, SyncCounts};
use crate::normalize::normalize;
use crate::scrapers::{DocumentFetcher, InhaExtractor, ListingFields, RawListingRow};
use crate::store::ReservationStore;
use crate::sync::{reconcile, staleness_boundary, sweep};
use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    fetcher: Arc<dyn DocumentFetcher>,
    store: Arc<dyn ReservationStore>,
    extractor: InhaExtractor,
    facilities: BTreeMap<String, String>,
    /// At most one reconciliation per facility at a time
    running: BTreeMap<String, Mutex<()>>,
    retention_days: u32,
    detail_concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        store: Arc<dyn ReservationStore>,
        facilities: BTreeMap<String, String>,
    ) -> Self {
        let running = facilities
            .keys()
            .map(|name| (name.clone(), Mutex::new(())))
            .collect();
        Self {
            fetcher,
            store,
            extractor: InhaExtractor::default(),
            facilities,
            running,
            retention_days: 1,
            detail_concurrency: 4,
        }
    }

    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn DocumentFetcher>,
        store: Arc<dyn ReservationStore>,
    ) -> Self {
        Self::new(fetcher, store, config.facilities.clone())
            .with_extractor(InhaExtractor::new(config.detail_base_url.clone()))
            .with_retention_days(config.retention_days)
            .with_detail_concurrency(config.fetch.detail_concurrency)
    }

    pub fn with_extractor(mut self, extractor: InhaExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = concurrency.max(1);
        self
    }

    pub fn facilities(&self) -> impl Iterator<Item = &str> {
        self.facilities.keys().map(String::as_str)
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    /// Crawls `facility` relative to the local calendar date.
    pub async fn run(&self, facility: &str) -> CrawlOutcome {
        self.run_on(facility, Local::now().date_naive()).await
    }

    /// Crawls `facility` as if today were `today`. Never fails: errors are
    /// reported through the outcome's `status` and `reason`.
    pub async fn run_on(&self, facility: &str, today: NaiveDate) -> CrawlOutcome {
        match self.crawl(facility, today).await {
            Ok(outcome) => {
                info!("✅ {}", outcome.message);
                outcome
            }
            Err(e) => {
                error!("❌ {}: {}", facility, e);
                CrawlOutcome::error(facility, e.to_string())
            }
        }
    }

    /// Crawls every configured facility on its own task.
    /// Outcomes are returned in facility name order.
    pub async fn run_all(self: Arc<Self>) -> Vec<CrawlOutcome> {
        let today = Local::now().date_naive();
        let names: Vec<String> = self.facilities.keys().cloned().collect();

        let handles: Vec<_> = names
            .iter()
            .map(|name| {
                let orchestrator = Arc::clone(&self);
                let name = name.clone();
                tokio::spawn(async move { orchestrator.run_on(&name, today).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in names.iter().zip(handles) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!("Crawl task for {} did not finish: {}", name, e);
                    outcomes.push(CrawlOutcome::error(name, format!("crawl task failed: {}", e)));
                }
            }
        }
        outcomes
    }

    async fn crawl(&self, facility: &str, today: NaiveDate) -> Result<CrawlOutcome, CrawlError> {
        let url = self
            .facilities
            .get(facility)
            .ok_or_else(|| CrawlError::NoUrlConfigured(facility.to_string()))?;
        let _guard = match self.running.get(facility) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        info!("Fetching reservation listing for {}", facility);
        let html = self.fetcher.fetch(url).await?;
        let rows = self.extractor.extract_listing(&html);
        let boundary = staleness_boundary(today, self.retention_days);

        if rows.is_empty() {
            info!("No reservations listed for {}", facility);
            let outdated = sweep(self.store.as_ref(), facility, &boundary).await?;
            return Ok(CrawlOutcome::ok(facility, 0, 0, SyncCounts::default(), outdated));
        }

        let mut valid = Vec::with_capacity(rows.len());
        let mut malformed = 0;
        for (i, row) in rows.iter().enumerate() {
            match ListingFields::try_from(row) {
                Ok(_) => valid.push(row),
                Err(e) => {
                    warn!("{}: skipping listing row {}: {}", facility, i + 1, e);
                    malformed += 1;
                }
            }
        }

        let details = self.fetch_details(&valid).await;
        let mut fresh: Vec<Reservation> = Vec::with_capacity(valid.len());
        for (row, details) in valid.into_iter().zip(details) {
            match normalize(facility, row, details) {
                Ok(reservation) => fresh.push(reservation),
                Err(e) => {
                    warn!("{}: skipping listing row: {}", facility, e);
                    malformed += 1;
                }
            }
        }
        info!(
            "Normalized {} reservations for {} ({} malformed)",
            fresh.len(),
            facility,
            malformed
        );

        let outdated = sweep(self.store.as_ref(), facility, &boundary).await?;
        let counts = reconcile(self.store.as_ref(), facility, &fresh, malformed == 0).await?;

        Ok(CrawlOutcome::ok(facility, fresh.len(), malformed, counts, outdated))
    }

    /// Print page details for each row, in row order. A failed or missing
    /// print page yields an empty map.
    async fn fetch_details(&self, rows: &[&RawListingRow]) -> Vec<DetailMap> {
        let pending: Vec<_> = rows.iter().map(|row| self.fetch_detail(row)).collect();
        stream::iter(pending)
            .buffered(self.detail_concurrency)
            .collect()
            .await
    }

    async fn fetch_detail(&self, row: &RawListingRow) -> DetailMap {
        let Some(url) = row.detail_url.as_deref() else {
            return DetailMap::new();
        };

        match self.fetcher.fetch(url).await {
            Ok(html) => {
                let details = self.extractor.extract_detail(&html);
                debug!("Fetched {} detail fields from {}", details.len(), url);
                details
            }
            Err(e) => {
                warn!("Detail page unavailable, continuing without it: {}", e);
                DetailMap::new()
            }
        }
    }
}
