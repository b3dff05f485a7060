use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw label/value pairs scraped from one print page
pub type DetailMap = BTreeMap<String, String>;

/// A crawled facility: its name and the listing page it is read from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub url: String,
}

/// Dedup/upsert key of a reservation, derived from its content
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observed booking of a facility
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub facility: String,
    pub key: IdentityKey,
    /// `YYYY-MM-DD`, or the raw start token when it could not be parsed
    pub date: String,
    pub place: String,
    pub department: String,
    pub event: String,
    pub approval: String,
    /// Print page URL, empty when the row had no action link
    pub detail_url: String,
    pub details: DetailMap,
}

impl Reservation {
    /// Returns the record `existing` should become after observing `self`,
    /// or `None` when nothing changed.
    ///
    /// Detail attributes are merged: keys present in `self` win, keys only
    /// present in `existing` are kept.
    pub fn merged_over(&self, existing: &Reservation) -> Option<Reservation> {
        let mut details = existing.details.clone();
        details.extend(self.details.iter().map(|(k, v)| (k.clone(), v.clone())));

        let merged = Reservation {
            facility: existing.facility.clone(),
            key: existing.key.clone(),
            date: existing.date.clone(),
            place: self.place.clone(),
            department: self.department.clone(),
            event: self.event.clone(),
            approval: self.approval.clone(),
            detail_url: self.detail_url.clone(),
            details,
        };

        if &merged == existing {
            None
        } else {
            Some(merged)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Ok,
    Error,
}

/// Per-run counters produced by the reconciler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
}

/// Summary of one orchestrator run for one facility
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub status: CrawlStatus,
    pub facility: String,
    pub total_found: usize,
    pub saved_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub deleted_count: usize,
    pub outdated_deleted_count: usize,
    pub malformed_count: usize,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

impl CrawlOutcome {
    pub fn ok(
        facility: &str,
        total_found: usize,
        malformed: usize,
        counts: SyncCounts,
        outdated_deleted: usize,
    ) -> Self {
        let message = if total_found == 0 {
            "No reservations found.".to_string()
        } else {
            format!(
                "{}: {} saved, {} updated, {} skipped, {} deleted, {} outdated deleted.",
                facility,
                counts.created,
                counts.updated,
                counts.skipped,
                counts.deleted,
                outdated_deleted
            )
        };

        Self {
            status: CrawlStatus::Ok,
            facility: facility.to_string(),
            total_found,
            saved_count: counts.created,
            updated_count: counts.updated,
            skipped_count: counts.skipped,
            deleted_count: counts.deleted,
            outdated_deleted_count: outdated_deleted,
            malformed_count: malformed,
            message,
            reason: None,
        }
    }

    /// A failed run; all counters are zero.
    pub fn error(facility: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            status: CrawlStatus::Error,
            facility: facility.to_string(),
            total_found: 0,
            saved_count: 0,
            updated_count: 0,
            skipped_count: 0,
            deleted_count: 0,
            outdated_deleted_count: 0,
            malformed_count: 0,
            message: format!("{}: crawl failed", facility),
            reason: Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CrawlStatus::Ok
    }
}
