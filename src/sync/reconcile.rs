use crate::error::StoreError;
use crate::models::{IdentityKey, Reservation, SyncCounts};
use crate::store::ReservationStore;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, info};

/// Converges the stored reservations of `facility` to `fresh`.
///
/// Records are matched by identity key: unknown keys are inserted, changed
/// records are overwritten in place, identical ones are left alone. Afterwards,
/// stored records on the cohort date (latest canonical `YYYY-MM-DD` date in
/// `fresh`) whose key was not observed are deleted. Raw date tokens never
/// become the cohort. Pass `complete = false` when `fresh` may be missing
/// rows; deletion is then skipped.
pub async fn reconcile(
    store: &dyn ReservationStore,
    facility: &str,
    fresh: &[Reservation],
    complete: bool,
) -> Result<SyncCounts, StoreError> {
    let mut counts = SyncCounts::default();
    let mut crawled: HashSet<&IdentityKey> = HashSet::with_capacity(fresh.len());

    for record in fresh {
        if !crawled.insert(&record.key) {
            debug!("Duplicate row {} / {} in listing, skipping", record.date, record.event);
            counts.skipped += 1;
            continue;
        }

        match store.get(facility, &record.key).await? {
            None => {
                store.put(record).await?;
                debug!("Created {} {} ({})", record.date, record.event, record.key);
                counts.created += 1;
            }
            Some(existing) => match record.merged_over(&existing) {
                Some(merged) => {
                    store.put(&merged).await?;
                    debug!("Updated {} {} ({})", record.date, record.event, record.key);
                    counts.updated += 1;
                }
                None => counts.skipped += 1,
            },
        }
    }

    let Some(cohort) = cohort_date(fresh) else {
        debug!("{}: no canonical date in listing, nothing to delete", facility);
        return Ok(counts);
    };

    if !complete {
        info!(
            "{}: listing was incomplete, not deleting unseen reservations on {}",
            facility, cohort
        );
        return Ok(counts);
    }

    for stored in store.query_by_source_and_date(facility, cohort).await? {
        if crawled.contains(&stored.key) {
            continue;
        }
        if store.delete(facility, &stored.key).await? {
            debug!("Deleted vanished {} {} ({})", stored.date, stored.event, stored.key);
            counts.deleted += 1;
        }
    }

    Ok(counts)
}

/// Latest date among `fresh` that parses as `YYYY-MM-DD`
fn cohort_date(fresh: &[Reservation]) -> Option<&str> {
    fresh
        .iter()
        .map(|r| r.date.as_str())
        .filter(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetailMap;
    use crate::normalize::identity_key;
    use crate::store::MemoryStore;

    fn record(date: &str, event: &str, approval: &str) -> Reservation {
        Reservation {
            facility: "대강당".to_string(),
            key: identity_key("대강당", date, "1관", event),
            date: date.to_string(),
            place: "1관".to_string(),
            department: "총학생회".to_string(),
            event: event.to_string(),
            approval: approval.to_string(),
            detail_url: String::new(),
            details: DetailMap::new(),
        }
    }

    #[tokio::test]
    async fn create_skip_update_cycle() {
        let store = MemoryStore::new();
        let first = vec![record("2025-06-01", "체육대회", "승인")];

        let counts = reconcile(&store, "대강당", &first, true).await.unwrap();
        assert_eq!(counts, SyncCounts { created: 1, ..Default::default() });

        let counts = reconcile(&store, "대강당", &first, true).await.unwrap();
        assert_eq!(counts, SyncCounts { skipped: 1, ..Default::default() });

        let changed = vec![record("2025-06-01", "체육대회", "반려")];
        let counts = reconcile(&store, "대강당", &changed, true).await.unwrap();
        assert_eq!(counts, SyncCounts { updated: 1, ..Default::default() });

        let stored = store.get("대강당", &changed[0].key).await.unwrap().unwrap();
        assert_eq!(stored.approval, "반려");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn deletes_only_unseen_records_on_cohort_date() {
        let store = MemoryStore::new();
        let old = record("2025-05-31", "지난행사", "승인");
        let gone = record("2025-06-01", "취소된행사", "승인");
        let kept = record("2025-06-01", "체육대회", "승인");
        for r in [&old, &gone, &kept] {
            store.put(r).await.unwrap();
        }

        let counts = reconcile(&store, "대강당", &[kept.clone()], true).await.unwrap();
        assert_eq!(counts.deleted, 1);
        assert_eq!(counts.skipped, 1);

        assert!(store.get("대강당", &gone.key).await.unwrap().is_none());
        assert!(store.get("대강당", &old.key).await.unwrap().is_some());
        assert!(store.get("대강당", &kept.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn other_facilities_are_untouched() {
        let store = MemoryStore::new();
        let mut foreign = record("2025-06-01", "다른행사", "승인");
        foreign.facility = "소강당".to_string();
        foreign.key = identity_key("소강당", "2025-06-01", "1관", "다른행사");
        store.put(&foreign).await.unwrap();

        let fresh = vec![record("2025-06-01", "체육대회", "승인")];
        let counts = reconcile(&store, "대강당", &fresh, true).await.unwrap();
        assert_eq!(counts.deleted, 0);
        assert!(store.get("소강당", &foreign.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn incomplete_listing_never_deletes() {
        let store = MemoryStore::new();
        let unseen = record("2025-06-01", "취소된행사", "승인");
        store.put(&unseen).await.unwrap();

        let fresh = vec![record("2025-06-01", "체육대회", "승인")];
        let counts = reconcile(&store, "대강당", &fresh, false).await.unwrap();
        assert_eq!(counts.created, 1);
        assert_eq!(counts.deleted, 0);
        assert!(store.get("대강당", &unseen.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_preserves_details_not_rederived() {
        let store = MemoryStore::new();
        let mut stored = record("2025-06-01", "체육대회", "승인");
        stored.details.insert("contact".to_string(), "032-860-0000".to_string());
        stored.details.insert("start_time".to_string(), "09:00".to_string());
        store.put(&stored).await.unwrap();

        // Print page could not be fetched this time
        let mut fresh = record("2025-06-01", "체육대회", "반려");
        fresh.details.insert("start_time".to_string(), "10:00".to_string());

        let counts = reconcile(&store, "대강당", &[fresh], true).await.unwrap();
        assert_eq!(counts.updated, 1);

        let details = store.details("대강당", &stored.key).await.unwrap();
        assert_eq!(details.get("contact").unwrap(), "032-860-0000");
        assert_eq!(details.get("start_time").unwrap(), "10:00");
    }

    #[tokio::test]
    async fn duplicate_rows_collapse_to_one_record() {
        let store = MemoryStore::new();
        let row = record("2025-06-01", "체육대회", "승인");

        let counts = reconcile(&store, "대강당", &[row.clone(), row.clone()], true)
            .await
            .unwrap();
        assert_eq!(counts.created, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn raw_date_tokens_do_not_take_over_the_cohort() {
        let store = MemoryStore::new();
        let gone = record("2025-06-01", "취소된행사", "승인");
        store.put(&gone).await.unwrap();

        let fresh = vec![
            record("2025-06-01", "체육대회", "승인"),
            record("미정", "추후공지", "대기"),
        ];
        let counts = reconcile(&store, "대강당", &fresh, true).await.unwrap();
        assert_eq!(counts.created, 2);
        assert_eq!(counts.deleted, 1);
        assert!(store.get("대강당", &gone.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_raw_dates_never_delete() {
        let store = MemoryStore::new();
        let unseen = record("미정", "다른행사", "승인");
        store.put(&unseen).await.unwrap();

        let fresh = vec![record("미정", "추후공지", "대기")];
        let counts = reconcile(&store, "대강당", &fresh, true).await.unwrap();
        assert_eq!(counts.created, 1);
        assert_eq!(counts.deleted, 0);
        assert!(store.get("대강당", &unseen.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let store = MemoryStore::new();
        store.put(&record("2025-06-01", "체육대회", "승인")).await.unwrap();

        let counts = reconcile(&store, "대강당", &[], true).await.unwrap();
        assert_eq!(counts, SyncCounts::default());
        assert_eq!(store.len(), 1);
    }
}
