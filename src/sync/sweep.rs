use crate::error::StoreError;
use crate::store::ReservationStore;
use chrono::{Duration, NaiveDate};
use tracing::debug;

/// First date that is still retained: `today - retention_days`, as `YYYY-MM-DD`.
pub fn staleness_boundary(today: NaiveDate, retention_days: u32) -> String {
    (today - Duration::days(i64::from(retention_days)))
        .format("%Y-%m-%d")
        .to_string()
}

/// Deletes every reservation of `facility` dated strictly before `before`.
pub async fn sweep(
    store: &dyn ReservationStore,
    facility: &str,
    before: &str,
) -> Result<usize, StoreError> {
    let mut deleted = 0;
    for stale in store.query_by_source_and_date_before(facility, before).await? {
        if store.delete(facility, &stale.key).await? {
            debug!("Swept outdated {} {} ({})", stale.date, stale.event, stale.key);
            deleted += 1;
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetailMap, Reservation};
    use crate::normalize::identity_key;
    use crate::store::MemoryStore;

    fn record(date: &str) -> Reservation {
        Reservation {
            facility: "대강당".to_string(),
            key: identity_key("대강당", date, "1관", "행사"),
            date: date.to_string(),
            place: "1관".to_string(),
            department: "총학생회".to_string(),
            event: "행사".to_string(),
            approval: "승인".to_string(),
            detail_url: String::new(),
            details: DetailMap::from([("note".to_string(), "x".to_string())]),
        }
    }

    #[test]
    fn boundary_is_yesterday_by_default() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(staleness_boundary(today, 1), "2025-02-28");
        assert_eq!(staleness_boundary(today, 0), "2025-03-01");
    }

    #[tokio::test]
    async fn removes_strictly_older_records() {
        let store = MemoryStore::new();
        for date in ["2025-05-30", "2025-05-31", "2025-06-01"] {
            store.put(&record(date)).await.unwrap();
        }

        let deleted = sweep(&store, "대강당", "2025-05-31").await.unwrap();
        assert_eq!(deleted, 1);

        let stale = record("2025-05-30");
        assert!(store.get("대강당", &stale.key).await.unwrap().is_none());
        assert!(store.details("대강당", &stale.key).await.unwrap().is_empty());
        assert_eq!(store.len(), 2);
    }
}
