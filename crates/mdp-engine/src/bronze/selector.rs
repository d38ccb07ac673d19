//! Bronze record selection
//!
//! Picks the authoritative record for a partition: the most recently
//! received success. Pure and deterministic regardless of input order, so
//! re-running silver derivation always sees the same choice.

use crate::pipeline::types::BronzeRecord;

/// Select the authoritative bronze record among a partition's attempts
///
/// Filters to 2xx responses and returns the one with the greatest
/// `receive_dttm`; ties are broken by `request_uuid` ordering for
/// reproducibility. Returns `None` when no success exists yet, which the
/// silver stage treats as a clean skip, not an error.
pub fn select_best(records: &[BronzeRecord]) -> Option<&BronzeRecord> {
    records
        .iter()
        .filter(|r| r.is_success())
        .max_by_key(|r| (r.receive_dttm, r.request_uuid))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn record(code: i32, receive_dttm: DateTime<Utc>, request_uuid: Uuid) -> BronzeRecord {
        BronzeRecord {
            request_uuid,
            target: "orders".to_string(),
            tenant_id: Uuid::nil(),
            business_dttm: "2024-01-01T00:00:00Z".parse().unwrap(),
            send_dttm: receive_dttm,
            response_dttm: receive_dttm,
            receive_dttm,
            response_code: code,
            response_body: String::new(),
            request_parameters: json!({}),
            request_body: None,
            run_uuid: Uuid::nil(),
            run_dttm: receive_dttm,
            run_schedule_dttm: receive_dttm,
            inserted_at: receive_dttm,
        }
    }

    #[test]
    fn test_latest_success_wins_and_non_2xx_excluded() {
        let t1: DateTime<Utc> = "2024-01-01T01:00:00Z".parse().unwrap();
        let t2 = t1 + TimeDelta::hours(1);
        let t3 = t2 + TimeDelta::hours(1);

        let records = vec![
            record(200, t1, Uuid::new_v4()),
            record(429, t2, Uuid::new_v4()),
            record(200, t3, Uuid::new_v4()),
        ];

        // The 429 at t2 is excluded even though it is newer than t1.
        let best = select_best(&records).unwrap();
        assert_eq!(best.receive_dttm, t3);

        // Input order must not matter.
        let mut reversed = records.clone();
        reversed.reverse();
        assert_eq!(
            select_best(&reversed).unwrap().request_uuid,
            best.request_uuid
        );
    }

    #[test]
    fn test_all_failures_yield_none() {
        let t1: DateTime<Utc> = "2024-01-01T01:00:00Z".parse().unwrap();
        let records = vec![
            record(429, t1, Uuid::new_v4()),
            record(500, t1 + TimeDelta::hours(1), Uuid::new_v4()),
            record(504, t1 + TimeDelta::hours(2), Uuid::new_v4()),
        ];
        assert!(select_best(&records).is_none());
    }

    #[test]
    fn test_empty_partition_yields_none() {
        assert!(select_best(&[]).is_none());
    }

    #[test]
    fn test_receive_time_tie_broken_by_request_uuid() {
        let t: DateTime<Utc> = "2024-01-01T01:00:00Z".parse().unwrap();
        let low = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let high = Uuid::parse_str("ffffffff-ffff-ffff-ffff-fffffffffffe").unwrap();

        let a = vec![record(200, t, low), record(200, t, high)];
        let b = vec![record(200, t, high), record(200, t, low)];

        assert_eq!(select_best(&a).unwrap().request_uuid, high);
        assert_eq!(select_best(&b).unwrap().request_uuid, high);
    }
}
