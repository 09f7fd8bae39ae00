//! Booking slot availability.
//!
//! A slot is free when no non-cancelled booking of the same consultant on the
//! same day overlaps it. Ranges are half-open, so a booking ending at 10:00
//! does not block one starting at 10:00.

use chrono::{DateTime, NaiveDate};
use thiserror::Error;
use tracing::debug;

use crate::db::{Booking, BookingRepository, BookingStatus, DATE_FORMAT};

/// Statuses that never occupy a slot
pub const NON_BLOCKING_STATUSES: [BookingStatus; 1] = [BookingStatus::Cancelled];

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("Invalid date '{0}': expected YYYY-MM-DD or an RFC 3339 timestamp")]
    InvalidDate(String),

    #[error("Booking lookup failed: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Parse a calendar date, accepting either `YYYY-MM-DD` or an RFC 3339
/// timestamp whose date part is used.
pub fn parse_day(input: &str) -> Result<NaiveDate, AvailabilityError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(trimmed).map(|dt| dt.date_naive()))
        .map_err(|_| AvailabilityError::InvalidDate(input.to_string()))
}

/// The `[day, next day)` boundary a date normalizes to
pub fn day_bounds(day: NaiveDate) -> Result<(NaiveDate, NaiveDate), AvailabilityError> {
    let next = day
        .succ_opt()
        .ok_or_else(|| AvailabilityError::InvalidDate(day.to_string()))?;
    Ok((day, next))
}

/// Bookings that would overlap the requested `[start_time, end_time)` range
pub async fn find_conflicts(
    repo: &dyn BookingRepository,
    consultant_id: &str,
    day: NaiveDate,
    start_time: &str,
    end_time: &str,
) -> Result<Vec<Booking>, AvailabilityError> {
    let (day_start, day_end) = day_bounds(day)?;
    let bookings = repo
        .find_bookings_for_consultant_on_date(
            consultant_id,
            day_start,
            day_end,
            &NON_BLOCKING_STATUSES,
        )
        .await?;

    Ok(bookings
        .into_iter()
        .filter(|b| b.overlaps(start_time, end_time))
        .collect())
}

/// Whether `consultant_id` is free on `day` between `start_time` and `end_time`.
///
/// `start_time < end_time` is the caller's responsibility. Storage failures
/// are returned as errors rather than reported as "unavailable".
pub async fn is_slot_available(
    repo: &dyn BookingRepository,
    consultant_id: &str,
    day: NaiveDate,
    start_time: &str,
    end_time: &str,
) -> Result<bool, AvailabilityError> {
    let conflicts = find_conflicts(repo, consultant_id, day, start_time, end_time).await?;

    debug!(
        consultant_id = consultant_id,
        date = %day,
        start_time = start_time,
        end_time = end_time,
        conflicts = conflicts.len(),
        "Checked slot availability"
    );

    Ok(conflicts.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::db::{Consultant, CreateConsultantRequest, NewBooking, Role, SqliteStore, User};

    /// In-memory booking store with the same filtering contract as SQLite
    #[derive(Default)]
    struct MemoryBookings {
        bookings: Mutex<Vec<Booking>>,
    }

    impl MemoryBookings {
        fn add(&self, consultant_id: &str, date: &str, start: &str, end: &str, status: BookingStatus) {
            let mut bookings = self.bookings.lock().unwrap();
            let id = format!("b{}", bookings.len() + 1);
            bookings.push(Booking {
                id,
                user_id: "u1".to_string(),
                consultant_id: consultant_id.to_string(),
                date: date.to_string(),
                start_time: start.to_string(),
                end_time: end.to_string(),
                status: status.as_str().to_string(),
                payment_status: "pending".to_string(),
                notes: None,
                created_at: "2026-01-01T00:00:00+00:00".to_string(),
                updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            });
        }
    }

    #[async_trait]
    impl BookingRepository for MemoryBookings {
        async fn find_bookings_for_consultant_on_date(
            &self,
            consultant_id: &str,
            day_start: NaiveDate,
            day_end: NaiveDate,
            exclude_statuses: &[BookingStatus],
        ) -> Result<Vec<Booking>, sqlx::Error> {
            let start = day_start.format(DATE_FORMAT).to_string();
            let end = day_end.format(DATE_FORMAT).to_string();
            Ok(self
                .bookings
                .lock()
                .unwrap()
                .iter()
                .filter(|b| b.consultant_id == consultant_id)
                .filter(|b| b.date >= start && b.date < end)
                .filter(|b| !exclude_statuses.contains(&b.status()))
                .cloned()
                .collect())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl BookingRepository for BrokenStore {
        async fn find_bookings_for_consultant_on_date(
            &self,
            _consultant_id: &str,
            _day_start: NaiveDate,
            _day_end: NaiveDate,
            _exclude_statuses: &[BookingStatus],
        ) -> Result<Vec<Booking>, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
    }

    fn day(s: &str) -> NaiveDate {
        parse_day(s).unwrap()
    }

    fn store_with_ten_to_eleven() -> MemoryBookings {
        let store = MemoryBookings::default();
        store.add("c1", "2026-03-02", "10:00", "11:00", BookingStatus::Confirmed);
        store
    }

    #[test]
    fn test_parse_day_accepts_date_and_timestamp() {
        assert_eq!(day("2026-03-02"), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(
            day("2026-03-02T15:30:00+00:00"),
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
        );
        assert!(matches!(
            parse_day("02/03/2026"),
            Err(AvailabilityError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_day_bounds_span_one_day() {
        let (start, end) = day_bounds(day("2026-02-28")).unwrap();
        assert_eq!(start, day("2026-02-28"));
        assert_eq!(end, day("2026-03-01"));
        assert!(day_bounds(NaiveDate::MAX).is_err());
    }

    #[tokio::test]
    async fn test_abutting_requests_are_available() {
        let store = store_with_ten_to_eleven();
        let d = day("2026-03-02");

        assert!(is_slot_available(&store, "c1", d, "11:00", "12:00").await.unwrap());
        assert!(is_slot_available(&store, "c1", d, "09:00", "10:00").await.unwrap());
    }

    #[tokio::test]
    async fn test_overlapping_requests_are_unavailable() {
        let store = store_with_ten_to_eleven();
        let d = day("2026-03-02");

        for (start, end) in [
            ("10:15", "10:45"), // contained
            ("09:30", "10:30"), // overlaps start
            ("10:30", "11:30"), // overlaps end
            ("09:00", "12:00"), // contains
            ("10:00", "11:00"), // identical
        ] {
            assert!(
                !is_slot_available(&store, "c1", d, start, end).await.unwrap(),
                "{}-{} should be unavailable",
                start,
                end
            );
        }
    }

    #[tokio::test]
    async fn test_cancelled_bookings_never_block() {
        let store = MemoryBookings::default();
        store.add("c1", "2026-03-02", "10:00", "11:00", BookingStatus::Cancelled);

        assert!(is_slot_available(&store, "c1", day("2026-03-02"), "10:00", "11:00")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_other_days_and_consultants_do_not_block() {
        let store = store_with_ten_to_eleven();

        assert!(is_slot_available(&store, "c1", day("2026-03-03"), "10:00", "11:00")
            .await
            .unwrap());
        assert!(is_slot_available(&store, "c2", day("2026-03-02"), "10:00", "11:00")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_pending_and_completed_bookings_block() {
        let store = MemoryBookings::default();
        store.add("c1", "2026-03-02", "08:00", "09:00", BookingStatus::Pending);
        store.add("c1", "2026-03-02", "13:00", "14:00", BookingStatus::Completed);
        let d = day("2026-03-02");

        assert!(!is_slot_available(&store, "c1", d, "08:30", "09:30").await.unwrap());
        assert!(!is_slot_available(&store, "c1", d, "13:30", "14:30").await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_failure_is_an_error_not_unavailable() {
        let result = is_slot_available(&BrokenStore, "c1", day("2026-03-02"), "10:00", "11:00").await;
        assert!(matches!(result, Err(AvailabilityError::Storage(_))));
    }

    #[tokio::test]
    async fn test_sequentially_granted_slots_never_overlap() {
        let store = MemoryBookings::default();
        let d = day("2026-03-02");
        let requests = [
            ("09:00", "10:00"),
            ("09:30", "10:30"),
            ("10:00", "11:00"),
            ("10:59", "11:30"),
            ("11:00", "12:00"),
            ("08:00", "13:00"),
            ("12:00", "12:30"),
        ];

        let mut granted: Vec<(&str, &str)> = Vec::new();
        for (start, end) in requests {
            if is_slot_available(&store, "c1", d, start, end).await.unwrap() {
                store.add("c1", "2026-03-02", start, end, BookingStatus::Pending);
                granted.push((start, end));
            }
        }

        assert_eq!(
            granted,
            vec![
                ("09:00", "10:00"),
                ("10:00", "11:00"),
                ("11:00", "12:00"),
                ("12:00", "12:30")
            ]
        );
        for (i, a) in granted.iter().enumerate() {
            for b in granted.iter().skip(i + 1) {
                assert!(!(a.0 < b.1 && a.1 > b.0), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    async fn sqlite_consultant(db: &sqlx::SqlitePool) -> (User, Consultant) {
        let client = User::create(db, "client@example.org", "hash", "Client", Role::User)
            .await
            .unwrap();
        let account = User::create(db, "dr.ng@example.org", "hash", "Dr Ng", Role::Consultant)
            .await
            .unwrap();
        let consultant = Consultant::create(
            db,
            &account.id,
            &CreateConsultantRequest {
                user_id: None,
                title: "Therapist".to_string(),
                specialization: "stress".to_string(),
                bio: None,
                hourly_rate: 0,
            },
        )
        .await
        .unwrap();
        (client, consultant)
    }

    /// Two requests checked before either is stored both see a free slot.
    /// Only the storage guard keeps the second from being written.
    #[tokio::test]
    async fn test_check_then_insert_race_is_caught_by_storage_guard() {
        let db = crate::db::init_memory().await.unwrap();
        let (client, consultant) = sqlite_consultant(&db).await;
        let store = SqliteStore::new(db.clone());
        let d = day("2026-03-02");

        let first = is_slot_available(&store, &consultant.id, d, "10:00", "11:00")
            .await
            .unwrap();
        let second = is_slot_available(&store, &consultant.id, d, "10:30", "11:30")
            .await
            .unwrap();
        assert!(first && second, "both checks pass before any insert");

        let new = |start: &str, end: &str| NewBooking {
            user_id: client.id.clone(),
            consultant_id: consultant.id.clone(),
            date: d,
            start_time: start.to_string(),
            end_time: end.to_string(),
            notes: None,
        };

        Booking::create(&db, &new("10:00", "11:00")).await.unwrap();
        let err = Booking::create(&db, &new("10:30", "11:30")).await.unwrap_err();
        assert!(crate::db::is_overlap_violation(&err));

        // Abutting inserts pass the guard
        Booking::create(&db, &new("11:00", "12:00")).await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_store_ignores_cancelled_bookings() {
        let db = crate::db::init_memory().await.unwrap();
        let (client, consultant) = sqlite_consultant(&db).await;
        let store = SqliteStore::new(db.clone());
        let d = day("2026-03-02");

        let booking = Booking::create(
            &db,
            &NewBooking {
                user_id: client.id.clone(),
                consultant_id: consultant.id.clone(),
                date: d,
                start_time: "14:00".to_string(),
                end_time: "15:00".to_string(),
                notes: None,
            },
        )
        .await
        .unwrap();
        assert!(!is_slot_available(&store, &consultant.id, d, "14:00", "15:00")
            .await
            .unwrap());

        Booking::set_status(
            &db,
            &booking,
            BookingStatus::Cancelled,
            crate::db::PaymentStatus::Pending,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(is_slot_available(&store, &consultant.id, d, "14:00", "15:00")
            .await
            .unwrap());
    }
}
