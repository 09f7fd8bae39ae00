//! Booking models, status transitions, and queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Calendar date format used for the `date` column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            "completed" => Some(BookingStatus::Completed),
            _ => None,
        }
    }

    /// Cancelled and completed bookings never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }

    /// Payment status a booking moves to when it is cancelled
    pub fn on_cancel(&self) -> PaymentStatus {
        match self {
            PaymentStatus::Paid => PaymentStatus::Refunded,
            other => *other,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub consultant_id: String,
    /// Calendar day, `YYYY-MM-DD`
    pub date: String,
    /// Zero-padded `HH:MM`
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub payment_status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Booking {
    pub fn status(&self) -> BookingStatus {
        BookingStatus::from_str(&self.status).unwrap_or(BookingStatus::Pending)
    }

    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_str(&self.payment_status).unwrap_or(PaymentStatus::Pending)
    }

    /// Half-open overlap test: `[start, end)` ranges touching at an edge do not overlap.
    /// Times are zero-padded `HH:MM`, so string order is time order.
    pub fn overlaps(&self, start_time: &str, end_time: &str) -> bool {
        self.start_time.as_str() < end_time && self.end_time.as_str() > start_time
    }

    pub async fn create(db: &SqlitePool, new: &NewBooking) -> Result<Booking, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, consultant_id, date, start_time, end_time,
                                  status, payment_status, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.user_id)
        .bind(&new.consultant_id)
        .bind(new.date.format(DATE_FORMAT).to_string())
        .bind(&new.start_time)
        .bind(&new.end_time)
        .bind(BookingStatus::Pending.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .bind(&new.notes)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_for_user(db: &SqlitePool, user_id: &str) -> Result<Vec<Booking>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM bookings WHERE user_id = ? ORDER BY date DESC, start_time DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// Bookings made by a user or held with the consultant profile they own
    pub async fn list_for_user_or_consultant(
        db: &SqlitePool,
        user_id: &str,
        consultant_id: &str,
    ) -> Result<Vec<Booking>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM bookings
            WHERE user_id = ? OR consultant_id = ?
            ORDER BY date DESC, start_time DESC
            "#,
        )
        .bind(user_id)
        .bind(consultant_id)
        .fetch_all(db)
        .await
    }

    pub async fn list_all(db: &SqlitePool) -> Result<Vec<Booking>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM bookings ORDER BY date DESC, start_time DESC")
            .fetch_all(db)
            .await
    }

    /// Bookings of a consultant with `day_start <= date < day_end`, skipping
    /// the given statuses, in start-time order.
    pub async fn list_for_consultant_between(
        db: &SqlitePool,
        consultant_id: &str,
        day_start: NaiveDate,
        day_end: NaiveDate,
        exclude_statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, sqlx::Error> {
        let mut sql = String::from(
            "SELECT * FROM bookings WHERE consultant_id = ? AND date >= ? AND date < ?",
        );
        if !exclude_statuses.is_empty() {
            let placeholders = vec!["?"; exclude_statuses.len()].join(", ");
            sql.push_str(&format!(" AND status NOT IN ({})", placeholders));
        }
        sql.push_str(" ORDER BY date ASC, start_time ASC");

        let mut query = sqlx::query_as::<_, Booking>(&sql)
            .bind(consultant_id)
            .bind(day_start.format(DATE_FORMAT).to_string())
            .bind(day_end.format(DATE_FORMAT).to_string());
        for status in exclude_statuses {
            query = query.bind(status.as_str());
        }

        query.fetch_all(db).await
    }

    /// Move `seen` to a new status and payment status.
    ///
    /// The write only applies while the row still holds the status and
    /// payment status read in `seen`. Returns `None` when another request
    /// changed the booking in between.
    pub async fn set_status(
        db: &SqlitePool,
        seen: &Booking,
        status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE bookings SET status = ?, payment_status = ?, updated_at = ?
            WHERE id = ? AND status = ? AND payment_status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(payment_status.as_str())
        .bind(&now)
        .bind(&seen.id)
        .bind(seen.status().as_str())
        .bind(seen.payment_status().as_str())
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::get_by_id(db, &seen.id).await
    }
}

/// Validated input for a new booking
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: String,
    pub consultant_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub consultant_id: String,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DayQuery {
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub consultant_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: &str, end: &str) -> Booking {
        Booking {
            id: "b1".to_string(),
            user_id: "u1".to_string(),
            consultant_id: "c1".to_string(),
            date: "2026-03-02".to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            status: "confirmed".to_string(),
            payment_status: "pending".to_string(),
            notes: None,
            created_at: "2026-03-01T00:00:00+00:00".to_string(),
            updated_at: "2026-03-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let existing = booking("10:00", "11:00");

        assert!(!existing.overlaps("11:00", "12:00"));
        assert!(!existing.overlaps("09:00", "10:00"));
        assert!(existing.overlaps("10:15", "10:45"));
        assert!(existing.overlaps("09:30", "10:30"));
        assert!(existing.overlaps("10:30", "11:30"));
        assert!(existing.overlaps("09:00", "12:00"));
        assert!(existing.overlaps("10:00", "11:00"));
    }

    #[test]
    fn test_status_transitions() {
        use BookingStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Confirmed.can_transition_to(Pending));
        for terminal in [Cancelled, Completed] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, Cancelled, Completed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_cancel_refunds_paid_bookings_only() {
        assert_eq!(PaymentStatus::Paid.on_cancel(), PaymentStatus::Refunded);
        assert_eq!(PaymentStatus::Pending.on_cancel(), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::Refunded.on_cancel(), PaymentStatus::Refunded);
    }

    async fn stored_booking(db: &SqlitePool) -> Booking {
        use crate::db::{Consultant, CreateConsultantRequest, Role, User};

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

        Booking::create(
            db,
            &NewBooking {
                user_id: client.id,
                consultant_id: consultant.id,
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                start_time: "10:00".to_string(),
                end_time: "11:00".to_string(),
                notes: None,
            },
        )
        .await
        .unwrap()
    }

    /// A cancel that read the booking before a payment landed must not
    /// overwrite the payment with its stale view.
    #[tokio::test]
    async fn test_stale_cancel_loses_to_concurrent_payment() {
        let db = crate::db::init_memory().await.unwrap();
        let booking = stored_booking(&db).await;

        let seen_by_cancel = Booking::get_by_id(&db, &booking.id).await.unwrap().unwrap();
        let seen_by_pay = Booking::get_by_id(&db, &booking.id).await.unwrap().unwrap();

        let paid = Booking::set_status(&db, &seen_by_pay, seen_by_pay.status(), PaymentStatus::Paid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paid.payment_status(), PaymentStatus::Paid);

        let stale = Booking::set_status(
            &db,
            &seen_by_cancel,
            BookingStatus::Cancelled,
            seen_by_cancel.payment_status().on_cancel(),
        )
        .await
        .unwrap();
        assert!(stale.is_none());

        let stored = Booking::get_by_id(&db, &booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Pending);
        assert_eq!(stored.payment_status(), PaymentStatus::Paid);

        // Retrying from a fresh read refunds the payment
        let cancelled = Booking::set_status(
            &db,
            &stored,
            BookingStatus::Cancelled,
            stored.payment_status().on_cancel(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(cancelled.status(), BookingStatus::Cancelled);
        assert_eq!(cancelled.payment_status(), PaymentStatus::Refunded);
    }

    /// A payment that read the booking before it was cancelled must not
    /// bring the booking back.
    #[tokio::test]
    async fn test_stale_payment_loses_to_concurrent_cancel() {
        let db = crate::db::init_memory().await.unwrap();
        let booking = stored_booking(&db).await;

        let seen_by_pay = Booking::get_by_id(&db, &booking.id).await.unwrap().unwrap();
        Booking::set_status(&db, &booking, BookingStatus::Cancelled, PaymentStatus::Pending)
            .await
            .unwrap()
            .unwrap();

        let stale = Booking::set_status(&db, &seen_by_pay, seen_by_pay.status(), PaymentStatus::Paid)
            .await
            .unwrap();
        assert!(stale.is_none());

        let stored = Booking::get_by_id(&db, &booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BookingStatus::Cancelled);
        assert_eq!(stored.payment_status(), PaymentStatus::Pending);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(BookingStatus::from_str("Canceled"), Some(BookingStatus::Cancelled));
        assert_eq!(BookingStatus::from_str("done"), None);
        assert_eq!(PaymentStatus::from_str("PAID"), Some(PaymentStatus::Paid));
        assert_eq!(booking("10:00", "11:00").status(), BookingStatus::Confirmed);
    }
}
