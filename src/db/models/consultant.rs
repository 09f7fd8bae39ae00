//! Consultant profile models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

const SELECT_WITH_USER: &str = r#"
    SELECT c.id, c.user_id, u.name AS name, u.email AS email, c.title, c.specialization,
           c.bio, c.hourly_rate, c.is_active, c.created_at, c.updated_at
    FROM consultants c
    JOIN users u ON u.id = c.user_id
"#;

/// Consultant profile joined with the owning account's name and email
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Consultant {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub title: String,
    pub specialization: String,
    pub bio: Option<String>,
    /// Minor currency units per hour
    pub hourly_rate: i64,
    pub is_active: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultantResponse {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub title: String,
    pub specialization: String,
    pub bio: Option<String>,
    pub hourly_rate: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Consultant> for ConsultantResponse {
    fn from(c: Consultant) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            name: c.name,
            email: c.email,
            title: c.title,
            specialization: c.specialization,
            bio: c.bio,
            hourly_rate: c.hourly_rate,
            is_active: c.is_active != 0,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConsultantRequest {
    /// Admins may create a profile for another consultant account
    pub user_id: Option<String>,
    pub title: String,
    pub specialization: String,
    pub bio: Option<String>,
    #[serde(default)]
    pub hourly_rate: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateConsultantRequest {
    pub title: Option<String>,
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub hourly_rate: Option<i64>,
    pub is_active: Option<bool>,
}

impl Consultant {
    pub fn active(&self) -> bool {
        self.is_active != 0
    }

    pub async fn create(
        db: &SqlitePool,
        user_id: &str,
        req: &CreateConsultantRequest,
    ) -> Result<Consultant, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO consultants (id, user_id, title, specialization, bio, hourly_rate, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&req.title)
        .bind(&req.specialization)
        .bind(&req.bio)
        .bind(req.hourly_rate)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<Consultant>, sqlx::Error> {
        sqlx::query_as(&format!("{} WHERE c.id = ?", SELECT_WITH_USER))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn get_by_user_id(
        db: &SqlitePool,
        user_id: &str,
    ) -> Result<Option<Consultant>, sqlx::Error> {
        sqlx::query_as(&format!("{} WHERE c.user_id = ?", SELECT_WITH_USER))
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    /// List consultants, optionally including deactivated profiles
    pub async fn list(db: &SqlitePool, include_inactive: bool) -> Result<Vec<Consultant>, sqlx::Error> {
        let sql = if include_inactive {
            format!("{} ORDER BY u.name ASC", SELECT_WITH_USER)
        } else {
            format!("{} WHERE c.is_active = 1 ORDER BY u.name ASC", SELECT_WITH_USER)
        };
        sqlx::query_as(&sql).fetch_all(db).await
    }

    pub async fn update(
        db: &SqlitePool,
        id: &str,
        req: &UpdateConsultantRequest,
    ) -> Result<Consultant, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();
        let is_active = req.is_active.map(|a| if a { 1i64 } else { 0i64 });

        sqlx::query(
            r#"
            UPDATE consultants
            SET title = COALESCE(?, title),
                specialization = COALESCE(?, specialization),
                bio = COALESCE(?, bio),
                hourly_rate = COALESCE(?, hourly_rate),
                is_active = COALESCE(?, is_active),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.title)
        .bind(&req.specialization)
        .bind(&req.bio)
        .bind(req.hourly_rate)
        .bind(is_active)
        .bind(&now)
        .bind(id)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Role, User};

    fn profile() -> CreateConsultantRequest {
        CreateConsultantRequest {
            user_id: None,
            title: "Counselling Psychologist".to_string(),
            specialization: "anxiety".to_string(),
            bio: Some("CBT-oriented practice".to_string()),
            hourly_rate: 4500,
        }
    }

    #[tokio::test]
    async fn test_create_and_deactivate_consultant() {
        let db = crate::db::init_memory().await.unwrap();
        let user = User::create(&db, "dr.lee@example.org", "hash", "Dr Lee", Role::Consultant)
            .await
            .unwrap();

        let consultant = Consultant::create(&db, &user.id, &profile()).await.unwrap();
        assert_eq!(consultant.name, "Dr Lee");
        assert!(consultant.active());
        assert_eq!(Consultant::list(&db, false).await.unwrap().len(), 1);

        let update = UpdateConsultantRequest {
            title: None,
            specialization: None,
            bio: None,
            hourly_rate: Some(5000),
            is_active: Some(false),
        };
        let updated = Consultant::update(&db, &consultant.id, &update).await.unwrap();
        assert_eq!(updated.hourly_rate, 5000);
        assert_eq!(updated.title, "Counselling Psychologist");

        let response: ConsultantResponse = updated.into();
        assert!(!response.is_active);
        assert!(Consultant::list(&db, false).await.unwrap().is_empty());
        assert_eq!(Consultant::list(&db, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_profile_per_account() {
        let db = crate::db::init_memory().await.unwrap();
        let user = User::create(&db, "dr.kim@example.org", "hash", "Dr Kim", Role::Consultant)
            .await
            .unwrap();
        Consultant::create(&db, &user.id, &profile()).await.unwrap();
        assert!(Consultant::create(&db, &user.id, &profile()).await.is_err());
    }
}
