//! Assessment definitions and submitted assessment records.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentCategory {
    Depression,
    Anxiety,
    Stress,
    Personality,
    Relationship,
    Other,
}

impl AssessmentCategory {
    pub const ALL: [AssessmentCategory; 6] = [
        AssessmentCategory::Depression,
        AssessmentCategory::Anxiety,
        AssessmentCategory::Stress,
        AssessmentCategory::Personality,
        AssessmentCategory::Relationship,
        AssessmentCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentCategory::Depression => "depression",
            AssessmentCategory::Anxiety => "anxiety",
            AssessmentCategory::Stress => "stress",
            AssessmentCategory::Personality => "personality",
            AssessmentCategory::Relationship => "relationship",
            AssessmentCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.to_lowercase())
    }
}

impl std::fmt::Display for AssessmentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A question with its options and the parallel rubric of option scores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub scores: Vec<i64>,
}

impl Question {
    /// Highest score any option of this question can earn
    pub fn max_score(&self) -> i64 {
        self.scores.iter().copied().max().unwrap_or(0)
    }

    /// Rubric score of an option, matched by exact option text
    pub fn score_for(&self, option: &str) -> Option<i64> {
        self.options
            .iter()
            .position(|o| o == option)
            .and_then(|i| self.scores.get(i).copied())
    }
}

#[derive(Debug, Clone, FromRow)]
struct AssessmentRow {
    id: String,
    title: String,
    description: Option<String>,
    category: String,
    questions: String,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: AssessmentCategory,
    pub questions: Vec<Question>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<AssessmentRow> for Assessment {
    type Error = sqlx::Error;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        let category = AssessmentCategory::from_str(&row.category).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown assessment category: {}", row.category).into())
        })?;
        let questions: Vec<Question> = serde_json::from_str(&row.questions)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category,
            questions,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Summary used in list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: AssessmentCategory,
    pub question_count: usize,
    pub created_at: String,
}

impl From<Assessment> for AssessmentSummary {
    fn from(a: Assessment) -> Self {
        Self {
            question_count: a.questions.len(),
            id: a.id,
            title: a.title,
            description: a.description,
            category: a.category,
            created_at: a.created_at,
        }
    }
}

/// Validated input for creating or replacing an assessment
#[derive(Debug, Clone)]
pub struct AssessmentDraft {
    pub title: String,
    pub description: Option<String>,
    pub category: AssessmentCategory,
    pub questions: Vec<Question>,
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

impl Assessment {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub async fn create(
        db: &SqlitePool,
        draft: &AssessmentDraft,
        created_by: Option<&str>,
    ) -> Result<Assessment, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO assessments (id, title, description, category, questions, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.category.as_str())
        .bind(encode_json(&draft.questions)?)
        .bind(created_by)
        .bind(&now)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(db: &SqlitePool, id: &str) -> Result<Option<Assessment>, sqlx::Error> {
        let row: Option<AssessmentRow> = sqlx::query_as("SELECT * FROM assessments WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await?;
        row.map(Assessment::try_from).transpose()
    }

    pub async fn list(
        db: &SqlitePool,
        category: Option<AssessmentCategory>,
    ) -> Result<Vec<Assessment>, sqlx::Error> {
        let rows: Vec<AssessmentRow> = match category {
            Some(category) => {
                sqlx::query_as(
                    "SELECT * FROM assessments WHERE category = ? ORDER BY created_at ASC, title ASC",
                )
                .bind(category.as_str())
                .fetch_all(db)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM assessments ORDER BY created_at ASC, title ASC")
                    .fetch_all(db)
                    .await?
            }
        };
        rows.into_iter().map(Assessment::try_from).collect()
    }

    pub async fn update(
        db: &SqlitePool,
        id: &str,
        draft: &AssessmentDraft,
    ) -> Result<Assessment, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            UPDATE assessments
            SET title = ?, description = ?, category = ?, questions = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(draft.category.as_str())
        .bind(encode_json(&draft.questions)?)
        .bind(&now)
        .bind(id)
        .execute(db)
        .await?;

        Self::get_by_id(db, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn delete(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM assessments WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionInput {
    /// Generated when omitted
    pub id: Option<String>,
    pub text: String,
    pub options: Vec<String>,
    pub scores: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssessmentRequest {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub questions: Vec<QuestionInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAssessmentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub questions: Option<Vec<QuestionInput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentListQuery {
    pub category: Option<String>,
}

// -------------------------------------------------------------------------
// Submissions
// -------------------------------------------------------------------------

/// One answer as submitted by a client. Any score the client sends is
/// ignored; scores come from the question rubric.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected_option: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAssessmentRequest {
    pub answers: Vec<SubmittedAnswer>,
}

/// An answer after its score was derived from the rubric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredAnswer {
    pub question_id: String,
    pub question: String,
    pub selected_option: String,
    pub score: i64,
}

/// Percentage band of a scored assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    /// No answered question carried any points
    InsufficientData,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::InsufficientData => "insufficient_data",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "mild" => Some(Severity::Mild),
            "moderate" => Some(Severity::Moderate),
            "severe" => Some(Severity::Severe),
            "insufficient_data" => Some(Severity::InsufficientData),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, FromRow)]
struct AssessmentRecordRow {
    id: String,
    user_id: String,
    assessment_id: String,
    answers: String,
    score: i64,
    max_score: i64,
    percentage: i64,
    result: String,
    severity: String,
    recommendations: String,
    created_at: String,
}

/// A stored, immutable assessment submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub id: String,
    pub user_id: String,
    pub assessment_id: String,
    pub answers: Vec<ScoredAnswer>,
    pub score: i64,
    pub max_score: i64,
    pub percentage: i64,
    pub result: String,
    pub severity: Severity,
    pub recommendations: Vec<String>,
    pub created_at: String,
}

impl TryFrom<AssessmentRecordRow> for AssessmentRecord {
    type Error = sqlx::Error;

    fn try_from(row: AssessmentRecordRow) -> Result<Self, Self::Error> {
        let severity = Severity::from_str(&row.severity).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown severity: {}", row.severity).into())
        })?;
        Ok(Self {
            answers: serde_json::from_str(&row.answers)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            recommendations: serde_json::from_str(&row.recommendations)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            id: row.id,
            user_id: row.user_id,
            assessment_id: row.assessment_id,
            score: row.score,
            max_score: row.max_score,
            percentage: row.percentage,
            result: row.result,
            severity,
            created_at: row.created_at,
        })
    }
}

/// Fields of a record about to be stored
#[derive(Debug, Clone)]
pub struct NewAssessmentRecord<'a> {
    pub user_id: &'a str,
    pub assessment_id: &'a str,
    pub answers: &'a [ScoredAnswer],
    pub score: i64,
    pub max_score: i64,
    pub percentage: i64,
    pub result: &'a str,
    pub severity: Severity,
    pub recommendations: &'a [String],
}

impl AssessmentRecord {
    /// Insert a record. A second record for the same (user, assessment)
    /// pair fails with a unique constraint violation.
    pub async fn create(
        db: &SqlitePool,
        new: &NewAssessmentRecord<'_>,
    ) -> Result<AssessmentRecord, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO assessment_records (id, user_id, assessment_id, answers, score, max_score,
                                            percentage, result, severity, recommendations, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(new.user_id)
        .bind(new.assessment_id)
        .bind(encode_json(&new.answers)?)
        .bind(new.score)
        .bind(new.max_score)
        .bind(new.percentage)
        .bind(new.result)
        .bind(new.severity.as_str())
        .bind(encode_json(&new.recommendations)?)
        .bind(&now)
        .execute(db)
        .await?;

        Self::get_by_id(db, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(
        db: &SqlitePool,
        id: &str,
    ) -> Result<Option<AssessmentRecord>, sqlx::Error> {
        let row: Option<AssessmentRecordRow> =
            sqlx::query_as("SELECT * FROM assessment_records WHERE id = ?")
                .bind(id)
                .fetch_optional(db)
                .await?;
        row.map(AssessmentRecord::try_from).transpose()
    }

    pub async fn list_for_user(
        db: &SqlitePool,
        user_id: &str,
    ) -> Result<Vec<AssessmentRecord>, sqlx::Error> {
        let rows: Vec<AssessmentRecordRow> = sqlx::query_as(
            "SELECT * FROM assessment_records WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        rows.into_iter().map(AssessmentRecord::try_from).collect()
    }
}
