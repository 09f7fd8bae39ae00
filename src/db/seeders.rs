//! Database seeders for built-in data
//!
//! Built-in screening questionnaires are inserted on startup when missing.
//! Existing rows are left alone so admin edits survive restarts.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use super::models::{AssessmentCategory, Question};

/// Frequency scale shared by the built-in questionnaires
const FREQUENCY_OPTIONS: [&str; 4] = [
    "Not at all",
    "Several days",
    "More than half the days",
    "Nearly every day",
];

const FREQUENCY_SCORES: [i64; 4] = [0, 1, 2, 3];

fn frequency_question(id: &str, text: &str) -> Question {
    Question {
        id: id.to_string(),
        text: text.to_string(),
        options: FREQUENCY_OPTIONS.iter().map(|o| o.to_string()).collect(),
        scores: FREQUENCY_SCORES.to_vec(),
    }
}

/// Seed built-in assessments (runs on every startup, inserts only missing ones)
pub async fn seed_builtin_assessments(pool: &SqlitePool) -> Result<()> {
    // Format: (id, title, description, category, questions)
    let assessments: Vec<(&str, &str, &str, AssessmentCategory, Vec<(&str, &str)>)> = vec![
        (
            "builtin-depression",
            "Mood check-in",
            "Over the last two weeks, how often have you been bothered by the following?",
            AssessmentCategory::Depression,
            vec![
                ("dep-1", "Little interest or pleasure in doing things"),
                ("dep-2", "Feeling down, depressed, or hopeless"),
                ("dep-3", "Trouble falling or staying asleep, or sleeping too much"),
                ("dep-4", "Feeling tired or having little energy"),
                ("dep-5", "Poor appetite or overeating"),
                ("dep-6", "Feeling bad about yourself"),
                ("dep-7", "Trouble concentrating on things"),
            ],
        ),
        (
            "builtin-anxiety",
            "Anxiety check-in",
            "Over the last two weeks, how often have you been bothered by the following?",
            AssessmentCategory::Anxiety,
            vec![
                ("anx-1", "Feeling nervous, anxious, or on edge"),
                ("anx-2", "Not being able to stop or control worrying"),
                ("anx-3", "Worrying too much about different things"),
                ("anx-4", "Trouble relaxing"),
                ("anx-5", "Being so restless that it is hard to sit still"),
                ("anx-6", "Becoming easily annoyed or irritable"),
                ("anx-7", "Feeling afraid, as if something awful might happen"),
            ],
        ),
        (
            "builtin-stress",
            "Stress check-in",
            "In the last month, how often have you experienced the following?",
            AssessmentCategory::Stress,
            vec![
                ("str-1", "Feeling that you were unable to control important things in your life"),
                ("str-2", "Feeling nervous and stressed"),
                ("str-3", "Feeling that difficulties were piling up too high to overcome"),
                ("str-4", "Being upset because of something that happened unexpectedly"),
                ("str-5", "Finding that you could not cope with all the things you had to do"),
            ],
        ),
    ];

    let mut inserted = 0;
    for (id, title, description, category, questions) in assessments {
        let questions: Vec<Question> = questions
            .into_iter()
            .map(|(qid, text)| frequency_question(qid, text))
            .collect();
        let questions_json = serde_json::to_string(&questions)?;
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO assessments
            (id, title, description, category, questions, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(category.as_str())
        .bind(&questions_json)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await?;

        inserted += result.rows_affected();
    }

    if inserted > 0 {
        info!("Seeded {} built-in assessments", inserted);
    }
    Ok(())
}
