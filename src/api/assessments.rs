//! Assessment definitions, submissions and stored results.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::db::{
    Assessment, AssessmentCategory, AssessmentDraft, AssessmentListQuery, AssessmentRecord,
    AssessmentSummary, CreateAssessmentRequest, NewAssessmentRecord, Question, QuestionInput,
    Role, SubmitAssessmentRequest, UpdateAssessmentRequest, User,
};
use crate::engine::scoring::score_assessment;
use crate::AppState;

use super::auth::{require_account, SYSTEM_USER_ID};
use super::error::{ApiError, ErrorCode, ValidationErrorBuilder};
use super::metrics::record_assessment_submitted;
use super::validation::{validate_optional_text, validate_question_rubric, validate_text};

const MAX_QUESTIONS: usize = 100;

fn parse_category(value: &str) -> Result<AssessmentCategory, String> {
    AssessmentCategory::from_str(value).ok_or_else(|| {
        let names: Vec<&str> = AssessmentCategory::ALL.iter().map(|c| c.as_str()).collect();
        format!("Category must be one of: {}", names.join(", "))
    })
}

/// Turn request questions into stored questions, collecting rubric errors
/// under `questions[i]`.
fn build_questions(inputs: &[QuestionInput], errors: &mut ValidationErrorBuilder) -> Vec<Question> {
    if inputs.is_empty() {
        errors.add("questions", "At least one question is required");
    }
    if inputs.len() > MAX_QUESTIONS {
        errors.add(
            "questions",
            format!("Too many questions (max {})", MAX_QUESTIONS),
        );
    }

    let mut seen_ids = HashSet::new();
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let field = format!("questions[{}]", i);
            errors.check(&field, validate_text(&input.text, "Question text", 500));
            errors.check(&field, validate_question_rubric(&input.options, &input.scores));

            let id = match input.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => uuid::Uuid::new_v4().to_string(),
            };
            if !seen_ids.insert(id.clone()) {
                errors.add(field, format!("Duplicate question id '{}'", id));
            }

            Question {
                id,
                text: input.text.trim().to_string(),
                options: input.options.clone(),
                scores: input.scores.clone(),
            }
        })
        .collect()
}

async fn load_assessment(state: &AppState, id: &str) -> Result<Assessment, ApiError> {
    state
        .assessments
        .find_assessment_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Assessment not found"))
}

fn require_author_role(user: &User) -> Result<(), ApiError> {
    match user.role() {
        Role::Consultant | Role::Admin => Ok(()),
        Role::User => Err(ApiError::forbidden(
            "Only consultants and admins can manage assessments",
        )),
    }
}

fn require_creator_or_admin(user: &User, assessment: &Assessment) -> Result<(), ApiError> {
    if user.is_admin() || assessment.created_by.as_deref() == Some(user.id.as_str()) {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "Only the assessment's creator or an admin can change it",
        ))
    }
}

/// GET /api/assessments?category=
pub async fn list_assessments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssessmentListQuery>,
) -> Result<Json<Vec<AssessmentSummary>>, ApiError> {
    let category = match query.category.as_deref() {
        Some(c) if !c.is_empty() => {
            Some(parse_category(c).map_err(|e| ApiError::validation_field("category", e))?)
        }
        _ => None,
    };

    let assessments = Assessment::list(&state.db, category).await?;
    Ok(Json(assessments.into_iter().map(Into::into).collect()))
}

/// GET /api/assessments/:id
pub async fn get_assessment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Assessment>, ApiError> {
    Ok(Json(load_assessment(&state, &id).await?))
}

/// POST /api/assessments
pub async fn create_assessment(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateAssessmentRequest>,
) -> Result<(StatusCode, Json<Assessment>), ApiError> {
    require_author_role(&user)?;

    let mut errors = ValidationErrorBuilder::new();
    errors.check("title", validate_text(&req.title, "Title", 200));
    errors.check(
        "description",
        validate_optional_text(&req.description, "Description", 2000),
    );
    let category = parse_category(&req.category);
    if let Err(ref e) = category {
        errors.add("category", e.clone());
    }
    let questions = build_questions(&req.questions, &mut errors);
    errors.finish()?;

    let draft = AssessmentDraft {
        title: req.title.trim().to_string(),
        description: req.description,
        category: category.map_err(|e| ApiError::validation_field("category", e))?,
        questions,
    };

    // The admin token has no account row to reference
    let created_by = (user.id != SYSTEM_USER_ID).then_some(user.id.as_str());
    let assessment = Assessment::create(&state.db, &draft, created_by).await?;

    info!(
        assessment_id = %assessment.id,
        category = %assessment.category,
        questions = assessment.questions.len(),
        "Assessment created"
    );

    Ok((StatusCode::CREATED, Json(assessment)))
}

/// PUT /api/assessments/:id
pub async fn update_assessment(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<UpdateAssessmentRequest>,
) -> Result<Json<Assessment>, ApiError> {
    let existing = load_assessment(&state, &id).await?;
    require_creator_or_admin(&user, &existing)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref title) = req.title {
        errors.check("title", validate_text(title, "Title", 200));
    }
    errors.check(
        "description",
        validate_optional_text(&req.description, "Description", 2000),
    );
    let category = match req.category.as_deref() {
        Some(c) => match parse_category(c) {
            Ok(category) => category,
            Err(e) => {
                errors.add("category", e);
                existing.category
            }
        },
        None => existing.category,
    };
    let questions = match req.questions {
        Some(ref inputs) => build_questions(inputs, &mut errors),
        None => existing.questions,
    };
    errors.finish()?;

    let draft = AssessmentDraft {
        title: req
            .title
            .map(|t| t.trim().to_string())
            .unwrap_or(existing.title),
        // An empty description clears it
        description: match req.description {
            Some(d) if d.trim().is_empty() => None,
            Some(d) => Some(d),
            None => existing.description,
        },
        category,
        questions,
    };

    let updated = Assessment::update(&state.db, &id, &draft).await?;
    info!(assessment_id = %id, updated_by = %user.id, "Assessment updated");

    Ok(Json(updated))
}

/// DELETE /api/assessments/:id
pub async fn delete_assessment(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let existing = load_assessment(&state, &id).await?;
    require_creator_or_admin(&user, &existing)?;

    if !Assessment::delete(&state.db, &id).await? {
        return Err(ApiError::not_found("Assessment not found"));
    }

    info!(assessment_id = %id, deleted_by = %user.id, "Assessment deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/assessments/:id/submit - score the answers and store the result
pub async fn submit_assessment(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    Json(req): Json<SubmitAssessmentRequest>,
) -> Result<(StatusCode, Json<AssessmentRecord>), ApiError> {
    require_account(&user)?;

    let assessment = load_assessment(&state, &id).await?;
    let scored = score_assessment(&assessment, &req.answers)?;

    let record = AssessmentRecord::create(
        &state.db,
        &NewAssessmentRecord {
            user_id: &user.id,
            assessment_id: &assessment.id,
            answers: &scored.answers,
            score: scored.score,
            max_score: scored.max_score,
            percentage: scored.percentage,
            result: &scored.result,
            severity: scored.severity,
            recommendations: &scored.recommendations,
        },
    )
    .await
    .map_err(|e| match ApiError::from(e) {
        err if err.code() == ErrorCode::Conflict => {
            ApiError::conflict("You have already completed this assessment")
        }
        err => err,
    })?;

    record_assessment_submitted(record.severity.as_str());
    info!(
        record_id = %record.id,
        assessment_id = %assessment.id,
        user_id = %user.id,
        percentage = record.percentage,
        severity = %record.severity,
        "Assessment submitted"
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/assessments/results - the caller's own results
pub async fn list_results(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<AssessmentRecord>>, ApiError> {
    Ok(Json(AssessmentRecord::list_for_user(&state.db, &user.id).await?))
}

/// GET /api/assessments/results/:id
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<AssessmentRecord>, ApiError> {
    let record = AssessmentRecord::get_by_id(&state.db, &id)
        .await?
        .filter(|r| r.user_id == user.id || user.is_admin())
        .ok_or_else(|| ApiError::not_found("Result not found"))?;
    Ok(Json(record))
}
