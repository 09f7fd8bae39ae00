//! Assessment scoring.
//!
//! Each answer names a question by id and the option the user picked; its
//! points come from that question's rubric, never from the client. The
//! percentage of the achievable maximum is then mapped to a band:
//!
//! | percentage | band     |
//! |------------|----------|
//! | `[0, 30)`  | mild     |
//! | `[30, 60)` | moderate |
//! | `[60, 100]`| severe   |
//!
//! Depression, anxiety and stress have their own labels and
//! recommendations; every other category shares a general table.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

use crate::db::{Assessment, AssessmentCategory, ScoredAnswer, Severity, SubmittedAnswer};

/// Lower bound (inclusive) of the moderate band
pub const MODERATE_THRESHOLD: i64 = 30;

/// Lower bound (inclusive) of the severe band
pub const SEVERE_THRESHOLD: i64 = 60;

/// Result label when no answered question can earn points
pub const INSUFFICIENT_DATA_RESULT: &str = "Insufficient data";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScoringError {
    #[error("Unknown question '{0}'")]
    UnknownQuestion(String),

    #[error("Option '{option}' is not a choice of question '{question_id}'")]
    UnknownOption { question_id: String, option: String },

    #[error("Question '{0}' was answered more than once")]
    DuplicateAnswer(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    pub score: i64,
    pub max_score: i64,
    pub percentage: i64,
    pub result: String,
    pub severity: Severity,
    pub recommendations: Vec<String>,
    pub answers: Vec<ScoredAnswer>,
}

/// Label and recommendations of one band
#[derive(Debug)]
pub struct Band {
    pub severity: Severity,
    pub result: &'static str,
    pub recommendations: [&'static str; 4],
}

struct BandTable {
    mild: Band,
    moderate: Band,
    severe: Band,
}

static DEPRESSION: BandTable = BandTable {
    mild: Band {
        severity: Severity::Mild,
        result: "Mild depressive symptoms",
        recommendations: [
            "Keep a regular daily routine with consistent sleep and meal times",
            "Schedule at least one activity you used to enjoy each day",
            "Spend time outdoors and get some light physical activity",
            "Talk with someone you trust about how you have been feeling",
        ],
    },
    moderate: Band {
        severity: Severity::Moderate,
        result: "Moderate depressive symptoms",
        recommendations: [
            "Book a session with one of our consultants to talk things through",
            "Track your mood daily to notice patterns and triggers",
            "Break large tasks into small steps and acknowledge each one you finish",
            "Limit alcohol and keep in touch with friends or family",
        ],
    },
    severe: Band {
        severity: Severity::Severe,
        result: "Severe depressive symptoms",
        recommendations: [
            "Please reach out to a mental health professional as soon as possible",
            "Book an early session with one of our consultants",
            "Let someone close to you know how you are feeling",
            "If you have thoughts of harming yourself, contact emergency services or a crisis line now",
        ],
    },
};

static ANXIETY: BandTable = BandTable {
    mild: Band {
        severity: Severity::Mild,
        result: "Mild anxiety",
        recommendations: [
            "Practice slow breathing for a few minutes when you notice tension",
            "Reduce caffeine, especially later in the day",
            "Keep a worry journal and set aside a short time to review it",
            "Stay physically active with regular walks or exercise",
        ],
    },
    moderate: Band {
        severity: Severity::Moderate,
        result: "Moderate anxiety",
        recommendations: [
            "Consider a session with a consultant experienced in anxiety",
            "Try guided relaxation or mindfulness exercises daily",
            "Notice avoidance patterns and approach feared situations gradually",
            "Protect your sleep with a consistent wind-down routine",
        ],
    },
    severe: Band {
        severity: Severity::Severe,
        result: "Severe anxiety",
        recommendations: [
            "Please seek support from a mental health professional soon",
            "Book a session with one of our consultants",
            "Use grounding techniques when anxiety peaks",
            "If you feel unsafe or overwhelmed, contact emergency services or a crisis line",
        ],
    },
};

static STRESS: BandTable = BandTable {
    mild: Band {
        severity: Severity::Mild,
        result: "Low stress",
        recommendations: [
            "Keep up the habits that help you stay balanced",
            "Take short breaks during work or study",
            "Make time for hobbies and rest each week",
            "Keep a regular sleep schedule",
        ],
    },
    moderate: Band {
        severity: Severity::Moderate,
        result: "Moderate stress",
        recommendations: [
            "Identify your main sources of stress and what you can change",
            "Prioritise tasks and say no to non-essential commitments",
            "Add relaxation or physical activity to your daily routine",
            "Talk with a consultant about stress management techniques",
        ],
    },
    severe: Band {
        severity: Severity::Severe,
        result: "High stress",
        recommendations: [
            "Book a session with a consultant to build a stress management plan",
            "Reduce your workload where possible and ask for help",
            "Watch for signs of burnout such as exhaustion or detachment",
            "Make rest and sleep a priority this week",
        ],
    },
};

static GENERAL: BandTable = BandTable {
    mild: Band {
        severity: Severity::Mild,
        result: "Low concern",
        recommendations: [
            "Continue looking after your wellbeing",
            "Stay connected with the people who support you",
            "Retake this assessment in a few weeks to track changes",
            "Explore our self-help resources",
        ],
    },
    moderate: Band {
        severity: Severity::Moderate,
        result: "Moderate concern",
        recommendations: [
            "Reflect on the areas where you scored highest",
            "Consider talking with one of our consultants",
            "Set small, concrete goals for the weeks ahead",
            "Retake this assessment in a few weeks to track changes",
        ],
    },
    severe: Band {
        severity: Severity::Severe,
        result: "High concern",
        recommendations: [
            "We recommend speaking with one of our consultants",
            "Share your results with someone you trust",
            "Look after basic needs such as sleep, food and rest",
            "If you feel unsafe, contact emergency services or a crisis line",
        ],
    },
};

fn table_for(category: AssessmentCategory) -> &'static BandTable {
    match category {
        AssessmentCategory::Depression => &DEPRESSION,
        AssessmentCategory::Anxiety => &ANXIETY,
        AssessmentCategory::Stress => &STRESS,
        _ => &GENERAL,
    }
}

/// Band of a percentage within a category's table
pub fn band_for(category: AssessmentCategory, percentage: i64) -> &'static Band {
    let table = table_for(category);
    if percentage < MODERATE_THRESHOLD {
        &table.mild
    } else if percentage < SEVERE_THRESHOLD {
        &table.moderate
    } else {
        &table.severe
    }
}

/// `round(score / max_score * 100)`, rounding halves up. `None` when
/// `max_score` is not positive. Computed in `i128` so large rubric scores
/// cannot overflow.
pub fn percentage(score: i64, max_score: i64) -> Option<i64> {
    if max_score <= 0 {
        return None;
    }
    let (score, max_score) = (i128::from(score), i128::from(max_score));
    i64::try_from((200 * score + max_score).div_euclid(2 * max_score)).ok()
}

/// Derive each answer's score from the rubric and check it against the
/// assessment's questions.
pub fn score_answers(
    assessment: &Assessment,
    answers: &[SubmittedAnswer],
) -> Result<Vec<ScoredAnswer>, ScoringError> {
    let mut seen = HashSet::new();
    answers
        .iter()
        .map(|answer| {
            let question = assessment
                .question(&answer.question_id)
                .ok_or_else(|| ScoringError::UnknownQuestion(answer.question_id.clone()))?;
            if !seen.insert(question.id.as_str()) {
                return Err(ScoringError::DuplicateAnswer(question.id.clone()));
            }
            let score = question.score_for(&answer.selected_option).ok_or_else(|| {
                ScoringError::UnknownOption {
                    question_id: question.id.clone(),
                    option: answer.selected_option.clone(),
                }
            })?;
            Ok(ScoredAnswer {
                question_id: question.id.clone(),
                question: question.text.clone(),
                selected_option: answer.selected_option.clone(),
                score,
            })
        })
        .collect()
}

/// Score a submission against its assessment.
///
/// The maximum counts only the answered questions. When nothing achievable
/// was answered the result is the insufficient-data sentinel with a 0
/// percentage.
pub fn score_assessment(
    assessment: &Assessment,
    answers: &[SubmittedAnswer],
) -> Result<ScoreResult, ScoringError> {
    let scored = score_answers(assessment, answers)?;

    let score = scored
        .iter()
        .map(|a| a.score)
        .fold(0i64, i64::saturating_add);
    let max_score = scored
        .iter()
        .filter_map(|a| assessment.question(&a.question_id))
        .map(|q| q.max_score())
        .fold(0i64, i64::saturating_add);

    let result = match percentage(score, max_score) {
        Some(pct) => {
            let band = band_for(assessment.category, pct);
            ScoreResult {
                score,
                max_score,
                percentage: pct,
                result: band.result.to_string(),
                severity: band.severity,
                recommendations: band.recommendations.iter().map(|r| r.to_string()).collect(),
                answers: scored,
            }
        }
        None => ScoreResult {
            score,
            max_score,
            percentage: 0,
            result: INSUFFICIENT_DATA_RESULT.to_string(),
            severity: Severity::InsufficientData,
            recommendations: Vec::new(),
            answers: scored,
        },
    };

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Question;

    /// Five 0..=4 questions, so the maximum over all of them is 20
    fn assessment(category: AssessmentCategory) -> Assessment {
        Assessment {
            id: "a1".to_string(),
            title: "Test".to_string(),
            description: None,
            category,
            questions: (1..=5)
                .map(|i| Question {
                    id: format!("q{}", i),
                    text: format!("Question {}", i),
                    options: vec!["0", "1", "2", "3", "4"]
                        .into_iter()
                        .map(String::from)
                        .collect(),
                    scores: vec![0, 1, 2, 3, 4],
                })
                .collect(),
            created_by: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    fn answers(picks: &[u8]) -> Vec<SubmittedAnswer> {
        picks
            .iter()
            .enumerate()
            .map(|(i, pick)| SubmittedAnswer {
                question_id: format!("q{}", i + 1),
                selected_option: pick.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_percentage_rounds_half_up() {
        assert_eq!(percentage(15, 20), Some(75));
        assert_eq!(percentage(1, 8), Some(13)); // 12.5
        assert_eq!(percentage(1, 3), Some(33));
        assert_eq!(percentage(2, 3), Some(67));
        assert_eq!(percentage(0, 20), Some(0));
        assert_eq!(percentage(20, 20), Some(100));
        assert_eq!(percentage(5, 0), None);
    }

    #[test]
    fn test_depression_bands() {
        let a = assessment(AssessmentCategory::Depression);

        // 5/20 = 25%
        let mild = score_assessment(&a, &answers(&[1, 1, 1, 1, 1])).unwrap();
        assert_eq!(mild.percentage, 25);
        assert_eq!(mild.severity, Severity::Mild);
        assert_eq!(mild.result, "Mild depressive symptoms");
        assert_eq!(mild.recommendations.len(), 4);

        // 9/20 = 45%
        let moderate = score_assessment(&a, &answers(&[2, 2, 2, 2, 1])).unwrap();
        assert_eq!(moderate.percentage, 45);
        assert_eq!(moderate.severity, Severity::Moderate);
        assert_eq!(moderate.result, "Moderate depressive symptoms");

        // 15/20 = 75%
        let severe = score_assessment(&a, &answers(&[3, 3, 3, 3, 3])).unwrap();
        assert_eq!(severe.score, 15);
        assert_eq!(severe.max_score, 20);
        assert_eq!(severe.percentage, 75);
        assert_eq!(severe.severity, Severity::Severe);
        assert_eq!(severe.result, "Severe depressive symptoms");
    }

    #[test]
    fn test_band_boundaries() {
        let c = AssessmentCategory::Depression;
        assert_eq!(band_for(c, 0).severity, Severity::Mild);
        assert_eq!(band_for(c, 29).severity, Severity::Mild);
        assert_eq!(band_for(c, 30).severity, Severity::Moderate);
        assert_eq!(band_for(c, 59).severity, Severity::Moderate);
        assert_eq!(band_for(c, 60).severity, Severity::Severe);
        assert_eq!(band_for(c, 100).severity, Severity::Severe);
    }

    #[test]
    fn test_categories_have_distinct_tables() {
        assert_eq!(band_for(AssessmentCategory::Anxiety, 45).result, "Moderate anxiety");
        assert_eq!(band_for(AssessmentCategory::Stress, 10).result, "Low stress");
        assert_eq!(band_for(AssessmentCategory::Personality, 80).result, "High concern");
        assert_eq!(band_for(AssessmentCategory::Relationship, 80).result, "High concern");
        assert_eq!(band_for(AssessmentCategory::Other, 35).result, "Moderate concern");
    }

    #[test]
    fn test_empty_answers_yield_sentinel() {
        let result = score_assessment(&assessment(AssessmentCategory::Anxiety), &[]).unwrap();
        assert_eq!(result.score, 0);
        assert_eq!(result.max_score, 0);
        assert_eq!(result.percentage, 0);
        assert_eq!(result.severity, Severity::InsufficientData);
        assert_eq!(result.result, INSUFFICIENT_DATA_RESULT);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_zero_point_questions_yield_sentinel() {
        let mut a = assessment(AssessmentCategory::Other);
        a.questions[0].scores = vec![0, 0, 0, 0, 0];
        let result = score_assessment(&a, &answers(&[4])).unwrap();
        assert_eq!(result.max_score, 0);
        assert_eq!(result.percentage, 0);
        assert_eq!(result.severity, Severity::InsufficientData);
    }

    #[test]
    fn test_max_counts_answered_questions_only() {
        let a = assessment(AssessmentCategory::Stress);
        let result = score_assessment(&a, &answers(&[2, 4])).unwrap();
        assert_eq!(result.score, 6);
        assert_eq!(result.max_score, 8);
        assert_eq!(result.percentage, 75);
    }

    #[test]
    fn test_percentage_of_large_scores_does_not_overflow() {
        assert_eq!(percentage(100_000_000_000_000_000, 100_000_000_000_000_000), Some(100));
        assert_eq!(percentage(i64::MAX / 2, i64::MAX), Some(50));
        assert_eq!(percentage(i64::MAX, i64::MAX), Some(100));
    }

    #[test]
    fn test_huge_rubric_scores_are_scored_without_panicking() {
        let mut a = assessment(AssessmentCategory::Other);
        a.questions[0].options = vec!["No".into(), "Yes".into()];
        a.questions[0].scores = vec![0, 100_000_000_000_000_000];
        a.questions[1].options = vec!["No".into(), "Yes".into()];
        a.questions[1].scores = vec![0, i64::MAX];

        let submitted: Vec<SubmittedAnswer> = ["q1", "q2"]
            .iter()
            .map(|id| SubmittedAnswer {
                question_id: id.to_string(),
                selected_option: "Yes".to_string(),
            })
            .collect();
        let result = score_assessment(&a, &submitted).unwrap();
        assert_eq!(result.score, i64::MAX);
        assert_eq!(result.max_score, i64::MAX);
        assert_eq!(result.percentage, 100);
        assert_eq!(result.severity, Severity::Severe);
    }

    #[test]
    fn test_scores_come_from_rubric() {
        let mut a = assessment(AssessmentCategory::Stress);
        a.questions[0].options = vec!["Never".into(), "Sometimes".into(), "Often".into()];
        a.questions[0].scores = vec![0, 5, 10];

        let submitted = vec![SubmittedAnswer {
            question_id: "q1".to_string(),
            selected_option: "Sometimes".to_string(),
        }];
        let result = score_assessment(&a, &submitted).unwrap();
        assert_eq!(result.answers[0].score, 5);
        assert_eq!(result.answers[0].question, "Question 1");
        assert_eq!(result.max_score, 10);
        assert_eq!(result.percentage, 50);
    }

    #[test]
    fn test_invalid_answers_rejected() {
        let a = assessment(AssessmentCategory::Depression);

        let unknown_question = vec![SubmittedAnswer {
            question_id: "q99".to_string(),
            selected_option: "1".to_string(),
        }];
        assert_eq!(
            score_assessment(&a, &unknown_question).unwrap_err(),
            ScoringError::UnknownQuestion("q99".to_string())
        );

        let unknown_option = vec![SubmittedAnswer {
            question_id: "q1".to_string(),
            selected_option: "7".to_string(),
        }];
        assert!(matches!(
            score_assessment(&a, &unknown_option),
            Err(ScoringError::UnknownOption { .. })
        ));

        let mut duplicate = answers(&[1, 1]);
        duplicate[1].question_id = "q1".to_string();
        assert_eq!(
            score_assessment(&a, &duplicate).unwrap_err(),
            ScoringError::DuplicateAnswer("q1".to_string())
        );
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let a = assessment(AssessmentCategory::Anxiety);
        let submitted = answers(&[0, 3, 2, 4, 1]);
        let first = score_assessment(&a, &submitted).unwrap();
        for _ in 0..10 {
            assert_eq!(score_assessment(&a, &submitted).unwrap(), first);
        }
    }
}
