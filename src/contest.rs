// src/contest.rs
//
// Contest scoring and leaderboards: quiz answers are scored in {0, partial,
// 1}, cumulative totals live in the 'contest' ledger (one row per user and
// document), and leaderboards are derived views over that ledger.

use sqlx::PgPool;

use crate::error::AppError;
use crate::models::contest::{ContestStanding, LeaderboardEntry};
use crate::utils::text::normalize_question;

/// Pure scoring decision for a submitted quiz answer.
///
/// * Wrong option: 0, regardless of any lookups.
/// * Correct option with a lookup in the quiz window whose question
///   normalizes equal to the quiz question: `partial_credit` — the lookup is
///   treated as likely-assisted, not proven cheating.
/// * Correct option otherwise: 1. Lookups on unrelated questions are not
///   penalized.
pub fn judge_answer(
    selected_option: &str,
    right_answer: &str,
    quiz_question: &str,
    lookup_questions: &[String],
    partial_credit: f64,
) -> f64 {
    if selected_option != right_answer {
        return 0.0;
    }

    let quiz_norm = normalize_question(quiz_question);
    let assisted = lookup_questions
        .iter()
        .any(|q| normalize_question(q) == quiz_norm);

    if assisted { partial_credit } else { 1.0 }
}

/// A score is cheat-flagged iff it is non-integral.
pub fn is_cheat_score(score: f64) -> bool {
    score.fract() != 0.0
}

/// Scores a quiz answer, consulting the audit log for answer-lookup
/// interactions by the same user on the same document strictly inside the
/// (received, answered) window. No lookups is the common case and yields
/// full credit.
#[allow(clippy::too_many_arguments)]
pub async fn score_answer(
    pool: &PgPool,
    user_id: i64,
    doc_name: &str,
    quiz_question: &str,
    selected_option: &str,
    right_answer: &str,
    received_at: chrono::NaiveDateTime,
    answered_at: chrono::NaiveDateTime,
    partial_credit: f64,
) -> Result<f64, AppError> {
    if selected_option != right_answer {
        return Ok(0.0);
    }

    let lookup_questions: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT a.question
        FROM request_statistic s
        JOIN answer_question_system a ON a.request_id = s.id
        WHERE s.user_id = $1
          AND s.doc_name = $2
          AND s.operation = 'get_answer'
          AND s.timestamp > $3
          AND s.timestamp < $4
        "#,
    )
    .bind(user_id)
    .bind(doc_name)
    .bind(received_at)
    .bind(answered_at)
    .fetch_all(pool)
    .await?;

    Ok(judge_answer(
        selected_option,
        right_answer,
        quiz_question,
        &lookup_questions,
        partial_credit,
    ))
}

/// Upserts a scored answer into the ledger. A single atomic statement with
/// relative increments, so two racing submissions for the same (user, doc)
/// both land.
pub async fn upsert_score(
    pool: &PgPool,
    user_id: i64,
    doc_name: &str,
    score: f64,
) -> Result<(), AppError> {
    let cheat_increment: i32 = if is_cheat_score(score) { 1 } else { 0 };

    sqlx::query(
        r#"
        INSERT INTO contest
            (user_id, doc_name, total_tests, points, cheat_tests,
             test_feedbacks, answer_question_feedbacks)
        VALUES ($1, $2, 1, $3, $4, 0, 0)
        ON CONFLICT (user_id, doc_name) DO UPDATE SET
            total_tests = contest.total_tests + 1,
            points = contest.points + EXCLUDED.points,
            cheat_tests = contest.cheat_tests + EXCLUDED.cheat_tests
        "#,
    )
    .bind(user_id)
    .bind(doc_name)
    .bind(score)
    .bind(cheat_increment)
    .execute(pool)
    .await?;

    Ok(())
}

/// Ledger rows for a document joined to user identity, in final leaderboard
/// order: points descending, ties broken by ledger id so repeated calls on
/// unchanged data produce identical rankings.
async fn standings(pool: &PgPool, doc_name: &str) -> Result<Vec<ContestStanding>, AppError> {
    let rows = sqlx::query_as::<_, ContestStanding>(
        r#"
        SELECT c.user_id, u.name, u.surname, c.points, c.total_tests
        FROM contest c
        JOIN users u ON c.user_id = u.id
        WHERE c.doc_name = $1
        ORDER BY c.points DESC, c.id ASC
        "#,
    )
    .bind(doc_name)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Assigns dense 1-based ranks by position. Equal points get distinct,
/// deterministic ranks (insertion order), not a shared rank.
pub fn assign_ranks(standings: Vec<ContestStanding>) -> Vec<LeaderboardEntry> {
    standings
        .into_iter()
        .enumerate()
        .map(|(i, s)| LeaderboardEntry {
            rank: i as i64 + 1,
            user_id: s.user_id,
            name: s.name,
            surname: s.surname,
            points: s.points,
            total_tests: s.total_tests,
        })
        .collect()
}

/// Top-3 plus the caller's own entry when ranked below the podium. A caller
/// with no ledger row simply gets the top-3; an empty contest yields an
/// empty view.
pub fn personal_view(entries: &[LeaderboardEntry], user_id: i64) -> Vec<LeaderboardEntry> {
    let mut view: Vec<LeaderboardEntry> = entries.iter().take(3).cloned().collect();

    if let Some(own) = entries.iter().find(|e| e.user_id == user_id) {
        if own.rank > 3 {
            view.push(own.clone());
        }
    }

    view
}

/// Full ranked leaderboard for a document.
pub async fn leaderboard(pool: &PgPool, doc_name: &str) -> Result<Vec<LeaderboardEntry>, AppError> {
    Ok(assign_ranks(standings(pool, doc_name).await?))
}

/// The caller's personalized leaderboard view.
pub async fn my_leaderboard(
    pool: &PgPool,
    doc_name: &str,
    user_id: i64,
) -> Result<Vec<LeaderboardEntry>, AppError> {
    let entries = leaderboard(pool, doc_name).await?;
    Ok(personal_view(&entries, user_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTIAL: f64 = 0.5;

    fn standing(user_id: i64, points: f64) -> ContestStanding {
        ContestStanding {
            user_id,
            name: format!("name{user_id}"),
            surname: format!("surname{user_id}"),
            points,
            total_tests: 10,
        }
    }

    #[test]
    fn wrong_answer_scores_zero_even_with_matching_lookup() {
        let lookups = vec!["What is the capacity?".to_string()];
        let score = judge_answer("A", "B", "What is the capacity?", &lookups, PARTIAL);
        assert_eq!(score, 0.0);
        assert!(!is_cheat_score(score));
    }

    #[test]
    fn correct_answer_without_lookups_scores_full() {
        let score = judge_answer("B", "B", "What is the capacity?", &[], PARTIAL);
        assert_eq!(score, 1.0);
        assert!(!is_cheat_score(score));
    }

    #[test]
    fn correct_answer_with_matching_lookup_scores_partial() {
        // Quiz received at T0 and answered at T0+60s; the lookup at T0+30s
        // asked the same question modulo case/punctuation.
        let lookups = vec!["what is the capacity".to_string()];
        let score = judge_answer("B", "B", "What is the capacity?", &lookups, PARTIAL);
        assert_eq!(score, 0.5);
        assert!(is_cheat_score(score));
    }

    #[test]
    fn unrelated_lookups_are_not_penalized() {
        let lookups = vec![
            "What is the latency?".to_string(),
            "How do I configure logging?".to_string(),
        ];
        let score = judge_answer("B", "B", "What is the capacity?", &lookups, PARTIAL);
        assert_eq!(score, 1.0);
        assert!(!is_cheat_score(score));
    }

    #[test]
    fn ranks_are_dense_and_deterministic() {
        let standings = vec![
            standing(1, 9.0),
            standing(2, 7.5),
            standing(3, 7.5),
            standing(4, 2.0),
        ];

        let entries = assign_ranks(standings);
        let ranks: Vec<i64> = entries.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
        // Tied points keep insertion order: user 2 stays ahead of user 3.
        assert_eq!(entries[1].user_id, 2);
        assert_eq!(entries[2].user_id, 3);
    }

    #[test]
    fn personal_view_appends_self_when_below_podium() {
        let entries = assign_ranks((1..=6).map(|i| standing(i, 10.0 - i as f64)).collect());

        let view = personal_view(&entries, 5);
        assert_eq!(view.len(), 4);
        assert_eq!(view[3].user_id, 5);
        assert_eq!(view[3].rank, 5);
    }

    #[test]
    fn personal_view_does_not_duplicate_podium_members() {
        let entries = assign_ranks((1..=6).map(|i| standing(i, 10.0 - i as f64)).collect());

        let view = personal_view(&entries, 2);
        assert_eq!(view.len(), 3);
        assert_eq!(view.iter().filter(|e| e.user_id == 2).count(), 1);
    }

    #[test]
    fn personal_view_for_absent_caller_is_top3() {
        let entries = assign_ranks((1..=6).map(|i| standing(i, 10.0 - i as f64)).collect());

        let view = personal_view(&entries, 999);
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn personal_view_of_empty_contest_is_empty() {
        let view = personal_view(&[], 1);
        assert!(view.is_empty());
    }
}
