//! Per-lesson completion tracking.
//!
//! Only the rows are stored. The aggregate percentage is recomputed on every
//! read from the rows and the formation's current lesson list.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{authorize_formation, authorize_lesson},
  catalog::Lesson,
  store::LedgerStore,
};

/// One `(student, lesson)` completion record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
  pub student_id:   Uuid,
  pub lesson_id:    Uuid,
  pub completed:    bool,
  /// First completion time; `None` while not completed.
  pub completed_at: Option<DateTime<Utc>>,
  pub updated_at:   DateTime<Utc>,
}

/// Derived completion of a formation for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
  pub formation_id:      Uuid,
  pub completed_lessons: usize,
  pub total_lessons:     usize,
  /// `completed_lessons * 100 / total_lessons`, rounded down; 0 when the
  /// formation has no lessons.
  pub percent_complete:  u8,
}

impl CompletionSummary {
  pub fn compute(formation_id: Uuid, lessons: &[Lesson], progress: &[Progress]) -> Self {
    let done: HashSet<Uuid> = progress
      .iter()
      .filter(|p| p.completed)
      .map(|p| p.lesson_id)
      .collect();
    let total_lessons = lessons.len();
    let completed_lessons = lessons.iter().filter(|l| done.contains(&l.lesson_id)).count();
    let percent_complete = if total_lessons == 0 {
      0
    } else {
      u8::try_from(completed_lessons * 100 / total_lessons).unwrap_or(100)
    };
    Self { formation_id, completed_lessons, total_lessons, percent_complete }
  }
}

/// Record a lesson as completed (or not) for a student who bought it.
pub async fn mark_lesson_progress<S>(
  store: &S,
  student_id: Uuid,
  lesson_id: Uuid,
  completed: bool,
) -> Result<Progress>
where
  S: LedgerStore,
{
  let lesson = authorize_lesson(store, student_id, lesson_id).await?;
  let progress = store
    .upsert_progress(student_id, lesson.lesson_id, completed, Utc::now())
    .await
    .map_err(Error::store)?;
  tracing::debug!(%student_id, %lesson_id, completed, "progress recorded");
  Ok(progress)
}

/// The student's progress rows within a formation they bought.
pub async fn formation_progress<S>(
  store: &S,
  student_id: Uuid,
  formation_id: Uuid,
) -> Result<Vec<Progress>>
where
  S: LedgerStore,
{
  authorize_formation(store, student_id, formation_id).await?;
  store
    .list_progress(student_id, formation_id)
    .await
    .map_err(Error::store)
}

pub async fn completion_summary<S>(
  store: &S,
  student_id: Uuid,
  formation_id: Uuid,
) -> Result<CompletionSummary>
where
  S: LedgerStore,
{
  authorize_formation(store, student_id, formation_id).await?;
  let lessons = store.list_lessons(formation_id).await.map_err(Error::store)?;
  let progress = store
    .list_progress(student_id, formation_id)
    .await
    .map_err(Error::store)?;
  Ok(CompletionSummary::compute(formation_id, &lessons, &progress))
}
