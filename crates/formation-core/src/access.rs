//! The access gate: does a buyer hold a paid relationship to a formation?
//!
//! The gate fails closed. Unknown buyers, unknown formations and unknown
//! lessons are all "no", and so is a storage failure.

use uuid::Uuid;

use crate::{
  Error, Result,
  catalog::{FormationOutline, Lesson},
  ledger::normalize_email,
  store::LedgerStore,
};

/// How a caller identifies the buyer being checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuyerIdentity {
  Student(Uuid),
  Email(String),
}

/// `true` iff at least one purchase exists for the buyer and formation.
pub async fn can_access<S>(store: &S, buyer: &BuyerIdentity, formation_id: Uuid) -> bool
where
  S: LedgerStore,
{
  match check(store, buyer, formation_id).await {
    Ok(granted) => granted,
    Err(e) => {
      tracing::warn!(%formation_id, error = %e, "access check failed; denying");
      false
    }
  }
}

async fn check<S>(store: &S, buyer: &BuyerIdentity, formation_id: Uuid) -> Result<bool>
where
  S: LedgerStore,
{
  let student_id = match buyer {
    BuyerIdentity::Student(id) => *id,
    BuyerIdentity::Email(raw) => {
      let Ok(email) = normalize_email(raw) else { return Ok(false) };
      match store.find_student_by_email(email).await.map_err(Error::store)? {
        Some(student) => student.student_id,
        None => return Ok(false),
      }
    }
  };

  store
    .has_purchase(student_id, formation_id)
    .await
    .map_err(Error::store)
}

/// Resolve a lesson for a student, or refuse with [`Error::AccessDenied`].
///
/// A missing lesson is reported exactly like a forbidden one.
pub async fn authorize_lesson<S>(store: &S, student_id: Uuid, lesson_id: Uuid) -> Result<Lesson>
where
  S: LedgerStore,
{
  let lesson = match store.get_lesson(lesson_id).await {
    Ok(Some(lesson)) => lesson,
    Ok(None) => return Err(Error::AccessDenied),
    Err(e) => {
      tracing::warn!(%lesson_id, error = %e, "lesson lookup failed; denying");
      return Err(Error::AccessDenied);
    }
  };

  if can_access(store, &BuyerIdentity::Student(student_id), lesson.formation_id).await {
    Ok(lesson)
  } else {
    Err(Error::AccessDenied)
  }
}

/// Refuse with [`Error::AccessDenied`] unless the student bought the formation.
pub async fn authorize_formation<S>(store: &S, student_id: Uuid, formation_id: Uuid) -> Result<()>
where
  S: LedgerStore,
{
  if can_access(store, &BuyerIdentity::Student(student_id), formation_id).await {
    Ok(())
  } else {
    Err(Error::AccessDenied)
  }
}

/// The ordered outline of a formation the student bought.
pub async fn formation_content<S>(
  store: &S,
  student_id: Uuid,
  formation_id: Uuid,
) -> Result<FormationOutline>
where
  S: LedgerStore,
{
  authorize_formation(store, student_id, formation_id).await?;

  let formation = store
    .get_formation(formation_id)
    .await
    .map_err(Error::store)?
    .ok_or(Error::AccessDenied)?;
  let modules = store.list_modules(formation_id).await.map_err(Error::store)?;
  let lessons = store.list_lessons(formation_id).await.map_err(Error::store)?;

  Ok(FormationOutline::assemble(&formation, modules, lessons))
}
