//! The `LedgerStore` trait.
//!
//! Implemented by storage backends (e.g. `formation-store-sqlite`). Higher
//! layers depend on this abstraction, not on any concrete backend.
//!
//! Deduplication lives here, not in callers: [`LedgerStore::upsert_student`]
//! and [`LedgerStore::insert_purchase`] must be single atomic
//! insert-or-fetch operations backed by a uniqueness constraint, because
//! duplicate deliveries may be handled concurrently by different processes.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  catalog::{Creator, Formation, Lesson, Module, NewCreator, NewFormation, NewLesson, NewModule},
  ledger::{NewPurchase, NewStudent, Purchase, Student, Upserted},
  money::Price,
  progress::Progress,
};

/// Abstraction over the durable ledger.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Creators ──────────────────────────────────────────────────────────

  fn create_creator(
    &self,
    input: NewCreator,
  ) -> impl Future<Output = Result<Creator, Self::Error>> + Send + '_;

  fn get_creator(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Creator>, Self::Error>> + Send + '_;

  /// Flip `payout_onboarded` to `true` for the creator owning
  /// `payout_account`. Never sets it back to `false`. Returns `None` if no
  /// creator owns that account.
  fn mark_payout_onboarded(
    &self,
    payout_account: String,
  ) -> impl Future<Output = Result<Option<Creator>, Self::Error>> + Send + '_;

  // ── Formations ────────────────────────────────────────────────────────

  fn create_formation(
    &self,
    input: NewFormation,
  ) -> impl Future<Output = Result<Formation, Self::Error>> + Send + '_;

  fn get_formation(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Formation>, Self::Error>> + Send + '_;

  /// Returns `None` if the formation does not exist. Past purchases keep the
  /// amount they captured.
  fn update_formation_price(
    &self,
    id: Uuid,
    price: Price,
  ) -> impl Future<Output = Result<Option<Formation>, Self::Error>> + Send + '_;

  fn set_formation_published(
    &self,
    id: Uuid,
    published: bool,
  ) -> impl Future<Output = Result<Option<Formation>, Self::Error>> + Send + '_;

  // ── Outline ───────────────────────────────────────────────────────────

  fn add_module(
    &self,
    input: NewModule,
  ) -> impl Future<Output = Result<Module, Self::Error>> + Send + '_;

  fn add_lesson(
    &self,
    input: NewLesson,
  ) -> impl Future<Output = Result<Lesson, Self::Error>> + Send + '_;

  /// Modules of a formation in presentation order.
  fn list_modules(
    &self,
    formation_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Module>, Self::Error>> + Send + '_;

  fn get_lesson(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Lesson>, Self::Error>> + Send + '_;

  /// Every lesson of a formation, ordered by module position, lesson
  /// position, then creation order.
  fn list_lessons(
    &self,
    formation_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Lesson>, Self::Error>> + Send + '_;

  // ── Students ──────────────────────────────────────────────────────────

  /// Insert a student, or return the existing one with the same email.
  /// Atomic: concurrent calls for one email yield one row.
  fn upsert_student(
    &self,
    input: NewStudent,
  ) -> impl Future<Output = Result<Upserted<Student>, Self::Error>> + Send + '_;

  fn get_student(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  /// `email` must already be normalised.
  fn find_student_by_email(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  /// Mark the student's credential as sent, first replacing the hash with
  /// `replacement` when given. Applies only while the stored hash is still
  /// `expected_hash` and no credential has been sent, so at most one caller
  /// per student gets `true`.
  fn claim_credential_delivery(
    &self,
    student_id: Uuid,
    expected_hash: String,
    replacement: Option<String>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Purchases ─────────────────────────────────────────────────────────

  /// Insert a purchase, or return the existing one with the same
  /// `external_reference`. Atomic: concurrent calls for one reference yield
  /// one row, and exactly one of them reports `created`.
  fn insert_purchase(
    &self,
    input: NewPurchase,
  ) -> impl Future<Output = Result<Upserted<Purchase>, Self::Error>> + Send + '_;

  fn get_purchase_by_reference(
    &self,
    external_reference: String,
  ) -> impl Future<Output = Result<Option<Purchase>, Self::Error>> + Send + '_;

  fn has_purchase(
    &self,
    student_id: Uuid,
    formation_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list_purchases_for_student(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Purchase>, Self::Error>> + Send + '_;

  // ── Progress ──────────────────────────────────────────────────────────

  /// Single-statement upsert keyed by `(student_id, lesson_id)`.
  ///
  /// `completed_at` is the first completion time: repeated completions keep
  /// it, un-completing clears it, and a later completion sets it to `at`.
  fn upsert_progress(
    &self,
    student_id: Uuid,
    lesson_id: Uuid,
    completed: bool,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Progress, Self::Error>> + Send + '_;

  /// The student's progress rows for lessons of `formation_id`.
  fn list_progress(
    &self,
    student_id: Uuid,
    formation_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Progress>, Self::Error>> + Send + '_;
}
