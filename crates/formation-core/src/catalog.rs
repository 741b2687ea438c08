//! Creator-owned catalogue: creators, formations, modules and lessons.
//!
//! Formations are the sellable unit. Their modules and lessons carry an
//! integer `position`; ties are broken by creation order, which the store
//! preserves when listing.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, money::Price};

// ─── Creator ─────────────────────────────────────────────────────────────────

/// A seller. `payout_onboarded` only ever moves from `false` to `true`, and
/// only through a verified provider callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
  pub creator_id:       Uuid,
  pub email:            String,
  pub display_name:     String,
  /// Opaque handle of the creator's sub-account at the payment provider.
  pub payout_account:   Option<String>,
  pub payout_onboarded: bool,
  pub created_at:       DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCreator {
  pub email:          String,
  pub display_name:   String,
  pub payout_account: Option<String>,
}

// ─── Formation ───────────────────────────────────────────────────────────────

/// A sellable course.
///
/// The payout fields are read through from the owning [`Creator`]; there is
/// no separate copy of them to drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formation {
  pub formation_id:     Uuid,
  pub creator_id:       Uuid,
  pub title:            String,
  pub price:            Price,
  pub published:        bool,
  pub payout_account:   Option<String>,
  pub payout_onboarded: bool,
  pub created_at:       DateTime<Utc>,
}

impl Formation {
  /// Whether the creator can receive the split of a sale of this formation.
  pub fn accepts_payment(&self) -> bool {
    self.payout_onboarded && self.payout_account.is_some()
  }
}

#[derive(Debug, Clone)]
pub struct NewFormation {
  pub creator_id: Uuid,
  pub title:      String,
  pub price:      Price,
  pub published:  bool,
}

// ─── Modules & lessons ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
  pub module_id:    Uuid,
  pub formation_id: Uuid,
  pub title:        String,
  pub position:     i64,
  pub created_at:   DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewModule {
  pub formation_id: Uuid,
  pub title:        String,
  pub position:     i64,
}

/// How a lesson's content locator is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonKind {
  Video,
  Document,
  Link,
  Text,
}

impl LessonKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Video => "video",
      Self::Document => "document",
      Self::Link => "link",
      Self::Text => "text",
    }
  }
}

impl fmt::Display for LessonKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for LessonKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "video" => Ok(Self::Video),
      "document" => Ok(Self::Document),
      "link" => Ok(Self::Link),
      "text" => Ok(Self::Text),
      other => Err(Error::UnknownLessonKind(other.to_owned())),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
  pub lesson_id:    Uuid,
  pub module_id:    Uuid,
  /// Resolved through the owning module.
  pub formation_id: Uuid,
  pub title:        String,
  pub kind:         LessonKind,
  /// URL, storage key or inline text, depending on `kind`.
  pub content:      String,
  pub position:     i64,
  pub created_at:   DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLesson {
  pub module_id: Uuid,
  pub title:     String,
  pub kind:      LessonKind,
  pub content:   String,
  pub position:  i64,
}

// ─── Outline ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutline {
  pub module:  Module,
  pub lessons: Vec<Lesson>,
}

/// The ordered content of a formation, as shown to a buyer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormationOutline {
  pub formation_id: Uuid,
  pub title:        String,
  pub modules:      Vec<ModuleOutline>,
}

impl FormationOutline {
  /// Group lessons under their modules. Both inputs are expected in
  /// presentation order; that order is kept.
  pub fn assemble(formation: &Formation, modules: Vec<Module>, lessons: Vec<Lesson>) -> Self {
    let mut outline: Vec<ModuleOutline> = modules
      .into_iter()
      .map(|module| ModuleOutline { module, lessons: Vec::new() })
      .collect();

    for lesson in lessons {
      if let Some(slot) = outline.iter_mut().find(|m| m.module.module_id == lesson.module_id) {
        slot.lessons.push(lesson);
      }
    }

    Self {
      formation_id: formation.formation_id,
      title:        formation.title.clone(),
      modules:      outline,
    }
  }
}
