//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings and
//! money exact decimal strings.

use chrono::{DateTime, Utc};
use formation_core::{
  catalog::{Creator, Formation, Lesson, LessonKind, Module},
  ledger::{Purchase, Student},
  money::Price,
  progress::Progress,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Money ───────────────────────────────────────────────────────────────────

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(s.parse::<Decimal>()?) }

pub fn decode_price(s: &str) -> Result<Price> { Ok(Price::new(decode_decimal(s)?)?) }

// ─── Raw rows ────────────────────────────────────────────────────────────────
//
// Column values exactly as SQLite returns them; converted to domain types
// outside the connection closure so parse errors map onto `Error`.

pub const CREATOR_COLUMNS: &str =
  "creator_id, email, display_name, payout_account, payout_onboarded, created_at";

pub struct RawCreator {
  pub creator_id:       String,
  pub email:            String,
  pub display_name:     String,
  pub payout_account:   Option<String>,
  pub payout_onboarded: bool,
  pub created_at:       String,
}

impl RawCreator {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      creator_id:       row.get(0)?,
      email:            row.get(1)?,
      display_name:     row.get(2)?,
      payout_account:   row.get(3)?,
      payout_onboarded: row.get(4)?,
      created_at:       row.get(5)?,
    })
  }

  pub fn into_creator(self) -> Result<Creator> {
    Ok(Creator {
      creator_id:       decode_uuid(&self.creator_id)?,
      email:            self.email,
      display_name:     self.display_name,
      payout_account:   self.payout_account,
      payout_onboarded: self.payout_onboarded,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

/// Formation columns joined with the owning creator's payout state.
pub const FORMATION_SELECT: &str = "
  SELECT f.formation_id, f.creator_id, f.title, f.price, f.published,
         c.payout_account, c.payout_onboarded, f.created_at
  FROM formations f
  JOIN creators c ON c.creator_id = f.creator_id";

pub struct RawFormation {
  pub formation_id:     String,
  pub creator_id:       String,
  pub title:            String,
  pub price:            String,
  pub published:        bool,
  pub payout_account:   Option<String>,
  pub payout_onboarded: bool,
  pub created_at:       String,
}

impl RawFormation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      formation_id:     row.get(0)?,
      creator_id:       row.get(1)?,
      title:            row.get(2)?,
      price:            row.get(3)?,
      published:        row.get(4)?,
      payout_account:   row.get(5)?,
      payout_onboarded: row.get(6)?,
      created_at:       row.get(7)?,
    })
  }

  pub fn into_formation(self) -> Result<Formation> {
    Ok(Formation {
      formation_id:     decode_uuid(&self.formation_id)?,
      creator_id:       decode_uuid(&self.creator_id)?,
      title:            self.title,
      price:            decode_price(&self.price)?,
      published:        self.published,
      payout_account:   self.payout_account,
      payout_onboarded: self.payout_onboarded,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

pub const MODULE_COLUMNS: &str = "module_id, formation_id, title, position, created_at";

pub struct RawModule {
  pub module_id:    String,
  pub formation_id: String,
  pub title:        String,
  pub position:     i64,
  pub created_at:   String,
}

impl RawModule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      module_id:    row.get(0)?,
      formation_id: row.get(1)?,
      title:        row.get(2)?,
      position:     row.get(3)?,
      created_at:   row.get(4)?,
    })
  }

  pub fn into_module(self) -> Result<Module> {
    Ok(Module {
      module_id:    decode_uuid(&self.module_id)?,
      formation_id: decode_uuid(&self.formation_id)?,
      title:        self.title,
      position:     self.position,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Lesson columns with the formation resolved through the module.
pub const LESSON_SELECT: &str = "
  SELECT l.lesson_id, l.module_id, m.formation_id, l.title, l.kind,
         l.content, l.position, l.created_at
  FROM lessons l
  JOIN modules m ON m.module_id = l.module_id";

pub struct RawLesson {
  pub lesson_id:    String,
  pub module_id:    String,
  pub formation_id: String,
  pub title:        String,
  pub kind:         String,
  pub content:      String,
  pub position:     i64,
  pub created_at:   String,
}

impl RawLesson {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      lesson_id:    row.get(0)?,
      module_id:    row.get(1)?,
      formation_id: row.get(2)?,
      title:        row.get(3)?,
      kind:         row.get(4)?,
      content:      row.get(5)?,
      position:     row.get(6)?,
      created_at:   row.get(7)?,
    })
  }

  pub fn into_lesson(self) -> Result<Lesson> {
    Ok(Lesson {
      lesson_id:    decode_uuid(&self.lesson_id)?,
      module_id:    decode_uuid(&self.module_id)?,
      formation_id: decode_uuid(&self.formation_id)?,
      title:        self.title,
      kind:         self.kind.parse::<LessonKind>()?,
      content:      self.content,
      position:     self.position,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const STUDENT_COLUMNS: &str =
  "student_id, email, display_name, credential_hash, credential_sent, created_at";

pub struct RawStudent {
  pub student_id:      String,
  pub email:           String,
  pub display_name:    String,
  pub credential_hash: String,
  pub credential_sent: bool,
  pub created_at:      String,
}

impl RawStudent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:      row.get(0)?,
      email:           row.get(1)?,
      display_name:    row.get(2)?,
      credential_hash: row.get(3)?,
      credential_sent: row.get(4)?,
      created_at:      row.get(5)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id:      decode_uuid(&self.student_id)?,
      email:           self.email,
      display_name:    self.display_name,
      credential_hash: self.credential_hash,
      credential_sent: self.credential_sent,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}

pub const PURCHASE_COLUMNS: &str =
  "purchase_id, student_id, formation_id, amount, external_reference, created_at";

pub struct RawPurchase {
  pub purchase_id:        String,
  pub student_id:         String,
  pub formation_id:       String,
  pub amount:             String,
  pub external_reference: String,
  pub created_at:         String,
}

impl RawPurchase {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      purchase_id:        row.get(0)?,
      student_id:         row.get(1)?,
      formation_id:       row.get(2)?,
      amount:             row.get(3)?,
      external_reference: row.get(4)?,
      created_at:         row.get(5)?,
    })
  }

  pub fn into_purchase(self) -> Result<Purchase> {
    Ok(Purchase {
      purchase_id:        decode_uuid(&self.purchase_id)?,
      student_id:         decode_uuid(&self.student_id)?,
      formation_id:       decode_uuid(&self.formation_id)?,
      amount:             decode_decimal(&self.amount)?,
      external_reference: self.external_reference,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

pub const PROGRESS_COLUMNS: &str = "student_id, lesson_id, completed, completed_at, updated_at";

pub struct RawProgress {
  pub student_id:   String,
  pub lesson_id:    String,
  pub completed:    bool,
  pub completed_at: Option<String>,
  pub updated_at:   String,
}

impl RawProgress {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      student_id:   row.get(0)?,
      lesson_id:    row.get(1)?,
      completed:    row.get(2)?,
      completed_at: row.get(3)?,
      updated_at:   row.get(4)?,
    })
  }

  pub fn into_progress(self) -> Result<Progress> {
    Ok(Progress {
      student_id:   decode_uuid(&self.student_id)?,
      lesson_id:    decode_uuid(&self.lesson_id)?,
      completed:    self.completed,
      completed_at: self.completed_at.as_deref().map(decode_dt).transpose()?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}
