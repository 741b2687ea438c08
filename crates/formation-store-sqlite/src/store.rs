//! [`SqliteStore`], the SQLite implementation of [`LedgerStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use formation_core::{
  catalog::{Creator, Formation, Lesson, Module, NewCreator, NewFormation, NewLesson, NewModule},
  ledger::{NewPurchase, NewStudent, Purchase, Student, Upserted},
  money::Price,
  progress::Progress,
  store::LedgerStore,
};

use crate::{
  Error, Result,
  encode::{
    CREATOR_COLUMNS, FORMATION_SELECT, LESSON_SELECT, MODULE_COLUMNS, PROGRESS_COLUMNS,
    PURCHASE_COLUMNS, RawCreator, RawFormation, RawLesson, RawModule, RawProgress, RawPurchase,
    RawStudent, STUDENT_COLUMNS, encode_decimal, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Ledger tables that can be counted with [`SqliteStore::count_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
  Creators,
  Formations,
  Students,
  Purchases,
  Progress,
}

impl Table {
  pub fn as_str(self) -> &'static str {
    match self {
      Table::Creators => "creators",
      Table::Formations => "formations",
      Table::Students => "students",
      Table::Purchases => "purchases",
      Table::Progress => "progress",
    }
  }
}

/// A formation ledger backed by a single SQLite file.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of rows in `table`.
  pub async fn count_rows(&self, table: Table) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        Ok(conn.query_row(&sql, [], |r| r.get(0))?)
      })
      .await?;
    Ok(u64::try_from(count).unwrap_or_default())
  }

  async fn formation_by_id(&self, id: Uuid) -> Result<Option<Formation>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawFormation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("{FORMATION_SELECT} WHERE f.formation_id = ?1"),
            rusqlite::params![id_str],
            RawFormation::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawFormation::into_formation).transpose()
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = Error;

  // ── Creators ──────────────────────────────────────────────────────────────

  async fn create_creator(&self, input: NewCreator) -> Result<Creator> {
    let creator = Creator {
      creator_id:       Uuid::new_v4(),
      email:            input.email,
      display_name:     input.display_name,
      payout_account:   input.payout_account,
      payout_onboarded: false,
      created_at:       Utc::now(),
    };

    let id_str       = encode_uuid(creator.creator_id);
    let email        = creator.email.clone();
    let display_name = creator.display_name.clone();
    let account      = creator.payout_account.clone();
    let at_str       = encode_dt(creator.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO creators (creator_id, email, display_name, payout_account, payout_onboarded, created_at)
           VALUES (?1, ?2, ?3, ?4, 0, ?5)",
          rusqlite::params![id_str, email, display_name, account, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(creator)
  }

  async fn get_creator(&self, id: Uuid) -> Result<Option<Creator>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawCreator> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CREATOR_COLUMNS} FROM creators WHERE creator_id = ?1"),
            rusqlite::params![id_str],
            RawCreator::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCreator::into_creator).transpose()
  }

  async fn mark_payout_onboarded(&self, payout_account: String) -> Result<Option<Creator>> {
    let raw: Option<RawCreator> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE creators SET payout_onboarded = 1 WHERE payout_account = ?1",
          rusqlite::params![payout_account],
        )?;
        Ok(conn
          .query_row(
            &format!("SELECT {CREATOR_COLUMNS} FROM creators WHERE payout_account = ?1"),
            rusqlite::params![payout_account],
            RawCreator::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCreator::into_creator).transpose()
  }

  // ── Formations ────────────────────────────────────────────────────────────

  async fn create_formation(&self, input: NewFormation) -> Result<Formation> {
    let formation_id = Uuid::new_v4();
    let id_str       = encode_uuid(formation_id);
    let creator_str  = encode_uuid(input.creator_id);
    let price_str    = encode_decimal(input.price.value());
    let at_str       = encode_dt(Utc::now());

    let creator_exists: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM creators WHERE creator_id = ?1",
            rusqlite::params![creator_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          tx.execute(
            "INSERT INTO formations (formation_id, creator_id, title, price, published, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![id_str, creator_str, input.title, price_str, input.published, at_str],
          )?;
        }
        tx.commit()?;
        Ok(exists)
      })
      .await?;

    if !creator_exists {
      return Err(Error::CreatorNotFound(input.creator_id));
    }

    self
      .formation_by_id(formation_id)
      .await?
      .ok_or(Error::FormationNotFound(formation_id))
  }

  async fn get_formation(&self, id: Uuid) -> Result<Option<Formation>> {
    self.formation_by_id(id).await
  }

  async fn update_formation_price(&self, id: Uuid, price: Price) -> Result<Option<Formation>> {
    let id_str    = encode_uuid(id);
    let price_str = encode_decimal(price.value());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE formations SET price = ?2 WHERE formation_id = ?1",
          rusqlite::params![id_str, price_str],
        )?;
        Ok(())
      })
      .await?;

    self.formation_by_id(id).await
  }

  async fn set_formation_published(&self, id: Uuid, published: bool) -> Result<Option<Formation>> {
    let id_str = encode_uuid(id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE formations SET published = ?2 WHERE formation_id = ?1",
          rusqlite::params![id_str, published],
        )?;
        Ok(())
      })
      .await?;

    self.formation_by_id(id).await
  }

  // ── Outline ───────────────────────────────────────────────────────────────

  async fn add_module(&self, input: NewModule) -> Result<Module> {
    let module = Module {
      module_id:    Uuid::new_v4(),
      formation_id: input.formation_id,
      title:        input.title,
      position:     input.position,
      created_at:   Utc::now(),
    };

    let id_str        = encode_uuid(module.module_id);
    let formation_str = encode_uuid(module.formation_id);
    let title         = module.title.clone();
    let position      = module.position;
    let at_str        = encode_dt(module.created_at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO modules (module_id, formation_id, title, position, created_at)
           SELECT ?1, formation_id, ?3, ?4, ?5 FROM formations WHERE formation_id = ?2",
          rusqlite::params![id_str, formation_str, title, position, at_str],
        )?;
        Ok(n == 1)
      })
      .await?;

    if !inserted {
      return Err(Error::FormationNotFound(module.formation_id));
    }
    Ok(module)
  }

  async fn add_lesson(&self, input: NewLesson) -> Result<Lesson> {
    let lesson_id  = Uuid::new_v4();
    let created_at = Utc::now();

    let id_str     = encode_uuid(lesson_id);
    let module_str = encode_uuid(input.module_id);
    let title      = input.title.clone();
    let kind_str   = input.kind.as_str();
    let content    = input.content.clone();
    let position   = input.position;
    let at_str     = encode_dt(created_at);

    let formation_str: Option<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let formation: Option<String> = tx
          .query_row(
            "SELECT formation_id FROM modules WHERE module_id = ?1",
            rusqlite::params![module_str],
            |r| r.get(0),
          )
          .optional()?;
        if formation.is_some() {
          tx.execute(
            "INSERT INTO lessons (lesson_id, module_id, title, kind, content, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![id_str, module_str, title, kind_str, content, position, at_str],
          )?;
        }
        tx.commit()?;
        Ok(formation)
      })
      .await?;

    let formation_id = formation_str
      .ok_or(Error::ModuleNotFound(input.module_id))
      .and_then(|s| Uuid::parse_str(&s).map_err(Error::from))?;

    Ok(Lesson {
      lesson_id,
      module_id: input.module_id,
      formation_id,
      title: input.title,
      kind: input.kind,
      content: input.content,
      position: input.position,
      created_at,
    })
  }

  async fn list_modules(&self, formation_id: Uuid) -> Result<Vec<Module>> {
    let formation_str = encode_uuid(formation_id);

    let raws: Vec<RawModule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MODULE_COLUMNS} FROM modules WHERE formation_id = ?1 ORDER BY position, seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![formation_str], RawModule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawModule::into_module).collect()
  }

  async fn get_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawLesson> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("{LESSON_SELECT} WHERE l.lesson_id = ?1"),
            rusqlite::params![id_str],
            RawLesson::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawLesson::into_lesson).transpose()
  }

  async fn list_lessons(&self, formation_id: Uuid) -> Result<Vec<Lesson>> {
    let formation_str = encode_uuid(formation_id);

    let raws: Vec<RawLesson> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{LESSON_SELECT}
           WHERE m.formation_id = ?1
           ORDER BY m.position, m.seq, l.position, l.seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![formation_str], RawLesson::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLesson::into_lesson).collect()
  }

  // ── Students ──────────────────────────────────────────────────────────────

  async fn upsert_student(&self, input: NewStudent) -> Result<Upserted<Student>> {
    let id_str = encode_uuid(Uuid::new_v4());
    let at_str = encode_dt(Utc::now());

    let (created, raw): (bool, RawStudent) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          "INSERT INTO students (student_id, email, display_name, credential_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (email) DO NOTHING",
          rusqlite::params![
            id_str,
            input.email,
            input.display_name,
            input.credential_hash,
            at_str,
          ],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE email = ?1"),
          rusqlite::params![input.email],
          RawStudent::from_row,
        )?;
        tx.commit()?;
        Ok((inserted == 1, raw))
      })
      .await?;

    Ok(Upserted { record: raw.into_student()?, created })
  }

  async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawStudent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_id = ?1"),
            rusqlite::params![id_str],
            RawStudent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawStudent::into_student).transpose()
  }

  async fn find_student_by_email(&self, email: String) -> Result<Option<Student>> {
    let raw: Option<RawStudent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE email = ?1"),
            rusqlite::params![email],
            RawStudent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawStudent::into_student).transpose()
  }

  async fn claim_credential_delivery(
    &self,
    student_id: Uuid,
    expected_hash: String,
    replacement: Option<String>,
  ) -> Result<bool> {
    let id_str = encode_uuid(student_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE students
           SET credential_hash = COALESCE(?3, credential_hash), credential_sent = 1
           WHERE student_id = ?1 AND credential_hash = ?2 AND credential_sent = 0",
          rusqlite::params![id_str, expected_hash, replacement],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  // ── Purchases ─────────────────────────────────────────────────────────────

  async fn insert_purchase(&self, input: NewPurchase) -> Result<Upserted<Purchase>> {
    let id_str        = encode_uuid(Uuid::new_v4());
    let student_str   = encode_uuid(input.student_id);
    let formation_str = encode_uuid(input.formation_id);
    let amount_str    = encode_decimal(input.amount);
    let at_str        = encode_dt(Utc::now());
    let reference     = input.external_reference;

    let (created, raw): (bool, RawPurchase) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let inserted = tx.execute(
          "INSERT INTO purchases (purchase_id, student_id, formation_id, amount, external_reference, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
           ON CONFLICT (external_reference) DO NOTHING",
          rusqlite::params![id_str, student_str, formation_str, amount_str, reference, at_str],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE external_reference = ?1"),
          rusqlite::params![reference],
          RawPurchase::from_row,
        )?;
        tx.commit()?;
        Ok((inserted == 1, raw))
      })
      .await?;

    Ok(Upserted { record: raw.into_purchase()?, created })
  }

  async fn get_purchase_by_reference(&self, external_reference: String) -> Result<Option<Purchase>> {
    let raw: Option<RawPurchase> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE external_reference = ?1"),
            rusqlite::params![external_reference],
            RawPurchase::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawPurchase::into_purchase).transpose()
  }

  async fn has_purchase(&self, student_id: Uuid, formation_id: Uuid) -> Result<bool> {
    let student_str   = encode_uuid(student_id);
    let formation_str = encode_uuid(formation_id);

    let found = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT 1 FROM purchases WHERE student_id = ?1 AND formation_id = ?2 LIMIT 1",
            rusqlite::params![student_str, formation_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false))
      })
      .await?;

    Ok(found)
  }

  async fn list_purchases_for_student(&self, student_id: Uuid) -> Result<Vec<Purchase>> {
    let student_str = encode_uuid(student_id);

    let raws: Vec<RawPurchase> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE student_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![student_str], RawPurchase::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPurchase::into_purchase).collect()
  }

  // ── Progress ──────────────────────────────────────────────────────────────

  async fn upsert_progress(
    &self,
    student_id: Uuid,
    lesson_id:  Uuid,
    completed:  bool,
    at:         DateTime<Utc>,
  ) -> Result<Progress> {
    let student_str = encode_uuid(student_id);
    let lesson_str  = encode_uuid(lesson_id);
    let at_str      = encode_dt(at);

    let raw: RawProgress = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO progress (student_id, lesson_id, completed, completed_at, updated_at)
           VALUES (?1, ?2, ?3, CASE WHEN ?3 THEN ?4 ELSE NULL END, ?4)
           ON CONFLICT (student_id, lesson_id) DO UPDATE SET
             completed    = excluded.completed,
             completed_at = CASE
               WHEN excluded.completed = 0 THEN NULL
               WHEN progress.completed = 1 THEN progress.completed_at
               ELSE excluded.completed_at
             END,
             updated_at   = excluded.updated_at",
          rusqlite::params![student_str, lesson_str, completed, at_str],
        )?;
        let raw = tx.query_row(
          &format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE student_id = ?1 AND lesson_id = ?2"
          ),
          rusqlite::params![student_str, lesson_str],
          RawProgress::from_row,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_progress()
  }

  async fn list_progress(&self, student_id: Uuid, formation_id: Uuid) -> Result<Vec<Progress>> {
    let student_str   = encode_uuid(student_id);
    let formation_str = encode_uuid(formation_id);

    let raws: Vec<RawProgress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT p.student_id, p.lesson_id, p.completed, p.completed_at, p.updated_at
           FROM progress p
           JOIN lessons l ON l.lesson_id = p.lesson_id
           JOIN modules m ON m.module_id = l.module_id
           WHERE p.student_id = ?1 AND m.formation_id = ?2
           ORDER BY m.position, m.seq, l.position, l.seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![student_str, formation_str], RawProgress::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProgress::into_progress).collect()
  }
}
