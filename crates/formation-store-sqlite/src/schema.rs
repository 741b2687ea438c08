//! SQL schema for the formation SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS creators (
    creator_id       TEXT PRIMARY KEY,
    email            TEXT NOT NULL,
    display_name     TEXT NOT NULL,
    payout_account   TEXT UNIQUE,
    payout_onboarded INTEGER NOT NULL DEFAULT 0 CHECK (payout_onboarded IN (0, 1)),
    created_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS formations (
    formation_id TEXT PRIMARY KEY,
    creator_id   TEXT NOT NULL REFERENCES creators(creator_id),
    title        TEXT NOT NULL,
    price        TEXT NOT NULL,    -- decimal string, two fractional digits max
    published    INTEGER NOT NULL DEFAULT 0 CHECK (published IN (0, 1)),
    created_at   TEXT NOT NULL
);

-- `seq` records creation order; it breaks ties between equal positions.
CREATE TABLE IF NOT EXISTS modules (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    module_id    TEXT NOT NULL UNIQUE,
    formation_id TEXT NOT NULL REFERENCES formations(formation_id),
    title        TEXT NOT NULL,
    position     INTEGER NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lessons (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    lesson_id  TEXT NOT NULL UNIQUE,
    module_id  TEXT NOT NULL REFERENCES modules(module_id),
    title      TEXT NOT NULL,
    kind       TEXT NOT NULL CHECK (kind IN ('video', 'document', 'link', 'text')),
    content    TEXT NOT NULL,
    position   INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    student_id      TEXT PRIMARY KEY,
    email           TEXT NOT NULL UNIQUE,   -- normalised by the caller
    display_name    TEXT NOT NULL,
    credential_hash TEXT NOT NULL,
    credential_sent INTEGER NOT NULL DEFAULT 0 CHECK (credential_sent IN (0, 1)),
    created_at      TEXT NOT NULL
);

-- Purchases are append-only. The UNIQUE on external_reference is the
-- fulfillment idempotency boundary.
CREATE TABLE IF NOT EXISTS purchases (
    purchase_id        TEXT PRIMARY KEY,
    student_id         TEXT NOT NULL REFERENCES students(student_id),
    formation_id       TEXT NOT NULL REFERENCES formations(formation_id),
    amount             TEXT NOT NULL,       -- decimal string, as captured
    external_reference TEXT NOT NULL UNIQUE,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS progress (
    student_id   TEXT NOT NULL REFERENCES students(student_id),
    lesson_id    TEXT NOT NULL REFERENCES lessons(lesson_id),
    completed    INTEGER NOT NULL CHECK (completed IN (0, 1)),
    completed_at TEXT,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (student_id, lesson_id),
    CHECK ((completed = 1) = (completed_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS formations_creator_idx  ON formations(creator_id);
CREATE INDEX IF NOT EXISTS modules_formation_idx   ON modules(formation_id);
CREATE INDEX IF NOT EXISTS lessons_module_idx      ON lessons(module_id);
CREATE INDEX IF NOT EXISTS purchases_access_idx    ON purchases(student_id, formation_id);

PRAGMA user_version = 1;
";
