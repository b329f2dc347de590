//! Saksflyt Store: Schema
//!
//! One-to-many children hang off `cases` with `ON DELETE CASCADE`; audit
//! events carry a monotone `seq` so append order survives any read path.

/// Schema statements, executed in order by [`Store::migrate`](crate::Store::migrate).
pub const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id            TEXT PRIMARY KEY,
        email         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        full_name     TEXT NOT NULL,
        is_active     INTEGER NOT NULL DEFAULT 1,
        is_reviewer   INTEGER NOT NULL DEFAULT 0,
        created_at    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cases (
        id                     TEXT PRIMARY KEY,
        owner_id               TEXT NOT NULL REFERENCES users(id),
        applicant_full_name    TEXT NOT NULL,
        applicant_nationality  TEXT NOT NULL,
        notes                  TEXT,
        status                 TEXT NOT NULL,
        confidence_score       REAL NOT NULL DEFAULT 0,
        risk_level             TEXT,
        recommendation_summary TEXT,
        priority_score         INTEGER NOT NULL DEFAULT 0,
        sla_due_at             TEXT,
        queued_at              TEXT,
        final_decision         TEXT,
        created_at             TEXT NOT NULL,
        updated_at             TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_cases_owner ON cases(owner_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status, queued_at)",
    "CREATE TABLE IF NOT EXISTS documents (
        id                TEXT PRIMARY KEY,
        case_id           TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
        document_type     TEXT NOT NULL,
        original_filename TEXT NOT NULL,
        content_type      TEXT NOT NULL,
        size_bytes        INTEGER NOT NULL,
        storage_key       TEXT NOT NULL,
        status            TEXT NOT NULL,
        extracted_text    TEXT,
        extracted_fields  TEXT NOT NULL DEFAULT '{}',
        failure_reason    TEXT,
        uploaded_at       TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_documents_case ON documents(case_id, uploaded_at)",
    "CREATE TABLE IF NOT EXISTS rule_results (
        id           TEXT PRIMARY KEY,
        case_id      TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
        position     INTEGER NOT NULL,
        rule_code    TEXT NOT NULL,
        rule_name    TEXT NOT NULL,
        passed       INTEGER NOT NULL,
        score        REAL NOT NULL,
        weight       REAL NOT NULL,
        rationale    TEXT NOT NULL,
        evidence     TEXT NOT NULL DEFAULT 'null',
        evaluated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_rule_results_case ON rule_results(case_id, position)",
    "CREATE TABLE IF NOT EXISTS audit_events (
        seq        INTEGER PRIMARY KEY AUTOINCREMENT,
        id         TEXT NOT NULL UNIQUE,
        case_id    TEXT NOT NULL REFERENCES cases(id) ON DELETE CASCADE,
        actor_id   TEXT,
        action     TEXT NOT NULL,
        reason     TEXT,
        metadata   TEXT NOT NULL DEFAULT 'null',
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_audit_case ON audit_events(case_id, seq)",
    "CREATE TABLE IF NOT EXISTS case_locks (
        case_id     TEXT PRIMARY KEY REFERENCES cases(id) ON DELETE CASCADE,
        holder_id   TEXT NOT NULL,
        acquired_at TEXT NOT NULL
    )",
];
