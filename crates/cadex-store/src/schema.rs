//! Document store database schema.

/// SQL to create the documents table.
pub const CREATE_DOCUMENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    path        TEXT PRIMARY KEY,
    revision    BIGINT NOT NULL CHECK (revision > 0),
    body        JSONB NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
";
