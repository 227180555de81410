//! SQL migration definitions for the clipping database.
//!
//! Migrations are applied in order on database open. Table and column names
//! keep the layout of existing clipping databases so they can be opened as-is.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: noticias, scoring, coletas",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- News items, deduplicated by link
CREATE TABLE IF NOT EXISTS noticias (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    titulo             TEXT NOT NULL,
    link               TEXT NOT NULL UNIQUE,
    resumo             TEXT,
    fonte              TEXT NOT NULL,
    data_coleta        TEXT NOT NULL,
    data_publicacao    TEXT,
    content            TEXT,
    title_extracted    TEXT,
    word_count         INTEGER DEFAULT 0,
    extraction_success INTEGER DEFAULT 0,
    favorita           INTEGER DEFAULT 0,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_noticias_fonte ON noticias(fonte);
CREATE INDEX IF NOT EXISTS idx_noticias_data_coleta ON noticias(data_coleta);

-- At most one scoring row per item (delete-then-insert)
CREATE TABLE IF NOT EXISTS scoring (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    noticia_id         INTEGER NOT NULL REFERENCES noticias(id) ON DELETE CASCADE,
    score_interesse    REAL NOT NULL DEFAULT 0,
    score_risco        REAL NOT NULL DEFAULT 0,
    relevancia         TEXT NOT NULL,
    eixo_principal     TEXT,
    termos_encontrados INTEGER DEFAULT 0,
    termos_detalhes    TEXT,
    scoring_version    TEXT NOT NULL,
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scoring_relevancia ON scoring(relevancia);
CREATE INDEX IF NOT EXISTS idx_scoring_noticia ON scoring(noticia_id);

-- Append-only collection log
CREATE TABLE IF NOT EXISTS coletas (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    data_execucao       TEXT NOT NULL,
    fonte               TEXT NOT NULL,
    noticias_coletadas  INTEGER DEFAULT 0,
    noticias_novas      INTEGER DEFAULT 0,
    noticias_duplicadas INTEGER DEFAULT 0,
    tempo_execucao      REAL DEFAULT 0,
    status              TEXT NOT NULL,
    observacoes         TEXT,
    created_at          TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
