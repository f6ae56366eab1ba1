//! Error taxonomy for the migration pipeline.
//!
//! Each variant maps to one pipeline stage so the CLI can report a single
//! `error kind @ stage` line. Normalization failures are not represented
//! here: the predicate normalizer falls back to its string path and the raw
//! form is used.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file}:{line}: {message}")]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("invalid declaration at {field_path}: {message}")]
    Decl { field_path: String, message: String },

    #[error("relation not found: {relation}")]
    RelationNotFound { relation: String },

    #[error("catalog query failed: {0}")]
    Introspection(#[source] tokio_postgres::Error),

    #[error("inconsistent diff input: {0}")]
    Diff(String),

    #[error("cannot render statement: {0}")]
    Emission(String),

    #[error("statement {stmt_index} failed, transaction rolled back: {source}")]
    Apply {
        stmt_index: usize,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("{count} destructive operation(s) blocked; re-run with --allow-destructive")]
    DestructiveBlocked { count: usize },

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("deadline of {0} s exceeded")]
    Timeout(u64),
}

impl Error {
    /// Pipeline stage this error belongs to, for one-line CLI reporting.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Io { .. } | Error::Parse { .. } => "parse",
            Error::Decl { .. } => "generate",
            Error::RelationNotFound { .. } | Error::Introspection(_) => "introspect",
            Error::Diff(_) => "diff",
            Error::Emission(_) | Error::DestructiveBlocked { .. } => "emit",
            Error::Apply { .. } => "apply",
            Error::Pool(_) | Error::Postgres(_) | Error::Timeout(_) => "connect",
        }
    }

    /// Wrap a filesystem error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Declaration error at `Struct.field`.
    pub fn decl(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decl {
            field_path: field_path.into(),
            message: message.into(),
        }
    }
}
