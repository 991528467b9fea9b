use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("clickhouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),
    #[error("spool io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("spooled batch was corrupt or truncated")]
    CorruptSpool,
}

/// A table is missing one or more columns `marketprism` requires.
/// `spec.md` §4.5: the consumer must refuse to run and exit with a
/// distinct code, never insert against a schema it cannot trust.
#[derive(Debug, Error)]
#[error("schema mismatch on table `{table}`: missing columns {missing:?}")]
pub struct SchemaMismatch {
    pub table: &'static str,
    pub missing: Vec<&'static str>,
}
