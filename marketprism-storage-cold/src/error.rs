use thiserror::Error;

#[derive(Debug, Error)]
pub enum ColdError {
    #[error("clickhouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),
}
