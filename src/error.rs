use thiserror::Error;

use crate::models::TrafficClassKey;

#[derive(Error, Debug)]
pub enum Error {
    #[error("duplicate {table} entry for traffic class {key}")]
    DuplicateClassEntry {
        table: &'static str,
        key: TrafficClassKey,
    },
    #[error("{table} for traffic class {key} must be a finite non-negative number (got {value})")]
    InvalidClassValue {
        table: &'static str,
        key: TrafficClassKey,
        value: f64,
    },
    #[error("tokens for traffic class {key} exceed capacity ({tokens} > {capacity})")]
    TokensExceedCapacity {
        key: TrafficClassKey,
        tokens: f64,
        capacity: f64,
    },
    #[error("packet trace must not be empty")]
    EmptyTrace,
    #[error("sim_time must be a finite non-negative number (packet {0})")]
    InvalidSimTime(usize),
    #[error("duplicate packet id {0}")]
    DuplicatePacketId(usize),
    #[error("duplicate device id {0} in topology")]
    DuplicateDeviceId(i64),
    #[error("tie-break seed required when tie_break is seeded")]
    InvalidTieBreakSeed,
    #[error("{0}")]
    ConfigIo(String),
    #[error("{0}")]
    ConfigParse(String),
    #[error("unsupported config format '{0}'")]
    UnsupportedConfigFormat(String),
    #[error("{0}")]
    Output(String),
    #[error("{0}")]
    Cli(String),
}

pub type Result<T> = std::result::Result<T, Error>;
