use thiserror::Error;

#[derive(Error, Debug)]
pub enum CasinoError {
    #[error("Not enough funds: requested {requested:.2}, available {available:.2}")]
    InsufficientFunds { requested: f32, available: f32 },

    #[error("Not enough chips: requested {requested}, available {available}")]
    InsufficientChips { requested: u32, available: u32 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(f32),

    #[error("{player} is not holding {machine}")]
    NotHoldingMachine { machine: String, player: String },

    #[error("{player} is not queued at {cashier}")]
    NotQueued { cashier: String, player: String },

    #[error("Wait cancelled for {0}")]
    Cancelled(String),

    #[error("Casino is already open")]
    AlreadyOpen,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Truncated launch parameters: expected {expected} bytes, got {got}")]
    TruncatedParams { expected: usize, got: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl CasinoError {
    /// Expected, locally recovered outcomes of a charge
    pub fn is_insufficient(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. } | Self::InsufficientChips { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CasinoError>;
