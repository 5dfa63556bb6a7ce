use thiserror::Error;

use crate::domain::Cents;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Account already exists: {0}")]
    DuplicateAccount(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Credential verification failed")]
    AuthFailed,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds in account {username}: balance {funds}, required {required}")]
    InsufficientFunds {
        username: String,
        funds: Cents,
        required: Cents,
    },

    #[error("Account {username} still holds funds {funds} or debt {debt}")]
    AccountNotSettled {
        username: String,
        funds: Cents,
        debt: Cents,
    },

    #[error("Admin pool account is not provisioned")]
    SystemNotProvisioned,

    #[error("Storage contention, operation not applied; safe to retry")]
    TransientStorage,

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
