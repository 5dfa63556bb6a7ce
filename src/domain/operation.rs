use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Kind of a ledger movement as it appears in an account's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// Account creation marker, amount 0.
    Init,
    Deposit,
    Withdrawal,
    Transfer,
    /// Transaction fee credited to the admin pool.
    TransFee,
    LoanIssue,
    LoanPayment,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Init => "Init",
            OperationKind::Deposit => "Deposit",
            OperationKind::Withdrawal => "Withdrawal",
            OperationKind::Transfer => "Transfer",
            OperationKind::TransFee => "TransFee",
            OperationKind::LoanIssue => "LoanIssue",
            OperationKind::LoanPayment => "LoanPayment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Init" => Some(OperationKind::Init),
            "Deposit" => Some(OperationKind::Deposit),
            "Withdrawal" => Some(OperationKind::Withdrawal),
            "Transfer" => Some(OperationKind::Transfer),
            "TransFee" => Some(OperationKind::TransFee),
            "LoanIssue" => Some(OperationKind::LoanIssue),
            "LoanPayment" => Some(OperationKind::LoanPayment),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of an account's operation log. Entries are append-only and are
/// never mutated or deleted; their order is the append order assigned by the
/// store. The timestamp is informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub username: String,
    pub timestamp: DateTime<Utc>,
    pub kind: OperationKind,
    /// Signed amount in cents: positive for credits, negative for debits.
    pub amount: Cents,
}

impl Operation {
    pub fn new(username: impl Into<String>, kind: OperationKind, amount: Cents) -> Self {
        Self {
            username: username.into(),
            timestamp: Utc::now(),
            kind,
            amount,
        }
    }
}
