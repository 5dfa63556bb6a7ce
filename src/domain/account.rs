use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Reserved username of the bank's fee and loan-capital pool.
/// The account is registered like any other, but must exist before any
/// fee-bearing or loan operation can run.
pub const ADMIN_USERNAME: &str = "admin";

/// A customer account. The username is the unique, case-sensitive key and is
/// immutable once created. Funds and debt never go negative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    /// Opaque credential verifier, derived at registration. Never mutated
    /// by ledger operations.
    #[serde(skip)]
    pub credential_hash: String,
    pub funds: Cents,
    pub debt: Cents,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: String, credential_hash: String) -> Self {
        Self {
            username,
            credential_hash,
            funds: 0,
            debt: 0,
            created_at: Utc::now(),
        }
    }

    /// True if the account can cover a debit of `amount` without going
    /// negative.
    pub fn can_debit(&self, amount: Cents) -> bool {
        self.funds >= amount
    }

    /// True if the account holds no funds and owes nothing.
    pub fn is_settled(&self) -> bool {
        self.funds == 0 && self.debt == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(funds: Cents, debt: Cents) -> Account {
        let mut a = Account::new("alice".into(), "hash".into());
        a.funds = funds;
        a.debt = debt;
        a
    }

    #[test]
    fn test_new_account_starts_empty() {
        let a = Account::new("alice".into(), "hash".into());
        assert_eq!(a.funds, 0);
        assert_eq!(a.debt, 0);
        assert!(a.is_settled());
    }

    #[test]
    fn test_can_debit() {
        let a = account(1000, 0);
        assert!(a.can_debit(1000));
        assert!(a.can_debit(0));
        assert!(!a.can_debit(1001));
    }

    #[test]
    fn test_settled_requires_no_funds_and_no_debt() {
        assert!(account(0, 0).is_settled());
        assert!(!account(1, 0).is_settled());
        assert!(!account(0, 1).is_settled());
    }
}
