use super::Cents;

/// Business parameters of the ledger, fixed at service construction.
#[derive(Debug, Clone)]
pub struct LedgerPolicy {
    /// Flat fee charged on withdrawals and transfers, credited to the admin
    /// pool.
    pub transaction_fee: Cents,
    /// Loan interest in basis points, added to debt at issuance.
    /// 1000 = 10%.
    pub interest_rate_bps: i64,
    /// Whether an account may transfer to itself (net effect: the fee).
    pub allow_self_transfer: bool,
    /// Whether deletion requires funds == 0 and debt == 0.
    pub settle_before_delete: bool,
}

impl LedgerPolicy {
    /// Interest surcharge for a loan of `amount`, truncated to whole cents.
    pub fn interest_on(&self, amount: Cents) -> Cents {
        amount * self.interest_rate_bps / 10_000
    }
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            transaction_fee: 99,
            interest_rate_bps: 1000,
            allow_self_transfer: true,
            settle_before_delete: false,
        }
    }
}
