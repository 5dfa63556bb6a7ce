use std::io::Write;

use anyhow::Context;

use crate::application::{LedgerError, LedgerService};
use crate::domain::format_cents;

/// Exporter for converting ledger data to CSV. Monetary columns are in
/// major units, matching what the balance and movements queries display.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export one account's movements to CSV, oldest first. Gated by the
    /// account owner's secret like the movements query itself.
    pub async fn export_movements_csv<W: Write>(
        &self,
        username: &str,
        secret: &str,
        writer: W,
    ) -> Result<usize, LedgerError> {
        let movements = self.service.movements(username, secret).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer
            .write_record(["account", "timestamp", "operation", "amount"])
            .context("Failed to write CSV header")?;

        let mut count = 0;
        for entry in &movements {
            csv_writer
                .write_record([
                    entry.username.clone(),
                    entry.timestamp.to_rfc3339(),
                    entry.kind.to_string(),
                    format_cents(entry.amount),
                ])
                .context("Failed to write CSV record")?;
            count += 1;
        }

        csv_writer.flush().context("Failed to flush CSV")?;
        Ok(count)
    }

    /// Export every account's funds and debt to CSV (admin-gated).
    pub async fn export_balances_csv<W: Write>(
        &self,
        admin_secret: &str,
        writer: W,
    ) -> Result<usize, LedgerError> {
        let balances = self.service.list_balances(admin_secret).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer
            .write_record(["account", "funds", "debt"])
            .context("Failed to write CSV header")?;

        let mut count = 0;
        for line in &balances {
            csv_writer
                .write_record([
                    line.username.clone(),
                    format_cents(line.funds),
                    format_cents(line.debt),
                ])
                .context("Failed to write CSV record")?;
            count += 1;
        }

        csv_writer.flush().context("Failed to flush CSV")?;
        Ok(count)
    }
}
