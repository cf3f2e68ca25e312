//! Export service domain logic for the wealth tracker.
//!
//! Produces a CSV of all posted transactions, oldest first, either as a
//! string for the caller or written to a file in the documents directory.

use anyhow::{anyhow, Result};
use chrono::Utc;
use log::{error, info};
use std::path::{Path, PathBuf};

use shared::ExportDataResponse;

use super::transaction_service::TransactionService;

#[derive(Clone)]
pub struct ExportService {
    transaction_service: TransactionService,
}

impl ExportService {
    pub fn new(transaction_service: TransactionService) -> Self {
        Self { transaction_service }
    }

    pub async fn export_transactions_csv(&self) -> Result<ExportDataResponse> {
        let mut transactions: Vec<_> = self
            .transaction_service
            .all_transactions()
            .await?
            .into_iter()
            .filter(|t| !t.is_template())
            .collect();
        transactions.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.created_at.cmp(&b.created_at)));

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["date", "type", "category", "description", "account", "amount"])?;
        for transaction in &transactions {
            let account = match (&transaction.from_account, &transaction.to_account) {
                (Some(from), Some(to)) if transaction.account.is_none() => format!("{} -> {}", from, to),
                _ => transaction.account.clone().unwrap_or_default(),
            };
            writer.write_record([
                transaction.date.format("%Y-%m-%d").to_string(),
                transaction.transaction_type.as_str().to_string(),
                transaction.category.clone(),
                transaction.description.clone(),
                account,
                format!("{:.2}", transaction.amount),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to finish CSV export: {}", e))?;
        let csv_content = String::from_utf8(bytes)?;

        let filename = format!("wealth_tracker_transactions_{}.csv", Utc::now().format("%Y%m%d"));
        info!(
            "Exported {} transactions ({} bytes) as {}",
            transactions.len(),
            csv_content.len(),
            filename
        );

        Ok(ExportDataResponse {
            csv_content,
            filename,
            transaction_count: transactions.len(),
        })
    }

    /// Documents directory, falling back to the home directory
    pub fn default_export_directory() -> Result<PathBuf> {
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| anyhow!("Could not determine default export directory"))
    }

    /// Write the CSV export into `directory` (or the default location); returns the file path
    pub async fn export_to_path(&self, directory: Option<&Path>) -> Result<PathBuf> {
        let export = self.export_transactions_csv().await?;
        let directory = match directory {
            Some(directory) => directory.to_path_buf(),
            None => Self::default_export_directory()?,
        };

        tokio::fs::create_dir_all(&directory).await.map_err(|e| {
            error!("Failed to create export directory {:?}: {}", directory, e);
            anyhow!("Failed to create export directory: {}", e)
        })?;

        let file_path = directory.join(&export.filename);
        tokio::fs::write(&file_path, &export.csv_content).await.map_err(|e| {
            error!("Failed to write export file {:?}: {}", file_path, e);
            anyhow!("Failed to write export file: {}", e)
        })?;

        info!("Exported {} transactions to {}", export.transaction_count, file_path.display());
        Ok(file_path)
    }
}
