//! Transaction service domain logic for the wealth tracker.
//!
//! Every write that changes asset balances goes through this service. It
//! holds the posting lock from the moment assets are loaded until they are
//! saved again, so two postings never overwrite each other's balances.

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use log::{error, info};
use rust_decimal::Decimal;
use shared::{
    Asset, CreateTransactionRequest, DeleteTransactionsRequest, DeleteTransactionsResponse, PaginationInfo,
    Transaction, TransactionListRequest, TransactionListResponse, TransactionType, UpdateTransactionRequest,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::category_service::CategoryService;
use super::ledger;
use crate::storage::{AssetRepository, DataConnection, TransactionRepository};

const MAX_DESCRIPTION_LENGTH: usize = 256;
const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_RECURRENCE_INTERVAL: u32 = 1200;

#[derive(Clone)]
pub struct TransactionService {
    transaction_repository: TransactionRepository,
    asset_repository: AssetRepository,
    category_service: CategoryService,
    posting_lock: Arc<Mutex<()>>,
}

impl TransactionService {
    pub fn new(connection: &DataConnection, category_service: CategoryService) -> Self {
        Self {
            transaction_repository: connection.create_transaction_repository(),
            asset_repository: connection.create_asset_repository(),
            category_service,
            posting_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn validate(transaction: &Transaction) -> Result<()> {
        if transaction.amount <= Decimal::ZERO {
            return Err(anyhow!("Amount must be greater than 0"));
        }
        if transaction.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(anyhow!(
                "Description must be at most {} characters",
                MAX_DESCRIPTION_LENGTH
            ));
        }
        if let Some(recurrence) = &transaction.recurrence {
            if !(1..=MAX_RECURRENCE_INTERVAL).contains(&recurrence.interval) {
                return Err(anyhow!(
                    "Recurrence interval must be between 1 and {}",
                    MAX_RECURRENCE_INTERVAL
                ));
            }
        }

        let named = |account: &Option<String>| account.as_deref().map_or(false, |a| !a.trim().is_empty());
        match transaction.transaction_type {
            TransactionType::Income | TransactionType::Expense => {
                if !named(&transaction.account) {
                    return Err(anyhow!(
                        "An {} transaction needs an account",
                        transaction.transaction_type.as_str()
                    ));
                }
            }
            TransactionType::Transfer => {
                if !named(&transaction.from_account) || !named(&transaction.to_account) {
                    return Err(anyhow!("A transfer needs both a source and a destination account"));
                }
                if transaction.from_account.as_deref().map(str::trim) == transaction.to_account.as_deref().map(str::trim) {
                    return Err(anyhow!("A transfer cannot move money into the account it comes from"));
                }
            }
        }
        Ok(())
    }

    /// Save the assets whose ids appear in `touched`
    async fn save_assets(&self, assets: &[Asset], touched: &HashSet<String>) -> Result<()> {
        for asset in assets.iter().filter(|asset| touched.contains(&asset.id)) {
            self.asset_repository.save(asset.clone()).await?;
        }
        Ok(())
    }

    /// Post and store a transaction; the caller must hold the posting lock
    async fn post_locked(&self, mut transaction: Transaction) -> Result<Transaction> {
        if !transaction.is_template() {
            let mut assets = self.asset_repository.list().await?;
            let effects = ledger::apply_transaction(&mut assets, &transaction)?;
            let touched = effects.iter().map(|e| e.asset_id.clone()).collect();
            self.save_assets(&assets, &touched).await?;
            transaction.applied_effects = effects;
        }
        self.transaction_repository.save(transaction).await
    }

    /// Validate, post and store a fully formed transaction
    pub async fn record_transaction(&self, transaction: Transaction) -> Result<Transaction> {
        Self::validate(&transaction)?;
        let category = transaction.category.clone();
        let transaction_type = transaction.transaction_type;

        let saved = {
            let _posting = self.posting_lock.lock().await;
            self.post_locked(transaction).await?
        };

        if !saved.is_template() {
            if let Err(e) = self.category_service.increment_usage(&category, transaction_type).await {
                error!("Failed to count usage of category '{}': {}", category, e);
            }
        }
        Ok(saved)
    }

    pub async fn create_transaction(&self, request: CreateTransactionRequest) -> Result<Transaction> {
        let date = request.date.unwrap_or_else(|| Local::now().date_naive());
        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            amount: request.amount,
            transaction_type: request.transaction_type,
            category: request.category.trim().to_string(),
            description: request.description,
            account: request.account,
            from_account: request.from_account,
            to_account: request.to_account,
            date,
            recurrence: request.recurrence,
            source_id: None,
            liability_id: None,
            applied_effects: Vec::new(),
            created_at: Default::default(),
            updated_at: Default::default(),
        };

        let saved = self.record_transaction(transaction).await?;
        info!(
            "Created {} transaction {} for {} on {}",
            saved.transaction_type.as_str(),
            saved.id,
            saved.amount,
            saved.date
        );
        Ok(saved)
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>> {
        self.transaction_repository.get(id).await
    }

    /// All stored transactions, templates included, in storage order
    pub async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.transaction_repository.list().await
    }

    /// Replace the stored copy of a template without touching balances
    pub(crate) async fn save_template(&self, template: Transaction) -> Result<Transaction> {
        self.transaction_repository.save(template).await
    }

    /// Change a transaction, moving its balance effects from the old values to the new ones
    pub async fn update_transaction(&self, id: &str, request: UpdateTransactionRequest) -> Result<Transaction> {
        let _posting = self.posting_lock.lock().await;

        let mut transaction = self
            .transaction_repository
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Transaction {} not found", id))?;

        let mut assets = self.asset_repository.list().await?;
        let mut touched: HashSet<String> = transaction.applied_effects.iter().map(|e| e.asset_id.clone()).collect();
        ledger::reverse_effects(&mut assets, &transaction.applied_effects)?;

        if let Some(amount) = request.amount {
            transaction.amount = amount;
        }
        if let Some(transaction_type) = request.transaction_type {
            transaction.transaction_type = transaction_type;
        }
        if let Some(category) = request.category {
            transaction.category = category.trim().to_string();
        }
        if let Some(description) = request.description {
            transaction.description = description;
        }
        if let Some(account) = request.account {
            transaction.account = Some(account);
        }
        if let Some(from_account) = request.from_account {
            transaction.from_account = Some(from_account);
        }
        if let Some(to_account) = request.to_account {
            transaction.to_account = Some(to_account);
        }
        if let Some(date) = request.date {
            transaction.date = date;
        }
        Self::validate(&transaction)?;

        transaction.applied_effects = if transaction.is_template() {
            Vec::new()
        } else {
            ledger::apply_transaction(&mut assets, &transaction)?
        };
        touched.extend(transaction.applied_effects.iter().map(|e| e.asset_id.clone()));

        self.save_assets(&assets, &touched).await?;
        let saved = self.transaction_repository.save(transaction).await?;
        info!("Updated transaction {}", saved.id);
        Ok(saved)
    }

    /// Delete a transaction and undo its balance effects; false if it did not exist
    pub async fn delete_transaction(&self, id: &str) -> Result<bool> {
        let _posting = self.posting_lock.lock().await;

        let Some(transaction) = self.transaction_repository.get(id).await? else {
            return Ok(false);
        };

        if !transaction.applied_effects.is_empty() {
            let mut assets = self.asset_repository.list().await?;
            ledger::reverse_effects(&mut assets, &transaction.applied_effects)?;
            let touched = transaction.applied_effects.iter().map(|e| e.asset_id.clone()).collect();
            self.save_assets(&assets, &touched).await?;
        }

        let deleted = self.transaction_repository.delete(&transaction.id).await?;
        if deleted {
            info!("Deleted transaction {} ({})", transaction.id, transaction.description);
        }
        Ok(deleted)
    }

    pub async fn delete_transactions(&self, request: DeleteTransactionsRequest) -> Result<DeleteTransactionsResponse> {
        if request.transaction_ids.is_empty() {
            return Err(anyhow!("No transaction ids given"));
        }

        let mut deleted_count = 0;
        let mut not_found_ids = Vec::new();
        for id in &request.transaction_ids {
            if self.delete_transaction(id).await? {
                deleted_count += 1;
            } else {
                not_found_ids.push(id.clone());
            }
        }

        let success_message = if not_found_ids.is_empty() {
            format!("Deleted {} transaction(s)", deleted_count)
        } else {
            format!(
                "Deleted {} transaction(s); {} not found",
                deleted_count,
                not_found_ids.len()
            )
        };
        info!("{}", success_message);

        Ok(DeleteTransactionsResponse {
            deleted_count,
            success_message,
            not_found_ids,
        })
    }

    /// Newest first, filtered, with cursor pagination on transaction id
    pub async fn list_transactions(&self, request: TransactionListRequest) -> Result<TransactionListResponse> {
        let limit = request.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1) as usize;

        let mut transactions: Vec<Transaction> = self
            .transaction_repository
            .list()
            .await?
            .into_iter()
            .filter(|t| request.start_date.map_or(true, |start| t.date >= start))
            .filter(|t| request.end_date.map_or(true, |end| t.date <= end))
            .filter(|t| {
                request
                    .category
                    .as_deref()
                    .map_or(true, |category| t.category.eq_ignore_ascii_case(category))
            })
            .filter(|t| request.transaction_type.map_or(true, |kind| t.transaction_type == kind))
            .collect();

        transactions.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let start = match request.after.as_deref() {
            Some(cursor) => transactions
                .iter()
                .position(|t| t.id == cursor)
                .map(|index| index + 1)
                .ok_or_else(|| anyhow!("Unknown pagination cursor {}", cursor))?,
            None => 0,
        };

        let mut page: Vec<Transaction> = transactions.into_iter().skip(start).take(limit + 1).collect();
        let has_more = page.len() > limit;
        page.truncate(limit);
        let next_cursor = if has_more { page.last().map(|t| t.id.clone()) } else { None };

        Ok(TransactionListResponse {
            transactions: page,
            pagination: PaginationInfo { has_more, next_cursor },
        })
    }

    /// Transactions dated within `[start, end]`, templates excluded
    pub async fn transactions_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>> {
        Ok(self
            .transaction_repository
            .list()
            .await?
            .into_iter()
            .filter(|t| !t.is_template() && t.date >= start && t.date <= end)
            .collect())
    }
}
