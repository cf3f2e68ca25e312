use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{MonthlySummary, NetWorthSummary, TransactionType};

use super::calendar;
use super::transaction_service::TransactionService;
use crate::storage::{AssetRepository, DataConnection, LiabilityRepository};

/// Totals across assets, liabilities and a month of transactions
///
/// Transfers only move money between the user's own accounts and are left
/// out of every total.
#[derive(Clone)]
pub struct SummaryService {
    asset_repository: AssetRepository,
    liability_repository: LiabilityRepository,
    transaction_service: TransactionService,
}

fn checked_total(values: impl IntoIterator<Item = Decimal>, what: &str) -> Result<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(value))
        .ok_or_else(|| anyhow!("Total {} is too large to represent", what))
}

impl SummaryService {
    pub fn new(connection: &DataConnection, transaction_service: TransactionService) -> Self {
        Self {
            asset_repository: connection.create_asset_repository(),
            liability_repository: connection.create_liability_repository(),
            transaction_service,
        }
    }

    pub async fn net_worth(&self) -> Result<NetWorthSummary> {
        let assets = self.asset_repository.list().await?;
        let total_assets = checked_total(assets.iter().map(|asset| asset.current_value), "asset value")?;
        let liabilities = self.liability_repository.list().await?;
        let total_liabilities = checked_total(liabilities.iter().map(|l| l.balance), "liability balance")?;
        let net_worth = total_assets
            .checked_sub(total_liabilities)
            .ok_or_else(|| anyhow!("Net worth is too large to represent"))?;

        Ok(NetWorthSummary {
            total_assets,
            total_liabilities,
            net_worth,
        })
    }

    pub async fn monthly_summary(&self, year: i32, month: u32) -> Result<MonthlySummary> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| anyhow!("Invalid month {}-{}", year, month))?;
        let end = calendar::clamp_to_month(year, month, 31)
            .ok_or_else(|| anyhow!("Invalid month {}-{}", year, month))?;

        let mut incomes = Vec::new();
        let mut expenses = Vec::new();
        for transaction in self.transaction_service.transactions_between(start, end).await? {
            match transaction.transaction_type {
                TransactionType::Income => incomes.push(transaction.amount),
                TransactionType::Expense => expenses.push(transaction.amount),
                TransactionType::Transfer => {}
            }
        }
        let transaction_count = incomes.len() + expenses.len();
        let income = checked_total(incomes, "income")?;
        let expense = checked_total(expenses, "expense")?;
        let net = income
            .checked_sub(expense)
            .ok_or_else(|| anyhow!("Monthly net is too large to represent"))?;

        Ok(MonthlySummary {
            year,
            month,
            income,
            expense,
            net,
            transaction_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::category_service::CategoryService;
    use crate::storage::test_utils::TestEnvironment;
    use shared::{Asset, AssetType, CreateTransactionRequest, Liability};

    async fn setup() -> (TestEnvironment, TransactionService, SummaryService) {
        let env = TestEnvironment::new().await.unwrap();
        let transactions = TransactionService::new(&env.connection, CategoryService::new(&env.connection));
        let summary = SummaryService::new(&env.connection, transactions.clone());

        for (name, asset_type, value) in [("Wallet", AssetType::Cash, 500), ("Savings", AssetType::Bank, 1500)] {
            env.connection
                .create_asset_repository()
                .save(Asset {
                    id: String::new(),
                    name: name.to_string(),
                    asset_type,
                    quantity: Decimal::ZERO,
                    cost_basis: Decimal::from(value),
                    current_value: Decimal::from(value),
                    stock_code: None,
                    exchange_rate: None,
                    area: None,
                    price_per_unit: None,
                    currency: None,
                    created_at: Default::default(),
                    updated_at: Default::default(),
                })
                .await
                .unwrap();
        }
        (env, transactions, summary)
    }

    fn request(transaction_type: TransactionType, amount: i64, day: u32) -> CreateTransactionRequest {
        CreateTransactionRequest {
            amount: Decimal::from(amount),
            transaction_type,
            category: "misc".to_string(),
            description: String::new(),
            account: Some("Wallet".to_string()),
            from_account: Some("Wallet".to_string()),
            to_account: Some("Savings".to_string()),
            date: NaiveDate::from_ymd_opt(2024, 2, day),
            recurrence: None,
        }
    }

    #[tokio::test]
    async fn test_net_worth() {
        let (env, _transactions, summary) = setup().await;
        env.connection
            .create_liability_repository()
            .save(Liability {
                id: String::new(),
                name: "Card".to_string(),
                liability_type: "credit_card".to_string(),
                balance: Decimal::from(300),
                interest_rate: Decimal::ZERO,
                monthly_payment: Decimal::ZERO,
                payment_day: None,
                payment_account: None,
                remaining_periods: None,
                next_payment_date: None,
                last_payment_date: None,
                created_at: Default::default(),
                updated_at: Default::default(),
            })
            .await
            .unwrap();

        let totals = summary.net_worth().await.unwrap();
        assert_eq!(totals.total_assets, Decimal::from(2000));
        assert_eq!(totals.total_liabilities, Decimal::from(300));
        assert_eq!(totals.net_worth, Decimal::from(1700));
    }

    #[tokio::test]
    async fn test_monthly_summary_excludes_transfers() {
        let (_env, transactions, summary) = setup().await;
        transactions.create_transaction(request(TransactionType::Income, 200, 1)).await.unwrap();
        transactions.create_transaction(request(TransactionType::Expense, 50, 29)).await.unwrap();
        transactions.create_transaction(request(TransactionType::Transfer, 100, 10)).await.unwrap();
        let mut march = request(TransactionType::Expense, 70, 1);
        march.date = NaiveDate::from_ymd_opt(2024, 3, 1);
        transactions.create_transaction(march).await.unwrap();

        let february = summary.monthly_summary(2024, 2).await.unwrap();
        assert_eq!(february.income, Decimal::from(200));
        assert_eq!(february.expense, Decimal::from(50));
        assert_eq!(february.net, Decimal::from(150));
        assert_eq!(february.transaction_count, 2);

        assert!(summary.monthly_summary(2024, 13).await.is_err());
    }

    #[tokio::test]
    async fn test_unrepresentable_net_worth_is_an_error() {
        let (env, _transactions, summary) = setup().await;
        let repository = env.connection.create_asset_repository();
        for mut asset in repository.list().await.unwrap() {
            asset.current_value = Decimal::MAX;
            repository.save(asset).await.unwrap();
        }

        assert!(summary.net_worth().await.is_err());
    }
}
