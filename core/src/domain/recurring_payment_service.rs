//! Liability payment schedules projected into repayment transactions.
//!
//! For every liability with an active schedule, one expense transaction in
//! the `repayment` category is created per calendar month on the payment
//! day (clamped to the month's last day) once that date has arrived. Each
//! payment debits the payment account, reduces the liability balance and
//! moves the schedule to the next month.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::{info, warn};
use rust_decimal::Decimal;
use shared::{Liability, PaymentRecord, PaymentRunReport, Transaction, TransactionType, REPAYMENT_CATEGORY};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::calendar;
use super::category_service::CategoryService;
use super::transaction_service::TransactionService;
use super::AlreadyRunning;
use crate::storage::{DataConnection, LiabilityRepository};

#[derive(Clone)]
pub struct RecurringPaymentService {
    liability_repository: LiabilityRepository,
    transaction_service: TransactionService,
    category_service: CategoryService,
    run_guard: Arc<Mutex<()>>,
}

impl RecurringPaymentService {
    pub fn new(
        connection: &DataConnection,
        transaction_service: TransactionService,
        category_service: CategoryService,
    ) -> Self {
        Self {
            liability_repository: connection.create_liability_repository(),
            transaction_service,
            category_service,
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Repayments already recorded for this liability in the month of `today`
    fn repayments_in_month<'a>(
        transactions: &'a [Transaction],
        liability: &Liability,
        today: NaiveDate,
    ) -> Vec<&'a Transaction> {
        transactions
            .iter()
            .filter(|t| {
                t.category == REPAYMENT_CATEGORY
                    && t.description == liability.name
                    && t.amount == liability.monthly_payment
                    && t.in_month_of(today)
            })
            .collect()
    }

    /// Delete all but the most recently created repayment of the month
    async fn remove_duplicates(&self, liability: &Liability, today: NaiveDate) -> Result<usize> {
        let transactions = self.transaction_service.all_transactions().await?;
        let mut matches = Self::repayments_in_month(&transactions, liability, today);
        if matches.len() <= 1 {
            return Ok(0);
        }

        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut removed = 0;
        for duplicate in &matches[1..] {
            if self.transaction_service.delete_transaction(&duplicate.id).await? {
                removed += 1;
            }
        }
        warn!(
            "Removed {} duplicate repayment(s) for '{}' in {}",
            removed,
            liability.name,
            today.format("%Y-%m")
        );
        Ok(removed)
    }

    /// Remove duplicate repayments of `liability` in the month of `today`,
    /// keeping the most recently created one and reversing the others
    pub async fn cleanup_duplicate_repayments(&self, liability: &Liability, today: NaiveDate) -> Result<usize> {
        let _running = self
            .run_guard
            .try_lock()
            .map_err(|_| AlreadyRunning("payment processing"))?;
        self.remove_duplicates(liability, today).await
    }

    /// Create this month's repayment for every liability whose payment date has arrived
    pub async fn process_due_payments(&self, today: NaiveDate) -> Result<PaymentRunReport> {
        let _running = self
            .run_guard
            .try_lock()
            .map_err(|_| AlreadyRunning("payment processing"))?;

        self.category_service.ensure_defaults().await?;

        let mut report = PaymentRunReport::default();
        for liability in self.liability_repository.list().await? {
            if !liability.has_active_schedule() {
                continue;
            }
            match self.process_liability(liability.clone(), today, &mut report).await {
                Ok(()) => {}
                Err(e) => warn!("Payment for liability '{}' failed: {}", liability.name, e),
            }
        }

        info!(
            "Payment run for {}: {} paid, {} already paid, {} duplicates removed",
            today,
            report.payments.len(),
            report.already_paid.len(),
            report.duplicates_removed
        );
        Ok(report)
    }

    async fn process_liability(
        &self,
        mut liability: Liability,
        today: NaiveDate,
        report: &mut PaymentRunReport,
    ) -> Result<()> {
        let payment_day = liability
            .payment_day
            .ok_or_else(|| anyhow!("Liability {} has no payment day", liability.id))?;
        let due = calendar::payment_date_in_month(today, payment_day)
            .ok_or_else(|| anyhow!("No payment date for day {} in {}", payment_day, today))?;
        let following = calendar::add_months_clamped(due, 1, payment_day);

        report.duplicates_removed += self.remove_duplicates(&liability, today).await?;

        let transactions = self.transaction_service.all_transactions().await?;
        if let Some(existing) = Self::repayments_in_month(&transactions, &liability, today).first() {
            report.already_paid.push(liability.id.clone());
            let behind = liability.next_payment_date.map_or(true, |next| next <= due);
            if behind {
                liability.last_payment_date = Some(existing.date);
                liability.next_payment_date = following;
                self.liability_repository.save(liability).await?;
            }
            return Ok(());
        }

        if due > today {
            if liability.next_payment_date.is_none() {
                liability.next_payment_date = Some(due);
                self.liability_repository.save(liability).await?;
            }
            return Ok(());
        }

        let payment = liability.monthly_payment;
        let transaction = Transaction {
            id: String::new(),
            amount: payment,
            transaction_type: TransactionType::Expense,
            category: REPAYMENT_CATEGORY.to_string(),
            description: liability.name.clone(),
            account: liability.payment_account.clone(),
            from_account: None,
            to_account: None,
            date: due,
            recurrence: None,
            source_id: None,
            liability_id: Some(liability.id.clone()),
            applied_effects: Vec::new(),
            created_at: Default::default(),
            updated_at: Default::default(),
        };
        let recorded = self.transaction_service.record_transaction(transaction).await?;
        if recorded.applied_effects.is_empty() {
            warn!(
                "Payment account '{}' for '{}' was not found; no asset was debited",
                liability.payment_account.as_deref().unwrap_or_default(),
                liability.name
            );
        }

        liability.balance = liability.balance.checked_sub(payment).map_or(Decimal::ZERO, |rest| rest.max(Decimal::ZERO));
        liability.remaining_periods = liability.remaining_periods.map(|n| n.saturating_sub(1));
        liability.last_payment_date = Some(due);
        liability.next_payment_date = following;
        let liability = self.liability_repository.save(liability).await?;

        info!(
            "Paid {} towards '{}' on {}; remaining balance {}",
            payment, liability.name, due, liability.balance
        );
        report.payments.push(PaymentRecord {
            liability_id: liability.id.clone(),
            liability_name: liability.name.clone(),
            transaction_id: recorded.id,
            amount: payment,
            date: due,
            remaining_balance: liability.balance,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::asset_service::AssetService;
    use crate::storage::test_utils::TestEnvironment;
    use chrono::{Duration, Utc};
    use shared::{Asset, AssetType, CreateAssetRequest};

    struct Fixture {
        env: TestEnvironment,
        payments: RecurringPaymentService,
        transactions: TransactionService,
        assets: AssetService,
        checking: Asset,
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn fixture() -> Fixture {
        let env = TestEnvironment::new().await.unwrap();
        let categories = CategoryService::new(&env.connection);
        let transactions = TransactionService::new(&env.connection, categories.clone());
        let payments = RecurringPaymentService::new(&env.connection, transactions.clone(), categories);
        let assets = AssetService::new(&env.connection);
        let checking = assets
            .create_asset(CreateAssetRequest {
                name: "Checking".to_string(),
                asset_type: AssetType::Bank,
                quantity: Decimal::ZERO,
                cost_basis: Decimal::ZERO,
                current_value: Decimal::from(5000),
                stock_code: None,
                exchange_rate: None,
                area: None,
                price_per_unit: None,
                currency: None,
            })
            .await
            .unwrap();
        Fixture {
            env,
            payments,
            transactions,
            assets,
            checking,
        }
    }

    async fn add_liability(env: &TestEnvironment, payment_day: u32) -> Liability {
        let liability = Liability {
            id: String::new(),
            name: "Car loan".to_string(),
            liability_type: "loan".to_string(),
            balance: Decimal::from(1200),
            interest_rate: Decimal::ZERO,
            monthly_payment: Decimal::from(100),
            payment_day: Some(payment_day),
            payment_account: Some("Checking".to_string()),
            remaining_periods: Some(12),
            next_payment_date: None,
            last_payment_date: None,
            created_at: Default::default(),
            updated_at: Default::default(),
        };
        env.connection.create_liability_repository().save(liability).await.unwrap()
    }

    async fn reload(env: &TestEnvironment, id: &str) -> Liability {
        env.connection
            .create_liability_repository()
            .get(id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_payment_day_past_month_end_is_clamped() {
        let f = fixture().await;
        let liability = add_liability(&f.env, 31).await;

        let report = f.payments.process_due_payments(date(2023, 2, 28)).await.unwrap();

        assert_eq!(report.payments.len(), 1);
        let payment = &report.payments[0];
        assert_eq!(payment.date, date(2023, 2, 28));
        assert_eq!(payment.remaining_balance, Decimal::from(1100));

        let stored = reload(&f.env, &liability.id).await;
        assert_eq!(stored.balance, Decimal::from(1100));
        assert_eq!(stored.remaining_periods, Some(11));
        assert_eq!(stored.last_payment_date, Some(date(2023, 2, 28)));
        assert_eq!(stored.next_payment_date, Some(date(2023, 3, 31)));

        let checking = f.assets.get_asset(&f.checking.id).await.unwrap().unwrap();
        assert_eq!(checking.current_value, Decimal::from(4900));

        let transaction = f.transactions.get_transaction(&payment.transaction_id).await.unwrap().unwrap();
        assert_eq!(transaction.category, REPAYMENT_CATEGORY);
        assert_eq!(transaction.description, "Car loan");
        assert_eq!(transaction.liability_id.as_deref(), Some(liability.id.as_str()));
    }

    #[tokio::test]
    async fn test_payment_waits_for_due_date() {
        let f = fixture().await;
        let liability = add_liability(&f.env, 20).await;

        let report = f.payments.process_due_payments(date(2024, 5, 19)).await.unwrap();

        assert!(report.payments.is_empty());
        let stored = reload(&f.env, &liability.id).await;
        assert_eq!(stored.balance, Decimal::from(1200));
        assert_eq!(stored.next_payment_date, Some(date(2024, 5, 20)));
    }

    #[tokio::test]
    async fn test_second_run_in_month_does_not_pay_twice() {
        let f = fixture().await;
        let liability = add_liability(&f.env, 1).await;

        f.payments.process_due_payments(date(2024, 5, 2)).await.unwrap();
        let report = f.payments.process_due_payments(date(2024, 5, 20)).await.unwrap();

        assert!(report.payments.is_empty());
        assert_eq!(report.already_paid, vec![liability.id.clone()]);
        assert_eq!(reload(&f.env, &liability.id).await.balance, Decimal::from(1100));
    }

    #[tokio::test]
    async fn test_duplicates_keep_most_recent() {
        let f = fixture().await;
        let liability = add_liability(&f.env, 10).await;
        let repo = f.env.connection.create_transaction_repository();

        let mut newest_id = String::new();
        for offset in 0..3 {
            let transaction = Transaction {
                id: String::new(),
                amount: Decimal::from(100),
                transaction_type: TransactionType::Expense,
                category: REPAYMENT_CATEGORY.to_string(),
                description: "Car loan".to_string(),
                account: Some("Checking".to_string()),
                from_account: None,
                to_account: None,
                date: date(2024, 5, 10),
                recurrence: None,
                source_id: None,
                liability_id: None,
                applied_effects: Vec::new(),
                created_at: Utc::now() - Duration::minutes(10 - offset),
                updated_at: Default::default(),
            };
            let recorded = f.transactions.record_transaction(transaction).await.unwrap();
            if offset == 2 {
                newest_id = recorded.id;
            }
        }
        assert_eq!(
            f.assets.get_asset(&f.checking.id).await.unwrap().unwrap().current_value,
            Decimal::from(4700)
        );

        let removed = f
            .payments
            .cleanup_duplicate_repayments(&liability, date(2024, 5, 25))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        let remaining = repo.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, newest_id);
        assert_eq!(
            f.assets.get_asset(&f.checking.id).await.unwrap().unwrap().current_value,
            Decimal::from(4900)
        );
    }

    #[tokio::test]
    async fn test_inactive_schedules_are_ignored() {
        let f = fixture().await;
        let mut liability = add_liability(&f.env, 1).await;
        liability.payment_account = None;
        f.env.connection.create_liability_repository().save(liability).await.unwrap();

        let report = f.payments.process_due_payments(date(2024, 5, 2)).await.unwrap();
        assert!(report.payments.is_empty());
        assert!(report.already_paid.is_empty());
    }

    #[tokio::test]
    async fn test_balance_is_floored_at_zero() {
        let f = fixture().await;
        let mut liability = add_liability(&f.env, 1).await;
        liability.balance = Decimal::from(40);
        f.env.connection.create_liability_repository().save(liability.clone()).await.unwrap();

        f.payments.process_due_payments(date(2024, 5, 2)).await.unwrap();

        assert_eq!(reload(&f.env, &liability.id).await.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let f = fixture().await;
        let _held = f.payments.run_guard.lock().await;

        let error = f.payments.process_due_payments(date(2024, 5, 2)).await.unwrap_err();
        assert!(error.downcast_ref::<AlreadyRunning>().is_some());
    }
}
