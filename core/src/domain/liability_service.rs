use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::info;
use rust_decimal::Decimal;
use shared::{CreateLiabilityRequest, Liability};

use super::calendar;
use crate::storage::{DataConnection, LiabilityRepository};

#[derive(Clone)]
pub struct LiabilityService {
    liability_repository: LiabilityRepository,
}

impl LiabilityService {
    pub fn new(connection: &DataConnection) -> Self {
        Self {
            liability_repository: connection.create_liability_repository(),
        }
    }

    fn validate(request: &CreateLiabilityRequest) -> Result<()> {
        if request.name.trim().is_empty() {
            return Err(anyhow!("Liability name cannot be empty"));
        }
        if request.balance < Decimal::ZERO {
            return Err(anyhow!("Liability balance cannot be negative"));
        }
        if request.monthly_payment < Decimal::ZERO {
            return Err(anyhow!("Monthly payment cannot be negative"));
        }
        if let Some(day) = request.payment_day {
            if !(1..=31).contains(&day) {
                return Err(anyhow!("Payment day must be between 1 and 31, got {}", day));
            }
        }
        Ok(())
    }

    /// Recompute `next_payment_date` from the payment day as of `today`
    ///
    /// A month that already has `last_payment_date` in it is skipped.
    pub fn refresh_schedule(liability: &mut Liability, today: NaiveDate) {
        let Some(day) = liability.payment_day else {
            liability.next_payment_date = None;
            return;
        };
        let mut next = calendar::next_payment_date(today, day);
        if let (Some(candidate), Some(last)) = (next, liability.last_payment_date) {
            if candidate <= last {
                next = calendar::add_months_clamped(last, 1, day);
            }
        }
        liability.next_payment_date = next;
    }

    fn apply_request(liability: &mut Liability, request: CreateLiabilityRequest) {
        liability.name = request.name.trim().to_string();
        liability.liability_type = request.liability_type;
        liability.balance = request.balance;
        liability.interest_rate = request.interest_rate;
        liability.monthly_payment = request.monthly_payment;
        liability.payment_day = request.payment_day;
        liability.payment_account = request
            .payment_account
            .map(|account| account.trim().to_string())
            .filter(|account| !account.is_empty());
        liability.remaining_periods = request.remaining_periods;
    }

    pub async fn create_liability(&self, request: CreateLiabilityRequest, today: NaiveDate) -> Result<Liability> {
        Self::validate(&request)?;
        let mut liability = Liability {
            id: String::new(),
            name: String::new(),
            liability_type: String::new(),
            balance: Decimal::ZERO,
            interest_rate: Decimal::ZERO,
            monthly_payment: Decimal::ZERO,
            payment_day: None,
            payment_account: None,
            remaining_periods: None,
            next_payment_date: None,
            last_payment_date: None,
            created_at: Default::default(),
            updated_at: Default::default(),
        };
        Self::apply_request(&mut liability, request);
        Self::refresh_schedule(&mut liability, today);

        let saved = self.liability_repository.save(liability).await?;
        info!(
            "Created liability '{}' with balance {} (next payment {:?})",
            saved.name, saved.balance, saved.next_payment_date
        );
        Ok(saved)
    }

    pub async fn get_liability(&self, id: &str) -> Result<Option<Liability>> {
        self.liability_repository.get(id).await
    }

    pub async fn list_liabilities(&self) -> Result<Vec<Liability>> {
        let mut liabilities = self.liability_repository.list().await?;
        liabilities.sort_by(|a, b| b.balance.cmp(&a.balance));
        Ok(liabilities)
    }

    pub async fn update_liability(
        &self,
        id: &str,
        request: CreateLiabilityRequest,
        today: NaiveDate,
    ) -> Result<Liability> {
        Self::validate(&request)?;
        let mut liability = self
            .liability_repository
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Liability {} not found", id))?;
        Self::apply_request(&mut liability, request);
        Self::refresh_schedule(&mut liability, today);
        self.liability_repository.save(liability).await
    }

    pub async fn delete_liability(&self, id: &str) -> Result<bool> {
        self.liability_repository.delete(id).await
    }
}
