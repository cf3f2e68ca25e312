use anyhow::Result;
use chrono::NaiveDate;
use log::{info, warn};
use shared::Transaction;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::calendar;
use super::transaction_service::TransactionService;
use super::AlreadyRunning;

/// Materializes recurring transaction templates into concrete transactions
#[derive(Clone)]
pub struct RecurringTransactionService {
    transaction_service: TransactionService,
    run_guard: Arc<Mutex<()>>,
}

impl RecurringTransactionService {
    pub fn new(transaction_service: TransactionService) -> Self {
        Self {
            transaction_service,
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    fn occurrence_of(template: &Transaction, date: NaiveDate) -> Transaction {
        Transaction {
            id: String::new(),
            recurrence: None,
            source_id: Some(template.id.clone()),
            date,
            applied_effects: Vec::new(),
            created_at: Default::default(),
            updated_at: Default::default(),
            ..template.clone()
        }
    }

    /// Create every occurrence of every template dated on or before `today`
    ///
    /// An occurrence whose `(source_id, date)` already exists is skipped, so
    /// running this twice never duplicates anything.
    pub async fn materialize_due(&self, today: NaiveDate) -> Result<Vec<Transaction>> {
        let _running = self
            .run_guard
            .try_lock()
            .map_err(|_| AlreadyRunning("recurring transaction materialization"))?;

        let transactions = self.transaction_service.all_transactions().await?;
        let mut existing: HashSet<(String, NaiveDate)> = transactions
            .iter()
            .filter_map(|t| t.source_id.clone().map(|source| (source, t.date)))
            .collect();

        let mut created = Vec::new();
        for mut template in transactions.into_iter().filter(Transaction::is_template) {
            let Some(mut recurrence) = template.recurrence.clone() else {
                continue;
            };
            let anchor = template.date;
            let mut next = recurrence.next_date.unwrap_or(anchor);
            let starting_next = next;

            while next <= today && recurrence.end_date.map_or(true, |end| next <= end) {
                if existing.insert((template.id.clone(), next)) {
                    match self
                        .transaction_service
                        .record_transaction(Self::occurrence_of(&template, next))
                        .await
                    {
                        Ok(occurrence) => created.push(occurrence),
                        Err(e) => {
                            warn!("Could not materialize '{}' for {}: {}", template.description, next, e);
                            break;
                        }
                    }
                }
                match calendar::next_occurrence(next, anchor, &recurrence) {
                    Some(following) => next = following,
                    None => break,
                }
            }

            if next != starting_next {
                recurrence.next_date = Some(next);
                template.recurrence = Some(recurrence);
                self.transaction_service.save_template(template).await?;
            }
        }

        if !created.is_empty() {
            info!("Materialized {} recurring transaction(s) up to {}", created.len(), today);
        }
        Ok(created)
    }
}
