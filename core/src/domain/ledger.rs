//! Posting rules: how a transaction moves asset balances.
//!
//! These functions work on an in-memory slice of assets; the caller loads
//! the assets, posts, and saves the assets named in the returned deltas.

use log::warn;
use rust_decimal::Decimal;
use shared::{Asset, AssetType, BalanceDelta, Transaction, TransactionType};
use thiserror::Error;

/// Posting would take a balance outside the representable range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("balance of '{account}' would overflow when changed by {delta}")]
pub struct LedgerError {
    pub account: String,
    pub delta: Decimal,
}

/// Index of the asset an account name refers to
///
/// An asset with exactly this name wins. Otherwise the legacy account names
/// `cash` and `bank` fall back to the first asset of that type.
pub fn locate_account(assets: &[Asset], account: &str) -> Option<usize> {
    let account = account.trim();
    if account.is_empty() {
        return None;
    }
    if let Some(index) = assets.iter().position(|asset| asset.name == account) {
        return Some(index);
    }
    let legacy_type = AssetType::from_legacy_account(account)?;
    assets.iter().position(|asset| asset.asset_type == legacy_type)
}

/// Change an asset's value by `delta`, floored at zero; returns the change actually made
///
/// The asset is left untouched when the new value is not representable.
fn adjust(asset: &mut Asset, delta: Decimal) -> Result<Decimal, LedgerError> {
    let overflow = || LedgerError {
        account: asset.name.clone(),
        delta,
    };
    let before = asset.current_value;
    let after = before.checked_add(delta).ok_or_else(overflow)?.max(Decimal::ZERO);
    let applied = after.checked_sub(before).ok_or_else(overflow)?;
    asset.current_value = after;
    if asset.asset_type.is_cash_like() {
        asset.cost_basis = after;
    }
    Ok(applied)
}

fn post(
    assets: &mut [Asset],
    account: Option<&str>,
    delta: Decimal,
    transaction_id: &str,
) -> Result<Option<BalanceDelta>, LedgerError> {
    let Some(account) = account.filter(|a| !a.trim().is_empty()) else {
        warn!("Transaction {} has no account; skipping balance update", transaction_id);
        return Ok(None);
    };
    let Some(index) = locate_account(assets, account) else {
        warn!("Account '{}' for transaction {} not found; skipping balance update", account, transaction_id);
        return Ok(None);
    };
    let asset = &mut assets[index];
    let applied = adjust(asset, delta)?;
    Ok(Some(BalanceDelta {
        asset_id: asset.id.clone(),
        account: account.to_string(),
        amount: applied,
    }))
}

/// Apply a transaction to the assets it names and return the deltas applied
///
/// Income credits `account`, expense debits it, and a transfer debits
/// `from_account` and credits `to_account`. Debits are floored at zero, so
/// the returned deltas can be smaller than the transaction amount.
///
/// On overflow the slice may be partly updated; callers discard it.
pub fn apply_transaction(assets: &mut [Asset], transaction: &Transaction) -> Result<Vec<BalanceDelta>, LedgerError> {
    let amount = transaction.amount.abs();
    let id = transaction.id.as_str();
    let effects = match transaction.transaction_type {
        TransactionType::Income => vec![post(assets, transaction.account.as_deref(), amount, id)?],
        TransactionType::Expense => vec![post(assets, transaction.account.as_deref(), -amount, id)?],
        TransactionType::Transfer => vec![
            post(assets, transaction.from_account.as_deref(), -amount, id)?,
            post(assets, transaction.to_account.as_deref(), amount, id)?,
        ],
    };
    Ok(effects.into_iter().flatten().collect())
}

/// Undo previously applied deltas; returns how many were reversed
pub fn reverse_effects(assets: &mut [Asset], effects: &[BalanceDelta]) -> Result<usize, LedgerError> {
    let mut reversed = 0;
    for effect in effects.iter().rev() {
        let index = assets
            .iter()
            .position(|asset| asset.id == effect.asset_id)
            .or_else(|| locate_account(assets, &effect.account));
        match index {
            Some(index) => {
                adjust(&mut assets[index], -effect.amount)?;
                reversed += 1;
            }
            None => warn!(
                "Asset '{}' ({}) no longer exists; cannot reverse {}",
                effect.account, effect.asset_id, effect.amount
            ),
        }
    }
    Ok(reversed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn asset(id: &str, name: &str, asset_type: AssetType, value: i64) -> Asset {
        Asset {
            id: id.to_string(),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn transaction(transaction_type: TransactionType, amount: i64) -> Transaction {
        Transaction {
            id: "t1".to_string(),
            amount: Decimal::from(amount),
            transaction_type,
            category: "misc".to_string(),
            description: "test".to_string(),
            account: None,
            from_account: None,
            to_account: None,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            recurrence: None,
            source_id: None,
            liability_id: None,
            applied_effects: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_locate_prefers_name_then_legacy_type() {
        let assets = vec![
            asset("a", "Wallet", AssetType::Cash, 10),
            asset("b", "cash", AssetType::Stock, 10),
            asset("c", "Checking", AssetType::Bank, 10),
        ];
        assert_eq!(locate_account(&assets, "Wallet"), Some(0));
        assert_eq!(locate_account(&assets, "cash"), Some(1));
        assert_eq!(locate_account(&assets, "Bank"), Some(2));
        assert_eq!(locate_account(&assets, "Brokerage"), None);
        assert_eq!(locate_account(&assets, ""), None);
    }

    #[test]
    fn test_expense_is_floored_at_zero() {
        for (value, amount, expected) in [(100, 30, 70), (100, 100, 0), (20, 50, 0)] {
            let mut assets = vec![asset("a", "Wallet", AssetType::Cash, value)];
            let mut expense = transaction(TransactionType::Expense, amount);
            expense.account = Some("Wallet".to_string());

            let effects = apply_transaction(&mut assets, &expense).unwrap();

            assert_eq!(assets[0].current_value, Decimal::from(expected));
            assert_eq!(assets[0].cost_basis, Decimal::from(expected));
            assert_eq!(effects[0].amount, Decimal::from(expected - value));
        }
    }

    #[test]
    fn test_income_keeps_cost_basis_of_investments() {
        let mut assets = vec![asset("s", "Brokerage", AssetType::Stock, 500)];
        let mut income = transaction(TransactionType::Income, 50);
        income.account = Some("Brokerage".to_string());

        apply_transaction(&mut assets, &income).unwrap();

        assert_eq!(assets[0].current_value, Decimal::from(550));
        assert_eq!(assets[0].cost_basis, Decimal::from(500));
    }

    #[test]
    fn test_transfer_preserves_total() {
        let mut assets = vec![
            asset("a", "Wallet", AssetType::Cash, 300),
            asset("b", "Savings", AssetType::Bank, 200),
        ];
        let mut transfer = transaction(TransactionType::Transfer, 150);
        transfer.from_account = Some("Wallet".to_string());
        transfer.to_account = Some("Savings".to_string());

        let effects = apply_transaction(&mut assets, &transfer).unwrap();

        assert_eq!(effects.len(), 2);
        assert_eq!(assets[0].current_value, Decimal::from(150));
        assert_eq!(assets[1].current_value, Decimal::from(350));
        assert_eq!(assets[0].current_value + assets[1].current_value, Decimal::from(500));
    }

    #[test]
    fn test_reverse_restores_balances_even_after_floor() {
        let mut assets = vec![
            asset("a", "Wallet", AssetType::Cash, 40),
            asset("b", "Savings", AssetType::Bank, 10),
        ];
        let mut transfer = transaction(TransactionType::Transfer, 100);
        transfer.from_account = Some("Wallet".to_string());
        transfer.to_account = Some("Savings".to_string());

        let effects = apply_transaction(&mut assets, &transfer).unwrap();
        assert_eq!(assets[0].current_value, Decimal::ZERO);

        assert_eq!(reverse_effects(&mut assets, &effects).unwrap(), 2);
        assert_eq!(assets[0].current_value, Decimal::from(40));
        assert_eq!(assets[1].current_value, Decimal::from(10));
    }

    #[test]
    fn test_unknown_account_is_skipped() {
        let mut assets = vec![asset("a", "Wallet", AssetType::Cash, 40)];
        let mut expense = transaction(TransactionType::Expense, 10);
        expense.account = Some("Nowhere".to_string());

        assert!(apply_transaction(&mut assets, &expense).unwrap().is_empty());
        assert_eq!(assets[0].current_value, Decimal::from(40));
    }

    #[test]
    fn test_overflowing_income_is_rejected_without_change() {
        let mut assets = vec![asset("a", "Wallet", AssetType::Cash, 0)];
        assets[0].current_value = Decimal::MAX;
        let mut income = transaction(TransactionType::Income, 1);
        income.account = Some("Wallet".to_string());

        let error = apply_transaction(&mut assets, &income).unwrap_err();

        assert_eq!(error.account, "Wallet");
        assert_eq!(assets[0].current_value, Decimal::MAX);
    }

    #[test]
    fn test_overflowing_reversal_is_rejected() {
        let mut assets = vec![asset("a", "Wallet", AssetType::Cash, 0)];
        assets[0].current_value = Decimal::MAX;
        let effects = vec![BalanceDelta {
            asset_id: "a".to_string(),
            account: "Wallet".to_string(),
            amount: -Decimal::ONE,
        }];

        assert!(reverse_effects(&mut assets, &effects).is_err());
        assert_eq!(assets[0].current_value, Decimal::MAX);
    }
}
