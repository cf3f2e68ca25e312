use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Category assigned to transactions generated from liability payment schedules
pub const REPAYMENT_CATEGORY: &str = "repayment";

/// Direction of a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money received into an account
    Income,
    /// Money paid out of an account
    #[default]
    Expense,
    /// Money moved between two accounts
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Transfer => "transfer",
        }
    }
}

/// How often a recurring transaction template repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

fn default_interval() -> u32 {
    1
}

/// Recurrence metadata carried by a transaction template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    /// Number of frequency units between occurrences
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Next occurrence that has not been materialized yet
    #[serde(default)]
    pub next_date: Option<NaiveDate>,
    /// Last date (inclusive) an occurrence may fall on
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// A change applied to one asset's current value while posting a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub asset_id: String,
    pub account: String,
    #[serde(default)]
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub id: String,
    /// Always non-negative; the direction comes from `transaction_type`
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default, rename = "type", alias = "transaction_type")]
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Account name for income and expense transactions
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default, alias = "fromAccount")]
    pub from_account: Option<String>,
    #[serde(default, alias = "toAccount")]
    pub to_account: Option<String>,
    pub date: NaiveDate,
    /// Present on recurring templates only
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// Template this transaction was materialized from
    #[serde(default)]
    pub source_id: Option<String>,
    /// Liability whose payment schedule generated this transaction
    #[serde(default)]
    pub liability_id: Option<String>,
    /// Balance deltas actually applied when this transaction was posted
    #[serde(default)]
    pub applied_effects: Vec<BalanceDelta>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_template(&self) -> bool {
        self.recurrence.is_some()
    }

    /// True when the transaction date falls in the same calendar month as `date`
    pub fn in_month_of(&self, date: NaiveDate) -> bool {
        self.date.year() == date.year() && self.date.month() == date.month()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default, alias = "fromAccount")]
    pub from_account: Option<String>,
    #[serde(default, alias = "toAccount")]
    pub to_account: Option<String>,
    /// Defaults to today when omitted
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
}

/// Partial update; fields left as `None` keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTransactionRequest {
    pub amount: Option<Decimal>,
    pub transaction_type: Option<TransactionType>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub account: Option<String>,
    pub from_account: Option<String>,
    pub to_account: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionListRequest {
    /// Cursor for pagination - transaction ID to start after
    pub after: Option<String>,
    /// Maximum number of transactions to return
    pub limit: Option<u32>,
    /// Inclusive lower bound on the transaction date
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the transaction date
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<Transaction>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteTransactionsRequest {
    pub transaction_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteTransactionsResponse {
    pub deleted_count: usize,
    pub success_message: String,
    pub not_found_ids: Vec<String>,
}

/// Kind of holding an asset represents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Cash,
    Bank,
    Stock,
    Fund,
    RealEstate,
    Crypto,
    #[default]
    #[serde(other)]
    Other,
}

impl AssetType {
    /// Cash and bank holdings have no separate cost basis
    pub fn is_cash_like(&self) -> bool {
        matches!(self, AssetType::Cash | AssetType::Bank)
    }

    /// Legacy account names that resolve to an asset type rather than an asset name
    pub fn from_legacy_account(account: &str) -> Option<Self> {
        match account.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(AssetType::Cash),
            "bank" => Some(AssetType::Bank),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type", alias = "asset_type")]
    pub asset_type: AssetType,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub cost_basis: Decimal,
    #[serde(default)]
    pub current_value: Decimal,
    #[serde(default)]
    pub stock_code: Option<String>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    /// Floor area for real estate
    #[serde(default)]
    pub area: Option<Decimal>,
    /// Unit price: per share for stocks, per area unit for real estate
    #[serde(default)]
    pub price_per_unit: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAssetRequest {
    pub name: String,
    pub asset_type: AssetType,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub cost_basis: Decimal,
    #[serde(default)]
    pub current_value: Decimal,
    #[serde(default)]
    pub stock_code: Option<String>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(default)]
    pub area: Option<Decimal>,
    #[serde(default)]
    pub price_per_unit: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liability {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub liability_type: String,
    #[serde(default)]
    pub balance: Decimal,
    /// Annual rate as a percentage
    #[serde(default)]
    pub interest_rate: Decimal,
    #[serde(default)]
    pub monthly_payment: Decimal,
    /// Day of month the payment is due (1-31); clamped to month end
    #[serde(default)]
    pub payment_day: Option<u32>,
    /// Name of the asset the payment is drawn from
    #[serde(default)]
    pub payment_account: Option<String>,
    #[serde(default)]
    pub remaining_periods: Option<u32>,
    #[serde(default)]
    pub next_payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl Liability {
    /// Whether the automatic payment schedule should run for this liability
    pub fn has_active_schedule(&self) -> bool {
        self.monthly_payment > Decimal::ZERO
            && self.balance > Decimal::ZERO
            && self.payment_day.is_some()
            && self
                .payment_account
                .as_deref()
                .map_or(false, |account| !account.trim().is_empty())
            && self.remaining_periods != Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLiabilityRequest {
    pub name: String,
    #[serde(default)]
    pub liability_type: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub interest_rate: Decimal,
    #[serde(default)]
    pub monthly_payment: Decimal,
    #[serde(default)]
    pub payment_day: Option<u32>,
    #[serde(default)]
    pub payment_account: Option<String>,
    #[serde(default)]
    pub remaining_periods: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    #[default]
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type", alias = "category_type")]
    pub category_type: CategoryType,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub category_type: CategoryType,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetWorthSummary {
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub net_worth: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub year: i32,
    pub month: u32,
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub transaction_count: usize,
}

/// One repayment made by the payment scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub liability_id: String,
    pub liability_name: String,
    pub transaction_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub remaining_balance: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentRunReport {
    pub payments: Vec<PaymentRecord>,
    /// Liabilities whose payment for this month already existed
    pub already_paid: Vec<String>,
    pub duplicates_removed: usize,
}

/// Outcome of reconciling one table between local and remote storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub table: String,
    pub pushed: usize,
    pub remote_deleted: usize,
    pub pulled: usize,
    pub removed_locally: usize,
    /// Local records the remote never held, queued and uploaded again
    #[serde(default)]
    pub requeued: usize,
    /// Changes still waiting for a successful remote write
    pub pending: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDataResponse {
    pub csv_content: String,
    pub filename: String,
    pub transaction_count: usize,
}
