use anyhow::{anyhow, Result};
use log::info;
use rust_decimal::Decimal;
use shared::{Asset, AssetType, CreateAssetRequest};

use crate::storage::{AssetRepository, DataConnection};

#[derive(Clone)]
pub struct AssetService {
    asset_repository: AssetRepository,
}

impl AssetService {
    pub fn new(connection: &DataConnection) -> Self {
        Self {
            asset_repository: connection.create_asset_repository(),
        }
    }

    /// Derive `current_value` and `cost_basis` from the asset's own fields
    ///
    /// Stocks with a known price are valued at quantity × price × exchange
    /// rate, real estate at area × unit price. Cash and bank holdings carry
    /// their value as cost basis. Values never go below zero.
    pub fn normalize_values(asset: &mut Asset) -> Result<()> {
        let too_large = || anyhow!("Value of asset '{}' is too large", asset.name);
        let derived = match asset.asset_type {
            AssetType::Stock | AssetType::Fund | AssetType::Crypto => match asset.price_per_unit {
                Some(price) => {
                    let rate = asset.exchange_rate.unwrap_or(Decimal::ONE);
                    let value = asset
                        .quantity
                        .checked_mul(price)
                        .and_then(|value| value.checked_mul(rate))
                        .ok_or_else(too_large)?;
                    Some(value)
                }
                None => None,
            },
            AssetType::RealEstate => match (asset.area, asset.price_per_unit) {
                (Some(area), Some(price)) => Some(area.checked_mul(price).ok_or_else(too_large)?),
                _ => None,
            },
            _ => None,
        };

        if let Some(value) = derived {
            asset.current_value = value;
        }
        asset.current_value = asset.current_value.max(Decimal::ZERO);
        if asset.asset_type.is_cash_like() {
            asset.cost_basis = asset.current_value;
        }
        Ok(())
    }

    fn validate(request: &CreateAssetRequest) -> Result<()> {
        if request.name.trim().is_empty() {
            return Err(anyhow!("Asset name cannot be empty"));
        }
        if request.quantity < Decimal::ZERO || request.current_value < Decimal::ZERO {
            return Err(anyhow!("Asset quantity and value cannot be negative"));
        }
        if request.exchange_rate.map_or(false, |rate| rate <= Decimal::ZERO) {
            return Err(anyhow!("Exchange rate must be greater than 0"));
        }
        Ok(())
    }

    async fn ensure_unique_name(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        let clash = self
            .asset_repository
            .list()
            .await?
            .iter()
            .any(|asset| asset.name == name.trim() && Some(asset.id.as_str()) != except_id);
        if clash {
            // Transactions refer to assets by name
            return Err(anyhow!("An asset named '{}' already exists", name.trim()));
        }
        Ok(())
    }

    fn apply_request(asset: &mut Asset, request: CreateAssetRequest) -> Result<()> {
        asset.name = request.name.trim().to_string();
        asset.asset_type = request.asset_type;
        asset.quantity = request.quantity;
        asset.cost_basis = request.cost_basis;
        asset.current_value = request.current_value;
        asset.stock_code = request.stock_code;
        asset.exchange_rate = request.exchange_rate;
        asset.area = request.area;
        asset.price_per_unit = request.price_per_unit;
        asset.currency = request.currency;
        Self::normalize_values(asset)
    }

    pub async fn create_asset(&self, request: CreateAssetRequest) -> Result<Asset> {
        Self::validate(&request)?;
        self.ensure_unique_name(&request.name, None).await?;

        let mut asset = Asset {
            id: String::new(),
            name: String::new(),
            asset_type: AssetType::Other,
            quantity: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            current_value: Decimal::ZERO,
            stock_code: None,
            exchange_rate: None,
            area: None,
            price_per_unit: None,
            currency: None,
            created_at: Default::default(),
            updated_at: Default::default(),
        };
        Self::apply_request(&mut asset, request)?;

        let saved = self.asset_repository.save(asset).await?;
        info!("Created asset '{}' worth {}", saved.name, saved.current_value);
        Ok(saved)
    }

    pub async fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        self.asset_repository.get(id).await
    }

    pub async fn list_assets(&self) -> Result<Vec<Asset>> {
        let mut assets = self.asset_repository.list().await?;
        assets.sort_by(|a, b| b.current_value.cmp(&a.current_value));
        Ok(assets)
    }

    pub async fn update_asset(&self, id: &str, request: CreateAssetRequest) -> Result<Asset> {
        Self::validate(&request)?;
        let mut asset = self
            .asset_repository
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Asset {} not found", id))?;
        self.ensure_unique_name(&request.name, Some(&asset.id)).await?;

        Self::apply_request(&mut asset, request)?;
        self.asset_repository.save(asset).await
    }

    pub async fn delete_asset(&self, id: &str) -> Result<bool> {
        let deleted = self.asset_repository.delete(id).await?;
        if deleted {
            info!("Deleted asset {}", id);
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::TestEnvironment;

    fn request(name: &str, asset_type: AssetType) -> CreateAssetRequest {
        CreateAssetRequest {
            name: name.to_string(),
            asset_type,
            quantity: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            current_value: Decimal::ZERO,
            stock_code: None,
            exchange_rate: None,
            area: None,
            price_per_unit: None,
            currency: None,
        }
    }

    #[tokio::test]
    async fn test_cash_cost_basis_follows_value() {
        let env = TestEnvironment::new().await.unwrap();
        let service = AssetService::new(&env.connection);

        let mut wallet = request("Wallet", AssetType::Cash);
        wallet.current_value = Decimal::from(250);
        wallet.cost_basis = Decimal::from(1);
        let saved = service.create_asset(wallet).await.unwrap();

        assert_eq!(saved.cost_basis, Decimal::from(250));
    }

    #[tokio::test]
    async fn test_stock_value_uses_price_and_exchange_rate() {
        let env = TestEnvironment::new().await.unwrap();
        let service = AssetService::new(&env.connection);

        let mut stock = request("ACME", AssetType::Stock);
        stock.quantity = Decimal::from(10);
        stock.price_per_unit = Some(Decimal::new(125, 1));
        stock.exchange_rate = Some(Decimal::from(2));
        stock.cost_basis = Decimal::from(200);
        let saved = service.create_asset(stock).await.unwrap();

        assert_eq!(saved.current_value, Decimal::from(250));
        assert_eq!(saved.cost_basis, Decimal::from(200));
    }

    #[tokio::test]
    async fn test_real_estate_value_uses_area() {
        let env = TestEnvironment::new().await.unwrap();
        let service = AssetService::new(&env.connection);

        let mut flat = request("Flat", AssetType::RealEstate);
        flat.area = Some(Decimal::from(80));
        flat.price_per_unit = Some(Decimal::from(5000));
        let saved = service.create_asset(flat).await.unwrap();

        assert_eq!(saved.current_value, Decimal::from(400_000));
    }

    #[tokio::test]
    async fn test_rejects_duplicate_and_invalid_assets() {
        let env = TestEnvironment::new().await.unwrap();
        let service = AssetService::new(&env.connection);

        service.create_asset(request("Wallet", AssetType::Cash)).await.unwrap();
        assert!(service.create_asset(request("Wallet", AssetType::Bank)).await.is_err());
        assert!(service.create_asset(request(" ", AssetType::Bank)).await.is_err());

        let mut negative = request("Debt", AssetType::Other);
        negative.current_value = Decimal::from(-5);
        assert!(service.create_asset(negative).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let env = TestEnvironment::new().await.unwrap();
        let service = AssetService::new(&env.connection);
        let created = service.create_asset(request("Wallet", AssetType::Cash)).await.unwrap();

        let mut change = request("Pocket", AssetType::Cash);
        change.current_value = Decimal::from(30);
        let updated = service.update_asset(&created.id, change).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Pocket");
        assert_eq!(updated.cost_basis, Decimal::from(30));

        assert!(service.delete_asset(&created.id).await.unwrap());
        assert!(!service.delete_asset(&created.id).await.unwrap());
        assert!(service.list_assets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrepresentable_value_is_rejected() {
        let env = TestEnvironment::new().await.unwrap();
        let service = AssetService::new(&env.connection);
        let huge = Decimal::from_i128_with_scale(10_i128.pow(20), 0);

        let mut estate = request("Estate", AssetType::RealEstate);
        estate.area = Some(huge);
        estate.price_per_unit = Some(huge);
        assert!(service.create_asset(estate).await.is_err());

        let mut stock = request("ACME", AssetType::Stock);
        stock.quantity = huge;
        stock.price_per_unit = Some(huge);
        assert!(service.create_asset(stock).await.is_err());

        assert!(service.list_assets().await.unwrap().is_empty());
    }
}
