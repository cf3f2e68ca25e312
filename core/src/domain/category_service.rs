//! Category management: defaults, uniqueness and usage counting.

use anyhow::{anyhow, Result};
use log::{debug, info};
use shared::{Category, CategoryType, CreateCategoryRequest, TransactionType, REPAYMENT_CATEGORY};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::storage::{CategoryRepository, DataConnection, Table};

/// Categories created the first time the collection is used
const DEFAULT_CATEGORIES: &[(&str, CategoryType, &str)] = &[
    ("salary", CategoryType::Income, "💼"),
    ("bonus", CategoryType::Income, "🎁"),
    ("investment", CategoryType::Income, "📈"),
    ("food", CategoryType::Expense, "🍜"),
    ("transport", CategoryType::Expense, "🚌"),
    ("housing", CategoryType::Expense, "🏠"),
    ("shopping", CategoryType::Expense, "🛍"),
    ("entertainment", CategoryType::Expense, "🎬"),
    ("health", CategoryType::Expense, "💊"),
    (REPAYMENT_CATEGORY, CategoryType::Expense, "💳"),
];

#[derive(Clone)]
pub struct CategoryService {
    category_repository: CategoryRepository,
    /// Serialises check-then-write updates across every service on the connection
    update_lock: Arc<Mutex<()>>,
}

impl CategoryService {
    pub fn new(connection: &DataConnection) -> Self {
        Self {
            category_repository: connection.create_category_repository(),
            update_lock: connection.update_lock(Table::Categories),
        }
    }

    fn new_category(name: &str, category_type: CategoryType, icon: Option<String>, color: Option<String>) -> Category {
        Category {
            id: String::new(),
            name: name.trim().to_string(),
            category_type,
            icon,
            color,
            usage_count: 0,
            created_at: Default::default(),
            updated_at: Default::default(),
        }
    }

    fn same_name(category: &Category, name: &str) -> bool {
        category.name.trim().eq_ignore_ascii_case(name.trim())
    }

    /// Seed the default set into an empty collection and make sure the
    /// repayment category exists; returns how many categories were created
    pub async fn ensure_defaults(&self) -> Result<usize> {
        let _updating = self.update_lock.lock().await;
        let existing = self.category_repository.list().await?;
        let mut created = 0;

        if existing.is_empty() {
            for (name, category_type, icon) in DEFAULT_CATEGORIES {
                let category = Self::new_category(name, *category_type, Some(icon.to_string()), None);
                self.category_repository.save(category).await?;
                created += 1;
            }
            info!("Seeded {} default categories", created);
            return Ok(created);
        }

        let has_repayment = existing
            .iter()
            .any(|c| c.category_type == CategoryType::Expense && Self::same_name(c, REPAYMENT_CATEGORY));
        if !has_repayment {
            let category = Self::new_category(REPAYMENT_CATEGORY, CategoryType::Expense, Some("💳".to_string()), None);
            self.category_repository.save(category).await?;
            info!("Added missing '{}' category", REPAYMENT_CATEGORY);
            created += 1;
        }
        Ok(created)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        self.ensure_defaults().await?;
        let mut categories = self.category_repository.list().await?;
        categories.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    pub async fn get_category(&self, id: &str) -> Result<Option<Category>> {
        self.category_repository.get(id).await
    }

    async fn ensure_unique(&self, name: &str, category_type: CategoryType, except_id: Option<&str>) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("Category name cannot be empty"));
        }
        let duplicate = self.category_repository.list().await?.into_iter().any(|c| {
            c.category_type == category_type && Self::same_name(&c, name) && Some(c.id.as_str()) != except_id
        });
        if duplicate {
            return Err(anyhow!("A category named '{}' already exists", name.trim()));
        }
        Ok(())
    }

    pub async fn create_category(&self, request: CreateCategoryRequest) -> Result<Category> {
        let _updating = self.update_lock.lock().await;
        self.ensure_unique(&request.name, request.category_type, None).await?;
        let category = Self::new_category(&request.name, request.category_type, request.icon, request.color);
        let saved = self.category_repository.save(category).await?;
        info!("Created category '{}' ({})", saved.name, saved.id);
        Ok(saved)
    }

    pub async fn update_category(&self, id: &str, request: CreateCategoryRequest) -> Result<Category> {
        let _updating = self.update_lock.lock().await;
        let mut category = self
            .category_repository
            .get(id)
            .await?
            .ok_or_else(|| anyhow!("Category {} not found", id))?;
        self.ensure_unique(&request.name, request.category_type, Some(&category.id))
            .await?;

        category.name = request.name.trim().to_string();
        category.category_type = request.category_type;
        category.icon = request.icon;
        category.color = request.color;
        self.category_repository.save(category).await
    }

    pub async fn delete_category(&self, id: &str) -> Result<bool> {
        self.category_repository.delete(id).await
    }

    /// Count one more use of the category a transaction was filed under
    pub async fn increment_usage(&self, name: &str, transaction_type: TransactionType) -> Result<()> {
        let category_type = match transaction_type {
            TransactionType::Income => CategoryType::Income,
            TransactionType::Expense => CategoryType::Expense,
            TransactionType::Transfer => return Ok(()),
        };
        let _updating = self.update_lock.lock().await;
        let found = self
            .category_repository
            .list()
            .await?
            .into_iter()
            .find(|c| c.category_type == category_type && Self::same_name(c, name));

        match found {
            Some(mut category) => {
                category.usage_count = category.usage_count.saturating_add(1);
                self.category_repository.save(category).await?;
            }
            None => debug!("No {:?} category named '{}'; usage not counted", category_type, name),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::TestEnvironment;

    fn request(name: &str, category_type: CategoryType) -> CreateCategoryRequest {
        CreateCategoryRequest {
            name: name.to_string(),
            category_type,
            icon: None,
            color: None,
        }
    }

    #[tokio::test]
    async fn test_defaults_include_repayment() {
        let env = TestEnvironment::new().await.unwrap();
        let service = CategoryService::new(&env.connection);

        let categories = service.list_categories().await.unwrap();
        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len());
        assert!(categories
            .iter()
            .any(|c| c.name == REPAYMENT_CATEGORY && c.category_type == CategoryType::Expense));

        // Seeding happens once
        assert_eq!(service.ensure_defaults().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repayment_is_restored_when_missing() {
        let env = TestEnvironment::new().await.unwrap();
        let service = CategoryService::new(&env.connection);
        service.create_category(request("Groceries", CategoryType::Expense)).await.unwrap();

        assert_eq!(service.ensure_defaults().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_names_are_unique_per_type() {
        let env = TestEnvironment::new().await.unwrap();
        let service = CategoryService::new(&env.connection);

        service.create_category(request("Gifts", CategoryType::Expense)).await.unwrap();
        assert!(service.create_category(request("gifts ", CategoryType::Expense)).await.is_err());
        assert!(service.create_category(request("Gifts", CategoryType::Income)).await.is_ok());
        assert!(service.create_category(request("  ", CategoryType::Income)).await.is_err());
    }

    #[tokio::test]
    async fn test_increment_usage() {
        let env = TestEnvironment::new().await.unwrap();
        let service = CategoryService::new(&env.connection);
        let created = service.create_category(request("Food", CategoryType::Expense)).await.unwrap();

        service.increment_usage("food", TransactionType::Expense).await.unwrap();
        service.increment_usage("Food", TransactionType::Income).await.unwrap();
        service.increment_usage("Food", TransactionType::Transfer).await.unwrap();

        let category = service.get_category(&created.id).await.unwrap().unwrap();
        assert_eq!(category.usage_count, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_id_and_rejects_clash() {
        let env = TestEnvironment::new().await.unwrap();
        let service = CategoryService::new(&env.connection);
        let food = service.create_category(request("Food", CategoryType::Expense)).await.unwrap();
        service.create_category(request("Travel", CategoryType::Expense)).await.unwrap();

        let renamed = service
            .update_category(&food.id, request("Dining", CategoryType::Expense))
            .await
            .unwrap();
        assert_eq!(renamed.id, food.id);
        assert_eq!(renamed.name, "Dining");

        assert!(service
            .update_category(&food.id, request("Travel", CategoryType::Expense))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_first_use_seeds_once() {
        let env = TestEnvironment::new().await.unwrap();
        let first = CategoryService::new(&env.connection);
        let second = CategoryService::new(&env.connection);

        let (a, b) = tokio::join!(first.ensure_defaults(), second.ensure_defaults());

        assert_eq!(a.unwrap() + b.unwrap(), DEFAULT_CATEGORIES.len());
        assert_eq!(first.list_categories().await.unwrap().len(), DEFAULT_CATEGORIES.len());
    }

    #[tokio::test]
    async fn test_concurrent_usage_counts_are_not_lost() {
        let env = TestEnvironment::new().await.unwrap();
        let service = CategoryService::new(&env.connection);
        let created = service.create_category(request("Food", CategoryType::Expense)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = CategoryService::new(&env.connection);
                tokio::spawn(async move { service.increment_usage("Food", TransactionType::Expense).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let category = service.get_category(&created.id).await.unwrap().unwrap();
        assert_eq!(category.usage_count, 8);
    }
}
