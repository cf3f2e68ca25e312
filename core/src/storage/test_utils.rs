//! Test environment backed by a temporary directory and an in-memory remote.
//!
//! The directory is removed when the [`TestEnvironment`] is dropped, even if
//! the test panics.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use super::connection::DataConnection;
use super::local::FileStore;
use super::remote::MemoryRemoteStore;
use super::retry::RetryPolicy;

pub const TEST_USER_ID: &str = "test-user";

pub struct TestEnvironment {
    /// Kept alive so the directory outlives the test
    _temp_dir: TempDir,
    pub connection: DataConnection,
    /// The remote behind `connection`, for switching it offline and inspecting rows
    pub remote: Arc<MemoryRemoteStore>,
    pub user_id: String,
    pub base_path: PathBuf,
}

impl TestEnvironment {
    pub async fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let base_path = temp_dir.path().to_path_buf();
        let local = Arc::new(FileStore::new(base_path.join("local"))?);
        let remote = Arc::new(MemoryRemoteStore::new());
        let connection = DataConnection::new(local, remote.clone(), TEST_USER_ID)
            .with_retry_policy(RetryPolicy::immediate(3));

        Ok(TestEnvironment {
            _temp_dir: temp_dir,
            connection,
            remote,
            user_id: TEST_USER_ID.to_string(),
            base_path,
        })
    }

    /// A second device for the same user: its own local store, the same remote
    pub async fn second_device(&self, name: &str) -> Result<DataConnection> {
        let local = Arc::new(FileStore::new(self.base_path.join(name))?);
        Ok(DataConnection::new(local, self.remote.clone(), &self.user_id)
            .with_retry_policy(RetryPolicy::immediate(3)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_environment_cleanup() -> Result<()> {
        let base_path;
        {
            let env = TestEnvironment::new().await?;
            base_path = env.base_path.clone();
            assert!(base_path.exists());
        }
        assert!(!base_path.exists());
        Ok(())
    }
}
