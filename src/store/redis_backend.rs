use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use super::{Persistence, StoreError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
const RECONNECT_RETRIES: usize = 2;

/// Job records in Redis under `<prefix><job id>`, expiring after the TTL.
pub struct RedisPersistence {
    client: Client,
    key_prefix: String,
    connection: OnceCell<ConnectionManager>,
}

impl RedisPersistence {
    /// Parses the URL only; the connection is opened on first use so an
    /// unreachable server does not prevent startup.
    pub fn new(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            connection: OnceCell::new(),
        })
    }

    fn make_key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// The manager reconnects by itself after the server drops the link.
    /// A failed first connect is not cached, so the next call tries again.
    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let con = self
            .connection
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_connection_timeout(CONNECT_TIMEOUT)
                    .set_response_timeout(RESPONSE_TIMEOUT)
                    .set_number_of_retries(RECONNECT_RETRIES);
                let con = ConnectionManager::new_with_config(self.client.clone(), config).await?;
                info!("Connected to Redis job store");
                Ok::<_, StoreError>(con)
            })
            .await?;
        Ok(con.clone())
    }
}

#[async_trait]
impl Persistence for RedisPersistence {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn put(&self, id: &str, record: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(self.make_key(id), record, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.connection().await?;
        let record: Option<String> = con.get(self.make_key(id)).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_uses_prefix() {
        let backend = RedisPersistence::new("redis://127.0.0.1:6379", "transcription:").unwrap();
        assert_eq!(backend.make_key("abc123"), "transcription:abc123");
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(RedisPersistence::new("not a url", "x:").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_fast_and_retries() {
        let backend = RedisPersistence::new("redis://127.0.0.1:1/", "x:").unwrap();

        for _ in 0..2 {
            let result = tokio::time::timeout(
                Duration::from_secs(30),
                backend.put("abc", "{}", Duration::from_secs(60)),
            )
            .await
            .expect("connect attempt should be bounded");
            assert!(matches!(result, Err(StoreError::Backend(_))));
        }
        assert!(backend.connection.get().is_none());
    }
}
