use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::warn;

use super::error::{MongoDaoError, MongoResult};
use crate::config::StorageConnectConfig;

/// Ping retry schedule used while a connection is being established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        (&StorageConnectConfig::default()).into()
    }
}

impl From<&StorageConnectConfig> for RetryPolicy {
    fn from(value: &StorageConnectConfig) -> Self {
        Self {
            max_attempts: value.max_attempts.max(1),
            initial_delay: value.initial_delay,
            max_delay: value.max_delay.max(value.initial_delay),
        }
    }
}

/// Build a client and wait until the server answers a ping.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
    retry: &RetryPolicy,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempts = 0;
    let mut delay = retry.initial_delay;

    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => break,
            Err(err) => {
                attempts += 1;
                if attempts >= retry.max_attempts {
                    return Err(MongoDaoError::InitialPing {
                        attempts,
                        source: err,
                    });
                }
                warn!(attempts, error = %err, "MongoDB ping failed; retrying");
                sleep(delay).await;
                delay = retry.next_delay(delay);
            }
        }
    }

    Ok((client, database))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_up_to_the_configured_cap() {
        let policy = RetryPolicy::from(&StorageConnectConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(1),
        });
        let first = policy.next_delay(policy.initial_delay);
        assert_eq!(first, Duration::from_millis(600));
        assert_eq!(policy.next_delay(first), Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 4);
    }

    #[test]
    fn cap_never_undercuts_the_initial_delay() {
        let policy = RetryPolicy::from(&StorageConnectConfig {
            max_attempts: 0,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_millis(500),
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.next_delay(policy.initial_delay), Duration::from_secs(2));
    }
}
