//! Bounded pool of audit store connections with scoped checkout.

use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{AuditConnector, AuditStoreError, AuditStoreResult};

type IdleConnections<T> = Arc<Mutex<Vec<T>>>;

/// Hands out at most `max_size` connections at once. Idle connections are
/// reused; new ones are opened lazily on the blocking thread pool.
pub struct AuditConnectionPool<C: AuditConnector> {
    connector: Arc<C>,
    idle: IdleConnections<C::Connection>,
    permits: Arc<Semaphore>,
    max_size: usize,
}

impl<C: AuditConnector> AuditConnectionPool<C> {
    pub fn new(connector: C, max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            connector: Arc::new(connector),
            idle: Arc::new(Mutex::new(Vec::with_capacity(max_size))),
            permits: Arc::new(Semaphore::new(max_size)),
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }

    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    pub async fn acquire(&self) -> AuditStoreResult<PooledAuditConnection<C::Connection>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AuditStoreError::PoolClosed)?;

        let reused = match self.idle.lock() {
            Ok(mut idle) => idle.pop(),
            Err(_) => None,
        };
        let connection = match reused {
            Some(connection) => connection,
            None => {
                let connector = Arc::clone(&self.connector);
                tokio::task::spawn_blocking(move || connector.connect())
                    .await
                    .map_err(|error| {
                        AuditStoreError::Connect(format!("connect task failed: {error}"))
                    })??
            }
        };

        Ok(PooledAuditConnection {
            connection: Some(connection),
            idle: Arc::clone(&self.idle),
            discard: false,
            _permit: permit,
        })
    }

    /// Stops handing out connections and drops idle ones.
    pub fn close(&self) {
        self.permits.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }
}

/// A checked-out connection. Returned to the pool on drop unless discarded.
pub struct PooledAuditConnection<T: Send + 'static> {
    connection: Option<T>,
    idle: IdleConnections<T>,
    discard: bool,
    _permit: OwnedSemaphorePermit,
}

impl<T: Send + 'static> PooledAuditConnection<T> {
    pub fn connection_mut(&mut self) -> AuditStoreResult<&mut T> {
        self.connection
            .as_mut()
            .ok_or(AuditStoreError::ConnectionReleased)
    }

    /// Closes the connection on release instead of returning it to the pool.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<T: Send + 'static> Drop for PooledAuditConnection<T> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        if self.discard {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{AuditConnection, AuditRecord};

    struct CountingConnector {
        opened: Arc<AtomicUsize>,
        refuse: bool,
    }

    struct NullConnection;

    impl AuditConnection for NullConnection {
        fn insert_record(&mut self, _record: &AuditRecord) -> AuditStoreResult<()> {
            Ok(())
        }
    }

    impl AuditConnector for CountingConnector {
        type Connection = NullConnection;

        fn connect(&self) -> AuditStoreResult<NullConnection> {
            if self.refuse {
                return Err(AuditStoreError::Connect("connection refused".to_string()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(NullConnection)
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    fn pool(
        max_size: usize,
        refuse: bool,
    ) -> (AuditConnectionPool<CountingConnector>, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let connector = CountingConnector {
            opened: Arc::clone(&opened),
            refuse,
        };
        (AuditConnectionPool::new(connector, max_size), opened)
    }

    #[tokio::test]
    async fn functional_released_connections_are_reused() {
        let (pool, opened) = pool(2, false);
        {
            let _first = pool.acquire().await.expect("first");
        }
        assert_eq!(pool.idle_count(), 1);
        {
            let _second = pool.acquire().await.expect("second");
            assert_eq!(pool.idle_count(), 0);
        }
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn functional_discarded_connections_are_not_returned() {
        let (pool, opened) = pool(1, false);
        {
            let mut checked_out = pool.acquire().await.expect("acquire");
            checked_out.discard();
        }
        assert_eq!(pool.idle_count(), 0);
        let _again = pool.acquire().await.expect("reacquire");
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn integration_checkouts_are_bounded_by_max_size() {
        let (pool, _) = pool(1, false);
        let held = pool.acquire().await.expect("held");
        let waiting =
            tokio::time::timeout(std::time::Duration::from_millis(50), pool.acquire()).await;
        assert!(waiting.is_err(), "second checkout must wait for the first");
        drop(held);
        let _next = pool.acquire().await.expect("after release");
    }

    #[tokio::test]
    async fn regression_connect_failure_releases_permit() {
        let (pool, _) = pool(1, true);
        assert!(matches!(
            pool.acquire().await,
            Err(AuditStoreError::Connect(_))
        ));
        assert!(matches!(
            pool.acquire().await,
            Err(AuditStoreError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn unit_closed_pool_rejects_checkout() {
        let (pool, _) = pool(1, false);
        pool.close();
        assert!(matches!(
            pool.acquire().await,
            Err(AuditStoreError::PoolClosed)
        ));
    }
}
