//! 内存文件锁：按目标文件名串行化分片写入。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {0:?} waiting for file lock")]
    Timeout(Duration),
}

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Requests holding or waiting on `lock`.
    users: usize,
}

/// Manages asynchronous mutexes keyed by destination file name.
///
/// Entries are reference counted and removed once no request holds or awaits
/// them, so the map only ever contains names with uploads in flight.
#[derive(Debug, Default)]
pub struct LockManager {
    slots: Mutex<HashMap<String, Slot>>,
}

impl LockManager {
    /// 创建新的锁管理器实例。
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// 获取文件锁；`timeout` 为 `None` 时无限等待。
    pub async fn acquire(
        self: &Arc<Self>,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<FileLock, LockError> {
        let (lock, lease) = self.checkout(name);
        let guard = match timeout {
            Some(limit) => time::timeout(limit, lock.lock_owned())
                .await
                .map_err(|_| LockError::Timeout(limit))?,
            None => lock.lock_owned().await,
        };
        Ok(FileLock {
            _guard: guard,
            _lease: lease,
        })
    }

    /// 仅在锁空闲时立即获取，否则返回 `None`。
    pub fn try_acquire(self: &Arc<Self>, name: &str) -> Option<FileLock> {
        let (lock, lease) = self.checkout(name);
        let guard = lock.try_lock_owned().ok()?;
        Some(FileLock {
            _guard: guard,
            _lease: lease,
        })
    }

    /// 当前登记的文件名数量。
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn checkout(self: &Arc<Self>, name: &str) -> (Arc<AsyncMutex<()>>, Lease) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(name.to_string()).or_insert_with(|| Slot {
            lock: Arc::new(AsyncMutex::new(())),
            users: 0,
        });
        slot.users += 1;
        let lease = Lease {
            manager: self.clone(),
            name: name.to_string(),
        };
        (slot.lock.clone(), lease)
    }

    fn checkin(&self, name: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(name) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(name);
            }
        }
    }
}

/// Registry membership for one request; dropping it gives the slot back.
#[derive(Debug)]
struct Lease {
    manager: Arc<LockManager>,
    name: String,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.manager.checkin(&self.name);
    }
}

/// Exclusive access to one file name. Released on drop.
#[derive(Debug)]
pub struct FileLock {
    // Field order matters: the mutex unlocks before the slot is checked in.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease,
}

impl FileLock {
    pub fn release(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn entry_removed_after_release() {
        let locks = Arc::new(LockManager::new());
        let lock = locks.acquire("photo.png", None).await.expect("acquire");
        assert_eq!(locks.len(), 1);
        lock.release();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn distinct_names_do_not_block() {
        let locks = Arc::new(LockManager::new());
        let _a = locks.acquire("a.bin", None).await.expect("acquire a");
        let b = locks
            .acquire("b.bin", Some(Duration::from_millis(50)))
            .await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn same_name_times_out_and_cleans_up() {
        let locks = Arc::new(LockManager::new());
        let held = locks.acquire("a.bin", None).await.expect("acquire");
        let waited = locks
            .acquire("a.bin", Some(Duration::from_millis(20)))
            .await;
        assert!(matches!(waited, Err(LockError::Timeout(_))));
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn try_acquire_fails_while_held() {
        let locks = Arc::new(LockManager::new());
        let held = locks.acquire("a.bin", None).await.expect("acquire");
        assert!(locks.try_acquire("a.bin").is_none());
        drop(held);
        assert!(locks.try_acquire("a.bin").is_some());
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_slot() {
        let locks = Arc::new(LockManager::new());
        let held = locks.acquire("a.bin", None).await.expect("acquire");
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _lock = locks.acquire("a.bin", None).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;
        drop(held);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_name_is_serialized() {
        let locks = Arc::new(LockManager::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let locks = locks.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _lock = locks.acquire("shared.bin", None).await.expect("acquire");
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }
}
