use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::error::ExchangeError;
use crate::core::types::{OrderSide, Result};

/// 限价单成交后需要补挂的止损止盈
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingProtection {
    pub symbol: String,
    /// 限价开仓单的方向
    pub side: OrderSide,
    pub stop_loss: Option<String>,
    pub take_profit: Option<String>,
    /// 部分成交时已按该数量挂好止损止盈
    #[serde(default)]
    pub protected_quantity: Option<String>,
}

/// 待挂止损止盈的持久化，每个交易对最多一条
pub trait PendingProtectionStore: Send + Sync {
    fn get(&self, symbol: &str) -> Result<Option<PendingProtection>>;
    fn put(&self, record: PendingProtection) -> Result<()>;
    fn remove(&self, symbol: &str) -> Result<()>;
    fn list(&self) -> Result<Vec<PendingProtection>>;
}

fn lock_error<T>(_: T) -> ExchangeError {
    ExchangeError::Other("待挂记录锁已损坏".to_string())
}

/// 内存实现，进程退出即丢失
#[derive(Default)]
pub struct MemoryPendingStore {
    records: Mutex<BTreeMap<String, PendingProtection>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingProtectionStore for MemoryPendingStore {
    fn get(&self, symbol: &str) -> Result<Option<PendingProtection>> {
        Ok(self.records.lock().map_err(lock_error)?.get(symbol).cloned())
    }

    fn put(&self, record: PendingProtection) -> Result<()> {
        self.records
            .lock()
            .map_err(lock_error)?
            .insert(record.symbol.clone(), record);
        Ok(())
    }

    fn remove(&self, symbol: &str) -> Result<()> {
        self.records.lock().map_err(lock_error)?.remove(symbol);
        Ok(())
    }

    fn list(&self) -> Result<Vec<PendingProtection>> {
        Ok(self
            .records
            .lock()
            .map_err(lock_error)?
            .values()
            .cloned()
            .collect())
    }
}

/// JSON 文件实现，整个文件是一个以交易对为键的对象
pub struct JsonFilePendingStore {
    path: PathBuf,
    // 串行化同一进程内的读改写
    guard: Mutex<()>,
}

impl JsonFilePendingStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, PendingProtection>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ExchangeError::Other(format!("读取待挂记录 {} 失败: {}", self.path.display(), e))
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, records: &BTreeMap<String, PendingProtection>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| {
                    ExchangeError::Other(format!("创建目录 {} 失败: {}", dir.display(), e))
                })?;
            }
        }

        let content = serde_json::to_string_pretty(records)?;
        fs::write(&self.path, content).map_err(|e| {
            ExchangeError::Other(format!("写入待挂记录 {} 失败: {}", self.path.display(), e))
        })
    }
}

impl PendingProtectionStore for JsonFilePendingStore {
    fn get(&self, symbol: &str) -> Result<Option<PendingProtection>> {
        let _guard = self.guard.lock().map_err(lock_error)?;
        Ok(self.load()?.remove(symbol))
    }

    fn put(&self, record: PendingProtection) -> Result<()> {
        let _guard = self.guard.lock().map_err(lock_error)?;
        let mut records = self.load()?;
        records.insert(record.symbol.clone(), record);
        self.save(&records)
    }

    fn remove(&self, symbol: &str) -> Result<()> {
        let _guard = self.guard.lock().map_err(lock_error)?;
        let mut records = self.load()?;
        if records.remove(symbol).is_some() {
            self.save(&records)?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<PendingProtection>> {
        let _guard = self.guard.lock().map_err(lock_error)?;
        Ok(self.load()?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str) -> PendingProtection {
        PendingProtection {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            stop_loss: Some("95.5".to_string()),
            take_profit: None,
            protected_quantity: None,
        }
    }

    #[test]
    fn test_memory_store_replaces_by_symbol() {
        let store = MemoryPendingStore::new();
        store.put(record("BTCUSDT")).unwrap();
        let mut updated = record("BTCUSDT");
        updated.take_profit = Some("120".to_string());
        store.put(updated.clone()).unwrap();

        assert_eq!(store.list().unwrap(), vec![updated]);
        store.remove("BTCUSDT").unwrap();
        assert!(store.get("BTCUSDT").unwrap().is_none());
    }

    #[test]
    fn test_json_file_store_persists_across_instances() {
        let path = std::env::temp_dir().join(format!(
            "rustperp_pending_{}_{}.json",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        let store = JsonFilePendingStore::new(&path);
        assert!(store.list().unwrap().is_empty());
        store.put(record("ETHUSDT")).unwrap();
        store.put(record("BTCUSDT")).unwrap();

        let reopened = JsonFilePendingStore::new(&path);
        let symbols: Vec<String> = reopened
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.symbol)
            .collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);

        reopened.remove("BTCUSDT").unwrap();
        assert!(store.get("BTCUSDT").unwrap().is_none());
        assert!(store.get("ETHUSDT").unwrap().is_some());

        let _ = fs::remove_file(&path);
    }
}
