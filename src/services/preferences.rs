use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};

/// 弹窗开关的固定存储键
pub const POPUP_PREFERENCE_KEY: &str = "notification_popup_enabled";

/// 持久化键值存储
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// 内存存储，进程退出后丢失
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyValueStore {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON 文件存储
///
/// 首次访问时加载文件，每次写入都整体落盘。
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    data: Mutex<Option<HashMap<String, String>>>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<HashMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::Storage(format!(
                    "Corrupt preference file {}: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Preference file {} not found, starting empty", self.path.display());
                Ok(HashMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, data: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.data.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }

        Ok(guard.as_ref().and_then(|data| data.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut guard = self.data.lock().await;
        let mut data = match guard.as_ref() {
            Some(data) => data.clone(),
            None => match self.load().await {
                Ok(data) => data,
                // 文件损坏时以空表覆盖，其他读取错误直接返回
                Err(AppError::Storage(e)) => {
                    warn!("Overwriting corrupt preference file: {}", e);
                    HashMap::new()
                }
                Err(e) => return Err(e),
            },
        };

        data.insert(key.to_string(), value);
        // 落盘成功后才更新内存
        self.persist(&data).await?;
        *guard = Some(data);
        Ok(())
    }
}

/// 新通知弹窗开关，默认关闭
#[derive(Clone)]
pub struct PopupPreference {
    store: Arc<dyn KeyValueStore>,
    enabled: Arc<AtomicBool>,
}

impl PopupPreference {
    /// 启动时读取持久化的开关值，读取失败按关闭处理
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let enabled = match store.get(POPUP_PREFERENCE_KEY).await {
            Ok(Some(value)) => match value.trim().parse::<bool>() {
                Ok(enabled) => enabled,
                Err(_) => {
                    warn!("Unrecognised popup preference value {:?}, defaulting to off", value);
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                warn!("Failed to read popup preference, defaulting to off: {}", e);
                false
            }
        };

        debug!("Popup preference loaded: {}", enabled);

        Self {
            store,
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// 不读存储的固定值，用于测试和临时运行
    pub fn fixed(enabled: bool) -> Self {
        Self {
            store: Arc::new(MemoryKeyValueStore::new()),
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.store
            .set(POPUP_PREFERENCE_KEY, enabled.to_string())
            .await?;
        self.enabled.store(enabled, Ordering::SeqCst);

        info!("Popup preference set to {}", enabled);
        Ok(())
    }
}
