pub mod notification_api;
pub mod poller;
pub mod preferences;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出常用类型
pub use notification_api::{HttpNotificationBackend, NotificationBackend};
pub use poller::{NotificationPoller, PollerHandle};
pub use preferences::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, PopupPreference};
pub use sync::{MarkAllOutcome, MarkReadOutcome, NotificationSyncAgent, PollOutcome, SyncCursor};
