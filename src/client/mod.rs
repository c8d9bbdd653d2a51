pub mod cache;
pub mod clock;
pub mod guard;
pub mod monitor;
pub mod navigation;
pub mod verifier;

pub use cache::{CacheEntry, EntitlementCache, FileKv, KvStore, MemoryKv, RedisKv};
pub use guard::{AccessGuard, GuardSession, GuardSettings, GuardView};
pub use monitor::{EntitlementMonitor, MonitorConfig, MonitorState};
pub use navigation::NavigationContext;
pub use verifier::{HttpVerifier, Verifier};
