pub mod access_gate;
pub mod change_feed;
pub mod resolver;
pub mod session;
pub mod session_cache;

pub use access_gate::AccessGate;
pub use resolver::PermissionResolver;
pub use session::{Clock, ManualClock, SessionManager, SystemClock, LOGIN_TIMESTAMP_KEY};
pub use session_cache::SessionPermissionCache;
