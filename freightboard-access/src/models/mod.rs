pub mod change;
pub mod id;
pub mod permission;
pub mod session;
pub mod user;

pub use change::{ChangeEvent, ChangeOp, ChangeScope};
pub use id::{generate_id, OverrideId, PermissionId, SessionId, UserId};
pub use permission::{
    Permission, PermissionKey, ResolvedPermissions, RoleDefault, UserOverride,
};
pub use session::{Credential, SessionEvent, SessionState};
pub use user::{Role, UserProfile};
