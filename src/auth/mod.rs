//! Authentication and session management

pub mod clock;
pub mod middleware;
pub mod models;
pub mod password;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use middleware::{bearer_token, require_auth, Guard};
pub use models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, Permission, Principal, Session,
    SessionView, User, UserView,
};
pub use password::{generate_token, PasswordHasher};
pub use session::{spawn_session_sweeper, AuthError, AuthenticationManager};
