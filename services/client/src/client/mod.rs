pub mod account;
pub mod admin;
pub mod guard;
pub mod images;
pub mod optimistic;
pub mod query_cache;
pub mod session_store;
pub mod state;
pub mod todos;
pub mod validation;

// Re-export the services so the binary can wire them up from one place.
pub use account::AccountService;
pub use admin::AdminService;
pub use guard::{redirect_target, NavigationGuard};
pub use images::ImageService;
pub use session_store::{AuthState, SessionStore};
pub use state::AppState;
pub use todos::TodoService;
