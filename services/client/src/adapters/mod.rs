pub mod auth;
pub mod db;
pub mod http;
pub mod navigator;
pub mod storage;

pub use auth::SupabaseAuthAdapter;
pub use db::DbAdapter;
pub use navigator::LogNavigator;
pub use storage::SupabaseStorageAdapter;
