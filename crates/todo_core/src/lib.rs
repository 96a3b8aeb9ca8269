pub mod domain;
pub mod ports;

pub use domain::{
    AuthEvent, AuthEventKind, AuthUser, Bucket, CreateTodoInput, DashboardStats, ParseEnumError,
    Profile, RouteGroup, Session, SignUpCredentials, Todo, TodoFilters, TodoPriority, TodoStats,
    TodoStatus, UpdateProfileInput, UpdateTodoInput, UserRole, UserWithStats,
};
pub use ports::{
    AuthEventStream, AuthService, DatabaseService, Navigator, ObjectStorage, PortError,
    PortResult,
};
