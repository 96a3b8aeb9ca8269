//! services/client/src/bin/todo.rs

use clap::{Parser, Subcommand};
use client_lib::{
    adapters::{DbAdapter, LogNavigator, SupabaseAuthAdapter, SupabaseStorageAdapter},
    client::{AccountService, AdminService, AppState, NavigationGuard, TodoService},
    config::Config,
    error::{ClientError, ClientResult},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use todo_core::domain::{
    CreateTodoInput, RouteGroup, TodoFilters, TodoPriority, TodoStatus, UserRole,
};
use todo_core::ports::{AuthService, Navigator};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Personal task list backed by a hosted backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Account email
    #[arg(long, env = "TODO_EMAIL")]
    email: String,

    /// Account password
    #[arg(long, env = "TODO_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum Commands {
    /// List your todos
    List {
        #[arg(long)]
        status: Option<TodoStatus>,
        #[arg(long)]
        priority: Option<TodoPriority>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Create a todo
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<TodoPriority>,
    },
    /// Flip a todo between completed and pending
    Toggle { id: Uuid },
    /// Delete a todo
    Delete { id: Uuid },
    /// Per-status counts of your todos
    Stats,
    /// List every user with their todo counts (admin)
    Users,
    /// Change a user's role (admin)
    SetRole { user_id: Uuid, role: UserRole },
    /// Usage totals across all users (admin)
    Dashboard,
}

fn print_json<T: serde::Serialize>(value: &T) -> ClientResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ClientError::Internal(e.to_string()))?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let cli = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded.");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    db_adapter.run_migrations().await?;

    // --- 3. Initialize Service Adapters ---
    let http = reqwest::Client::builder()
        .user_agent(concat!("todo/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let auth_adapter: Arc<dyn AuthService> = Arc::new(SupabaseAuthAdapter::new(
        http.clone(),
        &config.supabase_url,
        &config.supabase_anon_key,
    ));
    let storage_adapter = Arc::new(SupabaseStorageAdapter::new(
        http,
        &config.supabase_url,
        &config.supabase_anon_key,
        auth_adapter.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let state = Arc::new(AppState::new(
        auth_adapter,
        db_adapter,
        storage_adapter,
        config.clone(),
    ));
    let account = AccountService::new(state.clone());
    let todos = TodoService::new(state.clone());
    let admin = AdminService::new(state.clone());

    // --- 5. Restore the Session and Start the Guard ---
    let navigator = Arc::new(LogNavigator::new(RouteGroup::Auth));
    state.session.initialize().await;
    let guard = NavigationGuard::new(state.session.clone(), navigator.clone());
    guard.evaluate();

    account.sign_in(&cli.email, &cli.password).await?;
    // The store learns about the session from the auth event stream.
    let mut changes = state.session.subscribe();
    let settled = matches!(
        tokio::time::timeout(
            Duration::from_secs(10),
            changes.wait_for(|s| s.profile.is_some() || s.session.is_none()),
        )
        .await,
        Ok(Ok(_))
    );
    if !settled {
        warn!("Profile not loaded after sign-in, continuing without it");
    }
    guard.evaluate();

    if matches!(
        cli.command,
        Commands::Users | Commands::SetRole { .. } | Commands::Dashboard
    ) {
        navigator.navigate(RouteGroup::Admin);
        if guard.evaluate().is_some() {
            return Err(ClientError::AdminRequired);
        }
    }
    info!(route = navigator.current_route_group().entry_path(), "Ready");

    // --- 6. Run the Command ---
    match cli.command {
        Commands::List {
            status,
            priority,
            search,
        } => {
            let filters = TodoFilters {
                status,
                priority,
                search,
            };
            print_json(&todos.todos(&filters).await?)?;
        }
        Commands::Add {
            title,
            description,
            priority,
        } => {
            let input = CreateTodoInput {
                title,
                description,
                priority,
                ..Default::default()
            };
            print_json(&todos.create_todo(input).await?)?;
        }
        Commands::Toggle { id } => {
            let current = todos.todo(id).await?;
            print_json(&todos.toggle_status(id, current.status).await?)?;
        }
        Commands::Delete { id } => {
            todos.delete_todo(id).await?;
            info!(%id, "Deleted");
        }
        Commands::Stats => print_json(&todos.stats().await?)?,
        Commands::Users => print_json(&admin.users_with_stats().await?)?,
        Commands::SetRole { user_id, role } => {
            print_json(&admin.update_user_role(user_id, role).await?)?
        }
        Commands::Dashboard => print_json(&admin.dashboard_stats().await?)?,
    }

    // --- 7. Sign Out ---
    account.sign_out().await?;
    state.session.shutdown();
    Ok(())
}
