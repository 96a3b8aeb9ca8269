//! services/client/src/adapters/navigator.rs
//!
//! A headless `Navigator` for the command-line driver: it remembers the current
//! route group and logs every redirect.

use std::sync::Mutex;
use todo_core::domain::RouteGroup;
use todo_core::ports::Navigator;
use tracing::info;

pub struct LogNavigator {
    current: Mutex<RouteGroup>,
}

impl LogNavigator {
    pub fn new(start: RouteGroup) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Moves to `group` as if the user had navigated there.
    pub fn navigate(&self, group: RouteGroup) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = group;
    }
}

impl Navigator for LogNavigator {
    fn current_route_group(&self) -> RouteGroup {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn redirect_to(&self, group: RouteGroup) {
        info!(path = group.entry_path(), "Navigated");
        self.navigate(group);
    }
}
