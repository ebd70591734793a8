//! Navigation hook
//!
//! Ending a session sends the user to the login route. The embedding
//! application decides what "navigate" means (switching a view, opening a
//! browser tab, printing a hint in a terminal).

use log::info;
use parking_lot::Mutex;

/// Default login entry route
pub const LOGIN_ROUTE: &str = "/login";

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that only records the request in the log
#[derive(Debug, Default)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, route: &str) {
        info!("Navigation requested: {}", route);
    }
}

/// Navigator that keeps every requested route, newest last
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        self.routes.lock().clone()
    }

    pub fn last_route(&self) -> Option<String> {
        self.routes.lock().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        info!("Navigation requested: {}", route);
        self.routes.lock().push(route.to_string());
    }
}
