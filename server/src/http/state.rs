use crate::registry::Registry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}
