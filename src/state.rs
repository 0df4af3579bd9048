use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::LimitsConfig;
use crate::history::HistoryStore;
use crate::rate_limit::RateGovernor;
use crate::store::{KeyValueStore, DARK_MODE_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(DARK_MODE_KEY).as_deref().map(str::trim) {
            Some("true") => Self::Dark,
            _ => Self::Light,
        }
    }

    pub fn is_dark(self) -> bool {
        self == Self::Dark
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "clair"),
            Self::Dark => write!(f, "sombre"),
        }
    }
}

/// Everything the session mutates, with save-on-mutation.
pub struct AppState {
    governor: RateGovernor,
    history: HistoryStore,
    theme: Theme,
    store: Arc<dyn KeyValueStore>,
}

impl AppState {
    pub fn new(limits: &LimitsConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            governor: RateGovernor::from_config(limits, store.clone()),
            history: HistoryStore::load(store.clone()),
            theme: Theme::load(store.as_ref()),
            store,
        }
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn governor_mut(&mut self) -> &mut RateGovernor {
        &mut self.governor
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryStore {
        &mut self.history
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = match self.theme {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
        self.store
            .set(DARK_MODE_KEY, if self.theme.is_dark() { "true" } else { "false" });
        info!("Theme: {}", self.theme);
        self.theme
    }
}
