//! Locale preference
//!
//! An explicit context object created once at startup and handed to whoever
//! needs the current language. The choice is persisted in the local tier under
//! [`LOCALE_KEY`](crate::auth::LOCALE_KEY).

use crate::auth::{AuthError, StorageTier, LOCALE_KEY};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    Tr,
    En,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Locale::Tr => "tr",
            Locale::En => "en",
        }
    }

    /// Pick a locale from a system language tag such as `tr-TR` or `en_US`
    pub fn from_system_language(tag: &str) -> Self {
        let primary = tag
            .split(|c| c == '-' || c == '_' || c == '.')
            .next()
            .unwrap_or_default();
        if primary.eq_ignore_ascii_case("tr") {
            Locale::Tr
        } else {
            Locale::En
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Locale {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tr" => Ok(Locale::Tr),
            "en" => Ok(Locale::En),
            other => Err(AuthError::ValidationError(format!("Unsupported locale: {}", other))),
        }
    }
}

/// Current locale, scoped to one application instance
pub struct LocaleContext {
    current: RwLock<Locale>,
    storage: Arc<dyn StorageTier>,
}

impl LocaleContext {
    /// Saved preference if valid, otherwise derived from the system language
    /// (and saved).
    pub fn initialize(storage: Arc<dyn StorageTier>, system_language: Option<&str>) -> Self {
        let saved = match storage.get(LOCALE_KEY) {
            Ok(value) => value.and_then(|v| v.parse::<Locale>().ok()),
            Err(e) => {
                warn!("Failed to read saved locale: {}", e);
                None
            }
        };

        let locale = match saved {
            Some(locale) => {
                debug!("Using saved locale {}", locale);
                locale
            }
            None => {
                let locale = system_language
                    .map(Locale::from_system_language)
                    .unwrap_or(Locale::En);
                info!("No saved locale, using {} from system language", locale);
                if let Err(e) = storage.set(LOCALE_KEY, locale.code()) {
                    warn!("Failed to save locale: {}", e);
                }
                locale
            }
        };

        Self {
            current: RwLock::new(locale),
            storage,
        }
    }

    pub fn locale(&self) -> Locale {
        *self.current.read()
    }

    /// Switch language and persist the choice
    pub fn change_language(&self, locale: Locale) -> Result<(), AuthError> {
        self.storage.set(LOCALE_KEY, locale.code())?;
        *self.current.write() = locale;
        info!("Language changed to {}", locale);
        Ok(())
    }
}

/// System language from the usual environment variables
pub fn system_language() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty() && value != "C" && value != "POSIX")
}
