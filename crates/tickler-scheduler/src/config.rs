use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tickler_core::error::CoreError;
use tickler_core::push::VapidKeys;

const MIN_AUTH_SECRET_LENGTH: usize = 32;

/// Deployment environment.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

/// Process configuration, merged from `tickler.toml` and `TICKLER_`-prefixed
/// environment variables (environment wins).
#[derive(Deserialize, Debug)]
pub struct AppConfig {
    pub database_url: String,
    /// Shared secret for the API layer's bearer tokens
    pub auth_secret: String,
    #[serde(default)]
    pub environment: Environment,
    /// Origins the API layer allows for CORS
    #[serde(default)]
    pub cors_origins: Vec<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_private_key: Option<String>,
    pub vapid_contact_email: Option<String>,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TICKLER_"))
            .extract()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.database_url.trim().is_empty() {
            return Err(CoreError::MissingConfiguration("database_url".to_string()));
        }
        if self.auth_secret.len() < MIN_AUTH_SECRET_LENGTH {
            return Err(CoreError::InvalidInput(format!(
                "auth_secret must be at least {MIN_AUTH_SECRET_LENGTH} characters"
            )));
        }
        Ok(())
    }

    /// The VAPID triple, when fully configured. A partial triple disables
    /// push and is reported, not raised.
    pub fn vapid_keys(&self) -> Option<VapidKeys> {
        let configured = [
            self.vapid_public_key.is_some(),
            self.vapid_private_key.is_some(),
            self.vapid_contact_email.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        match (
            &self.vapid_public_key,
            &self.vapid_private_key,
            &self.vapid_contact_email,
        ) {
            (Some(public_key), Some(private_key), Some(contact_email)) => Some(VapidKeys {
                public_key: public_key.clone(),
                private_key: private_key.clone(),
                contact_email: contact_email.clone(),
            }),
            _ => {
                if configured > 0 {
                    tracing::warn!(
                        "partial VAPID configuration; all of vapid_public_key, \
                         vapid_private_key and vapid_contact_email are required to enable push"
                    );
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "tickler.db".to_string(),
            auth_secret: "0123456789abcdef0123456789abcdef".to_string(),
            environment: Environment::Development,
            cors_origins: vec![],
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_contact_email: None,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_short_auth_secret_rejected() {
        let config = AppConfig {
            auth_secret: "too-short".to_string(),
            ..base_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_database_url_rejected() {
        let config = AppConfig {
            database_url: "  ".to_string(),
            ..base_config()
        };
        assert!(matches!(
            config.validate(),
            Err(CoreError::MissingConfiguration(_))
        ));
    }

    #[test]
    fn test_partial_vapid_disables_push() {
        let config = AppConfig {
            vapid_public_key: Some("pub".to_string()),
            ..base_config()
        };
        assert!(config.vapid_keys().is_none());
    }

    #[test]
    fn test_full_vapid_enables_push() {
        let config = AppConfig {
            vapid_public_key: Some("pub".to_string()),
            vapid_private_key: Some("priv".to_string()),
            vapid_contact_email: Some("ops@example.com".to_string()),
            ..base_config()
        };
        let keys = config.vapid_keys().expect("keys");
        assert_eq!(keys.contact_email, "ops@example.com");
    }
}
