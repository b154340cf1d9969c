//! Configuration loaded from the environment.
//!
//! Variables use the `SITEBOOK_` prefix and may live in a `.env` file:
//!
//! - `SITEBOOK_DATABASE` (optional): SQLite database path, defaults to `sitebook.db`
//! - `SITEBOOK_USER` (optional): name of the acting user
//!
//! Command-line flags take precedence over both.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub user: Option<String>,
}

fn default_database() -> String {
    "sitebook.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: default_database(),
            user: None,
        }
    }
}

impl Config {
    /// Load `.env` if present, then read `SITEBOOK_*` variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("SITEBOOK_").from_env::<Config>()
    }

    /// Read configuration from explicit `SITEBOOK_*` pairs instead of the process environment.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed("SITEBOOK_").from_iter(vars)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, database: Option<String>, user: Option<String>) -> Self {
        if let Some(database) = database {
            self.database = database;
        }
        if user.is_some() {
            self.user = user;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.database, "sitebook.db");
    }

    #[test]
    fn test_prefixed_variables() {
        let config = Config::from_vars(vars(&[
            ("SITEBOOK_DATABASE", "/var/lib/books.db"),
            ("SITEBOOK_USER", "asha"),
            ("DATABASE", "ignored.db"),
        ]))
        .unwrap();

        assert_eq!(config.database, "/var/lib/books.db");
        assert_eq!(config.user.as_deref(), Some("asha"));
    }

    #[test]
    fn test_flags_override_environment() {
        let config = Config {
            database: "env.db".into(),
            user: Some("env-user".into()),
        }
        .with_overrides(Some("flag.db".into()), None);

        assert_eq!(config.database, "flag.db");
        assert_eq!(config.user.as_deref(), Some("env-user"));
    }
}
