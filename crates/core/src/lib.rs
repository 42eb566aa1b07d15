pub mod api;
pub mod domain;
pub mod storage;
pub mod store;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub api_base_url: Option<String>,
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                api_base_url: std::env::var("TAMIO_API_BASE_URL").ok(),
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }

        pub fn require_api_base_url(&self) -> anyhow::Result<&str> {
            self.api_base_url
                .as_deref()
                .context("TAMIO_API_BASE_URL is required")
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }
}
