use std::env;

use anyhow::Result;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("DATABASE_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()?,
            username: env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: env::var("DATABASE_PASSWORD")?,
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "bling_sync".to_string()),
            ssl_mode: env::var("DATABASE_SSL_MODE").unwrap_or_else(|_| "prefer".to_string()),
        })
    }

    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

/// Bling endpoint roots. Overridable for sandbox accounts and tests.
#[derive(Debug, Clone)]
pub struct BlingApiConfig {
    pub api_base_url: String,
    pub oauth_base_url: String,
}

impl Default for BlingApiConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.bling.com.br/Api/v3".to_string(),
            oauth_base_url: "https://www.bling.com.br/Api/v3/oauth".to_string(),
        }
    }
}

impl BlingApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base_url: env::var("BLING_API_BASE_URL").unwrap_or(defaults.api_base_url),
            oauth_base_url: env::var("BLING_OAUTH_BASE_URL").unwrap_or(defaults.oauth_base_url),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub bling: BlingApiConfig,
    pub encryption_key: String,
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    /// Externally reachable base URL of this service; the OAuth redirect
    /// URI is derived from it.
    pub public_url: String,
    /// Where the admin settings UI lives; OAuth outcomes redirect here.
    pub admin_ui_path: String,
    pub database_pool: PgPool,
}

impl AppConfig {
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let database = DatabaseConfig::from_env()?;
        let database_pool = sqlx::PgPool::connect(&database.connection_string()).await?;

        Ok(Self {
            database,
            bling: BlingApiConfig::from_env(),
            encryption_key: env::var("ENCRYPTION_KEY")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            cors_origins,
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            admin_ui_path: env::var("ADMIN_UI_PATH")
                .unwrap_or_else(|_| "/app/settings/bling".to_string()),
            database_pool,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
