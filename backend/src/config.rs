use dotenv::dotenv;
use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Listings older than this are archived by the background sweep.
    pub archive_after_days: i64,
    pub sweep_interval_secs: u64,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            port: env::var("PORT")?.parse()?,
            jwt_secret: env::var("JWT_SECRET")?,
            archive_after_days: env::var("ARCHIVE_AFTER_DAYS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()?,
        })
    }
}
