use eyre::{Result, WrapErr};

use crate::domain::Principal;

#[derive(Debug, Clone)]
pub struct Config {
    /// Deployer of the contract; the only principal allowed to register.
    pub admin: Principal,
    pub contract_name: String,
    pub db_path: String,
    pub api_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let admin = std::env::var("ADMIN_PRINCIPAL").wrap_err("ADMIN_PRINCIPAL not set")?;
        let admin = Principal::new(admin).wrap_err("ADMIN_PRINCIPAL is not a valid principal")?;
        let contract_name =
            std::env::var("CONTRACT_NAME").unwrap_or_else(|_| "elastic-arbitrage".to_string());
        let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "ledger.db".to_string());
        let api_port = env_or("API_PORT", 3001);

        Ok(Config {
            admin,
            contract_name,
            db_path,
            api_port,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
