use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Per store-call deadline for the KPI engine. `0` disables the deadline.
    pub kpi_store_timeout_ms: u64,
    /// Target assigned to every KPI row the engine creates.
    pub kpi_default_target: i64,
    pub kpi_reconcile_concurrency: usize,
    /// Six-field cron expression for the nightly reconciliation sweep.
    pub reconcile_cron: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("kpi_store_timeout_ms", &self.kpi_store_timeout_ms)
            .field("kpi_default_target", &self.kpi_default_target)
            .field(
                "kpi_reconcile_concurrency",
                &self.kpi_reconcile_concurrency,
            )
            .field("reconcile_cron", &self.reconcile_cron)
            .finish()
    }
}
