use config::ConfigError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationSettings,
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Token lifetimes and credential hashing settings
///
/// Lifetimes are unsigned seconds; a negative value fails to load.
#[derive(serde::Deserialize, Clone, Debug)]
pub struct AuthSettings {
    #[serde(default = "default_bearer_ttl")]
    pub bearer_ttl_seconds: u32,    // 7200 = 2 hours
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: u32,   // 5184000 = 60 days
    #[serde(default = "default_max_refresh_history")]
    pub max_refresh_history: usize,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            bearer_ttl_seconds: default_bearer_ttl(),
            refresh_ttl_seconds: default_refresh_ttl(),
            max_refresh_history: default_max_refresh_history(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_bearer_ttl() -> u32 {
    7200
}

fn default_refresh_ttl() -> u32 {
    60 * 24 * 60 * 60
}

fn default_max_refresh_history() -> usize {
    20
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

/// Reads `configuration.yaml` (optional), then `APP_*` environment overrides,
/// e.g. `APP_AUTH__BEARER_TTL_SECONDS=600`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
        .build()?;
    settings.try_deserialize::<Settings>()
}
