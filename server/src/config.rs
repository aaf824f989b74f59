use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub base_url: String,
    pub cors_origins: Vec<String>,
    pub db: DbConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub documents: DocumentConfig,
    pub maps: MapsConfig,
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub access_expiry_secs: i64,
    pub refresh_expiry_secs: i64,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Root directory of the on-disk blob store.
    pub root: PathBuf,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    /// At most this many signups are emailed synchronously within the
    /// request; larger events are handed to the background sender.
    pub sync_send_limit: usize,
    pub batch_size: usize,
    pub batch_pause_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DocumentConfig {
    /// Command invoked as `<convert_command> <input> -o <output.pdf>` for
    /// Word-to-PDF conversion.
    pub convert_command: String,
    /// Command invoked as `<render_command> <input.html> <output.pdf>` for
    /// cast-list rendering.
    pub render_command: String,
}

#[derive(Clone, Debug)]
pub struct MapsConfig {
    /// An embedded map iframe is only accepted when its src starts with one
    /// of these prefixes.
    pub allowed_embed_prefixes: Vec<String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or_parse("PORT", 3000),
            base_url: env_or("BASE_URL", "http://localhost:3000"),
            cors_origins: env_or("CORS_ORIGINS", "http://localhost:3000,http://localhost:8080")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            db: DbConfig {
                host: env_or("DB_HOST", "localhost"),
                port: env_or_parse("DB_PORT", 5432),
                database: env_or("DB_NAME", "megagame_hub"),
                user: env_or("DB_USER", "megagame"),
                password: env_or("DB_PASSWORD", ""),
                pool_min: env_or_parse("DB_POOL_MIN", 5),
                pool_max: env_or_parse("DB_POOL_MAX", 50),
            },
            jwt: JwtConfig {
                secret: env_or("JWT_SECRET", "change-me-to-a-secure-random-string"),
                access_expiry_secs: parse_duration_to_secs(&env_or("JWT_ACCESS_EXPIRY", "1h")),
                refresh_expiry_secs: parse_duration_to_secs(&env_or("JWT_REFRESH_EXPIRY", "30d")),
            },
            rate_limit: RateLimitConfig {
                window_secs: 60,
                max_requests: env_or_parse("RATE_LIMIT_MAX", 100),
            },
            storage: StorageConfig {
                root: PathBuf::from(env_or("STORAGE_ROOT", "storage")),
            },
            mail: MailConfig {
                api_url: env_or("MAIL_API_URL", ""),
                api_key: env_or("MAIL_API_KEY", ""),
                from: env_or("MAIL_FROM", "no-reply@megagame-hub.example"),
                sync_send_limit: env_or_parse("MAIL_SYNC_SEND_LIMIT", 10),
                batch_size: env_or_parse("MAIL_BATCH_SIZE", 10),
                batch_pause_secs: env_or_parse("MAIL_BATCH_PAUSE_SECS", 3),
            },
            documents: DocumentConfig {
                convert_command: env_or("DOC_CONVERT_COMMAND", "pandoc"),
                render_command: env_or("DOC_RENDER_COMMAND", "weasyprint"),
            },
            maps: MapsConfig {
                allowed_embed_prefixes: env_or(
                    "MAPS_EMBED_PREFIXES",
                    "https://www.google.com/maps/embed",
                )
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
        }
    }

    pub fn database_url(&self) -> String {
        if let Ok(url) = env::var("DATABASE_URL") {
            return url;
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db.user, self.db.password, self.db.host, self.db.port, self.db.database
        )
    }
}

fn parse_duration_to_secs(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return 3600;
    }
    let (num_str, unit) = s.split_at(s.len() - 1);
    let num: i64 = num_str.parse().unwrap_or(1);
    match unit {
        "s" => num,
        "m" => num * 60,
        "h" => num * 3600,
        "d" => num * 86400,
        _ => s.parse().unwrap_or(3600),
    }
}
