use std::env;

/// AppConfig
///
/// The application's configuration, loaded once at startup and shared read-only through
/// `AppState` (handlers and extractors pull it with `FromRef`).
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. Local runs without one use the in-memory repository.
    pub db_url: Option<String>,
    // Address the HTTP listener binds to.
    pub bind_addr: String,
    // S3-compatible storage endpoint holding post pictures (MinIO locally).
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_key: String,
    pub s3_secret: String,
    pub s3_bucket: String,
    // Base URL under which stored pictures are reachable by browsers.
    pub media_public_url: String,
    // Runtime environment marker. Controls the development auth bypass and log format.
    pub env: Env,
    // HMAC secret signing session tokens.
    pub session_secret: String,
    // Lifetime of a login session.
    pub session_ttl_hours: i64,
    // bcrypt work factor for new password hashes.
    pub password_hash_cost: u32,
    // Accounts granted staff rights at startup (comma separated STAFF_USERNAMES).
    pub staff_usernames: Vec<String>,
}

/// Env
///
/// Runtime context: developer conveniences in `Local`, strict secrets in `Production`.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

const LOCAL_SESSION_SECRET: &str = "blogicum-local-session-secret";

impl Default for AppConfig {
    /// Safe values for test state; no environment variables are read.
    fn default() -> Self {
        Self {
            db_url: None,
            bind_addr: "127.0.0.1:0".to_string(),
            s3_endpoint: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_key: "admin".to_string(),
            s3_secret: "password".to_string(),
            s3_bucket: "blogicum-test".to_string(),
            media_public_url: "http://localhost:9000/blogicum-test".to_string(),
            env: Env::Local,
            session_secret: LOCAL_SESSION_SECRET.to_string(),
            session_ttl_hours: 24,
            // Lowest cost bcrypt accepts; keeps tests fast.
            password_hash_cost: 4,
            staff_usernames: Vec::new(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables.
    ///
    /// # Panics
    /// Panics when a variable required in production (`DATABASE_URL`, `SESSION_SECRET`,
    /// `S3_ACCESS_KEY`, `S3_SECRET_KEY`, `S3_ENDPOINT`) is missing, so the server never starts
    /// half-configured.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let session_ttl_hours = env::var("SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24);
        let password_hash_cost = env::var("PASSWORD_HASH_COST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(bcrypt::DEFAULT_COST);
        let staff_usernames = env::var("STAFF_USERNAMES")
            .map(|v| parse_usernames(&v))
            .unwrap_or_default();

        match env {
            Env::Local => {
                let s3_endpoint =
                    env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".to_string());
                let s3_bucket =
                    env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "blogicum-media".to_string());
                let media_public_url = env::var("MEDIA_PUBLIC_URL")
                    .unwrap_or_else(|_| format!("{}/{}", s3_endpoint, s3_bucket));
                Self {
                    env: Env::Local,
                    db_url: env::var("DATABASE_URL").ok(),
                    bind_addr,
                    s3_endpoint,
                    s3_region: "us-east-1".to_string(),
                    s3_key: env::var("S3_ACCESS_KEY").unwrap_or_else(|_| "admin".to_string()),
                    s3_secret: env::var("S3_SECRET_KEY").unwrap_or_else(|_| "password".to_string()),
                    s3_bucket,
                    media_public_url,
                    session_secret: env::var("SESSION_SECRET")
                        .unwrap_or_else(|_| LOCAL_SESSION_SECRET.to_string()),
                    session_ttl_hours,
                    password_hash_cost,
                    staff_usernames,
                }
            }
            Env::Production => {
                let s3_endpoint =
                    env::var("S3_ENDPOINT").expect("FATAL: S3_ENDPOINT required in prod");
                let s3_bucket =
                    env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "blogicum-media".to_string());
                let media_public_url = env::var("MEDIA_PUBLIC_URL")
                    .unwrap_or_else(|_| format!("{}/{}", s3_endpoint, s3_bucket));
                Self {
                    env: Env::Production,
                    db_url: Some(
                        env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
                    ),
                    bind_addr,
                    s3_endpoint,
                    s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                    s3_key: env::var("S3_ACCESS_KEY")
                        .expect("FATAL: S3_ACCESS_KEY required in prod"),
                    s3_secret: env::var("S3_SECRET_KEY")
                        .expect("FATAL: S3_SECRET_KEY required in prod"),
                    s3_bucket,
                    media_public_url,
                    session_secret: env::var("SESSION_SECRET")
                        .expect("FATAL: SESSION_SECRET must be set in production."),
                    session_ttl_hours,
                    password_hash_cost,
                    staff_usernames,
                }
            }
        }
    }
}

fn parse_usernames(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_usernames_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(parse_usernames(" admin, editor ,,"), vec!["admin", "editor"]);
        assert!(parse_usernames("").is_empty());
    }
}
