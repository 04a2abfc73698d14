use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// JSON manifest listing known employees and their reference images.
    pub manifest_path: PathBuf,
    /// Directory holding reference images when S3 is disabled.
    pub known_faces_dir: PathBuf,
    /// Fetch reference images from S3 instead of the local directory.
    pub use_s3: bool,
    /// S3 bucket holding reference images.
    pub s3_bucket: String,
    /// Key prefix of reference images inside the bucket.
    pub s3_prefix: String,
    /// Euclidean distance threshold for live recognition.
    pub live_threshold: f32,
    /// Euclidean distance threshold for manually uploaded photos.
    pub upload_threshold: f32,
    /// Register on the system bus instead of the session bus.
    pub system_bus: bool,
}

impl Config {
    /// Load configuration from `ATTEND_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("attend");

        Self {
            db_path: env_path("ATTEND_DB_PATH").unwrap_or_else(|| data_dir.join("attendance.db")),
            manifest_path: env_path("ATTEND_MANIFEST_PATH")
                .unwrap_or_else(|| PathBuf::from("data/employees.json")),
            known_faces_dir: env_path("ATTEND_KNOWN_FACES_DIR")
                .unwrap_or_else(|| PathBuf::from("data/know_faces")),
            use_s3: env_bool("ATTEND_USE_S3", false),
            s3_bucket: std::env::var("ATTEND_S3_BUCKET")
                .unwrap_or_else(|_| "face-attendance-bucket".to_string()),
            s3_prefix: std::env::var("ATTEND_S3_PREFIX")
                .unwrap_or_else(|_| "known_faces".to_string()),
            live_threshold: env_f32("ATTEND_LIVE_THRESHOLD", 0.6),
            upload_threshold: env_f32("ATTEND_UPLOAD_THRESHOLD", 0.5),
            system_bus: env_bool("ATTEND_SYSTEM_BUS", false),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_bool(&v).unwrap_or(default))
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
