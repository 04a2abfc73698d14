use anyhow::{Context, Result};
use attend_core::{AttendanceRecorder, AttendanceService, EuclideanMatcher, GalleryLoader, ImageSource};
use attend_store::SqliteStore;
use object_store::aws::AmazonS3Builder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod provider;

use config::Config;
use dbus_interface::AttendanceInterface;
use provider::EncodingFileProvider;

const BUS_NAME: &str = "org.attend.Attendance1";
const OBJECT_PATH: &str = "/org/attend/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("attendd starting");

    let config = Config::from_env();
    tracing::debug!(?config, "configuration loaded");

    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;

    let service = Arc::new(AttendanceService::new(
        GalleryLoader::new(image_source(&config)?, Arc::new(EncodingFileProvider)),
        Box::new(EuclideanMatcher),
        AttendanceRecorder::new(Arc::new(store)),
    ));

    // An unreadable manifest leaves the gallery empty; the daemon still serves.
    let summary = service.reload_gallery(&config.manifest_path).await;
    tracing::info!(
        known_faces = summary.known_faces_count,
        version = summary.version,
        "initial gallery loaded"
    );

    let iface = AttendanceInterface::new(
        Arc::clone(&service),
        config.manifest_path.clone(),
        config.live_threshold,
        config.upload_threshold,
    );

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, iface)?
        .build()
        .await
        .context("registering D-Bus service")?;

    tracing::info!(bus_name = BUS_NAME, system_bus = config.system_bus, "attendd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("attendd shutting down");

    Ok(())
}

fn image_source(config: &Config) -> Result<ImageSource> {
    if config.use_s3 {
        let s3 = AmazonS3Builder::from_env()
            .with_bucket_name(&config.s3_bucket)
            .build()
            .context("configuring S3 client")?;
        tracing::info!(bucket = %config.s3_bucket, prefix = %config.s3_prefix, "reference images from S3");
        Ok(ImageSource::object(Arc::new(s3), config.s3_prefix.clone()))
    } else {
        tracing::info!(dir = %config.known_faces_dir.display(), "reference images from local directory");
        Ok(ImageSource::local(&config.known_faces_dir))
    }
}
