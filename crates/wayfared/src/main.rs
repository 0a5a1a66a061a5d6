use anyhow::Result;
use tracing_subscriber::EnvFilter;
use wayfare_core::SidecarEncodingSource;

mod config;
mod dbus_interface;
mod engine;

const BUS_NAME: &str = "org.wayfare.Wayfare1";
const OBJECT_PATH: &str = "/org/wayfare/Wayfare1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("wayfared starting");

    let config = config::Config::load()?;
    tracing::info!(
        db = %config.db_path.display(),
        thumbnails = %config.thumbnail_dir.display(),
        strict = config.thresholds.strict,
        maybe = config.thresholds.maybe,
        min_face_height = config.thresholds.min_face_height,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config, Box::new(SidecarEncodingSource))?;
    let service = dbus_interface::WayfareService::new(engine, config);

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = BUS_NAME, "wayfared ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("wayfared shutting down");

    Ok(())
}
