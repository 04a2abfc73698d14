use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "attend", about = "Face attendance CLI")]
struct Cli {
    /// Talk to the daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reload the known-faces gallery from the manifest
    Reload,
    /// Recognize faces from an encodings file and record attendance
    Recognize {
        /// JSON file with one encoding per detected face
        file: PathBuf,
        /// Distance threshold (defaults to the daemon's live threshold)
        #[arg(short, long)]
        threshold: Option<f64>,
        /// Use the daemon's upload threshold instead of the live one
        #[arg(long, conflicts_with = "threshold")]
        upload: bool,
    },
    /// List attendance records
    Attendance,
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.attend.Attendance1",
    default_service = "org.attend.Attendance1",
    default_path = "/org/attend/Attendance1"
)]
trait Attendance {
    async fn reload_gallery(&self) -> zbus::Result<String>;
    async fn recognize(&self, encodings: &str, threshold: f64) -> zbus::Result<String>;
    async fn recognize_upload(&self, encodings: &str) -> zbus::Result<String>;
    async fn get_attendance(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("connecting to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("attendd is not reachable")?;

    let reply = match cli.command {
        Commands::Reload => proxy.reload_gallery().await?,
        Commands::Recognize {
            file,
            threshold,
            upload,
        } => {
            let encodings = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            tracing::debug!(file = %file.display(), upload, "sending encodings");
            if upload {
                proxy.recognize_upload(&encodings).await?
            } else {
                // 0 asks the daemon for its configured live threshold.
                proxy.recognize(&encodings, threshold.unwrap_or(0.0)).await?
            }
        }
        Commands::Attendance => proxy.get_attendance().await?,
        Commands::Status => proxy.status().await?,
    };

    println!("{}", pretty(&reply));
    Ok(())
}

/// Pretty-print a JSON reply, falling back to the raw string.
fn pretty(reply: &str) -> String {
    serde_json::from_str::<serde_json::Value>(reply)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| reply.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_recognize_args() {
        let cli = Cli::try_parse_from(["attend", "recognize", "faces.json", "-t", "0.45"]).unwrap();
        match cli.command {
            Commands::Recognize {
                file,
                threshold,
                upload,
            } => {
                assert_eq!(file, PathBuf::from("faces.json"));
                assert_eq!(threshold, Some(0.45));
                assert!(!upload);
            }
            _ => panic!("expected recognize"),
        }
        assert!(Cli::try_parse_from(["attend", "recognize", "f.json", "-t", "1", "--upload"]).is_err());
    }

    #[test]
    fn test_upload_help_names_upload_threshold() {
        let cmd = Cli::command();
        let recognize = cmd.find_subcommand("recognize").unwrap();
        let upload = recognize
            .get_arguments()
            .find(|a| a.get_id() == "upload")
            .unwrap();
        let help = upload.get_help().unwrap().to_string();
        assert!(help.contains("upload threshold"));
        assert!(!help.contains("looser"));
    }

    #[test]
    fn test_pretty_falls_back_to_raw() {
        assert_eq!(pretty("not json"), "not json");
        assert!(pretty(r#"{"a":1}"#).contains("\"a\": 1"));
    }
}
