use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use findme_hw::{capture_selfie, Camera, CaptureAction, SelfieStore};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;

#[derive(Parser)]
#[command(name = "findme", about = "Find your event photos from a selfie")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the photos you appear in
    #[command(group(ArgGroup::new("face").required(true).args(["selfie", "camera"])))]
    Find {
        /// 10-digit phone number, used to name your folder
        #[arg(short, long)]
        phone: String,
        /// Email address
        #[arg(short, long)]
        email: String,
        /// Selfie image file
        #[arg(short, long)]
        selfie: Option<PathBuf>,
        /// Take the selfie with this camera instead (e.g. /dev/video0)
        #[arg(short, long)]
        camera: Option<String>,
        /// Directory for a selfie taken with --camera
        #[arg(long, default_value = "user_selfies", requires = "camera")]
        dir: PathBuf,
        /// Re-encode the photo collection before matching
        #[arg(long)]
        rescan: bool,
    },
    /// Re-encode the photo collection now
    Rescan,
    /// Show daemon status
    Status,
    /// Take a selfie with the webcam and save it
    Capture {
        /// Name used in the saved file
        #[arg(short, long)]
        user: String,
        /// Camera device
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Directory for the saved selfie
        #[arg(long, default_value = "user_selfies")]
        dir: PathBuf,
    },
    /// List video capture devices
    Devices,
}

#[zbus::proxy(
    interface = "org.findme.PhotoFinder1",
    default_service = "org.findme.PhotoFinder1",
    default_path = "/org/findme/PhotoFinder1"
)]
trait PhotoFinder {
    async fn find_photos(
        &self,
        phone: &str,
        email: &str,
        selfie: Vec<u8>,
        force_rescan: bool,
    ) -> zbus::Result<(String, Vec<String>, String)>;
    async fn rescan(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Find {
            phone,
            email,
            selfie,
            camera,
            dir,
            rescan,
        } => {
            let selfie_path = match (selfie, camera) {
                (Some(path), _) => path,
                (None, Some(device)) => {
                    match capture_interactive(&device, &phone, &dir)? {
                        Some(path) => path,
                        None => return Ok(()),
                    }
                }
                (None, None) => bail!("either --selfie or --camera is required"),
            };
            let bytes = std::fs::read(&selfie_path)
                .with_context(|| format!("reading selfie {}", selfie_path.display()))?;

            if rescan {
                println!("Rescanning the photo collection, this can take a while...");
            }
            let proxy = connect().await?;
            let (status, previews, archive) =
                proxy.find_photos(&phone, &email, bytes, rescan).await?;

            println!("{status}");
            for preview in &previews {
                println!("  {preview}");
            }
            if !archive.is_empty() {
                println!("Download: {archive}");
            }
        }
        Commands::Rescan => {
            let proxy = connect().await?;
            println!("Rescanned: {}", proxy.rescan().await?);
        }
        Commands::Status => match connect().await {
            Ok(proxy) => {
                let raw = proxy.status().await?;
                let status: serde_json::Value =
                    serde_json::from_str(&raw).context("daemon returned invalid status")?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            Err(e) => {
                tracing::debug!(error = %e, "status: daemon not reachable");
                println!("findmed: not connected");
            }
        },
        Commands::Capture { user, device, dir } => {
            if let Some(path) = capture_interactive(&device, &user, &dir)? {
                println!("Saved {}", path.display());
            }
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No video capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

async fn connect() -> Result<PhotoFinderProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    Ok(PhotoFinderProxy::new(&connection).await?)
}

/// Open the camera and prompt until the user saves a selfie or quits.
fn capture_interactive(device: &str, user: &str, dir: &Path) -> Result<Option<PathBuf>> {
    let mut camera = Camera::open(device, CAPTURE_WIDTH, CAPTURE_HEIGHT)?;
    let store = SelfieStore::new(dir);
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    let path = capture_selfie(&mut camera, &store, user, || loop {
        print!("Press 's' + Enter to take the selfie, 'q' + Enter to quit: ");
        let _ = std::io::stdout().flush();
        match lines.next() {
            Some(Ok(line)) => match line.trim() {
                "s" | "S" => return CaptureAction::Save,
                "q" | "Q" => return CaptureAction::Quit,
                _ => continue,
            },
            _ => return CaptureAction::Quit,
        }
    })?;

    if path.is_none() {
        println!("Capture cancelled");
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn find_dir(args: &[&str]) -> PathBuf {
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Find { dir, .. } => dir,
            _ => panic!("expected find"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_camera_selfie_dir_is_configurable() {
        let base = ["findme", "find", "-p", "5551234567", "-e", "a@b.com"];
        let with_dir = [&base[..], &["--camera", "/dev/video2", "--dir", "/tmp/shots"]].concat();
        assert_eq!(find_dir(&with_dir), PathBuf::from("/tmp/shots"));

        let default = [&base[..], &["--camera", "/dev/video2"]].concat();
        assert_eq!(find_dir(&default), PathBuf::from("user_selfies"));
    }

    #[test]
    fn test_find_needs_selfie_or_camera() {
        let args = ["findme", "find", "-p", "5551234567", "-e", "a@b.com"];
        assert!(Cli::try_parse_from(args).is_err());
        // --dir only applies to camera captures.
        let file_with_dir = [&args[..], &["--selfie", "me.jpg", "--dir", "x"]].concat();
        assert!(Cli::try_parse_from(file_with_dir).is_err());
    }
}
