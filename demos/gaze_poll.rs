//! Example Poller (Reader)
//!
//! Connects to the eye tracker service and prints every sample it reads.
//! Pass `latest` to print only the newest sample on each poll.

use gaze_memory::{EyeTrackerReader, ReaderConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_else(|| "next".to_string());
    let mut config = ReaderConfig::default().with_timeout(Duration::from_secs(10));
    if let Some(path) = args.next() {
        config = config.with_handshake_path(path);
    }

    println!("[Poll] Handshake endpoint: {}", config.handshake_path.display());
    if !EyeTrackerReader::is_service_available(&config) {
        println!("[Poll] Service endpoint not found, trying anyway");
    }

    let mut reader = match EyeTrackerReader::create_with_config(&config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("[Poll] Failed to create reader: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "[Poll] Connected to service {} ({} slots)",
        reader.service_version(),
        reader.geometry().sample_count()
    );

    loop {
        let sample = if mode == "latest" {
            reader.try_read_latest()
        } else {
            reader.try_read_next()
        };

        match sample {
            Some(s) => println!(
                "[Poll] t={} left=({:.4}, {:.4}) right=({:.4}, {:.4}) event={}",
                s.time, s.left_eye_x, s.left_eye_y, s.right_eye_x, s.right_eye_y, s.gaze_event
            ),
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    }
}
