//! `vox`: a live voice conversation with Gemini from the terminal.
//!
//! ```bash
//! # Talk with the default voice
//! GOOGLE_API_KEY=... vox
//!
//! # Pick a voice and keep generated images somewhere else
//! vox talk --voice Kore --image-dir ~/Pictures/vox
//! ```

mod cli;
mod config;
mod console;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use console::ConsoleObserver;
use vox_realtime::desktop::CpalDevices;
use vox_realtime::gemini::{GeminiConnector, GeminiImageGenerator};
use vox_realtime::{SessionState, Voice, VoiceClient};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be set
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let init = if cli.json_logs {
        vox_telemetry::init_json_telemetry("vox")
    } else {
        vox_telemetry::init_telemetry("vox")
    };
    init.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    if let Some(Commands::Voices) = cli.command {
        for voice in Voice::ALL {
            println!("{voice}");
        }
        return Ok(());
    }

    let Some(args) = cli.talk_args() else {
        return Ok(());
    };
    talk(Config::from_env(args)?).await
}

async fn talk(config: Config) -> Result<()> {
    let mut images = GeminiImageGenerator::new(config.credentials.clone());
    if let Some(model) = &config.image_model {
        images = images.with_model(model.clone());
    }

    let client = VoiceClient::builder()
        .connector(Arc::new(GeminiConnector::new(config.credentials.clone())))
        .devices(Arc::new(CpalDevices))
        .image_generator(images)
        .observer(ConsoleObserver::new(config.image_dir.clone()))
        .config(config.session)
        .build()?;

    println!("Connecting as {}...", config.voice);
    client.connect(config.voice).await?;

    let Some(mut state) = client.watch_state().await else {
        return Ok(());
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("Interrupted, closing session");
        }
        _ = state.wait_for(|s| *s == SessionState::Closed) => {
            tracing::info!("Session closed by the server");
        }
    }

    client.disconnect().await;
    Ok(())
}
