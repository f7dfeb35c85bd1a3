use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vox_realtime::Voice;

#[derive(Parser, Debug)]
#[command(name = "vox")]
#[command(author, version, about = "Talk to a live model through your microphone", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a voice session (default if no command specified)
    Talk(TalkArgs),
    /// List the available output voices
    Voices,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct TalkArgs {
    /// Output voice (Puck, Charon, Kore, Fenrir, Zephyr)
    #[arg(short, long, env = "VOX_VOICE")]
    pub voice: Option<Voice>,

    /// Live model to talk to
    #[arg(short, long, env = "VOX_MODEL")]
    pub model: Option<String>,

    /// Model used by the create_image tool
    #[arg(long, env = "VOX_IMAGE_MODEL")]
    pub image_model: Option<String>,

    /// Directory generated images are written to
    #[arg(long, env = "VOX_IMAGE_DIR")]
    pub image_dir: Option<PathBuf>,

    /// System instruction replacing the default one
    #[arg(long)]
    pub instruction: Option<String>,
}

impl Cli {
    /// The talk arguments, defaulting when no subcommand was given.
    pub fn talk_args(&self) -> Option<TalkArgs> {
        match &self.command {
            None => Some(TalkArgs::default()),
            Some(Commands::Talk(args)) => Some(args.clone()),
            Some(Commands::Voices) => None,
        }
    }
}
