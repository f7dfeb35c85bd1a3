use std::path::PathBuf;

use anyhow::Result;
use vox_realtime::{Credentials, SessionConfig, Voice};

use crate::cli::TalkArgs;

/// Everything a talk session needs, resolved from flags and environment.
pub struct Config {
    pub credentials: Credentials,
    pub voice: Voice,
    pub session: SessionConfig,
    pub image_model: Option<String>,
    pub image_dir: PathBuf,
}

impl Config {
    pub fn from_env(args: TalkArgs) -> Result<Self> {
        let credentials = Credentials::from_env()?;
        Self::resolve(credentials, args)
    }

    fn resolve(credentials: Credentials, args: TalkArgs) -> Result<Self> {
        let mut session = SessionConfig::builder();
        if let Some(model) = args.model {
            session = session.model(model);
        }
        if let Some(instruction) = args.instruction {
            session = session.instruction(instruction);
        }
        let session = session.build()?;

        Ok(Self {
            credentials,
            voice: args.voice.unwrap_or_default(),
            session,
            image_model: args.image_model,
            image_dir: args.image_dir.unwrap_or_else(|| PathBuf::from("vox-images")),
        })
    }
}
