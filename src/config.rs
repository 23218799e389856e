use anyhow::{anyhow, Result};
use serenity::all::{ChannelId, GuildId, RoleId};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/scrimbot/config.toml";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub scrim: Scrim,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub bot_owners: Vec<String>,
    pub command_prefix: String,
}

/// Where the scrim lives: the guild, the channel signup posts go to, the
/// voice channel reserved for spectators, and the three roles the bot keeps
/// in sync.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Scrim {
    pub guild_id: GuildId,
    pub signup_channel_id: ChannelId,
    pub meeting_channel_id: ChannelId,
    pub registered_role_id: RoleId,
    pub active_role_id: RoleId,
    pub spectator_role_id: RoleId,
    /// Roles pinged when a signup post goes out.
    pub mention_role_ids: Vec<RoleId>,
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Ok(config)
    }

    pub async fn reload(&mut self) -> Result<()> {
        let new = Self::load().await?;
        *self = new;
        Ok(())
    }
}
