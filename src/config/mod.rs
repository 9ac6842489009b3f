use crate::global;
use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Environment variable that overrides `discord.token`.
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub recorder: RecorderConfig,
    pub encoder: EncoderConfig,
    pub transport: TransportConfig,
    pub api: ApiConfig,
    pub reminder: ReminderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Prefer setting `DISCORD_TOKEN` instead of storing it here.
    pub token: String,
    pub api_base: String,
    /// Upper bound on any single Discord REST request.
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub poll_interval_seconds: u64,
    /// How far ahead of an event's start/end a tick will act.
    pub window_seconds: i64,
    pub fetch_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    /// Defaults to `<data_dir>/recordings`.
    pub recordings_dir: Option<PathBuf>,
    /// Where provisional audio lives while recording. Defaults to the OS temp dir.
    pub temp_dir: Option<PathBuf>,
    /// UTC offset used for meeting dates shown to humans, e.g. "+08:00".
    pub display_utc_offset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Program plus leading arguments; the PCM input and output arguments are appended.
    pub command: Vec<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capture command writing raw s16le/48kHz/stereo PCM to stdout.
    /// `{guild_id}` and `{channel_id}` are substituted.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Local hour of day at which due-tomorrow reminders go out.
    pub hour: u32,
    pub interval_seconds: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://discord.com/api/v10".to_string(),
            request_timeout_seconds: 15,
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            window_seconds: 60,
            fetch_timeout_seconds: 20,
            connect_timeout_seconds: 20,
            recordings_dir: None,
            temp_dir: None,
            display_utc_offset: "+00:00".to_string(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            command: vec!["ffmpeg".to_string()],
            timeout_seconds: 30,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "guildscribe-voice-bridge".to_string(),
                "--guild".to_string(),
                "{guild_id}".to_string(),
                "--channel".to_string(),
                "{channel_id}".to_string(),
            ],
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 10000,
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 9,
            interval_seconds: 3600,
        }
    }
}

impl DiscordConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

impl RecorderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.window_seconds.max(0))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn recordings_dir(&self) -> Result<PathBuf> {
        match &self.recordings_dir {
            Some(dir) => Ok(dir.clone()),
            None => global::recordings_dir(),
        }
    }

    pub fn display_offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.display_utc_offset)
    }
}

impl EncoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ApiConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Parse "+HH:MM", "-HH:MM", "+HHMM" or "Z" into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).context("zero offset");
    }

    let (sign, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = raw.strip_prefix('-') {
        (-1, rest)
    } else {
        bail!("UTC offset must start with '+' or '-': {raw:?}");
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        bail!("UTC offset must look like +HH:MM: {raw:?}");
    }

    let hours: i32 = digits[..2].parse()?;
    let minutes: i32 = digits[2..].parse()?;
    if hours > 23 || minutes > 59 {
        bail!("UTC offset out of range: {raw:?}");
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .with_context(|| format!("UTC offset out of range: {raw:?}"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save()?;
            config
        } else {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
            info!("Loaded config from {:?}", config_path);
            config
        };

        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.discord.token = token.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.recorder
            .display_offset()
            .context("Invalid recorder.display_utc_offset")?;
        if self.encoder.command.is_empty() {
            bail!("encoder.command must name a program");
        }
        if self.transport.command.is_empty() {
            bail!("transport.command must name a program");
        }
        if self.reminder.hour > 23 {
            bail!("reminder.hour must be between 0 and 23");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
