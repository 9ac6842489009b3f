//! Discord REST client backing the calendar, guild directory and notifier seams.

pub mod models;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::calendar::{CalendarEvent, CalendarSource, ChannelId, EventId, GuildDirectory, GuildId};
use crate::config::DiscordConfig;
use crate::notify::Notifier;
use models::{Channel, CreateMessage, PartialGuild, ScheduledEvent};

pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
}

impl DiscordClient {
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!("Bot {token}"))
            .context("Bot token contains invalid characters")?;
        headers.insert(header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!(
                "DiscordBot (guildscribe, {})",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self> {
        Self::new(&config.api_base, &config.token, config.request_timeout())
    }

    /// GET `path`, returning `None` on 404.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request to {path} failed"))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            bail!("Discord returned {} for {}: {}", status, path, body);
        }

        serde_json::from_str(&body)
            .map(Some)
            .with_context(|| format!("Failed to parse response from {path}"))
    }

    async fn channels(&self, guild: GuildId) -> Result<Vec<Channel>> {
        Ok(self
            .get(&format!("/guilds/{guild}/channels"))
            .await?
            .unwrap_or_default())
    }

    fn map_events(&self, raw: Vec<ScheduledEvent>, channels: &[Channel]) -> Vec<CalendarEvent> {
        raw.into_iter()
            .filter_map(|event| {
                let id = event.id.clone();
                let mapped = models::calendar_event(event, channels);
                if mapped.is_none() {
                    warn!("Skipping unrecognised scheduled event {}", id);
                }
                mapped
            })
            .collect()
    }
}

#[async_trait]
impl CalendarSource for DiscordClient {
    async fn fetch_events(&self, guild: GuildId) -> Result<Vec<CalendarEvent>> {
        let raw: Vec<ScheduledEvent> = self
            .get(&format!("/guilds/{guild}/scheduled-events"))
            .await?
            .unwrap_or_default();
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        let channels = self.channels(guild).await?;
        let events = self.map_events(raw, &channels);
        debug!("Fetched {} event(s) for guild {}", events.len(), guild);
        Ok(events)
    }

    async fn fetch_event(&self, guild: GuildId, event: EventId) -> Result<Option<CalendarEvent>> {
        let Some(raw) = self
            .get::<ScheduledEvent>(&format!("/guilds/{guild}/scheduled-events/{event}"))
            .await?
        else {
            return Ok(None);
        };

        let channels = self.channels(guild).await?;
        Ok(models::calendar_event(raw, &channels))
    }
}

#[async_trait]
impl GuildDirectory for DiscordClient {
    async fn guilds(&self) -> Result<Vec<GuildId>> {
        let guilds: Vec<PartialGuild> = self
            .get("/users/@me/guilds?limit=200")
            .await?
            .unwrap_or_default();

        Ok(guilds
            .iter()
            .filter_map(|g| match g.id.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Ignoring guild with malformed id {:?} ({})", g.id, g.name);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl Notifier for DiscordClient {
    async fn send(&self, channel: ChannelId, content: &str) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.base_url, channel);
        let response = self
            .client
            .post(&url)
            .json(&CreateMessage { content })
            .send()
            .await
            .context("Failed to send message")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Message to channel {} rejected ({}): {}", channel, status, body);
        }
        Ok(())
    }
}
