//! Per-guild session table.
//!
//! Each guild gets its own async lock around an `Option<RecordingSession>`.
//! Holding that lock is the only way to start or stop a session, so a
//! check-then-act on membership cannot race. Guilds never contend with each
//! other; the outer map lock is only held to look up a slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use super::session::{RecordingSession, SessionInfo};
use crate::calendar::GuildId;

type Slot = Arc<tokio::sync::Mutex<Option<RecordingSession>>>;

/// Exclusive access to one guild's session slot.
pub type SlotGuard = OwnedMutexGuard<Option<RecordingSession>>;

#[derive(Default)]
pub struct SessionRegistry {
    slots: Mutex<HashMap<GuildId, Slot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, guild: GuildId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(guild).or_default().clone()
    }

    fn all_slots(&self) -> Vec<(GuildId, Slot)> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.iter().map(|(g, s)| (*g, s.clone())).collect()
    }

    /// Wait for exclusive access to `guild`'s slot.
    pub async fn lock(&self, guild: GuildId) -> SlotGuard {
        self.slot(guild).lock_owned().await
    }

    pub async fn is_recording(&self, guild: GuildId) -> bool {
        self.lock(guild).await.is_some()
    }

    /// Guilds that currently hold a session. Waits out any begin or end in
    /// flight so a session being started is not missed at shutdown.
    pub async fn recording_guilds(&self) -> Vec<GuildId> {
        let mut guilds = Vec::new();
        for (guild, slot) in self.all_slots() {
            if slot.lock().await.is_some() {
                guilds.push(guild);
            }
        }
        guilds.sort();
        guilds
    }

    /// Sessions that are settled right now. Slots busy with a begin or end
    /// are skipped rather than waited on.
    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        let mut sessions = Vec::new();
        for (_, slot) in self.all_slots() {
            let Ok(held) = slot.try_lock() else {
                continue;
            };
            if let Some(session) = held.as_ref() {
                sessions.push(session.info());
            }
        }
        sessions.sort_by_key(|s| s.guild_id);
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = SessionRegistry::new();
        assert!(!registry.is_recording(GuildId(1)).await);
        assert!(registry.recording_guilds().await.is_empty());
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_same_guild_is_serialized() {
        let registry = Arc::new(SessionRegistry::new());
        let guard = registry.lock(GuildId(1)).await;

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.lock(GuildId(1)).await.is_some() })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        assert!(!contender.await.unwrap());
    }

    #[tokio::test]
    async fn test_other_guilds_are_not_blocked() {
        let registry = SessionRegistry::new();
        let _held = registry.lock(GuildId(1)).await;

        let other = tokio::time::timeout(Duration::from_millis(200), registry.lock(GuildId(2))).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_snapshot_skips_busy_slot() {
        let registry = SessionRegistry::new();
        let _starting = registry.lock(GuildId(1)).await;

        let sessions =
            tokio::time::timeout(Duration::from_millis(200), registry.snapshot()).await;
        assert!(sessions.unwrap().is_empty());
    }
}
