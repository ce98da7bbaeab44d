use crate::database::Database;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-guild monitoring configuration. `message_id` only means anything while
/// `channel_id` is set; changing the channel or losing the message clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    pub address: Option<String>,
    pub channel_id: Option<u64>,
    pub message_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusDatabase {
    pub guilds: HashMap<u64, GuildConfig>,
}

impl Database<StatusDatabase> {
    /// Snapshot of every guild config, taken once at the start of a tick.
    pub async fn guild_configs(&self) -> HashMap<u64, GuildConfig> {
        self.read(|db| db.guilds.clone()).await
    }

    pub async fn get_config(&self, guild_id: u64) -> Option<GuildConfig> {
        self.read(|db| db.guilds.get(&guild_id).cloned()).await
    }

    pub async fn set_address(&self, guild_id: u64, address: String) -> Result<(), String> {
        self.transaction(|db| {
            db.guilds.entry(guild_id).or_default().address = Some(address);
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())
    }

    /// Pointing at a new channel always invalidates the old message.
    pub async fn set_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), String> {
        self.transaction(|db| {
            let config = db.guilds.entry(guild_id).or_default();
            config.channel_id = Some(channel_id);
            config.message_id = None;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())
    }

    pub async fn set_message_id(
        &self,
        guild_id: u64,
        message_id: Option<u64>,
    ) -> Result<(), String> {
        self.transaction(|db| {
            db.guilds.entry(guild_id).or_default().message_id = message_id;
            Ok(())
        })
        .await
        .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_db(dir: &tempfile::TempDir) -> Database<StatusDatabase> {
        let path = dir.path().join("status.db").to_string_lossy().into_owned();
        Database::new(path).await.unwrap()
    }

    #[tokio::test]
    async fn set_channel_clears_stale_message_id() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        db.set_channel(42, 100).await.unwrap();
        db.set_message_id(42, Some(555)).await.unwrap();
        db.set_channel(42, 200).await.unwrap();

        let config = db.get_config(42).await.unwrap();
        assert_eq!(config.channel_id, Some(200));
        assert_eq!(config.message_id, None);
    }

    #[tokio::test]
    async fn setters_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        db.set_address(42, "play.example.com".into()).await.unwrap();
        let first = db.get_config(42).await.unwrap();
        db.set_address(42, "play.example.com".into()).await.unwrap();
        let second = db.get_config(42).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.address.as_deref(), Some("play.example.com"));
    }

    #[tokio::test]
    async fn address_survives_channel_change() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_db(&dir).await;

        db.set_address(7, "mc.example.net:25570".into()).await.unwrap();
        db.set_channel(7, 300).await.unwrap();

        let config = db.get_config(7).await.unwrap();
        assert_eq!(config.address.as_deref(), Some("mc.example.net:25570"));
        assert_eq!(config.channel_id, Some(300));
    }
}
