use crate::database::Database;
use crate::modules::status::{
    database::{GuildConfig, StatusDatabase},
    embed::{build_status_payload, format_count, EmbedStyle},
    probe::StatusProbe,
    publisher::{HttpPublisher, PublishError, StatusPublisher},
};
use crate::tasks::Task;
use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt};
use poise::serenity_prelude::{ActivityData, Context, OnlineStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const GUILD_CONCURRENCY: usize = 4;

/// What one tick did for one guild. `Stale` and `RecreatePending` both leave
/// the rest to the next tick; neither retries within the same tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped,
    Created(u64),
    Edited,
    RecreatePending,
    Stale,
}

pub struct StatusSyncTask {
    db: Database<StatusDatabase>,
    probe: Arc<dyn StatusProbe>,
    style: EmbedStyle,
    interval: Duration,
}

impl StatusSyncTask {
    pub fn new(
        db: Database<StatusDatabase>,
        probe: Arc<dyn StatusProbe>,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            probe,
            style: EmbedStyle::default(),
            interval,
        }
    }

    /// One reconciliation pass over every configured guild. Guilds are
    /// processed concurrently up to a small cap; a failure in one never
    /// aborts the others.
    pub async fn run_tick(&self, publisher: &dyn StatusPublisher) -> Vec<(u64, SyncOutcome)> {
        let guilds = self.db.guild_configs().await;

        let outcomes: Vec<(u64, SyncOutcome)> = stream::iter(guilds)
            .map(|(guild_id, config)| async move {
                let outcome = self.sync_guild(publisher, guild_id, &config).await;
                debug!("guild {}: {:?}", guild_id, outcome);
                (guild_id, outcome)
            })
            .buffer_unordered(GUILD_CONCURRENCY)
            .collect()
            .await;

        outcomes
    }

    async fn sync_guild(
        &self,
        publisher: &dyn StatusPublisher,
        guild_id: u64,
        config: &GuildConfig,
    ) -> SyncOutcome {
        let (address, channel_id) = match (&config.address, config.channel_id) {
            (Some(address), Some(channel_id)) => (address, channel_id),
            _ => return SyncOutcome::Skipped,
        };

        // An unreachable channel is not a deleted message: skip without
        // touching stored state, or a permissions hiccup would trigger a
        // resend storm.
        if !publisher.channel_exists(channel_id).await {
            debug!(
                "guild {}: channel {} unavailable, skipping",
                guild_id, channel_id
            );
            return SyncOutcome::Skipped;
        }

        let snapshot = self.probe.probe(address).await;
        let payload = build_status_payload(&self.style, address, snapshot.as_ref(), Utc::now());

        match config.message_id {
            None => match publisher.create_message(channel_id, &payload).await {
                Ok(message_id) => {
                    if let Err(e) = self.db.set_message_id(guild_id, Some(message_id)).await {
                        error!("guild {}: failed to persist message id: {}", guild_id, e);
                    }
                    SyncOutcome::Created(message_id)
                }
                Err(e) => {
                    warn!("guild {}: failed to send status message: {}", guild_id, e);
                    SyncOutcome::Stale
                }
            },
            Some(message_id) => match publisher.edit_message(channel_id, message_id, &payload).await
            {
                Ok(()) => SyncOutcome::Edited,
                Err(PublishError::NotFound) => {
                    info!(
                        "guild {}: status message {} is gone, recreating next tick",
                        guild_id, message_id
                    );
                    if let Err(e) = self.db.set_message_id(guild_id, None).await {
                        error!("guild {}: failed to clear message id: {}", guild_id, e);
                    }
                    SyncOutcome::RecreatePending
                }
                Err(e) => {
                    warn!(
                        "guild {}: failed to edit status message {}: {}",
                        guild_id, message_id, e
                    );
                    SyncOutcome::Stale
                }
            },
        }
    }

    /// Mirrors the first configured server in the bot's activity line.
    async fn update_presence(&self, ctx: &Context) {
        let address = self
            .db
            .read(|db| db.guilds.values().find_map(|g| g.address.clone()))
            .await;
        let Some(address) = address else { return };

        match self.probe.probe(&address).await {
            Some(snapshot) => {
                let text = format!(
                    "Players {}/{}",
                    format_count(&self.style, snapshot.players_online),
                    format_count(&self.style, snapshot.players_max)
                );
                ctx.set_presence(Some(ActivityData::watching(text)), OnlineStatus::Online);
            }
            None => {
                ctx.set_presence(
                    Some(ActivityData::playing(format!("{} offline", address))),
                    OnlineStatus::Online,
                );
            }
        }
    }
}

#[async_trait]
impl Task for StatusSyncTask {
    fn name(&self) -> &str {
        "StatusSync"
    }

    fn schedule(&self) -> Option<Duration> {
        Some(self.interval)
    }

    async fn execute(
        &mut self,
        ctx: &Context,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let start = std::time::Instant::now();
        info!("Starting status sync");

        let publisher = HttpPublisher::new(ctx.http.clone());
        let outcomes = self.run_tick(&publisher).await;
        self.update_presence(ctx).await;

        let synced = outcomes
            .iter()
            .filter(|(_, outcome)| !matches!(outcome, SyncOutcome::Skipped))
            .count();
        info!(
            "Status sync completed for {} guilds in {:?}",
            synced,
            start.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::status::embed::StatusPayload;
    use crate::modules::status::probe::StatusSnapshot;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    struct FixedProbe {
        snapshot: Mutex<Option<StatusSnapshot>>,
    }

    impl FixedProbe {
        fn new(snapshot: Option<StatusSnapshot>) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(snapshot),
            })
        }

        fn set(&self, snapshot: Option<StatusSnapshot>) {
            *self.snapshot.lock().unwrap() = snapshot;
        }
    }

    #[async_trait]
    impl StatusProbe for FixedProbe {
        async fn probe(&self, _address: &str) -> Option<StatusSnapshot> {
            self.snapshot.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct FakeState {
        next_id: u64,
        messages: HashMap<(u64, u64), StatusPayload>,
        dead_channels: HashSet<u64>,
        fail_next: Option<PublishError>,
        creates: usize,
        edits: usize,
    }

    #[derive(Default)]
    struct FakePublisher {
        state: Mutex<FakeState>,
    }

    impl FakePublisher {
        fn kill_channel(&self, channel_id: u64) {
            self.state.lock().unwrap().dead_channels.insert(channel_id);
        }

        fn fail_next(&self, error: PublishError) {
            self.state.lock().unwrap().fail_next = Some(error);
        }

        fn delete_message(&self, channel_id: u64, message_id: u64) {
            self.state
                .lock()
                .unwrap()
                .messages
                .remove(&(channel_id, message_id));
        }

        fn creates(&self) -> usize {
            self.state.lock().unwrap().creates
        }

        fn edits(&self) -> usize {
            self.state.lock().unwrap().edits
        }

        fn message_count(&self) -> usize {
            self.state.lock().unwrap().messages.len()
        }
    }

    #[async_trait]
    impl StatusPublisher for FakePublisher {
        async fn channel_exists(&self, channel_id: u64) -> bool {
            !self.state.lock().unwrap().dead_channels.contains(&channel_id)
        }

        async fn create_message(
            &self,
            channel_id: u64,
            payload: &StatusPayload,
        ) -> Result<u64, PublishError> {
            let mut state = self.state.lock().unwrap();
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            state.next_id += 1;
            let id = state.next_id;
            state.creates += 1;
            state.messages.insert((channel_id, id), payload.clone());
            Ok(id)
        }

        async fn edit_message(
            &self,
            channel_id: u64,
            message_id: u64,
            payload: &StatusPayload,
        ) -> Result<(), PublishError> {
            let mut state = self.state.lock().unwrap();
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            match state.messages.get_mut(&(channel_id, message_id)) {
                Some(slot) => {
                    *slot = payload.clone();
                    state.edits += 1;
                    Ok(())
                }
                None => Err(PublishError::NotFound),
            }
        }
    }

    fn online_snapshot() -> StatusSnapshot {
        StatusSnapshot {
            description: "A Minecraft Server".into(),
            version_name: "Paper 1.21".into(),
            players_online: Some(5),
            players_max: Some(20),
        }
    }

    async fn new_task(
        dir: &tempfile::TempDir,
        probe: Arc<FixedProbe>,
    ) -> (StatusSyncTask, Database<StatusDatabase>) {
        let path = dir.path().join("status.db").to_string_lossy().into_owned();
        let db = Database::<StatusDatabase>::new(path).await.unwrap();
        let task = StatusSyncTask::new(db.clone(), probe, Duration::from_secs(60));
        (task, db)
    }

    fn outcome_for(outcomes: &[(u64, SyncOutcome)], guild_id: u64) -> SyncOutcome {
        outcomes
            .iter()
            .find(|(id, _)| *id == guild_id)
            .map(|(_, o)| *o)
            .unwrap()
    }

    #[tokio::test]
    async fn first_tick_creates_then_only_edits() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(Some(online_snapshot()));
        let (task, db) = new_task(&dir, probe).await;
        let publisher = FakePublisher::default();

        db.set_address(42, "play.example.com".into()).await.unwrap();
        db.set_channel(42, 100).await.unwrap();

        let outcomes = task.run_tick(&publisher).await;
        let created_id = match outcome_for(&outcomes, 42) {
            SyncOutcome::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_eq!(
            db.get_config(42).await.unwrap().message_id,
            Some(created_id)
        );
        assert_eq!(publisher.creates(), 1);

        // players rendered into the created message
        let payload = publisher
            .state
            .lock()
            .unwrap()
            .messages
            .get(&(100, created_id))
            .cloned()
            .unwrap();
        let players = payload
            .fields
            .iter()
            .find(|f| f.name.contains("Players"))
            .unwrap();
        assert_eq!(players.value, "**5** / 20");

        // second tick with nothing changed: exactly one edit, zero creates
        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 42), SyncOutcome::Edited);
        assert_eq!(publisher.creates(), 1);
        assert_eq!(publisher.edits(), 1);
        assert_eq!(publisher.message_count(), 1);
    }

    #[tokio::test]
    async fn offline_probe_edits_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(Some(online_snapshot()));
        let (task, db) = new_task(&dir, probe.clone()).await;
        let publisher = FakePublisher::default();

        db.set_address(42, "play.example.com".into()).await.unwrap();
        db.set_channel(42, 100).await.unwrap();
        task.run_tick(&publisher).await;

        probe.set(None);
        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 42), SyncOutcome::Edited);
        assert_eq!(publisher.creates(), 1);

        let message_id = db.get_config(42).await.unwrap().message_id.unwrap();
        let payload = publisher
            .state
            .lock()
            .unwrap()
            .messages
            .get(&(100, message_id))
            .cloned()
            .unwrap();
        assert!(payload.fields[0].name.contains("Offline"));
    }

    #[tokio::test]
    async fn deleted_message_is_recreated_one_tick_later() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(Some(online_snapshot()));
        let (task, db) = new_task(&dir, probe).await;
        let publisher = FakePublisher::default();

        db.set_address(42, "play.example.com".into()).await.unwrap();
        db.set_channel(42, 100).await.unwrap();
        task.run_tick(&publisher).await;
        let first_id = db.get_config(42).await.unwrap().message_id.unwrap();

        publisher.delete_message(100, first_id);

        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 42), SyncOutcome::RecreatePending);
        assert_eq!(db.get_config(42).await.unwrap().message_id, None);
        assert_eq!(publisher.creates(), 1);

        let outcomes = task.run_tick(&publisher).await;
        let second_id = match outcome_for(&outcomes, 42) {
            SyncOutcome::Created(id) => id,
            other => panic!("expected Created, got {:?}", other),
        };
        assert_ne!(second_id, first_id);
        assert_eq!(
            db.get_config(42).await.unwrap().message_id,
            Some(second_id)
        );
        // never more than one live message for the guild
        assert_eq!(publisher.message_count(), 1);
    }

    #[tokio::test]
    async fn failed_edit_goes_stale_and_retries_next_tick() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(Some(online_snapshot()));
        let (task, db) = new_task(&dir, probe).await;
        let publisher = FakePublisher::default();

        db.set_address(42, "play.example.com".into()).await.unwrap();
        db.set_channel(42, 100).await.unwrap();
        task.run_tick(&publisher).await;
        let config_before = db.get_config(42).await.unwrap();

        // e.g. a rate limit: the message id must survive for the next tick
        publisher.fail_next(PublishError::Other("rate limited".into()));
        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 42), SyncOutcome::Stale);
        assert_eq!(db.get_config(42).await.unwrap(), config_before);
        assert_eq!(publisher.edits(), 0);

        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 42), SyncOutcome::Edited);
        assert_eq!(publisher.edits(), 1);
        assert_eq!(publisher.creates(), 1);
    }

    #[tokio::test]
    async fn failed_send_goes_stale_without_tracking_an_id() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(Some(online_snapshot()));
        let (task, db) = new_task(&dir, probe).await;
        let publisher = FakePublisher::default();

        db.set_address(42, "play.example.com".into()).await.unwrap();
        db.set_channel(42, 100).await.unwrap();

        publisher.fail_next(PublishError::Other("rate limited".into()));
        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 42), SyncOutcome::Stale);
        assert_eq!(db.get_config(42).await.unwrap().message_id, None);
        assert_eq!(publisher.creates(), 0);

        let outcomes = task.run_tick(&publisher).await;
        assert!(matches!(outcome_for(&outcomes, 42), SyncOutcome::Created(_)));
        assert_eq!(publisher.creates(), 1);
        assert_eq!(publisher.message_count(), 1);
    }

    #[tokio::test]
    async fn unreachable_channel_skips_without_mutating_state() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(Some(online_snapshot()));
        let (task, db) = new_task(&dir, probe).await;
        let publisher = FakePublisher::default();

        db.set_address(42, "play.example.com".into()).await.unwrap();
        db.set_channel(42, 100).await.unwrap();
        task.run_tick(&publisher).await;
        let config_before = db.get_config(42).await.unwrap();

        publisher.kill_channel(100);
        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 42), SyncOutcome::Skipped);
        assert_eq!(db.get_config(42).await.unwrap(), config_before);
    }

    #[tokio::test]
    async fn unconfigured_guilds_are_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FixedProbe::new(Some(online_snapshot()));
        let (task, db) = new_task(&dir, probe).await;
        let publisher = FakePublisher::default();

        // address but no channel
        db.set_address(1, "play.example.com".into()).await.unwrap();
        // channel but no address
        db.set_channel(2, 200).await.unwrap();

        let outcomes = task.run_tick(&publisher).await;
        assert_eq!(outcome_for(&outcomes, 1), SyncOutcome::Skipped);
        assert_eq!(outcome_for(&outcomes, 2), SyncOutcome::Skipped);
        assert_eq!(publisher.creates(), 0);
    }
}
