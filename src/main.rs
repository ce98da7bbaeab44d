use databases::Databases;
use modules::status::{
    commands::{help, setchannel, setip},
    probe::JavaProbe,
    task::StatusSyncTask,
};
use poise::serenity_prelude::{
    self as serenity, ActivityData, CreateAllowedMentions, FullEvent, OnlineStatus,
};
use settings::Settings;
use std::sync::Arc;
use tasks::TaskManager;
use tracing::{error, info, trace};

mod database;
mod databases;
mod keep_alive;
mod modules;
mod settings;
mod tasks;
mod utils;

#[derive(Clone)]
pub struct Data {
    pub dbs: Arc<Databases>,
    pub task_manager: Arc<TaskManager>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").finish_non_exhaustive()
    }
}

impl Data {
    pub async fn init_tasks(&self, ctx: &serenity::Context, settings: &Settings) {
        let task = StatusSyncTask::new(
            self.dbs.status.clone(),
            Arc::new(JavaProbe::default()),
            settings.update_interval(),
        );
        self.task_manager.add_task(task).await;
        self.task_manager.start_tasks(ctx.clone()).await;
    }
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
async fn register(ctx: Context<'_>) -> Result<(), Error> {
    poise::builtins::register_application_commands_buttons(ctx).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();
    info!("starting craftwatch");

    let token = std::env::var("DISCORD_TOKEN").expect("missing DISCORD_TOKEN");
    let settings = Settings::from_env();
    let intents = serenity::GatewayIntents::non_privileged();

    tokio::spawn(keep_alive::serve(settings.keep_alive_port));

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions::<Data, Error> {
            allowed_mentions: Some(CreateAllowedMentions::new().empty_roles().empty_users()),
            commands: vec![register(), setip(), setchannel(), help()],
            pre_command: |ctx| {
                Box::pin(async move {
                    trace!(
                        "Command {} used by {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command {} completed for {} in {}",
                        ctx.command().qualified_name,
                        ctx.author().tag(),
                        ctx.guild_id()
                            .map_or_else(|| "DM".to_string(), |id| id.to_string())
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!(
                                "Command {} failed for {} in {}: {:?}",
                                ctx.command().qualified_name,
                                ctx.author().tag(),
                                ctx.guild_id()
                                    .map_or_else(|| "DM".to_string(), |id| id.to_string()),
                                error
                            );
                        }
                        err => error!("Other framework error: {:?}", err),
                    }
                })
            },
            event_handler: |ctx, event, _framework, _data| {
                Box::pin(async move {
                    if let FullEvent::Ready { data_about_bot } = event {
                        info!("connected as {}", data_about_bot.user.name);
                        ctx.set_presence(
                            Some(ActivityData::watching("server status")),
                            OnlineStatus::Online,
                        );
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                info!("registering commands");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let dbs = Arc::new(Databases::open(&settings.data_path).await?);
                let task_manager = Arc::new(TaskManager::new());

                let data = Data { dbs, task_manager };
                data.init_tasks(ctx, &settings).await;

                Ok(data)
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await;

    client.unwrap().start().await.unwrap();
}
