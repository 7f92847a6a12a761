use anyhow::Context as _;
use clap::Parser as _;
use dotenvy::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod modules;
mod services;

use modules::activity::{ActivityTracker, SystemClock};
use modules::appeals::AppealTallier;
use modules::invite_tracking::{AttributionEngine, MembershipQueue, ReferralLedger, ReferralTracker};
use services::localization::LocalizationManager;
use services::platform::{GuildPlatform, SerenityPlatform};
use services::role_policy::RoleService;

#[derive(clap::Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Publish commands. If no guild ID is provided, publish globally.
    #[arg(long, num_args = 0..)]
    publish: Option<Vec<u64>>,

    /// Clear all commands instead of publishing them.
    #[arg(long)]
    clear: bool,

    /// Rollback the specified number of migrations and run all migrations again.
    #[arg(long, num_args = 0..=1, default_missing_value = "1")]
    refresh_migrations: Option<u32>,
}

// Shared state handed to every command and event handler
#[derive(Clone)]
pub struct Data {
    pub config: Arc<config::BotConfig>,
    pub l10n: Arc<LocalizationManager>,
    pub platform: Arc<dyn GuildPlatform>,
    pub membership: MembershipQueue,
    pub ledger: Arc<ReferralLedger>,
    pub roles: Arc<RoleService>,
    pub activity: Arc<ActivityTracker>,
    pub appeals: Arc<AppealTallier>,
}

pub type Error = anyhow::Error;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting referral roles bot...");

    let database_url = std::env::var("DATABASE_URL").context("missing DATABASE_URL")?;
    let db = db::establish_connection(&database_url)
        .await
        .context("Failed to connect to database")?;

    // Run migrations
    use sea_orm_migration::MigratorTrait;
    if let Some(depth) = args.refresh_migrations {
        info!("Refreshing migrations (down {}, then up)...", depth);
        db::migrations::Migrator::down(&db, Some(depth))
            .await
            .context("Failed to rollback migration")?;
    }

    db::migrations::Migrator::up(&db, None)
        .await
        .context("Failed to run migrations")?;

    if args.refresh_migrations.is_some() {
        info!("Migrations refreshed successfully.");
        return Ok(());
    }

    let token = std::env::var("DISCORD_TOKEN").context("missing DISCORD_TOKEN")?;
    let commands = modules::commands();

    // Handle command registration if requested
    if let Some(publish_args) = args.publish {
        return publish_commands(&token, publish_args, args.clear, &commands).await;
    }

    let config = Arc::new(config::BotConfig::from_env().context("Invalid configuration")?);
    let l10n = Arc::new(LocalizationManager::new(&config.locale));

    let http = Arc::new(serenity::HttpBuilder::new(&token).build());
    let bot_user = http
        .get_current_user()
        .await
        .context("Failed to fetch bot user info")?;
    let platform: Arc<dyn GuildPlatform> =
        Arc::new(SerenityPlatform::new(http.clone(), bot_user.id));

    let attribution = Arc::new(AttributionEngine::new());
    services::startup::preflight(platform.as_ref(), &config, &attribution)
        .await
        .context("Startup checks failed")?;

    let roles = Arc::new(RoleService::new(config.clone(), l10n.clone()));
    let activity = Arc::new(ActivityTracker::new(
        config.clone(),
        l10n.clone(),
        Arc::new(SystemClock),
    ));

    let ledger = Arc::new(ReferralLedger::new(db));
    let membership = MembershipQueue::spawn(Arc::new(ReferralTracker::new(
        config.clone(),
        platform.clone(),
        attribution,
        ledger.clone(),
        roles.clone(),
    )));

    let data = Data {
        config: config.clone(),
        l10n: l10n.clone(),
        platform: platform.clone(),
        membership,
        ledger,
        roles: roles.clone(),
        activity: activity.clone(),
        appeals: Arc::new(AppealTallier::new(config, l10n)),
    };

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_INVITES
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            event_handler: |ctx, event, framework, data| {
                Box::pin(services::event_manager::dispatch(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |_ctx, _ready, _framework| Box::pin(async move { Ok(data) }))
        .build();

    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .context("Failed to create client")?;

    activity.start_sweep_runner(platform, roles);

    let shard_manager = client.shard_manager.clone();
    {
        let activity = activity.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutting down...");
            activity.stop_sweep_runner();
            shard_manager.shutdown_all().await;
        });
    }

    info!("Bot is ready!");
    client.start().await.context("Client error")?;

    activity.stop_sweep_runner();
    Ok(())
}

async fn publish_commands(
    token: &str,
    guild_ids: Vec<u64>,
    clear: bool,
    commands: &[poise::Command<Data, Error>],
) -> anyhow::Result<()> {
    let http = serenity::HttpBuilder::new(token).build();
    let bot_user = http
        .get_current_user()
        .await
        .context("Failed to fetch bot user info")?;
    let application_id = bot_user.id;

    info!("Fetched Application ID: {}", application_id);

    let http = serenity::HttpBuilder::new(token)
        .application_id(serenity::ApplicationId::new(application_id.get()))
        .build();

    let commands: &[poise::Command<Data, Error>] = if clear { &[] } else { commands };

    if guild_ids.is_empty() {
        if clear {
            info!("Clearing commands globally...");
        } else {
            info!("Registering commands globally...");
        }

        if let Err(e) = poise::builtins::register_globally(&http, commands).await {
            error!("Failed to register commands globally: {}", e);
        } else {
            info!("Global command operation successful");
        }
    } else {
        for guild_id in guild_ids {
            if clear {
                info!("Clearing commands in guild {}...", guild_id);
            } else {
                info!("Registering commands in guild {}...", guild_id);
            }

            if let Err(e) =
                poise::builtins::register_in_guild(&http, commands, serenity::GuildId::new(guild_id))
                    .await
            {
                error!("Failed to register commands in guild {}: {}", guild_id, e);
            } else {
                info!("Guild command operation successful for guild {}", guild_id);
            }
        }
    }

    Ok(())
}
