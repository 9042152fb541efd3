//! Gateway event glue: turns Discord events into pipeline calls and replies.

use crate::amputate::Outcome;
use crate::correlate::MessageMeta;
use crate::db::MessageEvent;
use crate::error::AmputateError;
use crate::extract::looks_like_amp;
use crate::reply::{self, ReplyStyle};
use crate::servers::{self, ConfigCommand};
use crate::stats::BotStats;
use crate::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const STATS_COMMAND: &str = "stats";
pub const CONFIG_COMMAND: &str = "config";

pub async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!("{} is connected to {} guild(s)", data_about_bot.user.name, data_about_bot.guilds.len());
            for guild in &data_about_bot.guilds {
                match guild_name(ctx, guild.id).await {
                    Ok(name) => register_guild(data, guild.id, &name).await,
                    Err(e) => warn!("Unable to register guild {}: {}", guild.id, e),
                }
            }
            update_presence(ctx, data).await;
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            register_guild(data, guild.id, &guild.name).await;
            update_presence(ctx, data).await;
        }
        serenity::FullEvent::Message { new_message } => {
            handle_message(ctx, new_message, data).await;
        }
        _ => {}
    }
    Ok(())
}

/// What to do with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Sent by this bot: logged, nothing else.
    OwnMessage,
    /// Other bots, and messages with nothing for us.
    Ignore,
    /// The prefix alone, without a verb.
    IncompleteCommand,
    Stats,
    Config,
    UnknownCommand(String),
    /// Looks like it carries AMP links.
    Amputate,
}

/// Decide how a message is handled: own message, other bots, prefix
/// commands, then the AMP predicate.
pub fn route(content: &str, prefix: &str, is_self: bool, is_bot: bool) -> Route {
    if is_self {
        return Route::OwnMessage;
    }
    if is_bot {
        return Route::Ignore;
    }

    let words: Vec<&str> = content.split(' ').collect();
    if words.first() == Some(&prefix) {
        return match words.get(1) {
            None => Route::IncompleteCommand,
            Some(&STATS_COMMAND) => Route::Stats,
            Some(&CONFIG_COMMAND) => Route::Config,
            Some(other) => Route::UnknownCommand(other.to_string()),
        };
    }

    if looks_like_amp(content) {
        Route::Amputate
    } else {
        Route::Ignore
    }
}

/// Handle one inbound message. Failures are logged and scoped to this message.
pub async fn handle_message(ctx: &serenity::Context, msg: &serenity::Message, data: &Data) {
    let route = route(
        &msg.content,
        &data.config.command_prefix,
        msg.author.id.get() == data.bot_id,
        msg.author.bot,
    );

    let (verb, result) = match route {
        Route::Ignore => return,
        Route::OwnMessage => {
            record_message_event(data, msg, "").await;
            return;
        }
        Route::IncompleteCommand => {
            warn!("Not enough words for a command from {}", msg.author.name);
            return;
        }
        Route::UnknownCommand(verb) => {
            warn!("Unknown command {} called by {}({})", verb, msg.author.name, msg.author.id);
            return;
        }
        Route::Stats => {
            info!("{} called by {}({})", STATS_COMMAND, msg.author.name, msg.author.id);
            record_message_event(data, msg, STATS_COMMAND).await;
            (STATS_COMMAND, handle_stats(ctx, msg, data).await)
        }
        Route::Config => {
            info!("{} called by {}({})", CONFIG_COMMAND, msg.author.name, msg.author.id);
            record_message_event(data, msg, CONFIG_COMMAND).await;
            (CONFIG_COMMAND, handle_config(ctx, msg, data).await)
        }
        Route::Amputate => {
            record_message_event(data, msg, "").await;
            debug!("Message appears to have an AMP URL: {}", msg.content);
            ("amputate", handle_amp_message(ctx, msg, data).await)
        }
    };

    if let Err(e) = result {
        warn!("Problem handling {}: {}", verb, e);
    }
}

async fn handle_amp_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    let server_id = msg.guild_id.map(|id| id.to_string());
    let config = servers::get_server_config(&data.db, server_id.as_deref()).await?;
    if !config.resolution_enabled {
        info!("URLs were not amputated because automatic amputation is not enabled");
        return Ok(());
    }

    let location = match msg.guild_id {
        Some(guild_id) => match guild_name(ctx, guild_id).await {
            Ok(name) => format!("{}({})", name, guild_id),
            Err(e) => {
                warn!("{}", e);
                return Ok(());
            }
        },
        None => "direct message".to_string(),
    };

    let typing = msg.channel_id.start_typing(&ctx.http);
    let outcome = data
        .amputator
        .amputate(&message_meta(msg), &msg.content, &config.resolve_options())
        .await;
    drop(typing);

    let Outcome::Amputated(amputation) = outcome else {
        debug!("Found 0 URLs in message that looked like it had AMP links");
        return Ok(());
    };

    debug!(
        "Sending amputate response in {}, calling user: {}({})",
        location, msg.author.name, msg.author.id
    );
    reply::send(ctx, msg, config.reply_style(), &amputation.reply).await?;

    if let Err(e) = amputation.persisted {
        error!(
            "Resolution event {} for message {} was not recorded: {}",
            amputation.event.id, msg.id, e
        );
    }
    Ok(())
}

async fn handle_stats(ctx: &serenity::Context, msg: &serenity::Message, data: &Data) -> Result<(), Error> {
    let server_id = match msg.guild_id {
        Some(guild_id) => Some(guild_id.to_string()),
        None => {
            if !data.config.is_administrator(msg.author.id.get()) {
                info!(
                    "Did not respond to {}({}), command {} because user is not an administrator",
                    msg.author.name, msg.author.id, STATS_COMMAND
                );
                return Ok(());
            }
            None
        }
    };

    let bot_id = data.bot_id.to_string();
    let scope = server_id.clone();
    let stats = data
        .db
        .run_blocking(move |db| BotStats::collect(db, &bot_id, scope.as_deref()))
        .await?;

    info!(
        "Sending {} {} response to {}({})",
        if server_id.is_some() { "server" } else { "global" },
        STATS_COMMAND,
        msg.author.name,
        msg.author.id
    );
    reply::send(ctx, msg, ReplyStyle::Embed, &stats.to_reply()).await?;
    Ok(())
}

async fn handle_config(ctx: &serenity::Context, msg: &serenity::Message, data: &Data) -> Result<(), Error> {
    let guild_id = msg.guild_id.ok_or("config must be run in a server")?;
    let server_id = guild_id.to_string();

    let lookup_id = server_id.clone();
    let config = data
        .db
        .run_blocking(move |db| db.get_server_config(&lookup_id))
        .await?
        .ok_or_else(|| AmputateError::LookupFailed(format!("no server config for guild {}", guild_id)))?;

    let command = servers::parse_config_command(&msg.content);
    if command == ConfigCommand::Get {
        reply::send(ctx, msg, ReplyStyle::Embed, &servers::config_reply(&config)).await?;
        return Ok(());
    }

    if !may_configure(ctx, msg, data) {
        info!(
            "Refused config change from {}({}) in {}: missing Manage Server permission",
            msg.author.name, msg.author.id, guild_id
        );
        return Ok(());
    }

    let style = config.reply_style();
    match command {
        ConfigCommand::Get => {}
        ConfigCommand::Set { setting, raw, value } => {
            servers::update_server_setting(&data.db, &server_id, setting, value).await?;
            reply::send(ctx, msg, style, &servers::updated_reply(setting, &raw)).await?;
        }
        ConfigCommand::InvalidValue { setting, raw } => {
            reply::send(ctx, msg, style, &servers::usage_error_reply(&raw)).await?;
            return Err(format!(
                "{} value '{}' must be a whole number of at least {}",
                setting.spec().keyword,
                raw,
                servers::MIN_MAX_DEPTH
            )
            .into());
        }
        ConfigCommand::Unknown { setting, raw } => {
            debug!("Unknown config setting {}", setting);
            reply::send(ctx, msg, style, &servers::usage_error_reply(&raw)).await?;
        }
    }
    Ok(())
}

fn may_configure(ctx: &serenity::Context, msg: &serenity::Message, data: &Data) -> bool {
    data.config.is_administrator(msg.author.id.get())
        || msg
            .author_permissions(&ctx.cache)
            .map(|p| p.manage_guild())
            .unwrap_or(false)
}

/// Server display name, from the cache when possible.
async fn guild_name(ctx: &serenity::Context, guild_id: serenity::GuildId) -> Result<String, AmputateError> {
    let cached = ctx.cache.guild(guild_id).map(|g| g.name.clone());
    if let Some(name) = cached {
        return Ok(name);
    }
    guild_id
        .to_partial_guild(ctx)
        .await
        .map(|g| g.name)
        .map_err(|e| AmputateError::LookupFailed(format!("unable to look up guild by id {}: {}", guild_id, e)))
}

async fn register_guild(data: &Data, guild_id: serenity::GuildId, name: &str) {
    match servers::register_server(&data.db, &guild_id.to_string(), name).await {
        Ok(true) => info!("Creating registration for new server: {}({})", name, guild_id),
        Ok(false) => debug!("Updated registration for server: {}({})", name, guild_id),
        Err(e) => error!("Unable to register or update guild {}({}): {}", name, guild_id, e),
    }
}

async fn update_presence(ctx: &serenity::Context, data: &Data) {
    match data.db.run_blocking(|db| db.count_servers()).await {
        Ok(count) => {
            debug!("Updating discord bot status: watching {} servers", count);
            ctx.set_activity(Some(serenity::ActivityData::watching(format!("{} servers", count))));
        }
        Err(e) => warn!("Unable to update servers watched: {}", e),
    }
}

pub fn message_meta(msg: &serenity::Message) -> MessageMeta {
    MessageMeta {
        author_id: msg.author.id.to_string(),
        author_name: msg.author.name.clone(),
        message_id: msg.id.to_string(),
        channel_id: msg.channel_id.to_string(),
        server_id: msg.guild_id.map(|id| id.to_string()),
    }
}

fn message_event(msg: &serenity::Message, command: &str) -> MessageEvent {
    let meta = message_meta(msg);
    MessageEvent {
        id: Uuid::now_v7().to_string(),
        created_at: Utc::now(),
        author_id: meta.author_id,
        author_name: meta.author_name,
        message_id: meta.message_id,
        channel_id: meta.channel_id,
        server_id: meta.server_id,
        command: command.to_string(),
    }
}

async fn record_message_event(data: &Data, msg: &serenity::Message, command: &str) {
    let event = message_event(msg, command);
    if let Err(e) = data.db.run_blocking(move |db| db.save_message_event(&event)).await {
        warn!("Unable to record message event for {}: {}", msg.id, e);
    }
}
