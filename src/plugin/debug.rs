use crate::{event::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Prints debug information about events to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Connected to {} server(s) as {}",
                    ready.guilds.len(),
                    ctx.cache.current_user().color(),
                );
            }
            Event::CacheReady => {
                log_event!("Member cache is ready");
            }
            Event::Message(msg) => {
                log_event!(
                    "{}{}{}{}{}{} {}",
                    msg.guild_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.channel_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.author.color(),
                    Glue {}.color(),
                    msg.content,
                );
            }
            Event::MessageDelete {
                channel_id,
                message_id,
            } => {
                log_event!(
                    "Message {} was deleted in \"{}\"",
                    message_id,
                    channel_id.color(ctx.http).await,
                );
            }
            Event::VoiceStateUpdate { old, new } => match (old, new.channel_id) {
                (Some(old), Some(new_id)) if old.channel_id == Some(new_id) => {
                    // State change within same channel, e.g. mute/unmute
                    // Not currently debug logging this
                }
                (Some(old), Some(_)) => log_event!(
                    "{} moved VC channel from \"{}\" to \"{}\"",
                    new.user_id.color(ctx.http).await,
                    old.channel_id.color(ctx.http).await,
                    new.channel_id.color(ctx.http).await,
                ),
                (Some(old), None) => log_event!(
                    "{} left VC channel \"{}\"",
                    new.user_id.color(ctx.http).await,
                    old.channel_id.color(ctx.http).await,
                ),
                (None, Some(_)) => log_event!(
                    "{} joined VC channel \"{}\"",
                    new.user_id.color(ctx.http).await,
                    new.channel_id.color(ctx.http).await,
                ),
                (None, None) => log_event!("Unknown voice state update"),
            },
            Event::ReactionAdd(reaction) => {
                log_event!(
                    "{} reacted to message {} with \"{}\"",
                    reaction.user_id.color(ctx.http).await,
                    reaction.message_id,
                    emoji_name(&reaction.emoji),
                );
            }
            Event::ReactionRemove(reaction) => {
                log_event!(
                    "{} removed reaction \"{}\" from message {}",
                    reaction.user_id.color(ctx.http).await,
                    emoji_name(&reaction.emoji),
                    reaction.message_id,
                );
            }
            Event::ScheduledEventUpdate(scheduled_event) => {
                log_event!(
                    "Scheduled event \"{}\" is now {:?}",
                    scheduled_event.name,
                    scheduled_event.status,
                );
            }
            Event::ScheduledEventDelete(scheduled_event) => {
                log_event!("Scheduled event \"{}\" was deleted", scheduled_event.name);
            }
        }

        Ok(EventHandled::No)
    }
}

fn emoji_name(emoji: &serenity::all::ReactionType) -> String {
    match emoji {
        serenity::all::ReactionType::Custom { name, .. } => {
            name.clone().unwrap_or("<unknown-emoji>".to_owned())
        }
        serenity::all::ReactionType::Unicode(s) => s.clone(),
        _ => "<unknown-emoji>".to_owned(),
    }
}
