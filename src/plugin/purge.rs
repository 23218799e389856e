use crate::{event::*, helper::MessageHelper, log_internal, plugin::*};
use anyhow::Result;
use serenity::all::GetMessages;

/// Owner-only cleanup of the signup channel.
pub struct Purge;

#[serenity::async_trait]
impl Plugin for Purge {
    fn name(&self) -> &'static str {
        "purge"
    }

    async fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}{} <count> - delete recent messages from the signup channel (bot owner only)",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        if !msg.is_from_owner(ctx).await {
            msg.reply(ctx.cache_http, "Only a bot owner can purge messages")
                .await?;
            return Ok(EventHandled::Yes);
        }

        let Ok(count) = args.parse::<u8>() else {
            msg.reply(ctx.cache_http, "Usage: purge <count>, up to 100")
                .await?;
            return Ok(EventHandled::Yes);
        };
        // Discord fetches at most 100 messages per request
        let count = count.min(100);

        let channel_id = ctx.cfg.read().await.scrim.signup_channel_id;
        let messages = channel_id
            .messages(ctx.cache_http, GetMessages::new().limit(count))
            .await?;

        // One at a time so a single undeletable message doesn't stop the rest.
        // Deleting a tracked signup post fires the usual deletion event and
        // cleans up its registration state.
        let mut deleted = 0;
        for message in &messages {
            match channel_id.delete_message(ctx.http, message.id).await {
                Ok(()) => deleted += 1,
                Err(err) => log_internal!("Could not delete message {}: {}", message.id, err),
            }
        }

        msg.reply(ctx.cache_http, format!("Deleted {} message(s)", deleted))
            .await?;
        Ok(EventHandled::Yes)
    }
}
