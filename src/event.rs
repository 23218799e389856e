//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  However, this does not mesh well with our plugin framework here.  To resolve this,
//! this module translates the callbacks to a distinct Event enum.

use crate::{context::Context, log_internal};
use serenity::all::{
    ChannelId, Message, MessageId, Reaction, Ready, ScheduledEvent, VoiceState,
};

/// A Discord event
pub enum Event {
    Ready(Ready),
    /// The guild cache is filled; fired after Ready.
    CacheReady,
    Message(Message),
    MessageDelete {
        channel_id: ChannelId,
        message_id: MessageId,
    },
    ReactionAdd(Reaction),
    ReactionRemove(Reaction),
    VoiceStateUpdate {
        old: Option<VoiceState>,
        new: VoiceState,
    },
    ScheduledEventUpdate(ScheduledEvent),
    ScheduledEventDelete(ScheduledEvent),
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => log_internal!("Error in plugin {}: {}", plugin.name(), err),
            }
        }
    }

    /// Check if a message should be interpreted as a special bot command.
    ///
    /// These are typically prefixed, e.g. `;scrim create foo`.  Returns the
    /// message and the remainder after the command word.  Messages written by
    /// bots are never commands.
    pub async fn is_bot_cmd<'a>(
        &'a self,
        ctx: &Context<'_>,
        cmd: &str,
    ) -> Option<(&'a Message, &'a str)> {
        let Event::Message(msg) = self else {
            return None;
        };
        if msg.author.bot {
            return None;
        }

        let prefix = ctx.cfg.read().await.general.command_prefix.clone();
        let wanted = format!("{}{}", prefix, cmd);

        let content = msg.content.trim_start();
        let rest = content.strip_prefix(&wanted)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            // Longer command word that merely shares this prefix
            return None;
        }

        Some((msg, rest.trim()))
    }
}

pub enum EventHandled {
    Yes,
    No,
}
