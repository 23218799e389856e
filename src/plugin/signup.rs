use crate::{event::*, plugin::*, registration};
use anyhow::Result;

/// Feeds signup reactions and deletions of signup messages into the
/// registration engine.
pub struct Signup;

#[serenity::async_trait]
impl Plugin for Signup {
    fn name(&self) -> &'static str {
        "signup"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let acted = match event {
            Event::ReactionAdd(reaction) => registration::on_marker_added(ctx, reaction).await?,
            Event::ReactionRemove(reaction) => {
                registration::on_marker_removed(ctx, reaction).await?
            }
            Event::MessageDelete { message_id, .. } => {
                registration::on_tracked_message_deleted(ctx, *message_id).await?
            }
            _ => false,
        };

        if acted {
            Ok(EventHandled::Yes)
        } else {
            Ok(EventHandled::No)
        }
    }
}
