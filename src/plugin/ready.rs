use crate::{event::*, log_internal, plugin::*, registration};
use anyhow::Result;

/// Brings role state back in line once the member cache is filled after
/// connecting.  Signups change while the bot is offline, so the role bits
/// members carry can't be trusted on startup.
pub struct Ready;

#[serenity::async_trait]
impl Plugin for Ready {
    fn name(&self) -> &'static str {
        "ready"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Event::CacheReady = event else {
            return Ok(EventHandled::No);
        };

        let sync = registration::reconcile_registration(ctx).await?;
        log_internal!(
            "Startup signup resync ({} registered): {}",
            sync.registered.len(),
            sync.report
        );

        Ok(EventHandled::Yes)
    }
}
