use crate::event::EventHandled;
use anyhow::Result;

pub use crate::context::Context;

mod debug;
mod help;
mod purge;
mod ready;
mod reload;
mod scrim;
mod signup;
mod wins;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Used for debug
    fn name(&self) -> &'static str;
    /// Help message line.  None if no help message
    async fn usage(&self, ctx: &Context<'_>) -> Option<String>;
    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    ///   handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context<'_>, event: &crate::event::Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
pub fn plugins() -> Vec<Box<dyn Plugin>> {
    use crate::plugin::*;

    vec![
        // Core bot operations
        Box::new(debug::Debug),
        Box::new(ready::Ready),
        Box::new(help::Help),
        Box::new(reload::Reload),
        // Scrim management
        Box::new(signup::Signup),
        Box::new(scrim::Scrim),
        Box::new(wins::Wins),
        Box::new(purge::Purge),
    ]
}
