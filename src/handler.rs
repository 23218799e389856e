use crate::{
    config::Config, context::Context, event::Event, persistent_state::PersistentState,
    volatile_state::VolatileState,
};
use serenity::all::{
    ChannelId, GuildId, Message, MessageId, Reaction, Ready, ScheduledEvent, VoiceState,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::RwLock;

/// Discord event handler
pub struct Handler {
    cfg: Arc<RwLock<Config>>,
    pstate: Arc<RwLock<PersistentState>>,
    vstate: Arc<RwLock<VolatileState>>,
    // Ready fires again on every gateway reconnect; the background loops
    // must only be spawned for the first one.
    loops_started: AtomicBool,
}

impl<'a> Handler {
    pub fn new(cfg: Config, pstate: PersistentState, vstate: VolatileState) -> Self {
        Self {
            cfg: Arc::new(RwLock::new(cfg)),
            pstate: Arc::new(RwLock::new(pstate)),
            vstate: Arc::new(RwLock::new(vstate)),
            loops_started: AtomicBool::new(false),
        }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            pstate: &self.pstate,
            vstate: &self.vstate,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    // Role and voice reconciliation need the member cache, which only fills
    // up after Ready.  Start the background loops and the initial resync
    // from here.
    async fn cache_ready(&self, discord_ctx: serenity::all::Context, _guilds: Vec<GuildId>) {
        if !self.loops_started.swap(true, Ordering::SeqCst) {
            crate::scheduler::spawn(
                discord_ctx.clone(),
                self.cfg.clone(),
                self.pstate.clone(),
                self.vstate.clone(),
            );
        }

        Event::CacheReady.handle(self.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message_delete(
        &self,
        discord_ctx: serenity::all::Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        Event::MessageDelete {
            channel_id,
            message_id: deleted_message_id,
        }
        .handle(self.ctx(&discord_ctx))
        .await;
    }

    async fn voice_state_update(
        &self,
        discord_ctx: serenity::all::Context,
        old: Option<VoiceState>,
        new: VoiceState,
    ) {
        Event::VoiceStateUpdate { old, new }
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn reaction_add(&self, discord_ctx: serenity::all::Context, reaction: Reaction) {
        Event::ReactionAdd(reaction)
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn reaction_remove(&self, discord_ctx: serenity::all::Context, reaction: Reaction) {
        Event::ReactionRemove(reaction)
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn guild_scheduled_event_update(
        &self,
        discord_ctx: serenity::all::Context,
        event: ScheduledEvent,
    ) {
        Event::ScheduledEventUpdate(event)
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn guild_scheduled_event_delete(
        &self,
        discord_ctx: serenity::all::Context,
        event: ScheduledEvent,
    ) {
        Event::ScheduledEventDelete(event)
            .handle(self.ctx(&discord_ctx))
            .await;
    }
}
