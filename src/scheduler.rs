//! Periodic reconciliation driver.  Two independent minute loops: one polls
//! session lifecycles whenever anything is tracked, the other re-derives the
//! voice roles while a session is running.  Every pass stands alone, so a
//! failed one simply waits for the next tick.

use crate::{
    config::Config, context::Context, log_internal, persistent_state::PersistentState,
    volatile_state::VolatileState,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::RwLock,
    time::{interval, MissedTickBehavior},
};

const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn the background loops.  Called once, after the first Ready.
pub fn spawn(
    discord_ctx: serenity::all::Context,
    cfg: Arc<RwLock<Config>>,
    pstate: Arc<RwLock<PersistentState>>,
    vstate: Arc<RwLock<VolatileState>>,
) {
    tokio::spawn(lifecycle_loop(
        discord_ctx.clone(),
        cfg.clone(),
        pstate.clone(),
        vstate.clone(),
    ));
    tokio::spawn(voice_loop(discord_ctx, cfg, pstate, vstate));
}

fn task_ctx<'a>(
    discord_ctx: &'a serenity::all::Context,
    cfg: &'a RwLock<Config>,
    pstate: &'a RwLock<PersistentState>,
    vstate: &'a RwLock<VolatileState>,
) -> Context<'a> {
    Context {
        cfg,
        pstate,
        vstate,
        cache: &discord_ctx.cache,
        http: &discord_ctx.http,
        cache_http: discord_ctx,
    }
}

async fn lifecycle_loop(
    discord_ctx: serenity::all::Context,
    cfg: Arc<RwLock<Config>>,
    pstate: Arc<RwLock<PersistentState>>,
    vstate: Arc<RwLock<VolatileState>>,
) {
    let mut ticks = interval(TICK_INTERVAL);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let ctx = task_ctx(&discord_ctx, &cfg, &pstate, &vstate);
        if let Err(err) = crate::lifecycle::tick(&ctx).await {
            log_internal!("Lifecycle poll failed, retrying next tick: {}", err);
        }
    }
}

async fn voice_loop(
    discord_ctx: serenity::all::Context,
    cfg: Arc<RwLock<Config>>,
    pstate: Arc<RwLock<PersistentState>>,
    vstate: Arc<RwLock<VolatileState>>,
) {
    let mut ticks = interval(TICK_INTERVAL);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        let ctx = task_ctx(&discord_ctx, &cfg, &pstate, &vstate);
        if !ctx.vstate.read().await.lifecycle.scrim_active() {
            continue;
        }

        match crate::voice::reconcile_voice_presence(&ctx).await {
            Ok(report) if report.is_quiet() => {}
            Ok(report) => log_internal!("Voice presence pass: {}", report),
            Err(err) => log_internal!("Voice presence pass failed, retrying next tick: {}", err),
        }
    }
}
