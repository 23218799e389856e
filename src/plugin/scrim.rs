use crate::{
    event::*, helper, helper::MessageHelper, lifecycle, log_internal, plugin::*, registration,
    voice,
};
use anyhow::Result;
use serenity::all::{Message, ScheduledEventStatus, UserId};
use std::collections::HashSet;

/// Scrim session management: the `;scrim` command family plus the
/// scheduled-event and voice-state notifications that drive the session
/// engine between commands.
pub struct Scrim;

#[serenity::async_trait]
impl Plugin for Scrim {
    fn name(&self) -> &'static str {
        "scrim"
    }

    async fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}scrim create <name>, <unix-timestamp>, <description> - schedule a scrim and open signups\n\
             {}scrim update - resync roles and credit attendance\n\
             {}scrim end - finish the current scrim (bot owner only)\n\
             {}scrim cancel - cancel the current scrim and delete its signup post (bot owner only)",
            prefix, prefix, prefix, prefix
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        match event {
            Event::ScheduledEventUpdate(scheduled_event)
                if matches!(
                    scheduled_event.status,
                    ScheduledEventStatus::Completed | ScheduledEventStatus::Canceled
                ) =>
            {
                return if lifecycle::on_external_session_ended(ctx, scheduled_event).await? {
                    Ok(EventHandled::Yes)
                } else {
                    Ok(EventHandled::No)
                };
            }
            Event::ScheduledEventDelete(scheduled_event) => {
                return if lifecycle::on_external_session_ended(ctx, scheduled_event).await? {
                    Ok(EventHandled::Yes)
                } else {
                    Ok(EventHandled::No)
                };
            }
            Event::VoiceStateUpdate { .. } => {
                // The minute tick would catch this too; reacting here just
                // makes the role swap immediate.
                if ctx.vstate.read().await.lifecycle.scrim_active() {
                    let report = voice::reconcile_voice_presence(ctx).await?;
                    if !report.is_quiet() {
                        log_internal!("Voice presence pass: {}", report);
                    }
                }
                return Ok(EventHandled::No);
            }
            _ => {}
        }

        let Some((msg, args)) = event.is_bot_cmd(ctx, "scrim").await else {
            return Ok(EventHandled::No);
        };

        let mut terms = args.splitn(2, char::is_whitespace);
        let subcommand = terms.next().unwrap_or("");
        let rest = terms.next().unwrap_or("").trim();

        match subcommand {
            "create" => handle_create(ctx, msg, rest).await,
            "update" => handle_update(ctx, msg).await,
            "end" => handle_end(ctx, msg).await,
            "cancel" => handle_cancel(ctx, msg).await,
            _ => {
                let prefix = ctx.cfg.read().await.general.command_prefix.clone();
                msg.reply(
                    ctx.cache_http,
                    format!("Unknown subcommand.  See `{}help` for usage.", prefix),
                )
                .await?;
                Ok(EventHandled::Yes)
            }
        }
    }
}

/// Usage: ;scrim create <name>, <unix-timestamp>, <description>
async fn handle_create(ctx: &Context<'_>, msg: &Message, args: &str) -> Result<EventHandled> {
    let parts: Vec<&str> = args.splitn(3, ',').collect();
    let &[name, timestamp, description] = parts.as_slice() else {
        msg.reply(
            ctx.cache_http,
            "Usage: scrim create <name>, <unix-timestamp>, <description>",
        )
        .await?;
        return Ok(EventHandled::Yes);
    };

    let Ok(start_unix) = timestamp.trim().parse::<i64>() else {
        msg.reply(ctx.cache_http, "Invalid start timestamp")
            .await?;
        return Ok(EventHandled::Yes);
    };

    match lifecycle::begin_session(ctx, name.trim(), start_unix, description.trim()).await {
        Ok(signup_msg) => {
            msg.reply(
                ctx.cache_http,
                format!(
                    "Scheduled **{}** for <t:{}:F>, signups are open: {}",
                    name.trim(),
                    start_unix,
                    signup_msg.link()
                ),
            )
            .await?;
        }
        Err(err) => {
            msg.reply(ctx.cache_http, format!("Could not schedule scrim: {}", err))
                .await?;
        }
    }

    Ok(EventHandled::Yes)
}

/// Usage: ;scrim update
///
/// Manual full sync.  This is also the only moment attendance is credited:
/// whoever is registered right now gets a registration tick, and those of
/// them sitting in a voice channel get an attendance tick.
async fn handle_update(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    let sync = registration::reconcile_registration(ctx).await?;
    let voice_report = voice::reconcile_voice_presence(ctx).await?;

    let guild_id = ctx.cfg.read().await.scrim.guild_id;
    let in_voice: HashSet<UserId> = helper::voice_occupancy(ctx, guild_id)?
        .into_iter()
        .map(|(user_id, _)| user_id)
        .collect();

    let attended = {
        let mut pstate = ctx.pstate.write().await;
        let (_, attended) = pstate.attendance.credit(&sync.registered, &in_voice);
        pstate.attendance.save().await?;
        attended
    };

    msg.reply(
        ctx.cache_http,
        format!(
            "Signup sync: {}.  Voice sync: {}.  Credited attendance for {} of {} registered member(s).",
            sync.report,
            voice_report,
            attended,
            sync.registered.len()
        ),
    )
    .await?;
    Ok(EventHandled::Yes)
}

/// Usage: ;scrim end
async fn handle_end(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    if !msg.is_from_owner(ctx).await {
        msg.reply(ctx.cache_http, "Only a bot owner can end a scrim")
            .await?;
        return Ok(EventHandled::Yes);
    }

    let response = if lifecycle::end_session(ctx).await? {
        "Scrim ended.  Thanks for playing!"
    } else {
        "No scrim session is currently tracked"
    };
    msg.reply(ctx.cache_http, response).await?;
    Ok(EventHandled::Yes)
}

/// Usage: ;scrim cancel
async fn handle_cancel(ctx: &Context<'_>, msg: &Message) -> Result<EventHandled> {
    if !msg.is_from_owner(ctx).await {
        msg.reply(ctx.cache_http, "Only a bot owner can cancel a scrim")
            .await?;
        return Ok(EventHandled::Yes);
    }

    let response = if lifecycle::cancel_session(ctx).await? {
        "Scrim cancelled and signup post removed"
    } else {
        "No scrim session is currently tracked"
    };
    msg.reply(ctx.cache_http, response).await?;
    Ok(EventHandled::Yes)
}
