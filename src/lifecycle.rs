//! Session lifecycle.  A scrim session is a Discord scheduled event plus its
//! signup message.  A minute-level poll warns shortly before the start and
//! then starts the event; Discord's own lifecycle notifications feed back in
//! so a session Discord ends against our will is recreated on the spot.

use crate::{
    config::Scrim,
    context::Context,
    helper::is_not_found,
    log_event, log_internal,
    registration::{reconcile_registration, signup_marker, SIGNUP_MARKER},
    voice::clear_voice_roles,
    volatile_state::SessionStatus,
};
use anyhow::{anyhow, bail, Result};
use serenity::all::{
    CreateEmbed, CreateMessage, CreateScheduledEvent, EditScheduledEvent, Message, MessageId,
    ScheduledEvent, ScheduledEventId, ScheduledEventStatus, ScheduledEventType, Timestamp,
};

/// How far ahead of the start the reminder goes out.
const WARNING_LEAD_SECS: i64 = 30 * 60;
/// Width of the reminder window.  Wider than one poll tick, so a late tick
/// cannot step over it.
const WARNING_BAND_SECS: i64 = 2 * 60;
/// How far past the scheduled instant auto-start still fires.  Covers start
/// times that slip between two ticks.
const START_GRACE_SECS: i64 = 5 * 60;

pub fn due_for_warning(remaining_secs: i64) -> bool {
    remaining_secs <= WARNING_LEAD_SECS && remaining_secs > WARNING_LEAD_SECS - WARNING_BAND_SECS
}

pub fn due_for_start(remaining_secs: i64) -> bool {
    remaining_secs <= 0 && remaining_secs >= -START_GRACE_SECS
}

/// How to react when Discord reports a session as over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndedDisposition {
    /// Not ours; nothing to do.
    Ignore,
    /// Our own teardown coming back around; let it finish.
    AcceptTeardown,
    /// Tracked but never went live; drop the stale entry.
    DropStale,
    /// Ended against our will mid-session; bring it back.
    Resurrect,
}

pub fn classify_external_end(
    tearing_down: bool,
    tracked: bool,
    status: Option<SessionStatus>,
) -> EndedDisposition {
    if !tracked {
        return EndedDisposition::Ignore;
    }
    if tearing_down {
        return EndedDisposition::AcceptTeardown;
    }
    match status {
        Some(SessionStatus::Active) => EndedDisposition::Resurrect,
        _ => EndedDisposition::DropStale,
    }
}

/// Schedule a new session: create the Discord event, post the signup embed,
/// seed the signup reaction, and persist the mapping.
pub async fn begin_session(
    ctx: &Context<'_>,
    name: &str,
    start_unix: i64,
    description: &str,
) -> Result<Message> {
    if !ctx.pstate.read().await.sessions.is_empty() {
        bail!("a scrim session is already scheduled or running");
    }

    let start = Timestamp::from_unix_timestamp(start_unix)
        .map_err(|_| anyhow!("invalid start timestamp {}", start_unix))?;
    let scrim = ctx.cfg.read().await.scrim.clone();

    let event = scrim
        .guild_id
        .create_scheduled_event(
            ctx.cache_http,
            CreateScheduledEvent::new(ScheduledEventType::Voice, name, start)
                .channel_id(scrim.meeting_channel_id)
                .description(description),
        )
        .await?;

    let embed = CreateEmbed::new()
        .title(name)
        .description(description)
        .field("Datum", format!("<t:{}:F>", start_unix), false);
    let mut create = CreateMessage::new().embed(embed);
    let mentions = role_mentions(&scrim);
    if !mentions.is_empty() {
        create = create.content(mentions);
    }

    let msg = scrim
        .signup_channel_id
        .send_message(ctx.cache_http, create)
        .await?;
    msg.react(ctx.cache_http, signup_marker()).await?;

    {
        let mut pstate = ctx.pstate.write().await;
        pstate.sessions.insert(event.id, msg.id);
        pstate.sessions.save().await?;
    }
    ctx.vstate
        .write()
        .await
        .lifecycle
        .set_status(event.id, SessionStatus::Scheduled);

    log_event!(
        "Scheduled scrim \"{}\" as event {} with signup message {}",
        name,
        event.id,
        msg.id
    );
    Ok(msg)
}

/// One lifecycle poll: warn and start tracked sessions whose time has come.
/// Failures on one session don't stop the others; the whole poll repeats
/// next tick anyway.
pub async fn tick(ctx: &Context<'_>) -> Result<()> {
    let tracked: Vec<(ScheduledEventId, MessageId)> =
        ctx.pstate.read().await.sessions.iter().collect();
    if tracked.is_empty() {
        return Ok(());
    }

    let scrim = ctx.cfg.read().await.scrim.clone();
    let events = scrim.guild_id.scheduled_events(ctx.http, false).await?;
    let now = Timestamp::now().unix_timestamp();

    for (event_id, _) in tracked {
        let Some(event) = events.iter().find(|event| event.id == event_id) else {
            // Vanished events are handled by the delete notification
            continue;
        };

        // Rebuild bookkeeping a restart lost, from Discord's own status.
        {
            let mut vstate = ctx.vstate.write().await;
            if vstate.lifecycle.status(event_id).is_none() {
                let status = match event.status {
                    ScheduledEventStatus::Active => SessionStatus::Active,
                    _ => SessionStatus::Scheduled,
                };
                vstate.lifecycle.set_status(event_id, status);
            }
        }

        let status = ctx.vstate.read().await.lifecycle.status(event_id);
        let remaining = event.start_time.unix_timestamp() - now;
        let result = match status {
            Some(SessionStatus::Scheduled | SessionStatus::Warned) if due_for_start(remaining) => {
                start_session(ctx, &scrim, event).await
            }
            Some(SessionStatus::Scheduled) if due_for_warning(remaining) => {
                warn_session(ctx, &scrim, event).await
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            log_internal!("Lifecycle step for event {} failed: {}", event_id, err);
        }
    }

    Ok(())
}

async fn warn_session(ctx: &Context<'_>, scrim: &Scrim, event: &ScheduledEvent) -> Result<()> {
    // At most one reminder per session per process run, even if the send
    // below fails.
    if !ctx.vstate.write().await.lifecycle.mark_warned(event.id) {
        return Ok(());
    }

    let mentions = role_mentions(scrim);
    let text = format!(
        "{} **{}** starts <t:{}:R> — react {} on the signup post to play!",
        mentions,
        event.name,
        event.start_time.unix_timestamp(),
        SIGNUP_MARKER
    );
    scrim
        .signup_channel_id
        .say(ctx.cache_http, text.trim_start())
        .await?;

    ctx.vstate
        .write()
        .await
        .lifecycle
        .set_status(event.id, SessionStatus::Warned);
    log_event!("Warned about upcoming scrim \"{}\"", event.name);
    Ok(())
}

async fn start_session(ctx: &Context<'_>, scrim: &Scrim, event: &ScheduledEvent) -> Result<()> {
    scrim
        .guild_id
        .edit_scheduled_event(
            ctx.cache_http,
            event.id,
            EditScheduledEvent::new().status(ScheduledEventStatus::Active),
        )
        .await?;

    ctx.vstate
        .write()
        .await
        .lifecycle
        .set_status(event.id, SessionStatus::Active);

    scrim
        .signup_channel_id
        .say(ctx.cache_http, format!("**{}** is starting now!", event.name))
        .await?;
    log_event!("Started scrim session \"{}\" ({})", event.name, event.id);
    Ok(())
}

/// Intentionally finish the live session.  The teardown flag keeps the
/// resulting "ended" notification from resurrecting it.
pub async fn end_session(ctx: &Context<'_>) -> Result<bool> {
    let Some((event_id, _)) = live_session(ctx).await else {
        return Ok(false);
    };
    let scrim = ctx.cfg.read().await.scrim.clone();

    ctx.vstate.write().await.lifecycle.begin_teardown();
    let result = finish_session(ctx, &scrim, event_id).await;
    ctx.vstate.write().await.lifecycle.end_teardown();

    result.map(|()| true)
}

async fn finish_session(ctx: &Context<'_>, scrim: &Scrim, event_id: ScheduledEventId) -> Result<()> {
    // A session that never started can only be cancelled on the Discord side.
    let external_status = match ctx.vstate.read().await.lifecycle.status(event_id) {
        Some(SessionStatus::Active) => ScheduledEventStatus::Completed,
        _ => ScheduledEventStatus::Canceled,
    };

    match scrim
        .guild_id
        .edit_scheduled_event(
            ctx.cache_http,
            event_id,
            EditScheduledEvent::new().status(external_status),
        )
        .await
    {
        Ok(_) => {}
        Err(err) if is_not_found(&err) => {}
        Err(err) => return Err(err.into()),
    }

    {
        let mut pstate = ctx.pstate.write().await;
        pstate.sessions.remove(event_id);
        pstate.sessions.save().await?;
    }
    ctx.vstate
        .write()
        .await
        .lifecycle
        .set_status(event_id, SessionStatus::Ended);

    let report = clear_voice_roles(ctx).await?;
    log_event!("Ended scrim session {} ({})", event_id, report);

    let sync = reconcile_registration(ctx).await?;
    log_internal!("Signup resync after session end: {}", sync.report);
    Ok(())
}

/// Cancel the live session outright: delete the Discord event and the
/// signup message.  Guarded like `end_session`.
pub async fn cancel_session(ctx: &Context<'_>) -> Result<bool> {
    let Some((event_id, message_id)) = live_session(ctx).await else {
        return Ok(false);
    };
    let scrim = ctx.cfg.read().await.scrim.clone();

    ctx.vstate.write().await.lifecycle.begin_teardown();
    let result = remove_session(ctx, &scrim, event_id, message_id).await;
    ctx.vstate.write().await.lifecycle.end_teardown();

    result.map(|()| true)
}

async fn remove_session(
    ctx: &Context<'_>,
    scrim: &Scrim,
    event_id: ScheduledEventId,
    message_id: MessageId,
) -> Result<()> {
    match scrim
        .guild_id
        .delete_scheduled_event(ctx.http, event_id)
        .await
    {
        Ok(()) => {}
        Err(err) if is_not_found(&err) => {}
        Err(err) => return Err(err.into()),
    }

    // Unmap before deleting the message so the delete notification sees an
    // untracked message and doesn't resync twice.
    {
        let mut pstate = ctx.pstate.write().await;
        pstate.sessions.remove(event_id);
        pstate.sessions.save().await?;
    }
    ctx.vstate
        .write()
        .await
        .lifecycle
        .set_status(event_id, SessionStatus::Cancelled);

    match scrim
        .signup_channel_id
        .delete_message(ctx.http, message_id)
        .await
    {
        Ok(()) => {}
        Err(err) if is_not_found(&err) => {}
        Err(err) => return Err(err.into()),
    }

    let report = clear_voice_roles(ctx).await?;
    log_event!("Cancelled scrim session {} ({})", event_id, report);

    let sync = reconcile_registration(ctx).await?;
    log_internal!("Signup resync after cancellation: {}", sync.report);
    Ok(())
}

/// Discord reported a tracked event as completed, cancelled, or deleted.
pub async fn on_external_session_ended(ctx: &Context<'_>, event: &ScheduledEvent) -> Result<bool> {
    let tracked_message = ctx.pstate.read().await.sessions.message_for(event.id);
    let (tearing_down, status) = {
        let vstate = ctx.vstate.read().await;
        (
            vstate.lifecycle.tearing_down(),
            vstate.lifecycle.status(event.id),
        )
    };

    match classify_external_end(tearing_down, tracked_message.is_some(), status) {
        EndedDisposition::Ignore => Ok(false),
        EndedDisposition::AcceptTeardown => Ok(true),
        EndedDisposition::DropStale => {
            {
                let mut pstate = ctx.pstate.write().await;
                pstate.sessions.remove(event.id);
                pstate.sessions.save().await?;
            }
            ctx.vstate.write().await.lifecycle.forget(event.id);
            log_event!(
                "Tracked scrim event {} ended before it began, dropping it",
                event.id
            );

            let sync = reconcile_registration(ctx).await?;
            log_internal!("Signup resync: {}", sync.report);
            Ok(true)
        }
        EndedDisposition::Resurrect => {
            if let Some(message_id) = tracked_message {
                resurrect(ctx, event, message_id).await?;
            }
            Ok(true)
        }
    }
}

/// Replace an externally terminated session with a fresh one that starts
/// immediately.  The signup message, and therefore everyone's registration,
/// carries over untouched.
async fn resurrect(ctx: &Context<'_>, old: &ScheduledEvent, message_id: MessageId) -> Result<()> {
    let scrim = ctx.cfg.read().await.scrim.clone();

    // Discord insists on a start time in the future.
    let start = Timestamp::from_unix_timestamp(Timestamp::now().unix_timestamp() + 10)
        .map_err(|_| anyhow!("clock out of range"))?;

    let mut create =
        CreateScheduledEvent::new(ScheduledEventType::Voice, old.name.as_str(), start)
            .channel_id(scrim.meeting_channel_id);
    if let Some(description) = &old.description {
        create = create.description(description);
    }
    let replacement = scrim
        .guild_id
        .create_scheduled_event(ctx.cache_http, create)
        .await?;
    scrim
        .guild_id
        .edit_scheduled_event(
            ctx.cache_http,
            replacement.id,
            EditScheduledEvent::new().status(ScheduledEventStatus::Active),
        )
        .await?;

    {
        let mut pstate = ctx.pstate.write().await;
        if !pstate.sessions.rekey(old.id, replacement.id) {
            // Entry disappeared mid-flight; map the replacement directly
            pstate.sessions.insert(replacement.id, message_id);
        }
        pstate.sessions.save().await?;
    }
    {
        let mut vstate = ctx.vstate.write().await;
        vstate.lifecycle.forget(old.id);
        vstate
            .lifecycle
            .set_status(replacement.id, SessionStatus::Active);
        // The replacement starts immediately; it never needs a reminder
        vstate.lifecycle.mark_warned(replacement.id);
    }

    log_event!(
        "Scrim event {} was ended externally, resurrected as {}",
        old.id,
        replacement.id
    );
    Ok(())
}

async fn live_session(ctx: &Context<'_>) -> Option<(ScheduledEventId, MessageId)> {
    // Single-session discipline: whatever is in the map is the live one.
    ctx.pstate.read().await.sessions.iter().next()
}

fn role_mentions(scrim: &Scrim) -> String {
    scrim
        .mention_role_ids
        .iter()
        .map(|role_id| format!("<@&{}>", role_id))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volatile_state::LifecycleState;

    #[test]
    fn warning_window_has_both_edges() {
        assert!(!due_for_warning(WARNING_LEAD_SECS + 1));
        assert!(due_for_warning(WARNING_LEAD_SECS));
        assert!(due_for_warning(WARNING_LEAD_SECS - WARNING_BAND_SECS + 1));
        assert!(!due_for_warning(WARNING_LEAD_SECS - WARNING_BAND_SECS));
    }

    #[test]
    fn start_window_covers_a_slightly_missed_instant() {
        assert!(!due_for_start(1));
        assert!(due_for_start(0));
        assert!(due_for_start(-START_GRACE_SECS));
        assert!(!due_for_start(-START_GRACE_SECS - 1));
    }

    #[test]
    fn warning_fires_once_across_ten_minute_ticks() {
        // Session starts 29 minutes 50 seconds from the first tick.
        let mut lifecycle = LifecycleState::new();
        let event_id = ScheduledEventId::new(42);
        let start_in = 29 * 60 + 50;

        let mut warnings = 0;
        for tick in 0..10i64 {
            let remaining = start_in - tick * 60;
            if due_for_warning(remaining) && lifecycle.mark_warned(event_id) {
                warnings += 1;
            }
        }

        assert_eq!(warnings, 1);
    }

    #[test]
    fn teardown_suppresses_resurrection() {
        assert_eq!(
            classify_external_end(true, true, Some(SessionStatus::Active)),
            EndedDisposition::AcceptTeardown
        );
    }

    #[test]
    fn active_tracked_session_is_resurrected() {
        assert_eq!(
            classify_external_end(false, true, Some(SessionStatus::Active)),
            EndedDisposition::Resurrect
        );
    }

    #[test]
    fn untracked_events_are_ignored() {
        assert_eq!(
            classify_external_end(false, false, None),
            EndedDisposition::Ignore
        );
        assert_eq!(
            classify_external_end(true, false, Some(SessionStatus::Active)),
            EndedDisposition::Ignore
        );
    }

    #[test]
    fn tracked_but_not_started_session_is_dropped_not_resurrected() {
        assert_eq!(
            classify_external_end(false, true, Some(SessionStatus::Scheduled)),
            EndedDisposition::DropStale
        );
        assert_eq!(
            classify_external_end(false, true, Some(SessionStatus::Warned)),
            EndedDisposition::DropStale
        );
        assert_eq!(
            classify_external_end(false, true, None),
            EndedDisposition::DropStale
        );
    }
}
