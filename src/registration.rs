//! Signup tracking.  The registered role is derived state: it must always
//! equal the set of members holding the signup reaction on at least one
//! tracked signup message.  Role bits members already carry are treated as a
//! stale cache and overwritten on every pass.

use crate::{
    context::Context,
    helper::{is_not_found, role_holders},
    log_event, log_internal,
    logging::AsyncPrintColor,
};
use anyhow::Result;
use serenity::all::{GuildId, Message, MessageId, Reaction, ReactionType, RoleId, UserId};
use std::collections::HashSet;

/// The reaction members add to a signup message to register.
pub const SIGNUP_MARKER: &str = "\u{2705}";

pub fn signup_marker() -> ReactionType {
    ReactionType::Unicode(SIGNUP_MARKER.to_owned())
}

pub fn is_signup_marker(emoji: &ReactionType) -> bool {
    matches!(emoji, ReactionType::Unicode(s) if s == SIGNUP_MARKER)
}

/// Role mutations that converge the current holder set onto the desired one.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RoleDiff {
    pub add: Vec<UserId>,
    pub remove: Vec<UserId>,
}

impl RoleDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Plan the mutations for one role.  Pure; sorted so passes are
/// deterministic.
pub fn plan_role_diff(desired: &HashSet<UserId>, current: &HashSet<UserId>) -> RoleDiff {
    let mut add: Vec<UserId> = desired.difference(current).copied().collect();
    let mut remove: Vec<UserId> = current.difference(desired).copied().collect();
    add.sort_unstable();
    remove.sort_unstable();
    RoleDiff { add, remove }
}

/// What one reconciliation pass actually did.
#[derive(Debug, Default)]
pub struct PassReport {
    pub added: usize,
    pub removed: usize,
    pub failed: usize,
    pub dropped_messages: usize,
}

impl PassReport {
    pub fn is_quiet(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.failed == 0 && self.dropped_messages == 0
    }
}

impl std::fmt::Display for PassReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} role(s) added, {} removed, {} failed, {} stale message(s) dropped",
            self.added, self.removed, self.failed, self.dropped_messages
        )
    }
}

/// Apply a planned diff, one member at a time.  A member that can't be
/// updated (left the guild, permission change) is logged and skipped; the
/// rest of the pass continues.
pub async fn apply_role_diff(
    ctx: &Context<'_>,
    guild_id: GuildId,
    role_id: RoleId,
    diff: &RoleDiff,
    reason: &str,
    report: &mut PassReport,
) {
    for user_id in &diff.add {
        match ctx
            .http
            .add_member_role(guild_id, *user_id, role_id, Some(reason))
            .await
        {
            Ok(()) => report.added += 1,
            Err(err) => {
                report.failed += 1;
                log_internal!("Could not add role {} to {}: {}", role_id, user_id, err);
            }
        }
    }

    for user_id in &diff.remove {
        match ctx
            .http
            .remove_member_role(guild_id, *user_id, role_id, Some(reason))
            .await
        {
            Ok(()) => report.removed += 1,
            Err(err) => {
                report.failed += 1;
                log_internal!("Could not remove role {} from {}: {}", role_id, user_id, err);
            }
        }
    }
}

/// Result of a full registration pass.
pub struct RegistrationSync {
    /// The derived desired set: everyone with a signup reaction somewhere.
    pub registered: HashSet<UserId>,
    pub report: PassReport,
}

/// Full pass: derive the registered set from every tracked signup message
/// and converge the role onto it.  Safe to run at any time, any number of
/// times.
pub async fn reconcile_registration(ctx: &Context<'_>) -> Result<RegistrationSync> {
    let mut report = PassReport::default();
    let registered = desired_registered(ctx, &mut report).await?;

    let (guild_id, role_id) = {
        let cfg = ctx.cfg.read().await;
        (cfg.scrim.guild_id, cfg.scrim.registered_role_id)
    };

    let current = role_holders(ctx, guild_id, role_id)?;
    let diff = plan_role_diff(&registered, &current);
    apply_role_diff(ctx, guild_id, role_id, &diff, "scrim signup sync", &mut report).await;

    Ok(RegistrationSync { registered, report })
}

/// Union of signup reactors across all tracked messages, bots excluded.
/// Messages Discord no longer knows about are dropped from the session map
/// as we go, so a deleted signup post heals itself after one pass.
async fn desired_registered(
    ctx: &Context<'_>,
    report: &mut PassReport,
) -> Result<HashSet<UserId>> {
    let channel_id = ctx.cfg.read().await.scrim.signup_channel_id;
    let tracked = ctx.pstate.read().await.sessions.message_ids();

    let mut registered = HashSet::new();
    let mut missing = Vec::new();
    for message_id in tracked {
        let msg = match channel_id.message(ctx.cache_http, message_id).await {
            Ok(msg) => msg,
            Err(err) if is_not_found(&err) => {
                missing.push(message_id);
                continue;
            }
            Err(err) => {
                // Try again next pass
                log_internal!("Could not fetch signup message {}: {}", message_id, err);
                continue;
            }
        };

        match reaction_holders(ctx, &msg).await {
            Ok(holders) => registered.extend(holders),
            Err(err) => log_internal!(
                "Could not list reactions on signup message {}: {}",
                message_id,
                err
            ),
        }
    }

    if !missing.is_empty() {
        let mut pstate = ctx.pstate.write().await;
        for message_id in &missing {
            if let Some(event_id) = pstate.sessions.session_for_message(*message_id) {
                ctx.vstate.write().await.lifecycle.forget(event_id);
            }
            if pstate.sessions.remove_message(*message_id) {
                report.dropped_messages += 1;
                log_event!(
                    "Signup message {} no longer exists, removing it from tracking",
                    message_id
                );
            }
        }
        if let Err(err) = pstate.sessions.save().await {
            // The in-memory drop still applies; persisting retries next pass
            log_internal!("Could not save session map: {}", err);
        }
    }

    Ok(registered)
}

/// Everyone (minus bots) holding the signup reaction on one message.
async fn reaction_holders(ctx: &Context<'_>, msg: &Message) -> Result<HashSet<UserId>> {
    const PAGE_SIZE: u8 = 100;

    let mut holders = HashSet::new();
    let mut after: Option<UserId> = None;
    loop {
        let page = msg
            .reaction_users(ctx.cache_http, signup_marker(), Some(PAGE_SIZE), after)
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.id);

        let page_len = page.len();
        holders.extend(page.into_iter().filter(|user| !user.bot).map(|user| user.id));
        if page_len < PAGE_SIZE as usize {
            break;
        }
    }

    Ok(holders)
}

/// Incremental path for a single new signup reaction.  Returns false when
/// the reaction is not a signup on a tracked message.
pub async fn on_marker_added(ctx: &Context<'_>, reaction: &Reaction) -> Result<bool> {
    if !is_signup_marker(&reaction.emoji) {
        return Ok(false);
    }
    if !ctx
        .pstate
        .read()
        .await
        .sessions
        .contains_message(reaction.message_id)
    {
        return Ok(false);
    }

    let Some(user_id) = reaction.user_id else {
        return Ok(false);
    };
    if user_id.to_user(ctx.cache_http).await?.bot {
        return Ok(false);
    }

    let (guild_id, role_id) = {
        let cfg = ctx.cfg.read().await;
        (cfg.scrim.guild_id, cfg.scrim.registered_role_id)
    };
    ctx.http
        .add_member_role(guild_id, user_id, role_id, Some("scrim signup"))
        .await?;

    log_event!("{} signed up for the scrim", user_id.color(ctx.http).await);
    Ok(true)
}

/// Incremental path for a removed signup reaction.  Registration is a union
/// across all tracked messages: the role only comes off once the member
/// holds the signup reaction on none of them.
pub async fn on_marker_removed(ctx: &Context<'_>, reaction: &Reaction) -> Result<bool> {
    if !is_signup_marker(&reaction.emoji) {
        return Ok(false);
    }
    if !ctx
        .pstate
        .read()
        .await
        .sessions
        .contains_message(reaction.message_id)
    {
        return Ok(false);
    }

    let Some(user_id) = reaction.user_id else {
        return Ok(false);
    };
    if user_id.to_user(ctx.cache_http).await?.bot {
        return Ok(false);
    }

    let channel_id = ctx.cfg.read().await.scrim.signup_channel_id;
    let others: Vec<MessageId> = ctx
        .pstate
        .read()
        .await
        .sessions
        .message_ids()
        .into_iter()
        .filter(|message_id| *message_id != reaction.message_id)
        .collect();

    for message_id in others {
        match channel_id.message(ctx.cache_http, message_id).await {
            Ok(msg) => {
                if reaction_holders(ctx, &msg).await?.contains(&user_id) {
                    // Still signed up elsewhere; the role stays
                    return Ok(true);
                }
            }
            // Leave the stale entry for the next full pass to clean up
            Err(err) if is_not_found(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }

    let (guild_id, role_id) = {
        let cfg = ctx.cfg.read().await;
        (cfg.scrim.guild_id, cfg.scrim.registered_role_id)
    };
    ctx.http
        .remove_member_role(guild_id, user_id, role_id, Some("scrim signup withdrawn"))
        .await?;

    log_event!("{} withdrew from the scrim", user_id.color(ctx.http).await);
    Ok(true)
}

/// A tracked signup message was deleted out from under us: stop tracking it
/// and re-derive the role from the survivors.
pub async fn on_tracked_message_deleted(ctx: &Context<'_>, message_id: MessageId) -> Result<bool> {
    {
        let mut pstate = ctx.pstate.write().await;
        if let Some(event_id) = pstate.sessions.session_for_message(message_id) {
            ctx.vstate.write().await.lifecycle.forget(event_id);
        }
        if !pstate.sessions.remove_message(message_id) {
            return Ok(false);
        }
        pstate.sessions.save().await?;
    }

    log_event!(
        "Tracked signup message {} was deleted, resyncing roles",
        message_id
    );
    let sync = reconcile_registration(ctx).await?;
    log_internal!("Signup resync: {}", sync.report);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> HashSet<UserId> {
        raw.iter().map(|id| UserId::new(*id)).collect()
    }

    #[test]
    fn diff_converges_holders_onto_reactors() {
        // Reactions from A and B; role currently held by B and C.
        let desired = ids(&[1, 2]);
        let current = ids(&[2, 3]);

        let diff = plan_role_diff(&desired, &current);
        assert_eq!(diff.add, vec![UserId::new(1)]);
        assert_eq!(diff.remove, vec![UserId::new(3)]);
    }

    #[test]
    fn diff_of_identical_sets_is_empty() {
        let desired = ids(&[4, 5, 6]);

        let diff = plan_role_diff(&desired, &desired.clone());
        assert!(diff.is_empty());
    }

    #[test]
    fn second_pass_after_convergence_plans_nothing() {
        let desired = ids(&[1, 2]);
        let current = ids(&[3]);

        let first = plan_role_diff(&desired, &current);
        let converged: HashSet<UserId> = current
            .iter()
            .copied()
            .filter(|id| !first.remove.contains(id))
            .chain(first.add.iter().copied())
            .collect();

        assert!(plan_role_diff(&desired, &converged).is_empty());
    }

    #[test]
    fn empty_desired_set_strips_everyone() {
        let diff = plan_role_diff(&HashSet::new(), &ids(&[1, 2, 3]));
        assert!(diff.add.is_empty());
        assert_eq!(diff.remove.len(), 3);
    }

    #[test]
    fn marker_matching_is_exact() {
        assert!(is_signup_marker(&ReactionType::Unicode(
            SIGNUP_MARKER.to_owned()
        )));
        assert!(!is_signup_marker(&ReactionType::Unicode("👍".to_owned())));
    }
}
