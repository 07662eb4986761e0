use wabridge_store::{ChatPolicyDoc, PolicyMode, SessionPolicyDoc};

/// Decide whether an inbound message should be turned into a pending turn.
///
/// Deny-by-default at every gate: the bridge's own echoes (`from_me`) are
/// never processed, cross-bot traffic is dropped unless `receive_from_bots`
/// opts in, and allow/block-listed chats follow `session.mode` via a plain
/// allow/deny list check, scoped per chat instead of per user.
pub fn allow_process(
    session: &SessionPolicyDoc,
    chat: &ChatPolicyDoc,
    chat_id: &str,
    from_me: bool,
    is_from_bot: bool,
) -> bool {
    if from_me {
        return false;
    }
    if is_from_bot && !session.receive_from_bots {
        return false;
    }
    effective_enabled(session, chat) && chat_passes_mode(session, chat_id)
}

/// Decide whether a ready turn may still be dispatched. Re-checked right
/// before claim/send so a policy change mid-buffer (bot disabled while a
/// turn was accumulating) skips delivery instead of sending anyway.
pub fn allow_send(session: &SessionPolicyDoc, chat: &ChatPolicyDoc, chat_id: &str) -> bool {
    effective_enabled(session, chat) && chat_passes_mode(session, chat_id)
}

fn effective_enabled(session: &SessionPolicyDoc, chat: &ChatPolicyDoc) -> bool {
    chat.bot_enabled.unwrap_or(session.enabled)
}

fn chat_passes_mode(session: &SessionPolicyDoc, chat_id: &str) -> bool {
    match session.mode {
        PolicyMode::All => true,
        PolicyMode::Allowlist => session.allowlist.iter().any(|e| e == chat_id),
        PolicyMode::Blocklist => !session.blocklist.iter().any(|e| e == chat_id),
    }
}
