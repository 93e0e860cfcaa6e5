//! Best-effort notification side effects.
//!
//! A failure here is logged and never fails the request that caused it.

use circle_types::{NotificationKind, User};
use uuid::Uuid;

use crate::db::repositories::{FollowRepository, NotificationRepository, UserRepository};
use crate::mention::extract_mentions;
use crate::state::AppState;

/// Notify `recipient` about something `actor` did. Acting on your own
/// content notifies nobody, and neither does anything across a block.
pub fn notify(state: &AppState, recipient: &Uuid, actor: &User, kind: NotificationKind, content: &str) {
    if *recipient == actor.id {
        return;
    }

    match FollowRepository::new(state.db.pool.clone()).is_blocked_either(&actor.id, recipient) {
        Ok(false) => {}
        Ok(true) => return,
        Err(e) => {
            tracing::warn!("Failed to check block before notifying {}: {:#}", recipient, e);
            return;
        }
    }

    let repo = NotificationRepository::new(state.db.pool.clone());
    if let Err(e) = repo.create(recipient, Some(&actor.id), kind, content) {
        tracing::warn!(
            "Failed to create {} notification for {}: {:#}",
            kind.as_str(),
            recipient,
            e
        );
    }
}

/// Send a mention notification to every existing user named in `text`.
pub fn notify_mentions(state: &AppState, author: &User, text: &str, place: &str) {
    let usernames = extract_mentions(text);
    if usernames.is_empty() {
        return;
    }

    let users = UserRepository::new(state.db.pool.clone());
    let message = format!("{} mentioned you in a {}", author.username, place);

    for username in usernames {
        match users.get_by_username(&username) {
            Ok(Some(mentioned)) => {
                notify(state, &mentioned.id, author, NotificationKind::Mention, &message)
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to resolve mention @{}: {:#}", username, e),
        }
    }
}
