use serde::{Deserialize, Serialize};

/// Who may see a post or reel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Friends,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Friends => "friends",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "public" => Some(Visibility::Public),
            "friends" => Some(Visibility::Friends),
            _ => None,
        }
    }
}

/// Status of a directed follower edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    Accepted,
    Blocked,
}

impl FollowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowStatus::Accepted => "accepted",
            FollowStatus::Blocked => "blocked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(FollowStatus::Accepted),
            "blocked" => Some(FollowStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FriendRequestStatus::Pending => "pending",
            FriendRequestStatus::Accepted => "accepted",
            FriendRequestStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FriendRequestStatus::Pending),
            "accepted" => Some(FriendRequestStatus::Accepted),
            "declined" => Some(FriendRequestStatus::Declined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(TicketStatus::Open),
            "in_progress" => Some(TicketStatus::InProgress),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }
}

/// Type tag stored on every notification row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Share,
    Mention,
    Follow,
    FriendRequest,
    FriendAccepted,
    Message,
    GroupAdded,
    Support,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Share => "share",
            NotificationKind::Mention => "mention",
            NotificationKind::Follow => "follow",
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::FriendAccepted => "friend_accepted",
            NotificationKind::Message => "message",
            NotificationKind::GroupAdded => "group_added",
            NotificationKind::Support => "support",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(NotificationKind::Like),
            "comment" => Some(NotificationKind::Comment),
            "share" => Some(NotificationKind::Share),
            "mention" => Some(NotificationKind::Mention),
            "follow" => Some(NotificationKind::Follow),
            "friend_request" => Some(NotificationKind::FriendRequest),
            "friend_accepted" => Some(NotificationKind::FriendAccepted),
            "message" => Some(NotificationKind::Message),
            "group_added" => Some(NotificationKind::GroupAdded),
            "support" => Some(NotificationKind::Support),
            _ => None,
        }
    }
}

/// Content that carries likes, saves, shares and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Reel,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Reel => "reel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(ContentKind::Post),
            "reel" => Some(ContentKind::Reel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_parse_is_case_insensitive() {
        assert_eq!(Visibility::parse("Friends"), Some(Visibility::Friends));
        assert_eq!(Visibility::parse("PUBLIC"), Some(Visibility::Public));
        assert_eq!(Visibility::parse("private"), None);
    }

    #[test]
    fn test_ticket_status_serializes_snake_case() {
        let json = serde_json::to_string(&TicketStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(TicketStatus::parse("in_progress"), Some(TicketStatus::InProgress));
    }

    #[test]
    fn test_notification_kind_matches_storage_tag() {
        for kind in [
            NotificationKind::Like,
            NotificationKind::FriendRequest,
            NotificationKind::GroupAdded,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
