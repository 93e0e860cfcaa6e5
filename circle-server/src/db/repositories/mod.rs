mod user_repository;
mod post_repository;
mod reel_repository;
mod story_repository;
mod engagement_repository;
mod follow_repository;
mod friend_request_repository;
mod message_repository;
mod group_repository;
mod notification_repository;
mod support_repository;

pub use user_repository::{ProfileFields, UserRepository};
pub use post_repository::PostRepository;
pub use reel_repository::ReelRepository;
pub use story_repository::StoryRepository;
pub use engagement_repository::{Engagement, EngagementRepository};
pub use follow_repository::{FollowRepository, FollowToggle};
pub use friend_request_repository::FriendRequestRepository;
pub use message_repository::MessageRepository;
pub use group_repository::GroupRepository;
pub use notification_repository::NotificationRepository;
pub use support_repository::SupportRepository;
