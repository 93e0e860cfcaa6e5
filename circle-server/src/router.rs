use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

/// Build the full HTTP application around `state`
pub fn build_router(state: AppState) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Authentication routes
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/logout", post(api::auth::logout))
        .route("/auth/me", get(api::auth::me))
        .route("/auth/recover", post(api::auth::recover))
        .route("/auth/password", post(api::auth::change_password))
        // User routes
        .route("/users/search", get(api::profile::search_users))
        .route("/users/me", put(api::profile::update_me).delete(api::profile::delete_me))
        .route("/users/:id", get(api::profile::get_user))
        .route("/users/:id/posts", get(api::profile::get_user_posts))
        .route("/users/:id/reels", get(api::profile::get_user_reels))
        // Post routes
        .route("/posts", post(api::posts::create_post))
        .route("/posts/feed", get(api::posts::get_feed))
        .route("/posts/saved", get(api::posts::get_saved_posts))
        .route(
            "/posts/:id",
            get(api::posts::get_post)
                .put(api::posts::update_post)
                .delete(api::posts::delete_post),
        )
        .route("/posts/:id/like", post(api::posts::like_post))
        .route("/posts/:id/save", post(api::posts::save_post))
        .route("/posts/:id/share", post(api::posts::share_post))
        .route(
            "/posts/:id/comments",
            get(api::posts::get_comments).post(api::posts::create_comment),
        )
        .route("/comments/:id", delete(api::engagement::delete_comment))
        // Reel routes
        .route("/reels", get(api::reels::get_reels).post(api::reels::create_reel))
        .route("/reels/:id", get(api::reels::get_reel).delete(api::reels::delete_reel))
        .route("/reels/:id/like", post(api::reels::like_reel))
        .route("/reels/:id/save", post(api::reels::save_reel))
        .route("/reels/:id/share", post(api::reels::share_reel))
        .route("/reels/:id/view", post(api::reels::view_reel))
        .route(
            "/reels/:id/comments",
            get(api::reels::get_comments).post(api::reels::create_comment),
        )
        // Story routes
        .route("/stories", get(api::stories::get_stories).post(api::stories::create_story))
        .route(
            "/stories/:id",
            get(api::stories::get_story).delete(api::stories::delete_story),
        )
        .route("/stories/:id/view", post(api::stories::view_story))
        .route("/stories/:id/viewers", get(api::stories::get_story_viewers))
        // Social routes
        .route("/users/:id/follow", post(api::friends::toggle_follow))
        .route(
            "/users/:id/block",
            post(api::friends::block_user).delete(api::friends::unblock_user),
        )
        .route("/users/:id/followers", get(api::friends::get_followers_list))
        .route("/users/:id/following", get(api::friends::get_following_list))
        .route("/users/:id/mutual", get(api::friends::get_mutual_friends_list))
        .route("/social/blocked", get(api::friends::get_blocked_list))
        .route("/social/friends", get(api::friends::get_friends_list))
        .route("/social/suggestions", get(api::friends::get_suggestions))
        // Friend request routes
        .route("/friend-requests", post(api::friend_requests::send_request))
        .route("/friend-requests/incoming", get(api::friend_requests::get_incoming))
        .route("/friend-requests/outgoing", get(api::friend_requests::get_outgoing))
        .route("/friend-requests/:id", delete(api::friend_requests::cancel_request))
        .route("/friend-requests/:id/accept", post(api::friend_requests::accept_request))
        .route("/friend-requests/:id/decline", post(api::friend_requests::decline_request))
        // Direct message routes
        .route("/messages", post(api::dms::send_message))
        .route("/messages/conversations", get(api::dms::get_conversations))
        .route("/messages/unread-count", get(api::dms::get_unread_count))
        .route("/messages/item/:id", delete(api::dms::delete_message))
        .route("/messages/:user_id", get(api::dms::get_conversation))
        .route("/messages/:user_id/read", post(api::dms::mark_messages_read))
        // Group routes
        .route("/groups", get(api::groups::get_groups).post(api::groups::create_group))
        .route(
            "/groups/:id",
            get(api::groups::get_group)
                .put(api::groups::update_group)
                .delete(api::groups::delete_group),
        )
        .route(
            "/groups/:id/members",
            get(api::groups::get_members).post(api::groups::add_member),
        )
        .route("/groups/:id/members/:user_id", delete(api::groups::remove_member))
        .route("/groups/:id/members/:user_id/admin", post(api::groups::set_member_admin))
        .route("/groups/:id/leave", post(api::groups::leave_group))
        .route(
            "/groups/:id/messages",
            get(api::groups::get_messages).post(api::groups::send_message),
        )
        // Notification routes
        .route("/notifications", get(api::notifications::get_notifications))
        .route("/notifications/unread-count", get(api::notifications::get_unread_count))
        .route("/notifications/read-all", post(api::notifications::mark_all_read))
        .route("/notifications/:id", delete(api::notifications::delete_notification))
        .route("/notifications/:id/read", post(api::notifications::mark_read))
        // Support routes
        .route(
            "/support/tickets",
            get(api::support::get_my_tickets).post(api::support::create_ticket),
        )
        .route("/support/tickets/:id", get(api::support::get_ticket))
        .route("/support/tickets/:id/messages", post(api::support::reply_to_ticket))
        .route("/support/tickets/:id/close", post(api::support::close_ticket))
        // Admin routes
        .route("/admin/users", get(api::admin::list_users))
        .route("/admin/users/:id/ban", post(api::admin::ban_user))
        .route("/admin/users/:id/unban", post(api::admin::unban_user))
        .route("/admin/users/:id/admin", post(api::admin::set_user_admin))
        .route("/admin/posts/:id", delete(api::admin::delete_post))
        .route("/admin/reels/:id", delete(api::admin::delete_reel))
        .route("/admin/stories/:id", delete(api::admin::delete_story))
        .route("/admin/tickets", get(api::admin::list_tickets))
        .route("/admin/tickets/:id/status", put(api::admin::update_ticket_status))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health_check() -> &'static str {
    "OK"
}
