use axum::{
    extract::{Path, Query, State},
    Json,
};
use circle_types::{
    ActionResponse, AddMemberRequest, CreateGroupRequest, Group, GroupMember, GroupMessage,
    NotificationKind, SendGroupMessageRequest, SetAdminRequest, UpdateGroupRequest, User,
};
use uuid::Uuid;

use super::friends::require_user;
use super::notify::notify;
use super::{ApiError, ApiResult, Pagination};
use crate::auth::AuthUser;
use crate::db::repositories::{FollowRepository, GroupRepository};
use crate::state::AppState;
use crate::validation::{
    validate_optional_text, validate_text, BIO_MAX_LEN, GROUP_NAME_MAX_LEN, MESSAGE_MAX_LEN,
};

/// The caller's standing in a group
struct Membership {
    creator_id: Uuid,
    is_admin: bool,
}

fn membership(repo: &GroupRepository, group_id: &Uuid, user_id: &Uuid) -> ApiResult<Membership> {
    let creator_id = repo
        .creator_of(group_id)?
        .ok_or_else(|| ApiError::not_found("Group"))?;
    let is_admin = repo
        .membership(group_id, user_id)?
        .ok_or_else(|| ApiError::forbidden("You are not a member of this group"))?;
    Ok(Membership {
        creator_id,
        is_admin,
    })
}

fn require_admin(repo: &GroupRepository, group_id: &Uuid, user_id: &Uuid) -> ApiResult<Membership> {
    let member = membership(repo, group_id, user_id)?;
    if !member.is_admin {
        return Err(ApiError::forbidden("Group admin access required"));
    }
    Ok(member)
}

fn notify_added(state: &AppState, group_name: &str, member_id: &Uuid, actor: &User) {
    let content = format!("{} added you to {}", actor.username, group_name);
    notify(state, member_id, actor, NotificationKind::GroupAdded, &content);
}

fn load_group(repo: &GroupRepository, group_id: &Uuid, user_id: &Uuid) -> ApiResult<Group> {
    repo.get_for_member(group_id, user_id)?
        .ok_or_else(|| ApiError::not_found("Group"))
}

/// GET /groups - Groups the caller belongs to, with unread counts
pub async fn get_groups(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<Vec<Group>>> {
    let groups = GroupRepository::new(state.db.pool.clone()).list_for_user(&auth.id())?;
    Ok(Json(groups))
}

/// POST /groups - Create a group; the creator becomes its first admin
pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateGroupRequest>,
) -> ApiResult<Json<Group>> {
    let name = validate_text("Group name", &payload.name, GROUP_NAME_MAX_LEN)?;
    let description =
        validate_optional_text("Description", payload.description.as_deref(), BIO_MAX_LEN)?;

    let repo = GroupRepository::new(state.db.pool.clone());
    let (group_id, added) =
        repo.create(&auth.id(), name, description.as_deref(), &payload.member_ids)?;
    for member_id in &added {
        notify_added(&state, name, member_id, &auth.user);
    }

    Ok(Json(load_group(&repo, &group_id, &auth.id())?))
}

/// GET /groups/:id
pub async fn get_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Group>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    membership(&repo, &group_id, &auth.id())?;
    Ok(Json(load_group(&repo, &group_id, &auth.id())?))
}

/// PUT /groups/:id - Rename or redescribe a group (group admins)
pub async fn update_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<UpdateGroupRequest>,
) -> ApiResult<Json<Group>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    require_admin(&repo, &group_id, &auth.id())?;
    let current = load_group(&repo, &group_id, &auth.id())?;

    let name = match payload.name.as_deref() {
        Some(name) => validate_text("Group name", name, GROUP_NAME_MAX_LEN)?.to_string(),
        None => current.name,
    };
    let description = match payload.description.as_deref() {
        Some(text) => validate_optional_text("Description", Some(text), BIO_MAX_LEN)?,
        None => current.description,
    };

    repo.update(&group_id, &name, description.as_deref())?;
    Ok(Json(load_group(&repo, &group_id, &auth.id())?))
}

/// DELETE /groups/:id - Delete a group (creator only)
pub async fn delete_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    let creator_id = repo
        .creator_of(&group_id)?
        .ok_or_else(|| ApiError::not_found("Group"))?;
    if creator_id != auth.id() {
        return Err(ApiError::forbidden("Only the group creator can delete the group"));
    }

    repo.delete(&group_id)?;
    Ok(Json(ActionResponse::ok("Group deleted")))
}

/// GET /groups/:id/members
pub async fn get_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Vec<GroupMember>>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    membership(&repo, &group_id, &auth.id())?;
    Ok(Json(repo.members(&group_id)?))
}

/// POST /groups/:id/members - Add a member (group admins)
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    require_admin(&repo, &group_id, &auth.id())?;
    require_user(&state, &payload.user_id)?;

    if FollowRepository::new(state.db.pool.clone()).is_blocked_either(&auth.id(), &payload.user_id)? {
        return Err(ApiError::forbidden("Cannot add this user"));
    }
    if !repo.add_member(&group_id, &payload.user_id)? {
        return Err(ApiError::Conflict("User is already a member".to_string()));
    }

    let group = load_group(&repo, &group_id, &auth.id())?;
    notify_added(&state, &group.name, &payload.user_id, &auth.user);

    Ok(Json(ActionResponse::ok("Member added")))
}

/// DELETE /groups/:id/members/:user_id - Remove a member (group admins)
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    let caller = require_admin(&repo, &group_id, &auth.id())?;
    if member_id == caller.creator_id {
        return Err(ApiError::forbidden("The group creator cannot be removed"));
    }

    if !repo.remove_member(&group_id, &member_id)? {
        return Err(ApiError::not_found("Member"));
    }
    Ok(Json(ActionResponse::ok("Member removed")))
}

/// POST /groups/:id/members/:user_id/admin - Grant or revoke group admin
pub async fn set_member_admin(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((group_id, member_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<SetAdminRequest>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    let caller = require_admin(&repo, &group_id, &auth.id())?;
    if member_id == caller.creator_id && !payload.is_admin {
        return Err(ApiError::forbidden("The group creator is always an admin"));
    }

    if !repo.set_admin(&group_id, &member_id, payload.is_admin)? {
        return Err(ApiError::not_found("Member"));
    }
    let message = if payload.is_admin {
        "Member promoted to admin"
    } else {
        "Admin rights revoked"
    };
    Ok(Json(ActionResponse::ok(message)))
}

/// POST /groups/:id/leave
pub async fn leave_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<ActionResponse>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    let caller = membership(&repo, &group_id, &auth.id())?;
    if caller.creator_id == auth.id() {
        return Err(ApiError::BadRequest(
            "The group creator cannot leave; delete the group instead".to_string(),
        ));
    }

    repo.remove_member(&group_id, &auth.id())?;
    Ok(Json(ActionResponse::ok("Left group")))
}

/// GET /groups/:id/messages - Read the group chat; marks it read for the caller
pub async fn get_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<GroupMessage>>> {
    let repo = GroupRepository::new(state.db.pool.clone());
    membership(&repo, &group_id, &auth.id())?;

    let messages = repo.messages(&group_id, page.limit(), page.offset())?;
    repo.mark_read(&group_id, &auth.id())?;
    Ok(Json(messages))
}

/// POST /groups/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<Uuid>,
    Json(payload): Json<SendGroupMessageRequest>,
) -> ApiResult<Json<GroupMessage>> {
    let content = validate_text("Message", &payload.content, MESSAGE_MAX_LEN)?;
    let repo = GroupRepository::new(state.db.pool.clone());
    membership(&repo, &group_id, &auth.id())?;

    Ok(Json(repo.send_message(&group_id, &auth.id(), content)?))
}
