//! Column decoding shared by the repositories.
//!
//! Ids are stored as UUID text and timestamps as fixed-width RFC 3339 text, so
//! string comparison in SQL orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use circle_types::UserSummary;
use rusqlite::{types::Type, Row};
use uuid::Uuid;

/// Columns selected by [`summary_at`], for a `users u LEFT JOIN profiles p`.
pub const SUMMARY_COLUMNS: &str = "u.id, u.username, p.display_name, p.avatar_url";

pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now() -> String {
    timestamp(Utc::now())
}

/// SQL condition admitting rows of `alias` (a `posts` or `reels` alias) that the
/// `:viewer` parameter may see. A NULL viewer only sees public rows, and a block
/// in either direction hides everything.
pub fn visible_to_viewer(alias: &str) -> String {
    format!(
        "(({a}.visibility = 'public'
           OR {a}.user_id = :viewer
           OR ({a}.visibility = 'friends' AND EXISTS (
                 SELECT 1 FROM followers vf
                 WHERE vf.status = 'accepted'
                   AND ((vf.follower_id = :viewer AND vf.followed_id = {a}.user_id)
                     OR (vf.follower_id = {a}.user_id AND vf.followed_id = :viewer)))))
          AND NOT EXISTS (
                SELECT 1 FROM followers bx
                WHERE bx.status = 'blocked'
                  AND ((bx.follower_id = :viewer AND bx.followed_id = {a}.user_id)
                    OR (bx.follower_id = {a}.user_id AND bx.followed_id = :viewer))))",
        a = alias
    )
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

pub fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub fn opt_uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub fn timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse::<DateTime<Utc>>()
        .map_err(|e| conversion_error(idx, e))
}

pub fn opt_timestamp_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse::<DateTime<Utc>>().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub fn flag_at(row: &Row, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, i64>(idx)? != 0)
}

/// Decode a text column through one of the `parse` constructors in `circle_types::enums`.
pub fn enum_at<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| conversion_error(idx, format!("unexpected value '{}'", raw)))
}

/// Decode the four [`SUMMARY_COLUMNS`] starting at `offset`.
pub fn summary_at(row: &Row, offset: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: uuid_at(row, offset)?,
        username: row.get(offset + 1)?,
        display_name: row.get(offset + 2)?,
        avatar_url: row.get(offset + 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let base = Utc::now();
        let earlier = timestamp(base);
        let later = timestamp(base + Duration::milliseconds(1));
        let much_later = timestamp(base + Duration::hours(30));

        assert!(earlier < later);
        assert!(later < much_later);
        assert_eq!(earlier.len(), much_later.len());
    }

    #[test]
    fn test_timestamp_round_trips_through_parse() {
        let stamp = now();
        let parsed: DateTime<Utc> = stamp.parse().expect("timestamp should parse");
        assert_eq!(timestamp(parsed), stamp);
    }
}
