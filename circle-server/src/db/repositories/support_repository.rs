use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row};
use uuid::Uuid;

use circle_types::{SupportMessage, SupportTicket, TicketStatus, TicketThread};

use crate::db::rows::{enum_at, flag_at, now, timestamp_at, uuid_at};
use crate::db::DbPool;

const TICKET_SELECT: &str = "SELECT t.id, t.user_id, u.username, t.subject, t.status, t.created_at, t.updated_at
     FROM support_tickets t
     JOIN users u ON u.id = t.user_id";

fn ticket_from_row(row: &Row) -> rusqlite::Result<SupportTicket> {
    Ok(SupportTicket {
        id: uuid_at(row, 0)?,
        user_id: uuid_at(row, 1)?,
        username: row.get(2)?,
        subject: row.get(3)?,
        status: enum_at(row, 4, TicketStatus::parse)?,
        created_at: timestamp_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
    })
}

pub struct SupportRepository {
    pool: DbPool,
}

impl SupportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open a ticket together with its first message
    pub fn create_ticket(&self, user_id: &Uuid, subject: &str, message: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let stamp = now();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO support_tickets (id, user_id, subject, status, created_at, updated_at)
             VALUES (?, ?, ?, 'open', ?, ?)",
            (id.to_string(), user_id.to_string(), subject, &stamp, &stamp),
        )
        .context("Failed to create support ticket")?;
        tx.execute(
            "INSERT INTO support_messages (id, ticket_id, sender_id, content, is_staff, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
            (
                Uuid::new_v4().to_string(),
                id.to_string(),
                user_id.to_string(),
                message,
                &stamp,
            ),
        )
        .context("Failed to add ticket message")?;

        tx.commit()?;
        Ok(id)
    }

    pub fn get_ticket(&self, ticket_id: &Uuid) -> Result<Option<SupportTicket>> {
        let conn = self.pool.get()?;
        let ticket = conn
            .query_row(
                &format!("{} WHERE t.id = ?", TICKET_SELECT),
                [ticket_id.to_string()],
                ticket_from_row,
            )
            .optional()?;
        Ok(ticket)
    }

    /// A ticket with its messages, oldest message first
    pub fn get_thread(&self, ticket_id: &Uuid) -> Result<Option<TicketThread>> {
        let Some(ticket) = self.get_ticket(ticket_id)? else {
            return Ok(None);
        };

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT m.id, m.ticket_id, m.sender_id, u.username, m.content, m.is_staff, m.created_at
             FROM support_messages m
             JOIN users u ON u.id = m.sender_id
             WHERE m.ticket_id = ?
             ORDER BY m.created_at ASC, m.rowid ASC",
        )?;
        let messages = stmt
            .query_map([ticket_id.to_string()], |row| {
                Ok(SupportMessage {
                    id: uuid_at(row, 0)?,
                    ticket_id: uuid_at(row, 1)?,
                    sender_id: uuid_at(row, 2)?,
                    sender_username: row.get(3)?,
                    content: row.get(4)?,
                    is_staff: flag_at(row, 5)?,
                    created_at: timestamp_at(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(TicketThread { ticket, messages }))
    }

    /// Tickets opened by `user_id`, most recently updated first
    pub fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<SupportTicket>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE t.user_id = ? ORDER BY t.updated_at DESC",
            TICKET_SELECT
        ))?;
        let tickets = stmt
            .query_map([user_id.to_string()], ticket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    /// All tickets, optionally narrowed to one status (admin queue)
    pub fn list_all(&self, status: Option<TicketStatus>) -> Result<Vec<SupportTicket>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE (?1 IS NULL OR t.status = ?1) ORDER BY t.updated_at DESC",
            TICKET_SELECT
        ))?;
        let tickets = stmt
            .query_map([status.map(|s| s.as_str())], ticket_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    /// Append a reply. A staff reply moves an open ticket to in progress.
    pub fn add_message(
        &self,
        ticket_id: &Uuid,
        sender_id: &Uuid,
        content: &str,
        is_staff: bool,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let stamp = now();
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO support_messages (id, ticket_id, sender_id, content, is_staff, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                ticket_id.to_string(),
                sender_id.to_string(),
                content,
                is_staff as i64,
                &stamp,
            ),
        )
        .context("Failed to add ticket message")?;
        tx.execute(
            "UPDATE support_tickets
             SET updated_at = ?1,
                 status = CASE WHEN ?2 = 1 AND status = 'open' THEN 'in_progress' ELSE status END
             WHERE id = ?3",
            (&stamp, is_staff as i64, ticket_id.to_string()),
        )
        .context("Failed to update support ticket")?;

        tx.commit()?;
        Ok(id)
    }

    pub fn set_status(&self, ticket_id: &Uuid, status: TicketStatus) -> Result<bool> {
        let conn = self.pool.get()?;
        let rows = conn
            .execute(
                "UPDATE support_tickets SET status = ?, updated_at = ? WHERE id = ?",
                (status.as_str(), now(), ticket_id.to_string()),
            )
            .context("Failed to update ticket status")?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{create_user, test_db};

    #[test]
    fn test_ticket_lifecycle() {
        let db = test_db();
        let repo = SupportRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let admin = create_user(&db, "admin");

        let id = repo.create_ticket(&alice.id, "Can't upload", "The upload button fails").unwrap();
        let thread = repo.get_thread(&id).unwrap().unwrap();
        assert_eq!(thread.ticket.status, TicketStatus::Open);
        assert_eq!(thread.messages.len(), 1);
        assert!(!thread.messages[0].is_staff);

        // a user reply leaves the status alone
        repo.add_message(&id, &alice.id, "Still broken", false).unwrap();
        assert_eq!(repo.get_ticket(&id).unwrap().unwrap().status, TicketStatus::Open);

        repo.add_message(&id, &admin.id, "Looking into it", true).unwrap();
        let thread = repo.get_thread(&id).unwrap().unwrap();
        assert_eq!(thread.ticket.status, TicketStatus::InProgress);
        assert_eq!(thread.messages.len(), 3);
        assert!(thread.messages[2].is_staff);

        assert!(repo.set_status(&id, TicketStatus::Closed).unwrap());
        assert!(!repo.set_status(&Uuid::new_v4(), TicketStatus::Closed).unwrap());
    }

    #[test]
    fn test_listing_by_owner_and_status() {
        let db = test_db();
        let repo = SupportRepository::new(db.pool.clone());
        let alice = create_user(&db, "alice");
        let bob = create_user(&db, "bob");

        let first = repo.create_ticket(&alice.id, "One", "first").unwrap();
        repo.create_ticket(&bob.id, "Two", "second").unwrap();
        repo.set_status(&first, TicketStatus::Closed).unwrap();

        assert_eq!(repo.list_for_user(&alice.id).unwrap().len(), 1);
        assert_eq!(repo.list_all(None).unwrap().len(), 2);
        let open = repo.list_all(Some(TicketStatus::Open)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].username, "bob");
        assert!(repo.get_thread(&Uuid::new_v4()).unwrap().is_none());
    }
}
