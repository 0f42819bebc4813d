//! Per (branch, service) ticket numbering.

use crate::db_err;
use sqlx::{PgConnection, Row};
use uuid::Uuid;
use waitline_core::QueueError;


/// Allocate the next sequence value for `(branch, service)`.
///
/// Runs inside the caller's transaction as an atomic insert-or-increment, so
/// no two concurrent callers ever receive the same value. Gaps in issued
/// numbers appear only when the enclosing transaction rolls back.
pub async fn next_ticket_number(
    conn: &mut PgConnection,
    branch_id: Uuid,
    service_id: Uuid,
) -> Result<i64, QueueError> {
    let row = sqlx::query(
        r"
        INSERT INTO ticket_sequences (branch_id, service_id, next_number)
        VALUES ($1, $2, 1)
        ON CONFLICT (branch_id, service_id)
        DO UPDATE SET next_number = ticket_sequences.next_number + 1
        RETURNING next_number
        ",
    )
    .bind(branch_id)
    .bind(service_id)
    .fetch_one(conn)
    .await
    .map_err(db_err)?;

    row.try_get("next_number").map_err(db_err)
}

/// Render the display number `<service_code>-<zero-padded seq>`.
///
/// Sequences pad to three digits; wider values keep all their digits.
#[must_use]
pub fn format_ticket_number(service_code: &str, seq: i64) -> String {
    format!("{service_code}-{seq:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_three_digits() {
        assert_eq!(format_ticket_number("CS", 1), "CS-001");
        assert_eq!(format_ticket_number("CS", 42), "CS-042");
        assert_eq!(format_ticket_number("CS", 999), "CS-999");
    }

    #[test]
    fn wide_sequences_keep_all_digits() {
        assert_eq!(format_ticket_number("VIP", 1000), "VIP-1000");
    }
}
