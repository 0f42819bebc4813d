//! SHA-256 hash chain over a ticket's event log.
//!
//! Each row's hash covers the previous hash, the ticket id, the event type,
//! the creation timestamp, the sequence number and the raw payload bytes, so
//! any retroactive edit to the log breaks every later hash.

use crate::event::TicketEvent;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Chain verification failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("event log is empty")]
    Empty,

    #[error("sequence gap at position {position}: expected {expected}, found {found}")]
    SequenceGap {
        position: usize,
        expected: i32,
        found: i32,
    },

    #[error("previous-hash mismatch at seq {seq}")]
    PrevHashMismatch { seq: i32 },

    #[error("hash mismatch at seq {seq}")]
    HashMismatch { seq: i32 },
}

/// Compute the chained hash of one event row.
///
/// Input layout: `prev_hash | ticket_id | type | created_at | seq | payload`
/// joined with `|`, where `created_at` is RFC3339 UTC with fixed nanosecond
/// precision. The digest is hex-encoded lowercase.
#[must_use]
pub fn compute_event_hash(
    prev_hash: &str,
    ticket_id: Uuid,
    event_type: &str,
    payload: &[u8],
    created_at: DateTime<Utc>,
    seq: i32,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(ticket_id.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(event_type.as_bytes());
    hasher.update(b"|");
    hasher.update(
        created_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.update(b"|");
    hasher.update(seq.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Serialize a payload to the exact bytes covered by the hash.
///
/// `serde_json::Value` objects order keys deterministically, so the same
/// payload always hashes identically.
#[must_use]
pub fn payload_bytes(payload: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(payload).unwrap_or_default()
}

/// Verify seq contiguity and the full hash chain of one ticket's events.
///
/// `events` must be ordered by `ticket_seq` ascending, starting at 1.
///
/// # Errors
///
/// Returns the first [`ChainError`] encountered walking the log.
pub fn verify_chain(events: &[TicketEvent]) -> Result<(), ChainError> {
    if events.is_empty() {
        return Err(ChainError::Empty);
    }

    let mut prev_hash = String::new();
    for (position, event) in events.iter().enumerate() {
        let expected_seq = i32::try_from(position).unwrap_or(i32::MAX) + 1;
        if event.ticket_seq != expected_seq {
            return Err(ChainError::SequenceGap {
                position,
                expected: expected_seq,
                found: event.ticket_seq,
            });
        }
        if event.prev_hash != prev_hash {
            return Err(ChainError::PrevHashMismatch {
                seq: event.ticket_seq,
            });
        }
        let recomputed = compute_event_hash(
            &event.prev_hash,
            event.ticket_id,
            &event.event_type,
            &payload_bytes(&event.payload),
            event.created_at,
            event.ticket_seq,
        );
        if recomputed != event.hash {
            return Err(ChainError::HashMismatch {
                seq: event.ticket_seq,
            });
        }
        prev_hash = event.hash.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain_of(n: i32) -> Vec<TicketEvent> {
        let ticket_id = Uuid::new_v4();
        let mut prev = String::new();
        let mut events = Vec::new();
        for seq in 1..=n {
            let payload = json!({"ticket_id": ticket_id, "seq": seq});
            let created_at = Utc::now();
            let hash = compute_event_hash(
                &prev,
                ticket_id,
                "ticket.created",
                &payload_bytes(&payload),
                created_at,
                seq,
            );
            events.push(TicketEvent {
                ticket_id,
                ticket_seq: seq,
                event_type: "ticket.created".to_string(),
                payload,
                created_at,
                prev_hash: prev.clone(),
                hash: hash.clone(),
            });
            prev = hash;
        }
        events
    }

    #[test]
    fn hash_is_deterministic() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        let a = compute_event_hash("", id, "ticket.created", b"{}", at, 1);
        let b = compute_event_hash("", id, "ticket.created", b"{}", at, 1);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_covers_every_field() {
        let id = Uuid::new_v4();
        let at = Utc::now();
        let base = compute_event_hash("", id, "ticket.created", b"{}", at, 1);
        assert_ne!(base, compute_event_hash("x", id, "ticket.created", b"{}", at, 1));
        assert_ne!(base, compute_event_hash("", id, "ticket.called", b"{}", at, 1));
        assert_ne!(base, compute_event_hash("", id, "ticket.created", b"{\"a\":1}", at, 1));
        assert_ne!(base, compute_event_hash("", id, "ticket.created", b"{}", at, 2));
    }

    #[test]
    fn valid_chain_verifies() {
        let events = chain_of(4);
        assert_eq!(verify_chain(&events), Ok(()));
    }

    #[test]
    fn empty_log_is_rejected() {
        assert_eq!(verify_chain(&[]), Err(ChainError::Empty));
    }

    #[test]
    fn tampered_payload_is_detected() {
        let mut events = chain_of(3);
        events[1].payload = json!({"forged": true});
        assert_eq!(
            verify_chain(&events),
            Err(ChainError::HashMismatch { seq: 2 })
        );
    }

    #[test]
    fn sequence_gap_is_detected() {
        let mut events = chain_of(3);
        events.remove(1);
        assert_eq!(
            verify_chain(&events),
            Err(ChainError::SequenceGap {
                position: 1,
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn broken_link_is_detected() {
        let mut events = chain_of(3);
        events[2].prev_hash = "0".repeat(64);
        assert_eq!(
            verify_chain(&events),
            Err(ChainError::PrevHashMismatch { seq: 3 })
        );
    }
}
