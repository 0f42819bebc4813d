//! HTTP handlers for the ticket surface.

pub mod queues;
pub mod tickets;
