//! Ticket Ledger: the single owner of ticket records and their reservation
//! state. Every hold is taken and dropped through the optimistic versioning
//! here; nothing else in the system mutates a ticket.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::Ticket;

/// Proof of a successful `reserve`, carrying the version the write produced.
#[derive(Debug, Clone, Copy)]
pub struct Reservation {
    pub ticket_id: Uuid,
    pub order_id: Uuid,
    pub version: u64,
}

/// In-memory ticket store. Critical sections are short and never await, so a
/// plain `std::sync::RwLock` is enough; conflicting writers fail fast via the
/// version check instead of queueing.
#[derive(Default)]
pub struct TicketLedger {
    tickets: RwLock<HashMap<Uuid, Ticket>>,
}

impl TicketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ticket: Ticket) -> Uuid {
        let id = ticket.id;
        self.tickets.write().unwrap().insert(id, ticket);
        id
    }

    pub fn get(&self, ticket_id: Uuid) -> Result<Ticket, CoreError> {
        self.tickets
            .read()
            .unwrap()
            .get(&ticket_id)
            .cloned()
            .ok_or(CoreError::TicketNotFound(ticket_id))
    }

    pub fn list(&self) -> Vec<Ticket> {
        let mut all: Vec<Ticket> = self.tickets.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title));
        all
    }

    /// Attempts to place a hold for `order_id`.
    ///
    /// With `expected_version` the write succeeds only if the ticket still
    /// carries that version; without it, only if no hold currently exists.
    /// Either way a sold or held ticket yields `Conflict`. This check is the
    /// sole double-sell guard: of any number of concurrent callers, exactly
    /// one lands its write, the rest observe `Conflict`.
    pub fn reserve(
        &self,
        ticket_id: Uuid,
        order_id: Uuid,
        expected_version: Option<u64>,
    ) -> Result<Reservation, CoreError> {
        let mut tickets = self.tickets.write().unwrap();
        let ticket = tickets
            .get_mut(&ticket_id)
            .ok_or(CoreError::TicketNotFound(ticket_id))?;

        if let Some(expected) = expected_version {
            if ticket.version != expected {
                debug!(%ticket_id, expected, actual = ticket.version, "reserve version mismatch");
                return Err(CoreError::Conflict);
            }
        }
        if !ticket.is_available() {
            return Err(CoreError::Conflict);
        }

        ticket.reserving_order_id = Some(order_id);
        ticket.version += 1;
        debug!(%ticket_id, %order_id, version = ticket.version, "ticket reserved");

        Ok(Reservation {
            ticket_id,
            order_id,
            version: ticket.version,
        })
    }

    /// Drops the hold iff `order_id` still owns it. Releasing a ticket the
    /// order no longer holds is a no-op, not an error: the expiry and
    /// payment-failure paths may race and both try to release.
    ///
    /// Returns the ticket version after the call.
    pub fn release(&self, ticket_id: Uuid, order_id: Uuid) -> Result<u64, CoreError> {
        let mut tickets = self.tickets.write().unwrap();
        let ticket = tickets
            .get_mut(&ticket_id)
            .ok_or(CoreError::TicketNotFound(ticket_id))?;

        if ticket.reserving_order_id == Some(order_id) {
            ticket.reserving_order_id = None;
            ticket.version += 1;
            debug!(%ticket_id, %order_id, version = ticket.version, "hold released");
        }
        Ok(ticket.version)
    }

    /// Makes the hold permanent: the ticket is sold to `order_id`. Fails with
    /// `NotHeld` if the order is not the current holder — that is an internal
    /// invariant violation, not a user-facing outcome.
    ///
    /// Returns the ticket version after the call.
    pub fn confirm(&self, ticket_id: Uuid, order_id: Uuid) -> Result<u64, CoreError> {
        let mut tickets = self.tickets.write().unwrap();
        let ticket = tickets
            .get_mut(&ticket_id)
            .ok_or(CoreError::TicketNotFound(ticket_id))?;

        // Re-delivered confirm after a completed sale: nothing to do.
        if ticket.sold_order_id == Some(order_id) {
            return Ok(ticket.version);
        }
        if ticket.reserving_order_id != Some(order_id) {
            error!(%ticket_id, %order_id, "confirm by non-holder, this is a defect");
            return Err(CoreError::NotHeld { ticket_id, order_id });
        }

        ticket.sold_order_id = Some(order_id);
        ticket.reserving_order_id = None;
        ticket.version += 1;
        debug!(%ticket_id, %order_id, version = ticket.version, "ticket sold");
        Ok(ticket.version)
    }
}
