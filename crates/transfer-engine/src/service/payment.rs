//! # Payment Gate
//!
//! Issues payment tickets bound to block hashes and decides whether a
//! batch of blocks may be released to a peer.
//!
//! ## Release policy
//!
//! A batch is released only if:
//! 1. every requested hash is reserved on the ticket (all-or-nothing), and
//! 2. the chain reports a contract event for the given transaction whose
//!    notifications carry exactly this payment id.
//!
//! Only the payment id is compared. Amount and sender are not checked.

use super::{SharedStore, TaskStore};
use crate::domain::entities::PaymentTicket;
use crate::domain::errors::TransferError;
use crate::domain::value_objects::{Authorization, PaymentQuote, TransferConfig};
use crate::ports::outbound::{
    BatchOperation, ContractEvent, IdSource, KeyValueStore, PaymentChain, RecordSerializer, TimeSource,
};
use shared_types::{BlockHash, PaymentId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct PaymentGate<KV, S, C>
where
    KV: KeyValueStore,
    S: RecordSerializer,
    C: PaymentChain,
{
    store: SharedStore<KV, S>,
    chain: Arc<C>,
    time_source: Arc<dyn TimeSource>,
    id_source: Arc<dyn IdSource>,
    config: TransferConfig,
}

impl<KV, S, C> PaymentGate<KV, S, C>
where
    KV: KeyValueStore,
    S: RecordSerializer,
    C: PaymentChain,
{
    pub fn new(
        store: SharedStore<KV, S>,
        chain: Arc<C>,
        time_source: Arc<dyn TimeSource>,
        id_source: Arc<dyn IdSource>,
        config: TransferConfig,
    ) -> Self {
        Self {
            store,
            chain,
            time_source,
            id_source,
            config,
        }
    }

    /// Reserve `hashes` under a fresh payment id and price them.
    pub fn issue_ticket(&self, hashes: &[BlockHash]) -> Result<PaymentQuote, TransferError> {
        if hashes.is_empty() {
            return Err(TransferError::parameter("hashes must not be empty"));
        }

        let amount_due = hashes.len() as u64 * self.config.block_size_bytes;
        let mut store = self.store.lock();

        for _ in 0..self.config.max_id_attempts {
            let payment_id = self.id_source.next_id();
            if store.ticket_exists(payment_id)? {
                debug!(payment_id, "[transfer] payment id collision, retrying");
                continue;
            }

            let ticket = PaymentTicket {
                payment_id,
                reserved_hashes: hashes.to_vec(),
                amount_due,
                created_at: self.time_source.now(),
            };
            store.put_ticket(&ticket)?;

            info!(payment_id, blocks = hashes.len(), amount_due, "[transfer] 💳 payment ticket issued");
            return Ok(PaymentQuote {
                payment_id,
                amount_due,
            });
        }

        Err(TransferError::IdExhausted {
            attempts: self.config.max_id_attempts,
        })
    }

    /// Split `requested` into positions the ticket covers and hashes it
    /// does not. A spent ticket covers nothing.
    pub fn check_authorized(&self, payment_id: PaymentId, requested: &[BlockHash]) -> Result<Authorization, TransferError> {
        let ticket = self
            .store
            .lock()
            .get_ticket(payment_id)?
            .ok_or(TransferError::TicketNotFound(payment_id))?;
        Ok(authorize(&ticket, requested))
    }

    /// Spend the ticket after its blocks were handed over.
    ///
    /// The ticket key is kept; later checks report nothing outstanding.
    /// Fails with `PaymentUnauthorized` if `delivered` names a hash the
    /// ticket no longer reserves.
    pub fn release(&self, payment_id: PaymentId, delivered: &[BlockHash]) -> Result<(), TransferError> {
        let mut store = self.store.lock();
        let op = spend_operation(&*store, payment_id, delivered)?;
        store.commit(vec![op])?;
        info!(payment_id, delivered = delivered.len(), "[transfer] payment ticket spent");
        Ok(())
    }

    /// Confirm on chain that `tx_hash` paid `payment_id`.
    pub async fn verify_payment(&self, payment_id: PaymentId, tx_hash: &str) -> Result<ContractEvent, TransferError> {
        let event = self
            .chain
            .smart_contract_event(tx_hash)
            .await?
            .ok_or_else(|| TransferError::PaymentUnauthorized {
                payment_id,
                reason: format!("no contract event for transaction {tx_hash}"),
            })?;

        if !event.carries_payment(payment_id) {
            warn!(payment_id, tx_hash, "[transfer] ⚠️ transaction does not carry payment id");
            return Err(TransferError::PaymentUnauthorized {
                payment_id,
                reason: format!("transaction {tx_hash} does not carry this payment id"),
            });
        }

        if self.config.required_confirmations > 0 {
            let target = event.height.saturating_add(self.config.required_confirmations);
            tokio::time::timeout(
                self.config.confirmation_timeout,
                self.chain.wait_for_confirmation(target),
            )
            .await
            .map_err(|_| {
                TransferError::ChainError(format!(
                    "transaction {tx_hash} not confirmed at height {target} within {:?}",
                    self.config.confirmation_timeout
                ))
            })??;
        }

        debug!(payment_id, tx_hash, height = event.height, amount_checked = false, "[transfer] payment verified");
        Ok(event)
    }

    /// Full gate: ticket coverage first, then the on-chain proof.
    ///
    /// Any uncovered hash rejects the whole batch.
    pub async fn authorize_release(
        &self,
        payment_id: PaymentId,
        tx_hash: &str,
        requested: &[BlockHash],
    ) -> Result<Authorization, TransferError> {
        let authorization = self.check_authorized(payment_id, requested)?;
        if !authorization.is_complete() {
            warn!(
                payment_id,
                unauthorized = authorization.unauthorized_hashes.len(),
                "[transfer] ⚠️ download rejected: hashes not covered by ticket"
            );
            return Err(TransferError::PaymentUnauthorized {
                payment_id,
                reason: format!(
                    "{} of {} requested blocks are not covered by the ticket",
                    authorization.unauthorized_hashes.len(),
                    requested.len()
                ),
            });
        }

        self.verify_payment(payment_id, tx_hash).await?;
        Ok(authorization)
    }
}

fn authorize(ticket: &PaymentTicket, requested: &[BlockHash]) -> Authorization {
    let reserved: HashSet<&str> = ticket.reserved_hashes.iter().map(String::as_str).collect();
    let mut authorization = Authorization::default();
    for (position, hash) in requested.iter().enumerate() {
        if reserved.contains(hash.as_str()) {
            authorization.authorized_indexes.push(position);
        } else {
            authorization.unauthorized_hashes.push(hash.clone());
        }
    }
    authorization
}

/// Batch operation that rewrites ticket `payment_id` as spent.
///
/// Every hash in `delivered` must still be reserved, so a ticket cannot
/// pay for two deliveries.
pub(crate) fn spend_operation<KV, S>(
    store: &TaskStore<KV, S>,
    payment_id: PaymentId,
    delivered: &[BlockHash],
) -> Result<BatchOperation, TransferError>
where
    KV: KeyValueStore,
    S: RecordSerializer,
{
    let mut ticket = store
        .get_ticket(payment_id)?
        .ok_or(TransferError::TicketNotFound(payment_id))?;

    let authorization = authorize(&ticket, delivered);
    if !authorization.is_complete() {
        return Err(TransferError::PaymentUnauthorized {
            payment_id,
            reason: format!(
                "{} delivered blocks are not reserved on the ticket",
                authorization.unauthorized_hashes.len()
            ),
        });
    }

    ticket.spend();
    store.ticket_operation(&ticket)
}
