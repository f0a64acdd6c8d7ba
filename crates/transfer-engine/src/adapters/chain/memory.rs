use crate::domain::errors::ChainClientError;
use crate::ports::outbound::{ContractEvent, Notification, PaymentChain};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::PaymentId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// In-process chain for tests: events are registered by hand and the
/// height is advanced explicitly.
#[derive(Debug)]
pub struct InMemoryPaymentChain {
    events: RwLock<HashMap<String, ContractEvent>>,
    height: watch::Sender<u64>,
    unavailable: AtomicBool,
}

impl Default for InMemoryPaymentChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPaymentChain {
    pub fn new() -> Self {
        let (height, _) = watch::channel(0);
        Self {
            events: RwLock::new(HashMap::new()),
            height,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Register a payment transaction at the current height.
    pub fn record_payment(&self, tx_hash: &str, payment_id: PaymentId) {
        let event = ContractEvent {
            tx_hash: tx_hash.to_string(),
            height: self.current_height(),
            notifications: vec![Notification {
                contract_address: "payment".to_string(),
                states: serde_json::json!({ "paymentId": payment_id }),
            }],
        };
        self.insert_event(event);
    }

    pub fn insert_event(&self, event: ContractEvent) {
        self.events.write().insert(event.tx_hash.clone(), event);
    }

    pub fn current_height(&self) -> u64 {
        *self.height.borrow()
    }

    pub fn advance_height(&self, blocks: u64) {
        self.height.send_modify(|h| *h += blocks);
    }

    /// Make every call fail, simulating an unreachable node.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), ChainClientError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChainClientError::new("chain node unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentChain for InMemoryPaymentChain {
    async fn smart_contract_event(&self, tx_hash: &str) -> Result<Option<ContractEvent>, ChainClientError> {
        self.check_available()?;
        Ok(self.events.read().get(tx_hash).cloned())
    }

    async fn wait_for_confirmation(&self, height: u64) -> Result<(), ChainClientError> {
        self.check_available()?;
        let mut rx = self.height.subscribe();
        rx.wait_for(|current| *current >= height)
            .await
            .map_err(|e| ChainClientError::new(e.to_string()))?;
        Ok(())
    }
}
