// src/events.rs
use std::sync::Mutex;

use ethers::types::{Address, H256, U256};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::Degradation;
use crate::types::UserOperationReceipt;

/// Progress notifications emitted by a running pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    AccountResolved { address: Address, deployed: bool },
    Degraded(Degradation),
    Signed { hash: H256 },
    Submitted { user_op_hash: H256 },
    PollAttempt { user_op_hash: H256, attempt: u32 },
    Confirmed(UserOperationReceipt),
    Failed(UserOperationReceipt),
    Pending { user_op_hash: H256 },
    /// The account must receive native currency before the operation can be resubmitted.
    FundingNeeded { address: Address, required: U256 },
    AccountDeployed { address: Address },
}

/// Fan-out to every subscriber. Dropped receivers are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<PipelineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<PipelineEvent> {
        let (tx, rx) = unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
