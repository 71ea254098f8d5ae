// src/poller.rs
use std::time::Duration;

use ethers::types::H256;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bundler::BundlerApi;
use crate::config::{DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL};
use crate::error::BundlerError;
use crate::operation::Outcome;

/// Bounded receipt polling. Never blocks longer than `interval * max_attempts`.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPoller {
    interval: Duration,
    max_attempts: u32,
}

impl Default for ConfirmationPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_POLL_ATTEMPTS)
    }
}

impl ConfirmationPoller {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub async fn poll<B: BundlerApi + ?Sized>(&self, bundler: &B, user_op_hash: H256) -> Outcome {
        self.poll_with(bundler, user_op_hash, |_| {}).await
    }

    /// Sleeps, then asks for the receipt, up to `max_attempts` times. A lookup
    /// error counts as an attempt with no receipt; undecodable receipts are
    /// logged at warn level.
    pub async fn poll_with<B, F>(&self, bundler: &B, user_op_hash: H256, mut on_attempt: F) -> Outcome
    where
        B: BundlerApi + ?Sized,
        F: FnMut(u32) + Send,
    {
        for attempt in 1..=self.max_attempts {
            sleep(self.interval).await;
            on_attempt(attempt);

            match bundler.get_user_operation_receipt(user_op_hash).await {
                Ok(Some(receipt)) if receipt.success => {
                    info!(
                        "User operation {:?} confirmed in {:?}",
                        user_op_hash, receipt.transaction_hash
                    );
                    return Outcome::Confirmed(receipt);
                }
                Ok(Some(receipt)) => {
                    warn!(
                        "User operation {:?} reverted: {}",
                        user_op_hash,
                        receipt.reason.as_deref().unwrap_or("no reason given")
                    );
                    return Outcome::Failed(receipt);
                }
                Ok(None) => {
                    debug!("Receipt for {:?} not available yet ({}/{})", user_op_hash, attempt, self.max_attempts);
                }
                Err(err @ BundlerError::InvalidResponse(_)) => {
                    warn!("Receipt for {:?} could not be decoded ({}/{}): {}", user_op_hash, attempt, self.max_attempts, err);
                }
                Err(err) => {
                    debug!("Receipt lookup for {:?} failed ({}/{}): {}", user_op_hash, attempt, self.max_attempts, err);
                }
            }
        }

        warn!(
            "No receipt for {:?} after {} attempts, leaving it pending",
            user_op_hash, self.max_attempts
        );
        Outcome::Pending { user_op_hash }
    }
}
