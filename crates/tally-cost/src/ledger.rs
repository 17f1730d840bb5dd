// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage recording.
//!
//! Every reported interaction is priced, stamped with the current time and
//! appended to the ledger. Persistence is best effort: a failed or timed-out
//! append is logged at `error` and the priced event is still returned, marked
//! as not persisted.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_core::types::DEFAULT_REQUEST_CATEGORY;
use tally_core::{Clock, LedgerStore, SystemClock, UsageEvent, with_deadline};
use tracing::{error, info};

use crate::pricing::PriceTable;

/// Default bound on a single ledger call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// A priced usage event and whether the ledger accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedUsage {
    #[serde(flatten)]
    pub event: UsageEvent,
    pub persisted: bool,
}

/// Prices usage and appends it to a [`LedgerStore`].
pub struct UsageLedger {
    store: Arc<dyn LedgerStore>,
    prices: Arc<PriceTable>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn LedgerStore>, prices: Arc<PriceTable>) -> Self {
        Self {
            store,
            prices,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Price and persist one interaction.
    ///
    /// `request_category` defaults to `text-completion`. Store failures do
    /// not surface as errors; check [`RecordedUsage::persisted`].
    pub async fn record_usage(
        &self,
        user_id: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        request_category: Option<&str>,
    ) -> RecordedUsage {
        let cost = self.prices.price(model, input_tokens, output_tokens);
        let event = UsageEvent::new(
            user_id,
            model,
            input_tokens,
            output_tokens,
            cost,
            request_category.unwrap_or(DEFAULT_REQUEST_CATEGORY),
            self.clock.now(),
        );

        let persisted = match with_deadline(self.timeout, self.store.append(&event)).await {
            Ok(()) => {
                info!(
                    user_id = %event.user_id,
                    model = %event.model,
                    total_tokens = event.total_tokens,
                    total_cost = %event.total_cost,
                    "usage recorded"
                );
                true
            }
            Err(e) => {
                error!(
                    user_id = %event.user_id,
                    event_id = %event.id,
                    model = %event.model,
                    total_tokens = event.total_tokens,
                    error = %e,
                    "failed to persist usage event"
                );
                false
            }
        };

        RecordedUsage { event, persisted }
    }
}
