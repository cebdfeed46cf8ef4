//! Expiry Sweeper
//!
//! Background worker that marks overdue PENDING transfers as EXPIRED.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::config::ExpirySweepConfig;
use crate::error::LedgerError;
use crate::settlement::SettlementCoordinator;

/// Expiry Sweeper
///
/// Accept already refuses overdue transfers on its own; the sweeper makes
/// the EXPIRED status visible to listings without waiting for an accept.
pub struct ExpirySweeper {
    coordinator: Arc<SettlementCoordinator>,
    config: ExpirySweepConfig,
}

impl ExpirySweeper {
    pub fn new(coordinator: Arc<SettlementCoordinator>, config: ExpirySweepConfig) -> Self {
        Self {
            coordinator,
            config,
        }
    }

    pub fn with_defaults(coordinator: Arc<SettlementCoordinator>) -> Self {
        Self::new(coordinator, ExpirySweepConfig::default())
    }

    /// Run the sweep loop forever
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval_secs,
            batch_size = self.config.batch_size,
            "Starting expiry sweeper"
        );

        loop {
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Expiry sweep failed");
            }

            tokio::time::sleep(self.config.scan_interval()).await;
        }
    }

    /// Run a single sweep, returning how many transfers were expired
    pub async fn sweep_once(&self) -> Result<usize, LedgerError> {
        self.coordinator
            .expire_overdue(Utc::now(), self.config.batch_size)
            .await
    }
}
