//! Cross-engine capabilities
//!
//! A passed liquidation vote must trigger the payout engine and permanently
//! disable the crowdsale. The voting engine receives both capabilities at
//! construction; the engines themselves are shared as [`Shared`] handles so
//! every call runs inside that engine's own critical section.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::crowdsale::CrowdsaleEngine;
use crate::errors::LiquidationError;
use crate::liquidation::LiquidationEngine;

/// Engine handle shared between callers; one lock per engine.
pub type Shared<T> = Arc<Mutex<T>>;

/// Wrap an engine into a [`Shared`] handle.
pub fn shared<T>(engine: T) -> Shared<T> {
    Arc::new(Mutex::new(engine))
}

/// Switches the liquidation payout engine on.
pub trait LiquidationTrigger: Send + Sync {
    /// Fails if liquidation was already triggered.
    fn trigger_liquidation(&self) -> Result<(), LiquidationError>;
}

/// Permanently blocks further sale rounds. Idempotent.
pub trait SaleDisabler: Send + Sync {
    fn disable_sale(&self);
}

/// Capabilities invoked when a liquidation proposal passes.
#[derive(Clone)]
pub struct VotingHooks {
    pub liquidator: Arc<dyn LiquidationTrigger>,
    pub crowdsale: Arc<dyn SaleDisabler>,
}

impl VotingHooks {
    pub fn new(liquidator: Arc<dyn LiquidationTrigger>, crowdsale: Arc<dyn SaleDisabler>) -> Self {
        Self {
            liquidator,
            crowdsale,
        }
    }
}

impl std::fmt::Debug for VotingHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VotingHooks")
    }
}

impl LiquidationTrigger for Mutex<LiquidationEngine> {
    fn trigger_liquidation(&self) -> Result<(), LiquidationError> {
        self.lock().trigger().map(|_| ())
    }
}

impl SaleDisabler for Mutex<CrowdsaleEngine> {
    fn disable_sale(&self) {
        self.lock().disable();
    }
}
