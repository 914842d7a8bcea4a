//! Calculated registers
//!
//! A calculated register maps formula variables to source register ids and
//! re-evaluates on its own interval, writing results back into the value
//! store like any physical register. Formulas are compiled once when the
//! runner is built; a formula that does not compile is a startup error,
//! not a runtime surprise. An evaluation failure emits nothing, so the
//! last stored value stays in place until inputs recover.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AcqError, AcqResult};
use crate::events::{Event, EventBus};
use crate::model::{CalculatedRegisterConfig, Sample};
use crate::store::ValueStore;
use gridlink_calc::Formula;

/// One compiled calculated register.
pub struct CalcRegister {
    config: CalculatedRegisterConfig,
    formula: Formula,
}

impl CalcRegister {
    /// Compile the formula and check every variable has an input mapping.
    pub fn new(config: CalculatedRegisterConfig) -> AcqResult<Self> {
        config.validate()?;
        let formula = Formula::compile(&config.formula)?;
        for var in formula.variables() {
            if !config.inputs.contains_key(&var) {
                return Err(AcqError::validation(format!(
                    "Calculated register '{}': variable '{}' has no input mapping",
                    config.name, var
                )));
            }
        }
        Ok(Self { config, formula })
    }

    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn config(&self) -> &CalculatedRegisterConfig {
        &self.config
    }

    /// Evaluate against the latest good samples. A missing or bad input is
    /// an error; the caller keeps the previously stored value instead of
    /// emitting a stale or partial result.
    pub fn evaluate(&self, store: &ValueStore) -> AcqResult<Sample> {
        let mut vars = HashMap::with_capacity(self.config.inputs.len());
        for (name, register_id) in &self.config.inputs {
            match store.latest_good(*register_id) {
                Some(sample) => {
                    vars.insert(name.clone(), sample.value);
                },
                None => {
                    return Err(AcqError::formula(format!(
                        "Calculated register '{}': input '{}' (register {}) has no good value",
                        self.config.name, name, register_id
                    )));
                },
            }
        }

        let value = self.formula.evaluate(&vars)?;
        Ok(Sample::good(self.config.id, 0, value, value)
            .with_source(&self.config.name, &self.config.unit))
    }
}

/// Long-running evaluation task for one calculated register.
pub struct CalcPoller {
    pub calc: CalcRegister,
    pub store: Arc<ValueStore>,
    pub events: EventBus,
}

impl CalcPoller {
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(Duration::from_millis(self.calc.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            calc = %self.calc.config.name,
            interval_ms = self.calc.config.interval_ms,
            "Calc poller started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(calc = %self.calc.config.name, "Calc poller stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.calc.evaluate(&self.store) {
                Ok(sample) => {
                    self.store.update(sample.clone());
                    self.events.publish(Event::Sample(sample));
                },
                Err(err) => {
                    // Last stored value stays; inputs may recover next tick
                    warn!(calc = %self.calc.config.name, error = %err, "Evaluation skipped");
                },
            }
        }
    }
}
