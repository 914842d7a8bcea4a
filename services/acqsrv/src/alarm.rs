//! Alarm engine
//!
//! Evaluates alarm conditions against incoming samples with a two-state
//! machine per alarm. An alarm raises the moment its condition is met and
//! clears only once the value has recrossed the threshold by the
//! configured hysteresis, so chatter around the threshold produces one
//! transition instead of a stream of them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::{AcqError, AcqResult};
use crate::model::{AlarmCondition, AlarmConfig, AlarmEvent, AlarmTransition, Sample};

/// Tolerance for the Equals condition on floating point samples.
const EQUALS_EPSILON: f64 = 1e-3;

/// Runtime state of one alarm.
#[derive(Debug, Clone)]
pub struct AlarmState {
    pub active: bool,
    pub acknowledged: bool,
    pub since: DateTime<Utc>,
    pub last_value: f64,
}

impl AlarmCondition {
    /// Condition met exactly at the configured threshold, no margin.
    fn triggered(&self, value: f64) -> bool {
        match *self {
            Self::GreaterThan { threshold } => value > threshold,
            Self::LessThan { threshold } => value < threshold,
            Self::OutOfRange { low, high } => value < low || value > high,
            Self::Equals { target } => (value - target).abs() <= EQUALS_EPSILON,
            Self::NotEquals { target } => (value - target).abs() > EQUALS_EPSILON,
        }
    }

    /// Back on the safe side of the threshold by at least `hysteresis`.
    fn recovered(&self, value: f64, hysteresis: f64) -> bool {
        match *self {
            Self::GreaterThan { threshold } => value <= threshold - hysteresis,
            Self::LessThan { threshold } => value >= threshold + hysteresis,
            Self::OutOfRange { low, high } => {
                value >= low + hysteresis && value <= high - hysteresis
            },
            Self::Equals { target } => (value - target).abs() > EQUALS_EPSILON + hysteresis,
            // Hysteresis tightens the equality window the value must
            // return to before the alarm clears
            Self::NotEquals { target } => {
                (value - target).abs() <= (EQUALS_EPSILON - hysteresis).max(0.0)
            },
        }
    }
}

/// Holds all alarm configs and their live states.
pub struct AlarmEngine {
    by_register: HashMap<u32, Vec<AlarmConfig>>,
    states: DashMap<u32, AlarmState>,
}

impl AlarmEngine {
    pub fn new(alarms: &[AlarmConfig]) -> Self {
        let mut by_register: HashMap<u32, Vec<AlarmConfig>> = HashMap::new();
        for alarm in alarms.iter().filter(|a| a.enabled) {
            by_register
                .entry(alarm.register_id)
                .or_default()
                .push(alarm.clone());
        }
        Self {
            by_register,
            states: DashMap::new(),
        }
    }

    /// Feed one sample through every alarm watching its register and return
    /// the transitions it caused. Bad samples leave alarm states untouched.
    pub fn process(&self, sample: &Sample) -> Vec<AlarmEvent> {
        if !sample.is_good() {
            return Vec::new();
        }
        let Some(alarms) = self.by_register.get(&sample.register_id) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for alarm in alarms {
            let mut state = self.states.entry(alarm.id).or_insert_with(|| AlarmState {
                active: false,
                acknowledged: false,
                since: sample.timestamp,
                last_value: sample.value,
            });
            state.last_value = sample.value;

            if !state.active && alarm.condition.triggered(sample.value) {
                state.active = true;
                state.acknowledged = false;
                state.since = sample.timestamp;
                warn!(
                    alarm = %alarm.name,
                    value = sample.value,
                    severity = ?alarm.severity,
                    "Alarm raised"
                );
                events.push(AlarmEvent {
                    alarm_id: alarm.id,
                    register_id: alarm.register_id,
                    kind: AlarmTransition::Raised,
                    severity: alarm.severity,
                    value: sample.value,
                    timestamp: sample.timestamp,
                });
            } else if state.active && alarm.condition.recovered(sample.value, alarm.hysteresis) {
                state.active = false;
                state.since = sample.timestamp;
                info!(alarm = %alarm.name, value = sample.value, "Alarm cleared");
                events.push(AlarmEvent {
                    alarm_id: alarm.id,
                    register_id: alarm.register_id,
                    kind: AlarmTransition::Cleared,
                    severity: alarm.severity,
                    value: sample.value,
                    timestamp: sample.timestamp,
                });
            }
        }
        events
    }

    /// Acknowledge an active alarm.
    pub fn acknowledge(&self, alarm_id: u32) -> AcqResult<()> {
        let mut state = self
            .states
            .get_mut(&alarm_id)
            .ok_or_else(|| AcqError::not_found(format!("Alarm {alarm_id}")))?;
        if !state.active {
            return Err(AcqError::validation(format!(
                "Alarm {alarm_id} is not active"
            )));
        }
        state.acknowledged = true;
        info!(alarm_id, "Alarm acknowledged");
        Ok(())
    }

    pub fn state(&self, alarm_id: u32) -> Option<AlarmState> {
        self.states.get(&alarm_id).map(|s| s.clone())
    }

    /// Ids of currently active alarms.
    pub fn active_alarms(&self) -> Vec<u32> {
        self.states
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::model::{Quality, Severity};

    fn greater_than(threshold: f64, hysteresis: f64) -> AlarmConfig {
        AlarmConfig {
            id: 1,
            register_id: 10,
            name: "hi".into(),
            condition: AlarmCondition::GreaterThan { threshold },
            hysteresis,
            severity: Severity::Warning,
            enabled: true,
        }
    }

    fn sample(value: f64) -> Sample {
        Sample::good(10, 1, value, value)
    }

    fn transitions(engine: &AlarmEngine, values: &[f64]) -> Vec<AlarmTransition> {
        values
            .iter()
            .flat_map(|&v| engine.process(&sample(v)))
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_raise_at_threshold_clear_with_margin() {
        let engine = AlarmEngine::new(&[greater_than(80.0, 2.0)]);
        // 81 raises; 79 is inside the hysteresis band; 78 clears
        let t = transitions(&engine, &[75.0, 81.0, 79.0, 78.0]);
        assert_eq!(t, vec![AlarmTransition::Raised, AlarmTransition::Cleared]);
    }

    #[test]
    fn test_chatter_in_band_emits_single_raise() {
        let engine = AlarmEngine::new(&[greater_than(80.0, 2.0)]);
        let t = transitions(&engine, &[81.0, 79.5, 80.5, 79.0, 80.9]);
        assert_eq!(t, vec![AlarmTransition::Raised]);
    }

    #[test]
    fn test_zero_hysteresis_clears_at_threshold() {
        let engine = AlarmEngine::new(&[greater_than(80.0, 0.0)]);
        let t = transitions(&engine, &[81.0, 80.0]);
        assert_eq!(t, vec![AlarmTransition::Raised, AlarmTransition::Cleared]);
    }

    #[test]
    fn test_less_than_condition() {
        let mut alarm = greater_than(0.0, 1.0);
        alarm.condition = AlarmCondition::LessThan { threshold: 10.0 };
        let engine = AlarmEngine::new(&[alarm]);
        let t = transitions(&engine, &[12.0, 9.0, 10.5, 11.5]);
        assert_eq!(t, vec![AlarmTransition::Raised, AlarmTransition::Cleared]);
    }

    #[test]
    fn test_out_of_range_clears_inside_margin() {
        let mut alarm = greater_than(0.0, 1.0);
        alarm.condition = AlarmCondition::OutOfRange {
            low: 10.0,
            high: 20.0,
        };
        let engine = AlarmEngine::new(&[alarm]);
        // 21 raises (above high); 19.5 inside band; 18.5 clears
        let t = transitions(&engine, &[15.0, 21.0, 19.5, 18.5]);
        assert_eq!(t, vec![AlarmTransition::Raised, AlarmTransition::Cleared]);
        // Dropping below low raises again
        let t = transitions(&engine, &[9.0, 10.5, 11.5]);
        assert_eq!(t, vec![AlarmTransition::Raised, AlarmTransition::Cleared]);
    }

    #[test]
    fn test_equals_condition_uses_epsilon() {
        let mut alarm = greater_than(0.0, 0.5);
        alarm.condition = AlarmCondition::Equals { target: 3.0 };
        let engine = AlarmEngine::new(&[alarm]);
        let t = transitions(&engine, &[1.0, 3.0005, 3.2, 4.0]);
        assert_eq!(t, vec![AlarmTransition::Raised, AlarmTransition::Cleared]);
    }

    #[test]
    fn test_not_equals_condition() {
        let mut alarm = greater_than(0.0, 0.0);
        alarm.condition = AlarmCondition::NotEquals { target: 3.0 };
        let engine = AlarmEngine::new(&[alarm]);
        // On target: quiet; deviation raises; back within epsilon clears
        let t = transitions(&engine, &[3.0, 5.0, 3.0005]);
        assert_eq!(t, vec![AlarmTransition::Raised, AlarmTransition::Cleared]);
    }

    #[test]
    fn test_bad_samples_do_not_change_state() {
        let engine = AlarmEngine::new(&[greater_than(80.0, 2.0)]);
        assert_eq!(engine.process(&sample(85.0)).len(), 1);

        let mut bad = sample(0.0);
        bad.quality = Quality::Bad;
        assert!(engine.process(&bad).is_empty());
        assert!(engine.state(1).unwrap().active);
    }

    #[test]
    fn test_acknowledge_flow() {
        let engine = AlarmEngine::new(&[greater_than(80.0, 2.0)]);
        assert!(matches!(
            engine.acknowledge(1),
            Err(AcqError::NotFound(_))
        ));

        engine.process(&sample(85.0));
        engine.acknowledge(1).unwrap();
        assert!(engine.state(1).unwrap().acknowledged);

        // Clearing and re-raising resets the acknowledgement
        engine.process(&sample(70.0));
        assert!(matches!(engine.acknowledge(1), Err(AcqError::Validation(_))));
        engine.process(&sample(90.0));
        assert!(!engine.state(1).unwrap().acknowledged);
    }

    #[test]
    fn test_disabled_alarms_ignored() {
        let mut alarm = greater_than(80.0, 2.0);
        alarm.enabled = false;
        let engine = AlarmEngine::new(&[alarm]);
        assert!(engine.process(&sample(90.0)).is_empty());
    }

    #[test]
    fn test_active_alarm_listing() {
        let engine = AlarmEngine::new(&[greater_than(80.0, 2.0)]);
        assert!(engine.active_alarms().is_empty());
        engine.process(&sample(85.0));
        assert_eq!(engine.active_alarms(), vec![1]);
    }
}
