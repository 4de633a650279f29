//! Signal derivation rules

use signals_core::{RefreshConfig, Signal};
use tracing::trace;

/// Per-row inputs to the signal rules
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalInputs {
    pub rsi: Option<f64>,
    /// 7-sample fractional change of unique addresses
    pub addr_change: Option<f64>,
    /// 7-sample fractional change of transaction count
    pub tx_change: Option<f64>,
}

/// Rule trait for individual Buy/Sell conditions
pub trait SignalRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, inputs: &SignalInputs) -> Option<Signal>;
}

/// Oversold price with growing address activity: Buy
pub struct OversoldAccumulation {
    threshold: f64,
}

impl OversoldAccumulation {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl SignalRule for OversoldAccumulation {
    fn name(&self) -> &'static str {
        "oversold_accumulation"
    }

    fn evaluate(&self, inputs: &SignalInputs) -> Option<Signal> {
        // NaN fails every comparison, so it falls through to Hold
        let rsi = inputs.rsi?;
        let addr_change = inputs.addr_change?;
        (rsi < self.threshold && addr_change > 0.0).then_some(Signal::Buy)
    }
}

/// Overbought price with shrinking transaction count: Sell
pub struct OverboughtCooling {
    threshold: f64,
}

impl OverboughtCooling {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl SignalRule for OverboughtCooling {
    fn name(&self) -> &'static str {
        "overbought_cooling"
    }

    fn evaluate(&self, inputs: &SignalInputs) -> Option<Signal> {
        let rsi = inputs.rsi?;
        let tx_change = inputs.tx_change?;
        (rsi > self.threshold && tx_change < 0.0).then_some(Signal::Sell)
    }
}

/// Ordered rule set; the first matching rule wins, otherwise Hold
pub struct SignalEngine {
    rules: Vec<Box<dyn SignalRule>>,
}

impl SignalEngine {
    pub fn new(oversold: f64, overbought: f64) -> Self {
        let rules: Vec<Box<dyn SignalRule>> = vec![
            Box::new(OversoldAccumulation::new(oversold)),
            Box::new(OverboughtCooling::new(overbought)),
        ];
        Self { rules }
    }

    pub fn from_config(config: &RefreshConfig) -> Self {
        Self::new(config.oversold, config.overbought)
    }

    pub fn derive(&self, inputs: &SignalInputs) -> Signal {
        for rule in &self.rules {
            if let Some(signal) = rule.evaluate(inputs) {
                trace!(rule = rule.name(), %signal, "Signal rule matched");
                return signal;
            }
        }
        Signal::Hold
    }
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::from_config(&RefreshConfig::default())
    }
}
