use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Delay used when a coalescer is configured with a zero delay.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

/// Fault channel capacity used when none (or zero) is configured.
pub const DEFAULT_FAULT_CAPACITY: usize = 16;

/// Config values for [`Coalescer`](crate::Coalescer).
///
/// Deserializes from documents like `{ "delay_ms": 250, "name": "autosave" }`;
/// every field is optional.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoalescerConfig {
    /// Wait between the first trigger of an idle burst and the run.
    #[serde(rename = "delay_ms", deserialize_with = "millis")]
    pub delay: Duration,
    /// Overrides the operation's own name in logs and faults.
    pub name: Option<String>,
    /// Buffered faults per receiver before slow receivers start lagging.
    pub fault_capacity: usize,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            name: None,
            fault_capacity: DEFAULT_FAULT_CAPACITY,
        }
    }
}

impl CoalescerConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replace out-of-range values with defaults. Nothing is rejected.
    pub fn normalized(mut self) -> Self {
        if self.delay.is_zero() {
            tracing::debug!(default = ?DEFAULT_DELAY, "zero coalesce delay, using default");
            self.delay = DEFAULT_DELAY;
        }
        if self.fault_capacity == 0 {
            self.fault_capacity = DEFAULT_FAULT_CAPACITY;
        }
        self
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
