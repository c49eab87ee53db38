//! Token usage accounting
//!
//! Pure, stateless arithmetic over per-call usage reports. Providers that
//! omit a component report it as zero.

use serde::{Deserialize, Serialize};

/// Token usage statistics for one model call or one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl Usage {
    /// The additive identity
    pub const ZERO: Usage = Usage {
        input_tokens: 0,
        output_tokens: 0,
        reasoning_tokens: 0,
        cached_input_tokens: 0,
        total_tokens: 0,
    };

    /// Component-wise sum of two usage reports
    pub fn sum(a: &Usage, b: &Usage) -> Usage {
        Usage {
            input_tokens: a.input_tokens + b.input_tokens,
            output_tokens: a.output_tokens + b.output_tokens,
            reasoning_tokens: a.reasoning_tokens + b.reasoning_tokens,
            cached_input_tokens: a.cached_input_tokens + b.cached_input_tokens,
            total_tokens: a.total_tokens + b.total_tokens,
        }
    }

    /// Accumulate another report into this one
    pub fn add(&mut self, other: &Usage) {
        *self = Usage::sum(self, other);
    }

    /// Backfill `total_tokens` when the provider did not report one
    pub fn normalized(mut self) -> Usage {
        if self.total_tokens == 0 {
            self.total_tokens = self.input_tokens + self.output_tokens + self.reasoning_tokens;
        }
        self
    }
}

/// Fraction of the model's context window consumed by `total_tokens`.
pub fn context_window_usage(total_tokens: u64, context_window_size: u64) -> f64 {
    if context_window_size == 0 {
        return 0.0;
    }
    total_tokens as f64 / context_window_size as f64
}
