//! Per-turn context budget.
//!
//! The model's context window is expressed in tokens, but everything the
//! assembler emits is text, so the budget is kept in bytes: `max_tokens ×
//! chars_per_token`. All tool results of one turn draw from the same
//! budget, and [`ContextBudget::try_consume`] is the only way to spend it,
//! so consumption can never exceed the maximum.

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Default budget in tokens for one turn's tool results.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 8_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextBudget {
    max_tokens: usize,
    chars_per_token: f64,
    max_chars: usize,
    consumed: usize,
}

impl ContextBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self::with_calibration(max_tokens, None)
    }

    /// Budget with a calibrated chars-per-token ratio. Pass `None` to use
    /// [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn with_calibration(max_tokens: usize, calibrated_cpt: Option<f64>) -> Self {
        let cpt = calibrated_cpt
            .filter(|c| c.is_finite() && *c > 0.0)
            .unwrap_or(DEFAULT_CHARS_PER_TOKEN);
        Self {
            max_tokens,
            chars_per_token: cpt,
            max_chars: (max_tokens as f64 * cpt) as usize,
            consumed: 0,
        }
    }

    /// Budget of exactly `max_chars` bytes. Mostly useful in tests.
    pub fn from_chars(max_chars: usize) -> Self {
        Self {
            max_tokens: (max_chars as f64 / DEFAULT_CHARS_PER_TOKEN) as usize,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            max_chars,
            consumed: 0,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn remaining(&self) -> usize {
        self.max_chars - self.consumed
    }

    pub fn fits(&self, len: usize) -> bool {
        len <= self.remaining()
    }

    /// Charge `len` bytes if they fit. Returns whether they were charged.
    pub fn try_consume(&mut self, len: usize) -> bool {
        if self.fits(len) {
            self.consumed += len;
            true
        } else {
            false
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.consumed == self.max_chars
    }

    pub fn usage(&self) -> ContextUsage {
        let estimated_tokens = (self.consumed as f64 / self.chars_per_token) as usize;
        let usage_pct = if self.max_chars > 0 {
            self.consumed as f64 / self.max_chars as f64
        } else {
            1.0
        };
        ContextUsage {
            estimated_tokens,
            max_tokens: self.max_tokens,
            usage_pct,
        }
    }
}

/// Snapshot of budget usage at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUsage {
    /// Estimated tokens consumed.
    pub estimated_tokens: usize,
    pub max_tokens: usize,
    /// Usage as a fraction (0.0 to 1.0).
    pub usage_pct: f64,
}

impl ContextUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.max_tokens,
        )
    }
}
