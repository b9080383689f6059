//! Per-prompt and per-session ceilings on model requests.

use std::fmt;

/// Which ceiling was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetExceeded {
    Turns { limit: usize },
    Tokens { limit: u64, used: u64 },
}

impl fmt::Display for BudgetExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetExceeded::Turns { limit } => {
                write!(f, "turn budget of {} model requests exhausted", limit)
            }
            BudgetExceeded::Tokens { limit, used } => {
                write!(f, "token budget exhausted ({} of {} tokens used)", used, limit)
            }
        }
    }
}

/// Counts model requests and tokens against their ceilings.
///
/// [`check`](Self::check) is called *before* each model request, so a turn
/// ceiling of `n` permits exactly `n` requests.
#[derive(Debug, Clone)]
pub struct TurnBudget {
    max_turns: usize,
    max_tokens: Option<u64>,
    turns: usize,
    tokens: u64,
}

impl TurnBudget {
    pub fn new(max_turns: usize, max_tokens: Option<u64>) -> Self {
        Self {
            max_turns,
            max_tokens,
            turns: 0,
            tokens: 0,
        }
    }

    /// Whether one more model request is allowed.
    pub fn check(&self) -> Result<(), BudgetExceeded> {
        if self.turns >= self.max_turns {
            return Err(BudgetExceeded::Turns {
                limit: self.max_turns,
            });
        }
        if let Some(limit) = self.max_tokens
            && self.tokens >= limit
        {
            return Err(BudgetExceeded::Tokens {
                limit,
                used: self.tokens,
            });
        }
        Ok(())
    }

    pub fn record_turn(&mut self) {
        self.turns += 1;
    }

    pub fn record_tokens(&mut self, tokens: u64) {
        self.tokens = self.tokens.saturating_add(tokens);
    }

    /// Start a new user prompt: turn count resets, tokens accumulate.
    pub fn reset_turns(&mut self) {
        self.turns = 0;
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }
}
