pub mod prompt;

use crate::cli::Args;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_output_tokens: u32,
    pub max_context_tokens: usize,
}

impl GenerationDefaults {
    pub fn from_args(args: &Args) -> Self {
        Self {
            temperature: args.default_temperature,
            max_tokens: args.default_max_tokens,
            max_output_tokens: args.max_output_tokens.max(1),
            max_context_tokens: args.max_context_tokens,
        }
    }

    pub fn temperature(&self, requested: Option<f32>) -> f32 {
        requested
            .filter(|t| t.is_finite())
            .unwrap_or(self.temperature)
            .clamp(0.0, 2.0)
    }

    pub fn max_tokens(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.max_tokens).clamp(1, self.max_output_tokens)
    }
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            max_output_tokens: 4096,
            max_context_tokens: 6000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub client_header: String,
}

impl RateLimitConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            window: Duration::from_secs(args.rate_limit_window_secs.max(1)),
            max_requests: args.rate_limit_max_requests,
            client_header: args.rate_limit_header.to_lowercase(),
        }
    }
}
