//! Decoding policy for generation requests.

use serde::{Deserialize, Serialize};

/// Sampling strategy controlling generation randomness.
///
/// A temperature of exactly zero always selects [`SamplingConfig::Greedy`];
/// it is never encoded as top-p sampling with temperature 0.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SamplingConfig {
    /// Deterministic decoding: always pick the most likely token.
    Greedy,
    /// Nucleus sampling with the configured probability mass and temperature.
    TopP { top_p: f32, temperature: f32 },
}

impl SamplingConfig {
    /// Builds a sampling config from raw parameters.
    ///
    /// `temperature == 0.0` selects greedy decoding deterministically.
    #[must_use]
    pub fn new(temperature: f32, top_p: f32) -> Self {
        if temperature == 0.0 {
            SamplingConfig::Greedy
        } else {
            SamplingConfig::TopP { top_p, temperature }
        }
    }

    /// Wire parameters for an OpenAI-compatible completion request.
    ///
    /// Greedy maps to `temperature: 0.0` with `top_p` omitted.
    #[must_use]
    pub fn request_params(&self) -> (f32, Option<f32>) {
        match *self {
            SamplingConfig::Greedy => (0.0, None),
            SamplingConfig::TopP { top_p, temperature } => (temperature, Some(top_p)),
        }
    }

    /// Returns true for the deterministic greedy strategy.
    #[must_use]
    pub fn is_greedy(&self) -> bool {
        matches!(self, SamplingConfig::Greedy)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig::Greedy
    }
}
