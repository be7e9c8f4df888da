use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Délai de reconnexion : `initial * multiplier^(n-1)`, plafonné à `max`.
/// Un multiplicateur de 1.0 donne un délai fixe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            max_delay_ms: 60_000,
            multiplier: 1.0,
        }
    }
}

impl BackoffConfig {
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self { initial_delay_ms: ms, max_delay_ms: ms, multiplier: 1.0 }
    }
}

/// Compteur de tentatives. Il n'y a pas de nombre maximal : le plafond borne
/// le délai, jamais les essais.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Avance d'une tentative et retourne son délai.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        self.delay_for(self.attempt)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_delay_ms as f64;
        let cap = self.config.max_delay_ms.max(self.config.initial_delay_ms) as f64;
        let multiplier = if self.config.multiplier.is_finite() && self.config.multiplier >= 1.0 {
            self.config.multiplier
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let raw = initial * multiplier.powi(exponent);
        Duration::from_millis(raw.min(cap) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        }
        assert_eq!(backoff.attempt(), 10);
    }

    #[test]
    fn test_exponential_with_ceiling() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial_delay_ms: 1_000,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        });
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 5_000, 5_000, 5_000]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_multiplier_falls_back_to_fixed() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial_delay_ms: 2_000,
            max_delay_ms: 10_000,
            multiplier: 0.5,
        });
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }
}
