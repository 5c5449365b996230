use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Business constants shared by the application services.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Fraction of every successful payment kept by the platform.
    /// The instructor receives the complement.
    pub platform_share: Decimal,
    /// Completion fraction at or above which a course counts as completed.
    pub completion_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform_share: dec!(0.20),
            completion_threshold: 0.92,
        }
    }
}

impl EngineConfig {
    pub fn new(platform_share: Decimal, completion_threshold: f64) -> Result<Self> {
        if platform_share < Decimal::ZERO || platform_share > Decimal::ONE {
            return Err(CoreError::validation(format!(
                "platform share must be within [0, 1], got {platform_share}"
            )));
        }
        if !(completion_threshold > 0.0 && completion_threshold <= 1.0) {
            return Err(CoreError::validation(format!(
                "completion threshold must be within (0, 1], got {completion_threshold}"
            )));
        }
        Ok(Self {
            platform_share,
            completion_threshold,
        })
    }

    pub fn instructor_share(&self) -> Decimal {
        Decimal::ONE - self.platform_share
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split() {
        let config = EngineConfig::default();
        assert_eq!(config.platform_share, dec!(0.20));
        assert_eq!(config.instructor_share(), dec!(0.80));
        assert_eq!(config.completion_threshold, 0.92);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            EngineConfig::new(dec!(1.5), 0.9),
            Err(CoreError::ValidationError(_))
        ));
        assert!(matches!(
            EngineConfig::new(dec!(0.3), 0.0),
            Err(CoreError::ValidationError(_))
        ));
        assert!(EngineConfig::new(dec!(0.3), 1.0).is_ok());
    }
}
