//! Settings validation support.

use crate::error::ValidationError;

/// Trait for validating settings before a manager is built from them.
///
/// # Examples
///
/// ```rust
/// use config_reconciler::core::Validate;
/// use config_reconciler::error::ValidationError;
///
/// struct DispatchLimits {
///     max_in_flight: usize,
/// }
///
/// impl Validate for DispatchLimits {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.max_in_flight == 0 {
///             return Err(ValidationError::invalid_field(
///                 "max_in_flight",
///                 "must be greater than 0"
///             ));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validate {
    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
