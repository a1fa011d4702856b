//! Result type alias for Cairn

use super::errors::CairnError;

/// Result type alias for Cairn operations
///
/// # Examples
///
/// ```
/// use cairn::domain::result::Result;
/// use cairn::domain::errors::CairnError;
///
/// fn failing_function() -> Result<()> {
///     Err(CairnError::Validation("Invalid input".to_string()))
/// }
///
/// assert!(failing_function().is_err());
/// ```
pub type Result<T> = std::result::Result<T, CairnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
