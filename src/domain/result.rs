//! Result type alias for EDI operations

use super::errors::EdiError;

/// Result type alias for EDI operations
///
/// # Examples
///
/// ```
/// use edi::domain::result::Result;
/// use edi::domain::errors::EdiError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(EdiError::User("Unknown document type".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, EdiError>;

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

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(EdiError::Validation("test error".to_string()));
        assert!(result.is_err());
    }
}
