use crate::errors::types::Error;
use std::fmt;

/// Context information for an error
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Component where the error occurred
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context information
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    /// Add details to the context
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "in component '{}' during operation '{}'", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    /// Attach context to the error branch
    fn context(self, ctx: ErrorContext) -> Result<T, Error>;

    /// Attach simple component/operation context to the error branch
    fn with_context<S: Into<String>, U: Into<String>>(self, component: S, operation: U) -> Result<T, Error>;
}

impl<T, E: Into<Error>> ErrorExt<T> for Result<T, E> {
    fn context(self, ctx: ErrorContext) -> Result<T, Error> {
        self.map_err(|e| match e.into() {
            Error::Config(msg) => Error::Config(format!("{} [{}]", msg, ctx)),
            Error::Internal(msg) => Error::Internal(format!("{} [{}]", msg, ctx)),
            other => Error::Custom(format!("{} [{}]", other, ctx)),
        })
    }

    fn with_context<S: Into<String>, U: Into<String>>(self, component: S, operation: U) -> Result<T, Error> {
        self.context(ErrorContext::new(component, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display() {
        let ctx = ErrorContext::new("config", "load").with_details("rmedia.toml");
        assert_eq!(
            ctx.to_string(),
            "in component 'config' during operation 'load' (rmedia.toml)"
        );
    }

    #[test]
    fn test_context_keeps_config_variant() {
        let res: Result<(), Error> = Err(Error::Config("max_objects must be > 0".into()));
        let err = res.with_context("config", "validate").unwrap_err();
        match err {
            Error::Config(msg) => {
                assert!(msg.contains("max_objects"));
                assert!(msg.contains("validate"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_context_on_ok_is_passthrough() {
        let res: Result<u32, Error> = Ok(7);
        assert_eq!(res.with_context("config", "load").unwrap(), 7);
    }
}
