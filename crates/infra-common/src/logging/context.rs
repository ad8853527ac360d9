use std::collections::BTreeMap;
use std::fmt;
use tracing::{Level, Span};

/// Context information attached to a span
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component that is generating the log
    pub component: String,
    /// Operation or action being performed
    pub operation: Option<String>,
    /// Additional contextual fields, rendered in key order
    pub fields: BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context with just the component name
    pub fn new<S: Into<String>>(component: S) -> Self {
        LogContext {
            component: component.into(),
            operation: None,
            fields: BTreeMap::new(),
        }
    }

    /// Create a new log context with component and operation
    pub fn with_operation<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        LogContext {
            component: component.into(),
            operation: Some(operation.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field to the context
    pub fn with_field<S: Into<String>, T: Into<String>>(mut self, key: S, value: T) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Create a span with this context's information.
    ///
    /// Extra fields are folded into a single `fields` value since span field
    /// names must be known statically.
    pub fn span(&self, level: Level) -> Span {
        let op = self.operation.as_deref().unwrap_or("-");
        let fields = self.fields_string();
        match level {
            Level::TRACE => tracing::trace_span!("rmedia", component = %self.component, operation = %op, fields = %fields),
            Level::DEBUG => tracing::debug_span!("rmedia", component = %self.component, operation = %op, fields = %fields),
            Level::INFO => tracing::info_span!("rmedia", component = %self.component, operation = %op, fields = %fields),
            Level::WARN => tracing::warn_span!("rmedia", component = %self.component, operation = %op, fields = %fields),
            _ => tracing::error_span!("rmedia", component = %self.component, operation = %op, fields = %fields),
        }
    }

    fn fields_string(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.component)?;

        if let Some(op) = &self.operation {
            write!(f, "[{}]", op)?;
        }

        for (key, value) in &self.fields {
            write!(f, "[{}={}]", key, value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_orders_fields() {
        let ctx = LogContext::with_operation("graph", "destroy")
            .with_field("object", "abc")
            .with_field("cascade", "3");
        assert_eq!(ctx.to_string(), "[graph][destroy][cascade=3][object=abc]");
    }

    #[test]
    fn test_span_without_subscriber_is_disabled() {
        let span = LogContext::new("gc").span(Level::DEBUG);
        let _guard = span.enter();
    }
}
