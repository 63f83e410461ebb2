use thiserror::Error;

use crate::models::ScheduleError;

/// Problems with a monitor, checker or notifier definition.
///
/// These are raised while building components at load time and stop the
/// offending monitor from being served.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// No checker is registered for the tag.
    #[error("Unknown checker type '{0}'")]
    UnknownCheckerType(String),

    /// No notifier is registered for the tag.
    #[error("Unknown notifier type '{0}'")]
    UnknownNotifierType(String),

    /// A required option or field is absent.
    #[error("{component}: required option '{option}' is missing")]
    MissingOption {
        /// The component that needs the option.
        component: String,
        /// The missing option.
        option: String,
    },

    /// Neither `url` nor `display_url` is set.
    #[error("Monitor '{0}' has no url")]
    MissingUrl(String),

    /// A URL could not be parsed.
    #[error("Monitor '{monitor}' has an invalid url '{url}': {reason}")]
    InvalidUrl {
        /// The monitor name.
        monitor: String,
        /// The offending value.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// A regex, XPath expression or CSS selector failed to compile.
    #[error("Checker '{checker}' has an invalid expression '{expression}': {reason}")]
    InvalidExpression {
        /// The checker name.
        checker: String,
        /// The offending expression.
        expression: String,
        /// Compiler message.
        reason: String,
    },

    /// A check entry sets both or neither of `expected` and `not_expected`.
    #[error("Checker '{0}' must set exactly one of 'expected' or 'not_expected'")]
    AmbiguousExpectation(String),

    /// The schedule could not be built.
    #[error("Monitor '{monitor}' has an invalid schedule: {source}")]
    InvalidSchedule {
        /// The monitor name.
        monitor: String,
        /// The underlying error.
        #[source]
        source: ScheduleError,
    },

    /// A rendered monitor has no browser endpoint.
    #[error("Monitor '{0}' is of type http_render but no render_server_urn is configured")]
    MissingRenderServer(String),

    /// A monitor type tag is not known.
    #[error("Monitor '{monitor}': {reason}")]
    InvalidMonitorType {
        /// The monitor name.
        monitor: String,
        /// Parser message.
        reason: String,
    },

    /// Two monitors share a name.
    #[error("Duplicate monitor name '{0}'")]
    DuplicateMonitor(String),

    /// The log notifier was configured but no store is available.
    #[error("Notifier '{0}' needs a check log store but none is configured")]
    MissingStore(String),

    /// An option is present but unusable.
    #[error("{component}: option '{option}' is invalid: {reason}")]
    InvalidOption {
        /// The component that reads the option.
        component: String,
        /// The option name.
        option: String,
        /// Why the value was rejected.
        reason: String,
    },
}
