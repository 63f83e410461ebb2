use std::{collections::HashMap, sync::Arc, time::Duration};

use reqwest::Method;
use reqwest_middleware::ClientWithMiddleware;

use super::{LogStoreNotifier, Notifier, PushSaferNotifier, SlackNotifier, WebhookNotifier};
use crate::{
    config::{ConfigurationError, HttpRetryConfig},
    http_client::{HttpClientPool, HttpClientPoolError},
    models::NotifierDefinition,
    persistence::CheckLogStore,
};

/// Shared resources handed to notifier constructors.
#[derive(Clone, Debug)]
pub struct NotifierDeps {
    /// Retrying client used by HTTP notifiers.
    pub http_client: Arc<ClientWithMiddleware>,
    /// Per-request timeout of HTTP notifiers.
    pub timeout: Duration,
    /// Store used by the `log` notifier.
    pub log_store: Option<Arc<dyn CheckLogStore>>,
}

impl NotifierDeps {
    /// Dependencies without a check log store.
    pub fn new(http_client: Arc<ClientWithMiddleware>, timeout: Duration) -> Self {
        Self { http_client, timeout, log_store: None }
    }

    /// Takes the client for `retry_policy` from the pool.
    pub async fn from_pool(
        pool: &HttpClientPool,
        retry_policy: &HttpRetryConfig,
        timeout: Duration,
    ) -> Result<Self, HttpClientPoolError> {
        Ok(Self::new(pool.get_or_create(retry_policy).await?, timeout))
    }

    /// Enables the `log` notifier.
    pub fn with_log_store(mut self, store: Arc<dyn CheckLogStore>) -> Self {
        self.log_store = Some(store);
        self
    }
}

/// Builds a notifier from its definition.
pub type NotifierConstructor =
    fn(&NotifierDefinition, &NotifierDeps) -> Result<Arc<dyn Notifier>, ConfigurationError>;

fn required<'a>(def: &'a NotifierDefinition, option: &str) -> Result<&'a str, ConfigurationError> {
    def.options
        .get(option)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigurationError::MissingOption {
            component: format!("{} notifier '{}'", def.kind, def.name),
            option: option.to_string(),
        })
}

fn slack(def: &NotifierDefinition, deps: &NotifierDeps) -> Result<Arc<dyn Notifier>, ConfigurationError> {
    let webhook = required(def, "webhook")?;
    Ok(Arc::new(SlackNotifier::new(&def.name, webhook, deps.http_client.clone(), deps.timeout)))
}

fn pushsafer(
    def: &NotifierDefinition,
    deps: &NotifierDeps,
) -> Result<Arc<dyn Notifier>, ConfigurationError> {
    let private_key = required(def, "private_key")?;
    let mut options = def.options.clone();
    options.remove("private_key");
    let api_url = options.remove("api_url");

    let mut notifier = PushSaferNotifier::new(
        &def.name,
        private_key,
        options,
        deps.http_client.clone(),
        deps.timeout,
    );
    if let Some(api_url) = api_url {
        notifier = notifier.with_api_url(api_url);
    }
    Ok(Arc::new(notifier))
}

fn webhook(def: &NotifierDefinition, deps: &NotifierDeps) -> Result<Arc<dyn Notifier>, ConfigurationError> {
    let url = required(def, "url")?;
    let method = match def.options.get("method") {
        Some(method) => Some(Method::from_bytes(method.to_ascii_uppercase().as_bytes()).map_err(
            |e| ConfigurationError::InvalidOption {
                component: format!("webhook notifier '{}'", def.name),
                option: "method".to_string(),
                reason: e.to_string(),
            },
        )?),
        None => None,
    };
    let secret = def.options.get("secret").cloned();
    Ok(Arc::new(WebhookNotifier::new(
        &def.name,
        url,
        method,
        secret,
        deps.http_client.clone(),
        deps.timeout,
    )))
}

fn log(def: &NotifierDefinition, deps: &NotifierDeps) -> Result<Arc<dyn Notifier>, ConfigurationError> {
    let store = deps
        .log_store
        .clone()
        .ok_or_else(|| ConfigurationError::MissingStore(def.name.clone()))?;
    Ok(Arc::new(LogStoreNotifier::new(&def.name, store)))
}

/// Maps notifier type tags to constructors.
#[derive(Clone)]
pub struct NotifierRegistry {
    constructors: HashMap<String, NotifierConstructor>,
    deps: NotifierDeps,
}

impl NotifierRegistry {
    /// A registry with the `slack`, `pushsafer`, `webhook` and `log` types.
    pub fn new(deps: NotifierDeps) -> Self {
        let mut registry = Self::empty(deps);
        registry.register("slack", slack);
        registry.register("pushsafer", pushsafer);
        registry.register("webhook", webhook);
        registry.register("log", log);
        registry
    }

    /// A registry with no notifier types.
    pub fn empty(deps: NotifierDeps) -> Self {
        Self { constructors: HashMap::new(), deps }
    }

    /// Registers a constructor, replacing any previous one for the tag.
    pub fn register(&mut self, tag: &str, constructor: NotifierConstructor) {
        self.constructors.insert(tag.to_ascii_lowercase(), constructor);
    }

    /// Builds a notifier, failing for unknown tags or missing options.
    pub fn build(&self, def: &NotifierDefinition) -> Result<Arc<dyn Notifier>, ConfigurationError> {
        let constructor = self
            .constructors
            .get(&def.kind.to_ascii_lowercase())
            .ok_or_else(|| ConfigurationError::UnknownNotifierType(def.kind.clone()))?;
        constructor(def, &self.deps)
    }

    /// Builds every definition in order.
    pub fn build_all(
        &self,
        defs: &[NotifierDefinition],
    ) -> Result<Vec<Arc<dyn Notifier>>, ConfigurationError> {
        defs.iter().map(|def| self.build(def)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{persistence::MockCheckLogStore, test_helpers::create_test_http_client};

    fn deps() -> NotifierDeps {
        NotifierDeps::new(create_test_http_client(), Duration::from_secs(5))
    }

    fn def(kind: &str, options: &[(&str, &str)]) -> NotifierDefinition {
        NotifierDefinition {
            name: "n".into(),
            kind: kind.into(),
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_builds_known_types() {
        let registry = NotifierRegistry::new(deps());
        let cases = [
            def("slack", &[("webhook", "https://hooks.slack.com/x")]),
            def("Pushsafer", &[("private_key", "k"), ("s", "11")]),
            def("webhook", &[("url", "https://example.com"), ("method", "put"), ("secret", "s")]),
        ];
        let kinds: Vec<_> = cases.iter().map(|d| registry.build(d).unwrap().kind()).collect();
        assert_eq!(kinds, vec!["slack", "pushsafer", "webhook"]);
    }

    #[test]
    fn test_missing_required_options() {
        let registry = NotifierRegistry::new(deps());
        for (kind, option) in [("slack", "webhook"), ("pushsafer", "private_key"), ("webhook", "url")] {
            let err = registry.build(&def(kind, &[])).unwrap_err();
            assert!(
                matches!(&err, ConfigurationError::MissingOption { option: o, .. } if o == option),
                "{kind}: {err}"
            );
        }
    }

    #[test]
    fn test_log_notifier_needs_store() {
        let without = NotifierRegistry::new(deps());
        assert!(matches!(
            without.build(&def("log", &[])),
            Err(ConfigurationError::MissingStore(_))
        ));

        let with = NotifierRegistry::new(deps().with_log_store(Arc::new(MockCheckLogStore::new())));
        assert_eq!(with.build(&def("log", &[])).unwrap().kind(), "log");
    }

    #[test]
    fn test_unknown_type_and_bad_method() {
        let registry = NotifierRegistry::new(deps());
        assert!(matches!(
            registry.build(&def("email", &[])),
            Err(ConfigurationError::UnknownNotifierType(_))
        ));
        assert!(matches!(
            registry.build(&def("webhook", &[("url", "https://x"), ("method", "NOT A METHOD")])),
            Err(ConfigurationError::InvalidOption { .. })
        ));
    }
}
