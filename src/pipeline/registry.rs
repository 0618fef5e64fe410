//! Name → implementation lookup for the four stage roles.
//!
//! # Responsibilities
//! - Hold every known authenticator, authorizer, mutator and error handler
//! - Enforce enablement from the engine configuration
//! - Merge global handler config with the per-rule config
//!
//! # Design Decisions
//! - Adding a stage means registering one more implementation; the
//!   orchestrator never names concrete stages
//! - Stages needing remote calls share one `RemoteClient`; each stage that
//!   memoizes owns its own named `TtlCache`

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::authn::{
    AnonymousAuthenticator, Authenticator, BearerTokenAuthenticator, ClientCredentialsAuthenticator,
    CookieSessionAuthenticator, IntrospectionAuthenticator, JwtAuthenticator, NoopAuthenticator,
    UnauthorizedAuthenticator,
};
use crate::authz::{
    AllowAuthorizer, Authorizer, DenyAuthorizer, KetoAuthorizer, RemoteAuthorizer,
    RemoteJsonAuthorizer,
};
use crate::cache::TtlCache;
use crate::config::schema::EngineConfig;
use crate::credentials::{Signer, Verifier};
use crate::error_handler::{
    ErrorHandler, JsonErrorHandler, RedirectErrorHandler, WwwAuthenticateErrorHandler,
};
use crate::matcher::MatchingEngines;
use crate::mutate::{
    CookieMutator, HeaderMutator, HydratorMutator, IdTokenMutator, Mutator, NoopMutator,
};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::RemoteClient;
use crate::rule::Handler;

/// Collaborators shared by the built-in stages.
#[derive(Clone)]
pub struct StageDependencies {
    pub remote: RemoteClient,
    pub signer: Option<Arc<dyn Signer>>,
    pub verifier: Option<Arc<dyn Verifier>>,
    pub engines: Arc<MatchingEngines>,
}

impl std::fmt::Debug for StageDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDependencies")
            .field("remote", &self.remote)
            .field("signer", &self.signer.is_some())
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

impl StageDependencies {
    /// Dependencies without signing or verification support.
    pub fn from_config(config: &EngineConfig, engines: Arc<MatchingEngines>) -> DecisionResult<Self> {
        Ok(Self {
            remote: RemoteClient::from_config(config)?,
            signer: None,
            verifier: None,
            engines,
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }
}

/// Registered stages plus the configuration that enables them.
pub struct HandlerRegistry {
    config: Arc<EngineConfig>,
    authenticators: BTreeMap<String, Arc<dyn Authenticator>>,
    authorizers: BTreeMap<String, Arc<dyn Authorizer>>,
    mutators: BTreeMap<String, Arc<dyn Mutator>>,
    error_handlers: BTreeMap<String, Arc<dyn ErrorHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("authenticators", &self.known(HandlerKind::Authenticator))
            .field("authorizers", &self.known(HandlerKind::Authorizer))
            .field("mutators", &self.known(HandlerKind::Mutator))
            .field("error_handlers", &self.known(HandlerKind::ErrorHandler))
            .finish()
    }
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            authenticators: BTreeMap::new(),
            authorizers: BTreeMap::new(),
            mutators: BTreeMap::new(),
            error_handlers: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in stage.
    pub fn with_defaults(config: Arc<EngineConfig>, deps: StageDependencies) -> Self {
        let cache = |name: &str| TtlCache::from_config(name, &config.cache);
        let remote = deps.remote.clone();

        let introspection = IntrospectionAuthenticator::new(remote.clone(), cache("oauth2_introspection"));
        let client_credentials =
            ClientCredentialsAuthenticator::new(remote.clone(), cache("oauth2_client_credentials"));
        let id_token = IdTokenMutator::new(deps.signer.clone(), cache("id_token"));
        let hydrator = HydratorMutator::new(remote.clone(), cache("hydrator"));

        Self::new(Arc::clone(&config))
            .with_authenticator(Arc::new(NoopAuthenticator))
            .with_authenticator(Arc::new(AnonymousAuthenticator))
            .with_authenticator(Arc::new(UnauthorizedAuthenticator))
            .with_authenticator(Arc::new(CookieSessionAuthenticator::new(remote.clone())))
            .with_authenticator(Arc::new(BearerTokenAuthenticator::new(remote.clone())))
            .with_authenticator(Arc::new(introspection))
            .with_authenticator(Arc::new(client_credentials))
            .with_authenticator(Arc::new(JwtAuthenticator::new(deps.verifier.clone())))
            .with_authorizer(Arc::new(AllowAuthorizer))
            .with_authorizer(Arc::new(DenyAuthorizer))
            .with_authorizer(Arc::new(RemoteAuthorizer::new(remote.clone())))
            .with_authorizer(Arc::new(RemoteJsonAuthorizer::new(remote.clone())))
            .with_authorizer(Arc::new(KetoAuthorizer::new(remote, Arc::clone(&deps.engines))))
            .with_mutator(Arc::new(NoopMutator))
            .with_mutator(Arc::new(HeaderMutator))
            .with_mutator(Arc::new(CookieMutator))
            .with_mutator(Arc::new(id_token))
            .with_mutator(Arc::new(hydrator))
            .with_error_handler(Arc::new(JsonErrorHandler))
            .with_error_handler(Arc::new(RedirectErrorHandler))
            .with_error_handler(Arc::new(WwwAuthenticateErrorHandler))
    }

    pub fn with_authenticator(mut self, stage: Arc<dyn Authenticator>) -> Self {
        self.authenticators.insert(stage.id().to_string(), stage);
        self
    }

    pub fn with_authorizer(mut self, stage: Arc<dyn Authorizer>) -> Self {
        self.authorizers.insert(stage.id().to_string(), stage);
        self
    }

    pub fn with_mutator(mut self, stage: Arc<dyn Mutator>) -> Self {
        self.mutators.insert(stage.id().to_string(), stage);
        self
    }

    pub fn with_error_handler(mut self, stage: Arc<dyn ErrorHandler>) -> Self {
        self.error_handlers.insert(stage.id().to_string(), stage);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sorted ids registered for `kind`.
    pub fn known(&self, kind: HandlerKind) -> Vec<String> {
        match kind {
            HandlerKind::Authenticator => self.authenticators.keys().cloned().collect(),
            HandlerKind::Authorizer => self.authorizers.keys().cloned().collect(),
            HandlerKind::Mutator => self.mutators.keys().cloned().collect(),
            HandlerKind::ErrorHandler => self.error_handlers.keys().cloned().collect(),
        }
    }

    pub fn authenticator(&self, id: &str) -> DecisionResult<Arc<dyn Authenticator>> {
        self.resolve(HandlerKind::Authenticator, &self.authenticators, id)
    }

    pub fn authorizer(&self, id: &str) -> DecisionResult<Arc<dyn Authorizer>> {
        self.resolve(HandlerKind::Authorizer, &self.authorizers, id)
    }

    pub fn mutator(&self, id: &str) -> DecisionResult<Arc<dyn Mutator>> {
        self.resolve(HandlerKind::Mutator, &self.mutators, id)
    }

    pub fn error_handler(&self, id: &str) -> DecisionResult<Arc<dyn ErrorHandler>> {
        self.resolve(HandlerKind::ErrorHandler, &self.error_handlers, id)
    }

    /// Global config of the referenced handler merged with the rule's own.
    pub fn merged_config(&self, kind: HandlerKind, handler: &Handler) -> Value {
        handler_config::merge(
            &self.config.handler_config(kind, &handler.handler),
            &handler.config,
        )
    }

    fn resolve<T: ?Sized>(
        &self,
        kind: HandlerKind,
        stages: &BTreeMap<String, Arc<T>>,
        id: &str,
    ) -> DecisionResult<Arc<T>> {
        let stage = stages.get(id).ok_or_else(|| DecisionError::UnknownHandler {
            kind,
            id: id.to_string(),
            known: stages.keys().cloned().collect(),
        })?;
        if !self.config.is_enabled(kind, id) {
            return Err(DecisionError::HandlerDisabled {
                kind,
                id: id.to_string(),
            });
        }
        Ok(Arc::clone(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry(config: EngineConfig) -> HandlerRegistry {
        let engines = Arc::new(MatchingEngines::new());
        let deps = StageDependencies::from_config(&config, engines).unwrap();
        HandlerRegistry::with_defaults(Arc::new(config), deps)
    }

    #[test]
    fn test_unknown_handler_names_known_set() {
        let registry = registry(EngineConfig::default());
        let err = registry.authorizer("magic").err().expect("unknown handler");
        match err {
            DecisionError::UnknownHandler { kind, id, known } => {
                assert_eq!(kind, HandlerKind::Authorizer);
                assert_eq!(id, "magic");
                assert!(known.contains(&"allow".to_string()));
                assert!(known.contains(&"keto_engine_acp_ory".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_disabled_handler() {
        let registry = registry(EngineConfig::default());
        assert!(matches!(
            registry.authenticator("noop"),
            Err(DecisionError::HandlerDisabled { .. })
        ));
        // json is enabled out of the box
        assert!(registry.error_handler("json").is_ok());
    }

    #[test]
    fn test_enabled_handler_resolves() {
        let config = EngineConfig::default().enable(HandlerKind::Authenticator, "noop", Value::Null);
        let registry = registry(config);
        assert_eq!(registry.authenticator("noop").unwrap().id(), "noop");
    }

    #[test]
    fn test_merged_config_prefers_rule_values() {
        let config = EngineConfig::default().enable(
            HandlerKind::Mutator,
            "header",
            json!({"headers": {"X-A": "global", "X-B": "global"}}),
        );
        let registry = registry(config);
        let handler = Handler::with_config("header", json!({"headers": {"X-B": "rule"}}));
        assert_eq!(
            registry.merged_config(HandlerKind::Mutator, &handler),
            json!({"headers": {"X-A": "global", "X-B": "rule"}})
        );
    }

    #[test]
    fn test_known_lists_every_role() {
        let registry = registry(EngineConfig::default());
        assert_eq!(registry.known(HandlerKind::Authenticator).len(), 8);
        assert_eq!(registry.known(HandlerKind::Authorizer).len(), 5);
        assert_eq!(registry.known(HandlerKind::Mutator).len(), 5);
        assert_eq!(
            registry.known(HandlerKind::ErrorHandler),
            vec!["json", "redirect", "www_authenticate"]
        );
    }
}
