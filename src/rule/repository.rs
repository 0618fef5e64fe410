//! In-memory rule repository.
//!
//! # Responsibilities
//! - Validate every rule of a new rule set and publish it atomically
//! - Resolve exactly one rule per (method, URL, protocol)
//! - Report readiness once any rule was loaded
//!
//! # Design Decisions
//! - State is one immutable snapshot behind `ArcSwap`; `match_rule` works
//!   on a single snapshot and never sees a torn rule list
//! - Strategy changes go through read-copy-update on the same snapshot and
//!   re-validate every rule, since a pattern may only compile in one dialect
//! - Rules that fail validation are kept so they still take part in
//!   ambiguity detection

use arc_swap::ArcSwap;
use std::sync::Arc;
use url::Url;

use crate::health::ReadyChecker;
use crate::matcher::{MatchingEngine, MatchingEngines, MatchingStrategy};
use crate::observability::metrics;
use crate::pipeline::error::{DecisionError, DecisionResult};
use crate::pipeline::session::MatchContext;
use crate::rule::model::{Protocol, Rule};
use crate::rule::validator::RuleValidator;

/// A rule that failed validation and why.
#[derive(Debug, Clone)]
pub struct RejectedRule {
    pub rule: Arc<Rule>,
    pub reason: String,
}

/// The single rule covering a request plus its captures.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    pub rule: Arc<Rule>,
    pub context: MatchContext,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    /// Every rule of the last `set`, in order.
    source: Vec<Arc<Rule>>,
    rules: Vec<Arc<Rule>>,
    invalid_rules: Vec<RejectedRule>,
    strategy: MatchingStrategy,
}

/// Validated, swappable rule set.
pub struct RuleRepository {
    validator: RuleValidator,
    engines: Arc<MatchingEngines>,
    snapshot: ArcSwap<Snapshot>,
}

impl std::fmt::Debug for RuleRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot.load();
        f.debug_struct("RuleRepository")
            .field("rules", &snapshot.rules.len())
            .field("invalid_rules", &snapshot.invalid_rules.len())
            .field("strategy", &snapshot.strategy)
            .finish()
    }
}

impl RuleRepository {
    pub fn new(
        validator: RuleValidator,
        engines: Arc<MatchingEngines>,
        strategy: MatchingStrategy,
    ) -> Self {
        Self {
            validator,
            engines,
            snapshot: ArcSwap::from_pointee(Snapshot {
                strategy,
                ..Snapshot::default()
            }),
        }
    }

    /// Replaces the whole rule set.
    ///
    /// Valid and invalid rules both replace their previous lists; invalid
    /// rules are logged, not rejected.
    pub fn set(&self, rules: Vec<Rule>) {
        let source: Vec<Arc<Rule>> = rules.into_iter().map(Arc::new).collect();
        self.snapshot
            .rcu(|current| self.partition(source.clone(), current.strategy));
        self.report("Access rules updated");
    }

    fn partition(&self, source: Vec<Arc<Rule>>, strategy: MatchingStrategy) -> Snapshot {
        let engine = self.engines.select(strategy);
        let mut rules = Vec::with_capacity(source.len());
        let mut invalid_rules = Vec::new();
        for rule in &source {
            match self.validator.validate(rule, engine) {
                Ok(()) => rules.push(Arc::clone(rule)),
                Err(e) => invalid_rules.push(RejectedRule {
                    rule: Arc::clone(rule),
                    reason: e.to_string(),
                }),
            }
        }
        Snapshot {
            source,
            rules,
            invalid_rules,
            strategy,
        }
    }

    fn report(&self, message: &'static str) {
        let snapshot = self.snapshot.load();
        for rejected in &snapshot.invalid_rules {
            tracing::warn!(rule_id = %rejected.rule.id, error = %rejected.reason, "A rule uses a malformed configuration and all URLs matching this rule will not work");
        }
        metrics::record_rules_loaded(snapshot.rules.len(), snapshot.invalid_rules.len());
        tracing::info!(
            valid = snapshot.rules.len(),
            invalid = snapshot.invalid_rules.len(),
            strategy = %snapshot.strategy,
            "{message}"
        );
    }

    /// Resolves the one rule covering `method` on `url`.
    pub fn match_rule(&self, method: &str, url: &Url, protocol: Protocol) -> DecisionResult<RuleMatch> {
        let snapshot = self.snapshot.load();
        let engine = self.engines.select(snapshot.strategy);

        let mut matched: Vec<(&Arc<Rule>, Option<&str>)> = Vec::new();
        for rule in &snapshot.rules {
            match rule.is_matching(engine, method, url, protocol) {
                Ok(true) => matched.push((rule, None)),
                Ok(false) => {}
                Err(e) => {
                    metrics::record_rule_match("error");
                    return Err(e.into());
                }
            }
        }
        for rejected in &snapshot.invalid_rules {
            match rejected.rule.is_matching(engine, method, url, protocol) {
                Ok(true) => matched.push((&rejected.rule, Some(rejected.reason.as_str()))),
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(rule_id = %rejected.rule.id, error = %e, "Skipping invalid rule that cannot be matched");
                }
            }
        }

        match matched.as_slice() {
            [] => {
                metrics::record_rule_match("no_match");
                Err(DecisionError::NoRuleMatched)
            }
            [(rule, None)] => {
                metrics::record_rule_match("matched");
                Ok(RuleMatch {
                    rule: Arc::clone(rule),
                    context: self.context(engine, rule, method, url, snapshot.strategy)?,
                })
            }
            [(rule, Some(reason))] => {
                metrics::record_rule_match("invalid");
                Err(DecisionError::InvalidRule {
                    id: rule.id.clone(),
                    reason: reason.to_string(),
                })
            }
            many => {
                metrics::record_rule_match("ambiguous");
                let ids: Vec<&str> = many.iter().map(|(r, _)| r.id.as_str()).collect();
                tracing::warn!(url = %url, method, rules = ?ids, "Request matches more than one rule");
                Err(DecisionError::AmbiguousMatch { count: many.len() })
            }
        }
    }

    fn context(
        &self,
        engine: &dyn MatchingEngine,
        rule: &Rule,
        method: &str,
        url: &Url,
        strategy: MatchingStrategy,
    ) -> DecisionResult<MatchContext> {
        Ok(MatchContext {
            regexp_capture_groups: rule.capture_groups(engine, url)?,
            url: Some(url.clone()),
            method: method.to_string(),
            strategy,
        })
    }

    /// Valid rule with the given id.
    pub fn get(&self, id: &str) -> DecisionResult<Arc<Rule>> {
        self.snapshot
            .load()
            .rules
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| DecisionError::NotFound(format!("rule \"{id}\"")))
    }

    /// Page of valid rules in stored order.
    pub fn list(&self, limit: usize, offset: usize) -> Vec<Arc<Rule>> {
        self.snapshot
            .load()
            .rules
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of valid rules.
    pub fn count(&self) -> usize {
        self.snapshot.load().rules.len()
    }

    pub fn invalid_rules(&self) -> Vec<RejectedRule> {
        self.snapshot.load().invalid_rules.clone()
    }

    pub fn matching_strategy(&self) -> MatchingStrategy {
        self.snapshot.load().strategy
    }

    /// Switches the dialect and re-validates the current rules under it.
    pub fn set_matching_strategy(&self, strategy: MatchingStrategy) {
        self.snapshot
            .rcu(|current| self.partition(current.source.clone(), strategy));
        self.report("Matching strategy updated");
    }
}

impl ReadyChecker for RuleRepository {
    fn name(&self) -> &str {
        "rule_repository"
    }

    fn check(&self) -> Result<(), String> {
        let snapshot = self.snapshot.load();
        if snapshot.rules.len() + snapshot.invalid_rules.len() > 0 {
            Ok(())
        } else {
            Err("no access rules have been loaded".to_string())
        }
    }
}
