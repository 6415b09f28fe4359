//! Heuristic, deterministic query classifier (spec.md §4.3). Runs no
//! embedding calls and completes in bounded time — pure string matching
//! over a fixed set of patterns, evaluated top to bottom.

use crate::domain::types::{Classification, Intent, Scope, TargetType};
use std::collections::BTreeMap;

const BREADTH_WORDS: [&str; 4] = ["all", "every", "across", "throughout"];
const FRAMEWORK_NAMES: [&str; 8] = [
    "rails", "rspec", "devise", "sidekiq", "graphql-ruby", "activerecord", "actionmailer", "pundit",
];
const STOP_WORDS: [&str; 12] = [
    "How", "What", "Where", "Why", "Does", "Is", "Are", "The", "This", "That", "With", "From",
];

pub struct QueryClassifier;

impl QueryClassifier {
    /// Classify `query`. Deterministic for identical input; never blocks,
    /// never calls an embedding provider.
    pub fn classify(query: &str) -> Classification {
        let normalized = query.trim().to_lowercase();
        let tokens: Vec<&str> = query.split_whitespace().collect();

        let intent = Self::classify_intent(&normalized);
        let scope = Self::classify_scope(&normalized);
        let (target_type, target_confidence) = Self::classify_target(&normalized, &tokens);
        let framework_context = Self::is_framework_context(&normalized);
        let entities = Self::extract_entities(&tokens);

        let mut confidences = BTreeMap::new();
        confidences.insert("target_type".to_string(), target_confidence);
        confidences.insert(
            "framework_context".to_string(),
            if framework_context { 1.0 } else { 0.0 },
        );

        Classification {
            intent,
            scope,
            target_type,
            framework_context,
            entities,
            confidences,
        }
    }

    fn classify_intent(normalized: &str) -> Intent {
        if normalized.contains("error")
            || normalized.contains("bug")
            || normalized.contains("fail")
            || normalized.contains("broken")
            || normalized.contains("crash")
            || normalized.contains("not working")
        {
            return Intent::Debug;
        }
        if normalized.contains("who calls")
            || normalized.contains("call chain")
            || normalized.contains("trace")
            || normalized.contains("flow from")
            || normalized.contains("path from")
        {
            return Intent::Trace;
        }
        if normalized.starts_with("where is")
            || normalized.starts_with("where does")
            || normalized.starts_with("find ")
            || normalized.starts_with("locate ")
        {
            return Intent::Locate;
        }
        if normalized.contains(" vs ") || normalized.contains("compare") || normalized.contains("difference between") {
            return Intent::Compare;
        }
        if normalized.starts_with("how do i implement")
            || normalized.starts_with("add a")
            || normalized.starts_with("create a")
            || normalized.starts_with("build a")
        {
            return Intent::Implement;
        }
        if normalized.contains("signature")
            || normalized.starts_with("list of")
            || normalized.contains("reference for")
            || normalized.contains("api for")
        {
            return Intent::Reference;
        }
        if Self::is_framework_context(normalized) {
            return Intent::Framework;
        }
        Intent::Understand
    }

    fn classify_scope(normalized: &str) -> Scope {
        if BREADTH_WORDS.iter().any(|w| normalized.contains(w)) {
            return Scope::Comprehensive;
        }
        if normalized.starts_with("how does") && normalized.ends_with("work") {
            return Scope::Focused;
        }
        if normalized.contains(" the ") || normalized.starts_with("the ") {
            return Scope::Pinpoint;
        }
        Scope::Exploratory
    }

    fn classify_target(normalized: &str, tokens: &[&str]) -> (TargetType, f64) {
        const HEAD_NOUNS: [(&str, TargetType); 14] = [
            ("model", TargetType::Model),
            ("controller", TargetType::Controller),
            ("service", TargetType::Service),
            ("job", TargetType::Job),
            ("mailer", TargetType::Mailer),
            ("component", TargetType::Component),
            ("concern", TargetType::Concern),
            ("framework", TargetType::Framework),
            ("schema", TargetType::Schema),
            ("route", TargetType::Route),
            ("graphql type", TargetType::GraphqlType),
            ("graphql mutation", TargetType::GraphqlMutation),
            ("graphql resolver", TargetType::GraphqlResolver),
            ("graphql query", TargetType::GraphqlQuery),
        ];
        for (noun, target) in HEAD_NOUNS {
            if normalized.contains(noun) {
                return (target, 0.9);
            }
        }
        if tokens.iter().any(|t| is_camel_case(t)) {
            return (TargetType::Unknown, 0.5);
        }
        (TargetType::Unknown, 0.2)
    }

    fn is_framework_context(normalized: &str) -> bool {
        if FRAMEWORK_NAMES.iter().any(|name| normalized.contains(name)) {
            return true;
        }
        (normalized.contains("what options does") && normalized.contains("support"))
            || normalized.contains("is deprecated")
            || normalized.contains("deprecated in")
    }

    fn extract_entities(tokens: &[&str]) -> Vec<String> {
        let mut entities = Vec::new();
        for token in tokens {
            let cleaned = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != ':');
            if cleaned.is_empty() || STOP_WORDS.contains(&cleaned) {
                continue;
            }
            if is_camel_case(cleaned) {
                entities.push(cleaned.to_string());
            } else if is_snake_case_method(cleaned) {
                entities.push(cleaned.to_string());
            }
        }
        entities.dedup();
        entities
    }
}

fn is_camel_case(token: &str) -> bool {
    let mut chars = token.chars();
    let Some(first) = chars.next() else { return false };
    first.is_uppercase() && token.chars().skip(1).any(|c| c.is_uppercase()) && token.chars().all(|c| c.is_alphanumeric())
}

fn is_snake_case_method(token: &str) -> bool {
    token.contains('_') && token.chars().all(|c| c.is_lowercase() || c == '_' || c.is_numeric())
}
