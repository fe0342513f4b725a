//! The template matcher: mode-indexed rule lists with conflict resolution
//! and built-in fallback rules.

use crate::context::Context;
use crate::error::EngineError;
use crate::stylesheet::{EmptyBody, OnNoMatch, Stylesheet, TemplateRule};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use xylem_xdm::{Node, QName};

/// Namespace reserved for the built-in rule singletons.
pub const BUILTIN_NS: &str = "urn:x-xylem:built-in";

fn builtin_local(action: OnNoMatch) -> &'static str {
    match action {
        OnNoMatch::TextOnlyCopy => "text-only-copy",
        OnNoMatch::ShallowCopy => "shallow-copy",
        OnNoMatch::DeepCopy => "deep-copy",
        OnNoMatch::ShallowSkip => "shallow-skip",
        OnNoMatch::DeepSkip => "deep-skip",
        OnNoMatch::Fail => "fail",
    }
}

/// True when the rule is one of the built-in singletons.
pub fn is_builtin(rule: &TemplateRule) -> bool {
    rule.name
        .as_ref()
        .is_some_and(|n| n.namespace_uri.as_deref() == Some(BUILTIN_NS))
}

/// The on-no-match behavior a built-in rule stands for.
pub fn builtin_action(rule: &TemplateRule) -> Option<OnNoMatch> {
    let name = rule.name.as_ref()?;
    if name.namespace_uri.as_deref() != Some(BUILTIN_NS) {
        return None;
    }
    match name.local_name.as_str() {
        "text-only-copy" => Some(OnNoMatch::TextOnlyCopy),
        "shallow-copy" => Some(OnNoMatch::ShallowCopy),
        "deep-copy" => Some(OnNoMatch::DeepCopy),
        "shallow-skip" => Some(OnNoMatch::ShallowSkip),
        "deep-skip" => Some(OnNoMatch::DeepSkip),
        "fail" => Some(OnNoMatch::Fail),
        _ => None,
    }
}

fn conflict_order(a: &Rc<TemplateRule>, b: &Rc<TemplateRule>) -> Ordering {
    b.import_precedence
        .cmp(&a.import_precedence)
        .then_with(|| b.effective_priority().total_cmp(&a.effective_priority()))
        .then_with(|| b.declaration_index.cmp(&a.declaration_index))
}

/// Indexes pattern rules by mode at construction and resolves matches in
/// conflict order: import precedence, then priority, then declaration
/// index, all descending (later declarations win ties).
pub struct TemplateMatcher {
    by_mode: HashMap<String, Vec<Rc<TemplateRule>>>,
    on_no_match: HashMap<String, OnNoMatch>,
    builtins: HashMap<&'static str, Rc<TemplateRule>>,
}

impl TemplateMatcher {
    pub fn new(stylesheet: &Stylesheet) -> Self {
        let mut by_mode: HashMap<String, Vec<Rc<TemplateRule>>> = HashMap::new();
        for rule in &stylesheet.templates {
            by_mode
                .entry(Stylesheet::mode_key(rule.mode.as_ref()))
                .or_default()
                .push(rule.clone());
        }
        for rules in by_mode.values_mut() {
            rules.sort_by(conflict_order);
        }

        let on_no_match = stylesheet
            .modes
            .iter()
            .map(|(key, decl)| (key.clone(), decl.on_no_match))
            .collect();

        let mut builtins = HashMap::new();
        for action in [
            OnNoMatch::TextOnlyCopy,
            OnNoMatch::ShallowCopy,
            OnNoMatch::DeepCopy,
            OnNoMatch::ShallowSkip,
            OnNoMatch::DeepSkip,
            OnNoMatch::Fail,
        ] {
            let local = builtin_local(action);
            let name = QName::with_namespace(
                Some("xyb".to_string()),
                local,
                Some(BUILTIN_NS.to_string()),
            );
            builtins.insert(local, Rc::new(TemplateRule::named(name, Rc::new(EmptyBody))));
        }

        Self {
            by_mode,
            on_no_match,
            builtins,
        }
    }

    fn rules(&self, mode: Option<&QName>) -> &[Rc<TemplateRule>] {
        self.by_mode
            .get(&Stylesheet::mode_key(mode))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The built-in rule for a mode's on-no-match setting.
    pub fn builtin_rule(&self, mode: Option<&QName>) -> Rc<TemplateRule> {
        let action = self
            .on_no_match
            .get(&Stylesheet::mode_key(mode))
            .copied()
            .unwrap_or_default();
        self.builtins[builtin_local(action)].clone()
    }

    /// Finds the best-matching rule for a node, falling back to the mode's
    /// built-in rule.
    pub fn find_match(
        &self,
        node: &Node,
        mode: Option<&QName>,
        ctx: &Context,
    ) -> Result<Rc<TemplateRule>, EngineError> {
        for rule in self.rules(mode) {
            if let Some(pattern) = &rule.pattern
                && pattern.matches(node, ctx)?
            {
                return Ok(rule.clone());
            }
        }
        Ok(self.builtin_rule(mode))
    }

    /// For `xsl:next-match`: the next rule past `current` in conflict
    /// order that matches, or the built-in rule.
    pub fn find_next_match(
        &self,
        node: &Node,
        mode: Option<&QName>,
        current: &Rc<TemplateRule>,
        ctx: &Context,
    ) -> Result<Rc<TemplateRule>, EngineError> {
        let mut past_current = false;
        for rule in self.rules(mode) {
            if Rc::ptr_eq(rule, current) {
                past_current = true;
                continue;
            }
            if !past_current {
                continue;
            }
            if let Some(pattern) = &rule.pattern
                && pattern.matches(node, ctx)?
            {
                return Ok(rule.clone());
            }
        }
        Ok(self.builtin_rule(mode))
    }

    /// For `xsl:apply-imports`: the best match among rules of strictly
    /// lower import precedence than the current rule's.
    pub fn find_import_match(
        &self,
        node: &Node,
        mode: Option<&QName>,
        current: &Rc<TemplateRule>,
        ctx: &Context,
    ) -> Result<Rc<TemplateRule>, EngineError> {
        for rule in self.rules(mode) {
            if rule.import_precedence >= current.import_precedence {
                continue;
            }
            if let Some(pattern) = &rule.pattern
                && pattern.matches(node, ctx)?
            {
                return Ok(rule.clone());
            }
        }
        Ok(self.builtin_rule(mode))
    }
}

impl std::fmt::Debug for TemplateMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateMatcher")
            .field("modes", &self.by_mode.len())
            .finish()
    }
}
