//! Stateful streaming: accumulator runtime state and rule firing.

use crate::context::Context;
use crate::error::{EngineError, codes};
use crate::pattern::SimplePattern;
use crate::stylesheet::{AccumulatorDecl, Expr};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use xylem_xdm::{ExpandedName, Node, QName, Value};

/// The distinguished variable bound to the current accumulator value while
/// a rule's new-value expression evaluates.
pub fn value_variable() -> ExpandedName {
    ExpandedName::local("value")
}

#[derive(Clone)]
struct AccumulatorState {
    decl: Rc<AccumulatorDecl>,
    value: Value,
    stack: Vec<Value>,
}

/// Owns one runtime state per declared accumulator and fires pre/post
/// rules as the event stream descends and returns.
///
/// The stack discipline follows streaming semantics exactly: the current
/// value is pushed at element start and popped (without restoring) at
/// element end, because post-descent rules have already folded the
/// children's contribution into the current value.
pub struct AccumulatorManager {
    states: Vec<AccumulatorState>,
}

impl AccumulatorManager {
    pub fn new(decls: &[Rc<AccumulatorDecl>]) -> Self {
        Self {
            states: decls
                .iter()
                .map(|decl| AccumulatorState {
                    decl: decl.clone(),
                    value: Value::empty(),
                    stack: Vec::new(),
                })
                .collect(),
        }
    }

    /// Evaluates every accumulator's initial-value expression.
    pub fn start_document(&mut self, ctx: &Context) -> Result<(), EngineError> {
        for state in &mut self.states {
            state.value = state.decl.initial_value.evaluate(ctx)?;
            state.stack.clear();
        }
        Ok(())
    }

    /// Element start: push the current value, then fire matching
    /// pre-descent rules in registration order.
    pub fn start_element(&mut self, node: &Node, ctx: &Context) -> Result<(), EngineError> {
        for i in 0..self.states.len() {
            let saved = self.states[i].value.clone();
            self.states[i].stack.push(saved);
            let rules = self.states[i].decl.clone();
            for rule in &rules.pre_rules {
                if rule.pattern.matches(node, ctx)? {
                    let next = Self::apply_rule(&self.states[i].value, &rule.new_value, node, ctx)?;
                    self.states[i].value = next;
                }
            }
        }
        Ok(())
    }

    /// Element end: fire matching post-descent rules, then pop the saved
    /// value without restoring it.
    pub fn end_element(&mut self, node: &Node, ctx: &Context) -> Result<(), EngineError> {
        for i in 0..self.states.len() {
            let rules = self.states[i].decl.clone();
            for rule in &rules.post_rules {
                if rule.pattern.matches(node, ctx)? {
                    let next = Self::apply_rule(&self.states[i].value, &rule.new_value, node, ctx)?;
                    self.states[i].value = next;
                }
            }
            self.states[i].stack.pop();
        }
        Ok(())
    }

    fn apply_rule(
        current: &Value,
        new_value: &Rc<dyn Expr>,
        node: &Node,
        ctx: &Context,
    ) -> Result<Value, EngineError> {
        let scope = ctx.variables().push();
        scope.bind(value_variable(), current.clone());
        let rule_ctx = ctx.with_variables(scope).with_current_node(node.clone());
        new_value.evaluate(&rule_ctx)
    }

    fn state(&self, name: &QName) -> Result<&AccumulatorState, EngineError> {
        self.states
            .iter()
            .find(|s| s.decl.name.expanded_eq(name))
            .ok_or_else(|| {
                EngineError::dynamic(
                    codes::UNKNOWN_ACCUMULATOR,
                    format!("no accumulator named '{}'", name),
                )
            })
    }

    /// `accumulator-before`. The timing is the caller's: observed after an
    /// element's pre-descent rules and before its post-descent rules, this
    /// is the value those pre rules produced.
    pub fn before(&self, name: &QName) -> Result<Value, EngineError> {
        Ok(self.state(name)?.value.clone())
    }

    /// `accumulator-after`. Observed between an element's post-descent
    /// rules and its end notification, this is the element's final value.
    pub fn after(&self, name: &QName) -> Result<Value, EngineError> {
        Ok(self.state(name)?.value.clone())
    }

    /// Deep copy for forked processing (`for-each-group` branches); forks
    /// never observe each other's updates.
    pub fn fork(&self) -> Self {
        Self {
            states: self.states.clone(),
        }
    }

    /// Discards all values; `start_document` re-initializes.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            state.value = Value::empty();
            state.stack.clear();
        }
    }
}

impl std::fmt::Debug for AccumulatorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulatorManager")
            .field("accumulators", &self.states.len())
            .finish()
    }
}

// --- Internal accumulators ---

static INTERNAL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Namespace for synthesized accumulator names.
pub const INTERNAL_NS: &str = "urn:x-xylem:internal";

fn internal_name(hint: &str) -> QName {
    let id = INTERNAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    QName::with_namespace(
        Some("xyi".to_string()),
        format!("acc-{}-{}", hint, id),
        Some(INTERNAL_NS.to_string()),
    )
}

struct ValuePlus {
    attribute: Option<ExpandedName>,
}

impl Expr for ValuePlus {
    fn evaluate(&self, ctx: &Context) -> Result<Value, EngineError> {
        let current = match ctx.variable(&value_variable()) {
            crate::context::VariableLookup::Found(v) => v,
            _ => return Err(EngineError::UndefinedVariable(value_variable())),
        };
        let delta = match &self.attribute {
            None => 1.0,
            Some(attr) => ctx
                .context_node()
                .and_then(|n| n.attribute_value(attr))
                .map(|v| Value::string(v).as_number())
                .unwrap_or(0.0),
        };
        Ok(Value::number(current.as_number() + delta))
    }
}

/// Synthesizes the streamable `position()` idiom: the value observed via
/// `before` inside the n-th matching element is n.
pub fn position_accumulator(pattern: &str) -> Result<AccumulatorDecl, EngineError> {
    let pattern = Rc::new(SimplePattern::parse(pattern)?);
    Ok(AccumulatorDecl::new(
        internal_name("position"),
        Rc::new(crate::stylesheet::Literal(Value::number(0.0))),
    )
    .with_pre_rule(pattern, Rc::new(ValuePlus { attribute: None })))
}

/// Synthesizes `count(preceding-sibling::X)`: the value observed via
/// `before` inside a matching element counts the matches already closed.
pub fn preceding_count_accumulator(pattern: &str) -> Result<AccumulatorDecl, EngineError> {
    let pattern = Rc::new(SimplePattern::parse(pattern)?);
    Ok(AccumulatorDecl::new(
        internal_name("count"),
        Rc::new(crate::stylesheet::Literal(Value::number(0.0))),
    )
    .with_post_rule(pattern, Rc::new(ValuePlus { attribute: None })))
}

/// Synthesizes `sum(preceding-sibling::X/@a)` over an attribute.
pub fn preceding_sum_accumulator(
    pattern: &str,
    attribute: ExpandedName,
) -> Result<AccumulatorDecl, EngineError> {
    let pattern = Rc::new(SimplePattern::parse(pattern)?);
    Ok(AccumulatorDecl::new(
        internal_name("sum"),
        Rc::new(crate::stylesheet::Literal(Value::number(0.0))),
    )
    .with_post_rule(
        pattern,
        Rc::new(ValuePlus {
            attribute: Some(attribute),
        }),
    ))
}
