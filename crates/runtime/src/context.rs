//! The transformation context: an immutable snapshot of evaluation state
//! with fluent derivation.
//!
//! Every `with_*` method returns a new context equal to the receiver except
//! in the named slot. Cheap sharing comes from `Rc` on the rarely-changed
//! fields; scalars travel by value.

use crate::config::ErrorHandling;
use crate::error::{EngineError, codes};
use crate::matcher::TemplateMatcher;
use crate::scope::VariableScope;
use crate::sink::{ErrorSink, LogSink};
use crate::stylesheet::{FunctionLibrary, NullFunctionLibrary, Stylesheet, TemplateRule};
use chrono::{DateTime, FixedOffset, Local};
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use xylem_schema::RuntimeValidator;
use xylem_serializer::OutputHandler;
use xylem_xdm::{ExpandedName, Item, Node, QName, Value};

/// Outcome of a variable lookup. Forward references and cycles are
/// distinguished so global-variable initialization can defer instead of
/// failing.
#[derive(Debug)]
pub enum VariableLookup {
    Found(Value),
    Undefined(ExpandedName),
    Cycle(ExpandedName),
}

/// Capture state of the most recent regex match, for `regex-group()`.
#[derive(Debug, Clone)]
pub struct RegexMatchState {
    pub regex: Rc<Regex>,
    pub groups: Vec<Option<String>>,
}

impl RegexMatchState {
    pub fn group(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Like [`group`](Self::group) but failing on an out-of-range index.
    pub fn require_group(&self, index: usize) -> Result<&str, EngineError> {
        if index >= self.groups.len() {
            return Err(EngineError::dynamic(
                "FORX0001",
                format!("regex group {} out of range", index),
            ));
        }
        Ok(self.group(index).unwrap_or(""))
    }
}

/// The principal output destination and its claim state. Constructed once
/// per transformation; `xsl:result-document` may claim it exactly once,
/// after which implicit writes fail with XTDE1490.
pub struct PrincipalOutput {
    handler: Rc<RefCell<dyn OutputHandler>>,
    claimed: Cell<bool>,
}

impl PrincipalOutput {
    pub fn new(handler: Rc<RefCell<dyn OutputHandler>>) -> Self {
        Self {
            handler,
            claimed: Cell::new(false),
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.get()
    }

    /// Claims the principal destination for an explicit result document.
    pub fn claim(&self) -> Result<Rc<RefCell<dyn OutputHandler>>, EngineError> {
        if self.claimed.replace(true) {
            return Err(EngineError::dynamic(
                codes::CLAIMED_OUTPUT,
                "principal output has already been claimed",
            ));
        }
        Ok(self.handler.clone())
    }

    /// The implicit write path; fails once the destination is claimed.
    pub fn implicit(&self) -> Result<Rc<RefCell<dyn OutputHandler>>, EngineError> {
        if self.claimed.get() {
            return Err(EngineError::dynamic(
                codes::CLAIMED_OUTPUT,
                "implicit write to a claimed principal output",
            ));
        }
        Ok(self.handler.clone())
    }

    /// Bypasses the claim check; used only to flush and close on failure.
    pub fn raw(&self) -> Rc<RefCell<dyn OutputHandler>> {
        self.handler.clone()
    }
}

/// The evaluation context threaded through template execution.
#[derive(Clone)]
pub struct Context {
    stylesheet: Rc<Stylesheet>,
    matcher: Rc<TemplateMatcher>,
    functions: Rc<dyn FunctionLibrary>,
    output: Rc<RefCell<dyn OutputHandler>>,
    principal: Rc<PrincipalOutput>,
    context_node: Option<Node>,
    current_node: Option<Node>,
    context_item: Option<Item>,
    position: usize,
    size: usize,
    mode: Option<QName>,
    variables: VariableScope,
    accumulators: Option<Rc<RefCell<crate::accumulator::AccumulatorManager>>>,
    sink: Rc<dyn ErrorSink>,
    current_rule: Option<Rc<TemplateRule>>,
    base_uri_override: Option<String>,
    validator: Option<Rc<RefCell<RuntimeValidator>>>,
    regex_state: Option<Rc<RegexMatchState>>,
    tunnel: Rc<HashMap<ExpandedName, Value>>,
    variables_in_progress: Rc<RefCell<HashSet<ExpandedName>>>,
    keys_in_progress: Rc<RefCell<HashSet<String>>>,
    current_datetime: DateTime<FixedOffset>,
    error_handling: ErrorHandling,
    strict_typing: bool,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn new(
        stylesheet: Rc<Stylesheet>,
        matcher: Rc<TemplateMatcher>,
        output: Rc<RefCell<dyn OutputHandler>>,
    ) -> Self {
        let strict_typing = stylesheet.strict_typing();
        Self {
            stylesheet,
            matcher,
            functions: Rc::new(NullFunctionLibrary),
            principal: Rc::new(PrincipalOutput::new(output.clone())),
            output,
            context_node: None,
            current_node: None,
            context_item: None,
            position: 1,
            size: 1,
            mode: None,
            variables: VariableScope::new(),
            accumulators: None,
            sink: Rc::new(LogSink),
            current_rule: None,
            base_uri_override: None,
            validator: None,
            regex_state: None,
            tunnel: Rc::new(HashMap::new()),
            variables_in_progress: Rc::new(RefCell::new(HashSet::new())),
            keys_in_progress: Rc::new(RefCell::new(HashSet::new())),
            // Fixed once per transformation, as current-dateTime requires.
            current_datetime: Local::now().fixed_offset(),
            error_handling: ErrorHandling::Strict,
            strict_typing,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    // --- Accessors ---

    pub fn stylesheet(&self) -> &Rc<Stylesheet> {
        &self.stylesheet
    }

    pub fn matcher(&self) -> &Rc<TemplateMatcher> {
        &self.matcher
    }

    pub fn functions(&self) -> &Rc<dyn FunctionLibrary> {
        &self.functions
    }

    pub fn output(&self) -> Rc<RefCell<dyn OutputHandler>> {
        self.output.clone()
    }

    pub fn principal_output(&self) -> &Rc<PrincipalOutput> {
        &self.principal
    }

    pub fn context_node(&self) -> Option<&Node> {
        self.context_node.as_ref()
    }

    pub fn current_node(&self) -> Option<&Node> {
        self.current_node.as_ref()
    }

    pub fn context_item(&self) -> Option<&Item> {
        self.context_item.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn mode(&self) -> Option<&QName> {
        self.mode.as_ref()
    }

    pub fn variables(&self) -> &VariableScope {
        &self.variables
    }

    pub fn accumulators(
        &self,
    ) -> Option<&Rc<RefCell<crate::accumulator::AccumulatorManager>>> {
        self.accumulators.as_ref()
    }

    pub fn sink(&self) -> &Rc<dyn ErrorSink> {
        &self.sink
    }

    pub fn current_rule(&self) -> Option<&Rc<TemplateRule>> {
        self.current_rule.as_ref()
    }

    pub fn validator(&self) -> Option<&Rc<RefCell<RuntimeValidator>>> {
        self.validator.as_ref()
    }

    pub fn regex_state(&self) -> Option<&Rc<RegexMatchState>> {
        self.regex_state.as_ref()
    }

    pub fn tunnel_parameters(&self) -> &HashMap<ExpandedName, Value> {
        &self.tunnel
    }

    pub fn current_datetime(&self) -> DateTime<FixedOffset> {
        self.current_datetime
    }

    pub fn error_handling(&self) -> ErrorHandling {
        self.error_handling
    }

    pub fn strict_typing(&self) -> bool {
        self.strict_typing
    }

    /// The per-instruction base-URI override if set, otherwise the
    /// stylesheet's base URI.
    pub fn static_base_uri(&self) -> Option<&str> {
        self.base_uri_override
            .as_deref()
            .or(self.stylesheet.base_uri.as_deref())
    }

    // --- Fluent derivation ---

    /// Changes only the XPath context node, as predicate evaluation inside
    /// patterns does.
    pub fn with_context_node(&self, node: Node) -> Self {
        let mut next = self.clone();
        next.context_node = Some(node);
        next
    }

    /// Template entry and `for-each` iteration: moves the XSLT `current()`
    /// node and the XPath context node together.
    pub fn with_current_node(&self, node: Node) -> Self {
        let mut next = self.clone();
        next.context_node = Some(node.clone());
        next.current_node = Some(node);
        next
    }

    pub fn with_context_item(&self, item: Item) -> Self {
        let mut next = self.clone();
        next.context_item = Some(item);
        next
    }

    pub fn with_position_and_size(&self, position: usize, size: usize) -> Self {
        let mut next = self.clone();
        next.position = position;
        next.size = size;
        next
    }

    pub fn with_mode(&self, mode: Option<QName>) -> Self {
        let mut next = self.clone();
        next.mode = mode;
        next
    }

    pub fn with_variables(&self, variables: VariableScope) -> Self {
        let mut next = self.clone();
        next.variables = variables;
        next
    }

    pub fn with_functions(&self, functions: Rc<dyn FunctionLibrary>) -> Self {
        let mut next = self.clone();
        next.functions = functions;
        next
    }

    /// Redirects the primary output; the principal destination is fixed.
    pub fn with_output(&self, output: Rc<RefCell<dyn OutputHandler>>) -> Self {
        let mut next = self.clone();
        next.output = output;
        next
    }

    pub fn with_accumulators(
        &self,
        manager: Rc<RefCell<crate::accumulator::AccumulatorManager>>,
    ) -> Self {
        let mut next = self.clone();
        next.accumulators = Some(manager);
        next
    }

    pub fn with_sink(&self, sink: Rc<dyn ErrorSink>) -> Self {
        let mut next = self.clone();
        next.sink = sink;
        next
    }

    pub fn with_current_rule(&self, rule: Rc<TemplateRule>) -> Self {
        let mut next = self.clone();
        next.current_rule = Some(rule);
        next
    }

    pub fn with_static_base_uri(&self, uri: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.base_uri_override = Some(uri.into());
        next
    }

    pub fn with_validator(&self, validator: Rc<RefCell<RuntimeValidator>>) -> Self {
        let mut next = self.clone();
        next.validator = Some(validator);
        next
    }

    pub fn with_regex_state(&self, state: RegexMatchState) -> Self {
        let mut next = self.clone();
        next.regex_state = Some(Rc::new(state));
        next
    }

    pub fn with_error_handling(&self, mode: ErrorHandling) -> Self {
        let mut next = self.clone();
        next.error_handling = mode;
        next
    }

    /// Merges new tunnel parameters over the inherited ones; additions win
    /// on collision.
    pub fn with_tunnel_parameters(&self, additions: HashMap<ExpandedName, Value>) -> Self {
        let mut next = self.clone();
        if !additions.is_empty() {
            let mut merged = (*self.tunnel).clone();
            merged.extend(additions);
            next.tunnel = Rc::new(merged);
        }
        next
    }

    pub fn with_no_tunnel_parameters(&self) -> Self {
        let mut next = self.clone();
        next.tunnel = Rc::new(HashMap::new());
        next
    }

    // --- Variables and circularity ---

    /// Looks a variable up, reporting in-progress evaluation as a cycle.
    pub fn variable(&self, name: &ExpandedName) -> VariableLookup {
        if self.variables_in_progress.borrow().contains(name) {
            return VariableLookup::Cycle(name.clone());
        }
        match self.variables.lookup(name) {
            Some(value) => VariableLookup::Found(value),
            None => VariableLookup::Undefined(name.clone()),
        }
    }

    /// Like [`variable`](Self::variable) but converting the non-found
    /// outcomes into errors, the behavior expressions want outside global
    /// initialization.
    pub fn variable_value(&self, name: &ExpandedName) -> Result<Value, EngineError> {
        match self.variable(name) {
            VariableLookup::Found(value) => Ok(value),
            VariableLookup::Undefined(name) => Err(EngineError::UndefinedVariable(name)),
            VariableLookup::Cycle(name) => {
                Err(EngineError::CircularReference(vec![name.to_string()]))
            }
        }
    }

    /// The primary output, routed through the principal claim check when
    /// the primary destination *is* the principal one. Implicit writes to
    /// a claimed principal output fail with XTDE1490.
    pub fn checked_output(
        &self,
    ) -> Result<Rc<RefCell<dyn OutputHandler>>, EngineError> {
        if Rc::ptr_eq(&self.output, &self.principal.raw()) {
            self.principal.implicit()
        } else {
            Ok(self.output.clone())
        }
    }

    /// Marks a variable as being evaluated. A second entry for the same
    /// name is the circular-reference error.
    pub fn enter_variable(&self, name: &ExpandedName) -> Result<(), EngineError> {
        if !self.variables_in_progress.borrow_mut().insert(name.clone()) {
            return Err(EngineError::CircularReference(vec![name.to_string()]));
        }
        Ok(())
    }

    pub fn exit_variable(&self, name: &ExpandedName) {
        self.variables_in_progress.borrow_mut().remove(name);
    }

    pub fn enter_key(&self, key: &str) -> Result<(), EngineError> {
        if !self.keys_in_progress.borrow_mut().insert(key.to_string()) {
            return Err(EngineError::CircularReference(vec![key.to_string()]));
        }
        Ok(())
    }

    pub fn exit_key(&self, key: &str) {
        self.keys_in_progress.borrow_mut().remove(key);
    }

    // --- Cancellation ---

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        use xylem_serializer::BufferingHandler;
        let stylesheet = Rc::new(Stylesheet::new("3.0"));
        let matcher = Rc::new(TemplateMatcher::new(&stylesheet));
        let output: Rc<RefCell<dyn OutputHandler>> =
            Rc::new(RefCell::new(BufferingHandler::new()));
        Context::new(stylesheet, matcher, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_updates_only_named_slot() {
        let ctx = Context::for_tests();
        let node = Node::new_element(QName::new("a"));
        let derived = ctx.with_current_node(node.clone()).with_position_and_size(3, 9);

        assert!(ctx.current_node().is_none());
        assert!(derived.current_node().unwrap().same_node(&node));
        assert_eq!(derived.position(), 3);
        assert_eq!(derived.size(), 9);
        assert_eq!(ctx.position(), 1);
        // Shared per-evaluation state stays shared.
        assert_eq!(ctx.current_datetime(), derived.current_datetime());
    }

    #[test]
    fn test_context_node_does_not_move_current() {
        let ctx = Context::for_tests();
        let a = Node::new_element(QName::new("a"));
        let b = Node::new_element(QName::new("b"));
        let entered = ctx.with_current_node(a.clone());
        let predicate = entered.with_context_node(b.clone());
        assert!(predicate.current_node().unwrap().same_node(&a));
        assert!(predicate.context_node().unwrap().same_node(&b));
    }

    #[test]
    fn test_tunnel_merge_and_clear() {
        let ctx = Context::for_tests();
        let mut first = HashMap::new();
        first.insert(ExpandedName::local("a"), Value::number(1.0));
        first.insert(ExpandedName::local("b"), Value::number(2.0));
        let with_first = ctx.with_tunnel_parameters(first);

        let mut second = HashMap::new();
        second.insert(ExpandedName::local("b"), Value::number(20.0));
        second.insert(ExpandedName::local("c"), Value::number(3.0));
        let with_second = with_first.with_tunnel_parameters(second);

        let tunnel = with_second.tunnel_parameters();
        assert_eq!(tunnel.len(), 3);
        assert_eq!(tunnel[&ExpandedName::local("b")].as_number(), 20.0);
        assert_eq!(tunnel[&ExpandedName::local("a")].as_number(), 1.0);

        assert!(with_second.with_no_tunnel_parameters().tunnel_parameters().is_empty());
        // The originals are untouched.
        assert_eq!(with_first.tunnel_parameters().len(), 2);
    }

    #[test]
    fn test_variable_cycle_detection() {
        let ctx = Context::for_tests();
        let name = ExpandedName::local("x");
        ctx.enter_variable(&name).unwrap();
        assert!(matches!(ctx.variable(&name), VariableLookup::Cycle(_)));
        assert!(ctx.enter_variable(&name).is_err());
        ctx.exit_variable(&name);
        assert!(matches!(ctx.variable(&name), VariableLookup::Undefined(_)));
    }

    #[test]
    fn test_in_progress_set_is_shared_across_derivation() {
        let ctx = Context::for_tests();
        let name = ExpandedName::local("x");
        let derived = ctx.with_position_and_size(2, 2);
        ctx.enter_variable(&name).unwrap();
        assert!(matches!(derived.variable(&name), VariableLookup::Cycle(_)));
    }

    #[test]
    fn test_principal_claiming_is_single_shot() {
        let ctx = Context::for_tests();
        let principal = ctx.principal_output();
        assert!(principal.implicit().is_ok());
        principal.claim().unwrap();
        let again = principal.claim();
        assert_eq!(again.unwrap_err().code(), Some("XTDE1490"));
        let implicit = principal.implicit();
        assert_eq!(implicit.unwrap_err().code(), Some("XTDE1490"));
    }

    #[test]
    fn test_cancellation_flag() {
        let ctx = Context::for_tests();
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel_flag().store(true, Ordering::Relaxed);
        assert!(matches!(ctx.check_cancelled(), Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_regex_state_groups() {
        let ctx = Context::for_tests();
        assert!(ctx.regex_state().is_none());
        let state = RegexMatchState {
            regex: Rc::new(Regex::new("(a)(b)?").unwrap()),
            groups: vec![Some("ab".to_string()), Some("a".to_string()), None],
        };
        let derived = ctx.with_regex_state(state);
        let state = derived.regex_state().unwrap();
        assert_eq!(state.group(1), Some("a"));
        assert_eq!(state.require_group(2).unwrap(), "");
        let err = state.require_group(9).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_static_base_uri_override() {
        let ctx = Context::for_tests();
        assert!(ctx.static_base_uri().is_none());
        let derived = ctx.with_static_base_uri("file:///x/y.xsl");
        assert_eq!(derived.static_base_uri(), Some("file:///x/y.xsl"));
    }
}
