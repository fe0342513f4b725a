//! The compiled-stylesheet handle the runtime executes.
//!
//! Template bodies, XPath expressions and match patterns arrive from the
//! compiler as opaque executable objects; the runtime only drives them.

use crate::context::Context;
use crate::error::EngineError;
use crate::pattern::Pattern;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use xylem_xdm::{ExpandedName, QName, Value};

/// An executable template body: a sequence constructor writing result
/// events through the context's output handler.
pub trait TemplateBody {
    fn execute(&self, ctx: &Context) -> Result<(), EngineError>;
}

/// A compiled XPath expression, evaluated against a context to a typed
/// value. The evaluator behind it is a black box to the runtime.
pub trait Expr {
    fn evaluate(&self, ctx: &Context) -> Result<Value, EngineError>;
}

/// An extension-function library made available to expressions.
pub trait FunctionLibrary {
    fn call(&self, name: &QName, args: &[Value], ctx: &Context) -> Result<Value, EngineError>;
}

/// The default library: every call is an error.
#[derive(Debug, Default)]
pub struct NullFunctionLibrary;

impl FunctionLibrary for NullFunctionLibrary {
    fn call(&self, name: &QName, _args: &[Value], _ctx: &Context) -> Result<Value, EngineError> {
        Err(EngineError::dynamic(
            "XPST0017",
            format!("unknown function {}", name),
        ))
    }
}

/// A body made from a closure; the usual way tests and embedders provide
/// sequence constructors.
pub struct FnBody<F>(pub F);

impl<F> TemplateBody for FnBody<F>
where
    F: Fn(&Context) -> Result<(), EngineError>,
{
    fn execute(&self, ctx: &Context) -> Result<(), EngineError> {
        (self.0)(ctx)
    }
}

/// The empty sequence constructor.
pub struct EmptyBody;

impl TemplateBody for EmptyBody {
    fn execute(&self, _ctx: &Context) -> Result<(), EngineError> {
        Ok(())
    }
}

/// An expression made from a closure.
pub struct FnExpr<F>(pub F);

impl<F> Expr for FnExpr<F>
where
    F: Fn(&Context) -> Result<Value, EngineError>,
{
    fn evaluate(&self, ctx: &Context) -> Result<Value, EngineError> {
        (self.0)(ctx)
    }
}

/// A literal value expression.
pub struct Literal(pub Value);

impl Expr for Literal {
    fn evaluate(&self, _ctx: &Context) -> Result<Value, EngineError> {
        Ok(self.0.clone())
    }
}

/// What a mode does when no user rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnNoMatch {
    #[default]
    TextOnlyCopy,
    ShallowCopy,
    DeepCopy,
    ShallowSkip,
    DeepSkip,
    Fail,
}

#[derive(Debug, Clone)]
pub struct ModeDecl {
    pub name: Option<QName>,
    pub on_no_match: OnNoMatch,
}

/// A declared template parameter.
pub struct TemplateParam {
    pub name: QName,
    pub select: Option<Rc<dyn Expr>>,
    /// Default content executed into a result-tree fragment when neither a
    /// caller value nor a select default exists.
    pub default_body: Option<Rc<dyn TemplateBody>>,
    pub tunnel: bool,
    pub required: bool,
}

impl TemplateParam {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            select: None,
            default_body: None,
            tunnel: false,
            required: false,
        }
    }

    pub fn with_select(mut self, select: Rc<dyn Expr>) -> Self {
        self.select = Some(select);
        self
    }

    pub fn with_default_body(mut self, body: Rc<dyn TemplateBody>) -> Self {
        self.default_body = Some(body);
        self
    }

    pub fn tunnel(mut self) -> Self {
        self.tunnel = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One template rule. Conflict resolution orders rules by import
/// precedence, then priority, then declaration index, all descending.
pub struct TemplateRule {
    pub pattern: Option<Rc<dyn Pattern>>,
    pub name: Option<QName>,
    pub mode: Option<QName>,
    pub priority: Option<f64>,
    pub import_precedence: u32,
    pub declaration_index: u32,
    pub params: Vec<TemplateParam>,
    pub body: Rc<dyn TemplateBody>,
    /// True when execution needs a materialized subtree (reverse axes,
    /// `last()`, sorting); the streaming handler grounds the subtree first.
    pub grounded: bool,
}

impl TemplateRule {
    pub fn matching(pattern: Rc<dyn Pattern>, body: Rc<dyn TemplateBody>) -> Self {
        Self {
            pattern: Some(pattern),
            name: None,
            mode: None,
            priority: None,
            import_precedence: 0,
            declaration_index: 0,
            params: Vec::new(),
            body,
            grounded: false,
        }
    }

    pub fn named(name: QName, body: Rc<dyn TemplateBody>) -> Self {
        Self {
            pattern: None,
            name: Some(name),
            mode: None,
            priority: None,
            import_precedence: 0,
            declaration_index: 0,
            params: Vec::new(),
            body,
            grounded: false,
        }
    }

    pub fn with_mode(mut self, mode: QName) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_import_precedence(mut self, precedence: u32) -> Self {
        self.import_precedence = precedence;
        self
    }

    pub fn with_param(mut self, param: TemplateParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_grounding(mut self) -> Self {
        self.grounded = true;
        self
    }

    /// Explicit priority, or the pattern's computed default.
    pub fn effective_priority(&self) -> f64 {
        self.priority.unwrap_or_else(|| {
            self.pattern
                .as_ref()
                .map(|p| p.default_priority())
                .unwrap_or(0.0)
        })
    }
}

impl fmt::Debug for TemplateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRule")
            .field("pattern", &self.pattern.as_ref().map(|p| p.text().to_string()))
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("priority", &self.priority)
            .field("import_precedence", &self.import_precedence)
            .field("declaration_index", &self.declaration_index)
            .finish()
    }
}

/// An accumulator rule fired at element start (pre-descent) or end
/// (post-descent).
pub struct AccumulatorRule {
    pub pattern: Rc<dyn Pattern>,
    pub new_value: Rc<dyn Expr>,
}

/// A declared accumulator.
pub struct AccumulatorDecl {
    pub name: QName,
    pub initial_value: Rc<dyn Expr>,
    pub pre_rules: Vec<AccumulatorRule>,
    pub post_rules: Vec<AccumulatorRule>,
}

impl AccumulatorDecl {
    pub fn new(name: QName, initial_value: Rc<dyn Expr>) -> Self {
        Self {
            name,
            initial_value,
            pre_rules: Vec::new(),
            post_rules: Vec::new(),
        }
    }

    pub fn with_pre_rule(mut self, pattern: Rc<dyn Pattern>, new_value: Rc<dyn Expr>) -> Self {
        self.pre_rules.push(AccumulatorRule { pattern, new_value });
        self
    }

    pub fn with_post_rule(mut self, pattern: Rc<dyn Pattern>, new_value: Rc<dyn Expr>) -> Self {
        self.post_rules.push(AccumulatorRule { pattern, new_value });
        self
    }
}

impl fmt::Debug for AccumulatorDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorDecl")
            .field("name", &self.name)
            .field("pre_rules", &self.pre_rules.len())
            .field("post_rules", &self.post_rules.len())
            .finish()
    }
}

/// A global variable declaration. Globals may reference each other in any
/// declaration order; the transformer iterates to a fixpoint.
pub struct GlobalVariable {
    pub name: QName,
    pub expr: Rc<dyn Expr>,
}

/// The compiled stylesheet.
pub struct Stylesheet {
    pub version: String,
    pub base_uri: Option<String>,
    pub templates: Vec<Rc<TemplateRule>>,
    pub named_templates: HashMap<ExpandedName, Rc<TemplateRule>>,
    pub modes: HashMap<String, ModeDecl>,
    pub global_variables: Vec<GlobalVariable>,
    pub accumulators: Vec<Rc<AccumulatorDecl>>,
    pub strip_space: Vec<String>,
    pub preserve_space: Vec<String>,
}

impl Stylesheet {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            base_uri: None,
            templates: Vec::new(),
            named_templates: HashMap::new(),
            modes: HashMap::new(),
            global_variables: Vec::new(),
            accumulators: Vec::new(),
            strip_space: Vec::new(),
            preserve_space: Vec::new(),
        }
    }

    /// Registers a rule, assigning its declaration index. Later
    /// declarations win ties, so the index is the running count.
    pub fn add_template(&mut self, mut rule: TemplateRule) -> Rc<TemplateRule> {
        rule.declaration_index = self.templates.len() as u32;
        let rule = Rc::new(rule);
        if let Some(name) = &rule.name {
            self.named_templates.insert(name.expanded(), rule.clone());
        }
        if rule.pattern.is_some() {
            self.templates.push(rule.clone());
        }
        rule
    }

    pub fn add_mode(&mut self, decl: ModeDecl) {
        self.modes.insert(Self::mode_key(decl.name.as_ref()), decl);
    }

    pub fn add_global_variable(&mut self, name: QName, expr: Rc<dyn Expr>) {
        self.global_variables.push(GlobalVariable { name, expr });
    }

    pub fn add_accumulator(&mut self, decl: AccumulatorDecl) {
        self.accumulators.push(Rc::new(decl));
    }

    pub fn mode_key(mode: Option<&QName>) -> String {
        mode.map(|m| m.clark()).unwrap_or_default()
    }

    pub fn on_no_match(&self, mode: Option<&QName>) -> OnNoMatch {
        self.modes
            .get(&Self::mode_key(mode))
            .map(|m| m.on_no_match)
            .unwrap_or_default()
    }

    /// XPath 2.0+ stylesheets get strict typing; 1.0 keeps the
    /// backwards-compatible coercions.
    pub fn strict_typing(&self) -> bool {
        !self.version.starts_with("1.")
    }
}

impl fmt::Debug for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stylesheet")
            .field("version", &self.version)
            .field("templates", &self.templates.len())
            .field("named_templates", &self.named_templates.len())
            .field("accumulators", &self.accumulators.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::SimplePattern;

    #[test]
    fn test_declaration_index_assignment() {
        let mut stylesheet = Stylesheet::new("3.0");
        let body: Rc<dyn TemplateBody> = Rc::new(EmptyBody);
        let a = stylesheet.add_template(TemplateRule::matching(
            Rc::new(SimplePattern::parse("a").unwrap()),
            body.clone(),
        ));
        let b = stylesheet.add_template(TemplateRule::matching(
            Rc::new(SimplePattern::parse("b").unwrap()),
            body,
        ));
        assert_eq!(a.declaration_index, 0);
        assert_eq!(b.declaration_index, 1);
    }

    #[test]
    fn test_named_template_registration() {
        let mut stylesheet = Stylesheet::new("3.0");
        stylesheet.add_template(TemplateRule::named(
            QName::new("main"),
            Rc::new(EmptyBody),
        ));
        assert!(stylesheet.named_templates.contains_key(&ExpandedName::local("main")));
        assert!(stylesheet.templates.is_empty());
    }

    #[test]
    fn test_effective_priority_falls_back_to_pattern() {
        let rule = TemplateRule::matching(
            Rc::new(SimplePattern::parse("*").unwrap()),
            Rc::new(EmptyBody),
        );
        assert_eq!(rule.effective_priority(), -0.5);
        let explicit = rule.with_priority(2.0);
        assert_eq!(explicit.effective_priority(), 2.0);
    }

    #[test]
    fn test_strict_typing_by_version() {
        assert!(!Stylesheet::new("1.0").strict_typing());
        assert!(Stylesheet::new("2.0").strict_typing());
        assert!(Stylesheet::new("3.0").strict_typing());
    }

    #[test]
    fn test_on_no_match_default() {
        let mut stylesheet = Stylesheet::new("3.0");
        assert_eq!(stylesheet.on_no_match(None), OnNoMatch::TextOnlyCopy);
        stylesheet.add_mode(ModeDecl {
            name: Some(QName::new("table")),
            on_no_match: OnNoMatch::ShallowSkip,
        });
        assert_eq!(
            stylesheet.on_no_match(Some(&QName::new("table"))),
            OnNoMatch::ShallowSkip
        );
    }
}
