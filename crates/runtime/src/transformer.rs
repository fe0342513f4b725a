//! The top-level transformer: orchestrates tree building, global-variable
//! initialization, template application, built-in rules, and the output
//! lifecycle.

use crate::config::{ErrorHandling, TransformOptions};
use crate::context::Context;
use crate::error::{EngineError, codes};
use crate::loader::DocumentLoader;
use crate::matcher::{TemplateMatcher, builtin_action};
use crate::sink::{CollectingSink, Diagnostic, ErrorSink, Severity};
use crate::source;
use crate::space::SpaceStripper;
use crate::stylesheet::{
    FunctionLibrary, OnNoMatch, Stylesheet, TemplateBody, TemplateRule,
};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use xylem_schema::{RuntimeValidator, Schema};
use xylem_serializer::{BufferingHandler, OutputHandler, ResultDocumentHandler, Serializer};
use xylem_xdm::{
    EventAttribute, EventBuffer, Node, NodeKind, QName, SourceEventHandler, TreeBuilder, Value,
};

pub struct Transformer {
    stylesheet: Rc<Stylesheet>,
    matcher: Rc<TemplateMatcher>,
    options: TransformOptions,
    sink: Rc<dyn ErrorSink>,
    functions: Option<Rc<dyn FunctionLibrary>>,
    schema: Option<Rc<Schema>>,
    loader: Option<Rc<DocumentLoader>>,
}

impl Transformer {
    pub fn new(
        stylesheet: Rc<Stylesheet>,
        options: TransformOptions,
    ) -> Result<Self, EngineError> {
        // Surface malformed space patterns as configuration errors up
        // front rather than mid-transformation.
        SpaceStripper::from_patterns(&options.strip_space, &options.preserve_space)?;
        let matcher = Rc::new(TemplateMatcher::new(&stylesheet));
        Ok(Self {
            stylesheet,
            matcher,
            options,
            sink: Rc::new(crate::sink::LogSink),
            functions: None,
            schema: None,
            loader: None,
        })
    }

    pub fn with_sink(mut self, sink: Rc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_functions(mut self, functions: Rc<dyn FunctionLibrary>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_schema(mut self, schema: Rc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_loader(mut self, loader: Rc<DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn stylesheet(&self) -> &Rc<Stylesheet> {
        &self.stylesheet
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    pub fn document_loader(&self) -> Option<&Rc<DocumentLoader>> {
        self.loader.as_ref()
    }

    /// The merged whitespace policy: stylesheet declarations plus options.
    pub fn space_stripper(&self) -> Result<SpaceStripper, EngineError> {
        let mut strip = self.stylesheet.strip_space.clone();
        strip.extend(self.options.strip_space.iter().cloned());
        let mut preserve = self.stylesheet.preserve_space.clone();
        preserve.extend(self.options.preserve_space.iter().cloned());
        SpaceStripper::from_patterns(&strip, &preserve)
    }

    /// Parses a document into a fully navigable source tree, applying the
    /// whitespace policy.
    pub fn build_source_tree(&self, xml: &str) -> Result<Node, EngineError> {
        let stripper = self.space_stripper()?;
        let mut builder = if stripper.is_empty() {
            TreeBuilder::new()
        } else {
            TreeBuilder::new().with_space_filter(move |name| stripper.should_strip(name))
        };
        source::parse_document(xml, &mut builder)?;
        Ok(builder.finish())
    }

    /// A fresh per-transformation context bound to the given principal
    /// output.
    pub fn fresh_context(&self, output: Rc<RefCell<dyn OutputHandler>>) -> Context {
        let mut ctx = Context::new(self.stylesheet.clone(), self.matcher.clone(), output)
            .with_sink(self.sink.clone())
            .with_error_handling(self.options.error_handling);
        if let Some(functions) = &self.functions {
            ctx = ctx.with_functions(functions.clone());
        }
        if !self.stylesheet.accumulators.is_empty() {
            let manager =
                crate::accumulator::AccumulatorManager::new(&self.stylesheet.accumulators);
            ctx = ctx.with_accumulators(Rc::new(RefCell::new(manager)));
        }
        if let Some(schema) = &self.schema {
            ctx = ctx.with_validator(Rc::new(RefCell::new(RuntimeValidator::new(schema.clone()))));
        }
        ctx
    }

    /// Runs the transformation over a built source tree. On failure the
    /// open output is flushed before the error is rethrown.
    pub fn run(
        &self,
        source_root: &Node,
        output: Rc<RefCell<dyn OutputHandler>>,
    ) -> Result<(), EngineError> {
        let ctx = self.fresh_context(output);
        match self.run_with_context(source_root, &ctx) {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = ctx.principal_output().raw().borrow_mut().flush();
                self.sink.report(
                    &Diagnostic::new(Severity::Fatal, err.to_string())
                        .with_code(err.code().unwrap_or("XTDE0000")),
                );
                Err(err)
            }
        }
    }

    fn run_with_context(&self, source_root: &Node, ctx: &Context) -> Result<(), EngineError> {
        if let Some(manager) = ctx.accumulators() {
            manager.borrow_mut().start_document(ctx)?;
        }
        self.evaluate_globals(ctx)?;

        let out = ctx.checked_output()?;
        out.borrow_mut().start_document()?;

        match &self.options.initial_template {
            Some(name) => {
                let rule = ctx
                    .stylesheet()
                    .named_templates
                    .get(&name.expanded())
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::dynamic(
                            codes::MISSING_INITIAL_TEMPLATE,
                            format!("no template named '{}'", name),
                        )
                    })?;
                self.execute_rule(&rule, source_root, None, ctx, &[])?;
            }
            None => self.apply_templates(source_root, None, ctx)?,
        }

        // A claimed principal destination was completed by its claimer;
        // closing it again would write past the claim.
        if !ctx.principal_output().is_claimed() {
            ctx.checked_output()?.borrow_mut().end_document()?;
        }
        Ok(())
    }

    /// Evaluates global variables with forward-reference tolerance:
    /// variables failing on a missing dependency are retried; a pass with
    /// no progress names the cycle.
    pub fn evaluate_globals(&self, ctx: &Context) -> Result<(), EngineError> {
        let mut pending: Vec<usize> = (0..self.stylesheet.global_variables.len()).collect();
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            let mut progressed = false;
            for index in pending {
                let variable = &self.stylesheet.global_variables[index];
                let name = variable.name.expanded();
                ctx.enter_variable(&name)?;
                let result = variable.expr.evaluate(ctx);
                ctx.exit_variable(&name);
                match result {
                    Ok(value) => {
                        ctx.variables().bind(name, value);
                        progressed = true;
                    }
                    Err(EngineError::UndefinedVariable(_)) => deferred.push(index),
                    Err(other) => return Err(other),
                }
            }
            if !deferred.is_empty() && !progressed {
                let names = deferred
                    .iter()
                    .map(|&i| self.stylesheet.global_variables[i].name.to_string())
                    .collect();
                return Err(EngineError::CircularReference(names));
            }
            pending = deferred;
        }
        Ok(())
    }

    /// Applies templates to one node in the given mode.
    pub fn apply_templates(
        &self,
        node: &Node,
        mode: Option<&QName>,
        ctx: &Context,
    ) -> Result<(), EngineError> {
        ctx.check_cancelled()?;
        let rule = ctx.matcher().find_match(node, mode, ctx)?;
        self.execute_rule(&rule, node, mode, ctx, &[])
    }

    /// Applies templates to each node of a set, with position and size
    /// computed over the complete set.
    pub fn apply_templates_to_node_set(
        &self,
        nodes: &[Node],
        mode: Option<&QName>,
        ctx: &Context,
    ) -> Result<(), EngineError> {
        let size = nodes.len();
        for (index, node) in nodes.iter().enumerate() {
            let item_ctx = ctx.with_position_and_size(index + 1, size);
            self.apply_templates(node, mode, &item_ctx)?;
        }
        Ok(())
    }

    /// Executes a rule against a node: binds parameters into a pushed
    /// scope, records the rule as current, and runs the body. Built-in
    /// rules dispatch to their fixed behavior instead.
    pub fn execute_rule(
        &self,
        rule: &Rc<TemplateRule>,
        node: &Node,
        mode: Option<&QName>,
        ctx: &Context,
        params: &[(QName, Value)],
    ) -> Result<(), EngineError> {
        ctx.check_cancelled()?;
        if let Some(action) = builtin_action(rule) {
            return self.apply_builtin(action, node, mode, ctx);
        }

        let scope = ctx.variables().push();
        for param in &rule.params {
            let provided = params
                .iter()
                .find(|(name, _)| name.expanded_eq(&param.name))
                .map(|(_, value)| value.clone());
            let tunneled = if param.tunnel && provided.is_none() {
                ctx.tunnel_parameters().get(&param.name.expanded()).cloned()
            } else {
                None
            };
            let value = match provided.or(tunneled) {
                Some(value) => value,
                None if param.required => {
                    return Err(EngineError::dynamic(
                        codes::REQUIRED_PARAMETER,
                        format!("required parameter ${} not supplied", param.name),
                    ));
                }
                None => match (&param.select, &param.default_body) {
                    (Some(select), _) => select.evaluate(ctx)?,
                    (None, Some(body)) => {
                        Value::Fragment(self.execute_to_fragment(body.as_ref(), ctx)?)
                    }
                    (None, None) => Value::empty(),
                },
            };
            scope.bind(param.name.expanded(), value);
        }

        let rule_ctx = ctx
            .with_current_node(node.clone())
            .with_mode(mode.cloned())
            .with_variables(scope)
            .with_current_rule(rule.clone());
        rule.body.execute(&rule_ctx)
    }

    /// Executes a sequence constructor into a result-tree fragment.
    pub fn execute_to_fragment(
        &self,
        body: &dyn TemplateBody,
        ctx: &Context,
    ) -> Result<Rc<EventBuffer>, EngineError> {
        let concrete = Rc::new(RefCell::new(BufferingHandler::new()));
        let as_output: Rc<RefCell<dyn OutputHandler>> = concrete.clone();
        body.execute(&ctx.with_output(as_output))?;
        let buffer = concrete.borrow_mut().take_buffer()?;
        Ok(Rc::new(buffer))
    }

    /// A context whose accumulator manager is a deep-copied fork, for
    /// `for-each-group` style branches.
    pub fn with_forked_accumulators(&self, ctx: &Context) -> Context {
        match ctx.accumulators() {
            Some(manager) => {
                let fork = manager.borrow().fork();
                ctx.with_accumulators(Rc::new(RefCell::new(fork)))
            }
            None => ctx.clone(),
        }
    }

    fn apply_builtin(
        &self,
        action: OnNoMatch,
        node: &Node,
        mode: Option<&QName>,
        ctx: &Context,
    ) -> Result<(), EngineError> {
        match action {
            OnNoMatch::TextOnlyCopy => match node.kind() {
                NodeKind::Element | NodeKind::Root => self.apply_to_children(node, mode, ctx),
                NodeKind::Text | NodeKind::Attribute => {
                    let out = ctx.checked_output()?;
                    let mut out = out.borrow_mut();
                    out.characters(&node.string_value())?;
                    Ok(())
                }
                _ => Ok(()),
            },
            OnNoMatch::ShallowCopy => match node.kind() {
                NodeKind::Root => self.apply_to_children(node, mode, ctx),
                NodeKind::Element => {
                    let Some(name) = node.name() else {
                        return Ok(());
                    };
                    {
                        let out = ctx.checked_output()?;
                        let mut out = out.borrow_mut();
                        out.start_element(&name)?;
                        for ns in node.namespaces() {
                            out.namespace(
                                &ns.local_name().unwrap_or_default(),
                                &ns.string_value(),
                            )?;
                        }
                        for attr in node.attributes() {
                            if let Some(attr_name) = attr.name() {
                                out.attribute(&attr_name, &attr.string_value())?;
                            }
                        }
                    }
                    self.apply_to_children(node, mode, ctx)?;
                    let out = ctx.checked_output()?;
                    let mut out = out.borrow_mut();
                    out.end_element(&name)?;
                    Ok(())
                }
                _ => self.copy_leaf(node, ctx),
            },
            OnNoMatch::DeepCopy => self.copy_deep(node, ctx),
            OnNoMatch::ShallowSkip => match node.kind() {
                NodeKind::Element | NodeKind::Root => self.apply_to_children(node, mode, ctx),
                _ => Ok(()),
            },
            OnNoMatch::DeepSkip => Ok(()),
            OnNoMatch::Fail => Err(EngineError::dynamic(
                codes::ON_NO_MATCH_FAIL,
                format!(
                    "no template rule matches {:?} node '{}'",
                    node.kind(),
                    node.name().map(|n| n.qualified()).unwrap_or_default()
                ),
            )),
        }
    }

    fn apply_to_children(
        &self,
        node: &Node,
        mode: Option<&QName>,
        ctx: &Context,
    ) -> Result<(), EngineError> {
        let children = node.children();
        self.apply_templates_to_node_set(&children, mode, ctx)
    }

    fn copy_leaf(&self, node: &Node, ctx: &Context) -> Result<(), EngineError> {
        let out = ctx.checked_output()?;
        let mut out = out.borrow_mut();
        match node.kind() {
            NodeKind::Text => out.characters(&node.string_value())?,
            NodeKind::Comment => out.comment(&node.string_value())?,
            NodeKind::ProcessingInstruction => {
                let target = node.local_name().unwrap_or_default();
                out.processing_instruction(&target, &node.string_value())?;
            }
            NodeKind::Attribute => {
                if let Some(name) = node.name() {
                    out.attribute(&name, &node.string_value())?;
                }
            }
            NodeKind::Namespace => {
                out.namespace(&node.local_name().unwrap_or_default(), &node.string_value())?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Replays a subtree verbatim into the output.
    pub fn copy_deep(&self, node: &Node, ctx: &Context) -> Result<(), EngineError> {
        match node.kind() {
            NodeKind::Root => {
                for child in node.children() {
                    self.copy_deep(&child, ctx)?;
                }
                Ok(())
            }
            NodeKind::Element => {
                let Some(name) = node.name() else {
                    return Ok(());
                };
                {
                    let out = ctx.checked_output()?;
                    let mut out = out.borrow_mut();
                    out.start_element(&name)?;
                    for ns in node.namespaces() {
                        out.namespace(&ns.local_name().unwrap_or_default(), &ns.string_value())?;
                    }
                    for attr in node.attributes() {
                        if let Some(attr_name) = attr.name() {
                            out.attribute(&attr_name, &attr.string_value())?;
                        }
                    }
                }
                for child in node.children() {
                    self.copy_deep(&child, ctx)?;
                }
                let out = ctx.checked_output()?;
                let mut out = out.borrow_mut();
                out.end_element(&name)?;
                Ok(())
            }
            _ => self.copy_leaf(node, ctx),
        }
    }

    /// Routes an `xsl:message` through the error sink; terminating
    /// messages become failures.
    pub fn message(&self, ctx: &Context, text: &str, terminate: bool) -> Result<(), EngineError> {
        if terminate {
            ctx.sink().report(
                &Diagnostic::new(Severity::Error, text).with_code(codes::MESSAGE_TERMINATE),
            );
            Err(EngineError::dynamic(codes::MESSAGE_TERMINATE, text))
        } else {
            ctx.sink()
                .report(&Diagnostic::new(Severity::Info, text).with_code(codes::MESSAGE));
            Ok(())
        }
    }

    /// Silent-mode recovery: the error goes to the sink and the sentinel
    /// is returned; strict mode rethrows.
    pub fn recover(
        &self,
        ctx: &Context,
        err: EngineError,
        sentinel: Value,
    ) -> Result<Value, EngineError> {
        match ctx.error_handling() {
            ErrorHandling::Strict => Err(err),
            ErrorHandling::Silent => {
                ctx.sink().report(
                    &Diagnostic::new(Severity::Warning, err.to_string())
                        .with_code(err.code().unwrap_or("XTDE0000")),
                );
                Ok(sentinel)
            }
        }
    }

    // --- Convenience entry points ---

    /// Full pipeline: parse, transform, serialize to the configured output
    /// method, returning the writer. The principal destination goes
    /// through the result-document wrapper so the configured character
    /// map applies to it like any other destination.
    pub fn transform_to_writer<W: Write + 'static>(
        &self,
        xml: &str,
        writer: W,
    ) -> Result<W, EngineError> {
        let root = self.build_source_tree(xml)?;
        let serializer = Serializer::for_properties(&self.options.output, writer);
        let handler = Rc::new(RefCell::new(ResultDocumentHandler::new(
            serializer,
            self.options.output.character_map.clone(),
        )));
        let output: Rc<RefCell<dyn OutputHandler>> = handler.clone();
        self.run(&root, output)?;
        let handler = Rc::try_unwrap(handler)
            .map_err(|_| EngineError::config("output handler still referenced after run"))?
            .into_inner();
        Ok(handler.into_inner().into_inner())
    }

    pub fn transform_to_string(&self, xml: &str) -> Result<String, EngineError> {
        let bytes = self.transform_to_writer(xml, Vec::new())?;
        String::from_utf8(bytes).map_err(|e| EngineError::parse(e.to_string()))
    }
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("stylesheet", &self.stylesheet)
            .field("options", &self.options)
            .finish()
    }
}

/// A source-event sink that builds the navigable tree and, at document
/// end, runs the transformation. This is the default (non-streaming)
/// path: XSLT may touch any axis, so the whole document is materialized.
pub struct TransformHandler<'t> {
    transformer: &'t Transformer,
    builder: Option<TreeBuilder>,
    output: Rc<RefCell<dyn OutputHandler>>,
}

impl<'t> TransformHandler<'t> {
    pub fn new(
        transformer: &'t Transformer,
        output: Rc<RefCell<dyn OutputHandler>>,
    ) -> Result<Self, EngineError> {
        let stripper = transformer.space_stripper()?;
        let builder = if stripper.is_empty() {
            TreeBuilder::new()
        } else {
            TreeBuilder::new().with_space_filter(move |name| stripper.should_strip(name))
        };
        Ok(Self {
            transformer,
            builder: Some(builder),
            output,
        })
    }

    fn builder(&mut self) -> Result<&mut TreeBuilder, EngineError> {
        self.builder
            .as_mut()
            .ok_or_else(|| EngineError::parse("events after endDocument"))
    }
}

impl SourceEventHandler for TransformHandler<'_> {
    type Error = EngineError;

    fn start_document(&mut self) -> Result<(), EngineError> {
        self.builder()?.start_document()?;
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), EngineError> {
        let mut builder = self
            .builder
            .take()
            .ok_or_else(|| EngineError::parse("endDocument twice"))?;
        builder.end_document()?;
        let root = builder.finish();
        self.transformer.run(&root, self.output.clone())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), EngineError> {
        self.builder()?.start_prefix_mapping(prefix, uri)?;
        Ok(())
    }

    fn start_element(
        &mut self,
        name: &QName,
        attributes: &[EventAttribute],
    ) -> Result<(), EngineError> {
        self.builder()?.start_element(name, attributes)?;
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<(), EngineError> {
        self.builder()?.end_element(name)?;
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), EngineError> {
        self.builder()?.characters(text)?;
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), EngineError> {
        self.builder()?.processing_instruction(target, data)?;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        self.builder()?.comment(text)?;
        Ok(())
    }
}

/// A transformer paired with a collecting sink, the common test fixture.
pub fn collecting_transformer(
    stylesheet: Rc<Stylesheet>,
    options: TransformOptions,
) -> Result<(Transformer, Rc<CollectingSink>), EngineError> {
    let sink = Rc::new(CollectingSink::new());
    let transformer = Transformer::new(stylesheet, options)?.with_sink(sink.clone());
    Ok((transformer, sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::SimplePattern;
    use crate::stylesheet::{FnBody, FnExpr, Literal, ModeDecl, TemplateParam};
    use xylem_xdm::ExpandedName;

    fn options() -> TransformOptions {
        let mut options = TransformOptions::default();
        options.output.omit_xml_declaration = true;
        options
    }

    fn pattern(text: &str) -> Rc<SimplePattern> {
        Rc::new(SimplePattern::parse(text).unwrap())
    }

    #[test]
    fn test_default_rules_produce_text_only_copy() {
        let stylesheet = Rc::new(Stylesheet::new("3.0"));
        let transformer = Transformer::new(stylesheet, options()).unwrap();
        let result = transformer
            .transform_to_string("<a>one<b>two</b></a>")
            .unwrap();
        assert_eq!(result, "onetwo");
    }

    #[test]
    fn test_matching_template_runs_with_current_node() {
        let mut stylesheet = Stylesheet::new("3.0");
        stylesheet.add_template(crate::stylesheet::TemplateRule::matching(
            pattern("item"),
            Rc::new(FnBody(|ctx: &Context| -> Result<(), EngineError> {
                let out = ctx.checked_output()?;
                let mut out = out.borrow_mut();
                out.start_element(&QName::new("hit"))?;
                out.characters(&ctx.current_node().unwrap().string_value())?;
                out.end_element(&QName::new("hit"))?;
                Ok(())
            })),
        ));
        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let result = transformer
            .transform_to_string("<list><item>x</item><item>y</item></list>")
            .unwrap();
        assert_eq!(result, "<hit>x</hit><hit>y</hit>");
    }

    #[test]
    fn test_global_forward_reference_resolves() {
        let mut stylesheet = Stylesheet::new("3.0");
        // $a := $b + 1 declared before $b := 2.
        stylesheet.add_global_variable(
            QName::new("a"),
            Rc::new(FnExpr(|ctx: &Context| -> Result<Value, EngineError> {
                let b = ctx.variable_value(&ExpandedName::local("b"))?;
                Ok(Value::number(b.as_number() + 1.0))
            })),
        );
        stylesheet.add_global_variable(QName::new("b"), Rc::new(Literal(Value::number(2.0))));

        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let output: Rc<RefCell<dyn OutputHandler>> =
            Rc::new(RefCell::new(BufferingHandler::new()));
        let ctx = transformer.fresh_context(output);
        transformer.evaluate_globals(&ctx).unwrap();
        assert_eq!(
            ctx.variable_value(&ExpandedName::local("a")).unwrap().as_number(),
            3.0
        );
    }

    #[test]
    fn test_global_cycle_names_both_variables() {
        let mut stylesheet = Stylesheet::new("3.0");
        stylesheet.add_global_variable(
            QName::new("a"),
            Rc::new(FnExpr(|ctx: &Context| -> Result<Value, EngineError> {
                ctx.variable_value(&ExpandedName::local("b"))
            })),
        );
        stylesheet.add_global_variable(
            QName::new("b"),
            Rc::new(FnExpr(|ctx: &Context| -> Result<Value, EngineError> {
                ctx.variable_value(&ExpandedName::local("a"))
            })),
        );

        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let output: Rc<RefCell<dyn OutputHandler>> =
            Rc::new(RefCell::new(BufferingHandler::new()));
        let ctx = transformer.fresh_context(output);
        let err = transformer.evaluate_globals(&ctx).unwrap_err();
        match err {
            EngineError::CircularReference(names) => {
                assert!(names.contains(&"a".to_string()));
                assert!(names.contains(&"b".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_initial_template_by_name() {
        let mut stylesheet = Stylesheet::new("3.0");
        stylesheet.add_template(
            crate::stylesheet::TemplateRule::named(
                QName::new("main"),
                Rc::new(FnBody(|ctx: &Context| -> Result<(), EngineError> {
                    let out = ctx.checked_output()?;
                    let mut out = out.borrow_mut();
                    out.start_element(&QName::new("started"))?;
                    out.end_element(&QName::new("started"))?;
                    Ok(())
                })),
            ),
        );
        let transformer = Transformer::new(
            Rc::new(stylesheet),
            options().with_initial_template(QName::new("main")),
        )
        .unwrap();
        assert_eq!(transformer.transform_to_string("<x/>").unwrap(), "<started/>");
    }

    #[test]
    fn test_unknown_initial_template_is_xtde0040() {
        let stylesheet = Rc::new(Stylesheet::new("3.0"));
        let transformer = Transformer::new(
            stylesheet,
            options().with_initial_template(QName::new("missing")),
        )
        .unwrap();
        let err = transformer.transform_to_string("<x/>").unwrap_err();
        assert_eq!(err.code(), Some("XTDE0040"));
    }

    #[test]
    fn test_on_no_match_fail_raises() {
        let mut stylesheet = Stylesheet::new("3.0");
        stylesheet.add_mode(ModeDecl {
            name: None,
            on_no_match: OnNoMatch::Fail,
        });
        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let err = transformer.transform_to_string("<x/>").unwrap_err();
        assert_eq!(err.code(), Some("XTDE0555"));
    }

    #[test]
    fn test_deep_copy_mode_replays_subtree() {
        let mut stylesheet = Stylesheet::new("3.0");
        stylesheet.add_mode(ModeDecl {
            name: None,
            on_no_match: OnNoMatch::DeepCopy,
        });
        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let result = transformer
            .transform_to_string("<a x=\"1\"><b>t</b></a>")
            .unwrap();
        assert_eq!(result, "<a x=\"1\"><b>t</b></a>");
    }

    #[test]
    fn test_shallow_skip_recurses_without_copying() {
        let mut stylesheet = Stylesheet::new("3.0");
        stylesheet.add_mode(ModeDecl {
            name: None,
            on_no_match: OnNoMatch::ShallowSkip,
        });
        // Text nodes are skipped too under shallow-skip.
        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let result = transformer
            .transform_to_string("<a>one<b>two</b></a>")
            .unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn test_template_parameters_default_and_provided() {
        let mut stylesheet = Stylesheet::new("3.0");
        let rule = stylesheet.add_template(
            crate::stylesheet::TemplateRule::named(
                QName::new("emit"),
                Rc::new(FnBody(|ctx: &Context| -> Result<(), EngineError> {
                    let value = ctx.variable_value(&ExpandedName::local("p"))?;
                    let out = ctx.checked_output()?;
                    let mut out = out.borrow_mut();
                    out.characters(&value.as_string())?;
                    Ok(())
                })),
            )
            .with_param(
                TemplateParam::new(QName::new("p"))
                    .with_select(Rc::new(Literal(Value::string("default")))),
            ),
        );
        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let root = transformer.build_source_tree("<x/>").unwrap();

        let concrete = Rc::new(RefCell::new(BufferingHandler::new()));
        let output: Rc<RefCell<dyn OutputHandler>> = concrete.clone();
        let ctx = transformer.fresh_context(output);
        transformer.execute_rule(&rule, &root, None, &ctx, &[]).unwrap();
        transformer
            .execute_rule(
                &rule,
                &root,
                None,
                &ctx,
                &[(QName::new("p"), Value::string("given"))],
            )
            .unwrap();
        let buffer = concrete.borrow_mut().take_buffer().unwrap();
        assert_eq!(buffer.text_content(), "defaultgiven");
    }

    #[test]
    fn test_required_parameter_missing() {
        let mut stylesheet = Stylesheet::new("3.0");
        let rule = stylesheet.add_template(
            crate::stylesheet::TemplateRule::named(
                QName::new("needs"),
                Rc::new(FnBody(|_ctx: &Context| -> Result<(), EngineError> {
                    Ok(())
                })),
            )
            .with_param(TemplateParam::new(QName::new("p")).required()),
        );
        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let root = transformer.build_source_tree("<x/>").unwrap();
        let output: Rc<RefCell<dyn OutputHandler>> =
            Rc::new(RefCell::new(BufferingHandler::new()));
        let ctx = transformer.fresh_context(output);
        let err = transformer
            .execute_rule(&rule, &root, None, &ctx, &[])
            .unwrap_err();
        assert_eq!(err.code(), Some("XTDE0700"));
    }

    #[test]
    fn test_tunnel_parameter_reaches_distant_template() {
        let mut stylesheet = Stylesheet::new("3.0");
        let rule = stylesheet.add_template(
            crate::stylesheet::TemplateRule::named(
                QName::new("deep"),
                Rc::new(FnBody(|ctx: &Context| -> Result<(), EngineError> {
                    let value = ctx.variable_value(&ExpandedName::local("depthinfo"))?;
                    let out = ctx.checked_output()?;
                    let mut out = out.borrow_mut();
                    out.characters(&value.as_string())?;
                    Ok(())
                })),
            )
            .with_param(TemplateParam::new(QName::new("depthinfo")).tunnel()),
        );
        let transformer = Transformer::new(Rc::new(stylesheet), options()).unwrap();
        let root = transformer.build_source_tree("<x/>").unwrap();
        let concrete = Rc::new(RefCell::new(BufferingHandler::new()));
        let output: Rc<RefCell<dyn OutputHandler>> = concrete.clone();
        let ctx = transformer.fresh_context(output);
        let mut tunnel = std::collections::HashMap::new();
        tunnel.insert(ExpandedName::local("depthinfo"), Value::string("tunneled"));
        let ctx = ctx.with_tunnel_parameters(tunnel);
        transformer.execute_rule(&rule, &root, None, &ctx, &[]).unwrap();
        let buffer = concrete.borrow_mut().take_buffer().unwrap();
        assert_eq!(buffer.text_content(), "tunneled");
    }

    #[test]
    fn test_cancellation_honored_at_template_boundary() {
        let stylesheet = Rc::new(Stylesheet::new("3.0"));
        let transformer = Transformer::new(stylesheet, options()).unwrap();
        let root = transformer.build_source_tree("<a><b/></a>").unwrap();
        let output: Rc<RefCell<dyn OutputHandler>> =
            Rc::new(RefCell::new(BufferingHandler::new()));
        let ctx = transformer.fresh_context(output);
        ctx.cancel_flag().store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(matches!(
            transformer.apply_templates(&root, None, &ctx),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn test_message_routing() {
        let (transformer, sink) =
            collecting_transformer(Rc::new(Stylesheet::new("3.0")), options()).unwrap();
        let output: Rc<RefCell<dyn OutputHandler>> =
            Rc::new(RefCell::new(BufferingHandler::new()));
        let ctx = transformer.fresh_context(output);
        transformer.message(&ctx, "progress note", false).unwrap();
        let err = transformer.message(&ctx, "stop now", true).unwrap_err();
        assert_eq!(err.code(), Some("XTMM9001"));
        let diagnostics = sink.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].code.as_deref(), Some("XTMM9000"));
    }

    #[test]
    fn test_transform_handler_drives_from_events() {
        let stylesheet = Rc::new(Stylesheet::new("3.0"));
        let transformer = Transformer::new(stylesheet, options()).unwrap();
        let concrete = Rc::new(RefCell::new(BufferingHandler::new()));
        let output: Rc<RefCell<dyn OutputHandler>> = concrete.clone();
        let mut handler = TransformHandler::new(&transformer, output).unwrap();
        source::parse_document("<a>text</a>", &mut handler).unwrap();
        let buffer = concrete.borrow_mut().take_buffer().unwrap();
        assert_eq!(buffer.text_content(), "text");
    }
}
