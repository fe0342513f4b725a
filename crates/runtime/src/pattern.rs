//! Match patterns: the contract the template matcher consumes, plus a
//! dedicated parser/evaluator for the common pattern forms.

use crate::context::Context;
use crate::error::EngineError;
use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1};
use nom::combinator::{map, opt, recognize};
use nom::multi::{many0_count, separated_list0, separated_list1};
use nom::sequence::pair;
use std::fmt;
use xylem_xdm::{Node, NodeKind};

/// The contract between compiled patterns and the matcher. Patterns arrive
/// compiled; the matcher only asks whether a node matches and what the
/// default priority is.
pub trait Pattern: fmt::Debug {
    fn matches(&self, node: &Node, ctx: &Context) -> Result<bool, EngineError>;
    fn default_priority(&self) -> f64;
    /// The original pattern text, for diagnostics.
    fn text(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchAxis {
    Child,
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Wildcard,
    Name(String),
    Text,
    Comment,
    ProcessingInstruction,
    AnyNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MatchStep {
    axis: MatchAxis,
    node_test: NodeTest,
}

impl MatchStep {
    fn matches(&self, node: &Node) -> bool {
        let kind = node.kind();
        match self.axis {
            MatchAxis::Attribute => {
                if kind != NodeKind::Attribute {
                    return false;
                }
            }
            MatchAxis::Child => {
                if !matches!(
                    kind,
                    NodeKind::Element
                        | NodeKind::Text
                        | NodeKind::Comment
                        | NodeKind::ProcessingInstruction
                ) {
                    return false;
                }
            }
        }
        match &self.node_test {
            NodeTest::Wildcard => {
                // `*` on the child axis matches elements only.
                self.axis == MatchAxis::Attribute || kind == NodeKind::Element
            }
            NodeTest::Name(name) => node.local_name().as_deref() == Some(name.as_str()),
            NodeTest::Text => kind == NodeKind::Text,
            NodeTest::Comment => kind == NodeKind::Comment,
            NodeTest::ProcessingInstruction => kind == NodeKind::ProcessingInstruction,
            NodeTest::AnyNode => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LocationPathPattern {
    is_absolute: bool,
    steps: Vec<MatchStep>,
}

impl LocationPathPattern {
    fn matches(&self, node: &Node) -> bool {
        if self.is_absolute && self.steps.is_empty() {
            return node.kind() == NodeKind::Root;
        }

        let mut current = Some(node.clone());
        for step in self.steps.iter().rev() {
            match current {
                Some(ref here) => {
                    if !step.matches(here) {
                        return false;
                    }
                    current = here.parent();
                }
                None => return false,
            }
        }

        if self.is_absolute {
            current.is_some_and(|n| n.kind() == NodeKind::Root)
        } else {
            true
        }
    }

    fn default_priority(&self) -> f64 {
        if self.is_absolute && self.steps.is_empty() {
            return -0.5;
        }
        if self.steps.len() > 1 || self.is_absolute {
            return 0.5;
        }
        match self.steps[0].node_test {
            NodeTest::Name(_) => 0.0,
            _ => -0.5,
        }
    }
}

/// A compiled pattern: a union of location paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplePattern {
    paths: Vec<LocationPathPattern>,
    original_text: String,
}

impl SimplePattern {
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        match pattern_parser(text.trim()) {
            Ok(("", paths)) => Ok(Self {
                paths,
                original_text: text.to_string(),
            }),
            Ok((rest, _)) => Err(EngineError::parse(format!(
                "unconsumed input in pattern '{}': '{}'",
                text, rest
            ))),
            Err(e) => Err(EngineError::parse(format!("pattern '{}': {}", text, e))),
        }
    }
}

impl fmt::Display for SimplePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original_text)
    }
}

impl Pattern for SimplePattern {
    fn matches(&self, node: &Node, _ctx: &Context) -> Result<bool, EngineError> {
        Ok(self.paths.iter().any(|path| path.matches(node)))
    }

    fn default_priority(&self) -> f64 {
        self.paths
            .iter()
            .map(LocationPathPattern::default_priority)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn text(&self) -> &str {
        &self.original_text
    }
}

// --- Parser ---

fn ncname(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_"), tag("-"), tag(".")))),
    ))
    .parse(input)
}

fn qname_text(input: &str) -> IResult<&str, String> {
    let (rest, name) =
        recognize(pair(ncname, opt(pair(tag(":"), ncname)))).parse(input)?;
    // The prefix is resolved by the compiler; matching is on the local
    // part here.
    let local = name.rsplit(':').next().unwrap_or(name);
    Ok((rest, local.to_string()))
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(tag("processing-instruction()"), |_| {
            NodeTest::ProcessingInstruction
        }),
        map(tag("comment()"), |_| NodeTest::Comment),
        map(tag("text()"), |_| NodeTest::Text),
        map(tag("node()"), |_| NodeTest::AnyNode),
        map(tag("*"), |_| NodeTest::Wildcard),
        map(qname_text, NodeTest::Name),
    ))
    .parse(input)
}

fn step_parser(input: &str) -> IResult<&str, MatchStep> {
    let (rest, at) = opt(tag("@")).parse(input)?;
    let (rest, test) = node_test(rest)?;
    Ok((
        rest,
        MatchStep {
            axis: if at.is_some() {
                MatchAxis::Attribute
            } else {
                MatchAxis::Child
            },
            node_test: test,
        },
    ))
}

fn path_parser(input: &str) -> IResult<&str, LocationPathPattern> {
    let (rest, slash) = opt(tag("/")).parse(input)?;
    let is_absolute = slash.is_some();
    let (rest, steps) = if is_absolute {
        separated_list0(tag("/"), step_parser).parse(rest)?
    } else {
        separated_list1(tag("/"), step_parser).parse(rest)?
    };
    Ok((rest, LocationPathPattern { is_absolute, steps }))
}

fn pattern_parser(input: &str) -> IResult<&str, Vec<LocationPathPattern>> {
    separated_list1(tag("|"), path_parser).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use xylem_xdm::QName;

    fn tree() -> (Node, Node, Node, Node, Node) {
        let root = Node::new_root();
        let doc = Node::new_element(QName::new("doc"));
        root.append_child(&doc);
        let para = Node::new_element(QName::new("para"));
        doc.append_child(&para);
        let text = Node::new_text("hello");
        para.append_child(&text);
        let attr = Node::new_attribute(QName::new("id"), "p1");
        para.add_attribute(&attr);
        (root, doc, para, text, attr)
    }

    fn ctx() -> Context {
        Context::for_tests()
    }

    #[test]
    fn test_parsing_accepts_the_pattern_forms() {
        for text in [
            "foo", "foo/bar", "/", "/*", "/doc/item", "foo|bar", "text()", "@id", "*",
            "foo/*/@id", "node()", "comment()", "pre:local",
        ] {
            assert!(SimplePattern::parse(text).is_ok(), "failed on '{}'", text);
        }
        assert!(SimplePattern::parse("foo[").is_err());
    }

    #[test]
    fn test_name_match() {
        let (_, doc, para, _, _) = tree();
        let pattern = SimplePattern::parse("para").unwrap();
        assert!(pattern.matches(&para, &ctx()).unwrap());
        assert!(!pattern.matches(&doc, &ctx()).unwrap());
    }

    #[test]
    fn test_path_match() {
        let (_, _, para, text, _) = tree();
        let pattern = SimplePattern::parse("para/text()").unwrap();
        assert!(pattern.matches(&text, &ctx()).unwrap());
        assert!(!pattern.matches(&para, &ctx()).unwrap());
    }

    #[test]
    fn test_root_pattern() {
        let (root, doc, _, _, _) = tree();
        let pattern = SimplePattern::parse("/").unwrap();
        assert!(pattern.matches(&root, &ctx()).unwrap());
        assert!(!pattern.matches(&doc, &ctx()).unwrap());
    }

    #[test]
    fn test_absolute_wildcard() {
        let (root, doc, para, _, _) = tree();
        let pattern = SimplePattern::parse("/*").unwrap();
        assert!(pattern.matches(&doc, &ctx()).unwrap());
        assert!(!pattern.matches(&para, &ctx()).unwrap());
        assert!(!pattern.matches(&root, &ctx()).unwrap());
    }

    #[test]
    fn test_union_match() {
        let (_, _, para, _, _) = tree();
        let pattern = SimplePattern::parse("missing|para").unwrap();
        assert!(pattern.matches(&para, &ctx()).unwrap());
    }

    #[test]
    fn test_attribute_match() {
        let (_, _, para, _, attr) = tree();
        let pattern = SimplePattern::parse("@id").unwrap();
        assert!(pattern.matches(&attr, &ctx()).unwrap());
        assert!(!pattern.matches(&para, &ctx()).unwrap());
    }

    #[test]
    fn test_wildcard_on_child_axis_is_elements_only() {
        let (_, _, para, text, attr) = tree();
        let pattern = SimplePattern::parse("*").unwrap();
        assert!(pattern.matches(&para, &ctx()).unwrap());
        assert!(!pattern.matches(&text, &ctx()).unwrap());
        assert!(!pattern.matches(&attr, &ctx()).unwrap());
    }

    #[test]
    fn test_default_priorities() {
        assert_eq!(SimplePattern::parse("para").unwrap().default_priority(), 0.0);
        assert_eq!(SimplePattern::parse("*").unwrap().default_priority(), -0.5);
        assert_eq!(SimplePattern::parse("text()").unwrap().default_priority(), -0.5);
        assert_eq!(SimplePattern::parse("/").unwrap().default_priority(), -0.5);
        assert_eq!(
            SimplePattern::parse("doc/para").unwrap().default_priority(),
            0.5
        );
        // A union takes the most specific branch.
        assert_eq!(
            SimplePattern::parse("*|para").unwrap().default_priority(),
            0.0
        );
    }
}
