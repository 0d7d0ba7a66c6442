//! Message templates with embedded Metapath expressions.
//!
//! A template is plain text in which every `{expr}` span is evaluated against the
//! violating node and replaced by the string value of the result. `\{` produces a
//! literal brace and is never a substitution site; inside a span `\}` stands for `}`.

use crate::error::ConstraintError;
use metaschema_mdm::NodeItem;
use metaschema_metapath::{DynamicContext, ExpressionCache, Item};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Expression(String),
}

#[derive(Clone)]
pub struct MessageTemplate {
    source: String,
    segments: Vec<Segment>,
    cache: Arc<ExpressionCache>,
}

impl fmt::Debug for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageTemplate").field(&self.source).finish()
    }
}

impl fmt::Display for MessageTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl MessageTemplate {
    /// Splits `source` into text and expression segments. Expressions are compiled on
    /// first render, through a private cache until [`MessageTemplate::with_cache`] is
    /// used.
    pub fn parse(source: &str) -> Result<Self, ConstraintError> {
        Ok(Self {
            source: source.to_string(),
            segments: split(source)?,
            cache: Arc::new(ExpressionCache::default()),
        })
    }

    /// Compiles the embedded expressions through `cache`, usually one shared by every
    /// template of a constraint set.
    pub fn with_cache(mut self, cache: Arc<ExpressionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The embedded expression texts, in order.
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Expression(text) => Some(text.as_str()),
            Segment::Text(_) => None,
        })
    }

    pub fn render<N: NodeItem>(
        &self,
        node: &N,
        dynamic: &DynamicContext<N>,
    ) -> Result<String, ConstraintError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expression(text) => {
                    let value = self
                        .cache
                        .get_or_compile(text)
                        .and_then(|expr| expr.evaluate_string(Some(Item::Node(node.clone())), dynamic))
                        .map_err(|err| {
                            ConstraintError::invalid_template(
                                &self.source,
                                format!("unable to evaluate '{}': {}", text, err),
                            )
                        })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

fn split(source: &str) -> Result<Vec<Segment>, ConstraintError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '{' => {
                let mut expr = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' if chars.peek() == Some(&'}') => {
                            chars.next();
                            expr.push('}');
                        }
                        '}' => {
                            closed = true;
                            break;
                        }
                        other => expr.push(other),
                    }
                }
                if !closed {
                    return Err(ConstraintError::invalid_template(source, "unterminated '{'"));
                }
                let expr = expr.trim();
                if expr.is_empty() {
                    return Err(ConstraintError::invalid_template(source, "empty expression"));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Expression(expr.to_string()));
            }
            other => text.push(other),
        }
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::{DataType, Definition, DocumentBuilder, NodeRef};

    fn flag_node() -> NodeRef {
        let builder = DocumentBuilder::new(None::<String>);
        let control = builder
            .new_assembly(builder.root(), Arc::new(Definition::assembly("control")))
            .unwrap();
        let id = builder
            .new_flag(control, Arc::new(Definition::flag("id", DataType::Token)), "ac-1")
            .unwrap();
        builder.build().unwrap().node(id).unwrap()
    }

    #[test]
    fn test_split() {
        let template = MessageTemplate::parse("Control { ../@id } has {count(../*)} parts").unwrap();
        assert_eq!(
            template.expressions().collect::<Vec<_>>(),
            vec!["../@id", "count(../*)"]
        );
    }

    #[test]
    fn test_escaped_brace_is_literal() {
        let template = MessageTemplate::parse(r"use \{braces} for {.}").unwrap();
        assert_eq!(template.expressions().collect::<Vec<_>>(), vec!["."]);
        let node = flag_node();
        let text = template.render(&node, &DynamicContext::new()).unwrap();
        assert_eq!(text, "use {braces} for ac-1");
    }

    #[test]
    fn test_render() {
        let node = flag_node();
        let template = MessageTemplate::parse("id '{.}' on {name(..)}").unwrap();
        assert_eq!(
            template.render(&node, &DynamicContext::new()).unwrap(),
            "id 'ac-1' on control"
        );
    }

    #[test]
    fn test_invalid_templates() {
        assert!(matches!(
            MessageTemplate::parse("value {.").unwrap_err(),
            ConstraintError::InvalidTemplate { .. }
        ));
        assert!(MessageTemplate::parse("value { }").is_err());
        let template = MessageTemplate::parse("bad {1 +}").unwrap();
        let err = template.render(&flag_node(), &DynamicContext::new()).unwrap_err();
        assert!(err.to_string().contains("unable to evaluate '1 +'"));
    }

    #[test]
    fn test_shared_cache() {
        let cache = Arc::new(ExpressionCache::default());
        let a = MessageTemplate::parse("{.}").unwrap().with_cache(Arc::clone(&cache));
        let b = MessageTemplate::parse("[{.}]").unwrap().with_cache(Arc::clone(&cache));
        let node = flag_node();
        let dynamic = DynamicContext::new();
        assert_eq!(a.render(&node, &dynamic).unwrap(), "ac-1");
        assert_eq!(b.render(&node, &dynamic).unwrap(), "[ac-1]");
        assert_eq!(cache.len(), 1);
    }
}
