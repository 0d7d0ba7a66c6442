#![allow(dead_code)]

pub mod fixtures;

use metaschema::{Document, DynamicContext, MetapathExpression, NodeRef, Sequence, StaticContext};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Evaluates `expression` with no context item.
pub fn eval(expression: &str) -> Result<Sequence<NodeRef>, metaschema::Error> {
    let compiled = MetapathExpression::compile(expression, &StaticContext::default())?;
    Ok(compiled.evaluate(None, &DynamicContext::new())?)
}

/// Evaluates `expression` against the document root.
pub fn eval_on(document: &Document, expression: &str) -> Result<Sequence<NodeRef>, metaschema::Error> {
    metaschema::evaluate(document, expression)
}

/// The string values of every item in the sequence.
pub fn strings(sequence: &Sequence<NodeRef>) -> Vec<String> {
    sequence
        .items()
        .map(|items| {
            items
                .iter()
                .map(|item| item.string_value().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}
