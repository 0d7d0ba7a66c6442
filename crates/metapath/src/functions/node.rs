use super::{arg_or_context, check_arity, string_arg};
use crate::compile::MetapathExpression;
use crate::engine::EvaluationContext;
use crate::error::{MetapathError, TypeErrorCode};
use crate::types::{AtomicValue, Item, Sequence};
use metaschema_mdm::{NodeItem, NodeKind};
use std::collections::HashSet;

/// The optional node argument of a node accessor, defaulting to the focus.
fn node_arg<N: NodeItem>(
    function: &str,
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Option<N>, MetapathError> {
    check_arity(function, &args, 0, 1)?;
    let from_context = args.is_empty();
    let seq = arg_or_context(args, ctx)?;
    match seq.first_item(true)? {
        None => Ok(None),
        Some(Item::Node(node)) => Ok(Some(node)),
        Some(other) => {
            let code = if from_context {
                TypeErrorCode::NotANodeItemForStep
            } else {
                TypeErrorCode::InvalidType
            };
            Err(MetapathError::typed(
                code,
                format!(
                    "Function '{}' expected a node, found '{}'",
                    function,
                    other.type_name()
                ),
            ))
        }
    }
}

pub fn fn_name<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    let name = node_arg("name", args, ctx)?
        .and_then(|n| n.name().map(ToString::to_string))
        .unwrap_or_default();
    Ok(Sequence::from_string(name))
}

pub fn fn_local_name<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    let name = node_arg("local-name", args, ctx)?
        .and_then(|n| n.name().map(|q| q.local_name().to_string()))
        .unwrap_or_default();
    Ok(Sequence::from_string(name))
}

pub fn fn_root<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    Ok(node_arg("root", args, ctx)?
        .map(|n| Sequence::from_node(n.root()))
        .unwrap_or_default())
}

pub fn fn_path<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    Ok(node_arg("path", args, ctx)?
        .map(|n| Sequence::from_string(n.metapath()))
        .unwrap_or_default())
}

pub fn fn_base_uri<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    Ok(node_arg("base-uri", args, ctx)?
        .and_then(|n| n.base_uri().map(|uri| AtomicValue::AnyUri(uri.to_string())))
        .map(Sequence::from_atomic)
        .unwrap_or_default())
}

/// The base URI of a document node; empty for any other node.
pub fn fn_document_uri<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    Ok(node_arg("document-uri", args, ctx)?
        .filter(|n| n.kind() == NodeKind::Document)
        .and_then(|n| n.base_uri().map(|uri| AtomicValue::AnyUri(uri.to_string())))
        .map(Sequence::from_atomic)
        .unwrap_or_default())
}

/// The namespace of the node's name, or the zero-length URI when it has none.
pub fn fn_namespace_uri<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    let namespace = node_arg("namespace-uri", args, ctx)?
        .and_then(|n| n.name().and_then(|q| q.namespace().map(str::to_string)))
        .unwrap_or_default();
    Ok(Sequence::from_atomic(AtomicValue::AnyUri(namespace)))
}

pub fn fn_has_children<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    let has_children = node_arg("has-children", args, ctx)?
        .is_some_and(|n| !n.model_items().is_empty());
    Ok(Sequence::from_bool(has_children))
}

pub fn fn_position<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("position", &args, 0, 0)?;
    ctx.context_item()?;
    Ok(Sequence::from_integer(ctx.context_position as i64))
}

pub fn fn_last<N: NodeItem>(
    args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("last", &args, 0, 0)?;
    ctx.context_item()?;
    Ok(Sequence::from_integer(ctx.context_size as i64))
}

/// Every node in the argument, deduplicated and in document order.
fn nodes_arg<N: NodeItem>(function: &str, seq: &Sequence<N>) -> Result<Vec<N>, MetapathError> {
    let mut nodes = seq
        .items()?
        .iter()
        .map(|item| match item {
            Item::Node(node) => Ok(node.clone()),
            other => Err(MetapathError::type_error(format!(
                "Function '{}' expected nodes, found '{}'",
                function,
                other.type_name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    nodes.sort();
    nodes.dedup();
    Ok(nodes)
}

fn ancestors<N: NodeItem>(node: &N) -> impl Iterator<Item = N> {
    std::iter::successors(node.parent(), N::parent)
}

/// The nodes that are not an ancestor of another node in the argument.
pub fn fn_innermost<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("innermost", &args, 1, 1)?;
    let nodes = nodes_arg("innermost", &args[0])?;
    let enclosing: HashSet<N> = nodes.iter().flat_map(ancestors).collect();
    Ok(Sequence::from_nodes(
        nodes.into_iter().filter(|n| !enclosing.contains(n)).collect(),
    ))
}

/// The nodes that have no ancestor in the argument.
pub fn fn_outermost<N: NodeItem>(args: Vec<Sequence<N>>) -> Result<Sequence<N>, MetapathError> {
    check_arity("outermost", &args, 1, 1)?;
    let nodes = nodes_arg("outermost", &args[0])?;
    let members: HashSet<&N> = nodes.iter().collect();
    let outermost = nodes
        .iter()
        .filter(|n| !ancestors(*n).any(|a| members.contains(&a)))
        .cloned()
        .collect();
    Ok(Sequence::from_nodes(outermost))
}

/// `mp:recurse-depth`: each start node followed, depth first, by the nodes reached by
/// repeatedly applying the path to it.
///
/// With one argument the focus is the single start node. The path is compiled against
/// the static context carried by the dynamic context.
pub fn mp_recurse_depth<N: NodeItem>(
    mut args: Vec<Sequence<N>>,
    ctx: &EvaluationContext<'_, N>,
) -> Result<Sequence<N>, MetapathError> {
    check_arity("mp:recurse-depth", &args, 1, 2)?;
    let path = string_arg(&args.remove(args.len() - 1))?;
    let start = match args.pop() {
        Some(context) => nodes_arg("mp:recurse-depth", &context)?,
        None => vec![ctx.context_node()?.clone()],
    };
    let expr = MetapathExpression::compile(&path, ctx.dynamic.static_context())?;
    let mut result = Vec::new();
    let mut stack = Vec::new();
    for node in start {
        recurse_depth(node, &expr, ctx, &mut stack, &mut result)?;
    }
    Ok(Sequence::from_nodes(result))
}

fn recurse_depth<N: NodeItem>(
    node: N,
    expr: &MetapathExpression,
    ctx: &EvaluationContext<'_, N>,
    stack: &mut Vec<N>,
    result: &mut Vec<N>,
) -> Result<(), MetapathError> {
    if stack.contains(&node) {
        return Err(MetapathError::dynamic_error(format!(
            "mp:recurse-depth path '{}' revisits '{}'",
            expr,
            node.metapath()
        )));
    }
    result.push(node.clone());
    let next = expr.evaluate_node(&node, ctx.dynamic)?;
    let next = nodes_arg("mp:recurse-depth", &next)?;
    stack.push(node);
    for child in next {
        recurse_depth(child, expr, ctx, stack, result)?;
    }
    stack.pop();
    Ok(())
}
