//! Metapath expression evaluation engine.
//!
//! Entry point: [`evaluate`] with an [`EvaluationContext`].

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use metaschema_mdm::{NodeItem, NodeKind};

use crate::ast::*;
use crate::context::{DynamicContext, library_prefix};
use crate::error::{CardinalityCode, MetapathError, TypeErrorCode};
use crate::functions;
use crate::lookup;
use crate::operators;
use crate::types::*;

/// The focus of an evaluation plus the dynamic context it runs in.
pub struct EvaluationContext<'d, N> {
    pub context_item: Option<Item<N>>,
    pub context_position: usize,
    pub context_size: usize,
    pub dynamic: &'d DynamicContext<N>,
}

impl<'d, N: NodeItem> EvaluationContext<'d, N> {
    pub fn new(context_item: Option<Item<N>>, dynamic: &'d DynamicContext<N>) -> Self {
        Self {
            context_item,
            context_position: 1,
            context_size: 1,
            dynamic,
        }
    }

    pub fn with_context_item(&self, item: Item<N>) -> Self {
        Self {
            context_item: Some(item),
            context_position: self.context_position,
            context_size: self.context_size,
            dynamic: self.dynamic,
        }
    }

    pub fn with_position(&self, position: usize, size: usize) -> Self {
        Self {
            context_item: self.context_item.clone(),
            context_position: position,
            context_size: size,
            dynamic: self.dynamic,
        }
    }

    /// A context with no focus, as seen by the body of an inline function.
    pub fn without_focus(&self) -> Self {
        Self {
            context_item: None,
            context_position: 0,
            context_size: 0,
            dynamic: self.dynamic,
        }
    }

    pub fn context_item(&self) -> Result<&Item<N>, MetapathError> {
        self.context_item.as_ref().ok_or(MetapathError::NoContextItem)
    }

    pub fn context_node(&self) -> Result<&N, MetapathError> {
        match self.context_item()? {
            Item::Node(node) => Ok(node),
            other => Err(not_a_node(other)),
        }
    }
}

pub type Variables<N> = HashMap<String, Sequence<N>>;

fn not_a_node<N: NodeItem>(item: &Item<N>) -> MetapathError {
    MetapathError::typed(
        TypeErrorCode::NotANodeItemForStep,
        format!("Expected a node item for a path step, found '{}'", item.type_name()),
    )
}

pub fn evaluate<N: NodeItem>(
    expr: &Expression,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    match expr {
        Expression::Literal(lit) => Ok(evaluate_literal(lit)),
        Expression::Variable(name) => evaluate_variable(name, ctx, local_vars),
        Expression::ContextItem => ctx.context_item().map(|item| Sequence::of(item.clone())),
        Expression::Sequence(exprs) => {
            let mut parts = Vec::with_capacity(exprs.len());
            for e in exprs {
                parts.push(evaluate(e, ctx, local_vars)?);
            }
            Sequence::concat(parts)
        }

        Expression::Root => Ok(Sequence::from_node(ctx.context_node()?.root())),
        Expression::RootPath(relative) => {
            let root = ctx.context_node()?.root();
            evaluate(relative, &ctx.with_context_item(Item::Node(root)), local_vars)
        }
        Expression::RootDescendantPath(relative) => {
            let root = ctx.context_node()?.root();
            evaluate_descendant_path(vec![Item::Node(root)], relative, ctx, local_vars)
        }
        Expression::Path { left, right } => {
            let base = evaluate(left, ctx, local_vars)?.into_items()?;
            evaluate_path(base, right, ctx, local_vars)
        }
        Expression::DescendantPath { left, right } => {
            let base = evaluate(left, ctx, local_vars)?.into_items()?;
            evaluate_descendant_path(base, right, ctx, local_vars)
        }
        Expression::Step(step) => evaluate_step(step, ctx, local_vars),
        Expression::FilterExpr { base, predicates } => {
            let items = evaluate(base, ctx, local_vars)?.into_items()?;
            let filtered = apply_predicates(items, predicates, ctx, local_vars)?;
            Ok(Sequence::from_items(filtered))
        }

        Expression::FunctionCall { name, args } => {
            evaluate_function_call(name, args, ctx, local_vars)
        }
        Expression::DynamicFunctionCall {
            function_expr,
            args,
        } => {
            let callee = evaluate(function_expr, ctx, local_vars)?.exactly_one()?;
            let args = evaluate_arguments(args, ctx, local_vars)?;
            apply_item(callee, args, ctx, local_vars)
        }

        Expression::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => {
                if !evaluate(left, ctx, local_vars)?.effective_boolean_value()? {
                    return Ok(Sequence::from_bool(false));
                }
                let r = evaluate(right, ctx, local_vars)?.effective_boolean_value()?;
                Ok(Sequence::from_bool(r))
            }
            BinaryOperator::Or => {
                if evaluate(left, ctx, local_vars)?.effective_boolean_value()? {
                    return Ok(Sequence::from_bool(true));
                }
                let r = evaluate(right, ctx, local_vars)?.effective_boolean_value()?;
                Ok(Sequence::from_bool(r))
            }
            _ => {
                let l = evaluate(left, ctx, local_vars)?;
                let r = evaluate(right, ctx, local_vars)?;
                operators::evaluate_binary(*op, l, r, ctx.dynamic.implicit_timezone())
            }
        },
        Expression::UnaryOp { op, expr } => {
            let Some(value) = evaluate(expr, ctx, local_vars)?.atomize_optional()? else {
                return Ok(Sequence::empty());
            };
            let result = match op {
                UnaryOperator::Minus => operators::negate(&value)?,
                UnaryOperator::Plus => operators::identity(&value)?,
            };
            Ok(Sequence::from_atomic(result))
        }
        Expression::StringConcat { left, right } => {
            let l = evaluate(left, ctx, local_vars)?;
            let r = evaluate(right, ctx, local_vars)?;
            let mut result = String::new();
            for value in l.atomize()?.iter().chain(r.atomize()?.iter()) {
                result.push_str(&value.to_string_value());
            }
            Ok(Sequence::from_string(result))
        }
        Expression::RangeExpr { start, end } => evaluate_range(start, end, ctx, local_vars),

        Expression::LetExpr {
            bindings,
            return_expr,
        } => {
            let mut new_vars = local_vars.clone();
            for (name, expr) in bindings {
                let value = evaluate(expr, ctx, &new_vars)?.reusable()?;
                new_vars.insert(name.clone(), value);
            }
            evaluate(return_expr, ctx, &new_vars)
        }
        Expression::ForExpr {
            bindings,
            return_expr,
        } => {
            let items = evaluate_for(bindings, return_expr, ctx, local_vars)?;
            Ok(Sequence::from_items(items))
        }
        Expression::QuantifiedExpr {
            quantifier,
            bindings,
            satisfies,
        } => {
            let result = evaluate_quantified(*quantifier, bindings, satisfies, ctx, local_vars)?;
            Ok(Sequence::from_bool(result))
        }
        Expression::IfExpr {
            condition,
            then_expr,
            else_expr,
        } => {
            if evaluate(condition, ctx, local_vars)?.effective_boolean_value()? {
                evaluate(then_expr, ctx, local_vars)
            } else {
                evaluate(else_expr, ctx, local_vars)
            }
        }

        Expression::MapConstructor(entries) => evaluate_map_constructor(entries, ctx, local_vars),
        Expression::ArrayConstructor(kind) => evaluate_array_constructor(kind, ctx, local_vars),
        Expression::LookupExpr { base, key } => {
            let targets = evaluate(base, ctx, local_vars)?;
            let mut results = Vec::new();
            for target in targets.items()? {
                results.extend(lookup::lookup(target, key, ctx, local_vars)?);
            }
            Sequence::concat(results)
        }
        Expression::UnaryLookup(key) => {
            let target = ctx.context_item()?;
            Sequence::concat(lookup::lookup(target, key, ctx, local_vars)?)
        }

        Expression::InlineFunction { params, body, .. } => {
            Ok(Sequence::of(Item::Function(FunctionItem::Inline {
                params: params.clone(),
                body: Arc::clone(body),
                captured: Arc::new(local_vars.clone()),
            })))
        }
        Expression::NamedFunctionRef { name, arity } => {
            let (prefix, local) = function_name(name);
            Ok(Sequence::of(Item::Function(FunctionItem::named(prefix, local, *arity))))
        }
        Expression::ArrowExpr { base, steps } => evaluate_arrow(base, steps, ctx, local_vars),
        Expression::SimpleMapExpr { base, mapping } => {
            let items = evaluate(base, ctx, local_vars)?.into_items()?;
            let size = items.len();
            let mut results = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                let item_ctx = ctx.with_context_item(item).with_position(i + 1, size);
                results.push(evaluate(mapping, &item_ctx, local_vars)?);
            }
            Sequence::concat(results)
        }

        Expression::InstanceOf {
            expr,
            sequence_type,
        } => {
            let value = evaluate(expr, ctx, local_vars)?;
            Ok(Sequence::from_bool(matches_sequence_type(&value, sequence_type)?))
        }
        Expression::TreatAs {
            expr,
            sequence_type,
        } => {
            let value = evaluate(expr, ctx, local_vars)?;
            if matches_sequence_type(&value, sequence_type)? {
                Ok(value)
            } else {
                Err(MetapathError::dynamic_error(format!(
                    "The value '{}' does not match the required type",
                    value.to_signature()
                )))
            }
        }
        Expression::CastAs { expr, single_type } => {
            let value = evaluate(expr, ctx, local_vars)?;
            cast_as(&value, single_type)
        }
        Expression::CastableAs { expr, single_type } => {
            let value = evaluate(expr, ctx, local_vars)?;
            Ok(Sequence::from_bool(cast_as(&value, single_type).is_ok()))
        }
    }
}

fn evaluate_literal<N: NodeItem>(lit: &Literal) -> Sequence<N> {
    Sequence::from_atomic(match lit {
        Literal::String(s) => AtomicValue::String(s.clone()),
        Literal::Integer(i) => AtomicValue::Integer(*i),
        Literal::Decimal(d) => AtomicValue::Decimal(*d),
        Literal::Double(d) => AtomicValue::Double(*d),
    })
}

fn evaluate_variable<N: NodeItem>(
    name: &str,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    local_vars
        .get(name)
        .or_else(|| ctx.dynamic.variable(name))
        .cloned()
        .ok_or_else(|| MetapathError::UnknownVariable {
            name: name.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

fn evaluate_path<N: NodeItem>(
    base: Vec<Item<N>>,
    right: &Expression,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let size = base.len();
    let mut results = Vec::with_capacity(size);
    for (i, item) in base.into_iter().enumerate() {
        if !item.is_node() {
            return Err(not_a_node(&item));
        }
        let step_ctx = ctx.with_context_item(item).with_position(i + 1, size);
        results.push(evaluate(right, &step_ctx, local_vars)?);
    }
    Sequence::concat(results)
}

/// `base//right`: applies `right` to every node at or below each base node.
fn evaluate_descendant_path<N: NodeItem>(
    base: Vec<Item<N>>,
    right: &Expression,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let mut expanded = Vec::new();
    for item in base {
        let Item::Node(node) = item else {
            return Err(not_a_node(&item));
        };
        expanded.push(Item::Node(node.clone()));
        collect_descendants(&node, &mut expanded);
    }
    let items = evaluate_path(expanded, right, ctx, local_vars)?.into_items()?;
    if items.iter().all(Item::is_node) {
        Ok(Sequence::from_items(items.into_iter().unique().collect()))
    } else {
        Ok(Sequence::from_items(items))
    }
}

fn collect_descendants<N: NodeItem>(node: &N, out: &mut Vec<Item<N>>) {
    for child in node.model_items() {
        out.push(Item::Node(child.clone()));
        collect_descendants(&child, out);
    }
}

fn collect_ancestors<N: NodeItem>(node: &N) -> Vec<N> {
    let mut result = Vec::new();
    let mut current = node.parent();
    while let Some(parent) = current {
        current = parent.parent();
        result.push(parent);
    }
    result
}

fn axis_nodes<N: NodeItem>(axis: Axis, node: &N) -> Vec<N> {
    match axis {
        Axis::Child => node.model_items(),
        Axis::Flag => node.flags(),
        Axis::SelfAxis => vec![node.clone()],
        Axis::Parent => node.parent().into_iter().collect(),
        Axis::Ancestor => collect_ancestors(node),
        Axis::AncestorOrSelf => {
            let mut nodes = vec![node.clone()];
            nodes.extend(collect_ancestors(node));
            nodes
        }
        Axis::Descendant | Axis::DescendantOrSelf => {
            let mut items = Vec::new();
            if axis == Axis::DescendantOrSelf {
                items.push(Item::Node(node.clone()));
            }
            collect_descendants(node, &mut items);
            items.into_iter().filter_map(|i| i.as_node().cloned()).collect()
        }
    }
}

/// The kind of node a name test or wildcard selects on an axis.
fn is_principal_kind<N: NodeItem>(node: &N, axis: Axis) -> bool {
    match axis {
        Axis::Flag => node.kind() == NodeKind::Flag,
        _ => matches!(node.kind(), NodeKind::Assembly | NodeKind::Field),
    }
}

fn matches_node_test<N: NodeItem>(node: &N, test: &NodeTest, axis: Axis) -> bool {
    match test {
        NodeTest::Wildcard => is_principal_kind(node, axis),
        NodeTest::Resolved(name) => is_principal_kind(node, axis) && node.name() == Some(name),
        NodeTest::Name(name) => {
            is_principal_kind(node, axis)
                && node.name().is_some_and(|n| {
                    n.local_name() == name.local_part
                        && name.uri.as_deref().is_none_or(|uri| n.namespace() == Some(uri))
                })
        }
        NodeTest::Kind(kind) => match kind {
            KindTest::AnyNode => true,
            KindTest::Document => node.kind() == NodeKind::Document,
            KindTest::Assembly => node.kind() == NodeKind::Assembly,
            KindTest::Field => node.kind() == NodeKind::Field,
            KindTest::Flag => node.kind() == NodeKind::Flag,
        },
    }
}

fn evaluate_step<N: NodeItem>(
    step: &Step,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let node = ctx.context_node()?;
    let candidates: Vec<Item<N>> = axis_nodes(step.axis, node)
        .into_iter()
        .filter(|n| matches_node_test(n, &step.node_test, step.axis))
        .map(Item::Node)
        .collect();
    let mut selected = apply_predicates(candidates, &step.predicates, ctx, local_vars)?;
    if step.axis.is_reverse() {
        // positions count outward from the context node, results read in document order
        selected.reverse();
    }
    Ok(Sequence::from_items(selected))
}

/// Filters `items` through each predicate in turn. A numeric predicate value selects the
/// item at that 1-based position; anything else is tested for its effective boolean
/// value.
fn apply_predicates<N: NodeItem>(
    mut items: Vec<Item<N>>,
    predicates: &[Expression],
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Vec<Item<N>>, MetapathError> {
    for predicate in predicates {
        let size = items.len();
        let mut filtered = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            let pred_ctx = ctx.with_context_item(item.clone()).with_position(i + 1, size);
            let result = evaluate(predicate, &pred_ctx, local_vars)?;
            let include = match result.items()? {
                [Item::Atomic(value)] if value.is_numeric() => {
                    value.to_double() == Some((i + 1) as f64)
                }
                _ => result.effective_boolean_value()?,
            };
            if include {
                filtered.push(item);
            }
        }
        items = filtered;
    }
    Ok(items)
}

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

fn evaluate_range<N: NodeItem>(
    start: &Expression,
    end: &Expression,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let bound = |expr: &Expression| -> Result<Option<i64>, MetapathError> {
        match evaluate(expr, ctx, local_vars)?.atomize_optional()? {
            None => Ok(None),
            Some(AtomicValue::Integer(i)) => Ok(Some(i)),
            Some(value @ AtomicValue::UntypedAtomic(_)) => {
                Ok(value.cast_to(AtomicType::Integer)?.to_integer())
            }
            Some(other) => Err(MetapathError::type_error(format!(
                "Range bounds must be integers, found '{}'",
                other.type_name()
            ))),
        }
    };
    let (Some(s), Some(e)) = (bound(start)?, bound(end)?) else {
        return Ok(Sequence::empty());
    };
    if s > e {
        return Ok(Sequence::empty());
    }
    Ok(Sequence::from_stream(
        (s..=e).map(|i| Item::Atomic(AtomicValue::Integer(i))),
    ))
}

fn evaluate_for<N: NodeItem>(
    bindings: &[(String, Expression)],
    return_expr: &Expression,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Vec<Item<N>>, MetapathError> {
    let Some(((name, expr), rest)) = bindings.split_first() else {
        return evaluate(return_expr, ctx, local_vars)?.into_items();
    };
    let sequence = evaluate(expr, ctx, local_vars)?;
    let mut results = Vec::new();
    for item in sequence.stream()? {
        let mut new_vars = local_vars.clone();
        new_vars.insert(name.clone(), Sequence::of(item));
        results.extend(evaluate_for(rest, return_expr, ctx, &new_vars)?);
    }
    Ok(results)
}

fn evaluate_quantified<N: NodeItem>(
    quantifier: Quantifier,
    bindings: &[(String, Expression)],
    satisfies: &Expression,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<bool, MetapathError> {
    let Some(((name, expr), rest)) = bindings.split_first() else {
        return evaluate(satisfies, ctx, local_vars)?.effective_boolean_value();
    };
    let sequence = evaluate(expr, ctx, local_vars)?;
    for item in sequence.stream()? {
        let mut new_vars = local_vars.clone();
        new_vars.insert(name.clone(), Sequence::of(item));
        let result = evaluate_quantified(quantifier, rest, satisfies, ctx, &new_vars)?;
        match quantifier {
            Quantifier::Some if result => return Ok(true),
            Quantifier::Every if !result => return Ok(false),
            _ => {}
        }
    }
    Ok(quantifier == Quantifier::Every)
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn evaluate_map_constructor<N: NodeItem>(
    entries: &[MapEntry],
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let mut map: IndexMap<MapKey, Sequence<N>> = IndexMap::with_capacity(entries.len());
    for entry in entries {
        let mut keys = evaluate(&entry.key, ctx, local_vars)?.atomize()?;
        if keys.len() != 1 {
            return Err(MetapathError::type_error(format!(
                "A map key must be a single atomic value, found {} values",
                keys.len()
            )));
        }
        let key = MapKey::new(keys.remove(0));
        if map.contains_key(&key) {
            return Err(MetapathError::DuplicateMapKey {
                key: key.key().to_string_value(),
            });
        }
        let value = evaluate(&entry.value, ctx, local_vars)?.reusable()?;
        map.insert(key, value);
    }
    Ok(Sequence::of(Item::Map(MapItem::new(map))))
}

fn evaluate_array_constructor<N: NodeItem>(
    kind: &ArrayConstructorKind,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let array = match kind {
        ArrayConstructorKind::Square(members) => {
            let mut values = Vec::with_capacity(members.len());
            for member in members {
                values.push(evaluate(member, ctx, local_vars)?.reusable()?);
            }
            ArrayItem::new(values)
        }
        ArrayConstructorKind::Curly(expr) => {
            ArrayItem::of(evaluate(expr, ctx, local_vars)?.into_items()?)
        }
    };
    Ok(Sequence::of(Item::Array(array)))
}

// ---------------------------------------------------------------------------
// Function calls
// ---------------------------------------------------------------------------

/// The canonical library prefix and local name of a function call.
pub(crate) fn function_name(name: &QName) -> (&str, &str) {
    let prefix = name
        .uri
        .as_deref()
        .and_then(library_prefix)
        .or(name.prefix.as_deref())
        .unwrap_or("fn");
    (prefix, name.local_part.as_str())
}

/// Evaluates call arguments; `None` marks a `?` placeholder.
fn evaluate_arguments<N: NodeItem>(
    args: &[Argument],
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Vec<Option<Sequence<N>>>, MetapathError> {
    args.iter()
        .map(|arg| match arg {
            Argument::Expr(e) => evaluate(e, ctx, local_vars)?.reusable().map(Some),
            Argument::Placeholder => Ok(None),
        })
        .collect()
}

/// Calls `function` with `args`, or returns a partial application if any argument is
/// a placeholder.
fn apply_function<N: NodeItem>(
    function: FunctionItem<N>,
    args: Vec<Option<Sequence<N>>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    if args.iter().any(Option::is_none) {
        if args.len() != function.arity() {
            return Err(MetapathError::type_error(format!(
                "Function '{}' expects {} arguments, got {}",
                function.to_signature(),
                function.arity(),
                args.len()
            )));
        }
        return Ok(Sequence::of(Item::Function(FunctionItem::Partial {
            base: Box::new(function),
            bound: args,
        })));
    }
    let args = args.into_iter().flatten().collect();
    functions::call_function_item(&function, args, ctx, local_vars)
}

fn apply_item<N: NodeItem>(
    callee: Item<N>,
    args: Vec<Option<Sequence<N>>>,
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    match callee {
        Item::Function(function) => apply_function(function, args, ctx, local_vars),
        collection @ (Item::Map(_) | Item::Array(_)) => {
            let mut args: Vec<Sequence<N>> = args
                .into_iter()
                .map(|a| {
                    a.ok_or_else(|| {
                        MetapathError::type_error("Maps and arrays cannot be partially applied")
                    })
                })
                .collect::<Result<_, _>>()?;
            if args.len() != 1 {
                return Err(MetapathError::type_error(format!(
                    "Maps and arrays take exactly one argument, got {}",
                    args.len()
                )));
            }
            lookup::call_collection(&collection, &args.remove(0))
        }
        other => Err(MetapathError::type_error(format!(
            "Items of type '{}' cannot be called",
            other.type_name()
        ))),
    }
}

fn evaluate_function_call<N: NodeItem>(
    name: &QName,
    args: &[Argument],
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let (prefix, local) = function_name(name);
    let args = evaluate_arguments(args, ctx, local_vars)?;
    if args.iter().all(Option::is_some) {
        let args = args.into_iter().flatten().collect();
        return functions::call_function(prefix, local, args, ctx, local_vars);
    }
    let function = FunctionItem::named(prefix, local, args.len());
    apply_function(function, args, ctx, local_vars)
}

fn evaluate_arrow<N: NodeItem>(
    base: &Expression,
    steps: &[ArrowStep],
    ctx: &EvaluationContext<'_, N>,
    local_vars: &Variables<N>,
) -> Result<Sequence<N>, MetapathError> {
    let mut current = evaluate(base, ctx, local_vars)?.reusable()?;
    for step in steps {
        let mut args = vec![Some(current)];
        args.extend(evaluate_arguments(&step.args, ctx, local_vars)?);
        current = match &step.target {
            ArrowTarget::Named(name) => {
                let (prefix, local) = function_name(name);
                let function = FunctionItem::named(prefix, local, args.len());
                apply_function(function, args, ctx, local_vars)?
            }
            ArrowTarget::Variable(var) => {
                let callee = evaluate_variable(var, ctx, local_vars)?.exactly_one()?;
                apply_item(callee, args, ctx, local_vars)?
            }
            ArrowTarget::Inline(expr) => {
                let callee = evaluate(expr, ctx, local_vars)?.exactly_one()?;
                apply_item(callee, args, ctx, local_vars)?
            }
        }
        .reusable()?;
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub(crate) fn resolve_atomic_type(name: &QName) -> Result<AtomicType, MetapathError> {
    AtomicType::from_name(&name.local_part).ok_or_else(|| {
        MetapathError::static_error(name.to_string(), format!("Unknown atomic type '{}'", name))
    })
}

fn matches_item_type<N: NodeItem>(item: &Item<N>, item_type: &ItemType) -> Result<bool, MetapathError> {
    let matched = match item_type {
        ItemType::Item => true,
        ItemType::EmptySequence => false,
        ItemType::Atomic(name) => {
            let ty = resolve_atomic_type(name)?;
            item.as_atomic().is_some_and(|a| a.is_instance_of(ty))
        }
        ItemType::KindTest(kind) => match item.as_node() {
            Some(node) => match kind {
                KindTest::AnyNode => true,
                KindTest::Document => node.kind() == NodeKind::Document,
                KindTest::Assembly => node.kind() == NodeKind::Assembly,
                KindTest::Field => node.kind() == NodeKind::Field,
                KindTest::Flag => node.kind() == NodeKind::Flag,
            },
            None => false,
        },
        ItemType::Function => matches!(item, Item::Function(_) | Item::Map(_) | Item::Array(_)),
        ItemType::Map => matches!(item, Item::Map(_)),
        ItemType::Array => matches!(item, Item::Array(_)),
    };
    Ok(matched)
}

pub(crate) fn matches_sequence_type<N: NodeItem>(
    value: &Sequence<N>,
    sequence_type: &SequenceType,
) -> Result<bool, MetapathError> {
    let items = value.items()?;
    if sequence_type.item_type == ItemType::EmptySequence {
        return Ok(items.is_empty());
    }
    if !sequence_type.occurrence.allows(items.len()) {
        return Ok(false);
    }
    for item in items {
        if !matches_item_type(item, &sequence_type.item_type)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn cast_as<N: NodeItem>(value: &Sequence<N>, single_type: &SingleType) -> Result<Sequence<N>, MetapathError> {
    let target = resolve_atomic_type(&single_type.type_name)?;
    let mut values = value.atomize()?;
    match values.len() {
        0 if single_type.optional => Ok(Sequence::empty()),
        1 => Ok(Sequence::from_atomic(values.remove(0).cast_to(target)?)),
        n => Err(MetapathError::Cardinality {
            expected: if single_type.optional {
                CardinalityCode::ZeroOrOne
            } else {
                CardinalityCode::ExactlyOne
            },
            actual: n,
        }),
    }
}
