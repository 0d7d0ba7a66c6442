//! Compilation: parsing followed by a static pass over the AST.
//!
//! The static pass resolves every name the evaluator later relies on, so evaluation never
//! consults the [`StaticContext`]:
//!
//! - function names are canonicalized to their library prefix and checked against the
//!   function table by name and arity;
//! - single-argument calls in the schema namespace (`xs:date('2020-01-01')`) become
//!   optional casts;
//! - atomic type names in casts and sequence types must be known;
//! - name tests are resolved against the namespace bindings;
//! - map constructors may not repeat a literal key.

use crate::ast::*;
use crate::context::{DynamicContext, NS_METAPATH, NS_XML_SCHEMA, StaticContext, library_prefix};
use crate::engine::{EvaluationContext, Variables, evaluate, resolve_atomic_type};
use crate::error::MetapathError;
use crate::functions;
use crate::parser::parse_expression;
use crate::types::{Item, Sequence};
use metaschema_mdm::{NodeItem, QName as ResolvedName};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A parsed and statically checked expression, ready to evaluate any number of times.
#[derive(Clone)]
pub struct MetapathExpression {
    text: Arc<str>,
    ast: Arc<Expression>,
}

impl fmt::Debug for MetapathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MetapathExpression").field(&self.text).finish()
    }
}

impl fmt::Display for MetapathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl MetapathExpression {
    pub fn compile(text: &str, static_context: &StaticContext) -> Result<Self, MetapathError> {
        let mut ast = parse_expression(text)?;
        Analyzer {
            text,
            context: static_context,
        }
        .expression(&mut ast)?;
        Ok(Self {
            text: Arc::from(text),
            ast: Arc::new(ast),
        })
    }

    /// Compiles against the default static context.
    pub fn parse(text: &str) -> Result<Self, MetapathError> {
        Self::compile(text, &StaticContext::default())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ast(&self) -> &Expression {
        &self.ast
    }

    /// Evaluates with `focus` as the context item, or with no focus at all.
    pub fn evaluate<N: NodeItem>(
        &self,
        focus: Option<Item<N>>,
        dynamic: &DynamicContext<N>,
    ) -> Result<Sequence<N>, MetapathError> {
        let ctx = EvaluationContext::new(focus, dynamic);
        evaluate(&self.ast, &ctx, &Variables::new())
    }

    pub fn evaluate_node<N: NodeItem>(
        &self,
        node: &N,
        dynamic: &DynamicContext<N>,
    ) -> Result<Sequence<N>, MetapathError> {
        self.evaluate(Some(Item::Node(node.clone())), dynamic)
    }

    /// The effective boolean value of the result.
    pub fn evaluate_boolean<N: NodeItem>(
        &self,
        focus: Option<Item<N>>,
        dynamic: &DynamicContext<N>,
    ) -> Result<bool, MetapathError> {
        self.evaluate(focus, dynamic)?.effective_boolean_value()
    }

    /// The string value of the first item, or `""` for an empty result.
    pub fn evaluate_string<N: NodeItem>(
        &self,
        focus: Option<Item<N>>,
        dynamic: &DynamicContext<N>,
    ) -> Result<String, MetapathError> {
        match self.evaluate(focus, dynamic)?.first_item(false)? {
            Some(item) => item.string_value(),
            None => Ok(String::new()),
        }
    }
}

struct Analyzer<'a> {
    text: &'a str,
    context: &'a StaticContext,
}

impl Analyzer<'_> {
    fn error(&self, message: impl Into<String>) -> MetapathError {
        MetapathError::static_error(self.text, message)
    }

    fn namespace_of(&self, name: &QName, default: Option<&str>) -> Result<Option<String>, MetapathError> {
        if let Some(uri) = &name.uri {
            return Ok(Some(uri.clone()));
        }
        match &name.prefix {
            Some(prefix) => self
                .context
                .lookup_namespace(prefix)
                .map(|uri| Some(uri.to_string()))
                .ok_or_else(|| self.error(format!("Unbound namespace prefix '{}'", prefix))),
            None => Ok(default.map(str::to_string)),
        }
    }

    /// The canonical library name of a function, e.g. `fn:count`.
    fn function_name(&self, name: &QName) -> Result<QName, MetapathError> {
        let namespace = self
            .namespace_of(name, Some(self.context.default_function_namespace()))?
            .unwrap_or_default();
        match library_prefix(&namespace) {
            Some(prefix) => Ok(QName {
                prefix: Some(prefix.to_string()),
                local_part: name.local_part.clone(),
                uri: Some(namespace),
            }),
            None => Err(self.error(format!("Unknown function '{}'", name))),
        }
    }

    fn check_function(&self, name: &QName, arity: usize) -> Result<QName, MetapathError> {
        let canonical = self.function_name(name)?;
        let prefix = canonical.prefix.as_deref().unwrap_or("fn");
        if !functions::is_known(prefix, &canonical.local_part, arity) {
            return Err(match functions::signature(prefix, &canonical.local_part) {
                Some(_) => self.error(format!(
                    "Function '{}:{}' does not accept {} arguments",
                    prefix, canonical.local_part, arity
                )),
                None => self.error(format!("Unknown function '{}:{}'", prefix, canonical.local_part)),
            });
        }
        Ok(canonical)
    }

    fn is_type_namespace(&self, name: &QName) -> Result<bool, MetapathError> {
        let namespace = self.namespace_of(name, Some(NS_XML_SCHEMA))?;
        Ok(matches!(namespace.as_deref(), Some(NS_XML_SCHEMA) | Some(NS_METAPATH)))
    }

    fn atomic_type(&self, name: &QName) -> Result<(), MetapathError> {
        if !self.is_type_namespace(name)? {
            return Err(self.error(format!("Unknown atomic type '{}'", name)));
        }
        resolve_atomic_type(name)
            .map(|_| ())
            .map_err(|_| self.error(format!("Unknown atomic type '{}'", name)))
    }

    fn sequence_type(&self, sequence_type: &SequenceType) -> Result<(), MetapathError> {
        match &sequence_type.item_type {
            ItemType::Atomic(name) => self.atomic_type(name),
            _ => Ok(()),
        }
    }

    fn node_test(&self, test: &mut NodeTest, axis: Axis) -> Result<(), MetapathError> {
        let NodeTest::Name(name) = test else {
            return Ok(());
        };
        let default = match axis {
            Axis::Flag => None,
            _ => self.context.default_model_namespace(),
        };
        let explicit = name.uri.is_some() || name.prefix.is_some();
        let namespace = self.namespace_of(name, default)?;
        // without any namespace information an unprefixed name matches on its local part
        if explicit || namespace.is_some() {
            *test = NodeTest::Resolved(ResolvedName::new(namespace, name.local_part.clone()));
        }
        Ok(())
    }

    fn arguments(&self, args: &mut [Argument]) -> Result<(), MetapathError> {
        for arg in args {
            if let Argument::Expr(e) = arg {
                self.expression(e)?;
            }
        }
        Ok(())
    }

    fn bindings(&self, bindings: &mut [(String, Expression)]) -> Result<(), MetapathError> {
        for (_, e) in bindings {
            self.expression(e)?;
        }
        Ok(())
    }

    fn lookup_key(&self, key: &mut LookupKey) -> Result<(), MetapathError> {
        if let LookupKey::Parenthesized(e) = key {
            self.expression(e)?;
        }
        Ok(())
    }

    fn step(&self, step: &mut Step) -> Result<(), MetapathError> {
        self.node_test(&mut step.node_test, step.axis)?;
        for predicate in &mut step.predicates {
            self.expression(predicate)?;
        }
        Ok(())
    }

    fn map_entries(&self, entries: &mut [MapEntry]) -> Result<(), MetapathError> {
        let mut literal_keys = HashSet::new();
        for entry in entries.iter_mut() {
            self.expression(&mut entry.key)?;
            self.expression(&mut entry.value)?;
            if let Expression::Literal(Literal::String(key)) = &entry.key
                && !literal_keys.insert(key.clone())
            {
                return Err(MetapathError::DuplicateMapKey { key: key.clone() });
            }
        }
        Ok(())
    }

    fn is_constructor(&self, name: &QName) -> Result<bool, MetapathError> {
        let namespace = self.namespace_of(name, Some(self.context.default_function_namespace()))?;
        Ok(namespace.as_deref() == Some(NS_XML_SCHEMA))
    }

    fn expression(&self, expr: &mut Expression) -> Result<(), MetapathError> {
        if let Expression::FunctionCall { name, .. } = expr
            && self.is_constructor(name)?
        {
            return self.constructor(expr);
        }
        match expr {
            Expression::Literal(_)
            | Expression::Variable(_)
            | Expression::ContextItem
            | Expression::Root => Ok(()),
            Expression::Sequence(items) => items.iter_mut().try_for_each(|e| self.expression(e)),
            Expression::RootPath(e) | Expression::RootDescendantPath(e) => self.expression(e),
            Expression::Path { left, right }
            | Expression::DescendantPath { left, right }
            | Expression::BinaryOp { left, right, .. }
            | Expression::StringConcat { left, right }
            | Expression::RangeExpr {
                start: left,
                end: right,
            } => {
                self.expression(left)?;
                self.expression(right)
            }
            Expression::Step(step) => self.step(step),
            Expression::FilterExpr { base, predicates } => {
                self.expression(base)?;
                predicates.iter_mut().try_for_each(|p| self.expression(p))
            }
            Expression::FunctionCall { name, args } => {
                *name = self.check_function(name, args.len())?;
                self.arguments(args)
            }
            Expression::DynamicFunctionCall {
                function_expr,
                args,
            } => {
                self.expression(function_expr)?;
                self.arguments(args)
            }
            Expression::UnaryOp { expr, .. } => self.expression(expr),
            Expression::LetExpr {
                bindings,
                return_expr,
            }
            | Expression::ForExpr {
                bindings,
                return_expr,
            } => {
                self.bindings(bindings)?;
                self.expression(return_expr)
            }
            Expression::QuantifiedExpr {
                bindings,
                satisfies,
                ..
            } => {
                self.bindings(bindings)?;
                self.expression(satisfies)
            }
            Expression::IfExpr {
                condition,
                then_expr,
                else_expr,
            } => {
                self.expression(condition)?;
                self.expression(then_expr)?;
                self.expression(else_expr)
            }
            Expression::MapConstructor(entries) => self.map_entries(entries),
            Expression::ArrayConstructor(ArrayConstructorKind::Square(members)) => {
                members.iter_mut().try_for_each(|e| self.expression(e))
            }
            Expression::ArrayConstructor(ArrayConstructorKind::Curly(e)) => self.expression(e),
            Expression::LookupExpr { base, key } => {
                self.expression(base)?;
                self.lookup_key(key)
            }
            Expression::UnaryLookup(key) => self.lookup_key(key),
            Expression::InlineFunction {
                params,
                return_type,
                body,
            } => {
                for param in params.iter() {
                    if let Some(declared) = &param.type_decl {
                        self.sequence_type(declared)?;
                    }
                }
                if let Some(declared) = return_type {
                    self.sequence_type(declared)?;
                }
                self.expression(Arc::make_mut(body))
            }
            Expression::NamedFunctionRef { name, arity } => {
                *name = self.check_function(name, *arity)?;
                Ok(())
            }
            Expression::ArrowExpr { base, steps } => {
                self.expression(base)?;
                for step in steps.iter_mut() {
                    match &mut step.target {
                        ArrowTarget::Named(name) => {
                            *name = self.check_function(name, step.args.len() + 1)?;
                        }
                        ArrowTarget::Variable(_) => {}
                        ArrowTarget::Inline(e) => self.expression(e)?,
                    }
                    self.arguments(&mut step.args)?;
                }
                Ok(())
            }
            Expression::SimpleMapExpr { base, mapping } => {
                self.expression(base)?;
                self.expression(mapping)
            }
            Expression::InstanceOf {
                expr,
                sequence_type,
            }
            | Expression::TreatAs {
                expr,
                sequence_type,
            } => {
                self.sequence_type(sequence_type)?;
                self.expression(expr)
            }
            Expression::CastAs { expr, single_type }
            | Expression::CastableAs { expr, single_type } => {
                self.atomic_type(&single_type.type_name)?;
                self.expression(expr)
            }
        }
    }

    /// Rewrites a schema-namespace constructor call into the equivalent optional cast.
    fn constructor(&self, expr: &mut Expression) -> Result<(), MetapathError> {
        let Expression::FunctionCall { name, args } = expr else {
            return Ok(());
        };
        let type_name = QName::new(name.local_part.clone());
        self.atomic_type(&type_name)?;
        let mut operand = match args.as_mut_slice() {
            [Argument::Expr(e)] => std::mem::replace(e, Expression::ContextItem),
            _ => {
                return Err(self.error(format!(
                    "Constructor function '{}' takes exactly one argument",
                    name
                )));
            }
        };
        self.expression(&mut operand)?;
        *expr = Expression::CastAs {
            expr: Box::new(operand),
            single_type: SingleType {
                type_name,
                optional: true,
            },
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AtomicValue;
    use metaschema_mdm::NodeRef;

    fn eval(text: &str) -> Result<Sequence<NodeRef>, MetapathError> {
        MetapathExpression::parse(text)?.evaluate(None, &DynamicContext::new())
    }

    #[test]
    fn test_compile_rejects_unknown_functions() {
        let err = MetapathExpression::parse("fn:no-such(1)").unwrap_err();
        assert!(matches!(err, MetapathError::Static { .. }));
        let err = MetapathExpression::parse("count(1, 2)").unwrap_err();
        assert!(err.to_string().contains("does not accept 2 arguments"));
        assert!(MetapathExpression::parse("count#3").is_err());
        assert!(MetapathExpression::parse("'a' => concat()").is_err());
    }

    #[test]
    fn test_compile_rejects_unbound_prefix() {
        let err = MetapathExpression::parse("oscal:control").unwrap_err();
        assert!(err.to_string().contains("Unbound namespace prefix 'oscal'"));
        let context = StaticContext::new().with_namespace("oscal", "http://example.com/ns/oscal");
        assert!(MetapathExpression::compile("oscal:control", &context).is_ok());
    }

    #[test]
    fn test_function_namespaces_are_canonicalized() {
        let context = StaticContext::new()
            .with_namespace("f", crate::context::NS_METAPATH_FUNCTIONS);
        let expr = MetapathExpression::compile("f:count((1, 2))", &context).unwrap();
        let result = expr.evaluate::<NodeRef>(None, &DynamicContext::new()).unwrap();
        assert_eq!(result, Sequence::from_integer(2));
        assert_eq!(eval("Q{http://csrc.nist.gov/ns/metaschema/metapath-functions/math}pi() > 3").unwrap(), Sequence::from_bool(true));
    }

    #[test]
    fn test_constructor_functions_cast() {
        let result = eval("xs:integer('42') + 1").unwrap();
        assert_eq!(result, Sequence::from_integer(43));
        assert!(eval("xs:integer(())").unwrap().is_empty().unwrap());
        assert!(MetapathExpression::parse("xs:no-such-type('1')").is_err());
        assert!(matches!(eval("xs:integer('x')"), Err(MetapathError::InvalidCast { .. })));
    }

    #[test]
    fn test_literal_duplicate_map_keys_fail_to_compile() {
        let err = MetapathExpression::parse("map { 'a': 1, 'a': 2 }").unwrap_err();
        assert_eq!(err.code(), "XQDY0137");
    }

    #[test]
    fn test_name_tests_resolve_against_default_model_namespace() {
        let context = StaticContext::new().with_default_model_namespace("urn:model");
        let expr = MetapathExpression::compile("control/@id", &context).unwrap();
        let Expression::Path { left, right } = expr.ast() else {
            panic!("expected a path, got {:?}", expr.ast());
        };
        assert!(matches!(
            left.as_ref(),
            Expression::Step(Step { node_test: NodeTest::Resolved(name), .. })
                if name.namespace() == Some("urn:model")
        ));
        assert!(matches!(
            right.as_ref(),
            Expression::Step(Step { node_test: NodeTest::Name(name), .. }) if name.local_part == "id"
        ));
    }

    #[test]
    fn test_evaluate_helpers() {
        let expr = MetapathExpression::parse("('a', 'b')").unwrap();
        let dynamic = DynamicContext::<NodeRef>::new();
        assert_eq!(expr.evaluate_string(None, &dynamic).unwrap(), "a");
        assert!(MetapathExpression::parse("()").unwrap().evaluate_string::<NodeRef>(None, &dynamic).unwrap().is_empty());
        assert!(MetapathExpression::parse("1 = 1").unwrap().evaluate_boolean::<NodeRef>(None, &dynamic).unwrap());
        let untyped = Sequence::<NodeRef>::from_atomic(AtomicValue::UntypedAtomic("x".into()));
        assert!(untyped.effective_boolean_value().unwrap());
        assert_eq!(expr.text(), "('a', 'b')");
    }
}
