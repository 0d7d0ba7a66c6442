//! Metapath expression AST types.
//!
//! Core types: [`Expression`], [`Step`], [`SequenceType`], [`QName`].
//!
//! The parser produces this tree directly; productions that only wrap a single child are
//! never materialized, and argument lists, predicate lists and type syntax live inside
//! the node that owns them.

use metaschema_mdm::QName as ResolvedName;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Variable(String),
    ContextItem,
    Sequence(Vec<Expression>),

    /// `/` on its own: the root of the focus node's tree.
    Root,
    /// `/rel`
    RootPath(Box<Expression>),
    /// `//rel`
    RootDescendantPath(Box<Expression>),
    /// `left/right`
    Path {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `left//right`
    DescendantPath {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Step(Step),
    FilterExpr {
        base: Box<Expression>,
        predicates: Vec<Expression>,
    },

    FunctionCall {
        name: QName,
        args: Vec<Argument>,
    },
    DynamicFunctionCall {
        function_expr: Box<Expression>,
        args: Vec<Argument>,
    },

    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
    StringConcat {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    RangeExpr {
        start: Box<Expression>,
        end: Box<Expression>,
    },

    LetExpr {
        bindings: Vec<(String, Expression)>,
        return_expr: Box<Expression>,
    },
    ForExpr {
        bindings: Vec<(String, Expression)>,
        return_expr: Box<Expression>,
    },
    QuantifiedExpr {
        quantifier: Quantifier,
        bindings: Vec<(String, Expression)>,
        satisfies: Box<Expression>,
    },
    IfExpr {
        condition: Box<Expression>,
        then_expr: Box<Expression>,
        else_expr: Box<Expression>,
    },

    MapConstructor(Vec<MapEntry>),
    ArrayConstructor(ArrayConstructorKind),
    LookupExpr {
        base: Box<Expression>,
        key: LookupKey,
    },
    UnaryLookup(LookupKey),

    InlineFunction {
        params: Vec<Param>,
        return_type: Option<SequenceType>,
        body: Arc<Expression>,
    },
    NamedFunctionRef {
        name: QName,
        arity: usize,
    },
    ArrowExpr {
        base: Box<Expression>,
        steps: Vec<ArrowStep>,
    },
    SimpleMapExpr {
        base: Box<Expression>,
        mapping: Box<Expression>,
    },

    InstanceOf {
        expr: Box<Expression>,
        sequence_type: SequenceType,
    },
    TreatAs {
        expr: Box<Expression>,
        sequence_type: SequenceType,
    },
    CastAs {
        expr: Box<Expression>,
        single_type: SingleType,
    },
    CastableAs {
        expr: Box<Expression>,
        single_type: SingleType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
}

/// A call argument: an expression, or `?` for partial application.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Expr(Expression),
    Placeholder,
}

impl Argument {
    pub fn as_expr(&self) -> Option<&Expression> {
        match self {
            Argument::Expr(e) => Some(e),
            Argument::Placeholder => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // General comparison
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Value comparison
    ValueEq,
    ValueNe,
    ValueLt,
    ValueLe,
    ValueGt,
    ValueGe,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    IntegerDivide,
    Modulo,
    // Node sets
    Union,
    Intersect,
    Except,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Equals => "=",
            BinaryOperator::NotEquals => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::ValueEq => "eq",
            BinaryOperator::ValueNe => "ne",
            BinaryOperator::ValueLt => "lt",
            BinaryOperator::ValueLe => "le",
            BinaryOperator::ValueGt => "gt",
            BinaryOperator::ValueGe => "ge",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "div",
            BinaryOperator::IntegerDivide => "idiv",
            BinaryOperator::Modulo => "mod",
            BinaryOperator::Union => "union",
            BinaryOperator::Intersect => "intersect",
            BinaryOperator::Except => "except",
        })
    }
}

/// One axis step, like `child::group[2]` or `@id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

/// The axis of movement from the focus node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Model items (fields and assemblies); flags are only reachable via [`Axis::Flag`].
    Child,
    Descendant,
    DescendantOrSelf,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Flag,
}

impl Axis {
    /// Reverse axes number their predicate positions from the focus outwards.
    pub fn is_reverse(&self) -> bool {
        matches!(self, Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// A name as written; replaced by [`NodeTest::Resolved`] during compilation.
    Name(QName),
    Resolved(ResolvedName),
    Wildcard,
    Kind(KindTest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindTest {
    AnyNode,
    Document,
    Assembly,
    Field,
    Flag,
}

impl fmt::Display for KindTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KindTest::AnyNode => "node()",
            KindTest::Document => "document-node()",
            KindTest::Assembly => "assembly()",
            KindTest::Field => "field()",
            KindTest::Flag => "flag()",
        })
    }
}

/// A lexical QName: `prefix:local`, `local` or `Q{uri}local`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local_part: String,
    pub uri: Option<String>,
}

impl QName {
    pub fn new(local_part: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_part: local_part.into(),
            uri: None,
        }
    }

    pub fn with_prefix(prefix: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            local_part: local_part.into(),
            uri: None,
        }
    }

    pub fn with_uri(uri: impl Into<String>, local_part: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local_part: local_part.into(),
            uri: Some(uri.into()),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.uri, &self.prefix) {
            (Some(uri), _) => write!(f, "Q{{{}}}{}", uri, self.local_part),
            (None, Some(p)) => write!(f, "{}:{}", p, self.local_part),
            (None, None) => f.write_str(&self.local_part),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayConstructorKind {
    /// `[a, b]`: one member per expression.
    Square(Vec<Expression>),
    /// `array { expr }`: one member per item.
    Curly(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_decl: Option<SequenceType>,
}

/// The function on the right of `=>`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrowTarget {
    Named(QName),
    Variable(String),
    Inline(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowStep {
    pub target: ArrowTarget,
    pub args: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupKey {
    Wildcard,
    NCName(String),
    Integer(i64),
    Parenthesized(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceType {
    pub item_type: ItemType,
    pub occurrence: OccurrenceIndicator,
}

impl SequenceType {
    pub fn single(item_type: ItemType) -> Self {
        Self {
            item_type,
            occurrence: OccurrenceIndicator::ExactlyOne,
        }
    }

    pub fn empty() -> Self {
        Self {
            item_type: ItemType::EmptySequence,
            occurrence: OccurrenceIndicator::ZeroOrOne,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemType {
    Item,
    /// `empty-sequence()`
    EmptySequence,
    Atomic(QName),
    KindTest(KindTest),
    /// `function(*)`
    Function,
    /// `map(*)`
    Map,
    /// `array(*)`
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceIndicator {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl OccurrenceIndicator {
    pub fn allows(&self, count: usize) -> bool {
        match self {
            OccurrenceIndicator::ExactlyOne => count == 1,
            OccurrenceIndicator::ZeroOrOne => count <= 1,
            OccurrenceIndicator::ZeroOrMore => true,
            OccurrenceIndicator::OneOrMore => count >= 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleType {
    pub type_name: QName,
    pub optional: bool,
}

impl Expression {
    pub fn literal_string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    pub fn literal_integer(i: i64) -> Self {
        Expression::Literal(Literal::Integer(i))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn function_call(name: QName, args: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            name,
            args: args.into_iter().map(Argument::Expr).collect(),
        }
    }

    pub fn binary_op(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn step(axis: Axis, node_test: NodeTest) -> Self {
        Expression::Step(Step {
            axis,
            node_test,
            predicates: Vec::new(),
        })
    }

    pub fn path(left: Expression, right: Expression) -> Self {
        Expression::Path {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn simple_map(base: Expression, mapping: Expression) -> Self {
        Expression::SimpleMapExpr {
            base: Box::new(base),
            mapping: Box::new(mapping),
        }
    }

    pub fn lookup(base: Expression, key: LookupKey) -> Self {
        Expression::LookupExpr {
            base: Box::new(base),
            key,
        }
    }

    pub fn range(start: Expression, end: Expression) -> Self {
        Expression::RangeExpr {
            start: Box::new(start),
            end: Box::new(end),
        }
    }

    pub fn string_concat(left: Expression, right: Expression) -> Self {
        Expression::StringConcat {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
