use crate::ast::*;
use crate::error::MetapathError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{map, not, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// Parses Metapath text into an AST.
///
/// Failures are reported as [`MetapathError::Syntax`] with the 1-based line and column
/// of the first input the grammar could not consume.
pub fn parse_expression(input: &str) -> Result<Expression, MetapathError> {
    let parsed = delimited(sp, expr, sp).parse(input);
    match parsed {
        Ok(("", expr)) => Ok(expr),
        Ok((rem, _)) => {
            let (line, column) = position(input, rem);
            Err(MetapathError::syntax(
                input,
                line,
                column,
                format!("Unexpected input '{}'", rem),
            ))
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let (line, column) = position(input, e.input);
            let message = if e.input.is_empty() {
                "Unexpected end of expression".to_string()
            } else {
                format!("Unable to parse '{}'", e.input)
            };
            Err(MetapathError::syntax(input, line, column, message))
        }
        Err(nom::Err::Incomplete(_)) => {
            let (line, column) = position(input, "");
            Err(MetapathError::syntax(input, line, column, "Incomplete expression"))
        }
    }
}

fn position(input: &str, rest: &str) -> (usize, usize) {
    let offset = input.len().saturating_sub(rest.len());
    let consumed = &input[..offset];
    let line = consumed.matches('\n').count() + 1;
    let column = match consumed.rfind('\n') {
        Some(nl) => consumed[nl + 1..].chars().count() + 1,
        None => consumed.chars().count() + 1,
    };
    (line, column)
}

/// Whitespace and `(: ... :)` comments, which may nest.
fn sp(input: &str) -> IResult<&str, ()> {
    let mut input = input;
    loop {
        let (rest, _) = multispace0(input)?;
        match rest.strip_prefix("(:") {
            Some(body) => input = skip_comment(body)?,
            None => return Ok((rest, ())),
        }
    }
}

fn skip_comment(body: &str) -> Result<&str, nom::Err<Error<&str>>> {
    let mut depth = 1usize;
    let mut rest = body;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("(:") {
            depth += 1;
            rest = after;
        } else if let Some(after) = rest.strip_prefix(":)") {
            depth -= 1;
            rest = after;
            if depth == 0 {
                return Ok(rest);
            }
        } else {
            let width = rest.chars().next().map_or(1, char::len_utf8);
            rest = &rest[width..];
        }
    }
    Err(nom::Err::Failure(Error::new(body, ErrorKind::Verify)))
}

fn ws<'a, F, O>(inner: F) -> impl Parser<&'a str, Output = O, Error = Error<&'a str>>
where
    F: Parser<&'a str, Output = O, Error = Error<&'a str>>,
{
    delimited(sp, inner, sp)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// A reserved word that is not the prefix of a longer name.
fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = Error<&'a str>> {
    terminated(tag(word), not(satisfy(is_name_char)))
}

fn fail<O>(input: &str) -> IResult<&str, O> {
    Err(nom::Err::Error(Error::new(input, ErrorKind::Verify)))
}

fn expr(input: &str) -> IResult<&str, Expression> {
    let (input, mut items) = separated_list1(ws(char(',')), expr_single).parse(input)?;
    if items.len() == 1 {
        if let Some(single) = items.pop() {
            return Ok((input, single));
        }
    }
    Ok((input, Expression::Sequence(items)))
}

fn expr_single(input: &str) -> IResult<&str, Expression> {
    alt((for_expr, let_expr, quantified_expr, if_expr, or_expr)).parse(input)
}

fn for_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = ws(keyword("for")).parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), in_binding).parse(input)?;
    let (input, _) = ws(keyword("return")).parse(input)?;
    let (input, return_expr) = expr_single(input)?;

    Ok((
        input,
        Expression::ForExpr {
            bindings,
            return_expr: Box::new(return_expr),
        },
    ))
}

fn in_binding(input: &str) -> IResult<&str, (String, Expression)> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = var_name(input)?;
    let (input, _) = ws(keyword("in")).parse(input)?;
    let (input, expr) = expr_single(input)?;
    Ok((input, (name, expr)))
}

fn let_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = ws(keyword("let")).parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), let_binding).parse(input)?;
    let (input, _) = ws(keyword("return")).parse(input)?;
    let (input, return_expr) = expr_single(input)?;

    Ok((
        input,
        Expression::LetExpr {
            bindings,
            return_expr: Box::new(return_expr),
        },
    ))
}

fn let_binding(input: &str) -> IResult<&str, (String, Expression)> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = var_name(input)?;
    let (input, _) = ws(tag(":=")).parse(input)?;
    let (input, expr) = expr_single(input)?;
    Ok((input, (name, expr)))
}

fn quantified_expr(input: &str) -> IResult<&str, Expression> {
    let (input, quantifier) = alt((
        value(Quantifier::Some, ws(keyword("some"))),
        value(Quantifier::Every, ws(keyword("every"))),
    ))
    .parse(input)?;
    let (input, bindings) = separated_list1(ws(char(',')), in_binding).parse(input)?;
    let (input, _) = ws(keyword("satisfies")).parse(input)?;
    let (input, satisfies) = expr_single(input)?;

    Ok((
        input,
        Expression::QuantifiedExpr {
            quantifier,
            bindings,
            satisfies: Box::new(satisfies),
        },
    ))
}

fn if_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = ws(keyword("if")).parse(input)?;
    let (input, condition) = delimited(ws(char('(')), expr, ws(char(')'))).parse(input)?;
    let (input, _) = ws(keyword("then")).parse(input)?;
    let (input, then_expr) = expr_single(input)?;
    let (input, _) = ws(keyword("else")).parse(input)?;
    let (input, else_expr) = expr_single(input)?;

    Ok((
        input,
        Expression::IfExpr {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
    ))
}

fn or_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), and_expr)).parse(input)?;

    Ok((input, fold_binary(first, rest, BinaryOperator::Or)))
}

fn and_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = comparison_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("and")), comparison_expr)).parse(input)?;

    Ok((input, fold_binary(first, rest, BinaryOperator::And)))
}

fn comparison_operator(input: &str) -> IResult<&str, BinaryOperator> {
    ws(alt((
        value(BinaryOperator::ValueEq, keyword("eq")),
        value(BinaryOperator::ValueNe, keyword("ne")),
        value(BinaryOperator::ValueLt, keyword("lt")),
        value(BinaryOperator::ValueLe, keyword("le")),
        value(BinaryOperator::ValueGt, keyword("gt")),
        value(BinaryOperator::ValueGe, keyword("ge")),
        value(BinaryOperator::Equals, terminated(char('='), not(char('>')))),
        value(BinaryOperator::NotEquals, tag("!=")),
        value(BinaryOperator::LessThanOrEqual, tag("<=")),
        value(BinaryOperator::LessThan, char('<')),
        value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
        value(BinaryOperator::GreaterThan, char('>')),
    )))
    .parse(input)
}

fn comparison_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = string_concat_expr(input)?;
    let (input, rest) = opt(pair(comparison_operator, string_concat_expr)).parse(input)?;

    match rest {
        Some((op, right)) => Ok((input, Expression::binary_op(first, op, right))),
        None => Ok((input, first)),
    }
}

fn string_concat_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = range_expr(input)?;
    let (input, rest) = many0(preceded(ws(tag("||")), range_expr)).parse(input)?;

    Ok((
        input,
        rest.into_iter().fold(first, Expression::string_concat),
    ))
}

fn range_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = additive_expr(input)?;
    let (input, rest) = opt(preceded(ws(keyword("to")), additive_expr)).parse(input)?;

    match rest {
        Some(end) => Ok((input, Expression::range(first, end))),
        None => Ok((input, first)),
    }
}

fn additive_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = multiplicative_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Plus, char('+')),
            value(BinaryOperator::Minus, char('-')),
        ))),
        multiplicative_expr,
    ))
    .parse(input)?;

    Ok((input, fold_operators(first, rest)))
}

fn multiplicative_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = union_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Multiply, char('*')),
            value(BinaryOperator::Divide, keyword("div")),
            value(BinaryOperator::IntegerDivide, keyword("idiv")),
            value(BinaryOperator::Modulo, keyword("mod")),
        ))),
        union_expr,
    ))
    .parse(input)?;

    Ok((input, fold_operators(first, rest)))
}

fn union_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = intersect_except_expr(input)?;
    let (input, rest) = many0(preceded(
        ws(alt((
            keyword("union"),
            terminated(tag("|"), not(char('|'))),
        ))),
        intersect_except_expr,
    ))
    .parse(input)?;

    Ok((input, fold_binary(first, rest, BinaryOperator::Union)))
}

fn intersect_except_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = instanceof_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Intersect, keyword("intersect")),
            value(BinaryOperator::Except, keyword("except")),
        ))),
        instanceof_expr,
    ))
    .parse(input)?;

    Ok((input, fold_operators(first, rest)))
}

fn instanceof_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = treat_expr(input)?;
    let (input, type_decl) = opt(preceded(
        pair(ws(keyword("instance")), ws(keyword("of"))),
        sequence_type,
    ))
    .parse(input)?;

    match type_decl {
        Some(sequence_type) => Ok((
            input,
            Expression::InstanceOf {
                expr: Box::new(expr),
                sequence_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn treat_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = castable_expr(input)?;
    let (input, type_decl) = opt(preceded(
        pair(ws(keyword("treat")), ws(keyword("as"))),
        sequence_type,
    ))
    .parse(input)?;

    match type_decl {
        Some(sequence_type) => Ok((
            input,
            Expression::TreatAs {
                expr: Box::new(expr),
                sequence_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn castable_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = cast_expr(input)?;
    let (input, type_decl) = opt(preceded(
        pair(ws(keyword("castable")), ws(keyword("as"))),
        single_type,
    ))
    .parse(input)?;

    match type_decl {
        Some(single_type) => Ok((
            input,
            Expression::CastableAs {
                expr: Box::new(expr),
                single_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn cast_expr(input: &str) -> IResult<&str, Expression> {
    let (input, expr) = arrow_expr(input)?;
    let (input, type_decl) = opt(preceded(
        pair(ws(keyword("cast")), ws(keyword("as"))),
        single_type,
    ))
    .parse(input)?;

    match type_decl {
        Some(single_type) => Ok((
            input,
            Expression::CastAs {
                expr: Box::new(expr),
                single_type,
            },
        )),
        None => Ok((input, expr)),
    }
}

fn sequence_type(input: &str) -> IResult<&str, SequenceType> {
    let (input, item_type) = ws(item_type).parse(input)?;
    if item_type == ItemType::EmptySequence {
        return Ok((input, SequenceType::empty()));
    }
    let (input, occurrence) = opt(ws(alt((
        value(OccurrenceIndicator::ZeroOrOne, char('?')),
        value(OccurrenceIndicator::ZeroOrMore, char('*')),
        value(OccurrenceIndicator::OneOrMore, char('+')),
    ))))
    .parse(input)?;

    Ok((
        input,
        SequenceType {
            item_type,
            occurrence: occurrence.unwrap_or(OccurrenceIndicator::ExactlyOne),
        },
    ))
}

fn empty_parens(input: &str) -> IResult<&str, ()> {
    value((), pair(ws(char('(')), char(')'))).parse(input)
}

fn any_parens(input: &str) -> IResult<&str, ()> {
    value((), (ws(char('(')), ws(char('*')), char(')'))).parse(input)
}

fn item_type(input: &str) -> IResult<&str, ItemType> {
    alt((
        value(ItemType::Item, pair(tag("item"), empty_parens)),
        value(
            ItemType::EmptySequence,
            pair(tag("empty-sequence"), empty_parens),
        ),
        map(kind_test, ItemType::KindTest),
        value(ItemType::Function, pair(tag("function"), any_parens)),
        value(ItemType::Map, pair(tag("map"), any_parens)),
        value(ItemType::Array, pair(tag("array"), any_parens)),
        map(eqname, ItemType::Atomic),
    ))
    .parse(input)
}

fn kind_test(input: &str) -> IResult<&str, KindTest> {
    terminated(
        alt((
            value(KindTest::Document, tag("document-node")),
            value(KindTest::AnyNode, tag("node")),
            value(KindTest::Assembly, tag("assembly")),
            value(KindTest::Field, tag("field")),
            value(KindTest::Flag, tag("flag")),
        )),
        empty_parens,
    )
    .parse(input)
}

fn single_type(input: &str) -> IResult<&str, SingleType> {
    let (input, type_name) = ws(eqname).parse(input)?;
    let (input, optional) = opt(ws(char('?'))).parse(input)?;

    Ok((
        input,
        SingleType {
            type_name,
            optional: optional.is_some(),
        },
    ))
}

fn arrow_expr(input: &str) -> IResult<&str, Expression> {
    let (input, base) = unary_expr(input)?;
    let (input, steps) = many0(arrow_step).parse(input)?;

    if steps.is_empty() {
        Ok((input, base))
    } else {
        Ok((
            input,
            Expression::ArrowExpr {
                base: Box::new(base),
                steps,
            },
        ))
    }
}

fn arrow_step(input: &str) -> IResult<&str, ArrowStep> {
    let (input, _) = ws(tag("=>")).parse(input)?;
    let (input, target) = ws(alt((
        map(eqname, ArrowTarget::Named),
        map(preceded(char('$'), var_name), ArrowTarget::Variable),
        map(parenthesized_expr, |e| ArrowTarget::Inline(Box::new(e))),
    )))
    .parse(input)?;
    let (input, args) = argument_list(input)?;

    Ok((input, ArrowStep { target, args }))
}

fn unary_expr(input: &str) -> IResult<&str, Expression> {
    let (input, signs) = many0(ws(alt((
        value(UnaryOperator::Minus, char('-')),
        value(UnaryOperator::Plus, char('+')),
    ))))
    .parse(input)?;
    let (input, expr) = simple_map_expr(input)?;

    let expr = signs
        .into_iter()
        .rev()
        .fold(expr, |expr, op| Expression::UnaryOp {
            op,
            expr: Box::new(expr),
        });
    Ok((input, expr))
}

fn simple_map_expr(input: &str) -> IResult<&str, Expression> {
    let (input, first) = path_expr(input)?;
    let (input, rest) = many0(preceded(
        ws(terminated(char('!'), not(char('=')))),
        path_expr,
    ))
    .parse(input)?;

    Ok((input, rest.into_iter().fold(first, Expression::simple_map)))
}

fn path_expr(input: &str) -> IResult<&str, Expression> {
    let (input, _) = sp(input)?;
    if let Some(rest) = input.strip_prefix("//") {
        let (rest, relative) = relative_path(rest)?;
        return Ok((rest, Expression::RootDescendantPath(Box::new(relative))));
    }
    if let Some(rest) = input.strip_prefix('/') {
        return match relative_path(rest) {
            Ok((rest, relative)) => Ok((rest, Expression::RootPath(Box::new(relative)))),
            Err(nom::Err::Error(_)) => Ok((rest, Expression::Root)),
            Err(e) => Err(e),
        };
    }
    relative_path(input)
}

fn relative_path(input: &str) -> IResult<&str, Expression> {
    let (input, first) = step_expr(input)?;
    let (input, rest) = many0(pair(
        ws(alt((value(true, tag("//")), value(false, char('/'))))),
        step_expr,
    ))
    .parse(input)?;

    let path = rest.into_iter().fold(first, |left, (descendant, right)| {
        if descendant {
            Expression::DescendantPath {
                left: Box::new(left),
                right: Box::new(right),
            }
        } else {
            Expression::path(left, right)
        }
    });
    Ok((input, path))
}

fn step_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((postfix_expr, map(axis_step, Expression::Step)))).parse(input)
}

fn axis_step(input: &str) -> IResult<&str, Step> {
    let (input, step) = alt((
        map(tag(".."), |_| Step {
            axis: Axis::Parent,
            node_test: NodeTest::Kind(KindTest::AnyNode),
            predicates: Vec::new(),
        }),
        map(pair(opt(axis_specifier), node_test), |(axis, node_test)| {
            Step {
                axis: axis.unwrap_or(Axis::Child),
                node_test,
                predicates: Vec::new(),
            }
        }),
    ))
    .parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;

    Ok((input, Step { predicates, ..step }))
}

fn axis_specifier(input: &str) -> IResult<&str, Axis> {
    alt((
        value(Axis::Flag, ws(char('@'))),
        terminated(
            alt((
                value(Axis::Child, tag("child")),
                value(Axis::DescendantOrSelf, tag("descendant-or-self")),
                value(Axis::Descendant, tag("descendant")),
                value(Axis::SelfAxis, tag("self")),
                value(Axis::Parent, tag("parent")),
                value(Axis::AncestorOrSelf, tag("ancestor-or-self")),
                value(Axis::Ancestor, tag("ancestor")),
                value(Axis::Flag, tag("flag")),
            )),
            ws(tag("::")),
        ),
    ))
    .parse(input)
}

fn node_test(input: &str) -> IResult<&str, NodeTest> {
    alt((
        map(kind_test, NodeTest::Kind),
        value(NodeTest::Wildcard, char('*')),
        map(eqname, NodeTest::Name),
    ))
    .parse(input)
}

fn postfix_expr(input: &str) -> IResult<&str, Expression> {
    let (input, base) = primary_expr(input)?;
    let (input, postfixes) = many0(alt((
        map(predicate, PostfixOp::Predicate),
        map(argument_list, PostfixOp::ArgumentList),
        map(lookup, PostfixOp::Lookup),
    )))
    .parse(input)?;

    let mut result = base;
    for postfix in postfixes {
        result = match postfix {
            PostfixOp::Predicate(pred) => match result {
                Expression::FilterExpr {
                    base,
                    mut predicates,
                } => {
                    predicates.push(pred);
                    Expression::FilterExpr { base, predicates }
                }
                other => Expression::FilterExpr {
                    base: Box::new(other),
                    predicates: vec![pred],
                },
            },
            PostfixOp::ArgumentList(args) => Expression::DynamicFunctionCall {
                function_expr: Box::new(result),
                args,
            },
            PostfixOp::Lookup(key) => Expression::lookup(result, key),
        };
    }
    Ok((input, result))
}

enum PostfixOp {
    Predicate(Expression),
    ArgumentList(Vec<Argument>),
    Lookup(LookupKey),
}

fn predicate(input: &str) -> IResult<&str, Expression> {
    delimited(ws(char('[')), expr, ws(char(']'))).parse(input)
}

fn argument_list(input: &str) -> IResult<&str, Vec<Argument>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), argument),
        ws(char(')')),
    )
    .parse(input)
}

fn argument(input: &str) -> IResult<&str, Argument> {
    alt((
        value(
            Argument::Placeholder,
            terminated(ws(char('?')), peek(alt((char(','), char(')'))))),
        ),
        map(expr_single, Argument::Expr),
    ))
    .parse(input)
}

fn lookup(input: &str) -> IResult<&str, LookupKey> {
    preceded(ws(char('?')), key_specifier).parse(input)
}

fn key_specifier(input: &str) -> IResult<&str, LookupKey> {
    alt((
        value(LookupKey::Wildcard, char('*')),
        map(integer_literal, LookupKey::Integer),
        map(nc_name, |s| LookupKey::NCName(s.to_string())),
        map(delimited(ws(char('(')), expr, ws(char(')'))), |e| {
            LookupKey::Parenthesized(Box::new(e))
        }),
    ))
    .parse(input)
}

fn primary_expr(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        literal,
        variable_reference,
        context_item_expr,
        parenthesized_expr,
        map_constructor,
        array_constructor,
        inline_function,
        function_item_expr,
        function_call,
        map(lookup, Expression::UnaryLookup),
    )))
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, Expression> {
    alt((
        map(string_literal, |s| Expression::Literal(Literal::String(s))),
        numeric_literal,
    ))
    .parse(input)
}

/// A quoted string; the quote character is escaped by doubling it.
fn string_literal(input: &str) -> IResult<&str, String> {
    let Some(quote) = input.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return fail(input);
    };
    let mut out = String::new();
    let mut rest = &input[1..];
    loop {
        match rest.find(quote) {
            Some(end) => {
                out.push_str(&rest[..end]);
                rest = &rest[end + 1..];
                if rest.starts_with(quote) {
                    out.push(quote);
                    rest = &rest[1..];
                } else {
                    return Ok((rest, out));
                }
            }
            None => return Err(nom::Err::Failure(Error::new(input, ErrorKind::Char))),
        }
    }
}

fn numeric_literal(input: &str) -> IResult<&str, Expression> {
    alt((double_literal, decimal_literal, integer_literal_expr)).parse(input)
}

fn integer_literal(input: &str) -> IResult<&str, i64> {
    let (rest, digits) = digit1(input)?;
    match digits.parse::<i64>() {
        Ok(i) => Ok((rest, i)),
        Err(_) => fail(input),
    }
}

fn integer_literal_expr(input: &str) -> IResult<&str, Expression> {
    let (rest, digits) = digit1(input)?;
    let literal = match digits.parse::<i64>() {
        Ok(i) => Literal::Integer(i),
        Err(_) => match Decimal::from_str(digits) {
            Ok(d) => Literal::Decimal(d),
            Err(_) => return fail(input),
        },
    };
    Ok((rest, Expression::Literal(literal)))
}

fn decimal_literal(input: &str) -> IResult<&str, Expression> {
    let (rest, s) = alt((
        recognize((digit1, char('.'), opt(digit1))),
        recognize((char('.'), digit1)),
    ))
    .parse(input)?;

    if rest.starts_with(['e', 'E', '.']) {
        return fail(input);
    }
    match Decimal::from_str(s.trim_end_matches('.')) {
        Ok(d) => Ok((rest, Expression::Literal(Literal::Decimal(d)))),
        Err(_) => fail(input),
    }
}

fn double_literal(input: &str) -> IResult<&str, Expression> {
    let (rest, s) = recognize((
        alt((
            recognize((digit1, char('.'), opt(digit1))),
            recognize((char('.'), digit1)),
            digit1,
        )),
        alt((char('e'), char('E'))),
        opt(alt((char('+'), char('-')))),
        digit1,
    ))
    .parse(input)?;

    match s.parse::<f64>() {
        Ok(d) => Ok((rest, Expression::Literal(Literal::Double(d)))),
        Err(_) => fail(input),
    }
}

fn variable_reference(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('$'), var_name), Expression::Variable).parse(input)
}

fn var_name(input: &str) -> IResult<&str, String> {
    map(qname_str, str::to_string).parse(input)
}

fn context_item_expr(input: &str) -> IResult<&str, Expression> {
    let (rest, _) = char('.').parse(input)?;
    if rest.starts_with(|c: char| is_name_char(c)) {
        return fail(input);
    }
    Ok((rest, Expression::ContextItem))
}

fn parenthesized_expr(input: &str) -> IResult<&str, Expression> {
    let (input, inner) = delimited(ws(char('(')), opt(expr), ws(char(')'))).parse(input)?;
    Ok((input, inner.unwrap_or(Expression::Sequence(Vec::new()))))
}

fn map_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("map").parse(input)?;
    let (input, entries) = delimited(
        ws(char('{')),
        separated_list0(ws(char(',')), map_entry),
        ws(char('}')),
    )
    .parse(input)?;

    Ok((input, Expression::MapConstructor(entries)))
}

fn map_entry(input: &str) -> IResult<&str, MapEntry> {
    let (input, key) = expr_single(input)?;
    let (input, _) = ws(char(':')).parse(input)?;
    let (input, value) = expr_single(input)?;

    Ok((input, MapEntry { key, value }))
}

fn array_constructor(input: &str) -> IResult<&str, Expression> {
    alt((square_array_constructor, curly_array_constructor)).parse(input)
}

fn square_array_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, members) = delimited(
        ws(char('[')),
        separated_list0(ws(char(',')), expr_single),
        ws(char(']')),
    )
    .parse(input)?;

    Ok((
        input,
        Expression::ArrayConstructor(ArrayConstructorKind::Square(members)),
    ))
}

fn curly_array_constructor(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("array").parse(input)?;
    let (input, enclosed) = delimited(ws(char('{')), opt(expr), ws(char('}'))).parse(input)?;

    Ok((
        input,
        Expression::ArrayConstructor(ArrayConstructorKind::Curly(Box::new(
            enclosed.unwrap_or(Expression::Sequence(Vec::new())),
        ))),
    ))
}

fn inline_function(input: &str) -> IResult<&str, Expression> {
    let (input, _) = keyword("function").parse(input)?;
    let (input, params) = delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), param),
        ws(char(')')),
    )
    .parse(input)?;
    let (input, return_type) = opt(preceded(ws(keyword("as")), sequence_type)).parse(input)?;
    let (input, body) = delimited(ws(char('{')), opt(expr), ws(char('}'))).parse(input)?;

    Ok((
        input,
        Expression::InlineFunction {
            params,
            return_type,
            body: Arc::new(body.unwrap_or(Expression::Sequence(Vec::new()))),
        },
    ))
}

fn param(input: &str) -> IResult<&str, Param> {
    let (input, _) = ws(char('$')).parse(input)?;
    let (input, name) = var_name(input)?;
    let (input, type_decl) = opt(preceded(ws(keyword("as")), sequence_type)).parse(input)?;

    Ok((input, Param { name, type_decl }))
}

/// Names that look like function calls but are kind tests or other syntax.
const RESERVED_FUNCTION_NAMES: &[&str] = &[
    "if",
    "for",
    "let",
    "some",
    "every",
    "function",
    "map",
    "array",
    "item",
    "empty-sequence",
    "node",
    "document-node",
    "assembly",
    "field",
    "flag",
];

fn function_call(input: &str) -> IResult<&str, Expression> {
    let (rest, name) = eqname(input)?;
    let (rest, _) = peek(ws(char('('))).parse(rest)?;

    if name.prefix.is_none()
        && name.uri.is_none()
        && RESERVED_FUNCTION_NAMES.contains(&name.local_part.as_str())
    {
        return fail(input);
    }

    let (rest, args) = argument_list(rest)?;
    Ok((rest, Expression::FunctionCall { name, args }))
}

fn function_item_expr(input: &str) -> IResult<&str, Expression> {
    let (input, name) = eqname(input)?;
    let (input, _) = ws(char('#')).parse(input)?;
    let (input, arity) = integer_literal(input)?;

    Ok((
        input,
        Expression::NamedFunctionRef {
            name,
            arity: arity as usize,
        },
    ))
}

fn eqname(input: &str) -> IResult<&str, QName> {
    alt((uri_qualified_name, qname)).parse(input)
}

fn uri_qualified_name(input: &str) -> IResult<&str, QName> {
    let (input, uri) = delimited(tag("Q{"), take_while(|c| c != '{' && c != '}'), char('}'))
        .parse(input)?;
    let (input, local) = nc_name(input)?;
    Ok((input, QName::with_uri(uri.trim(), local)))
}

fn qname(input: &str) -> IResult<&str, QName> {
    let (input, first) = nc_name(input)?;
    let (input, second) = opt(preceded(char(':'), nc_name)).parse(input)?;

    match second {
        Some(local) => Ok((input, QName::with_prefix(first, local))),
        None => Ok((input, QName::new(first))),
    }
}

fn qname_str(input: &str) -> IResult<&str, &str> {
    recognize(pair(nc_name, opt(pair(char(':'), nc_name)))).parse(input)
}

fn nc_name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_name_char),
    ))
    .parse(input)
}

fn fold_binary(first: Expression, rest: Vec<Expression>, op: BinaryOperator) -> Expression {
    rest.into_iter()
        .fold(first, |acc, right| Expression::binary_op(acc, op, right))
}

fn fold_operators(first: Expression, rest: Vec<(BinaryOperator, Expression)>) -> Expression {
    rest.into_iter()
        .fold(first, |acc, (op, right)| Expression::binary_op(acc, op, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Expression {
        parse_expression(input).unwrap()
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse("42"), Expression::literal_integer(42));
        assert_eq!(
            parse("1.50"),
            Expression::Literal(Literal::Decimal(Decimal::from_str("1.50").unwrap()))
        );
        assert_eq!(parse("1e2"), Expression::Literal(Literal::Double(100.0)));
        assert_eq!(parse("'it''s'"), Expression::literal_string("it's"));
        assert_eq!(parse("\"a\"\"b\""), Expression::literal_string("a\"b"));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse("1 + 2 * 3");
        let Expression::BinaryOp { op, right, .. } = expr else {
            panic!("expected binary op");
        };
        assert_eq!(op, BinaryOperator::Plus);
        assert!(matches!(
            *right,
            Expression::BinaryOp {
                op: BinaryOperator::Multiply,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_comparisons() {
        assert!(matches!(
            parse("1 eq 2"),
            Expression::BinaryOp {
                op: BinaryOperator::ValueEq,
                ..
            }
        ));
        assert!(matches!(
            parse("1 != 2"),
            Expression::BinaryOp {
                op: BinaryOperator::NotEquals,
                ..
            }
        ));
        assert!(matches!(
            parse("a <= b"),
            Expression::BinaryOp {
                op: BinaryOperator::LessThanOrEqual,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(parse("/"), Expression::Root);
        assert!(matches!(parse("/catalog"), Expression::RootPath(_)));
        assert!(matches!(parse("//control"), Expression::RootDescendantPath(_)));
        assert!(matches!(parse("a/b"), Expression::Path { .. }));
        assert!(matches!(parse("a//b"), Expression::DescendantPath { .. }));

        let Expression::Step(step) = parse("@id") else {
            panic!("expected step");
        };
        assert_eq!(step.axis, Axis::Flag);
        assert_eq!(step.node_test, NodeTest::Name(QName::new("id")));

        let Expression::Step(step) = parse("ancestor-or-self::node()[2]") else {
            panic!("expected step");
        };
        assert_eq!(step.axis, Axis::AncestorOrSelf);
        assert_eq!(step.node_test, NodeTest::Kind(KindTest::AnyNode));
        assert_eq!(step.predicates.len(), 1);

        let Expression::Step(step) = parse("..") else {
            panic!("expected step");
        };
        assert_eq!(step.axis, Axis::Parent);
    }

    #[test]
    fn test_parse_names_with_hyphens_and_dots() {
        let Expression::Step(step) = parse("control-group.v2") else {
            panic!("expected step");
        };
        assert_eq!(step.node_test, NodeTest::Name(QName::new("control-group.v2")));
    }

    #[test]
    fn test_parse_context_item_and_predicates() {
        assert_eq!(parse("."), Expression::ContextItem);
        assert!(matches!(
            parse("(1,2,3)[2]"),
            Expression::FilterExpr { ref predicates, .. } if predicates.len() == 1
        ));
    }

    #[test]
    fn test_parse_operators_needing_lookahead() {
        assert!(matches!(parse("'a' || 'b'"), Expression::StringConcat { .. }));
        assert!(matches!(
            parse("a | b"),
            Expression::BinaryOp {
                op: BinaryOperator::Union,
                ..
            }
        ));
        assert!(matches!(parse("(1,2) ! (. * 2)"), Expression::SimpleMapExpr { .. }));
        assert!(matches!(parse("'x' => upper-case()"), Expression::ArrowExpr { .. }));
    }

    #[test]
    fn test_parse_comments() {
        assert_eq!(parse("(: one :) 1 (: two (: nested :) :)"), Expression::literal_integer(1));
        assert!(parse_expression("1 (: open").is_err());
    }

    #[test]
    fn test_parse_flwor_and_quantified() {
        assert!(matches!(
            parse("for $i in 1 to 3 return $i * 2"),
            Expression::ForExpr { .. }
        ));
        assert!(matches!(
            parse("let $a := 1, $b := $a + 1 return $b"),
            Expression::LetExpr { ref bindings, .. } if bindings.len() == 2
        ));
        assert!(matches!(
            parse("some $x in (1,2) satisfies $x = 2"),
            Expression::QuantifiedExpr {
                quantifier: Quantifier::Some,
                ..
            }
        ));
        assert!(matches!(
            parse("if (true()) then 1 else 2"),
            Expression::IfExpr { .. }
        ));
    }

    #[test]
    fn test_parse_maps_arrays_and_lookups() {
        assert!(matches!(parse("map { 'a': 1 }"), Expression::MapConstructor(ref e) if e.len() == 1));
        assert!(matches!(
            parse("[1, 2]"),
            Expression::ArrayConstructor(ArrayConstructorKind::Square(_))
        ));
        assert!(matches!(
            parse("array { 1, 2 }"),
            Expression::ArrayConstructor(ArrayConstructorKind::Curly(_))
        ));
        assert!(matches!(
            parse("$m?a"),
            Expression::LookupExpr {
                key: LookupKey::NCName(_),
                ..
            }
        ));
        assert!(matches!(parse("?*"), Expression::UnaryLookup(LookupKey::Wildcard)));
    }

    #[test]
    fn test_parse_function_items() {
        assert!(matches!(
            parse("fn:count#1"),
            Expression::NamedFunctionRef { arity: 1, .. }
        ));
        assert!(matches!(
            parse("function($x) { $x + 1 }"),
            Expression::InlineFunction { ref params, .. } if params.len() == 1
        ));
        let Expression::FunctionCall { args, .. } = parse("substring(?, 2)") else {
            panic!("expected function call");
        };
        assert_eq!(args[0], Argument::Placeholder);
        assert!(matches!(parse("$f(1)"), Expression::DynamicFunctionCall { .. }));
    }

    #[test]
    fn test_parse_types() {
        assert!(matches!(
            parse("1 instance of xs:integer+"),
            Expression::InstanceOf {
                sequence_type: SequenceType {
                    occurrence: OccurrenceIndicator::OneOrMore,
                    ..
                },
                ..
            }
        ));
        assert!(matches!(
            parse("'1' cast as integer?"),
            Expression::CastAs {
                single_type: SingleType { optional: true, .. },
                ..
            }
        ));
        assert!(matches!(
            parse("$m instance of map(*)"),
            Expression::InstanceOf {
                sequence_type: SequenceType {
                    item_type: ItemType::Map,
                    ..
                },
                ..
            }
        ));
        assert!(matches!(
            parse("Q{http://example.com/ns}name"),
            Expression::Step(Step {
                node_test: NodeTest::Name(QName { uri: Some(_), .. }),
                ..
            })
        ));
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_expression("1 +").unwrap_err();
        let MetapathError::Syntax { line, column, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!((line, column), (1, 3));

        let err = parse_expression("1\n  ]").unwrap_err();
        assert!(matches!(err, MetapathError::Syntax { line: 2, column: 3, .. }));
    }
}
