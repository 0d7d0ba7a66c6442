//! Metapath expression compiler and evaluator.
//!
//! Metapath is an XPath 3.1 derivative evaluated against schema-described document trees:
//! paths walk flags and model items, and the value model adds maps, arrays and function
//! items on top of atomic values and nodes.
//!
//! # Key Types
//!
//! - [`MetapathExpression`]: a compiled expression
//! - [`LazyExpression`]: expression text compiled on first evaluation
//! - [`Sequence`] / [`Item`]: evaluation results
//! - [`StaticContext`] / [`DynamicContext`]: compile-time and run-time environments
//!
//! # Example
//!
//! ```ignore
//! use metaschema_metapath::{DynamicContext, MetapathExpression, StaticContext};
//!
//! let expr = MetapathExpression::compile("count(//control[@id])", &StaticContext::default())?;
//! let result = expr.evaluate_node(&document_root, &DynamicContext::new())?;
//! ```

pub mod ast;
pub mod compile;
pub mod context;
pub mod engine;
pub mod error;
pub mod functions;
pub mod lazy;
pub mod lookup;
pub mod operators;
pub mod parser;
pub mod types;
pub mod writer;

pub use ast::{Expression, LookupKey, SequenceType};
pub use compile::MetapathExpression;
pub use context::{DynamicContext, StaticContext};
pub use engine::{EvaluationContext, Variables, evaluate};
pub use error::{
    ArrayErrorCode, CardinalityCode, MetapathError, TemporalErrorCode, TypeErrorCode, UriErrorCode,
};
pub use lazy::{ExpressionCache, LazyExpression};
pub use parser::parse_expression;
pub use types::{
    ArrayItem, AtomicType, AtomicValue, Date, DateTime, Duration, FunctionItem, Item, MapItem,
    MapKey, Sequence, Timezone,
};
pub use writer::{ItemWriter, StringItemWriter};
