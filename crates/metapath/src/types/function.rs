use super::Sequence;
use crate::ast::{Expression, Param};
use metaschema_mdm::NodeItem;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A callable function item.
///
/// Arrays and maps are callable too, but they are separate [`Item`](super::Item)
/// variants.
pub enum FunctionItem<N> {
    /// A reference to a library function, such as `fn:count#1`. The prefix is the
    /// canonical library prefix (`fn`, `map`, `array`, `math` or `mp`).
    Named {
        prefix: String,
        local: String,
        arity: usize,
    },
    /// An inline function with the variables in scope at its definition.
    Inline {
        params: Vec<Param>,
        body: Arc<Expression>,
        captured: Arc<HashMap<String, Sequence<N>>>,
    },
    /// A function with some arguments already bound. `None` marks an open slot.
    Partial {
        base: Box<FunctionItem<N>>,
        bound: Vec<Option<Sequence<N>>>,
    },
}

impl<N: Clone> Clone for FunctionItem<N> {
    fn clone(&self) -> Self {
        match self {
            FunctionItem::Named {
                prefix,
                local,
                arity,
            } => FunctionItem::Named {
                prefix: prefix.clone(),
                local: local.clone(),
                arity: *arity,
            },
            FunctionItem::Inline {
                params,
                body,
                captured,
            } => FunctionItem::Inline {
                params: params.clone(),
                body: Arc::clone(body),
                captured: Arc::clone(captured),
            },
            FunctionItem::Partial { base, bound } => FunctionItem::Partial {
                base: base.clone(),
                bound: bound.clone(),
            },
        }
    }
}

impl<N> fmt::Debug for FunctionItem<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionItem::Named {
                prefix,
                local,
                arity,
            } => write!(f, "Named({}:{}#{})", prefix, local, arity),
            FunctionItem::Inline { params, .. } => write!(f, "Inline(#{})", params.len()),
            FunctionItem::Partial { base, bound } => {
                write!(f, "Partial({:?}, {} bound)", base, bound.iter().flatten().count())
            }
        }
    }
}

impl<N: NodeItem> FunctionItem<N> {
    pub fn named(prefix: impl Into<String>, local: impl Into<String>, arity: usize) -> Self {
        FunctionItem::Named {
            prefix: prefix.into(),
            local: local.into(),
            arity,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            FunctionItem::Named { arity, .. } => *arity,
            FunctionItem::Inline { params, .. } => params.len(),
            FunctionItem::Partial { bound, .. } => bound.iter().filter(|b| b.is_none()).count(),
        }
    }

    /// The `prefix:local` name, if this function has one.
    pub fn name(&self) -> Option<String> {
        match self {
            FunctionItem::Named { prefix, local, .. } => Some(format!("{}:{}", prefix, local)),
            FunctionItem::Inline { .. } | FunctionItem::Partial { .. } => None,
        }
    }

    pub fn to_signature(&self) -> String {
        format!(
            "function{{{}#{}}}",
            self.name().unwrap_or_else(|| "anonymous".to_string()),
            self.arity()
        )
    }
}

impl<N: NodeItem> PartialEq for FunctionItem<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                FunctionItem::Named {
                    prefix: p1,
                    local: l1,
                    arity: a1,
                },
                FunctionItem::Named {
                    prefix: p2,
                    local: l2,
                    arity: a2,
                },
            ) => p1 == p2 && l1 == l2 && a1 == a2,
            (
                FunctionItem::Inline {
                    body: b1,
                    captured: c1,
                    ..
                },
                FunctionItem::Inline {
                    body: b2,
                    captured: c2,
                    ..
                },
            ) => Arc::ptr_eq(b1, b2) && Arc::ptr_eq(c1, c2),
            (
                FunctionItem::Partial {
                    base: f1,
                    bound: b1,
                },
                FunctionItem::Partial {
                    base: f2,
                    bound: b2,
                },
            ) => f1 == f2 && b1 == b2,
            _ => false,
        }
    }
}

impl<N: NodeItem> Eq for FunctionItem<N> {}

impl<N: NodeItem> Hash for FunctionItem<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        self.arity().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::NodeRef;

    #[test]
    fn test_named_signature() {
        let f: FunctionItem<NodeRef> = FunctionItem::named("fn", "count", 1);
        assert_eq!(f.to_signature(), "function{fn:count#1}");
        assert_eq!(f, FunctionItem::named("fn", "count", 1));
        assert_ne!(f, FunctionItem::named("fn", "count", 2));
    }

    #[test]
    fn test_partial_arity_counts_open_slots() {
        let f: FunctionItem<NodeRef> = FunctionItem::Partial {
            base: Box::new(FunctionItem::named("fn", "substring", 3)),
            bound: vec![None, Some(Sequence::from_integer(2)), None],
        };
        assert_eq!(f.arity(), 2);
        assert_eq!(f.to_signature(), "function{anonymous#2}");
    }
}
