use super::{AtomicValue, Item};
use crate::error::{CardinalityCode, MetapathError};
use metaschema_mdm::NodeItem;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// A one-shot iterator of items.
pub type ItemStream<N> = Box<dyn Iterator<Item = Item<N>> + Send>;

/// An ordered, possibly empty list of items.
///
/// A sequence is backed by a list, a single item, or a one-shot stream. A stream-backed
/// sequence can be consumed once through [`Sequence::stream`]; any call that needs to
/// read it as a list ([`Sequence::items`], [`Sequence::len`], ...) first materializes
/// the stream under a lock, after which it can be read any number of times. Streaming
/// a sequence whose stream was already handed out, and that was never materialized, is
/// a usage error.
#[derive(Clone)]
pub struct Sequence<N> {
    repr: Repr<N>,
}

#[derive(Clone)]
enum Repr<N> {
    List(Arc<Vec<Item<N>>>),
    Single(Item<N>),
    Stream(Arc<StreamSource<N>>),
}

struct StreamSource<N> {
    source: Mutex<Option<ItemStream<N>>>,
    materialized: OnceLock<Vec<Item<N>>>,
}

impl<N> StreamSource<N> {
    fn materialize(&self) -> Result<&[Item<N>], MetapathError> {
        if let Some(items) = self.materialized.get() {
            return Ok(items);
        }
        let mut guard = self
            .source
            .lock()
            .map_err(|_| MetapathError::usage("stream sequence lock poisoned"))?;
        // another thread may have materialized while we waited for the lock
        if let Some(items) = self.materialized.get() {
            return Ok(items);
        }
        let stream = guard
            .take()
            .ok_or_else(|| MetapathError::usage("the sequence's stream was already consumed"))?;
        let _ = self.materialized.set(stream.collect());
        drop(guard);
        self.materialized
            .get()
            .map(Vec::as_slice)
            .ok_or_else(|| MetapathError::usage("stream sequence failed to materialize"))
    }
}

impl<N: NodeItem> Sequence<N> {
    pub fn empty() -> Self {
        Self {
            repr: Repr::List(Arc::new(Vec::new())),
        }
    }

    pub fn of(item: Item<N>) -> Self {
        Self {
            repr: Repr::Single(item),
        }
    }

    pub fn from_items(mut items: Vec<Item<N>>) -> Self {
        if items.len() == 1 {
            if let Some(item) = items.pop() {
                return Self::of(item);
            }
        }
        Self {
            repr: Repr::List(Arc::new(items)),
        }
    }

    /// Wraps a one-shot iterator without consuming it.
    pub fn from_stream(stream: impl Iterator<Item = Item<N>> + Send + 'static) -> Self {
        Self {
            repr: Repr::Stream(Arc::new(StreamSource {
                source: Mutex::new(Some(Box::new(stream))),
                materialized: OnceLock::new(),
            })),
        }
    }

    pub fn from_atomic(value: AtomicValue) -> Self {
        Self::of(Item::Atomic(value))
    }

    pub fn from_atomics(values: impl IntoIterator<Item = AtomicValue>) -> Self {
        Self::from_items(values.into_iter().map(Item::Atomic).collect())
    }

    pub fn from_bool(b: bool) -> Self {
        Self::from_atomic(AtomicValue::Boolean(b))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self::from_atomic(AtomicValue::String(s.into()))
    }

    pub fn from_integer(i: i64) -> Self {
        Self::from_atomic(AtomicValue::Integer(i))
    }

    pub fn from_node(node: N) -> Self {
        Self::of(Item::Node(node))
    }

    pub fn from_nodes(nodes: Vec<N>) -> Self {
        Self::from_items(nodes.into_iter().map(Item::Node).collect())
    }

    /// The items of this sequence, materializing a stream if needed.
    pub fn items(&self) -> Result<&[Item<N>], MetapathError> {
        match &self.repr {
            Repr::List(items) => Ok(items.as_slice()),
            Repr::Single(item) => Ok(std::slice::from_ref(item)),
            Repr::Stream(source) => source.materialize(),
        }
    }

    pub fn into_items(self) -> Result<Vec<Item<N>>, MetapathError> {
        match self.repr {
            Repr::List(items) => Ok(Arc::try_unwrap(items).unwrap_or_else(|shared| (*shared).clone())),
            Repr::Single(item) => Ok(vec![item]),
            Repr::Stream(source) => source.materialize().map(<[Item<N>]>::to_vec),
        }
    }

    /// Hands out the items as an iterator. A stream-backed sequence that was never
    /// materialized can only be streamed once.
    pub fn stream(&self) -> Result<ItemStream<N>, MetapathError> {
        match &self.repr {
            Repr::List(items) => {
                let items = Arc::clone(items);
                Ok(Box::new((0..items.len()).map(move |i| items[i].clone())))
            }
            Repr::Single(item) => Ok(Box::new(std::iter::once(item.clone()))),
            Repr::Stream(source) => {
                if let Some(items) = source.materialized.get() {
                    return Ok(Box::new(items.clone().into_iter()));
                }
                let mut guard = source
                    .source
                    .lock()
                    .map_err(|_| MetapathError::usage("stream sequence lock poisoned"))?;
                if let Some(items) = source.materialized.get() {
                    return Ok(Box::new(items.clone().into_iter()));
                }
                guard.take().ok_or_else(|| {
                    MetapathError::usage("the sequence's stream was already consumed")
                })
            }
        }
    }

    /// Converts this sequence into a list-backed one that can be read repeatedly.
    pub fn reusable(self) -> Result<Self, MetapathError> {
        match self.repr {
            Repr::Stream(_) => Ok(Self::from_items(self.into_items()?)),
            _ => Ok(self),
        }
    }

    pub fn len(&self) -> Result<usize, MetapathError> {
        self.items().map(<[Item<N>]>::len)
    }

    pub fn is_empty(&self) -> Result<bool, MetapathError> {
        self.items().map(<[Item<N>]>::is_empty)
    }

    /// The first item, or `None` for an empty sequence. When `require_singleton` is set,
    /// more than one item is a cardinality error.
    pub fn first_item(&self, require_singleton: bool) -> Result<Option<Item<N>>, MetapathError> {
        let items = self.items()?;
        if require_singleton && items.len() > 1 {
            return Err(MetapathError::Cardinality {
                expected: CardinalityCode::ZeroOrOne,
                actual: items.len(),
            });
        }
        Ok(items.first().cloned())
    }

    pub fn exactly_one(&self) -> Result<Item<N>, MetapathError> {
        let items = self.items()?;
        match items {
            [item] => Ok(item.clone()),
            _ => Err(MetapathError::Cardinality {
                expected: CardinalityCode::ExactlyOne,
                actual: items.len(),
            }),
        }
    }

    /// Atomizes every item in order.
    pub fn atomize(&self) -> Result<Vec<AtomicValue>, MetapathError> {
        let mut out = Vec::new();
        for item in self.items()? {
            out.extend(item.atomize()?);
        }
        Ok(out)
    }

    /// Atomizes to at most one value.
    pub fn atomize_optional(&self) -> Result<Option<AtomicValue>, MetapathError> {
        let mut values = self.atomize()?;
        if values.len() > 1 {
            return Err(MetapathError::Cardinality {
                expected: CardinalityCode::ZeroOrOne,
                actual: values.len(),
            });
        }
        Ok(values.pop())
    }

    pub fn effective_boolean_value(&self) -> Result<bool, MetapathError> {
        let items = self.items()?;
        match items {
            [] => Ok(false),
            [Item::Node(_), ..] => Ok(true),
            [Item::Atomic(a)] => a.effective_boolean_value(),
            [first, ..] => Err(MetapathError::function(
                "boolean",
                format!(
                    "Effective boolean value is not defined for a sequence of {} items starting with '{}'",
                    items.len(),
                    first.type_name()
                ),
            )),
        }
    }

    /// Pairwise deep equality in order. A length mismatch is unequal without comparing
    /// any items.
    pub fn deep_equals(&self, other: &Sequence<N>) -> bool {
        let (Ok(left), Ok(right)) = (self.items(), other.items()) else {
            return false;
        };
        left.len() == right.len() && left.iter().zip(right).all(|(a, b)| a.deep_equals(b))
    }

    pub fn to_signature(&self) -> String {
        let sigs: Vec<String> = self
            .items()
            .map(|items| items.iter().map(Item::to_signature).collect())
            .unwrap_or_default();
        format!("({})", sigs.join(","))
    }

    /// Concatenates sequences in order.
    pub fn concat(parts: impl IntoIterator<Item = Sequence<N>>) -> Result<Self, MetapathError> {
        let mut items = Vec::new();
        for part in parts {
            items.extend(part.into_items()?);
        }
        Ok(Self::from_items(items))
    }
}

impl<N: NodeItem> PartialEq for Sequence<N> {
    fn eq(&self, other: &Self) -> bool {
        let same_backing = match (&self.repr, &other.repr) {
            (Repr::List(a), Repr::List(b)) => Arc::ptr_eq(a, b),
            (Repr::Stream(a), Repr::Stream(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_backing
            || matches!((self.items(), other.items()), (Ok(a), Ok(b)) if a == b)
    }
}

impl<N: NodeItem> Default for Sequence<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<N: NodeItem> From<Item<N>> for Sequence<N> {
    fn from(item: Item<N>) -> Self {
        Sequence::of(item)
    }
}

impl<N: NodeItem> From<Vec<Item<N>>> for Sequence<N> {
    fn from(items: Vec<Item<N>>) -> Self {
        Sequence::from_items(items)
    }
}

impl<N: fmt::Debug> fmt::Debug for Sequence<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::List(items) => f.debug_tuple("Sequence").field(items).finish(),
            Repr::Single(item) => f.debug_tuple("Sequence").field(&[item]).finish(),
            Repr::Stream(source) => match source.materialized.get() {
                Some(items) => f.debug_tuple("Sequence").field(items).finish(),
                None => f.write_str("Sequence(<stream>)"),
            },
        }
    }
}

impl<N: NodeItem> fmt::Display for Sequence<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaschema_mdm::NodeRef;

    type Seq = Sequence<NodeRef>;

    fn ints(values: &[i64]) -> Seq {
        Seq::from_atomics(values.iter().map(|i| AtomicValue::Integer(*i)))
    }

    #[test]
    fn test_empty_signature() {
        assert_eq!(Seq::empty().to_signature(), "()");
        assert_eq!(ints(&[1, 2]).to_signature(), "(integer{1},integer{2})");
    }

    #[test]
    fn test_deep_equals_reflexive_and_symmetric() {
        let a = ints(&[1, 2, 3]);
        let b = ints(&[1, 2, 3]);
        assert!(a.deep_equals(&a));
        assert!(a.deep_equals(&b) && b.deep_equals(&a));
        assert!(!a.deep_equals(&ints(&[1, 2])));
        assert!(!ints(&[1, 2]).deep_equals(&a));
    }

    #[test]
    fn test_stream_materializes_on_read() {
        let seq = Seq::from_stream((1..=3).map(|i| Item::Atomic(AtomicValue::Integer(i))));
        assert_eq!(seq.len().unwrap(), 3);
        assert_eq!(seq.len().unwrap(), 3);
        let streamed: Vec<_> = seq.stream().unwrap().collect();
        assert_eq!(streamed.len(), 3);
        assert_eq!(seq, ints(&[1, 2, 3]));
    }

    #[test]
    fn test_restreaming_consumed_stream_is_usage_error() {
        let seq = Seq::from_stream((1..=3).map(|i| Item::Atomic(AtomicValue::Integer(i))));
        let first: Vec<_> = seq.stream().unwrap().collect();
        assert_eq!(first.len(), 3);
        let err = seq.stream().err().unwrap();
        assert_eq!(err.code(), "USAGE");
        assert!(seq.items().is_err());
    }

    #[test]
    fn test_reusable_stream() {
        let seq = Seq::from_stream(std::iter::once(Item::Atomic(AtomicValue::Integer(9))))
            .reusable()
            .unwrap();
        assert_eq!(seq.stream().unwrap().count(), 1);
        assert_eq!(seq.stream().unwrap().count(), 1);
    }

    #[test]
    fn test_concurrent_materialization_consumes_once() {
        let seq = Seq::from_stream((0..100).map(|i| Item::Atomic(AtomicValue::Integer(i))));
        std::thread::scope(|s| {
            for _ in 0..4 {
                let seq = seq.clone();
                s.spawn(move || assert_eq!(seq.len().unwrap(), 100));
            }
        });
    }

    #[test]
    fn test_first_item() {
        assert_eq!(Seq::empty().first_item(true).unwrap(), None);
        assert_eq!(
            ints(&[4]).first_item(true).unwrap(),
            Some(Item::Atomic(AtomicValue::Integer(4)))
        );
        let err = ints(&[1, 2]).first_item(true).unwrap_err();
        assert_eq!(err.code(), "FORG0003");
        assert!(ints(&[1, 2]).first_item(false).unwrap().is_some());
    }

    #[test]
    fn test_effective_boolean_value() {
        assert!(!Seq::empty().effective_boolean_value().unwrap());
        assert!(ints(&[1]).effective_boolean_value().unwrap());
        assert!(ints(&[1, 2]).effective_boolean_value().is_err());
    }
}
