use super::shared::shared;
use super::{Item, Sequence};
use crate::error::MetapathError;
use metaschema_mdm::NodeItem;
use std::fmt;
use std::sync::Arc;

/// An immutable array. Each member is a sequence; external indexing is 1-based.
///
/// Update operations return a new array and leave the original untouched.
pub struct ArrayItem<N> {
    members: Arc<Vec<Sequence<N>>>,
}

impl<N> Clone for ArrayItem<N> {
    fn clone(&self) -> Self {
        Self {
            members: Arc::clone(&self.members),
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for ArrayItem<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.members.iter()).finish()
    }
}

impl<N: NodeItem> ArrayItem<N> {
    pub fn new(members: Vec<Sequence<N>>) -> Self {
        Self {
            members: Arc::new(members),
        }
    }

    /// An array with one single-item member per item.
    pub fn of(items: Vec<Item<N>>) -> Self {
        Self::new(items.into_iter().map(Sequence::of).collect())
    }

    /// The empty array. Every call returns the same shared instance.
    pub fn empty() -> Self {
        Self {
            members: shared(Vec::new),
        }
    }

    pub fn members(&self) -> &[Sequence<N>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member at a 1-based position, if present.
    pub fn get(&self, position: i64) -> Option<&Sequence<N>> {
        if position < 1 {
            return None;
        }
        self.members.get((position - 1) as usize)
    }

    /// Like [`get`](Self::get), but a missing position is an array error.
    pub fn lookup(&self, position: i64) -> Result<&Sequence<N>, MetapathError> {
        self.get(position)
            .ok_or_else(|| MetapathError::index_out_of_bounds(position, self.len()))
    }

    fn check_position(&self, position: i64, allow_end: bool) -> Result<usize, MetapathError> {
        let upper = if allow_end { self.len() + 1 } else { self.len() };
        if position < 1 || position as usize > upper {
            return Err(MetapathError::index_out_of_bounds(position, self.len()));
        }
        Ok((position - 1) as usize)
    }

    pub fn put(&self, position: i64, member: Sequence<N>) -> Result<Self, MetapathError> {
        let index = self.check_position(position, false)?;
        let mut members = self.members.as_ref().clone();
        members[index] = member;
        Ok(Self::new(members))
    }

    pub fn append(&self, member: Sequence<N>) -> Self {
        let mut members = self.members.as_ref().clone();
        members.push(member);
        Self::new(members)
    }

    pub fn insert_before(&self, position: i64, member: Sequence<N>) -> Result<Self, MetapathError> {
        let index = self.check_position(position, true)?;
        let mut members = self.members.as_ref().clone();
        members.insert(index, member);
        Ok(Self::new(members))
    }

    pub fn remove(&self, positions: &[i64]) -> Result<Self, MetapathError> {
        let mut drop = Vec::with_capacity(positions.len());
        for &position in positions {
            drop.push(self.check_position(position, false)?);
        }
        let members = self
            .members
            .iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, m)| m.clone())
            .collect();
        Ok(Self::new(members))
    }

    /// The members from `start` (1-based) for `length` members, or to the end.
    pub fn subarray(&self, start: i64, length: Option<i64>) -> Result<Self, MetapathError> {
        let from = self.check_position(start, true)?;
        let available = self.len() - from;
        let count = match length {
            Some(len) if len < 0 => return Err(MetapathError::negative_array_length(len)),
            Some(len) if !usize::try_from(len).is_ok_and(|len| len <= available) => {
                let last = start.saturating_add(len).saturating_sub(1);
                return Err(MetapathError::index_out_of_bounds(last, self.len()));
            }
            Some(len) => len as usize,
            None => available,
        };
        Ok(Self::new(self.members[from..from + count].to_vec()))
    }

    pub fn head(&self) -> Result<&Sequence<N>, MetapathError> {
        self.lookup(1)
    }

    pub fn tail(&self) -> Result<Self, MetapathError> {
        if self.is_empty() {
            return Err(MetapathError::index_out_of_bounds(1, 0));
        }
        Ok(Self::new(self.members[1..].to_vec()))
    }

    pub fn reverse(&self) -> Self {
        Self::new(self.members.iter().rev().cloned().collect())
    }

    pub fn join(arrays: &[ArrayItem<N>]) -> Self {
        Self::new(
            arrays
                .iter()
                .flat_map(|a| a.members.iter().cloned())
                .collect(),
        )
    }

    pub fn deep_equals(&self, other: &ArrayItem<N>) -> bool {
        self.len() == other.len()
            && self
                .members
                .iter()
                .zip(other.members.iter())
                .all(|(a, b)| a.deep_equals(b))
    }

    /// `[sig,...]`, where a member holding exactly one item renders as that item's
    /// signature.
    pub fn to_signature(&self) -> String {
        let members: Vec<String> = self
            .members
            .iter()
            .map(|member| match member.items() {
                Ok([item]) => item.to_signature(),
                _ => member.to_signature(),
            })
            .collect();
        format!("[{}]", members.join(","))
    }
}

impl<N: NodeItem> PartialEq for ArrayItem<N> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.members, &other.members) || self.members == other.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArrayErrorCode;
    use crate::types::AtomicValue;
    use metaschema_mdm::NodeRef;

    fn ints(values: &[i64]) -> ArrayItem<NodeRef> {
        ArrayItem::of(
            values
                .iter()
                .map(|i| Item::Atomic(AtomicValue::Integer(*i)))
                .collect(),
        )
    }

    #[test]
    fn test_lookup_is_one_based() {
        let array = ints(&[10, 20, 30]);
        assert_eq!(array.lookup(1).unwrap(), &Sequence::from_integer(10));
        assert_eq!(array.lookup(3).unwrap(), &Sequence::from_integer(30));
    }

    #[test]
    fn test_lookup_out_of_bounds() {
        let array = ints(&[1, 2, 3]);
        for position in [0, 4] {
            let err = array.lookup(position).unwrap_err();
            assert!(err.is_array_error(ArrayErrorCode::IndexOutOfBounds));
        }
        let message = array.lookup(4).unwrap_err().to_string();
        assert!(message.contains("'4'"));
        assert!(message.contains("'3'"));
    }

    #[test]
    fn test_updates_leave_original() {
        let array = ints(&[1, 2]);
        let put = array.put(1, Sequence::from_integer(9)).unwrap();
        let appended = array.append(Sequence::from_integer(3));
        assert_eq!(array, ints(&[1, 2]));
        assert_eq!(put, ints(&[9, 2]));
        assert_eq!(appended, ints(&[1, 2, 3]));
        assert_eq!(
            array.insert_before(3, Sequence::from_integer(0)).unwrap(),
            ints(&[1, 2, 0])
        );
        assert_eq!(array.remove(&[1]).unwrap(), ints(&[2]));
    }

    #[test]
    fn test_subarray() {
        let array = ints(&[1, 2, 3, 4]);
        assert_eq!(array.subarray(2, Some(2)).unwrap(), ints(&[2, 3]));
        assert_eq!(array.subarray(5, None).unwrap(), ints(&[]));
        let err = array.subarray(1, Some(-1)).unwrap_err();
        assert!(err.is_array_error(ArrayErrorCode::NegativeArrayLength));
    }

    #[test]
    fn test_empty_is_shared() {
        let a = ArrayItem::<NodeRef>::empty();
        let b = ArrayItem::<NodeRef>::empty();
        assert!(Arc::ptr_eq(&a.members, &b.members));
        assert_eq!(a.append(Sequence::from_integer(1)).len(), 1);
        assert!(ArrayItem::<NodeRef>::empty().members().is_empty());
    }

    #[test]
    fn test_subarray_past_end() {
        let array = ints(&[1, 2]);
        let err = array.subarray(2, Some(2)).unwrap_err();
        assert!(err.is_array_error(ArrayErrorCode::IndexOutOfBounds));
        assert!(err.to_string().contains("'3'"));
        let err = array.subarray(2, Some(i64::MAX)).unwrap_err();
        assert!(err.is_array_error(ArrayErrorCode::IndexOutOfBounds));
    }

    #[test]
    fn test_deep_equals_reflexive() {
        let array = ints(&[1, 2, 3]);
        assert!(array.deep_equals(&array));
        assert!(!array.deep_equals(&ints(&[1, 2])));
    }

    #[test]
    fn test_signature() {
        assert_eq!(ints(&[1]).to_signature(), "[integer{1}]");
        let nested: ArrayItem<NodeRef> =
            ArrayItem::new(vec![Sequence::empty(), Sequence::from_integer(2)]);
        assert_eq!(nested.to_signature(), "[(),integer{2}]");
    }
}
