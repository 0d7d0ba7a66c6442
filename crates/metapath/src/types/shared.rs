//! Process-wide instances of values that are generic over the node type.
//!
//! A `static` cannot be generic, so each concrete type gets its own slot keyed by
//! [`TypeId`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

type Slots = Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>;

static SLOTS: OnceLock<Slots> = OnceLock::new();

/// The one shared `Arc<T>`, built by `init` the first time `T` is requested.
pub(crate) fn shared<T: Any + Send + Sync>(init: impl FnOnce() -> T) -> Arc<T> {
    let slots = SLOTS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut slots = slots.lock().unwrap_or_else(PoisonError::into_inner);
    let key = TypeId::of::<T>();
    if let Some(value) = slots.get(&key).and_then(|slot| slot.downcast_ref::<Arc<T>>()) {
        return Arc::clone(value);
    }
    let value = Arc::new(init());
    slots.insert(key, Box::new(Arc::clone(&value)));
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_instance_per_type() {
        let a = shared(Vec::<u8>::new);
        let b = shared(|| vec![1u8]);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(b.is_empty());
        let c = shared(String::new);
        assert!(c.is_empty());
    }
}
