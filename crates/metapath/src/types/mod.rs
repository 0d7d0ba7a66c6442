mod array;
mod atomic;
mod function;
mod item;
mod map;
mod map_key;
mod sequence;
mod shared;
mod temporal;

pub use array::ArrayItem;
pub use atomic::{AtomicType, AtomicValue};
pub(crate) use atomic::{format_double, parse_decimal, parse_double, parse_integer};
pub use function::FunctionItem;
pub use item::Item;
pub(crate) use item::atomize_node;
pub use map::{DuplicatePolicy, MapItem};
pub use map_key::MapKey;
pub use sequence::{ItemStream, Sequence};
pub(crate) use temporal::days_in_month;
pub use temporal::{Date, DateTime, Duration, Time, Timezone};
