//! Textual rendering of evaluation results.
//!
//! The format is fixed:
//!
//! - a sequence of exactly one item renders as that item, any other sequence as
//!   `(i1,i2,...)`;
//! - arrays render as `[m1,m2,...]`, each member as a sequence;
//! - maps render as `map {v1,v2,...}`: the values only, in iteration order;
//! - nodes render as `base-uri#metapath`, followed by `<value>` for nodes with a value;
//! - atomic items render as their string value and functions as their signature.

use crate::error::MetapathError;
use crate::types::{ArrayItem, AtomicValue, FunctionItem, Item, MapItem, Sequence};
use metaschema_mdm::NodeItem;
use std::fmt::{self, Write};

pub trait ItemWriter<N: NodeItem> {
    fn write_sequence(&mut self, sequence: &Sequence<N>) -> Result<(), MetapathError>;
    fn write_item(&mut self, item: &Item<N>) -> Result<(), MetapathError>;
    fn write_array(&mut self, array: &ArrayItem<N>) -> Result<(), MetapathError>;
    fn write_map(&mut self, map: &MapItem<N>) -> Result<(), MetapathError>;
    fn write_node(&mut self, node: &N) -> Result<(), MetapathError>;
    fn write_atomic(&mut self, value: &AtomicValue) -> Result<(), MetapathError>;
    fn write_function(&mut self, function: &FunctionItem<N>) -> Result<(), MetapathError>;
}

/// An [`ItemWriter`] over any [`fmt::Write`] sink.
pub struct StringItemWriter<W: Write = String> {
    out: W,
}

impl StringItemWriter<String> {
    pub fn new() -> Self {
        Self { out: String::new() }
    }

    /// Renders one sequence to a string.
    pub fn render<N: NodeItem>(sequence: &Sequence<N>) -> Result<String, MetapathError> {
        let mut writer = Self::new();
        writer.write_sequence(sequence)?;
        Ok(writer.into_inner())
    }
}

impl Default for StringItemWriter<String> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> StringItemWriter<W> {
    pub fn with_output(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn text(&mut self, s: &str) -> Result<(), MetapathError> {
        self.out.write_str(s).map_err(fmt_error)
    }

    fn joined<'a, T: 'a>(
        &mut self,
        open: &str,
        parts: impl IntoIterator<Item = &'a T>,
        close: &str,
        mut write: impl FnMut(&mut Self, &'a T) -> Result<(), MetapathError>,
    ) -> Result<(), MetapathError> {
        self.text(open)?;
        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                self.text(",")?;
            }
            write(self, part)?;
        }
        self.text(close)
    }
}

fn fmt_error(_: fmt::Error) -> MetapathError {
    MetapathError::usage("failed to write item text")
}

impl<N: NodeItem, W: Write> ItemWriter<N> for StringItemWriter<W> {
    fn write_sequence(&mut self, sequence: &Sequence<N>) -> Result<(), MetapathError> {
        match sequence.items()? {
            [item] => self.write_item(item),
            items => self.joined("(", items, ")", |w, item| w.write_item(item)),
        }
    }

    fn write_item(&mut self, item: &Item<N>) -> Result<(), MetapathError> {
        match item {
            Item::Atomic(value) => <Self as ItemWriter<N>>::write_atomic(self, value),
            Item::Node(node) => self.write_node(node),
            Item::Function(function) => self.write_function(function),
            Item::Array(array) => self.write_array(array),
            Item::Map(map) => self.write_map(map),
        }
    }

    fn write_array(&mut self, array: &ArrayItem<N>) -> Result<(), MetapathError> {
        self.joined("[", array.members(), "]", |w, member| w.write_sequence(member))
    }

    fn write_map(&mut self, map: &MapItem<N>) -> Result<(), MetapathError> {
        self.joined("map {", map.values(), "}", |w, value| w.write_sequence(value))
    }

    fn write_node(&mut self, node: &N) -> Result<(), MetapathError> {
        let base = node.base_uri().unwrap_or_default().to_string();
        self.text(&base)?;
        self.text("#")?;
        self.text(&node.metapath())?;
        if let Some(value) = node.value() {
            let value = value.to_string();
            self.text("<")?;
            self.text(&value)?;
            self.text(">")?;
        }
        Ok(())
    }

    fn write_atomic(&mut self, value: &AtomicValue) -> Result<(), MetapathError> {
        self.text(&value.to_string_value())
    }

    fn write_function(&mut self, function: &FunctionItem<N>) -> Result<(), MetapathError> {
        self.text(&function.to_signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MapItem;
    use metaschema_mdm::{DataType, Definition, DocumentBuilder, NodeRef};
    use std::sync::Arc;

    fn render(seq: &Sequence<NodeRef>) -> String {
        StringItemWriter::render(seq).unwrap()
    }

    #[test]
    fn test_sequences() {
        assert_eq!(render(&Sequence::empty()), "()");
        assert_eq!(render(&Sequence::from_integer(1)), "1");
        let seq = Sequence::from_atomics([1i64.into(), "a".into()]);
        assert_eq!(render(&seq), "(1,a)");
    }

    #[test]
    fn test_arrays_and_maps() {
        let array = ArrayItem::new(vec![
            Sequence::from_integer(1),
            Sequence::from_atomics([2i64.into(), 3i64.into()]),
            Sequence::empty(),
        ]);
        assert_eq!(render(&Sequence::of(Item::Array(array))), "[1,(2,3),()]");
        let map = MapItem::from_entries([
            (AtomicValue::string("b"), Sequence::from_integer(2)),
            (AtomicValue::string("a"), Sequence::from_string("x")),
        ]);
        assert_eq!(render(&Sequence::of(Item::Map(map))), "map {2,x}");
    }

    #[test]
    fn test_nodes() {
        let builder = DocumentBuilder::new(Some("file:/doc.xml"));
        let catalog = builder
            .new_assembly(builder.root(), Arc::new(Definition::assembly("catalog")))
            .unwrap();
        let id = builder
            .new_flag(catalog, Arc::new(Definition::flag("id", DataType::Token)), "c1")
            .unwrap();
        let doc = builder.build().unwrap();
        let catalog = doc.node(catalog).unwrap();
        let id = doc.node(id).unwrap();
        assert_eq!(
            render(&Sequence::from_node(catalog.clone())),
            format!("file:/doc.xml#{}", catalog.metapath())
        );
        assert_eq!(
            render(&Sequence::from_node(id.clone())),
            format!("file:/doc.xml#{}<c1>", id.metapath())
        );
    }
}
