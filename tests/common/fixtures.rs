use metaschema::mdm::{DataType, Definition, NodeId};
use metaschema::{Document, DocumentBuilder};
use std::sync::Arc;

/// Definitions of a small control catalog.
pub struct CatalogModel {
    pub catalog: Arc<Definition>,
    pub metadata: Arc<Definition>,
    pub title: Arc<Definition>,
    pub version: Arc<Definition>,
    pub group: Arc<Definition>,
    pub control: Arc<Definition>,
    pub link: Arc<Definition>,
    pub id: Arc<Definition>,
    pub class: Arc<Definition>,
    pub href: Arc<Definition>,
    pub status: Arc<Definition>,
}

impl CatalogModel {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(Definition::assembly("catalog").with_occurs(1, Some(1))),
            metadata: Arc::new(Definition::assembly("metadata").with_occurs(1, Some(1))),
            title: Arc::new(Definition::field("title", DataType::MarkupLine).with_occurs(1, Some(1))),
            version: Arc::new(Definition::field("version", DataType::String)),
            group: Arc::new(Definition::assembly("group").with_occurs(0, None)),
            control: Arc::new(Definition::assembly("control").with_occurs(0, None)),
            link: Arc::new(Definition::assembly("link").with_occurs(0, None)),
            id: Arc::new(Definition::flag("id", DataType::Token)),
            class: Arc::new(Definition::flag("class", DataType::Token)),
            href: Arc::new(Definition::flag("href", DataType::UriReference)),
            status: Arc::new(Definition::flag("status", DataType::Token)),
        }
    }
}

/// A control: its id, optional class and the ids its links point to.
pub struct ControlSpec<'a> {
    pub id: &'a str,
    pub class: Option<&'a str>,
    pub status: &'a str,
    pub links: &'a [&'a str],
}

impl<'a> ControlSpec<'a> {
    pub fn new(id: &'a str) -> Self {
        Self {
            id,
            class: None,
            status: "active",
            links: &[],
        }
    }

    pub fn class(mut self, class: &'a str) -> Self {
        self.class = Some(class);
        self
    }

    pub fn status(mut self, status: &'a str) -> Self {
        self.status = status;
        self
    }

    pub fn links(mut self, links: &'a [&'a str]) -> Self {
        self.links = links;
        self
    }
}

/// Builds `catalog/metadata/{title,version}` followed by one group per entry of
/// `groups`, each holding its controls.
pub fn catalog(groups: &[(&str, Vec<ControlSpec<'_>>)]) -> Document {
    let model = CatalogModel::new();
    let builder = DocumentBuilder::new(Some("file:/catalog.json"));
    let catalog = builder
        .new_assembly(builder.root(), Arc::clone(&model.catalog))
        .expect("catalog");
    builder
        .new_flag(catalog, Arc::clone(&model.id), "cat-1")
        .expect("catalog id");
    let metadata = builder
        .new_assembly(catalog, Arc::clone(&model.metadata))
        .expect("metadata");
    builder
        .new_field(metadata, Arc::clone(&model.title), "Sample Catalog")
        .expect("title");
    builder
        .new_field(metadata, Arc::clone(&model.version), "1.2")
        .expect("version");

    for (group_id, controls) in groups {
        let group = builder
            .new_assembly(catalog, Arc::clone(&model.group))
            .expect("group");
        builder
            .new_flag(group, Arc::clone(&model.id), *group_id)
            .expect("group id");
        for control in controls {
            add_control(&builder, &model, group, control);
        }
    }
    builder.build().expect("build")
}

fn add_control(builder: &DocumentBuilder, model: &CatalogModel, parent: NodeId, control_spec: &ControlSpec<'_>) {
    let control = builder
        .new_assembly(parent, Arc::clone(&model.control))
        .expect("control");
    builder
        .new_flag(control, Arc::clone(&model.id), control_spec.id)
        .expect("control id");
    builder
        .new_flag(control, Arc::clone(&model.status), control_spec.status)
        .expect("control status");
    if let Some(class) = control_spec.class {
        builder
            .new_flag(control, Arc::clone(&model.class), class)
            .expect("control class");
    }
    for target in control_spec.links {
        let link = builder
            .new_assembly(control, Arc::clone(&model.link))
            .expect("link");
        builder
            .new_flag(link, Arc::clone(&model.href), format!("#{}", target))
            .expect("link href");
    }
}

/// Two groups, five controls, with links between them.
pub fn sample_catalog() -> Document {
    catalog(&[
        (
            "ac",
            vec![
                ControlSpec::new("ac-1").class("policy").links(&["ac-2"]),
                ControlSpec::new("ac-2").class("technical").links(&["ac-1", "au-1"]),
                ControlSpec::new("ac-3").status("withdrawn"),
            ],
        ),
        (
            "au",
            vec![
                ControlSpec::new("au-1").class("policy"),
                ControlSpec::new("au-2").class("technical").links(&["ac-3"]),
            ],
        ),
    ])
}
