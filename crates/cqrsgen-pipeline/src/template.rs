//! Literal source templates with named slots.
//!
//! Syntax:
//! - `{{name}}` substitutes a text field,
//! - `{{#list}} ... {{/list}}` repeats its body once per list item; inside,
//!   slots resolve against the item first and the enclosing fields second.
//!
//! A section tag alone on its line swallows that line, so sections can be
//! laid out one tag per line without leaving blank lines behind.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use cqrsgen_core::{Asset, AssetKind, AssetSource, Method, Mutation, TypeRef};
use cqrsgen_core::method::tuple;
use thiserror::Error;

use crate::error::PipelineError;
use crate::settings::TemplateSettings;

const RESOLVER: &str = include_str!("../templates/resolver.rs.tmpl");
const MUTATION: &str = include_str!("../templates/mutation.rs.tmpl");
const CARGO_MANIFEST: &str = include_str!("../templates/Cargo.toml.tmpl");

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template `{template}` is malformed at byte {offset}: {reason}")]
    Malformed {
        template: String,
        offset: usize,
        reason: String,
    },

    #[error("template `{template}` needs field `{field}`")]
    MissingField { template: String, field: String },

    #[error("template `{template}` uses `{field}` as a {expected}")]
    WrongShape {
        template: String,
        field: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    List(Vec<Fields>),
}

/// Named values a template is rendered against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.insert(name.to_string(), Value::Text(value.into()));
        self
    }

    pub fn list(mut self, name: &str, items: Vec<Fields>) -> Self {
        self.0.insert(name.to_string(), Value::List(items));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Slot(String),
    Section { name: String, body: Vec<Node> },
}

#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(name: impl Into<String>, body: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        let malformed = |offset: usize, reason: &str| TemplateError::Malformed {
            template: name.clone(),
            offset,
            reason: reason.to_string(),
        };

        // Open sections, innermost last: (name, offset, nodes before the section).
        let mut stack: Vec<(String, usize, Vec<Node>)> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();
        let mut text = String::new();
        let mut pos = 0;

        while let Some(found) = body[pos..].find("{{") {
            let open = pos + found;
            text.push_str(&body[pos..open]);
            let close = body[open + 2..]
                .find("}}")
                .map(|i| open + 2 + i)
                .ok_or_else(|| malformed(open, "unclosed tag"))?;
            let tag = body[open + 2..close].trim();
            pos = close + 2;

            if let Some(section) = tag.strip_prefix('#').or_else(|| tag.strip_prefix('/')) {
                let section = section.trim();
                if !is_field_name(section) {
                    return Err(malformed(open, "invalid section name"));
                }
                pos = strip_standalone(body, &mut text, pos);
                flush(&mut text, &mut nodes);

                if tag.starts_with('#') {
                    stack.push((section.to_string(), open, std::mem::take(&mut nodes)));
                } else {
                    let (opened, _, parent) = stack
                        .pop()
                        .ok_or_else(|| malformed(open, "closing tag without section"))?;
                    if opened != section {
                        return Err(malformed(
                            open,
                            &format!("expected {{{{/{opened}}}}}, found {{{{/{section}}}}}"),
                        ));
                    }
                    let inner = std::mem::replace(&mut nodes, parent);
                    nodes.push(Node::Section {
                        name: opened,
                        body: inner,
                    });
                }
            } else {
                if !is_field_name(tag) {
                    return Err(malformed(open, "invalid slot name"));
                }
                flush(&mut text, &mut nodes);
                nodes.push(Node::Slot(tag.to_string()));
            }
        }
        text.push_str(&body[pos..]);
        flush(&mut text, &mut nodes);

        if let Some((section, offset, _)) = stack.pop() {
            return Err(malformed(offset, &format!("section `{section}` is never closed")));
        }
        Ok(Self { name, nodes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, fields: &Fields) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_nodes(&self.nodes, &[fields], &mut out)?;
        Ok(out)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        scopes: &[&Fields],
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Slot(field) => match self.lookup(scopes, field)? {
                    Value::Text(value) => out.push_str(value),
                    Value::List(_) => return Err(self.wrong_shape(field, "text slot")),
                },
                Node::Section { name, body } => match self.lookup(scopes, name)? {
                    Value::List(items) => {
                        for item in items {
                            let mut inner = Vec::with_capacity(scopes.len() + 1);
                            inner.push(item);
                            inner.extend_from_slice(scopes);
                            self.render_nodes(body, &inner, out)?;
                        }
                    }
                    Value::Text(_) => return Err(self.wrong_shape(name, "section")),
                },
            }
        }
        Ok(())
    }

    fn lookup<'a>(&self, scopes: &[&'a Fields], field: &str) -> Result<&'a Value, TemplateError> {
        scopes
            .iter()
            .find_map(|scope| Fields::get(*scope, field))
            .ok_or_else(|| TemplateError::MissingField {
                template: self.name.clone(),
                field: field.to_string(),
            })
    }

    fn wrong_shape(&self, field: &str, expected: &'static str) -> TemplateError {
        TemplateError::WrongShape {
            template: self.name.clone(),
            field: field.to_string(),
            expected,
        }
    }
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

/// If the tag ending at `pos` sits alone on its line, drop the line's leading
/// indentation from `text` and return the position past its newline.
fn strip_standalone(body: &str, text: &mut String, pos: usize) -> usize {
    let line_start = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let starts_line = text[line_start..].chars().all(|c| c == ' ' || c == '\t')
        && (line_start > 0 || body_prefix_is_line_start(body, pos, text));
    if !starts_line {
        return pos;
    }
    let rest = &body[pos..];
    let skip = if rest.starts_with("\r\n") {
        2
    } else if rest.starts_with('\n') {
        1
    } else if rest.is_empty() {
        0
    } else {
        return pos;
    };
    text.truncate(line_start);
    pos + skip
}

// `text` holds no newline: the tag is standalone only if nothing but
// whitespace precedes it since the last newline in the whole body.
fn body_prefix_is_line_start(body: &str, pos: usize, text: &str) -> bool {
    let tag_start = body[..pos].rfind("{{").unwrap_or(0);
    let before = &body[..tag_start];
    let line = before.rfind('\n').map(|i| &before[i + 1..]).unwrap_or(before);
    line.len() == text.len() && line.chars().all(|c| c == ' ' || c == '\t')
}

fn is_field_name(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Template bodies by asset kind, plus the cargo manifest every asset
/// package is scaffolded with.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    by_kind: HashMap<AssetKind, Template>,
    cargo_manifest: Template,
}

impl TemplateSet {
    /// Built-in templates: resolver for commands and queries, mutation for
    /// the mutation. Functions have none.
    pub fn builtin() -> Result<Self, TemplateError> {
        let resolver = Template::parse("resolver", RESOLVER)?;
        let mut by_kind = HashMap::new();
        by_kind.insert(AssetKind::Command, resolver.clone());
        by_kind.insert(AssetKind::Query, resolver);
        by_kind.insert(AssetKind::Mutation, Template::parse("mutation", MUTATION)?);
        Ok(Self {
            by_kind,
            cargo_manifest: Template::parse("cargo_manifest", CARGO_MANIFEST)?,
        })
    }

    /// Built-ins overridden by the files named in settings, relative to `base_dir`.
    pub fn from_settings(settings: &TemplateSettings, base_dir: &Path) -> Result<Self, PipelineError> {
        let mut set = Self::builtin().map_err(|source| PipelineError::Template {
            asset: "builtin".into(),
            source,
        })?;

        let load = |name: &str, file: &Path| -> Result<Template, PipelineError> {
            let path = base_dir.join(file);
            let body = std::fs::read_to_string(&path).map_err(|e| PipelineError::ConfigParse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            tracing::debug!(template = name, path = %path.display(), "Loaded template override");
            Template::parse(name, &body).map_err(|source| PipelineError::Template {
                asset: name.to_string(),
                source,
            })
        };

        if let Some(file) = &settings.resolver {
            let resolver = load("resolver", file)?;
            set.by_kind.insert(AssetKind::Command, resolver.clone());
            set.by_kind.insert(AssetKind::Query, resolver);
        }
        if let Some(file) = &settings.mutation {
            set.by_kind.insert(AssetKind::Mutation, load("mutation", file)?);
        }
        if let Some(file) = &settings.cargo_manifest {
            set.cargo_manifest = load("cargo_manifest", file)?;
        }
        Ok(set)
    }

    pub fn with_template(mut self, kind: AssetKind, template: Template) -> Self {
        self.by_kind.insert(kind, template);
        self
    }

    pub fn for_kind(&self, kind: AssetKind) -> Result<&Template, PipelineError> {
        self.by_kind
            .get(&kind)
            .ok_or_else(|| PipelineError::NotImplemented(format!("no template for {kind} assets")))
    }

    /// Render the entry-point source for `asset`.
    pub fn render(&self, asset: &dyn Asset) -> Result<String, PipelineError> {
        let template = self.for_kind(asset.kind())?;
        template
            .render(&asset_fields(asset))
            .map_err(|source| PipelineError::Template {
                asset: asset.name().to_string(),
                source,
            })
    }

    pub fn render_cargo_manifest(&self, asset: &dyn Asset, fields: &Fields) -> Result<String, PipelineError> {
        self.cargo_manifest
            .render(fields)
            .map_err(|source| PipelineError::Template {
                asset: asset.name().to_string(),
                source,
            })
    }
}

/// Fields every template can reference for `asset`.
pub fn asset_fields(asset: &dyn Asset) -> Fields {
    let fields = Fields::new()
        .text("name", asset.name())
        .text("key", asset.key())
        .text("package", asset.package_name());

    match asset.source() {
        AssetSource::Method(method) => method_fields(fields, method),
        AssetSource::Mutation(mutation) => mutation_fields(fields, mutation),
    }
}

fn imports(paths: Vec<String>) -> Vec<Fields> {
    paths.into_iter().map(|path| Fields::new().text("path", path)).collect()
}

/// Payload type for methods that take nothing but the context. Accepts any
/// invocation body, including `{}`.
const ANY_PAYLOAD: &str = "serde_json::Value";

fn method_fields(fields: Fields, method: &Method) -> Fields {
    let payload: Vec<&TypeRef> = method.inputs().iter().filter(|t| !t.is_context()).collect();
    let owned: Vec<TypeRef> = payload
        .iter()
        .map(|t| match t {
            TypeRef::Ref(inner) => (**inner).clone(),
            other => (*other).clone(),
        })
        .collect();

    let mut position = 0;
    let args: Vec<String> = method
        .inputs()
        .iter()
        .map(|input| {
            if input.is_context() {
                return "&event.context".to_string();
            }
            let value = if payload.len() == 1 {
                "event.payload".to_string()
            } else {
                format!("event.payload.{position}")
            };
            position += 1;
            if input.is_ref() { format!("&{value}") } else { value }
        })
        .collect();

    fields
        .text("service", method.service().rust())
        .text("service_path", method.service().path())
        .text("method", method.name())
        .text("signature", method.signature())
        .text(
            "payload",
            if owned.is_empty() { ANY_PAYLOAD.to_string() } else { tuple(&owned) },
        )
        .text("args", args.join(", "))
        .text("output", tuple(method.values()))
        .text("try", if method.is_fallible() { "?" } else { "" })
        .list("imports", imports(method.imports()))
}

fn mutation_fields(fields: Fields, mutation: &Mutation) -> Fields {
    let events = mutation
        .event_names()
        .into_iter()
        .zip(mutation.events())
        .zip(mutation.handlers())
        .map(|((name, ty), handler)| {
            Fields::new()
                .text("name", name)
                .text("type", ty)
                .text("handler", handler.name())
        })
        .collect();

    fields
        .text("service", mutation.service().rust())
        .text("service_path", mutation.service().path())
        .list("imports", imports(mutation.imports()))
        .list("events", events)
}
