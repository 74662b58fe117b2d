use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::asset::{Artifacts, Asset, AssetKind, AssetSource};
use crate::error::RegistryError;
use crate::types::{ServiceRef, TypeRef, content_key};

/// One method as declared on a service. The receiver is implicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<TypeRef>,
    #[serde(default)]
    pub outputs: Vec<TypeRef>,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>, inputs: Vec<TypeRef>, outputs: Vec<TypeRef>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }
}

/// A service and the public methods it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDecl {
    pub module: String,
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

impl ServiceDecl {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, decl: MethodDecl) -> Self {
        self.methods.push(decl);
        self
    }

    pub fn service(&self) -> ServiceRef {
        ServiceRef::new(&self.module, &self.name)
    }

    /// Method names double as asset names and handler names, so each may
    /// appear once per service.
    pub fn check_unique_methods(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for method in &self.methods {
            if !seen.insert(method.name.as_str()) {
                return Err(RegistryError::DuplicateMethod {
                    service: self.service().path(),
                    method: method.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A registered callable.
#[derive(Debug, Clone)]
pub struct Method {
    service: ServiceRef,
    name: String,
    inputs: Vec<TypeRef>,
    outputs: Vec<TypeRef>,
    event: Option<TypeRef>,
    key: String,
    artifacts: Artifacts,
}

impl Method {
    pub fn new(service: ServiceRef, decl: MethodDecl) -> Self {
        let key = content_key(&service.path(), &decl.name);
        Self {
            service,
            name: decl.name,
            inputs: decl.inputs,
            outputs: decl.outputs,
            event: None,
            key,
            artifacts: Artifacts::default(),
        }
    }

    pub(crate) fn with_event(mut self, event: TypeRef) -> Self {
        self.event = Some(event);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &ServiceRef {
        &self.service
    }

    pub fn package_name(&self) -> &str {
        self.service.package_name()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn inputs(&self) -> &[TypeRef] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TypeRef] {
        &self.outputs
    }

    /// Event type handled, for mutation handlers only.
    pub fn event(&self) -> Option<&TypeRef> {
        self.event.as_ref()
    }

    /// Modules referenced by the receiver, inputs and outputs (type arguments
    /// included); sorted, no duplicates.
    pub fn imports(&self) -> Vec<String> {
        let mut modules: BTreeSet<&str> = BTreeSet::new();
        modules.insert(&self.service.module);
        for ty in self.inputs.iter().chain(&self.outputs) {
            modules.extend(ty.modules());
        }
        modules.remove("");
        modules.into_iter().map(String::from).collect()
    }

    /// Non-error outputs, i.e. what the handler yields on success.
    pub fn values(&self) -> &[TypeRef] {
        match self.outputs.split_last() {
            Some((last, rest)) if last.is_error_like() => rest,
            _ => &self.outputs,
        }
    }

    pub fn is_fallible(&self) -> bool {
        self.outputs.last().is_some_and(TypeRef::is_error_like)
    }

    /// Signature as it reads in generated source, e.g.
    /// `fn(&Context, &events::OrderPlaced) -> Result<(), Error>`.
    pub fn signature(&self) -> String {
        let inputs: Vec<String> = self
            .inputs
            .iter()
            .map(|t| if t.is_context() { "&Context".into() } else { t.rust() })
            .collect();
        let value = tuple(self.values());
        let ret = match (self.is_fallible(), self.outputs.last()) {
            (true, Some(err)) => format!(" -> Result<{value}, {}>", err.rust()),
            (false, Some(_)) => format!(" -> {value}"),
            _ => String::new(),
        };
        format!("fn({}){ret}", inputs.join(", "))
    }

    pub(crate) fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub(crate) fn artifacts_mut(&mut self) -> &mut Artifacts {
        &mut self.artifacts
    }
}

/// Render a type list as a Rust value type: `()`, `T`, or `(A, B)`.
pub fn tuple(types: &[TypeRef]) -> String {
    match types {
        [] => "()".into(),
        [single] => single.rust(),
        many => format!(
            "({})",
            many.iter().map(TypeRef::rust).collect::<Vec<_>>().join(", ")
        ),
    }
}

#[derive(Debug, Clone)]
pub struct Command(pub Method);

#[derive(Debug, Clone)]
pub struct Query(pub Method);

impl Asset for Command {
    fn kind(&self) -> AssetKind {
        AssetKind::Command
    }
    fn name(&self) -> &str {
        self.0.name()
    }
    fn key(&self) -> &str {
        self.0.key()
    }
    fn package_name(&self) -> &str {
        self.0.package_name()
    }
    fn source(&self) -> AssetSource<'_> {
        AssetSource::Method(&self.0)
    }
    fn artifacts(&self) -> &Artifacts {
        self.0.artifacts()
    }
    fn artifacts_mut(&mut self) -> &mut Artifacts {
        self.0.artifacts_mut()
    }
}

impl Asset for Query {
    fn kind(&self) -> AssetKind {
        AssetKind::Query
    }
    fn name(&self) -> &str {
        self.0.name()
    }
    fn key(&self) -> &str {
        self.0.key()
    }
    fn package_name(&self) -> &str {
        self.0.package_name()
    }
    fn source(&self) -> AssetSource<'_> {
        AssetSource::Method(&self.0)
    }
    fn artifacts(&self) -> &Artifacts {
        self.0.artifacts()
    }
    fn artifacts_mut(&mut self) -> &mut Artifacts {
        self.0.artifacts_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(text: &str) -> TypeRef {
        text.parse().unwrap()
    }

    fn get_order() -> Method {
        Method::new(
            ServiceRef::new("shop::queries", "Queries"),
            MethodDecl::new(
                "get_order",
                vec![t("ctx"), t("&shop::model::OrderId")],
                vec![t("shop::model::Order"), t("error")],
            ),
        )
    }

    #[test]
    fn inputs_and_outputs_keep_declaration_order() {
        let m = get_order();
        assert_eq!(m.inputs(), &[t("ctx"), t("&shop::model::OrderId")]);
        assert_eq!(m.outputs(), &[t("shop::model::Order"), t("error")]);
        assert_eq!(m.values(), &[t("shop::model::Order")]);
        assert!(m.is_fallible());
    }

    #[test]
    fn imports_are_sorted_and_deduplicated() {
        let m = Method::new(
            ServiceRef::new("shop::queries", "Queries"),
            MethodDecl::new(
                "list",
                vec![t("ctx"), t("&shop::model::Filter"), t("u32")],
                vec![t("shop::model::Page"), t("shop::errors::QueryError")],
            ),
        );
        assert_eq!(
            m.imports(),
            vec!["shop::errors", "shop::model", "shop::queries"]
        );
    }

    #[test]
    fn imports_include_type_arguments() {
        let m = Method::new(
            ServiceRef::new("shop::queries", "Queries"),
            MethodDecl::new(
                "list_orders",
                vec![t("ctx"), t("Option<shop::filter::Range>")],
                vec![t("Vec<shop::model::Order>"), t("error")],
            ),
        );
        assert_eq!(
            m.imports(),
            vec!["shop::filter", "shop::model", "shop::queries"]
        );
        assert_eq!(
            m.signature(),
            "fn(&Context, Option<filter::Range>) -> Result<Vec<model::Order>, Error>"
        );
    }

    #[test]
    fn duplicate_method_names_are_rejected() {
        let decl = ServiceDecl::new("shop::commands", "Commands")
            .method(MethodDecl::new("place_order", vec![t("ctx")], vec![t("error")]))
            .method(MethodDecl::new("cancel_order", vec![t("ctx")], vec![t("error")]))
            .method(MethodDecl::new("place_order", vec![t("ctx"), t("u64")], vec![t("error")]));
        let err = decl.check_unique_methods().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::DuplicateMethod { ref service, ref method }
                if service == "shop::commands::Commands" && method == "place_order"
        ));

        let unique = ServiceDecl::new("shop::commands", "Commands")
            .method(MethodDecl::new("place_order", vec![t("ctx")], vec![t("error")]));
        assert!(unique.check_unique_methods().is_ok());
    }

    #[test]
    fn signature_for_source_generation() {
        assert_eq!(
            get_order().signature(),
            "fn(&Context, &model::OrderId) -> Result<model::Order, Error>"
        );

        let infallible = Method::new(
            ServiceRef::new("shop::queries", "Queries"),
            MethodDecl::new("count", vec![t("ctx")], vec![t("u64"), t("u64")]),
        );
        assert_eq!(infallible.signature(), "fn(&Context) -> (u64, u64)");
    }

    #[test]
    fn key_derives_from_service_path_and_name() {
        let m = get_order();
        assert_eq!(m.key(), content_key("shop::queries::Queries", "get_order"));
        assert_eq!(m.package_name(), "queries");

        // Same method name on another service in the same module.
        let other = Method::new(
            ServiceRef::new("shop::queries", "Reports"),
            MethodDecl::new("get_order", vec![t("ctx")], vec![t("error")]),
        );
        assert_ne!(other.key(), m.key());
    }

    #[test]
    fn service_decl_from_toml() {
        let decl: ServiceDecl = toml::from_str(
            r#"
module = "shop::queries"
name = "Queries"

[[methods]]
name = "get_order"
inputs = ["ctx", "&shop::model::OrderId"]
outputs = ["shop::model::Order", "error"]
"#,
        )
        .unwrap();
        assert_eq!(decl.service().path(), "shop::queries::Queries");
        assert_eq!(decl.methods[0].inputs[1], t("&shop::model::OrderId"));

        let bad = toml::from_str::<ServiceDecl>(
            r#"
module = "shop::queries"
name = "Queries"

[[methods]]
name = "get_order"
inputs = ["Vec<u8"]
"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn command_and_query_expose_kind() {
        let cmd = Command(get_order());
        let query = Query(get_order());
        assert_eq!(cmd.kind(), AssetKind::Command);
        assert_eq!(query.kind(), AssetKind::Query);
        assert_eq!(cmd.name(), "get_order");
        assert!(cmd.build_path().is_none());
        assert!(matches!(query.source(), AssetSource::Method(_)));
    }
}
