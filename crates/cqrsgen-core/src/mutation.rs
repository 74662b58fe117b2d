use std::collections::{BTreeSet, HashMap, HashSet};

use crate::asset::{Artifacts, Asset, AssetKind, AssetSource};
use crate::error::RegistryError;
use crate::method::{Method, MethodDecl, ServiceDecl};
use crate::types::{ServiceRef, TypeRef, content_key, snake_case};

const HANDLER_PREFIX: &str = "on_";

/// Event-sourced write side: one service, many `on_<event>` handlers.
#[derive(Debug, Clone)]
pub struct Mutation {
    service: ServiceRef,
    handlers: Vec<Method>,
    key: String,
    artifacts: Artifacts,
}

impl Mutation {
    /// Collect the event handlers declared on `decl`.
    ///
    /// Methods outside the `on_` namespace (constructors, `push`) are skipped.
    /// A method inside it that breaks the handler convention is an error, as
    /// is a second handler for an event name or a repeated method name.
    pub fn from_decl(decl: ServiceDecl) -> Result<Self, RegistryError> {
        let service = decl.service();
        let mut mutation = Self {
            key: content_key(&service.module, &service.name),
            service,
            handlers: Vec::new(),
            artifacts: Artifacts::default(),
        };

        // Event name -> handler that claimed it.
        let mut handled: HashMap<String, String> = HashMap::new();
        let mut names: HashSet<String> = HashSet::new();
        for method in decl.methods {
            let event = classify_handler(&method)?;
            let claimed = event.as_ref().and_then(|e| handled.get(e.name()).map(|first| (e, first)));
            if let Some((event, first)) = claimed {
                return Err(RegistryError::DuplicateEvent {
                    event: event.to_string(),
                    first: first.clone(),
                    second: method.name,
                });
            }
            if !names.insert(method.name.clone()) {
                return Err(RegistryError::DuplicateMethod {
                    service: mutation.service.path(),
                    method: method.name,
                });
            }

            match event {
                Some(event) => {
                    handled.insert(event.name().to_string(), method.name.clone());
                    mutation.add(method, event);
                }
                None => {
                    tracing::debug!(
                        service = %mutation.service.path(),
                        method = %method.name,
                        "Skipping non-handler method"
                    );
                }
            }
        }
        Ok(mutation)
    }

    fn add(&mut self, decl: MethodDecl, event: TypeRef) {
        tracing::debug!(
            service = %self.service.path(),
            method = %decl.name,
            event = %event,
            "Registered event handler"
        );
        self.handlers
            .push(Method::new(self.service.clone(), decl).with_event(event));
    }

    pub fn service(&self) -> &ServiceRef {
        &self.service
    }

    pub fn handlers(&self) -> &[Method] {
        &self.handlers
    }

    /// Event types in handler registration order.
    pub fn event_types(&self) -> Vec<&TypeRef> {
        self.handlers.iter().filter_map(Method::event).collect()
    }

    /// Event types as referenced from generated source, e.g. `events::OrderPlaced`.
    pub fn events(&self) -> Vec<String> {
        self.event_types()
            .into_iter()
            .map(|event| match event {
                TypeRef::Ref(inner) => inner.rust(),
                other => other.rust(),
            })
            .collect()
    }

    /// Bare event names in registration order (not sorted).
    pub fn event_names(&self) -> Vec<String> {
        self.event_types()
            .into_iter()
            .map(|event| event.name().to_string())
            .collect()
    }

    /// Modules referenced by any handler plus the service's own; sorted.
    pub fn imports(&self) -> Vec<String> {
        let mut modules: BTreeSet<String> = self.handlers.iter().flat_map(Method::imports).collect();
        modules.insert(self.service.module.clone());
        modules.remove("");
        modules.into_iter().collect()
    }
}

impl Asset for Mutation {
    fn kind(&self) -> AssetKind {
        AssetKind::Mutation
    }
    fn name(&self) -> &str {
        &self.service.name
    }
    fn key(&self) -> &str {
        &self.key
    }
    fn package_name(&self) -> &str {
        self.service.package_name()
    }
    fn source(&self) -> AssetSource<'_> {
        AssetSource::Mutation(self)
    }
    fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }
    fn artifacts_mut(&mut self) -> &mut Artifacts {
        &mut self.artifacts
    }
}

/// Apply the handler convention: `on_<event>(ctx, &Event) -> error`, where
/// `<event>` is the snake_case form of the event type's name.
///
/// Returns `Ok(None)` for methods outside the `on_` namespace and the event
/// type for qualifying handlers.
pub fn classify_handler(decl: &MethodDecl) -> Result<Option<TypeRef>, RegistryError> {
    let Some(suffix) = decl.name.strip_prefix(HANDLER_PREFIX) else {
        return Ok(None);
    };
    if suffix.is_empty() {
        return Ok(None);
    }

    let invalid = |reason: String| RegistryError::InvalidHandler {
        method: decl.name.clone(),
        reason,
    };

    let [ctx, event] = decl.inputs.as_slice() else {
        return Err(invalid(format!(
            "expected inputs (ctx, &Event), found {} input(s)",
            decl.inputs.len()
        )));
    };
    if !ctx.is_context() {
        return Err(invalid(format!("first input must be ctx, found `{ctx}`")));
    }
    if !matches!(event, TypeRef::Ref(inner) if matches!(**inner, TypeRef::Named { .. })) {
        return Err(invalid(format!(
            "event must be a borrowed named type, found `{event}`"
        )));
    }
    if !matches!(decl.outputs.as_slice(), [out] if out.is_error_like()) {
        return Err(invalid(
            "must return a single error-like result".to_string(),
        ));
    }

    let expected = snake_case(event.name());
    if suffix != expected {
        return Err(invalid(format!(
            "handles `{}` so it must be named `{HANDLER_PREFIX}{expected}`",
            event.name()
        )));
    }
    Ok(Some(event.clone()))
}

pub fn is_event_handler(decl: &MethodDecl) -> bool {
    matches!(classify_handler(decl), Ok(Some(_)))
}
