use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::asset::Asset;
use crate::error::RegistryError;
use crate::method::{Command, Method, Query, ServiceDecl};
use crate::mutation::Mutation;

/// A plain function entry point. Declared so the kind exists in the model;
/// registering one is not supported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub module: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy)]
enum MethodKind {
    Command,
    Query,
}

/// Every asset registered for one service run.
#[derive(Debug, Default)]
pub struct Registry {
    commands: Vec<Command>,
    queries: Vec<Query>,
    mutation: Option<Mutation>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every method of `decl` as a command.
    pub fn add_commands(&mut self, decl: ServiceDecl) -> Result<(), RegistryError> {
        self.add(MethodKind::Command, decl)
    }

    /// Register every method of `decl` as a query.
    pub fn add_queries(&mut self, decl: ServiceDecl) -> Result<(), RegistryError> {
        self.add(MethodKind::Query, decl)
    }

    /// All or nothing: a rejected declaration registers none of its methods.
    fn add(&mut self, kind: MethodKind, decl: ServiceDecl) -> Result<(), RegistryError> {
        decl.check_unique_methods()?;
        let service = decl.service();
        let methods: Vec<Method> = decl
            .methods
            .into_iter()
            .map(|m| Method::new(service.clone(), m))
            .collect();

        let taken: HashSet<&str> = self.assets().into_iter().map(|a| a.key()).collect();
        if let Some(clash) = methods.iter().find(|m| taken.contains(m.key())) {
            return Err(RegistryError::DuplicateAsset(format!(
                "{}::{}",
                service.path(),
                clash.name()
            )));
        }

        for method in methods {
            tracing::debug!(kind = ?kind, service = %service.path(), method = %method.name(), "Registered");
            match kind {
                MethodKind::Command => self.commands.push(Command(method)),
                MethodKind::Query => self.queries.push(Query(method)),
            }
        }
        Ok(())
    }

    /// Register the event handlers of `decl` as the single mutation.
    pub fn add_mutation(&mut self, decl: ServiceDecl) -> Result<(), RegistryError> {
        if let Some(existing) = &self.mutation {
            return Err(RegistryError::DuplicateMutation(existing.service().path()));
        }
        let mutation = Mutation::from_decl(decl)?;
        tracing::debug!(
            service = %mutation.service().path(),
            events = ?mutation.event_names(),
            "Registered mutation"
        );
        self.mutation = Some(mutation);
        Ok(())
    }

    pub fn add_function(&mut self, decl: FunctionDecl) -> Result<(), RegistryError> {
        Err(RegistryError::NotImplemented(format!(
            "function asset {}::{}",
            decl.module, decl.name
        )))
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn mutation(&self) -> Option<&Mutation> {
        self.mutation.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.queries.is_empty() && self.mutation.is_none()
    }

    /// Assets in processing order: commands, queries, then the mutation.
    pub fn assets(&self) -> Vec<&dyn Asset> {
        let mut assets: Vec<&dyn Asset> = Vec::new();
        assets.extend(self.commands.iter().map(|c| c as &dyn Asset));
        assets.extend(self.queries.iter().map(|q| q as &dyn Asset));
        if let Some(mutation) = &self.mutation {
            assets.push(mutation);
        }
        assets
    }

    pub fn assets_mut(&mut self) -> Vec<&mut dyn Asset> {
        let mut assets: Vec<&mut dyn Asset> = Vec::new();
        assets.extend(self.commands.iter_mut().map(|c| c as &mut dyn Asset));
        assets.extend(self.queries.iter_mut().map(|q| q as &mut dyn Asset));
        if let Some(mutation) = &mut self.mutation {
            assets.push(mutation);
        }
        assets
    }
}
