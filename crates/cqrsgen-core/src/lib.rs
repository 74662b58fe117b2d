//! Registration model for cqrsgen.
//!
//! A service is declared as a module path, a type name and its public
//! methods. [`Registry`] classifies those methods into assets:
//!
//! - every method of a command service becomes a [`Command`],
//! - every method of a query service becomes a [`Query`],
//! - the `on_<event>(ctx, &Event) -> error` handlers of one service are
//!   grouped into the single [`Mutation`].
//!
//! ```rust
//! use cqrsgen_core::{MethodDecl, Registry, ServiceDecl};
//!
//! # fn main() -> Result<(), cqrsgen_core::RegistryError> {
//! let mut registry = Registry::new();
//! registry.add_mutation(
//!     ServiceDecl::new("shop::mutations", "Orders").method(MethodDecl::new(
//!         "on_order_placed",
//!         vec!["ctx".parse()?, "&shop::events::OrderPlaced".parse()?],
//!         vec!["error".parse()?],
//!     )),
//! )?;
//! assert_eq!(registry.mutation().unwrap().event_names(), vec!["OrderPlaced"]);
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod error;
pub mod method;
pub mod mutation;
pub mod registry;
pub mod types;

pub use asset::{Artifacts, Asset, AssetKind, AssetSource};
pub use error::RegistryError;
pub use method::{Command, Method, MethodDecl, Query, ServiceDecl};
pub use mutation::{Mutation, classify_handler, is_event_handler};
pub use registry::{FunctionDecl, Registry};
pub use types::{ServiceRef, TypeRef, content_key, snake_case};
