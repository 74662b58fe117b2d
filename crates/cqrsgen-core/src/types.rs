use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::RegistryError;

/// A declared type in a handler signature.
///
/// Text form, as written in `cqrsgen.toml`:
///
/// | text                         | descriptor                                   |
/// |------------------------------|----------------------------------------------|
/// | `ctx` / `Context`            | [`TypeRef::Context`]                         |
/// | `error` / `Error`            | [`TypeRef::Error`]                           |
/// | `&shop::events::OrderPlaced` | `Ref(Named { module: "shop::events", .. })`  |
/// | `String`                     | `Named { module: "", name: "String" }`       |
/// | `Vec<shop::model::Order>`    | `Generic { name: "Vec", args: [..], .. }`    |
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRef {
    /// The per-invocation context handed to every handler.
    Context,
    /// An error-like result.
    Error,
    Named { module: String, name: String },
    /// A path with type arguments, e.g. `Option<shop::model::Order>`.
    Generic {
        module: String,
        name: String,
        args: Vec<TypeRef>,
    },
    /// A borrow of the inner type.
    Ref(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Named {
            module: module.into(),
            name: name.into(),
        }
    }

    pub fn borrowed(inner: TypeRef) -> Self {
        Self::Ref(Box::new(inner))
    }

    pub fn generic(module: impl Into<String>, name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        Self::Generic {
            module: module.into(),
            name: name.into(),
            args,
        }
    }

    /// Module the type originates from; empty for context, error and prelude types.
    pub fn module(&self) -> &str {
        match self {
            Self::Named { module, .. } | Self::Generic { module, .. } => module,
            Self::Ref(inner) => inner.module(),
            Self::Context | Self::Error => "",
        }
    }

    /// Every non-empty module the type mentions, type arguments included.
    pub fn modules(&self) -> BTreeSet<&str> {
        let mut modules = BTreeSet::new();
        self.collect_modules(&mut modules);
        modules
    }

    fn collect_modules<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Named { module, .. } if !module.is_empty() => {
                out.insert(module);
            }
            Self::Generic { module, args, .. } => {
                if !module.is_empty() {
                    out.insert(module);
                }
                for arg in args {
                    arg.collect_modules(out);
                }
            }
            Self::Ref(inner) => inner.collect_modules(out),
            _ => {}
        }
    }

    /// The type's own name, looking through borrows.
    pub fn name(&self) -> &str {
        match self {
            Self::Named { name, .. } | Self::Generic { name, .. } => name,
            Self::Ref(inner) => inner.name(),
            Self::Context => "Context",
            Self::Error => "Error",
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context)
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    pub fn is_error_like(&self) -> bool {
        match self {
            Self::Error => true,
            Self::Named { name, .. } => name.ends_with("Error"),
            Self::Context | Self::Generic { .. } | Self::Ref(_) => false,
        }
    }

    /// The type as written in generated source, relative to its imported module.
    pub fn rust(&self) -> String {
        match self {
            Self::Context => "Context".into(),
            Self::Error => "Error".into(),
            Self::Named { module, name } => relative_path(module, name),
            Self::Generic { module, name, args } => {
                let args: Vec<String> = args.iter().map(TypeRef::rust).collect();
                format!("{}<{}>", relative_path(module, name), args.join(", "))
            }
            Self::Ref(inner) => format!("&{}", inner.rust()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => f.write_str("ctx"),
            Self::Error => f.write_str("error"),
            Self::Named { module, name } if module.is_empty() => f.write_str(name),
            Self::Named { module, name } => write!(f, "{module}::{name}"),
            Self::Generic { module, name, args } => {
                if !module.is_empty() {
                    write!(f, "{module}::")?;
                }
                write!(f, "{name}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            Self::Ref(inner) => write!(f, "&{inner}"),
        }
    }
}

impl FromStr for TypeRef {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if let Some(inner) = text.strip_prefix('&') {
            return Ok(Self::borrowed(inner.parse()?));
        }
        match text {
            "ctx" | "Context" => return Ok(Self::Context),
            "error" | "Error" => return Ok(Self::Error),
            _ => {}
        }

        let invalid = || RegistryError::InvalidType(s.to_string());
        let Some(open) = text.find('<') else {
            let (module, name) = split_path(text).ok_or_else(invalid)?;
            return Ok(Self::named(module, name));
        };

        let (module, name) = split_path(&text[..open]).ok_or_else(invalid)?;
        let inner = text[open + 1..].strip_suffix('>').ok_or_else(invalid)?;
        let args = split_args(inner)
            .ok_or_else(invalid)?
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<TypeRef>, _>>()
            .map_err(|_| invalid())?;
        Ok(Self::generic(module, name, args))
    }
}

/// `shop::model::Order` -> (`shop::model`, `Order`).
fn split_path(text: &str) -> Option<(String, &str)> {
    let segments: Vec<&str> = text.trim().split("::").collect();
    if !segments.iter().all(|s| is_ident(s)) {
        return None;
    }
    let (name, module) = segments.split_last()?;
    Some((module.join("::"), *name))
}

/// Split a type argument list on its top-level commas.
fn split_args(text: &str) -> Option<Vec<&str>> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                args.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    args.push(&text[start..]);
    Some(args)
}

impl TryFrom<String> for TypeRef {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, RegistryError> {
        value.parse()
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

/// The user's service type: `module::name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRef {
    pub module: String,
    pub name: String,
}

impl ServiceRef {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Identifier generated code uses to reach the service's module.
    pub fn package_name(&self) -> &str {
        last_segment(&self.module).unwrap_or(&self.name)
    }

    /// Crate the service lives in.
    pub fn crate_name(&self) -> &str {
        self.module.split("::").next().unwrap_or_default()
    }

    pub fn path(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }

    pub fn rust(&self) -> String {
        TypeRef::named(&self.module, &self.name).rust()
    }
}

/// Stable asset identity: SHA-256 hex of `<module>.<name>`.
pub fn content_key(module: &str, name: &str) -> String {
    hex::encode(Sha256::digest(format!("{module}.{name}").as_bytes()))
}

/// `OrderPlaced` -> `order_placed`, `HTTPRequest` -> `http_request`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower)
                {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn relative_path(module: &str, name: &str) -> String {
    match last_segment(module) {
        Some(package) => format!("{package}::{name}"),
        None => name.to_string(),
    }
}

fn last_segment(module: &str) -> Option<&str> {
    module.rsplit("::").next().filter(|s| !s.is_empty())
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_descriptors() {
        assert_eq!("ctx".parse::<TypeRef>().unwrap(), TypeRef::Context);
        assert_eq!("error".parse::<TypeRef>().unwrap(), TypeRef::Error);
        assert_eq!(
            "&shop::events::OrderPlaced".parse::<TypeRef>().unwrap(),
            TypeRef::borrowed(TypeRef::named("shop::events", "OrderPlaced"))
        );
        assert_eq!(
            "String".parse::<TypeRef>().unwrap(),
            TypeRef::named("", "String")
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!("shop::".parse::<TypeRef>().is_err());
        assert!("".parse::<TypeRef>().is_err());
        assert!("shop::1Event".parse::<TypeRef>().is_err());
        assert!("Vec<".parse::<TypeRef>().is_err());
        assert!("Vec<>".parse::<TypeRef>().is_err());
        assert!("Vec<u8>>".parse::<TypeRef>().is_err());
        assert!("HashMap<String,>".parse::<TypeRef>().is_err());
    }

    #[test]
    fn parses_generic_types() {
        assert_eq!(
            "Vec<shop::model::Order>".parse::<TypeRef>().unwrap(),
            TypeRef::generic("", "Vec", vec![TypeRef::named("shop::model", "Order")])
        );
        assert_eq!(
            "Option<shop::model::Order>".parse::<TypeRef>().unwrap().rust(),
            "Option<model::Order>"
        );

        let map: TypeRef = "std::collections::HashMap<String, Vec<shop::model::Tag>>"
            .parse()
            .unwrap();
        assert_eq!(map.name(), "HashMap");
        assert_eq!(map.rust(), "collections::HashMap<String, Vec<model::Tag>>");
        assert_eq!(
            map.modules().into_iter().collect::<Vec<_>>(),
            vec!["shop::model", "std::collections"]
        );
        assert!(!map.is_error_like());

        let borrowed: TypeRef = "&Vec<u8>".parse().unwrap();
        assert!(borrowed.is_ref());
        assert_eq!(borrowed.rust(), "&Vec<u8>");
        assert!(borrowed.modules().is_empty());
    }

    #[test]
    fn display_round_trips_text_form() {
        for text in [
            "ctx",
            "error",
            "&shop::events::OrderPlaced",
            "u64",
            "shop::Order",
            "Vec<shop::Order>",
            "std::collections::HashMap<String, Option<u64>>",
        ] {
            let parsed: TypeRef = text.parse().unwrap();
            assert_eq!(parsed.to_string(), text);
        }
    }

    #[test]
    fn renders_relative_to_imported_module() {
        let event: TypeRef = "&shop::events::OrderPlaced".parse().unwrap();
        assert_eq!(event.rust(), "&events::OrderPlaced");
        assert_eq!(event.module(), "shop::events");
        assert_eq!(event.name(), "OrderPlaced");
        assert_eq!(TypeRef::named("", "String").rust(), "String");
    }

    #[test]
    fn error_like_types() {
        assert!(TypeRef::Error.is_error_like());
        assert!(TypeRef::named("shop", "CommandError").is_error_like());
        assert!(!TypeRef::named("shop", "Order").is_error_like());
        assert!(!TypeRef::borrowed(TypeRef::Error).is_error_like());
    }

    #[test]
    fn service_ref_names() {
        let svc = ServiceRef::new("shop::mutations", "Mutation");
        assert_eq!(svc.package_name(), "mutations");
        assert_eq!(svc.crate_name(), "shop");
        assert_eq!(svc.path(), "shop::mutations::Mutation");
        assert_eq!(svc.rust(), "mutations::Mutation");
    }

    #[test]
    fn content_key_is_stable() {
        let a = content_key("shop::commands", "place_order");
        assert_eq!(a, content_key("shop::commands", "place_order"));
        assert_ne!(a, content_key("shop::commands", "cancel_order"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn snake_cases_event_names() {
        assert_eq!(snake_case("OrderPlaced"), "order_placed");
        assert_eq!(snake_case("Event1"), "event1");
        assert_eq!(snake_case("HTTPRequest"), "http_request");
        assert_eq!(snake_case("Foo"), "foo");
    }
}
