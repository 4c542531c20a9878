//! Resource namespaces.
//!
//! A namespace partitions resources: two items with the same type, name and
//! configuration never merge or shadow each other unless they also share a
//! namespace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// XML namespace URI prefix used by library packages.
const PACKAGE_URI_PREFIX: &str = "http://schemas.android.com/apk/res/";

/// Namespace under which resource names are unique.
///
/// # Example
///
/// ```
/// use resourcetree::resource::ResourceNamespace;
///
/// let ns: ResourceNamespace = "com.example.lib".parse().unwrap();
/// assert_eq!(ns, ResourceNamespace::package("com.example.lib"));
/// assert_eq!("res-auto".parse::<ResourceNamespace>().unwrap(), ResourceNamespace::Res);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceNamespace {
    /// The application/module namespace (`res-auto`).
    Res,
    /// The framework namespace (`android`).
    Android,
    /// A library package namespace.
    Package(String),
}

impl ResourceNamespace {
    /// Create a package namespace.
    pub fn package(name: impl Into<String>) -> Self {
        ResourceNamespace::Package(name.into())
    }

    /// The package name, if this is a package namespace.
    pub fn package_name(&self) -> Option<&str> {
        match self {
            ResourceNamespace::Package(name) => Some(name),
            _ => None,
        }
    }

    /// XML namespace URI for this namespace.
    pub fn xml_namespace_uri(&self) -> String {
        match self {
            ResourceNamespace::Res => "http://schemas.android.com/apk/res-auto".to_string(),
            ResourceNamespace::Android => format!("{}android", PACKAGE_URI_PREFIX),
            ResourceNamespace::Package(name) => format!("{}{}", PACKAGE_URI_PREFIX, name),
        }
    }
}

impl fmt::Display for ResourceNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceNamespace::Res => write!(f, "res-auto"),
            ResourceNamespace::Android => write!(f, "android"),
            ResourceNamespace::Package(name) => write!(f, "{}", name),
        }
    }
}

/// Error parsing a namespace string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resource namespace: '{0}'")]
pub struct NamespaceParseError(pub String);

impl FromStr for ResourceNamespace {
    type Err = NamespaceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "res-auto" | "" => Ok(ResourceNamespace::Res),
            "android" => Ok(ResourceNamespace::Android),
            _ => {
                let valid = s.split('.').all(|part| {
                    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                });
                if valid {
                    Ok(ResourceNamespace::Package(s.to_string()))
                } else {
                    Err(NamespaceParseError(s.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_known() {
        assert_eq!("res-auto".parse::<ResourceNamespace>().unwrap(), ResourceNamespace::Res);
        assert_eq!("android".parse::<ResourceNamespace>().unwrap(), ResourceNamespace::Android);
    }

    #[test]
    fn test_parse_package() {
        let ns: ResourceNamespace = "com.example.lib".parse().unwrap();
        assert_eq!(ns.package_name(), Some("com.example.lib"));
        assert_eq!(ns.to_string(), "com.example.lib");
    }

    #[test]
    fn test_parse_invalid() {
        assert!("com..lib".parse::<ResourceNamespace>().is_err());
        assert!("com.ex ample".parse::<ResourceNamespace>().is_err());
    }

    #[test]
    fn test_xml_namespace_uri() {
        assert_eq!(
            ResourceNamespace::Android.xml_namespace_uri(),
            "http://schemas.android.com/apk/res/android"
        );
        assert_eq!(
            ResourceNamespace::package("com.foo").xml_namespace_uri(),
            "http://schemas.android.com/apk/res/com.foo"
        );
    }
}
