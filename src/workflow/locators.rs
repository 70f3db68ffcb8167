//! Locator packs
//!
//! A locator pack maps logical element keys (`projects.create_button`) to an
//! ordered list of resolution strategies grouped into tiers. Packs are
//! supplied by adapters or YAML files and never appear inline in workflow
//! text.
//!
//! ```yaml
//! create_button:
//!   primary: { test_id: create-project }
//!   secondary:
//!     - { role: { role: button, name: Create } }
//!     - { attribute: { name: name, value: create } }
//!   tertiary: { text: "Create project" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One way of addressing an element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Dedicated test identifier attribute (`data-testid`)
    TestId(String),
    /// Raw CSS query, allowed in packs only
    Css(String),
    /// ARIA role with optional accessible name
    Role {
        role: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// Form control by associated label text
    Label(String),
    /// `name` attribute
    Name(String),
    Placeholder(String),
    Attribute { name: String, value: String },
    /// Visible text content
    Text(String),
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::TestId(id) => write!(f, "test_id={}", id),
            Strategy::Css(css) => write!(f, "css={}", css),
            Strategy::Role { role, name: Some(name) } => write!(f, "role={}[name={}]", role, name),
            Strategy::Role { role, name: None } => write!(f, "role={}", role),
            Strategy::Label(label) => write!(f, "label={}", label),
            Strategy::Name(name) => write!(f, "name={}", name),
            Strategy::Placeholder(p) => write!(f, "placeholder={}", p),
            Strategy::Attribute { name, value } => write!(f, "[{}={}]", name, value),
            Strategy::Text(text) => write!(f, "text={}", text),
        }
    }
}

/// Resolution tier, ordered from most to least stable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Primary,
    Secondary,
    Tertiary,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Primary => f.write_str("primary"),
            Tier::Secondary => f.write_str("secondary"),
            Tier::Tertiary => f.write_str("tertiary"),
        }
    }
}

/// Tiered strategies for one logical element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatorSpec {
    #[serde(default)]
    pub primary: Option<Strategy>,

    /// Tried in declaration order, first success wins
    #[serde(default)]
    pub secondary: Vec<Strategy>,

    #[serde(default)]
    pub tertiary: Option<Strategy>,
}

impl LocatorSpec {
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.secondary.is_empty() && self.tertiary.is_none()
    }

    /// Tiers that have at least one strategy declared, in resolution order
    pub fn declared_tiers(&self) -> Vec<Tier> {
        let mut tiers = Vec::new();
        if self.primary.is_some() {
            tiers.push(Tier::Primary);
        }
        if !self.secondary.is_empty() {
            tiers.push(Tier::Secondary);
        }
        if self.tertiary.is_some() {
            tiers.push(Tier::Tertiary);
        }
        tiers
    }
}

/// A named collection of locator specs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocatorPack {
    pub id: String,

    #[serde(default)]
    pub elements: HashMap<String, LocatorSpec>,
}

impl LocatorPack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            elements: HashMap::new(),
        }
    }

    pub fn with_element(mut self, key: impl Into<String>, spec: LocatorSpec) -> Self {
        self.elements.insert(key.into(), spec);
        self
    }

    pub fn get(&self, key: &str) -> Option<&LocatorSpec> {
        self.elements.get(key)
    }

    /// Merge another pack's elements into this one; later entries win
    pub fn merge(&mut self, other: LocatorPack) {
        self.elements.extend(other.elements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_spec() {
        let yaml = r#"
primary: { test_id: create-project }
secondary:
  - { role: { role: button, name: Create } }
  - { name: create }
tertiary: { text: "Create project" }
"#;
        let spec: LocatorSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.primary, Some(Strategy::TestId("create-project".into())));
        assert_eq!(spec.secondary.len(), 2);
        assert_eq!(
            spec.secondary[0],
            Strategy::Role {
                role: "button".into(),
                name: Some("Create".into())
            }
        );
        assert_eq!(spec.tertiary, Some(Strategy::Text("Create project".into())));
        assert_eq!(
            spec.declared_tiers(),
            vec![Tier::Primary, Tier::Secondary, Tier::Tertiary]
        );
    }

    #[test]
    fn test_declared_tiers_partial() {
        let spec = LocatorSpec {
            primary: None,
            secondary: vec![Strategy::Label("Name".into())],
            tertiary: None,
        };
        assert_eq!(spec.declared_tiers(), vec![Tier::Secondary]);
        assert!(!spec.is_empty());
        assert!(LocatorSpec::default().is_empty());
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::TestId("x".into()).to_string(), "test_id=x");
        assert_eq!(
            Strategy::Attribute {
                name: "name".into(),
                value: "q".into()
            }
            .to_string(),
            "[name=q]"
        );
    }

    #[test]
    fn test_pack_merge() {
        let mut pack = LocatorPack::new("acme").with_element("a", LocatorSpec::default());
        let other = LocatorPack::new("acme").with_element(
            "b",
            LocatorSpec {
                tertiary: Some(Strategy::Text("B".into())),
                ..Default::default()
            },
        );
        pack.merge(other);
        assert!(pack.get("a").is_some());
        assert!(pack.get("b").is_some());
    }
}
