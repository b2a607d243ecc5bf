//! Symbol Classes
//!
//! Polling cadence, freshness window and push availability are configured
//! per class of symbol. A symbol is matched against prefix/suffix rules in
//! declaration order; unmatched symbols fall into the default class.

use std::collections::BTreeMap;
use std::time::Duration;

use super::quote::Symbol;

/// Name of the class every unmatched symbol falls into.
pub const DEFAULT_CLASS: &str = "default";

/// Polling and freshness parameters for one class of symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolClass {
    /// Class name, used as a metric label.
    pub name: String,
    /// Interval between snapshot polls.
    pub poll_interval: Duration,
    /// Day-range parameter passed to the snapshot source.
    pub range: String,
    /// How long a push observation stays authoritative.
    pub freshness_window: Duration,
    /// Whether the push source carries these symbols.
    pub push_enabled: bool,
}

impl SymbolClass {
    /// Create a class whose freshness window equals its polling interval.
    #[must_use]
    pub fn new(name: impl Into<String>, poll_interval: Duration, push_enabled: bool) -> Self {
        Self {
            name: name.into(),
            poll_interval,
            range: "1d".to_string(),
            freshness_window: poll_interval,
            push_enabled,
        }
    }

    /// Override the freshness window.
    #[must_use]
    pub const fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Override the snapshot range parameter.
    #[must_use]
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }
}

/// How a symbol is matched to a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// Symbol starts with the given text.
    Prefix(String),
    /// Symbol ends with the given text.
    Suffix(String),
}

impl MatchRule {
    fn matches(&self, symbol: &str) -> bool {
        match self {
            Self::Prefix(prefix) => symbol.starts_with(prefix.as_str()),
            Self::Suffix(suffix) => symbol.ends_with(suffix.as_str()),
        }
    }
}

/// Configuration map from class name to [`SymbolClass`].
#[derive(Debug, Clone)]
pub struct SymbolClassMap {
    classes: BTreeMap<String, SymbolClass>,
    rules: Vec<(MatchRule, String)>,
}

impl SymbolClassMap {
    /// Create a map containing only the given default class.
    ///
    /// The class is stored under [`DEFAULT_CLASS`] regardless of its name.
    #[must_use]
    pub fn new(default: SymbolClass) -> Self {
        let default = SymbolClass {
            name: DEFAULT_CLASS.to_string(),
            ..default
        };
        let mut classes = BTreeMap::new();
        classes.insert(DEFAULT_CLASS.to_string(), default);

        Self {
            classes,
            rules: Vec::new(),
        }
    }

    /// Standard layout: `crypto` (suffix `USDT`), `index` (prefix `^`,
    /// snapshot only) and `default`.
    #[must_use]
    pub fn standard(crypto_poll: Duration, default_poll: Duration, index_poll: Duration) -> Self {
        Self::new(SymbolClass::new(DEFAULT_CLASS, default_poll, true))
            .with_class(
                SymbolClass::new("crypto", crypto_poll, true),
                MatchRule::Suffix("USDT".to_string()),
            )
            .with_class(
                SymbolClass::new("index", index_poll, false),
                MatchRule::Prefix("^".to_string()),
            )
    }

    /// Register a class and the rule that selects it.
    #[must_use]
    pub fn with_class(mut self, class: SymbolClass, rule: MatchRule) -> Self {
        self.rules.push((rule, class.name.clone()));
        self.classes.insert(class.name.clone(), class);
        self
    }

    /// Resolve the class for a symbol.
    #[must_use]
    pub fn resolve(&self, symbol: &Symbol) -> &SymbolClass {
        self.rules
            .iter()
            .find(|(rule, _)| rule.matches(symbol.as_str()))
            .and_then(|(_, name)| self.classes.get(name))
            .unwrap_or_else(|| self.default_class())
    }

    /// Look up a class by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SymbolClass> {
        self.classes.get(name)
    }

    /// The fallback class.
    #[must_use]
    pub fn default_class(&self) -> &SymbolClass {
        // `new` always inserts the default entry and it is never removed.
        &self.classes[DEFAULT_CLASS]
    }

    /// Iterate over all classes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &SymbolClass> {
        self.classes.values()
    }

    /// Raise every poll interval to at least `floor`.
    #[must_use]
    pub fn with_min_poll_interval(mut self, floor: Duration) -> Self {
        for class in self.classes.values_mut() {
            class.poll_interval = class.poll_interval.max(floor);
        }
        self
    }
}

impl Default for SymbolClassMap {
    fn default() -> Self {
        Self::standard(
            Duration::from_secs(3),
            Duration::from_secs(15),
            Duration::from_secs(15),
        )
    }
}
