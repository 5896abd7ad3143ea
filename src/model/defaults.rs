//! Property defaults applied after hydration.

use std::fmt;
use std::rc::Rc;

use super::Value;
use crate::orm::Instance;

/// Computes a default from the already hydrated instance.
pub type DefaultFn = Rc<dyn Fn(&Instance) -> Value>;

/// A default for one property.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Computed(DefaultFn),
}

impl DefaultValue {
    pub fn resolve(&self, instance: &Instance) -> Value {
        match self {
            DefaultValue::Value(v) => v.clone(),
            DefaultValue::Computed(f) => f(instance),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Declared defaults of a model, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Defaults {
    entries: Vec<(String, DefaultValue)>,
}

impl Defaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, property: &str, value: impl Into<Value>) -> &mut Self {
        self.entries
            .push((property.to_string(), DefaultValue::Value(value.into())));
        self
    }

    pub fn add_computed(
        &mut self,
        property: &str,
        f: impl Fn(&Instance) -> Value + 'static,
    ) -> &mut Self {
        self.entries
            .push((property.to_string(), DefaultValue::Computed(Rc::new(f))));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DefaultValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
