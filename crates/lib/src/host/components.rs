//! Typed component lookup.
//!
//! A hosted application may publish objects into a [`ComponentRegistry`] so
//! embedding code and tests can reach them by name or by type. Lookups never
//! fail with an error; they report [`Lookup::NotFound`] or
//! [`Lookup::TypeMismatch`] instead.

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Outcome of a typed lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
  Found(T),
  NotFound,
  TypeMismatch {
    expected: &'static str,
    found: &'static str,
  },
}

impl<T> Lookup<T> {
  pub fn found(self) -> Option<T> {
    match self {
      Lookup::Found(value) => Some(value),
      _ => None,
    }
  }
}

#[derive(Clone)]
struct Component {
  value: Arc<dyn Any + Send + Sync>,
  type_name: &'static str,
}

/// Named, type-erased components.
#[derive(Default)]
pub struct ComponentRegistry {
  components: RwLock<BTreeMap<String, Component>>,
}

impl ComponentRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `value` under `name`, replacing any previous component.
  pub fn register<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
    let component = Component {
      value: Arc::new(value),
      type_name: type_name::<T>(),
    };
    self
      .components
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(name.into(), component);
  }

  pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Lookup<Arc<T>> {
    let components = self.components.read().unwrap_or_else(|e| e.into_inner());
    let Some(component) = components.get(name) else {
      return Lookup::NotFound;
    };
    match Arc::clone(&component.value).downcast::<T>() {
      Ok(value) => Lookup::Found(value),
      Err(_) => Lookup::TypeMismatch {
        expected: type_name::<T>(),
        found: component.type_name,
      },
    }
  }

  /// Every component of type `T`, by name.
  pub fn of_type<T: Any + Send + Sync>(&self) -> Vec<(String, Arc<T>)> {
    let components = self.components.read().unwrap_or_else(|e| e.into_inner());
    components
      .iter()
      .filter_map(|(name, c)| Arc::clone(&c.value).downcast::<T>().ok().map(|v| (name.clone(), v)))
      .collect()
  }

  pub fn names(&self) -> Vec<String> {
    self.components.read().unwrap_or_else(|e| e.into_inner()).keys().cloned().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, PartialEq)]
  struct Port(u16);

  #[test]
  fn lookup_by_name_and_type() {
    let registry = ComponentRegistry::new();
    registry.register("http", Port(8080));
    registry.register("admin", Port(9090));
    registry.register("greeting", String::from("hello"));

    assert_eq!(registry.get::<Port>("http").found().unwrap().0, 8080);
    assert_eq!(registry.get::<Port>("missing"), Lookup::NotFound);
    assert!(matches!(
      registry.get::<Port>("greeting"),
      Lookup::TypeMismatch { found, .. } if found.contains("String")
    ));

    let ports: Vec<u16> = registry.of_type::<Port>().into_iter().map(|(_, p)| p.0).collect();
    assert_eq!(ports, vec![9090, 8080]);
  }
}
