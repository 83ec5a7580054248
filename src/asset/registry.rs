use std::collections::HashMap;

use super::Handle;
use crate::error::{RenderError, Result};

/// Append-only store of named items addressed by [`Handle`].
///
/// Used for shader programs, render stages, materials and textures. `kind`
/// only appears in error messages.
pub struct Registry<T> {
    kind: &'static str,
    items: Vec<T>,
    names: Vec<String>,
    by_name: HashMap<String, Handle<T>>,
}

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: Vec::new(),
            names: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Stores `item` under `name`. A later insert with the same name takes
    /// over the name lookup; the earlier handle stays valid.
    pub fn insert(&mut self, name: impl Into<String>, item: T) -> Handle<T> {
        let name = name.into();
        let handle = Handle::new(self.items.len());
        if self.by_name.insert(name.clone(), handle).is_some() {
            log::warn!("{} '{}' registered twice; name now refers to the newest", self.kind, name);
        }
        self.items.push(item);
        self.names.push(name);
        handle
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.items.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.items.get_mut(handle.index())
    }

    /// Like [`get`](Self::get) but reports an unknown handle as an error.
    pub fn fetch(&self, handle: Handle<T>) -> Result<&T> {
        let kind = self.kind;
        self.items
            .get(handle.index())
            .ok_or(RenderError::UnknownHandle {
                kind,
                index: handle.index(),
            })
    }

    pub fn fetch_mut(&mut self, handle: Handle<T>) -> Result<&mut T> {
        let kind = self.kind;
        self.items
            .get_mut(handle.index())
            .ok_or(RenderError::UnknownHandle {
                kind,
                index: handle.index(),
            })
    }

    pub fn handle_of(&self, name: &str) -> Result<Handle<T>> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| RenderError::NameNotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn name_of(&self, handle: Handle<T>) -> Option<&str> {
        self.names.get(handle.index()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (Handle::new(index), item))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(index, item)| (Handle::new(index), item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_lookup_returns_inserted_handle() {
        let mut registry = Registry::new("program");
        let a = registry.insert("a", 1u32);
        let b = registry.insert("b", 2u32);
        assert_eq!(registry.handle_of("a"), Ok(a));
        assert_eq!(registry.handle_of("b"), Ok(b));
        assert_eq!(registry.get(b), Some(&2));
        assert_eq!(registry.name_of(a), Some("a"));
    }

    #[test]
    fn lookup_miss_is_resource_error() {
        let registry: Registry<u32> = Registry::new("texture");
        let err = registry.handle_of("albedo").unwrap_err();
        assert_eq!(
            err,
            RenderError::NameNotFound {
                kind: "texture",
                name: "albedo".into()
            }
        );
        assert!(registry.fetch(Handle::new(0)).is_err());
    }
}
