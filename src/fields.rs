//! Field descriptors for struct injection
//!
//! Structs declare their fields up front, usually through the [crate::injectable] macro.
//! Only marked fields are described. Of those, the fields which are both visible (`pub`)
//! and marked with `#[inject]` receive values.

use std::fmt;

use tracing::trace;

use crate::{Container, TypeKey};

/// Marker selecting the fields to inject
pub const INJECT_MARKER: &str = "inject";

/// Descriptor of a struct field
pub struct Field<S> {
    name: &'static str,
    key: TypeKey,
    marker: &'static str,
    exported: bool,
    assign: fn(&mut S, &Container),
}

impl<S> Field<S> {
    pub fn new(
        name: &'static str,
        key: TypeKey,
        marker: &'static str,
        exported: bool,
        assign: fn(&mut S, &Container),
    ) -> Self {
        Self {
            name,
            key,
            marker,
            exported,
            assign,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn marker(&self) -> &'static str {
        self.marker
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn is_injectable(&self) -> bool {
        self.exported && self.marker == INJECT_MARKER
    }

    /// Resolve a value for the field and store it in the target
    pub fn assign(&self, target: &mut S, container: &Container) {
        (self.assign)(target, container)
    }
}

impl<S> fmt::Debug for Field<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("marker", &self.marker)
            .field("exported", &self.exported)
            .finish()
    }
}

/// A struct with a table of field descriptors
pub trait Inject: Sized + 'static {
    fn fields() -> Vec<Field<Self>>;

    /// Set every injectable field to a freshly resolved value.
    ///
    /// Other fields keep their current value.
    fn inject_fields(&mut self, container: &Container) {
        for field in Self::fields() {
            if !field.is_injectable() {
                continue;
            }
            trace!(field = field.name, ty = field.key.name(), "injecting field");
            field.assign(self, container);
        }
    }
}
