//! Runtime type descriptors and the resolution traits
//!
//! Rust has no runtime reflection, so every type taking part in resolution implements
//! [Resolvable]. The trait tells the [Container] what kind of type it is dealing with and
//! how to build the structural default when nothing is bound for it.
//!
//! * A [TypeKey] is the erased, comparable form of a [Resolvable] type. It is the sole key
//!   of the binding map and carries the per-type operations needed once generics are gone.
//! * A [Value] is any `Clone + 'static` value stored behind a `Box<dyn Value>`.
//! * The [Provide] trait indicates that a struct can produce values of the target type on demand.

use std::any::{type_name, Any, TypeId};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};

use thiserror::Error;
use tracing::{error, warn};

use crate::{Container, Ptr};

/// Errors triggered while wiring the container
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WiringError {
    #[error("{from} cannot be converted to {to}")]
    IncompatibleBinding {
        from: &'static str,
        to: &'static str,
    },
    #[error("{0} is not an interface type")]
    NotAnInterface(&'static str),
    #[error("{0} is not callable")]
    InvalidCallable(&'static str),
}

/// Coarse classification of a resolvable type, driving the structural fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Primitive,
    Struct,
    Pointer,
    Interface,
    Sequence,
    Map,
    Channel,
    Array,
    Function,
}

/// A type-erased value which can be cloned into a new box
pub trait Value: Any {
    fn clone_value(&self) -> Box<dyn Value>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Clone> Value for T {
    fn clone_value(&self) -> Box<dyn Value> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

impl fmt::Debug for dyn Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value<{}>", self.type_name())
    }
}

/// A resolved value, remembering whether the resolver built it in place.
///
/// Only addressable values can be wrapped into a fresh [Ptr] when a pointer to them is requested.
#[derive(Debug)]
pub struct Resolved<T> {
    pub value: T,
    pub addressable: bool,
}

impl<T> Resolved<T> {
    /// A value handed out from a binding: a pointer to it cannot be synthesized
    pub fn new(value: T) -> Self {
        Self {
            value,
            addressable: false,
        }
    }

    /// A value built in place by the resolver
    pub fn addressable(value: T) -> Self {
        Self {
            value,
            addressable: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        Resolved {
            value: f(self.value),
            addressable: self.addressable,
        }
    }
}

impl<T: Value> Resolved<T> {
    pub(crate) fn boxed(self) -> Resolved<Box<dyn Value>> {
        self.map(|v| Box::new(v) as Box<dyn Value>)
    }
}

/// A type which can be produced by the [Container].
///
/// Implementations are provided for primitives, standard collections, [Ptr], [crate::Iface],
/// [crate::Chan] and [crate::Func]. Structs opt in with [crate::injectable].
pub trait Resolvable: Any + Clone {
    fn kind() -> Kind;

    /// Build a value when nothing is bound for this type.
    ///
    /// This covers the structural part of the fallback chain: synthesizing pointers,
    /// injecting fresh structs, creating empty collections and zero values.
    fn construct(container: &Container) -> Resolved<Self>;

    /// Inject the fields of this value, if any
    fn inject_into(&mut self, _container: &Container) {}

    /// Check if values of the source type can be bound as this type
    fn accepts(source: TypeId) -> bool {
        source == TypeId::of::<Self>()
    }

    /// Convert a value of an accepted type into this type
    fn convert(value: Box<dyn Any>) -> Result<Self, Box<dyn Any>> {
        value.downcast::<Self>().map(|v| *v)
    }

    /// The pointee of a pointer type
    fn element() -> Option<TypeKey> {
        None
    }
}

/// Erased descriptor of a [Resolvable] type.
///
/// Two keys are equal iff they describe the same type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
    kind: Kind,
    construct: fn(&Container) -> Resolved<Box<dyn Value>>,
    accepts: fn(TypeId) -> bool,
    convert: fn(Box<dyn Any>) -> Result<Box<dyn Value>, Box<dyn Any>>,
    element: fn() -> Option<TypeKey>,
}

impl TypeKey {
    pub fn of<T: Resolvable>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            kind: T::kind(),
            construct: fallback::<T>,
            accepts: T::accepts,
            convert: convert_into::<T>,
            element: T::element,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// The pointee key if this is a pointer type
    pub fn element(&self) -> Option<TypeKey> {
        (self.element)()
    }

    pub fn accepts(&self, source: TypeId) -> bool {
        (self.accepts)(source)
    }

    pub(crate) fn construct(&self, container: &Container) -> Resolved<Box<dyn Value>> {
        (self.construct)(container)
    }

    pub(crate) fn convert(&self, value: Box<dyn Any>) -> Result<Box<dyn Value>, Box<dyn Any>> {
        (self.convert)(value)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Turn an interface marker into the key of the interface type.
///
/// Any number of [Ptr] levels around the interface are stripped, so both
/// `Iface<dyn Bar>` and `Ptr<Iface<dyn Bar>>` designate the `dyn Bar` interface.
pub fn interface_of(marker: TypeKey) -> Result<TypeKey, WiringError> {
    let mut key = marker;
    while key.kind == Kind::Pointer {
        match key.element() {
            Some(element) => key = element,
            None => break,
        }
    }
    if key.kind != Kind::Interface {
        return Err(WiringError::NotAnInterface(marker.name));
    }
    Ok(key)
}

/// Structural part of the fallback chain, reached when no binding and no parent were found.
///
/// A registered pointer wins over anything synthesized for its pointee.
fn fallback<T: Resolvable>(container: &Container) -> Resolved<Box<dyn Value>> {
    if let Some(bound) = container.resolve_bound(TypeId::of::<Ptr<T>>()) {
        match bound.value.into_any().downcast::<Ptr<T>>() {
            Ok(ptr) => match ptr.try_get() {
                Ok(Some(value)) => return Resolved::addressable(value).boxed(),
                Ok(None) => warn!(
                    ty = type_name::<T>(),
                    "bound pointer is null, using the structural default"
                ),
                // the pointee is being injected further up the stack
                Err(_) => warn!(
                    ty = type_name::<T>(),
                    "bound pointee is already borrowed, using the structural default"
                ),
            },
            Err(_) => error!(ty = type_name::<T>(), "bound pointer has the wrong type"),
        }
    }
    T::construct(container).boxed()
}

fn convert_into<T: Resolvable>(value: Box<dyn Any>) -> Result<Box<dyn Value>, Box<dyn Any>> {
    T::convert(value).map(|v| Box::new(v) as Box<dyn Value>)
}

/// Provide an instance of a given type on demand.
///
/// The container hands itself to the provider so that it can resolve its own dependencies.
pub trait Provide<T> {
    fn provide(&self, container: &Container) -> T;
}

impl<T, F: Fn(&Container) -> T> Provide<T> for F {
    fn provide(&self, container: &Container) -> T {
        self(container)
    }
}

macro_rules! zero_default ({ $kind:ident: $($ty:ty),* } => {
    $(
    impl Resolvable for $ty {
        fn kind() -> Kind {
            Kind::$kind
        }

        fn construct(_container: &Container) -> Resolved<Self> {
            Resolved::addressable(<$ty>::default())
        }
    }
    )*
});

zero_default! { Primitive: (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, String }

impl<T: Clone + 'static> Resolvable for Vec<T> {
    fn kind() -> Kind {
        Kind::Sequence
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::new(Vec::new())
    }
}

impl<T: Clone + 'static> Resolvable for VecDeque<T> {
    fn kind() -> Kind {
        Kind::Sequence
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::new(VecDeque::new())
    }
}

impl<K: Eq + Hash + Clone + 'static, V: Clone + 'static> Resolvable for HashMap<K, V> {
    fn kind() -> Kind {
        Kind::Map
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::new(HashMap::new())
    }
}

impl<K: Ord + Clone + 'static, V: Clone + 'static> Resolvable for BTreeMap<K, V> {
    fn kind() -> Kind {
        Kind::Map
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::new(BTreeMap::new())
    }
}

impl<T: Default + Clone + 'static, const N: usize> Resolvable for [T; N] {
    fn kind() -> Kind {
        Kind::Array
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::addressable(std::array::from_fn(|_| T::default()))
    }
}
