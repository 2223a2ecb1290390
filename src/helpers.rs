use std::any::{Any, TypeId};
use std::cell::{BorrowError, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use crate::{Container, Kind, Resolvable, Resolved, TypeKey};

/// Nullable shared pointer to a mutable value.
///
/// Cloning a pointer shares the pointee: a registered `Ptr` hands out the same value on
/// every resolution, while a registered plain value is copied.
pub struct Ptr<T>(Option<Rc<RefCell<T>>>);

impl<T> Ptr<T> {
    pub fn new(value: T) -> Self {
        Self(Some(Rc::new(RefCell::new(value))))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn borrow(&self) -> Option<Ref<'_, T>> {
        self.0.as_ref().map(|cell| cell.borrow())
    }

    pub fn borrow_mut(&self) -> Option<RefMut<'_, T>> {
        self.0.as_ref().map(|cell| cell.borrow_mut())
    }

    /// Copy the pointee out
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.borrow().map(|v| v.clone())
    }

    /// Copy the pointee out, failing instead of panicking if it is mutably borrowed
    pub fn try_get(&self) -> Result<Option<T>, BorrowError>
    where
        T: Clone,
    {
        self.0
            .as_ref()
            .map(|cell| cell.try_borrow().map(|v| T::clone(&v)))
            .transpose()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Ptr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: fmt::Debug> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("Ptr(null)"),
            Some(cell) => match cell.try_borrow() {
                Ok(v) => f.debug_tuple("Ptr").field(&*v).finish(),
                Err(_) => f.write_str("Ptr(<borrowed>)"),
            },
        }
    }
}

impl<T: Resolvable> Resolvable for Ptr<T> {
    fn kind() -> Kind {
        Kind::Pointer
    }

    /// Point to a fresh pointee when the resolver built it in place, otherwise stay null
    fn construct(container: &Container) -> Resolved<Self> {
        let pointee = container.resolve_with::<T>();
        if pointee.addressable {
            Resolved::new(Ptr::new(pointee.value))
        } else {
            Resolved::addressable(Ptr::null())
        }
    }

    fn inject_into(&mut self, container: &Container) {
        let Some(cell) = &self.0 else {
            return;
        };
        match cell.try_borrow_mut() {
            Ok(mut pointee) => pointee.inject_into(container),
            Err(_) => warn!(
                ty = std::any::type_name::<T>(),
                "pointee is already borrowed, skipping injection"
            ),
        }
    }

    fn element() -> Option<TypeKey> {
        Some(TypeKey::of::<T>())
    }
}

/// A capability set: a trait object type with a runtime table of its implementations.
///
/// Implemented with the [crate::interface] macro, which lists the concrete types that
/// can be bound as the interface.
pub trait Interface: 'static {
    /// Check if the source type is a declared implementation
    fn implemented_by(source: TypeId) -> bool;

    /// Wrap a declared implementation into a shared trait object
    fn cast(value: Box<dyn Any>) -> Result<Rc<Self>, Box<dyn Any>>;
}

/// Nullable shared handle on an interface implementation
pub struct Iface<I: ?Sized>(Option<Rc<I>>);

impl<I: ?Sized> Iface<I> {
    pub fn new(inner: Rc<I>) -> Self {
        Self(Some(inner))
    }

    pub fn nil() -> Self {
        Self(None)
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&I> {
        self.0.as_deref()
    }

    pub fn as_rc(&self) -> Option<&Rc<I>> {
        self.0.as_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<I: ?Sized> Clone for Iface<I> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<I: ?Sized> Default for Iface<I> {
    fn default() -> Self {
        Self::nil()
    }
}

impl<I: ?Sized> fmt::Debug for Iface<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => write!(f, "Iface<{}>(nil)", std::any::type_name::<I>()),
            Some(_) => write!(f, "Iface<{}>", std::any::type_name::<I>()),
        }
    }
}

impl<I: ?Sized + Interface> Resolvable for Iface<I> {
    fn kind() -> Kind {
        Kind::Interface
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::addressable(Iface::nil())
    }

    fn accepts(source: TypeId) -> bool {
        source == TypeId::of::<Self>() || I::implemented_by(source)
    }

    fn convert(value: Box<dyn Any>) -> Result<Self, Box<dyn Any>> {
        let value = match value.downcast::<Self>() {
            Ok(iface) => return Ok(*iface),
            Err(value) => value,
        };
        I::cast(value).map(Iface::new)
    }
}

/// Nullable channel handle; clones share the same channel
pub struct Chan<T> {
    inner: Option<(Sender<T>, Receiver<T>)>,
}

impl<T> Chan<T> {
    /// A rendezvous channel: sends block until a receiver takes the message
    pub fn unbuffered() -> Self {
        Self::bounded(0)
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            inner: Some(crossbeam_channel::bounded(capacity)),
        }
    }

    pub fn nil() -> Self {
        Self { inner: None }
    }

    pub fn is_nil(&self) -> bool {
        self.inner.is_none()
    }

    pub fn sender(&self) -> Option<&Sender<T>> {
        self.inner.as_ref().map(|(tx, _)| tx)
    }

    pub fn receiver(&self) -> Option<&Receiver<T>> {
        self.inner.as_ref().map(|(_, rx)| rx)
    }

    /// Number of buffered messages, zero for a nil channel
    pub fn len(&self) -> usize {
        self.receiver().map_or(0, Receiver::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Chan<T> {
    fn default() -> Self {
        Self::nil()
    }
}

impl<T> fmt::Debug for Chan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => f.write_str("Chan(nil)"),
            Some((tx, _)) => write!(f, "Chan(len={})", tx.len()),
        }
    }
}

impl<T: 'static> Resolvable for Chan<T> {
    fn kind() -> Kind {
        Kind::Channel
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::new(Chan::unbuffered())
    }
}

/// Declare a trait object type as an interface and list its implementations.
///
/// Only the listed types can be registered as the interface with
/// [Container::register_as] or [Container::register_type_as].
///
/// ```
/// # use std::cell::Cell;
/// # use typewire::*;
/// trait Counter {
///     fn next(&self) -> u32;
/// }
///
/// #[derive(Clone, Default)]
/// struct Ticks(Cell<u32>);
///
/// impl Counter for Ticks {
///     fn next(&self) -> u32 {
///         self.0.set(self.0.get() + 1);
///         self.0.get()
///     }
/// }
///
/// interface!(dyn Counter = [Ticks]);
///
/// # fn main() -> Result<(), WiringError> {
/// let container = Container::new();
/// container.register_as(Ticks::default(), TypeKey::of::<Iface<dyn Counter>>())?;
/// let counter: Iface<dyn Counter> = container.make();
/// assert_eq!(counter.get().map(|c| c.next()), Some(1));
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! interface {
    ($Iface:ty = [$($Impl:ty),* $(,)?]) => {
        impl $crate::Interface for $Iface {
            fn implemented_by(source: ::std::any::TypeId) -> bool {
                false $(|| source == ::std::any::TypeId::of::<$Impl>())*
            }

            #[allow(unused_mut)]
            fn cast(
                mut value: ::std::boxed::Box<dyn ::std::any::Any>,
            ) -> ::std::result::Result<::std::rc::Rc<Self>, ::std::boxed::Box<dyn ::std::any::Any>> {
                $(
                value = match value.downcast::<$Impl>() {
                    Ok(concrete) => {
                        let shared: ::std::rc::Rc<Self> = ::std::rc::Rc::new(*concrete);
                        return Ok(shared);
                    }
                    Err(value) => value,
                };
                )*
                Err(value)
            }
        }
    };
}

/// Declare a struct together with its injectable fields.
///
/// Each field marked with a bare attribute such as `#[inject]` gets a [crate::Field]
/// descriptor, and its type must implement [Resolvable]. A field is injected when it is `pub`
/// and marked with `#[inject]`; other markers are recorded and ignored. Unmarked fields are
/// not described at all. Markers are removed from the generated struct, while doc comments
/// and attributes with arguments are kept on their field. The struct must implement `Clone`
/// and `Default`: fresh instances start from `Default` before injection.
///
/// ```
/// # use typewire::*;
/// injectable! {
///     #[derive(Clone, Default)]
///     pub struct Settings {
///         /// Number of attempts, shared with the rest of the application
///         #[inject]
///         pub retries: Ptr<u32>,
///         #[allow(dead_code)]
///         pub label: String,
///     }
/// }
///
/// let container = Container::new();
/// container.register(Ptr::new(3u32));
/// let settings: Settings = container.make();
/// assert_eq!(settings.retries.get(), Some(3));
/// assert!(settings.label.is_empty());
/// ```
#[macro_export]
macro_rules! injectable {
    // all fields emitted
    (@emit [$($head:tt)*] [$($done:tt)*]) => {
        $($head)* {
            $($done)*
        }
    };
    // no attribute left on the current field
    (@emit $head:tt [$($done:tt)*] { [] [$($kept:tt)*] $($decl:tt)* } $($rest:tt)*) => {
        $crate::injectable!(@emit $head [$($done)* $($kept)* $($decl)*,] $($rest)*);
    };
    // drop a marker
    (@emit $head:tt $done:tt { [[$marker:ident] $($attrs:tt)*] $kept:tt $($decl:tt)* } $($rest:tt)*) => {
        $crate::injectable!(@emit $head $done { [$($attrs)*] $kept $($decl)* } $($rest)*);
    };
    // keep any other attribute
    (@emit $head:tt $done:tt { [[$($attr:tt)*] $($attrs:tt)*] [$($kept:tt)*] $($decl:tt)* } $($rest:tt)*) => {
        $crate::injectable!(@emit $head $done { [$($attrs)*] [$($kept)* #[$($attr)*]] $($decl)* } $($rest)*);
    };

    (@describe $fields:ident, [$marker:ident], $field:ident, $Field:ty, $exported:expr) => {
        $fields.push($crate::Field::new(
            stringify!($field),
            $crate::TypeKey::of::<$Field>(),
            stringify!($marker),
            $exported,
            |target: &mut Self, container: &$crate::Container| {
                target.$field = container.resolve::<$Field>();
            },
        ));
    };
    (@describe $fields:ident, [$($attr:tt)*], $($rest:tt)*) => {};

    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident {
            $(
                $(#[$attr:ident $($args:tt)*])*
                $field_vis:vis $field:ident : $Field:ty
            ),* $(,)?
        }
    ) => {
        $crate::injectable!(
            @emit [$(#[$meta])* $vis struct $Name] []
            $( { [$([$attr $($args)*])*] [] $field_vis $field: $Field } )*
        );

        impl $crate::Inject for $Name {
            #[allow(unused_mut)]
            fn fields() -> ::std::vec::Vec<$crate::Field<Self>> {
                let mut fields = ::std::vec::Vec::new();
                $($(
                $crate::injectable!(
                    @describe fields, [$attr $($args)*], $field, $Field,
                    stringify!($field_vis) == "pub"
                );
                )*)*
                fields
            }
        }

        impl $crate::Resolvable for $Name {
            fn kind() -> $crate::Kind {
                $crate::Kind::Struct
            }

            fn construct(container: &$crate::Container) -> $crate::Resolved<Self> {
                let mut value = <Self as ::std::default::Default>::default();
                $crate::Inject::inject_fields(&mut value, container);
                $crate::Resolved::addressable(value)
            }

            fn inject_into(&mut self, container: &$crate::Container) {
                $crate::Inject::inject_fields(self, container);
            }
        }
    };
}
