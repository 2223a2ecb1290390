use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, trace, warn};

use crate::*;

/// Erased factory stored in a provider binding
type Factory = Rc<dyn Fn(&Container) -> Box<dyn Value>>;

enum Binding {
    Instance(Box<dyn Value>),
    Alias { source: TypeKey, target: TypeKey },
    Provider { factory: Factory, shared: bool },
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Instance(value) => write!(f, "Instance({})", (**value).type_name()),
            Binding::Alias { source, target } => {
                write!(f, "Alias({} -> {})", source.name(), target.name())
            }
            Binding::Provider { shared, .. } => write!(f, "Provider(shared={shared})"),
        }
    }
}

/// What to do with a binding once the map is no longer borrowed
enum Step {
    Alias(TypeKey, TypeKey),
    Provide(Factory, bool),
}

/// Dependency injection container.
///
/// Bindings are keyed by type. When a type is not bound, the container delegates to its
/// parent, then falls back to building a default value for the type.
///
/// The container is single-threaded: it hands out shared handles through [Rc] and updates
/// its bindings in place when a shared provider is first used.
#[derive(Default)]
pub struct Container {
    bindings: RefCell<HashMap<TypeId, Binding>>,
    parent: RefCell<Option<Weak<Container>>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child container delegating unbound types to the parent
    pub fn with_parent(parent: &Rc<Container>) -> Self {
        let container = Self::new();
        container.set_parent(Some(parent));
        container
    }

    /// The parent container, if it is still alive
    pub fn parent(&self) -> Option<Rc<Container>> {
        self.parent.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Link to a parent container, or unlink with `None`.
    ///
    /// The link does not keep the parent alive.
    pub fn set_parent(&self, parent: Option<&Rc<Container>>) {
        debug!(linked = parent.is_some(), "parent container changed");
        *self.parent.borrow_mut() = parent.map(Rc::downgrade);
    }

    /// Check if the type is bound in this container, ignoring the parents
    pub fn has_registered(&self, key: TypeKey) -> bool {
        self.bindings.borrow().contains_key(&key.id())
    }

    /// Remove the binding of the type from this container
    pub fn unregister(&self, key: TypeKey) {
        if self.bindings.borrow_mut().remove(&key.id()).is_some() {
            debug!(ty = key.name(), "unregistered");
        }
    }

    /// Bind a value to its own type
    pub fn register<T: Any + Clone>(&self, value: T) {
        debug!(ty = type_name::<T>(), "registered instance");
        self.bind(TypeId::of::<T>(), Binding::Instance(Box::new(value)));
    }

    /// Bind a value to the target type.
    ///
    /// The value is converted into the target type at registration, which fails if the
    /// target does not accept the value's type. Nothing is bound on failure.
    pub fn register_as<S: 'static>(&self, value: S, target: TypeKey) -> Result<(), WiringError> {
        let incompatible = || WiringError::IncompatibleBinding {
            from: type_name::<S>(),
            to: target.name(),
        };
        if !target.accepts(TypeId::of::<S>()) {
            return Err(incompatible());
        }
        let converted = target
            .convert(Box::new(value))
            .map_err(|_| incompatible())?;
        debug!(ty = target.name(), from = type_name::<S>(), "registered instance");
        self.bind(target.id(), Binding::Instance(converted));
        Ok(())
    }

    /// Bind the target type to another type: resolving the target resolves the source instead
    pub fn register_type_as(&self, source: TypeKey, target: TypeKey) -> Result<(), WiringError> {
        if !target.accepts(source.id()) {
            return Err(WiringError::IncompatibleBinding {
                from: source.name(),
                to: target.name(),
            });
        }
        debug!(ty = target.name(), from = source.name(), "registered alias");
        self.bind(target.id(), Binding::Alias { source, target });
        Ok(())
    }

    /// Bind a provider producing values of the target type.
    ///
    /// A shared provider is called once, on first use, and its value is then reused.
    pub fn register_provider<T, P>(&self, provider: P, shared: bool)
    where
        T: Resolvable,
        P: Provide<T> + 'static,
    {
        debug!(ty = type_name::<T>(), shared, "registered provider");
        let factory: Factory =
            Rc::new(move |container: &Container| Box::new(provider.provide(container)) as Box<dyn Value>);
        self.bind(TypeId::of::<T>(), Binding::Provider { factory, shared });
    }

    fn bind(&self, id: TypeId, binding: Binding) {
        self.bindings.borrow_mut().insert(id, binding);
    }

    /// Obtain a value of the target type, fully injected if it was built from scratch
    pub fn make<T: Resolvable>(&self) -> T {
        self.resolve()
    }

    /// Obtain a value of the type described by the key
    pub fn make_key(&self, key: TypeKey) -> Box<dyn Value> {
        self.resolve_key(key).value
    }

    pub fn resolve<T: Resolvable>(&self) -> T {
        self.resolve_with::<T>().value
    }

    /// Inject the fields of the target, following pointers. Non-struct targets are left alone.
    pub fn inject<T: Resolvable>(&self, target: &mut T) {
        target.inject_into(self);
    }

    pub(crate) fn resolve_with<T: Resolvable>(&self) -> Resolved<T> {
        let resolved = self.resolve_key(TypeKey::of::<T>());
        let addressable = resolved.addressable;
        match resolved.value.into_any().downcast::<T>() {
            Ok(value) => Resolved {
                value: *value,
                addressable,
            },
            Err(_) => {
                error!(ty = type_name::<T>(), "resolved value has the wrong type");
                T::construct(self)
            }
        }
    }

    fn resolve_key(&self, key: TypeKey) -> Resolved<Box<dyn Value>> {
        if let Some(bound) = self.resolve_bound(key.id()) {
            return bound;
        }
        if let Some(parent) = self.parent() {
            trace!(ty = key.name(), "delegating to parent");
            return parent.resolve_key(key);
        }
        trace!(ty = key.name(), kind = ?key.kind(), "building from scratch");
        key.construct(self)
    }

    /// Resolve the type from a binding held by this container, if any.
    ///
    /// The binding map is released before running providers or resolving aliases,
    /// so they can use the container freely.
    pub(crate) fn resolve_bound(&self, id: TypeId) -> Option<Resolved<Box<dyn Value>>> {
        let step = match self.bindings.borrow().get(&id)? {
            Binding::Instance(value) => {
                trace!(ty = (**value).type_name(), "resolved from instance");
                return Some(Resolved::new((**value).clone_value()));
            }
            Binding::Alias { source, target } => Step::Alias(*source, *target),
            Binding::Provider { factory, shared } => Step::Provide(factory.clone(), *shared),
        };

        match step {
            Step::Alias(source, target) => {
                trace!(ty = target.name(), source = source.name(), "resolving alias");
                let resolved = self.resolve_key(source).value;
                match target.convert(resolved.into_any()) {
                    Ok(value) => Some(Resolved::new(value)),
                    Err(_) => {
                        warn!(ty = target.name(), source = source.name(), "alias conversion failed");
                        Some(target.construct(self))
                    }
                }
            }
            Step::Provide(factory, shared) => {
                let value = (*factory)(self);
                trace!(ty = (*value).type_name(), shared, "resolved from provider");
                if shared {
                    self.bind(id, Binding::Instance((*value).clone_value()));
                }
                Some(Resolved::new(value))
            }
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.bindings.borrow();
        f.debug_struct("Container")
            .field("bindings", &bindings.values().collect::<Vec<_>>())
            .field("parent", &self.parent().is_some())
            .finish()
    }
}

/*
 * Parameter injection for functions of up to 10 arguments, resolving each argument
 * left to right before making the call.
 */

impl Container {
    /// Call a function after resolving all its parameters
    pub fn call<F, I, O>(&self, f: F) -> O
    where
        I: Injectable,
        F: Callable<I, O>,
    {
        trace!(params = ?I::keys(), "calling with injected parameters");
        f.call(I::inject(self))
    }

    /// Call a function after resolving all its parameters and collect its results.
    ///
    /// Results are collected from a tuple: a function with a single result must return a
    /// one-element tuple such as `(n,)`, and `()` gives no results.
    pub fn call_values<F, I, O>(&self, f: F) -> Vec<Box<dyn Value>>
    where
        I: Injectable,
        O: IntoValues,
        F: Callable<I, O>,
    {
        self.call(f).into_values()
    }

    /// Call a type-erased function.
    ///
    /// The value must be a non-nil [Func], otherwise it is not callable.
    pub fn call_value(&self, f: &dyn Value) -> Result<Vec<Box<dyn Value>>, WiringError> {
        let not_callable = || WiringError::InvalidCallable(f.type_name());
        let func = f.as_any().downcast_ref::<Func>().ok_or_else(not_callable)?;
        let inner = func.0.as_ref().ok_or_else(not_callable)?;
        Ok((**inner)(self))
    }
}

/// A Callable has a ```call``` function with a single argument and a single return type.
///
/// This trait is implemented for all functions with up to 10 arguments, using a tuple to
/// wrap them all in a single type.
pub trait Callable<Args, Ret> {
    fn call(&self, args: Args) -> Ret;
}

/// A tuple of parameter types which can all be resolved by the container
pub trait Injectable: Sized {
    fn inject(container: &Container) -> Self;

    /// Keys of the parameter types, in order
    fn keys() -> Vec<TypeKey>;
}

/// Results of a call, flattened into a sequence of values.
///
/// Implemented for tuples of up to 10 elements.
pub trait IntoValues {
    fn into_values(self) -> Vec<Box<dyn Value>>;
}

/// Type-erased callable with injected parameters, usable as a value
#[derive(Clone, Default)]
pub struct Func(Option<Rc<dyn Fn(&Container) -> Vec<Box<dyn Value>>>>);

impl Func {
    /// Wrap a function returning a tuple of results, as for [Container::call_values]
    pub fn new<F, I, O>(f: F) -> Self
    where
        I: Injectable,
        O: IntoValues,
        F: Callable<I, O> + 'static,
    {
        Self(Some(Rc::new(move |container: &Container| {
            f.call(I::inject(container)).into_values()
        })))
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_nil() { "Func(nil)" } else { "Func" })
    }
}

impl Resolvable for Func {
    fn kind() -> Kind {
        Kind::Function
    }

    fn construct(_container: &Container) -> Resolved<Self> {
        Resolved::addressable(Func::default())
    }
}

macro_rules! callable_tuple ({ $($param:ident)* } => {
    impl<Fun, Ret, $($param,)*> Callable<($($param,)*), Ret> for Fun
    where
        Fun: Fn($($param),*) -> Ret,
    {
        #[inline]
        #[allow(non_snake_case)]
        fn call(&self, ($($param,)*): ($($param,)*)) -> Ret {
            (self)($($param,)*)
        }
    }

    #[allow(clippy::unused_unit)]
    impl<$($param: Resolvable,)*> Injectable for ($($param,)*) {
        #[inline]
        fn inject(_container: &Container) -> Self {
            ($(_container.resolve::<$param>(),)*)
        }

        fn keys() -> Vec<TypeKey> {
            vec![$(TypeKey::of::<$param>(),)*]
        }
    }

    #[allow(non_snake_case)]
    impl<$($param: Any + Clone,)*> IntoValues for ($($param,)*) {
        fn into_values(self) -> Vec<Box<dyn Value>> {
            let ($($param,)*) = self;
            vec![$(Box::new($param) as Box<dyn Value>,)*]
        }
    }
});

callable_tuple! {}
callable_tuple! { A }
callable_tuple! { A B }
callable_tuple! { A B C }
callable_tuple! { A B C D }
callable_tuple! { A B C D E }
callable_tuple! { A B C D E F }
callable_tuple! { A B C D E F G }
callable_tuple! { A B C D E F G H }
callable_tuple! { A B C D E F G H I }
callable_tuple! { A B C D E F G H I J }
