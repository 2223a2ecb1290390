//! Type-directed dependency injection container with runtime bindings and structural defaults.
//!
//! # Simple use case
//!
//! ```
//! # use typewire::*;
//! // Define an interface and an implementation
//! trait Greeter {
//!     fn greet(&self) -> String;
//! }
//!
//! #[derive(Clone, Default)]
//! struct Foo {
//!     s: String,
//! }
//!
//! impl Greeter for Ptr<Foo> {
//!     fn greet(&self) -> String {
//!         self.borrow().map(|foo| foo.s.clone()).unwrap_or_default()
//!     }
//! }
//!
//! // Declare the implementations of the interface
//! interface!(dyn Greeter = [Ptr<Foo>]);
//!
//! // Declare a struct with an injectable field
//! injectable! {
//!     #[derive(Clone, Default)]
//!     pub struct MyGreeter {
//!         #[inject]
//!         pub greeter: Iface<dyn Greeter>,
//!     }
//! }
//!
//! fn greet(greeter: Iface<dyn Greeter>) -> String {
//!     greeter.get().map(|g| g.greet()).unwrap_or_default()
//! }
//!
//! # fn main() -> Result<(), WiringError> {
//! let container = Container::new();
//! container.register_as(Ptr::new(Foo { s: "hello".into() }), TypeKey::of::<Iface<dyn Greeter>>())?;
//!
//! // The registered greeter is injected as the parameter of greet()
//! assert_eq!(container.call(greet), "hello");
//!
//! // Build a MyGreeter with its greeter field injected
//! let built: Ptr<MyGreeter> = container.make();
//! let greeting = built.borrow().map(|b| greet(b.greeter.clone()));
//! assert_eq!(greeting.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! The container maps a type to a binding: a value, another type (alias), or a provider
//! called on demand and optionally cached. Rust has no runtime reflection, so each type
//! taking part in the resolution implements [Resolvable], and the bindings are keyed by its
//! erased [TypeKey].
//!
//! To obtain a value of type `T`, the container uses, in order:
//!
//! * the binding of `T` in this container,
//! * the parent container, if any,
//! * a bound pointer [`Ptr<T>`], dereferenced,
//! * the structural default of `T`: a pointer to a fresh pointee, a fresh struct with its
//!   injectable fields resolved, an empty collection or channel, or the zero value.
//!
//! Resolution never fails: a missing binding results in a default value.
//!
//! Interfaces are trait objects held in an [Iface]. The [interface] macro declares which
//! concrete types implement them, which is checked when registering a value or type as the
//! interface.

mod fields;
mod helpers;
mod inject;
mod resolve;

pub use fields::{Field, Inject, INJECT_MARKER};
pub use helpers::{Chan, Iface, Interface, Ptr};
pub use inject::{Callable, Container, Func, Injectable, IntoValues};
pub use resolve::{
    interface_of, Kind, Provide, Resolvable, Resolved, TypeKey, Value, WiringError,
};

#[cfg(test)]
mod tests;
