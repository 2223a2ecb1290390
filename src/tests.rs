use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use rstest::rstest;

use super::*;

trait Bar {
    fn test(&self, n: i32) -> String;
}

trait Writer {
    fn write(&self, s: &str) -> String;
    fn tag(&self) -> i32;
}

injectable! {
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Foo {
        a: String,
    }
}

impl Foo {
    fn new(a: &str) -> Self {
        Self { a: a.to_string() }
    }
}

impl Bar for Ptr<Foo> {
    fn test(&self, _n: i32) -> String {
        self.borrow().map(|foo| foo.a.clone()).unwrap_or_default()
    }
}

injectable! {
    #[derive(Clone, Default)]
    struct ResponseWriter {
        #[inject]
        pub foo: Ptr<Foo>,
        t: i32,
    }
}

impl Writer for Ptr<ResponseWriter> {
    fn write(&self, s: &str) -> String {
        s.to_string()
    }

    fn tag(&self) -> i32 {
        self.borrow().map_or(0, |w| w.t)
    }
}

interface!(dyn Bar = [Ptr<Foo>]);
interface!(dyn Writer = [Ptr<ResponseWriter>]);

injectable! {
    #[derive(Clone, Default)]
    struct Request {
        #[inject]
        pub bar: Iface<dyn Bar>,
    }
}

injectable! {
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Context {
        data: String,
    }
}

injectable! {
    #[derive(Clone, Default)]
    struct Controller {
        /// Request context, shared with the rest of the application
        #[inject]
        pub context: Ptr<Context>,
        #[inject]
        pub response: Iface<dyn Writer>,
        #[inject]
        response_private: Iface<dyn Writer>,
        #[inject]
        pub response2: Iface<dyn Writer>,
        pub response3: Iface<dyn Writer>,
        #[inject]
        pub request: Request,
        action: String,
    }
}

fn bar_key() -> TypeKey {
    TypeKey::of::<Iface<dyn Bar>>()
}

fn writer_key() -> TypeKey {
    TypeKey::of::<Iface<dyn Writer>>()
}

fn context(data: &str) -> Ptr<Context> {
    Ptr::new(Context {
        data: data.to_string(),
    })
}

fn response_writer(t: i32) -> Ptr<ResponseWriter> {
    Ptr::new(ResponseWriter {
        t,
        ..Default::default()
    })
}

#[rstest]
#[case::int(|c: &Container| c.register(100i32), TypeKey::of::<i32>())]
#[case::string(|c: &Container| c.register(String::from("abc")), TypeKey::of::<String>())]
#[case::boolean(|c: &Container| c.register(true), TypeKey::of::<bool>())]
#[case::value(|c: &Container| c.register(Foo::default()), TypeKey::of::<Foo>())]
#[case::pointer(|c: &Container| c.register(Ptr::new(Foo::default())), TypeKey::of::<Ptr<Foo>>())]
#[case::null_pointer(|c: &Container| c.register(Ptr::<Foo>::null()), TypeKey::of::<Ptr<Foo>>())]
#[case::sequence(|c: &Container| c.register(Vec::<Foo>::new()), TypeKey::of::<Vec<Foo>>())]
#[case::array(|c: &Container| c.register([0u8; 10]), TypeKey::of::<[u8; 10]>())]
#[case::channel(|c: &Container| c.register(Chan::<Foo>::nil()), TypeKey::of::<Chan<Foo>>())]
#[case::map(|c: &Container| c.register(HashMap::<String, Foo>::new()), TypeKey::of::<HashMap<String, Foo>>())]
#[case::interface(|c: &Container| c.register(Iface::<dyn Bar>::nil()), bar_key())]
fn register_binds_own_type(#[case] register: fn(&Container), #[case] key: TypeKey) {
    let container = Container::new();
    register(&container);
    assert!(container.has_registered(key));
}

#[test]
fn register_interface() {
    let container = Container::new();
    container
        .register_as(Ptr::new(Foo::default()), bar_key())
        .unwrap();
    assert!(container.has_registered(bar_key()));
    assert!(!container.has_registered(TypeKey::of::<Ptr<Foo>>()));

    container.unregister(bar_key());
    assert!(!container.has_registered(bar_key()));

    let err = container
        .register_as(Ptr::new(Foo::default()), writer_key())
        .unwrap_err();
    assert!(matches!(err, WiringError::IncompatibleBinding { .. }));
    assert!(!container.has_registered(writer_key()));
}

#[test]
fn register_incompatible_type() {
    let container = Container::new();
    let err = container
        .register_type_as(TypeKey::of::<Ptr<Foo>>(), writer_key())
        .unwrap_err();
    assert_eq!(
        err,
        WiringError::IncompatibleBinding {
            from: TypeKey::of::<Ptr<Foo>>().name(),
            to: writer_key().name(),
        }
    );
    assert!(!container.has_registered(writer_key()));

    // a value type is not an implementation when only its pointer is declared
    assert!(container
        .register_as(Foo::default(), bar_key())
        .is_err());
}

#[test]
fn register_overwrites() {
    let container = Container::new();
    container.register(Foo::new("first"));
    container.register(Foo::new("second"));
    assert_eq!(container.make::<Foo>().a, "second");

    container.register_provider(|_: &Container| Foo::new("provided"), false);
    assert_eq!(container.make::<Foo>().a, "provided");

    container.register(Foo::new("last"));
    assert_eq!(container.make::<Foo>().a, "last");
}

#[test]
fn register_provider() {
    let container = Container::new();
    container.register_provider(|_: &Container| Iface::<dyn Bar>::nil(), true);
    assert!(container.has_registered(bar_key()));
    assert!(!container.has_registered(TypeKey::of::<Ptr<Foo>>()));
}

#[test]
fn build_basic() {
    let container = Container::new();
    assert_eq!(container.make::<i32>(), 0);
    assert_eq!(container.make::<String>(), "");
    assert_eq!(container.make::<Foo>(), Foo::default());
    assert_eq!(container.make::<[u8; 4]>(), [0; 4]);
    assert!(!container.make::<Ptr<Foo>>().is_null());
    assert_eq!(container.make::<Ptr<i32>>().get(), Some(0));
}

#[test]
fn build_complex() {
    let container = Container::new();
    assert!(container.make::<Vec<i32>>().is_empty());
    assert!(container.make::<HashMap<String, Foo>>().is_empty());

    let chan = container.make::<Chan<Foo>>();
    assert!(!chan.is_nil());
    assert_eq!(chan.len(), 0);

    // empty collections are not built in place: no pointer to them
    assert!(container.make::<Ptr<Vec<i32>>>().is_null());
}

#[test]
fn build_struct() {
    let container = Container::new();
    container.register(Foo::new("abc"));

    let mut foo1: Foo = container.make();
    assert_eq!(foo1.a, "abc");

    // registering by value hands out copies
    foo1.a = "test".to_string();
    let foo2: Foo = container.make();
    assert_eq!(foo2.a, "abc");

    // registering by value doesn't register the corresponding pointer
    let foo3: Ptr<Foo> = container.make();
    assert!(foo3.is_null());
}

#[test]
fn build_struct_ptr() {
    let container = Container::new();
    container.register(Ptr::new(Foo::new("abc")));

    let foo1: Ptr<Foo> = container.make();
    assert_eq!(foo1.get().map(|f| f.a), Some("abc".to_string()));

    // registering by pointer shares the value
    if let Some(mut foo) = foo1.borrow_mut() {
        foo.a = "test".to_string();
    }
    let foo2: Ptr<Foo> = container.make();
    assert!(foo1.ptr_eq(&foo2));
    assert_eq!(foo2.get().map(|f| f.a), Some("test".to_string()));

    // a registered pointer also provides its pointee
    let foo3: Foo = container.make();
    assert_eq!(foo3.a, "test");
}

#[test]
fn build_from_null_pointer() {
    let container = Container::new();
    container.register(Ptr::<Foo>::null());
    assert_eq!(container.make::<Foo>(), Foo::default());
}

#[test]
fn build_interface() {
    let container = Container::new();
    container.register_as(response_writer(1), writer_key()).unwrap();

    let writer: Iface<dyn Writer> = container.make();
    assert_eq!(writer.get().map(|w| w.tag()), Some(1));

    // the concrete pointer is not bound, but can be built
    let ptr: Ptr<ResponseWriter> = container.make();
    assert!(!ptr.is_null());

    // an unregistered struct is built from scratch
    let value: ResponseWriter = container.make();
    assert_eq!(value.t, 0);

    // an unregistered interface is nil
    let bar: Iface<dyn Bar> = container.make();
    assert!(bar.is_nil());
}

#[test]
fn build_alias() {
    let container = Container::new();
    container
        .register_type_as(TypeKey::of::<Ptr<ResponseWriter>>(), writer_key())
        .unwrap();

    let w1: Iface<dyn Writer> = container.make();
    let w2: Iface<dyn Writer> = container.make();
    assert!(!w1.is_nil());
    assert_eq!(w1.get().map(|w| w.write("x")), Some("x".to_string()));

    // aliases are not cached
    assert!(!w1.ptr_eq(&w2));
}

#[test]
fn build_shared_provider() {
    let calls = Rc::new(Cell::new(0));
    let container = Container::new();
    let counter = calls.clone();
    container.register_provider(
        move |_: &Container| {
            counter.set(counter.get() + 1);
            Ptr::new(Foo::new("abc"))
        },
        true,
    );

    let foo1: Ptr<Foo> = container.make();
    assert_eq!(foo1.get().map(|f| f.a), Some("abc".to_string()));
    if let Some(mut foo) = foo1.borrow_mut() {
        foo.a = "xyz".to_string();
    }
    let foo2: Ptr<Foo> = container.make();
    assert!(foo1.ptr_eq(&foo2));
    assert_eq!(foo2.get().map(|f| f.a), Some("xyz".to_string()));
    assert_eq!(calls.get(), 1);
    assert!(format!("{container:?}").contains("Instance"));
}

#[test]
fn build_unshared_provider() {
    let calls = Rc::new(Cell::new(0));
    let container = Container::new();
    let counter = calls.clone();
    container.register_provider(
        move |_: &Container| {
            counter.set(counter.get() + 1);
            Ptr::new(Foo::new("abc"))
        },
        false,
    );

    let foo1: Ptr<Foo> = container.make();
    if let Some(mut foo) = foo1.borrow_mut() {
        foo.a = "xyz".to_string();
    }
    let foo2: Ptr<Foo> = container.make();
    assert!(!foo1.ptr_eq(&foo2));
    assert_eq!(foo2.get().map(|f| f.a), Some("abc".to_string()));
    assert_eq!(calls.get(), 2);
    assert!(format!("{container:?}").contains("Provider(shared=false)"));
}

#[test]
fn shared_provider_on_parent() {
    let calls = Rc::new(Cell::new(0));
    let parent = Rc::new(Container::new());
    let counter = calls.clone();
    parent.register_provider(
        move |_: &Container| {
            counter.set(counter.get() + 1);
            Ptr::new(Foo::new("abc"))
        },
        true,
    );

    let child = Container::with_parent(&parent);
    let foo1: Ptr<Foo> = child.make();
    let foo2: Ptr<Foo> = parent.make();
    let foo3: Ptr<Foo> = child.make();
    assert!(foo1.ptr_eq(&foo2));
    assert!(foo1.ptr_eq(&foo3));
    assert_eq!(calls.get(), 1);

    // the cached instance lives in the parent
    assert!(format!("{parent:?}").contains("Instance"));
    assert!(!child.has_registered(TypeKey::of::<Ptr<Foo>>()));
}

#[test]
fn provider_resolves_dependencies() {
    let container = Container::new();
    container.register(context("abc"));
    container.register_provider(
        |c: &Container| {
            let context: Ptr<Context> = c.make();
            Foo::new(&context.get().unwrap_or_default().data)
        },
        true,
    );
    assert_eq!(container.make::<Foo>().a, "abc");
}

#[test]
fn build_inject() {
    let container = Container::new();
    container.register(context("abc"));
    container
        .register_as(Ptr::new(Foo::new("123")), bar_key())
        .unwrap();
    container
        .register_type_as(TypeKey::of::<Ptr<ResponseWriter>>(), writer_key())
        .unwrap();

    let con: Controller = container.make();
    assert_eq!(con.action, "");
    assert_eq!(con.context.get().map(|c| c.data), Some("abc".to_string()));
    assert_eq!(
        con.request.bar.get().map(|b| b.test(0)),
        Some("123".to_string())
    );
    assert!(!con.response.is_nil());
}

#[test]
fn inject_fields() {
    let container = Container::new();
    container.register(context("abc"));
    container.register_as(response_writer(123), writer_key()).unwrap();
    container
        .register_as(Ptr::new(Foo::new("xyz")), bar_key())
        .unwrap();

    let mut con = Controller::default();
    container.inject(&mut con);

    assert_eq!(con.context.get().map(|c| c.data), Some("abc".to_string()));
    assert_eq!(con.response.get().map(|w| w.tag()), Some(123));
    assert!(!con.response2.is_nil());
    // unmarked fields are left alone
    assert!(con.response3.is_nil());
    // private fields are left alone
    assert!(con.response_private.is_nil());
    // nested structs are built with their own fields injected
    assert_eq!(
        con.request.bar.get().map(|b| b.test(0)),
        Some("xyz".to_string())
    );

    // nothing happens for non-struct targets
    let mut n = 1;
    container.inject(&mut n);
    assert_eq!(n, 1);
}

#[test]
fn inject_through_pointer() {
    let container = Container::new();
    container.register(context("abc"));

    let mut con = Ptr::new(Controller::default());
    container.inject(&mut con);
    assert_eq!(
        con.borrow().and_then(|c| c.context.get()).map(|c| c.data),
        Some("abc".to_string())
    );

    let mut null = Ptr::<Controller>::null();
    container.inject(&mut null);
    assert!(null.is_null());
}

injectable! {
    #[derive(Clone, Default)]
    struct Selective {
        #[inject]
        pub tagged: Ptr<Foo>,
        #[allow(dead_code)]
        #[inject]
        hidden: Ptr<Foo>,
        #[other]
        pub ignored: Ptr<Foo>,
        pub untagged: Ptr<Foo>,
        #[inject]
        pub context: Ptr<Context>,
    }
}

#[test]
fn inject_selectivity() {
    let container = Container::new();
    container.register(Ptr::new(Foo::new("abc")));
    container.register(context("ctx"));

    let mut value = Selective::default();
    container.inject(&mut value);
    assert!(!value.tagged.is_null());
    assert!(value.hidden.is_null());
    assert!(value.ignored.is_null());
    assert!(value.untagged.is_null());
    assert!(!value.context.is_null());

    let injectable: Vec<_> = Selective::fields()
        .into_iter()
        .filter(Field::is_injectable)
        .map(|f| f.name())
        .collect();
    assert_eq!(injectable, vec!["tagged", "context"]);

    let markers: Vec<_> = Selective::fields()
        .iter()
        .map(|f| (f.name(), f.marker()))
        .collect();
    assert_eq!(
        markers,
        vec![
            ("tagged", "inject"),
            ("hidden", "inject"),
            ("ignored", "other"),
            ("context", "inject"),
        ]
    );
}

injectable! {
    #[derive(Clone, Default)]
    struct Tally {
        #[inject]
        pub count: u32,
    }
}

#[test]
fn resolve_pointee_during_its_injection() {
    let target = Ptr::new(Tally::default());
    let container = Container::new();
    container.register(target.clone());

    // the count depends on a snapshot of the tally, which is being injected
    let nested = Rc::new(Cell::new(false));
    let guard = nested.clone();
    container.register_provider(
        move |c: &Container| {
            if guard.replace(true) {
                return 7u32;
            }
            let snapshot: Tally = c.make();
            guard.set(false);
            snapshot.count + 1
        },
        false,
    );

    container.inject(&mut target.clone());
    assert_eq!(target.get().map(|t| t.count), Some(8));

    // once released, the bound pointer is dereferenced again
    assert_eq!(container.make::<Tally>().count, 8);
}

#[test]
fn call_with_injection() {
    let container = Container::new();
    container.register_as(response_writer(1), writer_key()).unwrap();
    container.register(context("abc"));

    let f = |cc: Ptr<Context>, w: Iface<dyn Writer>, s: String| {
        (
            cc.get().map(|c| c.data).unwrap_or_default(),
            w.get().map(|w| w.write("test")).unwrap_or_default(),
            s,
        )
    };

    let (data, written, s) = container.call(f);
    assert_eq!((data.as_str(), written.as_str(), s.as_str()), ("abc", "test", ""));

    let results = container.call_values(f);
    assert_eq!(results.len(), 3);
    let first = results[0].as_any().downcast_ref::<String>();
    assert_eq!(first.map(String::as_str), Some("abc"));
}

#[test]
fn injectable_keys() {
    assert_eq!(<()>::keys(), Vec::<TypeKey>::new());
    assert_eq!(
        <(Ptr<Context>, Iface<dyn Writer>, String)>::keys(),
        vec![
            TypeKey::of::<Ptr<Context>>(),
            writer_key(),
            TypeKey::of::<String>(),
        ]
    );
}

#[test]
fn call_value() {
    let container = Container::new();
    container.register(7i32);
    container.register(Func::new(|n: i32| (n * 2,)));

    let func: Func = container.make();
    let results = container.call_value(&func).unwrap();
    assert_eq!(results[0].as_any().downcast_ref::<i32>(), Some(&14));

    let err = container.call_value(&42i32).unwrap_err();
    assert_eq!(err, WiringError::InvalidCallable("i32"));
    assert!(container.call_value(&Func::default()).is_err());
}

#[test]
fn parent_fallback() {
    let container = Container::new();
    assert!(container.parent().is_none());
    assert_eq!(container.make::<Foo>().a, "");

    let parent = Rc::new(Container::new());
    parent.register(Foo::new("abc"));
    container.set_parent(Some(&parent));
    assert!(container.parent().is_some());
    assert_eq!(container.make::<Foo>().a, "abc");
    assert!(!container.has_registered(TypeKey::of::<Foo>()));

    container.set_parent(None);
    assert_eq!(container.make::<Foo>().a, "");
}

#[test]
fn parent_does_not_see_child() {
    let parent = Rc::new(Container::new());
    let child = Container::with_parent(&parent);
    child.register(String::from("child"));
    child.register(context("child"));
    assert_eq!(parent.make::<String>(), "");

    // the parent builds unbound structs with its own bindings
    let con: Controller = child.make();
    assert!(con.context.get().is_some_and(|c| c.data.is_empty()));
    assert_eq!(child.make::<Ptr<Context>>().get().map(|c| c.data), Some("child".to_string()));
}

#[test]
fn dropped_parent_is_unlinked() {
    let child = {
        let parent = Rc::new(Container::new());
        parent.register(Foo::new("abc"));
        let child = Container::with_parent(&parent);
        assert_eq!(child.make::<Foo>().a, "abc");
        child
    };
    assert!(child.parent().is_none());
    assert_eq!(child.make::<Foo>(), Foo::default());
}

#[test]
fn interface_markers() {
    assert_eq!(interface_of(bar_key()), Ok(bar_key()));
    assert_eq!(interface_of(TypeKey::of::<Ptr<Ptr<Iface<dyn Bar>>>>()), Ok(bar_key()));
    assert_eq!(
        interface_of(TypeKey::of::<Foo>()),
        Err(WiringError::NotAnInterface(TypeKey::of::<Foo>().name()))
    );
    assert!(interface_of(TypeKey::of::<Ptr<Foo>>()).is_err());
}

#[test]
fn make_by_key() {
    let container = Container::new();
    container.register(Foo::new("abc"));
    let value = container.make_key(TypeKey::of::<Foo>());
    assert_eq!(value.as_any().downcast_ref::<Foo>(), Some(&Foo::new("abc")));
    assert_eq!(TypeKey::of::<Foo>().kind(), Kind::Struct);
    assert_eq!(TypeKey::of::<Chan<u8>>().kind(), Kind::Channel);
}
