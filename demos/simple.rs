use std::time::SystemTime;

use typewire::*;

// Define regular traits and implementor structs

trait Logger {
    fn log(&self, content: &str);
}

trait DateLogger {
    fn log_date(&self);
}

#[derive(Clone, Default)]
struct LoggerImpl {
    prefix: String,
}

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}{}", self.prefix, content);
    }
}

// A struct with an injected logger, used through a pointer

injectable! {
    #[derive(Clone, Default)]
    struct DateLoggerImpl {
        #[inject]
        pub logger: Iface<dyn Logger>,
    }
}

impl DateLogger for Ptr<DateLoggerImpl> {
    fn log_date(&self) {
        let Some(this) = self.borrow() else {
            return;
        };
        let Some(logger) = this.logger.get() else {
            return;
        };
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        logger.log(&format!("{}s since epoch", secs));
    }
}

// Declare the implementations of each interface

interface!(dyn Logger = [LoggerImpl]);
interface!(dyn DateLogger = [Ptr<DateLoggerImpl>]);

fn main() -> Result<(), WiringError> {
    tracing_subscriber::fmt::init();

    let root = std::rc::Rc::new(Container::new());
    root.register_as(
        LoggerImpl {
            prefix: "[root] ".into(),
        },
        TypeKey::of::<Iface<dyn Logger>>(),
    )?;

    // The date logger is built on demand, with its logger resolved from the parent
    let container = Container::with_parent(&root);
    container.register_type_as(
        TypeKey::of::<Ptr<DateLoggerImpl>>(),
        TypeKey::of::<Iface<dyn DateLogger>>(),
    )?;

    let b: Iface<dyn DateLogger> = container.make();
    if let Some(b) = b.get() {
        b.log_date();
    }

    // Parameters are resolved the same way
    container.call(|logger: Iface<dyn Logger>, count: u32| {
        if let Some(logger) = logger.get() {
            logger.log(&format!("called with count={}", count));
        }
    });

    Ok(())
}
