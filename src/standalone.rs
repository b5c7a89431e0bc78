//! Process-wide context holder
//!
//! Holds at most one "current" [`Context`] for applications that want a
//! global entry point. The slot is created by [`start`] (or lazily by
//! [`get_or_create`] / [`load_modules`]) and destroyed by [`stop`]. Every
//! access goes through one mutex.
//!
//! # Examples
//!
//! ```rust
//! use modular_injector::{ModuleDefinition, PropertiesConfig, standalone};
//!
//! struct Clock;
//!
//! let ctx = standalone::start(
//!     &[ModuleDefinition::new().single(|_, _| Ok(Clock))],
//!     &PropertiesConfig::default(),
//! )
//! .unwrap();
//! assert!(ctx.get::<Clock>().is_ok());
//! assert!(standalone::start(&[], &PropertiesConfig::default()).is_err());
//!
//! standalone::stop().unwrap();
//! assert!(standalone::current().is_none());
//! ```

use crate::{Context, DiError, ModuleDefinition, PropertiesConfig, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

#[cfg(feature = "logging")]
use tracing::{debug, info};

struct Holder {
    context: Option<Arc<Context>>,
    started: bool,
}

impl Holder {
    fn get_or_create(&mut self) -> Arc<Context> {
        Arc::clone(self.context.get_or_insert_with(|| {
            #[cfg(feature = "logging")]
            debug!(target: "modular_injector", "Creating process-wide context");
            Arc::new(Context::new())
        }))
    }
}

static HOLDER: Mutex<Holder> = Mutex::new(Holder {
    context: None,
    started: false,
});

fn holder() -> MutexGuard<'static, Holder> {
    HOLDER.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Start the process-wide context: load properties, then modules.
///
/// Fails with `AlreadyStarted` if [`start`] already succeeded and
/// [`stop`] has not been called since.
///
/// The holder is not locked while loading, so eager constructors may call
/// back into this module. A failed load leaves the holder not started.
pub fn start(modules: &[ModuleDefinition], properties: &PropertiesConfig) -> Result<Arc<Context>> {
    let ctx = {
        let mut holder = holder();
        if holder.started {
            return Err(DiError::AlreadyStarted);
        }
        holder.started = true;
        holder.get_or_create()
    };

    let begin = Instant::now();
    let loaded = ctx
        .load_properties(properties)
        .and_then(|_| ctx.load_modules(modules).map(|_| ()));
    if let Err(err) = loaded {
        holder().started = false;
        return Err(err);
    }

    #[cfg(feature = "logging")]
    info!(
        target: "modular_injector",
        elapsed_us = begin.elapsed().as_micros() as u64,
        "Process-wide context started"
    );
    #[cfg(not(feature = "logging"))]
    let _ = begin;

    Ok(ctx)
}

/// Load modules into the current context, creating it if needed.
pub fn load_modules(modules: &[ModuleDefinition]) -> Result<Arc<Context>> {
    let ctx = get_or_create();
    ctx.load_modules(modules)?;
    Ok(ctx)
}

/// The current context, created empty if there is none
pub fn get_or_create() -> Arc<Context> {
    holder().get_or_create()
}

/// The current context, if any
pub fn current() -> Option<Arc<Context>> {
    holder().context.clone()
}

/// True between a successful [`start`] and [`stop`]
pub fn is_started() -> bool {
    holder().started
}

/// Release a path on the current context (no-op without one)
pub fn release(path: &str) -> Result<usize> {
    match current() {
        Some(ctx) => ctx.release(path),
        None => Ok(0),
    }
}

/// Close and drop the current context.
pub fn stop() -> Result<()> {
    let context = {
        let mut holder = holder();
        holder.started = false;
        holder.context.take()
    };

    match context {
        Some(ctx) => {
            #[cfg(feature = "logging")]
            debug!(target: "modular_injector", context = ctx.id(), "Stopping process-wide context");
            ctx.close()
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// The holder is process-wide: run these one at a time
    static SERIAL: Mutex<()> = Mutex::new(());

    fn serial() -> MutexGuard<'static, ()> {
        let guard = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
        stop().unwrap();
        guard
    }

    struct ComponentA;

    #[test]
    fn test_start_twice_fails() {
        let _serial = serial();

        start(&[], &PropertiesConfig::default()).unwrap();
        assert!(is_started());
        assert!(matches!(
            start(&[], &PropertiesConfig::default()),
            Err(DiError::AlreadyStarted)
        ));

        stop().unwrap();
        assert!(!is_started());
        start(&[], &PropertiesConfig::default()).unwrap();
        stop().unwrap();
    }

    #[test]
    fn test_load_modules_creates_context() {
        let _serial = serial();
        assert!(current().is_none());

        let ctx = load_modules(&[ModuleDefinition::new().single(|_, _| Ok(ComponentA))]).unwrap();
        assert!(!is_started());
        assert!(Arc::ptr_eq(&ctx, &current().unwrap()));
        assert!(get_or_create().get::<ComponentA>().is_ok());

        stop().unwrap();
    }

    #[test]
    fn test_stop_closes_context() {
        let _serial = serial();

        let ctx = start(
            &[ModuleDefinition::at("A").single(|_, _| Ok(ComponentA))],
            &PropertiesConfig::default(),
        )
        .unwrap();

        stop().unwrap();
        assert!(ctx.is_closed());
        assert!(matches!(ctx.get::<ComponentA>(), Err(DiError::ClosedContext)));
        assert!(current().is_none());
    }

    #[test]
    fn test_release_notifies_callbacks() {
        let _serial = serial();
        static RELEASED: AtomicBool = AtomicBool::new(false);

        let ctx = start(
            &[ModuleDefinition::new().module(ModuleDefinition::at("A").single(|_, _| Ok(ComponentA)))],
            &PropertiesConfig::default(),
        )
        .unwrap();
        ctx.register_release_callback(|path| {
            assert_eq!(path, "A");
            RELEASED.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        assert_eq!(release("A").unwrap(), 1);
        assert!(RELEASED.load(Ordering::SeqCst));

        stop().unwrap();
        assert_eq!(release("A").unwrap(), 0);
    }

    #[test]
    fn test_eager_constructor_reaches_holder_during_start() {
        let _serial = serial();

        struct Registered {
            saw_context: bool,
        }

        let ctx = start(
            &[ModuleDefinition::new().create_on_start().single(|_, _| {
                let saw_context = current().is_some();
                release("unrelated")?;
                Ok(Registered { saw_context })
            })],
            &PropertiesConfig::default(),
        )
        .unwrap();

        assert!(is_started());
        assert!(ctx.get::<Registered>().unwrap().saw_context);
        stop().unwrap();
    }

    #[test]
    fn test_failed_start_can_be_retried() {
        let _serial = serial();

        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        let flaky = ModuleDefinition::new().create_on_start().single(|_, _| {
            if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DiError::creation_failed("component", "not ready"))
            } else {
                Ok(ComponentA)
            }
        });
        assert!(matches!(
            start(&[flaky], &PropertiesConfig::default()),
            Err(DiError::CreationFailed { .. })
        ));
        assert!(!is_started());

        // The registered eager definition is built again by the retry
        let ctx = start(&[], &PropertiesConfig::default()).unwrap();
        assert!(is_started());
        assert!(ctx.get::<ComponentA>().is_ok());
        assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
        stop().unwrap();
    }
}
