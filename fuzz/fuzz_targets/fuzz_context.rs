#![no_main]

//! Fuzz target for context operations
//!
//! Drives load/get/release/close sequences against a context and checks
//! each result against a simple model of the bean registry.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use modular_injector::{Context, Definition, DiError, ModuleDefinition, Parameters, Result};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Service(u32);

const PATHS: [&str; 4] = ["", "A", "B", "A.B"];
const NAMES: [&str; 4] = ["n0", "n1", "n2", "n3"];

#[derive(Debug, Arbitrary)]
enum ContextOp {
    Load {
        path: u8,
        name: u8,
        value: u32,
        factory: bool,
        eager: bool,
        allow_override: bool,
    },
    Get(u8),
    GetTwice(u8),
    Release(u8),
    Close,
}

#[derive(Debug, Clone)]
struct Declared {
    path: &'static str,
    value: u32,
    factory: bool,
    allow_override: bool,
}

fn under(path: &str, released: &str) -> bool {
    released.is_empty()
        || path == released
        || path.strip_prefix(released).is_some_and(|rest| rest.starts_with('.'))
}

fuzz_target!(|ops: Vec<ContextOp>| {
    let ctx = Context::new();
    let mut model: HashMap<&'static str, Declared> = HashMap::new();
    let mut closed = false;

    for op in ops.into_iter().take(100) {
        match op {
            ContextOp::Load {
                path,
                name,
                value,
                factory,
                eager,
                allow_override,
            } => {
                let path = PATHS[path as usize % PATHS.len()];
                let name = NAMES[name as usize % NAMES.len()];

                let construct = move |_: &Context, _: &Parameters| -> Result<Service> { Ok(Service(value)) };
                let mut definition = if factory {
                    Definition::factory(construct)
                } else {
                    Definition::single(construct)
                }
                .named(name);
                if allow_override {
                    definition = definition.allow_override();
                }
                let mut module = ModuleDefinition::at(path).definition(definition);
                if eager {
                    module = module.create_on_start();
                }

                let result = ctx.load_modules(&[module]);
                if closed {
                    assert!(matches!(result, Err(DiError::ClosedContext)));
                    continue;
                }

                let conflict = model
                    .get(name)
                    .is_some_and(|existing| !existing.allow_override && !allow_override);
                if conflict {
                    assert!(matches!(result, Err(DiError::NamingConflict { .. })));
                } else {
                    assert!(result.is_ok());
                    model.insert(
                        name,
                        Declared {
                            path,
                            value,
                            factory,
                            allow_override,
                        },
                    );
                }
            }

            ContextOp::Get(name) => {
                let name = NAMES[name as usize % NAMES.len()];
                let result = ctx.get_named::<Service>(name);
                match (closed, model.get(name)) {
                    (true, _) => assert!(matches!(result, Err(DiError::ClosedContext))),
                    (false, Some(declared)) => assert_eq!(result.unwrap().0, declared.value),
                    (false, None) => assert!(result.unwrap_err().is_not_found()),
                }
            }

            ContextOp::GetTwice(name) => {
                let name = NAMES[name as usize % NAMES.len()];
                if let (false, Some(declared)) = (closed, model.get(name)) {
                    let first = ctx.get_named::<Service>(name).unwrap();
                    let second = ctx.get_named::<Service>(name).unwrap();
                    assert_eq!(Arc::ptr_eq(&first, &second), !declared.factory);
                }
            }

            ContextOp::Release(path) => {
                let path = PATHS[path as usize % PATHS.len()];
                let result = ctx.release(path);
                if closed {
                    assert!(matches!(result, Err(DiError::ClosedContext)));
                    continue;
                }

                let before = model.len();
                model.retain(|_, declared| !under(declared.path, path));
                assert_eq!(result.unwrap(), before - model.len());
            }

            ContextOp::Close => {
                assert!(ctx.close().is_ok());
                closed = true;
                model.clear();
            }
        }

        if !closed {
            assert_eq!(ctx.definitions().len(), model.len());
        }
    }
});
