//! Built-in directives and the registry that exposes them.

pub mod basic;
pub mod group;
pub mod shell;

use crate::core::registry::{DirectiveSpec, Registry, ROOT_SCOPE};
use crate::core::unit::Directive;

/// Registry scope for directives nested under `group`.
pub const GROUP_SCOPE: &str = "group";

fn noop(_args: &str) -> Box<dyn Directive> {
    Box::new(basic::Noop)
}

fn echo(args: &str) -> Box<dyn Directive> {
    Box::new(basic::Echo::new(args))
}

fn fail(args: &str) -> Box<dyn Directive> {
    Box::new(basic::Fail::new(args))
}

fn sleep(args: &str) -> Box<dyn Directive> {
    Box::new(basic::Sleep::new(args))
}

fn shell(args: &str) -> Box<dyn Directive> {
    Box::new(shell::Shell::new(args))
}

fn group(args: &str) -> Box<dyn Directive> {
    Box::new(group::Group::new(args))
}

/// Every built-in, in listing order.
pub const BUILTINS: [(&str, DirectiveSpec); 6] = [
    (
        "noop",
        DirectiveSpec {
            factory: noop,
            children: None,
            summary: "do nothing",
        },
    ),
    (
        "echo",
        DirectiveSpec {
            factory: echo,
            children: None,
            summary: "log the argument text",
        },
    ),
    (
        "fail",
        DirectiveSpec {
            factory: fail,
            children: None,
            summary: "fail with the argument text as message",
        },
    ),
    (
        "sleep",
        DirectiveSpec {
            factory: sleep,
            children: None,
            summary: "sleep SECONDS",
        },
    ),
    (
        "shell",
        DirectiveSpec {
            factory: shell,
            children: None,
            summary: "run a bash command; options: expect, cwd",
        },
    ),
    (
        "group",
        DirectiveSpec {
            factory: group,
            children: Some(GROUP_SCOPE),
            summary: "container for nested directives; options: setup, teardown",
        },
    ),
];

/// The built-ins, available at file level and inside `group`.
pub fn builtin_registry() -> Registry {
    let mut registry = Registry::new();
    for scope in [ROOT_SCOPE, GROUP_SCOPE] {
        for (name, spec) in BUILTINS {
            registry.register(scope, name, spec);
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runner::BatchRunner;
    use crate::core::testing::probe_context;

    #[test]
    fn test_sz023_registry_scopes() {
        let registry = builtin_registry();
        assert_eq!(registry.scopes().collect::<Vec<_>>(), [ROOT_SCOPE, GROUP_SCOPE]);
        let names: Vec<_> = registry.entries(GROUP_SCOPE).map(|(n, _)| n).collect();
        assert_eq!(names, ["noop", "echo", "fail", "sleep", "shell", "group"]);
        assert!(registry.lookup(Some(ROOT_SCOPE), "shell").is_ok());
        assert!(registry.lookup(None, "shell").is_err());
    }

    #[test]
    fn test_sz023_factories_build_named_handlers() {
        for (name, spec) in BUILTINS {
            assert_eq!((spec.factory)("x").name(), name);
        }
    }

    #[test]
    fn test_sz023_script_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("a.stz");
        std::fs::write(
            &script,
            "\
group outer
  setup = true
  echo first
  shell echo from-shell
  group inner
    noop
  echo last
",
        )
        .unwrap();
        let registry = builtin_registry();
        let (mut ctx, buf) = probe_context(false);
        let report = BatchRunner::new(&registry, 1).run(&mut ctx, &[script]);
        assert!(report.success(), "{}", buf.contents());
        let out = buf.contents();
        let first = out.find("first").unwrap();
        let shell = out.find("from-shell").unwrap();
        let last = out.find("    last").unwrap();
        assert!(first < shell && shell < last);
    }
}
