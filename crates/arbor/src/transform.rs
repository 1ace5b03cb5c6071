//! Transform passes: ordered groups of plugins merged into single
//! traversals.
//!
//! A plugin contributes a visitor plus optional `pre`/`post` lifecycle
//! hooks and per-plugin state. Plugins in one pass share a single
//! traversal: enter hooks for a node run in plugin declaration order,
//! and exit hooks run in that same declared order (a flat pipeline, not
//! a nested stack). Mutation performed by one plugin's hook is visible
//! to every later hook at the same node.
//!
//! Errors thrown by hooks are annotated with the responsible plugin's
//! name and the file being transformed before they reach the caller;
//! the traversal engine itself never swallows or retries anything.

use crate::ast::Ast;
use crate::error::{HookError, TransformError};
use crate::scope::ScopeIndex;
use crate::traverse::{run_exploded, Cursor, ExplodedVisitor, Visitor};
use std::any::Any;
use std::rc::Rc;
use tracing::debug;

/// Lifecycle hook (`pre`/`post`), applied to the plugin's state.
pub type LifecycleFn = Box<dyn Fn(&mut dyn Any) -> Result<(), HookError>>;

/// Factory for a plugin's per-file state.
pub type StateFn = Box<dyn Fn() -> Box<dyn Any>>;

/// One transform plugin.
pub struct Plugin {
    pub name: String,
    visitor: Visitor,
    pre: Option<LifecycleFn>,
    post: Option<LifecycleFn>,
    /// Merged under this plugin: the inherited plugin's `pre` runs after
    /// this plugin's `pre`, its `post` runs before this plugin's `post`,
    /// and its visitor hooks are appended after this plugin's. The
    /// inherited hooks share this plugin's state.
    inherits: Option<Box<Plugin>>,
    make_state: Option<StateFn>,
}

impl Plugin {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visitor: Visitor::new(),
            pre: None,
            post: None,
            inherits: None,
            make_state: None,
        }
    }

    pub fn with_visitor(mut self, visitor: Visitor) -> Self {
        self.visitor = visitor;
        self
    }

    pub fn with_pre<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut dyn Any) -> Result<(), HookError> + 'static,
    {
        self.pre = Some(Box::new(f));
        self
    }

    pub fn with_post<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut dyn Any) -> Result<(), HookError> + 'static,
    {
        self.post = Some(Box::new(f));
        self
    }

    pub fn with_state<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Box<dyn Any> + 'static,
    {
        self.make_state = Some(Box::new(f));
        self
    }

    pub fn inherits(mut self, parent: Plugin) -> Self {
        self.inherits = Some(Box::new(parent));
        self
    }

    /// This plugin's visitors, heir first, inheritance chain appended.
    fn visitor_chain(&self) -> Vec<&Visitor> {
        let mut chain = vec![&self.visitor];
        let mut cursor = self.inherits.as_deref();
        while let Some(inherited) = cursor {
            chain.push(&inherited.visitor);
            cursor = inherited.inherits.as_deref();
        }
        chain
    }

    /// `pre` hooks in execution order: heir first, then inherited.
    fn pre_chain(&self) -> Vec<&LifecycleFn> {
        let mut chain = Vec::new();
        let mut cursor = Some(self);
        while let Some(plugin) = cursor {
            if let Some(pre) = &plugin.pre {
                chain.push(pre);
            }
            cursor = plugin.inherits.as_deref();
        }
        chain
    }

    /// `post` hooks in execution order: inherited first, then heir.
    fn post_chain(&self) -> Vec<&LifecycleFn> {
        let mut chain = self
            .inherits
            .as_deref()
            .map(|p| p.post_chain())
            .unwrap_or_default();
        if let Some(post) = &self.post {
            chain.push(post);
        }
        chain
    }

    fn fresh_state(&self) -> Box<dyn Any> {
        match &self.make_state {
            Some(f) => f(),
            None => Box::new(()),
        }
    }
}

/// One ordered group of plugins executed as a single merged traversal.
pub struct Pass {
    pub plugins: Vec<Plugin>,
}

impl Pass {
    pub fn new(plugins: Vec<Plugin>) -> Self {
        Self { plugins }
    }
}

/// Runs ordered passes over a tree.
#[derive(Default)]
pub struct PassRunner {
    passes: Vec<Pass>,
    pub filename: Option<String>,
}

impl PassRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn add_pass(&mut self, pass: Pass) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Run every pass in order. Each pass is one traversal of the whole
    /// tree with the pass's plugins merged.
    pub fn run(
        &self,
        ast: &mut Ast,
        mut scopes: Option<&mut ScopeIndex>,
    ) -> Result<(), TransformError> {
        for (pass_index, pass) in self.passes.iter().enumerate() {
            debug!(pass = pass_index, plugins = pass.plugins.len(), "running transform pass");
            self.run_pass(pass, ast, scopes.as_deref_mut())?;
        }
        Ok(())
    }

    fn run_pass(
        &self,
        pass: &Pass,
        ast: &mut Ast,
        scopes: Option<&mut ScopeIndex>,
    ) -> Result<(), TransformError> {
        // Merge visitors: one state slot per plugin; inherited visitors
        // share the heir's slot and are appended after it.
        let mut tagged: Vec<Visitor> = Vec::new();
        let mut layout: Vec<(usize, usize)> = Vec::new(); // (state slot, visitor idx)
        for (slot, plugin) in pass.plugins.iter().enumerate() {
            for visitor in plugin.visitor_chain() {
                layout.push((slot, tagged.len()));
                tagged.push(tag_visitor(visitor, &plugin.name));
            }
        }
        let pairs: Vec<(usize, &Visitor)> = layout
            .iter()
            .map(|(slot, idx)| (*slot, &tagged[*idx]))
            .collect();
        let exploded = ExplodedVisitor::build(&pairs).map_err(|e| TransformError {
            plugin: "<merge>".to_string(),
            file: self.filename.clone(),
            source: Box::new(e),
        })?;

        let mut states: Vec<Box<dyn Any>> =
            pass.plugins.iter().map(|p| p.fresh_state()).collect();

        // pre
        for (slot, plugin) in pass.plugins.iter().enumerate() {
            for pre in plugin.pre_chain() {
                pre(states[slot].as_mut())
                    .map_err(|e| self.annotate(&plugin.name, e))?;
            }
        }

        // traversal
        let root = ast.root;
        states = run_exploded(ast, root, &exploded, scopes, states)
            .map_err(|e| self.annotate_hook_error(e))?;

        // post
        for (slot, plugin) in pass.plugins.iter().enumerate() {
            for post in plugin.post_chain() {
                post(states[slot].as_mut())
                    .map_err(|e| self.annotate(&plugin.name, e))?;
            }
        }
        Ok(())
    }

    fn annotate(&self, plugin: &str, source: HookError) -> TransformError {
        TransformError {
            plugin: plugin.to_string(),
            file: self.filename.clone(),
            source,
        }
    }

    /// Hook errors arrive already tagged with the plugin name by the
    /// visitor wrapper; fill in the file.
    fn annotate_hook_error(&self, error: HookError) -> TransformError {
        match error.downcast::<TransformError>() {
            Ok(mut tagged) => {
                tagged.file = self.filename.clone();
                *tagged
            }
            Err(other) => TransformError {
                plugin: "<engine>".to_string(),
                file: self.filename.clone(),
                source: other,
            },
        }
    }
}

/// Wrap every hook of a visitor so failures carry the plugin's name.
fn tag_visitor(visitor: &Visitor, plugin: &str) -> Visitor {
    visitor.map_hooks(|f| {
        let plugin = plugin.to_string();
        let wrapped: crate::traverse::VisitFn =
            Rc::new(move |cursor: &mut Cursor<'_>, state: &mut dyn Any| {
                f(cursor, state).map_err(|e| {
                    Box::new(TransformError { plugin: plugin.clone(), file: None, source: e })
                        as HookError
                })
            });
        wrapped
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeKind, NodeType};
    use crate::parser::{Parser, ParserOptions};
    use std::cell::RefCell;

    fn parse(source: &str) -> Ast {
        Parser::new(source, ParserOptions::default())
            .expect("valid options")
            .parse()
            .expect("parse succeeds")
            .ast
    }

    /// Shared log for observing cross-plugin ordering.
    type SharedLog = Rc<RefCell<Vec<String>>>;

    fn logging_plugin(name: &str, key: &str, log: SharedLog) -> Plugin {
        let mut visitor = Visitor::new();
        let enter_log = Rc::clone(&log);
        let plugin_name = name.to_string();
        visitor.on_enter(key, move |_, _| {
            enter_log.borrow_mut().push(format!("{plugin_name}-enter"));
            Ok(())
        });
        let exit_log = Rc::clone(&log);
        let plugin_name = name.to_string();
        visitor.on_exit(key, move |_, _| {
            exit_log.borrow_mut().push(format!("{plugin_name}-exit"));
            Ok(())
        });
        Plugin::new(name).with_visitor(visitor)
    }

    #[test]
    fn test_merged_order_enter_and_exit_both_declared_order() {
        let mut ast = parse("f();");
        let log: SharedLog = Rc::new(RefCell::new(Vec::new()));
        let pass = Pass::new(vec![
            logging_plugin("a", "CallExpression", Rc::clone(&log)),
            logging_plugin("b", "CallExpression", Rc::clone(&log)),
        ]);
        let mut runner = PassRunner::new();
        runner.add_pass(pass);
        runner.run(&mut ast, None).unwrap();
        assert_eq!(
            log.borrow().clone(),
            vec!["a-enter", "b-enter", "a-exit", "b-exit"]
        );
    }

    #[test]
    fn test_replacement_by_first_plugin_seen_by_second() {
        let mut ast = parse("1;");
        let log: SharedLog = Rc::new(RefCell::new(Vec::new()));

        let mut va = Visitor::new();
        va.on_enter("NumericLiteral", |cursor, _| {
            cursor.replace_with(NodeKind::BooleanLiteral { value: true });
            Ok(())
        });

        let mut vb = Visitor::new();
        let blog = Rc::clone(&log);
        vb.on_enter("BooleanLiteral", move |_, _| {
            blog.borrow_mut().push("b-saw-boolean".into());
            Ok(())
        });

        let pass = Pass::new(vec![
            Plugin::new("a").with_visitor(va),
            Plugin::new("b").with_visitor(vb),
        ]);
        let mut runner = PassRunner::new();
        runner.add_pass(pass);
        runner.run(&mut ast, None).unwrap();
        assert_eq!(log.borrow().clone(), vec!["b-saw-boolean"]);
        let root = ast.root;
        assert!(crate::traverse::has_type(&mut ast, root, NodeType::BooleanLiteral, &[]));
    }

    #[test]
    fn test_per_plugin_state_isolation() {
        let mut ast = parse("a; b; c;");
        let mk = |step: usize| {
            let mut visitor = Visitor::new();
            visitor.on_enter("Identifier", move |_, state| {
                *state.downcast_mut::<usize>().unwrap() += step;
                Ok(())
            });
            Plugin::new(format!("count-{step}"))
                .with_visitor(visitor)
                .with_state(move || Box::new(0usize))
                .with_post(move |state| {
                    let count = *state.downcast_ref::<usize>().unwrap();
                    if count != 3 * step {
                        return Err(format!("expected {}, got {count}", 3 * step).into());
                    }
                    Ok(())
                })
        };
        let pass = Pass::new(vec![mk(1), mk(10)]);
        let mut runner = PassRunner::new();
        runner.add_pass(pass);
        runner.run(&mut ast, None).unwrap();
    }

    #[test]
    fn test_inherits_lifecycle_order() {
        let mut ast = parse(";");
        let log: SharedLog = Rc::new(RefCell::new(Vec::new()));

        let mk_lifecycle = |tag: &str, log: &SharedLog| {
            let log = Rc::clone(log);
            let tag = tag.to_string();
            move |_: &mut dyn Any| {
                log.borrow_mut().push(tag.clone());
                Ok(())
            }
        };

        let parent = Plugin::new("parent")
            .with_pre(mk_lifecycle("parent-pre", &log))
            .with_post(mk_lifecycle("parent-post", &log));
        let heir = Plugin::new("heir")
            .with_pre(mk_lifecycle("heir-pre", &log))
            .with_post(mk_lifecycle("heir-post", &log))
            .inherits(parent);

        let mut runner = PassRunner::new();
        runner.add_pass(Pass::new(vec![heir]));
        runner.run(&mut ast, None).unwrap();
        // Inherited pre runs after the heir's; inherited post runs
        // before the heir's.
        assert_eq!(
            log.borrow().clone(),
            vec!["heir-pre", "parent-pre", "parent-post", "heir-post"]
        );
    }

    #[test]
    fn test_inherited_visitor_merged_after_heir() {
        let mut ast = parse("x;");
        let log: SharedLog = Rc::new(RefCell::new(Vec::new()));

        let mut parent_visitor = Visitor::new();
        let plog = Rc::clone(&log);
        parent_visitor.on_enter("Identifier", move |_, _| {
            plog.borrow_mut().push("parent".into());
            Ok(())
        });
        let mut heir_visitor = Visitor::new();
        let hlog = Rc::clone(&log);
        heir_visitor.on_enter("Identifier", move |_, _| {
            hlog.borrow_mut().push("heir".into());
            Ok(())
        });

        let plugin = Plugin::new("heir")
            .with_visitor(heir_visitor)
            .inherits(Plugin::new("parent").with_visitor(parent_visitor));
        let mut runner = PassRunner::new();
        runner.add_pass(Pass::new(vec![plugin]));
        runner.run(&mut ast, None).unwrap();
        assert_eq!(log.borrow().clone(), vec!["heir", "parent"]);
    }

    #[test]
    fn test_transform_error_names_plugin_and_file() {
        let mut ast = parse("x;");
        let mut visitor = Visitor::new();
        visitor.on_enter("Identifier", |_, _| Err("kaboom".into()));
        let mut runner = PassRunner::new().with_filename("src/app.js");
        runner.add_pass(Pass::new(vec![Plugin::new("exploder").with_visitor(visitor)]));
        let err = runner.run(&mut ast, None).unwrap_err();
        assert_eq!(err.plugin, "exploder");
        assert_eq!(err.file.as_deref(), Some("src/app.js"));
        assert!(err.to_string().contains("exploder"));
        assert!(err.to_string().contains("src/app.js"));
    }

    #[test]
    fn test_scope_available_to_plugins() {
        let mut ast = parse("const n = 1; n; n;");
        let mut scopes = crate::scope::ScopeIndex::new();
        scopes.crawl(&ast, ast.root).unwrap();

        let mut visitor = Visitor::new();
        visitor.on_enter("Program", |cursor, state| {
            let scope = cursor.scope().expect("program scope exists");
            let index = cursor.scope_index().expect("scope index attached");
            let (_, binding) = index.get_binding(scope, "n").expect("n is bound");
            *state.downcast_mut::<usize>().unwrap() = binding.references();
            Ok(())
        });

        let plugin = Plugin::new("inspect")
            .with_visitor(visitor)
            .with_state(|| Box::new(0usize))
            .with_post(|state| {
                if *state.downcast_ref::<usize>().unwrap() != 2 {
                    return Err("wrong reference count".into());
                }
                Ok(())
            });
        let mut runner = PassRunner::new();
        runner.add_pass(Pass::new(vec![plugin]));
        runner.run(&mut ast, Some(&mut scopes)).unwrap();
    }
}
