//! Executes [`Procedure`]s against a host [`Evaluator`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::emit::{Branch, CallIndent, Op, Procedure};
use crate::error::{EvalError, RenderError};
use crate::parser::split_parameters;
use crate::Template;

/// Host-side expression language.
///
/// Template expressions, conditions and statements are opaque text; the
/// renderer only hands them to the evaluator. Scopes nest the way template
/// bodies do: every `if` arm, loop iteration and template call gets one.
pub trait Evaluator {
    type Value: fmt::Display;

    fn evaluate(&mut self, expression: &str) -> Result<Self::Value, EvalError>;

    fn is_truthy(&self, value: &Self::Value) -> bool;

    /// Elements a `foreach` walks over.
    fn items(&self, value: Self::Value) -> Result<Vec<Self::Value>, EvalError>;

    /// Runs a statement: a `var` declaration or a `for` loop step.
    fn execute(&mut self, statement: &str) -> Result<(), EvalError>;

    /// Declares `name` in the innermost scope.
    fn bind(&mut self, name: &str, value: Self::Value);

    fn push_scope(&mut self);

    fn pop_scope(&mut self);

    fn condition(&mut self, expression: &str) -> Result<bool, EvalError> {
        let value = self.evaluate(expression)?;
        Ok(self.is_truthy(&value))
    }
}

/// Inserts `whitespace` after every line break of `text`.
pub fn indent(text: &str, whitespace: &str) -> String {
    if whitespace.is_empty() {
        return text.to_string();
    }
    text.replace('\n', &format!("\n{whitespace}"))
}

/// Named templates reachable from `call` statements.
#[derive(Debug, Clone, Default)]
pub struct Library {
    templates: HashMap<String, Arc<Template>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        template: impl Into<Arc<Template>>,
    ) -> Option<Arc<Template>> {
        self.templates.insert(name.into(), template.into())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Procedure {
    /// Renders into `out` with the default limits and no indentation.
    pub fn render<E: Evaluator>(
        &self,
        evaluator: &mut E,
        library: &Library,
        out: &mut String,
    ) -> Result<(), RenderError> {
        Renderer::new(evaluator, library, &Config::default()).run(self, "", out)
    }
}

/// How a sequence of ops finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
    Return,
}

/// Parsed `for` header.
#[derive(Debug, PartialEq, Eq)]
enum ForHeader<'h> {
    Counted {
        init: &'h str,
        condition: &'h str,
        step: &'h str,
    },
    Each {
        binding: &'h str,
        iterable: &'h str,
    },
}

fn each_header(header: &str) -> Option<(&str, &str)> {
    let (binding, iterable) = header.split_once(" in ")?;
    let binding = binding.trim();
    let iterable = iterable.trim();
    let is_identifier = binding
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && binding.chars().all(|c| c.is_alphanumeric() || c == '_');
    (is_identifier && !iterable.is_empty()).then_some((binding, iterable))
}

fn for_header(header: &str) -> Option<ForHeader<'_>> {
    let parts = split_parameters(header, ';');
    if let [init, condition, step] = parts.as_slice() {
        return Some(ForHeader::Counted {
            init: header[init.clone()].trim(),
            condition: header[condition.clone()].trim(),
            step: header[step.clone()].trim(),
        });
    }
    if parts.len() != 1 {
        return None;
    }
    let (binding, iterable) = each_header(header)?;
    Some(ForHeader::Each { binding, iterable })
}

fn eval_error(expression: &str) -> impl FnOnce(EvalError) -> RenderError + '_ {
    move |source| RenderError::Eval {
        expression: expression.to_string(),
        source,
    }
}

/// Walks procedures, tracking call depth and loop limits.
pub struct Renderer<'a, E: Evaluator> {
    evaluator: &'a mut E,
    library: &'a Library,
    loop_limit: usize,
    max_call_depth: usize,
    depth: usize,
}

impl<'a, E: Evaluator> Renderer<'a, E> {
    pub fn new(evaluator: &'a mut E, library: &'a Library, config: &Config) -> Self {
        Self {
            evaluator,
            library,
            loop_limit: config.loop_limit,
            max_call_depth: config.max_call_depth,
            depth: 0,
        }
    }

    /// Renders `procedure` with `whitespace` as its ambient indentation.
    pub fn run(
        &mut self,
        procedure: &Procedure,
        whitespace: &str,
        out: &mut String,
    ) -> Result<(), RenderError> {
        match self.ops(&procedure.ops, whitespace, out)? {
            Flow::Break => Err(RenderError::StrayControl("break")),
            Flow::Continue => Err(RenderError::StrayControl("continue")),
            Flow::Normal | Flow::Return => Ok(()),
        }
    }

    fn evaluate(&mut self, expression: &str) -> Result<E::Value, RenderError> {
        self.evaluator
            .evaluate(expression)
            .map_err(eval_error(expression))
    }

    fn condition(&mut self, expression: &str) -> Result<bool, RenderError> {
        if expression.is_empty() {
            return Ok(true);
        }
        self.evaluator
            .condition(expression)
            .map_err(eval_error(expression))
    }

    fn execute(&mut self, statement: &str) -> Result<(), RenderError> {
        if statement.is_empty() {
            return Ok(());
        }
        self.evaluator
            .execute(statement)
            .map_err(eval_error(statement))
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.evaluator.push_scope();
        let result = f(self);
        self.evaluator.pop_scope();
        result
    }

    fn ops(&mut self, ops: &[Op], whitespace: &str, out: &mut String) -> Result<Flow, RenderError> {
        for op in ops {
            let flow = self.op(op, whitespace, out)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn op(&mut self, op: &Op, whitespace: &str, out: &mut String) -> Result<Flow, RenderError> {
        match op {
            Op::Text { text, indent: false } => out.push_str(text),
            Op::Text { text, indent: true } => out.push_str(&indent(text, whitespace)),
            Op::Render { expression, indent: apply } => {
                let rendered = self.evaluate(expression)?.to_string();
                if *apply {
                    out.push_str(&indent(&rendered, whitespace));
                } else {
                    out.push_str(&rendered);
                }
            }
            Op::Declare(statement) => self.execute(statement)?,
            Op::Call {
                name,
                arguments,
                indent,
            } => self.call(name, arguments, indent, whitespace, out)?,
            Op::If { branches, otherwise } => {
                return self.branch(branches, otherwise.as_deref(), whitespace, out)
            }
            Op::For { header, body } => return self.for_loop(header, body, whitespace, out),
            Op::Foreach { header, body } => {
                let (binding, iterable) =
                    each_header(header).ok_or_else(|| RenderError::LoopHeader {
                        keyword: "foreach",
                        header: header.clone(),
                    })?;
                return self.each(binding, iterable, body, whitespace, out);
            }
            Op::While { condition, body } => {
                let mut iterations = 0;
                while self.condition(condition)? {
                    self.count(&mut iterations)?;
                    match self.scoped(|r| r.ops(body, whitespace, out))? {
                        Flow::Break => break,
                        Flow::Return => return Ok(Flow::Return),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Op::Break => return Ok(Flow::Break),
            Op::Continue => return Ok(Flow::Continue),
            Op::Return => return Ok(Flow::Return),
        }
        Ok(Flow::Normal)
    }

    fn count(&self, iterations: &mut usize) -> Result<(), RenderError> {
        *iterations += 1;
        if *iterations > self.loop_limit {
            log::warn!("loop stopped after {} iterations", self.loop_limit);
            return Err(RenderError::LoopLimit {
                limit: self.loop_limit,
            });
        }
        Ok(())
    }

    fn branch(
        &mut self,
        branches: &[Branch],
        otherwise: Option<&[Op]>,
        whitespace: &str,
        out: &mut String,
    ) -> Result<Flow, RenderError> {
        for branch in branches {
            if self.condition(&branch.condition)? {
                return self.scoped(|r| r.ops(&branch.body, whitespace, out));
            }
        }
        match otherwise {
            Some(body) => self.scoped(|r| r.ops(body, whitespace, out)),
            None => Ok(Flow::Normal),
        }
    }

    fn for_loop(
        &mut self,
        header: &str,
        body: &[Op],
        whitespace: &str,
        out: &mut String,
    ) -> Result<Flow, RenderError> {
        let parsed = for_header(header).ok_or_else(|| RenderError::LoopHeader {
            keyword: "for",
            header: header.to_string(),
        })?;
        let (init, condition, step) = match parsed {
            ForHeader::Each { binding, iterable } => {
                return self.each(binding, iterable, body, whitespace, out)
            }
            ForHeader::Counted {
                init,
                condition,
                step,
            } => (init, condition, step),
        };
        self.scoped(|r| -> Result<Flow, RenderError> {
            r.execute(init)?;
            let mut iterations = 0;
            while r.condition(condition)? {
                r.count(&mut iterations)?;
                match r.scoped(|r| r.ops(body, whitespace, out))? {
                    Flow::Break => break,
                    Flow::Return => return Ok(Flow::Return),
                    Flow::Normal | Flow::Continue => {}
                }
                r.execute(step)?;
            }
            Ok(Flow::Normal)
        })
    }

    fn each(
        &mut self,
        binding: &str,
        iterable: &str,
        body: &[Op],
        whitespace: &str,
        out: &mut String,
    ) -> Result<Flow, RenderError> {
        let value = self.evaluate(iterable)?;
        let items = self
            .evaluator
            .items(value)
            .map_err(eval_error(iterable))?;
        let mut iterations = 0;
        for item in items {
            self.count(&mut iterations)?;
            let flow = self.scoped(|r| {
                r.evaluator.bind(binding, item);
                r.ops(body, whitespace, out)
            })?;
            match flow {
                Flow::Break => break,
                Flow::Return => return Ok(Flow::Return),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    fn call(
        &mut self,
        name: &str,
        arguments: &[String],
        indent: &CallIndent,
        whitespace: &str,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let library = self.library;
        let template = library
            .get(name)
            .ok_or_else(|| RenderError::UnknownTemplate(name.to_string()))?;
        let parameters = template.parameters();
        if parameters.len() != arguments.len() {
            return Err(RenderError::ArgumentCount {
                name: name.to_string(),
                expected: parameters.len(),
                found: arguments.len(),
            });
        }
        if self.depth >= self.max_call_depth {
            return Err(RenderError::CallDepth {
                limit: self.max_call_depth,
            });
        }

        let values = arguments
            .iter()
            .map(|argument| self.evaluate(argument))
            .collect::<Result<Vec<_>, _>>()?;

        let (procedure, callee_whitespace) = if indent.is_none() {
            (template.plain(), String::new())
        } else {
            (template.indented(), indent.resolve(whitespace))
        };
        log::trace!("call {name} with indentation {callee_whitespace:?}");

        self.depth += 1;
        let result = self.scoped(|r| {
            for (parameter, value) in parameters.iter().zip(values) {
                r.evaluator.bind(parameter, value);
            }
            r.run(procedure, &callee_whitespace, out)
        });
        self.depth -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indent_after_each_newline() {
        assert_eq!(indent("a\nb\n", "  "), "a\n  b\n  ");
        assert_eq!(indent("a\nb", ""), "a\nb");
        assert_eq!(indent("plain", "\t"), "plain");
    }

    #[test]
    fn each_header_forms() {
        assert_eq!(each_header("item in items"), Some(("item", "items")));
        assert_eq!(each_header(" x in range(0, 3) "), Some(("x", "range(0, 3)")));
        assert_eq!(each_header("a b in items"), None);
        assert_eq!(each_header("x in "), None);
        assert_eq!(each_header("items"), None);
    }

    #[test]
    fn for_header_forms() {
        assert_eq!(
            for_header("i = 0; i < 3; i++"),
            Some(ForHeader::Counted {
                init: "i = 0",
                condition: "i < 3",
                step: "i++"
            })
        );
        assert_eq!(
            for_header("; ; "),
            Some(ForHeader::Counted {
                init: "",
                condition: "",
                step: ""
            })
        );
        assert_eq!(
            for_header("s in \"a;b\""),
            Some(ForHeader::Each {
                binding: "s",
                iterable: "\"a;b\""
            })
        );
        assert_eq!(for_header("a; b"), None);
        assert_eq!(for_header("nothing"), None);
    }

    #[test]
    fn procedure_appends_to_buffer() {
        let template = crate::compile("b{{ 1 + 1 }}").unwrap();
        let mut out = String::from("a");
        template
            .plain()
            .render(&mut crate::Bindings::default(), &Library::new(), &mut out)
            .unwrap();
        assert_eq!(out, "ab2");
    }

    #[test]
    fn library_lookup() {
        let mut library = Library::new();
        assert!(library.is_empty());
        library.insert("Item", crate::compile("x").unwrap());
        assert!(library.contains("Item"));
        assert_eq!(library.len(), 1);
        assert!(library.get("Other").is_none());
    }
}
