//! Rust source generation.
//!
//! Generated statements append to a `&mut String` named by
//! [`CodegenConfig::builder`]. Whitespace-aware code additionally reads the
//! `&str` named by [`CodegenConfig::whitespace`] and calls the crate's
//! [`indent`](crate::runtime::indent).

use crate::ast::Syntax;
use crate::config::CodegenConfig;
use crate::emit::{emit, Branch, CallIndent, Mode, Op, Procedure};
use crate::parser::split_parameters;

/// Rust statements rendering `syntax` in `mode`.
pub fn generate(syntax: &[Syntax], source: &str, mode: Mode, config: &CodegenConfig) -> String {
    generate_procedure(&emit(syntax, source, mode), config)
}

pub fn generate_procedure(procedure: &Procedure, config: &CodegenConfig) -> String {
    let mut writer = Writer::new(config);
    writer.ops(&procedure.ops);
    writer.out
}

/// A plain render function and its whitespace-aware twin.
///
/// `parameters` are `(name, type)` pairs written verbatim after the builder.
pub fn generate_functions(
    name: &str,
    parameters: &[(&str, &str)],
    syntax: &[Syntax],
    source: &str,
    config: &CodegenConfig,
) -> String {
    let declared: String = parameters
        .iter()
        .map(|(param, ty)| format!(", {param}: {ty}"))
        .collect();
    let mut out = String::new();
    for (mode, suffix, extra) in [
        (Mode::Plain, "", String::new()),
        (
            Mode::WhitespaceAware,
            config.indented_suffix.as_str(),
            format!(", {}: &str", config.whitespace),
        ),
    ] {
        let mut writer = Writer::new(config);
        writer.line(&format!(
            "pub fn {name}{suffix}({}: &mut String{declared}{extra}) {{",
            config.builder
        ));
        writer.nested(|w| w.ops(&emit(syntax, source, mode).ops));
        writer.line("}");
        out.push_str(&writer.out);
    }
    out
}

/// Rewrites `++`/`--` into compound assignment.
fn step_statement(step: &str) -> String {
    if let Some(name) = step.strip_suffix("++") {
        format!("{} += 1", name.trim_end())
    } else if let Some(name) = step.strip_suffix("--") {
        format!("{} -= 1", name.trim_end())
    } else {
        step.to_string()
    }
}

/// A `var` statement as Rust. Updates assign in place; declarations bind
/// mutably so later updates can reach them.
fn var_statement(statement: &str) -> String {
    let statement = statement.trim();
    let name = statement
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(statement.len());
    let rest = statement[name..].trim_start();
    if ["+=", "-=", "++", "--"].iter().any(|op| rest.starts_with(op)) {
        format!("{};", step_statement(statement))
    } else if statement.starts_with("mut ") {
        format!("let {statement};")
    } else {
        format!("let mut {statement};")
    }
}

/// How `break`/`continue` are spelled inside the innermost loop.
struct Frame {
    break_to: Option<String>,
    continue_to: Option<String>,
}

struct Writer<'c> {
    config: &'c CodegenConfig,
    out: String,
    depth: usize,
    frames: Vec<Frame>,
    labels: usize,
}

impl<'c> Writer<'c> {
    fn new(config: &'c CodegenConfig) -> Self {
        Self {
            config,
            out: String::new(),
            depth: 0,
            frames: Vec::new(),
            labels: 0,
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn looped(&mut self, frame: Frame, body: &[Op]) {
        self.frames.push(frame);
        self.nested(|w| w.ops(body));
        self.frames.pop();
    }

    fn push(&mut self, value: &str) {
        let line = format!("{}.push_str({value});", self.config.builder);
        self.line(&line);
    }

    fn indented(&self, value: &str) -> String {
        format!(
            "&{}::indent({value}, {})",
            self.config.runtime_path, self.config.whitespace
        )
    }

    fn call_whitespace(&self, indent: &CallIndent) -> String {
        match (indent.ambient, indent.extra.is_empty()) {
            (true, true) => self.config.whitespace.clone(),
            (true, false) => format!(
                "&format!(\"{{}}{{}}\", {}, {:?})",
                self.config.whitespace, indent.extra
            ),
            (false, _) => format!("{:?}", indent.extra),
        }
    }

    fn ops(&mut self, ops: &[Op]) {
        for op in ops {
            self.op(op);
        }
    }

    fn op(&mut self, op: &Op) {
        match op {
            Op::Text { text, indent: false } => self.push(&format!("{text:?}")),
            Op::Text { text, indent: true } => {
                let value = self.indented(&format!("{text:?}"));
                self.push(&value);
            }
            Op::Render {
                expression,
                indent: false,
            } => self.push(&format!("&({expression}).to_string()")),
            Op::Render { expression, indent: true } => {
                let value = self.indented(&format!("&({expression}).to_string()"));
                self.push(&value);
            }
            Op::Declare(statement) => self.line(&var_statement(statement)),
            Op::Call {
                name,
                arguments,
                indent,
            } => {
                let mut call = if indent.is_none() {
                    format!("{name}({}", self.config.builder)
                } else {
                    format!("{name}{}({}", self.config.indented_suffix, self.config.builder)
                };
                for argument in arguments {
                    call.push_str(", ");
                    call.push_str(argument);
                }
                if !indent.is_none() {
                    call.push_str(", ");
                    call.push_str(&self.call_whitespace(indent));
                }
                call.push_str(");");
                self.line(&call);
            }
            Op::If { branches, otherwise } => self.branches(branches, otherwise.as_deref()),
            Op::For { header, body } => self.for_loop(header, body),
            Op::Foreach { header, body } => {
                self.line(&format!("for {header} {{"));
                self.looped(Frame { break_to: None, continue_to: None }, body);
                self.line("}");
            }
            Op::While { condition, body } => {
                self.line(&format!("while {condition} {{"));
                self.looped(Frame { break_to: None, continue_to: None }, body);
                self.line("}");
            }
            Op::Break => {
                let label = self.frames.last().and_then(|f| f.break_to.clone());
                match label {
                    Some(label) => self.line(&format!("break {label};")),
                    None => self.line("break;"),
                }
            }
            Op::Continue => {
                let label = self.frames.last().and_then(|f| f.continue_to.clone());
                match label {
                    Some(label) => self.line(&format!("break {label};")),
                    None => self.line("continue;"),
                }
            }
            Op::Return => self.line("return;"),
        }
    }

    fn branches(&mut self, branches: &[Branch], otherwise: Option<&[Op]>) {
        for (i, branch) in branches.iter().enumerate() {
            let keyword = if i == 0 { "if" } else { "} else if" };
            self.line(&format!("{keyword} {} {{", branch.condition));
            self.nested(|w| w.ops(&branch.body));
        }
        if let Some(body) = otherwise {
            self.line("} else {");
            self.nested(|w| w.ops(body));
        }
        self.line("}");
    }

    /// `init; condition; step` becomes a scoped `while` whose body sits in a
    /// labeled block, so `continue` still reaches the step.
    fn for_loop(&mut self, header: &str, body: &[Op]) {
        let parts = split_parameters(header, ';');
        let [init, condition, step] = parts.as_slice() else {
            self.line(&format!("for {header} {{"));
            self.looped(Frame { break_to: None, continue_to: None }, body);
            self.line("}");
            return;
        };
        let (init, condition, step) = (
            header[init.clone()].trim(),
            header[condition.clone()].trim(),
            header[step.clone()].trim(),
        );

        self.labels += 1;
        let outer = format!("'loop_{}", self.labels);
        let inner = format!("'body_{}", self.labels);

        self.line("{");
        self.nested(|w| {
            if !init.is_empty() {
                if init.starts_with("mut ") {
                    w.line(&format!("let {init};"));
                } else {
                    w.line(&format!("let mut {init};"));
                }
            }
            let condition = if condition.is_empty() { "true" } else { condition };
            w.line(&format!("{outer}: while {condition} {{"));
            w.nested(|w| {
                w.line(&format!("{inner}: {{"));
                w.looped(
                    Frame {
                        break_to: Some(outer.clone()),
                        continue_to: Some(inner.clone()),
                    },
                    body,
                );
                w.line("}");
                if !step.is_empty() {
                    w.line(&format!("{};", step_statement(step)));
                }
            });
            w.line("}");
        });
        self.line("}");
    }
}
