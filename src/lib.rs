//! cutwork: a text template compiler with whitespace-aware composition.
//!
//! Templates mix literal text with two kinds of blocks:
//! - `{{ ... }}` output blocks, rendering the value of an expression.
//! - `{% ... %}` directive blocks: `var`, `call`, `if`/`elseif`/`else`,
//!   `for`, `foreach`, `while`, `break`, `continue`, `return` and `end`.
//!
//! A `-` just inside a delimiter (`{{-`, `-%}` and so on) trims the adjacent
//! whitespace, at most one line break plus the indentation around it.
//!
//! Compilation runs the template through [`lexer::tokenize`],
//! [`suppress::suppress`], [`parser::parse`] and finally [`emit::emit`],
//! which produces two [`Procedure`]s per template: a plain one and one that
//! re-indents every line break with the caller's indentation. The latter is
//! what makes
//!
//! ```text
//! items:
//!     {% call Item(x) %}
//! ```
//!
//! indent every line `Item` writes, not only the first.
//!
//! Expressions are opaque to the compiler. Rendering hands them to an
//! [`Evaluator`]; [`Bindings`] is a small reference implementation. The same
//! syntax tree can instead be turned into Rust source with [`codegen`].
//!
//! ```
//! use cutwork::{compile, Bindings, Library};
//!
//! let template = compile("Hi {{ name }}!{% if admin %} (admin){% end %}").unwrap();
//! let mut bindings = Bindings::default();
//! bindings.set("name", "Ada");
//! bindings.set("admin", true);
//! let out = template.render(&mut bindings, &Library::new()).unwrap();
//! assert_eq!(out, "Hi Ada! (admin)");
//! ```

pub mod ast;
pub mod cache;
pub mod codegen;
pub mod config;
pub mod emit;
pub mod error;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod suppress;

use std::collections::HashMap;

pub use crate::ast::{Syntax, SyntaxList};
pub use crate::cache::TemplateCache;
pub use crate::config::{CodegenConfig, Config};
pub use crate::emit::{Mode, Procedure};
pub use crate::error::{ConfigError, Error, EvalError, ParseError, RenderError};
pub use crate::eval::{Bindings, Value};
pub use crate::runtime::{indent, Evaluator, Library, Renderer};

/// A compiled template: its syntax tree plus both rendering procedures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    syntax: SyntaxList,
    plain: Procedure,
    indented: Procedure,
    parameters: Vec<String>,
}

impl Template {
    /// Names the values a `call` binds, in argument order.
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn syntax(&self) -> &[Syntax] {
        &self.syntax
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn plain(&self) -> &Procedure {
        &self.plain
    }

    pub fn indented(&self) -> &Procedure {
        &self.indented
    }

    pub fn procedure(&self, mode: Mode) -> &Procedure {
        match mode {
            Mode::Plain => &self.plain,
            Mode::WhitespaceAware => &self.indented,
        }
    }

    pub fn render<E: Evaluator>(
        &self,
        evaluator: &mut E,
        library: &Library,
    ) -> Result<String, RenderError> {
        self.render_with(evaluator, library, &Config::default())
    }

    pub fn render_with<E: Evaluator>(
        &self,
        evaluator: &mut E,
        library: &Library,
        config: &Config,
    ) -> Result<String, RenderError> {
        let mut out = String::new();
        Renderer::new(evaluator, library, config).run(&self.plain, "", &mut out)?;
        Ok(out)
    }

    /// Renders as if called from a line indented by `whitespace`.
    pub fn render_indented<E: Evaluator>(
        &self,
        evaluator: &mut E,
        library: &Library,
        whitespace: &str,
    ) -> Result<String, RenderError> {
        let mut out = String::new();
        Renderer::new(evaluator, library, &Config::default()).run(
            &self.indented,
            whitespace,
            &mut out,
        )?;
        Ok(out)
    }

    /// Rust statements equivalent to this template in `mode`.
    pub fn to_rust(&self, mode: Mode, config: &CodegenConfig) -> String {
        codegen::generate_procedure(self.procedure(mode), config)
    }
}

pub fn compile(source: &str) -> Result<Template, ParseError> {
    compile_with(source, &Config::default())
}

pub fn compile_with(source: &str, config: &Config) -> Result<Template, ParseError> {
    let tokens = suppress::suppress(&lexer::tokenize(source));
    let syntax = parser::Parser::new(&tokens, source)
        .with_max_depth(config.max_depth)
        .parse()
        .map_err(|err| {
            log::debug!("template rejected: {err}");
            err
        })?;
    log::debug!(
        "compiled template: {} tokens, {} top-level nodes",
        tokens.len(),
        syntax.len()
    );

    Ok(Template {
        plain: emit::emit(&syntax, source, Mode::Plain),
        indented: emit::emit(&syntax, source, Mode::WhitespaceAware),
        source: source.to_string(),
        syntax,
        parameters: Vec::new(),
    })
}

/// Compiles and renders `source` once against `context`.
pub fn render(source: &str, context: HashMap<String, Value>) -> Result<String, Error> {
    let template = compile(source)?;
    let mut bindings = Bindings::new(context);
    Ok(template.render(&mut bindings, &Library::new())?)
}
