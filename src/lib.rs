//! jinjacraft: render Jinja-style templates from YAML/JSON data, and infer
//! the data a template expects.
//!
//! The crate carries its own small template engine (lexer, parser,
//! renderer) and two tools built on its syntax tree:
//! - [`analyze`] walks a template and infers a shape model: which
//!   top-level names it reads, which of those are objects or lists, which
//!   attributes list items carry, and which values are used as conditions.
//! - [`emit`] turns that model into a placeholder data document, either
//!   YAML with a type comment on every key or plain JSON.
//!
//! Rendering is checked against the data first: [`validate`] compares the
//! template's free variables with the data file's top-level keys.
//!
//! Analysis is lexical. A name is shadowed inside a `for` body when it is
//! one of the loop's targets (or `loop` itself), and only there. Values
//! are never evaluated while analyzing, so the model says nothing about
//! which branches a given data document would take.
//!
//! Newline semantics:
//! - The renderer never injects `\n`; output newlines are the template's.
//! - Trailing newlines are preserved.
//! - `{%-`/`-%}` and `{{-`/`-}}` strip whitespace next to a tag.

pub mod analyze;
pub mod ast;
pub mod cli;
pub mod data;
pub mod emit;
pub mod error;
pub mod eval;
pub mod generate;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod shape;
pub mod validate;
pub mod value;

pub use analyze::analyze;
pub use data::{load_data, DataFormat};
pub use emit::{emit, Emission, ModelFormat};
pub use error::{Error, Result};
pub use eval::render;
pub use generate::{generate_model, generate_model_file, render_files};
pub use shape::{Model, Placeholder, Shape};
pub use value::Value;
