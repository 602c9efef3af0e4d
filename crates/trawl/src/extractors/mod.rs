// ABOUTME: Declarative field extraction: selectors, normalization, transforms and fields.
// ABOUTME: Everything here is synchronous and works on one parsed Document at a time.

//! Field extraction module.
//!
//! Submodules:
//! - `compiled`: process-wide cache of compiled CSS selectors.
//! - `select`: path expressions and selector unions.
//! - `normalize`: canonical value tables.
//! - `transform`: declarative value transforms and the parser hook type.
//! - `field`: `FieldSpec` configuration and the evaluable `FieldExtractor`.

pub mod compiled;
pub mod field;
pub mod normalize;
pub mod select;
pub mod transform;
