//! Filter expression compiling and matching
//!
//! Filter text is parsed into a generic expression tree, compiled into a
//! [`CompiledFilter`], and then turned into either a [`RecordPredicate`] for
//! generic records or a [`FilterTree`](crate::tree::FilterTree) for trace events.
//!
//! # Syntax
//!
//! ```text
//! field op value            op is one of ==, !=, matches, contains, >, <
//! field present             true when the field resolves to any value
//! text                      free text matched against every field
//! a && b, a || b            join two comparisons
//! !expr, (expr)             negate, group
//! expr expr ...             every expression must hold
//! ```
//!
//! # Examples
//!
//! ```text
//! pid > 1000 && name matches "gl.*"       # busy glxgears processes
//! ! "Event type" == sched_switch          # everything but scheduler switches
//! duration > 200ms                        # values with units
//! glxgears                                # any field mentioning glxgears
//! ```

pub mod coerce;
pub mod compiler;
pub mod error;
pub mod matcher;
pub mod operator;
pub mod parser;
pub mod syntax;

pub use coerce::{Coercer, PreparedValue};
pub use compiler::{
    CompiledComparison, CompiledExpression, CompiledFilter, Connective, compile, compile_str,
};
pub use error::FilterParseError;
pub use matcher::{PredicateOptions, RecordPredicate, generate, generate_with};
pub use operator::{Comparator, OperatorKind};
pub use parser::parse;
pub use syntax::{GenericExpressionNode, SyntaxKind};
