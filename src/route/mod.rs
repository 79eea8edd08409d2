//! Route checking and the route-resolver capability.
//!
//! The kernel only requires something that can map a path to a dispatch
//! descriptor; [`RuleResolver`] is the default regex-based implementation.
//! [`check`] orchestrates rule loading (compiled cache vs. rule files),
//! resolver invocation, and the positional segment-parsing fallback used
//! when routing is disabled or unmatched.

mod check;
mod resolver;

pub use check::{check, parse_path, RouteContext};
pub use resolver::{RouteResolver, RouteRule, RuleResolver};
