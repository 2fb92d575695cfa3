//! Solver-independent MILP representation.
mod expr;
mod instance;
pub mod lp_format;

pub use expr::{IneqExpr, LinExpr, Sense, Var};
pub use instance::{Assignment, Constr, ConstrInfo, Instance, VarInfo, VarKind, Violation};
pub use lp_format::{write_lp, LpNames};
