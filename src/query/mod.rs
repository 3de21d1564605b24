//! Query execution over compiled logical plans.
//!
//! The parser and planner are external; this module consumes an operator
//! tree plus a symbol table and drives cursor pulls against a graph
//! accessor, emitting produced rows to a [`RowSink`].

pub mod ast;
pub mod eval;
pub mod executor;
pub mod plan;
pub mod typed_value;

pub use ast::{
    AggregationOp, AstId, BinaryOp, Expression, Frame, NamedExpression, Symbol, SymbolTable,
    UnaryOp,
};
pub use eval::{ExpressionEvaluator, Parameters};
pub use executor::{make_cursor, Cursor, ExecutionContext};
pub use plan::{
    AggregationElement, EdgeCreationInfo, EdgeDirection, LogicalOperator, NodeCreationInfo,
    SortDirection,
};
pub use typed_value::{Path, TypedValue};

use crate::db::accessor::GraphAccessor;
use crate::error::Result;

/// Abstract row consumer; the wire server is one implementation.
pub trait RowSink {
    fn write_row(&mut self, row: &[TypedValue<'_>]) -> Result<()>;
}

/// Executes `plan`, forwarding each produced row to `sink`. Returns the
/// number of rows. Errors abort the transaction at the caller.
pub fn execute(
    plan: &LogicalOperator,
    dba: &GraphAccessor<'_>,
    symbol_table: &SymbolTable,
    parameters: &Parameters,
    sink: &mut dyn RowSink,
) -> Result<u64> {
    let ctx = ExecutionContext::new(dba, symbol_table, parameters);
    let output = output_symbols(plan, symbol_table)?;
    let mut frame = Frame::new(symbol_table.frame_size());
    let mut cursor = make_cursor(plan, dba);
    let mut rows = 0u64;
    while cursor.pull(&mut frame, &ctx)? {
        rows += 1;
        let row: Vec<TypedValue<'_>> = output
            .iter()
            .map(|symbol| frame.get(symbol).clone())
            .collect();
        sink.write_row(&row)?;
    }
    Ok(rows)
}

/// Pulls the plan to exhaustion without consuming rows; returns the count.
pub fn pull_all(
    plan: &LogicalOperator,
    dba: &GraphAccessor<'_>,
    symbol_table: &SymbolTable,
    parameters: &Parameters,
) -> Result<u64> {
    let ctx = ExecutionContext::new(dba, symbol_table, parameters);
    let mut frame = Frame::new(symbol_table.frame_size());
    let mut cursor = make_cursor(plan, dba);
    let mut rows = 0u64;
    while cursor.pull(&mut frame, &ctx)? {
        rows += 1;
    }
    Ok(rows)
}

/// Materializes the rows a `Produce` root yields.
pub fn collect_results<'a>(
    plan: &'a LogicalOperator,
    dba: &'a GraphAccessor<'a>,
    symbol_table: &SymbolTable,
    parameters: &Parameters,
) -> Result<Vec<Vec<TypedValue<'a>>>> {
    let ctx = ExecutionContext::new(dba, symbol_table, parameters);
    let output = output_symbols(plan, symbol_table)?;
    let mut frame = Frame::new(symbol_table.frame_size());
    let mut cursor = make_cursor(plan, dba);
    let mut results = Vec::new();
    while cursor.pull(&mut frame, &ctx)? {
        results.push(
            output
                .iter()
                .map(|symbol| frame.get(symbol).clone())
                .collect(),
        );
    }
    Ok(results)
}

fn output_symbols(plan: &LogicalOperator, symbol_table: &SymbolTable) -> Result<Vec<Symbol>> {
    match plan {
        LogicalOperator::Produce {
            named_expressions, ..
        } => named_expressions
            .iter()
            .map(|named| symbol_table.at(named.id).cloned())
            .collect(),
        _ => Ok(Vec::new()),
    }
}
