//! Expression evaluation over a row frame.
//!
//! The evaluator walks the tagged expression tree and returns values
//! directly from each match arm. Graph references read from the frame are
//! switched to the old or new view first, recursing through lists and
//! maps independently.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::query::ast::{
    BinaryOp, Expression, Frame, NamedExpression, SymbolTable, UnaryOp,
};
use crate::query::typed_value::TypedValue;
use crate::storage::property_value::PropertyValue;

pub type Parameters = HashMap<String, PropertyValue>;

pub struct ExpressionEvaluator<'ctx> {
    symbol_table: &'ctx SymbolTable,
    parameters: &'ctx Parameters,
    use_new: bool,
}

impl<'ctx> ExpressionEvaluator<'ctx> {
    pub fn new(symbol_table: &'ctx SymbolTable, parameters: &'ctx Parameters) -> Self {
        Self {
            symbol_table,
            parameters,
            use_new: false,
        }
    }

    /// Record accessors read from the frame observe the new view.
    pub fn switch_new(mut self) -> Self {
        self.use_new = true;
        self
    }

    /// Record accessors read from the frame observe the old view.
    pub fn switch_old(mut self) -> Self {
        self.use_new = false;
        self
    }

    pub fn eval<'a>(&self, expression: &Expression, frame: &Frame<'a>) -> Result<TypedValue<'a>> {
        match expression {
            Expression::Literal(value) => Ok(TypedValue::from(value.clone())),
            Expression::Parameter(name) => match self.parameters.get(name) {
                Some(value) => Ok(TypedValue::from(value.clone())),
                None => Err(GraphError::TypeError(format!(
                    "parameter ${name} is not bound"
                ))),
            },
            Expression::Identifier { id, .. } => {
                let symbol = self.symbol_table.at(*id)?;
                let mut value = frame.get(symbol).clone();
                switch_accessors(&mut value, self.use_new);
                Ok(value)
            }
            Expression::PropertyLookup {
                expression,
                name,
                key,
            } => {
                let value = self.eval(expression, frame)?;
                match value {
                    TypedValue::Null => Ok(TypedValue::Null),
                    TypedValue::Vertex(vertex) => Ok(TypedValue::from(vertex.props_at(*key)?)),
                    TypedValue::Edge(edge) => Ok(TypedValue::from(edge.props_at(*key)?)),
                    TypedValue::Map(entries) => {
                        Ok(entries.get(name).cloned().unwrap_or(TypedValue::Null))
                    }
                    other => Err(GraphError::TypeError(format!(
                        "expected a vertex, edge or map for property lookup, got {}",
                        other.type_name()
                    ))),
                }
            }
            Expression::ListLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, frame)?);
                }
                Ok(TypedValue::List(values))
            }
            Expression::MapLiteral(items) => {
                let mut entries = BTreeMap::new();
                for (key, item) in items {
                    entries.insert(key.clone(), self.eval(item, frame)?);
                }
                Ok(TypedValue::Map(entries))
            }
            Expression::Unary { op, expression } => {
                let value = self.eval(expression, frame)?;
                match op {
                    UnaryOp::Not => value.not(),
                    UnaryOp::Plus => value.unary_plus(),
                    UnaryOp::Minus => value.negate(),
                }
            }
            Expression::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                match op {
                    BinaryOp::And => lhs.and(rhs),
                    BinaryOp::Or => lhs.or(rhs),
                    BinaryOp::Xor => lhs.xor(rhs),
                    BinaryOp::Add => lhs.add(rhs),
                    BinaryOp::Sub => lhs.sub(rhs),
                    BinaryOp::Mul => lhs.mul(rhs),
                    BinaryOp::Div => lhs.div(rhs),
                    BinaryOp::Mod => lhs.modulo(rhs),
                    BinaryOp::Eq => lhs.equal(rhs),
                    BinaryOp::Ne => lhs.not_equal(rhs),
                    BinaryOp::Lt => lhs.less(rhs),
                    BinaryOp::Gt => lhs.greater(rhs),
                    BinaryOp::Le => lhs.less_equal(rhs),
                    BinaryOp::Ge => lhs.greater_equal(rhs),
                }
            }
            Expression::IsNull(expression) => {
                let value = self.eval(expression, frame)?;
                Ok(value.is_null_value())
            }
            Expression::Aggregation { id, .. } => {
                let symbol = self.symbol_table.at(*id)?;
                let mut value = frame.get(symbol).clone();
                switch_accessors(&mut value, self.use_new);
                Ok(value)
            }
        }
    }

    /// Evaluates a named expression and stores the result in its symbol's
    /// frame slot.
    pub fn eval_named<'a>(
        &self,
        named: &NamedExpression,
        frame: &mut Frame<'a>,
    ) -> Result<TypedValue<'a>> {
        let value = self.eval(&named.expression, frame)?;
        let symbol = self.symbol_table.at(named.id)?;
        frame.set(symbol, value.clone());
        Ok(value)
    }
}

/// Switches any record accessors inside `value` to the requested view.
/// List and map recursion are independent.
pub fn switch_accessors(value: &mut TypedValue<'_>, use_new: bool) {
    match value {
        TypedValue::Vertex(vertex) => {
            if use_new {
                vertex.switch_new();
            } else {
                vertex.switch_old();
            }
        }
        TypedValue::Edge(edge) => {
            if use_new {
                edge.switch_new();
            } else {
                edge.switch_old();
            }
        }
        TypedValue::List(values) => {
            for value in values {
                switch_accessors(value, use_new);
            }
        }
        TypedValue::Map(entries) => {
            for value in entries.values_mut() {
                switch_accessors(value, use_new);
            }
        }
        _ => {}
    }
}
