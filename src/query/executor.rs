//! Operator cursors.
//!
//! Every logical operator compiles to a single-use cursor with
//! `pull(frame, ctx) -> bool`; false means the sequence is exhausted.
//! Cursors check the transaction's abort flag at each pull, so
//! cancellation is cooperative.

use std::collections::VecDeque;
use std::ops::Bound;
use std::time::Instant;
use std::vec;

use crate::db::accessor::{GraphAccessor, VertexAccessor};
use crate::error::{GraphError, Result};

use crate::ids::{EdgeTypeId, Gid, LabelId, PropertyKey};
use crate::query::ast::{AggregationOp, Expression, Frame, NamedExpression, Symbol, SymbolTable};
use crate::query::eval::{ExpressionEvaluator, Parameters};
use crate::query::plan::{
    AggregationElement, EdgeCreationInfo, EdgeDirection, LogicalOperator, NodeCreationInfo,
    SortDirection,
};

use crate::query::typed_value::{full_equal, total_cmp, TypedValue};
use crate::storage::mvcc::View;
use crate::storage::vertex::EdgeRef;

pub struct ExecutionContext<'ctx, 'a> {
    pub dba: &'a GraphAccessor<'a>,
    pub symbol_table: &'ctx SymbolTable,
    pub parameters: &'ctx Parameters,
    pub deadline: Option<Instant>,
}

impl<'ctx, 'a> ExecutionContext<'ctx, 'a> {
    pub fn new(
        dba: &'a GraphAccessor<'a>,
        symbol_table: &'ctx SymbolTable,
        parameters: &'ctx Parameters,
    ) -> Self {
        let deadline = dba.query_timeout().map(|timeout| Instant::now() + timeout);
        Self {
            dba,
            symbol_table,
            parameters,
            deadline,
        }
    }

    fn check_cancel(&self) -> Result<()> {
        if self.dba.transaction().should_abort() {
            return Err(GraphError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                self.dba.transaction().set_should_abort();
                return Err(GraphError::Cancelled);
            }
        }
        Ok(())
    }

    fn evaluator(&self, use_new: bool) -> ExpressionEvaluator<'ctx> {
        let evaluator = ExpressionEvaluator::new(self.symbol_table, self.parameters);
        if use_new {
            evaluator.switch_new()
        } else {
            evaluator.switch_old()
        }
    }
}

pub trait Cursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool>;
}

type BoxCursor<'a> = Box<dyn Cursor<'a> + 'a>;
type BoxVertexIter<'a> = Box<dyn Iterator<Item = VertexAccessor<'a>> + 'a>;

/// Builds the cursor tree for an operator tree.
pub fn make_cursor<'a>(op: &'a LogicalOperator, dba: &'a GraphAccessor<'a>) -> BoxCursor<'a> {
    match op {
        LogicalOperator::Once => Box::new(OnceCursor::default()),
        LogicalOperator::CreateNode { input, node } => Box::new(CreateNodeCursor {
            input: input_cursor(input, dba),
            node,
            dba,
        }),
        LogicalOperator::CreateExpand {
            input,
            input_symbol,
            node,
            edge,
            existing_node,
        } => Box::new(CreateExpandCursor {
            input: input_cursor(input, dba),
            input_symbol,
            node,
            edge,
            existing_node: *existing_node,
            dba,
        }),
        LogicalOperator::ScanAll {
            input,
            symbol,
            view,
        } => Box::new(ScanCursor {
            input: input_cursor(input, dba),
            symbol,
            kind: ScanKind::All,
            view: *view,
            dba,
            vertices: None,
        }),
        LogicalOperator::ScanAllByLabel {
            input,
            symbol,
            label,
            view,
        } => Box::new(ScanCursor {
            input: input_cursor(input, dba),
            symbol,
            kind: ScanKind::ByLabel(*label),
            view: *view,
            dba,
            vertices: None,
        }),
        LogicalOperator::ScanAllByLabelPropertyValue {
            input,
            symbol,
            label,
            property,
            expression,
            view,
        } => Box::new(ScanCursor {
            input: input_cursor(input, dba),
            symbol,
            kind: ScanKind::ByLabelPropertyValue {
                label: *label,
                property: *property,
                expression,
            },
            view: *view,
            dba,
            vertices: None,
        }),
        LogicalOperator::ScanAllByLabelPropertyRange {
            input,
            symbol,
            label,
            property,
            lower,
            upper,
            view,
        } => Box::new(ScanCursor {
            input: input_cursor(input, dba),
            symbol,
            kind: ScanKind::ByLabelPropertyRange {
                label: *label,
                property: *property,
                lower: lower.as_ref().map(|(e, inclusive)| (e, *inclusive)),
                upper: upper.as_ref().map(|(e, inclusive)| (e, *inclusive)),
            },
            view: *view,
            dba,
            vertices: None,
        }),
        LogicalOperator::Expand {
            input,
            input_symbol,
            edge_symbol,
            node_symbol,
            direction,
            existing_node,
            existing_edge,
            view,
        } => Box::new(ExpandCursor {
            input: input_cursor(input, dba),
            input_symbol,
            edge_symbol,
            node_symbol,
            direction: *direction,
            existing_node: *existing_node,
            existing_edge: *existing_edge,
            view: *view,
            dba,
            state: None,
        }),
        LogicalOperator::Filter { input, expression } => Box::new(FilterCursor {
            input: input_cursor(input, dba),
            expression,
        }),
        LogicalOperator::NodeFilter {
            input,
            symbol,
            labels,
            properties,
        } => Box::new(NodeFilterCursor {
            input: input_cursor(input, dba),
            symbol,
            labels,
            properties,
        }),
        LogicalOperator::EdgeFilter {
            input,
            symbol,
            edge_types,
            properties,
        } => Box::new(EdgeFilterCursor {
            input: input_cursor(input, dba),
            symbol,
            edge_types,
            properties,
        }),
        LogicalOperator::ExpandUniquenessFilter {
            input,
            expand_symbol,
            previous_symbols,
        } => Box::new(ExpandUniquenessFilterCursor {
            input: input_cursor(input, dba),
            expand_symbol,
            previous_symbols,
        }),
        LogicalOperator::Produce {
            input,
            named_expressions,
        } => Box::new(ProduceCursor {
            input: input_cursor(input, dba),
            named_expressions,
        }),
        LogicalOperator::Delete {
            input,
            expressions,
            detach,
        } => Box::new(DeleteCursor {
            input: input_cursor(input, dba),
            expressions,
            detach: *detach,
            dba,
        }),
        LogicalOperator::SetProperty {
            input,
            lhs,
            property,
            rhs,
        } => Box::new(SetPropertyCursor {
            input: input_cursor(input, dba),
            lhs,
            property: *property,
            rhs,
        }),
        LogicalOperator::SetLabels {
            input,
            symbol,
            labels,
        } => Box::new(SetLabelsCursor {
            input: input_cursor(input, dba),
            symbol,
            labels,
            remove: false,
        }),
        LogicalOperator::RemoveProperty {
            input,
            lhs,
            property,
        } => Box::new(RemovePropertyCursor {
            input: input_cursor(input, dba),
            lhs,
            property: *property,
        }),
        LogicalOperator::RemoveLabels {
            input,
            symbol,
            labels,
        } => Box::new(SetLabelsCursor {
            input: input_cursor(input, dba),
            symbol,
            labels,
            remove: true,
        }),
        LogicalOperator::Accumulate {
            input,
            symbols,
            advance_command,
        } => Box::new(AccumulateCursor {
            input: input_cursor(input, dba),
            symbols,
            advance_command: *advance_command,
            cache: None,
        }),
        LogicalOperator::Aggregate {
            input,
            aggregations,
            group_by,
            remember,
        } => Box::new(AggregateCursor {
            input: input_cursor(input, dba),
            aggregations,
            group_by,
            remember,
            groups: None,
        }),
        LogicalOperator::Skip { input, expression } => Box::new(SkipCursor {
            input: input_cursor(input, dba),
            expression,
            to_skip: None,
            skipped: 0,
        }),
        LogicalOperator::Limit { input, expression } => Box::new(LimitCursor {
            input: input_cursor(input, dba),
            expression,
            limit: None,
            pulled: 0,
        }),
        LogicalOperator::OrderBy { input, order } => Box::new(OrderByCursor {
            input: input_cursor(input, dba),
            order,
            cache: None,
        }),
        LogicalOperator::Distinct { input, expressions } => Box::new(DistinctCursor {
            input: input_cursor(input, dba),
            expressions,
            seen: Vec::new(),
        }),
        LogicalOperator::Unwind {
            input,
            symbol,
            expression,
        } => Box::new(UnwindCursor {
            input: input_cursor(input, dba),
            symbol,
            expression,
            items: None,
        }),
        LogicalOperator::Optional {
            input,
            optional,
            optional_symbols,
        } => Box::new(OptionalCursor {
            input: input_cursor(input, dba),
            optional,
            optional_symbols,
            dba,
            state: OptionalState::NeedInput,
        }),
        LogicalOperator::Merge {
            input,
            merge_match,
            merge_create,
            on_match,
            on_create,
        } => Box::new(MergeCursor {
            input: input_cursor(input, dba),
            merge_match,
            merge_create,
            on_match: on_match.as_deref(),
            on_create: on_create.as_deref(),
            dba,
            state: MergeState::NeedInput,
        }),
    }
}

fn input_cursor<'a>(
    input: &'a Option<Box<LogicalOperator>>,
    dba: &'a GraphAccessor<'a>,
) -> BoxCursor<'a> {
    match input {
        Some(op) => make_cursor(op, dba),
        None => Box::new(OnceCursor::default()),
    }
}

#[derive(Default)]
struct OnceCursor {
    done: bool,
}

impl<'a> Cursor<'a> for OnceCursor {
    fn pull(&mut self, _frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if self.done {
            return Ok(false);
        }
        self.done = true;
        Ok(true)
    }
}

enum ScanKind<'a> {
    All,
    ByLabel(LabelId),
    ByLabelPropertyValue {
        label: LabelId,
        property: PropertyKey,
        expression: &'a Expression,
    },
    ByLabelPropertyRange {
        label: LabelId,
        property: PropertyKey,
        lower: Option<(&'a Expression, bool)>,
        upper: Option<(&'a Expression, bool)>,
    },
}

struct ScanCursor<'a> {
    input: BoxCursor<'a>,
    symbol: &'a Symbol,
    kind: ScanKind<'a>,
    view: View,
    dba: &'a GraphAccessor<'a>,
    vertices: Option<BoxVertexIter<'a>>,
}

impl<'a> ScanCursor<'a> {
    fn make_vertices(
        &self,
        frame: &Frame<'a>,
        ctx: &ExecutionContext<'_, 'a>,
    ) -> Result<BoxVertexIter<'a>> {
        let evaluator = ctx.evaluator(self.view == View::New);
        match &self.kind {
            ScanKind::All => Ok(Box::new(self.dba.vertices(self.view))),
            ScanKind::ByLabel(label) => {
                Ok(Box::new(self.dba.vertices_by_label(*label, self.view)))
            }
            ScanKind::ByLabelPropertyValue {
                label,
                property,
                expression,
            } => {
                let value = evaluator.eval(expression, frame)?;
                if value.is_null() {
                    return Ok(Box::new(std::iter::empty()));
                }
                let value = value.into_property_value()?;
                Ok(Box::new(
                    self.dba
                        .vertices_by_label_property_value(*label, *property, &value, self.view)
                        .into_iter(),
                ))
            }
            ScanKind::ByLabelPropertyRange {
                label,
                property,
                lower,
                upper,
            } => {
                let mut bounds = [Bound::Unbounded, Bound::Unbounded];
                for (slot, bound) in [lower, upper].into_iter().enumerate() {
                    if let Some((expression, inclusive)) = bound {
                        let value = evaluator.eval(expression, frame)?;
                        if value.is_null() {
                            return Ok(Box::new(std::iter::empty()));
                        }
                        let value = value.into_property_value()?;
                        bounds[slot] = if *inclusive {
                            Bound::Included(value)
                        } else {
                            Bound::Excluded(value)
                        };
                    }
                }
                let [lower, upper] = bounds;
                Ok(Box::new(
                    self.dba
                        .vertices_by_label_property_range(*label, *property, lower, upper, self.view)
                        .into_iter(),
                ))
            }
        }
    }
}

impl<'a> Cursor<'a> for ScanCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        loop {
            if self.vertices.is_none() {
                if !self.input.pull(frame, ctx)? {
                    return Ok(false);
                }
                self.vertices = Some(self.make_vertices(frame, ctx)?);
            }
            if let Some(vertex) = self.vertices.as_mut().and_then(|iter| iter.next()) {
                frame.set(self.symbol, TypedValue::Vertex(vertex));
                return Ok(true);
            }
            self.vertices = None;
        }
    }
}

struct ExpandFrameState {
    out_edges: vec::IntoIter<EdgeRef>,
    in_edges: vec::IntoIter<EdgeRef>,
    origin: Gid,
}

struct ExpandCursor<'a> {
    input: BoxCursor<'a>,
    input_symbol: &'a Symbol,
    edge_symbol: &'a Symbol,
    node_symbol: &'a Symbol,
    direction: EdgeDirection,
    existing_node: bool,
    existing_edge: bool,
    view: View,
    dba: &'a GraphAccessor<'a>,
    state: Option<ExpandFrameState>,
}

impl<'a> ExpandCursor<'a> {
    fn next_candidate(&mut self) -> Option<EdgeRef> {
        let state = self.state.as_mut()?;
        if let Some(edge_ref) = state.out_edges.next() {
            return Some(edge_ref);
        }
        while let Some(edge_ref) = state.in_edges.next() {
            // A self-loop shows up in both lists; yield it exactly once.
            if self.direction == EdgeDirection::Both && edge_ref.other_vertex == state.origin {
                continue;
            }
            return Some(edge_ref);
        }
        None
    }
}

impl<'a> Cursor<'a> for ExpandCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        loop {
            if self.state.is_none() {
                if !self.input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let mut vertex = match frame.get(self.input_symbol) {
                    TypedValue::Vertex(vertex) => vertex.clone(),
                    TypedValue::Null => continue,
                    other => {
                        return Err(GraphError::TypeError(format!(
                            "expand expects a vertex, got {}",
                            other.type_name()
                        )))
                    }
                };
                vertex.switch_view(self.view);
                let out_edges = if self.direction != EdgeDirection::In {
                    vertex.out_refs()?
                } else {
                    Vec::new()
                };
                let in_edges = if self.direction != EdgeDirection::Out {
                    vertex.in_refs()?
                } else {
                    Vec::new()
                };
                self.state = Some(ExpandFrameState {
                    out_edges: out_edges.into_iter(),
                    in_edges: in_edges.into_iter(),
                    origin: vertex.gid(),
                });
            }
            let Some(candidate) = self.next_candidate() else {
                self.state = None;
                continue;
            };
            let Some(mut edge) = self.dba.edge(candidate.edge, self.view) else {
                continue;
            };
            edge.switch_view(self.view);
            if self.existing_edge {
                match frame.get(self.edge_symbol) {
                    TypedValue::Edge(bound) if bound.gid() == edge.gid() => {}
                    TypedValue::Edge(_) | TypedValue::Null => continue,
                    other => {
                        return Err(GraphError::TypeError(format!(
                            "expected an edge binding, got {}",
                            other.type_name()
                        )))
                    }
                }
            } else {
                frame.set(self.edge_symbol, TypedValue::Edge(edge));
            }
            if self.existing_node {
                match frame.get(self.node_symbol) {
                    TypedValue::Vertex(bound) if bound.gid() == candidate.other_vertex => {}
                    TypedValue::Vertex(_) | TypedValue::Null => continue,
                    other => {
                        return Err(GraphError::TypeError(format!(
                            "expected a vertex binding, got {}",
                            other.type_name()
                        )))
                    }
                }
            } else {
                let Some(mut other) = self.dba.vertex_any(candidate.other_vertex) else {
                    continue;
                };
                other.switch_view(self.view);
                frame.set(self.node_symbol, TypedValue::Vertex(other));
            }
            return Ok(true);
        }
    }
}

struct FilterCursor<'a> {
    input: BoxCursor<'a>,
    expression: &'a Expression,
}

impl<'a> Cursor<'a> for FilterCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        let evaluator = ctx.evaluator(false);
        while self.input.pull(frame, ctx)? {
            if let TypedValue::Bool(true) = evaluator.eval(self.expression, frame)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

struct NodeFilterCursor<'a> {
    input: BoxCursor<'a>,
    symbol: &'a Symbol,
    labels: &'a [LabelId],
    properties: &'a [(PropertyKey, Expression)],
}

impl<'a> Cursor<'a> for NodeFilterCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        'row: while self.input.pull(frame, ctx)? {
            let mut vertex = match frame.get(self.symbol) {
                TypedValue::Vertex(vertex) => vertex.clone(),
                TypedValue::Null => continue,
                other => {
                    return Err(GraphError::TypeError(format!(
                        "node filter expects a vertex, got {}",
                        other.type_name()
                    )))
                }
            };
            vertex.switch_old();
            for label in self.labels {
                if !vertex.has_label(*label)? {
                    continue 'row;
                }
            }
            let evaluator = ctx.evaluator(false);
            for (key, expression) in self.properties {
                let expected = evaluator.eval(expression, frame)?;
                if expected.is_null() {
                    continue 'row;
                }
                let actual = TypedValue::from(vertex.props_at(*key)?);
                match actual.equal(expected)? {
                    TypedValue::Bool(true) => {}
                    _ => continue 'row,
                }
            }
            return Ok(true);
        }
        Ok(false)
    }
}

struct EdgeFilterCursor<'a> {
    input: BoxCursor<'a>,
    symbol: &'a Symbol,
    edge_types: &'a [EdgeTypeId],
    properties: &'a [(PropertyKey, Expression)],
}

impl<'a> Cursor<'a> for EdgeFilterCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        'row: while self.input.pull(frame, ctx)? {
            let mut edge = match frame.get(self.symbol) {
                TypedValue::Edge(edge) => edge.clone(),
                TypedValue::Null => continue,
                other => {
                    return Err(GraphError::TypeError(format!(
                        "edge filter expects an edge, got {}",
                        other.type_name()
                    )))
                }
            };
            edge.switch_old();
            if !self.edge_types.is_empty() {
                let edge_type = edge.edge_type()?;
                if !self.edge_types.contains(&edge_type) {
                    continue 'row;
                }
            }
            let evaluator = ctx.evaluator(false);
            for (key, expression) in self.properties {
                let expected = evaluator.eval(expression, frame)?;
                if expected.is_null() {
                    continue 'row;
                }
                let actual = TypedValue::from(edge.props_at(*key)?);
                match actual.equal(expected)? {
                    TypedValue::Bool(true) => {}
                    _ => continue 'row,
                }
            }
            return Ok(true);
        }
        Ok(false)
    }
}

struct ExpandUniquenessFilterCursor<'a> {
    input: BoxCursor<'a>,
    expand_symbol: &'a Symbol,
    previous_symbols: &'a [Symbol],
}

impl<'a> Cursor<'a> for ExpandUniquenessFilterCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        'row: while self.input.pull(frame, ctx)? {
            let value = frame.get(self.expand_symbol);
            for previous in self.previous_symbols {
                if full_equal(value, frame.get(previous)) {
                    continue 'row;
                }
            }
            return Ok(true);
        }
        Ok(false)
    }
}

struct ProduceCursor<'a> {
    input: BoxCursor<'a>,
    named_expressions: &'a [NamedExpression],
}

impl<'a> Cursor<'a> for ProduceCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let evaluator = ctx.evaluator(true);
        for named in self.named_expressions {
            evaluator.eval_named(named, frame)?;
        }
        Ok(true)
    }
}

struct CreateNodeCursor<'a> {
    input: BoxCursor<'a>,
    node: &'a NodeCreationInfo,
    dba: &'a GraphAccessor<'a>,
}

fn create_vertex<'a>(
    dba: &'a GraphAccessor<'a>,
    node: &NodeCreationInfo,
    frame: &mut Frame<'a>,
    ctx: &ExecutionContext<'_, 'a>,
) -> Result<VertexAccessor<'a>> {
    let mut vertex = dba.insert_vertex()?;
    for label in &node.labels {
        vertex.add_label(*label)?;
    }
    let evaluator = ctx.evaluator(true);
    for (key, expression) in &node.properties {
        let value = evaluator.eval(expression, frame)?.into_property_value()?;
        vertex.props_set(*key, value)?;
    }
    vertex.switch_new();
    frame.set(&node.symbol, TypedValue::Vertex(vertex.clone()));
    Ok(vertex)
}

impl<'a> Cursor<'a> for CreateNodeCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        create_vertex(self.dba, self.node, frame, ctx)?;
        Ok(true)
    }
}

struct CreateExpandCursor<'a> {
    input: BoxCursor<'a>,
    input_symbol: &'a Symbol,
    node: &'a NodeCreationInfo,
    edge: &'a EdgeCreationInfo,
    existing_node: bool,
    dba: &'a GraphAccessor<'a>,
}

impl<'a> Cursor<'a> for CreateExpandCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let origin = match frame.get(self.input_symbol) {
            TypedValue::Vertex(vertex) => vertex.clone(),
            other => {
                return Err(GraphError::TypeError(format!(
                    "create expand expects a vertex, got {}",
                    other.type_name()
                )))
            }
        };
        let destination = if self.existing_node {
            match frame.get(&self.node.symbol) {
                TypedValue::Vertex(vertex) => vertex.clone(),
                other => {
                    return Err(GraphError::TypeError(format!(
                        "expected an existing vertex, got {}",
                        other.type_name()
                    )))
                }
            }
        } else {
            create_vertex(self.dba, self.node, frame, ctx)?
        };
        let mut edge = match self.edge.direction {
            EdgeDirection::Out => {
                self.dba
                    .insert_edge(&origin, &destination, self.edge.edge_type)?
            }
            EdgeDirection::In => {
                self.dba
                    .insert_edge(&destination, &origin, self.edge.edge_type)?
            }
            EdgeDirection::Both => {
                return Err(GraphError::InvalidArgument(
                    "cannot create an undirected edge".into(),
                ))
            }
        };
        let evaluator = ctx.evaluator(true);
        for (key, expression) in &self.edge.properties {
            let value = evaluator.eval(expression, frame)?.into_property_value()?;
            edge.props_set(*key, value)?;
        }
        edge.switch_new();
        frame.set(&self.edge.symbol, TypedValue::Edge(edge));
        Ok(true)
    }
}

struct DeleteCursor<'a> {
    input: BoxCursor<'a>,
    expressions: &'a [Expression],
    detach: bool,
    dba: &'a GraphAccessor<'a>,
}

impl<'a> Cursor<'a> for DeleteCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let evaluator = ctx.evaluator(true);
        let mut vertices = Vec::new();
        let mut edges = Vec::new();
        for expression in self.expressions {
            match evaluator.eval(expression, frame)? {
                TypedValue::Null => {}
                TypedValue::Vertex(vertex) => vertices.push(vertex),
                TypedValue::Edge(edge) => edges.push(edge),
                other => {
                    return Err(GraphError::TypeError(format!(
                        "cannot delete {}",
                        other.type_name()
                    )))
                }
            }
        }
        for edge in &edges {
            self.dba.delete_edge(edge)?;
        }
        for vertex in &vertices {
            if self.detach {
                self.dba.detach_delete_vertex(vertex)?;
            } else {
                self.dba.delete_vertex(vertex)?;
            }
        }
        Ok(true)
    }
}

struct SetPropertyCursor<'a> {
    input: BoxCursor<'a>,
    lhs: &'a Expression,
    property: PropertyKey,
    rhs: &'a Expression,
}

impl<'a> Cursor<'a> for SetPropertyCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let evaluator = ctx.evaluator(true);
        let target = evaluator.eval(self.lhs, frame)?;
        let value = evaluator.eval(self.rhs, frame)?.into_property_value()?;
        match target {
            TypedValue::Null => {}
            TypedValue::Vertex(mut vertex) => vertex.props_set(self.property, value)?,
            TypedValue::Edge(mut edge) => edge.props_set(self.property, value)?,
            other => {
                return Err(GraphError::TypeError(format!(
                    "cannot set a property on {}",
                    other.type_name()
                )))
            }
        }
        Ok(true)
    }
}

struct RemovePropertyCursor<'a> {
    input: BoxCursor<'a>,
    lhs: &'a Expression,
    property: PropertyKey,
}

impl<'a> Cursor<'a> for RemovePropertyCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        let evaluator = ctx.evaluator(true);
        match evaluator.eval(self.lhs, frame)? {
            TypedValue::Null => {}
            TypedValue::Vertex(mut vertex) => vertex.props_erase(self.property)?,
            TypedValue::Edge(mut edge) => edge.props_erase(self.property)?,
            other => {
                return Err(GraphError::TypeError(format!(
                    "cannot remove a property from {}",
                    other.type_name()
                )))
            }
        }
        Ok(true)
    }
}

struct SetLabelsCursor<'a> {
    input: BoxCursor<'a>,
    symbol: &'a Symbol,
    labels: &'a [LabelId],
    remove: bool,
}

impl<'a> Cursor<'a> for SetLabelsCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        match frame.get(self.symbol) {
            TypedValue::Null => {}
            TypedValue::Vertex(vertex) => {
                let mut vertex = vertex.clone();
                for label in self.labels {
                    if self.remove {
                        vertex.remove_label(*label)?;
                    } else {
                        vertex.add_label(*label)?;
                    }
                }
            }
            other => {
                return Err(GraphError::TypeError(format!(
                    "cannot change labels on {}",
                    other.type_name()
                )))
            }
        }
        Ok(true)
    }
}

struct AccumulateCursor<'a> {
    input: BoxCursor<'a>,
    symbols: &'a [Symbol],
    advance_command: bool,
    cache: Option<VecDeque<Vec<TypedValue<'a>>>>,
}

fn reconstruct_value(value: &mut TypedValue<'_>) {
    match value {
        TypedValue::Vertex(vertex) => vertex.reconstruct(),
        TypedValue::Edge(edge) => edge.reconstruct(),
        TypedValue::List(values) => {
            for value in values {
                reconstruct_value(value);
            }
        }
        TypedValue::Map(entries) => {
            for value in entries.values_mut() {
                reconstruct_value(value);
            }
        }
        _ => {}
    }
}

impl<'a> Cursor<'a> for AccumulateCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if self.cache.is_none() {
            let mut cache = VecDeque::new();
            while self.input.pull(frame, ctx)? {
                cache.push_back(
                    self.symbols
                        .iter()
                        .map(|symbol| frame.get(symbol).clone())
                        .collect::<Vec<_>>(),
                );
            }
            if self.advance_command {
                ctx.dba.advance_command();
                // Version pointers cached in the buffered rows go stale at
                // the command boundary.
                for row in cache.iter_mut() {
                    for value in row.iter_mut() {
                        reconstruct_value(value);
                    }
                }
            }
            self.cache = Some(cache);
        }
        let Some(row) = self.cache.as_mut().and_then(|cache| cache.pop_front()) else {
            return Ok(false);
        };
        for (symbol, value) in self.symbols.iter().zip(row) {
            frame.set(symbol, value);
        }
        Ok(true)
    }
}

struct AggregateGroup<'a> {
    key: Vec<TypedValue<'a>>,
    remember: Vec<TypedValue<'a>>,
    states: Vec<AggregateState<'a>>,
}

#[derive(Default)]
struct AggregateState<'a> {
    count: i64,
    sum: Option<TypedValue<'a>>,
    min: Option<TypedValue<'a>>,
    max: Option<TypedValue<'a>>,
    collected: Vec<TypedValue<'a>>,
}

struct AggregateCursor<'a> {
    input: BoxCursor<'a>,
    aggregations: &'a [AggregationElement],
    group_by: &'a [Expression],
    remember: &'a [Symbol],
    groups: Option<vec::IntoIter<AggregateGroup<'a>>>,
}

impl<'a> AggregateCursor<'a> {
    fn process_all(
        &mut self,
        frame: &mut Frame<'a>,
        ctx: &ExecutionContext<'_, 'a>,
    ) -> Result<Vec<AggregateGroup<'a>>> {
        let evaluator = ctx.evaluator(true);
        let mut groups: Vec<AggregateGroup<'a>> = Vec::new();
        while self.input.pull(frame, ctx)? {
            let mut key = Vec::with_capacity(self.group_by.len());
            for expression in self.group_by {
                key.push(evaluator.eval(expression, frame)?);
            }
            let position = groups.iter().position(|group| {
                group.key.len() == key.len()
                    && group
                        .key
                        .iter()
                        .zip(key.iter())
                        .all(|(a, b)| full_equal(a, b))
            });
            let index = match position {
                Some(index) => index,
                None => {
                    groups.push(AggregateGroup {
                        key,
                        remember: self
                            .remember
                            .iter()
                            .map(|symbol| frame.get(symbol).clone())
                            .collect(),
                        states: self
                            .aggregations
                            .iter()
                            .map(|_| AggregateState::default())
                            .collect(),
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[index];
            for (element, state) in self.aggregations.iter().zip(group.states.iter_mut()) {
                let value = match &element.expression {
                    Some(expression) => evaluator.eval(expression, frame)?,
                    None => TypedValue::Bool(true),
                };
                if value.is_null() {
                    continue;
                }
                match element.op {
                    AggregationOp::Count => state.count += 1,
                    AggregationOp::Sum => {
                        ensure_numeric(&value, "SUM")?;
                        let sum = state.sum.take().unwrap_or(TypedValue::Int(0));
                        state.sum = Some(sum.add(value)?);
                        state.count += 1;
                    }
                    AggregationOp::Avg => {
                        ensure_numeric(&value, "AVG")?;
                        let sum = state.sum.take().unwrap_or(TypedValue::Int(0));
                        state.sum = Some(sum.add(value)?);
                        state.count += 1;
                    }
                    AggregationOp::Min => {
                        state.min = Some(match state.min.take() {
                            None => value,
                            Some(current) => {
                                match value.clone().less(current.clone())? {
                                    TypedValue::Bool(true) => value,
                                    _ => current,
                                }
                            }
                        });
                    }
                    AggregationOp::Max => {
                        state.max = Some(match state.max.take() {
                            None => value,
                            Some(current) => {
                                match value.clone().greater(current.clone())? {
                                    TypedValue::Bool(true) => value,
                                    _ => current,
                                }
                            }
                        });
                    }
                    AggregationOp::Collect => {
                        state.collected.push(value);
                        state.count += 1;
                    }
                }
            }
        }
        // Aggregation without grouping produces exactly one row, even over
        // empty input.
        if groups.is_empty() && self.group_by.is_empty() {
            groups.push(AggregateGroup {
                key: Vec::new(),
                remember: self
                    .remember
                    .iter()
                    .map(|symbol| frame.get(symbol).clone())
                    .collect(),
                states: self
                    .aggregations
                    .iter()
                    .map(|_| AggregateState::default())
                    .collect(),
            });
        }
        Ok(groups)
    }
}

fn ensure_numeric(value: &TypedValue<'_>, what: &str) -> Result<()> {
    match value {
        TypedValue::Int(_) | TypedValue::Double(_) => Ok(()),
        other => Err(GraphError::TypeError(format!(
            "{what} requires numbers, got {}",
            other.type_name()
        ))),
    }
}

impl<'a> Cursor<'a> for AggregateCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if self.groups.is_none() {
            let groups = self.process_all(frame, ctx)?;
            self.groups = Some(groups.into_iter());
        }
        let Some(group) = self.groups.as_mut().and_then(|iter| iter.next()) else {
            return Ok(false);
        };
        for (symbol, value) in self.remember.iter().zip(group.remember) {
            frame.set(symbol, value);
        }
        for (element, state) in self.aggregations.iter().zip(group.states) {
            let value = match element.op {
                AggregationOp::Count => TypedValue::Int(state.count),
                AggregationOp::Sum => state.sum.unwrap_or(TypedValue::Int(0)),
                AggregationOp::Avg => {
                    if state.count == 0 {
                        TypedValue::Null
                    } else {
                        let sum = state.sum.unwrap_or(TypedValue::Int(0));
                        sum.div(TypedValue::Double(state.count as f64))?
                    }
                }
                AggregationOp::Min => state.min.unwrap_or(TypedValue::Null),
                AggregationOp::Max => state.max.unwrap_or(TypedValue::Null),
                AggregationOp::Collect => TypedValue::List(state.collected),
            };
            frame.set(&element.symbol, value);
        }
        Ok(true)
    }
}

struct SkipCursor<'a> {
    input: BoxCursor<'a>,
    expression: &'a Expression,
    to_skip: Option<i64>,
    skipped: i64,
}

fn eval_count<'a>(
    expression: &Expression,
    frame: &Frame<'a>,
    ctx: &ExecutionContext<'_, 'a>,
    clause: &str,
) -> Result<i64> {
    let evaluator = ctx.evaluator(true);
    match evaluator.eval(expression, frame)? {
        TypedValue::Int(count) if count >= 0 => Ok(count),
        other => Err(GraphError::TypeError(format!(
            "{clause} must be a non-negative integer, got {other}"
        ))),
    }
}

impl<'a> Cursor<'a> for SkipCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        loop {
            if !self.input.pull(frame, ctx)? {
                return Ok(false);
            }
            if self.to_skip.is_none() {
                self.to_skip = Some(eval_count(self.expression, frame, ctx, "SKIP")?);
            }
            if self.skipped < self.to_skip.unwrap_or(0) {
                self.skipped += 1;
                continue;
            }
            return Ok(true);
        }
    }
}

struct LimitCursor<'a> {
    input: BoxCursor<'a>,
    expression: &'a Expression,
    limit: Option<i64>,
    pulled: i64,
}

impl<'a> Cursor<'a> for LimitCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        // The limit is evaluated on the first pull, before any input is
        // touched, so `LIMIT 0` pulls nothing.
        if self.limit.is_none() {
            self.limit = Some(eval_count(self.expression, frame, ctx, "LIMIT")?);
        }
        if self.pulled >= self.limit.unwrap_or(0) {
            return Ok(false);
        }
        if !self.input.pull(frame, ctx)? {
            return Ok(false);
        }
        self.pulled += 1;
        Ok(true)
    }
}

struct OrderByCursor<'a> {
    input: BoxCursor<'a>,
    order: &'a [(SortDirection, Expression)],
    cache: Option<vec::IntoIter<Vec<TypedValue<'a>>>>,
}

impl<'a> Cursor<'a> for OrderByCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        if self.cache.is_none() {
            let evaluator = ctx.evaluator(true);
            let mut rows: Vec<(Vec<TypedValue<'a>>, Vec<TypedValue<'a>>)> = Vec::new();
            while self.input.pull(frame, ctx)? {
                let mut keys = Vec::with_capacity(self.order.len());
                for (_, expression) in self.order {
                    keys.push(evaluator.eval(expression, frame)?);
                }
                rows.push((keys, frame.elems().to_vec()));
            }
            rows.sort_by(|(a, _), (b, _)| {
                for ((direction, _), (x, y)) in self.order.iter().zip(a.iter().zip(b.iter())) {
                    let ordering = match direction {
                        SortDirection::Ascending => total_cmp(x, y),
                        SortDirection::Descending => total_cmp(y, x),
                    };
                    if ordering != std::cmp::Ordering::Equal {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
            self.cache = Some(
                rows.into_iter()
                    .map(|(_, elems)| elems)
                    .collect::<Vec<_>>()
                    .into_iter(),
            );
        }
        let Some(elems) = self.cache.as_mut().and_then(|iter| iter.next()) else {
            return Ok(false);
        };
        frame.restore(elems);
        Ok(true)
    }
}

struct DistinctCursor<'a> {
    input: BoxCursor<'a>,
    expressions: &'a [Expression],
    seen: Vec<Vec<TypedValue<'a>>>,
}

impl<'a> Cursor<'a> for DistinctCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        let evaluator = ctx.evaluator(true);
        'row: while self.input.pull(frame, ctx)? {
            let mut key = Vec::with_capacity(self.expressions.len());
            for expression in self.expressions {
                key.push(evaluator.eval(expression, frame)?);
            }
            for existing in &self.seen {
                if existing.len() == key.len()
                    && existing
                        .iter()
                        .zip(key.iter())
                        .all(|(a, b)| full_equal(a, b))
                {
                    continue 'row;
                }
            }
            self.seen.push(key);
            return Ok(true);
        }
        Ok(false)
    }
}

struct UnwindCursor<'a> {
    input: BoxCursor<'a>,
    symbol: &'a Symbol,
    expression: &'a Expression,
    items: Option<vec::IntoIter<TypedValue<'a>>>,
}

impl<'a> Cursor<'a> for UnwindCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        loop {
            if self.items.is_none() {
                if !self.input.pull(frame, ctx)? {
                    return Ok(false);
                }
                let evaluator = ctx.evaluator(true);
                match evaluator.eval(self.expression, frame)? {
                    TypedValue::Null => continue,
                    TypedValue::List(values) => self.items = Some(values.into_iter()),
                    other => {
                        return Err(GraphError::TypeError(format!(
                            "UNWIND expects a list, got {}",
                            other.type_name()
                        )))
                    }
                }
            }
            if let Some(value) = self.items.as_mut().and_then(|iter| iter.next()) {
                frame.set(self.symbol, value);
                return Ok(true);
            }
            self.items = None;
        }
    }
}

enum OptionalState<'a> {
    NeedInput,
    Iterating { cursor: BoxCursor<'a>, yielded: bool },
}

struct OptionalCursor<'a> {
    input: BoxCursor<'a>,
    optional: &'a LogicalOperator,
    optional_symbols: &'a [Symbol],
    dba: &'a GraphAccessor<'a>,
    state: OptionalState<'a>,
}

impl<'a> Cursor<'a> for OptionalCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        loop {
            match &mut self.state {
                OptionalState::NeedInput => {
                    if !self.input.pull(frame, ctx)? {
                        return Ok(false);
                    }
                    self.state = OptionalState::Iterating {
                        cursor: make_cursor(self.optional, self.dba),
                        yielded: false,
                    };
                }
                OptionalState::Iterating { cursor, yielded } => {
                    if cursor.pull(frame, ctx)? {
                        *yielded = true;
                        return Ok(true);
                    }
                    let any = *yielded;
                    self.state = OptionalState::NeedInput;
                    if !any {
                        for symbol in self.optional_symbols {
                            frame.set(symbol, TypedValue::Null);
                        }
                        return Ok(true);
                    }
                }
            }
        }
    }
}

enum MergeState<'a> {
    NeedInput,
    Matching { cursor: BoxCursor<'a>, matched: bool },
    Creating { cursor: BoxCursor<'a> },
}

struct MergeCursor<'a> {
    input: BoxCursor<'a>,
    merge_match: &'a LogicalOperator,
    merge_create: &'a LogicalOperator,
    on_match: Option<&'a LogicalOperator>,
    on_create: Option<&'a LogicalOperator>,
    dba: &'a GraphAccessor<'a>,
    state: MergeState<'a>,
}

/// Runs a write subtree once against the current frame, e.g. the SET
/// chain of an ON MATCH or ON CREATE clause.
fn apply_subplan<'a>(
    op: Option<&'a LogicalOperator>,
    dba: &'a GraphAccessor<'a>,
    frame: &mut Frame<'a>,
    ctx: &ExecutionContext<'_, 'a>,
) -> Result<()> {
    let Some(op) = op else {
        return Ok(());
    };
    let mut cursor = make_cursor(op, dba);
    while cursor.pull(frame, ctx)? {}
    Ok(())
}

impl<'a> Cursor<'a> for MergeCursor<'a> {
    fn pull(&mut self, frame: &mut Frame<'a>, ctx: &ExecutionContext<'_, 'a>) -> Result<bool> {
        ctx.check_cancel()?;
        loop {
            match &mut self.state {
                MergeState::NeedInput => {
                    if !self.input.pull(frame, ctx)? {
                        return Ok(false);
                    }
                    self.state = MergeState::Matching {
                        cursor: make_cursor(self.merge_match, self.dba),
                        matched: false,
                    };
                }
                MergeState::Matching { cursor, matched } => {
                    if cursor.pull(frame, ctx)? {
                        *matched = true;
                        apply_subplan(self.on_match, self.dba, frame, ctx)?;
                        return Ok(true);
                    }
                    if *matched {
                        self.state = MergeState::NeedInput;
                    } else {
                        self.state = MergeState::Creating {
                            cursor: make_cursor(self.merge_create, self.dba),
                        };
                    }
                }
                MergeState::Creating { cursor } => {
                    if cursor.pull(frame, ctx)? {
                        apply_subplan(self.on_create, self.dba, frame, ctx)?;
                        return Ok(true);
                    }
                    self.state = MergeState::NeedInput;
                }
            }
        }
    }
}
