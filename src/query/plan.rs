//! Logical operator tree.
//!
//! Operators compose as a left-leaning tree; the executor turns each node
//! into a single-use cursor. A missing `input` behaves as `Once`.

use crate::ids::{EdgeTypeId, LabelId, PropertyKey};
use crate::query::ast::{AggregationOp, Expression, NamedExpression, Symbol};
use crate::storage::mvcc::View;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeDirection {
    In,
    Out,
    Both,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Node to create: its symbol, labels, and property initializers.
#[derive(Clone, Debug)]
pub struct NodeCreationInfo {
    pub symbol: Symbol,
    pub labels: Vec<LabelId>,
    pub properties: Vec<(PropertyKey, Expression)>,
}

/// Edge to create alongside a `CreateExpand`.
#[derive(Clone, Debug)]
pub struct EdgeCreationInfo {
    pub symbol: Symbol,
    pub edge_type: EdgeTypeId,
    pub direction: EdgeDirection,
    pub properties: Vec<(PropertyKey, Expression)>,
}

#[derive(Clone, Debug)]
pub struct AggregationElement {
    pub op: AggregationOp,
    /// None means `count(*)`.
    pub expression: Option<Expression>,
    pub symbol: Symbol,
}

#[derive(Clone, Debug)]
pub enum LogicalOperator {
    /// Yields a single empty row.
    Once,
    CreateNode {
        input: Option<Box<LogicalOperator>>,
        node: NodeCreationInfo,
    },
    /// Creates an edge (and optionally its other endpoint) from the vertex
    /// bound to `input_symbol`.
    CreateExpand {
        input: Option<Box<LogicalOperator>>,
        input_symbol: Symbol,
        node: NodeCreationInfo,
        edge: EdgeCreationInfo,
        existing_node: bool,
    },
    ScanAll {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        view: View,
    },
    ScanAllByLabel {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        label: LabelId,
        view: View,
    },
    ScanAllByLabelPropertyValue {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        label: LabelId,
        property: PropertyKey,
        expression: Expression,
        view: View,
    },
    ScanAllByLabelPropertyRange {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        label: LabelId,
        property: PropertyKey,
        /// Bound expression and inclusivity; None is unbounded.
        lower: Option<(Expression, bool)>,
        upper: Option<(Expression, bool)>,
        view: View,
    },
    /// Expands incident edges of `frame[input_symbol]`. With
    /// `existing_node`/`existing_edge` the corresponding symbol must
    /// already be bound and acts as a filter.
    Expand {
        input: Option<Box<LogicalOperator>>,
        input_symbol: Symbol,
        edge_symbol: Symbol,
        node_symbol: Symbol,
        direction: EdgeDirection,
        existing_node: bool,
        existing_edge: bool,
        view: View,
    },
    /// Discards rows where the expression is not literally true.
    Filter {
        input: Option<Box<LogicalOperator>>,
        expression: Expression,
    },
    /// Label/property predicates on a bound vertex, evaluated on the old
    /// view.
    NodeFilter {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        labels: Vec<LabelId>,
        properties: Vec<(PropertyKey, Expression)>,
    },
    /// Type/property predicates on a bound edge, evaluated on the old
    /// view.
    EdgeFilter {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        edge_types: Vec<EdgeTypeId>,
        properties: Vec<(PropertyKey, Expression)>,
    },
    /// Discards rows where `frame[expand_symbol]` equals any of the
    /// previous symbols' values.
    ExpandUniquenessFilter {
        input: Option<Box<LogicalOperator>>,
        expand_symbol: Symbol,
        previous_symbols: Vec<Symbol>,
    },
    Produce {
        input: Option<Box<LogicalOperator>>,
        named_expressions: Vec<NamedExpression>,
    },
    /// Deletes evaluated vertices (optionally detaching) and edges, then
    /// forwards the row.
    Delete {
        input: Option<Box<LogicalOperator>>,
        expressions: Vec<Expression>,
        detach: bool,
    },
    SetProperty {
        input: Option<Box<LogicalOperator>>,
        lhs: Expression,
        property: PropertyKey,
        rhs: Expression,
    },
    SetLabels {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        labels: Vec<LabelId>,
    },
    RemoveProperty {
        input: Option<Box<LogicalOperator>>,
        lhs: Expression,
        property: PropertyKey,
    },
    RemoveLabels {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        labels: Vec<LabelId>,
    },
    /// Exhausts its input into a buffer, optionally advances the command,
    /// then replays the buffered rows. Separates the read and write parts
    /// of a query.
    Accumulate {
        input: Option<Box<LogicalOperator>>,
        symbols: Vec<Symbol>,
        advance_command: bool,
    },
    Aggregate {
        input: Option<Box<LogicalOperator>>,
        aggregations: Vec<AggregationElement>,
        group_by: Vec<Expression>,
        /// Symbols whose values are restored alongside each group's row.
        remember: Vec<Symbol>,
    },
    Skip {
        input: Option<Box<LogicalOperator>>,
        expression: Expression,
    },
    Limit {
        input: Option<Box<LogicalOperator>>,
        expression: Expression,
    },
    OrderBy {
        input: Option<Box<LogicalOperator>>,
        order: Vec<(SortDirection, Expression)>,
    },
    Distinct {
        input: Option<Box<LogicalOperator>>,
        expressions: Vec<Expression>,
    },
    /// Binds each element of the evaluated list to `symbol`, one row per
    /// element.
    Unwind {
        input: Option<Box<LogicalOperator>>,
        symbol: Symbol,
        expression: Expression,
    },
    /// Runs the optional branch per input row; zero branch rows yield the
    /// row once with the optional symbols reset to null.
    Optional {
        input: Option<Box<LogicalOperator>>,
        optional: Box<LogicalOperator>,
        optional_symbols: Vec<Symbol>,
    },
    /// Runs the match branch per input row, applying the `on_match`
    /// subtree to every matched row before forwarding it; on zero matches
    /// runs the create branch instead, applying `on_create` to every
    /// created row. The subtrees are write-operator chains (SetProperty,
    /// SetLabels, ...) evaluated against the row's frame.
    Merge {
        input: Option<Box<LogicalOperator>>,
        merge_match: Box<LogicalOperator>,
        merge_create: Box<LogicalOperator>,
        on_match: Option<Box<LogicalOperator>>,
        on_create: Option<Box<LogicalOperator>>,
    },
}
