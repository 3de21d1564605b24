use duskdb::query::{
    collect_results, pull_all, AggregationElement, AggregationOp, BinaryOp, EdgeDirection,
    Expression, LogicalOperator, NamedExpression, Parameters, SortDirection, Symbol, SymbolTable,
    TypedValue, UnaryOp,
};
use duskdb::{Config, GraphAccessor, GraphDB, GraphError, PropertyValue, Result, View};

fn open_db() -> Result<GraphDB> {
    // First caller installs the subscriber; later calls are no-ops.
    let _ = duskdb::logging::init("duskdb=warn");
    GraphDB::new(Config::in_memory())
}

fn scan_all(
    symbol_table: &mut SymbolTable,
    name: &str,
    input: Option<LogicalOperator>,
    view: View,
) -> (LogicalOperator, Symbol) {
    let symbol = symbol_table.create_symbol(name);
    (
        LogicalOperator::ScanAll {
            input: input.map(Box::new),
            symbol: symbol.clone(),
            view,
        },
        symbol,
    )
}

#[allow(clippy::too_many_arguments)]
fn expand(
    symbol_table: &mut SymbolTable,
    input: LogicalOperator,
    input_symbol: &Symbol,
    edge_name: &str,
    node_name: &str,
    direction: EdgeDirection,
    view: View,
) -> (LogicalOperator, Symbol, Symbol) {
    let edge_symbol = symbol_table.create_symbol(edge_name);
    let node_symbol = symbol_table.create_symbol(node_name);
    (
        LogicalOperator::Expand {
            input: Some(Box::new(input)),
            input_symbol: input_symbol.clone(),
            edge_symbol: edge_symbol.clone(),
            node_symbol: node_symbol.clone(),
            direction,
            existing_node: false,
            existing_edge: false,
            view,
        },
        edge_symbol,
        node_symbol,
    )
}

/// RETURN items projecting already-bound symbols.
fn produce_symbols(
    symbol_table: &mut SymbolTable,
    input: Option<LogicalOperator>,
    items: Vec<(&str, Symbol)>,
) -> LogicalOperator {
    let mut named_expressions = Vec::new();
    for (name, symbol) in items {
        let ident_id = symbol_table.next_ast_id();
        symbol_table.associate(ident_id, symbol);
        let output_id = symbol_table.next_ast_id();
        let output_symbol = symbol_table.create_symbol(name);
        symbol_table.associate(output_id, output_symbol);
        named_expressions.push(NamedExpression::new(
            output_id,
            name,
            Expression::ident(ident_id, name),
        ));
    }
    LogicalOperator::Produce {
        input: input.map(Box::new),
        named_expressions,
    }
}

/// RETURN items over arbitrary expressions.
fn produce_expressions(
    symbol_table: &mut SymbolTable,
    input: Option<LogicalOperator>,
    items: Vec<(&str, Expression)>,
) -> LogicalOperator {
    let mut named_expressions = Vec::new();
    for (name, expression) in items {
        let output_id = symbol_table.next_ast_id();
        let output_symbol = symbol_table.create_symbol(name);
        symbol_table.associate(output_id, output_symbol);
        named_expressions.push(NamedExpression::new(output_id, name, expression));
    }
    LogicalOperator::Produce {
        input: input.map(Box::new),
        named_expressions,
    }
}

fn ident_for(symbol_table: &mut SymbolTable, symbol: &Symbol) -> Expression {
    let id = symbol_table.next_ast_id();
    symbol_table.associate(id, symbol.clone());
    Expression::ident(id, &symbol.name)
}

#[test]
fn match_return() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    dba.insert_vertex()?;
    dba.insert_vertex()?;
    dba.advance_command();

    let params = Parameters::new();
    let pull_count = |dba: &GraphAccessor<'_>, view: View| -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, n) = scan_all(&mut symbol_table, "n", None, view);
        let plan = produce_symbols(&mut symbol_table, Some(scan), vec![("n", n)]);
        pull_all(&plan, dba, &symbol_table, &params)
    };

    assert_eq!(pull_count(&dba, View::Old)?, 2);
    assert_eq!(pull_count(&dba, View::New)?, 2);
    dba.insert_vertex()?;
    assert_eq!(pull_count(&dba, View::Old)?, 2);
    assert_eq!(pull_count(&dba, View::New)?, 3);
    dba.advance_command();
    assert_eq!(pull_count(&dba, View::Old)?, 3);
    dba.commit()?;
    Ok(())
}

#[test]
fn match_return_cartesian() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let l1 = dba.label("l1");
    let l2 = dba.label("l2");
    dba.insert_vertex()?.add_label(l1)?;
    dba.insert_vertex()?.add_label(l2)?;
    dba.advance_command();

    let mut symbol_table = SymbolTable::new();
    let (scan_n, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let (scan_m, m) = scan_all(&mut symbol_table, "m", Some(scan_n), View::Old);
    let plan = produce_symbols(&mut symbol_table, Some(scan_m), vec![("n", n), ("m", m)]);
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 4);
    // The outer scan varies slowest.
    assert_eq!(results[0][0], results[1][0]);
    assert_ne!(results[0][1], results[1][1]);
    dba.commit()?;
    Ok(())
}

#[test]
fn standalone_return() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let mut symbol_table = SymbolTable::new();
    let plan = produce_expressions(
        &mut symbol_table,
        None,
        vec![("n", Expression::literal(42i64))],
    );
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0][0], TypedValue::Int(42));
    dba.commit()?;
    Ok(())
}

#[test]
fn node_filter_labels_and_properties() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let label = dba.label("Label");
    let property = dba.property("Property");
    // All combinations of (label | no label) x (no | wrong | right prop);
    // only v1 matches both.
    let mut v1 = dba.insert_vertex()?;
    let mut v2 = dba.insert_vertex()?;
    let mut v3 = dba.insert_vertex()?;
    let mut v4 = dba.insert_vertex()?;
    let mut v5 = dba.insert_vertex()?;
    dba.insert_vertex()?;
    v1.add_label(label)?;
    v2.add_label(label)?;
    v3.add_label(label)?;
    v1.props_set(property, PropertyValue::Int(42))?;
    v2.props_set(property, PropertyValue::Int(1))?;
    v4.props_set(property, PropertyValue::Int(42))?;
    v5.props_set(property, PropertyValue::Int(1))?;
    dba.advance_command();

    let params = Parameters::new();
    let pull = |dba: &GraphAccessor<'_>| -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
        let filter = LogicalOperator::NodeFilter {
            input: Some(Box::new(scan)),
            symbol: n.clone(),
            labels: vec![label],
            properties: vec![(property, Expression::literal(42i64))],
        };
        let plan = produce_symbols(&mut symbol_table, Some(filter), vec![("n", n)]);
        pull_all(&plan, dba, &symbol_table, &params)
    };

    assert_eq!(pull(&dba)?, 1);
    // Filtering works against the old state.
    v4.reconstruct();
    v4.add_label(label)?;
    assert_eq!(pull(&dba)?, 1);
    dba.advance_command();
    assert_eq!(pull(&dba)?, 2);
    dba.commit()?;
    Ok(())
}

#[test]
fn expand_over_all_directions() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    // V-graph (v3)<-[r2]-(v1)-[r1]->(v2)
    let v1 = dba.insert_vertex()?;
    let v2 = dba.insert_vertex()?;
    let v3 = dba.insert_vertex()?;
    let edge_type = dba.edge_type("Edge");
    dba.insert_edge(&v1, &v2, edge_type)?;
    dba.insert_edge(&v1, &v3, edge_type)?;
    dba.advance_command();

    let params = Parameters::new();
    let test_expand = |dba: &GraphAccessor<'_>, direction, view| -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, n) = scan_all(&mut symbol_table, "n", None, view);
        let (expand_op, _, m) =
            expand(&mut symbol_table, scan, &n, "r", "m", direction, view);
        let plan = produce_symbols(&mut symbol_table, Some(expand_op), vec![("m", m)]);
        pull_all(&plan, dba, &symbol_table, &params)
    };

    assert_eq!(test_expand(&dba, EdgeDirection::Out, View::Old)?, 2);
    assert_eq!(test_expand(&dba, EdgeDirection::In, View::Old)?, 2);
    assert_eq!(test_expand(&dba, EdgeDirection::Both, View::Old)?, 4);

    // New edges are visible only through the new view until the command
    // advances.
    dba.insert_edge(&v1, &v2, edge_type)?;
    dba.insert_edge(&v1, &v3, edge_type)?;
    assert_eq!(test_expand(&dba, EdgeDirection::Out, View::Old)?, 2);
    assert_eq!(test_expand(&dba, EdgeDirection::In, View::Old)?, 2);
    assert_eq!(test_expand(&dba, EdgeDirection::Both, View::Old)?, 4);
    assert_eq!(test_expand(&dba, EdgeDirection::Out, View::New)?, 4);
    assert_eq!(test_expand(&dba, EdgeDirection::In, View::New)?, 4);
    assert_eq!(test_expand(&dba, EdgeDirection::Both, View::New)?, 8);
    dba.advance_command();
    assert_eq!(test_expand(&dba, EdgeDirection::Out, View::Old)?, 4);
    assert_eq!(test_expand(&dba, EdgeDirection::Both, View::Old)?, 8);
    dba.commit()?;
    Ok(())
}

#[test]
fn expand_both_yields_cycle_once() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let v = dba.insert_vertex()?;
    dba.insert_edge(&v, &v, dba.edge_type("et"))?;
    dba.advance_command();

    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let (expand_op, _, _) = expand(
        &mut symbol_table,
        scan,
        &n,
        "r",
        "_",
        EdgeDirection::Both,
        View::Old,
    );
    let params = Parameters::new();
    assert_eq!(pull_all(&expand_op, &dba, &symbol_table, &params)?, 1);
    dba.commit()?;
    Ok(())
}

#[test]
fn expand_to_existing_node() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    // (v1)->(v2) plus a recursive edge (v1)->(v1)
    let v1 = dba.insert_vertex()?;
    let v2 = dba.insert_vertex()?;
    let edge_type = dba.edge_type("Edge");
    dba.insert_edge(&v1, &v1, edge_type)?;
    dba.insert_edge(&v1, &v2, edge_type)?;
    dba.advance_command();

    let params = Parameters::new();
    let test_existing = |dba: &GraphAccessor<'_>, with_existing: bool| -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
        let edge_symbol = symbol_table.create_symbol("r");
        let node_symbol = if with_existing {
            n.clone()
        } else {
            symbol_table.create_symbol("m")
        };
        let expand_op = LogicalOperator::Expand {
            input: Some(Box::new(scan)),
            input_symbol: n.clone(),
            edge_symbol,
            node_symbol,
            direction: EdgeDirection::Out,
            existing_node: with_existing,
            existing_edge: false,
            view: View::Old,
        };
        pull_all(&expand_op, dba, &symbol_table, &params)
    };

    assert_eq!(test_existing(&dba, true)?, 1);
    assert_eq!(test_existing(&dba, false)?, 2);
    dba.commit()?;
    Ok(())
}

#[test]
fn expand_with_existing_edge() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    // V-graph (v3)<-[r2]-(v1)-[r1]->(v2)
    let v1 = dba.insert_vertex()?;
    let v2 = dba.insert_vertex()?;
    let v3 = dba.insert_vertex()?;
    let edge_type = dba.edge_type("Edge");
    dba.insert_edge(&v1, &v2, edge_type)?;
    dba.insert_edge(&v1, &v3, edge_type)?;
    dba.advance_command();

    let params = Parameters::new();
    let test_existing = |dba: &GraphAccessor<'_>, with_existing: bool| -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, i) = scan_all(&mut symbol_table, "i", None, View::Old);
        let (expand_j, r, j) = expand(
            &mut symbol_table,
            scan,
            &i,
            "r",
            "j",
            EdgeDirection::Both,
            View::Old,
        );
        let edge_symbol = if with_existing {
            r.clone()
        } else {
            symbol_table.create_symbol("r2")
        };
        let node_symbol = symbol_table.create_symbol("k");
        let expand_k = LogicalOperator::Expand {
            input: Some(Box::new(expand_j)),
            input_symbol: j,
            edge_symbol,
            node_symbol,
            direction: EdgeDirection::Both,
            existing_node: false,
            existing_edge: with_existing,
            view: View::Old,
        };
        pull_all(&expand_k, dba, &symbol_table, &params)
    };

    assert_eq!(test_existing(&dba, true)?, 4);
    assert_eq!(test_existing(&dba, false)?, 6);
    dba.commit()?;
    Ok(())
}

#[test]
fn edge_filter_on_type_and_property() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    // An N-star from vertices[0] with all combinations of edge type and
    // property values; exactly one edge qualifies.
    let edge_types = [dba.edge_type("et0"), dba.edge_type("et1")];
    let mut vertices = Vec::new();
    for _ in 0..7 {
        vertices.push(dba.insert_vertex()?);
    }
    let prop = dba.property("prop");
    let mut edges = Vec::new();
    for i in 0..6 {
        let mut edge =
            dba.insert_edge(&vertices[0], &vertices[i + 1], edge_types[i % 2])?;
        match i % 3 {
            0 => edge.props_set(prop, PropertyValue::Int(42))?,
            1 => edge.props_set(prop, PropertyValue::Int(100))?,
            _ => {}
        }
        edges.push(edge);
    }
    dba.advance_command();
    for vertex in &mut vertices {
        vertex.reconstruct();
    }
    for edge in &mut edges {
        edge.reconstruct();
    }

    let params = Parameters::new();
    let test_filter = |dba: &GraphAccessor<'_>| -> Result<u64> {
        // MATCH (n)-[r:et0 {prop: 42}]->(m) RETURN m
        let mut symbol_table = SymbolTable::new();
        let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
        let (expand_op, r, m) = expand(
            &mut symbol_table,
            scan,
            &n,
            "r",
            "m",
            EdgeDirection::Out,
            View::Old,
        );
        let filter = LogicalOperator::EdgeFilter {
            input: Some(Box::new(expand_op)),
            symbol: r,
            edge_types: vec![edge_types[0]],
            properties: vec![(prop, Expression::literal(42i64))],
        };
        let plan = produce_symbols(&mut symbol_table, Some(filter), vec![("m", m)]);
        pull_all(&plan, dba, &symbol_table, &params)
    };

    assert_eq!(test_filter(&dba)?, 1);
    // Edge filtering always reads the old state.
    for edge in &mut edges {
        edge.props_set(prop, PropertyValue::Int(42))?;
    }
    assert_eq!(test_filter(&dba)?, 1);
    dba.advance_command();
    assert_eq!(test_filter(&dba)?, 3);
    dba.commit()?;
    Ok(())
}

#[test]
fn filter_discards_non_true_rows() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let property = dba.property("Property");
    for i in 0..6i64 {
        let mut vertex = dba.insert_vertex()?;
        vertex.props_set(property, PropertyValue::Bool(i % 3 == 0))?;
    }
    // No property gives null, which is discarded.
    dba.insert_vertex()?;
    dba.advance_command();

    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let lookup = Expression::property(ident_for(&mut symbol_table, &n), "Property", property);
    let filter = LogicalOperator::Filter {
        input: Some(Box::new(scan)),
        expression: lookup,
    };
    let plan = produce_symbols(&mut symbol_table, Some(filter), vec![("n", n)]);
    let params = Parameters::new();
    assert_eq!(pull_all(&plan, &dba, &symbol_table, &params)?, 2);
    dba.commit()?;
    Ok(())
}

#[test]
fn expand_uniqueness_filters_vertices_and_edges() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let v1 = dba.insert_vertex()?;
    let v2 = dba.insert_vertex()?;
    let edge_type = dba.edge_type("edge_type");
    dba.insert_edge(&v1, &v2, edge_type)?;
    dba.insert_edge(&v1, &v1, edge_type)?;
    dba.advance_command();

    let params = Parameters::new();
    let check = |dba: &GraphAccessor<'_>,
                 vertex_uniqueness: bool,
                 edge_uniqueness: bool|
     -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, n1) = scan_all(&mut symbol_table, "n1", None, View::Old);
        let (expand_1, r1, n2) = expand(
            &mut symbol_table,
            scan,
            &n1,
            "r1",
            "n2",
            EdgeDirection::Out,
            View::Old,
        );
        let mut last = expand_1;
        if vertex_uniqueness {
            last = LogicalOperator::ExpandUniquenessFilter {
                input: Some(Box::new(last)),
                expand_symbol: n2.clone(),
                previous_symbols: vec![n1.clone()],
            };
        }
        let (expand_2, r2, n3) = expand(
            &mut symbol_table,
            last,
            &n2,
            "r2",
            "n3",
            EdgeDirection::Out,
            View::Old,
        );
        last = expand_2;
        if edge_uniqueness {
            last = LogicalOperator::ExpandUniquenessFilter {
                input: Some(Box::new(last)),
                expand_symbol: r2,
                previous_symbols: vec![r1],
            };
        }
        if vertex_uniqueness {
            last = LogicalOperator::ExpandUniquenessFilter {
                input: Some(Box::new(last)),
                expand_symbol: n3,
                previous_symbols: vec![n1, n2],
            };
        }
        pull_all(&last, dba, &symbol_table, &params)
    };

    assert_eq!(check(&dba, false, false)?, 2);
    assert_eq!(check(&dba, true, false)?, 0);
    assert_eq!(check(&dba, false, true)?, 1);
    dba.commit()?;
    Ok(())
}

#[test]
fn optional_match_on_empty_database() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let optional = LogicalOperator::Optional {
        input: None,
        optional: Box::new(scan),
        optional_symbols: vec![n.clone()],
    };
    let plan = produce_symbols(&mut symbol_table, Some(optional), vec![("n", n)]);
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 1);
    assert!(results[0][0].is_null());
    dba.commit()?;
    Ok(())
}

#[test]
fn optional_expand_fills_nulls() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    // (v2 {p: 2})<-[:T]-(v1 {p: 1})-[:T]->(v3 {p: 2})
    let prop = dba.property("p");
    let edge_type = dba.edge_type("T");
    let mut v1 = dba.insert_vertex()?;
    v1.props_set(prop, PropertyValue::Int(1))?;
    let mut v2 = dba.insert_vertex()?;
    v2.props_set(prop, PropertyValue::Int(2))?;
    dba.insert_edge(&v1, &v2, edge_type)?;
    let mut v3 = dba.insert_vertex()?;
    v3.props_set(prop, PropertyValue::Int(2))?;
    dba.insert_edge(&v1, &v3, edge_type)?;
    dba.advance_command();

    // MATCH (n) OPTIONAL MATCH (n)-[r]->(m) RETURN n, r, m
    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let (expand_op, r, m) = {
        let edge_symbol = symbol_table.create_symbol("r");
        let node_symbol = symbol_table.create_symbol("m");
        (
            LogicalOperator::Expand {
                input: None,
                input_symbol: n.clone(),
                edge_symbol: edge_symbol.clone(),
                node_symbol: node_symbol.clone(),
                direction: EdgeDirection::Out,
                existing_node: false,
                existing_edge: false,
                view: View::Old,
            },
            edge_symbol,
            node_symbol,
        )
    };
    let optional = LogicalOperator::Optional {
        input: Some(Box::new(scan)),
        optional: Box::new(expand_op),
        optional_symbols: vec![r.clone(), m.clone()],
    };
    let plan = produce_symbols(
        &mut symbol_table,
        Some(optional),
        vec![("n", n), ("r", r), ("m", m)],
    );
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 4);
    let mut v1_rows = 0;
    for row in &results {
        let TypedValue::Vertex(vertex) = &row[0] else {
            panic!("expected a vertex binding");
        };
        if vertex.props_at(prop)? == PropertyValue::Int(1) {
            v1_rows += 1;
            assert!(matches!(row[1], TypedValue::Edge(_)));
            assert!(matches!(row[2], TypedValue::Vertex(_)));
        } else {
            assert!(row[1].is_null());
            assert!(row[2].is_null());
        }
    }
    assert_eq!(v1_rows, 2);
    dba.commit()?;
    Ok(())
}

#[test]
fn arithmetic_and_logic_expressions() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let params = Parameters::new();

    let lit_bool = |v: bool| Expression::literal(v);
    let bin = Expression::binary;
    // not true or true and false or
    //   not ((true xor false or true) and true or false xor true)
    let inner = bin(
        BinaryOp::Or,
        bin(
            BinaryOp::And,
            bin(
                BinaryOp::Or,
                bin(BinaryOp::Xor, lit_bool(true), lit_bool(false)),
                lit_bool(true),
            ),
            lit_bool(true),
        ),
        bin(BinaryOp::Xor, lit_bool(false), lit_bool(true)),
    );
    let logic = bin(
        BinaryOp::Or,
        bin(
            BinaryOp::Or,
            Expression::unary(UnaryOp::Not, lit_bool(true)),
            bin(BinaryOp::And, lit_bool(true), lit_bool(false)),
        ),
        Expression::unary(UnaryOp::Not, inner),
    );
    // 3/2 <> 7.5/5 (integer division) and 3.0/2 = 7.5/5
    let int_division = bin(
        BinaryOp::Ne,
        bin(
            BinaryOp::Div,
            Expression::literal(3i64),
            Expression::literal(2i64),
        ),
        bin(
            BinaryOp::Div,
            Expression::literal(7.5f64),
            Expression::literal(5i64),
        ),
    );
    let double_division = bin(
        BinaryOp::Eq,
        bin(
            BinaryOp::Div,
            Expression::literal(3.0f64),
            Expression::literal(2i64),
        ),
        bin(
            BinaryOp::Div,
            Expression::literal(7.5f64),
            Expression::literal(5i64),
        ),
    );

    let mut symbol_table = SymbolTable::new();
    let plan = produce_expressions(
        &mut symbol_table,
        None,
        vec![
            ("logic", logic),
            ("int_division", int_division),
            ("double_division", double_division),
        ],
    );
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0][0], TypedValue::Bool(false));
    assert_eq!(results[0][1], TypedValue::Bool(true));
    assert_eq!(results[0][2], TypedValue::Bool(true));
    dba.commit()?;
    Ok(())
}

#[test]
fn aggregate_count_sum_collect() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let prop = dba.property("x");
    for i in 1..=4i64 {
        let mut vertex = dba.insert_vertex()?;
        vertex.props_set(prop, PropertyValue::Int(i))?;
    }
    // One vertex without the property; aggregates skip its null.
    dba.insert_vertex()?;
    dba.advance_command();

    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let count_symbol = symbol_table.create_symbol("count");
    let sum_symbol = symbol_table.create_symbol("sum");
    let min_symbol = symbol_table.create_symbol("min");
    let max_symbol = symbol_table.create_symbol("max");
    let avg_symbol = symbol_table.create_symbol("avg");
    let collect_symbol = symbol_table.create_symbol("collect");
    let value_of_n = |symbol_table: &mut SymbolTable| {
        Expression::property(ident_for(symbol_table, &n), "x", prop)
    };
    let aggregations = vec![
        AggregationElement {
            op: AggregationOp::Count,
            expression: Some(value_of_n(&mut symbol_table)),
            symbol: count_symbol.clone(),
        },
        AggregationElement {
            op: AggregationOp::Sum,
            expression: Some(value_of_n(&mut symbol_table)),
            symbol: sum_symbol.clone(),
        },
        AggregationElement {
            op: AggregationOp::Min,
            expression: Some(value_of_n(&mut symbol_table)),
            symbol: min_symbol.clone(),
        },
        AggregationElement {
            op: AggregationOp::Max,
            expression: Some(value_of_n(&mut symbol_table)),
            symbol: max_symbol.clone(),
        },
        AggregationElement {
            op: AggregationOp::Avg,
            expression: Some(value_of_n(&mut symbol_table)),
            symbol: avg_symbol.clone(),
        },
        AggregationElement {
            op: AggregationOp::Collect,
            expression: Some(value_of_n(&mut symbol_table)),
            symbol: collect_symbol.clone(),
        },
    ];
    let aggregate = LogicalOperator::Aggregate {
        input: Some(Box::new(scan)),
        aggregations,
        group_by: vec![],
        remember: vec![],
    };
    let items = [
        ("count", count_symbol),
        ("sum", sum_symbol),
        ("min", min_symbol),
        ("max", max_symbol),
        ("avg", avg_symbol),
        ("collect", collect_symbol),
    ];
    let plan = produce_symbols(&mut symbol_table, Some(aggregate), items.to_vec());
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0][0], TypedValue::Int(4));
    assert_eq!(results[0][1], TypedValue::Int(10));
    assert_eq!(results[0][2], TypedValue::Int(1));
    assert_eq!(results[0][3], TypedValue::Int(4));
    assert_eq!(results[0][4], TypedValue::Double(2.5));
    let TypedValue::List(collected) = &results[0][5] else {
        panic!("collect yields a list");
    };
    assert_eq!(collected.len(), 4);
    dba.commit()?;
    Ok(())
}

#[test]
fn aggregate_over_empty_input_yields_one_row() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let count_symbol = symbol_table.create_symbol("count");
    let aggregate = LogicalOperator::Aggregate {
        input: Some(Box::new(scan)),
        aggregations: vec![AggregationElement {
            op: AggregationOp::Count,
            expression: Some(ident_for(&mut symbol_table, &n)),
            symbol: count_symbol.clone(),
        }],
        group_by: vec![],
        remember: vec![],
    };
    let plan = produce_symbols(&mut symbol_table, Some(aggregate), vec![("count", count_symbol)]);
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0][0], TypedValue::Int(0));
    dba.commit()?;
    Ok(())
}

fn unwind_list(
    symbol_table: &mut SymbolTable,
    values: Vec<PropertyValue>,
) -> (LogicalOperator, Symbol) {
    let symbol = symbol_table.create_symbol("x");
    (
        LogicalOperator::Unwind {
            input: None,
            symbol: symbol.clone(),
            expression: Expression::Literal(PropertyValue::List(values)),
        },
        symbol,
    )
}

#[test]
fn unwind_skip_limit_boundaries() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let params = Parameters::new();
    let ints = |values: &[i64]| -> Vec<PropertyValue> {
        values.iter().map(|v| PropertyValue::Int(*v)).collect()
    };

    {
        let mut symbol_table = SymbolTable::new();
        let (unwind, _) = unwind_list(&mut symbol_table, ints(&[1, 2, 3, 4, 5]));
        let skip = LogicalOperator::Skip {
            input: Some(Box::new(unwind)),
            expression: Expression::literal(2i64),
        };
        assert_eq!(pull_all(&skip, &dba, &symbol_table, &params)?, 3);
    }
    {
        // SKIP past the input size gives zero rows.
        let mut symbol_table = SymbolTable::new();
        let (unwind, _) = unwind_list(&mut symbol_table, ints(&[1, 2, 3]));
        let skip = LogicalOperator::Skip {
            input: Some(Box::new(unwind)),
            expression: Expression::literal(10i64),
        };
        assert_eq!(pull_all(&skip, &dba, &symbol_table, &params)?, 0);
    }
    {
        // LIMIT 0 pulls nothing at all.
        let mut symbol_table = SymbolTable::new();
        let (unwind, _) = unwind_list(&mut symbol_table, ints(&[1, 2, 3]));
        let limit = LogicalOperator::Limit {
            input: Some(Box::new(unwind)),
            expression: Expression::literal(0i64),
        };
        assert_eq!(pull_all(&limit, &dba, &symbol_table, &params)?, 0);
    }
    {
        let mut symbol_table = SymbolTable::new();
        let (unwind, _) = unwind_list(&mut symbol_table, ints(&[1, 2, 3]));
        let limit = LogicalOperator::Limit {
            input: Some(Box::new(unwind)),
            expression: Expression::literal(2i64),
        };
        assert_eq!(pull_all(&limit, &dba, &symbol_table, &params)?, 2);
    }
    {
        // Unwinding null yields no rows; a non-list is a type error.
        let mut symbol_table = SymbolTable::new();
        let symbol = symbol_table.create_symbol("x");
        let unwind = LogicalOperator::Unwind {
            input: None,
            symbol: symbol.clone(),
            expression: Expression::Literal(PropertyValue::Null),
        };
        assert_eq!(pull_all(&unwind, &dba, &symbol_table, &params)?, 0);
        let unwind = LogicalOperator::Unwind {
            input: None,
            symbol,
            expression: Expression::literal(5i64),
        };
        let err = pull_all(&unwind, &dba, &symbol_table, &params).unwrap_err();
        assert!(matches!(err, GraphError::TypeError(_)));
    }
    {
        // Negative SKIP is rejected.
        let mut symbol_table = SymbolTable::new();
        let (unwind, _) = unwind_list(&mut symbol_table, ints(&[1]));
        let skip = LogicalOperator::Skip {
            input: Some(Box::new(unwind)),
            expression: Expression::literal(-1i64),
        };
        assert!(pull_all(&skip, &dba, &symbol_table, &params).is_err());
    }
    dba.commit()?;
    Ok(())
}

#[test]
fn order_by_sorts_nulls_last_ascending() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let params = Parameters::new();

    let build = |direction: SortDirection| -> (LogicalOperator, SymbolTable) {
        let mut symbol_table = SymbolTable::new();
        let (unwind, x) = unwind_list(
            &mut symbol_table,
            vec![
                PropertyValue::Int(3),
                PropertyValue::Null,
                PropertyValue::Int(1),
            ],
        );
        let order_by = LogicalOperator::OrderBy {
            input: Some(Box::new(unwind)),
            order: vec![(direction, ident_for(&mut symbol_table, &x))],
        };
        let plan = produce_symbols(&mut symbol_table, Some(order_by), vec![("x", x)]);
        (plan, symbol_table)
    };

    let (plan, symbol_table) = build(SortDirection::Ascending);
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results[0][0], TypedValue::Int(1));
    assert_eq!(results[1][0], TypedValue::Int(3));
    assert!(results[2][0].is_null());

    let (plan, symbol_table) = build(SortDirection::Descending);
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert!(results[0][0].is_null());
    assert_eq!(results[1][0], TypedValue::Int(3));
    assert_eq!(results[2][0], TypedValue::Int(1));
    dba.commit()?;
    Ok(())
}

#[test]
fn distinct_dedupes_including_null() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let mut symbol_table = SymbolTable::new();
    let (unwind, x) = unwind_list(
        &mut symbol_table,
        vec![
            PropertyValue::Int(1),
            PropertyValue::Int(2),
            PropertyValue::Int(1),
            PropertyValue::Null,
            PropertyValue::Null,
            PropertyValue::Int(2),
        ],
    );
    let distinct = LogicalOperator::Distinct {
        input: Some(Box::new(unwind)),
        expressions: vec![ident_for(&mut symbol_table, &x)],
    };
    let params = Parameters::new();
    assert_eq!(pull_all(&distinct, &dba, &symbol_table, &params)?, 3);
    dba.commit()?;
    Ok(())
}

#[test]
fn create_node_and_expand() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let label = dba.label("L");
    let prop = dba.property("p");
    let edge_type = dba.edge_type("t");

    // CREATE (a:L {p: 1})-[:t]->(b)
    let mut symbol_table = SymbolTable::new();
    let a = symbol_table.create_symbol("a");
    let b = symbol_table.create_symbol("b");
    let e = symbol_table.create_symbol("e");
    let create_a = LogicalOperator::CreateNode {
        input: None,
        node: duskdb::query::NodeCreationInfo {
            symbol: a.clone(),
            labels: vec![label],
            properties: vec![(prop, Expression::literal(1i64))],
        },
    };
    let create_rest = LogicalOperator::CreateExpand {
        input: Some(Box::new(create_a)),
        input_symbol: a,
        node: duskdb::query::NodeCreationInfo {
            symbol: b,
            labels: vec![],
            properties: vec![],
        },
        edge: duskdb::query::EdgeCreationInfo {
            symbol: e,
            edge_type,
            direction: EdgeDirection::Out,
            properties: vec![(prop, Expression::literal(2i64))],
        },
        existing_node: false,
    };
    let params = Parameters::new();
    assert_eq!(pull_all(&create_rest, &dba, &symbol_table, &params)?, 1);
    assert_eq!(dba.vertices_count(View::New), 2);
    assert_eq!(dba.edges_count(View::New), 1);
    let labeled: Vec<_> = dba.vertices_by_label(label, View::New).collect();
    assert_eq!(labeled.len(), 1);
    assert_eq!(labeled[0].props_at(prop)?, PropertyValue::Int(1));
    dba.commit()?;
    Ok(())
}

#[test]
fn set_property_visible_after_accumulate_advance() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let prop = dba.property("p");
    for _ in 0..3 {
        let mut vertex = dba.insert_vertex()?;
        vertex.props_set(prop, PropertyValue::Int(1))?;
    }
    dba.advance_command();

    // MATCH (n) SET n.p = 2 RETURN n.p
    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let set = LogicalOperator::SetProperty {
        input: Some(Box::new(scan)),
        lhs: ident_for(&mut symbol_table, &n),
        property: prop,
        rhs: Expression::literal(2i64),
    };
    let accumulate = LogicalOperator::Accumulate {
        input: Some(Box::new(set)),
        symbols: vec![n.clone()],
        advance_command: true,
    };
    let lookup = Expression::property(ident_for(&mut symbol_table, &n), "p", prop);
    let plan = produce_expressions(&mut symbol_table, Some(accumulate), vec![("p", lookup)]);
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert_eq!(results.len(), 3);
    for row in &results {
        assert_eq!(row[0], TypedValue::Int(2));
    }
    dba.commit()?;
    Ok(())
}

#[test]
fn delete_via_plan() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let a = dba.insert_vertex()?;
    let b = dba.insert_vertex()?;
    dba.insert_edge(&a, &b, dba.edge_type("t"))?;
    dba.advance_command();

    // MATCH (n) DETACH DELETE n
    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let delete = LogicalOperator::Delete {
        input: Some(Box::new(scan)),
        expressions: vec![ident_for(&mut symbol_table, &n)],
        detach: true,
    };
    let params = Parameters::new();
    assert_eq!(pull_all(&delete, &dba, &symbol_table, &params)?, 2);
    assert_eq!(dba.vertices_count(View::New), 0);
    assert_eq!(dba.edges_count(View::New), 0);
    dba.commit()?;
    Ok(())
}

#[test]
fn merge_matches_or_creates() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let params = Parameters::new();

    let run_merge = |dba: &GraphAccessor<'_>| -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, n) = scan_all(&mut symbol_table, "n", None, View::New);
        let create = LogicalOperator::CreateNode {
            input: None,
            node: duskdb::query::NodeCreationInfo {
                symbol: n,
                labels: vec![],
                properties: vec![],
            },
        };
        let merge = LogicalOperator::Merge {
            input: None,
            merge_match: Box::new(scan),
            merge_create: Box::new(create),
            on_match: None,
            on_create: None,
        };
        pull_all(&merge, dba, &symbol_table, &params)
    };

    // First run creates, second run matches without creating.
    assert_eq!(run_merge(&dba)?, 1);
    assert_eq!(dba.vertices_count(View::New), 1);
    assert_eq!(run_merge(&dba)?, 1);
    assert_eq!(dba.vertices_count(View::New), 1);
    dba.commit()?;
    Ok(())
}

#[test]
fn merge_applies_on_match_and_on_create() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let status = dba.property("status");
    let params = Parameters::new();

    // MERGE (n) ON MATCH SET n.status = "matched"
    //           ON CREATE SET n.status = "created"
    let run_merge = |dba: &GraphAccessor<'_>| -> Result<u64> {
        let mut symbol_table = SymbolTable::new();
        let (scan, n) = scan_all(&mut symbol_table, "n", None, View::New);
        let create = LogicalOperator::CreateNode {
            input: None,
            node: duskdb::query::NodeCreationInfo {
                symbol: n.clone(),
                labels: vec![],
                properties: vec![],
            },
        };
        let on_match = LogicalOperator::SetProperty {
            input: None,
            lhs: ident_for(&mut symbol_table, &n),
            property: status,
            rhs: Expression::literal("matched"),
        };
        let on_create = LogicalOperator::SetProperty {
            input: None,
            lhs: ident_for(&mut symbol_table, &n),
            property: status,
            rhs: Expression::literal("created"),
        };
        let merge = LogicalOperator::Merge {
            input: None,
            merge_match: Box::new(scan),
            merge_create: Box::new(create),
            on_match: Some(Box::new(on_match)),
            on_create: Some(Box::new(on_create)),
        };
        pull_all(&merge, dba, &symbol_table, &params)
    };

    // The create branch runs first and marks the row created.
    assert_eq!(run_merge(&dba)?, 1);
    assert_eq!(dba.vertices_count(View::New), 1);
    let vertex = dba
        .vertices(View::New)
        .next()
        .expect("merged vertex exists");
    assert_eq!(vertex.props_at(status)?, PropertyValue::from("created"));

    // The second run matches the existing row and re-marks it.
    assert_eq!(run_merge(&dba)?, 1);
    assert_eq!(dba.vertices_count(View::New), 1);
    let vertex = dba
        .vertices(View::New)
        .next()
        .expect("merged vertex exists");
    assert_eq!(vertex.props_at(status)?, PropertyValue::from("matched"));
    dba.commit()?;
    Ok(())
}

#[test]
fn cancellation_aborts_pulls() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    dba.insert_vertex()?;
    dba.advance_command();
    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let plan = produce_symbols(&mut symbol_table, Some(scan), vec![("n", n)]);
    dba.transaction().set_should_abort();
    let params = Parameters::new();
    let err = pull_all(&plan, &dba, &symbol_table, &params).unwrap_err();
    assert!(matches!(err, GraphError::Cancelled));
    dba.abort();
    Ok(())
}

#[test]
fn indexed_scans_by_property_value_and_range() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let label = dba.label("Person");
    let prop = dba.property("age");
    dba.build_index(label, prop)?;
    for age in [25i64, 30, 30, 41, 41, 41] {
        let mut vertex = dba.insert_vertex()?;
        vertex.add_label(label)?;
        vertex.props_set(prop, PropertyValue::Int(age))?;
    }
    dba.advance_command();

    let params = Parameters::new();
    {
        // MATCH (n:Person {age: 41}) RETURN count(n)
        let mut symbol_table = SymbolTable::new();
        let n = symbol_table.create_symbol("n");
        let scan = LogicalOperator::ScanAllByLabelPropertyValue {
            input: None,
            symbol: n.clone(),
            label,
            property: prop,
            expression: Expression::literal(41i64),
            view: View::Old,
        };
        let count_symbol = symbol_table.create_symbol("count");
        let aggregate = LogicalOperator::Aggregate {
            input: Some(Box::new(scan)),
            aggregations: vec![AggregationElement {
                op: AggregationOp::Count,
                expression: Some(ident_for(&mut symbol_table, &n)),
                symbol: count_symbol.clone(),
            }],
            group_by: vec![],
            remember: vec![],
        };
        let plan =
            produce_symbols(&mut symbol_table, Some(aggregate), vec![("count", count_symbol)]);
        let results = collect_results(&plan, &dba, &symbol_table, &params)?;
        assert_eq!(results[0][0], TypedValue::Int(3));
    }
    {
        // MATCH (n:Person) WHERE 26 <= n.age < 41
        let mut symbol_table = SymbolTable::new();
        let n = symbol_table.create_symbol("n");
        let scan = LogicalOperator::ScanAllByLabelPropertyRange {
            input: None,
            symbol: n,
            label,
            property: prop,
            lower: Some((Expression::literal(26i64), true)),
            upper: Some((Expression::literal(41i64), false)),
            view: View::Old,
        };
        assert_eq!(pull_all(&scan, &dba, &symbol_table, &params)?, 2);
    }
    {
        // A null bound yields no rows.
        let mut symbol_table = SymbolTable::new();
        let n = symbol_table.create_symbol("n");
        let scan = LogicalOperator::ScanAllByLabelPropertyValue {
            input: None,
            symbol: n,
            label,
            property: prop,
            expression: Expression::Literal(PropertyValue::Null),
            view: View::Old,
        };
        assert_eq!(pull_all(&scan, &dba, &symbol_table, &params)?, 0);
    }
    dba.commit()?;
    Ok(())
}

#[test]
fn set_and_remove_labels_and_properties_via_plan() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let keep = dba.label("Keep");
    let drop_label = dba.label("Drop");
    let prop = dba.property("p");
    let mut vertex = dba.insert_vertex()?;
    vertex.add_label(drop_label)?;
    vertex.props_set(prop, PropertyValue::Int(1))?;
    dba.advance_command();

    let mut symbol_table = SymbolTable::new();
    let (scan, n) = scan_all(&mut symbol_table, "n", None, View::Old);
    let set_labels = LogicalOperator::SetLabels {
        input: Some(Box::new(scan)),
        symbol: n.clone(),
        labels: vec![keep],
    };
    let remove_labels = LogicalOperator::RemoveLabels {
        input: Some(Box::new(set_labels)),
        symbol: n.clone(),
        labels: vec![drop_label],
    };
    let remove_property = LogicalOperator::RemoveProperty {
        input: Some(Box::new(remove_labels)),
        lhs: ident_for(&mut symbol_table, &n),
        property: prop,
    };
    let params = Parameters::new();
    assert_eq!(pull_all(&remove_property, &dba, &symbol_table, &params)?, 1);

    vertex.reconstruct();
    vertex.switch_new();
    assert!(vertex.has_label(keep)?);
    assert!(!vertex.has_label(drop_label)?);
    assert_eq!(vertex.props_at(prop)?, PropertyValue::Null);
    dba.commit()?;
    Ok(())
}

#[derive(Default)]
struct CollectingSink {
    rows: Vec<Vec<String>>,
}

impl duskdb::RowSink for CollectingSink {
    fn write_row(&mut self, row: &[TypedValue<'_>]) -> Result<()> {
        self.rows.push(row.iter().map(|value| value.to_string()).collect());
        Ok(())
    }
}

#[test]
fn execute_forwards_produced_rows_to_the_sink() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let mut symbol_table = SymbolTable::new();
    let (unwind, x) = unwind_list(
        &mut symbol_table,
        vec![PropertyValue::Int(1), PropertyValue::Int(2)],
    );
    let plan = produce_symbols(&mut symbol_table, Some(unwind), vec![("x", x)]);
    let params = Parameters::new();
    let mut sink = CollectingSink::default();
    let rows = duskdb::query::execute(&plan, &dba, &symbol_table, &params, &mut sink)?;
    assert_eq!(rows, 2);
    assert_eq!(sink.rows, vec![vec!["1".to_owned()], vec!["2".to_owned()]]);
    dba.commit()?;
    Ok(())
}

#[test]
fn null_equality_and_is_null() -> Result<()> {
    let db = open_db()?;
    let dba = db.access()?;
    let mut symbol_table = SymbolTable::new();
    let null_eq = Expression::binary(
        BinaryOp::Eq,
        Expression::Literal(PropertyValue::Null),
        Expression::Literal(PropertyValue::Null),
    );
    let null_is_null = Expression::IsNull(Box::new(Expression::Literal(PropertyValue::Null)));
    let plan = produce_expressions(
        &mut symbol_table,
        None,
        vec![("eq", null_eq), ("is_null", null_is_null)],
    );
    let params = Parameters::new();
    let results = collect_results(&plan, &dba, &symbol_table, &params)?;
    assert!(results[0][0].is_null());
    assert_eq!(results[0][1], TypedValue::Bool(true));
    dba.commit()?;
    Ok(())
}
