//! Runtime-tagged value flowing through operator cursors, with Cypher
//! arithmetic, comparison, and three-valued logic.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::fmt;

use crate::db::accessor::{EdgeAccessor, VertexAccessor};
use crate::error::{GraphError, Result};
use crate::storage::property_value::PropertyValue;

#[derive(Clone, Debug)]
pub enum TypedValue<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<TypedValue<'a>>),
    Map(BTreeMap<String, TypedValue<'a>>),
    Vertex(VertexAccessor<'a>),
    Edge(EdgeAccessor<'a>),
    Path(Path<'a>),
}

/// Alternating sequence of vertices and edges.
#[derive(Clone, Debug)]
pub struct Path<'a> {
    pub vertices: Vec<VertexAccessor<'a>>,
    pub edges: Vec<EdgeAccessor<'a>>,
}

impl<'a> TypedValue<'a> {
    pub fn type_name(&self) -> &'static str {
        match self {
            TypedValue::Null => "Null",
            TypedValue::Bool(_) => "Bool",
            TypedValue::Int(_) => "Int",
            TypedValue::Double(_) => "Double",
            TypedValue::String(_) => "String",
            TypedValue::List(_) => "List",
            TypedValue::Map(_) => "Map",
            TypedValue::Vertex(_) => "Vertex",
            TypedValue::Edge(_) => "Edge",
            TypedValue::Path(_) => "Path",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            TypedValue::Int(v) => Some(*v as f64),
            TypedValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Converts into a storage value; graph references do not convert.
    pub fn into_property_value(self) -> Result<PropertyValue> {
        match self {
            TypedValue::Null => Ok(PropertyValue::Null),
            TypedValue::Bool(v) => Ok(PropertyValue::Bool(v)),
            TypedValue::Int(v) => Ok(PropertyValue::Int(v)),
            TypedValue::Double(v) => Ok(PropertyValue::Double(v)),
            TypedValue::String(v) => Ok(PropertyValue::String(v)),
            TypedValue::List(values) => Ok(PropertyValue::List(
                values
                    .into_iter()
                    .map(TypedValue::into_property_value)
                    .collect::<Result<_>>()?,
            )),
            TypedValue::Map(entries) => Ok(PropertyValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| Ok((key, value.into_property_value()?)))
                    .collect::<Result<_>>()?,
            )),
            other => Err(GraphError::TypeError(format!(
                "{} cannot be stored as a property",
                other.type_name()
            ))),
        }
    }

    // Three-valued logic.

    pub fn and(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        match (bool_or_null(&self)?, bool_or_null(&other)?) {
            (Some(false), _) | (_, Some(false)) => Ok(TypedValue::Bool(false)),
            (Some(a), Some(b)) => Ok(TypedValue::Bool(a && b)),
            _ => Ok(TypedValue::Null),
        }
    }

    pub fn or(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        match (bool_or_null(&self)?, bool_or_null(&other)?) {
            (Some(true), _) | (_, Some(true)) => Ok(TypedValue::Bool(true)),
            (Some(a), Some(b)) => Ok(TypedValue::Bool(a || b)),
            _ => Ok(TypedValue::Null),
        }
    }

    pub fn xor(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        match (bool_or_null(&self)?, bool_or_null(&other)?) {
            (Some(a), Some(b)) => Ok(TypedValue::Bool(a != b)),
            _ => Ok(TypedValue::Null),
        }
    }

    pub fn not(self) -> Result<TypedValue<'a>> {
        match bool_or_null(&self)? {
            Some(v) => Ok(TypedValue::Bool(!v)),
            None => Ok(TypedValue::Null),
        }
    }

    // Arithmetic.

    pub fn add(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        if self.is_null() || other.is_null() {
            return Ok(TypedValue::Null);
        }
        match (&self, &other) {
            (TypedValue::Int(a), TypedValue::Int(b)) => Ok(TypedValue::Int(a + b)),
            (TypedValue::String(a), TypedValue::String(b)) => {
                Ok(TypedValue::String(format!("{a}{b}")))
            }
            (TypedValue::String(a), TypedValue::Int(b)) => {
                Ok(TypedValue::String(format!("{a}{b}")))
            }
            (TypedValue::String(a), TypedValue::Double(b)) => {
                Ok(TypedValue::String(format!("{a}{b}")))
            }
            (TypedValue::Int(a), TypedValue::String(b)) => {
                Ok(TypedValue::String(format!("{a}{b}")))
            }
            (TypedValue::Double(a), TypedValue::String(b)) => {
                Ok(TypedValue::String(format!("{a}{b}")))
            }
            (TypedValue::List(a), TypedValue::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(TypedValue::List(joined))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => Ok(TypedValue::Double(a + b)),
                _ => Err(binary_type_error("+", &self, &other)),
            },
        }
    }

    pub fn sub(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        numeric_op(self, other, "-", |a, b| a - b, |a, b| Some(a - b))
    }

    pub fn mul(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        numeric_op(self, other, "*", |a, b| a * b, |a, b| Some(a * b))
    }

    pub fn div(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        if self.is_null() || other.is_null() {
            return Ok(TypedValue::Null);
        }
        match (&self, &other) {
            (TypedValue::Int(a), TypedValue::Int(b)) => {
                if *b == 0 {
                    Err(GraphError::TypeError("division by zero".into()))
                } else {
                    Ok(TypedValue::Int(a / b))
                }
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => {
                    if b == 0.0 {
                        Err(GraphError::TypeError("division by zero".into()))
                    } else {
                        Ok(TypedValue::Double(a / b))
                    }
                }
                _ => Err(binary_type_error("/", &self, &other)),
            },
        }
    }

    pub fn modulo(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        if self.is_null() || other.is_null() {
            return Ok(TypedValue::Null);
        }
        match (&self, &other) {
            (TypedValue::Int(a), TypedValue::Int(b)) => {
                if *b == 0 {
                    Err(GraphError::TypeError("modulo by zero".into()))
                } else {
                    Ok(TypedValue::Int(a % b))
                }
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => {
                    if b == 0.0 {
                        Err(GraphError::TypeError("modulo by zero".into()))
                    } else {
                        Ok(TypedValue::Double(a % b))
                    }
                }
                _ => Err(binary_type_error("%", &self, &other)),
            },
        }
    }

    pub fn negate(self) -> Result<TypedValue<'a>> {
        match self {
            TypedValue::Null => Ok(TypedValue::Null),
            TypedValue::Int(v) => Ok(TypedValue::Int(-v)),
            TypedValue::Double(v) => Ok(TypedValue::Double(-v)),
            other => Err(GraphError::TypeError(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        }
    }

    pub fn unary_plus(self) -> Result<TypedValue<'a>> {
        match self {
            TypedValue::Null => Ok(TypedValue::Null),
            v @ (TypedValue::Int(_) | TypedValue::Double(_)) => Ok(v),
            other => Err(GraphError::TypeError(format!(
                "unary + on {}",
                other.type_name()
            ))),
        }
    }

    // Comparison. `null` on either side yields `null`.

    pub fn equal(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        if self.is_null() || other.is_null() {
            return Ok(TypedValue::Null);
        }
        Ok(TypedValue::Bool(full_equal(&self, &other)))
    }

    pub fn not_equal(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        self.equal(other)?.not()
    }

    pub fn less(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        if self.is_null() || other.is_null() {
            return Ok(TypedValue::Null);
        }
        match (&self, &other) {
            (TypedValue::String(a), TypedValue::String(b)) => Ok(TypedValue::Bool(a < b)),
            (TypedValue::Bool(_), TypedValue::Bool(_)) => Err(binary_type_error(
                "<",
                &self,
                &other,
            )),
            (TypedValue::Int(a), TypedValue::Int(b)) => Ok(TypedValue::Bool(a < b)),
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => Ok(TypedValue::Bool(a < b)),
                _ => Err(binary_type_error("<", &self, &other)),
            },
        }
    }

    pub fn less_equal(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        let less = self.clone().less(other.clone())?;
        let equal = self.equal(other)?;
        less.or(equal)
    }

    pub fn greater(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        other.less(self)
    }

    pub fn greater_equal(self, other: TypedValue<'a>) -> Result<TypedValue<'a>> {
        other.less_equal(self)
    }

    /// Concrete boolean, never null.
    pub fn is_null_value(&self) -> TypedValue<'a> {
        TypedValue::Bool(self.is_null())
    }
}

fn bool_or_null<'a>(value: &TypedValue<'a>) -> Result<Option<bool>> {
    match value {
        TypedValue::Null => Ok(None),
        TypedValue::Bool(v) => Ok(Some(*v)),
        other => Err(GraphError::TypeError(format!(
            "logical operator on {}",
            other.type_name()
        ))),
    }
}

fn numeric_op<'a>(
    lhs: TypedValue<'a>,
    rhs: TypedValue<'a>,
    op: &str,
    int_op: impl Fn(i64, i64) -> i64,
    double_op: impl Fn(f64, f64) -> Option<f64>,
) -> Result<TypedValue<'a>> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(TypedValue::Null);
    }
    match (&lhs, &rhs) {
        (TypedValue::Int(a), TypedValue::Int(b)) => Ok(TypedValue::Int(int_op(*a, *b))),
        _ => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => match double_op(a, b) {
                Some(v) => Ok(TypedValue::Double(v)),
                None => Err(GraphError::TypeError(format!("arithmetic error in {op}"))),
            },
            _ => Err(binary_type_error(op, &lhs, &rhs)),
        },
    }
}

fn binary_type_error(op: &str, lhs: &TypedValue<'_>, rhs: &TypedValue<'_>) -> GraphError {
    GraphError::TypeError(format!(
        "invalid operands {} {op} {}",
        lhs.type_name(),
        rhs.type_name()
    ))
}

/// Structural equality where `null` equals `null`, used for grouping,
/// DISTINCT, and uniqueness filtering.
pub fn full_equal(a: &TypedValue<'_>, b: &TypedValue<'_>) -> bool {
    match (a, b) {
        (TypedValue::Null, TypedValue::Null) => true,
        (TypedValue::Bool(a), TypedValue::Bool(b)) => a == b,
        (TypedValue::Int(a), TypedValue::Int(b)) => a == b,
        (TypedValue::String(a), TypedValue::String(b)) => a == b,
        (TypedValue::List(a), TypedValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| full_equal(x, y))
        }
        (TypedValue::Map(a), TypedValue::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && full_equal(va, vb))
        }
        (TypedValue::Vertex(a), TypedValue::Vertex(b)) => a.gid() == b.gid(),
        (TypedValue::Edge(a), TypedValue::Edge(b)) => a.gid() == b.gid(),
        (TypedValue::Path(a), TypedValue::Path(b)) => {
            a.vertices.len() == b.vertices.len()
                && a.edges.len() == b.edges.len()
                && a.vertices
                    .iter()
                    .zip(b.vertices.iter())
                    .all(|(x, y)| x.gid() == y.gid())
                && a.edges.iter().zip(b.edges.iter()).all(|(x, y)| x.gid() == y.gid())
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

impl PartialEq for TypedValue<'_> {
    fn eq(&self, other: &Self) -> bool {
        full_equal(self, other)
    }
}

/// Cypher's total order for ORDER BY: null sorts after every value.
pub fn total_cmp(a: &TypedValue<'_>, b: &TypedValue<'_>) -> CmpOrdering {
    fn rank(value: &TypedValue<'_>) -> u8 {
        match value {
            TypedValue::Bool(_) => 0,
            TypedValue::Int(_) | TypedValue::Double(_) => 1,
            TypedValue::String(_) => 2,
            TypedValue::List(_) => 3,
            TypedValue::Map(_) => 4,
            TypedValue::Vertex(_) => 5,
            TypedValue::Edge(_) => 6,
            TypedValue::Path(_) => 7,
            TypedValue::Null => 8,
        }
    }
    let ranks = rank(a).cmp(&rank(b));
    if ranks != CmpOrdering::Equal {
        return ranks;
    }
    match (a, b) {
        (TypedValue::Bool(a), TypedValue::Bool(b)) => a.cmp(b),
        (TypedValue::Int(a), TypedValue::Int(b)) => a.cmp(b),
        (TypedValue::String(a), TypedValue::String(b)) => a.cmp(b),
        (TypedValue::List(a), TypedValue::List(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = total_cmp(x, y);
                if ord != CmpOrdering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (TypedValue::Map(a), TypedValue::Map(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let ord = ka.cmp(kb);
                if ord != CmpOrdering::Equal {
                    return ord;
                }
                let ord = total_cmp(va, vb);
                if ord != CmpOrdering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        (TypedValue::Vertex(a), TypedValue::Vertex(b)) => a.gid().cmp(&b.gid()),
        (TypedValue::Edge(a), TypedValue::Edge(b)) => a.gid().cmp(&b.gid()),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => CmpOrdering::Equal,
        },
    }
}

impl<'a> From<PropertyValue> for TypedValue<'a> {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Null => TypedValue::Null,
            PropertyValue::Bool(v) => TypedValue::Bool(v),
            PropertyValue::Int(v) => TypedValue::Int(v),
            PropertyValue::Double(v) => TypedValue::Double(v),
            PropertyValue::String(v) => TypedValue::String(v),
            PropertyValue::List(values) => {
                TypedValue::List(values.into_iter().map(TypedValue::from).collect())
            }
            PropertyValue::Map(entries) => TypedValue::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, TypedValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl<'a> From<i64> for TypedValue<'a> {
    fn from(value: i64) -> Self {
        TypedValue::Int(value)
    }
}

impl<'a> From<f64> for TypedValue<'a> {
    fn from(value: f64) -> Self {
        TypedValue::Double(value)
    }
}

impl<'a> From<bool> for TypedValue<'a> {
    fn from(value: bool) -> Self {
        TypedValue::Bool(value)
    }
}

impl<'a> From<&str> for TypedValue<'a> {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_owned())
    }
}

impl fmt::Display for TypedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => write!(f, "null"),
            TypedValue::Bool(v) => write!(f, "{v}"),
            TypedValue::Int(v) => write!(f, "{v}"),
            TypedValue::Double(v) => write!(f, "{v}"),
            TypedValue::String(v) => write!(f, "{v}"),
            TypedValue::List(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            TypedValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            TypedValue::Vertex(v) => write!(f, "(vertex {})", v.gid()),
            TypedValue::Edge(e) => write!(f, "[edge {}]", e.gid()),
            TypedValue::Path(p) => write!(
                f,
                "(path of {} vertices, {} edges)",
                p.vertices.len(),
                p.edges.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_division_stays_integral() {
        let result = TypedValue::from(3).div(TypedValue::from(2)).unwrap();
        assert_eq!(result, TypedValue::Int(1));
        let result = TypedValue::from(3.0).div(TypedValue::from(2)).unwrap();
        assert_eq!(result, TypedValue::Double(1.5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(TypedValue::from(1).div(TypedValue::from(0)).is_err());
        assert!(TypedValue::from(1).modulo(TypedValue::from(0)).is_err());
        assert!(TypedValue::from(1.0).div(TypedValue::from(0.0)).is_err());
    }

    #[test]
    fn string_concatenation_coerces_numbers() {
        let result = TypedValue::from("v")
            .add(TypedValue::from(7))
            .unwrap();
        assert_eq!(result, TypedValue::from("v7"));
        let result = TypedValue::from(1).add(TypedValue::from("st")).unwrap();
        assert_eq!(result, TypedValue::from("1st"));
    }

    #[test]
    fn three_valued_logic() {
        let null = || TypedValue::Null;
        let t = || TypedValue::Bool(true);
        let f = || TypedValue::Bool(false);
        assert_eq!(null().and(f()).unwrap(), f());
        assert_eq!(null().and(t()).unwrap(), null());
        assert_eq!(null().or(t()).unwrap(), t());
        assert_eq!(null().or(f()).unwrap(), null());
        assert_eq!(t().xor(f()).unwrap(), t());
        assert_eq!(null().not().unwrap(), null());
        assert_eq!(null().is_null_value(), t());
    }

    #[test]
    fn null_comparison_is_null() {
        let result = TypedValue::Null.equal(TypedValue::Null).unwrap();
        assert!(result.is_null());
        let result = TypedValue::from(1).less(TypedValue::Null).unwrap();
        assert!(result.is_null());
    }

    #[test]
    fn incompatible_comparison_fails() {
        assert!(TypedValue::from(1).less(TypedValue::from("a")).is_err());
    }

    #[test]
    fn spec_arithmetic_scenarios() {
        // 3/2 <> 7.5/5
        let lhs = TypedValue::from(3).div(TypedValue::from(2)).unwrap();
        let rhs = TypedValue::from(7.5).div(TypedValue::from(5)).unwrap();
        assert_eq!(lhs.not_equal(rhs).unwrap(), TypedValue::Bool(true));
        // 3.0/2 = 7.5/5
        let lhs = TypedValue::from(3.0).div(TypedValue::from(2)).unwrap();
        let rhs = TypedValue::from(7.5).div(TypedValue::from(5)).unwrap();
        assert_eq!(lhs.equal(rhs).unwrap(), TypedValue::Bool(true));
    }

    #[test]
    fn total_order_puts_null_last() {
        let mut values = vec![
            TypedValue::Null,
            TypedValue::from(2),
            TypedValue::from("a"),
            TypedValue::from(1.5),
        ];
        values.sort_by(total_cmp);
        assert_eq!(values[0], TypedValue::from(1.5));
        assert_eq!(values[1], TypedValue::from(2));
        assert_eq!(values[2], TypedValue::from("a"));
        assert!(values[3].is_null());
    }
}
