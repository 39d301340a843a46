//! Constraint evaluation against property lookups.
//!
//! Evaluation never fails. A comparison between incompatible types yields
//! [`Outcome::Indeterminate`], which the enclosing logical operator treats as
//! false for that comparison only.

use crate::constraint::{CompareOp, Constraint, Literal, LogicalOp, Node};
use crate::error::{FinderError, FinderResult};
use crate::properties::{PropertyLookup, PropertyValue};
use std::borrow::Cow;
use std::cmp::Ordering;
use tracing::trace;

/// Result of evaluating a constraint node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Match,
    NoMatch,
    /// The node could not be evaluated because of a type mismatch.
    Indeterminate,
}

impl Outcome {
    fn from_bool(value: bool) -> Self {
        if value {
            Outcome::Match
        } else {
            Outcome::NoMatch
        }
    }

    fn from_result(result: FinderResult<bool>) -> Self {
        match result {
            Ok(value) => Outcome::from_bool(value),
            Err(e) => {
                trace!(error = %e, "Comparison resolved to false");
                Outcome::Indeterminate
            }
        }
    }

    pub fn is_match(self) -> bool {
        self == Outcome::Match
    }
}

impl Constraint {
    /// Evaluates the constraint against `properties`.
    pub fn evaluate<P: PropertyLookup + ?Sized>(&self, properties: &P) -> Outcome {
        evaluate(self.root(), properties)
    }

    /// True only when the constraint evaluates to [`Outcome::Match`].
    pub fn matches<P: PropertyLookup + ?Sized>(&self, properties: &P) -> bool {
        self.evaluate(properties).is_match()
    }
}

/// Evaluates one node. Logical operators walk their children left to right
/// and stop as soon as the result is known.
pub fn evaluate<P: PropertyLookup + ?Sized>(node: &Node, properties: &P) -> Outcome {
    match node {
        Node::Logical { op, children } => {
            let truth = |child: &Node| evaluate(child, properties).is_match();
            let result = match op {
                LogicalOp::And => children.iter().all(truth),
                LogicalOp::Or => children.iter().any(truth),
                LogicalOp::Not => !children.first().is_some_and(truth),
            };
            Outcome::from_bool(result)
        }
        Node::Exists(key) => Outcome::from_bool(!properties.lookup(key).is_absent()),
        Node::Comparison { op, left, right } => {
            let left = operand(left, properties);
            let right = operand(right, properties);
            Outcome::from_result(match (&left, &right) {
                (Operand::Value(l), Operand::Value(r)) => compare(*op, l, r),
                _ => Err(mismatch("list", "value")),
            })
        }
        Node::Membership { value, list } => {
            let value = operand(value, properties);
            let list = operand(list, properties);
            Outcome::from_result(membership(&value, &list))
        }
        Node::Literal(Literal::Bool(b)) => Outcome::from_bool(*b),
        Node::Property(key) => match &*properties.lookup(key) {
            PropertyValue::Bool(b) => Outcome::from_bool(*b),
            PropertyValue::Absent => Outcome::NoMatch,
            _ => Outcome::Indeterminate,
        },
        Node::Literal(_) | Node::List(_) => Outcome::Indeterminate,
    }
}

enum Operand<'a> {
    Value(Cow<'a, PropertyValue>),
    List(&'a [Literal]),
}

fn operand<'a, P: PropertyLookup + ?Sized>(node: &'a Node, properties: &'a P) -> Operand<'a> {
    match node {
        Node::Literal(literal) => Operand::Value(Cow::Owned(literal_value(literal))),
        Node::Property(key) => Operand::Value(properties.lookup(key)),
        Node::List(items) => Operand::List(items),
        other => {
            let truth = evaluate(other, properties).is_match();
            Operand::Value(Cow::Owned(PropertyValue::Bool(truth)))
        }
    }
}

fn literal_value(literal: &Literal) -> PropertyValue {
    match literal {
        Literal::String(s) => PropertyValue::String(s.clone()),
        Literal::Number(n) => PropertyValue::Number(*n),
        Literal::Bool(b) => PropertyValue::Bool(*b),
    }
}

fn mismatch(left: &'static str, right: &'static str) -> FinderError {
    FinderError::TypeMismatch { left, right }
}

fn ordering_satisfies(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn compare_numbers(op: CompareOp, left: f64, right: f64) -> bool {
    left.partial_cmp(&right)
        .is_some_and(|ordering| ordering_satisfies(op, ordering))
}

fn numeric_string(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Compares two values.
///
/// Absent values never compare, except that `!=` holds against anything.
/// Strings that parse as numbers compare numerically with numbers.
pub fn compare(op: CompareOp, left: &PropertyValue, right: &PropertyValue) -> FinderResult<bool> {
    use PropertyValue::*;

    match (left, right) {
        (Absent, _) | (_, Absent) => Ok(op == CompareOp::Ne),
        (String(a), String(b)) => Ok(ordering_satisfies(op, a.cmp(b))),
        (Number(a), Number(b)) => Ok(compare_numbers(op, *a, *b)),
        (String(s), Number(n)) => numeric_string(s)
            .map(|value| compare_numbers(op, value, *n))
            .ok_or_else(|| mismatch("non-numeric string", "number")),
        (Number(n), String(s)) => numeric_string(s)
            .map(|value| compare_numbers(op, *n, value))
            .ok_or_else(|| mismatch("number", "non-numeric string")),
        (Bool(a), Bool(b)) => match op {
            CompareOp::Eq => Ok(a == b),
            CompareOp::Ne => Ok(a != b),
            _ => Err(mismatch("bool", "ordering operator")),
        },
        (l, r) => Err(mismatch(l.type_name(), r.type_name())),
    }
}

fn values_equal(left: &PropertyValue, right: &PropertyValue) -> bool {
    compare(CompareOp::Eq, left, right).unwrap_or(false)
}

fn membership(value: &Operand<'_>, list: &Operand<'_>) -> FinderResult<bool> {
    match (value, list) {
        (Operand::Value(value), Operand::List(items)) => {
            let items: Vec<PropertyValue> = items.iter().map(literal_value).collect();
            let contains =
                |candidate: &PropertyValue| items.iter().any(|item| values_equal(candidate, item));
            Ok(match &**value {
                PropertyValue::Absent => false,
                PropertyValue::StringList(elements) => elements
                    .iter()
                    .any(|element| contains(&PropertyValue::String(element.clone()))),
                scalar => contains(scalar),
            })
        }
        (Operand::Value(value), Operand::Value(list)) => match (&**value, &**list) {
            (_, PropertyValue::Absent) | (PropertyValue::Absent, _) => Ok(false),
            (PropertyValue::StringList(_), _) => Err(mismatch("string list", "string list")),
            (needle, PropertyValue::StringList(elements)) => Ok(elements
                .iter()
                .any(|element| values_equal(&PropertyValue::String(element.clone()), needle))),
            (_, other) => Err(mismatch("value", other.type_name())),
        },
        (Operand::List(_), _) => Err(mismatch("list", "list")),
    }
}
