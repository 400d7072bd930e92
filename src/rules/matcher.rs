//! Condition evaluation.
//!
//! A `Matcher` is a pure predicate over one attribute of a record. A method's
//! matchers are ANDed per record; the resulting `Selection` is then judged by
//! the method's `Trigger`.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::template::EvidenceTemplate;
use crate::facts::{stat, AttributeSpec, FactRecord, Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Present,
    Absent,
    Equals,
    NotEquals,
    Regex,
    Contains,
    AnyOf,
    NoneOf,
    Gt,
    Ge,
    Lt,
    Le,
    BitsAny,
    BitsAll,
    BitsNone,
}

impl Operator {
    /// Whether the operator can be applied to an attribute of `value_type`.
    pub fn accepts(self, value_type: ValueType) -> bool {
        use ValueType::*;
        match self {
            Self::Present | Self::Absent | Self::Equals | Self::NotEquals => true,
            Self::Regex | Self::Contains | Self::AnyOf | Self::NoneOf => {
                matches!(value_type, Str | Set)
            }
            Self::Gt | Self::Ge | Self::Lt | Self::Le => value_type == Int,
            Self::BitsAny | Self::BitsAll | Self::BitsNone => matches!(value_type, Int | Mode),
        }
    }

    pub fn takes_value(self) -> bool {
        !matches!(self, Self::Present | Self::Absent)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Regex => "regex",
            Self::Contains => "contains",
            Self::AnyOf => "any_of",
            Self::NoneOf => "none_of",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::BitsAny => "bits_any",
            Self::BitsAll => "bits_all",
            Self::BitsNone => "bits_none",
        };
        write!(f, "{name}")
    }
}

/// How a method's selection maps to firing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Fires when at least one record is selected.
    #[default]
    Any,
    /// Fires when no record is selected.
    None,
    /// Fires when there are candidates and every one is selected.
    All,
}

impl Trigger {
    /// Absence-triggered methods report missing state rather than records.
    pub fn is_absence(self) -> bool {
        self == Self::None
    }
}

/// Expected value, pre-converted to the attribute's type at load time.
#[derive(Debug, Clone)]
enum Expected {
    Nothing,
    Text(String),
    Int(i64),
    List(BTreeSet<String>),
    Pattern(Regex),
    Bits(u32),
}

/// Scalar forms an expected value can take in a catalog document.
#[derive(Debug, Clone, PartialEq)]
pub enum RawExpected {
    Text(String),
    Int(i64),
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub attribute: String,
    pub op: Operator,
    spec: AttributeSpec,
    expected: Expected,
}

impl Matcher {
    /// Build a matcher, checking the operator and expected value against the
    /// attribute's declared type.
    pub fn compile(
        attribute: &str,
        spec: AttributeSpec,
        op: Operator,
        raw: Option<RawExpected>,
    ) -> Result<Self, String> {
        if !op.accepts(spec.value_type) {
            return Err(format!(
                "operator '{op}' cannot be applied to {} attribute '{attribute}'",
                spec.value_type
            ));
        }

        let expected = match (op.takes_value(), raw) {
            (false, None) => Expected::Nothing,
            (false, Some(_)) => {
                return Err(format!("operator '{op}' on '{attribute}' takes no value"))
            }
            (true, None) => {
                return Err(format!("operator '{op}' on '{attribute}' requires a value"))
            }
            (true, Some(raw)) => expected_for(op, spec.value_type, raw)
                .map_err(|e| format!("bad value for '{attribute}' ({op}): {e}"))?,
        };

        Ok(Self {
            attribute: attribute.to_string(),
            op,
            spec,
            expected,
        })
    }

    /// Evaluate against one record. Errors only on structurally broken records:
    /// a missing required attribute or a value of the wrong type.
    pub fn matches(&self, record: &FactRecord) -> Result<bool, String> {
        let value = match record.get(&self.attribute) {
            Some(value) => value,
            None if self.spec.required => {
                return Err(format!(
                    "record {} lacks required attribute '{}'",
                    record.origin, self.attribute
                ))
            }
            None => return Ok(self.op == Operator::Absent),
        };

        if value.value_type() != self.spec.value_type {
            return Err(format!(
                "record {} attribute '{}' is {}, expected {}",
                record.origin,
                self.attribute,
                value.value_type(),
                self.spec.value_type
            ));
        }

        Ok(self.test(value))
    }

    fn test(&self, value: &Value) -> bool {
        match (self.op, value, &self.expected) {
            (Operator::Present, _, _) => true,
            (Operator::Absent, _, _) => false,
            (Operator::NotEquals, _, _) => !self.equals(value),
            (Operator::Equals, _, _) => self.equals(value),

            (Operator::Regex, Value::Str(s), Expected::Pattern(re)) => re.is_match(s),
            (Operator::Regex, Value::Set(items), Expected::Pattern(re)) => {
                items.iter().any(|item| re.is_match(item))
            }
            (Operator::Contains, Value::Str(s), Expected::Text(needle)) => s.contains(needle.as_str()),
            (Operator::Contains, Value::Set(items), Expected::Text(needle)) => items.contains(needle),
            (Operator::AnyOf, Value::Str(s), Expected::List(list)) => list.contains(s),
            (Operator::AnyOf, Value::Set(items), Expected::List(list)) => {
                !items.is_disjoint(list)
            }
            (Operator::NoneOf, Value::Str(s), Expected::List(list)) => !list.contains(s),
            (Operator::NoneOf, Value::Set(items), Expected::List(list)) => items.is_disjoint(list),

            (Operator::Gt, Value::Int(v), Expected::Int(e)) => v > e,
            (Operator::Ge, Value::Int(v), Expected::Int(e)) => v >= e,
            (Operator::Lt, Value::Int(v), Expected::Int(e)) => v < e,
            (Operator::Le, Value::Int(v), Expected::Int(e)) => v <= e,

            (Operator::BitsAny, _, Expected::Bits(mask)) => bits_of(value) & mask != 0,
            (Operator::BitsAll, _, Expected::Bits(mask)) => bits_of(value) & mask == *mask,
            (Operator::BitsNone, _, Expected::Bits(mask)) => bits_of(value) & mask == 0,

            _ => false,
        }
    }

    fn equals(&self, value: &Value) -> bool {
        match (value, &self.expected) {
            (Value::Str(s), Expected::Text(e)) => s == e,
            (Value::Int(v), Expected::Int(e)) => v == e,
            (Value::Set(items), Expected::List(list)) => items == list,
            // Permission bits only; the file type is not part of the comparison.
            (Value::Mode(mode), Expected::Bits(bits)) => mode & 0o7777 == *bits,
            _ => false,
        }
    }
}

fn bits_of(value: &Value) -> u32 {
    match value {
        Value::Mode(mode) => *mode,
        Value::Int(i) => u32::try_from(*i).unwrap_or(0),
        _ => 0,
    }
}

fn expected_for(op: Operator, value_type: ValueType, raw: RawExpected) -> Result<Expected, String> {
    match op {
        Operator::Regex => {
            let pattern = scalar_text(raw)?;
            Regex::new(&pattern)
                .map(Expected::Pattern)
                .map_err(|e| format!("invalid regex: {e}"))
        }
        Operator::Contains => scalar_text(raw).map(Expected::Text),
        Operator::AnyOf | Operator::NoneOf => Ok(Expected::List(list_of(raw).into_iter().collect())),
        Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => scalar_int(raw).map(Expected::Int),
        Operator::BitsAny | Operator::BitsAll | Operator::BitsNone => bits(raw).map(Expected::Bits),
        Operator::Equals | Operator::NotEquals => match value_type {
            ValueType::Str => scalar_text(raw).map(Expected::Text),
            ValueType::Int => scalar_int(raw).map(Expected::Int),
            ValueType::Set => Ok(Expected::List(list_of(raw).into_iter().collect())),
            ValueType::Mode => bits(raw).map(Expected::Bits),
        },
        Operator::Present | Operator::Absent => Ok(Expected::Nothing),
    }
}

fn scalar_text(raw: RawExpected) -> Result<String, String> {
    match raw {
        RawExpected::Text(s) => Ok(s),
        RawExpected::Int(i) => Ok(i.to_string()),
        RawExpected::List(_) => Err("expected a single value, got a list".into()),
    }
}

fn scalar_int(raw: RawExpected) -> Result<i64, String> {
    match raw {
        RawExpected::Int(i) => Ok(i),
        RawExpected::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{s}' is not an integer")),
        RawExpected::List(_) => Err("expected an integer, got a list".into()),
    }
}

/// Bitmasks given as strings are octal ("0022"); numbers are taken as-is.
fn bits(raw: RawExpected) -> Result<u32, String> {
    match raw {
        RawExpected::Text(s) => {
            stat::parse_octal(&s).ok_or_else(|| format!("'{s}' is not an octal mode"))
        }
        RawExpected::Int(i) => u32::try_from(i).map_err(|_| format!("{i} is not a valid mode")),
        RawExpected::List(_) => Err("expected a mode, got a list".into()),
    }
}

fn list_of(raw: RawExpected) -> Vec<String> {
    match raw {
        RawExpected::List(items) => items,
        RawExpected::Text(s) => vec![s],
        RawExpected::Int(i) => vec![i.to_string()],
    }
}

/// A record selected by a method, with its rendered evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub index: usize,
    pub evidence: String,
}

/// Result of running one method's matchers over its candidate records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub trigger: Trigger,
    pub candidates: usize,
    pub selected: Vec<Selected>,
}

impl Selection {
    pub fn fires(&self) -> bool {
        match self.trigger {
            Trigger::Any => !self.selected.is_empty(),
            Trigger::None => self.selected.is_empty(),
            Trigger::All => self.candidates > 0 && self.selected.len() == self.candidates,
        }
    }
}

/// Apply `matchers` (ANDed) to `records` in order.
pub fn select(
    matchers: &[Matcher],
    trigger: Trigger,
    records: &[&FactRecord],
    format: &EvidenceTemplate,
) -> Result<Selection, String> {
    let mut selected = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let mut keep = true;
        for matcher in matchers {
            if !matcher.matches(record)? {
                keep = false;
                break;
            }
        }
        if keep {
            selected.push(Selected {
                index,
                evidence: format.render(record),
            });
        }
    }

    Ok(Selection {
        trigger,
        candidates: records.len(),
        selected,
    })
}
