//! Experiment definition language
//!
//! An experiment is a JSON operator tree:
//!
//! ```json
//! {"op": "seq", "seq": [
//!   {"op": "set", "var": "button_color",
//!    "value": {"op": "uniformChoice",
//!              "choices": ["blue", "green"],
//!              "unit": {"op": "get", "var": "user_id"}}}
//! ]}
//! ```
//!
//! Parsing turns the JSON into a closed [`Operator`] enum so the evaluator can
//! match exhaustively. Serialization writes the same JSON back: a parsed
//! definition re-serializes to an equal `serde_json::Value`.
//!
//! Poka-Yoke: unknown operators, unknown fields and missing required fields
//! are rejected at parse time rather than at evaluation time.

mod evaluator;

pub use evaluator::{Environment, Evaluator};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A position in the tree where a value is produced.
///
/// Bare JSON arrays are evaluated element by element; bare scalars and
/// objects without an `"op"` key are literals.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Scalar or plain object, returned unchanged
    Literal(Value),
    /// Bare JSON array, evaluated element-wise
    List(Vec<Node>),
    /// Operator object
    Op(Box<Operator>),
}

/// One `{"if": ..., "then": ...}` arm of a `cond`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Condition, tested for truthiness
    pub condition: Node,
    /// Evaluated when the condition holds
    pub then: Node,
}

/// Hash inputs shared by every random operator.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomArgs {
    /// Unit expression; a list value hashes every element
    pub unit: Node,
    /// Parameter salt; defaults to the enclosing `set` variable name
    pub salt: Option<String>,
    /// Replaces `"{experiment_salt}.{salt}"` entirely
    pub full_salt: Option<String>,
}

/// Random operator kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum RandomOp {
    /// Uniform pick from `choices`
    UniformChoice {
        /// Candidate values
        choices: Node,
    },
    /// Pick from `choices` proportionally to `weights`
    WeightedChoice {
        /// Candidate values
        choices: Node,
        /// Non-negative weights, same length as `choices`
        weights: Node,
    },
    /// 1 with probability `p`, else 0
    BernoulliTrial {
        /// Probability in `[0, 1]`
        p: Node,
    },
    /// Keep each choice independently with probability `p`
    BernoulliFilter {
        /// Probability in `[0, 1]`
        p: Node,
        /// Candidate values
        choices: Node,
    },
    /// Uniform real in `[min, max]`
    RandomFloat {
        /// Lower bound
        min: Node,
        /// Upper bound
        max: Node,
    },
    /// Uniform integer in `[min, max]`
    RandomInteger {
        /// Lower bound
        min: Node,
        /// Upper bound
        max: Node,
    },
    /// First `draws` elements of a deterministic shuffle of `choices`
    Sample {
        /// Candidate values
        choices: Node,
        /// Number of draws (all choices if absent)
        draws: Option<Node>,
    },
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `equals`
    Equals,
    /// `greaterThan`
    GreaterThan,
    /// `lessThan`
    LessThan,
    /// `greaterThanOrEqualTo`
    GreaterThanOrEqualTo,
    /// `lessThanOrEqualTo`
    LessThanOrEqualTo,
}

/// Folds over a list of numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fold {
    /// `sum`
    Sum,
    /// `product`
    Product,
    /// `min`
    Min,
    /// `max`
    Max,
}

/// Two-operand arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arithmetic {
    /// `%`
    Modulo,
    /// `/`
    Divide,
}

/// Single-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unary {
    /// `not`
    Not,
    /// `negative`
    Negative,
    /// `round`
    Round,
    /// `length`
    Length,
}

/// The closed operator set.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// `literal`: value returned without evaluation
    Literal(Value),
    /// `get`: variable lookup
    Get(String),
    /// `set`: bind `var` to the evaluated `value`
    Set {
        /// Variable name
        var: String,
        /// Value expression
        value: Node,
    },
    /// `seq`: evaluate children in order
    Seq(Vec<Node>),
    /// `return`: stop evaluation, unit is in the experiment if truthy
    Return(Node),
    /// `cond`: first truthy branch wins
    Cond(Vec<Branch>),
    /// `array`: evaluated list
    Array(Node),
    /// `map`: every non-`op` key evaluated into an object
    Map(BTreeMap<String, Node>),
    /// `index`: list or object access, null when missing
    Index {
        /// Collection expression
        base: Node,
        /// Integer or key expression
        index: Node,
    },
    /// `coalesce`: first non-null value
    Coalesce(Vec<Node>),
    /// `and`: short-circuit conjunction
    And(Vec<Node>),
    /// `or`: short-circuit disjunction
    Or(Vec<Node>),
    /// Comparison of two operands
    Compare {
        /// Which comparison
        op: Comparison,
        /// Left operand
        left: Node,
        /// Right operand
        right: Node,
    },
    /// Fold over a list of numbers
    Fold {
        /// Which fold
        op: Fold,
        /// Expression producing the list
        values: Node,
    },
    /// Two-operand arithmetic
    Arithmetic {
        /// Which operation
        op: Arithmetic,
        /// Left operand
        left: Node,
        /// Right operand
        right: Node,
    },
    /// Single-operand operator
    Unary {
        /// Which operation
        op: Unary,
        /// Operand
        value: Node,
    },
    /// Salted random draw
    Random {
        /// Which draw
        op: RandomOp,
        /// Unit and salts
        args: RandomArgs,
    },
}

impl Operator {
    /// The `"op"` string this operator is written with.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::Get(_) => "get",
            Self::Set { .. } => "set",
            Self::Seq(_) => "seq",
            Self::Return(_) => "return",
            Self::Cond(_) => "cond",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Index { .. } => "index",
            Self::Coalesce(_) => "coalesce",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Compare { op, .. } => match op {
                Comparison::Equals => "equals",
                Comparison::GreaterThan => "greaterThan",
                Comparison::LessThan => "lessThan",
                Comparison::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
                Comparison::LessThanOrEqualTo => "lessThanOrEqualTo",
            },
            Self::Fold { op, .. } => match op {
                Fold::Sum => "sum",
                Fold::Product => "product",
                Fold::Min => "min",
                Fold::Max => "max",
            },
            Self::Arithmetic { op, .. } => match op {
                Arithmetic::Modulo => "%",
                Arithmetic::Divide => "/",
            },
            Self::Unary { op, .. } => match op {
                Unary::Not => "not",
                Unary::Negative => "negative",
                Unary::Round => "round",
                Unary::Length => "length",
            },
            Self::Random { op, .. } => match op {
                RandomOp::UniformChoice { .. } => "uniformChoice",
                RandomOp::WeightedChoice { .. } => "weightedChoice",
                RandomOp::BernoulliTrial { .. } => "bernoulliTrial",
                RandomOp::BernoulliFilter { .. } => "bernoulliFilter",
                RandomOp::RandomFloat { .. } => "randomFloat",
                RandomOp::RandomInteger { .. } => "randomInteger",
                RandomOp::Sample { .. } => "sample",
            },
        }
    }

    fn parse(map: &Map<String, Value>) -> Result<Self> {
        let name = match map.get("op") {
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(Error::InvalidOperator(format!(
                    "\"op\" must be a string, found {other}"
                )))
            }
            None => return Err(Error::InvalidOperator("missing \"op\" field".to_string())),
        };

        // map takes every remaining key, so it skips the field check
        if name == "map" {
            let entries = map
                .iter()
                .filter(|(key, _)| key.as_str() != "op")
                .map(|(key, value)| Ok((key.clone(), Node::from_json(value)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            return Ok(Self::Map(entries));
        }

        let mut fields = Fields::new(name, map);
        let op = match name {
            "literal" => Self::Literal(fields.required("value")?.clone()),
            "get" => Self::Get(fields.string("var")?),
            "set" => Self::Set {
                var: fields.string("var")?,
                value: fields.node("value")?,
            },
            "seq" => Self::Seq(fields.node_list("seq")?),
            "return" => Self::Return(fields.node("value")?),
            "cond" => Self::Cond(fields.branches("cond")?),
            "array" => Self::Array(fields.node("values")?),
            "index" => Self::Index {
                base: fields.node("base")?,
                index: fields.node("index")?,
            },
            "coalesce" => Self::Coalesce(fields.node_list("values")?),
            "and" => Self::And(fields.node_list("values")?),
            "or" => Self::Or(fields.node_list("values")?),
            "equals" => fields.compare(Comparison::Equals)?,
            "greaterThan" => fields.compare(Comparison::GreaterThan)?,
            "lessThan" => fields.compare(Comparison::LessThan)?,
            "greaterThanOrEqualTo" => fields.compare(Comparison::GreaterThanOrEqualTo)?,
            "lessThanOrEqualTo" => fields.compare(Comparison::LessThanOrEqualTo)?,
            "sum" => fields.fold(Fold::Sum)?,
            "product" => fields.fold(Fold::Product)?,
            "min" => fields.fold(Fold::Min)?,
            "max" => fields.fold(Fold::Max)?,
            "%" => fields.arithmetic(Arithmetic::Modulo)?,
            "/" => fields.arithmetic(Arithmetic::Divide)?,
            "not" => fields.unary(Unary::Not)?,
            "negative" => fields.unary(Unary::Negative)?,
            "round" => fields.unary(Unary::Round)?,
            "length" => fields.unary(Unary::Length)?,
            "uniformChoice" => {
                let op = RandomOp::UniformChoice {
                    choices: fields.node("choices")?,
                };
                fields.random(op)?
            }
            "weightedChoice" => {
                let op = RandomOp::WeightedChoice {
                    choices: fields.node("choices")?,
                    weights: fields.node("weights")?,
                };
                fields.random(op)?
            }
            "bernoulliTrial" => {
                let op = RandomOp::BernoulliTrial {
                    p: fields.node("p")?,
                };
                fields.random(op)?
            }
            "bernoulliFilter" => {
                let op = RandomOp::BernoulliFilter {
                    p: fields.node("p")?,
                    choices: fields.node("choices")?,
                };
                fields.random(op)?
            }
            "randomFloat" => {
                let op = RandomOp::RandomFloat {
                    min: fields.node("min")?,
                    max: fields.node("max")?,
                };
                fields.random(op)?
            }
            "randomInteger" => {
                let op = RandomOp::RandomInteger {
                    min: fields.node("min")?,
                    max: fields.node("max")?,
                };
                fields.random(op)?
            }
            "sample" => {
                let op = RandomOp::Sample {
                    choices: fields.node("choices")?,
                    draws: fields.optional_node("draws")?,
                };
                fields.random(op)?
            }
            unknown => {
                return Err(Error::InvalidOperator(format!("unknown operator '{unknown}'")))
            }
        };
        fields.finish()?;
        Ok(op)
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("op".to_string(), Value::from(self.name()));
        match self {
            Self::Literal(value) => {
                map.insert("value".to_string(), value.clone());
            }
            Self::Get(var) => {
                map.insert("var".to_string(), Value::from(var.as_str()));
            }
            Self::Set { var, value } => {
                map.insert("var".to_string(), Value::from(var.as_str()));
                map.insert("value".to_string(), value.to_json());
            }
            Self::Seq(children) => {
                map.insert("seq".to_string(), list_json(children));
            }
            Self::Return(value) => {
                map.insert("value".to_string(), value.to_json());
            }
            Self::Cond(branches) => {
                let arms = branches
                    .iter()
                    .map(|b| {
                        let mut arm = Map::new();
                        arm.insert("if".to_string(), b.condition.to_json());
                        arm.insert("then".to_string(), b.then.to_json());
                        Value::Object(arm)
                    })
                    .collect();
                map.insert("cond".to_string(), Value::Array(arms));
            }
            Self::Array(values) | Self::Fold { values, .. } => {
                map.insert("values".to_string(), values.to_json());
            }
            Self::Map(entries) => {
                for (key, node) in entries {
                    map.insert(key.clone(), node.to_json());
                }
            }
            Self::Index { base, index } => {
                map.insert("base".to_string(), base.to_json());
                map.insert("index".to_string(), index.to_json());
            }
            Self::Coalesce(values) | Self::And(values) | Self::Or(values) => {
                map.insert("values".to_string(), list_json(values));
            }
            Self::Compare { left, right, .. } | Self::Arithmetic { left, right, .. } => {
                map.insert("left".to_string(), left.to_json());
                map.insert("right".to_string(), right.to_json());
            }
            Self::Unary { value, .. } => {
                map.insert("value".to_string(), value.to_json());
            }
            Self::Random { op, args } => {
                match op {
                    RandomOp::UniformChoice { choices } => {
                        map.insert("choices".to_string(), choices.to_json());
                    }
                    RandomOp::WeightedChoice { choices, weights } => {
                        map.insert("choices".to_string(), choices.to_json());
                        map.insert("weights".to_string(), weights.to_json());
                    }
                    RandomOp::BernoulliTrial { p } => {
                        map.insert("p".to_string(), p.to_json());
                    }
                    RandomOp::BernoulliFilter { p, choices } => {
                        map.insert("p".to_string(), p.to_json());
                        map.insert("choices".to_string(), choices.to_json());
                    }
                    RandomOp::RandomFloat { min, max } | RandomOp::RandomInteger { min, max } => {
                        map.insert("min".to_string(), min.to_json());
                        map.insert("max".to_string(), max.to_json());
                    }
                    RandomOp::Sample { choices, draws } => {
                        map.insert("choices".to_string(), choices.to_json());
                        if let Some(draws) = draws {
                            map.insert("draws".to_string(), draws.to_json());
                        }
                    }
                }
                map.insert("unit".to_string(), args.unit.to_json());
                if let Some(salt) = &args.salt {
                    map.insert("salt".to_string(), Value::from(salt.as_str()));
                }
                if let Some(full_salt) = &args.full_salt {
                    map.insert("full_salt".to_string(), Value::from(full_salt.as_str()));
                }
            }
        }
        Value::Object(map)
    }
}

impl Node {
    /// Parse a JSON value into a node.
    ///
    /// # Errors
    /// Returns `InvalidOperator` for malformed operator objects anywhere in
    /// the tree
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) if map.contains_key("op") => {
                Ok(Self::Op(Box::new(Operator::parse(map)?)))
            }
            Value::Array(items) => Ok(Self::List(
                items.iter().map(Self::from_json).collect::<Result<_>>()?,
            )),
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Serialize back to the definition JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::List(items) => list_json(items),
            Self::Op(op) => op.to_json(),
        }
    }

    /// Operator at this node, if any.
    #[must_use]
    pub fn as_op(&self) -> Option<&Operator> {
        match self {
            Self::Op(op) => Some(op.as_ref()),
            _ => None,
        }
    }

    fn collect_set_vars(&self, out: &mut Vec<String>) {
        match self {
            Self::Literal(_) => {}
            Self::List(items) => items.iter().for_each(|n| n.collect_set_vars(out)),
            Self::Op(op) => match op.as_ref() {
                Operator::Set { var, value } => {
                    if !out.contains(var) {
                        out.push(var.clone());
                    }
                    value.collect_set_vars(out);
                }
                Operator::Seq(children)
                | Operator::Coalesce(children)
                | Operator::And(children)
                | Operator::Or(children) => {
                    children.iter().for_each(|n| n.collect_set_vars(out));
                }
                Operator::Cond(branches) => {
                    for branch in branches {
                        branch.condition.collect_set_vars(out);
                        branch.then.collect_set_vars(out);
                    }
                }
                Operator::Return(node) | Operator::Array(node) => node.collect_set_vars(out),
                _ => {}
            },
        }
    }
}

fn list_json(nodes: &[Node]) -> Value {
    Value::Array(nodes.iter().map(Node::to_json).collect())
}

/// Field reader for one operator object that tracks which keys were used.
struct Fields<'a> {
    op: &'a str,
    map: &'a Map<String, Value>,
    used: Vec<&'static str>,
}

impl<'a> Fields<'a> {
    fn new(op: &'a str, map: &'a Map<String, Value>) -> Self {
        Self {
            op,
            map,
            used: vec!["op"],
        }
    }

    fn optional(&mut self, key: &'static str) -> Option<&'a Value> {
        self.used.push(key);
        self.map.get(key)
    }

    fn required(&mut self, key: &'static str) -> Result<&'a Value> {
        let op = self.op;
        self.optional(key).ok_or_else(|| {
            Error::InvalidOperator(format!("'{op}' is missing required field '{key}'"))
        })
    }

    fn string(&mut self, key: &'static str) -> Result<String> {
        let op = self.op;
        match self.required(key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(Error::InvalidOperator(format!(
                "'{op}' field '{key}' must be a string, found {other}"
            ))),
        }
    }

    fn optional_string(&mut self, key: &'static str) -> Result<Option<String>> {
        let op = self.op;
        match self.optional(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Error::InvalidOperator(format!(
                "'{op}' field '{key}' must be a string, found {other}"
            ))),
        }
    }

    fn node(&mut self, key: &'static str) -> Result<Node> {
        Node::from_json(self.required(key)?)
    }

    fn optional_node(&mut self, key: &'static str) -> Result<Option<Node>> {
        self.optional(key).map(Node::from_json).transpose()
    }

    fn array(&mut self, key: &'static str) -> Result<&'a Vec<Value>> {
        let op = self.op;
        match self.required(key)? {
            Value::Array(items) => Ok(items),
            other => Err(Error::InvalidOperator(format!(
                "'{op}' field '{key}' must be a list, found {other}"
            ))),
        }
    }

    fn node_list(&mut self, key: &'static str) -> Result<Vec<Node>> {
        self.array(key)?.iter().map(Node::from_json).collect()
    }

    fn branches(&mut self, key: &'static str) -> Result<Vec<Branch>> {
        self.array(key)?
            .iter()
            .map(|arm| {
                let Value::Object(arm) = arm else {
                    return Err(Error::InvalidOperator(format!(
                        "cond branch must be an object, found {arm}"
                    )));
                };
                if let Some(extra) = arm.keys().find(|k| *k != "if" && *k != "then") {
                    return Err(Error::InvalidOperator(format!(
                        "cond branch has unknown field '{extra}'"
                    )));
                }
                let part = |name: &str| {
                    arm.get(name).map(Node::from_json).transpose()?.ok_or_else(|| {
                        Error::InvalidOperator(format!("cond branch is missing '{name}'"))
                    })
                };
                Ok(Branch {
                    condition: part("if")?,
                    then: part("then")?,
                })
            })
            .collect()
    }

    fn compare(&mut self, op: Comparison) -> Result<Operator> {
        Ok(Operator::Compare {
            op,
            left: self.node("left")?,
            right: self.node("right")?,
        })
    }

    fn fold(&mut self, op: Fold) -> Result<Operator> {
        Ok(Operator::Fold {
            op,
            values: self.node("values")?,
        })
    }

    fn arithmetic(&mut self, op: Arithmetic) -> Result<Operator> {
        Ok(Operator::Arithmetic {
            op,
            left: self.node("left")?,
            right: self.node("right")?,
        })
    }

    fn unary(&mut self, op: Unary) -> Result<Operator> {
        Ok(Operator::Unary {
            op,
            value: self.node("value")?,
        })
    }

    fn random(&mut self, op: RandomOp) -> Result<Operator> {
        let args = RandomArgs {
            unit: self.node("unit")?,
            salt: self.optional_string("salt")?,
            full_salt: self.optional_string("full_salt")?,
        };
        Ok(Operator::Random { op, args })
    }

    fn finish(self) -> Result<()> {
        match self
            .map
            .keys()
            .find(|k| !self.used.iter().any(|used| *used == k.as_str()))
        {
            Some(extra) => Err(Error::InvalidOperator(format!(
                "'{}' has unknown field '{extra}'",
                self.op
            ))),
            None => Ok(()),
        }
    }
}

/// A parsed experiment definition.
///
/// Serializes to and from the definition JSON, so it can sit directly in
/// serde-derived records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Script {
    root: Node,
}

impl Script {
    /// `{"op": "seq", "seq": []}`
    #[must_use]
    pub fn empty() -> Self {
        Self {
            root: Node::Op(Box::new(Operator::Seq(Vec::new()))),
        }
    }

    /// Wrap an already built root node.
    #[must_use]
    pub const fn new(root: Node) -> Self {
        Self { root }
    }

    /// Parse a definition from JSON text.
    ///
    /// # Errors
    /// Returns `Json` for invalid JSON and `InvalidOperator` for a malformed
    /// tree
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    /// Parse a definition from a JSON value.
    ///
    /// # Errors
    /// Returns `InvalidOperator` for a malformed tree
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self {
            root: Node::from_json(value)?,
        })
    }

    /// The definition as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        self.root.to_json()
    }

    /// The definition as compact JSON text.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    /// Root node of the tree.
    #[must_use]
    pub const fn root(&self) -> &Node {
        &self.root
    }

    /// Append `{"op": "set", "var": var, "value": value}` to the root `seq`.
    ///
    /// # Errors
    /// Returns `InvalidOperator` if the root is not a `seq` or `value` holds
    /// a malformed operator
    pub fn append_set(&mut self, var: impl Into<String>, value: &Value) -> Result<()> {
        let value = Node::from_json(value)?;
        match &mut self.root {
            Node::Op(op) => match op.as_mut() {
                Operator::Seq(children) => {
                    children.push(Node::Op(Box::new(Operator::Set {
                        var: var.into(),
                        value,
                    })));
                    Ok(())
                }
                other => Err(Error::InvalidOperator(format!(
                    "cannot append a variable to a root '{}' operator",
                    other.name()
                ))),
            },
            _ => Err(Error::InvalidOperator(
                "cannot append a variable to a non-operator root".to_string(),
            )),
        }
    }

    /// Every variable a `set` in the tree can bind, in definition order.
    ///
    /// Branches are walked regardless of their conditions, so this lists what
    /// the experiment may output, not what one unit receives.
    #[must_use]
    pub fn output_variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect_set_vars(&mut out);
        out
    }

    /// Evaluate the definition for `inputs` and return its bindings.
    ///
    /// # Errors
    /// Propagates any evaluation error
    pub fn params(
        &self,
        salt: &str,
        inputs: Map<String, Value>,
    ) -> Result<BTreeMap<String, Value>> {
        let mut env = Environment::new(salt, inputs);
        Evaluator::new().run(self, &mut env)?;
        Ok(env.into_bindings())
    }
}

impl Default for Script {
    fn default() -> Self {
        Self::empty()
    }
}

impl TryFrom<Value> for Script {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(&value)
    }
}

impl From<Script> for Value {
    fn from(script: Script) -> Self {
        script.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_script_json() {
        assert_eq!(Script::empty().to_json(), json!({"op": "seq", "seq": []}));
    }

    #[test]
    fn test_parse_set_literal() {
        let script = Script::parse(
            r#"{"op":"seq","seq":[{"op":"set","var":"button_text","value":"blue"}]}"#,
        )
        .unwrap();
        let Node::Op(root) = script.root() else {
            panic!("root should be an operator");
        };
        let Operator::Seq(children) = root.as_ref() else {
            panic!("root should be seq");
        };
        assert_eq!(children.len(), 1);
        assert_eq!(
            children[0].as_op(),
            Some(&Operator::Set {
                var: "button_text".to_string(),
                value: Node::Literal(json!("blue")),
            })
        );
    }

    #[test]
    fn test_round_trip_random_ops() {
        let definition = json!({
            "op": "seq",
            "seq": [
                {"op": "set", "var": "color", "value": {
                    "op": "weightedChoice",
                    "choices": {"op": "array", "values": ["a", "b"]},
                    "weights": [0.25, 0.75],
                    "unit": {"op": "get", "var": "user_id"},
                    "salt": "color_salt"
                }},
                {"op": "set", "var": "pick", "value": {
                    "op": "sample",
                    "choices": [1, 2, 3],
                    "draws": 2,
                    "unit": [{"op": "get", "var": "user_id"}, "extra"],
                    "full_salt": "shared"
                }},
                {"op": "set", "var": "cfg", "value": {
                    "op": "map", "size": {"op": "literal", "value": 3}, "name": "x"
                }}
            ]
        });
        let script = Script::from_json(&definition).unwrap();
        assert_eq!(script.to_json(), definition);
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = Script::from_json(&json!({"op": "launchMissiles"})).unwrap_err();
        assert!(matches!(err, Error::InvalidOperator(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Script::from_json(&json!({"op": "get", "var": "x", "bogus": 1})).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = Script::from_json(&json!({"op": "uniformChoice", "choices": [1]})).unwrap_err();
        assert!(err.to_string().contains("unit"));
    }

    #[test]
    fn test_cond_branch_shape_checked() {
        let err = Script::from_json(&json!({"op": "cond", "cond": [{"if": true}]})).unwrap_err();
        assert!(err.to_string().contains("then"));
    }

    #[test]
    fn test_append_set() {
        let mut script = Script::empty();
        script.append_set("strategy", &json!("chocolate")).unwrap();
        assert_eq!(
            script.to_json(),
            json!({"op": "seq", "seq": [{"op": "set", "var": "strategy", "value": "chocolate"}]})
        );
    }

    #[test]
    fn test_append_set_requires_seq_root() {
        let mut script = Script::from_json(&json!({"op": "literal", "value": 1})).unwrap();
        assert!(script.append_set("x", &json!(1)).is_err());
    }

    #[test]
    fn test_output_variables_include_nested_branches() {
        let script = Script::from_json(&json!({
            "op": "seq",
            "seq": [
                {"op": "set", "var": "a", "value": 1},
                {"op": "cond", "cond": [{"if": false, "then": {
                    "op": "seq", "seq": [{"op": "set", "var": "b", "value": 2}]
                }}]},
                {"op": "set", "var": "a", "value": 3}
            ]
        }))
        .unwrap();
        assert_eq!(script.output_variables(), vec!["a", "b"]);
        assert!(Script::empty().output_variables().is_empty());
    }

    #[test]
    fn test_serde_uses_definition_json() {
        let script = Script::parse(r#"{"op":"seq","seq":[]}"#).unwrap();
        let text = serde_json::to_string(&script).unwrap();
        let back: Script = serde_json::from_str(&text).unwrap();
        assert_eq!(script, back);
        assert!(serde_json::from_str::<Script>(r#"{"op":"nope"}"#).is_err());
    }
}
