//! Operator tree evaluation
//!
//! Evaluation is a recursive walk over [`Node`]s that threads one mutable
//! [`Environment`]. Nothing is shared between environments, so trials for
//! different units run independently.
//!
//! Toyota Way Principles:
//! - Jidoka: every operator kind is matched exhaustively; a malformed value
//!   stops the evaluation with an error instead of a silent default
//! - Genchi Genbutsu: random draws go through [`Randomizer`], the single
//!   place where hash semantics live

use super::{Arithmetic, Comparison, Fold, Node, Operator, RandomArgs, RandomOp, Unary};
use crate::random::Randomizer;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::trace;

/// Variable bound by `set` that replaces the experiment salt for the rest of
/// the evaluation.
const EXPERIMENT_SALT_VAR: &str = "experiment_salt";

/// Evaluation state for one run of a definition.
///
/// Holds read-only inputs, fixed overrides and the bindings accumulated by
/// `set`. Lookup order for `get` is bindings (overrides included) then inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    salt: String,
    inputs: Map<String, Value>,
    overrides: BTreeMap<String, Value>,
    bindings: BTreeMap<String, Value>,
    halted: Option<bool>,
}

impl Environment {
    /// Create an environment for one unit.
    #[must_use]
    pub fn new(salt: impl Into<String>, inputs: Map<String, Value>) -> Self {
        Self {
            salt: salt.into(),
            inputs,
            overrides: BTreeMap::new(),
            bindings: BTreeMap::new(),
            halted: None,
        }
    }

    /// Fix variables to the given values; `set` leaves them untouched.
    #[must_use]
    pub fn with_overrides(mut self, overrides: BTreeMap<String, Value>) -> Self {
        self.bindings.extend(overrides.clone());
        self.overrides = overrides;
        self
    }

    /// Current experiment salt.
    #[must_use]
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Runtime inputs.
    #[must_use]
    pub const fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    /// Look a variable up.
    ///
    /// # Errors
    /// Returns `UndefinedVariable` if the name is neither bound nor an input
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.bindings
            .get(name)
            .or_else(|| self.inputs.get(name))
            .ok_or_else(|| Error::UndefinedVariable(name.to_string()))
    }

    /// Bind a variable, last write wins. Overridden names are left alone.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if !self.overrides.contains_key(&name) {
            self.bindings.insert(name, value);
        }
    }

    /// Whether `name` is fixed by an override.
    #[must_use]
    pub fn is_overridden(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
    }

    /// Bindings produced so far.
    #[must_use]
    pub const fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    /// Consume the environment, keeping only the bindings.
    #[must_use]
    pub fn into_bindings(self) -> BTreeMap<String, Value> {
        self.bindings
    }

    /// Whether a `return` stopped evaluation.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// False only when a `return` with a falsy value ran.
    #[must_use]
    pub fn in_experiment(&self) -> bool {
        self.halted.unwrap_or(true)
    }

    fn halt(&mut self, in_experiment: bool) {
        self.halted = Some(in_experiment);
    }
}

/// Python-style truthiness of a JSON value.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Integer while every operand is an integer, float afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(op: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => Ok(n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int)),
            Value::Bool(b) => Ok(Self::Int(i64::from(*b))),
            other => Err(Error::type_mismatch(
                op,
                format!("expected a number, found {other}"),
            )),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    const fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn combine(
        self,
        other: Self,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => {
                int_op(a, b).map_or_else(|| Self::Float(float_op(a as f64, b as f64)), Self::Int)
            }
            (a, b) => Self::Float(float_op(a.as_f64(), b.as_f64())),
        }
    }

    fn compare(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Int(i) => Value::from(i),
            Self::Float(f) => Value::from(f),
        }
    }
}

/// Evaluates operator trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator {
    _private: (),
}

impl Evaluator {
    /// Create an evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Evaluate a whole definition, leaving its bindings in `env`.
    ///
    /// # Errors
    /// Returns the first evaluation error
    pub fn run(&self, script: &super::Script, env: &mut Environment) -> Result<Value> {
        let result = self.evaluate(script.root(), env)?;
        trace!(
            bindings = env.bindings().len(),
            in_experiment = env.in_experiment(),
            "definition evaluated"
        );
        Ok(result)
    }

    /// Evaluate one node.
    ///
    /// # Errors
    /// - `InvalidOperator`: bad choice set, weights, probability or salt
    /// - `UndefinedVariable`: `get` of an unbound name
    /// - `TypeMismatch`: operand of the wrong type
    pub fn evaluate(&self, node: &Node, env: &mut Environment) -> Result<Value> {
        if env.is_halted() {
            return Ok(Value::Null);
        }
        match node {
            Node::Literal(value) => Ok(value.clone()),
            Node::List(items) => Ok(Value::Array(self.evaluate_all(items, env)?)),
            Node::Op(op) => self.evaluate_op(op, env, None),
        }
    }

    fn evaluate_all(&self, nodes: &[Node], env: &mut Environment) -> Result<Vec<Value>> {
        nodes.iter().map(|n| self.evaluate(n, env)).collect()
    }

    /// `set_var` is the enclosing `set` name, used as the default salt for a
    /// random operator that is the direct value of that `set`.
    fn evaluate_node_in_set(
        &self,
        node: &Node,
        env: &mut Environment,
        set_var: &str,
    ) -> Result<Value> {
        match node {
            Node::Op(op) => self.evaluate_op(op, env, Some(set_var)),
            other => self.evaluate(other, env),
        }
    }

    fn evaluate_op(
        &self,
        op: &Operator,
        env: &mut Environment,
        set_var: Option<&str>,
    ) -> Result<Value> {
        let name = op.name();
        match op {
            Operator::Literal(value) => Ok(value.clone()),
            Operator::Get(var) => env.get(var).cloned(),
            Operator::Set { var, value } => {
                if env.is_overridden(var) {
                    return Ok(Value::Null);
                }
                let value = self.evaluate_node_in_set(value, env, var)?;
                if env.is_halted() {
                    return Ok(Value::Null);
                }
                if var == EXPERIMENT_SALT_VAR {
                    env.salt = value_as_string(&value);
                }
                env.bind(var.clone(), value);
                Ok(Value::Null)
            }
            Operator::Seq(children) => {
                let mut last = Value::Null;
                for child in children {
                    last = self.evaluate(child, env)?;
                    if env.is_halted() {
                        break;
                    }
                }
                Ok(last)
            }
            Operator::Return(value) => {
                let value = self.evaluate(value, env)?;
                env.halt(is_truthy(&value));
                Ok(Value::Null)
            }
            Operator::Cond(branches) => {
                for branch in branches {
                    let condition = self.evaluate(&branch.condition, env)?;
                    if is_truthy(&condition) {
                        return self.evaluate(&branch.then, env);
                    }
                }
                Ok(Value::Null)
            }
            Operator::Array(values) => {
                let values = self.evaluate(values, env)?;
                expect_list(name, values).map(Value::Array)
            }
            Operator::Map(entries) => {
                let mut object = Map::new();
                for (key, node) in entries {
                    object.insert(key.clone(), self.evaluate(node, env)?);
                }
                Ok(Value::Object(object))
            }
            Operator::Index { base, index } => {
                let base = self.evaluate(base, env)?;
                let index = self.evaluate(index, env)?;
                index_into(name, &base, &index)
            }
            Operator::Coalesce(values) => {
                for node in values {
                    let value = self.evaluate(node, env)?;
                    if !value.is_null() {
                        return Ok(value);
                    }
                }
                Ok(Value::Null)
            }
            Operator::And(values) => {
                for node in values {
                    if !is_truthy(&self.evaluate(node, env)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Operator::Or(values) => {
                for node in values {
                    if is_truthy(&self.evaluate(node, env)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Operator::Compare { op, left, right } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                compare(name, *op, &left, &right).map(Value::Bool)
            }
            Operator::Fold { op, values } => {
                let values = self.evaluate(values, env)?;
                fold(name, *op, &expect_list(name, values)?)
            }
            Operator::Arithmetic { op, left, right } => {
                let left = Num::from_value(name, &self.evaluate(left, env)?)?;
                let right = Num::from_value(name, &self.evaluate(right, env)?)?;
                arithmetic(name, *op, left, right)
            }
            Operator::Unary { op, value } => {
                let value = self.evaluate(value, env)?;
                unary(name, *op, &value)
            }
            Operator::Random { op, args } => self.evaluate_random(name, op, args, env, set_var),
        }
    }

    fn evaluate_random(
        &self,
        name: &str,
        op: &RandomOp,
        args: &RandomArgs,
        env: &mut Environment,
        set_var: Option<&str>,
    ) -> Result<Value> {
        let randomizer = self.randomizer(name, args, env, set_var)?;
        match op {
            RandomOp::UniformChoice { choices } => {
                let choices = expect_list(name, self.evaluate(choices, env)?)?;
                let index = randomizer.choose_index(choices.len())?;
                Ok(choices[index].clone())
            }
            RandomOp::WeightedChoice { choices, weights } => {
                let choices = expect_list(name, self.evaluate(choices, env)?)?;
                let weights = expect_list(name, self.evaluate(weights, env)?)?
                    .iter()
                    .map(|w| Num::from_value(name, w).map(Num::as_f64))
                    .collect::<Result<Vec<_>>>()?;
                if weights.len() != choices.len() {
                    return Err(Error::InvalidOperator(format!(
                        "weightedChoice has {} choices but {} weights",
                        choices.len(),
                        weights.len()
                    )));
                }
                let index = randomizer.weighted_index(&weights)?;
                Ok(choices[index].clone())
            }
            RandomOp::BernoulliTrial { p } => {
                let p = Num::from_value(name, &self.evaluate(p, env)?)?.as_f64();
                Ok(Value::from(i64::from(randomizer.bernoulli(p)?)))
            }
            RandomOp::BernoulliFilter { p, choices } => {
                let p = Num::from_value(name, &self.evaluate(p, env)?)?.as_f64();
                let choices = expect_list(name, self.evaluate(choices, env)?)?;
                let mut kept = Vec::new();
                for choice in choices {
                    if randomizer.bernoulli_appended(p, &choice)? {
                        kept.push(choice);
                    }
                }
                Ok(Value::Array(kept))
            }
            RandomOp::RandomFloat { min, max } => {
                let min = Num::from_value(name, &self.evaluate(min, env)?)?.as_f64();
                let max = Num::from_value(name, &self.evaluate(max, env)?)?.as_f64();
                Ok(Value::from(randomizer.uniform(min, max)))
            }
            RandomOp::RandomInteger { min, max } => {
                let min = expect_int(name, &self.evaluate(min, env)?)?;
                let max = expect_int(name, &self.evaluate(max, env)?)?;
                Ok(Value::from(randomizer.integer(min, max)?))
            }
            RandomOp::Sample { choices, draws } => {
                let choices = expect_list(name, self.evaluate(choices, env)?)?;
                if choices.is_empty() {
                    return Err(Error::InvalidOperator(
                        "sample requires at least one choice".to_string(),
                    ));
                }
                let draws = match draws {
                    Some(node) => {
                        let draws = expect_int(name, &self.evaluate(node, env)?)?;
                        usize::try_from(draws)
                            .ok()
                            .filter(|d| *d <= choices.len())
                            .ok_or_else(|| {
                                Error::InvalidOperator(format!(
                                    "sample draws {draws} must be between 0 and {}",
                                    choices.len()
                                ))
                            })?
                    }
                    None => choices.len(),
                };
                let mut shuffled = randomizer.shuffle(choices);
                shuffled.truncate(draws);
                Ok(Value::Array(shuffled))
            }
        }
    }

    fn randomizer(
        &self,
        name: &str,
        args: &RandomArgs,
        env: &mut Environment,
        set_var: Option<&str>,
    ) -> Result<Randomizer> {
        let units = match self.evaluate(&args.unit, env)? {
            Value::Array(items) => items,
            other => vec![other],
        };
        if let Some(full_salt) = &args.full_salt {
            return Ok(Randomizer::with_full_salt(full_salt, &units));
        }
        let salt = args.salt.as_deref().or(set_var).ok_or_else(|| {
            Error::InvalidOperator(format!(
                "'{name}' needs a \"salt\" field when it is not the value of a set"
            ))
        })?;
        Ok(Randomizer::new(env.salt(), salt, &units))
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn expect_list(op: &str, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(Error::type_mismatch(
            op,
            format!("expected a list, found {other}"),
        )),
    }
}

fn expect_int(op: &str, value: &Value) -> Result<i64> {
    match Num::from_value(op, value)? {
        Num::Int(i) => Ok(i),
        #[allow(clippy::cast_possible_truncation)]
        Num::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
        Num::Float(f) => Err(Error::type_mismatch(
            op,
            format!("expected an integer, found {f}"),
        )),
    }
}

fn index_into(op: &str, base: &Value, index: &Value) -> Result<Value> {
    match base {
        Value::Array(items) => {
            let i = expect_int(op, index)?;
            Ok(usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .unwrap_or(Value::Null))
        }
        Value::Object(map) => match index {
            Value::String(key) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
            other => Err(Error::type_mismatch(
                op,
                format!("object index must be a string, found {other}"),
            )),
        },
        other => Err(Error::type_mismatch(
            op,
            format!("expected a list or object, found {other}"),
        )),
    }
}

fn compare(op: &str, comparison: Comparison, left: &Value, right: &Value) -> Result<bool> {
    if comparison == Comparison::Equals {
        return Ok(values_equal(left, right));
    }
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => Num::from_value(op, left)?.compare(Num::from_value(op, right)?),
    };
    // NaN compares false in every direction
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match comparison {
        Comparison::GreaterThan => ordering == Ordering::Greater,
        Comparison::LessThan => ordering == Ordering::Less,
        Comparison::GreaterThanOrEqualTo => ordering != Ordering::Less,
        Comparison::LessThanOrEqualTo => ordering != Ordering::Greater,
        Comparison::Equals => ordering == Ordering::Equal,
    })
}

/// Equality where `1`, `1.0` and `true` are the same value.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_) | Value::Bool(_), Value::Number(_))
        | (Value::Number(_), Value::Bool(_)) => {
            match (Num::from_value("equals", left), Num::from_value("equals", right)) {
                (Ok(a), Ok(b)) => a.compare(b) == Some(Ordering::Equal),
                _ => false,
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => left == right,
    }
}

fn fold(op: &str, kind: Fold, values: &[Value]) -> Result<Value> {
    let numbers = values
        .iter()
        .map(|v| Num::from_value(op, v))
        .collect::<Result<Vec<_>>>()?;
    let result = match kind {
        Fold::Sum => numbers
            .into_iter()
            .fold(Num::Int(0), |acc, n| acc.combine(n, i64::checked_add, |a, b| a + b)),
        Fold::Product => numbers
            .into_iter()
            .fold(Num::Int(1), |acc, n| acc.combine(n, i64::checked_mul, |a, b| a * b)),
        Fold::Min | Fold::Max => {
            let wanted = if kind == Fold::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut iter = numbers.into_iter();
            let first = iter.next().ok_or_else(|| {
                Error::InvalidOperator(format!("'{op}' requires at least one value"))
            })?;
            iter.fold(first, |best, n| {
                if n.compare(best) == Some(wanted) {
                    n
                } else {
                    best
                }
            })
        }
    };
    Ok(result.into_value())
}

fn arithmetic(op: &str, kind: Arithmetic, left: Num, right: Num) -> Result<Value> {
    if right.as_f64() == 0.0 {
        return Err(Error::type_mismatch(op, "division by zero"));
    }
    match kind {
        Arithmetic::Divide => Ok(Value::from(left.as_f64() / right.as_f64())),
        Arithmetic::Modulo => {
            let result = match (left, right) {
                (Num::Int(a), Num::Int(b)) => {
                    // remainder takes the divisor's sign
                    let r = a.wrapping_rem(b);
                    if r != 0 && (r < 0) != (b < 0) {
                        Num::Int(r + b)
                    } else {
                        Num::Int(r)
                    }
                }
                (a, b) => {
                    let (a, b) = (a.as_f64(), b.as_f64());
                    Num::Float(a - b * (a / b).floor())
                }
            };
            Ok(result.into_value())
        }
    }
}

fn unary(op: &str, kind: Unary, value: &Value) -> Result<Value> {
    match kind {
        Unary::Not => Ok(Value::Bool(!is_truthy(value))),
        Unary::Negative => match Num::from_value(op, value)? {
            Num::Int(i) => Ok(i
                .checked_neg()
                .map_or_else(|| Value::from(-(i as f64)), Value::from)),
            Num::Float(f) => Ok(Value::from(-f)),
        },
        Unary::Round => match Num::from_value(op, value)? {
            Num::Int(i) => Ok(Value::from(i)),
            #[allow(clippy::cast_possible_truncation)]
            Num::Float(f) if f.is_finite() => Ok(Value::from(f.round_ties_even() as i64)),
            Num::Float(f) => Err(Error::type_mismatch(op, format!("cannot round {f}"))),
        },
        Unary::Length => match value {
            Value::Array(items) => Ok(Value::from(items.len())),
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Object(map) => Ok(Value::from(map.len())),
            other => Err(Error::type_mismatch(
                op,
                format!("expected a list, string or object, found {other}"),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;
    use serde_json::json;

    fn inputs(user_id: &Value) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("user_id".to_string(), user_id.clone());
        map
    }

    fn run(definition: &Value, user_id: &Value) -> Result<Environment> {
        let script = Script::from_json(definition)?;
        let mut env = Environment::new("test_salt", inputs(user_id));
        Evaluator::new().run(&script, &mut env)?;
        Ok(env)
    }

    fn eval(expr: &Value) -> Result<Value> {
        let node = Node::from_json(expr)?;
        let mut env = Environment::new("test_salt", inputs(&json!(7)));
        Evaluator::new().evaluate(&node, &mut env)
    }

    #[test]
    fn test_set_literal() {
        let env = run(
            &json!({"op": "seq", "seq": [{"op": "set", "var": "button_text", "value": "blue"}]}),
            &json!(1),
        )
        .unwrap();
        assert_eq!(env.bindings().get("button_text"), Some(&json!("blue")));
        assert_eq!(env.bindings().len(), 1);
    }

    #[test]
    fn test_set_last_write_wins() {
        let env = run(
            &json!({"op": "seq", "seq": [
                {"op": "set", "var": "x", "value": 1},
                {"op": "set", "var": "x", "value": 2}
            ]}),
            &json!(1),
        )
        .unwrap();
        assert_eq!(env.bindings().get("x"), Some(&json!(2)));
    }

    #[test]
    fn test_get_reads_bindings_then_inputs() {
        let env = run(
            &json!({"op": "seq", "seq": [
                {"op": "set", "var": "copy", "value": {"op": "get", "var": "user_id"}},
                {"op": "set", "var": "user_id", "value": "shadowed"},
                {"op": "set", "var": "again", "value": {"op": "get", "var": "user_id"}}
            ]}),
            &json!(42),
        )
        .unwrap();
        assert_eq!(env.bindings().get("copy"), Some(&json!(42)));
        assert_eq!(env.bindings().get("again"), Some(&json!("shadowed")));
    }

    #[test]
    fn test_get_undefined_is_error() {
        let err = eval(&json!({"op": "get", "var": "missing"})).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable(ref name) if name == "missing"));
    }

    #[test]
    fn test_seq_returns_last_value() {
        let value = eval(&json!({"op": "seq", "seq": [1, {"op": "literal", "value": "last"}]}));
        assert_eq!(value.unwrap(), json!("last"));
        assert_eq!(eval(&json!({"op": "seq", "seq": []})).unwrap(), Value::Null);
    }

    #[test]
    fn test_cond_first_true_branch_wins() {
        let env = run(
            &json!({"op": "seq", "seq": [{"op": "cond", "cond": [
                {"if": false, "then": {"op": "set", "var": "branch", "value": "a"}},
                {"if": 1, "then": {"op": "set", "var": "branch", "value": "b"}},
                {"if": true, "then": {"op": "set", "var": "branch", "value": "c"}}
            ]}]}),
            &json!(1),
        )
        .unwrap();
        assert_eq!(env.bindings().get("branch"), Some(&json!("b")));
    }

    #[test]
    fn test_cond_fall_through_binds_nothing() {
        let env = run(
            &json!({"op": "seq", "seq": [{"op": "cond", "cond": [
                {"if": 0, "then": {"op": "set", "var": "x", "value": 1}},
                {"if": "", "then": {"op": "set", "var": "y", "value": 2}}
            ]}]}),
            &json!(1),
        )
        .unwrap();
        assert!(env.bindings().is_empty());
    }

    #[test]
    fn test_product_of_integers_stays_integer() {
        let value = eval(&json!({"op": "product", "values": [4, {"op": "literal", "value": 8}]}));
        assert_eq!(value.unwrap(), json!(32));
        let value = eval(&json!({"op": "product", "values": [2, 0.5]}));
        assert_eq!(value.unwrap(), json!(1.0));
    }

    #[test]
    fn test_arithmetic_type_mismatch() {
        let err = eval(&json!({"op": "sum", "values": [1, "two"]})).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref op, .. } if op == "sum"));
        let err = eval(&json!({"op": "product", "values": "not a list"})).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_min_max() {
        assert_eq!(eval(&json!({"op": "min", "values": [3, 1.5, 2]})).unwrap(), json!(1.5));
        assert_eq!(eval(&json!({"op": "max", "values": [3, 1.5, 2]})).unwrap(), json!(3));
        assert!(eval(&json!({"op": "max", "values": []})).is_err());
    }

    #[test]
    fn test_modulo_and_divide() {
        assert_eq!(eval(&json!({"op": "%", "left": -7, "right": 3})).unwrap(), json!(2));
        assert_eq!(eval(&json!({"op": "%", "left": 7, "right": -3})).unwrap(), json!(-2));
        assert_eq!(eval(&json!({"op": "/", "left": 1, "right": 4})).unwrap(), json!(0.25));
        assert!(eval(&json!({"op": "/", "left": 1, "right": 0})).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval(&json!({"op": "equals", "left": 1, "right": 1.0})).unwrap(), json!(true));
        assert_eq!(eval(&json!({"op": "equals", "left": "a", "right": "b"})).unwrap(), json!(false));
        assert_eq!(
            eval(&json!({"op": "greaterThan", "left": 2, "right": 1})).unwrap(),
            json!(true)
        );
        assert_eq!(
            eval(&json!({"op": "lessThanOrEqualTo", "left": 2, "right": 2})).unwrap(),
            json!(true)
        );
        assert!(eval(&json!({"op": "lessThan", "left": "a", "right": 1})).is_err());
    }

    #[test]
    fn test_round_half_to_even() {
        let round = |value: f64| eval(&json!({"op": "round", "value": value})).unwrap();
        assert_eq!(round(2.5), json!(2));
        assert_eq!(round(3.5), json!(4));
        assert_eq!(round(-0.5), json!(0));
        assert_eq!(round(-1.5), json!(-2));
        assert_eq!(round(0.4), json!(0));
    }

    #[test]
    fn test_equals_treats_booleans_as_integers() {
        let equals = |left: Value, right: Value| {
            eval(&json!({"op": "equals", "left": left, "right": right})).unwrap()
        };
        assert_eq!(equals(json!(true), json!(1)), json!(true));
        assert_eq!(equals(json!(0.0), json!(false)), json!(true));
        assert_eq!(equals(json!(true), json!(2)), json!(false));
        assert_eq!(equals(json!([true, 0]), json!([1, false])), json!(true));
        assert_eq!(equals(json!(true), json!("True")), json!(false));
    }

    #[test]
    fn test_logic_short_circuits() {
        // the undefined get would fail if evaluated
        let value = eval(&json!({"op": "and", "values": [false, {"op": "get", "var": "nope"}]}));
        assert_eq!(value.unwrap(), json!(false));
        let value = eval(&json!({"op": "or", "values": [1, {"op": "get", "var": "nope"}]}));
        assert_eq!(value.unwrap(), json!(true));
        assert_eq!(eval(&json!({"op": "not", "value": []})).unwrap(), json!(true));
    }

    #[test]
    fn test_collections() {
        assert_eq!(
            eval(&json!({"op": "index", "base": [10, 20], "index": 1})).unwrap(),
            json!(20)
        );
        assert_eq!(
            eval(&json!({"op": "index", "base": [10, 20], "index": 5})).unwrap(),
            Value::Null
        );
        assert_eq!(
            eval(&json!({"op": "index", "base": {"op": "map", "a": 1}, "index": "a"})).unwrap(),
            json!(1)
        );
        assert_eq!(eval(&json!({"op": "length", "value": [1, 2, 3]})).unwrap(), json!(3));
        assert_eq!(
            eval(&json!({"op": "coalesce", "values": [null, {"op": "literal", "value": null}, 4]}))
                .unwrap(),
            json!(4)
        );
        assert_eq!(eval(&json!({"op": "round", "value": 2.7})).unwrap(), json!(3));
        assert_eq!(eval(&json!({"op": "negative", "value": 2})).unwrap(), json!(-2));
    }

    #[test]
    fn test_random_requires_salt_outside_set() {
        let err = eval(&json!({
            "op": "uniformChoice", "choices": [1, 2], "unit": {"op": "get", "var": "user_id"}
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOperator(_)));

        let value = eval(&json!({
            "op": "uniformChoice", "choices": [1, 2], "salt": "s",
            "unit": {"op": "get", "var": "user_id"}
        }));
        assert!(value.is_ok());
    }

    #[test]
    fn test_set_salt_matches_explicit_salt() {
        let implicit = run(
            &json!({"op": "seq", "seq": [{"op": "set", "var": "x", "value": {
                "op": "randomInteger", "min": 0, "max": 1000000,
                "unit": {"op": "get", "var": "user_id"}
            }}]}),
            &json!(99),
        )
        .unwrap();
        let explicit = run(
            &json!({"op": "seq", "seq": [{"op": "set", "var": "x", "value": {
                "op": "randomInteger", "min": 0, "max": 1000000, "salt": "x",
                "unit": {"op": "get", "var": "user_id"}
            }}]}),
            &json!(99),
        )
        .unwrap();
        assert_eq!(implicit.bindings(), explicit.bindings());
    }

    #[test]
    fn test_uniform_choice_uses_pinned_hash() {
        let env = run(
            &json!({"op": "seq", "seq": [{"op": "set", "var": "x", "value": {
                "op": "uniformChoice", "choices": ["a", "b", "c"],
                "unit": {"op": "get", "var": "user_id"}
            }}]}),
            &json!(4),
        )
        .unwrap();
        let expected = Randomizer::new("test_salt", "x", &[json!(4)]).hash() % 3;
        let choices = ["a", "b", "c"];
        assert_eq!(
            env.bindings().get("x"),
            Some(&json!(choices[usize::try_from(expected).unwrap()]))
        );
    }

    #[test]
    fn test_weighted_choice_length_mismatch() {
        let err = eval(&json!({
            "op": "weightedChoice", "choices": ["a", "b"], "weights": [1], "salt": "w",
            "unit": 1
        }))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOperator(_)));
    }

    #[test]
    fn test_bernoulli_trial_bounds() {
        let always = eval(&json!({"op": "bernoulliTrial", "p": 1, "salt": "b", "unit": 3}));
        assert_eq!(always.unwrap(), json!(1));
        let err = eval(&json!({"op": "bernoulliTrial", "p": 1.2, "salt": "b", "unit": 3}));
        assert!(matches!(err, Err(Error::InvalidOperator(_))));
    }

    #[test]
    fn test_bernoulli_filter_and_sample() {
        let all = eval(&json!({
            "op": "bernoulliFilter", "p": 1.0, "choices": [1, 2, 3], "salt": "f", "unit": 3
        }));
        assert_eq!(all.unwrap(), json!([1, 2, 3]));
        let none = eval(&json!({
            "op": "bernoulliFilter", "p": 0.0, "choices": [1, 2, 3], "salt": "f", "unit": 3
        }));
        assert_eq!(none.unwrap(), json!([]));

        let sample = eval(&json!({
            "op": "sample", "choices": [1, 2, 3, 4], "draws": 2, "salt": "s", "unit": 3
        }))
        .unwrap();
        assert_eq!(sample.as_array().map(Vec::len), Some(2));
        let err = eval(&json!({
            "op": "sample", "choices": [1, 2], "draws": 3, "salt": "s", "unit": 3
        }));
        assert!(err.is_err());
    }

    #[test]
    fn test_return_halts_and_excludes() {
        let env = run(
            &json!({"op": "seq", "seq": [
                {"op": "set", "var": "a", "value": 1},
                {"op": "return", "value": false},
                {"op": "set", "var": "b", "value": 2}
            ]}),
            &json!(1),
        )
        .unwrap();
        assert!(env.is_halted());
        assert!(!env.in_experiment());
        assert_eq!(env.bindings().get("a"), Some(&json!(1)));
        assert!(env.bindings().get("b").is_none());
    }

    #[test]
    fn test_overrides_are_not_replaced() {
        let script = Script::from_json(&json!({"op": "seq", "seq": [
            {"op": "set", "var": "color", "value": "blue"},
            {"op": "set", "var": "copy", "value": {"op": "get", "var": "color"}}
        ]}))
        .unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert("color".to_string(), json!("red"));
        let mut env = Environment::new("s", Map::new()).with_overrides(overrides);
        Evaluator::new().run(&script, &mut env).unwrap();
        assert_eq!(env.bindings().get("color"), Some(&json!("red")));
        assert_eq!(env.bindings().get("copy"), Some(&json!("red")));
    }

    #[test]
    fn test_experiment_salt_variable_reseeds() {
        let definition = |salt: &str| {
            json!({"op": "seq", "seq": [
                {"op": "set", "var": "experiment_salt", "value": salt},
                {"op": "set", "var": "x", "value": {
                    "op": "randomInteger", "min": 0, "max": 1000000000,
                    "unit": {"op": "get", "var": "user_id"}
                }}
            ]})
        };
        let a = run(&definition("first"), &json!(5)).unwrap();
        let b = run(&definition("second"), &json!(5)).unwrap();
        let expected = Randomizer::new("first", "x", &[json!(5)]).integer(0, 1_000_000_000);
        assert_eq!(a.bindings().get("x"), Some(&json!(expected.unwrap())));
        assert_ne!(a.bindings().get("x"), b.bindings().get("x"));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!("false")));
        assert!(is_truthy(&json!([0])));
    }
}
