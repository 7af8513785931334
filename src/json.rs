// Bridge between JSON documents and scheme values, for feeding host data
// into an environment and getting structured results back out.
//
// null maps to the empty list, arrays to lists, objects to association
// lists keyed by strings. The reverse direction classifies a proper list
// as an object when every element is a (string . value) pair.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Number as JsonNumber, Value as Json};

use crate::error::{Error, Result};
use crate::interp::Interp;
use crate::number::Number;
use crate::value::Value;

/// Parse a JSON document into a value.
pub fn read(scm: &mut Interp, text: &str) -> Result<Value> {
    let parsed: Json =
        serde_json::from_str(text).map_err(|e| Error::Io(format!("invalid json: {}", e)))?;
    Ok(from_json(scm, &parsed))
}

/// Render a value as a JSON document.
pub fn write(value: &Value) -> Result<String> {
    let json = to_json(value)?;
    serde_json::to_string(&json).map_err(|e| Error::Io(format!("json: {}", e)))
}

pub fn from_json(scm: &mut Interp, json: &Json) -> Value {
    match json {
        Json::Null => Value::Nil,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(json_number(n)),
        Json::String(s) => Value::Str(Rc::new(RefCell::new(s.clone()))),
        Json::Array(items) => {
            let values: Vec<Value> = items.iter().map(|v| from_json(scm, v)).collect();
            scm.heap.list(values)
        }
        Json::Object(fields) => {
            let mut entries = Vec::with_capacity(fields.len());
            for (key, v) in fields {
                let key = Value::Str(Rc::new(RefCell::new(key.clone())));
                let value = from_json(scm, v);
                entries.push(scm.heap.cons(key, value));
            }
            scm.heap.list(entries)
        }
    }
}

fn json_number(n: &JsonNumber) -> Number {
    if let Some(i) = n.as_i64() {
        Number::Int(i)
    } else {
        Number::from(n.as_f64().unwrap_or(f64::NAN))
    }
}

pub fn to_json(value: &Value) -> Result<Json> {
    match value {
        Value::None => Ok(Json::Null),
        Value::Nil => Ok(Json::Array(Vec::new())),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Char(c) => Ok(Json::String(c.to_string())),
        Value::Number(n) => match n {
            Number::Int(i) => Ok(Json::Number((*i).into())),
            Number::Float(x) => JsonNumber::from_f64(*x)
                .map(Json::Number)
                .ok_or_else(|| Error::Io("non-finite number in json".to_string())),
            Number::Complex(_) => Err(Error::Io(
                "complex numbers have no json representation".to_string(),
            )),
        },
        Value::Symbol(sym) => Ok(Json::String(sym.name().to_string())),
        Value::Str(s) => Ok(Json::String(s.borrow().clone())),
        Value::Vector(v) => {
            let items: Result<Vec<Json>> = v.borrow().iter().map(to_json).collect();
            Ok(Json::Array(items?))
        }
        Value::Pair(_) => {
            let items = collect_list(value)?;
            if !items.is_empty() && items.iter().all(is_object_entry) {
                let mut fields = Map::new();
                for entry in &items {
                    let key: Rc<RefCell<String>> = entry.car()?.cast()?;
                    let key = key.borrow().clone();
                    fields.insert(key, to_json(&entry.cdr()?)?);
                }
                Ok(Json::Object(fields))
            } else {
                let items: Result<Vec<Json>> = items.iter().map(to_json).collect();
                Ok(Json::Array(items?))
            }
        }
        other => Err(Error::Io(format!(
            "value has no json representation: {}",
            other
        ))),
    }
}

fn is_object_entry(entry: &Value) -> bool {
    match entry {
        Value::Pair(cell) => matches!(*cell.car.borrow(), Value::Str(_)),
        _ => false,
    }
}

fn collect_list(value: &Value) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut cur = value.clone();
    loop {
        match cur {
            Value::Nil => return Ok(items),
            Value::Pair(cell) => {
                items.push(cell.car.borrow().clone());
                cur = cell.cdr.borrow().clone();
            }
            _ => {
                return Err(Error::Io(
                    "improper list has no json representation".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(scm: &mut Interp, text: &str) -> String {
        let v = read(scm, text).unwrap();
        write(&v).unwrap()
    }

    #[test]
    fn test_atoms() {
        let mut scm = Interp::new();
        assert_eq!(roundtrip(&mut scm, "42"), "42");
        assert_eq!(roundtrip(&mut scm, "1.5"), "1.5");
        assert_eq!(roundtrip(&mut scm, "true"), "true");
        assert_eq!(roundtrip(&mut scm, "\"hi\""), "\"hi\"");
        assert_eq!(roundtrip(&mut scm, "null"), "[]");
    }

    #[test]
    fn test_array_becomes_list() {
        let mut scm = Interp::new();
        let v = read(&mut scm, "[1, 2, 3]").unwrap();
        assert_eq!(v.to_string(), "(1 2 3)");
        assert_eq!(write(&v).unwrap(), "[1,2,3]");
    }

    #[test]
    fn test_object_becomes_alist() {
        let mut scm = Interp::new();
        let v = read(&mut scm, "{\"a\": 1, \"b\": [true]}").unwrap();
        assert_eq!(v.to_string(), "((\"a\" . 1) (\"b\" #t))");
        assert_eq!(write(&v).unwrap(), "{\"a\":1,\"b\":[true]}");
    }

    #[test]
    fn test_unrepresentable() {
        let mut scm = Interp::new();
        let env = scm.mkenv(None);
        let v = scm.eval_str(&env, "(sqrt -1)").unwrap();
        assert!(write(&v).is_err());
        let p = scm.eval_str(&env, "(cons 1 2)").unwrap();
        assert!(write(&p).is_err());
    }

    #[test]
    fn test_json_primitives() {
        let mut scm = Interp::new();
        let env = scm.mkenv(None);
        let v = scm
            .eval_str(&env, "(cdr (assoc \"b\" (json-read \"{\\\"a\\\": 1, \\\"b\\\": 2}\")))")
            .unwrap();
        assert_eq!(v.to_string(), "2");
        let v = scm.eval_str(&env, "(json-write '(1 2 3))").unwrap();
        assert_eq!(v.to_string(), "\"[1,2,3]\"");
    }
}
