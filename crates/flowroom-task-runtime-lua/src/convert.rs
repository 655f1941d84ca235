//! JSON <-> Lua value conversion.
//!
//! Lua -> JSON follows `JSON.stringify`: values with no JSON form vanish from
//! objects, turn into `null` inside arrays, and make the whole result
//! undefined at the top level. Tables built from JSON arrays carry a marker
//! metatable so an empty array still encodes as `[]`.

use std::ffi::c_void;

use mlua::{Lua, Table, Value as LuaValue};
use serde_json::{Map, Number, Value};

use flowroom_task_runtime::ScriptError;

const MAX_DEPTH: usize = 128;

/// Metatable field marking a table that was built from a JSON array.
const ARRAY_MARKER: &str = "__jsonarray";

/// Largest integer a float can represent exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Convert a JSON value for use inside a script.
///
/// Top-level `null` becomes `nil`; nested `null`s become the `NULL` sentinel
/// so that array positions survive.
pub(crate) fn json_to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
  match value {
    Value::Null => Ok(LuaValue::Nil),
    other => {
      let array_mt = lua.create_table()?;
      array_mt.raw_set(ARRAY_MARKER, true)?;
      to_lua(lua, other, &array_mt)
    }
  }
}

fn to_lua(lua: &Lua, value: &Value, array_mt: &Table) -> mlua::Result<LuaValue> {
  Ok(match value {
    Value::Null => LuaValue::NULL,
    Value::Bool(b) => LuaValue::Boolean(*b),
    Value::Number(n) => match n.as_i64() {
      Some(i) => LuaValue::Integer(i),
      None => LuaValue::Number(n.as_f64().unwrap_or(f64::NAN)),
    },
    Value::String(s) => LuaValue::String(lua.create_string(s)?),
    Value::Array(items) => {
      let table = lua.create_table_with_capacity(items.len(), 0)?;
      for (i, item) in items.iter().enumerate() {
        table.raw_set(i + 1, to_lua(lua, item, array_mt)?)?;
      }
      table.set_metatable(Some(array_mt.clone()));
      LuaValue::Table(table)
    }
    Value::Object(map) => {
      let table = lua.create_table_with_capacity(0, map.len())?;
      for (key, item) in map {
        table.raw_set(key.as_str(), to_lua(lua, item, array_mt)?)?;
      }
      LuaValue::Table(table)
    }
  })
}

/// Convert a script's return value to JSON. `None` means undefined.
pub(crate) fn lua_to_json(value: &LuaValue) -> Result<Option<Value>, ScriptError> {
  Encoder::default().encode(value)
}

#[derive(Default)]
struct Encoder {
  /// Tables currently being encoded, for cycle detection.
  stack: Vec<*const c_void>,
}

impl Encoder {
  fn encode(&mut self, value: &LuaValue) -> Result<Option<Value>, ScriptError> {
    Ok(match value {
      LuaValue::Nil => None,
      LuaValue::Boolean(b) => Some(Value::Bool(*b)),
      LuaValue::Integer(i) => Some(Value::from(*i)),
      LuaValue::Number(n) => Some(number(*n)),
      LuaValue::String(s) => Some(Value::String(s.to_string_lossy().to_string())),
      LuaValue::LightUserData(ud) if ud.0.is_null() => Some(Value::Null),
      LuaValue::Table(table) => Some(self.encode_table(table)?),
      _ => None,
    })
  }

  fn encode_table(&mut self, table: &Table) -> Result<Value, ScriptError> {
    let ptr = table.to_pointer();
    if self.stack.contains(&ptr) {
      return Err(ScriptError::new(
        "cyclic structure cannot be converted to JSON",
      ));
    }
    if self.stack.len() >= MAX_DEPTH {
      return Err(ScriptError::new(format!(
        "result is nested deeper than {} levels",
        MAX_DEPTH
      )));
    }

    let mut entries = Vec::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
      let pair = pair.map_err(|e| ScriptError::new(e.to_string()))?;
      entries.push(pair);
    }

    self.stack.push(ptr);
    let encoded = if is_sequence(&entries) || (entries.is_empty() && is_marked_array(table)) {
      self.encode_array(entries)
    } else {
      self.encode_object(entries)
    };
    self.stack.pop();
    encoded
  }

  fn encode_array(&mut self, mut entries: Vec<(LuaValue, LuaValue)>) -> Result<Value, ScriptError> {
    entries.sort_by_key(|(key, _)| match key {
      LuaValue::Integer(i) => *i,
      _ => 0,
    });

    let mut items = Vec::with_capacity(entries.len());
    for (_, item) in &entries {
      items.push(self.encode(item)?.unwrap_or(Value::Null));
    }
    Ok(Value::Array(items))
  }

  fn encode_object(&mut self, entries: Vec<(LuaValue, LuaValue)>) -> Result<Value, ScriptError> {
    let mut map = Map::new();
    for (key, item) in &entries {
      let key = match key {
        LuaValue::String(s) => s.to_string_lossy().to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => n.to_string(),
        _ => continue,
      };
      if let Some(encoded) = self.encode(item)? {
        map.insert(key, encoded);
      }
    }
    Ok(Value::Object(map))
  }
}

/// A table is an array when its keys are exactly `1..=n` for some `n >= 1`.
fn is_sequence(entries: &[(LuaValue, LuaValue)]) -> bool {
  let n = entries.len() as i64;
  n > 0
    && entries
      .iter()
      .all(|(key, _)| matches!(key, LuaValue::Integer(i) if *i >= 1 && *i <= n))
}

fn is_marked_array(table: &Table) -> bool {
  table
    .metatable()
    .and_then(|mt| mt.raw_get::<bool>(ARRAY_MARKER).ok())
    .unwrap_or(false)
}

fn number(n: f64) -> Value {
  if !n.is_finite() {
    return Value::Null;
  }
  if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
    return Value::from(n as i64);
  }
  Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}
