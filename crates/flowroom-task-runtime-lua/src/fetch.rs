//! The `fetch` binding.

use std::sync::Arc;

use flowroom_host_http::{FetchBody, FetchRequest, FetchResponse, HttpClient};
use mlua::{Function, Lua, Table, Value as LuaValue};

use crate::convert::{json_to_lua, lua_to_json};

/// Build the async `fetch(url [, options])` function.
pub(crate) fn create_fetch(lua: &Lua, http: Arc<HttpClient>) -> mlua::Result<Function> {
  lua.create_async_function(move |lua, (url, options): (String, Option<Table>)| {
    let http = http.clone();
    let request = build_request(url, options);
    async move {
      let request = request?;
      let response = http.fetch(request).await.map_err(mlua::Error::external)?;
      response_table(&lua, response)
    }
  })
}

fn build_request(url: String, options: Option<Table>) -> mlua::Result<FetchRequest> {
  let mut request = FetchRequest::get(url);
  let Some(options) = options else {
    return Ok(request);
  };

  if let Some(method) = options.get::<Option<String>>("method")? {
    request.method = method;
  }

  if let Some(headers) = options.get::<Option<Table>>("headers")? {
    for pair in headers.pairs::<String, String>() {
      request.headers.push(pair?);
    }
  }

  request.body = match options.get::<LuaValue>("body")? {
    LuaValue::Nil => None,
    LuaValue::String(s) => Some(FetchBody::Text(s.to_string_lossy().to_string())),
    table @ LuaValue::Table(_) => {
      let json = lua_to_json(&table).map_err(|e| mlua::Error::RuntimeError(e.message))?;
      json.map(FetchBody::Json)
    }
    other => {
      return Err(mlua::Error::RuntimeError(format!(
        "fetch body must be a string or a table, got {}",
        other.type_name()
      )));
    }
  };

  Ok(request)
}

fn response_table(lua: &Lua, response: FetchResponse) -> mlua::Result<Table> {
  let table = lua.create_table()?;
  table.set("status", response.status)?;
  table.set("ok", response.ok())?;

  let headers = lua.create_table()?;
  for (name, value) in &response.headers {
    headers.set(name.as_str(), value.as_str())?;
  }
  table.set("headers", headers)?;

  match response.json() {
    Some(json) => table.set("json", json_to_lua(lua, &json)?)?,
    None => table.set("json", LuaValue::Nil)?,
  }
  table.set("body", response.body)?;

  Ok(table)
}
