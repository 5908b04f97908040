//! Call arguments and concrete request assembly.
//!
//! [`CallArguments`] is the single typed bundle every operation accepts. The
//! per-endpoint wrappers fill one in with the builder methods and forward it
//! to the dispatcher, which turns it into a [`TransportRequest`] against the
//! resolved [`Operation`].

use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::registry::{HttpMethod, Operation};
use crate::transport::{FileAttachment, RequestBody, TransportRequest};

/// Per-invocation arguments. Never retained after the call.
///
/// ```
/// use falcon_uber::request::CallArguments;
///
/// let args = CallArguments::new()
///     .query("filter", "platform_name:'Windows'")
///     .query("limit", 100)
///     .query("sort", "hostname.asc");
/// assert_eq!(args.query.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArguments {
    /// Identifier list. Fills the route's `{}` slot, becomes repeated `ids`
    /// query parameters, or (for `ids_in_body` operations) the body `ids`.
    pub ids: Vec<String>,
    /// Query parameters. Arrays repeat the key; nulls are dropped.
    pub query: BTreeMap<String, Value>,
    pub body: Option<Value>,
    /// URL-encoded form fields, or text parts when files are attached.
    pub form: Vec<(String, String)>,
    pub files: Vec<FileAttachment>,
    /// Header overrides applied after the bearer header.
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    /// Stream partition for routes such as `refreshActiveStreamSession`.
    pub partition: Option<String>,
    /// Field name for the `.../queries/{field}/...` distinct-value routes.
    pub distinct_field: Option<String>,
    /// Container image ID embedded in image-scoped routes.
    pub image_id: Option<String>,
    pub action_name: Option<String>,
    pub file_name: Option<String>,
}

impl CallArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn form(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((key.into(), value.into()));
        self
    }

    pub fn file(mut self, file: FileAttachment) -> Self {
        self.files.push(file);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn partition(mut self, partition: impl ToString) -> Self {
        self.partition = Some(partition.to_string());
        self
    }

    pub fn distinct_field(mut self, field: impl Into<String>) -> Self {
        self.distinct_field = Some(field.into());
        self
    }

    pub fn image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    pub fn action_name(mut self, action_name: impl Into<String>) -> Self {
        self.action_name = Some(action_name.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Fills the first `{}` that is a path segment. Slots preceded by `ids=`
/// belong to the identifier list and are skipped.
fn fill_path_slot(route: &mut String, value: &str) {
    let mut from = 0;
    while let Some(offset) = route[from..].find("{}") {
        let at = from + offset;
        if !route[..at].ends_with("ids=") {
            route.replace_range(at..at + 2, value);
            return;
        }
        from = at + 2;
    }
}

/// Assembles the HTTP request for `operation`.
///
/// `base_url` must not end with `/`; routes always start with one.
pub(crate) fn build_request(
    base_url: &str,
    operation: &Operation,
    args: CallArguments,
    token: &str,
) -> TransportRequest {
    let ids_in_body = operation.ids_in_body && !args.ids.is_empty();
    let mut query = Vec::new();

    // ── Route expansion ──
    let mut route = operation.path_template.clone();
    if !args.ids.is_empty() && !ids_in_body {
        let joined = args.ids.join("&ids=");
        if route.contains("ids={}") {
            route = route.replacen("ids={}", &format!("ids={joined}"), 1);
        } else if route.contains("{}") {
            route = route.replacen("{}", &joined, 1);
        } else {
            query.extend(args.ids.iter().map(|id| ("ids".to_string(), id.clone())));
        }
    }
    for value in [&args.partition, &args.distinct_field, &args.image_id].into_iter().flatten() {
        fill_path_slot(&mut route, value);
    }
    // A slot nobody filled is left empty rather than sent as literal braces.
    let route = route.replace("{}", "");

    for (key, value) in &args.query {
        push_query(&mut query, key, value);
    }
    for (key, value) in [("action_name", &args.action_name), ("file_name", &args.file_name)] {
        if let Some(value) = value {
            if !args.query.contains_key(key) {
                query.push((key.to_string(), value.clone()));
            }
        }
    }

    // ── Headers ──
    let mut headers = BTreeMap::new();
    set_header(&mut headers, "Authorization", format!("Bearer {token}"));
    for (name, value) in &args.headers {
        set_header(&mut headers, name, value.clone());
    }
    let multipart = !args.files.is_empty();
    if let Some(content_type) = &args.content_type {
        // reqwest must supply the boundary for multipart bodies.
        if !multipart {
            set_header(&mut headers, "Content-Type", content_type.clone());
        }
    }

    // ── Body ──
    let json_body = if ids_in_body {
        Some(merge_ids(args.body, &args.ids))
    } else {
        args.body
    };
    let body = if operation.method == HttpMethod::Get {
        RequestBody::Empty
    } else if multipart {
        RequestBody::Multipart {
            fields: args.form,
            files: args.files,
        }
    } else if !args.form.is_empty() {
        RequestBody::Form(args.form)
    } else if let Some(value) = json_body {
        RequestBody::Json(value)
    } else {
        RequestBody::Empty
    };

    TransportRequest {
        method: operation.method,
        url: format!("{base_url}{route}"),
        headers,
        query,
        body,
    }
}

/// Renders one query value. Strings are sent without quotes, arrays repeat
/// the key, nulls are dropped, anything else is sent as its JSON text.
fn push_query(out: &mut Vec<(String, String)>, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push((key.to_string(), s.clone())),
        Value::Array(items) => {
            for item in items {
                push_query(out, key, item);
            }
        }
        other => out.push((key.to_string(), other.to_string())),
    }
}

/// Inserts a header, replacing any existing entry whose name differs only
/// in case.
fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value);
}

/// Puts `ids` into the JSON body. An `ids` key the caller already set wins;
/// a non-object body is left untouched.
fn merge_ids(body: Option<Value>, ids: &[String]) -> Value {
    match body {
        None => json!({ "ids": ids }),
        Some(Value::Object(mut map)) => {
            map.entry("ids").or_insert_with(|| json!(ids));
            Value::Object(map)
        }
        Some(other) => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.crowdstrike.com";

    fn get(path: &str) -> Operation {
        Operation::new("Test", HttpMethod::Get, path)
    }

    fn post(path: &str) -> Operation {
        Operation::new("Test", HttpMethod::Post, path)
    }

    #[test]
    fn bearer_header_and_plain_route() {
        let req = build_request(BASE, &get("/devices/queries/devices/v1"), CallArguments::new(), "abc");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "https://api.crowdstrike.com/devices/queries/devices/v1");
        assert_eq!(req.headers.get("Authorization").map(String::as_str), Some("Bearer abc"));
        assert!(req.query.is_empty());
        assert_eq!(req.body, RequestBody::Empty);
    }

    #[test]
    fn ids_fill_slot_joined_as_repeated_ids() {
        let args = CallArguments::new().ids(["a1", "b2", "c3"]);
        let req = build_request(BASE, &get("/devices/entities/devices/v1?ids={}"), args, "t");
        assert_eq!(
            req.url,
            "https://api.crowdstrike.com/devices/entities/devices/v1?ids=a1&ids=b2&ids=c3"
        );
        assert!(req.query.is_empty());
    }

    #[test]
    fn ids_without_slot_become_query_parameters() {
        let args = CallArguments::new().id("a1").id("b2");
        let req = build_request(BASE, &get("/detects/entities/summaries/v1"), args, "t");
        assert_eq!(
            req.query,
            vec![("ids".to_string(), "a1".to_string()), ("ids".to_string(), "b2".to_string())]
        );
    }

    #[test]
    fn unfilled_slot_is_left_empty() {
        let req = build_request(BASE, &get("/devices/entities/devices/v1?ids={}"), CallArguments::new(), "t");
        assert_eq!(req.url, "https://api.crowdstrike.com/devices/entities/devices/v1?ids=");
    }

    #[test]
    fn partition_fills_slot_and_action_name_is_a_query_parameter() {
        let args = CallArguments::new().partition(0).action_name("refresh_active_stream_session");
        let req = build_request(BASE, &post("/sensors/entities/datafeed-actions/v1/{}"), args, "t");
        assert_eq!(req.url, "https://api.crowdstrike.com/sensors/entities/datafeed-actions/v1/0");
        assert_eq!(
            req.query,
            vec![("action_name".to_string(), "refresh_active_stream_session".to_string())]
        );
    }

    #[test]
    fn partition_never_lands_in_an_ids_slot() {
        let args = CallArguments::new().partition(0);
        let req = build_request(BASE, &get("/devices/entities/devices/v1?ids={}"), args, "t");
        assert_eq!(req.url, "https://api.crowdstrike.com/devices/entities/devices/v1?ids=");
    }

    #[test]
    fn distinct_field_and_image_id_fill_path_slots() {
        let args = CallArguments::new().distinct_field("platform_name");
        let req = build_request(BASE, &get("/fwmgr/queries/events/{}/v1"), args, "t");
        assert_eq!(req.url, "https://api.crowdstrike.com/fwmgr/queries/events/platform_name/v1");

        let args = CallArguments::new().image_id("img-9").id("a1");
        let req = build_request(BASE, &get("/images/{}/detections?ids={}"), args, "t");
        assert_eq!(req.url, "https://api.crowdstrike.com/images/img-9/detections?ids=a1");
    }

    #[test]
    fn query_values_render_without_quotes() {
        let args = CallArguments::new()
            .query("limit", 1)
            .query("filter", "hostname:'web-01'")
            .query("sort", Value::Null)
            .query("fields", json!(["a", "b"]))
            .query("details", true);
        let req = build_request(BASE, &get("/x/v1"), args, "t");
        assert_eq!(
            req.query,
            vec![
                ("details".to_string(), "true".to_string()),
                ("fields".to_string(), "a".to_string()),
                ("fields".to_string(), "b".to_string()),
                ("filter".to_string(), "hostname:'web-01'".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn explicit_query_action_name_is_not_duplicated() {
        let args = CallArguments::new().query("action_name", "contain").action_name("lift_containment");
        let req = build_request(BASE, &post("/x/v1"), args, "t");
        assert_eq!(req.query, vec![("action_name".to_string(), "contain".to_string())]);
    }

    #[test]
    fn overrides_replace_headers_case_insensitively() {
        let args = CallArguments::new()
            .header("authorization", "Bearer other")
            .header("X-Custom", "1")
            .content_type("application/json");
        let req = build_request(BASE, &post("/x/v1"), args, "t");
        assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Bearer other"));
        assert!(!req.headers.contains_key("Authorization"));
        assert_eq!(req.headers.get("X-Custom").map(String::as_str), Some("1"));
        assert_eq!(req.headers.get("Content-Type").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn get_never_carries_a_body() {
        let args = CallArguments::new().body(json!({"a": 1})).form("k", "v");
        let req = build_request(BASE, &get("/x/v1"), args, "t");
        assert_eq!(req.body, RequestBody::Empty);
    }

    #[test]
    fn body_selection_prefers_files_then_form_then_json() {
        let file = FileAttachment::new("a.bin", vec![1u8], "application/octet-stream");
        let args = CallArguments::new()
            .body(json!({"ignored": true}))
            .form("comment", "hi")
            .file(file.clone())
            .content_type("multipart/form-data");
        let req = build_request(BASE, &post("/samples/entities/samples/v2"), args, "t");
        assert_eq!(
            req.body,
            RequestBody::Multipart {
                fields: vec![("comment".to_string(), "hi".to_string())],
                files: vec![file],
            }
        );
        assert!(!req.headers.contains_key("Content-Type"));

        let form = build_request(BASE, &post("/x/v1"), CallArguments::new().form("k", "v"), "t");
        assert_eq!(form.body, RequestBody::Form(vec![("k".to_string(), "v".to_string())]));

        let json = build_request(BASE, &post("/x/v1"), CallArguments::new().body(json!([1])), "t");
        assert_eq!(json.body, RequestBody::Json(json!([1])));
    }

    #[test]
    fn ids_in_body_operations_merge_ids_into_json() {
        let mut op = post("/devices/entities/devices-actions/v2");
        op.ids_in_body = true;

        let bare = build_request(BASE, &op, CallArguments::new().ids(["a", "b"]), "t");
        assert_eq!(bare.body, RequestBody::Json(json!({"ids": ["a", "b"]})));
        assert!(bare.query.is_empty());

        let merged = build_request(
            BASE,
            &op,
            CallArguments::new().ids(["a"]).body(json!({"action_parameters": []})),
            "t",
        );
        assert_eq!(
            merged.body,
            RequestBody::Json(json!({"action_parameters": [], "ids": ["a"]}))
        );

        let explicit = build_request(
            BASE,
            &op,
            CallArguments::new().ids(["a"]).body(json!({"ids": ["z"]})),
            "t",
        );
        assert_eq!(explicit.body, RequestBody::Json(json!({"ids": ["z"]})));
    }
}
