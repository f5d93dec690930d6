//! Firestore REST transport.
//!
//! Documents are exchanged as plain JSON inside the crate; this module
//! converts to and from Firestore's typed `Value` encoding at the boundary.
//! Native `timestampValue` fields come back as RFC 3339 strings, so callers
//! only ever see one timestamp representation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::DocumentStore;
use crate::errors::SyncError;

const API_ROOT: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: u32 = 300;

/// Connection descriptor as pasted in the admin settings (Firebase web config)
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseDescriptor {
    pub api_key: String,
    pub project_id: String,
    #[serde(default)]
    pub auth_domain: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

impl FirebaseDescriptor {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let descriptor: FirebaseDescriptor =
            serde_json::from_str(raw).map_err(|e| SyncError::InvalidDescriptor(e.to_string()))?;
        if descriptor.api_key.trim().is_empty() {
            return Err(SyncError::InvalidDescriptor("apiKey is empty".to_string()));
        }
        if descriptor.project_id.trim().is_empty() {
            return Err(SyncError::InvalidDescriptor("projectId is empty".to_string()));
        }
        Ok(descriptor)
    }
}

/// Encode plain JSON as a Firestore `Value`
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // integers travel as strings to keep 64-bit precision
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(map: &Map<String, Value>) -> Value {
    let fields: Map<String, Value> = map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect();
    Value::Object(fields)
}

/// Decode a Firestore `Value` into plain JSON
pub fn decode_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    if let Some(s) = obj.get("stringValue") {
        return s.clone();
    }
    if let Some(b) = obj.get("booleanValue") {
        return b.clone();
    }
    if let Some(i) = obj.get("integerValue") {
        return match i {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        };
    }
    if let Some(d) = obj.get("doubleValue") {
        return d.clone();
    }
    if let Some(ts) = obj.get("timestampValue") {
        return ts.clone();
    }
    if let Some(r) = obj.get("referenceValue") {
        return r.clone();
    }
    if let Some(geo) = obj.get("geoPointValue") {
        return geo.clone();
    }
    if let Some(arr) = obj.get("arrayValue") {
        let values = arr
            .get("values")
            .and_then(Value::as_array)
            .map(|vals| vals.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(map) = obj.get("mapValue") {
        return decode_fields(map.get("fields").unwrap_or(&Value::Null));
    }
    Value::Null
}

pub fn decode_fields(fields: &Value) -> Value {
    let decoded: Map<String, Value> = fields
        .as_object()
        .map(|f| f.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect())
        .unwrap_or_default();
    Value::Object(decoded)
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(default)]
    fields: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FirestoreRest {
    descriptor: FirebaseDescriptor,
    client: reqwest::Client,
}

impl FirestoreRest {
    pub fn new(descriptor: FirebaseDescriptor) -> Self {
        #[cfg(not(target_arch = "wasm32"))]
        let client = reqwest::Client::builder()
            .user_agent(concat!("streamgenius/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        // the browser owns the User-Agent header
        #[cfg(target_arch = "wasm32")]
        let client = reqwest::Client::new();
        Self { descriptor, client }
    }

    pub fn descriptor(&self) -> &FirebaseDescriptor {
        &self.descriptor
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/(default)", self.descriptor.project_id)
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/documents/{}/{}", self.database_path(), collection, id)
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", API_ROOT, self.document_name(collection, id))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::ServerError(status.as_u16(), body))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl DocumentStore for FirestoreRest {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, SyncError> {
        let response = self
            .client
            .get(self.document_url(collection, id))
            .query(&[("key", self.descriptor.api_key.as_str())])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Document = Self::check(response).await?.json().await?;
        Ok(Some(decode_fields(&doc.fields)))
    }

    async fn set_document(&self, collection: &str, id: &str, data: &Value) -> Result<(), SyncError> {
        let map = data
            .as_object()
            .ok_or_else(|| SyncError::Decode("document body must be an object".to_string()))?;
        let response = self
            .client
            .patch(self.document_url(collection, id))
            .query(&[("key", self.descriptor.api_key.as_str())])
            .json(&json!({ "fields": encode_fields(map) }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/{}/documents/{}", API_ROOT, self.database_path(), collection);
        let page_size = PAGE_SIZE.to_string();
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[("key", self.descriptor.api_key.as_str()), ("pageSize", page_size.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: ListResponse = Self::check(request.send().await?).await?.json().await?;
            documents.extend(page.documents.iter().map(|d| decode_fields(&d.fields)));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(documents)
    }

    async fn batch_set(&self, collection: &str, docs: &[(String, Value)]) -> Result<(), SyncError> {
        let writes: Vec<Value> = docs
            .iter()
            .filter_map(|(id, data)| {
                let map = data.as_object()?;
                Some(json!({
                    "update": {
                        "name": self.document_name(collection, id),
                        "fields": encode_fields(map),
                    }
                }))
            })
            .collect();
        let url = format!("{}/{}/documents:commit", API_ROOT, self.database_path());
        let response = self
            .client
            .post(url)
            .query(&[("key", self.descriptor.api_key.as_str())])
            .json(&json!({ "writes": writes }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
