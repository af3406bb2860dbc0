//! DNAnexus API implementation of [`StoragePlatform`].
//!
//! Every route is a `POST <api_url>/<route>` with a JSON body and a bearer
//! token. Error responses carry `{"error": {"type": …, "message": …}}`.
//! File uploads are single-part: `file/new` → `<file>/upload` → `PUT` →
//! `<file>/close`.

use std::path::Path;
use std::time::Duration;

use md5::{Digest, Md5};
use serde_json::{json, Value};

use runstream_core::types::SENTINEL_TYPE;
use runstream_core::{FileId, Properties, RecordId, SentinelState};

use crate::error::{io_err, PlatformError};
use crate::storage::{JobRequest, SentinelHandle, StoragePlatform};

pub const DEFAULT_API_URL: &str = "https://api.dnanexus.com";

/// Blocking DNAnexus API client.
pub struct DxPlatform {
    agent: ureq::Agent,
    api_url: String,
    token: String,
}

impl DxPlatform {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();
        Self {
            agent,
            api_url: api_url.into(),
            token: token.into(),
        }
    }

    fn call(&self, route: &str, body: Value) -> Result<Value, PlatformError> {
        let url = format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        );
        tracing::debug!(route, "platform call");
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_json(body);
        match response {
            Ok(resp) => {
                let text = resp.into_string().map_err(|e| PlatformError::Transport {
                    route: route.to_string(),
                    message: e.to_string(),
                })?;
                decode_body(&text)
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_json::<Value>().unwrap_or(Value::Null);
                Err(api_error(status, &body))
            }
            Err(ureq::Error::Transport(t)) => Err(PlatformError::Transport {
                route: route.to_string(),
                message: t.to_string(),
            }),
        }
    }

    fn find_one(
        &self,
        class: &str,
        project: &str,
        folder: &str,
        name: &str,
        typename: Option<&str>,
    ) -> Result<Option<Value>, PlatformError> {
        let mut query = json!({
            "class": class,
            "name": name,
            "scope": { "project": project, "folder": folder, "recurse": false },
            "describe": { "fields": { "state": true, "properties": true } },
            "limit": 2,
        });
        if let Some(typename) = typename {
            query["typename"] = json!(typename);
        }
        let response = self.call("system/findDataObjects", query)?;
        unique_result(&response, folder, name)
    }
}

/// At most one search hit. Several objects with the same name in one folder
/// is an error, never a silent pick.
fn unique_result(response: &Value, folder: &str, name: &str) -> Result<Option<Value>, PlatformError> {
    const ROUTE: &str = "system/findDataObjects";
    let results = response["results"]
        .as_array()
        .ok_or_else(|| unexpected(ROUTE, "missing results array"))?;
    match results.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(only.clone())),
        _ => Err(unexpected(
            ROUTE,
            &format!("more than one object matched {name} in {folder}"),
        )),
    }
}

fn decode_body(text: &str) -> Result<Value, PlatformError> {
    Ok(serde_json::from_str(text)?)
}

impl StoragePlatform for DxPlatform {
    fn describe_project(&self, project: &str) -> Result<(), PlatformError> {
        self.call(&format!("{project}/describe"), json!({}))?;
        Ok(())
    }

    fn executable_title(&self, executable_id: &str) -> Result<String, PlatformError> {
        let route = format!("{executable_id}/describe");
        let desc = self.call(&route, json!({}))?;
        desc["title"]
            .as_str()
            .filter(|t| !t.is_empty())
            .or_else(|| desc["name"].as_str())
            .map(str::to_string)
            .ok_or_else(|| unexpected(&route, "executable has neither title nor name"))
    }

    fn find_sentinel(
        &self,
        project: &str,
        folder: &str,
        name: &str,
    ) -> Result<Option<SentinelHandle>, PlatformError> {
        self.find_one("record", project, folder, name, Some(SENTINEL_TYPE))?
            .map(|found| sentinel_from_result(&found))
            .transpose()
    }

    fn create_sentinel(
        &self,
        project: &str,
        folder: &str,
        name: &str,
        properties: &Properties,
    ) -> Result<SentinelHandle, PlatformError> {
        let response = self.call(
            "record/new",
            json!({
                "project": project,
                "folder": folder,
                "parents": true,
                "name": name,
                "types": [SENTINEL_TYPE],
                "properties": properties,
            }),
        )?;
        Ok(SentinelHandle {
            id: RecordId(id_field(&response, "record/new")?),
            state: SentinelState::Open,
            properties: properties.clone(),
        })
    }

    fn find_file(
        &self,
        project: &str,
        folder: &str,
        name: &str,
    ) -> Result<Option<FileId>, PlatformError> {
        self.find_one("file", project, folder, name, None)?
            .map(|found| id_field(&found, "system/findDataObjects").map(FileId))
            .transpose()
    }

    fn upload_file(
        &self,
        project: &str,
        folder: &str,
        local: &Path,
        properties: &Properties,
    ) -> Result<FileId, PlatformError> {
        let data = std::fs::read(local).map_err(|e| io_err(local, e))?;
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io_err(local, std::io::Error::other("path has no file name")))?;

        let created = self.call(
            "file/new",
            json!({
                "project": project,
                "folder": folder,
                "parents": true,
                "name": name,
                "properties": properties,
            }),
        )?;
        let file_id = id_field(&created, "file/new")?;

        let upload_route = format!("{file_id}/upload");
        let target = self.call(
            &upload_route,
            json!({ "index": 1, "size": data.len(), "md5": hex::encode(Md5::digest(&data)) }),
        )?;
        let url = target["url"]
            .as_str()
            .ok_or_else(|| unexpected(&upload_route, "missing upload url"))?;
        let mut put = self.agent.put(url);
        if let Some(headers) = target["headers"].as_object() {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    put = put.set(key, value);
                }
            }
        }
        match put.send_bytes(&data) {
            Ok(_) => {}
            Err(ureq::Error::Status(status, resp)) => {
                return Err(PlatformError::Api {
                    status,
                    kind: "UploadFailed".to_string(),
                    message: resp.into_string().unwrap_or_default(),
                });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(PlatformError::Transport {
                    route: upload_route,
                    message: t.to_string(),
                });
            }
        }

        self.call(&format!("{file_id}/close"), json!({}))?;
        Ok(FileId(file_id))
    }

    fn set_file_properties(
        &self,
        project: &str,
        file: &FileId,
        properties: &Properties,
    ) -> Result<(), PlatformError> {
        self.call(
            &format!("{file}/setProperties"),
            json!({ "project": project, "properties": properties }),
        )?;
        Ok(())
    }

    fn set_sentinel_details(
        &self,
        record: &RecordId,
        details: &Value,
    ) -> Result<(), PlatformError> {
        self.call(&format!("{record}/setDetails"), details.clone())?;
        Ok(())
    }

    fn close_sentinel(&self, record: &RecordId) -> Result<(), PlatformError> {
        self.call(&format!("{record}/close"), json!({}))?;
        Ok(())
    }

    fn create_folder(&self, project: &str, folder: &str) -> Result<(), PlatformError> {
        self.call(
            &format!("{project}/newFolder"),
            json!({ "folder": folder, "parents": true }),
        )?;
        Ok(())
    }

    fn run_chained_job(&self, request: &JobRequest) -> Result<String, PlatformError> {
        let Some(executable) = request.target.executable_id() else {
            return Err(unexpected("run", "no downstream executable configured"));
        };
        let route = format!("{executable}/run");
        let response = self.call(
            &route,
            json!({
                "input": request.input,
                "project": request.project,
                "folder": request.folder,
                "name": request.name,
            }),
        )?;
        id_field(&response, &route)
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn api_error(status: u16, body: &Value) -> PlatformError {
    PlatformError::Api {
        status,
        kind: body["error"]["type"]
            .as_str()
            .unwrap_or("HTTPError")
            .to_string(),
        message: body["error"]["message"]
            .as_str()
            .unwrap_or("no error message returned")
            .to_string(),
    }
}

fn unexpected(route: &str, message: &str) -> PlatformError {
    PlatformError::UnexpectedResponse {
        route: route.to_string(),
        message: message.to_string(),
    }
}

fn id_field(value: &Value, route: &str) -> Result<String, PlatformError> {
    value["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| unexpected(route, "missing id"))
}

fn sentinel_from_result(found: &Value) -> Result<SentinelHandle, PlatformError> {
    let route = "system/findDataObjects";
    let id = id_field(found, route)?;
    let state = match found["describe"]["state"].as_str() {
        Some("closed") => SentinelState::Closed,
        Some(_) => SentinelState::Open,
        None => return Err(unexpected(route, "record description lacks state")),
    };
    let properties = found["describe"]["properties"]
        .as_object()
        .map(|props| {
            props
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Ok(SentinelHandle {
        id: RecordId(id),
        state,
        properties,
    })
}
