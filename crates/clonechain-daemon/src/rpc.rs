//! Line-delimited JSON query protocol: one request object per line in, one
//! response object per line out.

use clonechain_core::{ClonechainError, ClonechainService, Coordinate, MetadataProvider};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    VolumeCloneChain {
        volume_id: String,
    },
    SnapshotCloneChain {
        volume_id: String,
        snapshot_id: String,
    },
    CloneChain {
        location: String,
    },
    VolumeSnapshots {
        volume_id: String,
    },
    SnapshotChildren {
        volume_id: String,
        snapshot_id: String,
    },
    Ping,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("[CC3000] malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Service(#[from] ClonechainError),

    #[error("[CC3001] query worker failed: {0}")]
    Worker(String),
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Malformed(_) => "CC3000",
            RequestError::Service(err) => err.code(),
            RequestError::Worker(_) => "CC3001",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(err: &RequestError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(ErrorBody {
                code: err.code(),
                message: err.to_string(),
            }),
        }
    }
}

impl From<Result<Value, RequestError>> for Response {
    fn from(outcome: Result<Value, RequestError>) -> Self {
        match outcome {
            Ok(value) => Response::success(value),
            Err(err) => Response::failure(&err),
        }
    }
}

/// Run one request against the service. Blocks on backend calls.
pub fn dispatch<P: MetadataProvider>(
    service: &ClonechainService<P>,
    request: Request,
) -> Result<Value, RequestError> {
    let value = match request {
        Request::VolumeCloneChain { volume_id } => {
            serde_json::to_value(service.volume_clone_chain(&volume_id)?)?
        }
        Request::SnapshotCloneChain {
            volume_id,
            snapshot_id,
        } => serde_json::to_value(service.snapshot_clone_chain(&volume_id, &snapshot_id)?)?,
        Request::CloneChain { location } => {
            let location: Coordinate = location.parse()?;
            serde_json::to_value(service.clone_chain(&location)?)?
        }
        Request::VolumeSnapshots { volume_id } => {
            serde_json::to_value(service.volume_snapshots(&volume_id)?)?
        }
        Request::SnapshotChildren {
            volume_id,
            snapshot_id,
        } => serde_json::to_value(service.snapshot_children(&volume_id, &snapshot_id)?)?,
        Request::Ping => json!("pong"),
    };
    Ok(value)
}

/// Parse and run one request line.
pub fn handle_line<P: MetadataProvider>(service: &ClonechainService<P>, line: &str) -> Response {
    let outcome = serde_json::from_str::<Request>(line)
        .map_err(RequestError::from)
        .and_then(|request| {
            debug!("request: {request:?}");
            dispatch(service, request)
        });
    if let Err(err) = &outcome {
        warn!("request failed: {err}");
    }
    outcome.into()
}

/// Accept connections until the listener fails.
pub async fn serve<P>(listener: TcpListener, service: Arc<ClonechainService<P>>) -> anyhow::Result<()>
where
    P: MetadataProvider + Send + Sync + 'static,
{
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("connection from {peer}");
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, service).await {
                warn!("connection {peer} closed with error: {err}");
            }
        });
    }
}

async fn handle_connection<P>(
    stream: TcpStream,
    service: Arc<ClonechainService<P>>,
) -> std::io::Result<()>
where
    P: MetadataProvider + Send + Sync + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let service = service.clone();
        let response = tokio::task::spawn_blocking(move || handle_line(&service, &line))
            .await
            .unwrap_or_else(|err| Response::failure(&RequestError::Worker(err.to_string())));

        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }
    info!("client disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clonechain_core::{
        ClonechainConfig, ClonechainResult, CloneListing, ConfigFormat, ImageRef,
    };

    /// volume-a@snapshot-s has one clone, volume-b. Everything else is missing.
    struct TinyProvider;

    impl MetadataProvider for TinyProvider {
        fn list_snapshots(&self, pool: &str, image: &str) -> ClonechainResult<Vec<String>> {
            match image {
                "volume-a" => Ok(vec!["snapshot-s".into()]),
                "volume-b" => Ok(Vec::new()),
                _ => Err(missing(pool, image)),
            }
        }

        fn list_clones(
            &self,
            pool: &str,
            image: &str,
            snapshot: &str,
        ) -> ClonechainResult<CloneListing> {
            match (image, snapshot) {
                ("volume-a", "snapshot-s") => Ok(vec![Ok(ImageRef::new(pool, "volume-b"))]),
                _ => Err(missing(pool, image)),
            }
        }

        fn parent(&self, pool: &str, image: &str) -> ClonechainResult<Option<Coordinate>> {
            Ok((image == "volume-b").then(|| Coordinate::snapshot(pool, "volume-a", "snapshot-s")))
        }
    }

    fn missing(pool: &str, image: &str) -> ClonechainError {
        ClonechainError::ObjectNotFound {
            object: format!("{pool}/{image}"),
            reason: "No such file or directory".into(),
        }
    }

    fn service() -> ClonechainService<TinyProvider> {
        let cfg = ClonechainConfig::parse("[backend]\npool = \"volumes\"\n", ConfigFormat::Toml)
            .unwrap();
        ClonechainService::new(Arc::new(cfg), TinyProvider)
    }

    fn reply(line: &str) -> Value {
        serde_json::to_value(handle_line(&service(), line)).unwrap()
    }

    #[test]
    fn requests_are_tagged_by_method() {
        let request: Request =
            serde_json::from_str(r#"{"method":"snapshot_children","volume_id":"a","snapshot_id":"s"}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::SnapshotChildren {
                volume_id: "a".into(),
                snapshot_id: "s".into()
            }
        );
        let ping: Request = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
        assert_eq!(ping, Request::Ping);
    }

    #[test]
    fn ping_answers_pong() {
        assert_eq!(reply(r#"{"method":"ping"}"#), json!({"ok": true, "result": "pong"}));
    }

    #[test]
    fn volume_chain_reply_carries_the_tree() {
        let value = reply(r#"{"method":"volume_clone_chain","volume_id":"b"}"#);
        assert_eq!(value["ok"], json!(true));
        let root = &value["result"];
        assert_eq!(root["location"]["volume_name"], json!("volume-a"));
        assert_eq!(root["children"][0]["usage"], json!("volume_snap"));
        assert_eq!(
            root["children"][0]["children"][0]["location"],
            json!({"pool_name": "volumes", "volume_name": "volume-b"})
        );
    }

    #[test]
    fn clone_chain_accepts_raw_locations() {
        let value = reply(r#"{"method":"clone_chain","location":"volumes/volume-a@snapshot-s"}"#);
        assert_eq!(value["result"]["type"], json!("volume"));

        let value = reply(r#"{"method":"clone_chain","location":"volume-a"}"#);
        assert_eq!(value["ok"], json!(false));
        assert_eq!(value["error"]["code"], json!("CC1201"));
    }

    #[test]
    fn missing_volume_reports_not_found_code() {
        let value = reply(r#"{"method":"volume_clone_chain","volume_id":"zz"}"#);
        assert_eq!(value["ok"], json!(false));
        assert_eq!(value["error"]["code"], json!("CC1200"));
        assert!(value.get("result").is_none());
    }

    #[test]
    fn garbage_lines_are_malformed_requests() {
        let value = reply("not json");
        assert_eq!(value["error"]["code"], json!("CC3000"));
        let value = reply(r#"{"method":"drop_everything"}"#);
        assert_eq!(value["error"]["code"], json!("CC3000"));
    }

    #[tokio::test]
    async fn serves_one_response_per_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::new(service())));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"method\":\"ping\"}\n\n{\"method\":\"volume_snapshots\",\"volume_id\":\"a\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(reader).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first, json!({"ok": true, "result": "pong"}));
        assert_eq!(
            second,
            json!({"ok": true, "result": [{"type": "volume_snap", "uuid": "s"}]})
        );
    }
}
