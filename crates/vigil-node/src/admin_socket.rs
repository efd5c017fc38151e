//! Unix socket server for admin commands.
//!
//! Local IPC for operators: health check, on-demand orphan sweep, broker
//! membership stats, the flagged queue, and moderation verdicts issued
//! without going through the HTTP auth front.

use crate::engine::Engine;
use crate::error::Result;
use crate::identity::Identity;
use crate::moderation::{ModerationOutcome, Verdict};
use crate::sweep::{sweep_orphans, SweepReport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use vigil_broker::BrokerStats;

/// Identity recorded for verdicts issued over the socket.
pub const ADMIN_IDENTITY: &str = "admin-socket";

/// Admin command sent over the socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Ping (health check)
    Ping,
    /// Run the orphan sweep now
    Sweep,
    /// Broker connections and topic membership
    Topics,
    /// Ids of incidents awaiting a verdict
    Flagged,
    /// Accept or reject the reports on an incident
    Moderate { incident_id: String, verdict: Verdict },
    /// Delete an incident and its dependents
    DeleteIncident { incident_id: String },
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    List { items: Vec<String> },
    Swept { report: SweepReport },
    Stats { stats: BrokerStats },
    Moderated { outcome: ModerationOutcome },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    engine: Engine,
    socket_path: PathBuf,
}

impl AdminSocket {
    pub fn new(engine: Engine, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            socket_path: socket_path.into(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove a stale socket file left by a previous run.
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, engine).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, engine: Engine) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &engine).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, engine: &Engine) -> AdminResponse {
    let admin = Identity::moderator(ADMIN_IDENTITY);
    match cmd {
        AdminCommand::Ping => AdminResponse::Pong,

        AdminCommand::Sweep => match sweep_orphans(engine).await {
            Ok(report) => AdminResponse::Swept { report },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Topics => AdminResponse::Stats {
            stats: engine.broker().stats(),
        },

        AdminCommand::Flagged => match engine.moderation.pending().await {
            Ok(incidents) => AdminResponse::List {
                items: incidents.into_iter().map(|i| i.id).collect(),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Moderate {
            incident_id,
            verdict,
        } => match engine.moderation.decide(&incident_id, verdict, &admin).await {
            Ok(outcome) => AdminResponse::Moderated { outcome },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::DeleteIncident { incident_id } => {
            match engine.incidents.delete_incident(&incident_id, &admin).await {
                Ok(cascade) => AdminResponse::Ok {
                    message: format!(
                        "Deleted incident {} ({} votes, {} reports, {} comments)",
                        incident_id, cascade.votes, cascade.reports, cascade.comments
                    ),
                },
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            }
        }
    }
}

/// Default socket path.
pub fn default_socket_path() -> PathBuf {
    let data_dir = std::env::var("VIGIL_DATA_DIR").unwrap_or_else(|_| "./vigil-data".to_string());
    PathBuf::from(data_dir).join("admin.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, seed_incident};
    use serde_json::Value;
    use std::time::Duration;
    use vigil_broker::Topic;

    async fn roundtrip(engine: &Engine, cmd: AdminCommand) -> Value {
        serde_json::to_value(execute_command(cmd, engine).await).unwrap()
    }

    #[tokio::test]
    async fn ping_topics_and_flagged() {
        let h = harness();
        assert_eq!(roundtrip(&h.engine, AdminCommand::Ping).await["status"], "pong");

        let sub = h.broker.connect();
        sub.join(Topic::Feed);
        let stats = roundtrip(&h.engine, AdminCommand::Topics).await;
        assert_eq!(stats["status"], "stats");
        assert_eq!(stats["stats"]["connections"], 1);
        assert_eq!(stats["stats"]["topics"]["feed"], 1);

        let incident = seed_incident(&h, "alice").await;
        h.engine
            .reports
            .file_report(&incident.id, &Identity::user("bob"), None)
            .await
            .unwrap();
        let flagged = roundtrip(&h.engine, AdminCommand::Flagged).await;
        assert_eq!(flagged["items"][0], incident.id.as_str());
    }

    #[tokio::test]
    async fn moderate_and_delete() {
        let h = harness();
        let incident = seed_incident(&h, "alice").await;

        let moderated = roundtrip(
            &h.engine,
            AdminCommand::Moderate {
                incident_id: incident.id.clone(),
                verdict: Verdict::Accept,
            },
        )
        .await;
        assert_eq!(moderated["status"], "moderated");
        assert_eq!(moderated["outcome"]["verifiedFalse"], true);

        let deleted = roundtrip(
            &h.engine,
            AdminCommand::DeleteIncident {
                incident_id: incident.id.clone(),
            },
        )
        .await;
        assert_eq!(deleted["status"], "ok");

        let missing = roundtrip(
            &h.engine,
            AdminCommand::DeleteIncident {
                incident_id: incident.id,
            },
        )
        .await;
        assert_eq!(missing["status"], "error");
    }

    #[test]
    fn command_wire_format() {
        let cmd: AdminCommand =
            serde_json::from_str(r#"{"cmd":"moderate","incident_id":"i1","verdict":"reject"}"#)
                .unwrap();
        assert!(matches!(
            cmd,
            AdminCommand::Moderate {
                verdict: Verdict::Reject,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn serves_line_json_over_unix_socket() {
        let h = harness();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let server = AdminSocket::new(h.engine.clone(), &path);
        let task = tokio::spawn(async move { server.run().await });

        let mut stream = None;
        for _ in 0..50 {
            match UnixStream::connect(&path).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        let stream = stream.expect("admin socket never came up");
        let (reader, mut writer) = stream.into_split();
        writer.write_all(b"{\"cmd\":\"ping\"}\nnonsense\n").await.unwrap();

        let mut lines = BufReader::new(reader).lines();
        let pong: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(pong["status"], "pong");
        let err: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(err["status"], "error");

        task.abort();
    }
}
