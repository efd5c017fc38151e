//! vigil-admin CLI tool
//!
//! Talks to a running vigil-node over its admin socket.
//!
//! Usage:
//!   vigil-admin ping
//!   vigil-admin sweep
//!   vigil-admin topics
//!   vigil-admin flagged
//!   vigil-admin accept <incident_id>
//!   vigil-admin reject <incident_id>
//!   vigil-admin delete <incident_id>

use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use vigil_node::admin_socket::{default_socket_path, AdminCommand};
use vigil_node::moderation::Verdict;

fn print_usage() {
    eprintln!("vigil-admin - Operate a Vigil node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  vigil-admin ping                  Check if the node is running");
    eprintln!("  vigil-admin sweep                 Remove orphaned votes, reports and comments");
    eprintln!("  vigil-admin topics                Show live connections per topic");
    eprintln!("  vigil-admin flagged               List incidents awaiting a verdict");
    eprintln!("  vigil-admin accept <incident_id>  Mark an incident verified false");
    eprintln!("  vigil-admin reject <incident_id>  Clear an incident's flag");
    eprintln!("  vigil-admin delete <incident_id>  Delete an incident and its dependents");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  VIGIL_SOCKET  Path to admin socket (default: $VIGIL_DATA_DIR/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("VIGIL_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_socket_path())
}

fn send_command(cmd: &AdminCommand) -> Result<Value, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to vigil-node at {:?}: {}\n\
             Is the vigil-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn incident_arg(args: &[String], command: &str) -> String {
    match args.get(2) {
        Some(id) => id.clone(),
        None => {
            eprintln!("Error: {} requires an incident_id argument", command);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "ping" => AdminCommand::Ping,
        "sweep" => AdminCommand::Sweep,
        "topics" => AdminCommand::Topics,
        "flagged" => AdminCommand::Flagged,
        "accept" => AdminCommand::Moderate {
            incident_id: incident_arg(&args, "accept"),
            verdict: Verdict::Accept,
        },
        "reject" => AdminCommand::Moderate {
            incident_id: incident_arg(&args, "reject"),
            verdict: Verdict::Reject,
        },
        "delete" => AdminCommand::DeleteIncident {
            incident_id: incident_arg(&args, "delete"),
        },
        "help" | "--help" | "-h" => {
            print_usage();
            return;
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    let response = match send_command(&cmd) {
        Ok(response) => response,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match response["status"].as_str() {
        Some("pong") => println!("pong"),
        Some("ok") => println!("{}", response["message"].as_str().unwrap_or_default()),
        Some("list") => {
            let items = response["items"].as_array().cloned().unwrap_or_default();
            if items.is_empty() {
                println!("(none)");
            }
            for item in items {
                println!("{}", item.as_str().unwrap_or_default());
            }
        }
        Some("swept") => {
            let report = &response["report"];
            println!(
                "scanned {} incident ids, removed {} votes, {} reports, {} comments",
                report["scanned"], report["votes"], report["reports"], report["comments"]
            );
        }
        Some("stats") => {
            let stats = &response["stats"];
            println!("connections: {}", stats["connections"]);
            if let Some(topics) = stats["topics"].as_object() {
                for (topic, members) in topics {
                    println!("  {:<48} {}", topic, members);
                }
            }
        }
        Some("moderated") => {
            let outcome = &response["outcome"];
            println!(
                "isFlagged={} verifiedFalse={}",
                outcome["isFlagged"], outcome["verifiedFalse"]
            );
        }
        Some("error") => {
            eprintln!("Error: {}", response["error"].as_str().unwrap_or_default());
            std::process::exit(1);
        }
        _ => {
            eprintln!("Unexpected response: {}", response);
            std::process::exit(1);
        }
    }
}
