use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;

use splitsync::api::{ApiClient, ApiResponse, ResponseOrigin, Session, SessionEvent};
use splitsync::config::Config;
use splitsync::connectivity::{ConnectivityMonitor, ProbeTarget};
use splitsync::offline::{ApiRequest, Mutation, OfflineManager, ReadRequest};
use splitsync::store::DurableStore;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Fetch a resource (served from cache while offline)
  Get {
    path: String,
    /// Query parameter as key=value, repeatable
    #[arg(short, long = "query", value_parser = parse_key_value)]
    query: Vec<(String, String)>,
  },
  /// Create a resource (queued while offline)
  Post {
    path: String,
    /// JSON request body
    #[arg(short, long)]
    body: Option<String>,
  },
  /// Update a resource (queued while offline)
  Put {
    path: String,
    /// JSON request body
    #[arg(short, long)]
    body: Option<String>,
  },
  /// Delete a resource (queued while offline)
  Delete { path: String },
  /// List mutations waiting to be replayed
  Queue,
  /// Replay queued mutations now
  Sync,
  /// Show connectivity, queue and session state
  Status,
  /// Store a bearer token
  Login {
    #[arg(long)]
    token: String,
  },
  /// Forget the bearer token
  Logout,
  /// Probe connectivity and replay automatically until interrupted
  Watch,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn parse_body(body: Option<&str>) -> Result<Value> {
  match body {
    Some(raw) => serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON body: {}", e)),
    None => Ok(Value::Null),
  }
}

pub async fn run<S: DurableStore + 'static>(
  store: Arc<S>,
  config: &Config,
  command: Command,
) -> Result<()> {
  let base_url = config.base_url()?;
  let probe = ProbeTarget::from_url(&base_url);

  let connectivity = ConnectivityMonitor::new(true);
  if let Some(target) = &probe {
    connectivity.set_online(target.probe().await);
  }

  let offline = Arc::new(OfflineManager::new(Arc::clone(&store), connectivity.clone()));
  let session = Arc::new(Session::new(store));
  if let Some(token) = Config::token_from_env() {
    session.login_ephemeral(&token);
  }
  let client = ApiClient::new(base_url, offline, session)?;

  match command {
    Command::Get { path, query } => {
      let read = query
        .into_iter()
        .fold(ReadRequest::new(path), |read, (k, v)| read.with_query(k, v));
      print_response(&client.send(ApiRequest::Read(read)).await?)?;
    }
    Command::Post { path, body } => {
      let body = parse_body(body.as_deref())?;
      print_response(&client.send(Mutation::post(path, body).into()).await?)?;
    }
    Command::Put { path, body } => {
      let body = parse_body(body.as_deref())?;
      print_response(&client.send(Mutation::put(path, body).into()).await?)?;
    }
    Command::Delete { path } => {
      print_response(&client.send(Mutation::delete(path).into()).await?)?;
    }
    Command::Queue => {
      let pending = client.offline().pending();
      if pending.is_empty() {
        println!("No queued mutations");
      }
      for item in pending {
        println!(
          "{}  {}  {} {}",
          item.id,
          item.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
          item.request.method(),
          item.request.path()
        );
      }
    }
    Command::Sync => match client.sync().await {
      Some(report) => println!(
        "Replayed {}, discarded {}, still queued {}",
        report.replayed, report.discarded, report.retained
      ),
      None if !connectivity.is_online() => println!("Offline, nothing replayed"),
      None => println!("Nothing to replay"),
    },
    Command::Status => {
      println!(
        "connectivity: {}",
        if connectivity.is_online() {
          "online"
        } else {
          "offline"
        }
      );
      println!("pending:      {}", client.offline().queue_size());
      println!(
        "session:      {}",
        if client.session().is_authenticated() {
          "logged in"
        } else {
          "logged out"
        }
      );
    }
    Command::Login { token } => {
      client.session().login(&token);
      println!("Token stored");
    }
    Command::Logout => {
      client.session().logout();
      println!("Logged out");
    }
    Command::Watch => watch(&client, &connectivity, probe, config).await?,
  }

  Ok(())
}

async fn watch<S: DurableStore + 'static>(
  client: &ApiClient<S>,
  connectivity: &ConnectivityMonitor,
  probe: Option<ProbeTarget>,
  config: &Config,
) -> Result<()> {
  let mut queue_rx = client.offline().subscribe_queue();
  let mut online_rx = connectivity.subscribe();
  let mut session_rx = client.session().subscribe();

  let probe_task = probe
    .map(|target| connectivity.spawn_probe(target, config.connectivity.probe_interval()));
  let sync_task = client.spawn_auto_sync();

  println!(
    "{}, {} pending. Press Ctrl-C to stop.",
    if connectivity.is_online() {
      "Online"
    } else {
      "Offline"
    },
    client.offline().queue_size()
  );
  client.sync().await;

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => break,
      Ok(()) = queue_rx.changed() => {
        println!("pending: {}", *queue_rx.borrow_and_update());
      }
      Ok(()) = online_rx.changed() => {
        let online = *online_rx.borrow_and_update();
        println!("{}", if online { "online" } else { "offline" });
      }
      Ok(event) = session_rx.recv() => match event {
        SessionEvent::LoginRequired { location } => {
          println!("session expired, log in again ({})", location);
        }
        SessionEvent::LoggedOut => println!("logged out"),
      },
    }
  }

  sync_task.abort();
  if let Some(task) = probe_task {
    task.abort();
  }
  Ok(())
}

fn print_response(response: &ApiResponse) -> Result<()> {
  match response.origin {
    ResponseOrigin::Network => println!("{}", response.status),
    ResponseOrigin::Queued { item_id } => {
      println!("{} (queued as {}, will sync when online)", response.status, item_id)
    }
    ResponseOrigin::Cache { cached_at } => println!(
      "{} (offline, cached {})",
      response.status,
      cached_at.format("%Y-%m-%d %H:%M:%S")
    ),
  }

  if !response.body.is_null() {
    let pretty = serde_json::to_string_pretty(&response.body)
      .map_err(|e| eyre!("Failed to format response: {}", e))?;
    println!("{}", pretty);
  }
  Ok(())
}
