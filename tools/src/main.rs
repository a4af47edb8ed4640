//! ledger-runner: headless driver for the complaint ledger core.
//!
//! Usage:
//!   ledger-runner --data-dir ./data --db complaints.db
//!   ledger-runner --data-dir ./data --ipc-mode
//!
//! The signer key is read from LEDGER_SIGNER_KEY; without it the ledger is
//! read-only and every submission is mirrored with ledger status Failed.

use anyhow::Result;
use complaint_ledger_core::{
    classifier::IncrementalClassifier,
    config::AppConfig,
    engine::{ComplaintEngine, ComplaintSubmission},
    ledger::{rpc::JsonRpcTransport, LedgerClient},
    rng::ReferenceRng,
    store::MirrorStore,
};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

type Client = LedgerClient<JsonRpcTransport>;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Preview { text: String },
    Submit { submission: ComplaintSubmission },
    Track { reference_no: String, requester: String },
    History { requester: String },
    UpdateStatus { reference_no: String, status: String },
    Events { reference_no: String },
    Transaction { tx_hash: String },
    Import { rows: Vec<Vec<String>> },
    Status,
    Network,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let db = string_arg(&args, "--db")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{data_dir}/complaints.db"));
    let seed = string_arg(&args, "--seed").and_then(|s| s.parse::<u64>().ok());

    let config = AppConfig::load(data_dir)?;
    if !ipc_mode {
        println!("Complaint ledger runner");
        println!("  data_dir:  {data_dir}");
        println!("  db:        {db}");
        println!("  rpc:       {}", config.ledger.rpc_url);
        println!();
    }

    let store = MirrorStore::open(&db)?;
    store.migrate()?;

    let client = Arc::new(LedgerClient::from_config(
        config.ledger.clone(),
        config.signer_key.as_deref(),
    ));
    let classifier = IncrementalClassifier::load(&config.classifier, &config.department_names());
    let mut engine = ComplaintEngine::new(
        Box::new(Arc::clone(&client)),
        store,
        classifier,
        config.departments.clone(),
    );
    if let Some(seed) = seed {
        engine = engine.with_rng(ReferenceRng::from_seed(seed));
    }

    if ipc_mode {
        log::info!("IPC mode: mirror {db}, ledger available: {}", client.network_info().contract_bound);
        run_ipc_loop(&engine, &client)?;
    } else {
        print_summary(&engine, &client)?;
    }
    Ok(())
}

fn run_ipc_loop(engine: &ComplaintEngine, client: &Client) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(engine, client, cmd) {
            Ok(value) => value,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(
    engine: &ComplaintEngine,
    client: &Client,
    cmd: IpcCommand,
) -> Result<serde_json::Value> {
    let value = match cmd {
        IpcCommand::Preview { text } => serde_json::to_value(engine.preview(&text))?,
        IpcCommand::Submit { submission } => serde_json::to_value(engine.submit(&submission)?)?,
        IpcCommand::Track {
            reference_no,
            requester,
        } => serde_json::to_value(engine.track(&reference_no, &requester)?)?,
        IpcCommand::History { requester } => serde_json::to_value(engine.history(&requester)?)?,
        IpcCommand::UpdateStatus {
            reference_no,
            status,
        } => serde_json::to_value(engine.update_status(&reference_no, &status)?)?,
        IpcCommand::Events { reference_no } => {
            serde_json::to_value(engine.events_for(&reference_no)?)?
        }
        IpcCommand::Transaction { tx_hash } => {
            serde_json::to_value(client.transaction_details(&tx_hash))?
        }
        IpcCommand::Import { rows } => {
            let report = engine.with_store(|store| store.import_rows(&rows))?;
            serde_json::json!({
                "imported": report.imported,
                "upgraded": report.upgraded,
                "skipped": report.skipped,
            })
        }
        IpcCommand::Status => serde_json::to_value(engine.status()?)?,
        IpcCommand::Network => serde_json::to_value(client.network_info())?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

fn print_summary(engine: &ComplaintEngine, client: &Client) -> Result<()> {
    let network = client.network_info();
    let status = engine.status()?;

    println!("=== Ledger ===");
    println!("  network:          {}", network.network_name);
    println!("  connected:        {}", network.connected);
    println!("  contract bound:   {}", network.contract_bound);
    println!(
        "  contract:         {}",
        network.contract_address.as_deref().unwrap_or("none")
    );
    if let Some(block) = network.latest_block {
        println!("  latest block:     {block}");
    }
    match client.signer_address() {
        Some(addr) => println!("  signer:           {addr}"),
        None => println!("  signer:           none (read-only)"),
    }
    println!("  testnet:          {}", network.is_testnet);
    println!("  explorer:         {}", network.explorer_url);
    println!();
    println!("=== Mirror ===");
    println!("  complaints:       {}", status.mirrored_complaints);
    for (ledger_status, count) in &status.ledger_status_counts {
        println!("    {ledger_status:<14} {count}");
    }
    println!("  feedback pairs:   {}", status.feedback_pairs);
    println!();
    println!("=== Classifier ===");
    println!("  available:        {}", status.classifier_available);
    println!("  updates applied:  {}", status.classifier_updates);
    println!("  labels:           {}", engine.classifier().labels().join(", "));
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
