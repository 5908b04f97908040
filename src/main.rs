//! CLI entry point for falcon-uber: call any Falcon API operation by name.
//!
//! Authenticates with OAuth2 client credentials, dispatches one operation
//! and prints the `{status_code, headers, body}` result as JSON.
//!
//! Exit codes:
//! - 0: the API answered with a 2xx status
//! - 1: any other result (API error, auth failure, network failure)
//! - 2: argument validation error (clap handles this automatically)

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use falcon_uber::client::FalconClient;
use falcon_uber::config::{ClientConfig, confirm_base_url};
use falcon_uber::credentials::Credentials;
use falcon_uber::registry::EndpointRegistry;
use falcon_uber::request::CallArguments;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Operation ID to call (e.g. `QueryDevicesByFilter`).
    operation: Option<String>,

    /// API client ID.
    #[arg(long, env = "FALCON_CLIENT_ID")]
    client_id: Option<String>,

    /// API client secret. Prefer setting via the FALCON_CLIENT_SECRET
    /// environment variable to keep it out of process listings and shell
    /// history.
    #[arg(long, env = "FALCON_CLIENT_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Base URL or region name (`us1`, `us-2`, `eu-1`, `usgov1`, `usgov2`).
    #[arg(long, env = "FALCON_BASE_URL")]
    base_url: Option<String>,

    /// MSSP child CID to act on behalf of.
    #[arg(long, env = "FALCON_MEMBER_CID")]
    member_cid: Option<String>,

    /// TOML configuration file (timeouts, proxy, TLS, renew window).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Call an unregistered route instead of OPERATION.
    #[arg(long = "override", value_name = "METHOD,/path")]
    route_override: Option<String>,

    /// Comma-separated IDs.
    #[arg(long, value_delimiter = ',')]
    ids: Vec<String>,

    /// Query parameter; repeat the flag for several, or for the same key.
    #[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    query: Vec<(String, String)>,

    /// JSON request body.
    #[arg(long, value_parser = parse_json)]
    body: Option<Value>,

    #[arg(long)]
    partition: Option<String>,

    #[arg(long)]
    distinct_field: Option<String>,

    #[arg(long)]
    image_id: Option<String>,

    #[arg(long)]
    action_name: Option<String>,

    /// List registered operations whose name contains FRAGMENT, then exit.
    #[arg(long, value_name = "FRAGMENT", num_args = 0..=1, default_missing_value = "")]
    list_operations: Option<String>,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn parse_json(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON body: {e}"))
}

impl Cli {
    /// Folds the flags into call arguments. Repeated query keys become arrays.
    fn call_arguments(&self) -> CallArguments {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (key, value) in &self.query {
            grouped.entry(key.as_str()).or_default().push(value.as_str());
        }

        let mut args = CallArguments::new().ids(self.ids.iter().cloned());
        for (key, mut values) in grouped {
            args = match values.len() {
                1 => args.query(key, values.remove(0)),
                _ => args.query(key, values),
            };
        }
        if let Some(body) = &self.body {
            args = args.body(body.clone());
        }
        if let Some(partition) = &self.partition {
            args = args.partition(partition);
        }
        if let Some(field) = &self.distinct_field {
            args = args.distinct_field(field.clone());
        }
        if let Some(image_id) = &self.image_id {
            args = args.image_id(image_id.clone());
        }
        if let Some(action_name) = &self.action_name {
            args = args.action_name(action_name.clone());
        }
        args
    }

    fn client_config(&self) -> falcon_uber::error::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_toml_file(path)?,
            None => ClientConfig::default(),
        };
        if let Some(base_url) = &self.base_url {
            config.base_url = confirm_base_url(base_url);
        }
        Ok(config)
    }
}

fn list_operations(fragment: &str) -> ExitCode {
    let registry = match EndpointRegistry::bundled() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    for op in registry.search(fragment) {
        println!("{:<48} {:<6} {}", op.name, op.method, op.path_template);
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Some(fragment) = &cli.list_operations {
        return list_operations(fragment);
    }

    // Semantic checks clap cannot express: an operation (or override) and
    // both credentials are needed to dispatch anything.
    if cli.operation.is_none() && cli.route_override.is_none() {
        eprintln!("Error: an OPERATION or --override is required");
        return ExitCode::FAILURE;
    }
    let (Some(client_id), Some(secret)) = (&cli.client_id, &cli.secret) else {
        eprintln!("Error: --client-id and --secret (or FALCON_CLIENT_ID / FALCON_CLIENT_SECRET) are required");
        return ExitCode::FAILURE;
    };

    let config = match cli.client_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut credentials = Credentials::new(client_id.clone(), secret.clone());
    if let Some(cid) = &cli.member_cid {
        credentials = credentials.with_member_cid(cid.clone());
    }
    let falcon = match FalconClient::new(credentials, &config) {
        Ok(falcon) => falcon,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let args = cli.call_arguments();
    let result = match (&cli.route_override, &cli.operation) {
        (Some(route), _) => falcon.dispatch_override(route, args).await,
        (None, Some(operation)) => falcon.dispatch(operation, args).await,
        (None, None) => return ExitCode::FAILURE,
    };

    match serde_json::to_string_pretty(&result) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => {
            eprintln!("Error: could not render result: {e}");
            return ExitCode::FAILURE;
        }
    }

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Credentials plus an operation: the smallest invocation that dispatches.
    fn base_args() -> Vec<&'static str> {
        vec![
            "falcon-uber",
            "--client-id",
            "cid-789",
            "--secret",
            "s3cret",
            "QueryDevicesByFilter",
        ]
    }

    #[test]
    fn minimal_invocation_parses() {
        let cli = Cli::try_parse_from(base_args()).expect("should parse credentials + operation");
        assert_eq!(cli.operation.as_deref(), Some("QueryDevicesByFilter"));
        assert_eq!(cli.client_id.as_deref(), Some("cid-789"));
        assert_eq!(cli.secret.as_deref(), Some("s3cret"));
        assert!(cli.list_operations.is_none());
    }

    #[test]
    fn repeated_query_keys_become_arrays() {
        let mut args = base_args();
        args.extend_from_slice(&[
            "--query", "limit=1",
            "--query", "sort=hostname.asc",
            "--query", "fields=a",
            "--query", "fields=b",
        ]);
        let cli = Cli::try_parse_from(args).unwrap();
        let call = cli.call_arguments();
        assert_eq!(call.query.get("limit"), Some(&Value::from("1")));
        assert_eq!(call.query.get("fields"), Some(&serde_json::json!(["a", "b"])));
        assert_eq!(call.query.len(), 3);
    }

    #[test]
    fn malformed_query_is_rejected() {
        let mut args = base_args();
        args.extend_from_slice(&["--query", "no-equals-sign"]);
        assert!(
            Cli::try_parse_from(args).is_err(),
            "a query without '=' must fail at parse time"
        );
    }

    #[test]
    fn ids_split_on_commas() {
        let mut args = base_args();
        args.extend_from_slice(&["--ids", "aid-1,aid-2,aid-3"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.call_arguments().ids, vec!["aid-1", "aid-2", "aid-3"]);
    }

    #[test]
    fn body_must_be_json() {
        let mut ok = base_args();
        ok.extend_from_slice(&["--body", r#"{"action_parameters":[]}"#]);
        let cli = Cli::try_parse_from(ok).unwrap();
        assert_eq!(cli.call_arguments().body, Some(serde_json::json!({"action_parameters": []})));

        let mut bad = base_args();
        bad.extend_from_slice(&["--body", "{oops"]);
        assert!(Cli::try_parse_from(bad).is_err());
    }

    #[test]
    fn override_and_partition_parse() {
        let args = vec![
            "falcon-uber",
            "--override",
            "POST,/sensors/entities/datafeed-actions/v1/{}",
            "--partition",
            "0",
            "--action-name",
            "refresh_active_stream_session",
        ];
        let cli = Cli::try_parse_from(args).expect("override needs no positional operation");
        assert!(cli.operation.is_none());
        assert_eq!(
            cli.route_override.as_deref(),
            Some("POST,/sensors/entities/datafeed-actions/v1/{}")
        );
        let call = cli.call_arguments();
        assert_eq!(call.partition.as_deref(), Some("0"));
        assert_eq!(call.action_name.as_deref(), Some("refresh_active_stream_session"));
    }

    #[test]
    fn list_operations_value_is_optional() {
        let cli = Cli::try_parse_from(["falcon-uber", "--list-operations"]).unwrap();
        assert_eq!(cli.list_operations.as_deref(), Some(""));

        let cli = Cli::try_parse_from(["falcon-uber", "--list-operations", "devices"]).unwrap();
        assert_eq!(cli.list_operations.as_deref(), Some("devices"));
    }

    #[test]
    fn base_url_flag_accepts_region_names() {
        let mut args = base_args();
        args.extend_from_slice(&["--base-url", "eu-1"]);
        let cli = Cli::try_parse_from(args).unwrap();
        let config = cli.client_config().unwrap();
        assert_eq!(config.base_url, "https://api.eu-1.crowdstrike.com");
    }
}
