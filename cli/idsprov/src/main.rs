//! idsprov: provision app offers on an IDS connector, negotiate contracts
//! for them and publish their container images.

mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::provision::ProvisionOptions;
use config::ProvisionConfig;

#[derive(Parser)]
#[command(name = "idsprov", version, about = "IDS connector offer provisioning")]
struct Cli {
    /// Configuration file (default: idsprov.toml, searched upward)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Raise log verbosity to debug
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an idsprov.toml template
    Init {
        /// Use the local connector profile (localhost:8080)
        #[arg(long)]
        local: bool,
    },
    /// Create and link an app offer
    Provision {
        /// Answer requests from an in-memory connector
        #[arg(long)]
        dry_run: bool,
        /// Continue with independent steps after a failure
        #[arg(long)]
        keep_going: bool,
        /// Pull, tag and push the configured image for the new resource
        #[arg(long)]
        publish_image: bool,
        /// Post a simulated registry push event for the new resource
        #[arg(long)]
        simulate_event: bool,
        /// Fetch artifact metadata and store its data
        #[arg(long)]
        download: bool,
        /// Directory for downloaded data
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Provision an offer and negotiate a contract for its artifact
    Negotiate {
        /// Answer requests from an in-memory connector
        #[arg(long)]
        dry_run: bool,
        /// IDS data endpoint of the recipient connector
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Publish the configured image for an existing resource
    PublishImage {
        /// Resource id (the last segment of the resource handle)
        #[arg(long)]
        resource_id: String,
        /// Tag version (overrides [image].version)
        #[arg(long)]
        version: Option<String>,
        /// Log engine commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Post a simulated registry push event
    SimulateEvent {
        /// Resource id (the last segment of the resource handle)
        #[arg(long)]
        resource_id: String,
        /// Tag reported in the event (default: [image].version or "latest")
        #[arg(long)]
        tag: Option<String>,
        /// Answer the request from an in-memory connector
        #[arg(long)]
        dry_run: bool,
    },
    /// Show artifact metadata
    Artifact {
        /// Artifact handle (URI)
        handle: String,
        /// Also download the artifact data
        #[arg(long)]
        data: bool,
        /// Directory for downloaded data
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default = format!("idsprov={level},idsprov_connector={level},idsprov_registry={level}");
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Init { local } => commands::init::run(&cwd, local),

        Commands::Provision {
            dry_run,
            keep_going,
            publish_image,
            simulate_event,
            download,
            out,
        } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            let options = ProvisionOptions {
                dry_run,
                keep_going,
                publish_image,
                simulate_event,
                download,
                out_dir: out,
            };
            commands::provision::run(&config, &options)
        }

        Commands::Negotiate { dry_run, recipient } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::negotiate::run(&config, dry_run, recipient.as_deref())
        }

        Commands::PublishImage {
            resource_id,
            version,
            dry_run,
        } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::image::publish(&config, &resource_id, version.as_deref(), dry_run)
        }

        Commands::SimulateEvent {
            resource_id,
            tag,
            dry_run,
        } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::image::simulate_event(&config, &resource_id, tag.as_deref(), dry_run)
        }

        Commands::Artifact { handle, data, out } => {
            let config = load_config(cli.config.as_deref(), &cwd)?;
            commands::artifact::run(&config, &handle, data, &out)
        }
    }
}

/// Load the configuration named on the command line, or search upward for one.
fn load_config(explicit: Option<&Path>, cwd: &Path) -> anyhow::Result<ProvisionConfig> {
    if let Some(path) = explicit {
        return ProvisionConfig::load(path);
    }
    match ProvisionConfig::find_and_load(cwd)? {
        Some((config, dir)) => {
            tracing::debug!(dir = %dir.display(), "loaded configuration");
            Ok(config)
        }
        None => anyhow::bail!("no idsprov.toml found (run `idsprov init` first)"),
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use commands::image::DryRunEngine;
    use config::Profile;
    use idsprov_connector::EntityKind;

    fn dry_config(dir: &Path, profile: Profile) -> ProvisionConfig {
        let path = commands::init::write_config(dir, profile).unwrap();
        let mut config = load_config(Some(path.as_path()), dir).unwrap();
        config.connector.read_delay_secs = 0;
        config
    }

    /// Full remote flow: init → provision → publish → event → download.
    #[test]
    fn provision_publish_event_download() {
        let dir = tempfile::tempdir().unwrap();
        let config = dry_config(dir.path(), Profile::Remote);
        let (client, memory) = config.client(true);
        let memory = memory.unwrap();

        let options = ProvisionOptions {
            dry_run: true,
            publish_image: true,
            simulate_event: true,
            download: true,
            out_dir: dir.path().to_path_buf(),
            ..ProvisionOptions::default()
        };
        let summary =
            commands::provision::provision(&client, &DryRunEngine, &config, &options).unwrap();
        let graph = summary.graph.unwrap();

        // One of each entity, one endpoint.
        for kind in EntityKind::ALL {
            assert_eq!(memory.count(kind), 1, "{kind}");
        }
        assert_eq!(
            memory.children(graph.catalog.as_str(), EntityKind::Resource),
            vec![graph.resource.as_str().to_string()]
        );

        let publish = summary.publish.unwrap();
        assert_eq!(
            publish.reference.to_string(),
            format!("registry.example.org/ids-apps/{}:latest", graph.resource.id())
        );

        let events = memory.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0]["event_data"]["repository"]["name"],
            graph.resource.id()
        );

        let download = summary.download.unwrap();
        assert_eq!(
            download.path,
            dir.path().join(format!("{}.json", graph.artifact.id()))
        );
        assert!(download.path.is_file());
    }

    /// Local profile provisions the local example offer.
    #[test]
    fn local_profile_offer() {
        let dir = tempfile::tempdir().unwrap();
        let config = dry_config(dir.path(), Profile::Local);
        let (client, memory) = config.client(true);
        let memory = memory.unwrap();

        let summary = commands::provision::provision(
            &client,
            &DryRunEngine,
            &config,
            &ProvisionOptions::default(),
        )
        .unwrap();
        let graph = summary.graph.unwrap();
        let artifact = memory.entity(graph.artifact.as_str()).unwrap();
        assert_eq!(artifact["title"], "DataApp Template");
        let endpoint = memory.entity(graph.endpoints[0].as_str()).unwrap();
        assert_eq!(endpoint["port"], 5000);
    }

    /// Negotiation flow: provision → describe → extract policy → contract.
    #[test]
    fn negotiation_flow() {
        let dir = tempfile::tempdir().unwrap();
        let config = dry_config(dir.path(), Profile::Local);
        let (client, memory) = config.client(true);
        let memory = memory.unwrap();

        let outcome =
            commands::negotiate::negotiate(&client, &config, &config.recipient()).unwrap();
        assert_eq!(outcome.graph.endpoints.len(), 2);
        assert_eq!(outcome.policy["ids:target"], outcome.graph.artifact.as_str());
        assert_eq!(outcome.response.status, 200);
        let agreement = outcome.response.json().unwrap();
        assert_eq!(agreement["@type"], "ids:ContractAgreement");
        assert_eq!(memory.agreement_count(), 1);
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(None, dir.path()).unwrap_err();
        assert!(err.to_string().contains("no idsprov.toml found"));
    }

    #[test]
    fn cli_parses_provision_flags() {
        let cli = Cli::try_parse_from([
            "idsprov",
            "--config",
            "x.toml",
            "provision",
            "--dry-run",
            "--keep-going",
            "--download",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        match cli.command {
            Commands::Provision {
                dry_run,
                keep_going,
                download,
                publish_image,
                out,
                ..
            } => {
                assert!(dry_run && keep_going && download);
                assert!(!publish_image);
                assert_eq!(out, PathBuf::from("."));
            }
            _ => panic!("expected provision"),
        }
    }
}
