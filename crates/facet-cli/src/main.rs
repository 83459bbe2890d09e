use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facet_core::{ClusterId, FaceId, Scope};
use facet_service::{ClusterService, Config};
use facet_store::SqliteStore;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod import;

#[derive(Parser)]
#[command(name = "facet", about = "Group detected faces into identity clusters")]
struct Cli {
    /// Database path (overrides FACET_DB_PATH and the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import face records from a JSON Lines file
    Import {
        file: PathBuf,
        /// Cluster the imported faces right away
        #[arg(long)]
        cluster: bool,
    },
    /// Assign all unclustered faces
    Cluster {
        /// Restrict the run to one user's faces
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List clusters with their member counts
    List {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show cohesion metrics for a cluster
    Quality { cluster: ClusterId },
    /// Suggest a similarity threshold from existing clusters
    Threshold {
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Move the faces of one cluster into another
    Merge {
        source: ClusterId,
        target: ClusterId,
        /// Only move this user's faces
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Remove a face from its cluster
    Detach { face: FaceId },
    /// Delete a cluster, returning its faces to the unclustered pool
    Delete { cluster: ClusterId },
    /// Rename a cluster
    Rename { cluster: ClusterId, name: String },
    /// Set or clear the person a cluster depicts
    Label {
        cluster: ClusterId,
        person: Option<String>,
    },
    /// Set or clear a cluster's description
    Describe {
        cluster: ClusterId,
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let store = Arc::new(
        SqliteStore::open(config.db_path())
            .with_context(|| format!("failed to open {}", config.db_path().display()))?,
    );
    let service = ClusterService::from_config(store.clone(), &config)?;

    match cli.command {
        Commands::Import { file, cluster } => {
            let reader = BufReader::new(
                File::open(&file).with_context(|| format!("failed to open {}", file.display()))?,
            );
            let faces = import::parse_faces(reader)?;
            let import_store = Arc::clone(&store);
            let summary = tokio::task::spawn_blocking(move || {
                import::import_faces(import_store.as_ref(), faces)
            })
            .await??;
            print_json(&summary)?;

            if cluster {
                let report = service.trigger_clustering(Scope::Global).wait().await?;
                print_json(&report)?;
            }
        }
        Commands::Cluster { user } => {
            let job = service.trigger_clustering(Scope::from(user));
            let report = tokio::select! {
                report = job.wait() => report?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!(job = %job.id(), "interrupted, stopping after the current face");
                    job.cancel();
                    job.wait().await?
                }
            };
            print_json(&report)?;
        }
        Commands::List { user } => {
            print_json(&service.list_clusters(Scope::from(user)).await?)?;
        }
        Commands::Quality { cluster } => {
            print_json(&service.cluster_quality(cluster).await?)?;
        }
        Commands::Threshold { user } => {
            let threshold = service.estimate_optimal_threshold(user).await?;
            print_json(&serde_json::json!({ "threshold": threshold }))?;
        }
        Commands::Merge {
            source,
            target,
            user,
        } => {
            print_json(&service.merge_clusters(source, target, Scope::from(user)).await?)?;
        }
        Commands::Detach { face } => {
            print_json(&service.detach_face(face).await?)?;
        }
        Commands::Delete { cluster } => {
            let released = service.delete_cluster(cluster).await?;
            print_json(&serde_json::json!({ "released_faces": released }))?;
        }
        Commands::Rename { cluster, name } => {
            print_json(&service.rename_cluster(cluster, name).await?)?;
        }
        Commands::Label { cluster, person } => {
            print_json(&service.set_person_name(cluster, person).await?)?;
        }
        Commands::Describe { cluster, text } => {
            print_json(&service.set_description(cluster, text).await?)?;
        }
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
