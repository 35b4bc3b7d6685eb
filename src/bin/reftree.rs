//! reftree CLI tool
//!
//! Command-line access to reference trees stored in the content-management API.
//!
//! ## Commands
//!
//! - `tree <root>`: Materialize and print the reference tree below an entry
//! - `remove <container> <field> <target>`: Remove the last reference to an entry
//! - `toggle <parent> <place> <variant>`: Select or deselect a place's variant on a parent
//! - `clone <owner> <variant> <name>`: Clone a variant and link the copy from its owner
//!
//! The access token is read from `REFTREE_CMA_TOKEN`.

use clap::{Parser, Subcommand};
use reftree_core::{
    config::{ReftreeConfig, TomlConfigProvider},
    event::{RefreshTrigger, TreeEvent},
    http::CmaClient,
    session::TreeSession,
    tree::{LoadState, TreeNode},
    ReftreeError,
};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::mpsc::unbounded_channel;

#[derive(Parser)]
#[command(name = "reftree")]
#[command(author, version, about = "Inspect and edit nested CMS entry references", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "reftree.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Materialize and print the reference tree below an entry
    Tree {
        /// Root entry id
        root: String,

        /// Override the configured maximum depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Print every tree event
        #[arg(short, long)]
        verbose: bool,
    },

    /// Remove the last reference to <target> from <container>.<field>
    Remove {
        container: String,
        field: String,
        target: String,

        /// Root entry to touch after the write
        #[arg(long)]
        root: Option<String>,
    },

    /// Select a place's variant on a parent, or deselect it if it is already active
    Toggle {
        parent: String,
        place: String,
        variant: String,
    },

    /// Clone a variant and link the copy from <owner>'s linkedVariants
    Clone {
        owner: String,
        variant: String,
        name: String,
    },
}

fn print_node(node: &TreeNode, depth: usize) {
    let state = match node.load_state {
        LoadState::Loaded => "",
        LoadState::Pending => " (not expanded)",
        LoadState::Failed => " (incomplete)",
    };
    println!(
        "{}{} [{}]{}",
        "  ".repeat(depth),
        node.label,
        node.id(),
        state
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config: ReftreeConfig = TomlConfigProvider::new(cli.config).load()?;
    let token = ReftreeConfig::token_from_env()?;
    if let Commands::Tree {
        depth: Some(depth), ..
    } = &cli.command
    {
        config.tree.max_depth = *depth;
    }
    let client = Arc::new(CmaClient::from_config(&config, &token)?);

    match cli.command {
        Commands::Tree { root, verbose, .. } => {
            let (tx, mut rx) = unbounded_channel::<TreeEvent>();
            let session = TreeSession::new(client, config).with_events(tx);
            let tree = session
                .on_trigger(RefreshTrigger::RootChanged(root))
                .await?
                .ok_or_else(|| ReftreeError::Custom("materialization was superseded".to_string()))?;

            tree.root.walk(&mut |node, depth| print_node(node, depth));
            if !tree.dropped.is_empty() {
                println!("\n=== Dropped references ===");
                for dropped in &tree.dropped {
                    println!(
                        "{}.{} -> {}: {}",
                        dropped.parent_id, dropped.field, dropped.target, dropped.reason
                    );
                }
            }
            if verbose {
                while let Ok(event) = rx.try_recv() {
                    println!("[Event] {event}");
                }
            }
        }

        Commands::Remove {
            container,
            field,
            target,
            root,
        } => {
            let session = TreeSession::new(client, config);
            if let Some(root) = root {
                session.set_root(root);
            }
            session.remove_reference(&container, &field, &target).await?;
            println!("Removed {target} from {container}.{field}");
        }

        Commands::Toggle {
            parent,
            place,
            variant,
        } => {
            let session = TreeSession::new(client, config);
            let updated = session.toggle_variant(&parent, &place, &variant).await?;
            println!("{} is now at version {}", updated.id, updated.version);
        }

        Commands::Clone {
            owner,
            variant,
            name,
        } => {
            let session = TreeSession::new(client, config);
            let clone = session.clone_variant(&owner, &variant, &name).await?;
            println!("Created {} ({})", clone.id, clone.content_type);
        }
    }

    Ok(())
}
