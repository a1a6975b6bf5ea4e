//! BLT Sandbox CLI
//!
//! Manages the master and instance sandboxes used by the BLT test suite.

use std::path::PathBuf;

use blt_sandbox::sandbox::ShellTreeOps;
use blt_sandbox::{RefreshOutcome, SandboxConfig, SandboxManager};

const CONFIG_FILE: &str = "blt-sandbox.toml";

fn usage(program: &str) {
    eprintln!("Usage: {} <command> [tool-root]", program);
    eprintln!("\nCommands:");
    eprintln!("  bootstrap       Create the master sandbox unless it already exists");
    eprintln!("  create-master   Rebuild and install the master sandbox");
    eprintln!("  replace         Replace the instance sandbox with a fresh copy");
    eprintln!("  refresh         Copy the master over the instance (falls back to replace)");
    eprintln!("  remove          Delete the instance sandbox");
    eprintln!("  path            Print the instance sandbox path");
    eprintln!("\nEnvironment variables:");
    eprintln!("  BLT_RECREATE_SANDBOX_MASTER=1  Rebuild the master on every bootstrap");
    eprintln!("  BLT_PRINT_COMMAND_OUTPUT=1     Print debug output");
    eprintln!("  DRUPAL_CORE_VERSION=<version>  Require this drupal/core before installing");
    eprintln!("  BLT_SANDBOX_SHELL_FS=1         Copy and delete with cp/rm subprocesses");
}

fn load_config(tool_root: PathBuf) -> blt_sandbox::Result<SandboxConfig> {
    let path = tool_root.join(CONFIG_FILE);
    let mut config = if path.exists() {
        tracing::info!(path = ?path, "loading sandbox config");
        SandboxConfig::load(&path, tool_root)?
    } else {
        SandboxConfig::new(tool_root)
    };
    config.apply_env();

    let warnings = config.validate().into_result()?;
    for warning in warnings {
        tracing::warn!("{}", warning);
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
        std::process::exit(1);
    }

    let tool_root = match args.get(2) {
        Some(root) => PathBuf::from(root),
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("failed to get current directory: {}", e);
                std::process::exit(1);
            }
        },
    };
    let tool_root = std::fs::canonicalize(&tool_root).unwrap_or(tool_root);

    let config = match load_config(tool_root) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let shell_fs = std::env::var("BLT_SANDBOX_SHELL_FS")
        .map(|v| blt_sandbox::config::is_truthy(&v))
        .unwrap_or(false);
    let mut manager = SandboxManager::new(config);
    if shell_fs {
        manager = manager.with_tree_ops(ShellTreeOps);
    }

    let result = match args[1].as_str() {
        "bootstrap" => manager.bootstrap().await,
        "create-master" => manager.create_master().await,
        "replace" => manager.replace_instance(),
        "remove" => manager.remove_instance(),
        "refresh" => manager.refresh_instance().map(|outcome| {
            if let RefreshOutcome::Replaced { reason } = outcome {
                eprintln!("Refresh failed ({}), instance was replaced.", reason);
            }
        }),
        "path" => {
            println!("{}", manager.instance_dir().display());
            Ok(())
        }
        other => {
            eprintln!("unknown command: {}", other);
            usage(&args[0]);
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Sandbox operation failed: {}", e);
        std::process::exit(1);
    }
}
