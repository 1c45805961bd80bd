// braid/src/main.rs

mod cli;
mod commands;

use clap::Parser;

use braid_core::infrastructure::env::Env;

use crate::cli::{Cli, Commands, SchemaCommands};

#[tokio::main]
async fn main() {
    // RUST_LOG=debug braid ... for the tracing details
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let env = Env::capture();

    let outcome = match args.command {
        Commands::Plan { out, json } => {
            commands::plan::execute(&args.project_dir, out, json, &env).await
        }
        Commands::MergeOrder { plan, json } => {
            commands::merge_order::execute(&args.project_dir, plan, json, &env).await
        }
        Commands::Schema {
            command: SchemaCommands::Validate { file },
        } => commands::schema::execute(&file),
        Commands::Execute { plan } => {
            commands::execute::execute(&args.project_dir, plan, &env).await
        }
        Commands::Status { plan, json } => {
            commands::status::execute(&args.project_dir, plan, json, &env).await
        }
        Commands::Report { json } => commands::report::execute(&args.project_dir, json, &env),
        Commands::Doctor => commands::doctor::execute(&args.project_dir, &env).await,
        Commands::Bootstrap => commands::bootstrap::execute(&args.project_dir, &env),
        Commands::Autopilot {
            level,
            live,
            open_pr,
            close_superseded,
            comment_template,
        } => {
            commands::autopilot::execute(
                &args.project_dir,
                level,
                live,
                open_pr,
                close_superseded,
                comment_template,
                &env,
            )
            .await
        }
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let code = e.exit_code();
            eprintln!("💥 {:?}", miette::Report::new(e));
            std::process::exit(code);
        }
    }
}
