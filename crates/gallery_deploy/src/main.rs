use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use gallery_core::contract::{DeploymentManifest, DEFAULT_PROJECT, DEFAULT_REGION};
use gallery_core::inference::DEFAULT_MODEL_ID;
use gallery_core::naming::generate_stack_name;
use gallery_core::retry::RetryPolicy;
use gallery_deploy::analyze::{analyze_image, AnalyzeOutcome};
use gallery_deploy::clients::AwsClients;
use gallery_deploy::error::DeployError;
use gallery_deploy::manifest::{
    remove_manifest, resolve_target, write_manifest, StackTarget, DEFAULT_MANIFEST_PATH,
};
use gallery_deploy::provision::{
    deploy, DeployOptions, LambdaArchitecture, ProvisionPolicies, DEFAULT_MEMORY_MB,
    DEFAULT_TIMEOUT_SECS,
};
use gallery_deploy::status::stack_status;
use gallery_deploy::teardown::teardown;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "gallery",
    about = "Deploy, inspect and tear down the AI image gallery stack",
    long_about = "Provisions an S3 bucket, a DynamoDB table, an IAM role and a caption\n\
                  Lambda wired to the bucket's object-created events. The deployment is\n\
                  recorded in a manifest file that later commands read."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// AWS region; defaults to the manifest's region, then us-east-1
    #[arg(long, global = true, env = "AWS_REGION")]
    region: Option<String>,
    /// Stack name; defaults to the stack recorded in the manifest
    #[arg(long, global = true, env = "GALLERY_STACK")]
    stack: Option<String>,
    /// Deployment manifest location
    #[arg(long, global = true, env = "GALLERY_MANIFEST", default_value = DEFAULT_MANIFEST_PATH)]
    manifest: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every resource of a new stack and write the manifest
    Deploy(DeployArgs),
    /// Delete every resource of a stack
    Teardown,
    /// Report which resources of a stack exist; exits non-zero unless all do
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload an image and wait for its caption
    Analyze {
        /// Local image file
        image: PathBuf,
    },
}

#[derive(Args)]
struct DeployArgs {
    /// Project prefix used when no --stack is given
    #[arg(long, default_value = DEFAULT_PROJECT)]
    project: String,
    /// Bedrock model the function invokes
    #[arg(long, env = "GALLERY_MODEL_ID", default_value = DEFAULT_MODEL_ID)]
    model_id: String,
    /// Function zip produced by `cargo run -p xtask -- lambda-package`
    #[arg(long, default_value = "target/lambda/caption_lambda.zip")]
    package: PathBuf,
    /// Instruction set the package was built for
    #[arg(value_enum, long, default_value_t = LambdaArchitecture::X86_64)]
    architecture: LambdaArchitecture,
    /// Function memory in MB
    #[arg(long, default_value_t = DEFAULT_MEMORY_MB)]
    memory_mb: i32,
    /// Function timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: i32,
    /// Overwrite an existing manifest
    #[arg(long)]
    force: bool,
}

// ── commands ───────────────────────────────────────────────────────

async fn run_deploy(global: &GlobalArgs, args: DeployArgs) -> Result<ExitCode, DeployError> {
    if global.manifest.exists() && !args.force {
        return Err(DeployError::validation(format!(
            "manifest {} already exists; tear that stack down first or pass --force",
            global.manifest.display()
        )));
    }

    let stack = global.stack.clone().unwrap_or_else(|| {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        generate_stack_name(&args.project, now)
    });
    let region = global
        .region
        .clone()
        .unwrap_or_else(|| DEFAULT_REGION.to_string());

    let options = DeployOptions {
        stack,
        region,
        model_id: args.model_id,
        package: args.package,
        architecture: args.architecture,
        memory_mb: args.memory_mb,
        timeout_secs: args.timeout_secs,
    };
    let clients = AwsClients::load(&options.region).await;
    let manifest = deploy(&clients, &options, &ProvisionPolicies::default()).await?;
    write_manifest(&global.manifest, &manifest)?;

    print_deployment(&manifest, &global.manifest);
    Ok(ExitCode::SUCCESS)
}

async fn run_teardown(global: &GlobalArgs) -> Result<ExitCode, DeployError> {
    let target = resolve(global)?;
    let clients = AwsClients::load(&target.region).await;

    let report = teardown(&clients, &target.names).await;
    println!("Teardown of stack {}", report.stack);
    for entry in &report.resources {
        let detail = entry
            .detail
            .as_deref()
            .map(|detail| format!(" ({detail})"))
            .unwrap_or_default();
        println!(
            "  {:<12} {:<40} {}{detail}",
            entry.resource, entry.name, entry.outcome
        );
    }

    report.into_result()?;
    if target.manifest.is_some() {
        remove_manifest(&global.manifest)?;
        println!("Removed manifest {}", global.manifest.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_status(global: &GlobalArgs, json: bool) -> Result<ExitCode, DeployError> {
    let target = resolve(global)?;
    let clients = AwsClients::load(&target.region).await;

    let status = stack_status(&clients, &target.names, &target.region).await;
    if json {
        let body = serde_json::to_string_pretty(&status).map_err(|error| DeployError::Manifest {
            path: global.manifest.clone(),
            message: format!("failed to render status: {error}"),
        })?;
        println!("{body}");
    } else {
        println!("Stack {} ({})", status.stack, status.region);
        for resource in &status.resources {
            let detail = resource.detail.as_deref().unwrap_or("");
            println!(
                "  {:<10} {:<40} {:<8} {detail}",
                resource.resource, resource.name, resource.state
            );
        }
        let trigger = if status.trigger_connected() {
            "connected"
        } else {
            "not connected"
        };
        println!("Trigger {trigger}");
    }

    if status.is_healthy() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run_analyze(global: &GlobalArgs, image: &Path) -> Result<ExitCode, DeployError> {
    let target = resolve(global)?;
    let clients = AwsClients::load(&target.region).await;

    match analyze_image(&clients, &target.names, image, RetryPolicy::activation_poll()).await? {
        AnalyzeOutcome::Described {
            image_id,
            description,
        } => {
            println!("{image_id}\n\n{description}");
            Ok(ExitCode::SUCCESS)
        }
        AnalyzeOutcome::TimedOut { image_id, attempts } => {
            println!(
                "Timeout: no caption for {image_id} after {attempts} checks; see the function logs"
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn resolve(global: &GlobalArgs) -> Result<StackTarget, DeployError> {
    resolve_target(
        global.stack.as_deref(),
        global.region.as_deref(),
        &global.manifest,
    )
}

fn print_deployment(manifest: &DeploymentManifest, manifest_path: &Path) {
    println!("Deployed stack {} in {}", manifest.stack, manifest.region);
    println!("  bucket    {}", manifest.bucket);
    println!("  table     {}", manifest.table);
    println!("  function  {}", manifest.function_arn);
    println!("  role      {}", manifest.role_arn);
    println!("  model     {}", manifest.model_id);
    println!("Manifest written to {}", manifest_path.display());
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// ── main ───────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Deploy(args) => run_deploy(&cli.global, args).await,
        Commands::Teardown => run_teardown(&cli.global).await,
        Commands::Status { json } => run_status(&cli.global, json).await,
        Commands::Analyze { image } => run_analyze(&cli.global, &image).await,
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(error = %error, "Command failed");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn deploy_sizing_flags_are_documented_and_parsed() {
        let command = Cli::command();
        let deploy = command
            .find_subcommand("deploy")
            .expect("deploy subcommand");
        for flag in ["memory_mb", "timeout_secs"] {
            let arg = deploy
                .get_arguments()
                .find(|arg| arg.get_id() == flag)
                .expect("flag is defined");
            assert!(arg.get_help().is_some(), "{flag} has no help text");
        }

        let cli = Cli::try_parse_from(["gallery", "deploy", "--memory-mb", "512"])
            .expect("arguments parse");
        match cli.command {
            Commands::Deploy(args) => {
                assert_eq!(args.memory_mb, 512);
                assert_eq!(args.timeout_secs, DEFAULT_TIMEOUT_SECS);
            }
            _ => panic!("expected deploy"),
        }
    }
}
