use clap::{Parser, Subcommand};
use std::path::PathBuf;
use waf_config::ConfigLoader;
use waf_middleware::JwtSessionVerifier;
use waf_script::RuleCompiler;
use waf_server::logging::init_logging;
use waf_server::{serve, validate_rule_file};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing waf.toml
    #[arg(short, long, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the management API (default)
    Serve,
    /// Check rule scripts without storing them
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check the configuration and exit
    CheckConfig,
    /// Issue a session token for the given domains
    Token {
        #[arg(short, long)]
        user: String,
        #[arg(short, long = "domain", required = true)]
        domains: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let loader = ConfigLoader::new(&args.config_dir);
    let config = loader.validate()?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            init_logging(&config.logging)?;
            tracing::info!(
                "Starting WAF rule engine with config dir: {}",
                args.config_dir.display()
            );
            serve(config).await
        }
        Command::Validate { files } => {
            let compiler = RuleCompiler::new(
                config.validator.max_code_bytes,
                config.validator.cache_capacity,
            );
            let mut failed = 0;
            for file in &files {
                let errors = validate_rule_file(&compiler, file)?;
                if errors.is_empty() {
                    println!("{}: ok", file.display());
                } else {
                    failed += 1;
                    for error in errors {
                        println!("{}: {}", file.display(), serde_json::to_string(&error)?);
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{} of {} rule files failed validation", failed, files.len());
            }
            Ok(())
        }
        Command::CheckConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Token { user, domains } => {
            let verifier = JwtSessionVerifier::new(
                config.auth.jwt_secret.clone(),
                config.auth.token_expiration_hours,
            );
            println!("{}", verifier.issue_token(&user, domains)?);
            Ok(())
        }
    }
}
