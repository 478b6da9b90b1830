use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use toolfetch_core::config::{ConfigLoader, ToolfetchConfig};
use toolfetch_core::installation::{
    CacheProbe, InstallOrchestrator, InstallResult, PackageInstaller, PackageSpecifier, Platform,
};

#[derive(Parser, Debug)]
#[clap(
    name = "toolfetch",
    author,
    version,
    about = "Install tool packages from a NuGet v3 registry"
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(long, short, global = true, help = "YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, short, global = true, help = "Log level (error, warn, info, debug, trace)")]
    log_level: Option<String>,

    #[clap(long, global = true, help = "Directory holding installed package versions")]
    versions_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a package version, reusing it when already present
    Install {
        #[clap(required_unless_present = "platform_package")]
        package: Option<String>,

        #[clap(
            long,
            conflicts_with = "package",
            help = "Install the platform specific variant of this package (<BASE>.linux-x64, ...)"
        )]
        platform_package: Option<String>,

        #[clap(
            long,
            short,
            help = "Exact version, 'Latest', 'LatestPreRelease' or a wildcard such as '1.*'"
        )]
        version: Option<String>,

        #[clap(long, help = "Service index URL of the registry")]
        service_index: Option<String>,

        #[clap(long, help = "Environment variable holding the registry access token")]
        token_env: Option<String>,

        #[clap(long, help = "Relative path of a tool that must exist in the package")]
        tool: Option<PathBuf>,
    },
    /// List installed versions of a package, newest first
    List { package: String },
    /// Show the versions root and what it holds
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::from_file(path).await?,
        None => ToolfetchConfig::default(),
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let log_level_filter = log_level.parse().unwrap_or(LevelFilter::Info);
    // stdout carries results only
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .target(env_logger::Target::Stderr)
        .init();

    if let Some(root) = cli.versions_root {
        config.install.versions_root = Some(root);
    }

    match cli.command {
        Commands::Install {
            package,
            platform_package,
            version,
            service_index,
            token_env,
            tool,
        } => {
            let name = match (package, platform_package) {
                (_, Some(base)) => Platform::current().package_name(&base),
                (Some(package), None) => package,
                (None, None) => anyhow::bail!("A package name or --platform-package is required"),
            };

            if let Some(url) = service_index {
                config.registry.service_index_url = url;
            }
            if let Some(var) = token_env {
                config.registry.access_token = std::env::var(&var).ok();
                if config.registry.access_token.is_none() {
                    log::warn!(
                        "Token variable {} is not set; continuing without authentication",
                        var
                    );
                }
            }
            config.validate()?;

            let spec = PackageSpecifier::parse(name, version.as_deref());
            handle_install(&config, &spec, tool).await?;
        }
        Commands::List { package } => {
            let probe = CacheProbe::new(config.versions_root()?);
            let versions = probe.installed_versions(&package).await?;
            if versions.is_empty() {
                println!("No installed versions of {} found.", package);
            } else {
                for version in versions {
                    println!("{}", version);
                }
            }
        }
        Commands::Info => {
            let probe = CacheProbe::new(config.versions_root()?);
            let stats = probe.stats().await?;
            println!("Versions root: {}", probe.versions_root().display());
            println!("Installed packages: {}", stats.package_count);
            println!("Archives: {}", stats.archive_count);
            println!("Total size: {}", stats.total_size_human());
        }
    }

    Ok(())
}

async fn handle_install(
    config: &ToolfetchConfig,
    spec: &PackageSpecifier,
    tool: Option<PathBuf>,
) -> Result<()> {
    let settings = config.to_settings()?;
    let orchestrator = InstallOrchestrator::new(settings)?;

    let result = orchestrator
        .install(spec)
        .await
        .with_context(|| format!("Installing {}", spec.name))?;

    for line in result_lines(&result) {
        println!("{}", line);
    }

    if let Some(tool) = tool {
        let path = result.verify_tool(&tool).await?;
        println!("tool_path={}", path.display());
    }

    Ok(())
}

/// `key=value` lines for scripts consuming stdout
fn result_lines(result: &InstallResult) -> Vec<String> {
    let display = |path: &Option<PathBuf>| {
        path.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    };

    vec![
        format!("resolved_version={}", result.resolved_version.as_deref().unwrap_or_default()),
        format!("package_folder={}", display(&result.package_folder)),
        format!("package_path={}", display(&result.package_path)),
        format!("in_cache={}", result.in_cache),
    ]
}
