//! Validate command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use tagmirror_core::{Config, ImageMirrorPolicy};
use tagmirror_registry::AuthResolver;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the mirroring configuration file
    #[arg(short, long, env = "TAGMIRROR_CONFIG")]
    pub config: PathBuf,
}

/// Runs the validate command.
pub fn run(args: &ValidateArgs) -> Result<()> {
    info!(path = %args.config.display(), "Validating configuration");

    let config = Config::load(&args.config).with_context(|| {
        format!("Failed to load configuration from {}", args.config.display())
    })?;

    print!("{}", describe(&config));
    println!("\n✓ {} image(s) validated", config.images().len());
    Ok(())
}

/// Renders the effective configuration.
fn describe(config: &Config) -> String {
    let auth = AuthResolver::empty();
    let mut out = format!(
        "default-mode: {}\non-error: {}\n",
        config.default_mode(),
        config.on_error()
    );

    out.push_str("registries:\n");
    for registry in config.registries() {
        out.push_str(&format!(
            "  {registry} (credentials: {})\n",
            auth.family_for(registry)
        ));
    }

    out.push_str("images:\n");
    for policy in config.images() {
        out.push_str(&describe_policy(policy));
    }
    out
}

fn describe_policy(policy: &ImageMirrorPolicy) -> String {
    let mut line = format!(
        "  {}: {} -> {} mode={}",
        policy.name, policy.source, policy.destination, policy.mode
    );
    if policy.allow_prerelease {
        line.push_str(" allow-prerelease");
    }
    if policy.replace_tag {
        line.push_str(" replace-tag");
    }
    if let Some(major) = policy.pinned_major {
        line.push_str(&format!(" pinned-major={major}"));
    }
    if let Some(compatibility) = &policy.compatibility {
        line.push_str(&format!(" compatibility={compatibility}"));
    }
    line.push('\n');
    line
}
